//! Read-side query types used by downstream consumers (search, reporting).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::LedgerError,
    event::{ActionType, EventRecord, ResourceType},
};

/// Default page size for `EventQuery`.
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Inclusive time window over event `timestamp`.  Open on a missing side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| ts >= from) && self.to.map_or(true, |to| ts <= to)
    }
}

/// Filtered, paged listing of one tenant's events, newest `timestamp` first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventQuery {
    pub actor_id: Option<String>,
    pub action_type: Option<ActionType>,
    pub resource_type: Option<ResourceType>,
    pub range: TimeRange,
    pub offset: usize,
    pub limit: usize,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            actor_id: None,
            action_type: None,
            resource_type: None,
            range: TimeRange::default(),
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl EventQuery {
    /// True when `record` satisfies every filter (paging is not considered).
    pub fn matches(&self, record: &EventRecord) -> bool {
        self.actor_id.as_deref().map_or(true, |id| record.actor().id == id)
            && self
                .action_type
                .map_or(true, |t| record.action().action_type == t)
            && self
                .resource_type
                .map_or(true, |t| record.resource().resource_type == t)
            && self.range.contains(record.timestamp())
    }
}

/// One page of results plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: usize,
    pub limit: usize,
}

/// Grouping key for per-tenant aggregation counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountDimension {
    ActionType,
    ResourceType,
    ActorId,
}

impl CountDimension {
    /// The grouping key of `record` along this dimension.
    pub fn key_of(&self, record: &EventRecord) -> String {
        match self {
            CountDimension::ActionType => record.action().action_type.as_str().to_string(),
            CountDimension::ResourceType => record.resource().resource_type.as_str().to_string(),
            CountDimension::ActorId => record.actor().id.clone(),
        }
    }
}

impl fmt::Display for CountDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CountDimension::ActionType => "action",
            CountDimension::ResourceType => "resource",
            CountDimension::ActorId => "actor",
        })
    }
}

impl FromStr for CountDimension {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "action" | "action_type" => Ok(CountDimension::ActionType),
            "resource" | "resource_type" => Ok(CountDimension::ResourceType),
            "actor" | "actor_id" => Ok(CountDimension::ActorId),
            other => Err(LedgerError::Validation {
                reason: format!("unknown count dimension '{other}'; use action, resource, or actor"),
            }),
        }
    }
}
