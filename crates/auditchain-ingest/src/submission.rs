//! Submission DTOs and their mapping to `NewEvent`.
//!
//! Defaults applied when mapping:
//!
//! - missing `timestamp` → the ingest time
//! - missing actor or resource `name` → its `id`
//! - missing `metadata` → source `"api"`, tenant `"default"`
//! - missing `correlationId` → a fresh UUID

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use auditchain_contracts::{
    error::{LedgerError, LedgerResult},
    event::{
        Action, ActionType, Actor, ActorType, EventBody, EventMetadata, JsonMap, NewEvent,
        Resource, ResourceType, StringMap,
    },
};

pub const DEFAULT_SOURCE: &str = "api";
pub const DEFAULT_TENANT: &str = "default";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSubmission {
    pub id: Option<String>,
    pub timestamp: Option<String>,
    pub signature: Option<String>,
    pub actor: ActorSubmission,
    pub action: ActionSubmission,
    pub resource: ResourceSubmission,
    pub metadata: Option<MetadataSubmission>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorSubmission {
    pub id: String,
    #[serde(rename = "type")]
    pub actor_type: String,
    pub name: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub attributes: Option<StringMap>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionSubmission {
    #[serde(rename = "type")]
    pub action_type: String,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceSubmission {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: Option<String>,
    pub before: Option<JsonMap>,
    pub after: Option<JsonMap>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSubmission {
    pub source: String,
    pub tenant_id: String,
    pub correlation_id: Option<String>,
    pub session_id: Option<String>,
    pub tags: Option<StringMap>,
    pub extra: Option<JsonMap>,
}

impl EventSubmission {
    /// Map to a `NewEvent`, filling defaults.  `now` stands in for a missing
    /// timestamp.
    ///
    /// Every unparseable field is reported, joined with `"; "`.
    pub fn into_new_event(self, now: DateTime<Utc>) -> LedgerResult<NewEvent> {
        let mut problems = Vec::new();

        let actor_type = self
            .actor
            .actor_type
            .parse::<ActorType>()
            .map_err(|e: LedgerError| problems.push(format!("actor.type: {}", reason_of(e))))
            .ok();
        let action_type = self
            .action
            .action_type
            .parse::<ActionType>()
            .map_err(|e: LedgerError| problems.push(format!("action.type: {}", reason_of(e))))
            .ok();
        let resource_type = self
            .resource
            .resource_type
            .parse::<ResourceType>()
            .map_err(|e: LedgerError| problems.push(format!("resource.type: {}", reason_of(e))))
            .ok();

        let timestamp = match self.timestamp.as_deref() {
            None => Some(now),
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| problems.push(format!("timestamp '{raw}' is not RFC 3339: {e}")))
                .ok(),
        };
        let id = match self.id.as_deref() {
            None => None,
            Some(raw) => match Uuid::parse_str(raw) {
                Ok(id) => Some(id),
                Err(e) => {
                    problems.push(format!("id '{raw}' is not a UUID: {e}"));
                    None
                }
            },
        };

        let (Some(actor_type), Some(action_type), Some(resource_type), Some(timestamp)) =
            (actor_type, action_type, resource_type, timestamp)
        else {
            return Err(LedgerError::Validation {
                reason: problems.join("; "),
            });
        };
        if !problems.is_empty() {
            return Err(LedgerError::Validation {
                reason: problems.join("; "),
            });
        }

        let actor = Actor {
            name: self.actor.name.unwrap_or_else(|| self.actor.id.clone()),
            id: self.actor.id,
            actor_type,
            ip: self.actor.ip,
            user_agent: self.actor.user_agent,
            attributes: self.actor.attributes.unwrap_or_default(),
        };
        let action = Action {
            action_type,
            description: self.action.description,
            category: self.action.category,
        };
        let resource = Resource {
            name: self.resource.name.unwrap_or_else(|| self.resource.id.clone()),
            id: self.resource.id,
            resource_type,
            before: self.resource.before,
            after: self.resource.after,
        };
        let metadata = match self.metadata {
            Some(m) => EventMetadata {
                source: m.source,
                tenant_id: m.tenant_id,
                correlation_id: m.correlation_id,
                session_id: m.session_id,
                tags: m.tags,
                extra: m.extra,
            },
            None => EventMetadata::new(DEFAULT_SOURCE, DEFAULT_TENANT),
        };
        let metadata = EventMetadata {
            correlation_id: metadata
                .correlation_id
                .or_else(|| Some(Uuid::new_v4().to_string())),
            ..metadata
        };

        let mut event = NewEvent::new(EventBody {
            timestamp,
            actor,
            action,
            resource,
            metadata,
        });
        event.id = id;
        event.signature = self.signature;
        Ok(event)
    }
}

fn reason_of(err: LedgerError) -> String {
    match err {
        LedgerError::Validation { reason } => reason,
        other => other.to_string(),
    }
}
