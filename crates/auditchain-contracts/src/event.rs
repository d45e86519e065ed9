//! Audit event types.
//!
//! `NewEvent` is what an ingestion caller submits: the event body plus an
//! optional caller-chosen id and an opaque signature.  `EventRecord` is the
//! sealed, persisted form.  Its fields are private; a record is built once by
//! `NewEvent::seal` (append path) or `EventRecord::from_parts` (adapters
//! mapping stored rows back) and is read-only afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

/// Free-form structured state (`before`/`after`, `extra`).
///
/// A `BTreeMap` keeps the top-level keys sorted regardless of insertion order.
pub type JsonMap = BTreeMap<String, serde_json::Value>;

/// String-to-string attributes (`attributes`, `tags`).
pub type StringMap = BTreeMap<String, String>;

/// Declares a closed set of upper-case wire names with `as_str`, `ALL`,
/// `Display`, and a case-insensitive `FromStr`.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The upper-case wire name used in storage and in the hash input.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = LedgerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let upper = s.trim().to_ascii_uppercase();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == upper)
                    .ok_or_else(|| LedgerError::Validation {
                        reason: format!(
                            "invalid {} '{}'; valid values: {}",
                            stringify!($name),
                            s,
                            $name::ALL
                                .iter()
                                .map(|v| v.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ),
                    })
            }
        }
    };
}

wire_enum! {
    /// Who performed an action.
    ActorType {
        User => "USER",
        System => "SYSTEM",
        Service => "SERVICE",
    }
}

wire_enum! {
    /// What kind of action was performed.
    ActionType {
        Create => "CREATE",
        Read => "READ",
        Update => "UPDATE",
        Delete => "DELETE",
        Approve => "APPROVE",
        Reject => "REJECT",
        Login => "LOGIN",
        Logout => "LOGOUT",
        Export => "EXPORT",
        Import => "IMPORT",
        Archive => "ARCHIVE",
        Restore => "RESTORE",
    }
}

wire_enum! {
    /// What kind of resource the action touched.
    ResourceType {
        Document => "DOCUMENT",
        User => "USER",
        Transaction => "TRANSACTION",
        Config => "CONFIG",
        File => "FILE",
        Api => "API",
        Database => "DATABASE",
        System => "SYSTEM",
    }
}

/// The principal that performed the action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    #[serde(rename = "type")]
    pub actor_type: ActorType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub attributes: StringMap,
}

impl Actor {
    pub fn new(id: impl Into<String>, actor_type: ActorType, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            actor_type,
            name: name.into(),
            ip: None,
            user_agent: None,
            attributes: StringMap::new(),
        }
    }
}

/// The operation performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Action {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            description: None,
            category: None,
        }
    }
}

/// The object acted upon, optionally with its state before and after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<JsonMap>,
}

impl Resource {
    pub fn new(id: impl Into<String>, resource_type: ResourceType, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_type,
            name: name.into(),
            before: None,
            after: None,
        }
    }
}

/// Routing and correlation data.  `tenant_id` is the chain partition key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub source: String,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<StringMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<JsonMap>,
}

impl EventMetadata {
    pub fn new(source: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            tenant_id: tenant_id.into(),
            correlation_id: None,
            session_id: None,
            tags: None,
            extra: None,
        }
    }
}

/// The hashed content of an event: everything except identity, chain, and
/// storage bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBody {
    pub timestamp: DateTime<Utc>,
    pub actor: Actor,
    pub action: Action,
    pub resource: Resource,
    pub metadata: EventMetadata,
}

impl EventBody {
    /// Check the required fields.
    ///
    /// All violations are collected so the caller sees every problem at once.
    pub fn validate(&self) -> LedgerResult<()> {
        let mut violations = Vec::new();
        let required = [
            ("actor.id", &self.actor.id),
            ("actor.name", &self.actor.name),
            ("resource.id", &self.resource.id),
            ("resource.name", &self.resource.name),
            ("metadata.source", &self.metadata.source),
            ("metadata.tenant_id", &self.metadata.tenant_id),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                violations.push(format!("{field} is required"));
            }
        }
        // RFC 3339 only has four-digit years.
        if !(0..=9999).contains(&self.timestamp.year()) {
            violations.push(format!(
                "timestamp {} is outside years 0000-9999",
                self.timestamp
            ));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::Validation {
                reason: violations.join("; "),
            })
        }
    }
}

/// An event submitted for appending.  Carries no chain fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Caller-chosen id.  Assigned at append time when absent.
    #[serde(default)]
    pub id: Option<Uuid>,
    pub body: EventBody,
    /// Opaque signature, stored as-is.
    #[serde(default)]
    pub signature: Option<String>,
}

impl NewEvent {
    pub fn new(body: EventBody) -> Self {
        Self {
            id: None,
            body,
            signature: None,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn tenant_id(&self) -> &str {
        &self.body.metadata.tenant_id
    }

    /// Turn the submission into a persisted-form record at `link`.
    pub fn seal(self, id: Uuid, link: ChainLink, created_at: DateTime<Utc>) -> EventRecord {
        EventRecord {
            id,
            sequence: link.sequence,
            body: self.body,
            previous_hash: link.previous_hash,
            hash: link.hash,
            signature: self.signature,
            created_at,
        }
    }
}

/// The chain position computed for a record during an append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    /// 0-based position in the tenant chain.
    pub sequence: u64,
    pub previous_hash: String,
    pub hash: String,
}

/// The last appended record of a tenant chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub sequence: u64,
    pub hash: String,
}

/// A sealed audit event as stored in a tenant chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    id: Uuid,
    sequence: u64,
    #[serde(flatten)]
    body: EventBody,
    previous_hash: String,
    hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    created_at: DateTime<Utc>,
}

/// The fields of an `EventRecord`, for adapters that map stored rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordParts {
    pub id: Uuid,
    pub sequence: u64,
    pub body: EventBody,
    pub previous_hash: String,
    pub hash: String,
    pub signature: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    /// Rebuild a record exactly as it was stored.  No hashing happens here:
    /// whatever the storage holds is what verification will see.
    pub fn from_parts(parts: RecordParts) -> Self {
        Self {
            id: parts.id,
            sequence: parts.sequence,
            body: parts.body,
            previous_hash: parts.previous_hash,
            hash: parts.hash,
            signature: parts.signature,
            created_at: parts.created_at,
        }
    }

    pub fn into_parts(self) -> RecordParts {
        RecordParts {
            id: self.id,
            sequence: self.sequence,
            body: self.body,
            previous_hash: self.previous_hash,
            hash: self.hash,
            signature: self.signature,
            created_at: self.created_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn body(&self) -> &EventBody {
        &self.body
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.body.timestamp
    }

    pub fn actor(&self) -> &Actor {
        &self.body.actor
    }

    pub fn action(&self) -> &Action {
        &self.body.action
    }

    pub fn resource(&self) -> &Resource {
        &self.body.resource
    }

    pub fn metadata(&self) -> &EventMetadata {
        &self.body.metadata
    }

    pub fn tenant_id(&self) -> &str {
        &self.body.metadata.tenant_id
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The head this record represents once it is the last of its chain.
    pub fn as_head(&self) -> ChainHead {
        ChainHead {
            sequence: self.sequence,
            hash: self.hash.clone(),
        }
    }
}
