//! Flat row layout shared by the SQL adapter.
//!
//! `StoredRow` mirrors the `events` table column for column.  Mapping in
//! either direction is lossless: timestamps use fixed-width RFC 3339 with
//! nanoseconds (so text order is time order), map fields are JSON text.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use auditchain_contracts::{
    error::{LedgerError, LedgerResult},
    event::{
        Action, Actor, EventBody, EventMetadata, EventRecord, JsonMap, RecordParts, Resource,
        StringMap,
    },
};

/// Column order used by every `SELECT` and `INSERT`.
pub(crate) const COLUMNS: &str = "id, tenant_id, seq, timestamp, \
    actor_id, actor_type, actor_name, actor_ip, actor_user_agent, actor_attributes, \
    action_type, action_description, action_category, \
    resource_id, resource_type, resource_name, resource_before, resource_after, \
    metadata_source, correlation_id, session_id, tags, extra, \
    previous_hash, hash, signature, created_at";

pub(crate) const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    timestamp TEXT NOT NULL,
    actor_id TEXT NOT NULL,
    actor_type TEXT NOT NULL,
    actor_name TEXT NOT NULL,
    actor_ip TEXT,
    actor_user_agent TEXT,
    actor_attributes TEXT NOT NULL,
    action_type TEXT NOT NULL,
    action_description TEXT,
    action_category TEXT,
    resource_id TEXT NOT NULL,
    resource_type TEXT NOT NULL,
    resource_name TEXT NOT NULL,
    resource_before TEXT,
    resource_after TEXT,
    metadata_source TEXT NOT NULL,
    correlation_id TEXT,
    session_id TEXT,
    tags TEXT,
    extra TEXT,
    previous_hash TEXT NOT NULL,
    hash TEXT NOT NULL,
    signature TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (tenant_id, seq)
)";

pub(crate) const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_events_hash ON events(hash)",
    "CREATE INDEX IF NOT EXISTS idx_events_correlation_id ON events(correlation_id)",
    "CREATE INDEX IF NOT EXISTS idx_events_tenant_timestamp ON events(tenant_id, timestamp)",
];

/// Render a timestamp the way it is stored and compared.
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(column: &str, raw: &str) -> LedgerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| corrupt(column, e))
}

fn corrupt(column: &str, cause: impl std::fmt::Display) -> LedgerError {
    LedgerError::persistence(format!("stored column '{column}' is unreadable: {cause}"))
}

/// One `events` row.
#[derive(Debug, Clone)]
pub(crate) struct StoredRow {
    pub id: String,
    pub tenant_id: String,
    pub seq: i64,
    pub timestamp: String,
    pub actor_id: String,
    pub actor_type: String,
    pub actor_name: String,
    pub actor_ip: Option<String>,
    pub actor_user_agent: Option<String>,
    pub actor_attributes: String,
    pub action_type: String,
    pub action_description: Option<String>,
    pub action_category: Option<String>,
    pub resource_id: String,
    pub resource_type: String,
    pub resource_name: String,
    pub resource_before: Option<String>,
    pub resource_after: Option<String>,
    pub metadata_source: String,
    pub correlation_id: Option<String>,
    pub session_id: Option<String>,
    pub tags: Option<String>,
    pub extra: Option<String>,
    pub previous_hash: String,
    pub hash: String,
    pub signature: Option<String>,
    pub created_at: String,
}

impl StoredRow {
    /// Read a row selected with `COLUMNS`.
    pub fn from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            seq: row.get(2)?,
            timestamp: row.get(3)?,
            actor_id: row.get(4)?,
            actor_type: row.get(5)?,
            actor_name: row.get(6)?,
            actor_ip: row.get(7)?,
            actor_user_agent: row.get(8)?,
            actor_attributes: row.get(9)?,
            action_type: row.get(10)?,
            action_description: row.get(11)?,
            action_category: row.get(12)?,
            resource_id: row.get(13)?,
            resource_type: row.get(14)?,
            resource_name: row.get(15)?,
            resource_before: row.get(16)?,
            resource_after: row.get(17)?,
            metadata_source: row.get(18)?,
            correlation_id: row.get(19)?,
            session_id: row.get(20)?,
            tags: row.get(21)?,
            extra: row.get(22)?,
            previous_hash: row.get(23)?,
            hash: row.get(24)?,
            signature: row.get(25)?,
            created_at: row.get(26)?,
        })
    }

    pub fn from_record(record: &EventRecord) -> LedgerResult<Self> {
        let actor = record.actor();
        let action = record.action();
        let resource = record.resource();
        let metadata = record.metadata();

        Ok(Self {
            id: record.id().to_string(),
            tenant_id: metadata.tenant_id.clone(),
            seq: i64::try_from(record.sequence())
                .map_err(|_| LedgerError::persistence("sequence exceeds i64"))?,
            timestamp: format_ts(record.timestamp()),
            actor_id: actor.id.clone(),
            actor_type: actor.actor_type.as_str().to_string(),
            actor_name: actor.name.clone(),
            actor_ip: actor.ip.clone(),
            actor_user_agent: actor.user_agent.clone(),
            actor_attributes: to_json(&actor.attributes)?,
            action_type: action.action_type.as_str().to_string(),
            action_description: action.description.clone(),
            action_category: action.category.clone(),
            resource_id: resource.id.clone(),
            resource_type: resource.resource_type.as_str().to_string(),
            resource_name: resource.name.clone(),
            resource_before: resource.before.as_ref().map(to_json).transpose()?,
            resource_after: resource.after.as_ref().map(to_json).transpose()?,
            metadata_source: metadata.source.clone(),
            correlation_id: metadata.correlation_id.clone(),
            session_id: metadata.session_id.clone(),
            tags: metadata.tags.as_ref().map(to_json).transpose()?,
            extra: metadata.extra.as_ref().map(to_json).transpose()?,
            previous_hash: record.previous_hash().to_string(),
            hash: record.hash().to_string(),
            signature: record.signature().map(str::to_string),
            created_at: format_ts(record.created_at()),
        })
    }

    /// Rebuild the record exactly as stored; nothing is recomputed.
    pub fn into_record(self) -> LedgerResult<EventRecord> {
        let body = EventBody {
            timestamp: parse_ts("timestamp", &self.timestamp)?,
            actor: Actor {
                id: self.actor_id,
                actor_type: self.actor_type.parse().map_err(|e| corrupt("actor_type", e))?,
                name: self.actor_name,
                ip: self.actor_ip,
                user_agent: self.actor_user_agent,
                attributes: from_json::<StringMap>("actor_attributes", &self.actor_attributes)?,
            },
            action: Action {
                action_type: self.action_type.parse().map_err(|e| corrupt("action_type", e))?,
                description: self.action_description,
                category: self.action_category,
            },
            resource: Resource {
                id: self.resource_id,
                resource_type: self
                    .resource_type
                    .parse()
                    .map_err(|e| corrupt("resource_type", e))?,
                name: self.resource_name,
                before: opt_from_json::<JsonMap>("resource_before", self.resource_before)?,
                after: opt_from_json::<JsonMap>("resource_after", self.resource_after)?,
            },
            metadata: EventMetadata {
                source: self.metadata_source,
                tenant_id: self.tenant_id,
                correlation_id: self.correlation_id,
                session_id: self.session_id,
                tags: opt_from_json::<StringMap>("tags", self.tags)?,
                extra: opt_from_json::<JsonMap>("extra", self.extra)?,
            },
        };

        Ok(EventRecord::from_parts(RecordParts {
            id: Uuid::parse_str(&self.id).map_err(|e| corrupt("id", e))?,
            sequence: u64::try_from(self.seq).map_err(|e| corrupt("seq", e))?,
            body,
            previous_hash: self.previous_hash,
            hash: self.hash,
            signature: self.signature,
            created_at: parse_ts("created_at", &self.created_at)?,
        }))
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> LedgerResult<String> {
    serde_json::to_string(value).map_err(LedgerError::persistence)
}

fn from_json<T: serde::de::DeserializeOwned>(column: &str, raw: &str) -> LedgerResult<T> {
    serde_json::from_str(raw).map_err(|e| corrupt(column, e))
}

fn opt_from_json<T: serde::de::DeserializeOwned>(
    column: &str,
    raw: Option<String>,
) -> LedgerResult<Option<T>> {
    raw.map(|raw| from_json(column, &raw)).transpose()
}
