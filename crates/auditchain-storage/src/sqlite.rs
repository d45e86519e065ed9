//! SQLite implementation of `EventRepository`.
//!
//! One `events` table holds every tenant's chain, flattened one column per
//! field.  `UNIQUE (tenant_id, seq)` makes a second link at the same chain
//! position impossible, and every append runs in an `IMMEDIATE` transaction
//! that re-reads the head and calls `check_extends_head` before inserting.
//! Together these keep chains linear when several processes share one
//! database file, each with its own in-process `ChainGuard`.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use auditchain_contracts::{
    error::{LedgerError, LedgerResult},
    event::{ChainHead, EventRecord},
    query::{CountDimension, EventQuery, Page, TimeRange},
};
use auditchain_core::traits::{check_extends_head, EventRepository};

use crate::row::{format_ts, StoredRow, COLUMNS, CREATE_INDEXES, CREATE_TABLE};

/// Durable event storage in a single SQLite database.
pub struct SqliteEventRepository {
    conn: Mutex<Connection>,
}

fn sql_error(context: &'static str) -> impl FnOnce(rusqlite::Error) -> LedgerError {
    move |e| LedgerError::persistence(format!("{context}: {e}"))
}

impl SqliteEventRepository {
    /// Open (or create) the database at `path`.
    ///
    /// `busy_timeout` bounds how long a writer waits for another connection's
    /// transaction before giving up with a persistence error.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> LedgerResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(sql_error("failed to open database"))?;
        conn.busy_timeout(busy_timeout)
            .map_err(sql_error("failed to set busy timeout"))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(sql_error("failed to enable WAL"))?;
        Self::init_schema(&conn)?;

        info!(path = %path.display(), "sqlite event repository opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory().map_err(sql_error("failed to open database"))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> LedgerResult<()> {
        conn.execute(CREATE_TABLE, [])
            .map_err(sql_error("failed to create events table"))?;
        for statement in CREATE_INDEXES {
            conn.execute(statement, [])
                .map_err(sql_error("failed to create index"))?;
        }
        Ok(())
    }

    fn head_in(conn: &Connection, tenant_id: &str) -> LedgerResult<Option<ChainHead>> {
        let head = conn
            .query_row(
                "SELECT seq, hash FROM events WHERE tenant_id = ?1 ORDER BY seq DESC LIMIT 1",
                params![tenant_id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(sql_error("failed to read chain head"))?;

        head.map(|(seq, hash)| {
            let sequence = u64::try_from(seq)
                .map_err(|_| LedgerError::persistence(format!("negative sequence {seq}")))?;
            Ok(ChainHead { sequence, hash })
        })
        .transpose()
    }

    /// Run a `SELECT {COLUMNS} ...` statement and map every row.
    fn query_records<P: rusqlite::Params>(
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> LedgerResult<Vec<EventRecord>> {
        let mut stmt = conn
            .prepare_cached(sql)
            .map_err(sql_error("failed to prepare query"))?;
        let rows = stmt
            .query_map(params, StoredRow::from_sql)
            .map_err(sql_error("failed to run query"))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_error("failed to read row"))?;
        rows.into_iter().map(StoredRow::into_record).collect()
    }
}

/// WHERE clause and bound values for a tenant-scoped filter.
struct Filter {
    clauses: Vec<&'static str>,
    values: Vec<String>,
}

impl Filter {
    fn tenant(tenant_id: &str) -> Self {
        Self {
            clauses: vec!["tenant_id = ?"],
            values: vec![tenant_id.to_string()],
        }
    }

    fn push(&mut self, clause: &'static str, value: String) {
        self.clauses.push(clause);
        self.values.push(value);
    }

    fn range(mut self, range: &TimeRange) -> Self {
        if let Some(from) = range.from {
            self.push("timestamp >= ?", format_ts(from));
        }
        if let Some(to) = range.to {
            self.push("timestamp <= ?", format_ts(to));
        }
        self
    }

    fn sql(&self) -> String {
        self.clauses.join(" AND ")
    }
}

impl EventRepository for SqliteEventRepository {
    fn head(&self, tenant_id: &str) -> LedgerResult<Option<ChainHead>> {
        let conn = self.conn.lock();
        Self::head_in(&conn, tenant_id)
    }

    fn append(&self, records: &[EventRecord]) -> LedgerResult<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let rows = records
            .iter()
            .map(StoredRow::from_record)
            .collect::<LedgerResult<Vec<_>>>()?;

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sql_error("failed to begin append"))?;

        let head = Self::head_in(&tx, first.tenant_id())?;
        check_extends_head(head.as_ref(), records)?;

        {
            let sql = format!(
                "INSERT INTO events ({COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, \
                  ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)"
            );
            let mut stmt = tx
                .prepare_cached(&sql)
                .map_err(sql_error("failed to prepare insert"))?;
            for row in &rows {
                stmt.execute(params![
                    row.id,
                    row.tenant_id,
                    row.seq,
                    row.timestamp,
                    row.actor_id,
                    row.actor_type,
                    row.actor_name,
                    row.actor_ip,
                    row.actor_user_agent,
                    row.actor_attributes,
                    row.action_type,
                    row.action_description,
                    row.action_category,
                    row.resource_id,
                    row.resource_type,
                    row.resource_name,
                    row.resource_before,
                    row.resource_after,
                    row.metadata_source,
                    row.correlation_id,
                    row.session_id,
                    row.tags,
                    row.extra,
                    row.previous_hash,
                    row.hash,
                    row.signature,
                    row.created_at,
                ])
                .map_err(sql_error("failed to insert event"))?;
            }
        }

        tx.commit().map_err(sql_error("failed to commit append"))?;
        debug!(tenant_id = %first.tenant_id(), count = records.len(), "records committed to sqlite");
        Ok(())
    }

    fn find_by_id(&self, id: Uuid) -> LedgerResult<Option<EventRecord>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {COLUMNS} FROM events WHERE id = ?1");
        Ok(Self::query_records(&conn, &sql, params![id.to_string()])?
            .into_iter()
            .next())
    }

    fn find_by_hash(&self, hash: &str) -> LedgerResult<Option<EventRecord>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {COLUMNS} FROM events WHERE hash = ?1 LIMIT 1");
        Ok(Self::query_records(&conn, &sql, params![hash])?
            .into_iter()
            .next())
    }

    fn find_by_correlation_id(&self, correlation_id: &str) -> LedgerResult<Vec<EventRecord>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {COLUMNS} FROM events WHERE correlation_id = ?1 ORDER BY timestamp DESC"
        );
        Self::query_records(&conn, &sql, params![correlation_id])
    }

    fn find_all_by_tenant_for_chain_verification(
        &self,
        tenant_id: &str,
    ) -> LedgerResult<Vec<EventRecord>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {COLUMNS} FROM events WHERE tenant_id = ?1 ORDER BY seq ASC");
        Self::query_records(&conn, &sql, params![tenant_id])
    }

    fn find_by_tenant(
        &self,
        tenant_id: &str,
        query: &EventQuery,
    ) -> LedgerResult<Page<EventRecord>> {
        let mut filter = Filter::tenant(tenant_id).range(&query.range);
        if let Some(actor_id) = &query.actor_id {
            filter.push("actor_id = ?", actor_id.clone());
        }
        if let Some(action_type) = query.action_type {
            filter.push("action_type = ?", action_type.as_str().to_string());
        }
        if let Some(resource_type) = query.resource_type {
            filter.push("resource_type = ?", resource_type.as_str().to_string());
        }

        let conn = self.conn.lock();
        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM events WHERE {}", filter.sql()),
                params_from_iter(filter.values.iter()),
                |row| row.get(0),
            )
            .map_err(sql_error("failed to count events"))?;

        // SQLite takes signed 64-bit limits.
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);
        let sql = format!(
            "SELECT {COLUMNS} FROM events WHERE {} \
             ORDER BY timestamp DESC, seq DESC LIMIT {limit} OFFSET {offset}",
            filter.sql(),
        );
        let items = Self::query_records(&conn, &sql, params_from_iter(filter.values.iter()))?;

        Ok(Page {
            items,
            total: total.max(0) as u64,
            offset: query.offset,
            limit: query.limit,
        })
    }

    fn count_by(
        &self,
        tenant_id: &str,
        dimension: CountDimension,
        range: &TimeRange,
    ) -> LedgerResult<BTreeMap<String, u64>> {
        let column = match dimension {
            CountDimension::ActionType => "action_type",
            CountDimension::ResourceType => "resource_type",
            CountDimension::ActorId => "actor_id",
        };
        let filter = Filter::tenant(tenant_id).range(range);
        let sql = format!(
            "SELECT {column}, COUNT(*) FROM events WHERE {} GROUP BY {column}",
            filter.sql()
        );

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(sql_error("failed to prepare count"))?;
        let counts = stmt
            .query_map(params_from_iter(filter.values.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(sql_error("failed to run count"))?
            .map(|row| row.map(|(key, count)| (key, count.max(0) as u64)))
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map_err(sql_error("failed to read count"))?;
        Ok(counts)
    }

    fn tenant_ids(&self) -> LedgerResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT DISTINCT tenant_id FROM events ORDER BY tenant_id")
            .map_err(sql_error("failed to prepare tenant listing"))?;
        let tenants = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(sql_error("failed to list tenants"))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_error("failed to read tenant"))?;
        Ok(tenants)
    }

    fn delete_by_tenant_id(&self, tenant_id: &str) -> LedgerResult<u64> {
        let conn = self.conn.lock();
        let removed = conn
            .execute("DELETE FROM events WHERE tenant_id = ?1", params![tenant_id])
            .map_err(sql_error("failed to delete tenant events"))?;
        info!(tenant_id = %tenant_id, removed, "tenant records deleted from sqlite");
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use auditchain_contracts::event::{
        Action, ActionType, Actor, ActorType, EventBody, EventMetadata, NewEvent, Resource,
        ResourceType,
    };
    use auditchain_core::ImmutableStore;
    use std::sync::Arc;

    use super::*;

    fn full_event(tenant: &str) -> NewEvent {
        let mut actor = Actor::new("u-1", ActorType::Service, "Billing");
        actor.ip = Some("10.0.0.7".into());
        actor.attributes.insert("team".into(), "payments".into());

        let mut action = Action::new(ActionType::Update);
        action.description = Some("raise limit".into());

        let mut resource = Resource::new("acct-9", ResourceType::Transaction, "Main account");
        resource.before = json!({"limit": 100, "flags": {"b": true, "a": null}})
            .as_object()
            .map(|m| m.clone().into_iter().collect());
        resource.after = json!({"limit": 250.5}).as_object().map(|m| m.clone().into_iter().collect());

        let mut metadata = EventMetadata::new("api", tenant);
        metadata.correlation_id = Some("corr-1".into());
        metadata.tags = Some([("env".to_string(), "prod".to_string())].into_iter().collect());

        NewEvent::new(EventBody {
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap()
                + chrono::Duration::nanoseconds(123_456_789),
            actor,
            action,
            resource,
            metadata,
        })
        .with_signature("sig-abc")
    }

    #[test]
    fn test_row_mapping_preserves_every_field_and_the_hash() {
        let repo = Arc::new(SqliteEventRepository::open_in_memory().unwrap());
        let store = ImmutableStore::new(repo.clone());

        let stored = store.store(full_event("t1")).unwrap();
        let loaded = repo.find_by_id(stored.id()).unwrap().unwrap();

        assert_eq!(loaded, stored);
        assert!(store.verify_integrity(stored.id()).unwrap());
        assert_eq!(repo.find_by_hash(stored.hash()).unwrap(), Some(stored));
    }

    #[test]
    fn test_empty_database_has_no_heads() {
        let repo = SqliteEventRepository::open_in_memory().unwrap();
        assert_eq!(repo.head("t1").unwrap(), None);
        assert!(repo.tenant_ids().unwrap().is_empty());
        assert!(repo.find_by_id(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_unique_position_rejects_a_second_genesis() {
        let repo = Arc::new(SqliteEventRepository::open_in_memory().unwrap());
        let store = ImmutableStore::new(repo.clone());
        let first = store.store(full_event("t1")).unwrap();

        let mut parts = first.into_parts();
        parts.id = Uuid::new_v4();
        let err = repo.append(&[EventRecord::from_parts(parts)]).unwrap_err();
        assert!(matches!(err, LedgerError::ChainConflict { .. }));
        assert_eq!(repo.find_all_by_tenant_for_chain_verification("t1").unwrap().len(), 1);
    }

    #[test]
    fn test_failed_batch_leaves_nothing_behind() {
        let repo = Arc::new(SqliteEventRepository::open_in_memory().unwrap());
        let store = ImmutableStore::new(repo.clone());
        let existing = store.store(full_event("t1")).unwrap();

        // Second record reuses an existing primary key; the whole unit rolls back.
        let batch = vec![full_event("t1"), full_event("t1").with_id(existing.id())];
        let err = store.store_batch(batch).unwrap_err();
        assert!(matches!(err, LedgerError::Persistence { .. }));

        assert_eq!(repo.head("t1").unwrap(), Some(existing.as_head()));
        assert!(store.verify_tenant("t1").unwrap().is_valid());
    }

    /// Floats whose shortest form parses back inexactly without
    /// `float_roundtrip` must still rehash to the stored value.
    #[test]
    fn test_hard_float_survives_round_trip_and_verifies() {
        let repo = Arc::new(SqliteEventRepository::open_in_memory().unwrap());
        let store = ImmutableStore::new(repo.clone());

        let mut event = full_event("t1");
        event.body.resource.after = json!({"amount": 1.0715660391465826e-75, "ratio": 0.1})
            .as_object()
            .map(|m| m.clone().into_iter().collect());
        let stored = store.store(event).unwrap();
        store.store(full_event("t1")).unwrap();

        let loaded = repo.find_by_id(stored.id()).unwrap().unwrap();
        assert_eq!(loaded, stored);
        assert!(store.verify_integrity(stored.id()).unwrap());
        assert!(store.verify_tenant("t1").unwrap().is_valid());
    }

    /// Years without a four-digit RFC 3339 form never reach the table.
    #[test]
    fn test_out_of_range_year_is_rejected_before_writing() {
        let repo = Arc::new(SqliteEventRepository::open_in_memory().unwrap());
        let store = ImmutableStore::new(repo.clone());

        let mut event = full_event("t1");
        event.body.timestamp = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap();
        let err = store.store(event).unwrap_err();
        assert!(matches!(err, LedgerError::Validation { .. }));

        store.store(full_event("t1")).unwrap();
        assert_eq!(repo.find_all_by_tenant_for_chain_verification("t1").unwrap().len(), 1);
        assert!(store.verify_tenant("t1").unwrap().is_valid());
    }

    #[test]
    fn test_limit_beyond_i64_is_clamped() {
        let repo = Arc::new(SqliteEventRepository::open_in_memory().unwrap());
        let store = ImmutableStore::new(repo.clone());
        store.store(full_event("t1")).unwrap();
        store.store(full_event("t1")).unwrap();

        let query = EventQuery {
            limit: usize::MAX,
            ..EventQuery::default()
        };
        let page = repo.find_by_tenant("t1", &query).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 2);
    }
}
