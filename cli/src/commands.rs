//! Subcommand implementations.
//!
//! Each command takes an opened `ImmutableStore` and returns the text to
//! print, so the binary only decides where output goes and how to exit.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use auditchain_chain::GENESIS_HASH;
use auditchain_config::{LedgerConfig, StorageBackend};
use auditchain_contracts::{
    error::{LedgerError, LedgerResult},
    event::{ActionType, EventRecord, ResourceType},
    query::{CountDimension, EventQuery, TimeRange},
};
use auditchain_core::{EventRepository, ImmutableStore};
use auditchain_ingest::SubmissionParser;
use auditchain_storage::{InMemoryEventRepository, SqliteEventRepository};

/// Build the repository named by `config` and wrap it in a store.
pub fn open_store(config: &LedgerConfig) -> LedgerResult<ImmutableStore> {
    let repository: Arc<dyn EventRepository> = match config.storage.backend {
        StorageBackend::Memory => {
            warn!("using the in-memory backend; nothing outlives this process");
            Arc::new(InMemoryEventRepository::new())
        }
        StorageBackend::Sqlite => {
            let path = config.storage.path.as_ref().ok_or_else(|| LedgerError::Config {
                reason: "storage.path is required for the sqlite backend".to_string(),
            })?;
            Arc::new(SqliteEventRepository::open(path, config.storage.busy_timeout())?)
        }
    };
    Ok(ImmutableStore::with_lock_timeout(
        repository,
        config.chain.lock_timeout(),
    ))
}

/// Filters and paging for `list`.
pub struct ListFilter {
    pub actor: Option<String>,
    pub action: Option<ActionType>,
    pub resource_type: Option<ResourceType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub offset: usize,
    pub limit: usize,
}

fn to_json<T: serde::Serialize>(value: &T) -> LedgerResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| LedgerError::Persistence {
        reason: format!("failed to render output: {}", e),
    })
}

// ── ingest ────────────────────────────────────────────────────────────────────

pub fn ingest(store: &ImmutableStore, file: &Path) -> LedgerResult<String> {
    let input = std::fs::read_to_string(file).map_err(|e| LedgerError::Validation {
        reason: format!("failed to read '{}': {}", file.display(), e),
    })?;
    let events = SubmissionParser::new()?.parse_str(&input)?;
    let records = store.store_batch(events)?;

    info!(file = %file.display(), stored = records.len(), "ingest complete");
    let mut out = String::new();
    for record in &records {
        let _ = writeln!(
            out,
            "{}  {}  #{}  {}",
            record.id(),
            record.tenant_id(),
            record.sequence(),
            record.hash()
        );
    }
    let _ = write!(out, "stored {} event(s)", records.len());
    Ok(out)
}

// ── verify ────────────────────────────────────────────────────────────────────

/// Verify one tenant, or every tenant when `tenant` is `None`.
///
/// Every chain is reported.  The flag is `false` when any chain is broken.
pub fn verify(store: &ImmutableStore, tenant: Option<&str>) -> LedgerResult<(String, bool)> {
    let tenants = match tenant {
        Some(tenant) => vec![tenant.to_string()],
        None => store.repository().tenant_ids()?,
    };

    let mut out = String::new();
    let mut broken = 0;
    for tenant_id in &tenants {
        let report = store.verify_tenant(tenant_id)?;
        match &report.first_break {
            None => {
                let _ = writeln!(out, "{tenant_id}: OK ({} records)", report.total);
            }
            Some(chain_break) => {
                broken += 1;
                let _ = writeln!(
                    out,
                    "{tenant_id}: BROKEN after {}/{} records: {chain_break}",
                    report.verified, report.total
                );
            }
        }
    }

    let _ = write!(out, "{} chain(s) verified, {} broken", tenants.len(), broken);
    Ok((out, broken == 0))
}

// ── check / show / head ───────────────────────────────────────────────────────

pub fn check(store: &ImmutableStore, id: Uuid) -> LedgerResult<String> {
    let record = store.find_by_id(id)?.ok_or_else(|| LedgerError::NotFound {
        what: format!("event {id}"),
    })?;
    if store.verify_integrity(id)? {
        Ok(format!("{id}: intact"))
    } else {
        Err(LedgerError::IntegrityViolation {
            tenant_id: record.tenant_id().to_string(),
            reason: format!("stored hash of {id} does not match its contents"),
        })
    }
}

/// Look an event up by id, falling back to hash.
pub fn show(store: &ImmutableStore, key: &str) -> LedgerResult<String> {
    let found = match Uuid::parse_str(key) {
        Ok(id) => store.find_by_id(id)?,
        Err(_) => store.repository().find_by_hash(key)?,
    };
    let record: EventRecord = found.ok_or_else(|| LedgerError::NotFound {
        what: format!("event '{key}'"),
    })?;
    to_json(&record)
}

pub fn head(store: &ImmutableStore, tenant: &str) -> LedgerResult<String> {
    Ok(match store.chain().head(tenant)? {
        Some(head) => format!("{tenant}: #{} {}", head.sequence, head.hash),
        None => format!("{tenant}: empty ({GENESIS_HASH})"),
    })
}

// ── list / stats ──────────────────────────────────────────────────────────────

pub fn list(store: &ImmutableStore, tenant: &str, filter: ListFilter) -> LedgerResult<String> {
    let query = EventQuery {
        actor_id: filter.actor,
        action_type: filter.action,
        resource_type: filter.resource_type,
        range: TimeRange {
            from: filter.from,
            to: filter.to,
        },
        offset: filter.offset,
        limit: filter.limit,
    };
    let page = store.repository().find_by_tenant(tenant, &query)?;

    let mut out = String::new();
    for record in &page.items {
        let _ = writeln!(
            out,
            "{}  {}  {:<8} {:<12} {}/{}  {}",
            record.timestamp().to_rfc3339(),
            record.id(),
            record.action().action_type.as_str(),
            record.actor().id,
            record.resource().resource_type,
            record.resource().id,
            record.metadata().correlation_id.as_deref().unwrap_or("-"),
        );
    }
    let _ = write!(
        out,
        "showing {}..{} of {}",
        page.offset,
        page.offset + page.items.len(),
        page.total
    );
    Ok(out)
}

pub fn stats(
    store: &ImmutableStore,
    tenant: &str,
    by: CountDimension,
    range: TimeRange,
) -> LedgerResult<String> {
    let counts = store.repository().count_by(tenant, by, &range)?;
    let mut out = format!("{tenant} by {by}:");
    for (key, count) in &counts {
        let _ = write!(out, "\n  {key:<20} {count}");
    }
    if counts.is_empty() {
        out.push_str("\n  (no events)");
    }
    Ok(out)
}

// ── purge ─────────────────────────────────────────────────────────────────────

pub fn purge(store: &ImmutableStore, tenant: &str, confirmed: bool) -> LedgerResult<String> {
    if !confirmed {
        return Err(LedgerError::Validation {
            reason: format!("purging '{tenant}' deletes its whole chain; pass --yes to confirm"),
        });
    }
    let removed = store.purge_tenant(tenant)?;
    Ok(format!("{tenant}: removed {removed} event(s)"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn memory_store() -> ImmutableStore {
        ImmutableStore::new(Arc::new(InMemoryEventRepository::new()))
    }

    fn write_submissions(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("events.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    const TWO_EVENTS: &str = r#"[
        { "actor": { "id": "alice", "type": "user" },
          "action": { "type": "login" },
          "resource": { "id": "portal", "type": "api" },
          "metadata": { "source": "web", "tenantId": "acme" } },
        { "actor": { "id": "alice", "type": "user" },
          "action": { "type": "export" },
          "resource": { "id": "report-1", "type": "file" },
          "metadata": { "source": "web", "tenantId": "acme" } }
    ]"#;

    #[test]
    fn test_ingest_then_verify_and_head() {
        let dir = tempfile::tempdir().unwrap();
        let store = memory_store();

        let out = ingest(&store, &write_submissions(&dir, TWO_EVENTS)).unwrap();
        assert!(out.ends_with("stored 2 event(s)"), "got: {out}");

        let (out, ok) = verify(&store, None).unwrap();
        assert!(ok);
        assert!(out.contains("acme: OK (2 records)"), "got: {out}");

        let out = head(&store, "acme").unwrap();
        assert!(out.starts_with("acme: #1 "), "got: {out}");
        assert_eq!(head(&store, "nobody").unwrap(), "nobody: empty (GENESIS)");
    }

    #[test]
    fn test_show_by_id_and_hash_and_check() {
        let dir = tempfile::tempdir().unwrap();
        let store = memory_store();
        ingest(&store, &write_submissions(&dir, TWO_EVENTS)).unwrap();
        let record = store
            .repository()
            .find_all_by_tenant_for_chain_verification("acme")
            .unwrap()
            .remove(0);

        let by_id = show(&store, &record.id().to_string()).unwrap();
        let by_hash = show(&store, record.hash()).unwrap();
        assert_eq!(by_id, by_hash);
        assert!(by_id.contains("\"tenant_id\": \"acme\""), "got: {by_id}");

        assert!(check(&store, record.id()).unwrap().ends_with("intact"));
        assert!(matches!(
            check(&store, Uuid::new_v4()),
            Err(LedgerError::NotFound { .. })
        ));
        assert!(matches!(show(&store, "missing"), Err(LedgerError::NotFound { .. })));
    }

    #[test]
    fn test_list_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let store = memory_store();
        ingest(&store, &write_submissions(&dir, TWO_EVENTS)).unwrap();

        let out = list(
            &store,
            "acme",
            ListFilter {
                actor: None,
                action: Some(ActionType::Export),
                resource_type: None,
                from: None,
                to: None,
                offset: 0,
                limit: 10,
            },
        )
        .unwrap();
        assert!(out.contains("report-1"), "got: {out}");
        assert!(!out.contains("portal"), "got: {out}");
        assert!(out.ends_with("showing 0..1 of 1"), "got: {out}");

        let out = stats(&store, "acme", CountDimension::ResourceType, TimeRange::default()).unwrap();
        assert!(out.contains("API"), "got: {out}");
        assert!(out.contains("FILE"), "got: {out}");
    }

    #[test]
    fn test_purge_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let store = memory_store();
        ingest(&store, &write_submissions(&dir, TWO_EVENTS)).unwrap();

        assert!(matches!(
            purge(&store, "acme", false),
            Err(LedgerError::Validation { .. })
        ));
        assert_eq!(purge(&store, "acme", true).unwrap(), "acme: removed 2 event(s)");
        assert_eq!(head(&store, "acme").unwrap(), "acme: empty (GENESIS)");
    }

    #[test]
    fn test_invalid_file_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = memory_store();
        let path = write_submissions(&dir, r#"[{ "actor": { "id": "x" } }]"#);

        assert!(matches!(ingest(&store, &path), Err(LedgerError::Validation { .. })));
        assert!(store.repository().tenant_ids().unwrap().is_empty());
    }

    #[test]
    fn test_open_store_uses_configured_sqlite_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LedgerConfig::default();
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.path = Some(dir.path().join("events.db"));

        let store = open_store(&config).unwrap();
        ingest(&store, &write_submissions(&dir, TWO_EVENTS)).unwrap();
        drop(store);

        let reopened = open_store(&config).unwrap();
        let (out, ok) = verify(&reopened, Some("acme")).unwrap();
        assert!(ok && out.contains("OK (2 records)"), "got: {out}");
    }
}
