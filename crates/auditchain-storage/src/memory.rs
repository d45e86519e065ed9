//! In-memory implementation of `EventRepository`.
//!
//! `InMemoryEventRepository` is the reference adapter.  It keeps each
//! tenant's chain in a `Vec` in append order, plus an id index, all behind
//! one `RwLock`.  An append takes the write lock, so reading the head,
//! checking linkage, and pushing the records form one atomic unit.
//!
//! Nothing survives the process.  Use it in tests and for the `memory`
//! storage backend.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use auditchain_contracts::{
    error::{LedgerError, LedgerResult},
    event::{ChainHead, EventRecord},
    query::{CountDimension, EventQuery, Page, TimeRange},
};
use auditchain_core::traits::{check_extends_head, EventRepository};

// ── Internal mutable state ────────────────────────────────────────────────────

pub(crate) struct InMemoryState {
    /// Tenant chains in strict append order.
    pub(crate) chains: HashMap<String, Vec<EventRecord>>,

    /// Event id → (tenant, position in that tenant's chain).
    pub(crate) by_id: HashMap<Uuid, (String, usize)>,
}

impl InMemoryState {
    fn record(&self, tenant_id: &str, position: usize) -> Option<&EventRecord> {
        self.chains.get(tenant_id).and_then(|chain| chain.get(position))
    }

    fn all_records(&self) -> impl Iterator<Item = &EventRecord> {
        self.chains.values().flatten()
    }
}

// ── Public repository ─────────────────────────────────────────────────────────

/// Process-local event storage.  Cheap to clone; clones share state.
#[derive(Clone)]
pub struct InMemoryEventRepository {
    pub(crate) state: Arc<RwLock<InMemoryState>>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryState {
                chains: HashMap::new(),
                by_id: HashMap::new(),
            })),
        }
    }

    /// Total number of stored events across all tenants.
    pub fn len(&self) -> usize {
        self.state.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

// ── EventRepository impl ──────────────────────────────────────────────────────

impl EventRepository for InMemoryEventRepository {
    fn head(&self, tenant_id: &str) -> LedgerResult<Option<ChainHead>> {
        let state = self.state.read();
        Ok(state
            .chains
            .get(tenant_id)
            .and_then(|chain| chain.last())
            .map(EventRecord::as_head))
    }

    fn append(&self, records: &[EventRecord]) -> LedgerResult<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let tenant_id = first.tenant_id().to_string();

        let mut state = self.state.write();

        let head = state
            .chains
            .get(&tenant_id)
            .and_then(|chain| chain.last())
            .map(EventRecord::as_head);
        check_extends_head(head.as_ref(), records)?;

        let mut seen = HashSet::with_capacity(records.len());
        for record in records {
            if state.by_id.contains_key(&record.id()) || !seen.insert(record.id()) {
                return Err(LedgerError::persistence(format!(
                    "duplicate event id {}",
                    record.id()
                )));
            }
        }

        let chain = state.chains.entry(tenant_id.clone()).or_default();
        let start = chain.len();
        chain.extend(records.iter().cloned());
        for (offset, record) in records.iter().enumerate() {
            state
                .by_id
                .insert(record.id(), (tenant_id.clone(), start + offset));
        }

        debug!(tenant_id = %tenant_id, count = records.len(), "records committed to memory");
        Ok(())
    }

    fn find_by_id(&self, id: Uuid) -> LedgerResult<Option<EventRecord>> {
        let state = self.state.read();
        Ok(state
            .by_id
            .get(&id)
            .and_then(|(tenant_id, position)| state.record(tenant_id, *position))
            .cloned())
    }

    fn find_by_hash(&self, hash: &str) -> LedgerResult<Option<EventRecord>> {
        let state = self.state.read();
        let found = state.all_records().find(|r| r.hash() == hash).cloned();
        Ok(found)
    }

    fn find_by_correlation_id(&self, correlation_id: &str) -> LedgerResult<Vec<EventRecord>> {
        let state = self.state.read();
        let mut found: Vec<EventRecord> = state
            .all_records()
            .filter(|r| r.metadata().correlation_id.as_deref() == Some(correlation_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        Ok(found)
    }

    fn find_all_by_tenant_for_chain_verification(
        &self,
        tenant_id: &str,
    ) -> LedgerResult<Vec<EventRecord>> {
        let state = self.state.read();
        Ok(state.chains.get(tenant_id).cloned().unwrap_or_default())
    }

    fn find_by_tenant(
        &self,
        tenant_id: &str,
        query: &EventQuery,
    ) -> LedgerResult<Page<EventRecord>> {
        let state = self.state.read();
        let mut matched: Vec<&EventRecord> = state
            .chains
            .get(tenant_id)
            .map(|chain| chain.iter().filter(|r| query.matches(r)).collect())
            .unwrap_or_default();

        // Newest first; later appends win ties.
        matched.sort_by(|a, b| {
            b.timestamp()
                .cmp(&a.timestamp())
                .then(b.sequence().cmp(&a.sequence()))
        });

        Ok(Page {
            total: matched.len() as u64,
            items: matched
                .into_iter()
                .skip(query.offset)
                .take(query.limit)
                .cloned()
                .collect(),
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
        let state = self.state.read();
        let mut counts = BTreeMap::new();
        for record in state.chains.get(tenant_id).into_iter().flatten() {
            if range.contains(record.timestamp()) {
                *counts.entry(dimension.key_of(record)).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    fn tenant_ids(&self) -> LedgerResult<Vec<String>> {
        let state = self.state.read();
        let mut tenants: Vec<String> = state
            .chains
            .iter()
            .filter(|(_, chain)| !chain.is_empty())
            .map(|(tenant_id, _)| tenant_id.clone())
            .collect();
        tenants.sort();
        Ok(tenants)
    }

    fn delete_by_tenant_id(&self, tenant_id: &str) -> LedgerResult<u64> {
        let mut state = self.state.write();
        let removed = state.chains.remove(tenant_id).unwrap_or_default();
        for record in &removed {
            state.by_id.remove(&record.id());
        }
        info!(tenant_id = %tenant_id, removed = removed.len(), "tenant records deleted from memory");
        Ok(removed.len() as u64)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use auditchain_contracts::event::{
        Action, ActionType, Actor, ActorType, ChainLink, EventBody, EventMetadata, NewEvent,
        Resource, ResourceType,
    };
    use auditchain_core::ImmutableStore;

    use super::*;

    fn event(tenant: &str, actor: &str, action: ActionType, minute: i64) -> NewEvent {
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut metadata = EventMetadata::new("test", tenant);
        metadata.correlation_id = Some(format!("corr-{actor}"));
        NewEvent::new(EventBody {
            timestamp: base + Duration::minutes(minute),
            actor: Actor::new(actor, ActorType::User, actor.to_uppercase()),
            action: Action::new(action),
            resource: Resource::new("doc-1", ResourceType::Document, "Report"),
            metadata,
        })
    }

    fn setup() -> (Arc<InMemoryEventRepository>, ImmutableStore) {
        let repo = Arc::new(InMemoryEventRepository::new());
        let store = ImmutableStore::new(repo.clone());
        (repo, store)
    }

    // ── Append and lookup ─────────────────────────────────────────────────────

    #[test]
    fn test_append_then_lookup_by_id_and_hash() {
        let (repo, store) = setup();
        let record = store.store(event("t1", "alice", ActionType::Create, 0)).unwrap();

        assert_eq!(repo.len(), 1);
        assert_eq!(repo.find_by_id(record.id()).unwrap(), Some(record.clone()));
        assert_eq!(repo.find_by_hash(record.hash()).unwrap(), Some(record.clone()));
        assert_eq!(repo.find_by_hash("nope").unwrap(), None);
        assert_eq!(repo.head("t1").unwrap(), Some(record.as_head()));
        assert_eq!(repo.head("t2").unwrap(), None);
    }

    #[test]
    fn test_duplicate_id_is_rejected_and_nothing_written() {
        let (repo, store) = setup();
        let id = Uuid::new_v4();
        store.store(event("t1", "alice", ActionType::Create, 0).with_id(id)).unwrap();

        let err = store
            .store(event("t1", "bob", ActionType::Read, 1).with_id(id))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Persistence { .. }));
        assert_eq!(repo.len(), 1);
        assert_eq!(repo.head("t1").unwrap().unwrap().sequence, 0);
    }

    #[test]
    fn test_stale_append_is_a_chain_conflict() {
        let (repo, store) = setup();
        let first = store.store(event("t1", "alice", ActionType::Create, 0)).unwrap();
        store.store(event("t1", "alice", ActionType::Update, 1)).unwrap();

        // A second writer that still believes `first` is the head.
        let stale = event("t1", "mallory", ActionType::Delete, 2).seal(
            Uuid::new_v4(),
            ChainLink {
                sequence: 1,
                previous_hash: first.hash().to_string(),
                hash: "f".repeat(64),
            },
            Utc::now(),
        );
        let err = repo.append(&[stale]).unwrap_err();
        assert!(matches!(err, LedgerError::ChainConflict { .. }));
        assert_eq!(repo.len(), 2);
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    #[test]
    fn test_find_by_tenant_filters_and_pages_newest_first() {
        let (repo, store) = setup();
        for minute in 0..5 {
            store.store(event("t1", "alice", ActionType::Read, minute)).unwrap();
        }
        store.store(event("t1", "bob", ActionType::Delete, 10)).unwrap();
        store.store(event("t2", "alice", ActionType::Read, 20)).unwrap();

        let page = repo
            .find_by_tenant(
                "t1",
                &EventQuery {
                    actor_id: Some("alice".into()),
                    offset: 1,
                    limit: 2,
                    ..EventQuery::default()
                },
            )
            .unwrap();
        assert_eq!(page.total, 5);
        let sequences: Vec<u64> = page.items.iter().map(|r| r.sequence()).collect();
        assert_eq!(sequences, vec![3, 2]);

        let deletes = repo
            .find_by_tenant(
                "t1",
                &EventQuery {
                    action_type: Some(ActionType::Delete),
                    ..EventQuery::default()
                },
            )
            .unwrap();
        assert_eq!(deletes.total, 1);
        assert_eq!(deletes.items[0].actor().id, "bob");
    }

    #[test]
    fn test_find_by_correlation_id_is_newest_first_across_tenants() {
        let (repo, store) = setup();
        store.store(event("t1", "alice", ActionType::Login, 0)).unwrap();
        store.store(event("t2", "alice", ActionType::Logout, 5)).unwrap();
        store.store(event("t1", "bob", ActionType::Login, 9)).unwrap();

        let found = repo.find_by_correlation_id("corr-alice").unwrap();
        let actions: Vec<ActionType> = found.iter().map(|r| r.action().action_type).collect();
        assert_eq!(actions, vec![ActionType::Logout, ActionType::Login]);
    }

    #[test]
    fn test_count_by_respects_range() {
        let (repo, store) = setup();
        store.store(event("t1", "alice", ActionType::Read, 0)).unwrap();
        store.store(event("t1", "alice", ActionType::Read, 1)).unwrap();
        store.store(event("t1", "bob", ActionType::Update, 2)).unwrap();

        let all = repo
            .count_by("t1", CountDimension::ActorId, &TimeRange::default())
            .unwrap();
        assert_eq!(all.get("alice"), Some(&2));
        assert_eq!(all.get("bob"), Some(&1));

        let base = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let late = repo
            .count_by(
                "t1",
                CountDimension::ActionType,
                &TimeRange {
                    from: Some(base + Duration::minutes(1)),
                    to: None,
                },
            )
            .unwrap();
        assert_eq!(late.get("READ"), Some(&1));
        assert_eq!(late.get("UPDATE"), Some(&1));
    }

    #[test]
    fn test_delete_by_tenant_clears_index_and_head() {
        let (repo, store) = setup();
        let gone = store.store(event("t1", "alice", ActionType::Create, 0)).unwrap();
        store.store(event("t2", "bob", ActionType::Create, 0)).unwrap();
        assert_eq!(repo.tenant_ids().unwrap(), vec!["t1", "t2"]);

        assert_eq!(repo.delete_by_tenant_id("t1").unwrap(), 1);
        assert_eq!(repo.find_by_id(gone.id()).unwrap(), None);
        assert_eq!(repo.head("t1").unwrap(), None);
        assert_eq!(repo.tenant_ids().unwrap(), vec!["t2"]);
        assert_eq!(repo.delete_by_tenant_id("t1").unwrap(), 0);
    }

    // ── Tamper detection ──────────────────────────────────────────────────────

    #[test]
    fn test_tampered_record_is_detected_by_store_and_chain() {
        let (repo, store) = setup();
        for minute in 0..3 {
            store.store(event("t1", "alice", ActionType::Update, minute)).unwrap();
        }

        let victim_id = {
            let mut state = repo.state.write();
            let chain = state.chains.get_mut("t1").unwrap();
            let mut parts = chain[1].clone().into_parts();
            parts.body.actor.id = "mallory".into();
            chain[1] = EventRecord::from_parts(parts);
            chain[1].id()
        };

        assert!(!store.verify_integrity(victim_id).unwrap());
        let report = store.verify_tenant("t1").unwrap();
        assert_eq!(report.first_break.unwrap().index, 1);
    }
}
