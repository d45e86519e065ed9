//! The immutable store: append orchestration and single-record checks.
//!
//! Append pipeline per tenant:
//!
//!   validate → acquire tenant lease → read head → hash + seal → persist → release
//!
//! Validation happens before the lease so malformed input never touches a
//! chain.  The lease is an RAII value, so every early return releases it.
//! The repository writes each tenant's slice as one atomic unit, so a failed
//! write leaves the head where it was.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use auditchain_chain::{compute_hash, record_hash_matches, GENESIS_HASH};
use auditchain_contracts::{
    error::LedgerResult,
    event::{ChainLink, EventRecord, NewEvent},
    verification::ChainVerification,
};

use crate::{
    guard::{ChainGuard, DEFAULT_LOCK_TIMEOUT},
    service::HashChainService,
    traits::EventRepository,
};

/// Appends events to per-tenant hash chains.
///
/// One instance per repository.  Safe to share across threads behind an
/// `Arc`; appends for different tenants run in parallel.
pub struct ImmutableStore {
    repository: Arc<dyn EventRepository>,
    chain: HashChainService,
    guard: ChainGuard,
}

impl ImmutableStore {
    /// Create a store with the default lock wait bound.
    pub fn new(repository: Arc<dyn EventRepository>) -> Self {
        Self::with_lock_timeout(repository, DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(repository: Arc<dyn EventRepository>, lock_timeout: Duration) -> Self {
        Self {
            chain: HashChainService::new(Arc::clone(&repository)),
            repository,
            guard: ChainGuard::new(lock_timeout),
        }
    }

    pub fn chain(&self) -> &HashChainService {
        &self.chain
    }

    pub fn guard(&self) -> &ChainGuard {
        &self.guard
    }

    /// Read access for downstream consumers (indexers, reporting).
    pub fn repository(&self) -> &Arc<dyn EventRepository> {
        &self.repository
    }

    /// Append one event to its tenant's chain and return the sealed record.
    ///
    /// # Errors
    ///
    /// `Validation` before any lock is taken; `ConcurrencyTimeout` when the
    /// tenant lock is busy past the bound; `ChainConflict` or `Persistence`
    /// from the repository, in which case nothing was written.
    pub fn store(&self, event: NewEvent) -> LedgerResult<EventRecord> {
        event.body.validate()?;

        let tenant_id = event.tenant_id().to_string();
        let _lease = self.guard.acquire(&tenant_id)?;

        let mut records = self.append_locked(&tenant_id, vec![event])?;
        Ok(records.remove(0))
    }

    /// Append several events, equivalent to calling `store` for each in order.
    ///
    /// Events are grouped by tenant.  Each tenant's group is appended under
    /// one lease as one atomic unit; groups are processed one after another in
    /// order of first appearance and leases are never nested.  If a later
    /// group fails, earlier groups stay committed.  The returned records are
    /// in input order.
    pub fn store_batch(&self, events: Vec<NewEvent>) -> LedgerResult<Vec<EventRecord>> {
        for event in &events {
            event.body.validate()?;
        }

        let total = events.len();
        let mut groups: Vec<(String, Vec<(usize, NewEvent)>)> = Vec::new();
        for (index, event) in events.into_iter().enumerate() {
            let tenant_id = event.tenant_id().to_string();
            match groups.iter_mut().find(|(t, _)| *t == tenant_id) {
                Some((_, members)) => members.push((index, event)),
                None => groups.push((tenant_id, vec![(index, event)])),
            }
        }

        let mut slots: Vec<Option<EventRecord>> = vec![None; total];
        for (tenant_id, members) in groups {
            let (positions, tenant_events): (Vec<usize>, Vec<NewEvent>) = members.into_iter().unzip();

            let _lease = self.guard.acquire(&tenant_id)?;
            let records = self.append_locked(&tenant_id, tenant_events)?;

            for (position, record) in positions.into_iter().zip(records) {
                slots[position] = Some(record);
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }

    /// Recompute one record's hash from its own fields and compare.
    ///
    /// Does not look at neighbouring records.  An unknown id yields `false`.
    pub fn verify_integrity(&self, id: Uuid) -> LedgerResult<bool> {
        let Some(record) = self.repository.find_by_id(id)? else {
            debug!(event_id = %id, "integrity check on unknown event");
            return Ok(false);
        };

        let intact = record_hash_matches(&record);
        if !intact {
            warn!(
                event_id = %id,
                tenant_id = %record.tenant_id(),
                sequence = record.sequence(),
                "stored hash does not match recomputed hash"
            );
        }
        Ok(intact)
    }

    /// Verify the tenant's whole chain.
    pub fn verify_tenant(&self, tenant_id: &str) -> LedgerResult<ChainVerification> {
        self.chain.verify_tenant(tenant_id)
    }

    pub fn find_by_id(&self, id: Uuid) -> LedgerResult<Option<EventRecord>> {
        self.repository.find_by_id(id)
    }

    /// Compliance purge.  Holds the tenant lease so no append interleaves;
    /// afterwards the tenant's head is back at genesis.
    pub fn purge_tenant(&self, tenant_id: &str) -> LedgerResult<u64> {
        let _lease = self.guard.acquire(tenant_id)?;
        let removed = self.repository.delete_by_tenant_id(tenant_id)?;
        info!(tenant_id = %tenant_id, removed, "tenant chain purged");
        Ok(removed)
    }

    /// Seal `events` as consecutive links after the current head and persist
    /// them.  Caller must hold the tenant's lease.
    fn append_locked(&self, tenant_id: &str, events: Vec<NewEvent>) -> LedgerResult<Vec<EventRecord>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let (mut sequence, mut previous_hash) = match self.chain.head(tenant_id)? {
            Some(head) => (head.sequence + 1, head.hash),
            None => (0, GENESIS_HASH.to_string()),
        };
        let created_at = Utc::now();

        let records: Vec<EventRecord> = events
            .into_iter()
            .map(|event| {
                let id = event.id.unwrap_or_else(Uuid::new_v4);
                let hash = compute_hash(&event.body, &previous_hash);
                let link = ChainLink {
                    sequence,
                    previous_hash: std::mem::replace(&mut previous_hash, hash.clone()),
                    hash,
                };
                sequence += 1;
                event.seal(id, link, created_at)
            })
            .collect();

        self.repository.append(&records)?;

        for record in &records {
            debug!(
                tenant_id = %tenant_id,
                event_id = %record.id(),
                sequence = record.sequence(),
                hash = %record.hash(),
                "event appended"
            );
        }
        info!(
            tenant_id = %tenant_id,
            appended = records.len(),
            head = %previous_hash,
            "tenant chain advanced"
        );

        Ok(records)
    }
}
