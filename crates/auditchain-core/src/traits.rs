//! The persistence seam of the store.
//!
//! `EventRepository` is the only trait an adapter implements.  The store owns
//! hashing and locking; the repository owns durability, ordering, and the
//! last line of defence against concurrent writers in other processes
//! (`append` must refuse records that do not extend the current head).

use std::collections::BTreeMap;

use uuid::Uuid;

use auditchain_chain::GENESIS_HASH;
use auditchain_contracts::{
    error::{LedgerError, LedgerResult},
    event::{ChainHead, EventRecord},
    query::{CountDimension, EventQuery, Page, TimeRange},
};

/// Durable, ordered storage of tenant chains.
pub trait EventRepository: Send + Sync {
    /// The last appended record's position and hash, or `None` for an empty
    /// chain.
    fn head(&self, tenant_id: &str) -> LedgerResult<Option<ChainHead>>;

    /// Append `records` as one atomic unit.
    ///
    /// All records belong to one tenant and are consecutive links.  The
    /// implementation must check, inside the same atomic unit, that the first
    /// record extends the current head (see `check_extends_head`) and return
    /// `ChainConflict` otherwise.  On any error nothing is visible.
    fn append(&self, records: &[EventRecord]) -> LedgerResult<()>;

    fn find_by_id(&self, id: Uuid) -> LedgerResult<Option<EventRecord>>;

    fn find_by_hash(&self, hash: &str) -> LedgerResult<Option<EventRecord>>;

    /// All events sharing `correlation_id`, newest `timestamp` first.
    fn find_by_correlation_id(&self, correlation_id: &str) -> LedgerResult<Vec<EventRecord>>;

    /// The tenant's whole chain in strict append order.
    fn find_all_by_tenant_for_chain_verification(
        &self,
        tenant_id: &str,
    ) -> LedgerResult<Vec<EventRecord>>;

    /// Filtered page of the tenant's events, newest `timestamp` first.
    fn find_by_tenant(&self, tenant_id: &str, query: &EventQuery)
        -> LedgerResult<Page<EventRecord>>;

    /// Event counts grouped along `dimension` within `range`.
    fn count_by(
        &self,
        tenant_id: &str,
        dimension: CountDimension,
        range: &TimeRange,
    ) -> LedgerResult<BTreeMap<String, u64>>;

    /// Every tenant with at least one stored event, sorted.
    fn tenant_ids(&self) -> LedgerResult<Vec<String>>;

    /// Compliance purge of a tenant's whole chain.  Returns the number of
    /// removed records.
    fn delete_by_tenant_id(&self, tenant_id: &str) -> LedgerResult<u64>;
}

/// Check that `records` form consecutive links of one tenant chain starting
/// right after `head`.
///
/// Adapters call this inside their atomic unit with the head they just read.
pub fn check_extends_head(head: Option<&ChainHead>, records: &[EventRecord]) -> LedgerResult<()> {
    let Some(first) = records.first() else {
        return Ok(());
    };
    let tenant_id = first.tenant_id();

    let (mut expected_seq, mut expected_prev) = match head {
        Some(head) => (head.sequence + 1, head.hash.as_str()),
        None => (0, GENESIS_HASH),
    };

    for record in records {
        if record.tenant_id() != tenant_id {
            return Err(LedgerError::persistence(format!(
                "append unit mixes tenants '{}' and '{}'",
                tenant_id,
                record.tenant_id()
            )));
        }
        if record.previous_hash() != expected_prev || record.sequence() != expected_seq {
            return Err(LedgerError::ChainConflict {
                tenant_id: tenant_id.to_string(),
                expected: format!("#{expected_seq} after '{expected_prev}'"),
                actual: format!("#{} after '{}'", record.sequence(), record.previous_hash()),
            });
        }
        expected_seq += 1;
        expected_prev = record.hash();
    }

    Ok(())
}
