//! Chain head lookup and verification against a repository.

use std::sync::Arc;

use tracing::{info, warn};

use auditchain_chain::{compute_hash, verify_chain, verify_chain_report, GENESIS_HASH};
use auditchain_contracts::{
    error::LedgerResult,
    event::{ChainHead, EventBody, EventRecord},
    verification::ChainVerification,
};

use crate::traits::EventRepository;

/// Hashing and verification bound to the repository that holds the chains.
pub struct HashChainService {
    repository: Arc<dyn EventRepository>,
}

impl HashChainService {
    pub fn new(repository: Arc<dyn EventRepository>) -> Self {
        Self { repository }
    }

    /// Hash of the tenant's most recent record, or `GENESIS_HASH` when the
    /// tenant has none.
    pub fn last_hash(&self, tenant_id: &str) -> LedgerResult<String> {
        Ok(self
            .repository
            .head(tenant_id)?
            .map(|head| head.hash)
            .unwrap_or_else(|| GENESIS_HASH.to_string()))
    }

    pub fn head(&self, tenant_id: &str) -> LedgerResult<Option<ChainHead>> {
        self.repository.head(tenant_id)
    }

    pub fn compute_hash(&self, body: &EventBody, previous_hash: &str) -> String {
        compute_hash(body, previous_hash)
    }

    /// Fail-fast walk over records given in append order.
    pub fn verify_chain(&self, records: &[EventRecord]) -> bool {
        verify_chain(records)
    }

    /// Load the tenant's chain in append order and verify it.
    pub fn verify_tenant(&self, tenant_id: &str) -> LedgerResult<ChainVerification> {
        let records = self
            .repository
            .find_all_by_tenant_for_chain_verification(tenant_id)?;
        let report = verify_chain_report(&records);

        match &report.first_break {
            None => info!(tenant_id = %tenant_id, records = report.total, "tenant chain verified"),
            Some(chain_break) => warn!(
                tenant_id = %tenant_id,
                index = chain_break.index,
                event_id = %chain_break.event_id,
                "tenant chain failed verification"
            ),
        }

        Ok(report)
    }
}
