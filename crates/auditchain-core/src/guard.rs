//! Per-tenant mutual exclusion for chain appends.
//!
//! `ChainGuard` owns one mutex per tenant, created on first use and kept for
//! the guard's lifetime.  A `TenantLease` is the proof that the holder is the
//! only in-process writer of that tenant's chain; dropping it releases the
//! lock on every exit path.  Tenants never contend with each other.
//!
//! Cross-process coordination is the repository's job (`EventRepository::append`
//! refuses records that do not extend the current head).

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{lock_api::ArcMutexGuard, Mutex, RawMutex};
use tracing::{debug, trace, warn};

use auditchain_contracts::error::{LedgerError, LedgerResult};

/// Lock wait bound used when none is configured.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Lazily populated map of tenant locks.
pub struct ChainGuard {
    locks: DashMap<String, Arc<Mutex<()>>>,
    timeout: Duration,
}

/// Exclusive right to append to one tenant chain.  Released on drop.
pub struct TenantLease {
    tenant_id: String,
    acquired_at: Instant,
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl TenantLease {
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }
}

impl Drop for TenantLease {
    fn drop(&mut self) {
        trace!(
            tenant_id = %self.tenant_id,
            held_us = self.acquired_at.elapsed().as_micros() as u64,
            "chain lock released"
        );
    }
}

impl ChainGuard {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of tenants that have had a lock created.
    pub fn tenant_count(&self) -> usize {
        self.locks.len()
    }

    /// Wait up to the configured bound for the tenant's lock.
    ///
    /// Returns `ConcurrencyTimeout` when the bound elapses.
    pub fn acquire(&self, tenant_id: &str) -> LedgerResult<TenantLease> {
        let lock = self.lock_for(tenant_id);
        let started = Instant::now();

        match lock.try_lock_arc_for(self.timeout) {
            Some(guard) => {
                debug!(
                    tenant_id = %tenant_id,
                    waited_us = started.elapsed().as_micros() as u64,
                    "chain lock acquired"
                );
                Ok(TenantLease {
                    tenant_id: tenant_id.to_string(),
                    acquired_at: Instant::now(),
                    _guard: guard,
                })
            }
            None => {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(tenant_id = %tenant_id, waited_ms, "timed out waiting for chain lock");
                Err(LedgerError::ConcurrencyTimeout {
                    tenant_id: tenant_id.to_string(),
                    waited_ms,
                })
            }
        }
    }

    /// The tenant's lock, created on first use.  The map entry is released
    /// before the caller blocks on the lock itself.
    fn lock_for(&self, tenant_id: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.get(tenant_id) {
            return Arc::clone(lock.value());
        }
        let entry = self.locks.entry(tenant_id.to_string()).or_default();
        Arc::clone(entry.value())
    }
}

impl Default for ChainGuard {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}
