//! Error types for the auditchain store.
//!
//! Every fallible operation returns `LedgerResult<T>`.  Variants carry enough
//! context (tenant, hashes, reason) to be logged and surfaced to callers
//! without further lookups.

use thiserror::Error;

/// The unified error type for the auditchain crates.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The submitted event is malformed.  Raised before any chain lock is
    /// taken, so the tenant's chain is never touched.
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// The tenant's chain lock could not be acquired within the configured
    /// bound.  Safe to retry.
    #[error("timed out after {waited_ms}ms waiting for the chain lock of tenant '{tenant_id}'")]
    ConcurrencyTimeout { tenant_id: String, waited_ms: u64 },

    /// Another writer advanced the tenant's head between the head read and
    /// the durable write.  Nothing was written; safe to retry.
    #[error("chain conflict for tenant '{tenant_id}': expected head '{expected}', found '{actual}'")]
    ChainConflict {
        tenant_id: String,
        expected: String,
        actual: String,
    },

    /// The durable write or read failed.  The tenant's head is unchanged.
    #[error("persistence failed: {reason}")]
    Persistence { reason: String },

    /// A verification pass found a stored record that does not match its
    /// recomputed hash or linkage.  Only produced when a caller explicitly
    /// converts a failed verification report into an error.
    #[error("integrity violation in tenant '{tenant_id}': {reason}")]
    IntegrityViolation { tenant_id: String, reason: String },

    /// A configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// A lookup that requires presence found nothing.
    #[error("not found: {what}")]
    NotFound { what: String },
}

impl LedgerError {
    /// True for failures caused by contention that a caller may retry as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::ConcurrencyTimeout { .. } | LedgerError::ChainConflict { .. }
        )
    }

    /// Shorthand for building a `Persistence` error from any displayable cause.
    pub fn persistence(reason: impl std::fmt::Display) -> Self {
        LedgerError::Persistence {
            reason: reason.to_string(),
        }
    }
}

/// Convenience alias used throughout the auditchain crates.
pub type LedgerResult<T> = Result<T, LedgerError>;
