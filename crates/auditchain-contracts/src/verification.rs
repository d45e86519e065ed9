//! Chain verification reports.
//!
//! Verification is a read-only diagnostic.  A broken chain is reported as a
//! value, with the earliest break point, rather than raised as an error.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

/// What was wrong with the record at the break point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreakKind {
    /// The first record does not link to the genesis sentinel.
    GenesisMismatch { found: String },
    /// The record's `previous_hash` is not the preceding record's `hash`.
    LinkMismatch { expected: String, found: String },
    /// The stored `hash` differs from the hash recomputed from the record.
    HashMismatch { stored: String, recomputed: String },
}

impl fmt::Display for BreakKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakKind::GenesisMismatch { found } => {
                write!(f, "first record links to '{found}' instead of genesis")
            }
            BreakKind::LinkMismatch { expected, found } => {
                write!(f, "previous_hash '{found}' does not match preceding hash '{expected}'")
            }
            BreakKind::HashMismatch { stored, recomputed } => {
                write!(f, "stored hash '{stored}' does not match recomputed '{recomputed}'")
            }
        }
    }
}

/// The earliest point at which a chain stops verifying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBreak {
    /// Position in the verified sequence (0-based).
    pub index: usize,
    pub event_id: Uuid,
    pub kind: BreakKind,
}

impl fmt::Display for ChainBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record #{} ({}): {}", self.index, self.event_id, self.kind)
    }
}

/// Outcome of walking a chain in append order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    /// Records that verified before the walk stopped.
    pub verified: usize,
    /// Total records handed to the walk.
    pub total: usize,
    /// `None` when the whole chain verified.
    pub first_break: Option<ChainBreak>,
}

impl ChainVerification {
    pub fn is_valid(&self) -> bool {
        self.first_break.is_none()
    }

    /// Convert a failed report into `LedgerError::IntegrityViolation`.
    ///
    /// Returns the number of verified records on success.
    pub fn into_result(self, tenant_id: &str) -> LedgerResult<usize> {
        match self.first_break {
            None => Ok(self.verified),
            Some(chain_break) => Err(LedgerError::IntegrityViolation {
                tenant_id: tenant_id.to_string(),
                reason: chain_break.to_string(),
            }),
        }
    }
}
