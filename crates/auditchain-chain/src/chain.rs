//! Hash-chain primitives: hashing and chain integrity verification.
//!
//! Every record commits to its predecessor through `previous_hash`, and its
//! own `hash` is SHA-256 over the canonical encoding of its body plus that
//! `previous_hash` (see `canonical`).  Altering any hashed field, or any
//! stored hash, breaks verification at that record.

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use auditchain_contracts::{
    event::{EventBody, EventRecord},
    verification::{BreakKind, ChainBreak, ChainVerification},
};

use crate::canonical;

/// The `previous_hash` of the first record in every tenant chain.
pub const GENESIS_HASH: &str = "GENESIS";

/// Compute the SHA-256 hash of `body` linked to `previous_hash`.
///
/// Returns a lowercase 64-character hex string.
pub fn compute_hash(body: &EventBody, previous_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical::encode(body, previous_hash));
    hex::encode(hasher.finalize())
}

/// True when the stored hash of `record` matches its recomputed hash.
///
/// Local check only: linkage to neighbours is not examined.
pub fn record_hash_matches(record: &EventRecord) -> bool {
    compute_hash(record.body(), record.previous_hash()) == record.hash()
}

/// Verify a chain given in append order.
///
/// Returns `false` at the first record that fails either rule:
///
/// 1. **Linkage**: record 0 links to `GENESIS_HASH`; record i links to the
///    `hash` of record i-1.
/// 2. **Hash correctness**: the stored `hash` equals the recomputed one.
///
/// An empty chain is valid.
pub fn verify_chain(records: &[EventRecord]) -> bool {
    verify_chain_report(records).is_valid()
}

/// Like `verify_chain`, but reports where and why the chain first breaks.
pub fn verify_chain_report(records: &[EventRecord]) -> ChainVerification {
    let mut expected_prev = GENESIS_HASH;

    for (index, record) in records.iter().enumerate() {
        if record.previous_hash() != expected_prev {
            let kind = if index == 0 {
                BreakKind::GenesisMismatch {
                    found: record.previous_hash().to_string(),
                }
            } else {
                BreakKind::LinkMismatch {
                    expected: expected_prev.to_string(),
                    found: record.previous_hash().to_string(),
                }
            };
            return broken(records.len(), index, record, kind);
        }

        let recomputed = compute_hash(record.body(), record.previous_hash());
        if recomputed != record.hash() {
            let kind = BreakKind::HashMismatch {
                stored: record.hash().to_string(),
                recomputed,
            };
            return broken(records.len(), index, record, kind);
        }

        expected_prev = record.hash();
    }

    debug!(records = records.len(), "chain verified");
    ChainVerification {
        verified: records.len(),
        total: records.len(),
        first_break: None,
    }
}

fn broken(total: usize, index: usize, record: &EventRecord, kind: BreakKind) -> ChainVerification {
    warn!(
        tenant_id = %record.tenant_id(),
        event_id = %record.id(),
        index,
        reason = %kind,
        "hash chain broken"
    );
    ChainVerification {
        verified: index,
        total,
        first_break: Some(ChainBreak {
            index,
            event_id: record.id(),
            kind,
        }),
    }
}
