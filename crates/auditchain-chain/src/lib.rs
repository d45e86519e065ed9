//! # auditchain-chain
//!
//! Tamper-evidence primitives for auditchain tenant chains.
//!
//! ## Overview
//!
//! Each stored event links to its predecessor via `previous_hash`, and its
//! own `hash` is SHA-256 over a canonical byte encoding of the event body plus
//! that link.  Altering any hashed field or any stored hash is detected by
//! `verify_chain`, and a single record can be spot-checked with
//! `record_hash_matches`.
//!
//! The byte layout lives in [`canonical`] and is a versioned contract.

pub mod canonical;
pub mod chain;

pub use chain::{compute_hash, record_hash_matches, verify_chain, verify_chain_report, GENESIS_HASH};

// ── Tests ─────────────────────────────────────────────────────────────────────
