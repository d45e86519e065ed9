//! # auditchain-contracts
//!
//! Shared types for the auditchain store: the audit event model, the error
//! type, verification reports, and read-side query types.
//!
//! All crates in the workspace import from here.  No chain logic lives in
//! this crate, only data definitions and their small helpers.

pub mod error;
pub mod event;
pub mod query;
pub mod verification;
