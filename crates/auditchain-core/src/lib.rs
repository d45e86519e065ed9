//! # auditchain-core
//!
//! The append engine of the auditchain store.
//!
//! This crate provides:
//! - `EventRepository`, the persistence seam adapters implement
//! - `ChainGuard`, per-tenant mutual exclusion with a bounded wait
//! - `HashChainService`, head lookup and verification over a repository
//! - `ImmutableStore`, which wires them into `store` / `store_batch`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use auditchain_core::ImmutableStore;
//! use auditchain_storage::InMemoryEventRepository;
//!
//! let store = ImmutableStore::new(Arc::new(InMemoryEventRepository::new()));
//! let record = store.store(new_event)?;
//! assert!(store.verify_integrity(record.id())?);
//! ```

pub mod guard;
pub mod service;
pub mod store;
pub mod traits;

pub use guard::{ChainGuard, TenantLease, DEFAULT_LOCK_TIMEOUT};
pub use service::HashChainService;
pub use store::ImmutableStore;
pub use traits::{check_extends_head, EventRepository};

// ── Tests ─────────────────────────────────────────────────────────────────────
