//! Persistence adapters for auditchain.
//!
//! Both adapters implement `auditchain_core::EventRepository`:
//!
//! - `InMemoryEventRepository`: process-local, for tests and ephemeral use.
//! - `SqliteEventRepository`: durable, safe to share between processes.

pub mod memory;
mod row;
pub mod sqlite;

pub use memory::InMemoryEventRepository;
pub use sqlite::SqliteEventRepository;
