//! Local persistence adapters: durable sqlite store and an in-memory store
//! for tests and ephemeral runs.

pub mod memory;
pub mod sqlite_store;

pub use memory::MemoryStore;
pub use sqlite_store::SqliteStore;
