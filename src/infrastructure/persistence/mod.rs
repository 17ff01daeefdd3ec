//! Content store adapters
//!
//! Implementations of [`ContentStorePort`](crate::application::ports::outbound::ContentStorePort):
//! an in-memory store for tests and embedding, and a SQLite store for the
//! HTTP host.

mod memory_store;
mod sqlite_store;
mod store_support;

pub use memory_store::InMemoryContentStore;
pub use sqlite_store::SqliteContentStore;
