//! In-memory document store backend for gatehouse.
//!
//! This crate provides an in-memory implementation of the `DocumentStore`
//! trait from `gatehouse-storage`, using papaya lock-free HashMap for
//! concurrent access. It backs the test suites and embedded deployments.
//!
//! # Example
//!
//! ```ignore
//! use gatehouse_db_memory::InMemoryDocumentStore;
//! use gatehouse_storage::{DocumentStore, Entity, Key, Mutation};
//!
//! let store = InMemoryDocumentStore::new();
//! let entity = Entity::new(Key::name_key("Group", "admins", None), Vec::new());
//! store.mutate(vec![Mutation::Insert(entity)]).await?;
//! ```

mod query;
pub mod storage;
mod transaction;

pub use gatehouse_storage::{DocumentStore, StorageError};
pub use storage::InMemoryDocumentStore;

/// Type alias for a shareable document store instance.
pub type DynDocumentStore = std::sync::Arc<dyn DocumentStore>;

/// Creates a new in-memory document store behind a shared handle.
pub fn create_document_store() -> DynDocumentStore {
    std::sync::Arc::new(InMemoryDocumentStore::new())
}
