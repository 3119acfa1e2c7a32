//! # gatehouse-storage
//!
//! Document store abstraction for the gatehouse authorization server.
//!
//! This crate defines the traits and types that every document store backend
//! implements. It contains no backend itself; see `gatehouse-db-memory`.
//!
//! ## Overview
//!
//! The model is a schemaless store of [`Entity`] documents addressed by
//! hierarchical [`Key`]s:
//! - single and batch reads with per-key results
//! - atomic mutation batches (insert, update, upsert, delete)
//! - queries with equality and range filters, ancestors, orders and paging
//! - optimistic transactions, driven by [`run_in_transaction`]
//!
//! ## Example
//!
//! ```ignore
//! use gatehouse_storage::{DocumentStore, Query, StorageError};
//!
//! async fn groups_of(store: &dyn DocumentStore, subject: &str) -> Result<usize, StorageError> {
//!     let query = Query::new("Group").eq("m", subject);
//!     Ok(store.run_keys_query(&query).await?.len())
//! }
//! ```

mod error;
mod query;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use query::{Direction, Filter, FilterOp, KEY_PROPERTY, Order, Query};
pub use traits::{DEFAULT_TRANSACTION_ATTEMPTS, DocumentStore, Transaction, run_in_transaction};
pub use types::{Entity, Key, KeyedResult, Mutation, Property, Value};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared document store handle.
pub type DynStore = std::sync::Arc<dyn DocumentStore>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use gatehouse_storage::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        DocumentStore, DynStore, Entity, Key, Mutation, Property, Query, StorageError,
        StorageResult, Transaction, Value, run_in_transaction,
    };
}
