//! Storage traits for the document store abstraction.
//!
//! Backends implement [`DocumentStore`] and [`Transaction`]. Domain stores hold
//! an `Arc<dyn DocumentStore>` and never reach for a global client.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tracing::debug;

use crate::error::StorageError;
use crate::query::Query;
use crate::types::{Entity, Key, KeyedResult, Mutation};

/// Number of attempts [`run_in_transaction`] makes before giving up on conflicts.
pub const DEFAULT_TRANSACTION_ATTEMPTS: usize = 3;

/// The main document store trait.
///
/// Single-entity writes are atomic. Batches passed to [`mutate`](Self::mutate)
/// are validated as a whole before any of them is applied.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads one entity. Returns `NotFound` when the key is vacant.
    async fn get(&self, key: &Key) -> Result<Entity, StorageError>;

    /// Reads several entities, returning one result per requested key in
    /// request order.
    async fn get_multi(&self, keys: &[Key]) -> Result<Vec<KeyedResult>, StorageError>;

    /// Applies a batch of mutations atomically.
    async fn mutate(&self, mutations: Vec<Mutation>) -> Result<(), StorageError>;

    /// Deletes one entity. Returns `NotFound` when the key is vacant.
    async fn delete(&self, key: &Key) -> Result<(), StorageError>;

    /// Deletes several entities; vacant keys are skipped.
    async fn delete_multi(&self, keys: &[Key]) -> Result<(), StorageError>;

    /// Runs a query and returns full entities.
    async fn run_query(&self, query: &Query) -> Result<Vec<Entity>, StorageError>;

    /// Runs a keys-only query.
    async fn run_keys_query(&self, query: &Query) -> Result<Vec<Key>, StorageError>;

    /// Starts an optimistic transaction.
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StorageError>;

    /// Name of the backend, for logs.
    fn backend_name(&self) -> &'static str;
}

/// An optimistic transaction.
///
/// Reads are tracked; mutations are buffered until [`commit`](Self::commit),
/// which fails with `Conflict` if any entity read inside the transaction was
/// changed by someone else in the meantime. Queries inside a transaction must
/// be ancestor queries.
#[async_trait]
pub trait Transaction: Send {
    async fn get(&mut self, key: &Key) -> Result<Entity, StorageError>;

    async fn run_query(&mut self, query: &Query) -> Result<Vec<Entity>, StorageError>;

    async fn run_keys_query(&mut self, query: &Query) -> Result<Vec<Key>, StorageError>;

    /// Buffers mutations for commit.
    fn mutate(&mut self, mutations: Vec<Mutation>);

    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}

/// Runs `body` inside a transaction, retrying on commit conflicts.
///
/// Errors returned by `body` roll the transaction back and are returned as is.
/// A commit that keeps conflicting after [`DEFAULT_TRANSACTION_ATTEMPTS`]
/// attempts surfaces the last conflict.
pub async fn run_in_transaction<T, E, F>(store: &dyn DocumentStore, mut body: F) -> Result<T, E>
where
    T: Send,
    E: From<StorageError> + Send,
    F: for<'t> FnMut(&'t mut (dyn Transaction + 'static)) -> BoxFuture<'t, Result<T, E>> + Send,
{
    let mut last_conflict = None;

    for attempt in 1..=DEFAULT_TRANSACTION_ATTEMPTS {
        let mut tx = store.begin_transaction().await?;
        let outcome = body(&mut *tx).await;

        let value = match outcome {
            Ok(value) => value,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    debug!(error = %rollback_err, "rollback after failed transaction body");
                }
                return Err(err);
            }
        };

        match tx.commit().await {
            Ok(()) => return Ok(value),
            Err(err) if err.is_conflict() => {
                debug!(attempt, error = %err, "transaction conflict, retrying");
                last_conflict = Some(err);
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(last_conflict
        .unwrap_or_else(|| StorageError::transaction_error("transaction attempts exhausted"))
        .into())
}
