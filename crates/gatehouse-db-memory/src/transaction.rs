//! Optimistic transactions for the in-memory store.
//!
//! A transaction remembers the write version of every entity it reads (or
//! that it was absent). Commit takes the store write lock, re-checks those
//! versions and fails with `Conflict` if any of them moved.

use crate::query::execute;
use crate::storage::Shared;
use async_trait::async_trait;
use gatehouse_storage::{Entity, Key, Mutation, Query, StorageError, StorageResult, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub(crate) struct MemoryTransaction {
    shared: Arc<Shared>,
    /// Version observed per key; `None` when the key was vacant.
    reads: HashMap<Key, Option<u64>>,
    writes: Vec<Mutation>,
}

impl MemoryTransaction {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            reads: HashMap::new(),
            writes: Vec::new(),
        }
    }

    fn track(&mut self, key: &Key, version: Option<u64>) {
        self.reads.entry(key.clone()).or_insert(version);
    }

    fn ancestor_query(&mut self, query: &Query) -> StorageResult<Vec<Entity>> {
        if query.ancestor.is_none() {
            return Err(StorageError::invalid_query(
                "only ancestor queries are allowed inside a transaction",
            ));
        }
        let matched = execute(query, self.shared.snapshot(query));
        for stored in &matched {
            self.track(&stored.entity.key, Some(stored.version));
        }
        Ok(matched.into_iter().map(|stored| stored.entity).collect())
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&mut self, key: &Key) -> StorageResult<Entity> {
        let stored = self.shared.read(key);
        self.track(key, stored.as_ref().map(|s| s.version));
        stored
            .map(|s| s.entity)
            .ok_or_else(|| StorageError::not_found(key))
    }

    async fn run_query(&mut self, query: &Query) -> StorageResult<Vec<Entity>> {
        self.ancestor_query(query)
    }

    async fn run_keys_query(&mut self, query: &Query) -> StorageResult<Vec<Key>> {
        Ok(self
            .ancestor_query(query)?
            .into_iter()
            .map(|entity| entity.key)
            .collect())
    }

    fn mutate(&mut self, mutations: Vec<Mutation>) {
        self.writes.extend(mutations);
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let MemoryTransaction {
            shared,
            reads,
            writes,
        } = *self;
        let _lock = shared.write_lock.lock().await;

        for (key, seen) in &reads {
            let current = shared.read(key).map(|s| s.version);
            if current != *seen {
                debug!(key = %key, "optimistic read invalidated");
                return Err(StorageError::conflict(format!(
                    "entity {key} changed during transaction"
                )));
            }
        }

        if writes.is_empty() {
            return Ok(());
        }
        shared.apply(writes)
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}
