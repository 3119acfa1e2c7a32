use crate::query::execute;
use crate::transaction::MemoryTransaction;
use async_trait::async_trait;
use gatehouse_storage::{
    DocumentStore, Entity, Key, KeyedResult, Mutation, Query, StorageError, StorageResult,
    Transaction,
};
use papaya::HashMap as PapayaHashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::trace;

/// An entity together with the write version that produced it.
#[derive(Debug, Clone)]
pub(crate) struct StoredEntity {
    pub entity: Entity,
    pub version: u64,
}

#[derive(Debug)]
pub(crate) struct Shared {
    /// Lock-free entity map; readers never block.
    pub data: PapayaHashMap<Key, StoredEntity>,
    /// Serialises writers so that a batch is validated and applied as a unit.
    pub write_lock: Mutex<()>,
    pub version_counter: AtomicU64,
}

impl Shared {
    fn next_version(&self) -> u64 {
        self.version_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn read(&self, key: &Key) -> Option<StoredEntity> {
        self.data.pin().get(key).cloned()
    }

    pub(crate) fn snapshot(&self, query: &Query) -> Vec<StoredEntity> {
        let guard = self.data.pin();
        guard
            .iter()
            .filter(|(_, stored)| query.matches(&stored.entity))
            .map(|(_, stored)| stored.clone())
            .collect()
    }

    /// Validates and applies a batch. Callers must hold `write_lock`.
    pub(crate) fn apply(&self, mutations: Vec<Mutation>) -> StorageResult<()> {
        let guard = self.data.pin();

        // Track occupancy as the batch would change it, so an insert after a
        // delete of the same key inside one batch is accepted.
        let mut occupied: HashMap<&Key, bool> = HashMap::new();
        for mutation in &mutations {
            let key = mutation.key();
            let present = *occupied
                .entry(key)
                .or_insert_with(|| guard.get(key).is_some());
            match mutation {
                Mutation::Insert(_) if present => return Err(StorageError::already_exists(key)),
                Mutation::Update(_) if !present => return Err(StorageError::not_found(key)),
                _ => {}
            }
            occupied.insert(key, !matches!(mutation, Mutation::Delete(_)));
        }

        for mutation in mutations {
            match mutation {
                Mutation::Insert(entity) | Mutation::Update(entity) | Mutation::Upsert(entity) => {
                    trace!(key = %entity.key, "write");
                    let version = self.next_version();
                    guard.insert(entity.key.clone(), StoredEntity { entity, version });
                }
                Mutation::Delete(key) => {
                    trace!(key = %key, "delete");
                    guard.remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// In-memory document store backed by a papaya lock-free HashMap.
///
/// This implementation provides:
/// - Lock-free concurrent reads
/// - Atomic mutation batches (writers are serialised)
/// - Optimistic transactions validated against per-entity write versions
/// - Queries with filters, ancestors, orders, offset and limit
///
/// Queries always observe the latest committed state, so they are strongly
/// consistent even where a remote store would not be.
#[derive(Debug, Clone)]
pub struct InMemoryDocumentStore {
    shared: Arc<Shared>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                data: PapayaHashMap::new(),
                write_lock: Mutex::new(()),
                version_counter: AtomicU64::new(1),
            }),
        }
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.shared.data.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, key: &Key) -> StorageResult<Entity> {
        self.shared
            .read(key)
            .map(|stored| stored.entity)
            .ok_or_else(|| StorageError::not_found(key))
    }

    async fn get_multi(&self, keys: &[Key]) -> StorageResult<Vec<KeyedResult>> {
        Ok(keys
            .iter()
            .map(|key| KeyedResult {
                key: key.clone(),
                result: self
                    .shared
                    .read(key)
                    .map(|stored| stored.entity)
                    .ok_or_else(|| StorageError::not_found(key)),
            })
            .collect())
    }

    async fn mutate(&self, mutations: Vec<Mutation>) -> StorageResult<()> {
        if mutations.is_empty() {
            return Ok(());
        }
        let _lock = self.shared.write_lock.lock().await;
        self.shared.apply(mutations)
    }

    async fn delete(&self, key: &Key) -> StorageResult<()> {
        let _lock = self.shared.write_lock.lock().await;
        if self.shared.read(key).is_none() {
            return Err(StorageError::not_found(key));
        }
        self.shared.apply(vec![Mutation::Delete(key.clone())])
    }

    async fn delete_multi(&self, keys: &[Key]) -> StorageResult<()> {
        let unique: HashSet<&Key> = keys.iter().collect();
        let mutations = unique
            .into_iter()
            .map(|key| Mutation::Delete(key.clone()))
            .collect();
        self.mutate(mutations).await
    }

    async fn run_query(&self, query: &Query) -> StorageResult<Vec<Entity>> {
        let matched = self.shared.snapshot(query);
        Ok(execute(query, matched)
            .into_iter()
            .map(|stored| stored.entity)
            .collect())
    }

    async fn run_keys_query(&self, query: &Query) -> StorageResult<Vec<Key>> {
        let matched = self.shared.snapshot(query);
        Ok(execute(query, matched)
            .into_iter()
            .map(|stored| stored.entity.key)
            .collect())
    }

    async fn begin_transaction(&self) -> StorageResult<Box<dyn Transaction>> {
        Ok(Box::new(MemoryTransaction::new(Arc::clone(&self.shared))))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_storage::{Direction, Property, Value};

    fn entity(kind: &str, name: &str, props: Vec<Property>) -> Entity {
        Entity::new(Key::name_key(kind, name, None), props)
    }

    #[tokio::test]
    async fn test_insert_get_delete() {
        let store = InMemoryDocumentStore::new();
        let e = entity("Client", "app", vec![Property::new("cn", "App")]);

        store.mutate(vec![Mutation::Insert(e.clone())]).await.unwrap();
        assert_eq!(store.get(&e.key).await.unwrap(), e);

        store.delete(&e.key).await.unwrap();
        assert!(store.get(&e.key).await.unwrap_err().is_not_found());
        assert!(store.delete(&e.key).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_insert_conflicts_with_existing_key() {
        let store = InMemoryDocumentStore::new();
        let e = entity("Unique", "OAuth2Accessreq-1", Vec::new());

        store.mutate(vec![Mutation::Insert(e.clone())]).await.unwrap();
        let err = store.mutate(vec![Mutation::Insert(e)]).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_failed_batch_applies_nothing() {
        let store = InMemoryDocumentStore::new();
        let existing = entity("Unique", "taken", Vec::new());
        store
            .mutate(vec![Mutation::Insert(existing.clone())])
            .await
            .unwrap();

        let fresh = entity("Unique", "fresh", Vec::new());
        let result = store
            .mutate(vec![Mutation::Insert(fresh.clone()), Mutation::Insert(existing)])
            .await;

        assert!(result.is_err());
        assert!(store.get(&fresh.key).await.is_err());
    }

    #[tokio::test]
    async fn test_update_requires_existing() {
        let store = InMemoryDocumentStore::new();
        let err = store
            .mutate(vec![Mutation::Update(entity("Group", "g", Vec::new()))])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_multi_reports_per_key() {
        let store = InMemoryDocumentStore::new();
        let present = entity("Group", "a", Vec::new());
        store
            .mutate(vec![Mutation::Insert(present.clone())])
            .await
            .unwrap();

        let missing = Key::name_key("Group", "b", None);
        let results = store
            .get_multi(&[present.key.clone(), missing.clone()])
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].result.is_ok());
        assert_eq!(results[1].key, missing);
        assert!(results[1].result.as_ref().unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_query_order_offset_limit() {
        let store = InMemoryDocumentStore::new();
        for (name, rank) in [("a", 3_i64), ("b", 1), ("c", 2)] {
            store
                .mutate(vec![Mutation::Insert(entity(
                    "JWK",
                    name,
                    vec![Property::new("created_at", rank)],
                ))])
                .await
                .unwrap();
        }

        let query = Query::new("JWK")
            .order("created_at", Direction::Descending)
            .offset(1)
            .limit(1);
        let keys = store.run_keys_query(&query).await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].name(), "c");

        let all = store.run_query(&Query::new("JWK").order_by_key()).await.unwrap();
        let names: Vec<_> = all.iter().map(|e| e.key.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(all[0].get("created_at"), Some(&Value::Int(3)));
    }

    #[tokio::test]
    async fn test_delete_multi_skips_missing() {
        let store = InMemoryDocumentStore::new();
        let e = entity("OAuth2Access", "sig", Vec::new());
        store.mutate(vec![Mutation::Insert(e.clone())]).await.unwrap();

        store
            .delete_multi(&[e.key.clone(), Key::name_key("OAuth2Access", "gone", None)])
            .await
            .unwrap();
        assert!(store.is_empty());
    }
}
