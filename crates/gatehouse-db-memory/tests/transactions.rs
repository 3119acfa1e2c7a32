use gatehouse_db_memory::InMemoryDocumentStore;
use gatehouse_storage::{
    DocumentStore, Entity, Key, Mutation, Property, Query, StorageError, Transaction, Value,
    run_in_transaction,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counter(value: i64) -> Entity {
    Entity::new(
        Key::name_key("Counter", "c", None),
        vec![Property::new("n", value)],
    )
}

#[tokio::test]
async fn commit_fails_when_read_entity_changed() {
    let store = InMemoryDocumentStore::new();
    store.mutate(vec![Mutation::Insert(counter(0))]).await.unwrap();

    let mut tx = store.begin_transaction().await.unwrap();
    tx.get(&counter(0).key).await.unwrap();

    store.mutate(vec![Mutation::Upsert(counter(5))]).await.unwrap();

    tx.mutate(vec![Mutation::Update(counter(1))]);
    let err = tx.commit().await.unwrap_err();
    assert!(err.is_conflict());

    let stored = store.get(&counter(0).key).await.unwrap();
    assert_eq!(stored.get("n"), Some(&Value::Int(5)));
}

#[tokio::test]
async fn commit_fails_when_absent_entity_appears() {
    let store = InMemoryDocumentStore::new();
    let key = counter(0).key;

    let mut tx = store.begin_transaction().await.unwrap();
    assert!(tx.get(&key).await.unwrap_err().is_not_found());

    store.mutate(vec![Mutation::Insert(counter(9))]).await.unwrap();

    tx.mutate(vec![Mutation::Upsert(counter(1))]);
    assert!(tx.commit().await.unwrap_err().is_conflict());
}

#[tokio::test]
async fn transaction_queries_require_an_ancestor() {
    let store = InMemoryDocumentStore::new();
    let mut tx = store.begin_transaction().await.unwrap();

    let err = tx.run_keys_query(&Query::new("JWK")).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidQuery { .. }));

    let set = Key::name_key("JWK", "set", None);
    assert!(tx.run_keys_query(&Query::new("JWK").ancestor(set)).await.unwrap().is_empty());
}

#[tokio::test]
async fn run_in_transaction_retries_after_conflict() {
    let store = Arc::new(InMemoryDocumentStore::new());
    store.mutate(vec![Mutation::Insert(counter(0))]).await.unwrap();

    let attempts = AtomicUsize::new(0);
    let key = counter(0).key;

    let result: Result<i64, StorageError> = run_in_transaction(store.as_ref(), |tx| {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst);
        let key = key.clone();
        let interferer = Arc::clone(&store);
        Box::pin(async move {
            let current = tx.get(&key).await?.get("n").and_then(Value::as_int).unwrap_or(0);
            if attempt == 0 {
                interferer
                    .mutate(vec![Mutation::Upsert(counter(current + 100))])
                    .await?;
            }
            let next = current + 1;
            tx.mutate(vec![Mutation::Update(counter(next))]);
            Ok(next)
        })
    })
    .await;

    assert_eq!(result.unwrap(), 101);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn run_in_transaction_returns_body_errors_without_retry() {
    let store = InMemoryDocumentStore::new();
    let attempts = AtomicUsize::new(0);

    let result: Result<(), StorageError> = run_in_transaction(&store, |_tx| {
        attempts.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Err(StorageError::internal("boom")) })
    })
    .await;

    assert!(matches!(result, Err(StorageError::Internal { .. })));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
