//! Unique constraints emulated with reservation entities.
//!
//! The store has no unique secondary indexes. A constraint on a natural key is
//! enforced by inserting an empty `Unique` entity named after the constrained
//! kind and the natural key; the insert fails if the name is taken.

use gatehouse_auth::AuthResult;
use gatehouse_storage::{DocumentStore, Entity, Mutation};
use tracing::debug;

use crate::error::StorageResultExt;
use crate::keys::{Kind, KeyScheme};

/// Reserves `natural_key` for `kind`.
///
/// # Errors
///
/// Returns `AlreadyExists` if the reservation is held already.
pub(crate) async fn reserve(
    store: &dyn DocumentStore,
    keys: &KeyScheme,
    kind: Kind,
    natural_key: &str,
) -> AuthResult<()> {
    let key = keys.unique(kind, natural_key);
    debug!(reservation = %key, "reserving unique key");
    store
        .mutate(vec![Mutation::Insert(Entity::new(key, Vec::new()))])
        .await
        .context("reserve unique key")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_db_memory::InMemoryDocumentStore;

    #[tokio::test]
    async fn test_second_reservation_fails() {
        let store = InMemoryDocumentStore::new();
        let keys = KeyScheme::new("test");

        reserve(&store, &keys, Kind::AccessToken, "req-1").await.unwrap();
        let err = reserve(&store, &keys, Kind::AccessToken, "req-1")
            .await
            .unwrap_err();
        assert!(err.is_already_exists());

        reserve(&store, &keys, Kind::RefreshToken, "req-1").await.unwrap();
    }
}
