//! JSON Web Key storage.
//!
//! Each key is one document, a child of its key-set key, holding the
//! encrypted JSON of the key. Set-wide reads and writes are ancestor queries
//! and can therefore run inside transactions.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use gatehouse_auth::{AuthError, AuthResult, Cipher, JwkManager};
use gatehouse_storage::{Direction, DocumentStore, Entity, Key, Mutation, run_in_transaction};
use jsonwebtoken::jwk::{Jwk, JwkSet};
use time::OffsetDateTime;
use tracing::{debug, info, instrument};

use crate::codec::{self, CodecError, Field, Migration, Record};
use crate::error::StorageResultExt;
use crate::keys::{Kind, KeyScheme};

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct JwkRecord {
    pub set: String,
    pub kid: String,
    /// Version of the key material, not of the document schema.
    pub key_version: i64,
    pub created_at: Option<OffsetDateTime>,
    /// Encrypted JSON of the key.
    pub key_data: String,
}

impl Record for JwkRecord {
    const NAME: &'static str = "json web key";
    const CURRENT_VERSION: i64 = 1;
    const FIELDS: &'static [Field<Self>] = &[
        Field::<Self>::integer("version", |r| &mut r.key_version),
        Field::<Self>::time("created_at", |r| &mut r.created_at),
        Field::<Self>::text("keydata", |r| &mut r.key_data).unindexed(),
    ];
    const MIGRATIONS: &'static [Migration<Self>] = &[];

    fn load_key(&mut self, key: &Key) {
        self.kid = key.name().to_string();
        self.set = key.parent().map(|p| p.name().to_string()).unwrap_or_default();
    }

    fn before_save(&mut self) -> Result<(), CodecError> {
        if self.set.is_empty() || self.kid.is_empty() || self.key_data.is_empty() {
            return Err(CodecError::Invalid {
                record: Self::NAME,
                message: "missing set, kid or key data".to_string(),
            });
        }
        if self.created_at.is_none() {
            self.created_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }
}

fn key_id(key: &Jwk) -> AuthResult<&str> {
    match key.common.key_id.as_deref() {
        Some(kid) if !kid.is_empty() => Ok(kid),
        _ => Err(AuthError::invalid_input("json web key has no kid")),
    }
}

/// Encrypts `key` into an insertable entity of `set`.
fn encrypt_key(keys: &KeyScheme, cipher: &dyn Cipher, set: &str, key: &Jwk) -> AuthResult<Entity> {
    let kid = key_id(key)?;
    let mut record = JwkRecord {
        set: set.to_string(),
        kid: kid.to_string(),
        key_version: 0,
        created_at: None,
        key_data: cipher.encrypt(&serde_json::to_vec(key)?)?,
    };
    Ok(codec::to_entity(keys.jwk(set, kid), &mut record)?)
}

fn decrypt_key(cipher: &dyn Cipher, entity: &Entity) -> AuthResult<Jwk> {
    let record = codec::load::<JwkRecord>(entity)?.record;
    let plaintext = cipher.decrypt(&record.key_data)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

// =============================================================================
// JWK Manager
// =============================================================================

/// Key set storage on a document store.
pub struct DatastoreJwkManager {
    store: Arc<dyn DocumentStore>,
    keys: KeyScheme,
    cipher: Arc<dyn Cipher>,
}

impl DatastoreJwkManager {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, keys: KeyScheme, cipher: Arc<dyn Cipher>) -> Self {
        Self { store, keys, cipher }
    }

    /// Names of all sets holding at least one key.
    async fn set_names(&self) -> AuthResult<BTreeSet<String>> {
        let keys = self
            .store
            .run_keys_query(&self.keys.query(Kind::Jwk))
            .await
            .context("list json web keys")?;

        Ok(keys
            .iter()
            .filter_map(|k| k.parent().map(|p| p.name().to_string()))
            .collect())
    }
}

#[async_trait]
impl JwkManager for DatastoreJwkManager {
    #[instrument(skip(self, key))]
    async fn add_key(&self, set: &str, key: &Jwk) -> AuthResult<()> {
        let entity = encrypt_key(&self.keys, self.cipher.as_ref(), set, key)?;
        self.store
            .mutate(vec![Mutation::Insert(entity)])
            .await
            .context("add json web key")
    }

    #[instrument(skip(self, keys), fields(count = keys.keys.len()))]
    async fn add_key_set(&self, set: &str, keys: &JwkSet) -> AuthResult<()> {
        let inserts = keys
            .keys
            .iter()
            .map(|key| encrypt_key(&self.keys, self.cipher.as_ref(), set, key).map(Mutation::Insert))
            .collect::<AuthResult<Vec<_>>>()?;

        run_in_transaction(self.store.as_ref(), |tx| {
            let inserts = inserts.clone();
            Box::pin(async move {
                tx.mutate(inserts);
                Ok::<_, AuthError>(())
            })
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_key(&self, set: &str, kid: &str) -> AuthResult<JwkSet> {
        let entity = self
            .store
            .get(&self.keys.jwk(set, kid))
            .await
            .context("get json web key")?;

        Ok(JwkSet {
            keys: vec![decrypt_key(self.cipher.as_ref(), &entity)?],
        })
    }

    #[instrument(skip(self))]
    async fn get_key_set(&self, set: &str) -> AuthResult<JwkSet> {
        let query = self
            .keys
            .jwk_set_query(set)
            .order("created_at", Direction::Descending);
        let entities = self
            .store
            .run_query(&query)
            .await
            .context("get json web key set")?;

        if entities.is_empty() {
            return Err(AuthError::not_found(format!("json web key set {set}")));
        }

        let keys = entities
            .iter()
            .map(|entity| decrypt_key(self.cipher.as_ref(), entity))
            .collect::<AuthResult<Vec<_>>>()?;
        Ok(JwkSet { keys })
    }

    #[instrument(skip(self))]
    async fn delete_key(&self, set: &str, kid: &str) -> AuthResult<()> {
        self.store
            .delete(&self.keys.jwk(set, kid))
            .await
            .context("delete json web key")
    }

    #[instrument(skip(self))]
    async fn delete_key_set(&self, set: &str) -> AuthResult<()> {
        let query = self.keys.jwk_set_query(set);

        run_in_transaction(self.store.as_ref(), |tx| {
            let query = query.clone();
            Box::pin(async move {
                let keys = tx
                    .run_keys_query(&query)
                    .await
                    .context("find json web key set")?;
                tx.mutate(keys.into_iter().map(Mutation::Delete).collect());
                Ok::<_, AuthError>(())
            })
        })
        .await
    }

    #[instrument(skip(self, new_cipher))]
    async fn rotate_keys(&self, new_cipher: Arc<dyn Cipher>) -> AuthResult<usize> {
        let mut rotated = 0;

        for set in self.set_names().await? {
            let query = self.keys.jwk_set_query(&set);
            let count = run_in_transaction(self.store.as_ref(), |tx| {
                let query = query.clone();
                let old_cipher = Arc::clone(&self.cipher);
                let new_cipher = Arc::clone(&new_cipher);
                Box::pin(async move {
                    let entities = tx
                        .run_query(&query)
                        .await
                        .context("read json web key set")?;

                    let mut updates = Vec::with_capacity(entities.len());
                    for entity in entities {
                        let mut record = codec::load::<JwkRecord>(&entity)?.record;
                        let plaintext = old_cipher.decrypt(&record.key_data)?;
                        record.key_data = new_cipher.encrypt(&plaintext)?;
                        updates.push(Mutation::Update(codec::to_entity(entity.key, &mut record)?));
                    }

                    let count = updates.len();
                    tx.mutate(updates);
                    Ok::<_, AuthError>(count)
                })
            })
            .await?;

            debug!(set = %set, count, "re-encrypted json web key set");
            rotated += count;
        }

        info!(rotated, "rotated json web keys");
        Ok(rotated)
    }
}
