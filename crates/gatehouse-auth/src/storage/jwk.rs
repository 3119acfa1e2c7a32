use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};

use crate::AuthResult;
use crate::cipher::Cipher;

/// Storage of signing keys grouped in named key sets.
#[async_trait]
pub trait JwkManager: Send + Sync {
    /// # Errors
    ///
    /// Returns `InvalidInput` if the key has no `kid`.
    async fn add_key(&self, set: &str, key: &Jwk) -> AuthResult<()>;

    /// Adds all keys atomically.
    async fn add_key_set(&self, set: &str, keys: &JwkSet) -> AuthResult<()>;

    async fn get_key(&self, set: &str, kid: &str) -> AuthResult<JwkSet>;

    /// Returns the set with the newest key first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an empty or unknown set.
    async fn get_key_set(&self, set: &str) -> AuthResult<JwkSet>;

    async fn delete_key(&self, set: &str, kid: &str) -> AuthResult<()>;

    async fn delete_key_set(&self, set: &str) -> AuthResult<()>;

    /// Re-encrypts every stored key with `new_cipher`.
    ///
    /// Returns the number of keys rewritten. Subsequent managers must be
    /// built with `new_cipher`.
    async fn rotate_keys(&self, new_cipher: Arc<dyn Cipher>) -> AuthResult<usize>;
}
