//! Client secret hashing.
//!
//! # Security
//!
//! - Hashing uses Argon2id (hybrid mode) with default parameters
//! - Salts are generated using OsRng (cryptographically secure RNG)
//! - Hashes are stored in PHC string format

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use tracing::{Instrument, debug_span};

use crate::AuthResult;
use crate::error::AuthError;

/// One-way hashing of secrets.
#[async_trait]
pub trait Hasher: Send + Sync {
    async fn hash(&self, data: &[u8]) -> AuthResult<String>;

    /// Succeeds when `data` matches `hash`.
    ///
    /// # Errors
    ///
    /// Returns `Crypto` on a mismatch or a malformed hash.
    async fn compare(&self, hash: &str, data: &[u8]) -> AuthResult<()>;
}

/// Argon2id hasher producing PHC strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

#[async_trait]
impl Hasher for Argon2Hasher {
    async fn hash(&self, data: &[u8]) -> AuthResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(data, &salt)
            .map_err(|e| AuthError::crypto(format!("failed to hash secret: {e}")))?;
        Ok(hash.to_string())
    }

    async fn compare(&self, hash: &str, data: &[u8]) -> AuthResult<()> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AuthError::crypto(format!("malformed secret hash: {e}")))?;
        Argon2::default()
            .verify_password(data, &parsed)
            .map_err(|_| AuthError::crypto("secret does not match"))
    }
}

/// Wraps a hasher so every call runs inside its own tracing span.
#[derive(Debug, Clone)]
pub struct TracedHasher<H> {
    inner: H,
}

impl<H: Hasher> TracedHasher<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<H: Hasher> Hasher for TracedHasher<H> {
    async fn hash(&self, data: &[u8]) -> AuthResult<String> {
        self.inner
            .hash(data)
            .instrument(debug_span!("hasher.hash"))
            .await
    }

    async fn compare(&self, hash: &str, data: &[u8]) -> AuthResult<()> {
        self.inner
            .compare(hash, data)
            .instrument(debug_span!("hasher.compare"))
            .await
    }
}
