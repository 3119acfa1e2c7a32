//! Client registry traits.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::AuthResult;
use crate::types::Client;

// =============================================================================
// Client Manager Trait
// =============================================================================

/// Resolves clients by identifier.
///
/// Token and consent stores only persist a client id and use this trait to
/// rebuild the full client when a request is read back.
#[async_trait]
pub trait ClientManager: Send + Sync {
    /// Returns the client registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such client is registered.
    async fn get_client(&self, id: &str) -> AuthResult<Client>;
}

// =============================================================================
// Client Storage Trait
// =============================================================================

/// Full client registry.
#[async_trait]
pub trait ClientStorage: ClientManager {
    /// Returns the stored client, secret hash included.
    async fn get_concrete_client(&self, id: &str) -> AuthResult<Client>;

    /// Registers a client. The plaintext secret is hashed before storage.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the id is taken.
    async fn create_client(&self, client: &Client) -> AuthResult<()>;

    /// Replaces a client. An empty secret keeps the stored hash.
    async fn update_client(&self, client: &Client) -> AuthResult<()>;

    /// Looks the client up and compares `secret` with its stored hash.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown clients and `Crypto` on a mismatch.
    async fn authenticate(&self, id: &str, secret: &[u8]) -> AuthResult<Client>;

    async fn delete_client(&self, id: &str) -> AuthResult<()>;

    /// Lists clients in id order.
    async fn get_clients(&self, limit: usize, offset: usize) -> AuthResult<BTreeMap<String, Client>>;
}
