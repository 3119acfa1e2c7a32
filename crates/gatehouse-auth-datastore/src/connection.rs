//! Connection factory.
//!
//! A [`DatastoreConnection`] pairs a store handle with the namespace of a
//! `datastore://` URL and hands out managers that share both.

use std::sync::Arc;
use std::time::Duration;

use gatehouse_auth::{AuthError, AuthResult, Cipher, ClientManager, Hasher, TokenRevoker};
use gatehouse_config::{DatastoreUrl, GatehouseConfig};
use gatehouse_db_memory::create_document_store;
use gatehouse_storage::DocumentStore;
use tracing::{info, instrument};

use crate::client::DatastoreClientManager;
use crate::consent::DatastoreConsentManager;
use crate::error::StorageResultExt;
use crate::group::DatastoreGroupManager;
use crate::jwk::DatastoreJwkManager;
use crate::keys::{Kind, KeyScheme};
use crate::token::DatastoreTokenStore;

/// Shared store handle and key scheme of one deployment.
#[derive(Clone)]
pub struct DatastoreConnection {
    store: Arc<dyn DocumentStore>,
    url: DatastoreUrl,
    keys: KeyScheme,
}

impl DatastoreConnection {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, url: DatastoreUrl) -> Self {
        let keys = KeyScheme::new(url.namespace.as_str());
        Self { store, url, keys }
    }

    /// A connection to a fresh in-memory store.
    #[must_use]
    pub fn in_memory(namespace: &str) -> Self {
        let url = DatastoreUrl {
            namespace: namespace.to_string(),
            ..DatastoreUrl::default()
        };
        Self::new(create_document_store(), url)
    }

    /// Opens the store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the datastore URL does not parse.
    pub fn from_config(config: &GatehouseConfig) -> AuthResult<Self> {
        let url = config
            .datastore_url()
            .map_err(|err| AuthError::invalid_input(err.to_string()))?;
        let store = create_document_store();
        info!(
            backend = store.backend_name(),
            project = url.project_id.as_deref().unwrap_or("<default>"),
            namespace = %url.namespace,
            emulated = url.is_emulated(),
            "opened document store"
        );
        Ok(Self::new(store, url))
    }

    pub fn namespace(&self) -> &str {
        self.keys.namespace()
    }

    pub fn url(&self) -> &DatastoreUrl {
        &self.url
    }

    pub fn key_scheme(&self) -> &KeyScheme {
        &self.keys
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.store)
    }

    pub fn new_client_manager(&self, hasher: Arc<dyn Hasher>) -> DatastoreClientManager {
        DatastoreClientManager::new(self.store(), self.keys.clone(), hasher)
    }

    pub fn new_oauth2_manager(
        &self,
        clients: Arc<dyn ClientManager>,
        access_token_lifespan: Duration,
    ) -> DatastoreTokenStore {
        DatastoreTokenStore::new(self.store(), self.keys.clone(), clients, access_token_lifespan)
    }

    pub fn new_consent_manager(
        &self,
        clients: Arc<dyn ClientManager>,
        revoker: Arc<dyn TokenRevoker>,
    ) -> DatastoreConsentManager {
        DatastoreConsentManager::new(self.store(), self.keys.clone(), clients, revoker)
    }

    pub fn new_jwk_manager(&self, cipher: Arc<dyn Cipher>) -> DatastoreJwkManager {
        DatastoreJwkManager::new(self.store(), self.keys.clone(), cipher)
    }

    pub fn new_group_manager(&self) -> DatastoreGroupManager {
        DatastoreGroupManager::new(self.store(), self.keys.clone())
    }

    /// Checks that the store answers queries.
    #[instrument(skip(self), fields(namespace = %self.namespace()))]
    pub async fn ping(&self) -> AuthResult<()> {
        let query = self.keys.query(Kind::Client).limit(1);
        self.store
            .run_keys_query(&query)
            .await
            .context("ping")
            .map(|_| ())
    }
}

impl std::fmt::Debug for DatastoreConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatastoreConnection")
            .field("backend", &self.store.backend_name())
            .field("url", &self.url)
            .finish()
    }
}
