//! Client registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use gatehouse_auth::types::AUTH_METHOD_NONE;
use gatehouse_auth::{AuthError, AuthResult, Client, ClientManager, ClientStorage, Hasher};
use gatehouse_storage::{DocumentStore, Entity, Key, Mutation};
use tracing::{debug, instrument};

use crate::codec::{self, Field, Loaded, Migration, Record};
use crate::error::StorageResultExt;
use crate::keys::{Kind, KeyScheme};

/// Persisted client.
///
/// Lists are `|`-joined and the key set is stored as JSON text.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ClientRecord {
    pub id: String,
    pub name: String,
    pub secret: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub scope: String,
    pub owner: String,
    pub policy_uri: String,
    pub terms_of_service_uri: String,
    pub client_uri: String,
    pub logo_uri: String,
    pub contacts: Vec<String>,
    pub secret_expires_at: i64,
    pub sector_identifier_uri: String,
    pub jwks_uri: String,
    pub jwks: String,
    pub token_endpoint_auth_method: String,
    pub request_uris: Vec<String>,
    pub subject_type: String,
    pub request_object_signing_algorithm: String,
    pub userinfo_signed_response_algorithm: String,
    pub allowed_cors_origins: Vec<String>,
}

impl Record for ClientRecord {
    const NAME: &'static str = "client";
    const CURRENT_VERSION: i64 = 3;
    const FIELDS: &'static [Field<Self>] = &[
        Field::<Self>::text("cn", |r| &mut r.name),
        Field::<Self>::text("cs", |r| &mut r.secret),
        Field::<Self>::joined("ruris", |r| &mut r.redirect_uris),
        Field::<Self>::joined("gt", |r| &mut r.grant_types),
        Field::<Self>::joined("rt", |r| &mut r.response_types),
        Field::<Self>::text("scp", |r| &mut r.scope),
        Field::<Self>::text("owner", |r| &mut r.owner),
        Field::<Self>::text("puri", |r| &mut r.policy_uri),
        Field::<Self>::text("turi", |r| &mut r.terms_of_service_uri),
        Field::<Self>::text("curi", |r| &mut r.client_uri),
        Field::<Self>::text("luri", |r| &mut r.logo_uri),
        Field::<Self>::joined("conts", |r| &mut r.contacts),
        Field::<Self>::integer("csea", |r| &mut r.secret_expires_at),
        Field::<Self>::text("siuri", |r| &mut r.sector_identifier_uri),
        Field::<Self>::text("jwks_uri", |r| &mut r.jwks_uri),
        Field::<Self>::text("jwks", |r| &mut r.jwks).unindexed(),
        Field::<Self>::text("team", |r| &mut r.token_endpoint_auth_method),
        Field::<Self>::joined("ruri", |r| &mut r.request_uris),
        Field::<Self>::text("subt", |r| &mut r.subject_type),
        Field::<Self>::text("rosa", |r| &mut r.request_object_signing_algorithm),
        Field::<Self>::text("usra", |r| &mut r.userinfo_signed_response_algorithm),
        Field::<Self>::joined("acorso", |r| &mut r.allowed_cors_origins),
    ];
    const MIGRATIONS: &'static [Migration<Self>] = &[
        // Version 1 stored -1 for secrets without expiry.
        Migration {
            from: 1,
            apply: |r, _| r.secret_expires_at = 0,
        },
        // Version 2 flagged public clients with a boolean `pub`.
        Migration {
            from: 2,
            apply: |r, residual| {
                if residual.flag("pub") {
                    r.token_endpoint_auth_method = AUTH_METHOD_NONE.to_string();
                }
            },
        },
    ];

    fn load_key(&mut self, key: &Key) {
        self.id = key.name().to_string();
    }
}

impl ClientRecord {
    fn from_client(client: &Client) -> AuthResult<Self> {
        let jwks = match &client.jwks {
            Some(jwks) => serde_json::to_string(jwks)?,
            None => String::new(),
        };

        Ok(Self {
            id: client.client_id.clone(),
            name: client.name.clone(),
            secret: client.secret.clone(),
            redirect_uris: client.redirect_uris.clone(),
            grant_types: client.grant_types.clone(),
            response_types: client.response_types.clone(),
            scope: client.scope.clone(),
            owner: client.owner.clone(),
            policy_uri: client.policy_uri.clone(),
            terms_of_service_uri: client.terms_of_service_uri.clone(),
            client_uri: client.client_uri.clone(),
            logo_uri: client.logo_uri.clone(),
            contacts: client.contacts.clone(),
            secret_expires_at: client.secret_expires_at,
            sector_identifier_uri: client.sector_identifier_uri.clone(),
            jwks_uri: client.jwks_uri.clone(),
            jwks,
            token_endpoint_auth_method: client.token_endpoint_auth_method.clone(),
            request_uris: client.request_uris.clone(),
            subject_type: client.subject_type.clone(),
            request_object_signing_algorithm: client.request_object_signing_algorithm.clone(),
            userinfo_signed_response_algorithm: client.userinfo_signed_response_algorithm.clone(),
            allowed_cors_origins: client.allowed_cors_origins.clone(),
        })
    }

    fn into_client(self) -> AuthResult<Client> {
        let jwks = if self.jwks.is_empty() {
            None
        } else {
            Some(serde_json::from_str(&self.jwks)?)
        };

        Ok(Client {
            client_id: self.id,
            name: self.name,
            secret: self.secret,
            redirect_uris: self.redirect_uris,
            grant_types: self.grant_types,
            response_types: self.response_types,
            scope: self.scope,
            owner: self.owner,
            policy_uri: self.policy_uri,
            terms_of_service_uri: self.terms_of_service_uri,
            client_uri: self.client_uri,
            logo_uri: self.logo_uri,
            contacts: self.contacts,
            secret_expires_at: self.secret_expires_at,
            sector_identifier_uri: self.sector_identifier_uri,
            jwks_uri: self.jwks_uri,
            jwks,
            token_endpoint_auth_method: self.token_endpoint_auth_method,
            request_uris: self.request_uris,
            subject_type: self.subject_type,
            request_object_signing_algorithm: self.request_object_signing_algorithm,
            userinfo_signed_response_algorithm: self.userinfo_signed_response_algorithm,
            allowed_cors_origins: self.allowed_cors_origins,
        })
    }
}

// =============================================================================
// Client Manager
// =============================================================================

/// Client registry on a document store.
///
/// Secrets are hashed with the configured [`Hasher`] before they are stored.
pub struct DatastoreClientManager {
    store: Arc<dyn DocumentStore>,
    keys: KeyScheme,
    hasher: Arc<dyn Hasher>,
}

impl DatastoreClientManager {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, keys: KeyScheme, hasher: Arc<dyn Hasher>) -> Self {
        Self { store, keys, hasher }
    }

    async fn write(&self, client: &Client, mutation: fn(Entity) -> Mutation) -> AuthResult<()> {
        let mut record = ClientRecord::from_client(client)?;
        let entity = codec::to_entity(self.keys.client(&client.client_id), &mut record)?;
        self.store
            .mutate(vec![mutation(entity)])
            .await
            .context("write client")
    }
}

#[async_trait]
impl ClientManager for DatastoreClientManager {
    async fn get_client(&self, id: &str) -> AuthResult<Client> {
        self.get_concrete_client(id).await
    }
}

#[async_trait]
impl ClientStorage for DatastoreClientManager {
    #[instrument(skip(self))]
    async fn get_concrete_client(&self, id: &str) -> AuthResult<Client> {
        let key = self.keys.client(id);
        let entity = self.store.get(&key).await.context("get client")?;
        let Loaded {
            mut record,
            pending_upgrade,
        } = codec::load::<ClientRecord>(&entity)?;

        if pending_upgrade {
            debug!(client_id = id, "writing back upgraded client");
            let upgraded = codec::to_entity(key, &mut record)?;
            self.store
                .mutate(vec![Mutation::Update(upgraded)])
                .await
                .context("upgrade client")?;
        }

        record.into_client()
    }

    #[instrument(skip(self, client), fields(client_id = %client.client_id))]
    async fn create_client(&self, client: &Client) -> AuthResult<()> {
        if client.client_id.is_empty() {
            return Err(AuthError::invalid_input("client id must not be empty"));
        }

        let mut client = client.clone();
        client.secret = self.hasher.hash(client.secret.as_bytes()).await?;
        self.write(&client, Mutation::Insert).await
    }

    #[instrument(skip(self, client), fields(client_id = %client.client_id))]
    async fn update_client(&self, client: &Client) -> AuthResult<()> {
        let stored = self.get_concrete_client(&client.client_id).await?;

        let mut client = client.clone();
        client.secret = if client.secret.is_empty() {
            stored.secret
        } else {
            self.hasher.hash(client.secret.as_bytes()).await?
        };
        self.write(&client, Mutation::Update).await
    }

    #[instrument(skip(self, secret))]
    async fn authenticate(&self, id: &str, secret: &[u8]) -> AuthResult<Client> {
        let client = self.get_concrete_client(id).await?;
        self.hasher.compare(&client.secret, secret).await?;
        Ok(client)
    }

    #[instrument(skip(self))]
    async fn delete_client(&self, id: &str) -> AuthResult<()> {
        self.store
            .delete(&self.keys.client(id))
            .await
            .context("delete client")
    }

    #[instrument(skip(self))]
    async fn get_clients(&self, limit: usize, offset: usize) -> AuthResult<BTreeMap<String, Client>> {
        let query = self
            .keys
            .query(Kind::Client)
            .order_by_key()
            .limit(limit)
            .offset(offset);
        let entities = self
            .store
            .run_query(&query)
            .await
            .context("list clients")?;

        let mut upgrades = Vec::new();
        let mut clients = BTreeMap::new();
        for entity in &entities {
            let Loaded {
                mut record,
                pending_upgrade,
            } = codec::load::<ClientRecord>(entity)?;
            if pending_upgrade {
                upgrades.push(Mutation::Update(codec::to_entity(entity.key.clone(), &mut record)?));
            }
            clients.insert(record.id.clone(), record.into_client()?);
        }

        if !upgrades.is_empty() {
            debug!(count = upgrades.len(), "writing back upgraded clients");
            self.store
                .mutate(upgrades)
                .await
                .context("upgrade clients")?;
        }

        Ok(clients)
    }
}
