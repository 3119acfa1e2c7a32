//! Token and session storage.
//!
//! One document per token signature, one kind per token type. Access and
//! refresh tokens additionally reserve their request id so that a request can
//! mint at most one token of each kind.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gatehouse_auth::{
    AuthError, AuthResult, ClientManager, OAuth2Storage, Request, Session, SessionLookup,
    TokenRevoker,
};
use gatehouse_storage::{DocumentStore, FilterOp, Key, Mutation};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::codec::{self, CodecError, Field, Loaded, Migration, Record};
use crate::error::StorageResultExt;
use crate::keys::{Kind, KeyScheme};
use crate::unique;

// =============================================================================
// Types
// =============================================================================

/// The token document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    OpenIdConnect,
    AccessToken,
    RefreshToken,
    AuthorizeCode,
    Pkce,
}

impl TokenKind {
    pub fn kind(self) -> Kind {
        match self {
            Self::OpenIdConnect => Kind::OpenIdConnectSession,
            Self::AccessToken => Kind::AccessToken,
            Self::RefreshToken => Kind::RefreshToken,
            Self::AuthorizeCode => Kind::AuthorizeCode,
            Self::Pkce => Kind::PkceRequest,
        }
    }

    /// Access and refresh tokens are unique per request id.
    pub fn enforces_unique_request(self) -> bool {
        matches!(self, Self::AccessToken | Self::RefreshToken)
    }
}

/// Persisted form of a token-backed request.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct TokenRecord {
    pub signature: String,
    pub request_id: String,
    pub requested_at: Option<OffsetDateTime>,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub granted_scopes: Vec<String>,
    /// URL-encoded form.
    pub form: String,
    pub subject: String,
    pub active: bool,
    /// JSON-encoded session payload.
    pub session: Vec<u8>,
}

impl Record for TokenRecord {
    const NAME: &'static str = "oauth2 session";
    const CURRENT_VERSION: i64 = 2;
    const FIELDS: &'static [Field<Self>] = &[
        Field::<Self>::text("rid", |r| &mut r.request_id),
        Field::<Self>::time("rat", |r| &mut r.requested_at),
        Field::<Self>::text("cid", |r| &mut r.client_id),
        Field::<Self>::joined("scp", |r| &mut r.scopes),
        Field::<Self>::joined("gscps", |r| &mut r.granted_scopes),
        Field::<Self>::text("fd", |r| &mut r.form),
        Field::<Self>::text("sub", |r| &mut r.subject),
        Field::<Self>::flag("act", |r| &mut r.active),
        Field::<Self>::blob("sess", |r| &mut r.session).unindexed(),
    ];
    // Version 1 predates deactivation; every v1 token is active.
    const MIGRATIONS: &'static [Migration<Self>] = &[Migration {
        from: 1,
        apply: |r, _| r.active = true,
    }];

    fn load_key(&mut self, key: &Key) {
        self.signature = key.name().to_string();
    }

    fn before_save(&mut self) -> Result<(), CodecError> {
        if self.requested_at.is_none() {
            self.requested_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }
}

impl TokenRecord {
    fn from_request<S: Session>(signature: &str, request: &Request<S>) -> AuthResult<Self> {
        let session = match &request.session {
            Some(session) => serde_json::to_vec(session)?,
            None => Vec::new(),
        };
        let form = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(request.form.iter())
            .finish();

        Ok(Self {
            signature: signature.to_string(),
            request_id: request.id.clone(),
            requested_at: Some(request.requested_at),
            client_id: request.client.client_id.clone(),
            scopes: request.requested_scopes.clone(),
            granted_scopes: request.granted_scopes.clone(),
            form,
            subject: request.subject().to_string(),
            active: true,
            session,
        })
    }
}

// =============================================================================
// Token Store
// =============================================================================

/// Token and session storage on a document store.
pub struct DatastoreTokenStore {
    store: Arc<dyn DocumentStore>,
    keys: KeyScheme,
    clients: Arc<dyn ClientManager>,
    access_token_lifespan: Duration,
}

impl DatastoreTokenStore {
    /// Creates a token store.
    ///
    /// `clients` resolves the client of every request read back;
    /// `access_token_lifespan` bounds [`Self::flush_inactive_access_tokens`].
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        keys: KeyScheme,
        clients: Arc<dyn ClientManager>,
        access_token_lifespan: Duration,
    ) -> Self {
        Self {
            store,
            keys,
            clients,
            access_token_lifespan,
        }
    }

    /// Stores `request` under `signature`.
    ///
    /// With `enforce_unique`, the request id is reserved first; the
    /// reservation is not rolled back if the token insert then fails.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the signature or the reservation is taken.
    #[instrument(skip(self, request), fields(request_id = %request.id))]
    pub async fn create_session<S: Session>(
        &self,
        kind: TokenKind,
        signature: &str,
        request: &Request<S>,
        enforce_unique: bool,
    ) -> AuthResult<()> {
        let mut record = TokenRecord::from_request(signature, request)?;

        if enforce_unique {
            unique::reserve(self.store.as_ref(), &self.keys, kind.kind(), &request.id).await?;
        }

        let entity = codec::to_entity(self.keys.root(kind.kind(), signature), &mut record)?;
        self.store
            .mutate(vec![Mutation::Insert(entity)])
            .await
            .context("create token session")
    }

    /// Reads the request stored under `signature`.
    ///
    /// A migrated record is written back before the request is returned.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown signatures and `InactiveToken` for
    /// deactivated tokens other than authorization codes.
    #[instrument(skip(self))]
    pub async fn find_session<S: Session>(
        &self,
        kind: TokenKind,
        signature: &str,
    ) -> AuthResult<SessionLookup<S>> {
        let key = self.keys.root(kind.kind(), signature);
        let entity = self.store.get(&key).await.context("find token session")?;
        let Loaded {
            mut record,
            pending_upgrade,
        } = codec::load::<TokenRecord>(&entity)?;

        if !record.active {
            if kind == TokenKind::AuthorizeCode {
                let request = self.to_request(record).await?;
                return Ok(SessionLookup::InvalidatedCode(request));
            }
            return Err(AuthError::InactiveToken);
        }

        if pending_upgrade {
            debug!(key = %key, "writing back upgraded token session");
            let upgraded = codec::to_entity(key, &mut record)?;
            self.store
                .mutate(vec![Mutation::Update(upgraded)])
                .await
                .context("upgrade token session")?;
        }

        Ok(SessionLookup::Active(self.to_request(record).await?))
    }

    /// Marks an authorization code as exchanged.
    #[instrument(skip(self))]
    pub async fn invalidate_authorize_code(&self, signature: &str) -> AuthResult<()> {
        let key = self.keys.root(Kind::AuthorizeCode, signature);
        let entity = self.store.get(&key).await.context("invalidate authorize code")?;
        let mut record = codec::load::<TokenRecord>(&entity)?.record;
        record.active = false;

        let entity = codec::to_entity(key, &mut record)?;
        self.store
            .mutate(vec![Mutation::Update(entity)])
            .await
            .context("invalidate authorize code")
    }

    /// # Errors
    ///
    /// Returns `NotFound` if nothing is stored under `signature`.
    #[instrument(skip(self))]
    pub async fn delete_session(&self, kind: TokenKind, signature: &str) -> AuthResult<()> {
        self.store
            .delete(&self.keys.root(kind.kind(), signature))
            .await
            .context("delete token session")
    }

    /// Deletes every token of `kind` minted for `request_id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no token matches.
    #[instrument(skip(self))]
    pub async fn revoke_by_request_id(&self, kind: TokenKind, request_id: &str) -> AuthResult<()> {
        let query = self.keys.query(kind.kind()).eq("rid", request_id);
        let keys = self
            .store
            .run_keys_query(&query)
            .await
            .context("find tokens by request id")?;

        if keys.is_empty() {
            return Err(AuthError::not_found(format!(
                "no {} for request {request_id}",
                kind.kind()
            )));
        }
        debug!(count = keys.len(), "revoking tokens");
        self.store
            .delete_multi(&keys)
            .await
            .context("revoke tokens")
    }

    /// Deletes access tokens requested before `min(now - lifespan, not_after)`.
    #[instrument(skip(self))]
    pub async fn flush_inactive_access_tokens(&self, not_after: OffsetDateTime) -> AuthResult<()> {
        let expired_before = OffsetDateTime::now_utc() - self.access_token_lifespan;
        let threshold = expired_before.min(not_after);

        let query = self
            .keys
            .query(Kind::AccessToken)
            .filter("rat", FilterOp::Lt, threshold);
        let keys = self
            .store
            .run_keys_query(&query)
            .await
            .context("find inactive access tokens")?;

        debug!(count = keys.len(), %threshold, "flushing inactive access tokens");
        self.store
            .delete_multi(&keys)
            .await
            .context("flush inactive access tokens")
    }

    async fn create<S: Session>(
        &self,
        kind: TokenKind,
        signature: &str,
        request: &Request<S>,
    ) -> AuthResult<()> {
        self.create_session(kind, signature, request, kind.enforces_unique_request())
            .await
    }

    async fn to_request<S: Session>(&self, record: TokenRecord) -> AuthResult<Request<S>> {
        let client = self.clients.get_client(&record.client_id).await?;

        let session = if record.session.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(&record.session)?)
        };
        let form = url::form_urlencoded::parse(record.form.as_bytes())
            .into_owned()
            .collect();

        Ok(Request {
            id: record.request_id,
            requested_at: record
                .requested_at
                .unwrap_or_else(OffsetDateTime::now_utc),
            client,
            requested_scopes: record.scopes,
            granted_scopes: record.granted_scopes,
            form,
            session,
        })
    }
}

#[async_trait]
impl TokenRevoker for DatastoreTokenStore {
    async fn revoke_access_token(&self, request_id: &str) -> AuthResult<()> {
        self.revoke_by_request_id(TokenKind::AccessToken, request_id)
            .await
    }

    async fn revoke_refresh_token(&self, request_id: &str) -> AuthResult<()> {
        self.revoke_by_request_id(TokenKind::RefreshToken, request_id)
            .await
    }
}

#[async_trait]
impl<S: Session> OAuth2Storage<S> for DatastoreTokenStore {
    async fn create_open_id_connect_session(&self, signature: &str, request: &Request<S>) -> AuthResult<()> {
        self.create(TokenKind::OpenIdConnect, signature, request).await
    }

    async fn get_open_id_connect_session(&self, signature: &str) -> AuthResult<Request<S>> {
        self.find_session(TokenKind::OpenIdConnect, signature)
            .await
            .map(SessionLookup::into_request)
    }

    async fn delete_open_id_connect_session(&self, signature: &str) -> AuthResult<()> {
        self.delete_session(TokenKind::OpenIdConnect, signature).await
    }

    async fn create_authorize_code_session(&self, signature: &str, request: &Request<S>) -> AuthResult<()> {
        self.create(TokenKind::AuthorizeCode, signature, request).await
    }

    async fn get_authorize_code_session(&self, signature: &str) -> AuthResult<SessionLookup<S>> {
        self.find_session(TokenKind::AuthorizeCode, signature).await
    }

    async fn invalidate_authorize_code_session(&self, signature: &str) -> AuthResult<()> {
        self.invalidate_authorize_code(signature).await
    }

    async fn delete_authorize_code_session(&self, signature: &str) -> AuthResult<()> {
        self.delete_session(TokenKind::AuthorizeCode, signature).await
    }

    async fn create_access_token_session(&self, signature: &str, request: &Request<S>) -> AuthResult<()> {
        self.create(TokenKind::AccessToken, signature, request).await
    }

    async fn get_access_token_session(&self, signature: &str) -> AuthResult<Request<S>> {
        self.find_session(TokenKind::AccessToken, signature)
            .await
            .map(SessionLookup::into_request)
    }

    async fn delete_access_token_session(&self, signature: &str) -> AuthResult<()> {
        self.delete_session(TokenKind::AccessToken, signature).await
    }

    async fn create_refresh_token_session(&self, signature: &str, request: &Request<S>) -> AuthResult<()> {
        self.create(TokenKind::RefreshToken, signature, request).await
    }

    async fn get_refresh_token_session(&self, signature: &str) -> AuthResult<Request<S>> {
        self.find_session(TokenKind::RefreshToken, signature)
            .await
            .map(SessionLookup::into_request)
    }

    async fn delete_refresh_token_session(&self, signature: &str) -> AuthResult<()> {
        self.delete_session(TokenKind::RefreshToken, signature).await
    }

    async fn create_pkce_request_session(&self, signature: &str, request: &Request<S>) -> AuthResult<()> {
        self.create(TokenKind::Pkce, signature, request).await
    }

    async fn get_pkce_request_session(&self, signature: &str) -> AuthResult<Request<S>> {
        self.find_session(TokenKind::Pkce, signature)
            .await
            .map(SessionLookup::into_request)
    }

    async fn delete_pkce_request_session(&self, signature: &str) -> AuthResult<()> {
        self.delete_session(TokenKind::Pkce, signature).await
    }

    async fn flush_inactive_access_tokens(&self, not_after: OffsetDateTime) -> AuthResult<()> {
        DatastoreTokenStore::flush_inactive_access_tokens(self, not_after).await
    }
}
