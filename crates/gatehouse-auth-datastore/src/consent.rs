//! Login and consent handshake storage.
//!
//! Requests, handled records, authentication sessions and obfuscated subjects
//! are children of a fixed per-kind ancestor, so every lookup by property is a
//! strongly consistent ancestor query. The handled record of a challenge lives
//! under the same name as its request.

use std::sync::Arc;

use async_trait::async_trait;
use gatehouse_auth::{
    AuthError, AuthResult, AuthenticationRequest, AuthenticationSession, Client, ClientManager,
    ConsentManager, ConsentRequest, ConsentRequestSessionData,
    ForcedObfuscatedAuthenticationSession, HandledAuthenticationRequest, HandledConsentRequest,
    Pagination, RequestDeniedError, TokenRevoker,
};
use gatehouse_storage::{DocumentStore, Key, KeyedResult, Mutation, run_in_transaction};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::codec::{self, CodecError, Field, Loaded, Migration, Record};
use crate::error::{StorageResultExt, classify};
use crate::keys::{Kind, KeyScheme};

/// Stored in `err` when the request was not denied.
const NO_DENIAL: &str = "{}";

// =============================================================================
// Records
// =============================================================================

/// Persisted consent or authentication request.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RequestRecord {
    pub challenge: String,
    pub verifier: String,
    pub client_id: String,
    pub subject: String,
    pub request_url: String,
    pub skip: bool,
    pub requested_scope: Vec<String>,
    pub csrf: String,
    pub authenticated_at: Option<OffsetDateTime>,
    pub requested_at: Option<OffsetDateTime>,
    /// JSON-encoded OpenID Connect context.
    pub oidc_context: String,
}

impl Record for RequestRecord {
    const NAME: &'static str = "handshake request";
    const CURRENT_VERSION: i64 = 1;
    const FIELDS: &'static [Field<Self>] = &[
        Field::<Self>::text("vfr", |r| &mut r.verifier),
        Field::<Self>::text("cid", |r| &mut r.client_id),
        Field::<Self>::text("sub", |r| &mut r.subject),
        Field::<Self>::text("rurl", |r| &mut r.request_url).unindexed(),
        Field::<Self>::flag("skip", |r| &mut r.skip),
        Field::<Self>::joined("rscp", |r| &mut r.requested_scope),
        Field::<Self>::text("csrf", |r| &mut r.csrf),
        Field::<Self>::time("aat", |r| &mut r.authenticated_at),
        Field::<Self>::time("ra", |r| &mut r.requested_at),
        Field::<Self>::text("oidcctx", |r| &mut r.oidc_context).unindexed(),
    ];
    const MIGRATIONS: &'static [Migration<Self>] = &[];

    fn load_key(&mut self, key: &Key) {
        self.challenge = key.name().to_string();
    }

    fn before_save(&mut self) -> Result<(), CodecError> {
        if self.requested_at.is_none() {
            self.requested_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }
}

impl RequestRecord {
    fn from_request(request: &ConsentRequest) -> AuthResult<Self> {
        Ok(Self {
            challenge: request.challenge.clone(),
            verifier: request.verifier.clone(),
            client_id: request.client.client_id.clone(),
            subject: request.subject.clone(),
            request_url: request.request_url.clone(),
            skip: request.skip,
            requested_scope: request.requested_scope.clone(),
            csrf: request.csrf.clone(),
            authenticated_at: request.authenticated_at,
            requested_at: request.requested_at,
            oidc_context: serde_json::to_string(&request.oidc_context)?,
        })
    }

    fn into_request(self, client: Client) -> AuthResult<ConsentRequest> {
        let oidc_context = if self.oidc_context.is_empty() {
            Default::default()
        } else {
            serde_json::from_str(&self.oidc_context)?
        };

        Ok(ConsentRequest {
            challenge: self.challenge,
            verifier: self.verifier,
            client,
            subject: self.subject,
            request_url: self.request_url,
            skip: self.skip,
            requested_scope: self.requested_scope,
            csrf: self.csrf,
            authenticated_at: self.authenticated_at,
            requested_at: self.requested_at,
            oidc_context,
        })
    }
}

/// A handled record that can be redeemed once.
pub(crate) trait Redeemable: Record + Send {
    fn was_used(&mut self) -> &mut bool;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct HandledConsentRecord {
    pub challenge: String,
    pub granted_scope: Vec<String>,
    /// JSON-encoded ID token claims.
    pub session_id_token: String,
    /// JSON-encoded access token claims.
    pub session_access_token: String,
    pub remember: bool,
    pub remember_for: i64,
    /// JSON-encoded denial, `{}` when granted.
    pub error: String,
    pub requested_at: Option<OffsetDateTime>,
    pub was_used: bool,
    pub authenticated_at: Option<OffsetDateTime>,
}

impl Record for HandledConsentRecord {
    const NAME: &'static str = "handled consent request";
    const CURRENT_VERSION: i64 = 1;
    const FIELDS: &'static [Field<Self>] = &[
        Field::<Self>::joined("gscp", |r| &mut r.granted_scope),
        Field::<Self>::text("sidt", |r| &mut r.session_id_token).unindexed(),
        Field::<Self>::text("sact", |r| &mut r.session_access_token).unindexed(),
        Field::<Self>::flag("rmbr", |r| &mut r.remember),
        Field::<Self>::integer("rmbrf", |r| &mut r.remember_for),
        Field::<Self>::text("err", |r| &mut r.error).unindexed(),
        Field::<Self>::time("rat", |r| &mut r.requested_at),
        Field::<Self>::flag("wsu", |r| &mut r.was_used),
        Field::<Self>::time("aat", |r| &mut r.authenticated_at),
    ];
    const MIGRATIONS: &'static [Migration<Self>] = &[];

    fn load_key(&mut self, key: &Key) {
        self.challenge = key.name().to_string();
    }

    fn before_save(&mut self) -> Result<(), CodecError> {
        if self.requested_at.is_none() {
            self.requested_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }
}

impl Redeemable for HandledConsentRecord {
    fn was_used(&mut self) -> &mut bool {
        &mut self.was_used
    }
}

impl HandledConsentRecord {
    fn from_handled(challenge: &str, handled: &HandledConsentRequest) -> AuthResult<Self> {
        Ok(Self {
            challenge: challenge.to_string(),
            granted_scope: handled.granted_scope.clone(),
            session_id_token: serde_json::to_string(&handled.session.id_token)?,
            session_access_token: serde_json::to_string(&handled.session.access_token)?,
            remember: handled.remember,
            remember_for: handled.remember_for,
            error: encode_denial(handled.error.as_ref())?,
            requested_at: handled.requested_at,
            was_used: handled.was_used,
            authenticated_at: handled.authenticated_at,
        })
    }

    fn is_denied(&self) -> bool {
        !self.error.is_empty() && self.error != NO_DENIAL
    }

    fn into_handled(self, request: ConsentRequest) -> AuthResult<HandledConsentRequest> {
        Ok(HandledConsentRequest {
            challenge: self.challenge,
            granted_scope: self.granted_scope,
            session: ConsentRequestSessionData {
                access_token: decode_claims(&self.session_access_token)?,
                id_token: decode_claims(&self.session_id_token)?,
            },
            remember: self.remember,
            remember_for: self.remember_for,
            error: decode_denial(&self.error)?,
            requested_at: self.requested_at,
            authenticated_at: self.authenticated_at,
            was_used: self.was_used,
            consent_request: Some(request),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct HandledAuthenticationRecord {
    pub challenge: String,
    pub remember: bool,
    pub remember_for: i64,
    pub acr: String,
    pub subject: String,
    pub error: String,
    pub requested_at: Option<OffsetDateTime>,
    pub was_used: bool,
    pub authenticated_at: Option<OffsetDateTime>,
}

impl Record for HandledAuthenticationRecord {
    const NAME: &'static str = "handled authentication request";
    const CURRENT_VERSION: i64 = 1;
    const FIELDS: &'static [Field<Self>] = &[
        Field::<Self>::flag("rmbr", |r| &mut r.remember),
        Field::<Self>::integer("rmbrf", |r| &mut r.remember_for),
        Field::<Self>::text("acr", |r| &mut r.acr),
        Field::<Self>::text("sub", |r| &mut r.subject),
        Field::<Self>::text("err", |r| &mut r.error).unindexed(),
        Field::<Self>::time("rat", |r| &mut r.requested_at),
        Field::<Self>::flag("wsu", |r| &mut r.was_used),
        Field::<Self>::time("aat", |r| &mut r.authenticated_at),
    ];
    const MIGRATIONS: &'static [Migration<Self>] = &[];

    fn load_key(&mut self, key: &Key) {
        self.challenge = key.name().to_string();
    }

    fn before_save(&mut self) -> Result<(), CodecError> {
        if self.requested_at.is_none() {
            self.requested_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }
}

impl Redeemable for HandledAuthenticationRecord {
    fn was_used(&mut self) -> &mut bool {
        &mut self.was_used
    }
}

impl HandledAuthenticationRecord {
    fn from_handled(challenge: &str, handled: &HandledAuthenticationRequest) -> AuthResult<Self> {
        Ok(Self {
            challenge: challenge.to_string(),
            remember: handled.remember,
            remember_for: handled.remember_for,
            acr: handled.acr.clone(),
            subject: handled.subject.clone(),
            error: encode_denial(handled.error.as_ref())?,
            requested_at: handled.requested_at,
            was_used: handled.was_used,
            authenticated_at: handled.authenticated_at,
        })
    }

    fn into_handled(self, request: AuthenticationRequest) -> AuthResult<HandledAuthenticationRequest> {
        Ok(HandledAuthenticationRequest {
            challenge: self.challenge,
            remember: self.remember,
            remember_for: self.remember_for,
            acr: self.acr,
            subject: self.subject,
            error: decode_denial(&self.error)?,
            requested_at: self.requested_at,
            authenticated_at: self.authenticated_at,
            was_used: self.was_used,
            authentication_request: Some(request),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SessionRecord {
    pub id: String,
    pub authenticated_at: Option<OffsetDateTime>,
    pub subject: String,
}

impl Record for SessionRecord {
    const NAME: &'static str = "authentication session";
    const CURRENT_VERSION: i64 = 1;
    const FIELDS: &'static [Field<Self>] = &[
        Field::<Self>::time("aat", |r| &mut r.authenticated_at),
        Field::<Self>::text("sub", |r| &mut r.subject),
    ];
    const MIGRATIONS: &'static [Migration<Self>] = &[];

    fn load_key(&mut self, key: &Key) {
        self.id = key.name().to_string();
    }

    fn before_save(&mut self) -> Result<(), CodecError> {
        if self.authenticated_at.is_none() {
            self.authenticated_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ObfuscatedRecord {
    pub client_id: String,
    pub subject: String,
    pub subject_obfuscated: String,
}

impl Record for ObfuscatedRecord {
    const NAME: &'static str = "obfuscated authentication session";
    const CURRENT_VERSION: i64 = 1;
    const FIELDS: &'static [Field<Self>] = &[
        Field::<Self>::text("cid", |r| &mut r.client_id),
        Field::<Self>::text("sub", |r| &mut r.subject),
        Field::<Self>::text("subo", |r| &mut r.subject_obfuscated),
    ];
    const MIGRATIONS: &'static [Migration<Self>] = &[];

    fn load_key(&mut self, _key: &Key) {}
}

fn encode_denial(error: Option<&RequestDeniedError>) -> AuthResult<String> {
    match error {
        Some(error) => Ok(serde_json::to_string(error)?),
        None => Ok(NO_DENIAL.to_string()),
    }
}

fn decode_denial(raw: &str) -> AuthResult<Option<RequestDeniedError>> {
    if raw.is_empty() || raw == NO_DENIAL {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(raw)?))
}

fn decode_claims(raw: &str) -> AuthResult<serde_json::Map<String, serde_json::Value>> {
    if raw.is_empty() {
        return Ok(serde_json::Map::new());
    }
    Ok(serde_json::from_str(raw)?)
}

/// Treats `NotFound` as success.
fn tolerate_not_found(result: AuthResult<()>) -> AuthResult<()> {
    match result {
        Err(err) if err.is_not_found() => Ok(()),
        other => other,
    }
}

// =============================================================================
// Consent Manager
// =============================================================================

/// Handshake storage on a document store.
pub struct DatastoreConsentManager {
    store: Arc<dyn DocumentStore>,
    keys: KeyScheme,
    clients: Arc<dyn ClientManager>,
    revoker: Arc<dyn TokenRevoker>,
}

impl DatastoreConsentManager {
    /// Creates a consent manager.
    ///
    /// `revoker` is called for the tokens of every revoked consent session.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        keys: KeyScheme,
        clients: Arc<dyn ClientManager>,
        revoker: Arc<dyn TokenRevoker>,
    ) -> Self {
        Self {
            store,
            keys,
            clients,
            revoker,
        }
    }

    async fn insert<R: Record + Send>(&self, key: Key, mut record: R, context: &str) -> AuthResult<()> {
        let entity = codec::to_entity(key, &mut record)?;
        self.store
            .mutate(vec![Mutation::Insert(entity)])
            .await
            .context(context)
    }

    /// Reads a request, writes back a pending upgrade and resolves its client.
    async fn load_request(&self, kind: Kind, challenge: &str) -> AuthResult<ConsentRequest> {
        let key = self.keys.handshake(kind, challenge);
        let entity = self.store.get(&key).await.context("get handshake request")?;
        let Loaded {
            mut record,
            pending_upgrade,
        } = codec::load::<RequestRecord>(&entity)?;

        if pending_upgrade {
            debug!(key = %key, "writing back upgraded handshake request");
            let upgraded = codec::to_entity(key, &mut record)?;
            self.store
                .mutate(vec![Mutation::Update(upgraded)])
                .await
                .context("upgrade handshake request")?;
        }

        self.resolve_request(record).await
    }

    async fn resolve_request(&self, record: RequestRecord) -> AuthResult<ConsentRequest> {
        let client = self.clients.get_client(&record.client_id).await?;
        record.into_request(client)
    }

    /// Finds the request issued with `verifier` and marks its handled record
    /// as used.
    ///
    /// The read-check-write of `was_used` runs in one transaction, so of two
    /// concurrent redemptions at most one succeeds.
    async fn redeem<H: Redeemable>(
        &self,
        request_kind: Kind,
        handled_kind: Kind,
        verifier: &str,
    ) -> AuthResult<(ConsentRequest, H)> {
        let query = self
            .keys
            .handshake_query(request_kind)
            .eq("vfr", verifier);
        let matches = self
            .store
            .run_query(&query)
            .await
            .context("find request by verifier")?;

        let [entity] = matches.as_slice() else {
            return Err(AuthError::internal(format!(
                "expected 1 {request_kind}, got {} instead",
                matches.len()
            )));
        };
        let request = codec::load::<RequestRecord>(entity)?.record;

        let key = self.keys.handshake(handled_kind, &request.challenge);
        let handled = run_in_transaction(self.store.as_ref(), |tx| {
            let key = key.clone();
            Box::pin(async move {
                let entity = tx.get(&key).await.context("get handled request")?;
                let mut handled = codec::load::<H>(&entity)?.record;
                if *handled.was_used() {
                    return Err(AuthError::already_used(format!(
                        "verifier of {} has been used already",
                        key.name()
                    )));
                }
                *handled.was_used() = true;
                let entity = codec::to_entity(key, &mut handled)?;
                tx.mutate(vec![Mutation::Update(entity)]);
                Ok(handled)
            })
        })
        .await?;

        let request = self.resolve_request(request).await?;
        Ok((request, handled))
    }
}

#[async_trait]
impl ConsentManager for DatastoreConsentManager {
    #[instrument(skip(self, request), fields(challenge = %request.challenge))]
    async fn create_consent_request(&self, request: &ConsentRequest) -> AuthResult<()> {
        let key = self.keys.handshake(Kind::ConsentRequest, &request.challenge);
        self.insert(key, RequestRecord::from_request(request)?, "create consent request")
            .await
    }

    #[instrument(skip(self))]
    async fn get_consent_request(&self, challenge: &str) -> AuthResult<ConsentRequest> {
        self.load_request(Kind::ConsentRequest, challenge).await
    }

    #[instrument(skip(self, handled))]
    async fn handle_consent_request(
        &self,
        challenge: &str,
        handled: &HandledConsentRequest,
    ) -> AuthResult<ConsentRequest> {
        let key = self.keys.handshake(Kind::ConsentRequestHandled, challenge);
        let record = HandledConsentRecord::from_handled(challenge, handled)?;
        self.insert(key, record, "handle consent request").await?;
        self.load_request(Kind::ConsentRequest, challenge).await
    }

    #[instrument(skip(self, verifier))]
    async fn verify_and_invalidate_consent_request(
        &self,
        verifier: &str,
    ) -> AuthResult<HandledConsentRequest> {
        let (request, handled) = self
            .redeem::<HandledConsentRecord>(Kind::ConsentRequest, Kind::ConsentRequestHandled, verifier)
            .await?;
        handled.into_handled(request)
    }

    #[instrument(skip(self))]
    async fn find_previously_granted_consent_requests(
        &self,
        client_id: Option<&str>,
        subject: &str,
        page: Option<Pagination>,
    ) -> AuthResult<Vec<HandledConsentRequest>> {
        let mut query = self
            .keys
            .handshake_query(Kind::ConsentRequest)
            .eq("sub", subject)
            .eq("skip", false);
        if let Some(client_id) = client_id {
            query = query.eq("cid", client_id);
        }

        let requests = self
            .store
            .run_query(&query)
            .await
            .context("find consent requests")?
            .iter()
            .map(|entity| codec::load::<RequestRecord>(entity).map(|loaded| loaded.record))
            .collect::<Result<Vec<_>, _>>()?;

        let handled_keys: Vec<Key> = requests
            .iter()
            .map(|r| self.keys.handshake(Kind::ConsentRequestHandled, &r.challenge))
            .collect();
        let results = self
            .store
            .get_multi(&handled_keys)
            .await
            .context("get handled consent requests")?;

        let now = OffsetDateTime::now_utc();
        let mut granted = Vec::new();
        for (request, KeyedResult { result, .. }) in requests.into_iter().zip(results) {
            let entity = match result {
                Ok(entity) => entity,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(classify(err, "get handled consent requests")),
            };
            let handled = codec::load::<HandledConsentRecord>(&entity)?.record;
            if !handled.remember || handled.is_denied() {
                continue;
            }

            let handled = handled.into_handled(self.resolve_request(request).await?)?;
            if handled.is_expired_at(now) {
                continue;
            }
            granted.push(handled);
        }

        if granted.is_empty() {
            return Err(AuthError::NoPreviousConsent);
        }
        debug!(count = granted.len(), "found previously granted consent");

        Ok(match page {
            Some(page) => page.apply(granted),
            None => granted,
        })
    }

    #[instrument(skip(self))]
    async fn revoke_consent_session(&self, subject: &str, client_id: Option<&str>) -> AuthResult<()> {
        let mut query = self
            .keys
            .handshake_query(Kind::ConsentRequest)
            .eq("sub", subject);
        if let Some(client_id) = client_id {
            query = query.eq("cid", client_id);
        }

        let request_keys = self
            .store
            .run_keys_query(&query)
            .await
            .context("find consent sessions")?;
        if request_keys.is_empty() {
            return Err(AuthError::not_found(format!("no consent session for {subject}")));
        }

        let handled_keys: Vec<Key> = request_keys
            .iter()
            .map(|k| self.keys.handshake(Kind::ConsentRequestHandled, k.name()))
            .collect();
        let results = self
            .store
            .get_multi(&handled_keys)
            .await
            .context("get handled consent requests")?;

        // Every per-key result is checked before anything is revoked.
        let mut resolved = Vec::new();
        for (request_key, KeyedResult { key, result }) in request_keys.into_iter().zip(results) {
            match result {
                Ok(_) => resolved.push((request_key, key)),
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(classify(err, "get handled consent requests")),
            }
        }
        if resolved.is_empty() {
            return Err(AuthError::not_found(format!(
                "no handled consent session for {subject}"
            )));
        }

        let mut to_delete = Vec::with_capacity(resolved.len() * 2);
        for (request_key, handled_key) in resolved {
            let challenge = handled_key.name();
            tolerate_not_found(self.revoker.revoke_access_token(challenge).await)?;
            tolerate_not_found(self.revoker.revoke_refresh_token(challenge).await)?;
            to_delete.push(request_key);
            to_delete.push(handled_key);
        }

        debug!(count = to_delete.len(), "deleting consent sessions");
        self.store
            .delete_multi(&to_delete)
            .await
            .context("delete consent sessions")
    }

    #[instrument(skip(self, request), fields(challenge = %request.challenge))]
    async fn create_authentication_request(&self, request: &AuthenticationRequest) -> AuthResult<()> {
        let key = self
            .keys
            .handshake(Kind::AuthenticationRequest, &request.challenge);
        self.insert(
            key,
            RequestRecord::from_request(request)?,
            "create authentication request",
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_authentication_request(&self, challenge: &str) -> AuthResult<AuthenticationRequest> {
        self.load_request(Kind::AuthenticationRequest, challenge).await
    }

    #[instrument(skip(self, handled))]
    async fn handle_authentication_request(
        &self,
        challenge: &str,
        handled: &HandledAuthenticationRequest,
    ) -> AuthResult<AuthenticationRequest> {
        let key = self
            .keys
            .handshake(Kind::AuthenticationRequestHandled, challenge);
        let record = HandledAuthenticationRecord::from_handled(challenge, handled)?;
        self.insert(key, record, "handle authentication request").await?;
        self.load_request(Kind::AuthenticationRequest, challenge).await
    }

    #[instrument(skip(self, verifier))]
    async fn verify_and_invalidate_authentication_request(
        &self,
        verifier: &str,
    ) -> AuthResult<HandledAuthenticationRequest> {
        let (request, handled) = self
            .redeem::<HandledAuthenticationRecord>(
                Kind::AuthenticationRequest,
                Kind::AuthenticationRequestHandled,
                verifier,
            )
            .await?;
        handled.into_handled(request)
    }

    #[instrument(skip(self, session), fields(id = %session.id))]
    async fn create_authentication_session(&self, session: &AuthenticationSession) -> AuthResult<()> {
        let key = self.keys.handshake(Kind::AuthenticationSession, &session.id);
        let record = SessionRecord {
            id: session.id.clone(),
            authenticated_at: session.authenticated_at,
            subject: session.subject.clone(),
        };
        self.insert(key, record, "create authentication session").await
    }

    #[instrument(skip(self))]
    async fn get_authentication_session(&self, id: &str) -> AuthResult<AuthenticationSession> {
        let key = self.keys.handshake(Kind::AuthenticationSession, id);
        let entity = self
            .store
            .get(&key)
            .await
            .context("get authentication session")?;
        let record = codec::load::<SessionRecord>(&entity)?.record;

        Ok(AuthenticationSession {
            id: record.id,
            authenticated_at: record.authenticated_at,
            subject: record.subject,
        })
    }

    /// Deleting an absent session succeeds.
    #[instrument(skip(self))]
    async fn delete_authentication_session(&self, id: &str) -> AuthResult<()> {
        let key = self.keys.handshake(Kind::AuthenticationSession, id);
        self.store
            .delete_multi(&[key])
            .await
            .context("delete authentication session")
    }

    #[instrument(skip(self))]
    async fn revoke_user_authentication_session(&self, subject: &str) -> AuthResult<()> {
        let query = self
            .keys
            .handshake_query(Kind::AuthenticationSession)
            .eq("sub", subject);
        let keys = self
            .store
            .run_keys_query(&query)
            .await
            .context("find authentication sessions")?;

        if keys.is_empty() {
            return Err(AuthError::not_found(format!(
                "no authentication session for {subject}"
            )));
        }
        self.store
            .delete_multi(&keys)
            .await
            .context("revoke authentication sessions")
    }

    #[instrument(skip(self, session), fields(client_id = %session.client_id))]
    async fn create_forced_obfuscated_authentication_session(
        &self,
        session: &ForcedObfuscatedAuthenticationSession,
    ) -> AuthResult<()> {
        let key = self.keys.handshake(
            Kind::ObfuscatedAuthenticationSession,
            &format!("{}{}", session.client_id, session.subject),
        );
        let mut record = ObfuscatedRecord {
            client_id: session.client_id.clone(),
            subject: session.subject.clone(),
            subject_obfuscated: session.subject_obfuscated.clone(),
        };
        let entity = codec::to_entity(key, &mut record)?;
        self.store
            .mutate(vec![Mutation::Upsert(entity)])
            .await
            .context("upsert obfuscated authentication session")
    }

    #[instrument(skip(self))]
    async fn get_forced_obfuscated_authentication_session(
        &self,
        client_id: &str,
        subject_obfuscated: &str,
    ) -> AuthResult<ForcedObfuscatedAuthenticationSession> {
        let query = self
            .keys
            .handshake_query(Kind::ObfuscatedAuthenticationSession)
            .eq("cid", client_id)
            .eq("subo", subject_obfuscated)
            .limit(1);
        let entities = self
            .store
            .run_query(&query)
            .await
            .context("find obfuscated authentication session")?;

        let Some(entity) = entities.first() else {
            return Err(AuthError::not_found(format!(
                "no obfuscated session for {client_id}"
            )));
        };
        let record = codec::load::<ObfuscatedRecord>(entity)?.record;

        Ok(ForcedObfuscatedAuthenticationSession {
            client_id: record.client_id,
            subject: record.subject,
            subject_obfuscated: record.subject_obfuscated,
        })
    }
}
