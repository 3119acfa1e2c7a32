//! Token and session storage traits consumed by the protocol engine.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::{Request, Session, SessionLookup};

/// Revocation by request id.
///
/// This is the object-safe subset of [`OAuth2Storage`] the consent store
/// needs when a consent session is revoked.
#[async_trait]
pub trait TokenRevoker: Send + Sync {
    /// Deletes every access token minted for `request_id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no token matches.
    async fn revoke_access_token(&self, request_id: &str) -> AuthResult<()>;

    /// Deletes every refresh token minted for `request_id`.
    async fn revoke_refresh_token(&self, request_id: &str) -> AuthResult<()>;
}

/// Per-kind token storage used by the OAuth2 protocol engine.
///
/// Signatures are opaque strings chosen by the token strategy; `S` is the
/// protocol engine's session payload.
#[async_trait]
pub trait OAuth2Storage<S: Session>: TokenRevoker {
    async fn create_open_id_connect_session(&self, signature: &str, request: &Request<S>) -> AuthResult<()>;
    async fn get_open_id_connect_session(&self, signature: &str) -> AuthResult<Request<S>>;
    async fn delete_open_id_connect_session(&self, signature: &str) -> AuthResult<()>;

    async fn create_authorize_code_session(&self, signature: &str, request: &Request<S>) -> AuthResult<()>;
    /// Resolves a code. An exchanged code yields [`SessionLookup::InvalidatedCode`].
    async fn get_authorize_code_session(&self, signature: &str) -> AuthResult<SessionLookup<S>>;
    async fn invalidate_authorize_code_session(&self, signature: &str) -> AuthResult<()>;
    async fn delete_authorize_code_session(&self, signature: &str) -> AuthResult<()>;

    /// # Errors
    ///
    /// Returns `AlreadyExists` when a token for the same request id exists.
    async fn create_access_token_session(&self, signature: &str, request: &Request<S>) -> AuthResult<()>;
    async fn get_access_token_session(&self, signature: &str) -> AuthResult<Request<S>>;
    async fn delete_access_token_session(&self, signature: &str) -> AuthResult<()>;

    /// Implicit grants store their tokens as plain access tokens.
    async fn create_implicit_access_token_session(&self, signature: &str, request: &Request<S>) -> AuthResult<()> {
        self.create_access_token_session(signature, request).await
    }

    async fn create_refresh_token_session(&self, signature: &str, request: &Request<S>) -> AuthResult<()>;
    async fn get_refresh_token_session(&self, signature: &str) -> AuthResult<Request<S>>;
    async fn delete_refresh_token_session(&self, signature: &str) -> AuthResult<()>;

    async fn create_pkce_request_session(&self, signature: &str, request: &Request<S>) -> AuthResult<()>;
    async fn get_pkce_request_session(&self, signature: &str) -> AuthResult<Request<S>>;
    async fn delete_pkce_request_session(&self, signature: &str) -> AuthResult<()>;

    /// Deletes access tokens requested before both `not_after` and the
    /// configured access token lifespan.
    async fn flush_inactive_access_tokens(&self, not_after: OffsetDateTime) -> AuthResult<()>;
}
