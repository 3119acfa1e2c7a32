//! Login and consent handshake storage.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::{
    AuthenticationRequest, AuthenticationSession, ConsentRequest,
    ForcedObfuscatedAuthenticationSession, HandledAuthenticationRequest, HandledConsentRequest,
    Pagination,
};

/// Storage for the request → handled → redeemed handshake workflow.
#[async_trait]
pub trait ConsentManager: Send + Sync {
    // -------------------------------------------------------------------------
    // Consent
    // -------------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns `AlreadyExists` if the challenge is taken.
    async fn create_consent_request(&self, request: &ConsentRequest) -> AuthResult<()>;

    async fn get_consent_request(&self, challenge: &str) -> AuthResult<ConsentRequest>;

    /// Records the consent decision and returns the re-read request.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the challenge was handled before.
    async fn handle_consent_request(
        &self,
        challenge: &str,
        handled: &HandledConsentRequest,
    ) -> AuthResult<ConsentRequest>;

    /// Redeems the handshake identified by `verifier` exactly once.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyUsed` on the second redemption.
    async fn verify_and_invalidate_consent_request(
        &self,
        verifier: &str,
    ) -> AuthResult<HandledConsentRequest>;

    /// Remembered, non-denied, unexpired decisions of `subject`, optionally
    /// restricted to one client.
    ///
    /// # Errors
    ///
    /// Returns `NoPreviousConsent` when nothing qualifies.
    async fn find_previously_granted_consent_requests(
        &self,
        client_id: Option<&str>,
        subject: &str,
        page: Option<Pagination>,
    ) -> AuthResult<Vec<HandledConsentRequest>>;

    /// Removes the consent handshakes of `subject` (optionally for one client)
    /// and revokes the tokens issued under them.
    async fn revoke_consent_session(&self, subject: &str, client_id: Option<&str>) -> AuthResult<()>;

    // -------------------------------------------------------------------------
    // Authentication
    // -------------------------------------------------------------------------

    async fn create_authentication_request(&self, request: &AuthenticationRequest) -> AuthResult<()>;

    async fn get_authentication_request(&self, challenge: &str) -> AuthResult<AuthenticationRequest>;

    async fn handle_authentication_request(
        &self,
        challenge: &str,
        handled: &HandledAuthenticationRequest,
    ) -> AuthResult<AuthenticationRequest>;

    async fn verify_and_invalidate_authentication_request(
        &self,
        verifier: &str,
    ) -> AuthResult<HandledAuthenticationRequest>;

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    async fn create_authentication_session(&self, session: &AuthenticationSession) -> AuthResult<()>;

    async fn get_authentication_session(&self, id: &str) -> AuthResult<AuthenticationSession>;

    async fn delete_authentication_session(&self, id: &str) -> AuthResult<()>;

    /// Deletes every authentication session of `subject`.
    async fn revoke_user_authentication_session(&self, subject: &str) -> AuthResult<()>;

    /// Creates or replaces the pairwise subject for a client and subject.
    async fn create_forced_obfuscated_authentication_session(
        &self,
        session: &ForcedObfuscatedAuthenticationSession,
    ) -> AuthResult<()>;

    async fn get_forced_obfuscated_authentication_session(
        &self,
        client_id: &str,
        subject_obfuscated: &str,
    ) -> AuthResult<ForcedObfuscatedAuthenticationSession>;
}
