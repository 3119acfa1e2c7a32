//! Login and consent handshake types.
//!
//! A handshake starts with a request (identified by a challenge), is answered
//! by the login/consent application with a handled record, and is redeemed
//! exactly once by presenting the request's verifier.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use super::client::Client;

/// OpenID Connect parameters of the originating authorization request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenIdConnectContext {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acr_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ui_locales: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub id_token_hint_claims: Map<String, Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub login_hint: String,
}

/// A pending consent (or authentication) request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsentRequest {
    pub challenge: String,
    /// Secret handed back to the protocol engine to redeem the handshake.
    pub verifier: String,
    pub client: Client,
    pub subject: String,
    pub request_url: String,
    /// Set when the request may be answered without user interaction.
    pub skip: bool,
    pub requested_scope: Vec<String>,
    pub csrf: String,
    pub authenticated_at: Option<OffsetDateTime>,
    /// Filled with the current time on save when absent.
    pub requested_at: Option<OffsetDateTime>,
    pub oidc_context: OpenIdConnectContext,
}

/// Authentication requests share the consent request shape.
pub type AuthenticationRequest = ConsentRequest;

/// A denial reported by the login or consent application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDeniedError {
    #[serde(rename = "error", default)]
    pub name: String,
    #[serde(rename = "error_description", default)]
    pub description: String,
    #[serde(rename = "error_hint", default)]
    pub hint: String,
    #[serde(rename = "status_code", default)]
    pub code: i64,
    #[serde(rename = "error_debug", default)]
    pub debug: String,
}

impl RequestDeniedError {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Self::default()
        }
    }
}

/// Claims the consent application asks to embed in issued tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsentRequestSessionData {
    #[serde(default)]
    pub access_token: Map<String, Value>,
    #[serde(default)]
    pub id_token: Map<String, Value>,
}

/// The consent application's answer to a [`ConsentRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandledConsentRequest {
    pub challenge: String,
    pub granted_scope: Vec<String>,
    pub session: ConsentRequestSessionData,
    pub remember: bool,
    /// Seconds the decision is remembered; `0` means forever.
    pub remember_for: i64,
    pub error: Option<RequestDeniedError>,
    pub requested_at: Option<OffsetDateTime>,
    pub authenticated_at: Option<OffsetDateTime>,
    pub was_used: bool,
    /// The matched request; populated on reads.
    pub consent_request: Option<ConsentRequest>,
}

impl HandledConsentRequest {
    /// Returns `true` once the remembered decision has lapsed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        if self.remember_for <= 0 {
            return false;
        }
        match self.requested_at {
            // Past the representable range never lapses.
            Some(requested_at) => requested_at
                .checked_add(time::Duration::seconds(self.remember_for))
                .is_some_and(|expires_at| expires_at < now),
            None => false,
        }
    }
}

/// The login application's answer to an [`AuthenticationRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandledAuthenticationRequest {
    pub challenge: String,
    pub remember: bool,
    pub remember_for: i64,
    pub acr: String,
    pub subject: String,
    pub error: Option<RequestDeniedError>,
    pub requested_at: Option<OffsetDateTime>,
    pub authenticated_at: Option<OffsetDateTime>,
    pub was_used: bool,
    pub authentication_request: Option<AuthenticationRequest>,
}

/// A remembered login of a subject at the authorization server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationSession {
    pub id: String,
    /// Filled with the current time on save when absent.
    pub authenticated_at: Option<OffsetDateTime>,
    pub subject: String,
}

/// A fixed pairwise subject identifier for one client and subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForcedObfuscatedAuthenticationSession {
    pub client_id: String,
    pub subject: String,
    pub subject_obfuscated: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_remember_for_expiry() {
        let now = OffsetDateTime::now_utc();
        let mut handled = HandledConsentRequest {
            remember: true,
            remember_for: 60,
            requested_at: Some(now - Duration::seconds(120)),
            ..HandledConsentRequest::default()
        };
        assert!(handled.is_expired_at(now));

        handled.remember_for = 0;
        assert!(!handled.is_expired_at(now));

        handled.remember_for = 600;
        assert!(!handled.is_expired_at(now));
    }

    #[test]
    fn test_huge_remember_for_never_expires() {
        let now = OffsetDateTime::now_utc();
        let mut handled = HandledConsentRequest {
            remember: true,
            remember_for: 1_000_000_000_000,
            requested_at: Some(now),
            ..HandledConsentRequest::default()
        };
        assert!(!handled.is_expired_at(now));

        handled.remember_for = i64::MAX;
        assert!(!handled.is_expired_at(now));
    }

    #[test]
    fn test_denied_error_wire_names() {
        let err = RequestDeniedError::new("access_denied", "user said no");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"], "access_denied");
        assert_eq!(json["error_description"], "user said no");
    }
}
