//! OAuth 2.0 client registration.

use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};

/// Token endpoint authentication method of public clients.
pub const AUTH_METHOD_NONE: &str = "none";

/// A registered OAuth 2.0 / OpenID Connect client.
///
/// `secret` holds the plaintext secret on the way in and the hash once the
/// client has been read back from storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    pub name: String,
    pub secret: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    /// Space-separated scope string.
    pub scope: String,
    pub owner: String,
    pub policy_uri: String,
    pub terms_of_service_uri: String,
    pub client_uri: String,
    pub logo_uri: String,
    pub contacts: Vec<String>,
    /// Unix seconds; `0` means the secret never expires.
    pub secret_expires_at: i64,
    pub sector_identifier_uri: String,
    pub jwks_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks: Option<JwkSet>,
    pub token_endpoint_auth_method: String,
    pub request_uris: Vec<String>,
    pub subject_type: String,
    pub request_object_signing_algorithm: String,
    pub userinfo_signed_response_algorithm: String,
    pub allowed_cors_origins: Vec<String>,
}

impl Client {
    /// Creates a client with only its identifier set.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    /// Public clients authenticate without a secret.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.token_endpoint_auth_method == AUTH_METHOD_NONE
    }

    /// Individual scope tokens of [`Self::scope`].
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_client() {
        let mut client = Client::new("spa");
        assert!(!client.is_public());

        client.token_endpoint_auth_method = AUTH_METHOD_NONE.to_string();
        assert!(client.is_public());
    }

    #[test]
    fn test_scopes() {
        let client = Client {
            scope: "openid  offline profile".to_string(),
            ..Client::new("app")
        };
        assert_eq!(client.scopes().collect::<Vec<_>>(), vec!["openid", "offline", "profile"]);
    }
}
