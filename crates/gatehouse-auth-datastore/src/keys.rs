//! Document kinds and key construction.
//!
//! Tokens, clients, groups and unique reservations are root keys. Handshake
//! kinds live under a fixed per-kind ancestor so that queries over them are
//! strongly consistent ancestor queries. JWK entries are children of their
//! key-set key. Every key carries the configured namespace.

use gatehouse_storage::{Key, Query};

/// Name of the fixed ancestor of handshake kinds.
pub const DEFAULT_ANCESTOR: &str = "default";

/// Every document kind written by the datastore backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Client,
    OpenIdConnectSession,
    AccessToken,
    RefreshToken,
    AuthorizeCode,
    PkceRequest,
    Unique,
    ConsentRequest,
    ConsentRequestHandled,
    AuthenticationRequest,
    AuthenticationRequestHandled,
    AuthenticationSession,
    ObfuscatedAuthenticationSession,
    Jwk,
    Group,
}

impl Kind {
    /// Persisted kind name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "Client",
            Self::OpenIdConnectSession => "OAuth2OIDC",
            Self::AccessToken => "OAuth2Access",
            Self::RefreshToken => "OAuth2Refresh",
            Self::AuthorizeCode => "OAuth2Code",
            Self::PkceRequest => "OAuth2PKCE",
            Self::Unique => "Unique",
            Self::ConsentRequest => "ConsentRequest",
            Self::ConsentRequestHandled => "ConsentRequestHandled",
            Self::AuthenticationRequest => "AuthenticationRequest",
            Self::AuthenticationRequestHandled => "AuthenticationRequestHandled",
            Self::AuthenticationSession => "AuthenticationSession",
            Self::ObfuscatedAuthenticationSession => "ObfuscatedAuthenticationSession",
            Self::Jwk => "JWK",
            Self::Group => "Group",
        }
    }

    /// Handshake kinds are stored under `(<kind>, "default")`.
    pub fn is_handshake(self) -> bool {
        matches!(
            self,
            Self::ConsentRequest
                | Self::ConsentRequestHandled
                | Self::AuthenticationRequest
                | Self::AuthenticationRequestHandled
                | Self::AuthenticationSession
                | Self::ObfuscatedAuthenticationSession
        )
    }

    #[cfg(test)]
    const ALL: [Kind; 15] = [
        Self::Client,
        Self::OpenIdConnectSession,
        Self::AccessToken,
        Self::RefreshToken,
        Self::AuthorizeCode,
        Self::PkceRequest,
        Self::Unique,
        Self::ConsentRequest,
        Self::ConsentRequestHandled,
        Self::AuthenticationRequest,
        Self::AuthenticationRequestHandled,
        Self::AuthenticationSession,
        Self::ObfuscatedAuthenticationSession,
        Self::Jwk,
        Self::Group,
    ];
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds namespace-qualified keys and queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyScheme {
    namespace: String,
}

impl KeyScheme {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Key of a root-level document.
    pub fn root(&self, kind: Kind, name: &str) -> Key {
        Key::name_key(kind.as_str(), name, None).with_namespace(self.namespace.as_str())
    }

    /// The fixed ancestor shared by all documents of a handshake kind.
    pub fn handshake_ancestor(&self, kind: Kind) -> Key {
        self.root(kind, DEFAULT_ANCESTOR)
    }

    /// Key of a handshake document.
    pub fn handshake(&self, kind: Kind, id: &str) -> Key {
        debug_assert!(kind.is_handshake(), "{kind} is not a handshake kind");
        Key::name_key(kind.as_str(), id, Some(self.handshake_ancestor(kind)))
    }

    /// Key of a uniqueness reservation: name is `<kind><natural key>`.
    pub fn unique(&self, kind: Kind, natural_key: &str) -> Key {
        self.root(Kind::Unique, &format!("{}{natural_key}", kind.as_str()))
    }

    pub fn client(&self, id: &str) -> Key {
        self.root(Kind::Client, id)
    }

    pub fn group(&self, id: &str) -> Key {
        self.root(Kind::Group, id)
    }

    /// Parent key of a JWK set.
    pub fn jwk_set(&self, set: &str) -> Key {
        self.root(Kind::Jwk, set)
    }

    pub fn jwk(&self, set: &str, kid: &str) -> Key {
        Key::name_key(Kind::Jwk.as_str(), kid, Some(self.jwk_set(set)))
    }

    /// Query over a kind in this namespace.
    pub fn query(&self, kind: Kind) -> Query {
        Query::new(kind.as_str()).namespace(self.namespace.as_str())
    }

    /// Strongly consistent query over a handshake kind.
    pub fn handshake_query(&self, kind: Kind) -> Query {
        self.query(kind).ancestor(self.handshake_ancestor(kind))
    }

    /// Strongly consistent query over the keys of one JWK set.
    pub fn jwk_set_query(&self, set: &str) -> Query {
        self.query(Kind::Jwk).ancestor(self.jwk_set(set))
    }
}
