//! # gatehouse-auth
//!
//! OAuth 2.0 / OpenID Connect persistence contracts for gatehouse.
//!
//! This crate provides:
//! - Domain types for clients, token-backed requests and consent handshakes
//! - Storage traits implemented by backends and consumed by the protocol engine
//! - The [`AuthError`] taxonomy every store reports through
//! - Secret hashing ([`hasher`]) and at-rest encryption ([`cipher`])
//!
//! ## Modules
//!
//! - [`types`] - Domain types
//! - [`storage`] - Storage traits for auth-related data
//! - [`error`] - Error taxonomy and store error classification
//! - [`hasher`] - Argon2id secret hashing
//! - [`cipher`] - AES-256-GCM encryption

pub mod cipher;
pub mod error;
pub mod hasher;
pub mod storage;
pub mod types;

pub use cipher::{AeadCipher, Cipher};
pub use error::{AuthError, ErrorCategory};
pub use hasher::{Argon2Hasher, Hasher, TracedHasher};
pub use storage::{
    ClientManager, ClientStorage, ConsentManager, GroupManager, JwkManager, OAuth2Storage,
    TokenRevoker,
};
pub use types::{
    AuthenticationRequest, AuthenticationSession, Client, ConsentRequest,
    ConsentRequestSessionData, DefaultSession, ForcedObfuscatedAuthenticationSession, Group,
    HandledAuthenticationRequest, HandledConsentRequest, OpenIdConnectContext, Pagination,
    Request, RequestDeniedError, Session, SessionLookup,
};

/// Result type for authorization persistence operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        AuthError, AuthResult, Client, ClientManager, ConsentManager, OAuth2Storage, Request,
        Session, SessionLookup, TokenRevoker,
    };
}
