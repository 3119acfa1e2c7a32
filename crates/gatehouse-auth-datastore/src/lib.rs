//! Document store backend for gatehouse-auth
//!
//! Provides persistent storage for:
//!
//! - OAuth 2.0 / OpenID Connect token sessions (access, refresh, authorization
//!   code, PKCE, OIDC)
//! - Login and consent handshakes, authentication sessions and pairwise
//!   subjects
//! - Registered clients
//! - JSON Web Key sets (encrypted at rest)
//! - Subject groups
//!
//! Every record type carries a schema version and is upgraded lazily on read;
//! see [`codec`]. Documents are laid out by [`keys::KeyScheme`] and are
//! isolated per namespace.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gatehouse_auth::{Argon2Hasher, ClientStorage};
//! use gatehouse_auth_datastore::DatastoreConnection;
//!
//! let connection = DatastoreConnection::in_memory("tenant-a");
//! let clients = Arc::new(connection.new_client_manager(Arc::new(Argon2Hasher)));
//! let tokens = connection.new_oauth2_manager(clients.clone(), Duration::from_secs(3600));
//! let consent = connection.new_consent_manager(clients, Arc::new(tokens));
//! ```

pub mod client;
pub mod codec;
pub mod connection;
pub mod consent;
pub mod error;
pub mod group;
pub mod jwk;
pub mod keys;
pub mod token;
mod unique;

pub use client::DatastoreClientManager;
pub use codec::CodecError;
pub use connection::DatastoreConnection;
pub use consent::DatastoreConsentManager;
pub use error::classify;
pub use group::DatastoreGroupManager;
pub use jwk::DatastoreJwkManager;
pub use keys::{DEFAULT_ANCESTOR, KeyScheme, Kind};
pub use token::{DatastoreTokenStore, TokenKind};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        DatastoreClientManager, DatastoreConnection, DatastoreConsentManager,
        DatastoreGroupManager, DatastoreJwkManager, DatastoreTokenStore, TokenKind,
    };
}
