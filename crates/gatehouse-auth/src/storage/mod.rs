//! Storage traits for authorization data.
//!
//! This module defines storage interfaces for:
//!
//! - OAuth client registrations
//! - Authorization codes, access/refresh tokens, OIDC and PKCE sessions
//! - Login and consent handshakes
//! - Signing keys
//! - Subject groups
//!
//! # Implementations
//!
//! Storage implementations are provided in separate crates:
//!
//! - `gatehouse-auth-datastore` - document store backend

pub mod client;
pub mod consent;
pub mod group;
pub mod jwk;
pub mod oauth2;

pub use client::{ClientManager, ClientStorage};
pub use consent::ConsentManager;
pub use group::GroupManager;
pub use jwk::JwkManager;
pub use oauth2::{OAuth2Storage, TokenRevoker};
