//! Authorization requests as persisted behind tokens and codes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use super::client::Client;
use crate::AuthResult;
use crate::error::AuthError;

/// Session payload attached to a request.
///
/// The payload is opaque to storage: it is serialized to JSON bytes and
/// restored into the caller's concrete type on read. Only the subject is
/// lifted into an indexed property.
pub trait Session: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn subject(&self) -> &str;
}

/// A plain session carrying a subject and free-form claims.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultSession {
    pub subject: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl DefaultSession {
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }
}

impl Session for DefaultSession {
    fn subject(&self) -> &str {
        &self.subject
    }
}

/// An authorization request as seen by token storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Request<S> {
    pub id: String,
    pub requested_at: OffsetDateTime,
    pub client: Client,
    pub requested_scopes: Vec<String>,
    pub granted_scopes: Vec<String>,
    /// Submitted form fields, in submission order.
    pub form: Vec<(String, String)>,
    pub session: Option<S>,
}

impl<S: Session> Request<S> {
    /// Creates a request for `client` with a fresh timestamp.
    #[must_use]
    pub fn new(id: impl Into<String>, client: Client, session: S) -> Self {
        Self {
            id: id.into(),
            requested_at: OffsetDateTime::now_utc(),
            client,
            requested_scopes: Vec::new(),
            granted_scopes: Vec::new(),
            form: Vec::new(),
            session: Some(session),
        }
    }

    /// Subject of the attached session, or empty when there is none.
    pub fn subject(&self) -> &str {
        self.session.as_ref().map(Session::subject).unwrap_or_default()
    }

    /// First value of a form field.
    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Result of looking up a token-backed request.
///
/// An exchanged authorization code still resolves to its request so the
/// protocol engine can revoke tokens minted from it; callers that need an
/// active session use [`SessionLookup::into_active`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionLookup<S> {
    Active(Request<S>),
    InvalidatedCode(Request<S>),
}

impl<S> SessionLookup<S> {
    pub fn request(&self) -> &Request<S> {
        match self {
            Self::Active(request) | Self::InvalidatedCode(request) => request,
        }
    }

    pub fn into_request(self) -> Request<S> {
        match self {
            Self::Active(request) | Self::InvalidatedCode(request) => request,
        }
    }

    pub fn is_invalidated(&self) -> bool {
        matches!(self, Self::InvalidatedCode(_))
    }

    /// Returns the request, or `InvalidatedAuthorizeCode` for an exchanged code.
    pub fn into_active(self) -> AuthResult<Request<S>> {
        match self {
            Self::Active(request) => Ok(request),
            Self::InvalidatedCode(_) => Err(AuthError::InvalidatedAuthorizeCode),
        }
    }
}
