//! Authorization persistence error types.
//!
//! Every store in gatehouse reports failures through [`AuthError`]. Document
//! store errors are classified at the boundary (see the `From<StorageError>`
//! implementation) so callers can branch on the variant without knowing which
//! backend produced it.

use std::fmt;

use gatehouse_storage::StorageError;

/// Boxed error source carried by [`AuthError::Unknown`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by the OAuth2 / OpenID Connect persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The requested record does not exist.
    #[error("Not found: {message}")]
    NotFound {
        /// What was looked up.
        message: String,
    },

    /// A record with the same identity, or a unique reservation, already exists.
    #[error("Already exists: {message}")]
    AlreadyExists {
        /// What collided.
        message: String,
    },

    /// A single-use handshake record was redeemed a second time.
    #[error("Already used: {message}")]
    AlreadyUsed {
        /// What was redeemed.
        message: String,
    },

    /// A stored record carries a schema version this build cannot read.
    #[error("Unexpected schema version: {message}")]
    UnexpectedSchemaVersion {
        /// Record type and the offending version.
        message: String,
    },

    /// A retryable failure: network trouble, deadline or transaction conflict.
    #[error("Transient storage failure: {message}")]
    Transient {
        /// Description of the failure.
        message: String,
    },

    /// An unclassified failure passed through with context.
    #[error("{context}: {source}")]
    Unknown {
        /// Operation that failed.
        context: String,
        /// Underlying error.
        #[source]
        source: BoxError,
    },

    /// The token exists but has been deactivated.
    #[error("Token is inactive")]
    InactiveToken,

    /// The authorization code was already exchanged.
    #[error("Authorization code has been invalidated")]
    InvalidatedAuthorizeCode,

    /// No remembered consent matched the lookup.
    #[error("No previous consent found")]
    NoPreviousConsent,

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// Hashing, encryption or decryption failed.
    #[error("Crypto error: {message}")]
    Crypto {
        /// Description of the cryptographic failure.
        message: String,
    },

    /// The caller supplied data that cannot be stored.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of the invalid input.
        message: String,
    },

    /// An invariant of the stored data was violated.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists {
            message: message.into(),
        }
    }

    /// Creates a new `AlreadyUsed` error.
    #[must_use]
    pub fn already_used(message: impl Into<String>) -> Self {
        Self::AlreadyUsed {
            message: message.into(),
        }
    }

    /// Creates a new `UnexpectedSchemaVersion` error.
    #[must_use]
    pub fn unexpected_schema_version(message: impl Into<String>) -> Self {
        Self::UnexpectedSchemaVersion {
            message: message.into(),
        }
    }

    /// Creates a new `Transient` error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Wraps an arbitrary error with the operation that produced it.
    #[must_use]
    pub fn unknown(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Unknown {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a new `Crypto` error.
    #[must_use]
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    #[must_use]
    pub fn is_already_used(&self) -> bool {
        matches!(self, Self::AlreadyUsed { .. })
    }

    #[must_use]
    pub fn is_unexpected_schema_version(&self) -> bool {
        matches!(self, Self::UnexpectedSchemaVersion { .. })
    }

    /// Returns `true` if the operation may succeed when retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Returns `true` for the protocol signals a token lookup can produce.
    #[must_use]
    pub fn is_token_signal(&self) -> bool {
        matches!(self, Self::InactiveToken | Self::InvalidatedAuthorizeCode)
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AlreadyExists { .. } => ErrorCategory::Conflict,
            Self::AlreadyUsed { .. } => ErrorCategory::Conflict,
            Self::UnexpectedSchemaVersion { .. } => ErrorCategory::Schema,
            Self::Transient { .. } => ErrorCategory::Infrastructure,
            Self::Unknown { .. } => ErrorCategory::Infrastructure,
            Self::InactiveToken => ErrorCategory::Token,
            Self::InvalidatedAuthorizeCode => ErrorCategory::Token,
            Self::NoPreviousConsent => ErrorCategory::Consent,
            Self::Serialization { .. } => ErrorCategory::Schema,
            Self::Crypto { .. } => ErrorCategory::Crypto,
            Self::InvalidInput { .. } => ErrorCategory::Validation,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Classifies document store failures into the domain taxonomy.
///
/// Not-found and already-exists keep their meaning; conflicts and connection
/// failures become `Transient`; everything else passes through as `Unknown`.
impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { key } => Self::not_found(key),
            StorageError::AlreadyExists { key } => Self::already_exists(key),
            StorageError::Conflict { message } | StorageError::ConnectionError { message } => {
                Self::transient(message)
            }
            other => Self::unknown("document store", other),
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Categories of persistence errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing records.
    NotFound,
    /// Existence or single-use conflicts.
    Conflict,
    /// Token state signals.
    Token,
    /// Consent lookups.
    Consent,
    /// Stored data that cannot be decoded.
    Schema,
    /// Store availability.
    Infrastructure,
    /// Caller input.
    Validation,
    /// Hashing and encryption.
    Crypto,
    /// Internal invariants.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Token => write!(f, "token"),
            Self::Consent => write!(f, "consent"),
            Self::Schema => write!(f, "schema"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Validation => write!(f, "validation"),
            Self::Crypto => write!(f, "crypto"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = AuthError::already_used("consent request c-1");
        assert_eq!(err.to_string(), "Already used: consent request c-1");

        assert_eq!(AuthError::InactiveToken.to_string(), "Token is inactive");
    }

    #[test]
    fn test_storage_error_classification() {
        let err: AuthError = StorageError::not_found("OAuth2Access,sig").into();
        assert!(err.is_not_found());

        let err: AuthError = StorageError::already_exists("Unique,x").into();
        assert!(err.is_already_exists());

        let err: AuthError = StorageError::conflict("changed").into();
        assert!(err.is_transient());

        let err: AuthError = StorageError::connection_error("unreachable").into();
        assert!(err.is_transient());

        let err: AuthError = StorageError::internal("disk on fire").into();
        assert!(matches!(err, AuthError::Unknown { .. }));
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("document store:"));
    }

    #[test]
    fn test_error_category() {
        assert_eq!(AuthError::NoPreviousConsent.category(), ErrorCategory::Consent);
        assert_eq!(
            AuthError::unexpected_schema_version("v9").category(),
            ErrorCategory::Schema
        );
        assert_eq!(ErrorCategory::Conflict.to_string(), "conflict");
        assert!(AuthError::InvalidatedAuthorizeCode.is_token_signal());
    }
}
