//! Storage error types for the document store abstraction.
//!
//! Backends report failures through [`StorageError`]. Callers in the domain
//! layer classify these into their own taxonomy and should only rely on the
//! `is_*` predicates and [`ErrorCategory`], never on message text.

use std::fmt;

/// Errors that can occur during document store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested entity does not exist.
    #[error("Entity not found: {key}")]
    NotFound {
        /// Display form of the missing key.
        key: String,
    },

    /// An insert targeted a key that is already occupied.
    #[error("Entity already exists: {key}")]
    AlreadyExists {
        /// Display form of the occupied key.
        key: String,
    },

    /// An optimistic transaction observed a concurrent write.
    #[error("Transaction conflict: {message}")]
    Conflict {
        /// Description of the conflicting access.
        message: String,
    },

    /// The entity or mutation is malformed.
    #[error("Invalid entity: {message}")]
    InvalidEntity {
        /// Description of why the entity is invalid.
        message: String,
    },

    /// The query cannot be executed in the current context.
    #[error("Invalid query: {message}")]
    InvalidQuery {
        /// Description of why the query is invalid.
        message: String,
    },

    /// A transaction was misused or could not be completed.
    #[error("Transaction error: {message}")]
    TransactionError {
        /// Description of the transaction error.
        message: String,
    },

    /// The backend could not be reached or timed out.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the connection error.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(key: impl fmt::Display) -> Self {
        Self::NotFound {
            key: key.to_string(),
        }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(key: impl fmt::Display) -> Self {
        Self::AlreadyExists {
            key: key.to_string(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidEntity` error.
    #[must_use]
    pub fn invalid_entity(message: impl Into<String>) -> Self {
        Self::InvalidEntity {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidQuery` error.
    #[must_use]
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates a new `TransactionError` error.
    #[must_use]
    pub fn transaction_error(message: impl Into<String>) -> Self {
        Self::TransactionError {
            message: message.into(),
        }
    }

    /// Creates a new `ConnectionError` error.
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
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

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is an already exists error.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns `true` if this is an optimistic transaction conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns `true` if retrying the same operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::ConnectionError { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AlreadyExists { .. } => ErrorCategory::Conflict,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::InvalidEntity { .. } | Self::InvalidQuery { .. } => ErrorCategory::Validation,
            Self::TransactionError { .. } => ErrorCategory::Transaction,
            Self::ConnectionError { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Entity not found.
    NotFound,
    /// Conflict (existence or concurrent write).
    Conflict,
    /// Validation error.
    Validation,
    /// Transaction-related error.
    Transaction,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Transaction => write!(f, "transaction"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found("Client,app");
        assert_eq!(err.to_string(), "Entity not found: Client,app");

        let err = StorageError::conflict("key Group,a changed");
        assert_eq!(err.to_string(), "Transaction conflict: key Group,a changed");
    }

    #[test]
    fn test_predicates() {
        assert!(StorageError::not_found("k").is_not_found());
        assert!(StorageError::already_exists("k").is_already_exists());
        assert!(StorageError::conflict("c").is_conflict());
        assert!(StorageError::conflict("c").is_transient());
        assert!(StorageError::connection_error("down").is_transient());
        assert!(!StorageError::internal("boom").is_transient());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::not_found("k").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            StorageError::already_exists("k").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            StorageError::invalid_query("q").category(),
            ErrorCategory::Validation
        );
        assert_eq!(ErrorCategory::Infrastructure.to_string(), "infrastructure");
    }
}
