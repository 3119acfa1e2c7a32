//! Error classification at the document store boundary.
//!
//! Store errors are mapped onto [`AuthError`] by the `From<StorageError>`
//! implementation in `gatehouse-auth`; this module attaches the failing
//! operation as context for the unclassified remainder and maps codec errors.

use gatehouse_auth::{AuthError, AuthResult};
use gatehouse_storage::StorageError;

use crate::codec::CodecError;

/// Classifies a store error, naming `context` for pass-through failures.
pub fn classify(err: StorageError, context: &str) -> AuthError {
    match AuthError::from(err) {
        AuthError::Unknown { source, .. } => AuthError::Unknown {
            context: context.to_string(),
            source,
        },
        classified => classified,
    }
}

/// Adds [`classify`] to store results.
pub(crate) trait StorageResultExt<T> {
    fn context(self, context: &str) -> AuthResult<T>;
}

impl<T> StorageResultExt<T> for Result<T, StorageError> {
    fn context(self, context: &str) -> AuthResult<T> {
        self.map_err(|err| classify(err, context))
    }
}

impl From<CodecError> for AuthError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnexpectedVersion { .. } => AuthError::unexpected_schema_version(err.to_string()),
            CodecError::MissingMigration { .. } | CodecError::Invalid { .. } => {
                AuthError::internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_keeps_known_categories() {
        assert!(classify(StorageError::not_found("k"), "get client").is_not_found());
        assert!(classify(StorageError::already_exists("k"), "insert").is_already_exists());
        assert!(classify(StorageError::conflict("moved"), "commit").is_transient());
    }

    #[test]
    fn test_classify_attaches_context() {
        let err = classify(StorageError::invalid_query("no ancestor"), "find sessions");
        match err {
            AuthError::Unknown { context, .. } => assert_eq!(context, "find sessions"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_codec_errors() {
        let err: AuthError = CodecError::UnexpectedVersion {
            record: "client",
            found: 9,
            current: 3,
        }
        .into();
        assert!(err.is_unexpected_schema_version());

        let err: AuthError = CodecError::MissingMigration {
            record: "client",
            from: 2,
        }
        .into();
        assert!(matches!(err, AuthError::Internal { .. }));
    }
}
