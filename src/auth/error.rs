//! Error taxonomy for the registration and login flows.
//!
//! Persistence errors arrive as [`StoreError`] and are translated here:
//! `NotFound` / `Conflict` become typed variants, everything else is wrapped
//! in [`AuthError::StorageFailure`] together with the operation and email.

use super::store::StoreError;

/// Errors surfaced by [`RegistrationService`](super::RegistrationService).
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The password hasher failed, or a stored hash could not be parsed.
    #[error("password hashing failed: {0}")]
    HashingFailure(String),

    /// The OS random source could not produce a verification code.
    #[error("failed to generate verification code")]
    GenerationFailure(#[source] rand::Error),

    #[error("a user with email '{0}' already exists")]
    UserAlreadyExists(String),

    #[error("no user with email '{0}'")]
    UserNotFound(String),

    /// Password did not match the stored hash.
    #[error("invalid email or password")]
    InvalidCredential,

    #[error("no verification token for email '{0}'")]
    TokenNotFound(String),

    /// Submitted code differs from the stored one.
    #[error("verification code is invalid")]
    InvalidToken,

    #[error("verification code has expired")]
    TokenExpired,

    /// Token was valid but the pending password hash is gone (for example
    /// after a process restart).
    #[error("pending credential for '{0}' is missing; register again")]
    CredentialCacheMiss(String),

    #[error("failed to issue session credential")]
    SessionFailure(#[source] anyhow::Error),

    #[error("storage failure during {operation} for '{email}'")]
    StorageFailure {
        operation: &'static str,
        email: String,
        #[source]
        source: anyhow::Error,
    },
}

impl AuthError {
    /// Wrap a store error that has no typed counterpart for this operation.
    pub(crate) fn storage(operation: &'static str, email: &str, err: StoreError) -> Self {
        let source = match err {
            StoreError::Other(e) => e,
            other => anyhow::Error::new(other),
        };
        Self::StorageFailure {
            operation,
            email: email.to_string(),
            source,
        }
    }
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_keeps_operation_and_email() {
        let err = AuthError::storage(
            "create_user",
            "a@x.com",
            StoreError::Other(anyhow::anyhow!("disk full")),
        );
        let msg = err.to_string();
        assert!(msg.contains("create_user"));
        assert!(msg.contains("a@x.com"));
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("disk full"));
    }

    #[test]
    fn storage_wraps_untyped_not_found() {
        let err = AuthError::storage("delete_verification_token", "a@x.com", StoreError::NotFound);
        assert!(matches!(err, AuthError::StorageFailure { .. }));
    }
}
