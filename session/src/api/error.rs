use thiserror::Error;

use crate::utils::storage::StorageError;

/// Failures surfaced to callers of the session operations.
///
/// Every variant carries only a human-readable message; `kind()` gives the
/// symbolic name forms and logs switch on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("LoginFailed: {0}")]
    LoginFailed(String),
    #[error("SessionExpired: {0}")]
    SessionExpired(String),
    #[error("ResetPasswordFailed: {0}")]
    ResetPasswordFailed(String),
    #[error("ChangePasswordFailed: {0}")]
    ChangePasswordFailed(String),
    #[error("DecodeFailed: {0}")]
    Decode(String),
    #[error("StorageFailed: {0}")]
    Storage(String),
}

impl AuthError {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::LoginFailed(_) => "LoginFailed",
            AuthError::SessionExpired(_) => "SessionExpired",
            AuthError::ResetPasswordFailed(_) => "ResetPasswordFailed",
            AuthError::ChangePasswordFailed(_) => "ChangePasswordFailed",
            AuthError::Decode(_) => "DecodeFailed",
            AuthError::Storage(_) => "StorageFailed",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AuthError::LoginFailed(msg)
            | AuthError::SessionExpired(msg)
            | AuthError::ResetPasswordFailed(msg)
            | AuthError::ChangePasswordFailed(msg)
            | AuthError::Decode(msg)
            | AuthError::Storage(msg) => msg,
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_message_are_exposed() {
        let err = AuthError::LoginFailed("Invalid credentials".into());
        assert_eq!(err.kind(), "LoginFailed");
        assert_eq!(err.message(), "Invalid credentials");
        assert_eq!(err.to_string(), "LoginFailed: Invalid credentials");
    }

    #[test]
    fn storage_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: AuthError = StorageError::from(io).into();
        assert_eq!(err.kind(), "StorageFailed");
        assert!(err.message().contains("read-only"));
    }
}
