//! Error types for the navigation site API client.
//!
//! # Design
//! Every client function either returns a value or one `ApiError`. Each
//! variant maps to an `ErrorKind`, and the `Display` text is the message a
//! form shows to the user verbatim. Non-2xx responses are normalized into
//! `ApiError::Http` by a single helper in `client`, so all endpoints report
//! failures the same way.

use std::fmt;

/// Coarse classification of an `ApiError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    Validation,
    Http,
    Transport,
    Serialization,
    Deserialization,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Validation => "validation",
            ErrorKind::Http => "http",
            ErrorKind::Transport => "transport",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Deserialization => "deserialization",
            ErrorKind::Storage => "storage",
        };
        f.write_str(name)
    }
}

/// Errors returned by `ApiClient` and `Session` operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No credential is stored. Raised before any request is built.
    #[error("Unauthenticated")]
    Unauthenticated,

    /// Client-side validation failed; the request was never sent.
    #[error("{0}")]
    Validation(String),

    /// The server returned a non-2xx status.
    #[error("{message}")]
    Http { status: u16, message: String },

    /// The host could not execute the request at all.
    #[error("request failed: {0}")]
    Transport(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Unauthenticated => ErrorKind::Unauthenticated,
            ApiError::Validation(_) => ErrorKind::Validation,
            ApiError::Http { .. } => ErrorKind::Http,
            ApiError::Transport(_) => ErrorKind::Transport,
            ApiError::Serialization(_) => ErrorKind::Serialization,
            ApiError::Deserialization(_) => ErrorKind::Deserialization,
            ApiError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// HTTP status for `Http` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }
}

/// Failures of the local persistent key-value store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage file is corrupt: {0}")]
    Corrupt(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_displays_message_only() {
        let err = ApiError::Http {
            status: 409,
            message: "Email already registered".to_string(),
        };
        assert_eq!(err.to_string(), "Email already registered");
        assert_eq!(err.kind(), ErrorKind::Http);
        assert_eq!(err.status(), Some(409));
    }

    #[test]
    fn validation_error_is_shown_verbatim() {
        let err = ApiError::validation("Please enter a valid email address");
        assert_eq!(err.to_string(), "Please enter a valid email address");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.status(), None);
    }

    #[test]
    fn storage_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ApiError = StorageError::from(io).into();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.to_string().contains("denied"));
    }
}
