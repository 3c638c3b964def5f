//! Common error types for albumsync.

use thiserror::Error;

use crate::types::ApiOperation;

/// Top-level error type for albumsync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The OAuth client descriptor file does not exist.
    #[error("Credentials file not found: {0}")]
    MissingCredentials(String),

    /// The OAuth client descriptor could not be parsed.
    #[error("Malformed credentials: {0}")]
    MalformedCredentials(String),

    /// The interactive authorization exchange failed or timed out.
    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    /// Token exchange or refresh failed.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The remote service answered with a non-success status.
    #[error("{operation} failed: {status} {body}")]
    Api {
        operation: ApiOperation,
        status: u16,
        body: String,
    },

    /// Request could not be sent or the response could not be read.
    #[error("Network error: {0}")]
    Network(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Longest response body kept in an [`Error::Api`].
    pub const MAX_BODY_LEN: usize = 512;

    /// Build an API error, truncating the response body.
    pub fn api(operation: ApiOperation, status: u16, body: impl AsRef<str>) -> Self {
        let body = body.as_ref();
        let body = match body.char_indices().nth(Self::MAX_BODY_LEN) {
            Some((cut, _)) => format!("{}…", &body[..cut]),
            None => body.to_string(),
        };
        Error::Api {
            operation,
            status,
            body,
        }
    }

    /// HTTP status of a failed API call, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the remote denied permission (HTTP 403).
    ///
    /// Listing albums with a forbidden answer switches the run to degraded
    /// mode instead of aborting it.
    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
