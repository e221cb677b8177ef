//! API error types for the YouTrack client.

use thiserror::Error;

/// Errors that can occur when interacting with the YouTrack API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The login handshake itself was rejected.
    #[error("Authentication failed: login returned HTTP {status}")]
    AuthenticationFailed { status: u16 },

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The server refused the session or could not serve it right now.
    ///
    /// Raised for 401, 403, 500 and 504. The retry policy recovers from these
    /// by logging in again (or backing off for 504).
    #[error("Unauthorized: HTTP {status}")]
    Unauthorized { status: u16 },

    /// The response body is not well-formed XML.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// A re-login was needed but no credentials are stored.
    #[error("No stored credentials to log in with")]
    NoCredentials,

    /// Network or HTTP error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The response is well-formed but lacks something the endpoint needs.
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Keyring error when storing/retrieving passwords.
    #[error("Keyring error: {0}")]
    Keyring(String),

    /// The operation was cancelled before it completed.
    #[error("Request cancelled")]
    Cancelled,

    /// The client behind an entity handle has been dropped or closed.
    #[error("Client is closed")]
    ClientClosed,
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Classify a response status.
    ///
    /// `None` means the response goes back to the caller as is.
    pub fn from_status(status: u16, context: &str) -> Option<Self> {
        match status {
            401 | 403 | 500 | 504 => Some(ApiError::Unauthorized { status }),
            404 => Some(ApiError::NotFound(context.to_string())),
            _ => None,
        }
    }
}
