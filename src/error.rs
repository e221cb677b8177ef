//! Centralized error types for the `yt` command line tool.
//!
//! This module provides a unified error hierarchy with user-friendly error
//! messages. All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

use crate::api::error::ApiError;
use crate::config::ConfigError;

/// The main application error type.
///
/// This enum aggregates all error types that can occur in the tool,
/// providing user-friendly error messages while preserving the underlying
/// error context for debugging.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration-related errors.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// API-related errors.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// IO errors (file system, etc.).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with a message.
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Create a generic error.
    pub fn other(msg: impl Into<String>) -> Self {
        AppError::Other(msg.into())
    }

    /// Get a user-friendly message for display.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Config(e) => match e {
                ConfigError::NoConfigDir => {
                    "Could not find configuration directory. Set YT_CONFIG_DIR to choose one."
                        .to_string()
                }
                ConfigError::CreateDirError(_) => {
                    "Could not create configuration directory. Check file permissions.".to_string()
                }
                ConfigError::ReadError(_) => {
                    "Could not read configuration file. Please check the file is readable."
                        .to_string()
                }
                ConfigError::WriteError(_) => {
                    "Could not save configuration. Please check file permissions.".to_string()
                }
                ConfigError::ParseError(_) => {
                    "Configuration file is invalid. Please check the file format.".to_string()
                }
                ConfigError::SerializeError(_) => {
                    "Could not save configuration. Internal error.".to_string()
                }
                ConfigError::ValidationError(msg) => format!("Configuration error: {}", msg),
                ConfigError::ProfileNotFound(name) => format!("Profile '{}' not found.", name),
            },
            AppError::Api(e) => match e {
                ApiError::AuthenticationFailed { .. } => {
                    "Login failed. Please check your login and password.".to_string()
                }
                ApiError::NotFound(resource) => format!("'{}' was not found.", resource),
                ApiError::Unauthorized { status } => format!(
                    "YouTrack refused the request (HTTP {}) even after logging in again.",
                    status
                ),
                ApiError::MalformedResponse(_) | ApiError::InvalidResponse(_) => {
                    "Unexpected response from YouTrack. Please try again.".to_string()
                }
                ApiError::NoCredentials => "No password available for this profile.".to_string(),
                ApiError::Network(_) => {
                    "Connection failed. Please check your network and YouTrack URL.".to_string()
                }
                ApiError::InvalidUrl(_) => "Invalid YouTrack URL in configuration.".to_string(),
                ApiError::Keyring(_) => {
                    "Could not access secure storage. Run 'yt profile login' again.".to_string()
                }
                ApiError::Cancelled => "The request was cancelled.".to_string(),
                ApiError::ClientClosed => "The connection was already closed.".to_string(),
            },
            AppError::Io(_) => "A file operation failed. Please check file permissions.".to_string(),
            AppError::Other(msg) => msg.clone(),
        }
    }

    /// Check if this error means the profile itself needs fixing.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            AppError::Config(_)
                | AppError::Api(ApiError::AuthenticationFailed { .. })
                | AppError::Api(ApiError::NoCredentials)
                | AppError::Api(ApiError::InvalidUrl(_))
        )
    }

    /// Check if this error is recoverable by simply trying again later.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Api(ApiError::Network(_))
                | AppError::Api(ApiError::Unauthorized { status: 504 })
                | AppError::Api(ApiError::Cancelled)
        )
    }

    /// Get a suggested action for the user.
    pub fn suggested_action(&self) -> Option<&'static str> {
        match self {
            AppError::Config(ConfigError::ProfileNotFound(_))
            | AppError::Config(ConfigError::ValidationError(_)) => {
                Some("Run 'yt profile add <name> <url> <login>' to create a profile.")
            }
            AppError::Api(ApiError::AuthenticationFailed { .. })
            | AppError::Api(ApiError::Keyring(_))
            | AppError::Api(ApiError::NoCredentials) => {
                Some("Store your password with 'yt profile login' or set YT_PASSWORD.")
            }
            AppError::Api(ApiError::Network(_)) | AppError::Api(ApiError::InvalidUrl(_)) => {
                Some("Check your network connection and the profile URL.")
            }
            _ => None,
        }
    }
}

/// Result type for application operations.
pub type Result<T> = std::result::Result<T, AppError>;
