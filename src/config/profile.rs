//! YouTrack profile configuration.

use serde::{Deserialize, Serialize};

use super::{ConfigError, Result};

/// A YouTrack profile configuration.
///
/// Profiles store connection details for a YouTrack instance.
/// Passwords are stored separately in the OS keychain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    /// The name of this profile.
    ///
    /// Must be non-empty and unique across all profiles.
    pub name: String,

    /// The YouTrack instance URL, without the `/rest` suffix.
    pub url: String,

    /// The login used for the login handshake.
    pub login: String,
}

impl Profile {
    /// Create a new profile.
    pub fn new(name: String, url: String, login: String) -> Self {
        Self { name, url, login }
    }

    /// Validate this profile.
    ///
    /// Checks that:
    /// - The name is non-empty and has no whitespace
    /// - The URL is non-empty and starts with http:// or https://
    /// - The login is non-empty
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError::ValidationError` with details if validation fails.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "profile name cannot be empty".to_string(),
            ));
        }

        if self.name.contains(char::is_whitespace) {
            return Err(ConfigError::ValidationError(format!(
                "profile name '{}' cannot contain whitespace",
                self.name
            )));
        }

        if self.url.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "profile '{}': URL cannot be empty",
                self.name
            )));
        }

        if !self.url.starts_with("https://") && !self.url.starts_with("http://") {
            return Err(ConfigError::ValidationError(format!(
                "profile '{}': URL must start with http:// or https://",
                self.name
            )));
        }

        if self.login.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "profile '{}': login cannot be empty",
                self.name
            )));
        }

        Ok(())
    }
}
