//! Client settings configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ConfigError, Result};
use crate::api::ClientConfig;

/// Client-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// The name of the default profile to use.
    pub default_profile: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Guarded attempts per request before the final one.
    pub max_attempts: u32,
    /// Pause after a gateway timeout, in seconds.
    pub backoff_secs: u64,
    /// Cap on concurrent connections.
    pub max_connections: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_profile: None,
            timeout_secs: 30,
            max_attempts: 10,
            backoff_secs: 30,
            max_connections: 10,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings as client tunables.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            max_attempts: self.max_attempts,
            backoff: Duration::from_secs(self.backoff_secs),
            max_connections: self.max_connections,
        }
    }
}
