//! Configuration management for youtrack-client.
//!
//! This module handles loading, saving, and managing user configuration
//! including profiles and client settings. The file lives at
//! `<config dir>/youtrack-client/config.toml`; set `YT_CONFIG_DIR` to use
//! another directory.

mod profile;
mod settings;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use profile::Profile;
pub use settings::Settings;

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "YT_CONFIG_DIR";

/// Name of the configuration file.
const CONFIG_FILE: &str = "config.toml";

/// Errors that can occur while handling configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine configuration directory")]
    NoConfigDir,

    #[error("Failed to create configuration directory: {0}")]
    CreateDirError(#[source] std::io::Error),

    #[error("Failed to read configuration: {0}")]
    ReadError(#[source] std::io::Error),

    #[error("Failed to write configuration: {0}")]
    WriteError(#[source] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Profile '{0}' not found")]
    ProfileNotFound(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// The whole configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

impl Config {
    /// Load the configuration from the default location.
    ///
    /// A missing file yields the default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load the configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    /// Save the configuration to a specific file, creating its directory.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(ConfigError::CreateDirError)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(ConfigError::WriteError)?;
        debug!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Validate every profile and the default profile reference.
    pub fn validate(&self) -> Result<()> {
        for (i, profile) in self.profiles.iter().enumerate() {
            profile.validate()?;
            if self.profiles[..i].iter().any(|p| p.name == profile.name) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate profile '{}'",
                    profile.name
                )));
            }
        }

        if let Some(name) = &self.settings.default_profile {
            if self.profile(name).is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "default profile '{}' does not exist",
                    name
                )));
            }
        }

        self.settings.validate()
    }

    /// Find a profile by name.
    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Pick the named profile, else the default one, else the only one.
    pub fn select_profile(&self, name: Option<&str>) -> Result<&Profile> {
        let name = match name.or(self.settings.default_profile.as_deref()) {
            Some(name) => name,
            None if self.profiles.len() == 1 => return Ok(&self.profiles[0]),
            None => {
                return Err(ConfigError::ValidationError(
                    "no profile selected and no default profile set".to_string(),
                ))
            }
        };
        self.profile(name)
            .ok_or_else(|| ConfigError::ProfileNotFound(name.to_string()))
    }

    /// Add a profile, or replace the one with the same name.
    pub fn add_profile(&mut self, profile: Profile) -> Result<()> {
        profile.validate()?;
        match self.profiles.iter_mut().find(|p| p.name == profile.name) {
            Some(existing) => *existing = profile,
            None => self.profiles.push(profile),
        }
        Ok(())
    }

    /// Remove a profile, clearing the default if it pointed there.
    pub fn remove_profile(&mut self, name: &str) -> Result<Profile> {
        let index = self
            .profiles
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| ConfigError::ProfileNotFound(name.to_string()))?;

        if self.settings.default_profile.as_deref() == Some(name) {
            self.settings.default_profile = None;
        }
        Ok(self.profiles.remove(index))
    }
}

/// Directory holding the configuration file.
pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir()
        .map(|dir| dir.join("youtrack-client"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Full path of the configuration file.
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use tempfile::TempDir;

    use super::*;

    fn profile(name: &str) -> Profile {
        Profile::new(
            name.to_string(),
            "https://yt.example.com".to_string(),
            "root".to_string(),
        )
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.add_profile(profile("work")).unwrap();
        config.settings.default_profile = Some("work".to_string());
        config.settings.max_attempts = 3;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is = = not toml").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_duplicate_profiles_rejected() {
        let config = Config {
            profiles: vec![profile("work"), profile("work")],
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate profile"));
    }

    #[test]
    fn test_unknown_default_profile_rejected() {
        let mut config = Config::default();
        config.settings.default_profile = Some("ghost".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_select_profile() {
        let mut config = Config::default();
        config.add_profile(profile("work")).unwrap();
        assert_eq!(config.select_profile(None).unwrap().name, "work");

        config.add_profile(profile("home")).unwrap();
        assert!(config.select_profile(None).is_err());
        assert_eq!(config.select_profile(Some("home")).unwrap().name, "home");
        assert!(matches!(
            config.select_profile(Some("ghost")),
            Err(ConfigError::ProfileNotFound(_))
        ));

        config.settings.default_profile = Some("home".to_string());
        assert_eq!(config.select_profile(None).unwrap().name, "home");
    }

    #[test]
    fn test_add_profile_replaces_same_name() {
        let mut config = Config::default();
        config.add_profile(profile("work")).unwrap();
        let mut updated = profile("work");
        updated.login = "jane".to_string();
        config.add_profile(updated).unwrap();

        assert_eq!(config.profiles.len(), 1);
        assert_eq!(config.profiles[0].login, "jane");
    }

    #[test]
    fn test_remove_profile_clears_default() {
        let mut config = Config::default();
        config.add_profile(profile("work")).unwrap();
        config.settings.default_profile = Some("work".to_string());

        let removed = config.remove_profile("work").unwrap();
        assert_eq!(removed.name, "work");
        assert!(config.settings.default_profile.is_none());
        assert!(matches!(
            config.remove_profile("work"),
            Err(ConfigError::ProfileNotFound(_))
        ));
    }

    #[test]
    #[serial]
    fn test_config_dir_env_override() {
        let dir = TempDir::new().unwrap();
        std::env::set_var(CONFIG_DIR_ENV, dir.path());
        let path = config_path().unwrap();
        std::env::remove_var(CONFIG_DIR_ENV);

        assert_eq!(path, dir.path().join("config.toml"));
    }
}
