//! Credentials for the YouTrack login handshake.
//!
//! Passwords for configured profiles are kept in the OS keyring, never in the
//! configuration file.

use std::fmt;

use super::error::{ApiError, Result};

/// The keyring service name for youtrack-client passwords.
const KEYRING_SERVICE: &str = "youtrack-client";

/// A login/password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    login: String,
    password: String,
}

impl Credentials {
    pub fn new(login: &str, password: &str) -> Self {
        Self {
            login: login.to_string(),
            password: password.to_string(),
        }
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    /// Build the `application/x-www-form-urlencoded` login payload.
    pub fn form_payload(&self) -> String {
        format!(
            "login={}&password={}",
            urlencoding::encode(&self.login),
            urlencoding::encode(&self.password)
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Store a password in the OS keyring.
///
/// # Arguments
///
/// * `profile_name` - The profile name to use as the keyring username
/// * `password` - The password to store
pub fn store_password(profile_name: &str, password: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, profile_name)
        .map_err(|e| ApiError::Keyring(format!("failed to create keyring entry: {}", e)))?;

    entry
        .set_password(password)
        .map_err(|e| ApiError::Keyring(format!("failed to store password: {}", e)))?;

    Ok(())
}

/// Retrieve a password from the OS keyring.
pub fn get_password(profile_name: &str) -> Result<String> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, profile_name)
        .map_err(|e| ApiError::Keyring(format!("failed to access keyring: {}", e)))?;

    entry
        .get_password()
        .map_err(|e| ApiError::Keyring(format!("failed to retrieve password: {}", e)))
}

/// Delete a password from the OS keyring.
pub fn delete_password(profile_name: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, profile_name)
        .map_err(|e| ApiError::Keyring(format!("failed to access keyring: {}", e)))?;

    entry
        .delete_password()
        .map_err(|e| ApiError::Keyring(format!("failed to delete password: {}", e)))?;

    Ok(())
}

/// Check if a password exists in the OS keyring for a profile.
pub fn has_password(profile_name: &str) -> bool {
    get_password(profile_name).is_ok()
}
