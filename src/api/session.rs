//! Session state shared by every request of a client.
//!
//! The header set is swapped as a whole behind an `Arc`, so a request sees
//! either the old session or the new one. Every swap bumps a generation
//! counter; a re-login asked for against an outdated generation is skipped,
//! which keeps concurrent 401s down to a single login handshake.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use reqwest::header::HeaderMap;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use super::auth::Credentials;

/// Headers that authenticate requests, plus the generation that produced them.
#[derive(Debug, Default)]
pub struct SessionState {
    pub headers: HeaderMap,
    pub generation: u64,
}

/// Session headers, last used credentials and the re-login lock.
#[derive(Debug, Default)]
pub struct Session {
    state: RwLock<Arc<SessionState>>,
    credentials: Mutex<Option<Credentials>>,
    relogin: AsyncMutex<()>,
}

impl Session {
    /// Create a session that remembers credentials but has not logged in yet.
    pub fn with_credentials(credentials: Option<Credentials>) -> Self {
        Self {
            credentials: Mutex::new(credentials),
            ..Self::default()
        }
    }

    /// The current state.
    pub fn snapshot(&self) -> Arc<SessionState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    /// Replace the session headers after a successful login.
    pub fn install(&self, headers: HeaderMap, credentials: Credentials) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let generation = state.generation + 1;
        *state = Arc::new(SessionState { headers, generation });
        drop(state);

        *self
            .credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(credentials);
    }

    /// Drop the session headers. The generation keeps counting up.
    pub fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let generation = state.generation + 1;
        *state = Arc::new(SessionState {
            headers: HeaderMap::new(),
            generation,
        });
    }

    /// The last used credentials.
    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Wait for exclusive right to log in again.
    pub async fn lock_relogin(&self) -> MutexGuard<'_, ()> {
        self.relogin.lock().await
    }
}

#[cfg(test)]
mod tests {
    use reqwest::header::{HeaderValue, COOKIE};

    use super::*;

    fn cookie_headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_new_session_is_empty() {
        let session = Session::default();
        assert_eq!(session.generation(), 0);
        assert!(session.snapshot().headers.is_empty());
        assert!(!session.has_credentials());
    }

    #[test]
    fn test_install_replaces_headers_and_credentials() {
        let session = Session::with_credentials(Some(Credentials::new("old", "x")));
        session.install(cookie_headers("a=1"), Credentials::new("root", "pw"));

        let state = session.snapshot();
        assert_eq!(state.generation, 1);
        assert_eq!(state.headers.get(COOKIE).unwrap(), "a=1");
        assert_eq!(session.credentials().unwrap().login(), "root");

        session.install(cookie_headers("a=2"), Credentials::new("root", "pw"));
        assert_eq!(session.generation(), 2);
        assert_eq!(session.snapshot().headers.get(COOKIE).unwrap(), "a=2");
    }

    #[test]
    fn test_old_snapshot_is_unaffected_by_install() {
        let session = Session::default();
        session.install(cookie_headers("a=1"), Credentials::new("root", "pw"));
        let before = session.snapshot();

        session.install(cookie_headers("a=2"), Credentials::new("root", "pw"));

        assert_eq!(before.headers.get(COOKIE).unwrap(), "a=1");
        assert_eq!(before.generation, 1);
    }

    #[test]
    fn test_clear_empties_headers_but_keeps_credentials() {
        let session = Session::default();
        session.install(cookie_headers("a=1"), Credentials::new("root", "pw"));
        session.clear();

        assert!(session.snapshot().headers.is_empty());
        assert_eq!(session.generation(), 2);
        assert!(session.has_credentials());
    }
}
