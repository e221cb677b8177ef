//! Retry and re-authentication policy.
//!
//! Every request goes through [`RetryPolicy::run`]. A 504 is treated as server
//! overload and waited out with a fixed backoff. 401, 403 and 500 are treated
//! as a lost session and answered with a fresh login. Anything else ends the
//! call straight away.
//!
//! When the attempt budget runs out, or a login is needed but no credentials
//! are stored, one last unguarded attempt is made and its outcome returned
//! as is. A success inside the loop returns immediately without that extra
//! attempt.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::{ApiError, Result};

/// Default number of guarded attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default pause after a 504.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(30);

/// Status the server uses to signal overload.
const OVERLOADED_STATUS: u16 = 504;

/// Something that can restore a lost session.
#[async_trait]
pub trait Reauthenticate: Send + Sync {
    /// Generation of the session headers currently in use.
    fn session_generation(&self) -> u64;

    /// Whether credentials are stored to log in with.
    fn has_credentials(&self) -> bool;

    /// Log in again with the stored credentials.
    ///
    /// `seen_generation` is the generation the failed request was sent with;
    /// if the session has moved on since, no new login is needed.
    async fn reauthenticate(&self, seen_generation: u64) -> Result<()>;
}

/// How to recover from a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    Backoff,
    Relogin,
}

impl Recovery {
    fn for_error(error: &ApiError) -> Option<Self> {
        match error {
            ApiError::Unauthorized { status } if *status == OVERLOADED_STATUS => {
                Some(Recovery::Backoff)
            }
            ApiError::Unauthorized { .. } => Some(Recovery::Relogin),
            _ => None,
        }
    }
}

/// Bounded retry with re-login and fixed backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Run `op` under this policy.
    ///
    /// # Errors
    ///
    /// Returns the first non-recoverable error, a failed re-login,
    /// `ApiError::Cancelled` if `cancel` fires during a backoff, or the
    /// outcome of the final attempt.
    pub async fn run<T, F, Fut>(
        &self,
        auth: &dyn Reauthenticate,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut remaining = self.max_attempts;

        while remaining > 0 {
            remaining -= 1;
            let generation = auth.session_generation();

            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            match Recovery::for_error(&error) {
                None => return Err(error),
                Some(Recovery::Backoff) => {
                    warn!(
                        remaining,
                        backoff = ?self.backoff,
                        "Server overloaded, backing off: {}",
                        error
                    );
                    self.sleep(cancel).await?;
                }
                Some(Recovery::Relogin) => {
                    if !auth.has_credentials() {
                        debug!("No stored credentials, giving up on retries: {}", error);
                        break;
                    }
                    warn!(remaining, "Session rejected, logging in again: {}", error);
                    auth.reauthenticate(generation).await?;
                }
            }
        }

        debug!("Retry loop finished, making final attempt");
        op().await
    }

    async fn sleep(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Backoff interrupted by cancellation");
                Err(ApiError::Cancelled)
            }
            _ = tokio::time::sleep(self.backoff) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// Counts logins instead of performing them.
    #[derive(Default)]
    struct FakeAuth {
        has_credentials: bool,
        fail_login: bool,
        logins: AtomicUsize,
        generation: AtomicU64,
    }

    impl FakeAuth {
        fn with_credentials() -> Self {
            Self {
                has_credentials: true,
                ..Self::default()
            }
        }

        fn logins(&self) -> usize {
            self.logins.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Reauthenticate for FakeAuth {
        fn session_generation(&self) -> u64 {
            self.generation.load(Ordering::SeqCst)
        }

        fn has_credentials(&self) -> bool {
            self.has_credentials
        }

        async fn reauthenticate(&self, _seen_generation: u64) -> Result<()> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            if self.fail_login {
                return Err(ApiError::AuthenticationFailed { status: 403 });
            }
            self.generation.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(10, Duration::from_millis(5))
    }

    /// An operation that fails with the given statuses in order, then succeeds.
    fn scripted(
        calls: &Arc<AtomicUsize>,
        failures: Vec<u16>,
    ) -> impl FnMut() -> std::future::Ready<Result<&'static str>> {
        let calls = calls.clone();
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(match failures.get(n) {
                Some(status) => Err(ApiError::from_status(*status, "/issue").unwrap()),
                None => Ok("done"),
            })
        }
    }

    #[tokio::test]
    async fn test_success_makes_a_single_call() {
        let auth = FakeAuth::with_credentials();
        let calls = Arc::new(AtomicUsize::new(0));

        let result = policy()
            .run(&auth, &CancellationToken::new(), scripted(&calls, vec![]))
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(auth.logins(), 0);
    }

    #[tokio::test]
    async fn test_relogin_twice_then_success() {
        let auth = FakeAuth::with_credentials();
        let calls = Arc::new(AtomicUsize::new(0));

        let result = policy()
            .run(&auth, &CancellationToken::new(), scripted(&calls, vec![401, 401]))
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(auth.logins(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_credentials_abandons_loop_with_one_final_attempt() {
        let auth = FakeAuth::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let result = policy()
            .run(&auth, &CancellationToken::new(), scripted(&calls, vec![403; 20]))
            .await;

        assert!(matches!(result, Err(ApiError::Unauthorized { status: 403 })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(auth.logins(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_budget_makes_one_final_attempt() {
        let auth = FakeAuth::with_credentials();
        let calls = Arc::new(AtomicUsize::new(0));

        let result = RetryPolicy::new(3, Duration::from_millis(1))
            .run(&auth, &CancellationToken::new(), scripted(&calls, vec![500; 20]))
            .await;

        assert!(matches!(result, Err(ApiError::Unauthorized { status: 500 })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(auth.logins(), 3);
    }

    #[tokio::test]
    async fn test_final_attempt_can_succeed() {
        let auth = FakeAuth::with_credentials();
        let calls = Arc::new(AtomicUsize::new(0));

        let result = RetryPolicy::new(2, Duration::from_millis(1))
            .run(&auth, &CancellationToken::new(), scripted(&calls, vec![401, 401]))
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gateway_timeout_backs_off_without_login() {
        let auth = FakeAuth::with_credentials();
        let calls = Arc::new(AtomicUsize::new(0));
        let started = tokio::time::Instant::now();

        let result = RetryPolicy::new(10, Duration::from_millis(50))
            .run(&auth, &CancellationToken::new(), scripted(&calls, vec![504]))
            .await;

        assert_eq!(result.unwrap(), "done");
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(auth.logins(), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_aborts_without_further_attempt() {
        let auth = FakeAuth::with_credentials();
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = RetryPolicy::new(10, Duration::from_secs(30))
            .run(&auth, &cancel, scripted(&calls, vec![504; 20]))
            .await;

        assert!(matches!(result, Err(ApiError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let auth = FakeAuth::with_credentials();
        let calls = Arc::new(AtomicUsize::new(0));

        let result = policy()
            .run(&auth, &CancellationToken::new(), scripted(&calls, vec![404, 404]))
            .await;

        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_response_is_not_retried() {
        let auth = FakeAuth::with_credentials();
        let calls = AtomicUsize::new(0);

        let result: Result<()> = policy()
            .run(&auth, &CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::MalformedResponse("bad".into())) }
            })
            .await;

        assert!(matches!(result, Err(ApiError::MalformedResponse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_relogin_propagates() {
        let auth = FakeAuth {
            has_credentials: true,
            fail_login: true,
            ..FakeAuth::default()
        };
        let calls = Arc::new(AtomicUsize::new(0));

        let result = policy()
            .run(&auth, &CancellationToken::new(), scripted(&calls, vec![401]))
            .await;

        assert!(matches!(
            result,
            Err(ApiError::AuthenticationFailed { status: 403 })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(auth.logins(), 1);
    }

    #[test]
    fn test_recovery_classification() {
        let of = |status| Recovery::for_error(&ApiError::Unauthorized { status });
        assert_eq!(of(504), Some(Recovery::Backoff));
        assert_eq!(of(401), Some(Recovery::Relogin));
        assert_eq!(of(403), Some(Recovery::Relogin));
        assert_eq!(of(500), Some(Recovery::Relogin));
        assert_eq!(Recovery::for_error(&ApiError::Cancelled), None);
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 10);
        assert_eq!(policy.backoff(), Duration::from_secs(30));
    }
}
