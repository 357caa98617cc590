use std::sync::Arc;
use std::time::Duration;

use crate::error::{ApiError, DataError};

/// Status codes the store uses to signal rate limiting or overload.
const TRANSIENT_STATUS_CODES: &[u16] = &[429, 500, 503];
/// Message markers the store uses for quota errors (sometimes under a 403).
const TRANSIENT_MESSAGE_MARKERS: &[&str] = &["Quota exceeded", "rateLimitExceeded"];

/// Bounded exponential backoff.
///
/// The store enforces per-minute request quotas, so the default schedule
/// makes at most 5 attempts and backs off 1s, 2s, 4s, 8s, 16s (doubling) after
/// each transient failure, the last one included: 31s in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `retry` (0-based): `initial_delay * 2^retry`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.initial_delay
            .saturating_mul(1u32.checked_shl(retry).unwrap_or(u32::MAX))
    }

    /// Every delay the policy can sleep, in order, one per attempt.
    pub fn delays(&self) -> Vec<Duration> {
        (0..self.max_attempts.max(1))
            .map(|retry| self.delay_for(retry))
            .collect()
    }
}

/// Whether a failure is worth retrying.
pub fn is_transient(err: &ApiError) -> bool {
    if let Some(status) = err.status {
        if TRANSIENT_STATUS_CODES.contains(&status) {
            return true;
        }
    }
    TRANSIENT_MESSAGE_MARKERS
        .iter()
        .any(|marker| err.message.contains(marker))
}

pub type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// Runs remote calls under a [`RetryPolicy`].
///
/// Sleeping is injected so schedules can be asserted without waiting; the
/// default sleeper blocks the calling thread.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    sleep: Sleeper,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_sleeper(policy, Arc::new(std::thread::sleep))
    }

    pub fn with_sleeper(policy: RetryPolicy, sleep: Sleeper) -> Self {
        Self { policy, sleep }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `op`, retrying transient failures.
    ///
    /// - The operation is attempted once immediately.
    /// - A fatal failure is returned as [`DataError::PermanentRemote`] without retrying.
    /// - A transient failure sleeps for the next delay, then retries.
    /// - Once attempts run out (after the final backoff), the last failure is
    ///   returned as [`DataError::TransientRemote`].
    pub fn execute<T>(
        &self,
        label: &str,
        mut op: impl FnMut() -> Result<T, ApiError>,
    ) -> Result<T, DataError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !is_transient(&err) {
                log::debug!("{label}: fatal error on attempt {attempt}: {err}");
                return Err(DataError::PermanentRemote(err));
            }
            let delay = self.policy.delay_for(attempt - 1);
            if attempt >= max_attempts {
                log::warn!(
                    "{label}: transient error on final attempt {attempt}, backing off {delay:?} before giving up: {err}"
                );
                (self.sleep)(delay);
                return Err(DataError::TransientRemote {
                    attempts: attempt,
                    source: err,
                });
            }
            log::warn!(
                "{label}: transient error on attempt {attempt}/{max_attempts}, retrying in {delay:?}: {err}"
            );
            (self.sleep)(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_executor() -> (RetryExecutor, Arc<Mutex<Vec<Duration>>>) {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&sleeps);
        let executor = RetryExecutor::with_sleeper(
            RetryPolicy::default(),
            Arc::new(move |d: Duration| recorded.lock().unwrap().push(d)),
        );
        (executor, sleeps)
    }

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_secs).collect()
    }

    #[test]
    fn default_policy_doubles_from_one_second() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delays(), secs(&[1, 2, 4, 8, 16]));
        let total: Duration = policy.delays().into_iter().sum();
        assert_eq!(total, Duration::from_secs(31));
    }

    #[test]
    fn classification_matches_status_codes_and_markers() {
        assert!(is_transient(&ApiError::http(429, "")));
        assert!(is_transient(&ApiError::http(500, "")));
        assert!(is_transient(&ApiError::http(503, "")));
        assert!(is_transient(&ApiError::http(
            403,
            "Quota exceeded for quota metric 'Read requests'"
        )));
        assert!(is_transient(&ApiError::transport(
            r#"{"reason": "rateLimitExceeded"}"#
        )));

        assert!(!is_transient(&ApiError::http(403, "The caller does not have permission")));
        assert!(!is_transient(&ApiError::http(404, "Requested entity was not found.")));
        assert!(!is_transient(&ApiError::http(502, "Bad gateway")));
        assert!(!is_transient(&ApiError::transport("connection reset by peer")));
    }

    #[test]
    fn succeeds_after_two_overloaded_attempts() {
        let (executor, sleeps) = recording_executor();
        let mut attempts = 0;

        let result = executor.execute("read", || {
            attempts += 1;
            if attempts <= 2 {
                Err(ApiError::http(503, "backend unavailable"))
            } else {
                Ok("values")
            }
        });

        assert_eq!(result.unwrap(), "values");
        assert_eq!(attempts, 3);
        assert_eq!(*sleeps.lock().unwrap(), secs(&[1, 2]));
    }

    #[test]
    fn fatal_error_is_not_retried() {
        let (executor, sleeps) = recording_executor();
        let mut attempts = 0;

        let result: Result<(), _> = executor.execute("write", || {
            attempts += 1;
            Err(ApiError::http(403, "permission denied"))
        });

        assert!(matches!(result, Err(DataError::PermanentRemote(ref e)) if e.status == Some(403)));
        assert_eq!(attempts, 1);
        assert!(sleeps.lock().unwrap().is_empty());
    }

    #[test]
    fn exhausted_attempts_return_last_error() {
        let (executor, sleeps) = recording_executor();
        let mut attempts = 0u32;

        let result: Result<(), _> = executor.execute("append", || {
            attempts += 1;
            Err(ApiError::http(429, format!("rateLimitExceeded #{attempts}")))
        });

        match result {
            Err(DataError::TransientRemote { attempts: n, source }) => {
                assert_eq!(n, 5);
                assert_eq!(source.message, "rateLimitExceeded #5");
            }
            other => panic!("expected TransientRemote, got {other:?}"),
        }
        assert_eq!(attempts, 5);
        assert_eq!(*sleeps.lock().unwrap(), secs(&[1, 2, 4, 8, 16]));
    }

    #[test]
    fn transient_then_fatal_stops_at_the_fatal_error() {
        let (executor, sleeps) = recording_executor();
        let mut attempts = 0;

        let result: Result<(), _> = executor.execute("read", || {
            attempts += 1;
            if attempts == 1 {
                Err(ApiError::http(500, "internal"))
            } else {
                Err(ApiError::http(400, "bad range"))
            }
        });

        assert!(matches!(result, Err(DataError::PermanentRemote(_))));
        assert_eq!(attempts, 2);
        assert_eq!(*sleeps.lock().unwrap(), secs(&[1]));
    }
}
