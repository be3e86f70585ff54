//! Retry with exponential backoff as an explicit policy value.
//!
//! A [`RetryPolicy`] bundles the attempt budget, the delay curve and the
//! classifier deciding which errors are worth another attempt.
//! [`retry_with_policy`] runs any fallible async operation under a policy,
//! waiting through a [`Sleeper`] so tests can observe the delays without
//! spending them.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use species_map_http::{HttpError, Sleeper};

/// Default attempt budget, first attempt included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default shortest backoff delay.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);

/// Default longest backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Wait applied to a rate-limited response without a usable
/// `Retry-After` hint. Also the floor for hints that are present.
pub const RATE_LIMIT_FLOOR: Duration = Duration::from_secs(1);

/// Longest wait honoured from a `Retry-After` hint.
pub const RATE_LIMIT_CEILING: Duration = Duration::from_secs(300);

/// How many times to try an operation and how long to wait in between.
///
/// The wait after failed attempt `n` (1-based) is
/// `multiplier * 2^(n-1)` seconds, clamped to `[min_delay, max_delay]`.
pub struct RetryPolicy<E> {
    max_attempts: u32,
    min_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    is_retryable: fn(&E) -> bool,
}

// Manual impls so `E` itself need not be `Clone`/`Debug`.
impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for RetryPolicy<E> {}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("min_delay", &self.min_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .finish_non_exhaustive()
    }
}

impl<E> RetryPolicy<E> {
    /// Creates a policy with the default budget (5 attempts, 1s floor, 30s
    /// ceiling, multiplier 1) and the given classifier.
    #[must_use]
    pub const fn new(is_retryable: fn(&E) -> bool) -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: 1.0,
            is_retryable,
        }
    }

    /// Sets the attempt budget. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the delay floor and ceiling.
    #[must_use]
    pub fn with_delays(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay.max(min_delay);
        self
    }

    /// Sets the base multiplier, in seconds.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Attempt budget, first attempt included.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether `error` should be retried.
    #[must_use]
    pub fn is_retryable(&self, error: &E) -> bool {
        (self.is_retryable)(error)
    }

    /// Wait after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let seconds = self.multiplier * 2f64.powi(exponent);
        let floor = self.min_delay.as_secs_f64();
        let ceiling = self.max_delay.as_secs_f64();
        let clamped = if seconds.is_finite() {
            seconds.clamp(floor, ceiling)
        } else {
            ceiling
        };
        Duration::try_from_secs_f64(clamped).unwrap_or(self.max_delay)
    }
}

impl RetryPolicy<HttpError> {
    /// Default policy for HTTP calls: retries what
    /// [`HttpError::is_transient`] considers transient.
    #[must_use]
    pub const fn http() -> Self {
        Self::new(HttpError::is_transient)
    }
}

impl Default for RetryPolicy<HttpError> {
    fn default() -> Self {
        Self::http()
    }
}

/// Why [`retry_with_policy`] gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last: E,
    },
    /// An attempt failed with an error the policy does not retry.
    Permanent {
        /// 1-based attempt that failed.
        attempt: u32,
        /// The error.
        error: E,
    },
}

impl<E> RetryError<E> {
    /// The underlying error.
    #[must_use]
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Permanent { error, .. } => error,
        }
    }
}

/// Runs `operation` until it succeeds, fails permanently, or exhausts the
/// policy's attempt budget.
///
/// `operation` receives the 1-based attempt number. Between attempts the
/// policy's backoff delay is awaited on `sleeper`.
///
/// # Errors
///
/// Returns [`RetryError::Permanent`] as soon as an attempt fails with an
/// error the policy does not retry, and [`RetryError::Exhausted`] with the
/// final error once the budget is spent.
pub async fn retry_with_policy<T, E, F, Fut>(
    policy: &RetryPolicy<E>,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if !policy.is_retryable(&error) => {
                return Err(RetryError::Permanent { attempt, error });
            }
            Err(error) if attempt >= policy.max_attempts => {
                log::error!("Giving up after {attempt} attempts: {error}");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }
            Err(error) => {
                let delay = policy.delay_after(attempt);
                log::warn!(
                    "  attempt {attempt}/{} failed ({error}), retrying in {delay:?}...",
                    policy.max_attempts
                );
                sleeper.sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Wait before classifying a rate-limited response.
///
/// Uses the `Retry-After` value when it parses as a positive number of
/// seconds, clamped to [`RATE_LIMIT_FLOOR`]..=[`RATE_LIMIT_CEILING`];
/// otherwise the floor.
#[must_use]
pub fn retry_after_delay(header: Option<&str>) -> Duration {
    header
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
        .map_or(RATE_LIMIT_FLOOR, |seconds| {
            Duration::try_from_secs_f64(seconds)
                .unwrap_or(RATE_LIMIT_CEILING)
                .clamp(RATE_LIMIT_FLOOR, RATE_LIMIT_CEILING)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use species_map_http::testing::RecordingSleeper;
    use std::cell::Cell;

    #[derive(Debug, PartialEq, Eq)]
    enum Failure {
        Flaky,
        Fatal,
    }

    impl fmt::Display for Failure {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{self:?}")
        }
    }

    const fn is_flaky(failure: &Failure) -> bool {
        matches!(failure, Failure::Flaky)
    }

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_secs).collect()
    }

    #[test]
    fn default_delays_double_from_floor() {
        let policy = RetryPolicy::new(is_flaky);
        let delays: Vec<Duration> = (1..=4).map(|n| policy.delay_after(n)).collect();
        assert_eq!(delays, secs(&[1, 2, 4, 8]));
    }

    #[test]
    fn delays_are_clamped_to_ceiling() {
        let policy = RetryPolicy::new(is_flaky);
        assert_eq!(policy.delay_after(6), Duration::from_secs(30));
        assert_eq!(policy.delay_after(200), Duration::from_secs(30));
        assert_eq!(policy.delay_after(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn small_multiplier_is_raised_to_floor() {
        let policy = RetryPolicy::new(is_flaky).with_multiplier(0.25);
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(4), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let sleeper = RecordingSleeper::new();
        let calls = Cell::new(0);
        let result = retry_with_policy(&RetryPolicy::new(is_flaky), &sleeper, |attempt| {
            calls.set(calls.get() + 1);
            async move {
                if attempt < 3 {
                    Err(Failure::Flaky)
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
        assert_eq!(sleeper.sleeps(), secs(&[1, 2]));
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let sleeper = RecordingSleeper::new();
        let result: Result<(), _> =
            retry_with_policy(&RetryPolicy::new(is_flaky), &sleeper, |_| async {
                Err(Failure::Fatal)
            })
            .await;

        assert!(matches!(
            result,
            Err(RetryError::Permanent {
                attempt: 1,
                error: Failure::Fatal
            })
        ));
        assert!(sleeper.sleeps().is_empty());
    }

    #[tokio::test]
    async fn exhaustion_surfaces_last_error() {
        let sleeper = RecordingSleeper::new();
        let result: Result<(), _> =
            retry_with_policy(&RetryPolicy::new(is_flaky), &sleeper, |_| async {
                Err(Failure::Flaky)
            })
            .await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 5);
                assert_eq!(last, Failure::Flaky);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(sleeper.sleeps(), secs(&[1, 2, 4, 8]));
    }

    #[tokio::test]
    async fn single_attempt_budget_never_sleeps() {
        let sleeper = RecordingSleeper::new();
        let policy = RetryPolicy::new(is_flaky).with_max_attempts(0);
        assert_eq!(policy.max_attempts(), 1);
        let result: Result<(), _> =
            retry_with_policy(&policy, &sleeper, |_| async { Err(Failure::Flaky) }).await;
        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 1, .. })));
        assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn http_policy_uses_transient_classification() {
        let policy = RetryPolicy::http();
        let status = |status| HttpError::Status {
            status,
            body_preview: String::new(),
        };
        assert!(policy.is_retryable(&status(429)));
        assert!(policy.is_retryable(&status(503)));
        assert!(!policy.is_retryable(&status(400)));
        assert!(!policy.is_retryable(&status(401)));
    }

    #[test]
    fn huge_ceiling_does_not_overflow() {
        let policy = RetryPolicy::http()
            .with_delays(Duration::from_secs(1), Duration::MAX)
            .with_multiplier(1e30);
        assert_eq!(policy.delay_after(3), Duration::MAX);
    }

    #[test]
    fn retry_after_parsing() {
        assert_eq!(retry_after_delay(Some("2")), Duration::from_secs(2));
        assert_eq!(retry_after_delay(Some(" 2.5 ")), Duration::from_millis(2500));
        assert_eq!(retry_after_delay(Some("0.2")), Duration::from_secs(1));
        assert_eq!(retry_after_delay(Some("0")), Duration::from_secs(1));
        assert_eq!(retry_after_delay(Some("-3")), Duration::from_secs(1));
        assert_eq!(retry_after_delay(Some("soon")), Duration::from_secs(1));
        assert_eq!(retry_after_delay(Some("inf")), Duration::from_secs(1));
        assert_eq!(retry_after_delay(None), Duration::from_secs(1));
        assert_eq!(retry_after_delay(Some("1e30")), RATE_LIMIT_CEILING);
        assert_eq!(retry_after_delay(Some("86400")), RATE_LIMIT_CEILING);
    }
}
