//! Retry executor with exponential backoff and jitter.
//!
//! [`Retry`] runs an async operation until it succeeds, runs out of attempts,
//! or fails with an error the retry condition rejects. Attempts are strictly
//! sequential; the wait between them is a tokio timer, so it never blocks other
//! tasks. Each call owns its own counters, so concurrent calls do not interact.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1_000);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Backoff settings for one retried call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent one.
    pub base_delay: Duration,
    /// Upper clamp on any computed delay.
    pub max_delay: Duration,
    /// Scale each delay by a random factor in `[0.5, 1.5]`.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A config that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Effective number of attempts (never less than one).
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Exponential delay before retry number `attempt_index + 1`, without jitter.
///
/// `min(base_delay * 2^attempt_index, max_delay)`
pub fn exponential_delay(config: &RetryConfig, attempt_index: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt_index).unwrap_or(u32::MAX);
    config
        .base_delay
        .checked_mul(factor)
        .unwrap_or(Duration::MAX)
        .min(config.max_delay)
}

/// Delay actually slept before retry number `attempt_index + 1`.
pub fn backoff_delay(config: &RetryConfig, attempt_index: u32) -> Duration {
    let delay = exponential_delay(config, attempt_index);
    if !config.jitter {
        return delay;
    }
    apply_jitter(delay, config.max_delay, &mut rand::thread_rng())
}

fn apply_jitter<R: Rng + ?Sized>(delay: Duration, max_delay: Duration, rng: &mut R) -> Duration {
    let factor: f64 = rng.gen_range(0.5..=1.5);
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor)
        .unwrap_or(max_delay)
        .min(max_delay)
}

/// Classifies an error as transient (worth retrying) or permanent.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Notified before each retry sleep. Purely observational.
pub trait RetryObserver<E>: Send + Sync {
    /// `attempt` is the 1-based number of the attempt that just failed.
    fn on_retry(&self, error: &E, attempt: u32, delay: Duration);
}

impl<E, F> RetryObserver<E> for F
where
    F: Fn(&E, u32, Duration) + Send + Sync,
{
    fn on_retry(&self, error: &E, attempt: u32, delay: Duration) {
        self(error, attempt, delay)
    }
}

/// The last error of a retried call, with the number of attempts made.
#[derive(Debug)]
pub struct RetryError<E> {
    error: E,
    attempts: u32,
    cancelled: bool,
}

impl<E> RetryError<E> {
    fn new(error: E, attempts: u32, cancelled: bool) -> Self {
        Self {
            error,
            attempts,
            cancelled,
        }
    }

    pub fn error(&self) -> &E {
        &self.error
    }

    pub fn into_inner(self) -> E {
        self.error
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True when a cancellation signal cut a backoff sleep short.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {} attempt(s)", self.error, self.attempts)?;
        if self.cancelled {
            write!(f, ", cancelled")?;
        }
        write!(f, ")")
    }
}

impl<E> std::error::Error for RetryError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

type Condition<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

/// Retry executor for operations failing with `E`.
pub struct Retry<E> {
    config: RetryConfig,
    condition: Condition<E>,
    observer: Option<Arc<dyn RetryObserver<E>>>,
    cancel: Option<CancellationToken>,
}

impl<E: Retryable + 'static> Retry<E> {
    /// Executor using the error type's own [`Retryable`] classification.
    pub fn new(config: RetryConfig) -> Self {
        Self::with_condition(config, E::is_retryable)
    }
}

impl<E> Retry<E> {
    /// Executor with an explicit retry condition.
    pub fn with_condition<F>(config: RetryConfig, condition: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            config,
            condition: Box::new(condition),
            observer: None,
            cancel: None,
        }
    }

    /// Replace the retry condition for this executor.
    pub fn retry_if<F>(mut self, condition: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.condition = Box::new(condition);
        self
    }

    pub fn on_retry<O>(mut self, observer: O) -> Self
    where
        O: RetryObserver<E> + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Attach a shared observer.
    pub fn observer(mut self, observer: Arc<dyn RetryObserver<E>>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Abort pending backoff sleeps once `token` is cancelled.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run `operation` under this executor's policy.
    ///
    /// Returns the first success, or the most recent error once attempts are
    /// exhausted, the condition rejects an error, or cancellation fires.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.config.attempts();
        let mut attempt = 0;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            attempt += 1;

            if attempt >= max_attempts || !(self.condition)(&error) {
                return Err(RetryError::new(error, attempt, false));
            }

            let delay = backoff_delay(&self.config, attempt - 1);
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Attempt failed, retrying: {}",
                error
            );
            if let Some(observer) = &self.observer {
                observer.on_retry(&error, attempt, delay);
            }

            match &self.cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            tracing::debug!(attempt, "Retry cancelled during backoff");
                            return Err(RetryError::new(error, attempt, true));
                        }
                        _ = sleep(delay) => {}
                    }
                }
                None => sleep(delay).await,
            }
        }
    }
}

/// Run `operation` with `config`, retrying errors their type classifies as retryable.
pub async fn execute_with_retry<T, E, F, Fut>(
    config: RetryConfig,
    operation: F,
) -> Result<T, RetryError<E>>
where
    E: Retryable + fmt::Display + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    Retry::new(config).run(operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Debug, Clone, PartialEq, thiserror::Error)]
    enum TestError {
        #[error("transient failure #{0}")]
        Transient(u32),
        #[error("permanent failure")]
        Permanent,
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient(_))
        }
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            jitter: false,
        }
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay, Duration::from_millis(1000));
        assert_eq!(config.max_delay, Duration::from_millis(30000));
        assert!(config.jitter);
    }

    #[test]
    fn test_exponential_delay() {
        let config = RetryConfig::default();
        assert_eq!(exponential_delay(&config, 0), Duration::from_millis(1000));
        assert_eq!(exponential_delay(&config, 1), Duration::from_millis(2000));
        assert_eq!(exponential_delay(&config, 2), Duration::from_millis(4000));
        assert_eq!(exponential_delay(&config, 5), Duration::from_millis(30000));
        assert_eq!(exponential_delay(&config, 40), Duration::from_millis(30000));
    }

    #[test]
    fn test_backoff_without_jitter_is_exact() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        };
        for attempt in 0..10 {
            assert_eq!(
                backoff_delay(&config, attempt),
                exponential_delay(&config, attempt)
            );
        }
    }

    #[test]
    fn test_jittered_delay_bounds() {
        let config = RetryConfig::default();
        let mut rng = StdRng::seed_from_u64(7);

        for attempt in 0..8 {
            let expected = exponential_delay(&config, attempt);
            for _ in 0..200 {
                let delay = apply_jitter(expected, config.max_delay, &mut rng);
                assert!(delay <= config.max_delay);
                assert!(delay >= expected.mul_f64(0.5));
                assert!(delay <= expected.mul_f64(1.5));
            }
        }

        for attempt in 0..8 {
            assert!(backoff_delay(&config, attempt) <= config.max_delay);
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let notified = Arc::new(Mutex::new(Vec::new()));
        let seen = notified.clone();

        let result = Retry::new(fast_config(3))
            .on_retry(move |e: &TestError, attempt: u32, delay: Duration| {
                seen.lock().unwrap().push((e.clone(), attempt, delay));
            })
            .run(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(TestError::Transient(n))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let notified = notified.lock().unwrap();
        assert_eq!(
            *notified,
            vec![
                (TestError::Transient(1), 1, Duration::from_millis(1)),
                (TestError::Transient(2), 2, Duration::from_millis(2)),
            ]
        );
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let retries = Arc::new(AtomicU32::new(0));
        let counter = retries.clone();

        let result: Result<(), _> = Retry::new(fast_config(10))
            .on_retry(move |_: &TestError, _: u32, _: Duration| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Permanent)
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts(), 1);
        assert!(!err.is_cancelled());
        assert_eq!(err.into_inner(), TestError::Permanent);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(retries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_attempt_never_retries() {
        for max_attempts in [0, 1] {
            let calls = AtomicU32::new(0);
            let result: Result<(), _> = Retry::new(fast_config(max_attempts))
                .run(|| async {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(TestError::Transient(n))
                })
                .await;

            assert_eq!(result.unwrap_err().attempts(), 1);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = Retry::new(fast_config(3))
            .run(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(TestError::Transient(n))
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.error(), &TestError::Transient(3));
        assert_eq!(err.to_string(), "transient failure #3 (after 3 attempt(s))");
    }

    #[tokio::test]
    async fn test_custom_condition_overrides_classifier() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = Retry::new(fast_config(4))
            .retry_if(|e: &TestError| *e == TestError::Permanent)
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Permanent)
            })
            .await;

        assert_eq!(result.unwrap_err().attempts(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_backoff() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            jitter: false,
        };
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = Retry::new(config)
            .cancel_on(token)
            .run(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(TestError::Transient(n))
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.attempts(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_execute_with_retry_helper() {
        let calls = AtomicU32::new(0);
        let value = execute_with_retry(fast_config(2), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 1 {
                Err(TestError::Transient(n))
            } else {
                Ok(n)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 2);
    }
}
