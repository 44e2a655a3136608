//! Retry with exponential backoff for transient command failures.
//!
//! Package managers fail for reasons that go away on their own: another
//! process holds the dpkg/rpm lock, a mirror times out, DNS hiccups. Such
//! failures are recognized from stderr and retried; everything else fails
//! on the first attempt.

use provider::{CommandOutput, ProviderContext, ProviderError, Result};
use std::thread;
use std::time::Duration;

/// Lower-cased stderr fragments that mark a failure as transient.
const TRANSIENT_MARKERS: &[&str] = &[
    // Lock contention
    "could not get lock",
    "unable to acquire the dpkg frontend lock",
    "another app is currently holding the yum lock",
    "waiting for process with pid",
    "rpmdb: lock",
    "resource temporarily unavailable",
    // Network
    "temporary failure resolving",
    "could not resolve",
    "connection refused",
    "connection reset",
    "timed out",
    "failed to fetch",
    "failed to download",
    "curl",
    "cannot retrieve repository metadata",
];

/// Whether a failed command's stderr looks transient.
pub fn is_transient(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Whether an error is worth another attempt.
pub fn is_retryable(error: &ProviderError) -> bool {
    matches!(error, ProviderError::CommandFailed { .. })
        && error.stderr().is_some_and(is_transient)
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given attempt number (0-indexed).
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Retry immediately, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            backoff_factor: 1.0,
            max_delay: Duration::ZERO,
        }
    }
}

/// Execute an operation, retrying transient failures with backoff.
///
/// Returns the first success, the first permanent error, or the last
/// transient error once attempts run out.
pub fn with_retry<T, F>(config: &RetryConfig, what: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if is_retryable(&e) && attempt + 1 < config.max_attempts => {
                let delay = config.delay_for_attempt(attempt);
                log::warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {}s",
                    what,
                    attempt + 1,
                    config.max_attempts,
                    e,
                    delay.as_secs()
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run a provider command under [`with_retry`].
pub fn run<S: AsRef<str>>(
    ctx: &ProviderContext<'_>,
    config: &RetryConfig,
    symbol: &str,
    args: &[S],
) -> Result<CommandOutput> {
    with_retry(config, &format!("{} {}", ctx.provider(), symbol), || {
        ctx.run(symbol, args)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn failed(stderr: &str) -> ProviderError {
        ProviderError::CommandFailed {
            command: "apt-get install nginx".to_string(),
            status: Some(100),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(
            "E: Could not get lock /var/lib/dpkg/lock-frontend. It is held by process 1234"
        ));
        assert!(is_transient("Err:1 http://deb.debian.org Temporary failure resolving"));
        assert!(!is_transient("E: Unable to locate package nosuchpkg"));
        assert!(!is_retryable(&ProviderError::UnknownType("x".to_string())));
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(60));
    }

    #[test]
    fn test_eventual_success() {
        let attempts = Cell::new(0);
        let result = with_retry(&RetryConfig::immediate(3), "install", || {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 3 {
                Err(failed("Could not get lock /var/lib/dpkg/lock"))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_permanent_error_fails_fast() {
        let attempts = Cell::new(0);
        let result: Result<()> = with_retry(&RetryConfig::immediate(5), "install", || {
            attempts.set(attempts.get() + 1);
            Err(failed("E: Unable to locate package nosuchpkg"))
        });
        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_attempts_run_out() {
        let attempts = Cell::new(0);
        let result: Result<()> = with_retry(&RetryConfig::immediate(3), "install", || {
            attempts.set(attempts.get() + 1);
            Err(failed("connection timed out"))
        });
        assert!(result.is_err());
        assert_eq!(attempts.get(), 3);

        let attempts = Cell::new(0);
        let _: Result<()> = with_retry(&RetryConfig::no_retry(), "install", || {
            attempts.set(attempts.get() + 1);
            Err(failed("connection timed out"))
        });
        assert_eq!(attempts.get(), 1);
    }
}
