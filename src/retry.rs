//! Retry policy for transient unit failures
//!
//! The task substrate provides at-least-once execution by re-attempting
//! units that fail with a retryable error, with exponential backoff
//! between attempts. Non-retryable faults (missing curves, configuration
//! errors) surface immediately.

use crate::error::{DisaggError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of re-attempts after the first failure
    pub max_retries: u32,
    /// Initial delay between attempts
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable retries entirely
    pub fn none() -> Self {
        Self::default().max_retries(0)
    }

    /// Set maximum retries
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set initial delay
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    pub fn multiplier(mut self, mult: f64) -> Self {
        self.multiplier = mult.max(1.0);
        self
    }

    /// Enable/disable jitter
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }
}

/// Exponential backoff calculator
#[derive(Debug, Clone)]
pub struct UnitBackoff {
    config: RetryConfig,
    attempt: u32,
}

impl UnitBackoff {
    /// Create a new backoff from a config
    pub fn new(config: RetryConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Next delay, or `None` once retries are exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_retries {
            return None;
        }
        let delay = self.calculate_delay();
        self.attempt += 1;
        Some(delay)
    }

    fn calculate_delay(&self) -> Duration {
        let base = self.config.initial_delay.as_millis() as f64;
        let multiplied = base * self.config.multiplier.powi(self.attempt as i32);
        let capped = multiplied.min(self.config.max_delay.as_millis() as f64);

        let delay_ms = if self.config.jitter {
            // up to 25% jitter so retrying units don't synchronize
            capped + capped * 0.25 * clock_jitter()
        } else {
            capped
        };

        Duration::from_millis(delay_ms as u64)
    }

    /// Current attempt number
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

// cheap pseudo-random fraction in [0, 1)
fn clock_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

/// Executes unit bodies with retries on retryable faults
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from a config
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run an operation, re-attempting while it fails with a
    /// [retryable](DisaggError::is_retryable) error and retries remain.
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = UnitBackoff::new(self.config.clone());

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => {
                    if let Some(delay) = backoff.next_delay() {
                        debug!(
                            attempt = backoff.attempt(),
                            delay_ms = delay.as_millis(),
                            error = %err,
                            "retrying unit after retryable failure"
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        return Err(err);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_progression() {
        let config = RetryConfig::new()
            .max_retries(3)
            .initial_delay(Duration::from_millis(100))
            .multiplier(2.0)
            .jitter(false);
        let mut backoff = UnitBackoff::new(config);

        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(400)));
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn test_backoff_caps_at_max_delay() {
        let config = RetryConfig::new()
            .max_retries(10)
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(5))
            .multiplier(2.0)
            .jitter(false);
        let mut backoff = UnitBackoff::new(config);

        for _ in 0..5 {
            backoff.next_delay();
        }
        assert!(backoff.next_delay().unwrap() <= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let policy = RetryPolicy::new(
            RetryConfig::new()
                .max_retries(3)
                .initial_delay(Duration::from_millis(1))
                .jitter(false),
        );
        let attempts = AtomicU32::new(0);

        let value = policy
            .run(|| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(DisaggError::kernel("transient"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_fatal_failures() {
        let policy = RetryPolicy::new(RetryConfig::new().max_retries(5));
        let attempts = AtomicU32::new(0);

        let err = policy
            .run(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DisaggError::missing_curve("PGA @ POINT(0 0)")) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DisaggError::MissingCurve(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_the_error() {
        let policy = RetryPolicy::new(
            RetryConfig::new()
                .max_retries(2)
                .initial_delay(Duration::from_millis(1))
                .jitter(false),
        );
        let attempts = AtomicU32::new(0);

        let err = policy
            .run(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DisaggError::storage("still down")) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DisaggError::Storage(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
