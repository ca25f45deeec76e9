//! Task-execution substrate interface
//!
//! ## Table of Contents
//! - **UnitRunner**: Typed unit entry point, registered at construction
//! - **TaskSubmitter**: Trait the distributed substrate implements
//! - **LocalExecutor**: Tokio worker-pool reference implementation
//! - **UnitOutcome**: Caller-visible per-unit success/failure
//!
//! The entry point is registered explicitly on the executor when it is
//! built; there is no process-wide task registry. Execution is
//! at-least-once: the executor re-attempts units that fail with retryable
//! errors, and relies on the unit body's idempotent writes.

use crate::dispatch::{UnitReport, WorkUnit};
use crate::error::{DisaggError, Result};
use crate::retry::{RetryConfig, RetryPolicy};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// The computation entry point a substrate runs for each unit
#[async_trait]
pub trait UnitRunner: Send + Sync {
    /// Execute one unit to completion
    async fn run(&self, unit: WorkUnit) -> Result<UnitReport>;
}

/// Caller-visible outcome of one submitted unit
#[derive(Debug)]
pub struct UnitOutcome {
    /// The unit that was executed
    pub unit: WorkUnit,
    /// The unit's report, or the error that exhausted its retries
    pub result: Result<UnitReport>,
}

impl UnitOutcome {
    /// Whether the unit completed successfully
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Trait for the distributed task-execution substrate
///
/// Implementations provide at-least-once execution with caller-visible
/// success/failure per unit. Units are independent; submission order
/// carries no semantics.
#[async_trait]
pub trait TaskSubmitter: Send + Sync {
    /// Submit the units and await completion of all of them
    async fn submit_all(&self, units: Vec<WorkUnit>) -> Vec<UnitOutcome>;

    /// Substrate name for logging
    fn name(&self) -> &str;
}

/// Local tokio-based executor: the reference task substrate
///
/// Runs units as spawned tasks under a semaphore bound, retrying
/// retryable failures with exponential backoff.
pub struct LocalExecutor {
    runner: Arc<dyn UnitRunner>,
    concurrency: usize,
    retry: RetryPolicy,
}

impl LocalExecutor {
    /// Register the unit entry point and build an executor
    pub fn new(runner: Arc<dyn UnitRunner>, concurrency: usize, retry: RetryConfig) -> Self {
        Self {
            runner,
            concurrency: concurrency.max(1),
            retry: RetryPolicy::new(retry),
        }
    }
}

#[async_trait]
impl TaskSubmitter for LocalExecutor {
    async fn submit_all(&self, units: Vec<WorkUnit>) -> Vec<UnitOutcome> {
        info!(
            units = units.len(),
            concurrency = self.concurrency,
            "submitting units"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let descriptors = units.clone();

        let handles: Vec<_> = units
            .into_iter()
            .map(|unit| {
                let semaphore = Arc::clone(&semaphore);
                let runner = Arc::clone(&self.runner);
                let retry = self.retry.clone();
                tokio::spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            return UnitOutcome {
                                unit,
                                result: Err(DisaggError::task(format!(
                                    "executor shut down: {}",
                                    e
                                ))),
                            }
                        }
                    };
                    let result = retry.run(|| runner.run(unit.clone())).await;
                    UnitOutcome { unit, result }
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(descriptors.len());
        for (joined, descriptor) in join_all(handles).await.into_iter().zip(descriptors) {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(unit = %descriptor.label(), error = %e, "unit task panicked");
                    outcomes.push(UnitOutcome {
                        unit: descriptor,
                        result: Err(DisaggError::task(format!("unit task failed: {}", e))),
                    });
                }
            }
        }
        outcomes
    }

    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CalculationId, RealizationId, Site};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn unit(realization: u64, block_index: usize) -> WorkUnit {
        WorkUnit {
            calculation: CalculationId::new(),
            realization: RealizationId::new(realization),
            block_index,
            sites: vec![Site::new(10.0, 45.0)],
        }
    }

    struct CountingRunner {
        attempts: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl UnitRunner for CountingRunner {
        async fn run(&self, _unit: WorkUnit) -> Result<UnitReport> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(DisaggError::storage("write timed out"))
            } else {
                Ok(UnitReport::default())
            }
        }
    }

    struct BusyRunner {
        current: AtomicU32,
        peak: AtomicU32,
    }

    #[async_trait]
    impl UnitRunner for BusyRunner {
        async fn run(&self, _unit: WorkUnit) -> Result<UnitReport> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(UnitReport::default())
        }
    }

    #[tokio::test]
    async fn test_all_units_complete() {
        let runner = Arc::new(CountingRunner {
            attempts: AtomicU32::new(0),
            fail_first: 0,
        });
        let executor = LocalExecutor::new(runner, 4, RetryConfig::none());

        let outcomes = executor
            .submit_all(vec![unit(0, 0), unit(0, 1), unit(1, 0)])
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.succeeded()));
        // outcomes arrive in submission order
        assert_eq!(outcomes[2].unit.realization, RealizationId::new(1));
    }

    #[tokio::test]
    async fn test_retryable_failure_is_reattempted() {
        let runner = Arc::new(CountingRunner {
            attempts: AtomicU32::new(0),
            fail_first: 2,
        });
        let executor = LocalExecutor::new(
            Arc::clone(&runner) as Arc<dyn UnitRunner>,
            1,
            RetryConfig::new()
                .max_retries(3)
                .initial_delay(Duration::from_millis(1))
                .jitter(false),
        );

        let outcomes = executor.submit_all(vec![unit(0, 0)]).await;

        assert!(outcomes[0].succeeded());
        assert_eq!(runner.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_failure_is_not_reattempted() {
        struct FatalRunner {
            attempts: AtomicU32,
        }

        #[async_trait]
        impl UnitRunner for FatalRunner {
            async fn run(&self, _unit: WorkUnit) -> Result<UnitReport> {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                Err(DisaggError::missing_curve("PGA @ POINT(0 0)"))
            }
        }

        let runner = Arc::new(FatalRunner {
            attempts: AtomicU32::new(0),
        });
        let executor = LocalExecutor::new(
            Arc::clone(&runner) as Arc<dyn UnitRunner>,
            1,
            RetryConfig::new().max_retries(5),
        );

        let outcomes = executor.submit_all(vec![unit(0, 0)]).await;

        assert!(!outcomes[0].succeeded());
        assert_eq!(runner.attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(
            outcomes[0].result,
            Err(DisaggError::MissingCurve(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let runner = Arc::new(BusyRunner {
            current: AtomicU32::new(0),
            peak: AtomicU32::new(0),
        });
        let executor = LocalExecutor::new(
            Arc::clone(&runner) as Arc<dyn UnitRunner>,
            2,
            RetryConfig::none(),
        );

        let units = (0..8).map(|i| unit(0, i)).collect();
        let outcomes = executor.submit_all(units).await;

        assert!(outcomes.iter().all(|o| o.succeeded()));
        assert!(runner.peak.load(Ordering::SeqCst) <= 2);
    }
}
