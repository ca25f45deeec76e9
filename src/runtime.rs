//! Disaggregation engine
//!
//! ## Table of Contents
//! - **DisaggEngine**: Runs a calculation's disaggregation phase
//! - **CalculationReport**: Calculation-level success/failure summary
//! - **UnitFailure**: One failed unit with its error

use crate::builder::EngineConfig;
use crate::dispatch::{compute_unit, enumerate_units, UnitContext, UnitReport, WorkUnit};
use crate::error::Result;
use crate::kernel::DisaggKernel;
use crate::metrics::DisaggMetrics;
use crate::store::BoxedHazardStore;
use crate::task::{LocalExecutor, TaskSubmitter, UnitOutcome, UnitRunner};
use crate::types::{Calculation, CalculationId};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// A failed unit and the error that exhausted its retries
#[derive(Debug)]
pub struct UnitFailure {
    /// The unit that failed
    pub unit: WorkUnit,
    /// Rendered error message
    pub error: String,
}

/// Calculation-level outcome of the disaggregation phase
///
/// Distinguishes "all sites disaggregated" from "N site-units failed";
/// degenerate-curve and no-ruptures skips are accounted but are not
/// failures.
#[derive(Debug)]
pub struct CalculationReport {
    /// The calculation that ran
    pub calculation: CalculationId,
    /// Units dispatched
    pub units_total: usize,
    /// Aggregated accounting across successful units
    pub totals: UnitReport,
    /// Units whose retries were exhausted
    pub failures: Vec<UnitFailure>,
}

impl CalculationReport {
    /// Whether every unit completed
    pub fn all_units_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of failed units
    pub fn units_failed(&self) -> usize {
        self.failures.len()
    }

    /// Operator-facing one-line summary
    pub fn summary(&self) -> String {
        if self.all_units_succeeded() {
            format!(
                "all sites disaggregated: {} results across {} units",
                self.totals.results_created, self.units_total
            )
        } else {
            format!(
                "{} of {} site-units failed",
                self.units_failed(),
                self.units_total
            )
        }
    }
}

// binds the unit body to its context; registered on the executor at startup
struct EngineRunner {
    ctx: UnitContext,
}

#[async_trait]
impl UnitRunner for EngineRunner {
    async fn run(&self, unit: WorkUnit) -> Result<UnitReport> {
        compute_unit(&self.ctx, &unit).await
    }
}

/// The disaggregation engine: dispatches a calculation's units across the
/// task substrate and aggregates their outcomes
pub struct DisaggEngine {
    config: EngineConfig,
    store: BoxedHazardStore,
    kernel: Arc<dyn DisaggKernel>,
    metrics: Option<Arc<DisaggMetrics>>,
}

impl std::fmt::Debug for DisaggEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisaggEngine")
            .field("config", &self.config)
            .field("store", &self.store.name())
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

impl DisaggEngine {
    /// Create an engine (use [`EngineBuilder`](crate::builder::EngineBuilder) instead)
    pub(crate) fn new(
        config: EngineConfig,
        store: BoxedHazardStore,
        kernel: Arc<dyn DisaggKernel>,
        metrics: Option<Arc<DisaggMetrics>>,
    ) -> Self {
        Self {
            config,
            store,
            kernel,
            metrics,
        }
    }

    /// The engine's configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The storage gateway
    pub fn store(&self) -> &BoxedHazardStore {
        &self.store
    }

    /// The metrics instance, if enabled
    pub fn metrics(&self) -> Option<&Arc<DisaggMetrics>> {
        self.metrics.as_ref()
    }

    /// Run the disaggregation phase of a calculation.
    ///
    /// Preconditions: realizations are bootstrapped and hazard curves are
    /// materialized in the store. The calculation record itself is
    /// persisted here so units can read it back.
    pub async fn run(&self, calculation: &Calculation) -> Result<CalculationReport> {
        calculation.settings.validate()?;
        self.store.put_calculation(calculation.clone()).await?;

        info!(
            calculation = %calculation.id,
            sites = calculation.sites.len(),
            block_size = calculation.settings.block_size,
            "starting disaggregation phase"
        );

        let units = enumerate_units(self.store.as_ref(), calculation).await?;
        if units.is_empty() {
            info!(calculation = %calculation.id, "no units to dispatch");
            return Ok(CalculationReport {
                calculation: calculation.id,
                units_total: 0,
                totals: UnitReport::default(),
                failures: Vec::new(),
            });
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_units_submitted(units.len() as u64);
        }

        let runner = Arc::new(EngineRunner {
            ctx: UnitContext {
                store: Arc::clone(&self.store),
                kernel: Arc::clone(&self.kernel),
                metrics: self.metrics.clone(),
            },
        });
        let submitter: Arc<dyn TaskSubmitter> = Arc::new(LocalExecutor::new(
            runner,
            self.config.concurrency,
            self.config.retry.clone(),
        ));

        let units_total = units.len();
        let outcomes = submitter.submit_all(units).await;
        let report = self.aggregate(calculation.id, units_total, outcomes);

        if report.all_units_succeeded() {
            info!(calculation = %calculation.id, "{}", report.summary());
        } else {
            warn!(calculation = %calculation.id, "{}", report.summary());
        }

        Ok(report)
    }

    /// Delete every record owned by a calculation.
    ///
    /// Results are final outputs; only call this when the calculation as a
    /// whole is being discarded.
    pub async fn clean_up(&self, calculation: CalculationId) -> Result<()> {
        info!(calculation = %calculation, "cleaning up calculation records");
        self.store.delete_calculation(calculation).await
    }

    fn aggregate(
        &self,
        calculation: CalculationId,
        units_total: usize,
        outcomes: Vec<UnitOutcome>,
    ) -> CalculationReport {
        let mut totals = UnitReport::default();
        let mut failures = Vec::new();

        for outcome in outcomes {
            if let Some(metrics) = &self.metrics {
                metrics.record_unit_completed(outcome.succeeded());
            }
            match outcome.result {
                Ok(report) => {
                    totals.sites_processed += report.sites_processed;
                    totals.requests_enumerated += report.requests_enumerated;
                    totals.results_created += report.results_created;
                    totals.results_existing += report.results_existing;
                    totals.degenerate_skips += report.degenerate_skips;
                    totals.no_rupture_skips += report.no_rupture_skips;
                }
                Err(err) => {
                    warn!(unit = %outcome.unit.label(), error = %err, "unit failed");
                    failures.push(UnitFailure {
                        unit: outcome.unit,
                        error: err.to_string(),
                    });
                }
            }
        }

        CalculationReport {
            calculation,
            units_total,
            totals,
            failures,
        }
    }
}
