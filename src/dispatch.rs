//! Work decomposition and the unit-of-work body
//!
//! ## Table of Contents
//! - **WorkUnit**: (calculation, realization, site block) descriptor
//! - **split_site_blocks / enumerate_units**: The dispatch plan
//! - **UnitReport**: Per-unit accounting
//! - **compute_unit**: The retryable unit body

use crate::assemble::assemble;
use crate::enumerate::enumerate_requests;
use crate::error::{DisaggError, Result};
use crate::kernel::{invoke, DisaggKernel};
use crate::metrics::{DisaggMetrics, KernelTimer};
use crate::progress::ProgressTracker;
use crate::store::{BoxedHazardStore, SaveOutcome};
use crate::types::{CalculationId, Calculation, RealizationId, Site};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// One independently schedulable unit of work: a contiguous block of a
/// realization's sites
///
/// Units are embarrassingly parallel across realizations and blocks, and
/// individually retryable: re-running a unit cannot duplicate results
/// because persistence is keyed by (realization, location, IMT, POE).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    /// Owning calculation
    pub calculation: CalculationId,
    /// Realization whose curves and sources the unit uses
    pub realization: RealizationId,
    /// Position of this block within the realization's site list
    pub block_index: usize,
    /// The sites this unit processes, in calculation order
    pub sites: Vec<Site>,
}

impl WorkUnit {
    /// Short label for logging
    pub fn label(&self) -> String {
        format!("rlz-{}/block-{}", self.realization, self.block_index)
    }
}

/// Split sites into contiguous blocks of at most `block_size`
pub fn split_site_blocks(sites: &[Site], block_size: usize) -> Vec<Vec<Site>> {
    assert!(block_size > 0, "block_size must be greater than zero");
    sites
        .chunks(block_size)
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Enumerate the units of a calculation: every realization crossed with
/// every site block.
///
/// Realizations come from the upstream bootstrap; a calculation with none
/// yields no units (and is reported trivially complete by the engine).
pub async fn enumerate_units(
    store: &dyn crate::store::HazardStore,
    calculation: &Calculation,
) -> Result<Vec<WorkUnit>> {
    let realizations = store.list_realizations(calculation.id).await?;
    if realizations.is_empty() {
        warn!(calculation = %calculation.id, "no realizations; nothing to dispatch");
        return Ok(Vec::new());
    }

    let blocks = split_site_blocks(&calculation.sites, calculation.settings.block_size);

    let mut units = Vec::with_capacity(realizations.len() * blocks.len());
    for realization in &realizations {
        for (block_index, sites) in blocks.iter().enumerate() {
            units.push(WorkUnit {
                calculation: calculation.id,
                realization: realization.id,
                block_index,
                sites: sites.clone(),
            });
        }
    }
    Ok(units)
}

/// Accounting for one executed unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    /// Sites the unit processed
    pub sites_processed: usize,
    /// Computation requests produced by the enumerator
    pub requests_enumerated: usize,
    /// Results persisted for the first time
    pub results_created: usize,
    /// Results that already existed (retry path)
    pub results_existing: usize,
    /// (site, IMT) combinations skipped on an all-zero curve
    pub degenerate_skips: u64,
    /// Requests where the kernel reported no contributing ruptures
    pub no_rupture_skips: usize,
}

/// Everything a unit body needs beyond the unit itself
#[derive(Clone)]
pub struct UnitContext {
    /// Storage gateway
    pub store: BoxedHazardStore,
    /// The numerical kernel
    pub kernel: Arc<dyn DisaggKernel>,
    /// Optional metrics sink
    pub metrics: Option<Arc<DisaggMetrics>>,
}

/// Execute one unit: enumerate requests, invoke the kernel per request,
/// persist surviving results, then advance realization progress.
///
/// Progress is an explicit second phase: it only runs after every result
/// write of the unit has returned, so a realization is never marked
/// further-progressed than its persisted results reflect. All faults
/// propagate to the task substrate; the unit is the unit of retry.
pub async fn compute_unit(ctx: &UnitContext, unit: &WorkUnit) -> Result<UnitReport> {
    debug!(
        unit = %unit.label(),
        sites = unit.sites.len(),
        "> computing disaggregation"
    );

    let calculation = ctx
        .store
        .get_calculation(unit.calculation)
        .await?
        .ok_or_else(|| {
            DisaggError::storage(format!("unknown calculation {}", unit.calculation))
        })?;
    let realization = ctx
        .store
        .get_realization(unit.realization)
        .await?
        .ok_or_else(|| {
            DisaggError::storage(format!("unknown realization {}", unit.realization))
        })?;

    let sources = Arc::new(ctx.store.list_sources(&realization.sm_path).await?);
    let gsims = Arc::new(
        ctx.store
            .get_gsims(&realization.gsim_path)
            .await?
            .ok_or_else(|| {
                DisaggError::storage(format!(
                    "no GMPE set for ground-motion path {}",
                    realization.gsim_path
                ))
            })?,
    );

    let enumeration = enumerate_requests(
        ctx.store.as_ref(),
        &calculation.settings,
        &realization,
        &unit.sites,
        sources,
        gsims,
    )
    .await?;

    let mut report = UnitReport {
        sites_processed: unit.sites.len(),
        requests_enumerated: enumeration.requests.len(),
        degenerate_skips: enumeration.degenerate_skips,
        ..UnitReport::default()
    };
    if let Some(metrics) = &ctx.metrics {
        metrics.record_requests(enumeration.requests.len() as u64);
        metrics.record_degenerate_skips(enumeration.degenerate_skips);
    }

    for request in &enumeration.requests {
        let timer = KernelTimer::start();
        let outcome = invoke(ctx.kernel.as_ref(), request).await?;
        if let Some(metrics) = &ctx.metrics {
            metrics.observe_kernel_seconds(timer.stop());
        }

        match outcome {
            None => {
                // no ruptures contribute at this IML: a valid outcome,
                // nothing to persist
                debug!(
                    site = %request.site,
                    imt = %request.imt,
                    poe = request.poe,
                    "kernel produced no ruptures; skipping"
                );
                report.no_rupture_skips += 1;
                if let Some(metrics) = &ctx.metrics {
                    metrics.record_no_rupture_skip();
                }
            }
            Some(output) => {
                let result = assemble(request, output);
                match ctx.store.save_result(result).await? {
                    SaveOutcome::Created => {
                        report.results_created += 1;
                        if let Some(metrics) = &ctx.metrics {
                            metrics.record_result_created();
                        }
                    }
                    SaveOutcome::AlreadyExists => report.results_existing += 1,
                }
            }
        }
    }

    // phase two: all writes are durable, advance progress
    let progress = ProgressTracker::new(Arc::clone(&ctx.store))
        .record_progress(unit.realization, unit.sites.len() as u32)
        .await?;
    if progress.complete {
        if let Some(metrics) = &ctx.metrics {
            metrics.record_realization_completed();
        }
    }

    debug!(unit = %unit.label(), "< done computing disaggregation");
    Ok(report)
}
