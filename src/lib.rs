//! # Hazard Disagg
//!
//! A Rust-native orchestration layer for seismic hazard disaggregation:
//! converts aggregate hazard curves into target intensity levels, splits
//! the (realization × site-block) space into independently retryable units
//! of work, invokes an external disaggregation kernel per surviving
//! (site, IMT, POE) combination, and persists exactly one histogram record
//! per combination even under re-execution.
//!
//! ## Features
//!
//! - **Curve interpolation**: target IMLs from increasing-IML /
//!   decreasing-POE hazard curves, with clamped boundary behavior
//! - **Parameter-space enumeration**: {IMT} × {site} × {POE} with
//!   degenerate-curve skips and fatal missing-curve detection
//! - **Work dispatch**: contiguous site blocks per realization, executed
//!   at-least-once with retry/backoff on a bounded worker pool
//! - **Idempotent results**: deterministic keys make unit retries safe
//! - **Progress tracking**: atomic per-realization counters with a
//!   completion flag
//! - **Metrics**: Prometheus-compatible counters and kernel latency
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hazard_disagg::{Calculation, CalculationSettings, EngineBuilder, Imt, ImtLevels, Site};
//! # use hazard_disagg::kernel::{DisaggKernel, KernelInput, KernelOutput};
//! # use hazard_disagg::Result;
//! # struct MyKernel;
//! # #[async_trait::async_trait]
//! # impl DisaggKernel for MyKernel {
//! #     async fn disaggregate(&self, _input: KernelInput) -> Result<Option<KernelOutput>> { Ok(None) }
//! #     fn name(&self) -> &str { "my-kernel" }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> hazard_disagg::Result<()> {
//!     let engine = EngineBuilder::new()
//!         .with_kernel(MyKernel)
//!         .with_concurrency(8)
//!         .build()?;
//!
//!     let settings = CalculationSettings {
//!         imts: vec![ImtLevels::new(Imt::Pga, vec![0.1, 0.2, 0.3])],
//!         poes_disagg: vec![0.1, 0.02],
//!         investigation_time: 50.0,
//!         truncation_level: 3.0,
//!         num_epsilon_bins: 6,
//!         mag_bin_width: 0.5,
//!         distance_bin_width: 10.0,
//!         coordinate_bin_width: 0.5,
//!         maximum_distance: 200.0,
//!         block_size: 100,
//!     };
//!     let calculation = Calculation::new(vec![Site::new(10.0, 45.0)], settings);
//!
//!     let report = engine.run(&calculation).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! The upstream phases (logic-tree sampling, source parsing, hazard-curve
//! computation) are preconditions: their outputs (realizations, sources,
//! GMPE sets and curves) must be materialized in the
//! [`HazardStore`](store::HazardStore) before `run` is called.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod assemble;
pub mod builder;
pub mod curve;
pub mod dispatch;
pub mod enumerate;
pub mod error;
pub mod kernel;
pub mod metrics;
pub mod progress;
pub mod retry;
pub mod runtime;
pub mod store;
pub mod task;
pub mod types;

// Re-exports for ergonomic API
pub use assemble::{assemble, display_name, DisaggResult, ResultKey};
pub use builder::{EngineBuilder, EngineConfig};
pub use curve::{interpolate_iml, HazardCurve};
pub use dispatch::{compute_unit, enumerate_units, split_site_blocks, UnitReport, WorkUnit};
pub use enumerate::ComputationRequest;
pub use error::{DisaggError, Result};
pub use kernel::{BinEdges, DisaggKernel, DisaggMatrix, DistanceFilter, KernelInput, KernelOutput};
pub use metrics::DisaggMetrics;
pub use progress::{ProgressTracker, RealizationProgress};
pub use retry::{RetryConfig, RetryPolicy};
pub use runtime::{CalculationReport, DisaggEngine, UnitFailure};
pub use store::{memory_store, CurveKey, FileStore, HazardStore, MemoryStore, SaveOutcome};
pub use task::{LocalExecutor, TaskSubmitter, UnitOutcome, UnitRunner};
pub use types::{
    Calculation, CalculationId, CalculationSettings, GsimSet, Imt, ImtLevels, JobParameters,
    LogicTreePath, Realization, RealizationId, SeismicSource, Site,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::builder::EngineBuilder;
    pub use crate::error::Result;
    pub use crate::kernel::{DisaggKernel, KernelInput, KernelOutput};
    pub use crate::runtime::DisaggEngine;
    pub use crate::store::HazardStore;
    pub use crate::types::{Calculation, CalculationSettings, Imt, ImtLevels, Site};
}
