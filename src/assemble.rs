//! Result assembly and identification
//!
//! ## Table of Contents
//! - **DisaggResult**: The persisted histogram record
//! - **ResultKey**: Deterministic unique key for upsert-or-skip persistence
//! - **assemble**: Kernel output + request metadata → record

use crate::enumerate::ComputationRequest;
use crate::kernel::{DisaggMatrix, KernelOutput};
use crate::types::{Imt, RealizationId, Site};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deterministic unique key for one disaggregation result
///
/// Two result records collide exactly when their (realization, location,
/// IMT incl. spectral period/damping, POE) tuples match; the store uses
/// this key to make persistence idempotent under unit retries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultKey(String);

impl ResultKey {
    /// Build the key for a (realization, site, IMT, POE) combination
    pub fn new(realization: RealizationId, site: Site, imt: Imt, poe: f64) -> Self {
        Self(format!(
            "rlz-{}/{}/{}/poe-{}",
            realization,
            site.wkt(),
            imt_key_label(imt),
            poe
        ))
    }

    /// The canonical key string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Unlike the display name, the key must distinguish SA damping levels
fn imt_key_label(imt: Imt) -> String {
    match imt {
        Imt::Sa { period, damping } => format!("SA({},{})", period, damping),
        other => other.to_string(),
    }
}

/// One persisted disaggregation histogram
///
/// Created once per surviving (site, realization, IMT, POE) combination,
/// never mutated afterwards, deleted only on calculation cleanup. The six
/// bin-edge sequences are unpacked from the kernel's combined output in
/// the fixed magnitude/distance/longitude/latitude/epsilon/TRT order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisaggResult {
    /// Human-readable display name
    pub display_name: String,
    /// Owning realization
    pub realization: RealizationId,
    /// Site the histogram belongs to
    pub site: Site,
    /// Intensity-measure type (incl. spectral period/damping)
    pub imt: Imt,
    /// Target intensity-measure level the kernel was run at
    pub iml: f64,
    /// Probability of exceedance the IML was interpolated at
    pub poe: f64,
    /// Investigation time in years
    pub investigation_time: f64,
    /// Magnitude bin edges
    pub mag_bin_edges: Vec<f64>,
    /// Distance bin edges (km)
    pub dist_bin_edges: Vec<f64>,
    /// Longitude bin edges (decimal degrees)
    pub lon_bin_edges: Vec<f64>,
    /// Latitude bin edges (decimal degrees)
    pub lat_bin_edges: Vec<f64>,
    /// Epsilon bin edges
    pub eps_bin_edges: Vec<f64>,
    /// Tectonic-region-type labels
    pub trts: Vec<String>,
    /// Disaggregation probability tensor
    pub matrix: DisaggMatrix,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl DisaggResult {
    /// The record's unique key
    pub fn key(&self) -> ResultKey {
        ResultKey::new(self.realization, self.site, self.imt, self.poe)
    }

    /// Location as 2-D well-known text
    pub fn location_wkt(&self) -> String {
        self.site.wkt()
    }
}

/// Render the display name for a result:
/// `disagg(<poe>)-rlz-<realization>-<imt>-<wkt>`, with spectral
/// acceleration rendered `SA(<period>)`.
pub fn display_name(realization: RealizationId, site: Site, imt: Imt, poe: f64) -> String {
    format!("disagg({})-rlz-{}-{}-{}", poe, realization, imt, site.wkt())
}

/// Map one kernel output plus its request metadata into a persisted record
pub fn assemble(request: &ComputationRequest, output: KernelOutput) -> DisaggResult {
    let KernelOutput { bin_edges, matrix } = output;

    DisaggResult {
        display_name: display_name(request.realization, request.site, request.imt, request.poe),
        realization: request.realization,
        site: request.site,
        imt: request.imt,
        iml: request.iml,
        poe: request.poe,
        investigation_time: request.params.investigation_time,
        mag_bin_edges: bin_edges.magnitude,
        dist_bin_edges: bin_edges.distance,
        lon_bin_edges: bin_edges.longitude,
        lat_bin_edges: bin_edges.latitude,
        eps_bin_edges: bin_edges.epsilon,
        trts: bin_edges.tectonic_region_types,
        matrix,
        created_at: Utc::now(),
    }
}
