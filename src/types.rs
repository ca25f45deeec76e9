//! Core types for hazard disaggregation
//!
//! ## Table of Contents
//! - **CalculationId / RealizationId**: Identifiers for calculations and logic-tree realizations
//! - **Site**: Geographic location of interest
//! - **Imt**: Intensity-measure type
//! - **LogicTreePath**: Branch path through a logic tree
//! - **Realization**: One sampled logic-tree combination
//! - **SeismicSource / GsimSet**: Inputs materialized by the upstream pipeline
//! - **Calculation / CalculationSettings**: The job being orchestrated

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a hazard calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalculationId(Uuid);

impl CalculationId {
    /// Create a new random CalculationId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a CalculationId from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CalculationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CalculationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "calc-{}", &self.0.to_string()[..8])
    }
}

/// Unique identifier for a logic-tree realization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RealizationId(u64);

impl RealizationId {
    /// Create a new RealizationId from a u64
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RealizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RealizationId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

/// A geographic site for which hazard is disaggregated
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Longitude in decimal degrees
    pub lon: f64,
    /// Latitude in decimal degrees
    pub lat: f64,
}

impl Site {
    /// Create a site at the given longitude/latitude
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Render the site location as 2-D well-known text
    pub fn wkt(&self) -> String {
        format!("POINT({} {})", self.lon, self.lat)
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wkt())
    }
}

/// Intensity-measure type
///
/// Spectral acceleration carries its period and damping so that a single
/// value identifies the measure completely; everywhere a result is keyed by
/// "IMT" the period and damping are part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Imt {
    /// Peak ground acceleration
    Pga,
    /// Peak ground velocity
    Pgv,
    /// Peak ground displacement
    Pgd,
    /// Spectral acceleration at a period (s) and damping (% critical)
    Sa {
        /// Spectral period in seconds
        period: f64,
        /// Damping as a percentage of critical
        damping: f64,
    },
    /// Arias intensity
    Ia,
    /// Relative significant duration
    Rsd,
}

impl Imt {
    /// Spectral acceleration with the conventional 5% damping
    pub fn sa(period: f64) -> Self {
        Self::Sa {
            period,
            damping: 5.0,
        }
    }

    /// Spectral period, if this is a spectral measure
    pub fn period(&self) -> Option<f64> {
        match self {
            Self::Sa { period, .. } => Some(*period),
            _ => None,
        }
    }

    /// Damping, if this is a spectral measure
    pub fn damping(&self) -> Option<f64> {
        match self {
            Self::Sa { damping, .. } => Some(*damping),
            _ => None,
        }
    }
}

impl fmt::Display for Imt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pga => write!(f, "PGA"),
            Self::Pgv => write!(f, "PGV"),
            Self::Pgd => write!(f, "PGD"),
            Self::Sa { period, .. } => write!(f, "SA({})", period),
            Self::Ia => write!(f, "IA"),
            Self::Rsd => write!(f, "RSD"),
        }
    }
}

/// Ordered branch identifiers locating one path through a logic tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicTreePath(Vec<String>);

impl LogicTreePath {
    /// Create a path from branch identifiers
    pub fn new(branches: Vec<impl Into<String>>) -> Self {
        Self(branches.into_iter().map(|b| b.into()).collect())
    }

    /// The branch identifiers in order
    pub fn branches(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for LogicTreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("_"))
    }
}

/// One sampled combination of source-model and ground-motion-model
/// logic-tree paths
///
/// Realizations are created by the upstream bootstrap phase. This crate
/// reads them and advances their progress; it never creates or deletes them
/// outside calculation cleanup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Realization {
    /// Realization identifier
    pub id: RealizationId,
    /// Owning calculation
    pub calculation: CalculationId,
    /// Path through the source-model logic tree
    pub sm_path: LogicTreePath,
    /// Path through the ground-motion-model logic tree
    pub gsim_path: LogicTreePath,
    /// Total number of sites this realization must process
    pub total_sites: u32,
    /// Sampling weight
    pub weight: f64,
}

impl Realization {
    /// Create a realization record
    pub fn new(
        id: impl Into<RealizationId>,
        calculation: CalculationId,
        sm_path: LogicTreePath,
        gsim_path: LogicTreePath,
        total_sites: u32,
    ) -> Self {
        Self {
            id: id.into(),
            calculation,
            sm_path,
            gsim_path,
            total_sites,
            weight: 1.0,
        }
    }

    /// Set the sampling weight
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// A seismic source, parsed and uncertainty-applied by the upstream
/// source-model pipeline
///
/// The geometry and occurrence model are opaque to the orchestration layer;
/// only the kernel interprets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeismicSource {
    /// Source identifier within its model
    pub id: String,
    /// Human-readable source name
    pub name: String,
    /// Tectonic-region type (e.g. "Active Shallow Crust")
    pub tectonic_region: String,
    /// Parsed geometry + occurrence payload, consumed by the kernel
    pub model: serde_json::Value,
}

impl SeismicSource {
    /// Create a source with an opaque model payload
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        tectonic_region: impl Into<String>,
        model: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tectonic_region: tectonic_region.into(),
            model,
        }
    }
}

/// Ground-motion-model set: one GMPE per tectonic-region type, resolved
/// from a ground-motion logic-tree path by the upstream pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GsimSet {
    mapping: BTreeMap<String, String>,
}

impl GsimSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a GMPE to a tectonic-region type
    pub fn with_gmpe(mut self, tectonic_region: impl Into<String>, gmpe: impl Into<String>) -> Self {
        self.mapping.insert(tectonic_region.into(), gmpe.into());
        self
    }

    /// Look up the GMPE for a tectonic-region type
    pub fn gmpe_for(&self, tectonic_region: &str) -> Option<&str> {
        self.mapping.get(tectonic_region).map(|s| s.as_str())
    }

    /// Iterate (tectonic region, GMPE) pairs in region order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.mapping.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of tectonic-region entries
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    /// Whether the set has no entries
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}

/// Intensity-measure type with its configured IML levels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImtLevels {
    /// The intensity-measure type
    pub imt: Imt,
    /// Intensity-measure levels in ascending order
    pub levels: Vec<f64>,
}

impl ImtLevels {
    /// Pair an IMT with its levels
    pub fn new(imt: Imt, levels: Vec<f64>) -> Self {
        Self { imt, levels }
    }
}

/// Calculation-wide disaggregation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationSettings {
    /// IMTs and their levels, in configuration order
    pub imts: Vec<ImtLevels>,
    /// Probabilities of exceedance to disaggregate, in configuration order
    pub poes_disagg: Vec<f64>,
    /// Investigation time in years
    pub investigation_time: f64,
    /// Ground-motion truncation level (standard deviations)
    pub truncation_level: f64,
    /// Number of epsilon histogram bins
    pub num_epsilon_bins: u32,
    /// Magnitude bin width
    pub mag_bin_width: f64,
    /// Distance bin width in km
    pub distance_bin_width: f64,
    /// Longitude/latitude bin width in decimal degrees
    pub coordinate_bin_width: f64,
    /// Maximum source-to-site distance in km
    pub maximum_distance: f64,
    /// Number of sites per unit of work
    pub block_size: usize,
}

impl CalculationSettings {
    /// Validate settings invariants
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::DisaggError;

        if self.imts.is_empty() {
            return Err(DisaggError::config("at least one IMT is required"));
        }
        if self.poes_disagg.is_empty() {
            return Err(DisaggError::config(
                "at least one disaggregation POE is required",
            ));
        }
        if self.block_size == 0 {
            return Err(DisaggError::config("block_size must be greater than zero"));
        }
        if self.num_epsilon_bins == 0 {
            return Err(DisaggError::config(
                "num_epsilon_bins must be greater than zero",
            ));
        }
        for width in [
            self.mag_bin_width,
            self.distance_bin_width,
            self.coordinate_bin_width,
        ] {
            if width <= 0.0 {
                return Err(DisaggError::config("bin widths must be positive"));
            }
        }
        if self.maximum_distance <= 0.0 {
            return Err(DisaggError::config("maximum_distance must be positive"));
        }
        Ok(())
    }
}

/// Temporal, truncation and binning parameters shared by every kernel
/// invocation of a calculation
///
/// A snapshot of the relevant [`CalculationSettings`] fields, carried by
/// each computation request behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParameters {
    /// Investigation time in years
    pub investigation_time: f64,
    /// Ground-motion truncation level
    pub truncation_level: f64,
    /// Number of epsilon bins
    pub num_epsilon_bins: u32,
    /// Magnitude bin width
    pub mag_bin_width: f64,
    /// Distance bin width in km
    pub distance_bin_width: f64,
    /// Coordinate bin width in decimal degrees
    pub coordinate_bin_width: f64,
    /// Maximum source-to-site distance in km
    pub maximum_distance: f64,
}

impl From<&CalculationSettings> for JobParameters {
    fn from(settings: &CalculationSettings) -> Self {
        Self {
            investigation_time: settings.investigation_time,
            truncation_level: settings.truncation_level,
            num_epsilon_bins: settings.num_epsilon_bins,
            mag_bin_width: settings.mag_bin_width,
            distance_bin_width: settings.distance_bin_width,
            coordinate_bin_width: settings.coordinate_bin_width,
            maximum_distance: settings.maximum_distance,
        }
    }
}

/// A hazard calculation: the sites to disaggregate and the settings that
/// govern every unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calculation {
    /// Calculation identifier
    pub id: CalculationId,
    /// Sites of interest, in configuration order
    pub sites: Vec<Site>,
    /// Disaggregation settings
    pub settings: CalculationSettings,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Calculation {
    /// Create a calculation over the given sites
    pub fn new(sites: Vec<Site>, settings: CalculationSettings) -> Self {
        Self {
            id: CalculationId::new(),
            sites,
            settings,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CalculationSettings {
        CalculationSettings {
            imts: vec![ImtLevels::new(Imt::Pga, vec![0.1, 0.2, 0.3])],
            poes_disagg: vec![0.1, 0.02],
            investigation_time: 50.0,
            truncation_level: 3.0,
            num_epsilon_bins: 6,
            mag_bin_width: 0.5,
            distance_bin_width: 10.0,
            coordinate_bin_width: 0.5,
            maximum_distance: 200.0,
            block_size: 100,
        }
    }

    #[test]
    fn test_site_wkt() {
        let site = Site::new(-122.3, 38.1);
        assert_eq!(site.wkt(), "POINT(-122.3 38.1)");
        assert_eq!(site.to_string(), "POINT(-122.3 38.1)");
    }

    #[test]
    fn test_imt_display() {
        assert_eq!(Imt::Pga.to_string(), "PGA");
        assert_eq!(Imt::Pgv.to_string(), "PGV");
        assert_eq!(Imt::sa(0.025).to_string(), "SA(0.025)");
        assert_eq!(Imt::sa(1.0).to_string(), "SA(1)");
    }

    #[test]
    fn test_imt_spectral_accessors() {
        let sa = Imt::sa(0.1);
        assert_eq!(sa.period(), Some(0.1));
        assert_eq!(sa.damping(), Some(5.0));
        assert_eq!(Imt::Pga.period(), None);
    }

    #[test]
    fn test_logic_tree_path_display() {
        let path = LogicTreePath::new(vec!["b1", "b3"]);
        assert_eq!(path.to_string(), "b1_b3");
        assert_eq!(path.branches().len(), 2);
    }

    #[test]
    fn test_gsim_set_lookup() {
        let gsims = GsimSet::new()
            .with_gmpe("Active Shallow Crust", "BooreAtkinson2008")
            .with_gmpe("Stable Continental", "ToroEtAl2002");

        assert_eq!(
            gsims.gmpe_for("Active Shallow Crust"),
            Some("BooreAtkinson2008")
        );
        assert_eq!(gsims.gmpe_for("Subduction Interface"), None);
        assert_eq!(gsims.len(), 2);
    }

    #[test]
    fn test_settings_validation() {
        assert!(settings().validate().is_ok());

        let mut bad = settings();
        bad.poes_disagg.clear();
        assert!(bad.validate().is_err());

        let mut bad = settings();
        bad.block_size = 0;
        assert!(bad.validate().is_err());

        let mut bad = settings();
        bad.mag_bin_width = 0.0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_realization_builder() {
        let calc = CalculationId::new();
        let rlz = Realization::new(
            3u64,
            calc,
            LogicTreePath::new(vec!["b1"]),
            LogicTreePath::new(vec!["b1"]),
            12,
        )
        .with_weight(0.25);

        assert_eq!(rlz.id.as_u64(), 3);
        assert_eq!(rlz.total_sites, 12);
        assert_eq!(rlz.weight, 0.25);
    }
}
