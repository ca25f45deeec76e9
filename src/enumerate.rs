//! Parameter-space enumeration
//!
//! For one realization and one block of sites, walks the
//! {IMT} × {site} × {POE} cross product, fetches the matching hazard curve
//! per (site, IMT), applies the skip conditions and interpolates the target
//! IML, yielding one [`ComputationRequest`] per surviving combination.

use crate::curve::interpolate_iml;
use crate::error::{DisaggError, Result};
use crate::store::{CurveKey, HazardStore};
use crate::types::{
    CalculationSettings, GsimSet, Imt, JobParameters, Realization, RealizationId, SeismicSource,
    Site,
};
use std::sync::Arc;
use tracing::debug;

/// One fully-resolved disaggregation computation: everything the kernel
/// invoker needs for a single (site, IMT, POE) combination
///
/// Requests are ephemeral: they are produced by the enumerator, consumed by
/// the invoker, and never persisted. The source list, GMPE set and job
/// parameters are shared across all requests of a unit.
#[derive(Debug, Clone)]
pub struct ComputationRequest {
    /// Realization whose curve produced the target IML
    pub realization: RealizationId,
    /// Site under disaggregation
    pub site: Site,
    /// Intensity-measure type
    pub imt: Imt,
    /// Probability of exceedance the IML was interpolated at
    pub poe: f64,
    /// Target intensity-measure level
    pub iml: f64,
    /// Seismic sources for the realization's source-model path
    pub sources: Arc<Vec<SeismicSource>>,
    /// Ground-motion models for the realization's ground-motion path
    pub gsims: Arc<GsimSet>,
    /// Shared temporal/truncation/binning parameters
    pub params: Arc<JobParameters>,
}

/// Output of one enumeration pass over a site block
#[derive(Debug, Default)]
pub struct Enumeration {
    /// Requests for every surviving (IMT, site, POE) combination
    pub requests: Vec<ComputationRequest>,
    /// Number of (site, IMT) combinations skipped on an all-zero curve
    pub degenerate_skips: u64,
}

/// Enumerate computation requests for a realization over a site block.
///
/// IMTs iterate in settings order, sites in block order, POEs in
/// configuration order. A missing hazard curve is a fatal precondition
/// violation (the upstream curve phase writes exactly one curve per
/// (site, IMT, realization)) and fails the unit rather than skipping.
/// An all-zero curve skips all POE levels for its combination with an
/// informational note.
pub async fn enumerate_requests(
    store: &dyn HazardStore,
    settings: &CalculationSettings,
    realization: &Realization,
    sites: &[Site],
    sources: Arc<Vec<SeismicSource>>,
    gsims: Arc<GsimSet>,
) -> Result<Enumeration> {
    let params = Arc::new(JobParameters::from(settings));
    let mut out = Enumeration::default();

    for imt_levels in &settings.imts {
        let imt = imt_levels.imt;
        for site in sites {
            let key = CurveKey::new(*site, imt, realization.id);
            let curve = store
                .get_curve(&key)
                .await?
                .ok_or_else(|| DisaggError::missing_curve(describe_combination(site, imt, realization.id)))?;

            if curve.is_degenerate() {
                debug!(
                    site = %site,
                    imt = %imt,
                    realization = %realization.id,
                    "hazard curve contained all 0 probability values; skipping"
                );
                out.degenerate_skips += 1;
                continue;
            }

            for &poe in &settings.poes_disagg {
                let iml = interpolate_iml(&curve, poe);
                out.requests.push(ComputationRequest {
                    realization: realization.id,
                    site: *site,
                    imt,
                    poe,
                    iml,
                    sources: Arc::clone(&sources),
                    gsims: Arc::clone(&gsims),
                    params: Arc::clone(&params),
                });
            }
        }
    }

    Ok(out)
}

fn describe_combination(site: &Site, imt: Imt, realization: RealizationId) -> String {
    format!("{} @ {} rlz-{}", imt, site.wkt(), realization)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::HazardCurve;
    use crate::store::MemoryStore;
    use crate::types::{CalculationId, ImtLevels, LogicTreePath};

    fn settings() -> CalculationSettings {
        CalculationSettings {
            imts: vec![
                ImtLevels::new(Imt::Pga, vec![0.1, 0.2, 0.3]),
                ImtLevels::new(Imt::sa(0.1), vec![0.1, 0.2, 0.3]),
            ],
            poes_disagg: vec![0.5, 0.1],
            investigation_time: 50.0,
            truncation_level: 3.0,
            num_epsilon_bins: 6,
            mag_bin_width: 0.5,
            distance_bin_width: 10.0,
            coordinate_bin_width: 0.5,
            maximum_distance: 200.0,
            block_size: 10,
        }
    }

    fn realization(total_sites: u32) -> Realization {
        Realization::new(
            0u64,
            CalculationId::new(),
            LogicTreePath::new(vec!["b1"]),
            LogicTreePath::new(vec!["b1"]),
            total_sites,
        )
    }

    async fn seed_curves(store: &MemoryStore, rlz: &Realization, sites: &[Site], poes: Vec<f64>) {
        for site in sites {
            for imt in [Imt::Pga, Imt::sa(0.1)] {
                let curve = HazardCurve::new(vec![0.1, 0.2, 0.3], poes.clone()).unwrap();
                store
                    .put_curve(CurveKey::new(*site, imt, rlz.id), curve)
                    .await
                    .unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_full_cross_product() {
        let store = MemoryStore::new();
        let rlz = realization(2);
        let sites = vec![Site::new(10.0, 45.0), Site::new(10.5, 45.0)];
        seed_curves(&store, &rlz, &sites, vec![0.9, 0.5, 0.1]).await;

        let out = enumerate_requests(
            &store,
            &settings(),
            &rlz,
            &sites,
            Arc::new(Vec::new()),
            Arc::new(GsimSet::new()),
        )
        .await
        .unwrap();

        // 2 imts * 2 sites * 2 poes
        assert_eq!(out.requests.len(), 8);
        assert_eq!(out.degenerate_skips, 0);

        // target IML at POE 0.5 is the middle knot
        let req = &out.requests[0];
        assert!((req.iml - 0.2).abs() < 1e-12);
        assert_eq!(req.poe, 0.5);
        assert_eq!(req.imt, Imt::Pga);
    }

    #[tokio::test]
    async fn test_degenerate_curve_yields_nothing() {
        let store = MemoryStore::new();
        let rlz = realization(1);
        let sites = vec![Site::new(10.0, 45.0)];
        seed_curves(&store, &rlz, &sites, vec![0.0, 0.0, 0.0]).await;

        let out = enumerate_requests(
            &store,
            &settings(),
            &rlz,
            &sites,
            Arc::new(Vec::new()),
            Arc::new(GsimSet::new()),
        )
        .await
        .unwrap();

        assert!(out.requests.is_empty());
        // one skip per (site, IMT)
        assert_eq!(out.degenerate_skips, 2);
    }

    #[tokio::test]
    async fn test_missing_curve_is_fatal() {
        let store = MemoryStore::new();
        let rlz = realization(1);
        let sites = vec![Site::new(10.0, 45.0)];
        // no curves seeded

        let err = enumerate_requests(
            &store,
            &settings(),
            &rlz,
            &sites,
            Arc::new(Vec::new()),
            Arc::new(GsimSet::new()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DisaggError::MissingCurve(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_shared_inputs_are_not_cloned_per_request() {
        let store = MemoryStore::new();
        let rlz = realization(1);
        let sites = vec![Site::new(10.0, 45.0)];
        seed_curves(&store, &rlz, &sites, vec![0.9, 0.5, 0.1]).await;

        let sources = Arc::new(vec![SeismicSource::new(
            "src-1",
            "fault A",
            "Active Shallow Crust",
            serde_json::json!({}),
        )]);

        let out = enumerate_requests(
            &store,
            &settings(),
            &rlz,
            &sites,
            Arc::clone(&sources),
            Arc::new(GsimSet::new()),
        )
        .await
        .unwrap();

        for req in &out.requests {
            assert!(Arc::ptr_eq(&req.sources, &sources));
        }
    }

    #[test]
    fn test_combination_description() {
        let rlz = RealizationId::new(3);
        let text = describe_combination(&Site::new(10.0, 45.0), Imt::Pga, rlz);
        assert_eq!(text, "PGA @ POINT(10 45) rlz-3");
    }
}
