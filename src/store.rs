//! Storage gateway for calculation data
//!
//! ## Table of Contents
//! - **HazardStore**: Trait the persistence substrate implements
//! - **CurveKey / SaveOutcome**: Gateway vocabulary
//! - **MemoryStore**: In-memory store (testing reference)
//! - **FileStore**: JSON-file persistent storage for small deployments
//!
//! The gateway is the only data access the orchestration layer performs;
//! curves and sources are read-only during this phase, results are written
//! with idempotent keys, and the progress counter is updated atomically.

use crate::assemble::DisaggResult;
use crate::curve::HazardCurve;
use crate::error::{DisaggError, Result};
use crate::progress::RealizationProgress;
use crate::types::{
    Calculation, CalculationId, GsimSet, Imt, LogicTreePath, Realization, RealizationId,
    SeismicSource, Site,
};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Identifies the unique hazard curve for a (site, IMT, realization)
/// combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveKey {
    /// Curve site
    pub site: Site,
    /// Intensity-measure type (incl. spectral period/damping)
    pub imt: Imt,
    /// Owning realization
    pub realization: RealizationId,
}

impl CurveKey {
    /// Create a curve key
    pub fn new(site: Site, imt: Imt, realization: RealizationId) -> Self {
        Self {
            site,
            imt,
            realization,
        }
    }

    /// Canonical string form, prefixed by realization so cleanup can
    /// remove a realization's curves by prefix
    pub fn canonical(&self) -> String {
        let imt_label = match self.imt {
            Imt::Sa { period, damping } => format!("SA({},{})", period, damping),
            other => other.to_string(),
        };
        format!("rlz-{}/{}/{}", self.realization, self.site.wkt(), imt_label)
    }
}

/// What `save_result` did with the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The key was new; the record was persisted
    Created,
    /// A record with this key already existed; nothing was written
    AlreadyExists,
}

/// Trait for the persistence substrate behind the calculation
///
/// `save_result` must upsert-or-skip on the result key so retried units
/// cannot duplicate records, and `increment_progress` must apply a single
/// atomic update so concurrent units cannot lose increments.
#[async_trait]
pub trait HazardStore: Send + Sync {
    /// Persist a calculation record
    async fn put_calculation(&self, calculation: Calculation) -> Result<()>;

    /// Fetch a calculation by id
    async fn get_calculation(&self, id: CalculationId) -> Result<Option<Calculation>>;

    /// Persist a realization record (upstream bootstrap)
    async fn put_realization(&self, realization: Realization) -> Result<()>;

    /// Fetch a realization by id
    async fn get_realization(&self, id: RealizationId) -> Result<Option<Realization>>;

    /// All realizations of a calculation, ordered by id
    async fn list_realizations(&self, calculation: CalculationId) -> Result<Vec<Realization>>;

    /// Persist a hazard curve (upstream curve phase)
    async fn put_curve(&self, key: CurveKey, curve: HazardCurve) -> Result<()>;

    /// Fetch the unique curve for a (site, IMT, realization) combination
    async fn get_curve(&self, key: &CurveKey) -> Result<Option<HazardCurve>>;

    /// Persist the sources for a source-model path (upstream pipeline)
    async fn put_sources(&self, sm_path: &LogicTreePath, sources: Vec<SeismicSource>)
        -> Result<()>;

    /// Sources for a source-model path, post-uncertainty-application
    async fn list_sources(&self, sm_path: &LogicTreePath) -> Result<Vec<SeismicSource>>;

    /// Persist the GMPE set for a ground-motion path (upstream pipeline)
    async fn put_gsims(&self, gsim_path: &LogicTreePath, gsims: GsimSet) -> Result<()>;

    /// GMPE set for a ground-motion path
    async fn get_gsims(&self, gsim_path: &LogicTreePath) -> Result<Option<GsimSet>>;

    /// Persist a result, skipping if its key already exists
    async fn save_result(&self, result: DisaggResult) -> Result<SaveOutcome>;

    /// All results owned by a realization, ordered by key
    async fn list_results(&self, realization: RealizationId) -> Result<Vec<DisaggResult>>;

    /// Atomically add processed sites to a realization's counter,
    /// flipping the completion flag when it reaches the total
    async fn increment_progress(
        &self,
        realization: RealizationId,
        n_sites: u32,
    ) -> Result<RealizationProgress>;

    /// Current progress for a realization, if any unit has reported yet
    async fn get_progress(&self, realization: RealizationId)
        -> Result<Option<RealizationProgress>>;

    /// Delete every record owned by a calculation (cleanup)
    async fn delete_calculation(&self, calculation: CalculationId) -> Result<()>;

    /// Store name for logging
    fn name(&self) -> &str;
}

/// Type alias for a shared store handle
pub type BoxedHazardStore = Arc<dyn HazardStore>;

/// In-memory store for testing and single-process runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    calculations: DashMap<CalculationId, Calculation>,
    realizations: DashMap<RealizationId, Realization>,
    curves: DashMap<String, HazardCurve>,
    sources: DashMap<String, Vec<SeismicSource>>,
    gsims: DashMap<String, GsimSet>,
    results: DashMap<String, DisaggResult>,
    progress: DashMap<RealizationId, RealizationProgress>,
}

impl MemoryStore {
    /// Create an empty memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HazardStore for MemoryStore {
    async fn put_calculation(&self, calculation: Calculation) -> Result<()> {
        self.calculations.insert(calculation.id, calculation);
        Ok(())
    }

    async fn get_calculation(&self, id: CalculationId) -> Result<Option<Calculation>> {
        Ok(self.calculations.get(&id).map(|e| e.value().clone()))
    }

    async fn put_realization(&self, realization: Realization) -> Result<()> {
        self.realizations.insert(realization.id, realization);
        Ok(())
    }

    async fn get_realization(&self, id: RealizationId) -> Result<Option<Realization>> {
        Ok(self.realizations.get(&id).map(|e| e.value().clone()))
    }

    async fn list_realizations(&self, calculation: CalculationId) -> Result<Vec<Realization>> {
        let mut realizations: Vec<Realization> = self
            .realizations
            .iter()
            .filter(|e| e.value().calculation == calculation)
            .map(|e| e.value().clone())
            .collect();
        realizations.sort_by_key(|r| r.id);
        Ok(realizations)
    }

    async fn put_curve(&self, key: CurveKey, curve: HazardCurve) -> Result<()> {
        self.curves.insert(key.canonical(), curve);
        Ok(())
    }

    async fn get_curve(&self, key: &CurveKey) -> Result<Option<HazardCurve>> {
        Ok(self.curves.get(&key.canonical()).map(|e| e.value().clone()))
    }

    async fn put_sources(
        &self,
        sm_path: &LogicTreePath,
        sources: Vec<SeismicSource>,
    ) -> Result<()> {
        self.sources.insert(sm_path.to_string(), sources);
        Ok(())
    }

    async fn list_sources(&self, sm_path: &LogicTreePath) -> Result<Vec<SeismicSource>> {
        Ok(self
            .sources
            .get(&sm_path.to_string())
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }

    async fn put_gsims(&self, gsim_path: &LogicTreePath, gsims: GsimSet) -> Result<()> {
        self.gsims.insert(gsim_path.to_string(), gsims);
        Ok(())
    }

    async fn get_gsims(&self, gsim_path: &LogicTreePath) -> Result<Option<GsimSet>> {
        Ok(self
            .gsims
            .get(&gsim_path.to_string())
            .map(|e| e.value().clone()))
    }

    async fn save_result(&self, result: DisaggResult) -> Result<SaveOutcome> {
        match self.results.entry(result.key().as_str().to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                debug!(key = %result.key(), "result already persisted; skipping");
                Ok(SaveOutcome::AlreadyExists)
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(result);
                Ok(SaveOutcome::Created)
            }
        }
    }

    async fn list_results(&self, realization: RealizationId) -> Result<Vec<DisaggResult>> {
        let mut results: Vec<(String, DisaggResult)> = self
            .results
            .iter()
            .filter(|e| e.value().realization == realization)
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        results.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(results.into_iter().map(|(_, r)| r).collect())
    }

    async fn increment_progress(
        &self,
        realization: RealizationId,
        n_sites: u32,
    ) -> Result<RealizationProgress> {
        let total_sites = self
            .realizations
            .get(&realization)
            .map(|e| e.value().total_sites)
            .ok_or_else(|| DisaggError::storage(format!("unknown realization {}", realization)))?;

        // the entry guard is held across the update, making it atomic
        let mut entry = self
            .progress
            .entry(realization)
            .or_insert_with(|| RealizationProgress::new(realization, total_sites));
        entry.apply(n_sites);
        Ok(entry.clone())
    }

    async fn get_progress(
        &self,
        realization: RealizationId,
    ) -> Result<Option<RealizationProgress>> {
        Ok(self.progress.get(&realization).map(|e| e.value().clone()))
    }

    async fn delete_calculation(&self, calculation: CalculationId) -> Result<()> {
        self.calculations.remove(&calculation);

        let owned: Vec<RealizationId> = self
            .realizations
            .iter()
            .filter(|e| e.value().calculation == calculation)
            .map(|e| *e.key())
            .collect();

        for id in &owned {
            self.realizations.remove(id);
            self.progress.remove(id);
            let prefix = format!("rlz-{}/", id);
            self.curves.retain(|key, _| !key.starts_with(&prefix));
        }
        self.results
            .retain(|_, result| !owned.contains(&result.realization));

        info!(calculation = %calculation, realizations = owned.len(), "calculation records deleted");
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Serialized snapshot backing [`FileStore`]
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    calculations: HashMap<String, Calculation>,
    realizations: HashMap<String, Realization>,
    curves: HashMap<String, HazardCurve>,
    sources: HashMap<String, Vec<SeismicSource>>,
    gsims: HashMap<String, GsimSet>,
    results: HashMap<String, DisaggResult>,
    progress: HashMap<String, RealizationProgress>,
}

/// JSON-file persistent storage
///
/// Simple snapshot storage for development and small deployments. All
/// operations work against the in-memory state; `flush` persists it.
pub struct FileStore {
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl FileStore {
    /// Open or create a file store
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| DisaggError::storage(format!("failed to read store: {}", e)))?;
            serde_json::from_str(&contents)?
        } else {
            StoreState::default()
        };

        info!(path = %path.display(), "file store opened");

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    /// Persist the snapshot to disk
    pub async fn flush(&self) -> Result<()> {
        let state = self.state.read().await;
        let contents = serde_json::to_string_pretty(&*state)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DisaggError::storage(format!("failed to create dir: {}", e)))?;
        }

        std::fs::write(&self.path, contents)
            .map_err(|e| DisaggError::storage(format!("failed to write store: {}", e)))?;

        debug!(path = %self.path.display(), "file store flushed");
        Ok(())
    }
}

#[async_trait]
impl HazardStore for FileStore {
    async fn put_calculation(&self, calculation: Calculation) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .calculations
            .insert(calculation.id.as_uuid().to_string(), calculation);
        Ok(())
    }

    async fn get_calculation(&self, id: CalculationId) -> Result<Option<Calculation>> {
        let state = self.state.read().await;
        Ok(state.calculations.get(&id.as_uuid().to_string()).cloned())
    }

    async fn put_realization(&self, realization: Realization) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .realizations
            .insert(realization.id.to_string(), realization);
        Ok(())
    }

    async fn get_realization(&self, id: RealizationId) -> Result<Option<Realization>> {
        let state = self.state.read().await;
        Ok(state.realizations.get(&id.to_string()).cloned())
    }

    async fn list_realizations(&self, calculation: CalculationId) -> Result<Vec<Realization>> {
        let state = self.state.read().await;
        let mut realizations: Vec<Realization> = state
            .realizations
            .values()
            .filter(|r| r.calculation == calculation)
            .cloned()
            .collect();
        realizations.sort_by_key(|r| r.id);
        Ok(realizations)
    }

    async fn put_curve(&self, key: CurveKey, curve: HazardCurve) -> Result<()> {
        let mut state = self.state.write().await;
        state.curves.insert(key.canonical(), curve);
        Ok(())
    }

    async fn get_curve(&self, key: &CurveKey) -> Result<Option<HazardCurve>> {
        let state = self.state.read().await;
        Ok(state.curves.get(&key.canonical()).cloned())
    }

    async fn put_sources(
        &self,
        sm_path: &LogicTreePath,
        sources: Vec<SeismicSource>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.sources.insert(sm_path.to_string(), sources);
        Ok(())
    }

    async fn list_sources(&self, sm_path: &LogicTreePath) -> Result<Vec<SeismicSource>> {
        let state = self.state.read().await;
        Ok(state
            .sources
            .get(&sm_path.to_string())
            .cloned()
            .unwrap_or_default())
    }

    async fn put_gsims(&self, gsim_path: &LogicTreePath, gsims: GsimSet) -> Result<()> {
        let mut state = self.state.write().await;
        state.gsims.insert(gsim_path.to_string(), gsims);
        Ok(())
    }

    async fn get_gsims(&self, gsim_path: &LogicTreePath) -> Result<Option<GsimSet>> {
        let state = self.state.read().await;
        Ok(state.gsims.get(&gsim_path.to_string()).cloned())
    }

    async fn save_result(&self, result: DisaggResult) -> Result<SaveOutcome> {
        let mut state = self.state.write().await;
        let key = result.key().as_str().to_string();
        if state.results.contains_key(&key) {
            debug!(key = %key, "result already persisted; skipping");
            return Ok(SaveOutcome::AlreadyExists);
        }
        state.results.insert(key, result);
        Ok(SaveOutcome::Created)
    }

    async fn list_results(&self, realization: RealizationId) -> Result<Vec<DisaggResult>> {
        let state = self.state.read().await;
        let mut results: Vec<(&String, &DisaggResult)> = state
            .results
            .iter()
            .filter(|(_, r)| r.realization == realization)
            .collect();
        results.sort_by(|a, b| a.0.cmp(b.0));
        Ok(results.into_iter().map(|(_, r)| r.clone()).collect())
    }

    async fn increment_progress(
        &self,
        realization: RealizationId,
        n_sites: u32,
    ) -> Result<RealizationProgress> {
        // one write lock spans lookup and update, making the increment atomic
        let mut state = self.state.write().await;

        let total_sites = state
            .realizations
            .get(&realization.to_string())
            .map(|r| r.total_sites)
            .ok_or_else(|| DisaggError::storage(format!("unknown realization {}", realization)))?;

        let progress = state
            .progress
            .entry(realization.to_string())
            .or_insert_with(|| RealizationProgress::new(realization, total_sites));
        progress.apply(n_sites);
        Ok(progress.clone())
    }

    async fn get_progress(
        &self,
        realization: RealizationId,
    ) -> Result<Option<RealizationProgress>> {
        let state = self.state.read().await;
        Ok(state.progress.get(&realization.to_string()).cloned())
    }

    async fn delete_calculation(&self, calculation: CalculationId) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .calculations
            .remove(&calculation.as_uuid().to_string());

        let owned: Vec<RealizationId> = state
            .realizations
            .values()
            .filter(|r| r.calculation == calculation)
            .map(|r| r.id)
            .collect();

        for id in &owned {
            state.realizations.remove(&id.to_string());
            state.progress.remove(&id.to_string());
            let prefix = format!("rlz-{}/", id);
            state.curves.retain(|key, _| !key.starts_with(&prefix));
        }
        state
            .results
            .retain(|_, result| !owned.contains(&result.realization));

        info!(calculation = %calculation, realizations = owned.len(), "calculation records deleted");
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Create a shared memory store
pub fn memory_store() -> BoxedHazardStore {
    Arc::new(MemoryStore::new()) as BoxedHazardStore
}
