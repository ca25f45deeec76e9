//! Realization progress tracking
//!
//! ## Table of Contents
//! - **RealizationProgress**: Processed-site counter + completion flag
//! - **ProgressTracker**: Advances progress after a unit's writes commit

use crate::error::Result;
use crate::store::HazardStore;
use crate::types::RealizationId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// How far a realization has progressed through its sites
///
/// The counter is monotonic and saturates at the realization's total site
/// count, so at-least-once unit execution cannot over-count; the completion
/// flag flips exactly once, when the counter reaches the total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealizationProgress {
    /// The realization being tracked
    pub realization: RealizationId,
    /// Total number of sites the realization must process
    pub total_sites: u32,
    /// Sites processed so far
    pub processed_sites: u32,
    /// Whether every site has been processed
    pub complete: bool,
}

impl RealizationProgress {
    /// Fresh progress for a realization
    pub fn new(realization: RealizationId, total_sites: u32) -> Self {
        Self {
            realization,
            total_sites,
            processed_sites: 0,
            complete: total_sites == 0,
        }
    }

    /// Apply one unit's worth of processed sites.
    ///
    /// Saturates at `total_sites`; callers observe the flag flip on the
    /// call that reaches the total.
    pub(crate) fn apply(&mut self, n_sites: u32) {
        self.processed_sites = self
            .processed_sites
            .saturating_add(n_sites)
            .min(self.total_sites);
        if self.processed_sites == self.total_sites {
            self.complete = true;
        }
    }
}

/// Advances realization progress through the storage gateway
///
/// The store's `increment_progress` performs a single atomic entry update,
/// so trackers in concurrently running units never lose increments.
#[derive(Clone)]
pub struct ProgressTracker {
    store: Arc<dyn HazardStore>,
}

impl ProgressTracker {
    /// Create a tracker over the given store
    pub fn new(store: Arc<dyn HazardStore>) -> Self {
        Self { store }
    }

    /// Record that a unit finished `n_sites` sites for a realization.
    ///
    /// Must only be called after the unit's result writes have returned,
    /// so progress never runs ahead of persisted results.
    pub async fn record_progress(
        &self,
        realization: RealizationId,
        n_sites: u32,
    ) -> Result<RealizationProgress> {
        let progress = self.store.increment_progress(realization, n_sites).await?;

        if progress.complete {
            info!(
                realization = %realization,
                sites = progress.total_sites,
                "realization complete"
            );
        } else {
            debug!(
                realization = %realization,
                processed = progress.processed_sites,
                total = progress.total_sites,
                "realization progress advanced"
            );
        }

        Ok(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{CalculationId, LogicTreePath, Realization};

    fn realization(id: u64, total_sites: u32) -> Realization {
        Realization::new(
            id,
            CalculationId::new(),
            LogicTreePath::new(vec!["b1"]),
            LogicTreePath::new(vec!["b1"]),
            total_sites,
        )
    }

    #[test]
    fn test_apply_is_monotonic_and_saturating() {
        let mut progress = RealizationProgress::new(RealizationId::new(0), 10);

        progress.apply(4);
        assert_eq!(progress.processed_sites, 4);
        assert!(!progress.complete);

        progress.apply(6);
        assert_eq!(progress.processed_sites, 10);
        assert!(progress.complete);

        // a retried unit reports the same sites again; the counter holds
        progress.apply(6);
        assert_eq!(progress.processed_sites, 10);
        assert!(progress.complete);
    }

    #[test]
    fn test_zero_site_realization_is_complete() {
        let progress = RealizationProgress::new(RealizationId::new(0), 0);
        assert!(progress.complete);
    }

    #[tokio::test]
    async fn test_tracker_flips_completion_exactly_at_total() {
        let store = Arc::new(MemoryStore::new());
        let rlz = realization(1, 5);
        store.put_realization(rlz.clone()).await.unwrap();

        let tracker = ProgressTracker::new(store.clone());

        let p = tracker.record_progress(rlz.id, 3).await.unwrap();
        assert!(!p.complete);
        assert_eq!(p.processed_sites, 3);

        let p = tracker.record_progress(rlz.id, 2).await.unwrap();
        assert!(p.complete);
        assert_eq!(p.processed_sites, 5);
    }

    #[tokio::test]
    async fn test_concurrent_increments_do_not_lose_updates() {
        let store = Arc::new(MemoryStore::new());
        let rlz = realization(2, 64);
        store.put_realization(rlz.clone()).await.unwrap();

        let tracker = ProgressTracker::new(store.clone());

        let mut handles = Vec::new();
        for _ in 0..64 {
            let tracker = tracker.clone();
            let id = rlz.id;
            handles.push(tokio::spawn(
                async move { tracker.record_progress(id, 1).await },
            ));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let progress = store.get_progress(rlz.id).await.unwrap().unwrap();
        assert_eq!(progress.processed_sites, 64);
        assert!(progress.complete);
    }
}
