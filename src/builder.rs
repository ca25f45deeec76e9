//! EngineBuilder for configuring and constructing engine instances
//!
//! ## Table of Contents
//! - **EngineBuilder**: Builder pattern for engine configuration
//! - **EngineConfig**: Complete configuration struct

use crate::error::{DisaggError, Result};
use crate::kernel::DisaggKernel;
use crate::metrics::DisaggMetrics;
use crate::retry::RetryConfig;
use crate::runtime::DisaggEngine;
use crate::store::{memory_store, BoxedHazardStore};
use std::sync::Arc;
use tracing::info;

/// Complete engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum units executing concurrently on the local substrate
    pub concurrency: usize,
    /// Retry policy for retryable unit failures
    pub retry: RetryConfig,
    /// Enable prometheus metrics
    pub metrics_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            retry: RetryConfig::default(),
            metrics_enabled: true,
        }
    }
}

/// Builder for constructing [`DisaggEngine`] instances
pub struct EngineBuilder {
    config: EngineConfig,
    store: Option<BoxedHazardStore>,
    kernel: Option<Arc<dyn DisaggKernel>>,
}

impl EngineBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            store: None,
            kernel: None,
        }
    }

    /// Set the storage gateway (defaults to an in-memory store)
    pub fn with_store(mut self, store: BoxedHazardStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the disaggregation kernel (required)
    pub fn with_kernel<K: DisaggKernel + 'static>(mut self, kernel: K) -> Self {
        self.kernel = Some(Arc::new(kernel));
        self
    }

    /// Set a shared kernel handle
    pub fn with_kernel_handle(mut self, kernel: Arc<dyn DisaggKernel>) -> Self {
        self.kernel = Some(kernel);
        self
    }

    /// Set the local substrate's unit concurrency
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency.max(1);
        self
    }

    /// Set the retry policy for retryable unit failures
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Enable or disable metrics
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.config.metrics_enabled = enabled;
        self
    }

    /// Validate the configuration and build the engine
    pub fn build(self) -> Result<DisaggEngine> {
        let kernel = self
            .kernel
            .ok_or_else(|| DisaggError::config("a disaggregation kernel is required"))?;
        let store = self.store.unwrap_or_else(memory_store);

        let metrics = if self.config.metrics_enabled {
            Some(Arc::new(DisaggMetrics::new()?))
        } else {
            None
        };

        info!(
            store = store.name(),
            kernel = kernel.name(),
            concurrency = self.config.concurrency,
            "engine built"
        );

        Ok(DisaggEngine::new(self.config, store, kernel, metrics))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
