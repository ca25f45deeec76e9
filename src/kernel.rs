//! Disaggregation kernel interface and invocation adapter
//!
//! ## Table of Contents
//! - **DisaggKernel**: Trait the external numerical kernel implements
//! - **KernelInput**: Typed parameter set adapted from a request
//! - **BinEdges / DisaggMatrix / KernelOutput**: Kernel results
//! - **invoke**: Adapter entry point with output validation

use crate::enumerate::ComputationRequest;
use crate::error::{DisaggError, Result};
use crate::types::{GsimSet, Imt, SeismicSource, Site};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Distance filter handed to the kernel, parameterized by the calculation's
/// maximum source-to-site distance in km
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceFilter {
    /// Maximum distance in km beyond which contributions are discarded
    pub max_distance: f64,
}

impl DistanceFilter {
    /// Create a filter with the given cutoff distance
    pub fn new(max_distance: f64) -> Self {
        Self { max_distance }
    }
}

/// Histogram bin edges returned by the kernel
///
/// The field order (magnitude, distance, longitude, latitude, epsilon,
/// tectonic-region types) is the contract between the kernel adapter and
/// the result schema. The assembler unpacks these fields positionally into
/// the persisted record; do not reorder them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinEdges {
    /// Magnitude bin edges
    pub magnitude: Vec<f64>,
    /// Distance bin edges (km)
    pub distance: Vec<f64>,
    /// Longitude bin edges (decimal degrees)
    pub longitude: Vec<f64>,
    /// Latitude bin edges (decimal degrees)
    pub latitude: Vec<f64>,
    /// Epsilon bin edges
    pub epsilon: Vec<f64>,
    /// Tectonic-region-type labels (one bin per label)
    pub tectonic_region_types: Vec<String>,
}

impl BinEdges {
    /// Shape of the probability tensor these edges imply: one bin between
    /// each pair of numeric edges, one bin per tectonic-region label.
    pub fn expected_shape(&self) -> Vec<usize> {
        vec![
            self.magnitude.len().saturating_sub(1),
            self.distance.len().saturating_sub(1),
            self.longitude.len().saturating_sub(1),
            self.latitude.len().saturating_sub(1),
            self.epsilon.len().saturating_sub(1),
            self.tectonic_region_types.len(),
        ]
    }
}

/// The N-dimensional disaggregation probability tensor, row-major
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisaggMatrix {
    shape: Vec<usize>,
    values: Vec<f64>,
}

impl DisaggMatrix {
    /// Build a matrix, checking that the value count matches the shape
    pub fn new(shape: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return Err(DisaggError::kernel(format!(
                "matrix has {} values but shape {:?} implies {}",
                values.len(),
                shape,
                expected
            )));
        }
        Ok(Self { shape, values })
    }

    /// Tensor dimensions
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Row-major probability values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Sum of all probability mass in the tensor
    pub fn total_probability(&self) -> f64 {
        self.values.iter().sum()
    }
}

/// Bin edges plus probability tensor: one kernel result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelOutput {
    /// Combined bin-edge output
    pub bin_edges: BinEdges,
    /// Disaggregation probability tensor
    pub matrix: DisaggMatrix,
}

impl KernelOutput {
    /// Check that the tensor shape matches the bin edges
    pub fn validate(&self) -> Result<()> {
        let expected = self.bin_edges.expected_shape();
        if self.matrix.shape() != expected.as_slice() {
            return Err(DisaggError::kernel(format!(
                "matrix shape {:?} does not match bin edges (expected {:?})",
                self.matrix.shape(),
                expected
            )));
        }
        Ok(())
    }
}

/// Full parameter set for one kernel invocation
///
/// Mirrors the kernel's call contract field for field; built from a
/// [`ComputationRequest`] by [`KernelInput::from_request`].
#[derive(Debug, Clone)]
pub struct KernelInput {
    /// Seismic sources in scope for the realization
    pub sources: Arc<Vec<SeismicSource>>,
    /// Site under disaggregation
    pub site: Site,
    /// Intensity-measure type
    pub imt: Imt,
    /// Target intensity-measure level
    pub iml: f64,
    /// Ground-motion models by tectonic-region type
    pub gsims: Arc<GsimSet>,
    /// Investigation time in years (temporal occurrence parameter)
    pub time_span: f64,
    /// Ground-motion truncation level
    pub truncation_level: f64,
    /// Number of epsilon bins
    pub n_epsilons: u32,
    /// Magnitude bin width
    pub mag_bin_width: f64,
    /// Distance bin width (km)
    pub dist_bin_width: f64,
    /// Coordinate bin width (decimal degrees)
    pub coord_bin_width: f64,
    /// Source-to-site distance filter
    pub source_site_filter: DistanceFilter,
    /// Rupture-to-site distance filter
    pub rupture_site_filter: DistanceFilter,
}

impl KernelInput {
    /// Adapt a computation request into the kernel's parameter set.
    ///
    /// Both distance filters derive from the calculation's single
    /// maximum-distance setting.
    pub fn from_request(request: &ComputationRequest) -> Self {
        let params = &request.params;
        Self {
            sources: Arc::clone(&request.sources),
            site: request.site,
            imt: request.imt,
            iml: request.iml,
            gsims: Arc::clone(&request.gsims),
            time_span: params.investigation_time,
            truncation_level: params.truncation_level,
            n_epsilons: params.num_epsilon_bins,
            mag_bin_width: params.mag_bin_width,
            dist_bin_width: params.distance_bin_width,
            coord_bin_width: params.coordinate_bin_width,
            source_site_filter: DistanceFilter::new(params.maximum_distance),
            rupture_site_filter: DistanceFilter::new(params.maximum_distance),
        }
    }
}

/// The external numerical disaggregation kernel
///
/// `Ok(None)` is the legitimate "no ruptures contribute" outcome for the
/// given IML and filters: nothing is persisted and the unit continues.
/// `Err` is a computation fault and fails the unit.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DisaggKernel: Send + Sync {
    /// Compute bin edges and the probability tensor for one input
    async fn disaggregate(&self, input: KernelInput) -> Result<Option<KernelOutput>>;

    /// Kernel name for logging
    fn name(&self) -> &str;
}

/// Invoke the kernel for one computation request.
///
/// Adapts the request, calls the kernel, and validates that a returned
/// tensor matches its bin edges before handing it to the assembler.
pub async fn invoke(
    kernel: &dyn DisaggKernel,
    request: &ComputationRequest,
) -> Result<Option<KernelOutput>> {
    let input = KernelInput::from_request(request);
    let output = kernel.disaggregate(input).await?;
    if let Some(out) = &output {
        out.validate()?;
    }
    Ok(output)
}
