//! Trait interfaces for the interpolation pipeline.
//!
//! Each stage of the pipeline is exposed as a capability implemented by a
//! validated kernel (see [`crate::kernel::KernelLifecycle`]).

use crate::error::Result;
use crate::kernel::{Read1D, Write1D};
use crate::support::FrequencySupport;
use audiot_core::lp::EmdSolution;
use ndarray::{Array1, Array2, ArrayView2};

/// Pairwise cost matrix construction capability.
pub trait CostMatrixBuild<F> {
    /// Build costs into a caller-provided `(source_len, target_len)` matrix.
    fn run_into<I1, I2>(
        &self,
        source_support: &I1,
        target_support: &I2,
        out: &mut Array2<F>,
    ) -> Result<()>
    where
        I1: Read1D<F> + ?Sized,
        I2: Read1D<F> + ?Sized;

    /// Build costs and allocate the matrix.
    fn run_alloc<I1, I2>(&self, source_support: &I1, target_support: &I2) -> Result<Array2<F>>
    where
        I1: Read1D<F> + ?Sized,
        I2: Read1D<F> + ?Sized;
}

/// Frequency index interpolation capability.
pub trait FrequencyInterpolate<F> {
    /// Output index for mass moved from `source_index` to `target_index`.
    fn run(&self, source_index: usize, target_index: usize, support: Option<&[F]>)
        -> Result<usize>;
}

/// Interpolated spectrum together with the optimal plan that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct OtInterpolation<F> {
    /// Interpolated spectrum over the output support.
    pub spectrum: Array1<F>,
    /// Dense transport plan with shape `(source_len, target_len)`.
    pub plan: Array2<F>,
    /// Optimal transport cost `sum(plan * cost_matrix)`.
    pub cost: F,
}

/// Optimal-transport spectrum interpolation capability.
pub trait SpectralInterpolate<F> {
    /// Interpolate into a caller-provided spectrum buffer and return the solved plan.
    ///
    /// `out` is left unchanged when an error is returned.
    fn run_into<S, I1, I2, O>(
        &self,
        support: &S,
        source: &I1,
        target: &I2,
        cost_matrix: ArrayView2<'_, F>,
        out: &mut O,
    ) -> Result<EmdSolution<F>>
    where
        S: Read1D<F> + ?Sized,
        I1: Read1D<F> + ?Sized,
        I2: Read1D<F> + ?Sized,
        O: Write1D<F> + ?Sized;

    /// Interpolate and allocate the output spectrum.
    fn run_alloc<S, I1, I2>(
        &self,
        support: &S,
        source: &I1,
        target: &I2,
        cost_matrix: ArrayView2<'_, F>,
    ) -> Result<OtInterpolation<F>>
    where
        S: Read1D<F> + ?Sized,
        I1: Read1D<F> + ?Sized,
        I2: Read1D<F> + ?Sized;
}

/// Normalized magnitude spectrum acquisition capability.
pub trait NormalizedSpectrum1D<F> {
    /// Compute the normalized magnitude spectrum of `signal` and its support.
    fn run_alloc<I>(&self, signal: &I) -> Result<(Array1<F>, FrequencySupport<F>)>
    where
        I: Read1D<F> + ?Sized;
}
