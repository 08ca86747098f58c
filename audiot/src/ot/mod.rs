//! Optimal-transport interpolation of spectra.
//!
//! The pipeline runs leaves first: a [`distance`] prices every pair of
//! frequencies, [`cost`] turns supports into a cost matrix, [`engine`] solves
//! the exact transport problem and moves the plan's mass to the bins chosen by
//! [`interpolate`].
//!
//! # Examples
//! ```
//! use audiot::kernel::KernelLifecycle;
//! use audiot::ot::{
//!     cost_matrix, Distance, InterpolationMethod, OtInterpolationConfig,
//!     OtInterpolationKernel, SpectralInterpolate,
//! };
//!
//! let support = [0.0, 10.0, 20.0, 30.0];
//! let m = cost_matrix(&support, None, Distance::Squared).unwrap();
//! let kernel = OtInterpolationKernel::try_new(OtInterpolationConfig {
//!     method: InterpolationMethod::Round,
//!     ..OtInterpolationConfig::new(0.5)
//! })
//! .unwrap();
//!
//! let morph = kernel
//!     .run_alloc(&support, &[1.0, 0.0, 0.0, 0.0], &[0.0, 0.0, 0.0, 1.0], m.view())
//!     .unwrap();
//! assert_eq!(morph.spectrum.to_vec(), vec![0.0, 0.0, 1.0, 0.0]);
//! ```

pub mod cost;
pub mod distance;
pub mod engine;
pub mod interpolate;
pub mod traits;

pub use cost::{cost_matrix, CostMatrixConfig, CostMatrixKernel};
pub use distance::{euclidean, squared, Distance, FrequencyMetric};
pub use engine::{
    interpolate_spectra, sanitize_cost_matrix, transport_entries, OtInterpolationConfig,
    OtInterpolationKernel,
};
pub use interpolate::{
    interpolate_frequency, FrequencyInterpolator, FrequencyInterpolatorConfig,
    InterpolationMethod,
};
pub use traits::*;
