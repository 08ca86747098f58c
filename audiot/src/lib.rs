//! Optimal-transport interpolation between audio magnitude spectra.
//!
//! Instead of cross-fading two spectra, `audiot` solves the exact optimal
//! transport problem between them and slides every unit of mass along its
//! transport path. At `alpha = 0` the result is the source spectrum, at
//! `alpha = 1` the target spectrum, and in between partials glide in
//! frequency rather than fading in and out.
//!
//! ```
//! use audiot::ot::{cost_matrix, interpolate_spectra, Distance, InterpolationMethod};
//! use audiot::spectrum::fft_normalized;
//!
//! let tone = |hz: f64| -> Vec<f64> {
//!     (0..256)
//!         .map(|n| (2.0 * std::f64::consts::PI * hz * n as f64 / 256.0).sin())
//!         .collect()
//! };
//! let (source, support) = fft_normalized(&tone(16.0), 256.0, Some(64.0)).unwrap();
//! let (target, _) = fft_normalized(&tone(48.0), 256.0, Some(64.0)).unwrap();
//!
//! let m = cost_matrix(support.as_slice(), None, Distance::Squared).unwrap();
//! let morph = interpolate_spectra(
//!     support.as_slice(),
//!     source.as_slice().unwrap(),
//!     target.as_slice().unwrap(),
//!     m.view(),
//!     0.5,
//!     InterpolationMethod::Round,
//! )
//! .unwrap();
//! assert!((morph.spectrum.sum() - 1.0).abs() < 1e-6);
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod kernel;
pub mod ot;
pub mod plot;
pub mod spectrum;
pub mod support;

pub use audiot_core::lp;
pub use error::{Error, Result};
