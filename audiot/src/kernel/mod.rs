//! Shared trait-first kernel substrate.
//!
//! Every operation of the crate is available as a free function and as a
//! kernel: a validated configuration built through [`KernelLifecycle`] plus a
//! capability trait from [`crate::ot::traits`]. Inputs are read through the
//! [`Read1D`] / [`Write1D`] adapters so slices, vectors and `ndarray` arrays can
//! be passed interchangeably.

mod errors;
mod io;
mod lifecycle;

pub use errors::*;
pub use io::*;
pub use lifecycle::*;
