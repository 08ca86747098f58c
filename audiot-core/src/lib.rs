//! Numerical primitives behind `audiot`.
//!
//! The [`lp`] module mirrors the exact linear-programming solvers of the Python
//! Optimal Transport library (`ot.lp`), so results can be compared one to one
//! with the reference implementation.

#![deny(missing_docs)]

mod error;
pub mod lp;

pub use error::{Error, Result};
