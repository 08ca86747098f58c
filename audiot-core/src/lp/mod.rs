//! Exact linear-programming solvers for discrete optimal transport.
//!
//! Functions in this module follow the `ot.lp` module of the
//! [Python Optimal Transport](https://pythonot.github.io/) library.

mod emd;

pub use emd::*;
