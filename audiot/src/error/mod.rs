//! Crate error type and conversions from kernel configuration errors.

use core::fmt;

use crate::kernel::ConfigError;

/// Errors raised whilst interpolating spectra.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Argument passed into a function was invalid.
    InvalidArgument {
        /// The invalid arg
        arg: String,
        /// Explaining why arg is invalid.
        reason: String,
    },
    /// The cost matrix holds no finite entry to sanitize non-finite costs with.
    DegenerateCostMatrix,
    /// The exact transport solver could not produce an optimal plan.
    TransportSolveFailure {
        /// Why the solver failed.
        reason: String,
    },
    /// An interpolated frequency index fell outside the output support.
    IndexOutOfRange {
        /// Computed index.
        index: usize,
        /// Length of the output support.
        len: usize,
    },
}

impl Error {
    pub(crate) fn invalid_argument(arg: &str, reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            arg: arg.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument { arg, reason } => {
                write!(f, "Invalid argument `{arg}`: {reason}")
            }
            Error::DegenerateCostMatrix => {
                write!(f, "Cost matrix has no finite entry to sanitize with.")
            }
            Error::TransportSolveFailure { reason } => {
                write!(f, "Transport solve failure: {reason}")
            }
            Error::IndexOutOfRange { index, len } => {
                write!(f, "Interpolated index {index} is out of range for support of length {len}.")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<ConfigError> for Error {
    fn from(value: ConfigError) -> Self {
        let arg = match &value {
            ConfigError::EmptyInput { arg }
            | ConfigError::InvalidArgument { arg, .. }
            | ConfigError::NonContiguous { arg }
            | ConfigError::LengthMismatch { arg, .. } => *arg,
        };
        Error::invalid_argument(arg, value.to_string())
    }
}

impl From<audiot_core::Error> for Error {
    fn from(value: audiot_core::Error) -> Self {
        match value {
            audiot_core::Error::InvalidArg { arg, reason } => Error::InvalidArgument { arg, reason },
            other => Error::TransportSolveFailure {
                reason: other.to_string(),
            },
        }
    }
}

/// Convenience alias for results of `audiot` operations.
pub type Result<T> = core::result::Result<T, Error>;
