use core::fmt;

/// Errors raised by the transport primitives.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Argument passed into a solver was invalid.
    InvalidArg {
        /// The invalid arg
        arg: String,
        /// Explaining why arg is invalid.
        reason: String,
    },
    /// The two marginals do not carry the same positive total mass.
    Infeasible {
        /// Total mass of the source marginal.
        source_mass: f64,
        /// Total mass of the target marginal.
        target_mass: f64,
    },
    /// The simplex did not reach optimality within the pivot budget.
    IterationLimit {
        /// Number of pivots that were allowed.
        max_iter: usize,
    },
}

impl Error {
    pub(crate) fn invalid_arg(arg: &str, reason: impl Into<String>) -> Self {
        Error::InvalidArg {
            arg: arg.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArg { arg, reason } => {
                write!(f, "Invalid argument `{arg}`: {reason}")
            }
            Error::Infeasible {
                source_mass,
                target_mass,
            } => write!(
                f,
                "Infeasible transport problem: source mass {source_mass} does not match target mass {target_mass}"
            ),
            Error::IterationLimit { max_iter } => {
                write!(f, "Network simplex did not converge within {max_iter} pivots")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Convenience alias for results of `audiot-core` operations.
pub type Result<T> = core::result::Result<T, Error>;
