//! Ground distances between frequencies.

use core::str::FromStr;

use crate::kernel::ConfigError;
use ndarray::{Array2, ArrayView1, Axis};
use num_traits::Float;

/// Absolute difference `|f1 - f2|` between two frequencies.
///
/// ```
/// use audiot::ot::distance::euclidean;
/// assert_eq!(euclidean(440.0, 220.0), 220.0);
/// ```
pub fn euclidean<F: Float>(f1: F, f2: F) -> F {
    (f1 - f2).abs()
}

/// Squared difference `(f1 - f2)^2` between two frequencies.
///
/// ```
/// use audiot::ot::distance::squared;
/// assert_eq!(squared(10.0, 40.0), 900.0);
/// ```
pub fn squared<F: Float>(f1: F, f2: F) -> F {
    let d = f1 - f2;
    d * d
}

/// Scalar metric between two frequency values used to price a transport move.
///
/// Implemented by [`Distance`] and by any `Fn(F, F) -> F`, so callers can plug
/// their own ground cost into the cost matrix builder.
pub trait FrequencyMetric<F: Float> {
    /// Cost of moving one unit of mass from `f1` to `f2`.
    fn distance(&self, f1: F, f2: F) -> F;

    /// Pairwise costs between every source and every target frequency.
    fn pairwise(&self, source: ArrayView1<'_, F>, target: ArrayView1<'_, F>) -> Array2<F> {
        Array2::from_shape_fn((source.len(), target.len()), |(i, j)| {
            self.distance(source[i], target[j])
        })
    }
}

impl<F, T> FrequencyMetric<F> for T
where
    F: Float,
    T: Fn(F, F) -> F,
{
    fn distance(&self, f1: F, f2: F) -> F {
        self(f1, f2)
    }
}

/// Built-in ground distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Distance {
    /// `|f1 - f2|`
    Euclidean,
    /// `(f1 - f2)^2`
    #[default]
    Squared,
}

impl<F: Float> FrequencyMetric<F> for Distance {
    fn distance(&self, f1: F, f2: F) -> F {
        match self {
            Distance::Euclidean => euclidean(f1, f2),
            Distance::Squared => squared(f1, f2),
        }
    }

    fn pairwise(&self, source: ArrayView1<'_, F>, target: ArrayView1<'_, F>) -> Array2<F> {
        let diff = &source.insert_axis(Axis(1)) - &target.insert_axis(Axis(0));
        match self {
            Distance::Euclidean => diff.mapv_into(F::abs),
            Distance::Squared => diff.mapv_into(|d| d * d),
        }
    }
}

impl FromStr for Distance {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "euclidean" => Ok(Distance::Euclidean),
            "squared" | "l2" => Ok(Distance::Squared),
            _ => Err(ConfigError::InvalidArgument {
                arg: "distance",
                reason: "expected one of `euclidean`, `squared`, `l2`",
            }),
        }
    }
}
