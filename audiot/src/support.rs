//! Frequency supports and the frequency index locator.

use crate::error::{Error, Result};
use crate::kernel::{ConfigError, Read1D};
use itertools::Itertools;
use ndarray::{Array1, ArrayView1};
use num_traits::Float;

/// Return the support index associated with `f`, rounding towards the bottom.
///
/// The result is the index of the first support value strictly greater than
/// `f`, or `support.len()` when no value exceeds it, so `support[..index]`
/// keeps every bin up to and including `f`. A negative `f` yields `None`,
/// meaning "before the start of the support": callers treat it as "do not
/// truncate".
///
/// The support must be sorted in ascending order.
///
/// # Errors
/// `InvalidArgument` when the support is empty or `f` is NaN.
///
/// # Examples
/// ```
/// use audiot::support::frequency_to_index;
///
/// let support = [0.0, 10.0, 20.0, 30.0];
/// assert_eq!(frequency_to_index(&support, 15.0).unwrap(), Some(2));
/// assert_eq!(frequency_to_index(&support, 20.0).unwrap(), Some(3));
/// assert_eq!(frequency_to_index(&support, 45.0).unwrap(), Some(4));
/// assert_eq!(frequency_to_index(&support, -1.0).unwrap(), None);
/// ```
pub fn frequency_to_index<F: Float>(support: &[F], f: F) -> Result<Option<usize>> {
    if support.is_empty() {
        return Err(Error::invalid_argument(
            "support",
            "frequency support must be non-empty",
        ));
    }
    if f.is_nan() {
        return Err(Error::invalid_argument("f", "frequency must not be NaN"));
    }
    if f < F::zero() {
        return Ok(None);
    }
    Ok(Some(support.partition_point(|&bin| bin <= f)))
}

/// Ordered set of frequency bin centers (Hz) a spectrum is defined over.
///
/// Non-empty, finite and strictly increasing by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencySupport<F> {
    bins: Array1<F>,
}

impl<F: Float> FrequencySupport<F> {
    /// Validate and wrap ascending frequency bins.
    pub fn try_new(bins: impl Into<Array1<F>>) -> core::result::Result<Self, ConfigError> {
        let bins = bins.into();
        if bins.is_empty() {
            return Err(ConfigError::EmptyInput { arg: "support" });
        }
        if bins.iter().any(|f| !f.is_finite()) {
            return Err(ConfigError::InvalidArgument {
                arg: "support",
                reason: "frequencies must be finite",
            });
        }
        if !bins.iter().tuple_windows().all(|(lo, hi)| lo < hi) {
            return Err(ConfigError::InvalidArgument {
                arg: "support",
                reason: "frequencies must be strictly increasing",
            });
        }
        Ok(Self { bins })
    }

    /// Sample frequencies of a one-sided real FFT of length `n` at `sample_rate` Hz.
    ///
    /// Parity with `numpy.fft.rfftfreq(n, d=1/sample_rate)`.
    pub fn rfftfreq(n: usize, sample_rate: F) -> core::result::Result<Self, ConfigError> {
        if n == 0 {
            return Err(ConfigError::EmptyInput { arg: "n" });
        }
        if !(sample_rate > F::zero()) || !sample_rate.is_finite() {
            return Err(ConfigError::InvalidArgument {
                arg: "sample_rate",
                reason: "sample rate must be positive and finite",
            });
        }
        let len = F::from(n).ok_or(ConfigError::InvalidArgument {
            arg: "n",
            reason: "length is not representable",
        })?;
        let bins = (0..=n / 2)
            .map(|k| F::from(k).map(|k| k * sample_rate / len))
            .collect::<Option<Array1<F>>>()
            .ok_or(ConfigError::InvalidArgument {
                arg: "n",
                reason: "bin index is not representable",
            })?;
        Self::try_new(bins)
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// Always false for a validated support.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Bins as a contiguous slice.
    pub fn as_slice(&self) -> &[F] {
        // An owned 1D array built from a Vec or iterator is always contiguous.
        self.bins.as_slice().unwrap_or(&[])
    }

    /// Bins as an `ndarray` view.
    pub fn view(&self) -> ArrayView1<'_, F> {
        self.bins.view()
    }

    /// First bin strictly above `f`; see [`frequency_to_index`].
    pub fn index_of(&self, f: F) -> Result<Option<usize>> {
        frequency_to_index(self.as_slice(), f)
    }

    /// Keep the bins up to and including `max_frequency`.
    ///
    /// Returns the truncated support and the cut index (`len` when nothing is
    /// removed). A negative `max_frequency` disables truncation.
    pub fn truncate(&self, max_frequency: F) -> Result<(Self, usize)> {
        let index = self.index_of(max_frequency)?.unwrap_or(self.len());
        if index == 0 {
            return Err(Error::invalid_argument(
                "max_frequency",
                "maximum frequency lies below the first support bin",
            ));
        }
        let bins = self.bins.iter().take(index).copied().collect::<Array1<F>>();
        Ok((Self { bins }, index))
    }

    /// Unwrap the bins.
    pub fn into_inner(self) -> Array1<F> {
        self.bins
    }
}

impl<F: Float> Read1D<F> for FrequencySupport<F> {
    fn read_slice(&self) -> core::result::Result<&[F], ConfigError> {
        self.bins
            .as_slice()
            .ok_or(ConfigError::NonContiguous { arg: "support" })
    }
}

/// Truncate a spectrum and its support to `max_frequency` (inclusive).
///
/// `None` or a negative frequency keeps everything.
pub fn truncate_spectrum<F: Float, T: Clone>(
    support: &FrequencySupport<F>,
    spectrum: &[T],
    max_frequency: Option<F>,
) -> Result<(FrequencySupport<F>, Vec<T>)> {
    if spectrum.len() != support.len() {
        return Err(ConfigError::LengthMismatch {
            arg: "spectrum",
            expected: support.len(),
            got: spectrum.len(),
        }
        .into());
    }
    match max_frequency {
        Some(f) => {
            let (support, index) = support.truncate(f)?;
            Ok((support, spectrum[..index].to_vec()))
        }
        None => Ok((support.clone(), spectrum.to_vec())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::Rng;

    const SUPPORT: [f64; 4] = [0.0, 10.0, 20.0, 30.0];

    #[test]
    fn locates_first_bin_above_frequency() {
        assert_eq!(frequency_to_index(&SUPPORT, 0.0).unwrap(), Some(1));
        assert_eq!(frequency_to_index(&SUPPORT, 9.99).unwrap(), Some(1));
        assert_eq!(frequency_to_index(&SUPPORT, 10.0).unwrap(), Some(2));
        assert_eq!(frequency_to_index(&SUPPORT, 30.0).unwrap(), Some(4));
        assert_eq!(frequency_to_index(&SUPPORT, 1e9).unwrap(), Some(4));
    }

    #[test]
    fn negative_frequency_is_before_start() {
        assert_eq!(frequency_to_index(&SUPPORT, -1.0).unwrap(), None);
        assert_eq!(frequency_to_index(&[5.0f32], -1.0).unwrap(), None);
    }

    #[test]
    fn empty_support_and_nan_are_rejected() {
        let empty: [f64; 0] = [];
        assert!(matches!(
            frequency_to_index(&empty, 1.0),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            frequency_to_index(&SUPPORT, f64::NAN),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn locator_is_monotone() {
        let mut rng = rand::rng();
        let support = FrequencySupport::rfftfreq(1024, 44_100.0).expect("valid support");
        let mut queries: Vec<f64> = (0..500).map(|_| rng.random_range(-50.0..23_000.0)).collect();
        queries.sort_by(f64::total_cmp);

        let mut previous: Option<usize> = None;
        for f in queries {
            let index = support.index_of(f).expect("valid query");
            assert!(index >= previous, "index_of({f}) went backwards");
            previous = index;
        }
    }

    #[test]
    fn rfftfreq_matches_numpy() {
        let support = FrequencySupport::rfftfreq(8, 8000.0).expect("valid support");
        let expected = [0.0, 1000.0, 2000.0, 3000.0, 4000.0];
        assert_eq!(support.len(), expected.len());
        for (got, want) in support.as_slice().iter().zip(expected.iter()) {
            assert_relative_eq!(*got, *want);
        }

        let odd = FrequencySupport::rfftfreq(5, 10.0f32).expect("valid support");
        assert_eq!(odd.len(), 3);
        assert_relative_eq!(odd.as_slice()[2], 4.0);
    }

    #[test]
    fn support_must_be_strictly_increasing() {
        assert_eq!(
            FrequencySupport::<f64>::try_new(Vec::new()),
            Err(ConfigError::EmptyInput { arg: "support" })
        );
        assert!(FrequencySupport::try_new(vec![0.0, 10.0, 10.0]).is_err());
        assert!(FrequencySupport::try_new(vec![0.0, f64::INFINITY]).is_err());
        assert!(FrequencySupport::rfftfreq(16, 0.0f64).is_err());
    }

    #[test]
    fn truncation_is_inclusive_and_optional() {
        let support = FrequencySupport::try_new(SUPPORT.to_vec()).expect("valid support");
        let spectrum = [0.1, 0.2, 0.3, 0.4];

        let (cut, values) = truncate_spectrum(&support, &spectrum, Some(20.0)).expect("truncate");
        assert_eq!(cut.as_slice(), &[0.0, 10.0, 20.0]);
        assert_eq!(values, vec![0.1, 0.2, 0.3]);

        let (all, values) = truncate_spectrum(&support, &spectrum, Some(-1.0)).expect("no-op");
        assert_eq!(all.len(), 4);
        assert_eq!(values.len(), 4);

        let (all, _) = truncate_spectrum(&support, &spectrum, None).expect("no-op");
        assert_eq!(all, support);
    }

    #[test]
    fn truncation_below_first_bin_fails() {
        let support = FrequencySupport::try_new(vec![5.0, 10.0]).expect("valid support");
        assert!(matches!(
            support.truncate(1.0),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            truncate_spectrum(&support, &[1.0], None),
            Err(Error::InvalidArgument { .. })
        ));
    }
}
