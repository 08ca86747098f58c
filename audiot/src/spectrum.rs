//! Spectrum acquisition: edge fading and one-sided FFTs of real signals.

use crate::error::{Error, Result};
use crate::kernel::{ConfigError, KernelLifecycle, Read1D};
use crate::ot::traits::NormalizedSpectrum1D;
use crate::support::FrequencySupport;
use ndarray::Array1;
use num_traits::Float;
use rustfft::num_complex::Complex;
use rustfft::{FftNum, FftPlanner};

/// Fade a signal in and out with linear ramps of `smooth_len` samples.
///
/// The first `smooth_len` samples are scaled by `linspace(0, 1, smooth_len)`
/// and the last `smooth_len` samples by the same ramp reversed. Both ramps
/// apply when they overlap. `smooth_len == 0` leaves the signal untouched.
///
/// ```
/// use audiot::spectrum::fade_edges;
///
/// let mut signal = [1.0; 6];
/// fade_edges(&mut signal, 3).unwrap();
/// assert_eq!(signal, [0.0, 0.5, 1.0, 1.0, 0.5, 0.0]);
/// ```
pub fn fade_edges<F: Float>(signal: &mut [F], smooth_len: usize) -> Result<()> {
    if smooth_len > signal.len() {
        return Err(Error::invalid_argument(
            "smooth_len",
            format!(
                "smoothing of {smooth_len} samples exceeds the signal length {}",
                signal.len()
            ),
        ));
    }
    if smooth_len == 0 {
        return Ok(());
    }
    let steps = F::from(smooth_len.saturating_sub(1).max(1))
        .ok_or_else(|| Error::invalid_argument("smooth_len", "length is not representable"))?;
    let ramp = (0..smooth_len)
        .map(|k| F::from(k).map(|k| if smooth_len == 1 { F::zero() } else { k / steps }))
        .collect::<Option<Vec<F>>>()
        .ok_or_else(|| Error::invalid_argument("smooth_len", "length is not representable"))?;

    let len = signal.len();
    for (x, w) in signal.iter_mut().zip(ramp.iter()) {
        *x = *x * *w;
    }
    for (x, w) in signal[len - smooth_len..].iter_mut().zip(ramp.iter().rev()) {
        *x = *x * *w;
    }
    Ok(())
}

/// Sample frequencies of the one-sided FFT of `n` samples at `sample_rate` Hz.
pub fn rfftfreq<F: Float>(n: usize, sample_rate: F) -> Result<FrequencySupport<F>> {
    Ok(FrequencySupport::rfftfreq(n, sample_rate)?)
}

fn rfft<F: Float + FftNum>(signal: &[F]) -> Vec<Complex<F>> {
    let mut planner = FftPlanner::<F>::new();
    let fft = planner.plan_fft_forward(signal.len());
    let mut buffer = signal
        .iter()
        .map(|&x| Complex::new(x, F::zero()))
        .collect::<Vec<_>>();
    fft.process(&mut buffer);
    buffer.truncate(signal.len() / 2 + 1);
    buffer
}

/// Non-positive maximum frequencies keep the whole support.
fn truncate_support<F: Float>(
    support: FrequencySupport<F>,
    max_frequency: Option<F>,
) -> Result<(FrequencySupport<F>, usize)> {
    match max_frequency.filter(|f| *f > F::zero()) {
        Some(f) => support.truncate(f),
        None => {
            let len = support.len();
            Ok((support, len))
        }
    }
}

/// One-sided complex spectrum of a real signal with its frequency support.
///
/// With `max_frequency`, the spectrum and support keep the bins up to and
/// including that frequency.
///
/// # Errors
/// `InvalidArgument` for an empty signal or an invalid sample rate.
pub fn fft<F: Float + FftNum>(
    signal: &[F],
    sample_rate: F,
    max_frequency: Option<F>,
) -> Result<(Array1<Complex<F>>, FrequencySupport<F>)> {
    if signal.is_empty() {
        return Err(ConfigError::EmptyInput { arg: "signal" }.into());
    }
    let support = FrequencySupport::rfftfreq(signal.len(), sample_rate)?;
    let (support, cut) = truncate_support(support, max_frequency)?;
    let mut spectrum = rfft(signal);
    spectrum.truncate(cut);
    Ok((Array1::from(spectrum), support))
}

/// Normalized magnitude spectrum (`|rfft| / sum |rfft|`) with its support.
///
/// # Errors
/// `InvalidArgument` for an empty signal, an invalid sample rate, or a
/// spectrum with no energy left after truncation.
///
/// # Examples
/// ```
/// use audiot::spectrum::fft_normalized;
///
/// let signal: Vec<f64> = (0..64)
///     .map(|n| (2.0 * std::f64::consts::PI * 8.0 * n as f64 / 64.0).cos())
///     .collect();
/// let (spectrum, support) = fft_normalized(&signal, 64.0, None).unwrap();
/// assert_eq!(spectrum.len(), 33);
/// assert!((spectrum[8] - 1.0).abs() < 1e-9);
/// assert_eq!(support.as_slice()[8], 8.0);
/// ```
pub fn fft_normalized<F: Float + FftNum>(
    signal: &[F],
    sample_rate: F,
    max_frequency: Option<F>,
) -> Result<(Array1<F>, FrequencySupport<F>)> {
    let (spectrum, support) = fft(signal, sample_rate, max_frequency)?;
    let magnitude = spectrum.mapv(|c| c.norm());
    let energy = magnitude.sum();
    if !(energy > F::zero()) || !energy.is_finite() {
        return Err(Error::invalid_argument(
            "signal",
            "spectrum has no energy to normalize",
        ));
    }
    Ok((magnitude.mapv_into(|m| m / energy), support))
}

/// Constructor config for [`SpectrumKernel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumConfig<F> {
    /// Sample rate in Hz.
    pub sample_rate: F,
    /// Keep bins up to and including this frequency.
    pub max_frequency: Option<F>,
    /// Edge fade length in samples, applied before the transform.
    pub smooth_len: usize,
}

/// Validated normalized spectrum kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumKernel<F> {
    sample_rate: F,
    max_frequency: Option<F>,
    smooth_len: usize,
}

impl<F: Float> KernelLifecycle for SpectrumKernel<F> {
    type Config = SpectrumConfig<F>;

    fn try_new(config: Self::Config) -> core::result::Result<Self, ConfigError> {
        if !(config.sample_rate > F::zero()) || !config.sample_rate.is_finite() {
            return Err(ConfigError::InvalidArgument {
                arg: "sample_rate",
                reason: "sample rate must be positive and finite",
            });
        }
        if config.max_frequency.is_some_and(|f| f.is_nan()) {
            return Err(ConfigError::InvalidArgument {
                arg: "max_frequency",
                reason: "maximum frequency must not be NaN",
            });
        }
        Ok(Self {
            sample_rate: config.sample_rate,
            max_frequency: config.max_frequency,
            smooth_len: config.smooth_len,
        })
    }
}

impl<F: Float + FftNum> NormalizedSpectrum1D<F> for SpectrumKernel<F> {
    fn run_alloc<I>(&self, signal: &I) -> Result<(Array1<F>, FrequencySupport<F>)>
    where
        I: Read1D<F> + ?Sized,
    {
        let mut signal = signal.read_slice()?.to_vec();
        fade_edges(&mut signal, self.smooth_len)?;
        fft_normalized(&signal, self.sample_rate, self.max_frequency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use dasp_signal::{rate, Signal};

    fn tone(sample_hz: f64, hz: f64, samples: usize) -> Vec<f64> {
        let mut signal = rate(sample_hz).const_hz(hz).sine();
        (0..samples).map(|_| signal.next()).collect()
    }

    fn argmax(values: &Array1<f64>) -> usize {
        values
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (k, &v)| if v > best.1 { (k, v) } else { best })
            .0
    }

    #[test]
    fn fades_both_edges_linearly() {
        let mut signal = [2.0f64; 8];
        fade_edges(&mut signal, 5).expect("fade");
        let expected = [0.0, 0.5, 1.0, 1.5, 1.5, 1.0, 0.5, 0.0];
        for (got, want) in signal.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-12);
        }
    }

    #[test]
    fn fade_length_is_validated() {
        let mut signal = [1.0f32; 4];
        fade_edges(&mut signal, 0).expect("no-op");
        assert_eq!(signal, [1.0; 4]);
        assert!(matches!(
            fade_edges(&mut signal, 5),
            Err(Error::InvalidArgument { .. })
        ));
        fade_edges(&mut signal, 1).expect("single sample ramp");
        assert_eq!(signal, [0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn sine_peak_lands_on_its_frequency() {
        let signal = tone(1000.0, 50.0, 1000);
        let (spectrum, support) = fft_normalized(&signal, 1000.0, None).expect("spectrum");
        assert_eq!(spectrum.len(), 501);
        assert_eq!(support.len(), 501);
        let peak = argmax(&spectrum);
        assert_eq!(peak, 50);
        assert_relative_eq!(support.as_slice()[peak], 50.0);
        assert_relative_eq!(spectrum.sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn max_frequency_truncates_inclusively() {
        let signal = tone(1000.0, 50.0, 1000);
        let (spectrum, support) = fft_normalized(&signal, 1000.0, Some(100.0)).expect("spectrum");
        assert_eq!(spectrum.len(), 101);
        assert_eq!(support.as_slice().last(), Some(&100.0));
        assert_relative_eq!(spectrum.sum(), 1.0, epsilon = 1e-12);

        let (full, _) = fft_normalized(&signal, 1000.0, Some(0.0)).expect("no truncation");
        assert_eq!(full.len(), 501);
    }

    #[test]
    fn complex_spectrum_of_a_constant_is_dc() {
        let (spectrum, support) = fft(&[1.0f64; 8], 8.0, None).expect("fft");
        assert_eq!(spectrum.len(), 5);
        assert_eq!(support.as_slice(), &[0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_abs_diff_eq!(spectrum[0].re, 8.0, epsilon = 1e-12);
        for c in spectrum.iter().skip(1) {
            assert_abs_diff_eq!(c.norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn silent_and_empty_signals_are_rejected() {
        assert!(matches!(
            fft_normalized(&[0.0f64; 16], 16.0, None),
            Err(Error::InvalidArgument { .. })
        ));
        let empty: [f32; 0] = [];
        assert!(matches!(
            fft_normalized(&empty, 16.0, None),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn kernel_fades_then_normalizes() {
        let kernel = SpectrumKernel::try_new(SpectrumConfig {
            sample_rate: 1000.0,
            max_frequency: Some(200.0),
            smooth_len: 100,
        })
        .expect("kernel");
        let (spectrum, support) = kernel.run_alloc(&tone(1000.0, 120.0, 1000)).expect("spectrum");
        assert_eq!(support.len(), 201);
        assert_eq!(argmax(&spectrum), 120);
        assert_relative_eq!(spectrum.sum(), 1.0, epsilon = 1e-12);

        assert!(SpectrumKernel::try_new(SpectrumConfig {
            sample_rate: 0.0f64,
            max_frequency: None,
            smooth_len: 0,
        })
        .is_err());
    }
}
