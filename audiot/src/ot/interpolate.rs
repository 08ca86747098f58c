//! Where transported mass lands on the output support.

use core::str::FromStr;

use crate::error::{Error, Result};
use crate::kernel::{ConfigError, KernelLifecycle};
use crate::ot::traits::FrequencyInterpolate;
use num_traits::Float;

/// Policy mapping a `(source_index, target_index)` pair to an output index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationMethod {
    /// `floor((1 - alpha) * i + alpha * j)`
    #[default]
    Int,
    /// `round((1 - alpha) * i + alpha * j)`, halves to even.
    Round,
    /// Support bin nearest to `(1 - alpha) * support[i] + alpha * support[j]`.
    Closest,
}

impl FromStr for InterpolationMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s {
            "int" => Ok(InterpolationMethod::Int),
            "round" => Ok(InterpolationMethod::Round),
            "closest" => Ok(InterpolationMethod::Closest),
            _ => Err(ConfigError::InvalidArgument {
                arg: "method",
                reason: "expected one of `int`, `round`, `closest`",
            }),
        }
    }
}

/// Constructor config for [`FrequencyInterpolator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyInterpolatorConfig<F> {
    /// Interpolation parameter, `0` is the source and `1` the target.
    pub alpha: F,
    /// Index mapping policy.
    pub method: InterpolationMethod,
}

/// Validated frequency index interpolator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyInterpolator<F> {
    alpha: F,
    method: InterpolationMethod,
}

impl<F: Float> FrequencyInterpolator<F> {
    /// Configured interpolation parameter.
    pub fn alpha(&self) -> F {
        self.alpha
    }

    /// Configured mapping policy.
    pub fn method(&self) -> InterpolationMethod {
        self.method
    }
}

pub(crate) fn check_alpha<F: Float>(alpha: F) -> core::result::Result<F, ConfigError> {
    if alpha.is_finite() && alpha >= F::zero() && alpha <= F::one() {
        Ok(alpha)
    } else {
        Err(ConfigError::InvalidArgument {
            arg: "alpha",
            reason: "alpha must lie in [0, 1]",
        })
    }
}

impl<F: Float> KernelLifecycle for FrequencyInterpolator<F> {
    type Config = FrequencyInterpolatorConfig<F>;

    fn try_new(config: Self::Config) -> core::result::Result<Self, ConfigError> {
        Ok(Self {
            alpha: check_alpha(config.alpha)?,
            method: config.method,
        })
    }
}

fn index_to_float<F: Float>(index: usize) -> Result<F> {
    F::from(index).ok_or_else(|| Error::invalid_argument("index", "index is not representable"))
}

fn float_to_index<F: Float>(position: F) -> Result<usize> {
    position
        .to_usize()
        .ok_or_else(|| Error::invalid_argument("index", "interpolated position is not a valid index"))
}

/// Round to the nearest integer, halves going to the even neighbour.
fn round_half_even<F: Float>(x: F) -> F {
    let floor = x.floor();
    let two = F::one() + F::one();
    match (x - floor).partial_cmp(&(F::one() / two)) {
        Some(core::cmp::Ordering::Less) => floor,
        Some(core::cmp::Ordering::Greater) => floor + F::one(),
        _ if floor % two == F::zero() => floor,
        _ => floor + F::one(),
    }
}

/// Index of the bin nearest to `f`; ties resolve to the lower index.
fn closest_bin<F: Float>(support: &[F], f: F) -> usize {
    let upper = support.partition_point(|&bin| bin < f);
    if upper == 0 {
        return 0;
    }
    if upper == support.len() {
        return upper - 1;
    }
    if f - support[upper - 1] <= support[upper] - f {
        upper - 1
    } else {
        upper
    }
}

impl<F: Float> FrequencyInterpolate<F> for FrequencyInterpolator<F> {
    fn run(&self, source_index: usize, target_index: usize, support: Option<&[F]>) -> Result<usize> {
        let alpha = self.alpha;
        let beta = F::one() - alpha;
        match self.method {
            InterpolationMethod::Int | InterpolationMethod::Round => {
                let position =
                    beta * index_to_float(source_index)? + alpha * index_to_float(target_index)?;
                let position = match self.method {
                    InterpolationMethod::Int => position.floor(),
                    _ => round_half_even(position),
                };
                float_to_index(position)
            }
            InterpolationMethod::Closest => {
                let support = support.ok_or_else(|| {
                    Error::invalid_argument("support", "the `closest` method requires a support")
                })?;
                for index in [source_index, target_index] {
                    if index >= support.len() {
                        return Err(Error::IndexOutOfRange {
                            index,
                            len: support.len(),
                        });
                    }
                }
                let f = beta * support[source_index] + alpha * support[target_index];
                Ok(closest_bin(support, f))
            }
        }
    }
}

/// Output index receiving mass moved from `source_index` to `target_index`.
///
/// `support` is only consulted by [`InterpolationMethod::Closest`].
///
/// # Errors
/// `InvalidArgument` for `alpha` outside `[0, 1]` or a missing support with
/// `Closest`, `IndexOutOfRange` when `Closest` is given indices past the
/// support.
///
/// # Examples
/// ```
/// use audiot::ot::interpolate::{interpolate_frequency, InterpolationMethod};
///
/// let support = [0.0, 10.0, 20.0, 30.0];
/// let int = interpolate_frequency(0, 3, 0.5, InterpolationMethod::Int, None).unwrap();
/// let round = interpolate_frequency(0, 3, 0.5, InterpolationMethod::Round, None).unwrap();
/// let closest =
///     interpolate_frequency(0, 3, 0.6, InterpolationMethod::Closest, Some(&support[..])).unwrap();
/// assert_eq!((int, round, closest), (1, 2, 2));
/// ```
pub fn interpolate_frequency<F: Float>(
    source_index: usize,
    target_index: usize,
    alpha: F,
    method: InterpolationMethod,
    support: Option<&[F]>,
) -> Result<usize> {
    FrequencyInterpolator::try_new(FrequencyInterpolatorConfig { alpha, method })?.run(
        source_index,
        target_index,
        support,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUPPORT: [f64; 4] = [0.0, 10.0, 20.0, 30.0];

    fn interp(i: usize, j: usize, alpha: f64, method: InterpolationMethod) -> Result<usize> {
        interpolate_frequency(i, j, alpha, method, Some(&SUPPORT[..]))
    }

    #[test]
    fn int_floors_and_round_halves_to_even() {
        assert_eq!(interp(0, 3, 0.5, InterpolationMethod::Int), Ok(1));
        assert_eq!(interp(0, 3, 0.5, InterpolationMethod::Round), Ok(2));
        // 0.5 * 1 + 0.5 * 2 = 1.5 rounds to 2, 0.5 * 2 + 0.5 * 3 = 2.5 rounds to 2.
        assert_eq!(interp(1, 2, 0.5, InterpolationMethod::Round), Ok(2));
        assert_eq!(interp(2, 3, 0.5, InterpolationMethod::Round), Ok(2));
        assert_eq!(interp(0, 1, 0.5, InterpolationMethod::Round), Ok(0));
        assert_eq!(interp(0, 3, 0.9, InterpolationMethod::Round), Ok(3));
    }

    #[test]
    fn endpoints_are_identities() {
        for method in [
            InterpolationMethod::Int,
            InterpolationMethod::Round,
            InterpolationMethod::Closest,
        ] {
            for i in 0..SUPPORT.len() {
                for j in 0..SUPPORT.len() {
                    assert_eq!(interp(i, j, 0.0, method), Ok(i), "{method:?} alpha=0");
                    assert_eq!(interp(i, j, 1.0, method), Ok(j), "{method:?} alpha=1");
                }
            }
        }
    }

    #[test]
    fn closest_picks_nearest_bin_and_lower_on_ties() {
        // 15 Hz sits halfway between bins 1 and 2.
        assert_eq!(interp(0, 3, 0.5, InterpolationMethod::Closest), Ok(1));
        assert_eq!(interp(0, 3, 0.6, InterpolationMethod::Closest), Ok(2));

        let uneven = [0.0, 1.0, 10.0, 100.0];
        assert_eq!(
            interpolate_frequency(0, 3, 0.08, InterpolationMethod::Closest, Some(&uneven[..])),
            Ok(2)
        );
        assert_eq!(
            interpolate_frequency(3, 0, 0.99, InterpolationMethod::Closest, Some(&uneven[..])),
            Ok(1)
        );
    }

    #[test]
    fn closest_needs_a_support_covering_its_indices() {
        assert!(matches!(
            interpolate_frequency::<f64>(0, 1, 0.5, InterpolationMethod::Closest, None),
            Err(Error::InvalidArgument { .. })
        ));
        assert_eq!(
            interp(0, 7, 0.5, InterpolationMethod::Closest),
            Err(Error::IndexOutOfRange { index: 7, len: 4 })
        );
        // Integer methods never look at the support.
        assert_eq!(interp(0, 7, 1.0, InterpolationMethod::Int), Ok(7));
    }

    #[test]
    fn alpha_outside_unit_interval_is_rejected() {
        for alpha in [-0.1, 1.5, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                interp(0, 1, alpha, InterpolationMethod::Int),
                Err(Error::InvalidArgument { .. })
            ));
        }
        let config = FrequencyInterpolatorConfig {
            alpha: 2.0f32,
            method: InterpolationMethod::Round,
        };
        assert!(FrequencyInterpolator::try_new(config).is_err());
    }

    #[test]
    fn round_half_even_matches_banker_rounding() {
        let cases = [(0.5, 0.0), (1.5, 2.0), (2.5, 2.0), (3.5, 4.0), (2.49, 2.0), (2.51, 3.0)];
        for (x, expected) in cases {
            assert_eq!(round_half_even(x), expected, "round({x})");
        }
    }

    #[test]
    fn parses_method_names() {
        assert_eq!("int".parse::<InterpolationMethod>(), Ok(InterpolationMethod::Int));
        assert_eq!("round".parse::<InterpolationMethod>(), Ok(InterpolationMethod::Round));
        assert_eq!("closest".parse::<InterpolationMethod>(), Ok(InterpolationMethod::Closest));
        assert!("nearest".parse::<InterpolationMethod>().is_err());
        assert_eq!(InterpolationMethod::default(), InterpolationMethod::Int);
    }
}
