//! Optimal-transport interpolation between two spectra.
//!
//! The engine sanitizes the cost matrix, solves the exact transport problem
//! between the source and target spectra, then moves every transported unit of
//! mass to the frequency chosen by the [`FrequencyInterpolator`]:
//!
//! ```text
//! out[interpolate(i, j)] += plan[i, j]    for every plan[i, j] != 0
//! ```

use crate::error::{Error, Result};
use crate::kernel::{ConfigError, KernelLifecycle, Read1D, Write1D};
use crate::ot::interpolate::{
    FrequencyInterpolator, FrequencyInterpolatorConfig, InterpolationMethod,
};
use crate::ot::traits::{FrequencyInterpolate, OtInterpolation, SpectralInterpolate};
use audiot_core::lp::{emd_with_options, EmdOptions, EmdSolution};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use num_traits::Float;

/// Constructor config for [`OtInterpolationKernel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OtInterpolationConfig<F> {
    /// Interpolation parameter, `0` is the source and `1` the target.
    pub alpha: F,
    /// Where transported mass lands.
    pub method: InterpolationMethod,
    /// Require finite, non-negative marginals summing to one.
    pub validate_marginals: bool,
    /// Accepted deviation of each marginal's total mass from one, and between
    /// the two totals inside the solver.
    pub mass_tolerance: F,
    /// Simplex pivot budget.
    pub max_iter: usize,
}

impl<F: Float> OtInterpolationConfig<F> {
    /// Default configuration at `alpha`: `Int` method, validated marginals,
    /// `1e-6` mass tolerance and `100_000` pivots.
    pub fn new(alpha: F) -> Self {
        let solver = EmdOptions::default();
        Self {
            alpha,
            method: InterpolationMethod::default(),
            validate_marginals: true,
            mass_tolerance: F::from(solver.mass_tolerance).unwrap_or_else(F::epsilon),
            max_iter: solver.max_iter,
        }
    }
}

/// Validated exact-OT spectral interpolation kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OtInterpolationKernel<F> {
    interpolator: FrequencyInterpolator<F>,
    validate_marginals: bool,
    mass_tolerance: F,
    options: EmdOptions,
}

impl<F: Float> OtInterpolationKernel<F> {
    /// Index interpolator used to place transported mass.
    pub fn interpolator(&self) -> &FrequencyInterpolator<F> {
        &self.interpolator
    }
}

impl<F: Float> KernelLifecycle for OtInterpolationKernel<F> {
    type Config = OtInterpolationConfig<F>;

    fn try_new(config: Self::Config) -> core::result::Result<Self, ConfigError> {
        let interpolator = FrequencyInterpolator::try_new(FrequencyInterpolatorConfig {
            alpha: config.alpha,
            method: config.method,
        })?;
        let mass_tolerance = config
            .mass_tolerance
            .to_f64()
            .filter(|tol| tol.is_finite() && *tol >= 0.0)
            .ok_or(ConfigError::InvalidArgument {
                arg: "mass_tolerance",
                reason: "tolerance must be finite and non-negative",
            })?;
        Ok(Self {
            interpolator,
            validate_marginals: config.validate_marginals,
            mass_tolerance: config.mass_tolerance,
            options: EmdOptions {
                max_iter: config.max_iter,
                mass_tolerance,
            },
        })
    }
}

/// Replace every non-finite cost by the largest finite cost of the matrix.
///
/// The caller's matrix is left untouched; a sanitized copy is returned with the
/// number of replaced entries.
///
/// # Errors
/// `DegenerateCostMatrix` when the matrix holds no finite entry.
///
/// # Examples
/// ```
/// use audiot::ot::engine::sanitize_cost_matrix;
/// use ndarray::array;
///
/// let m = array![[0.0, f64::INFINITY], [5.0, 0.0]];
/// let (clean, replaced) = sanitize_cost_matrix(m.view()).unwrap();
/// assert_eq!(clean, array![[0.0, 5.0], [5.0, 0.0]]);
/// assert_eq!(replaced, 1);
/// ```
pub fn sanitize_cost_matrix<F: Float>(cost_matrix: ArrayView2<'_, F>) -> Result<(Array2<F>, usize)> {
    let max_finite = cost_matrix
        .iter()
        .copied()
        .filter(|c| c.is_finite())
        .reduce(F::max)
        .ok_or(Error::DegenerateCostMatrix)?;
    let mut replaced = 0;
    let sanitized = cost_matrix.mapv(|c| {
        if c.is_finite() {
            c
        } else {
            replaced += 1;
            max_finite
        }
    });
    Ok((sanitized, replaced))
}

/// Nonzero `(row, col, mass)` entries of a transport plan, row-major.
pub fn transport_entries<F: Float>(plan: ArrayView2<'_, F>) -> Vec<(usize, usize, F)> {
    plan.indexed_iter()
        .filter(|(_, &mass)| mass != F::zero())
        .map(|((i, j), &mass)| (i, j, mass))
        .collect()
}

fn read_nonempty<'a, F, I>(input: &'a I, arg: &'static str) -> Result<&'a [F]>
where
    I: Read1D<F> + ?Sized,
{
    let input = input.read_slice()?;
    if input.is_empty() {
        return Err(ConfigError::EmptyInput { arg }.into());
    }
    Ok(input)
}

fn check_marginal<F: Float>(marginal: &[F], arg: &str, tolerance: F) -> Result<()> {
    if marginal.iter().any(|w| !w.is_finite() || *w < F::zero()) {
        return Err(Error::invalid_argument(
            arg,
            "spectrum must be finite and non-negative",
        ));
    }
    let mass = marginal.iter().fold(F::zero(), |acc, &w| acc + w);
    if (mass - F::one()).abs() > tolerance {
        return Err(Error::invalid_argument(
            arg,
            format!(
                "spectrum must be normalized, total mass is {}",
                mass.to_f64().unwrap_or(f64::NAN)
            ),
        ));
    }
    Ok(())
}

impl<F: Float> SpectralInterpolate<F> for OtInterpolationKernel<F> {
    fn run_into<S, I1, I2, O>(
        &self,
        support: &S,
        source: &I1,
        target: &I2,
        cost_matrix: ArrayView2<'_, F>,
        out: &mut O,
    ) -> Result<EmdSolution<F>>
    where
        S: Read1D<F> + ?Sized,
        I1: Read1D<F> + ?Sized,
        I2: Read1D<F> + ?Sized,
        O: Write1D<F> + ?Sized,
    {
        let support = read_nonempty(support, "support")?;
        let source = read_nonempty(source, "source")?;
        let target = read_nonempty(target, "target")?;
        if cost_matrix.dim() != (source.len(), target.len()) {
            return Err(Error::invalid_argument(
                "cost_matrix",
                format!(
                    "expected a {}x{} matrix, got {:?}",
                    source.len(),
                    target.len(),
                    cost_matrix.dim()
                ),
            ));
        }
        let out = out.write_slice_mut()?;
        if out.len() != support.len() {
            return Err(ConfigError::LengthMismatch {
                arg: "out",
                expected: support.len(),
                got: out.len(),
            }
            .into());
        }
        if self.validate_marginals {
            check_marginal(source, "source", self.mass_tolerance)?;
            check_marginal(target, "target", self.mass_tolerance)?;
        }

        let (costs, replaced) = sanitize_cost_matrix(cost_matrix)?;
        if replaced > 0 {
            tracing::debug!(replaced, "replaced non-finite costs");
        }

        let solution = emd_with_options(
            ArrayView1::from(source),
            ArrayView1::from(target),
            costs.view(),
            &self.options,
        )?;

        // `out` is only written once every cell has landed.
        let mut landed = vec![F::zero(); support.len()];
        let entries = transport_entries(solution.plan.view());
        for &(i, j, mass) in &entries {
            let k = self.interpolator.run(i, j, Some(support))?;
            let bin = landed.get_mut(k).ok_or(Error::IndexOutOfRange {
                index: k,
                len: support.len(),
            })?;
            *bin = *bin + mass;
        }
        out.copy_from_slice(&landed);

        tracing::debug!(
            cells = entries.len(),
            iterations = solution.iterations,
            method = ?self.interpolator.method(),
            "redistributed transported mass"
        );
        Ok(solution)
    }

    fn run_alloc<S, I1, I2>(
        &self,
        support: &S,
        source: &I1,
        target: &I2,
        cost_matrix: ArrayView2<'_, F>,
    ) -> Result<OtInterpolation<F>>
    where
        S: Read1D<F> + ?Sized,
        I1: Read1D<F> + ?Sized,
        I2: Read1D<F> + ?Sized,
    {
        let len = read_nonempty(support, "support")?.len();
        let mut spectrum = Array1::zeros(len);
        let solution = self.run_into(support, source, target, cost_matrix, &mut spectrum)?;
        Ok(OtInterpolation {
            spectrum,
            plan: solution.plan,
            cost: solution.cost,
        })
    }
}

/// Interpolate between two normalized spectra with exact optimal transport.
///
/// `source` and `target` are histograms over the same `support`, and
/// `cost_matrix[i, j]` is the price of moving mass from `source` bin `i` to
/// `target` bin `j`. Non-finite costs are replaced by the largest finite cost.
/// Every nonzero entry of the optimal plan is moved to the output bin given by
/// [`interpolate_frequency`](crate::ot::interpolate::interpolate_frequency), so
/// the result carries the same total mass as the inputs.
///
/// # Errors
/// * `InvalidArgument` for empty or non-normalized spectra, a mis-shaped cost
///   matrix or `alpha` outside `[0, 1]`.
/// * `DegenerateCostMatrix` when no cost is finite.
/// * `TransportSolveFailure` when the solver cannot produce a plan.
/// * `IndexOutOfRange` when mass would land outside the support.
///
/// # Examples
/// ```
/// use audiot::ot::cost::cost_matrix;
/// use audiot::ot::distance::Distance;
/// use audiot::ot::engine::interpolate_spectra;
/// use audiot::ot::interpolate::InterpolationMethod;
///
/// let support = [0.0, 10.0, 20.0, 30.0];
/// let source = [1.0, 0.0, 0.0, 0.0];
/// let target = [0.0, 0.0, 0.0, 1.0];
/// let m = cost_matrix(&support, None, Distance::Squared).unwrap();
///
/// let result =
///     interpolate_spectra(&support, &source, &target, m.view(), 0.5, InterpolationMethod::Int)
///         .unwrap();
/// assert_eq!(result.spectrum.to_vec(), vec![0.0, 1.0, 0.0, 0.0]);
/// assert_eq!(result.plan[[0, 3]], 1.0);
/// ```
pub fn interpolate_spectra<F: Float>(
    support: &[F],
    source: &[F],
    target: &[F],
    cost_matrix: ArrayView2<'_, F>,
    alpha: F,
    method: InterpolationMethod,
) -> Result<OtInterpolation<F>> {
    let kernel = OtInterpolationKernel::try_new(OtInterpolationConfig {
        method,
        ..OtInterpolationConfig::new(alpha)
    })?;
    kernel.run_alloc(support, source, target, cost_matrix)
}
