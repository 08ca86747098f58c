//! Pairwise transport cost matrices over frequency supports.

use crate::error::{Error, Result};
use crate::kernel::{ConfigError, KernelLifecycle, Read1D};
use crate::ot::distance::{Distance, FrequencyMetric};
use crate::ot::traits::CostMatrixBuild;
use ndarray::{Array2, ArrayView1};
use num_traits::Float;

/// Constructor config for [`CostMatrixKernel`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CostMatrixConfig<D = Distance> {
    /// Ground distance between a source and a target frequency.
    pub distance: D,
}

/// Trait-first cost matrix builder.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostMatrixKernel<D = Distance> {
    distance: D,
}

impl<D> CostMatrixKernel<D> {
    /// Return the configured ground distance.
    pub fn distance(&self) -> &D {
        &self.distance
    }
}

impl<D> KernelLifecycle for CostMatrixKernel<D> {
    type Config = CostMatrixConfig<D>;

    fn try_new(config: Self::Config) -> core::result::Result<Self, ConfigError> {
        Ok(Self {
            distance: config.distance,
        })
    }
}

fn read_support<'a, F, I>(support: &'a I, arg: &'static str) -> Result<&'a [F]>
where
    I: Read1D<F> + ?Sized,
{
    let support = support.read_slice()?;
    if support.is_empty() {
        return Err(ConfigError::EmptyInput { arg }.into());
    }
    Ok(support)
}

impl<F, D> CostMatrixBuild<F> for CostMatrixKernel<D>
where
    F: Float,
    D: FrequencyMetric<F>,
{
    fn run_into<I1, I2>(
        &self,
        source_support: &I1,
        target_support: &I2,
        out: &mut Array2<F>,
    ) -> Result<()>
    where
        I1: Read1D<F> + ?Sized,
        I2: Read1D<F> + ?Sized,
    {
        let source = read_support(source_support, "source_support")?;
        let target = read_support(target_support, "target_support")?;
        if out.dim() != (source.len(), target.len()) {
            return Err(Error::invalid_argument(
                "out",
                format!(
                    "expected a {}x{} matrix, got {:?}",
                    source.len(),
                    target.len(),
                    out.dim()
                ),
            ));
        }
        out.assign(
            &self
                .distance
                .pairwise(ArrayView1::from(source), ArrayView1::from(target)),
        );
        Ok(())
    }

    fn run_alloc<I1, I2>(&self, source_support: &I1, target_support: &I2) -> Result<Array2<F>>
    where
        I1: Read1D<F> + ?Sized,
        I2: Read1D<F> + ?Sized,
    {
        let source = read_support(source_support, "source_support")?;
        let target = read_support(target_support, "target_support")?;
        Ok(self
            .distance
            .pairwise(ArrayView1::from(source), ArrayView1::from(target)))
    }
}

/// Generate the transport cost matrix between two frequency supports.
///
/// Entry `[i, j]` is `distance(source_support[i], target_support[j])`. When
/// `target_support` is `None` the source support is used on both axes. No
/// normalization or sanitization is applied.
///
/// # Examples
/// ```
/// use audiot::ot::cost::cost_matrix;
/// use audiot::ot::distance::Distance;
/// use ndarray::array;
///
/// let support = [0.0, 10.0, 20.0];
/// let m = cost_matrix(&support, None, Distance::Squared).unwrap();
/// assert_eq!(m, array![[0.0, 100.0, 400.0], [100.0, 0.0, 100.0], [400.0, 100.0, 0.0]]);
/// ```
pub fn cost_matrix<F, D>(
    source_support: &[F],
    target_support: Option<&[F]>,
    distance: D,
) -> Result<Array2<F>>
where
    F: Float,
    D: FrequencyMetric<F>,
{
    let kernel = CostMatrixKernel::try_new(CostMatrixConfig { distance })?;
    kernel.run_alloc(source_support, target_support.unwrap_or(source_support))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ot::distance::squared;
    use ndarray::array;

    #[test]
    fn square_matrix_defaults_to_source_support() {
        let support = [0.0, 10.0, 20.0, 30.0];
        let m = cost_matrix(&support, None, Distance::Euclidean).expect("cost matrix");
        assert_eq!(m.dim(), (4, 4));
        assert_eq!(m[[0, 3]], 30.0);
        assert_eq!(m[[3, 0]], 30.0);
        assert!(m.diag().iter().all(|&d| d == 0.0));
    }

    #[test]
    fn rectangular_supports_keep_orientation() {
        let source = [0.0f32, 100.0];
        let target = [50.0f32, 150.0, 250.0];
        let m = cost_matrix(&source, Some(&target[..]), Distance::Squared).expect("cost matrix");
        assert_eq!(
            m,
            array![[2500.0, 22500.0, 62500.0], [2500.0, 2500.0, 22500.0]]
        );
    }

    #[test]
    fn accepts_function_metrics() {
        let support = [1.0, 2.0, 4.0];
        let from_fn = cost_matrix(&support, None, squared::<f64>).expect("cost matrix");
        let from_enum = cost_matrix(&support, None, Distance::Squared).expect("cost matrix");
        assert_eq!(from_fn, from_enum);
    }

    #[test]
    fn kernel_run_into_validates_shape() {
        let kernel = CostMatrixKernel::try_new(CostMatrixConfig {
            distance: Distance::Squared,
        })
        .expect("kernel");
        let support = vec![0.0f64, 1.0, 2.0];
        let mut out = Array2::zeros((3, 3));
        kernel
            .run_into(&support, &support, &mut out)
            .expect("run_into");
        assert_eq!(out[[0, 2]], 4.0);

        let mut wrong = Array2::zeros((2, 3));
        assert!(matches!(
            kernel.run_into(&support, &support, &mut wrong),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn empty_supports_are_rejected() {
        let empty: [f64; 0] = [];
        assert!(matches!(
            cost_matrix(&empty, None, Distance::Squared),
            Err(Error::InvalidArgument { .. })
        ));
    }
}
