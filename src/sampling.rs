use crate::algorithm::factorize;
use crate::errors::{CalibError, Result};
use linfa::dataset::{WithLapack, WithoutLapack};
use linfa::Float;
#[cfg(not(feature = "blas"))]
use linfa_linalg::eigh::*;
use log::debug;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2};
#[cfg(feature = "blas")]
use ndarray_linalg::{eigh::*, UPLO};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::{Distribution, StandardNormal};
use ndarray_rand::RandomExt;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Eigenvalues below this threshold are considered null when sampling
pub const EIGENVALUE_FLOOR: f64 = 1e-9;

/// Decomposition used to draw correlated samples from a covariance matrix
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum SamplingMethod {
    /// Cholesky factor of the covariance, fails on non positive definite covariance
    Cholesky,
    /// Symmetric eigen decomposition, tolerates slightly negative eigenvalues
    /// due to round-off by clamping them to zero
    #[default]
    EigenValues,
}

/// A multivariate normal distribution `N(mean, C C^t)` described by its mean
/// and a square root `C` of its covariance matrix.
#[derive(Clone, Debug)]
pub struct MultivariateNormal<F: Float> {
    mean: Array1<F>,
    factor: Array2<F>,
}

impl<F: Float> MultivariateNormal<F> {
    /// Constructor given a mean vector (n,) and a symmetric covariance matrix (n, n)
    pub fn new(
        mean: Array1<F>,
        cov: &ArrayBase<impl Data<Elem = F>, Ix2>,
        method: SamplingMethod,
    ) -> Result<Self> {
        let n = mean.len();
        if cov.dim() != (n, n) {
            return Err(CalibError::DimensionMismatch(format!(
                "covariance should be ({n}, {n}) for a mean of size {n}, got {:?}",
                cov.dim()
            )));
        }
        let factor = match method {
            SamplingMethod::Cholesky => factorize(cov.to_owned(), "predictive covariance")?,
            SamplingMethod::EigenValues => {
                #[cfg(feature = "blas")]
                let (v, w) = cov.to_owned().with_lapack().eigh(UPLO::Lower)?;
                #[cfg(not(feature = "blas"))]
                let (v, w) = cov.to_owned().with_lapack().eigh_into()?;
                let v = v.mapv(F::cast);
                let n_clamped = v.iter().filter(|x| **x < F::cast(EIGENVALUE_FLOOR)).count();
                if n_clamped > 0 {
                    debug!("{n_clamped}/{n} covariance eigenvalues below {EIGENVALUE_FLOOR} set to zero");
                }
                let v = v.mapv(|x| {
                    if x < F::cast(EIGENVALUE_FLOOR) {
                        return F::zero();
                    }
                    x.sqrt()
                });
                let d = Array2::from_diag(&v).with_lapack();
                w.dot(&d).without_lapack()
            }
        };
        Ok(MultivariateNormal { mean, factor })
    }

    /// Dimension of the distribution
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Mean vector
    pub fn mean(&self) -> &Array1<F> {
        &self.mean
    }

    /// Covariance square root `C` such that covariance = `C C^t`
    pub fn factor(&self) -> &Array2<F> {
        &self.factor
    }

    /// Draw `n_draws` samples as columns of a (dim, n_draws) matrix
    pub fn sample_n<R: Rng + ?Sized>(&self, rng: &mut R, n_draws: usize) -> Array2<F> {
        let normal =
            Array2::<f64>::random_using((self.dim(), n_draws), StandardNormal, rng).mapv(F::cast);
        self.factor.dot(&normal) + &self.mean.view().insert_axis(Axis(1))
    }
}

impl<F: Float> Distribution<Array1<F>> for MultivariateNormal<F> {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Array1<F> {
        let normal = Array1::<f64>::random_using(self.dim(), StandardNormal, rng).mapv(F::cast);
        &self.mean + &self.factor.dot(&normal)
    }
}
