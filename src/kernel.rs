//! The covariance function shared by the simulator response and the discrepancy processes.
//!
//! For two sets of points `x1` (n1, d) and `x2` (n2, d), roughness `beta` (d,) and scale `lambda`:
//!
//! ```text
//! cov(x1_i, x2_j) = exp( - sum_k beta_k * (x1_ik - x2_jk)^2 ) / lambda
//! ```
//!
//! The scale divides the whole correlation: `lambda` is a precision-like
//! factor, not a length-scale, and the diagonal of a self-covariance is `1 / lambda`.

use crate::errors::{CalibError, Result};
use crate::utils::differences;
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, ArrayView2, Data, Ix1, Ix2, Zip};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Squared exponential covariance with per-dimension roughness and an output scale
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(deserialize = "F: Deserialize<'de>"))
)]
pub struct CovarianceKernel<F: Float> {
    beta: Array1<F>,
    scale: F,
}

impl<F: Float> CovarianceKernel<F> {
    /// Constructor given roughness `beta` (one value per input dimension) and `scale`.
    ///
    /// Fails when `scale` is not strictly positive or when any `beta` component is negative or not finite.
    pub fn new(beta: &ArrayBase<impl Data<Elem = F>, Ix1>, scale: F) -> Result<Self> {
        check_scale("scale", scale)?;
        check_roughness("beta", beta)?;
        Ok(Self::new_unchecked(beta.to_owned(), scale))
    }

    /// Constructor for values already validated through a [`crate::Posterior`]
    pub(crate) fn new_unchecked(beta: Array1<F>, scale: F) -> Self {
        CovarianceKernel { beta, scale }
    }

    /// Roughness parameters
    pub fn beta(&self) -> &Array1<F> {
        &self.beta
    }

    /// Output scale
    pub fn scale(&self) -> F {
        self.scale
    }

    /// Number of input dimensions the kernel applies to
    pub fn dim(&self) -> usize {
        self.beta.len()
    }

    /// Compute the (n1, n2) covariance matrix between rows of `x1` and rows of `x2`.
    ///
    /// *Panics* if `x1` or `x2` number of columns differ from the kernel dimension.
    pub fn compute(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array2<F> {
        assert!(x1.ncols() == self.dim() && x2.ncols() == self.dim());
        let mut cov = Array2::zeros((x1.nrows(), x2.nrows()));
        Zip::from(cov.rows_mut())
            .and(x1.rows())
            .for_each(|mut cov_i, x1_i| {
                let d = differences(&x1_i, x2);
                let r = d.mapv(|v| v * v).dot(&self.beta);
                cov_i.assign(&r.mapv(|v| F::exp(-v) / self.scale));
            });
        cov
    }

    /// Compute the (n, n) covariance matrix of `x` with itself
    pub fn compute_self(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        self.compute(x, x)
    }
}

impl<F: Float> fmt::Display for CovarianceKernel<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Covariance(beta={}, scale={})", self.beta, self.scale)
    }
}

/// Compute the covariance matrix between `x1` and `x2` (or `x1` with itself when `x2` is `None`)
/// given roughness `beta` and `scale`.
///
/// ```
/// use egobox_calib::covariance;
/// use ndarray::array;
///
/// let x = array![[0.], [1.]];
/// let cov = covariance(x.view(), None, &array![1.], 2.).unwrap();
/// assert_eq!(cov[[0, 0]], 0.5);
/// ```
pub fn covariance<'a, F: Float>(
    x1: ArrayView2<'a, F>,
    x2: Option<ArrayView2<'a, F>>,
    beta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    scale: F,
) -> Result<Array2<F>> {
    let x2 = x2.unwrap_or(x1);
    if x1.ncols() != beta.len() || x2.ncols() != beta.len() {
        return Err(CalibError::DimensionMismatch(format!(
            "beta has {} components while points have {} and {} columns",
            beta.len(),
            x1.ncols(),
            x2.ncols()
        )));
    }
    let kernel = CovarianceKernel::new(beta, scale)?;
    Ok(kernel.compute(&x1, &x2))
}

pub(crate) fn check_scale<F: Float>(name: &str, value: F) -> Result<()> {
    if !value.is_finite() || value <= F::zero() {
        return Err(CalibError::InvalidHyperparameter(format!(
            "`{name}` should be strictly positive and finite, got {value}"
        )));
    }
    Ok(())
}

pub(crate) fn check_roughness<F: Float>(
    name: &str,
    beta: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Result<()> {
    if let Some((k, v)) = beta
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite() || **v < F::zero())
    {
        return Err(CalibError::InvalidHyperparameter(format!(
            "`{name}` components should be positive and finite, got {v} at index {k}"
        )));
    }
    Ok(())
}
