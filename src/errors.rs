use crate::parameters::PredictionTarget;
use thiserror::Error;

/// A result type for calibration predictions
pub type Result<T> = std::result::Result<T, CalibError>;

/// An error when assembling or solving the calibrated predictive distribution
#[derive(Error, Debug)]
pub enum CalibError {
    /// When array sizes are inconsistent with each other or with the posterior dimensions
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
    /// When a posterior scale, precision or roughness value is out of its domain
    #[error("Invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),
    /// When a covariance matrix cannot be Cholesky factorized
    #[error("Covariance matrix ({size}x{size}) is not positive definite: {context}")]
    NonPositiveDefiniteCovariance {
        /// Size of the square covariance matrix
        size: usize,
        /// Which matrix failed and for which target when known
        context: String,
    },
    /// When linear algebra computation fails
    #[cfg(feature = "blas")]
    #[error("Linalg BLAS error: {0}")]
    LinalgBlasError(#[from] ndarray_linalg::error::LinalgError),
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
}

impl CalibError {
    /// Attach the prediction target to a factorization failure
    pub(crate) fn with_target(self, target: PredictionTarget) -> Self {
        match self {
            CalibError::NonPositiveDefiniteCovariance { size, context } => {
                CalibError::NonPositiveDefiniteCovariance {
                    size,
                    context: format!("{context} (target {target})"),
                }
            }
            err => err,
        }
    }
}
