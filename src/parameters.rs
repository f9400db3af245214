use crate::errors::{CalibError, Result};
use crate::kernel::{check_roughness, check_scale, CovarianceKernel};
use linfa::{Float, ParamGuard};

use ndarray::{s, Array1, ArrayBase, Data, Ix1, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// The quantity predicted at query sites.
///
/// All targets share the joint covariance of the training data, they only differ
/// by the covariance blocks composing the cross-covariance with the query sites
/// and the prior covariance at the query sites.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum PredictionTarget {
    /// Field response: simulator response + discrepancy + observation noise
    Full,
    /// Simulator response + discrepancy, without observation noise
    Combined,
    /// Simulator response only
    Response,
    /// Discrepancy only
    Discrepancy,
}

impl PredictionTarget {
    /// All prediction targets
    pub const ALL: [PredictionTarget; 4] = [
        PredictionTarget::Full,
        PredictionTarget::Combined,
        PredictionTarget::Response,
        PredictionTarget::Discrepancy,
    ];

    /// Whether the simulator response process contributes to the target
    pub fn includes_response(&self) -> bool {
        !matches!(self, PredictionTarget::Discrepancy)
    }

    /// Whether the discrepancy process contributes to the target
    pub fn includes_discrepancy(&self) -> bool {
        !matches!(self, PredictionTarget::Response)
    }

    /// Whether observation noise is added to the prior covariance at query sites
    pub fn includes_noise(&self) -> bool {
        matches!(self, PredictionTarget::Full)
    }
}

impl fmt::Display for PredictionTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            PredictionTarget::Full => "Full",
            PredictionTarget::Combined => "Combined",
            PredictionTarget::Response => "Response",
            PredictionTarget::Discrepancy => "Discrepancy",
        };
        write!(f, "{s}")
    }
}

/// A validated posterior draw of the calibration model hyperparameters.
///
/// With `p` the number of controllable inputs and `q` the number of calibration inputs:
/// * `tf` (q,) : calibration inputs
/// * `beta_eta` (p+q,) : roughness of the simulator response process
/// * `beta_delta` (p,) : roughness of the discrepancy process
/// * `lambda_eta`, `lambda_delta` : scales of the simulator response and discrepancy processes
/// * `lambda_eps` : observation noise precision
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(deserialize = "F: Deserialize<'de>"))
)]
pub struct Posterior<F: Float> {
    pub(crate) tf: Array1<F>,
    pub(crate) beta_eta: Array1<F>,
    pub(crate) beta_delta: Array1<F>,
    pub(crate) lambda_eta: F,
    pub(crate) lambda_delta: F,
    pub(crate) lambda_eps: F,
}

impl<F: Float> Default for Posterior<F> {
    fn default() -> Posterior<F> {
        Posterior {
            tf: Array1::zeros(0),
            beta_eta: Array1::zeros(0),
            beta_delta: Array1::zeros(0),
            lambda_eta: F::one(),
            lambda_delta: F::one(),
            lambda_eps: F::one(),
        }
    }
}

impl<F: Float> Posterior<F> {
    /// Get calibration inputs
    pub fn tf(&self) -> &Array1<F> {
        &self.tf
    }

    /// Get roughness of the simulator response process
    pub fn beta_eta(&self) -> &Array1<F> {
        &self.beta_eta
    }

    /// Get roughness of the discrepancy process
    pub fn beta_delta(&self) -> &Array1<F> {
        &self.beta_delta
    }

    /// Get scale of the simulator response process
    pub fn lambda_eta(&self) -> F {
        self.lambda_eta
    }

    /// Get scale of the discrepancy process
    pub fn lambda_delta(&self) -> F {
        self.lambda_delta
    }

    /// Get observation noise precision
    pub fn lambda_eps(&self) -> F {
        self.lambda_eps
    }

    /// Observation noise variance `1 / lambda_eps`
    pub fn noise_variance(&self) -> F {
        F::one() / self.lambda_eps
    }

    /// Number of controllable inputs `p`
    pub fn input_dim(&self) -> usize {
        self.beta_delta.len()
    }

    /// Number of calibration inputs `q`
    pub fn calib_dim(&self) -> usize {
        self.tf.len()
    }

    /// Covariance kernel of the simulator response process over (x, t) points
    pub fn eta_kernel(&self) -> CovarianceKernel<F> {
        CovarianceKernel::new_unchecked(self.beta_eta.to_owned(), self.lambda_eta)
    }

    /// Covariance kernel of the discrepancy process over x points
    pub fn delta_kernel(&self) -> CovarianceKernel<F> {
        CovarianceKernel::new_unchecked(self.beta_delta.to_owned(), self.lambda_delta)
    }
}

#[derive(Clone, Debug)]
/// The set of hyperparameters of one posterior draw to be checked
/// before being used in [predictions](crate::KohPredictor).
pub struct PosteriorParams<F: Float>(Posterior<F>);

impl<F: Float> Default for PosteriorParams<F> {
    fn default() -> Self {
        Self(Posterior::default())
    }
}

impl<F: Float> PosteriorParams<F> {
    /// A constructor given calibration inputs and roughness parameters,
    /// scales and noise precision default to 1.
    pub fn new(
        tf: &ArrayBase<impl Data<Elem = F>, Ix1>,
        beta_eta: &ArrayBase<impl Data<Elem = F>, Ix1>,
        beta_delta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Self {
        Self(Posterior {
            tf: tf.to_owned(),
            beta_eta: beta_eta.to_owned(),
            beta_delta: beta_delta.to_owned(),
            ..Default::default()
        })
    }

    /// A constructor from a flat posterior draw laid out as
    /// `[tf (q), beta_eta (p+q), beta_delta (p), lambda_eta, lambda_delta, lambda_eps]`
    /// as produced by an MCMC chain.
    pub fn from_flat(draw: &ArrayBase<impl Data<Elem = F>, Ix1>, p: usize, q: usize) -> Result<Self> {
        let expected = flat_len(p, q);
        if draw.len() != expected {
            return Err(CalibError::DimensionMismatch(format!(
                "flat posterior draw should have {} components (p={p}, q={q}), got {}",
                expected,
                draw.len()
            )));
        }
        let (tf_end, eta_end, delta_end) = (q, 2 * q + p, 2 * q + 2 * p);
        Ok(Self(Posterior {
            tf: draw.slice(s![..tf_end]).to_owned(),
            beta_eta: draw.slice(s![tf_end..eta_end]).to_owned(),
            beta_delta: draw.slice(s![eta_end..delta_end]).to_owned(),
            lambda_eta: draw[delta_end],
            lambda_delta: draw[delta_end + 1],
            lambda_eps: draw[delta_end + 2],
        }))
    }

    /// Set calibration inputs.
    pub fn tf(mut self, tf: Array1<F>) -> Self {
        self.0.tf = tf;
        self
    }

    /// Set roughness of the simulator response process.
    pub fn beta_eta(mut self, beta_eta: Array1<F>) -> Self {
        self.0.beta_eta = beta_eta;
        self
    }

    /// Set roughness of the discrepancy process.
    pub fn beta_delta(mut self, beta_delta: Array1<F>) -> Self {
        self.0.beta_delta = beta_delta;
        self
    }

    /// Set scale of the simulator response process.
    pub fn lambda_eta(mut self, lambda_eta: F) -> Self {
        self.0.lambda_eta = lambda_eta;
        self
    }

    /// Set scale of the discrepancy process.
    pub fn lambda_delta(mut self, lambda_delta: F) -> Self {
        self.0.lambda_delta = lambda_delta;
        self
    }

    /// Set observation noise precision (the larger the quieter).
    pub fn lambda_eps(mut self, lambda_eps: F) -> Self {
        self.0.lambda_eps = lambda_eps;
        self
    }
}

impl<F: Float> From<Posterior<F>> for PosteriorParams<F> {
    fn from(valid: Posterior<F>) -> Self {
        PosteriorParams(valid)
    }
}

impl<F: Float> ParamGuard for PosteriorParams<F> {
    type Checked = Posterior<F>;
    type Error = CalibError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        self.0.validate()?;
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

impl<F: Float> Posterior<F> {
    /// Check dimensions then values of the hyperparameters,
    /// also used on posteriors not built through [`PosteriorParams`] (e.g. deserialized ones)
    pub(crate) fn validate(&self) -> Result<()> {
        let (p, q) = (self.beta_delta.len(), self.tf.len());
        if p == 0 {
            return Err(CalibError::DimensionMismatch(
                "`beta_delta` should have one component per input, got none".to_string(),
            ));
        }
        if self.beta_eta.len() != p + q {
            return Err(CalibError::DimensionMismatch(format!(
                "`beta_eta` should have {} components (p={p} inputs + q={q} calibration inputs), got {}",
                p + q,
                self.beta_eta.len()
            )));
        }
        if let Some(v) = self.tf.iter().find(|v| !v.is_finite()) {
            return Err(CalibError::InvalidHyperparameter(format!(
                "`tf` components should be finite, got {v}"
            )));
        }
        check_roughness("beta_eta", &self.beta_eta)?;
        check_roughness("beta_delta", &self.beta_delta)?;
        check_scale("lambda_eta", self.lambda_eta)?;
        check_scale("lambda_delta", self.lambda_delta)?;
        check_scale("lambda_eps", self.lambda_eps)?;
        Ok(())
    }
}

/// Length of a flat posterior draw given `p` inputs and `q` calibration inputs
pub fn flat_len(p: usize, q: usize) -> usize {
    2 * p + 2 * q + 3
}

/// Unpack and check a chain of posterior draws given as a (n_draws, 2p+2q+3) matrix,
/// see [`PosteriorParams::from_flat`] for the row layout.
pub fn posteriors_from_rows<F: Float>(
    draws: &ArrayBase<impl Data<Elem = F>, Ix2>,
    p: usize,
    q: usize,
) -> Result<Vec<Posterior<F>>> {
    draws
        .rows()
        .into_iter()
        .map(|row| PosteriorParams::from_flat(&row, p, q)?.check())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn params() -> PosteriorParams<f64> {
        PosteriorParams::new(&array![0.5], &array![1., 2.], &array![3.])
            .lambda_eta(2.)
            .lambda_delta(4.)
            .lambda_eps(10.)
    }

    #[test]
    fn test_valid_posterior() {
        let post = params().check().expect("valid posterior");
        assert_eq!(1, post.input_dim());
        assert_eq!(1, post.calib_dim());
        assert_eq!(0.1, post.noise_variance());
        assert_eq!(2, post.eta_kernel().dim());
        assert_eq!(4., post.delta_kernel().scale());
    }

    #[test]
    fn test_invalid_noise_precision() {
        for lambda_eps in [0., -1., f64::NAN] {
            assert!(matches!(
                params().lambda_eps(lambda_eps).check(),
                Err(CalibError::InvalidHyperparameter(_))
            ));
        }
    }

    #[test]
    fn test_invalid_scales() {
        assert!(matches!(
            params().lambda_eta(0.).check(),
            Err(CalibError::InvalidHyperparameter(_))
        ));
        assert!(matches!(
            params().lambda_delta(-2.).check(),
            Err(CalibError::InvalidHyperparameter(_))
        ));
    }

    #[test]
    fn test_invalid_roughness() {
        assert!(matches!(
            params().beta_eta(array![f64::NAN, 1.]).check(),
            Err(CalibError::InvalidHyperparameter(_))
        ));
        assert!(matches!(
            params().beta_delta(array![-1.]).check(),
            Err(CalibError::InvalidHyperparameter(_))
        ));
        assert!(matches!(
            params().tf(array![f64::INFINITY]).check(),
            Err(CalibError::InvalidHyperparameter(_))
        ));
    }

    #[test]
    fn test_posterior_dimension_mismatch() {
        assert!(matches!(
            params().beta_eta(array![1.]).check(),
            Err(CalibError::DimensionMismatch(_))
        ));
        assert!(matches!(
            params().beta_delta(Array1::zeros(0)).check(),
            Err(CalibError::DimensionMismatch(_))
        ));
        // dimensions are checked before values
        assert!(matches!(
            params().beta_eta(array![f64::NAN]).check(),
            Err(CalibError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_from_flat() {
        let draw = array![0.5, 0.6, 1., 2., 3., 4., 5., 6., 7., 8., 9.];
        assert_eq!(draw.len(), flat_len(2, 2));
        let post = PosteriorParams::from_flat(&draw, 2, 2)
            .unwrap()
            .check()
            .unwrap();
        assert_eq!(array![0.5, 0.6], post.tf);
        assert_eq!(array![1., 2., 3., 4.], post.beta_eta);
        assert_eq!(array![5., 6.], post.beta_delta);
        assert_eq!((7., 8., 9.), (post.lambda_eta, post.lambda_delta, post.lambda_eps));

        assert!(matches!(
            PosteriorParams::from_flat(&draw, 2, 1),
            Err(CalibError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_posteriors_from_rows() {
        let draws = array![
            [0.1, 1., 1., 1., 1., 1., 10.],
            [0.2, 1., 1., 1., 1., 1., 20.],
            [0.3, 1., 1., 1., 1., 1., 30.]
        ];
        let posts = posteriors_from_rows(&draws, 1, 1).unwrap();
        assert_eq!(3, posts.len());
        assert_eq!(array![0.3], posts[2].tf);
        assert_eq!(20., posts[1].lambda_eps);

        let bad = array![[0.1, 1., 1., 1., 1., 1., 0.]];
        assert!(matches!(
            posteriors_from_rows(&bad, 1, 1),
            Err(CalibError::InvalidHyperparameter(_))
        ));
    }

    #[test]
    fn test_targets() {
        use PredictionTarget::*;
        assert_eq!(
            vec![(true, true, true), (true, true, false), (true, false, false), (false, true, false)],
            PredictionTarget::ALL
                .iter()
                .map(|t| (t.includes_response(), t.includes_discrepancy(), t.includes_noise()))
                .collect::<Vec<_>>()
        );
        assert_eq!("Discrepancy", Discrepancy.to_string());
    }

    #[cfg(feature = "serializable")]
    #[test]
    fn test_serde_posterior() {
        let post = params().check().unwrap();
        let json = serde_json::to_string(&post).unwrap();
        let loaded: Posterior<f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(post, loaded);
        assert!(loaded.validate().is_ok());
    }

    #[cfg(feature = "serializable")]
    #[test]
    fn test_deserialized_posterior_is_validated() {
        let json = r#"{"tf":{"v":1,"dim":[1],"data":[0.0]},
            "beta_eta":{"v":1,"dim":[2],"data":[1.0,1.0]},
            "beta_delta":{"v":1,"dim":[1],"data":[-5.0]},
            "lambda_eta":1.0,"lambda_delta":1.0,"lambda_eps":0.0}"#;
        let loaded: Posterior<f64> = serde_json::from_str(json).unwrap();
        assert!(matches!(
            loaded.validate(),
            Err(CalibError::InvalidHyperparameter(_))
        ));
    }
}
