use crate::assembly::{joint_covariance, target_blocks, AugmentedDesign, TargetBlocks};
use crate::dataset::TrainingSet;
use crate::errors::{CalibError, Result};
use crate::parameters::{Posterior, PredictionTarget};
use crate::sampling::{MultivariateNormal, SamplingMethod};
use crate::utils::negative_diagonal;

#[cfg(feature = "blas")]
use linfa::dataset::{WithLapack, WithoutLapack};
use linfa::Float;
#[cfg(not(feature = "blas"))]
use linfa_linalg::{cholesky::*, triangular::*};
#[cfg(feature = "blas")]
use ndarray_linalg::{cholesky::*, triangular::*};

use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
use ndarray_rand::rand::{Rng, SeedableRng};
use ndarray_rand::rand_distr::Distribution;
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Cholesky factorization (lower triangular factor) of a symmetric covariance matrix
pub(crate) fn factorize<F: Float>(sigma: Array2<F>, context: &str) -> Result<Array2<F>> {
    let size = sigma.nrows();
    let not_positive_definite = || CalibError::NonPositiveDefiniteCovariance {
        size,
        context: context.to_string(),
    };
    #[cfg(not(feature = "blas"))]
    let chol = sigma.cholesky().map_err(|err| match err {
        linfa_linalg::LinalgError::NotPositiveDefinite => not_positive_definite(),
        err => err.into(),
    })?;
    #[cfg(feature = "blas")]
    let chol = sigma
        .with_lapack()
        .cholesky(UPLO::Lower)
        .map_err(|_| not_positive_definite())?
        .without_lapack();
    Ok(chol)
}

/// Solve `L x = rhs` given the lower triangular factor `L`
fn solve_lower<F: Float>(
    chol: &Array2<F>,
    rhs: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<Array2<F>> {
    #[cfg(not(feature = "blas"))]
    let x = chol.solve_triangular(rhs, UPLO::Lower)?;
    #[cfg(feature = "blas")]
    let x = chol
        .to_owned()
        .with_lapack()
        .solve_triangular(UPLO::Lower, Diag::NonUnit, &rhs.to_owned().with_lapack())?
        .without_lapack();
    Ok(x)
}

/// Solve `L L^t x = rhs` given the lower triangular factor `L`
fn cholesky_solve<F: Float>(
    chol: &Array2<F>,
    rhs: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<Array2<F>> {
    let y = solve_lower(chol, rhs)?;
    #[cfg(not(feature = "blas"))]
    let x = chol.t().solve_triangular_into(y, UPLO::Upper)?;
    #[cfg(feature = "blas")]
    let x = chol
        .t()
        .to_owned()
        .with_lapack()
        .solve_triangular_into(UPLO::Upper, Diag::NonUnit, y.with_lapack())?
        .without_lapack();
    Ok(x)
}

/// The gaussian posterior predictive distribution of a target at query sites
/// conditioned on the training data for one posterior draw.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(deserialize = "F: Deserialize<'de>"))
)]
pub struct PredictiveDistribution<F: Float> {
    target: PredictionTarget,
    mean: Array1<F>,
    cov: Array2<F>,
}

impl<F: Float> PredictiveDistribution<F> {
    /// Predicted target
    pub fn target(&self) -> PredictionTarget {
        self.target
    }

    /// Predictive mean at query sites (n_star,)
    pub fn mean(&self) -> &Array1<F> {
        &self.mean
    }

    /// Predictive covariance at query sites (n_star, n_star)
    pub fn covariance(&self) -> &Array2<F> {
        &self.cov
    }

    /// Predictive variances at query sites (n_star,)
    pub fn variances(&self) -> Array1<F> {
        self.cov.diag().to_owned()
    }

    /// Number of query sites
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    /// Whether there is no query site
    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Multivariate normal distribution to sample from
    pub fn to_multivariate_normal(&self, method: SamplingMethod) -> Result<MultivariateNormal<F>> {
        MultivariateNormal::new(self.mean.to_owned(), &self.cov, method)
            .map_err(|err| err.with_target(self.target))
    }

    /// Draw one realization at query sites using the default sampling method
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Array1<F>> {
        self.sample_with(rng, SamplingMethod::default())
    }

    /// Draw one realization at query sites using the given sampling method
    pub fn sample_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        method: SamplingMethod,
    ) -> Result<Array1<F>> {
        Ok(self.to_multivariate_normal(method)?.sample(rng))
    }

    /// Draw `n_draws` realizations as columns of a (n_star, n_draws) matrix
    pub fn sample_n<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        n_draws: usize,
        method: SamplingMethod,
    ) -> Result<Array2<F>> {
        Ok(self.to_multivariate_normal(method)?.sample_n(rng, n_draws))
    }
}

/// Posterior predictive engine of the Kennedy-O'Hagan calibration model for one posterior draw.
///
/// The joint covariance of the training responses is factorized once at construction
/// and reused for every target and every set of query sites.
///
/// ```
/// use egobox_calib::{KohPredictor, PosteriorParams, PredictionTarget, TrainingSet};
/// use linfa::ParamGuard;
/// use ndarray::array;
///
/// let training = TrainingSet::new(
///     &array![[0.], [1.]],
///     &array![[0.5]],
///     &array![[0.]],
///     &array![1., 2., 1.5],
/// ).unwrap();
/// let posterior = PosteriorParams::new(&array![0.], &array![1., 1.], &array![1.])
///     .lambda_eps(10.)
///     .check()
///     .unwrap();
///
/// let predictor = KohPredictor::new(&posterior, &training).unwrap();
/// let pred = predictor.predictive(PredictionTarget::Full, &array![[0.5]]).unwrap();
/// assert_eq!(pred.len(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct KohPredictor<'a, F: Float> {
    posterior: &'a Posterior<F>,
    training: &'a TrainingSet<F>,
    design: AugmentedDesign<F>,
    /// Lower Cholesky factor of the joint training covariance
    sigma_z_chol: Array2<F>,
    /// Sz^-1 z as a (n+m, 1) column
    weights: Array2<F>,
    sampling_method: SamplingMethod,
}

impl<'a, F: Float> KohPredictor<'a, F> {
    /// Assemble and factorize the joint covariance of `training` data under `posterior`
    pub fn new(posterior: &'a Posterior<F>, training: &'a TrainingSet<F>) -> Result<Self> {
        posterior.validate()?;
        training.check_posterior(posterior)?;
        let now = Instant::now();
        let design = AugmentedDesign::new(training, posterior);
        let sigma_z = joint_covariance(posterior, training, &design);
        let sigma_z_chol = factorize(sigma_z, "joint training covariance")?;
        let z = training.z().view().insert_axis(Axis(1));
        let weights = cholesky_solve(&sigma_z_chol, &z)?;
        debug!(
            "Joint covariance ({}x{}) factorized in {} ms (n={}, m={})",
            training.n_train(),
            training.n_train(),
            now.elapsed().as_millis(),
            training.n_field(),
            training.n_sim()
        );
        Ok(KohPredictor {
            posterior,
            training,
            design,
            sigma_z_chol,
            weights,
            sampling_method: SamplingMethod::default(),
        })
    }

    /// Set the decomposition used to draw realizations in [`KohPredictor::predict`]
    pub fn sampling_method(mut self, sampling_method: SamplingMethod) -> Self {
        self.sampling_method = sampling_method;
        self
    }

    /// Number of field observations
    pub fn n_field(&self) -> usize {
        self.training.n_field()
    }

    /// Number of simulator runs
    pub fn n_sim(&self) -> usize {
        self.training.n_sim()
    }

    /// Lower Cholesky factor of the joint training covariance (n+m, n+m)
    pub fn joint_covariance_factor(&self) -> &Array2<F> {
        &self.sigma_z_chol
    }

    /// Solution `K` of `Sz K = z` (n+m,)
    pub fn weights(&self) -> Array1<F> {
        self.weights.column(0).to_owned()
    }

    /// Predictive mean and covariance of `target` at query sites `x_star` (n_star, p)
    pub fn predictive(
        &self,
        target: PredictionTarget,
        x_star: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<PredictiveDistribution<F>> {
        self.training.check_query(x_star)?;
        let TargetBlocks { cross, prior } =
            target_blocks(target, self.posterior, self.training, &self.design, x_star);

        let mean = cross.t().dot(&self.weights).remove_axis(Axis(1));
        // L^t Sz^-1 L computed as V^t V with V = chol^-1 L
        let v = solve_lower(&self.sigma_z_chol, &cross).map_err(|err| err.with_target(target))?;
        let cov = prior - v.t().dot(&v);

        let negatives = negative_diagonal(&cov);
        if !negatives.is_empty() {
            warn!(
                "{target} prediction: negative variance at {} query site(s) {:?}",
                negatives.len(),
                negatives
            );
        }
        debug!("{target} predictive distribution computed at {} sites", mean.len());
        Ok(PredictiveDistribution { target, mean, cov })
    }

    /// Draw one realization of `target` at query sites `x_star` (n_star, p)
    pub fn predict<R: Rng + ?Sized>(
        &self,
        target: PredictionTarget,
        x_star: &ArrayBase<impl Data<Elem = F>, Ix2>,
        rng: &mut R,
    ) -> Result<Array1<F>> {
        self.predictive(target, x_star)?
            .sample_with(rng, self.sampling_method)
    }
}

/// Predictive distribution of `target` at query sites `x_star` for one posterior draw
pub fn predictive_distribution<F: Float>(
    target: PredictionTarget,
    posterior: &Posterior<F>,
    training: &TrainingSet<F>,
    x_star: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<PredictiveDistribution<F>> {
    KohPredictor::new(posterior, training)
        .map_err(|err| err.with_target(target))?
        .predictive(target, x_star)
}

/// Draw one realization of `target` at query sites `x_star` (n_star, p) given
/// a posterior draw and the training data:
/// field inputs `xf` (n, p), simulator inputs `xc` (m, p),
/// simulator calibration settings `tc` (m, q) and responses `z` (n+m,).
#[allow(clippy::too_many_arguments)]
pub fn predict<F: Float, R: Rng + ?Sized>(
    target: PredictionTarget,
    posterior: &Posterior<F>,
    x_star: &ArrayBase<impl Data<Elem = F>, Ix2>,
    xf: &ArrayBase<impl Data<Elem = F>, Ix2>,
    xc: &ArrayBase<impl Data<Elem = F>, Ix2>,
    tc: &ArrayBase<impl Data<Elem = F>, Ix2>,
    z: &ArrayBase<impl Data<Elem = F>, Ix1>,
    rng: &mut R,
) -> Result<Array1<F>> {
    let training = TrainingSet::new(xf, xc, tc, z)?;
    predictive_distribution(target, posterior, &training, x_star)?.sample(rng)
}

/// Draw one realization of `target` at query sites `x_star` for each posterior draw.
///
/// Returns a (n_draws, n_star) matrix, row `i` being the realization under `posteriors[i]`.
/// Draws are computed in parallel, each one with its own random generator seeded
/// from a generator initialized with `seed` so that results do not depend on thread scheduling.
/// When several draws fail, the error of the lowest failing draw is returned.
pub fn predict_ensemble<F: Float>(
    target: PredictionTarget,
    posteriors: &[Posterior<F>],
    training: &TrainingSet<F>,
    x_star: &ArrayBase<impl Data<Elem = F>, Ix2>,
    seed: u64,
    sampling_method: SamplingMethod,
) -> Result<Array2<F>> {
    let x_star = x_star.view();
    training.check_query(&x_star)?;
    info!(
        "{target} predictions for {} posterior draws at {} sites",
        posteriors.len(),
        x_star.nrows()
    );
    let now = Instant::now();

    let mut rng = Xoshiro256Plus::seed_from_u64(seed);
    let rngs: Vec<Xoshiro256Plus> = (0..posteriors.len())
        .map(|_| Xoshiro256Plus::seed_from_u64(rng.gen()))
        .collect();

    let results: Vec<Result<Array1<F>>> = posteriors
        .par_iter()
        .zip(rngs.into_par_iter())
        .map(|(posterior, mut rng)| {
            KohPredictor::new(posterior, training)
                .map_err(|err| err.with_target(target))?
                .sampling_method(sampling_method)
                .predict(target, &x_star, &mut rng)
        })
        .collect();

    // report the error of the lowest failing draw
    let mut draws = Array2::zeros((posteriors.len(), x_star.nrows()));
    for (mut row, result) in draws.rows_mut().into_iter().zip(results) {
        row.assign(&result?);
    }

    info!("{target} predictions done in {} ms", now.elapsed().as_millis());
    Ok(draws)
}
