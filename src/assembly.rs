//! Covariance blocks of the calibration model.
//!
//! Training rows are field observations (n) followed by simulator runs (m).
//! Each row is augmented with calibration inputs: the posterior `tf` for field rows
//! and query sites, the run settings `tc` for simulator rows.
//! The joint covariance of the training responses is
//!
//! ```text
//!        | eta(XTf, XTf) + delta(xf, xf) + I/lambda_eps   eta(XTf, XTc) |
//! Sz  =  |                                                              |
//!        | eta(XTc, XTf)                                  eta(XTc, XTc) |
//! ```
//!
//! and does not depend on the prediction target.

use crate::dataset::TrainingSet;
use crate::parameters::{Posterior, PredictionTarget};
use crate::utils::augment;
use linfa::Float;
use ndarray::{s, Array2, ArrayBase, Data, Ix2};

/// Training inputs augmented with calibration inputs, a (n+m, p+q) matrix
#[derive(Clone, Debug)]
pub struct AugmentedDesign<F: Float> {
    xt: Array2<F>,
    n_field: usize,
}

impl<F: Float> AugmentedDesign<F> {
    /// Stack `[xf | tf]` over `[xc | tc]`
    pub fn new(training: &TrainingSet<F>, posterior: &Posterior<F>) -> Self {
        let (n, p) = (training.n_field(), training.input_dim());
        let mut xt = Array2::zeros((training.n_train(), p + training.calib_dim()));
        xt.slice_mut(s![..n, ..]).assign(&augment(training.xf(), posterior.tf()));
        xt.slice_mut(s![n.., ..p]).assign(training.xc());
        xt.slice_mut(s![n.., p..]).assign(training.tc());
        AugmentedDesign { xt, n_field: n }
    }

    /// Augmented training inputs
    pub fn data(&self) -> &Array2<F> {
        &self.xt
    }

    /// Number of leading field rows
    pub fn n_field(&self) -> usize {
        self.n_field
    }
}

/// Covariance blocks depending on the prediction target
#[derive(Clone, Debug)]
pub struct TargetBlocks<F: Float> {
    /// Cross-covariance between training rows and query sites (n+m, n_star)
    pub cross: Array2<F>,
    /// Prior covariance at query sites (n_star, n_star)
    pub prior: Array2<F>,
}

/// Joint covariance of the training responses (n+m, n+m)
pub fn joint_covariance<F: Float>(
    posterior: &Posterior<F>,
    training: &TrainingSet<F>,
    design: &AugmentedDesign<F>,
) -> Array2<F> {
    let n = design.n_field();
    let noise = posterior.noise_variance();
    let mut sigma_z = posterior.eta_kernel().compute_self(design.data());
    let mut field = sigma_z.slice_mut(s![..n, ..n]);
    field += &posterior.delta_kernel().compute_self(training.xf());
    field.diag_mut().mapv_inplace(|v| v + noise);
    sigma_z
}

/// Cross-covariance and prior covariance of `target` at query sites `x_star` (n_star, p)
pub fn target_blocks<F: Float>(
    target: PredictionTarget,
    posterior: &Posterior<F>,
    training: &TrainingSet<F>,
    design: &AugmentedDesign<F>,
    x_star: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> TargetBlocks<F> {
    let n = design.n_field();
    let n_star = x_star.nrows();

    let (mut cross, mut prior) = if target.includes_response() {
        let eta = posterior.eta_kernel();
        let xt_star = augment(x_star, posterior.tf());
        (
            eta.compute(design.data(), &xt_star),
            eta.compute_self(&xt_star),
        )
    } else {
        (
            Array2::zeros((design.data().nrows(), n_star)),
            Array2::zeros((n_star, n_star)),
        )
    };

    // discrepancy only exists at field locations, simulator rows get nothing
    if target.includes_discrepancy() {
        let delta = posterior.delta_kernel();
        let mut field = cross.slice_mut(s![..n, ..]);
        field += &delta.compute(training.xf(), x_star);
        prior += &delta.compute_self(x_star);
    }

    if target.includes_noise() {
        let noise = posterior.noise_variance();
        prior.diag_mut().mapv_inplace(|v| v + noise);
    }

    TargetBlocks { cross, prior }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::PosteriorParams;
    use approx::assert_abs_diff_eq;
    use linfa::ParamGuard;
    use ndarray::{array, Array};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use paste::paste;
    use rand_xoshiro::Xoshiro256Plus;

    fn posterior() -> Posterior<f64> {
        PosteriorParams::new(&array![0.3], &array![1., 2.], &array![0.5])
            .lambda_eta(2.)
            .lambda_delta(4.)
            .lambda_eps(10.)
            .check()
            .unwrap()
    }

    fn training(seed: u64) -> TrainingSet<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let xf = Array::random_using((3, 1), Uniform::new(0., 1.), &mut rng);
        let xc = Array::random_using((4, 1), Uniform::new(0., 1.), &mut rng);
        let tc = Array::random_using((4, 1), Uniform::new(-1., 1.), &mut rng);
        let z = Array::random_using(7, Uniform::new(0., 1.), &mut rng);
        TrainingSet::new(&xf, &xc, &tc, &z).unwrap()
    }

    #[test]
    fn test_augmented_design() {
        let ts = TrainingSet::new(
            &array![[0.], [1.]],
            &array![[0.5]],
            &array![[-1.]],
            &array![1., 2., 1.5],
        )
        .unwrap();
        let design = AugmentedDesign::new(&ts, &posterior());
        assert_eq!(&array![[0., 0.3], [1., 0.3], [0.5, -1.]], design.data());
        assert_eq!(2, design.n_field());
    }

    #[test]
    fn test_joint_covariance() {
        let post = posterior();
        let ts = training(42);
        let design = AugmentedDesign::new(&ts, &post);
        let sigma_z = joint_covariance(&post, &ts, &design);
        let eta = post.eta_kernel().compute_self(design.data());
        let delta = post.delta_kernel().compute_self(ts.xf());

        assert_eq!((7, 7), sigma_z.dim());
        assert_abs_diff_eq!(sigma_z, sigma_z.t(), epsilon = 1e-15);
        // field diagonal: eta + delta + noise variances
        for i in 0..3 {
            assert_abs_diff_eq!(sigma_z[[i, i]], 0.5 + 0.25 + 0.1, epsilon = 1e-15);
        }
        assert_abs_diff_eq!(
            sigma_z.slice(s![..3, ..3]),
            &eta.slice(s![..3, ..3]) + &delta + Array2::<f64>::eye(3) * 0.1,
            epsilon = 1e-15
        );
        // simulator rows only carry the response process
        assert_eq!(sigma_z.slice(s![3.., ..]), eta.slice(s![3.., ..]));
        assert_eq!(sigma_z.slice(s![..3, 3..]), eta.slice(s![..3, 3..]));
    }

    #[test]
    fn test_discrepancy_ignores_simulator_rows() {
        let post = posterior();
        let x_star = array![[0.1], [0.4], [0.9]];
        for seed in [0, 1, 2] {
            let ts = training(seed);
            let design = AugmentedDesign::new(&ts, &post);
            let blocks = target_blocks(PredictionTarget::Discrepancy, &post, &ts, &design, &x_star);
            assert_eq!(Array2::<f64>::zeros((4, 3)), blocks.cross.slice(s![3.., ..]));
            assert_eq!(
                post.delta_kernel().compute(ts.xf(), &x_star),
                blocks.cross.slice(s![..3, ..])
            );
            assert_eq!(post.delta_kernel().compute_self(&x_star), blocks.prior);
        }
    }

    #[test]
    fn test_full_and_combined_share_cross_covariance() {
        let post = posterior();
        let ts = training(7);
        let design = AugmentedDesign::new(&ts, &post);
        let x_star = array![[0.2], [0.6]];
        let full = target_blocks(PredictionTarget::Full, &post, &ts, &design, &x_star);
        let comb = target_blocks(PredictionTarget::Combined, &post, &ts, &design, &x_star);
        let resp = target_blocks(PredictionTarget::Response, &post, &ts, &design, &x_star);
        let disc = target_blocks(PredictionTarget::Discrepancy, &post, &ts, &design, &x_star);

        assert_eq!(full.cross, comb.cross);
        assert_abs_diff_eq!(full.cross, &resp.cross + &disc.cross, epsilon = 1e-15);
        assert_abs_diff_eq!(comb.prior, &resp.prior + &disc.prior, epsilon = 1e-15);
        assert_abs_diff_eq!(
            full.prior - comb.prior,
            Array2::<f64>::eye(2) * 0.1,
            epsilon = 1e-15
        );
    }

    macro_rules! test_target_shapes {
        ($target:ident) => {
            paste! {
                #[test]
                fn [<test_ $target:snake _block_shapes>]() {
                    let post = posterior();
                    let ts = training(3);
                    let design = AugmentedDesign::new(&ts, &post);
                    let x_star = array![[0.2], [0.6], [0.3], [0.8], [1.0]];
                    let blocks = target_blocks(PredictionTarget::$target, &post, &ts, &design, &x_star);
                    assert_eq!((7, 5), blocks.cross.dim());
                    assert_eq!((5, 5), blocks.prior.dim());
                    assert_abs_diff_eq!(blocks.prior, blocks.prior.t(), epsilon = 1e-15);
                }
            }
        };
    }

    test_target_shapes!(Full);
    test_target_shapes!(Combined);
    test_target_shapes!(Response);
    test_target_shapes!(Discrepancy);
}
