use egobox_calib::{
    flat_len, posteriors_from_rows, predict_ensemble, PredictionTarget, SamplingMethod,
    TrainingSet, EGOBOX_CALIB_LOG,
};
use env_logger::{Builder, Env};
use ndarray::{array, concatenate, s, Array, Array1, Array2, Axis};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::{Normal, Uniform};
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

/// Computer model of the physical process, `t` being the calibration input
fn xsint(x: &Array2<f64>, t: &Array2<f64>) -> Array1<f64> {
    let x = x.column(0);
    let t = t.column(0);
    (&x - &t) * (&x / std::f64::consts::PI).mapv(|v| v.sin())
}

fn main() {
    let env = Env::new().filter_or(EGOBOX_CALIB_LOG, "info");
    let mut builder = Builder::from_env(env);
    let builder = builder.target(env_logger::Target::Stdout);
    builder.try_init().ok();

    let mut rng = Xoshiro256Plus::seed_from_u64(42);

    // field measurements at the unknown true calibration t=3.5 with a linear bias
    let xf = array![[0.0], [5.0], [10.0], [15.0], [18.0], [20.0], [25.0]];
    let noise = Array::random_using(xf.nrows(), Normal::new(0., 0.1).unwrap(), &mut rng);
    let yf = xsint(&xf, &Array2::from_elem((xf.nrows(), 1), 3.5)) + xf.column(0).mapv(|v| 0.05 * v)
        + noise;

    // simulator runs over the (x, t) domain
    let xc = Array::random_using((40, 1), Uniform::new(0., 25.), &mut rng);
    let tc = Array::random_using((40, 1), Uniform::new(2., 5.), &mut rng);
    let yc = xsint(&xc, &tc);

    let z = concatenate![Axis(0), yf, yc];
    let training = TrainingSet::new(&xf, &xc, &tc, &z).expect("Training set");

    // posterior draws as given by a MCMC chain:
    // [tf, beta_eta (x, t), beta_delta, lambda_eta, lambda_delta, lambda_eps]
    let n_draws = 50;
    let mut chain = Array2::zeros((n_draws, flat_len(1, 1)));
    let tf = Array::random_using(n_draws, Normal::new(3.5, 0.2).unwrap(), &mut rng);
    chain.column_mut(0).assign(&tf);
    chain
        .slice_mut(s![.., 1..])
        .assign(&array![0.05, 0.5, 0.001, 0.05, 1., 100.]);
    let posteriors = posteriors_from_rows(&chain, 1, 1).expect("Posterior draws");

    let xtest = Array::linspace(0., 25., 26).insert_axis(Axis(1));
    for target in PredictionTarget::ALL {
        let draws = predict_ensemble(
            target,
            &posteriors,
            &training,
            &xtest,
            42,
            SamplingMethod::default(),
        )
        .expect("Ensemble prediction");
        let mean = draws.mean_axis(Axis(0)).expect("Non empty ensemble");
        let std = draws.std_axis(Axis(0), 1.);
        println!("{target} prediction (x, mean, std)");
        println!(
            "{}",
            concatenate![
                Axis(1),
                xtest,
                mean.insert_axis(Axis(1)),
                std.insert_axis(Axis(1))
            ]
        );
    }
}
