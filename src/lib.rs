//! This library implements posterior predictive sampling of the
//! [Kennedy-O'Hagan](https://doi.org/10.1111/1467-9868.00294) Bayesian calibration model of computer codes.
//!
//! Field observations `y(x)` are modeled as the simulator response at unknown calibration
//! inputs `t` plus a model discrepancy and an observation noise:
//!
//! ```text
//! y(x) = eta(x, t) + delta(x) + eps
//! ```
//!
//! where `eta` and `delta` are zero-mean gaussian processes sharing the same [covariance form](covariance)
//! and `eps` is a white noise with precision `lambda_eps`.
//!
//! Given field data, simulator runs and one posterior draw of the hyperparameters ([Posterior]),
//! [KohPredictor] conditions the joint gaussian process on the training responses and computes
//! the [predictive distribution](PredictiveDistribution) at new query sites for one of the
//! [prediction targets](PredictionTarget):
//! * the field response (`Full`),
//! * the noise-free field response (`Combined`),
//! * the simulator response alone (`Response`),
//! * the discrepancy alone (`Discrepancy`).
//!
//! Realizations are drawn from the predictive distributions, and [predict_ensemble] repeats
//! the computation over a chain of posterior draws in parallel to propagate calibration uncertainty.
//!
//! Logging uses the [log](https://docs.rs/log) facade, set `EGOBOX_CALIB_LOG` level
//! (see [EGOBOX_CALIB_LOG]) when using an `env_logger` based logger.
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
pub mod assembly;
mod dataset;
mod errors;
mod kernel;
mod parameters;
mod sampling;
mod utils;

pub use algorithm::*;
pub use dataset::*;
pub use errors::*;
pub use kernel::*;
pub use parameters::*;
pub use sampling::*;
pub use utils::{augment, differences};

/// Environment variable name used to set the logging level of the calibration examples
pub const EGOBOX_CALIB_LOG: &str = "EGOBOX_CALIB_LOG";
