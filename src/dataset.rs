use crate::errors::{CalibError, Result};
use crate::parameters::Posterior;
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Training data of the calibration model: field measurements and simulator runs.
///
/// * `xf` (n, p) : field inputs
/// * `xc` (m, p) : simulator inputs
/// * `tc` (m, q) : simulator calibration settings, one row per simulator run
/// * `z` (n+m,) : field observations followed by simulator outputs
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(deserialize = "F: Deserialize<'de>"))
)]
pub struct TrainingSet<F: Float> {
    xf: Array2<F>,
    xc: Array2<F>,
    tc: Array2<F>,
    z: Array1<F>,
}

impl<F: Float> TrainingSet<F> {
    /// Constructor checking row and column consistency of the training arrays
    pub fn new(
        xf: &ArrayBase<impl Data<Elem = F>, Ix2>,
        xc: &ArrayBase<impl Data<Elem = F>, Ix2>,
        tc: &ArrayBase<impl Data<Elem = F>, Ix2>,
        z: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<Self> {
        if xf.nrows() == 0 {
            return Err(CalibError::DimensionMismatch(
                "at least one field observation is required".to_string(),
            ));
        }
        if xf.ncols() != xc.ncols() {
            return Err(CalibError::DimensionMismatch(format!(
                "field inputs `xf` have {} columns while simulator inputs `xc` have {}",
                xf.ncols(),
                xc.ncols()
            )));
        }
        if xc.nrows() != tc.nrows() {
            return Err(CalibError::DimensionMismatch(format!(
                "simulator inputs `xc` have {} rows while calibration settings `tc` have {}",
                xc.nrows(),
                tc.nrows()
            )));
        }
        if z.len() != xf.nrows() + xc.nrows() {
            return Err(CalibError::DimensionMismatch(format!(
                "responses `z` should have n+m={} values, got {}",
                xf.nrows() + xc.nrows(),
                z.len()
            )));
        }
        Ok(TrainingSet {
            xf: xf.to_owned(),
            xc: xc.to_owned(),
            tc: tc.to_owned(),
            z: z.to_owned(),
        })
    }

    /// Field inputs (n, p)
    pub fn xf(&self) -> &Array2<F> {
        &self.xf
    }

    /// Simulator inputs (m, p)
    pub fn xc(&self) -> &Array2<F> {
        &self.xc
    }

    /// Simulator calibration settings (m, q)
    pub fn tc(&self) -> &Array2<F> {
        &self.tc
    }

    /// Field observations followed by simulator outputs (n+m,)
    pub fn z(&self) -> &Array1<F> {
        &self.z
    }

    /// Number of field observations `n`
    pub fn n_field(&self) -> usize {
        self.xf.nrows()
    }

    /// Number of simulator runs `m`
    pub fn n_sim(&self) -> usize {
        self.xc.nrows()
    }

    /// Total number of training rows `n + m`
    pub fn n_train(&self) -> usize {
        self.z.len()
    }

    /// Number of controllable inputs `p`
    pub fn input_dim(&self) -> usize {
        self.xf.ncols()
    }

    /// Number of calibration inputs `q`
    pub fn calib_dim(&self) -> usize {
        self.tc.ncols()
    }

    /// Check the posterior draw dimensions against the training data
    pub fn check_posterior(&self, posterior: &Posterior<F>) -> Result<()> {
        if posterior.input_dim() != self.input_dim() {
            return Err(CalibError::DimensionMismatch(format!(
                "`beta_delta` has {} components while training inputs have {} columns",
                posterior.input_dim(),
                self.input_dim()
            )));
        }
        if posterior.calib_dim() != self.calib_dim() {
            return Err(CalibError::DimensionMismatch(format!(
                "`tf` has {} components while calibration settings `tc` have {} columns",
                posterior.calib_dim(),
                self.calib_dim()
            )));
        }
        Ok(())
    }

    /// Check query sites against the training inputs
    pub fn check_query(&self, x_star: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<()> {
        if x_star.nrows() == 0 {
            return Err(CalibError::DimensionMismatch(
                "at least one query site is required".to_string(),
            ));
        }
        if x_star.ncols() != self.input_dim() {
            return Err(CalibError::DimensionMismatch(format!(
                "query sites `x_star` have {} columns while training inputs have {}",
                x_star.ncols(),
                self.input_dim()
            )));
        }
        Ok(())
    }
}
