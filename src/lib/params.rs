use serde::{Serialize, Deserialize};

use crate::errors::Error;

/// Epidemiological parameters for one simulation run.
///
/// `beta` is the per-second probability that a transmission attempt during
/// contact succeeds. The latent period is log-normal with mode `l_mode` and
/// multiplicative dispersion `l_dispersion`; the infectious period is gamma
/// with shape `i_shape` and mode `i_mode`. `l_mode` and `i_mode` are in
/// hours; the simulation clock is in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameters {
    pub beta: f64,
    pub l_mode: f64,
    pub l_dispersion: f64,
    pub i_mode: f64,
    pub i_shape: f64,
    pub asymptomatic_proportion: f64,
}

impl Parameters {
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.beta >= 0.0 && self.beta < 1.0) {
            return Err(invalid("beta", "must satisfy 0 <= beta < 1"));
        }
        if !(self.l_mode > 0.0) {
            return Err(invalid("l_mode", "must be positive"));
        }
        if !(self.l_dispersion > 1.0) {
            return Err(invalid("l_dispersion", "must be greater than 1"));
        }
        if !(self.i_mode > 0.0) {
            return Err(invalid("i_mode", "must be positive"));
        }
        if !(self.i_shape > 1.0) {
            return Err(invalid("i_shape", "must be greater than 1"));
        }
        if !(self.asymptomatic_proportion >= 0.0 && self.asymptomatic_proportion <= 1.0) {
            return Err(invalid("asymptomatic_proportion", "must be in [0, 1]"));
        }
        Ok(())
    }

    /// `(mu, sigma)` of the underlying normal for the latent-period
    /// log-normal: `sigma = ln(l_dispersion)`, `mu = sigma^2 + ln(l_mode)`,
    /// which places the mode of the distribution at `l_mode`.
    pub fn latent_lognormal(&self) -> (f64, f64) {
        let sigma = self.l_dispersion.ln();
        let mu = sigma * sigma + self.l_mode.ln();
        (mu, sigma)
    }

    /// `(shape, scale)` of the infectious-period gamma. The scale
    /// `i_mode / (i_shape - 1)` places the mode of the distribution at
    /// `i_mode`; `validate` rejects `i_shape <= 1`.
    pub fn infectious_gamma(&self) -> (f64, f64) {
        (self.i_shape, self.i_mode / (self.i_shape - 1.0))
    }
}

fn invalid(name: &str, reason: &str) -> Error {
    Error::InvalidParameter {
        name: name.into(),
        reason: reason.into(),
    }
}
