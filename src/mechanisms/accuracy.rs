//! Accuracy bounds: the `a` such that the noise exceeds `a` in absolute value
//! with probability at most `alpha`

use statrs::distribution::{ContinuousCDF, Normal};

use super::{Error, Result};
use crate::query::Mechanism;

pub fn laplace(scale: f64, alpha: f64) -> f64 {
    scale * (1. / alpha).ln()
}

pub fn discrete_laplace(scale: f64, alpha: f64) -> f64 {
    if scale == 0. {
        return 0.;
    }
    (scale * (2. / (alpha * ((1. / scale).exp() + 1.))).ln() + 1.).max(0.)
}

pub fn gaussian(scale: f64, alpha: f64) -> Result<f64> {
    if scale == 0. {
        return Ok(0.);
    }
    Ok(scale * Normal::new(0., 1.)?.inverse_cdf(1. - alpha / 2.))
}

/// Above this scale the discrete tail is the continuous one, rounded up
const DISCRETE_GAUSSIAN_EXACT_SCALE: f64 = 1e4;

/// The smallest integer `a` with `P[|X| >= a] <= alpha`, from the normalised pmf
pub fn discrete_gaussian(scale: f64, alpha: f64) -> Result<f64> {
    if scale == 0. {
        return Ok(0.);
    }
    if scale > DISCRETE_GAUSSIAN_EXACT_SCALE {
        return Ok(gaussian(scale, alpha)?.ceil());
    }
    let sigma2 = scale * scale;
    let weight = |x: f64| (-x * x / (2. * sigma2)).exp();
    // Sum outward until the terms vanish against the running total
    let mut total = weight(0.);
    let mut cutoff = 1.;
    loop {
        let term = 2. * weight(cutoff);
        if term <= f64::EPSILON * total {
            break;
        }
        total += term;
        cutoff += 1.;
    }
    // Weight of |x| >= a
    let mut tail = total - weight(0.);
    let mut a = 1.;
    while tail > alpha * total && a < cutoff {
        tail -= 2. * weight(a);
        a += 1.;
    }
    Ok(a)
}

/// Dispatch on the noise distribution
pub fn scale_to_accuracy(scale: f64, alpha: f64, discrete: bool, mechanism: Mechanism) -> Result<f64> {
    if !(alpha > 0. && alpha < 1.) {
        return Err(Error::invalid_parameter(format!(
            "alpha must be in (0, 1), got {alpha}"
        )));
    }
    if !(scale.is_finite() && scale >= 0.) {
        return Err(Error::invalid_parameter(format!(
            "scale must be finite and non-negative, got {scale}"
        )));
    }
    match (discrete, mechanism) {
        (false, Mechanism::Laplace) => Ok(laplace(scale, alpha)),
        (true, Mechanism::Laplace) => Ok(discrete_laplace(scale, alpha)),
        (false, Mechanism::Gaussian) => gaussian(scale, alpha),
        (true, Mechanism::Gaussian) => discrete_gaussian(scale, alpha),
    }
}
