//! Noise samplers. A scale of `0` always samples `0`.

use rand::{
    distributions::{Distribution, Uniform},
    Rng, RngCore,
};
use statrs::distribution::Normal;

use super::Result;

/// Laplace noise by inverse CDF:
/// `X = -b * sgn(U) * ln(1 - 2|U|)` where `U ~ Uniform(-0.5, 0.5)`
pub fn laplace(scale: f64, rng: &mut dyn RngCore) -> f64 {
    if scale == 0. {
        return 0.;
    }
    let uniform = Uniform::new(-0.5, 0.5);
    loop {
        let u: f64 = uniform.sample(rng);
        let noise = -scale * u.signum() * (1.0 - 2.0 * u.abs()).ln();
        if noise.is_finite() {
            return noise;
        }
    }
}

/// Number of failures before a success of probability `1 - exp(-1/scale)`
fn geometric(scale: f64, rng: &mut dyn RngCore) -> i64 {
    let u = 1. - rng.gen::<f64>();
    (-scale * u.ln()).floor() as i64
}

/// Discrete Laplace noise, `P(X = x) ∝ exp(-|x| / scale)`,
/// as the difference of two geometric variables
pub fn discrete_laplace(scale: f64, rng: &mut dyn RngCore) -> i64 {
    if scale == 0. {
        return 0;
    }
    geometric(scale, rng).saturating_sub(geometric(scale, rng))
}

pub fn gaussian(scale: f64, rng: &mut dyn RngCore) -> Result<f64> {
    if scale == 0. {
        return Ok(0.);
    }
    Ok(Normal::new(0., scale)?.sample(rng))
}

/// Discrete Gaussian noise, `P(X = x) ∝ exp(-x² / 2σ²)`,
/// by rejection from a discrete Laplace (Canonne, Kamath, Steinke 2020)
pub fn discrete_gaussian(scale: f64, rng: &mut dyn RngCore) -> i64 {
    if scale == 0. {
        return 0;
    }
    let sigma2 = scale * scale;
    let t = scale.floor() + 1.;
    loop {
        let y = discrete_laplace(t, rng);
        let d = (y.unsigned_abs() as f64 - sigma2 / t).powi(2) / (2. * sigma2);
        if rng.gen_bool((-d).exp()) {
            return y;
        }
    }
}
