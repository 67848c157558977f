//! Measurements: a transformation followed by noise, with its privacy map

use rand::RngCore;
use std::fmt;

use super::{noise, transformation::Aggregate, Error, Result, Transformation};
use crate::{dataset::Dataset, query::Mechanism};

/// A privacy loss in the measure of a mechanism
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PrivacyLoss {
    /// ε-differential privacy
    Pure(f64),
    /// ρ-zero-concentrated differential privacy
    Concentrated(f64),
    /// (ε, δ)-differential privacy
    Approximate(f64, f64),
}

impl PrivacyLoss {
    /// Whether this loss is covered by `target`
    pub fn within(&self, target: &PrivacyLoss) -> Result<bool> {
        match (self, target) {
            (PrivacyLoss::Pure(epsilon), PrivacyLoss::Pure(max_epsilon))
            | (PrivacyLoss::Pure(epsilon), PrivacyLoss::Approximate(max_epsilon, _)) => {
                Ok(epsilon <= max_epsilon)
            }
            (PrivacyLoss::Concentrated(rho), PrivacyLoss::Concentrated(max_rho)) => {
                Ok(rho <= max_rho)
            }
            (
                PrivacyLoss::Approximate(epsilon, delta),
                PrivacyLoss::Approximate(max_epsilon, max_delta),
            ) => Ok(epsilon <= max_epsilon && delta <= max_delta),
            (loss, target) => Err(Error::invalid_parameter(format!(
                "{loss} cannot be compared to {target}"
            ))),
        }
    }
}

impl fmt::Display for PrivacyLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivacyLoss::Pure(epsilon) => write!(f, "ε = {epsilon}"),
            PrivacyLoss::Concentrated(rho) => write!(f, "ρ = {rho}"),
            PrivacyLoss::Approximate(epsilon, delta) => write!(f, "(ε = {epsilon}, δ = {delta})"),
        }
    }
}

/// ε of the (ε, δ)-DP guarantee implied by ρ-zCDP
pub fn cdp_epsilon(rho: f64, delta: f64) -> f64 {
    if rho == 0. {
        0.
    } else if delta <= 0. {
        f64::INFINITY
    } else {
        rho + 2. * (rho * (1. / delta).ln()).sqrt()
    }
}

/// A noise distribution at a fixed scale
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Noise {
    mechanism: Mechanism,
    discrete: bool,
    scale: f64,
}

impl Noise {
    pub fn new(mechanism: Mechanism, discrete: bool, scale: f64) -> Result<Self> {
        if !(scale.is_finite() && scale >= 0.) {
            return Err(Error::invalid_parameter(format!(
                "scale must be finite and non-negative, got {scale}"
            )));
        }
        Ok(Noise {
            mechanism,
            discrete,
            scale,
        })
    }

    pub fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    pub fn discrete(&self) -> bool {
        self.discrete
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Laplace noise is ε-DP, Gaussian noise is ρ-zCDP
    pub fn privacy_loss(&self, sensitivity: f64) -> PrivacyLoss {
        let ratio = if sensitivity == 0. {
            0.
        } else {
            sensitivity / self.scale
        };
        match self.mechanism {
            Mechanism::Laplace => PrivacyLoss::Pure(ratio),
            Mechanism::Gaussian => PrivacyLoss::Concentrated(ratio * ratio / 2.),
        }
    }

    fn sample_integer(&self, rng: &mut dyn RngCore) -> i64 {
        match self.mechanism {
            Mechanism::Laplace => noise::discrete_laplace(self.scale, rng),
            Mechanism::Gaussian => noise::discrete_gaussian(self.scale, rng),
        }
    }

    fn sample_float(&self, rng: &mut dyn RngCore) -> Result<f64> {
        match self.mechanism {
            Mechanism::Laplace => Ok(noise::laplace(self.scale, rng)),
            Mechanism::Gaussian => noise::gaussian(self.scale, rng),
        }
    }

    pub fn perturb(&self, aggregate: Aggregate, rng: &mut dyn RngCore) -> Result<Aggregate> {
        Ok(match (aggregate, self.discrete) {
            (Aggregate::Integer(value), true) => {
                Aggregate::Integer(value.saturating_add(self.sample_integer(rng)))
            }
            (Aggregate::Integer(value), false) => {
                Aggregate::Float(value as f64 + self.sample_float(rng)?)
            }
            (Aggregate::Float(value), true) => {
                Aggregate::Float(value + self.sample_integer(rng) as f64)
            }
            (Aggregate::Float(value), false) => Aggregate::Float(value + self.sample_float(rng)?),
            (Aggregate::Counts(counts), true) => Aggregate::Counts(
                counts
                    .into_iter()
                    .map(|count| count.saturating_add(self.sample_integer(rng)))
                    .collect(),
            ),
            (Aggregate::Counts(_), false) => {
                return Err(Error::invalid_parameter(
                    "histogram counts require discrete noise",
                ))
            }
        })
    }
}

impl fmt::Display for Noise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.discrete { "discrete " } else { "" };
        write!(f, "{kind}{}(scale = {})", self.mechanism, self.scale)
    }
}

/// A transformation chained with noise.
/// Gaussian measurements may be converted to (ε, δ)-DP by fixing δ.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    transformation: Transformation,
    noise: Noise,
    fixed_delta: Option<f64>,
}

impl Measurement {
    pub fn new(transformation: Transformation, noise: Noise) -> Self {
        Measurement {
            transformation,
            noise,
            fixed_delta: None,
        }
    }

    pub fn transformation(&self) -> &Transformation {
        &self.transformation
    }

    pub fn noise(&self) -> &Noise {
        &self.noise
    }

    /// Express the zCDP guarantee as (ε, δ)-DP for this δ
    pub fn fix_delta(mut self, delta: f64) -> Result<Self> {
        if self.noise.mechanism() != Mechanism::Gaussian {
            return Err(Error::invalid_parameter(format!(
                "cannot fix delta of {}",
                self.noise
            )));
        }
        if !(delta > 0. && delta < 1.) {
            return Err(Error::invalid_parameter(format!(
                "delta must be in (0, 1), got {delta}"
            )));
        }
        self.fixed_delta = Some(delta);
        Ok(self)
    }

    /// The privacy loss when input datasets differ by `d_in` rows
    pub fn privacy_loss(&self, d_in: f64) -> Result<PrivacyLoss> {
        let loss = self.noise.privacy_loss(self.transformation.stability(d_in));
        match (loss, self.fixed_delta) {
            (loss, None) => Ok(loss),
            (PrivacyLoss::Concentrated(rho), Some(delta)) => {
                Ok(PrivacyLoss::Approximate(cdp_epsilon(rho, delta), delta))
            }
            (loss, Some(_)) => Err(Error::invalid_parameter(format!(
                "{loss} cannot be converted to approximate differential privacy"
            ))),
        }
    }

    /// Run the transformation on the data and add noise
    pub fn invoke(&self, data: &Dataset, rng: &mut dyn RngCore) -> Result<Aggregate> {
        let aggregate = self.transformation.apply(data)?;
        self.noise.perturb(aggregate, rng)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} + {}", self.transformation, self.noise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_privacy_maps() {
        let count = Transformation::count("age");
        let laplace = Measurement::new(count.clone(), Noise::new(Mechanism::Laplace, true, 4.).unwrap());
        assert_eq!(laplace.privacy_loss(1.).unwrap(), PrivacyLoss::Pure(0.25));
        let gaussian = Measurement::new(count, Noise::new(Mechanism::Gaussian, true, 2.).unwrap());
        assert_eq!(gaussian.privacy_loss(1.).unwrap(), PrivacyLoss::Concentrated(0.125));
        let approximate = gaussian.fix_delta(1e-5).unwrap();
        let loss = approximate.privacy_loss(1.).unwrap();
        println!("loss = {loss}");
        assert_eq!(
            loss,
            PrivacyLoss::Approximate(0.125 + 2. * (0.125 * 1e5f64.ln()).sqrt(), 1e-5)
        );
        assert!(laplace.fix_delta(1e-5).is_err());
    }

    #[test]
    fn test_within() {
        assert!(PrivacyLoss::Pure(0.1).within(&PrivacyLoss::Pure(0.1)).unwrap());
        assert!(!PrivacyLoss::Pure(0.2).within(&PrivacyLoss::Pure(0.1)).unwrap());
        assert!(PrivacyLoss::Pure(0.1)
            .within(&PrivacyLoss::Approximate(0.1, 0.))
            .unwrap());
        assert!(PrivacyLoss::Concentrated(0.1)
            .within(&PrivacyLoss::Pure(1.))
            .is_err());
    }

    #[test]
    fn test_invoke() {
        let data = Dataset::new(
            vec!["age".to_string()],
            (0..100).map(|i| vec![i.into()]).collect(),
        )
        .unwrap();
        let measurement = Measurement::new(
            Transformation::count("age"),
            Noise::new(Mechanism::Laplace, true, 1.).unwrap(),
        );
        let mut rng = StdRng::seed_from_u64(42);
        let first = measurement.invoke(&data, &mut rng).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        assert_eq!(measurement.invoke(&data, &mut rng).unwrap(), first);
        match first {
            Aggregate::Integer(count) => assert!((count - 100).abs() < 30),
            aggregate => panic!("unexpected {aggregate:?}"),
        }
        assert!(Noise::new(Mechanism::Laplace, true, -1.).is_err());
    }
}
