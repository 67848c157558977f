//! # The mechanism library
//!
//! Aggregations with a known stability ([`Transformation`]), noise samplers, privacy maps,
//! scale calibration and accuracy bounds. The compiler only talks to it through
//! [`MechanismLibrary`].
//!

pub mod accuracy;
pub mod calibration;
pub mod measurement;
pub mod noise;
pub mod transformation;

use statrs::StatsError;
use std::{error, fmt, result};

use crate::{dataset, parameters::Parameters, query::Mechanism};

pub use measurement::{Measurement, Noise, PrivacyLoss};
pub use transformation::{Aggregate, Transformation};

// Error management

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    InvalidParameter(String),
    Calibration(String),
    Data(String),
    Other(String),
}

impl Error {
    pub fn invalid_parameter(desc: impl fmt::Display) -> Error {
        Error::InvalidParameter(desc.to_string())
    }
    pub fn calibration(desc: impl fmt::Display) -> Error {
        Error::Calibration(desc.to_string())
    }
    pub fn other(desc: impl fmt::Display) -> Error {
        Error::Other(desc.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidParameter(desc) => write!(f, "InvalidParameter: {}", desc),
            Error::Calibration(desc) => write!(f, "Calibration: {}", desc),
            Error::Data(desc) => write!(f, "Data: {}", desc),
            Error::Other(desc) => write!(f, "{}", desc),
        }
    }
}

impl error::Error for Error {}

impl From<dataset::Error> for Error {
    fn from(err: dataset::Error) -> Self {
        Error::Data(err.to_string())
    }
}

impl From<StatsError> for Error {
    fn from(err: StatsError) -> Self {
        Error::InvalidParameter(err.to_string())
    }
}

pub type Result<T> = result::Result<T, Error>;

/// What the compiler needs from a differential privacy library
pub trait MechanismLibrary {
    /// Chain a transformation with a noise mechanism at a given scale
    fn add_noise(
        &self,
        transformation: Transformation,
        mechanism: Mechanism,
        discrete: bool,
        scale: f64,
    ) -> Result<Measurement>;

    /// The smallest scale whose privacy loss at distance `d_in` fits in `target`
    fn calibrate_scale(
        &self,
        make_chain: &dyn Fn(f64) -> Result<Measurement>,
        d_in: f64,
        target: &PrivacyLoss,
    ) -> Result<f64>;

    /// The bound the noise stays under with probability `1 - alpha`
    fn scale_to_accuracy(
        &self,
        scale: f64,
        alpha: f64,
        discrete: bool,
        mechanism: Mechanism,
    ) -> Result<f64>;
}

/// The built-in library
#[derive(Clone, Debug, Default)]
pub struct Library {
    parameters: Parameters,
}

impl Library {
    pub fn new(parameters: Parameters) -> Self {
        Library { parameters }
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }
}

impl MechanismLibrary for Library {
    fn add_noise(
        &self,
        transformation: Transformation,
        mechanism: Mechanism,
        discrete: bool,
        scale: f64,
    ) -> Result<Measurement> {
        Ok(Measurement::new(
            transformation,
            Noise::new(mechanism, discrete, scale)?,
        ))
    }

    fn calibrate_scale(
        &self,
        make_chain: &dyn Fn(f64) -> Result<Measurement>,
        d_in: f64,
        target: &PrivacyLoss,
    ) -> Result<f64> {
        calibration::binary_search_scale(
            |scale| make_chain(scale)?.privacy_loss(d_in)?.within(target),
            self.parameters.calibration_tolerance(),
            self.parameters.max_calibration_steps(),
        )
    }

    fn scale_to_accuracy(
        &self,
        scale: f64,
        alpha: f64,
        discrete: bool,
        mechanism: Mechanism,
    ) -> Result<f64> {
        accuracy::scale_to_accuracy(scale, alpha, discrete, mechanism)
    }
}
