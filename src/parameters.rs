use serde::{Deserialize, Serialize};

/// Tuning knobs shared by the typechecker, the compiler and the mechanism library
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    /// Relative precision of the scale search
    calibration_tolerance: f64,
    /// Bound on the number of privacy map evaluations during a scale search
    max_calibration_steps: usize,
    /// Largest histogram accepted by a `bin`
    max_categories: usize,
    /// Seed of the noise generator, fresh entropy when absent
    seed: Option<u64>,
}

impl Parameters {
    pub fn new(
        calibration_tolerance: f64,
        max_calibration_steps: usize,
        max_categories: usize,
        seed: Option<u64>,
    ) -> Parameters {
        Parameters {
            calibration_tolerance,
            max_calibration_steps,
            max_categories,
            seed,
        }
    }

    pub fn calibration_tolerance(&self) -> f64 {
        self.calibration_tolerance
    }

    pub fn max_calibration_steps(&self) -> usize {
        self.max_calibration_steps
    }

    pub fn max_categories(&self) -> usize {
        self.max_categories
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn with_calibration_tolerance(mut self, calibration_tolerance: f64) -> Self {
        self.calibration_tolerance = calibration_tolerance;
        self
    }

    pub fn with_max_calibration_steps(mut self, max_calibration_steps: usize) -> Self {
        self.max_calibration_steps = max_calibration_steps;
        self
    }

    pub fn with_max_categories(mut self, max_categories: usize) -> Self {
        self.max_categories = max_categories;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters::new(1e-9, 1024, 1 << 16, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json() {
        let parameters: Parameters = serde_json::from_str(r#"{"seed": 42}"#).unwrap();
        println!("parameters = {:?}", parameters);
        assert_eq!(parameters, Parameters::default().with_seed(42));
        assert_eq!(parameters.max_categories(), 65536);
    }
}
