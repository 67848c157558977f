//! # Queries
//!
//! A query is an ordered list of [`Step`]s evaluated under a [`Budget`] and a [`PrivacyNotion`].
//! The wire shapes live in [`request`].
//!

pub mod request;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, hash::Hash};

use crate::value::Value;

pub use request::{AccuracyRequest, QueryRequest, RawMeasure, RawStep};

/// A privacy budget, a missing `delta` stands for `0`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    epsilon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delta: Option<f64>,
}

impl Budget {
    pub fn new(epsilon: f64) -> Budget {
        Budget {
            epsilon,
            delta: None,
        }
    }

    pub fn with_delta(mut self, delta: f64) -> Budget {
        self.delta = Some(delta);
        self
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn delta(&self) -> f64 {
        self.delta.unwrap_or(0.)
    }

    pub fn is_pure(&self) -> bool {
        self.delta() == 0.
    }
}

impl Hash for Budget {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Hash::hash(&self.epsilon.to_be_bytes(), state);
        Hash::hash(&self.delta().to_be_bytes(), state);
    }
}

impl Eq for Budget {}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(ε = {}, δ = {})", self.epsilon, self.delta())
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivacyNotion {
    PureDP,
    ApproxDP,
}

impl fmt::Display for PrivacyNotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivacyNotion::PureDP => write!(f, "PureDP"),
            PrivacyNotion::ApproxDP => write!(f, "ApproxDP"),
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mechanism {
    Laplace,
    #[serde(rename = "Gauss", alias = "Gaussian")]
    Gaussian,
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mechanism::Laplace => write!(f, "Laplace"),
            Mechanism::Gaussian => write!(f, "Gaussian"),
        }
    }
}

/// The column and mechanism of an aggregation
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Measure {
    pub column: String,
    pub mechanism: Mechanism,
}

impl Measure {
    pub fn new<S: Into<String>>(column: S, mechanism: Mechanism) -> Measure {
        Measure {
            column: column.into(),
            mechanism,
        }
    }
}

/// One operation of a query
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub enum Step {
    Select(Vec<String>),
    Filter(Vec<String>),
    Rename(BTreeMap<String, String>),
    Bin { column: String, bins: Vec<Value> },
    Count(Measure),
    Sum(Measure),
}

impl Step {
    pub fn select<S: Into<String>, I: IntoIterator<Item = S>>(columns: I) -> Step {
        Step::Select(columns.into_iter().map(S::into).collect())
    }

    pub fn filter<S: Into<String>, I: IntoIterator<Item = S>>(predicates: I) -> Step {
        Step::Filter(predicates.into_iter().map(S::into).collect())
    }

    pub fn rename<S: Into<String>, T: Into<String>, I: IntoIterator<Item = (S, T)>>(
        mapping: I,
    ) -> Step {
        Step::Rename(
            mapping
                .into_iter()
                .map(|(old, new)| (old.into(), new.into()))
                .collect(),
        )
    }

    pub fn bin<S: Into<String>, V: Into<Value>, I: IntoIterator<Item = V>>(
        column: S,
        bins: I,
    ) -> Step {
        Step::Bin {
            column: column.into(),
            bins: bins.into_iter().map(V::into).collect(),
        }
    }

    pub fn count<S: Into<String>>(column: S, mechanism: Mechanism) -> Step {
        Step::Count(Measure::new(column, mechanism))
    }

    pub fn sum<S: Into<String>>(column: S, mechanism: Mechanism) -> Step {
        Step::Sum(Measure::new(column, mechanism))
    }

    /// The operation name used on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Step::Select(_) => "select",
            Step::Filter(_) => "filter",
            Step::Rename(_) => "rename",
            Step::Bin { .. } => "bin",
            Step::Count(_) => "count",
            Step::Sum(_) => "sum",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Select(columns) => write!(f, "select({})", columns.iter().join(", ")),
            Step::Filter(predicates) => write!(f, "filter({})", predicates.iter().join(", ")),
            Step::Rename(mapping) => write!(
                f,
                "rename({})",
                mapping
                    .iter()
                    .map(|(old, new)| format!("{old} -> {new}"))
                    .join(", ")
            ),
            Step::Bin { column, bins } => write!(f, "bin({column}, [{}])", bins.iter().join(", ")),
            Step::Count(Measure { column, mechanism }) => write!(f, "count({column}, {mechanism})"),
            Step::Sum(Measure { column, mechanism }) => write!(f, "sum({column}, {mechanism})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget() {
        let pure: Budget = serde_json::from_str(r#"{"epsilon": 0.1}"#).unwrap();
        let zero: Budget = serde_json::from_str(r#"{"epsilon": 0.1, "delta": 0.0}"#).unwrap();
        println!("pure = {pure}, zero = {zero}");
        assert!(pure.is_pure() && zero.is_pure());
        assert_eq!(pure.delta(), zero.delta());
        assert!(!Budget::new(1.).with_delta(1e-6).is_pure());
    }

    #[test]
    fn test_mechanism_names() {
        let mechanisms: Vec<Mechanism> =
            serde_json::from_str(r#"["Laplace", "Gauss", "Gaussian"]"#).unwrap();
        assert_eq!(
            mechanisms,
            vec![Mechanism::Laplace, Mechanism::Gaussian, Mechanism::Gaussian]
        );
        assert_eq!(
            serde_json::to_string(&Mechanism::Gaussian).unwrap(),
            r#""Gauss""#
        );
    }

    #[test]
    fn test_display() {
        let steps = vec![
            Step::select(["age", "job"]),
            Step::filter(["age > 30"]),
            Step::rename([("job", "occupation")]),
            Step::bin("age", [10, 45]),
            Step::count("age", Mechanism::Laplace),
        ];
        println!("{}", steps.iter().join(" | "));
        assert_eq!(steps[3].to_string(), "bin(age, [10, 45])");
        assert_eq!(steps[4].name(), "count");
    }
}
