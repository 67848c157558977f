//! Wire shapes of queries, as sent by clients.
//!
//! A [`RawStep`] is an object with one optional field per operation name,
//! exactly one of which must be set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Budget, Measure, Mechanism, PrivacyNotion, Step};
use crate::{
    dataset::provider::DatasetId,
    grammar::{Error, Result},
    schema::{ColumnSchema, Schema},
    value::Value,
};

/// Parameters of `count` and `sum`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMeasure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mech: Option<Mechanism>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawStep {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin: Option<BTreeMap<String, Vec<Value>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<RawMeasure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sum: Option<RawMeasure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groupby: Option<serde_json::Value>,
}

impl RawStep {
    /// The names of the populated operations
    pub fn operations(&self) -> Vec<&'static str> {
        [
            ("select", self.select.is_some()),
            ("filter", self.filter.is_some()),
            ("rename", self.rename.is_some()),
            ("map", self.map.is_some()),
            ("bin", self.bin.is_some()),
            ("count", self.count.is_some()),
            ("min", self.min.is_some()),
            ("max", self.max.is_some()),
            ("sum", self.sum.is_some()),
            ("mean", self.mean.is_some()),
            ("groupby", self.groupby.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, populated)| populated.then_some(name))
        .collect()
    }
}

impl TryFrom<RawMeasure> for Measure {
    type Error = Error;

    fn try_from(raw: RawMeasure) -> Result<Self> {
        match raw {
            RawMeasure {
                column: Some(column),
                mech: Some(mechanism),
            } => Ok(Measure { column, mechanism }),
            RawMeasure { column: None, .. } => Err(Error::format("measurement expects a column")),
            RawMeasure { mech: None, .. } => Err(Error::format("measurement expects a mech")),
        }
    }
}

impl TryFrom<RawStep> for Step {
    type Error = Error;

    fn try_from(raw: RawStep) -> Result<Self> {
        let operations = raw.operations();
        let operation = match operations.as_slice() {
            [operation] => *operation,
            [] => return Err(Error::format("a query step must carry one operation, found none")),
            operations => {
                return Err(Error::format(format!(
                    "a query step must carry one operation, found {}",
                    operations.join(", ")
                )))
            }
        };
        match raw {
            RawStep {
                select: Some(columns),
                ..
            } => Ok(Step::Select(columns)),
            RawStep {
                filter: Some(predicates),
                ..
            } => Ok(Step::Filter(predicates)),
            RawStep {
                rename: Some(mapping),
                ..
            } => Ok(Step::Rename(mapping)),
            RawStep { bin: Some(bin), .. } => {
                if bin.len() != 1 {
                    return Err(Error::format(format!(
                        "bin expects exactly one column, found {}",
                        bin.len()
                    )));
                }
                let (column, bins) = bin
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::format("bin expects exactly one column"))?;
                Ok(Step::Bin { column, bins })
            }
            RawStep {
                count: Some(measure),
                ..
            } => Ok(Step::Count(measure.try_into()?)),
            RawStep {
                sum: Some(measure), ..
            } => Ok(Step::Sum(measure.try_into()?)),
            _ => Err(Error::unsupported(format!(
                "{operation} is not a supported operation"
            ))),
        }
    }
}

impl From<Step> for RawStep {
    fn from(step: Step) -> Self {
        let measure = |Measure { column, mechanism }| RawMeasure {
            column: Some(column),
            mech: Some(mechanism),
        };
        match step {
            Step::Select(columns) => RawStep {
                select: Some(columns),
                ..RawStep::default()
            },
            Step::Filter(predicates) => RawStep {
                filter: Some(predicates),
                ..RawStep::default()
            },
            Step::Rename(mapping) => RawStep {
                rename: Some(mapping),
                ..RawStep::default()
            },
            Step::Bin { column, bins } => RawStep {
                bin: Some(BTreeMap::from([(column, bins)])),
                ..RawStep::default()
            },
            Step::Count(m) => RawStep {
                count: Some(measure(m)),
                ..RawStep::default()
            },
            Step::Sum(m) => RawStep {
                sum: Some(measure(m)),
                ..RawStep::default()
            },
        }
    }
}

#[derive(Deserialize)]
struct WireQuery {
    budget: Budget,
    query: Vec<RawStep>,
    privacy_notion: PrivacyNotion,
    dataset: DatasetId,
    schema: Vec<ColumnSchema>,
}

#[derive(Deserialize)]
struct WireAccuracy {
    #[serde(flatten)]
    query: WireQuery,
    confidence: f64,
}

/// A query against a dataset
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueryRequest {
    pub budget: Budget,
    pub query: Vec<Step>,
    pub privacy_notion: PrivacyNotion,
    pub dataset: DatasetId,
    pub schema: Vec<ColumnSchema>,
}

impl QueryRequest {
    /// Parse a request, keeping the kind of step errors
    pub fn from_json(json: &str) -> Result<Self> {
        let wire: WireQuery = serde_json::from_str(json).map_err(Error::format)?;
        QueryRequest::try_from(wire)
    }

    /// The canonical schema of the dataset
    pub fn schema(&self) -> Result<Schema> {
        Schema::new(self.schema.clone()).map_err(Error::format)
    }
}

impl TryFrom<WireQuery> for QueryRequest {
    type Error = Error;

    fn try_from(wire: WireQuery) -> Result<Self> {
        Ok(QueryRequest {
            budget: wire.budget,
            query: wire
                .query
                .into_iter()
                .map(Step::try_from)
                .collect::<Result<Vec<_>>>()?,
            privacy_notion: wire.privacy_notion,
            dataset: wire.dataset,
            schema: wire.schema,
        })
    }
}

/// A query together with the confidence level of the accuracy bound
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AccuracyRequest {
    #[serde(flatten)]
    pub query: QueryRequest,
    pub confidence: f64,
}

impl AccuracyRequest {
    pub fn new(query: QueryRequest, confidence: f64) -> Result<Self> {
        if !(confidence > 0. && confidence < 1.) {
            return Err(Error::format(format!(
                "confidence must be in (0, 1), got {confidence}"
            )));
        }
        Ok(AccuracyRequest { query, confidence })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let wire: WireAccuracy = serde_json::from_str(json).map_err(Error::format)?;
        AccuracyRequest::new(QueryRequest::try_from(wire.query)?, wire.confidence)
    }

    /// The tail probability of the accuracy bound
    pub fn alpha(&self) -> f64 {
        1. - self.confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{grammar::ErrorKind, schema::ColumnType};

    const REQUEST: &str = r#"{
        "budget": {"epsilon": 0.1},
        "query": [
            {"select": ["age", "job"]},
            {"filter": ["age > 30"]},
            {"bin": {"age": [10, 45]}},
            {"count": {"column": "age", "mech": "Laplace"}}
        ],
        "privacy_notion": "PureDP",
        "dataset": 7,
        "schema": [
            {"name": "age", "type": {"name": "Int", "low": 18, "high": 90}},
            {"name": "job", "type": {"name": "Text"}}
        ]
    }"#;

    #[test]
    fn test_query_request() {
        let request = QueryRequest::from_json(REQUEST).unwrap();
        println!("request = {:?}", request);
        assert_eq!(request.dataset, 7);
        assert_eq!(
            request.query,
            vec![
                Step::select(["age", "job"]),
                Step::filter(["age > 30"]),
                Step::bin("age", [10, 45]),
                Step::count("age", Mechanism::Laplace),
            ]
        );
        assert_eq!(
            request.schema().unwrap().column_type("age").unwrap(),
            &ColumnType::int(18, 90)
        );
    }

    #[test]
    fn test_step_shapes() {
        let parse = |json: &str| {
            serde_json::from_str::<RawStep>(json)
                .map_err(Error::format)
                .and_then(Step::try_from)
        };
        assert_eq!(
            parse(r#"{"sum": {"column": "income", "mech": "Gauss"}}"#).unwrap(),
            Step::sum("income", Mechanism::Gaussian)
        );
        assert_eq!(parse("{}").unwrap_err().kind(), ErrorKind::Format);
        assert_eq!(
            parse(r#"{"select": ["a"], "filter": ["a > 1"]}"#)
                .unwrap_err()
                .kind(),
            ErrorKind::Format
        );
        assert_eq!(
            parse(r#"{"bin": {"a": [1, 2], "b": [true]}}"#)
                .unwrap_err()
                .kind(),
            ErrorKind::Format
        );
        assert_eq!(
            parse(r#"{"count": {"column": "a"}}"#).unwrap_err().kind(),
            ErrorKind::Format
        );
        assert_eq!(
            parse(r#"{"mean": {"column": "a", "mech": "Laplace"}}"#)
                .unwrap_err()
                .kind(),
            ErrorKind::Unsupported
        );
    }

    #[test]
    fn test_step_serde() {
        let step = Step::bin("married", [true, false]);
        let json = serde_json::to_string(&step).unwrap();
        println!("json = {json}");
        assert_eq!(json, r#"{"bin":{"married":[true,false]}}"#);
        assert_eq!(serde_json::from_str::<Step>(&json).unwrap(), step);
    }

    #[test]
    fn test_accuracy_request() {
        let json = REQUEST.trim_end().trim_end_matches('}').to_string() + r#", "confidence": 0.95}"#;
        let request = AccuracyRequest::from_json(&json).unwrap();
        assert!((request.alpha() - 0.05).abs() < 1e-12);
        let json = REQUEST.trim_end().trim_end_matches('}').to_string() + r#", "confidence": 1.5}"#;
        assert_eq!(
            AccuracyRequest::from_json(&json).unwrap_err().kind(),
            ErrorKind::Format
        );
    }
}
