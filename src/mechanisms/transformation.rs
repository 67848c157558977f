//! Deterministic aggregations and their stability

use itertools::Itertools;
use std::fmt;

use super::Result;
use crate::{dataset::Dataset, value::Value};

/// An aggregation over the working frame
#[derive(Clone, Debug, PartialEq)]
pub enum Transformation {
    /// Number of rows
    Count { column: String },
    /// Number of rows per category, other values are dropped
    CountByCategories {
        column: String,
        categories: Vec<Value>,
    },
    /// Sum of clamped integers, missing values count as 0
    IntegerSum { column: String, low: i64, high: i64 },
    /// Sum of clamped floats, missing values count as 0
    FloatSum { column: String, low: f64, high: f64 },
}

/// The raw output of a transformation
#[derive(Clone, Debug, PartialEq)]
pub enum Aggregate {
    Integer(i64),
    Float(f64),
    Counts(Vec<i64>),
}

impl Transformation {
    pub fn count<S: Into<String>>(column: S) -> Self {
        Transformation::Count {
            column: column.into(),
        }
    }

    pub fn count_by_categories<S: Into<String>>(column: S, categories: Vec<Value>) -> Self {
        Transformation::CountByCategories {
            column: column.into(),
            categories,
        }
    }

    pub fn integer_sum<S: Into<String>>(column: S, low: i64, high: i64) -> Self {
        Transformation::IntegerSum {
            column: column.into(),
            low,
            high,
        }
    }

    pub fn float_sum<S: Into<String>>(column: S, low: f64, high: f64) -> Self {
        Transformation::FloatSum {
            column: column.into(),
            low,
            high,
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Transformation::Count { column }
            | Transformation::CountByCategories { column, .. }
            | Transformation::IntegerSum { column, .. }
            | Transformation::FloatSum { column, .. } => column,
        }
    }

    /// Whether the output takes integer values only
    pub fn is_integral(&self) -> bool {
        !matches!(self, Transformation::FloatSum { .. })
    }

    /// Bound on the output distance when `d_in` rows are added or removed.
    /// A row moves a single category by one so L1 and L2 bounds agree.
    pub fn stability(&self, d_in: f64) -> f64 {
        match self {
            Transformation::Count { .. } | Transformation::CountByCategories { .. } => d_in,
            Transformation::IntegerSum { low, high, .. } => {
                d_in * low.unsigned_abs().max(high.unsigned_abs()) as f64
            }
            Transformation::FloatSum { low, high, .. } => d_in * low.abs().max(high.abs()),
        }
    }

    pub fn apply(&self, data: &Dataset) -> Result<Aggregate> {
        Ok(match self {
            Transformation::Count { column } => {
                Aggregate::Integer(data.column(column)?.count() as i64)
            }
            Transformation::CountByCategories { column, categories } => {
                let mut counts = vec![0; categories.len()];
                for value in data.column(column)? {
                    if let Some(index) = categories.iter().position(|category| category == value) {
                        counts[index] += 1;
                    }
                }
                Aggregate::Counts(counts)
            }
            Transformation::IntegerSum { column, low, high } => Aggregate::Integer(
                data.column(column)?
                    .map(|value| value.as_i64().unwrap_or(0).max(*low).min(*high))
                    .fold(0i64, i64::saturating_add),
            ),
            Transformation::FloatSum { column, low, high } => Aggregate::Float(
                data.column(column)?
                    .map(|value| value.as_f64().unwrap_or(0.).max(*low).min(*high))
                    .sum(),
            ),
        })
    }
}

impl fmt::Display for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transformation::Count { column } => write!(f, "count({column})"),
            Transformation::CountByCategories { column, categories } => {
                write!(f, "count({column}) by [{}]", categories.iter().join(", "))
            }
            Transformation::IntegerSum { column, low, high } => {
                write!(f, "sum({column} clamped to [{low}, {high}])")
            }
            Transformation::FloatSum { column, low, high } => {
                write!(f, "sum({column} clamped to [{low}, {high}])")
            }
        }
    }
}
