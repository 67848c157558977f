//! The compiled artifact: a projection of the working frame followed by one calibrated measurement

use std::fmt;

use crate::{
    dataset::{self, Dataset},
    expr::Expr,
    mechanisms::Measurement,
    query::Mechanism,
    value::Value,
};

/// A deferred operation on the working frame
#[derive(Clone, Debug, PartialEq)]
pub enum FrameOp {
    Select(Vec<String>),
    Filter(Expr),
    Rename(String, String),
}

impl FrameOp {
    pub fn apply(&self, data: Dataset) -> dataset::Result<Dataset> {
        match self {
            FrameOp::Select(columns) => data.select(columns),
            FrameOp::Filter(predicate) => data.filter(predicate),
            FrameOp::Rename(old, new) => data.rename(old, new),
        }
    }
}

impl fmt::Display for FrameOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameOp::Select(columns) => write!(f, "select {}", columns.join(", ")),
            FrameOp::Filter(predicate) => write!(f, "filter {predicate}"),
            FrameOp::Rename(old, new) => write!(f, "rename {old} to {new}"),
        }
    }
}

/// A pipeline ready to run: only its result label may change once built
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledPipeline {
    projection: Vec<FrameOp>,
    measurement: Measurement,
    label: String,
    categories: Option<Vec<Value>>,
    seed: Option<u64>,
}

impl CompiledPipeline {
    pub fn new(
        projection: Vec<FrameOp>,
        measurement: Measurement,
        label: String,
        categories: Option<Vec<Value>>,
        seed: Option<u64>,
    ) -> Self {
        CompiledPipeline {
            projection,
            measurement,
            label,
            categories,
            seed,
        }
    }

    pub fn projection(&self) -> &[FrameOp] {
        &self.projection
    }

    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The histogram categories, if any
    pub fn categories(&self) -> Option<&[Value]> {
        self.categories.as_deref()
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn scale(&self) -> f64 {
        self.measurement.noise().scale()
    }

    pub fn mechanism(&self) -> Mechanism {
        self.measurement.noise().mechanism()
    }

    pub fn discrete(&self) -> bool {
        self.measurement.noise().discrete()
    }

    /// Rename the result, the computation is untouched
    pub fn relabel(&mut self, old: &str, new: &str) {
        if self.label == old {
            self.label = new.to_string();
        }
    }

    /// Run the deferred frame operations
    pub fn project(&self, data: Dataset) -> dataset::Result<Dataset> {
        self.projection
            .iter()
            .try_fold(data, |data, operation| operation.apply(data))
    }
}

impl fmt::Display for CompiledPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for operation in &self.projection {
            writeln!(f, "{operation}")?;
        }
        write!(f, "{} as {}", self.measurement, self.label)
    }
}
