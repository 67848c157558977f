//! # The query grammar
//!
//! A single four-state machine validates step sequences. It is driven by a [`Pass`],
//! which receives a hook for every accepted transition: the typechecker runs it with a
//! pass that does nothing, the compiler with one that assembles the pipeline.
//!
//! ```text
//! AwaitingTransform --select/filter/rename--> AwaitingTransform
//! AwaitingTransform --bin--> AwaitingCount --count--> Measuring
//! AwaitingTransform --count/sum--> Measuring --noise--> NoiseAdded --rename--> NoiseAdded
//! ```
//!

use itertools::Itertools;
use serde::Serialize;
use std::{collections::BTreeMap, error, fmt, result};

use crate::{
    dataset, expr,
    expr::Expr,
    mechanisms,
    parameters::Parameters,
    query::{Budget, Measure, Mechanism, PrivacyNotion, Step},
    schema::{self, ColumnType, Schema},
    value::Value,
};

/// Largest sum bound over ε the calibration can bracket, with room for the Gaussian factor
pub const MAX_SUM_SCALE: f64 = 1e300;

// Error management

/// The error taxonomy exposed to callers
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Format(String),
    Syntax(String),
    Type(String),
    Unsupported(String),
    Compatibility(String),
    Upstream(String),
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Format,
    Syntax,
    Type,
    Unsupported,
    Compatibility,
    Upstream,
}

impl Error {
    pub fn format(desc: impl fmt::Display) -> Error {
        Error::Format(desc.to_string())
    }
    pub fn syntax(desc: impl fmt::Display) -> Error {
        Error::Syntax(desc.to_string())
    }
    pub fn type_error(desc: impl fmt::Display) -> Error {
        Error::Type(desc.to_string())
    }
    pub fn unsupported(desc: impl fmt::Display) -> Error {
        Error::Unsupported(desc.to_string())
    }
    pub fn compatibility(desc: impl fmt::Display) -> Error {
        Error::Compatibility(desc.to_string())
    }
    pub fn upstream(desc: impl fmt::Display) -> Error {
        Error::Upstream(desc.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Format(_) => ErrorKind::Format,
            Error::Syntax(_) => ErrorKind::Syntax,
            Error::Type(_) => ErrorKind::Type,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Compatibility(_) => ErrorKind::Compatibility,
            Error::Upstream(_) => ErrorKind::Upstream,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Error::Format(desc)
            | Error::Syntax(desc)
            | Error::Type(desc)
            | Error::Unsupported(desc)
            | Error::Compatibility(desc)
            | Error::Upstream(desc) => desc,
        }
    }

    /// The HTTP-like status a caller should report
    pub fn status(&self) -> u16 {
        match self {
            Error::Upstream(_) => 500,
            _ => 400,
        }
    }

    /// Only upstream failures may succeed when retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Upstream(_))
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Format => write!(f, "FormatError"),
            ErrorKind::Syntax => write!(f, "SyntaxError"),
            ErrorKind::Type => write!(f, "TypeError"),
            ErrorKind::Unsupported => write!(f, "UnsupportedError"),
            ErrorKind::Compatibility => write!(f, "CompatibilityError"),
            ErrorKind::Upstream => write!(f, "UpstreamError"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl error::Error for Error {}

impl From<schema::Error> for Error {
    fn from(err: schema::Error) -> Self {
        Error::Syntax(err.to_string())
    }
}
impl From<expr::Error> for Error {
    fn from(err: expr::Error) -> Self {
        Error::Syntax(err.to_string())
    }
}
impl From<mechanisms::Error> for Error {
    fn from(err: mechanisms::Error) -> Self {
        Error::Upstream(err.to_string())
    }
}
impl From<dataset::Error> for Error {
    fn from(err: dataset::Error) -> Self {
        Error::Upstream(err.to_string())
    }
}

pub type Result<T> = result::Result<T, Error>;

/// A pending histogram: the binned column and its boundaries
#[derive(Clone, Debug, PartialEq)]
pub struct Bin {
    column: String,
    bins: Vec<Value>,
}

impl Bin {
    pub fn new(column: String, bins: Vec<Value>) -> Bin {
        Bin { column, bins }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn bins(&self) -> &[Value] {
        &self.bins
    }
}

impl fmt::Display for Bin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.column, self.bins.iter().join(", "))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum State {
    AwaitingTransform,
    AwaitingCount(Bin),
    Measuring(Mechanism),
    NoiseAdded,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::AwaitingTransform => write!(f, "awaiting transform"),
            State::AwaitingCount(bin) => write!(f, "awaiting count of {bin}"),
            State::Measuring(mechanism) => write!(f, "measuring with {mechanism}"),
            State::NoiseAdded => write!(f, "noise added"),
        }
    }
}

/// The hooks called on accepted transitions, before the state changes.
/// A hook failing aborts the step.
pub trait Pass {
    fn select(&mut self, _columns: &[String]) -> Result<()> {
        Ok(())
    }
    fn filter(&mut self, _predicate: &Expr) -> Result<()> {
        Ok(())
    }
    fn rename(&mut self, _old: &str, _new: &str, _state: &State) -> Result<()> {
        Ok(())
    }
    fn bin(&mut self, _bin: &Bin, _column_type: &ColumnType) -> Result<()> {
        Ok(())
    }
    fn count(
        &mut self,
        _column: &str,
        _column_type: &ColumnType,
        _bin: Option<&Bin>,
        _mechanism: Mechanism,
    ) -> Result<()> {
        Ok(())
    }
    fn sum(&mut self, _column: &str, _column_type: &ColumnType, _mechanism: Mechanism) -> Result<()> {
        Ok(())
    }
    fn noise(&mut self, _budget: &Budget, _notion: PrivacyNotion, _mechanism: Mechanism) -> Result<()> {
        Ok(())
    }
}

/// The state machine, its working schema and the pass it drives
#[derive(Clone, Debug)]
pub struct Grammar<P> {
    schema: Schema,
    budget: Budget,
    notion: PrivacyNotion,
    max_categories: usize,
    state: State,
    pass: P,
}

impl<P: Pass> Grammar<P> {
    pub fn new(schema: Schema, budget: Budget, notion: PrivacyNotion, pass: P) -> Self {
        Grammar {
            schema,
            budget,
            notion,
            max_categories: Parameters::default().max_categories(),
            state: State::AwaitingTransform,
            pass,
        }
    }

    pub fn with_parameters(mut self, parameters: &Parameters) -> Self {
        self.max_categories = parameters.max_categories();
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn pass(&self) -> &P {
        &self.pass
    }

    pub fn pass_mut(&mut self) -> &mut P {
        &mut self.pass
    }

    /// Apply one step. A failing step leaves the working schema unchanged.
    pub fn step(&mut self, step: &Step) -> Result<()> {
        log::debug!("{step} while {}", self.state);
        match step {
            Step::Select(columns) => self.select(columns),
            Step::Filter(predicates) => self.filter(predicates),
            Step::Rename(mapping) => self.rename(mapping),
            Step::Bin { column, bins } => self.bin(column, bins),
            Step::Count(measure) => {
                self.count(measure)?;
                self.noise()
            }
            Step::Sum(measure) => {
                self.sum(measure)?;
                self.noise()
            }
        }
    }

    /// Apply all steps in order, stopping at the first error
    pub fn run<'a, I: IntoIterator<Item = &'a Step>>(mut self, steps: I) -> Result<Self> {
        for step in steps {
            self.step(step)?;
        }
        Ok(self)
    }

    /// A query is valid when it ends with noise added
    pub fn is_valid(&self) -> Result<()> {
        match self.state {
            State::NoiseAdded => Ok(()),
            _ => Err(Error::syntax(format!(
                "query ends while {}, a query must end with a noised count or sum",
                self.state
            ))),
        }
    }

    /// Check validity and release the pass
    pub fn finish(self) -> Result<P> {
        self.is_valid()?;
        Ok(self.pass)
    }

    fn expect_awaiting_transform(&self, operation: &str) -> Result<()> {
        match self.state {
            State::AwaitingTransform => Ok(()),
            _ => Err(Error::syntax(format!(
                "{operation} is not allowed while {}",
                self.state
            ))),
        }
    }

    fn select(&mut self, columns: &[String]) -> Result<()> {
        self.expect_awaiting_transform("select")?;
        let schema = self.schema.select(columns)?;
        self.pass.select(columns)?;
        self.schema = schema;
        Ok(())
    }

    fn filter(&mut self, predicates: &[String]) -> Result<()> {
        self.expect_awaiting_transform("filter")?;
        let predicates = predicates
            .iter()
            .map(|predicate| Expr::parse(predicate))
            .collect::<expr::Result<Vec<_>>>()?;
        for predicate in &predicates {
            if let Some(column) = predicate
                .columns()
                .into_iter()
                .find(|column| !self.schema.contains(column))
            {
                return Err(Error::syntax(format!(
                    "filter {predicate} refers to column {column} which is not in {}",
                    self.schema
                )));
            }
        }
        for predicate in &predicates {
            self.pass.filter(predicate)?;
        }
        Ok(())
    }

    fn rename(&mut self, mapping: &BTreeMap<String, String>) -> Result<()> {
        if !matches!(self.state, State::AwaitingTransform | State::NoiseAdded) {
            return Err(Error::syntax(format!(
                "rename is not allowed while {}",
                self.state
            )));
        }
        // Once measured, a rename may take over the name of an unreleased column
        let replace = self.state == State::NoiseAdded;
        let schema = mapping
            .iter()
            .try_fold(self.schema.clone(), |schema, (old, new)| {
                if replace {
                    schema.replace(old, new)
                } else {
                    schema.rename(old, new)
                }
            })?;
        for (old, new) in mapping {
            self.pass.rename(old, new, &self.state)?;
        }
        self.schema = schema;
        Ok(())
    }

    fn bin(&mut self, column: &str, bins: &[Value]) -> Result<()> {
        match self.state {
            State::AwaitingTransform => {}
            State::AwaitingCount(_) => {
                return Err(Error::syntax("only one bin is allowed, it must be followed by a count"))
            }
            _ => return Err(Error::syntax(format!("bin is not allowed while {}", self.state))),
        }
        let column_type = self.schema.column_type(column)?.clone();
        if !bins.iter().all_unique() {
            return Err(Error::type_error(format!(
                "bin values of {column} must be unique"
            )));
        }
        match &column_type {
            ColumnType::Int { .. } => self.check_integer_bins(column, bins)?,
            ColumnType::Bool => {
                if !bins.iter().all(Value::is_boolean) {
                    return Err(Error::type_error(format!(
                        "bin values of the Bool column {column} must be booleans"
                    )));
                }
            }
            ColumnType::Text | ColumnType::Enum { .. } => {
                if !bins.iter().all(Value::is_text) {
                    return Err(Error::type_error(format!(
                        "bin values of the {} column {column} must be strings",
                        column_type.name()
                    )));
                }
            }
            ColumnType::Double { .. } => {
                return Err(Error::unsupported(format!(
                    "binning is not supported for the Double column {column}"
                )))
            }
        }
        let bin = Bin::new(column.to_string(), bins.to_vec());
        self.pass.bin(&bin, &column_type)?;
        self.state = State::AwaitingCount(bin);
        Ok(())
    }

    fn check_integer_bins(&self, column: &str, bins: &[Value]) -> Result<()> {
        if bins.len() < 2 {
            return Err(Error::type_error(format!(
                "bin of the Int column {column} expects a lower and an upper value"
            )));
        }
        let bins = bins
            .iter()
            .map(|value| {
                value.as_i64().ok_or_else(|| {
                    Error::type_error(format!(
                        "bin values of the Int column {column} must be integers, got {value}"
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if !bins.iter().tuple_windows().all(|(a, b)| a < b) {
            return Err(Error::type_error(format!(
                "bin values of {column} must be ascending"
            )));
        }
        let (low, high) = (bins[0] as i128, bins[bins.len() - 1] as i128);
        if high - low + 1 > self.max_categories as i128 {
            return Err(Error::unsupported(format!(
                "bin of {column} spans {} categories, at most {} are allowed",
                high - low + 1,
                self.max_categories
            )));
        }
        Ok(())
    }

    fn count(&mut self, measure: &Measure) -> Result<()> {
        let bin = match &self.state {
            State::AwaitingTransform => None,
            State::AwaitingCount(bin) => Some(bin.clone()),
            _ => return Err(Error::syntax(format!("count is not allowed while {}", self.state))),
        };
        let column_type = self.schema.column_type(&measure.column)?.clone();
        if let Some(bin) = &bin {
            if bin.column() != measure.column {
                return Err(Error::syntax(format!(
                    "count of {} must be on the binned column {}",
                    measure.column,
                    bin.column()
                )));
            }
        }
        self.pass
            .count(&measure.column, &column_type, bin.as_ref(), measure.mechanism)?;
        self.state = State::Measuring(measure.mechanism);
        Ok(())
    }

    fn sum(&mut self, measure: &Measure) -> Result<()> {
        match self.state {
            State::AwaitingTransform => {}
            State::AwaitingCount(_) => {
                return Err(Error::syntax("a bin must be followed by a count, not a sum"))
            }
            _ => return Err(Error::syntax(format!("sum is not allowed while {}", self.state))),
        }
        let column_type = self.schema.column_type(&measure.column)?.clone();
        if !column_type.is_numeric() {
            return Err(Error::type_error(format!(
                "column {} is of type {}, sum requires Int or Double",
                measure.column,
                column_type.name()
            )));
        }
        let bound = match column_type {
            ColumnType::Int { low, high } => (low as f64).abs().max((high as f64).abs()),
            ColumnType::Double { low, high } => low.abs().max(high.abs()),
            _ => 0.,
        };
        let ratio = bound / self.budget.epsilon();
        if self.budget.epsilon() > 0. && !(ratio <= MAX_SUM_SCALE) {
            return Err(Error::unsupported(format!(
                "sum of {} bounded by {bound} needs a noise scale beyond {MAX_SUM_SCALE} under {}",
                measure.column, self.budget
            )));
        }
        self.pass
            .sum(&measure.column, &column_type, measure.mechanism)?;
        self.state = State::Measuring(measure.mechanism);
        Ok(())
    }

    fn noise(&mut self) -> Result<()> {
        let mechanism = match self.state {
            State::Measuring(mechanism) => mechanism,
            _ => return Err(Error::syntax(format!("noise cannot be added while {}", self.state))),
        };
        check_compatibility(&self.budget, self.notion, mechanism)?;
        self.pass.noise(&self.budget, self.notion, mechanism)?;
        self.state = State::NoiseAdded;
        Ok(())
    }
}

/// The mechanism, budget and privacy notion must agree
pub fn check_compatibility(
    budget: &Budget,
    notion: PrivacyNotion,
    mechanism: Mechanism,
) -> Result<()> {
    let (epsilon, delta) = (budget.epsilon(), budget.delta());
    if !(epsilon.is_finite() && epsilon > 0.) {
        return Err(Error::compatibility(format!(
            "epsilon must be positive and finite, got {epsilon}"
        )));
    }
    if !(0.0..1.0).contains(&delta) {
        return Err(Error::compatibility(format!(
            "delta must be in [0, 1), got {delta}"
        )));
    }
    match (notion, mechanism) {
        (PrivacyNotion::PureDP, _) if delta > 0. => Err(Error::compatibility(format!(
            "privacy notion is {notion} but delta = {delta} is positive"
        ))),
        (_, Mechanism::Laplace) if delta > 0. => Err(Error::compatibility(format!(
            "{mechanism} is only defined for delta = 0, got {delta}"
        ))),
        (_, Mechanism::Gaussian) if delta == 0. => Err(Error::compatibility(format!(
            "{mechanism} is not defined for delta = 0"
        ))),
        (PrivacyNotion::PureDP, Mechanism::Gaussian) => Err(Error::compatibility(format!(
            "{mechanism} requires {}",
            PrivacyNotion::ApproxDP
        ))),
        _ => Ok(()),
    }
}
