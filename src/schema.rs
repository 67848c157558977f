//! # Dataset schemas
//!
//! A [`Schema`] is the ordered list of typed columns a query runs against.
//! It is carried along by the typechecker and the compiler, each transformation
//! step producing a new schema.
//!

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, error, fmt, ops::Deref, result};

use crate::{
    builder::{Ready, With},
    value::Value,
};

// Error management

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    UnknownColumn(String),
    DuplicateColumn(String),
    Other(String),
}

impl Error {
    pub fn unknown_column(name: impl fmt::Display) -> Error {
        Error::UnknownColumn(format!("column {name} is not in the schema"))
    }
    pub fn duplicate_column(name: impl fmt::Display) -> Error {
        Error::DuplicateColumn(format!("column {name} appears more than once"))
    }
    pub fn other(desc: impl fmt::Display) -> Error {
        Error::Other(desc.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownColumn(desc) => write!(f, "UnknownColumn: {}", desc),
            Error::DuplicateColumn(desc) => write!(f, "DuplicateColumn: {}", desc),
            Error::Other(desc) => write!(f, "{}", desc),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// The type of a column, with the public bounds or labels the data owner declared
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum ColumnType {
    Int { low: i64, high: i64 },
    Double { low: f64, high: f64 },
    Enum { labels: Vec<String> },
    Bool,
    Text,
}

impl ColumnType {
    pub fn int(low: i64, high: i64) -> ColumnType {
        ColumnType::Int { low, high }
    }

    pub fn double(low: f64, high: f64) -> ColumnType {
        ColumnType::Double { low, high }
    }

    pub fn enumeration<S: Into<String>, L: IntoIterator<Item = S>>(labels: L) -> ColumnType {
        ColumnType::Enum {
            labels: labels.into_iter().map(S::into).collect(),
        }
    }

    pub fn boolean() -> ColumnType {
        ColumnType::Bool
    }

    pub fn text() -> ColumnType {
        ColumnType::Text
    }

    /// The tag used on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Int { .. } => "Int",
            ColumnType::Double { .. } => "Double",
            ColumnType::Enum { .. } => "Enum",
            ColumnType::Bool => "Bool",
            ColumnType::Text => "Text",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Int { .. } | ColumnType::Double { .. })
    }

    /// Read a raw cell. Empty or unparsable cells are missing values.
    pub fn parse(&self, cell: &str) -> Value {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        match self {
            ColumnType::Int { .. } => trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .filter(|x| x.fract() == 0. && x.abs() < i64::MAX as f64)
                        .map(|x| x as i64)
                })
                .map_or(Value::Null, Value::Integer),
            ColumnType::Double { .. } => trimmed.parse::<f64>().map_or(Value::Null, Value::Float),
            ColumnType::Bool if trimmed == "1" || trimmed.eq_ignore_ascii_case("true") => {
                Value::Boolean(true)
            }
            ColumnType::Bool if trimmed == "0" || trimmed.eq_ignore_ascii_case("false") => {
                Value::Boolean(false)
            }
            ColumnType::Bool => Value::Null,
            ColumnType::Enum { .. } | ColumnType::Text => Value::Text(cell.to_string()),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int { low, high } => write!(f, "int[{low}, {high}]"),
            ColumnType::Double { low, high } => write!(f, "double[{low}, {high}]"),
            ColumnType::Enum { labels } => write!(f, "enum({})", labels.iter().join(", ")),
            ColumnType::Bool => write!(f, "bool"),
            ColumnType::Text => write!(f, "text"),
        }
    }
}

/// A named column
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    name: String,
    #[serde(rename = "type")]
    column_type: ColumnType,
}

impl ColumnSchema {
    pub fn new<S: Into<String>>(name: S, column_type: ColumnType) -> Self {
        ColumnSchema {
            name: name.into(),
            column_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> &ColumnType {
        &self.column_type
    }
}

impl fmt::Display for ColumnSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.column_type)
    }
}

impl<S: Into<String>> From<(S, ColumnType)> for ColumnSchema {
    fn from((name, column_type): (S, ColumnType)) -> Self {
        ColumnSchema::new(name, column_type)
    }
}

/// An ordered list of uniquely named columns
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
    columns: Vec<ColumnSchema>,
}

impl Schema {
    /// Schema constructor, checking for name collisions
    pub fn new(columns: Vec<ColumnSchema>) -> Result<Self> {
        let mut names = HashSet::new();
        if let Some(column) = columns.iter().find(|column| !names.insert(column.name())) {
            return Err(Error::duplicate_column(column.name()));
        }
        Ok(Schema { columns })
    }

    pub fn empty() -> Self {
        Schema { columns: vec![] }
    }

    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(ColumnSchema::name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column.name() == name)
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|column| column.name() == name)
            .ok_or_else(|| Error::unknown_column(name))
    }

    pub fn column_type(&self, name: &str) -> Result<&ColumnType> {
        Ok(self.columns[self.index_of(name)?].column_type())
    }

    /// Restrict to the given columns, in the given order
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Schema> {
        let columns = names
            .iter()
            .map(|name| Ok(self.columns[self.index_of(name.as_ref())?].clone()))
            .collect::<Result<Vec<_>>>()?;
        Schema::new(columns)
    }

    /// Rename one column in place. Renaming a column to itself is a no-op.
    pub fn rename(&self, old: &str, new: &str) -> Result<Schema> {
        let index = self.index_of(old)?;
        if old != new && self.contains(new) {
            return Err(Error::duplicate_column(new));
        }
        let mut columns = self.columns.clone();
        columns[index].name = new.to_string();
        Ok(Schema { columns })
    }

    /// Rename one column, dropping any other column already called `new`
    pub fn replace(&self, old: &str, new: &str) -> Result<Schema> {
        let index = self.index_of(old)?;
        let columns = self
            .columns
            .iter()
            .enumerate()
            .filter(|(i, column)| *i == index || column.name() != new)
            .map(|(i, column)| {
                let mut column = column.clone();
                if i == index {
                    column.name = new.to_string();
                }
                column
            })
            .collect();
        Ok(Schema { columns })
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.columns.iter().join(", "))
    }
}

impl Deref for Schema {
    type Target = [ColumnSchema];

    fn deref(&self) -> &Self::Target {
        &self.columns
    }
}

impl TryFrom<Vec<ColumnSchema>> for Schema {
    type Error = Error;

    fn try_from(columns: Vec<ColumnSchema>) -> Result<Self> {
        Schema::new(columns)
    }
}

impl IntoIterator for Schema {
    type Item = ColumnSchema;
    type IntoIter = <Vec<ColumnSchema> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    columns: Vec<ColumnSchema>,
}

impl SchemaBuilder {
    pub fn new() -> SchemaBuilder {
        SchemaBuilder { columns: vec![] }
    }
}

impl<S: Into<String>> With<(S, ColumnType)> for SchemaBuilder {
    fn with(mut self, column: (S, ColumnType)) -> Self {
        self.columns.push(column.into());
        self
    }
}

impl Ready<Schema> for SchemaBuilder {
    type Error = Error;

    fn try_build(self) -> Result<Schema> {
        Schema::new(self.columns)
    }
}
