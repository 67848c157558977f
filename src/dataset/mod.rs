//! # Datasets
//!
//! The typed in-memory frame a compiled query runs on, read from the tabular
//! payload of a [`provider::DatasetProvider`].
//!

pub mod provider;

use itertools::Itertools;
use std::{error, fmt, result};

use crate::{
    expr::{self, Expr},
    schema::{ColumnType, Schema},
    value::Value,
};

// Error management

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    InvalidPayload(String),
    MissingColumn(String),
    UnknownDataset(String),
    Other(String),
}

impl Error {
    pub fn invalid_payload(desc: impl fmt::Display) -> Error {
        Error::InvalidPayload(desc.to_string())
    }
    pub fn missing_column(column: impl fmt::Display) -> Error {
        Error::MissingColumn(format!("column {column} is missing"))
    }
    pub fn unknown_dataset(dataset: impl fmt::Display) -> Error {
        Error::UnknownDataset(format!("dataset {dataset} is unknown"))
    }
    pub fn other(desc: impl fmt::Display) -> Error {
        Error::Other(desc.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidPayload(desc) => write!(f, "InvalidPayload: {}", desc),
            Error::MissingColumn(desc) => write!(f, "MissingColumn: {}", desc),
            Error::UnknownDataset(desc) => write!(f, "UnknownDataset: {}", desc),
            Error::Other(desc) => write!(f, "{}", desc),
        }
    }
}

impl error::Error for Error {}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::InvalidPayload(err.to_string())
    }
}

impl From<expr::Error> for Error {
    fn from(err: expr::Error) -> Self {
        Error::Other(err.to_string())
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Rows of typed cells under named columns
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if let Some(row) = rows.iter().find(|row| row.len() != columns.len()) {
            return Err(Error::invalid_payload(format!(
                "row of {} cells for {} columns",
                row.len(),
                columns.len()
            )));
        }
        Ok(Dataset { columns, rows })
    }

    /// Read a header row followed by comma separated rows.
    /// Cells are typed with the schema, columns absent from the schema are kept as text.
    pub fn from_csv(payload: &str, schema: &Schema) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(payload.as_bytes());
        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if let Some(missing) = schema.names().find(|name| !columns.iter().any(|c| c == name)) {
            return Err(Error::missing_column(missing));
        }
        let column_types: Vec<ColumnType> = columns
            .iter()
            .map(|column| {
                schema
                    .column_type(column)
                    .cloned()
                    .unwrap_or(ColumnType::Text)
            })
            .collect();
        let rows = reader
            .records()
            .map(|record| -> Result<Vec<Value>> {
                Ok(record?
                    .iter()
                    .zip(&column_types)
                    .map(|(cell, column_type)| column_type.parse(cell))
                    .collect())
            })
            .collect::<Result<Vec<Vec<Value>>>>()?;
        log::debug!("read {} rows of {}", rows.len(), columns.iter().join(", "));
        Dataset::new(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn index_of(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| Error::missing_column(column))
    }

    /// The cells of one column
    pub fn column(&self, column: &str) -> Result<impl Iterator<Item = &Value> + '_> {
        let index = self.index_of(column)?;
        Ok(self.rows.iter().map(move |row| &row[index]))
    }

    /// Keep the given columns, in the given order
    pub fn select<S: AsRef<str>>(self, columns: &[S]) -> Result<Self> {
        let indices = columns
            .iter()
            .map(|column| self.index_of(column.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let rows = self
            .rows
            .into_iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Dataset {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            rows,
        })
    }

    /// Keep the rows satisfying the predicate
    pub fn filter(self, predicate: &Expr) -> Result<Self> {
        let mut rows = Vec::with_capacity(self.rows.len());
        for row in self.rows {
            if predicate.holds(&self.columns, &row)? {
                rows.push(row);
            }
        }
        Ok(Dataset {
            columns: self.columns,
            rows,
        })
    }

    pub fn rename(mut self, old: &str, new: &str) -> Result<Self> {
        let index = self.index_of(old)?;
        self.columns[index] = new.to_string();
        Ok(self)
    }
}
