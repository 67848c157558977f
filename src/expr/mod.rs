//! # Filter predicates
//!
//! `Expr` combine columns and values with functions.
//! They are parsed from pandas-like predicate strings (see [`sql`]) and evaluated row by row.
//!
pub mod function;
pub mod sql;

use itertools::Itertools;
use paste::paste;
use std::{error, fmt, rc::Rc, result};

use crate::value::Value;

// Error management

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    InvalidExpression(String),
    InvalidArguments(String),
    UnknownColumn(String),
    Other(String),
}

impl Error {
    pub fn invalid_expression(expr: impl fmt::Display) -> Error {
        Error::InvalidExpression(format!("{} is invalid", expr))
    }
    pub fn invalid_arguments(function: impl fmt::Display, count: usize) -> Error {
        Error::InvalidArguments(format!("{function} cannot take {count} arguments"))
    }
    pub fn unknown_column(column: impl fmt::Display) -> Error {
        Error::UnknownColumn(format!("{column} is unknown"))
    }
    pub fn other<T: fmt::Display>(desc: T) -> Error {
        Error::Other(desc.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidExpression(desc) => write!(f, "InvalidExpression: {}", desc),
            Error::InvalidArguments(desc) => write!(f, "InvalidArguments: {}", desc),
            Error::UnknownColumn(desc) => write!(f, "UnknownColumn: {}", desc),
            Error::Other(err) => write!(f, "{}", err),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// A column expression
pub type Column = String;

/// A function expression
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    function: function::Function,
    arguments: Vec<Rc<Expr>>,
}

impl Function {
    pub fn new(function: function::Function, arguments: Vec<Rc<Expr>>) -> Function {
        Function {
            function,
            arguments,
        }
    }

    pub fn function(&self) -> function::Function {
        self.function
    }

    pub fn arguments(&self) -> Vec<&Expr> {
        self.arguments.iter().map(|x| x.as_ref()).collect()
    }
}

/// A predicate expression
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Column(Column),
    Value(Value),
    Function(Function),
}

impl Expr {
    pub fn col<S: Into<String>>(name: S) -> Expr {
        Expr::Column(name.into())
    }

    pub fn val<V: Into<Value>>(value: V) -> Expr {
        Expr::Value(value.into())
    }

    /// Parse a predicate string
    pub fn parse(predicate: &str) -> Result<Expr> {
        Expr::try_from(&sql::parse_expr(predicate)?)
    }

    /// Fold an `Expr` bottom-up with a visitor
    pub fn accept<T, V: Visitor<T>>(&self, visitor: &V) -> T {
        match self {
            Expr::Column(column) => visitor.column(column),
            Expr::Value(value) => visitor.value(value),
            Expr::Function(function) => visitor.function(
                &function.function,
                function
                    .arguments
                    .iter()
                    .map(|argument| argument.accept(visitor))
                    .collect(),
            ),
        }
    }

    /// The columns referred to, in order of appearance
    pub fn columns(&self) -> Vec<&str> {
        let mut columns = vec![];
        self.collect_columns(&mut columns);
        columns.into_iter().unique().collect()
    }

    fn collect_columns<'a>(&'a self, columns: &mut Vec<&'a str>) {
        match self {
            Expr::Column(column) => columns.push(column),
            Expr::Value(_) => {}
            Expr::Function(function) => function
                .arguments
                .iter()
                .for_each(|argument| argument.collect_columns(columns)),
        }
    }

    /// Evaluate on a row
    pub fn value(&self, columns: &[String], row: &[Value]) -> Result<Value> {
        self.accept(&ValueVisitor { columns, row })
    }

    /// Whether a row satisfies the predicate, `Null` does not
    pub fn holds(&self, columns: &[String], row: &[Value]) -> Result<bool> {
        Ok(self.value(columns, row)? == Value::Boolean(true))
    }
}

impl From<Function> for Expr {
    fn from(function: Function) -> Self {
        Expr::Function(function)
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Value(value)
    }
}

/// Implement unary function constructors
macro_rules! impl_unary_function_constructors {
    ($( $Function:ident ),*) => {
        impl Function {
            paste! {
                $(pub fn [<$Function:snake>]<E: Into<Expr>>(expr: E) -> Function {
                    Function::new(function::Function::$Function, vec![Rc::new(expr.into())])
                }
                )*
            }
        }

        impl Expr {
            paste! {
                $(pub fn [<$Function:snake>]<E: Into<Expr>>(expr: E) -> Expr {
                    Expr::from(Function::[<$Function:snake>](expr))
                }
                )*
            }
        }
    };
}

impl_unary_function_constructors!(Opposite, Not, IsNull, IsNotNull);

/// Implement binary function constructors
macro_rules! impl_binary_function_constructors {
    ($( $Function:ident ),*) => {
        impl Function {
            paste! {
                $(
                    pub fn [<$Function:snake>]<L: Into<Expr>, R: Into<Expr>>(left: L, right: R) -> Function {
                        Function::new(function::Function::$Function, vec![Rc::new(left.into()), Rc::new(right.into())])
                    }
                )*
            }
        }

        impl Expr {
            paste! {
                $(
                    pub fn [<$Function:snake>]<L: Into<Expr>, R: Into<Expr>>(left: L, right: R) -> Expr {
                        Expr::from(Function::[<$Function:snake>](left, right))
                    }
                )*
            }
        }
    };
}

impl_binary_function_constructors!(
    Plus, Minus, Multiply, Divide, Modulo, Gt, Lt, GtEq, LtEq, Eq, NotEq, And, Or
);

// Visitors

/// A Visitor for the type Expr
pub trait Visitor<T> {
    fn column(&self, column: &Column) -> T;
    fn value(&self, value: &Value) -> T;
    fn function(&self, function: &function::Function, arguments: Vec<T>) -> T;
}

/// Visit the expression to display it
#[derive(Clone, Debug)]
pub struct DisplayVisitor;

impl Visitor<String> for DisplayVisitor {
    fn column(&self, column: &Column) -> String {
        format!("`{column}`")
    }

    fn value(&self, value: &Value) -> String {
        match value {
            Value::Text(text) => format!("'{text}'"),
            value => format!("{value}"),
        }
    }

    fn function(&self, function: &function::Function, arguments: Vec<String>) -> String {
        match function.style() {
            function::Style::UnaryOperator => format!("{} ({})", function, arguments[0]),
            function::Style::PostfixOperator => format!("({}) {}", arguments[0], function),
            function::Style::BinaryOperator => {
                format!("({} {} {})", arguments[0], function, arguments[1])
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.accept(&DisplayVisitor))
    }
}

/// A visitor to compute the value on a row
#[derive(Clone, Debug)]
pub struct ValueVisitor<'a> {
    columns: &'a [String],
    row: &'a [Value],
}

impl<'a> Visitor<Result<Value>> for ValueVisitor<'a> {
    fn column(&self, column: &Column) -> Result<Value> {
        self.columns
            .iter()
            .position(|name| name == column)
            .and_then(|index| self.row.get(index))
            .cloned()
            .ok_or_else(|| Error::unknown_column(column))
    }

    fn value(&self, value: &Value) -> Result<Value> {
        Ok(value.clone())
    }

    fn function(
        &self,
        function: &function::Function,
        arguments: Vec<Result<Value>>,
    ) -> Result<Value> {
        let arguments: Vec<Value> = arguments.into_iter().collect::<Result<_>>()?;
        function.value(&arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let expr = Expr::and(
            Expr::gt(Expr::col("age"), Expr::val(30)),
            Expr::not_eq(Expr::col("job"), Expr::val("Carpenter")),
        );
        println!("expr = {expr}");
        assert_eq!(expr.to_string(), "((`age` > 30) and (`job` != 'Carpenter'))");
        assert_eq!(expr.columns(), vec!["age", "job"]);
    }

    #[test]
    fn test_holds() {
        let columns = vec!["age".to_string(), "job".to_string()];
        let expr = Expr::and(
            Expr::gt_eq(Expr::col("age"), Expr::val(30)),
            Expr::is_not_null(Expr::col("job")),
        );
        assert!(expr.holds(&columns, &[Value::from(42), Value::from("Baker")]).unwrap());
        assert!(!expr.holds(&columns, &[Value::from(42), Value::Null]).unwrap());
        assert!(!expr.holds(&columns, &[Value::Null, Value::from("Baker")]).unwrap());
        assert!(Expr::col("salary").holds(&columns, &[Value::Null, Value::Null]).is_err());
    }
}
