use std::fmt;

use super::{Error, Result};
use crate::value::Value;

/// The operators of filter predicates
/// inspired by: https://docs.rs/sqlparser/latest/sqlparser/ast/enum.BinaryOperator.html
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Function {
    // Unary operators
    Opposite,
    Not,
    // Postfix operators
    IsNull,
    IsNotNull,
    // Binary operators
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Gt,
    Lt,
    GtEq,
    LtEq,
    Eq,
    NotEq,
    And,
    Or,
}

pub enum Style {
    UnaryOperator,
    PostfixOperator,
    BinaryOperator,
}

impl Function {
    /// Return the style of display
    pub fn style(self) -> Style {
        match self {
            Function::Opposite | Function::Not => Style::UnaryOperator,
            Function::IsNull | Function::IsNotNull => Style::PostfixOperator,
            _ => Style::BinaryOperator,
        }
    }

    pub fn arity(self) -> usize {
        match self.style() {
            Style::UnaryOperator | Style::PostfixOperator => 1,
            Style::BinaryOperator => 2,
        }
    }

    /// Evaluate on values.
    /// Missing or mismatched operands yield `Null`, which filters treat as false.
    pub fn value(self, arguments: &[Value]) -> Result<Value> {
        if arguments.len() != self.arity() {
            return Err(Error::invalid_arguments(self, arguments.len()));
        }
        Ok(match (self, arguments) {
            (Function::IsNull, [x]) => Value::Boolean(x.is_null()),
            (Function::IsNotNull, [x]) => Value::Boolean(!x.is_null()),
            (Function::Opposite, [Value::Integer(i)]) => i.checked_neg().map_or(Value::Null, Value::Integer),
            (Function::Opposite, [Value::Float(f)]) => Value::Float(-f),
            (Function::Not, [Value::Boolean(b)]) => Value::Boolean(!b),
            (Function::And, [l, r]) => match (l.as_bool(), r.as_bool()) {
                (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
                (Some(true), Some(true)) => Value::Boolean(true),
                _ => Value::Null,
            },
            (Function::Or, [l, r]) => match (l.as_bool(), r.as_bool()) {
                (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
                (Some(false), Some(false)) => Value::Boolean(false),
                _ => Value::Null,
            },
            (_, [Value::Null, _]) | (_, [_, Value::Null]) => Value::Null,
            (Function::Eq, [l, r]) => Value::Boolean(l.compare(r).map_or(false, |o| o.is_eq())),
            (Function::NotEq, [l, r]) => Value::Boolean(l.compare(r).map_or(true, |o| o.is_ne())),
            (Function::Gt, [l, r]) => l.compare(r).map_or(Value::Null, |o| Value::Boolean(o.is_gt())),
            (Function::Lt, [l, r]) => l.compare(r).map_or(Value::Null, |o| Value::Boolean(o.is_lt())),
            (Function::GtEq, [l, r]) => l.compare(r).map_or(Value::Null, |o| Value::Boolean(o.is_ge())),
            (Function::LtEq, [l, r]) => l.compare(r).map_or(Value::Null, |o| Value::Boolean(o.is_le())),
            (Function::Plus, [Value::Text(l), Value::Text(r)]) => Value::Text(format!("{l}{r}")),
            (Function::Plus, [Value::Integer(l), Value::Integer(r)]) => l.checked_add(*r).map_or(Value::Null, Value::Integer),
            (Function::Minus, [Value::Integer(l), Value::Integer(r)]) => l.checked_sub(*r).map_or(Value::Null, Value::Integer),
            (Function::Multiply, [Value::Integer(l), Value::Integer(r)]) => l.checked_mul(*r).map_or(Value::Null, Value::Integer),
            (Function::Modulo, [Value::Integer(l), Value::Integer(r)]) => l.checked_rem_euclid(*r).map_or(Value::Null, Value::Integer),
            (Function::Plus | Function::Minus | Function::Multiply | Function::Divide | Function::Modulo, [l, r]) => {
                match (l.as_f64(), r.as_f64()) {
                    (Some(l), Some(r)) => float_arithmetic(self, l, r),
                    _ => Value::Null,
                }
            }
            _ => Value::Null,
        })
    }
}

fn float_arithmetic(function: Function, l: f64, r: f64) -> Value {
    let result = match function {
        Function::Plus => l + r,
        Function::Minus => l - r,
        Function::Multiply => l * r,
        Function::Divide => l / r,
        Function::Modulo => l.rem_euclid(r),
        _ => f64::NAN,
    };
    if result.is_finite() {
        Value::Float(result)
    } else {
        Value::Null
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Function::Opposite => "-",
                Function::Not => "not",
                Function::IsNull => "is null",
                Function::IsNotNull => "is not null",
                Function::Plus => "+",
                Function::Minus => "-",
                Function::Multiply => "*",
                Function::Divide => "/",
                Function::Modulo => "%",
                Function::Gt => ">",
                Function::Lt => "<",
                Function::GtEq => ">=",
                Function::LtEq => "<=",
                Function::Eq => "==",
                Function::NotEq => "!=",
                Function::And => "and",
                Function::Or => "or",
            }
        )
    }
}
