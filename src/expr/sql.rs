//! Parse pandas-like predicates with `sqlparser`.
//!
//! Double quoted identifiers are string literals, as in pandas, and backticks quote column names.

use sqlparser::{
    ast,
    dialect::GenericDialect,
    parser::{Parser, ParserError},
    tokenizer::{Token, Tokenizer, TokenizerError},
};

use super::{Error, Expr, Result};
use crate::value::Value;

impl From<TokenizerError> for Error {
    fn from(err: TokenizerError) -> Self {
        Error::InvalidExpression(err.to_string())
    }
}

impl From<ParserError> for Error {
    fn from(err: ParserError) -> Self {
        Error::InvalidExpression(err.to_string())
    }
}

/// Parse a whole predicate, trailing tokens are an error
pub fn parse_expr(expr: &str) -> Result<ast::Expr> {
    let dialect = GenericDialect;
    let mut tokenizer = Tokenizer::new(&dialect, expr);
    let tokens = tokenizer.tokenize()?;
    let mut parser = Parser::new(&dialect).with_tokens(tokens);
    let parsed = parser.parse_expr()?;
    let next = parser.next_token();
    if next.token != Token::EOF {
        return Err(Error::invalid_expression(format!(
            "{expr} (unexpected {})",
            next.token
        )));
    }
    Ok(parsed)
}

fn literal(value: &ast::Value) -> Result<Value> {
    match value {
        ast::Value::Number(number, _) => number
            .parse::<i64>()
            .map(Value::Integer)
            .or_else(|_| number.parse::<f64>().map(Value::Float))
            .map_err(|_| Error::invalid_expression(number)),
        ast::Value::SingleQuotedString(text) | ast::Value::DoubleQuotedString(text) => {
            Ok(Value::Text(text.clone()))
        }
        ast::Value::Boolean(b) => Ok(Value::Boolean(*b)),
        ast::Value::Null => Ok(Value::Null),
        value => Err(Error::invalid_expression(value)),
    }
}

fn binary_operator(op: &ast::BinaryOperator, left: Expr, right: Expr) -> Result<Expr> {
    Ok(match op {
        ast::BinaryOperator::Plus => Expr::plus(left, right),
        ast::BinaryOperator::Minus => Expr::minus(left, right),
        ast::BinaryOperator::Multiply => Expr::multiply(left, right),
        ast::BinaryOperator::Divide => Expr::divide(left, right),
        ast::BinaryOperator::Modulo => Expr::modulo(left, right),
        ast::BinaryOperator::Gt => Expr::gt(left, right),
        ast::BinaryOperator::Lt => Expr::lt(left, right),
        ast::BinaryOperator::GtEq => Expr::gt_eq(left, right),
        ast::BinaryOperator::LtEq => Expr::lt_eq(left, right),
        ast::BinaryOperator::Eq => Expr::eq(left, right),
        ast::BinaryOperator::NotEq => Expr::not_eq(left, right),
        ast::BinaryOperator::And | ast::BinaryOperator::BitwiseAnd => Expr::and(left, right),
        ast::BinaryOperator::Or | ast::BinaryOperator::BitwiseOr => Expr::or(left, right),
        op => return Err(Error::invalid_expression(op)),
    })
}

impl TryFrom<&ast::Expr> for Expr {
    type Error = Error;

    fn try_from(expr: &ast::Expr) -> Result<Self> {
        match expr {
            ast::Expr::Identifier(ident) if ident.quote_style == Some('"') => {
                Ok(Expr::val(ident.value.clone()))
            }
            ast::Expr::Identifier(ident) => Ok(Expr::col(ident.value.clone())),
            ast::Expr::Value(value) => Ok(Expr::Value(literal(value)?)),
            ast::Expr::Nested(expr) => Expr::try_from(expr.as_ref()),
            ast::Expr::UnaryOp { op, expr } => {
                let expr = Expr::try_from(expr.as_ref())?;
                match op {
                    ast::UnaryOperator::Not => Ok(Expr::not(expr)),
                    ast::UnaryOperator::Minus => Ok(Expr::opposite(expr)),
                    ast::UnaryOperator::Plus => Ok(expr),
                    op => Err(Error::invalid_expression(op)),
                }
            }
            ast::Expr::BinaryOp { left, op, right } => binary_operator(
                op,
                Expr::try_from(left.as_ref())?,
                Expr::try_from(right.as_ref())?,
            ),
            ast::Expr::IsNull(expr) => Ok(Expr::is_null(Expr::try_from(expr.as_ref())?)),
            ast::Expr::IsNotNull(expr) => Ok(Expr::is_not_null(Expr::try_from(expr.as_ref())?)),
            ast::Expr::IsTrue(expr) => Ok(Expr::eq(Expr::try_from(expr.as_ref())?, Expr::val(true))),
            ast::Expr::IsFalse(expr) => Ok(Expr::eq(Expr::try_from(expr.as_ref())?, Expr::val(false))),
            ast::Expr::InList {
                expr,
                list,
                negated,
            } => {
                let expr = Expr::try_from(expr.as_ref())?;
                let in_list = list
                    .iter()
                    .map(|item| -> Result<Expr> { Ok(Expr::eq(expr.clone(), Expr::try_from(item)?)) })
                    .reduce(|acc, item| Ok(Expr::or(acc?, item?)))
                    .unwrap_or(Ok(Expr::val(false)))?;
                Ok(if *negated { Expr::not(in_list) } else { in_list })
            }
            ast::Expr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                let expr = Expr::try_from(expr.as_ref())?;
                let between = Expr::and(
                    Expr::gt_eq(expr.clone(), Expr::try_from(low.as_ref())?),
                    Expr::lt_eq(expr, Expr::try_from(high.as_ref())?),
                );
                Ok(if *negated { Expr::not(between) } else { between })
            }
            expr => Err(Error::invalid_expression(expr)),
        }
    }
}
