//! Filter triples pushed to federated sources
//!
//! A conjunct is pushable when it compares a bare column against a non-null
//! literal with one of the operators sources understand. Everything else
//! stays with the local engine.

use crate::common::error::{FederationError, FederationResult};
use crate::parser::ast::{BinaryOperator, ColumnRef, Expression, LiteralValue};
use crate::types::Value;
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Operators a fetch request may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "NOT LIKE")]
    NotLike,
    #[serde(rename = "IN")]
    In,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::NotEq => "!=",
            FilterOperator::Lt => "<",
            FilterOperator::Gt => ">",
            FilterOperator::LtEq => "<=",
            FilterOperator::GtEq => ">=",
            FilterOperator::Like => "LIKE",
            FilterOperator::NotLike => "NOT LIKE",
            FilterOperator::In => "IN",
        }
    }

    fn from_binary(op: BinaryOperator) -> Option<Self> {
        match op {
            BinaryOperator::Equals => Some(FilterOperator::Eq),
            BinaryOperator::NotEquals => Some(FilterOperator::NotEq),
            BinaryOperator::LessThan => Some(FilterOperator::Lt),
            BinaryOperator::GreaterThan => Some(FilterOperator::Gt),
            BinaryOperator::LessThanOrEqual => Some(FilterOperator::LtEq),
            BinaryOperator::GreaterThanOrEqual => Some(FilterOperator::GtEq),
            BinaryOperator::Like => Some(FilterOperator::Like),
            BinaryOperator::NotLike => Some(FilterOperator::NotLike),
            BinaryOperator::In => Some(FilterOperator::In),
            _ => None,
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a filter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterValue {
    Scalar(LiteralValue),
    List(Vec<LiteralValue>),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Scalar(v) => write!(f, "{}", v),
            FilterValue::List(items) => {
                let items: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "({})", items.join(", "))
            }
        }
    }
}

/// `{column, operator, value}` as sent to a source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterCondition {
    pub column: String,
    pub op: FilterOperator,
    pub value: FilterValue,
}

impl FilterCondition {
    pub fn new(column: impl Into<String>, op: FilterOperator, value: FilterValue) -> Self {
        Self {
            column: column.into(),
            op,
            value,
        }
    }

    /// Evaluate the filter against one value of its column. NULL never matches.
    pub fn evaluate(&self, value: &Value) -> FederationResult<bool> {
        if value.is_null() {
            return Ok(false);
        }
        match (&self.op, &self.value) {
            (FilterOperator::In, FilterValue::List(items)) => {
                for item in items {
                    if value.compare(&item.to_value())? == Ordering::Equal {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            (FilterOperator::Like | FilterOperator::NotLike, FilterValue::Scalar(pattern)) => {
                let LiteralValue::String(pattern) = pattern else {
                    return Err(FederationError::InvalidArgument(format!(
                        "LIKE pattern must be a string, got {}",
                        pattern
                    )));
                };
                let matched = like_to_regex(pattern)?.is_match(&value.to_sql_text());
                Ok(matched == (self.op == FilterOperator::Like))
            }
            (op, FilterValue::Scalar(literal)) => {
                let ordering = value.compare(&literal.to_value())?;
                Ok(match op {
                    FilterOperator::Eq => ordering == Ordering::Equal,
                    FilterOperator::NotEq => ordering != Ordering::Equal,
                    FilterOperator::Lt => ordering == Ordering::Less,
                    FilterOperator::Gt => ordering == Ordering::Greater,
                    FilterOperator::LtEq => ordering != Ordering::Greater,
                    FilterOperator::GtEq => ordering != Ordering::Less,
                    _ => false,
                })
            }
            (op, value) => Err(FederationError::InvalidArgument(format!(
                "operator {} cannot take {}",
                op, value
            ))),
        }
    }
}

impl fmt::Display for FilterCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.op, self.value)
    }
}

/// A conjunct recognised as a filter, before its column is bound to a table
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCandidate {
    pub column: ColumnRef,
    pub op: FilterOperator,
    pub value: FilterValue,
}

impl FilterCandidate {
    /// Bind to a source column name
    pub fn into_condition(self, column: &str) -> FilterCondition {
        FilterCondition::new(column, self.op, self.value)
    }
}

/// Classify one conjunct: `Some` if it is `column OP literal` (or
/// `literal OP column` for symmetric comparisons) with a non-null literal
pub fn classify_conjunct(expr: &Expression) -> Option<FilterCandidate> {
    let Expression::BinaryOp { op, left, right } = expr else {
        return None;
    };

    let (column, op, rhs) = match (left.as_ref(), right.as_ref()) {
        (Expression::Identifier(column), rhs) => (column, *op, rhs),
        (lhs @ Expression::Constant(_), Expression::Identifier(column)) => {
            (column, op.flipped()?, lhs)
        }
        _ => return None,
    };

    let op = FilterOperator::from_binary(op)?;
    let value = match (op, rhs) {
        (FilterOperator::In, Expression::List(items)) => {
            let literals = items
                .iter()
                .map(|item| match item {
                    Expression::Constant(v) if !v.is_null() => Some(v.clone()),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()?;
            if literals.is_empty() {
                return None;
            }
            FilterValue::List(literals)
        }
        (FilterOperator::In, _) => return None,
        (FilterOperator::Like | FilterOperator::NotLike, Expression::Constant(v @ LiteralValue::String(_))) => {
            FilterValue::Scalar(v.clone())
        }
        (FilterOperator::Like | FilterOperator::NotLike, _) => return None,
        (_, Expression::Constant(v)) if !v.is_null() => FilterValue::Scalar(v.clone()),
        _ => return None,
    };

    Some(FilterCandidate {
        column: column.clone(),
        op,
        value,
    })
}

/// Translate a SQL LIKE pattern (`%`, `_`) into an anchored regex.
/// ASCII letters match either case; other characters match exactly.
pub fn like_to_regex(pattern: &str) -> FederationResult<Regex> {
    let mut regex = String::with_capacity(pattern.len() * 2 + 8);
    regex.push_str("(?s)^");
    for ch in pattern.chars() {
        match ch {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            c if c.is_ascii_alphabetic() => {
                regex.push('[');
                regex.push(c.to_ascii_lowercase());
                regex.push(c.to_ascii_uppercase());
                regex.push(']');
            }
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    Regex::new(&regex)
        .map_err(|e| FederationError::InvalidArgument(format!("invalid LIKE pattern '{}': {}", pattern, e)))
}
