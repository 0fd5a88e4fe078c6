//! Filter — comparison predicates over records and aggregated rows.
//!
//! A predicate is a conjunction of `field OP literal` clauses joined by
//! `and`; the bare token `1` is the always-true predicate (the default
//! having clause). Parsing happens once at setup time, so a malformed
//! expression fails the run before any ingestion starts.

use thiserror::Error;

use crate::record::model::Value;

#[derive(Debug, Error)]
pub enum PredicateError {
    #[error("invalid filter expression '{expr}': {reason}")]
    Invalid { expr: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Op {
    fn holds(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Op::Eq => ord == Equal,
            Op::Ne => ord != Equal,
            Op::Lt => ord == Less,
            Op::Le => ord != Greater,
            Op::Gt => ord == Greater,
            Op::Ge => ord != Less,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Comparison {
    field: String,
    op: Op,
    value: Value,
}

/// A parsed filter predicate.
#[derive(Debug, Clone)]
pub enum Predicate {
    True,
    All(Vec<Comparison>),
}

// Longest operators first so ">=" is not read as ">" then "=".
const OPERATORS: [(&str, Op); 6] = [
    ("==", Op::Eq),
    ("!=", Op::Ne),
    (">=", Op::Ge),
    ("<=", Op::Le),
    (">", Op::Gt),
    ("<", Op::Lt),
];

impl Predicate {
    pub fn parse(expr: &str) -> Result<Self, PredicateError> {
        let trimmed = expr.trim();
        if trimmed.is_empty() || trimmed == "1" {
            return Ok(Predicate::True);
        }
        let mut comparisons = Vec::new();
        for clause in split_and(trimmed) {
            comparisons.push(Comparison::parse(clause).map_err(|reason| {
                PredicateError::Invalid {
                    expr: expr.to_string(),
                    reason,
                }
            })?);
        }
        Ok(Predicate::All(comparisons))
    }

    /// Evaluate against a field lookup. A comparison on a field the
    /// lookup does not know is false.
    pub fn eval<F>(&self, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<Value>,
    {
        match self {
            Predicate::True => true,
            Predicate::All(comparisons) => comparisons.iter().all(|c| {
                lookup(&c.field)
                    .map(|actual| c.op.holds(actual.compare(&c.value)))
                    .unwrap_or(false)
            }),
        }
    }
}

impl Comparison {
    fn parse(clause: &str) -> Result<Self, String> {
        let clause = clause.trim();
        for (token, op) in OPERATORS {
            if let Some(pos) = clause.find(token) {
                let field = clause[..pos].trim();
                let literal = clause[pos + token.len()..].trim();
                if field.is_empty() {
                    return Err(format!("missing field before '{token}'"));
                }
                if !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(format!("'{field}' is not a field name"));
                }
                if literal.is_empty() {
                    return Err(format!("missing value after '{token}'"));
                }
                return Ok(Self {
                    field: field.to_string(),
                    op,
                    value: parse_literal(literal),
                });
            }
        }
        Err(format!("no comparison operator in '{clause}'"))
    }
}

fn parse_literal(literal: &str) -> Value {
    let quoted = (literal.starts_with('\'') && literal.ends_with('\'')
        || literal.starts_with('"') && literal.ends_with('"'))
        && literal.len() >= 2;
    if quoted {
        return Value::Str(literal[1..literal.len() - 1].to_string());
    }
    if let Ok(v) = literal.parse::<i64>() {
        return Value::Int(v);
    }
    if let Ok(v) = literal.parse::<f64>() {
        return Value::Float(v);
    }
    Value::Str(literal.to_string())
}

/// Split on the `and` keyword, case-insensitively, at word boundaries.
fn split_and(expr: &str) -> Vec<&str> {
    let lower = expr.to_ascii_lowercase();
    let mut clauses = Vec::new();
    let mut start = 0;
    let mut search = 0;
    while let Some(found) = lower[search..].find("and") {
        let pos = search + found;
        let before_ok = pos == 0 || lower.as_bytes()[pos - 1].is_ascii_whitespace();
        let after = pos + 3;
        let after_ok = after >= lower.len() || lower.as_bytes()[after].is_ascii_whitespace();
        if before_ok && after_ok && pos > start {
            clauses.push(&expr[start..pos]);
            start = after;
        }
        search = after;
    }
    clauses.push(&expr[start..]);
    clauses
}
