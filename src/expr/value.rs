//! The runtime value model for expression evaluation, per SPEC_FULL §4.8/§9.

use crate::error::{Error, Result};

/// A runtime value produced while evaluating an expression or read from a
/// cell's attribute data.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A signed integer, also used to encode boolean results (0 = false,
    /// any other value = true).
    Int(i64),
    /// A floating-point value.
    Float(f64),
    /// A string, either a literal or a decoded `char`-typed attribute.
    Str(String),
    /// A fixed- or variable-length integer array cell.
    IntVec(Vec<i64>),
    /// A fixed- or variable-length float array cell.
    FloatVec(Vec<f64>),
}

impl Value {
    /// Widens `self` to a float if it is numeric; used for mixed int/float
    /// arithmetic and comparisons, per SPEC_FULL's "widening of the
    /// narrower operand" rule.
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            other => Err(Error::ExpressionTypeError {
                op: format!("cannot use {other:?} as a number"),
            }),
        }
    }

    /// Interprets `self` as an integer, erroring on float/string/vec values.
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(Error::ExpressionTypeError {
                op: format!("cannot use {other:?} as an integer"),
            }),
        }
    }

    /// Interprets `self` as a string.
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(Error::ExpressionTypeError {
                op: format!("cannot use {other:?} as a string"),
            }),
        }
    }

    /// Interprets `self` as an integer vector.
    pub fn as_int_vec(&self) -> Result<&[i64]> {
        match self {
            Value::IntVec(v) => Ok(v),
            other => Err(Error::ExpressionTypeError {
                op: format!("cannot use {other:?} as an integer array"),
            }),
        }
    }

    /// Truthiness of a top-level predicate result: zero is false, anything
    /// else (including any non-zero float) is true.
    pub fn truthy(&self) -> Result<bool> {
        match self {
            Value::Int(i) => Ok(*i != 0),
            Value::Float(f) => Ok(*f != 0.0),
            _ => Err(Error::ExpressionNotBoolean),
        }
    }

    pub(crate) fn bool(b: bool) -> Self {
        Value::Int(i64::from(b))
    }

    /// True if both operands are numeric and at least one is a float.
    pub(crate) fn either_float(a: &Value, b: &Value) -> bool {
        matches!(a, Value::Float(_)) || matches!(b, Value::Float(_))
    }
}
