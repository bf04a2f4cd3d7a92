//! Element kinds and scalar values.
//!
//! Blocks store values of exactly one `ElementType`. `Value` is the
//! dynamically-typed form used at the edges (tuple sources, literals in
//! predicates, aggregate results); hot loops work on the typed storage.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Int,
    Long,
    Double,
    Boolean,
    Bytes,
}

impl ElementType {
    /// True when a value of `from` can be stored as `self` without loss.
    /// Only integer widths widen; nothing is ever narrowed.
    pub const fn accepts(self, from: ElementType) -> bool {
        matches!(
            (self, from),
            (ElementType::Int, ElementType::Int)
                | (ElementType::Long, ElementType::Long)
                | (ElementType::Long, ElementType::Int)
                | (ElementType::Double, ElementType::Double)
                | (ElementType::Boolean, ElementType::Boolean)
                | (ElementType::Bytes, ElementType::Bytes)
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ElementType::Int => "int",
            ElementType::Long => "long",
            ElementType::Double => "double",
            ElementType::Boolean => "boolean",
            ElementType::Bytes => "bytes",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i32),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn element_type(&self) -> ElementType {
        match self {
            Value::Int(_) => ElementType::Int,
            Value::Long(_) => ElementType::Long,
            Value::Double(_) => ElementType::Double,
            Value::Boolean(_) => ElementType::Boolean,
            Value::Bytes(_) => ElementType::Bytes,
        }
    }

    /// Convert to `target`, widening `Int` to `Long` when asked to.
    pub fn widen_to(self, target: ElementType) -> Result<Value> {
        let actual = self.element_type();
        if !target.accepts(actual) {
            return Err(Error::TypeMismatch {
                expected: target,
                actual,
            });
        }
        Ok(match self {
            Value::Int(v) if target == ElementType::Long => Value::Long(i64::from(v)),
            v => v,
        })
    }

    /// Compare two values of compatible kinds.
    ///
    /// `Int` and `Long` compare after widening. Doubles use IEEE total order,
    /// so `NaN` sorts above every number and equal to itself.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        use Value::*;
        match (self, other) {
            (Int(a), Int(b)) => Ok(a.cmp(b)),
            (Long(a), Long(b)) => Ok(a.cmp(b)),
            (Int(a), Long(b)) => Ok(i64::from(*a).cmp(b)),
            (Long(a), Int(b)) => Ok(a.cmp(&i64::from(*b))),
            (Double(a), Double(b)) => Ok(a.total_cmp(b)),
            (Boolean(a), Boolean(b)) => Ok(a.cmp(b)),
            (Bytes(a), Bytes(b)) => Ok(a.cmp(b)),
            (a, b) => Err(Error::TypeMismatch {
                expected: a.element_type(),
                actual: b.element_type(),
            }),
        }
    }

    /// Parse a literal of the given kind (used by textual predicates).
    pub fn parse_as(literal: &str, element_type: ElementType) -> Result<Value> {
        let literal = literal.trim();
        let bad = || Error::Config(format!("cannot parse '{literal}' as {element_type}"));
        Ok(match element_type {
            ElementType::Int => Value::Int(literal.parse().map_err(|_| bad())?),
            ElementType::Long => Value::Long(literal.parse().map_err(|_| bad())?),
            ElementType::Double => Value::Double(literal.parse().map_err(|_| bad())?),
            ElementType::Boolean => Value::Boolean(literal.parse().map_err(|_| bad())?),
            ElementType::Bytes => Value::Bytes(literal.as_bytes().to_vec()),
        })
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Bytes(v.as_bytes().to_vec())
    }
}
