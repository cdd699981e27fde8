//! Declarative result filters.
//!
//! A request carries zero or more `Filter`s. A reply is kept only if every
//! filter holds; a filter holds if any of its conditions holds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The comparison a condition applies to its resolved field.
///
/// Each variant belongs to one operator family and only accepts fields of
/// that family's declared kinds (see `fleet-filter`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    BoolEqual(bool),
    StringEqual(String),
    /// Regex match anchored at the start of the field only.
    StringMatch(String),
    BytesEqual(Vec<u8>),
    /// Regex match over raw bytes, anchored at the start only.
    BytesMatch(String),
    Uint64Equal(u64),
    Uint64Less(u64),
    Int64Equal(i64),
    Int64Less(i64),
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::BoolEqual(_) => "bool_equal",
            Operator::StringEqual(_) => "string_equal",
            Operator::StringMatch(_) => "string_match",
            Operator::BytesEqual(_) => "bytes_equal",
            Operator::BytesMatch(_) => "bytes_match",
            Operator::Uint64Equal(_) => "uint64_equal",
            Operator::Uint64Less(_) => "uint64_less",
            Operator::Int64Equal(_) => "int64_equal",
            Operator::Int64Less(_) => "int64_less",
        };
        f.write_str(name)
    }
}

/// One predicate over a field path of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Field numbers leading from the record root to the compared field.
    pub field: Vec<u32>,
    /// The comparison to apply. `None` is a caller error at evaluation time.
    pub operator: Option<Operator>,
    /// Flip the comparison result.
    #[serde(default)]
    pub negated: bool,
}

impl Condition {
    pub fn new(field: impl Into<Vec<u32>>, operator: Operator) -> Self {
        Self {
            field: field.into(),
            operator: Some(operator),
            negated: false,
        }
    }

    /// The same condition with its negation flag flipped.
    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }
}

/// A disjunction of conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }
}

impl From<Condition> for Filter {
    fn from(condition: Condition) -> Self {
        Self {
            conditions: vec![condition],
        }
    }
}
