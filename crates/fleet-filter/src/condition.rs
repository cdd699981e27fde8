//! Single-condition evaluation.
//!
//! Evaluation algorithm:
//!
//! 1. Reject an empty field path.
//! 2. Walk the path through nested messages by field number.
//! 3. Require an operator and check its family against the resolved field's
//!    declared kind. A mismatch is an error, never a non-match.
//! 4. Compare, then apply `negated`.

use regex::Regex;

use fleet_contracts::{
    error::{FleetError, FleetResult},
    filter::{Condition, Operator},
    record::{FieldValue, Record},
};

/// Evaluate `condition` against `record`.
///
/// Pattern operators use match-at-start semantics: the pattern must match
/// beginning at the first character but may stop anywhere.
pub fn evaluate(condition: &Condition, record: &dyn Record) -> FleetResult<bool> {
    let path = condition.field.as_slice();
    let value = resolve_path(record, path)?;
    let operator = condition
        .operator
        .as_ref()
        .ok_or(FleetError::MissingOperator)?;

    let result = compare(operator, value, path)?;
    Ok(result != condition.negated)
}

/// Follow `path` from `record`, descending through message fields.
fn resolve_path<'r>(record: &'r dyn Record, path: &[u32]) -> FleetResult<FieldValue<'r>> {
    let (last, parents) = path.split_last().ok_or(FleetError::EmptyFieldPath)?;

    let mut current = record;
    for &number in parents {
        match current.field(number) {
            Some(FieldValue::Message(inner)) => current = inner,
            Some(_) => {
                return Err(FleetError::NotAMessage {
                    number,
                    path: path.to_vec(),
                })
            }
            None => {
                return Err(FleetError::UnknownField {
                    record: current.type_name().to_string(),
                    number,
                    path: path.to_vec(),
                })
            }
        }
    }

    current.field(*last).ok_or_else(|| FleetError::UnknownField {
        record: current.type_name().to_string(),
        number: *last,
        path: path.to_vec(),
    })
}

fn compare(operator: &Operator, value: FieldValue<'_>, path: &[u32]) -> FleetResult<bool> {
    let result = match (operator, value) {
        (Operator::BoolEqual(expected), FieldValue::Bool(actual)) => actual == *expected,

        (Operator::StringEqual(expected), FieldValue::String(actual)) => actual == expected.as_str(),
        (Operator::StringMatch(pattern), FieldValue::String(actual)) => {
            anchored(pattern)?.is_match(actual)
        }

        (Operator::BytesEqual(expected), FieldValue::Bytes(actual)) => actual == expected.as_slice(),
        (Operator::BytesMatch(pattern), FieldValue::Bytes(actual)) => {
            anchored_bytes(pattern)?.is_match(actual)
        }

        (Operator::Uint64Equal(expected), FieldValue::Uint32(actual)) => u64::from(actual) == *expected,
        (Operator::Uint64Equal(expected), FieldValue::Uint64(actual)) => actual == *expected,
        (Operator::Uint64Less(bound), FieldValue::Uint32(actual)) => u64::from(actual) < *bound,
        (Operator::Uint64Less(bound), FieldValue::Uint64(actual)) => actual < *bound,

        (Operator::Int64Equal(expected), FieldValue::Int32(actual)) => i64::from(actual) == *expected,
        (Operator::Int64Equal(expected), FieldValue::Int64(actual)) => actual == *expected,
        (Operator::Int64Less(bound), FieldValue::Int32(actual)) => i64::from(actual) < *bound,
        (Operator::Int64Less(bound), FieldValue::Int64(actual)) => actual < *bound,

        (operator, other) => {
            return Err(FleetError::FieldTypeMismatch {
                operator: operator.to_string(),
                actual: other.kind().to_string(),
                path: path.to_vec(),
            })
        }
    };
    Ok(result)
}

fn anchored(pattern: &str) -> FleetResult<Regex> {
    Regex::new(&format!("^(?:{})", pattern)).map_err(|e| FleetError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn anchored_bytes(pattern: &str) -> FleetResult<regex::bytes::Regex> {
    regex::bytes::Regex::new(&format!("^(?:{})", pattern)).map_err(|e| {
        FleetError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        }
    })
}
