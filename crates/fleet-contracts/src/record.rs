//! Schema-aware field access for filterable records.
//!
//! Filters address fields by number, the way the wire schema numbers them.
//! A `Record` exposes a table-driven getter for each declared field; nested
//! messages are returned as `FieldValue::Message` so a path can descend.

use std::fmt;

/// The declared scalar kind of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    String,
    Bytes,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Message,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Bool => "bool",
            FieldKind::String => "string",
            FieldKind::Bytes => "bytes",
            FieldKind::Int32 => "int32",
            FieldKind::Int64 => "int64",
            FieldKind::Uint32 => "uint32",
            FieldKind::Uint64 => "uint64",
            FieldKind::Message => "message",
        };
        f.write_str(name)
    }
}

/// A borrowed field value tagged with its declared kind.
#[derive(Clone, Copy)]
pub enum FieldValue<'a> {
    Bool(bool),
    String(&'a str),
    Bytes(&'a [u8]),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Message(&'a dyn Record),
}

impl FieldValue<'_> {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::String(_) => FieldKind::String,
            FieldValue::Bytes(_) => FieldKind::Bytes,
            FieldValue::Int32(_) => FieldKind::Int32,
            FieldValue::Int64(_) => FieldKind::Int64,
            FieldValue::Uint32(_) => FieldKind::Uint32,
            FieldValue::Uint64(_) => FieldKind::Uint64,
            FieldValue::Message(_) => FieldKind::Message,
        }
    }
}

impl fmt::Debug for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "Bool({v})"),
            FieldValue::String(v) => write!(f, "String({v:?})"),
            FieldValue::Bytes(v) => write!(f, "Bytes({v:?})"),
            FieldValue::Int32(v) => write!(f, "Int32({v})"),
            FieldValue::Int64(v) => write!(f, "Int64({v})"),
            FieldValue::Uint32(v) => write!(f, "Uint32({v})"),
            FieldValue::Uint64(v) => write!(f, "Uint64({v})"),
            FieldValue::Message(m) => write!(f, "Message({})", m.type_name()),
        }
    }
}

/// A structured record whose fields can be read by field number.
///
/// Implementations are plain `match` tables:
///
/// ```rust,ignore
/// impl Record for KeyValue {
///     fn type_name(&self) -> &'static str { "KeyValue" }
///     fn field(&self, number: u32) -> Option<FieldValue<'_>> {
///         match number {
///             1 => Some(FieldValue::String(&self.key)),
///             2 => Some(FieldValue::String(&self.value)),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait Record {
    /// Schema name of the record, used in error messages.
    fn type_name(&self) -> &'static str;

    /// Return the field declared under `number`, or `None` if the schema has
    /// no such field.
    fn field(&self, number: u32) -> Option<FieldValue<'_>>;
}
