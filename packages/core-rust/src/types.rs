use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RowError;

/// Dynamically typed column value exchanged with the store.
///
/// Values of the same variant are totally ordered. Ordering across variants
/// follows declaration order (`Null` first); the planner only ever compares a
/// column against a value of the column's own kind, so cross-variant ordering
/// never decides a page boundary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean column.
    Bool(bool),
    /// Signed 64-bit integer column (token ids, amounts that fit, counters).
    Int(i64),
    /// UTF-8 text column.
    Text(String),
    /// Raw bytes column (addresses, hashes, opaque identifiers).
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Point in time as milliseconds since the Unix epoch (UTC).
    Timestamp(i64),
}

/// Discriminant of a [`Value`], used by sort key descriptors and row decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Text,
    Bytes,
    Timestamp,
}

impl ValueKind {
    /// Lowercase name used in error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Value {
    /// Returns the kind of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Text(_) => ValueKind::Text,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Timestamp(_) => ValueKind::Timestamp,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Self::Timestamp(ms) => write!(f, "@{ms}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A single stored row: column name to value.
///
/// Uses `BTreeMap` so that debug output and equality are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used heavily by event handlers and tests.
    #[must_use]
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.columns.insert(column.to_string(), value.into());
        self
    }

    /// Inserts or replaces a column, returning the previous value.
    pub fn insert(&mut self, column: &str, value: impl Into<Value>) -> Option<Value> {
        self.columns.insert(column.to_string(), value.into())
    }

    /// Returns the value stored under `column`, if any.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Iterates columns in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merges `other` into `self`, overwriting columns present in both.
    pub fn merge(&mut self, other: Row) {
        self.columns.extend(other.columns);
    }

    fn required(&self, column: &str) -> Result<&Value, RowError> {
        self.columns.get(column).ok_or_else(|| RowError::MissingColumn {
            column: column.to_string(),
        })
    }

    fn mismatch(column: &str, expected: ValueKind, found: &Value) -> RowError {
        RowError::WrongKind {
            column: column.to_string(),
            expected,
            found: found.kind(),
        }
    }

    /// Reads a non-null integer column.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] if the column is missing or not an integer.
    pub fn int(&self, column: &str) -> Result<i64, RowError> {
        match self.required(column)? {
            Value::Int(v) => Ok(*v),
            other => Err(Self::mismatch(column, ValueKind::Int, other)),
        }
    }

    /// Reads a nullable integer column. A missing column reads as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] if the column holds a non-integer value.
    pub fn opt_int(&self, column: &str) -> Result<Option<i64>, RowError> {
        match self.columns.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Int(v)) => Ok(Some(*v)),
            Some(other) => Err(Self::mismatch(column, ValueKind::Int, other)),
        }
    }

    /// Reads a non-null text column.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] if the column is missing or not text.
    pub fn text(&self, column: &str) -> Result<String, RowError> {
        match self.required(column)? {
            Value::Text(v) => Ok(v.clone()),
            other => Err(Self::mismatch(column, ValueKind::Text, other)),
        }
    }

    /// Reads a nullable text column.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] if the column holds a non-text value.
    pub fn opt_text(&self, column: &str) -> Result<Option<String>, RowError> {
        match self.columns.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Text(v)) => Ok(Some(v.clone())),
            Some(other) => Err(Self::mismatch(column, ValueKind::Text, other)),
        }
    }

    /// Reads a non-null bytes column.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] if the column is missing or not bytes.
    pub fn bytes(&self, column: &str) -> Result<Vec<u8>, RowError> {
        match self.required(column)? {
            Value::Bytes(v) => Ok(v.clone()),
            other => Err(Self::mismatch(column, ValueKind::Bytes, other)),
        }
    }

    /// Reads a nullable bytes column.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] if the column holds a non-bytes value.
    pub fn opt_bytes(&self, column: &str) -> Result<Option<Vec<u8>>, RowError> {
        match self.columns.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bytes(v)) => Ok(Some(v.clone())),
            Some(other) => Err(Self::mismatch(column, ValueKind::Bytes, other)),
        }
    }

    /// Reads a non-null timestamp column as epoch millis.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] if the column is missing or not a timestamp.
    pub fn timestamp(&self, column: &str) -> Result<i64, RowError> {
        match self.required(column)? {
            Value::Timestamp(v) => Ok(*v),
            other => Err(Self::mismatch(column, ValueKind::Timestamp, other)),
        }
    }

    /// Reads a nullable timestamp column.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] if the column holds a non-timestamp value.
    pub fn opt_timestamp(&self, column: &str) -> Result<Option<i64>, RowError> {
        match self.columns.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Timestamp(v)) => Ok(Some(*v)),
            Some(other) => Err(Self::mismatch(column, ValueKind::Timestamp, other)),
        }
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}
