//! Error taxonomy for the pagination engine.
//!
//! Validation and cursor errors are raised by the normalizer before any store
//! call. Store, row, cancellation and deadline errors are raised while a page
//! is being executed. No variant ever travels alongside a partial page.

use std::fmt;

use crate::types::ValueKind;

/// Which request argument a cursor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorSide {
    After,
    Before,
}

impl CursorSide {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::After => "after",
            Self::Before => "before",
        }
    }
}

impl fmt::Display for CursorSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the two store calls failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStage {
    /// The windowed page query.
    Page,
    /// The total count query.
    Count,
}

impl StoreStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Count => "count",
        }
    }
}

impl fmt::Display for StoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to decode (or encode) an opaque cursor string.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("cursor is not valid base64: {0}")]
    Base64(String),
    #[error("cursor payload has {found} bytes, expected {expected}")]
    Length { expected: usize, found: usize },
    #[error("cursor payload is empty")]
    Empty,
    #[error("unsupported cursor version {0}")]
    Version(u8),
    #[error("malformed cursor payload: {0}")]
    Payload(String),
    #[error("cursor payload has {0} trailing bytes")]
    TrailingBytes(usize),
    #[error("cursor has {found} fields, expected {expected}")]
    Arity { expected: usize, found: usize },
    #[error("cursor field {index} is {found}, expected {expected}")]
    FieldKind {
        index: usize,
        expected: ValueKind,
        found: ValueKind,
    },
}

/// Rejected page-size arguments.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("pass `first` or `last`, but not both")]
    FirstAndLast,
    #[error("`{argument}` must be a positive integer, got {value}")]
    NonPositive { argument: &'static str, value: i64 },
    /// An entity filter argument that cannot be turned into a predicate.
    #[error("invalid `{argument}`: {message}")]
    InvalidArgument {
        argument: &'static str,
        message: String,
    },
}

/// A stored row that cannot be turned into a sort key or a node.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RowError {
    #[error("row has no `{column}` column")]
    MissingColumn { column: String },
    #[error("column `{column}` is {found}, expected {expected}")]
    WrongKind {
        column: String,
        expected: ValueKind,
        found: ValueKind,
    },
    #[error("column `{column}`: {message}")]
    Invalid { column: String, message: String },
}

/// Every way a page call can fail.
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("invalid `{side}` cursor: {source}")]
    CursorDecode {
        side: CursorSide,
        #[source]
        source: CursorError,
    },
    #[error("{stage} query failed: {source}")]
    Store {
        stage: StoreStage,
        #[source]
        source: anyhow::Error,
    },
    #[error("row mapping failed: {0}")]
    Row(#[from] RowError),
    #[error("page request cancelled")]
    Cancelled,
    #[error("page request exceeded its {timeout_ms}ms deadline")]
    DeadlineExceeded { timeout_ms: u64 },
}

impl PageError {
    /// Returns `true` for errors caused by the caller's arguments rather than
    /// by the store or the server.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::CursorDecode { .. })
    }
}
