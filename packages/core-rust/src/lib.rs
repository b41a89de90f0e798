//! Keyset Core — cursor codecs, sort key descriptors, request normalization,
//! keyset query planning, and page assembly.
//!
//! Everything here is pure and synchronous. Executing a plan against a store
//! (and running the count alongside it) lives in `keyset-server`.

pub mod cursor;
pub mod error;
pub mod page;
pub mod plan;
pub mod predicate;
pub mod request;
pub mod sort_key;
pub mod types;

pub use cursor::{CursorShape, ScalarCursor, TimestampAndBytesCursor};
pub use error::{CursorError, CursorSide, PageError, RowError, StoreStage, ValidationError};
pub use page::{assemble, Edge, PageInfo, PageResult};
pub use plan::{plan_count, plan_page, BaseFilter, Collection, Column, CountQuery, OrderBy, QueryPlan};
pub use predicate::{CompareOp, Predicate};
pub use request::{normalize, NormalizedRequest, PageRequest, PaginationConfig};
pub use sort_key::{bound_op, PageDirection, SortDirection, SortField, SortKey, SortKeyDescriptor};
pub use types::{Row, Value, ValueKind};
