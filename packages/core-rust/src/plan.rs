//! Keyset query planning.
//!
//! Turns a [`NormalizedRequest`] and a caller's [`BaseFilter`] into the
//! concrete `(filter, order, limit)` a store executes, plus the count query
//! that runs alongside it.

use crate::predicate::Predicate;
use crate::request::NormalizedRequest;
use crate::sort_key::{PageDirection, SortDirection, SortKeyDescriptor};
use crate::types::ValueKind;

/// A selectable column and the kind the store returns it as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ValueKind,
}

impl Column {
    #[must_use]
    pub const fn new(name: &'static str, kind: ValueKind) -> Self {
        Self { name, kind }
    }
}

/// A paginated list type: where its rows live and how they are ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    /// Name used in logs and metrics, e.g. `"vehicles"`.
    pub name: &'static str,
    /// Backing table.
    pub table: &'static str,
    /// Columns selected for each row.
    pub columns: &'static [Column],
    pub descriptor: SortKeyDescriptor,
}

/// Entity-specific filter that applies to both the page and the count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseFilter {
    pub predicate: Predicate,
    /// Set when the predicate crosses a relation that can multiply rows, so
    /// the count must be distinct on the collection's unique column.
    pub distinct: bool,
}

impl BaseFilter {
    /// Matches the whole collection.
    #[must_use]
    pub fn none() -> Self {
        Self::new(Predicate::True)
    }

    #[must_use]
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            distinct: false,
        }
    }

    /// Marks the filter as requiring a distinct count.
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Adds a conjunct.
    #[must_use]
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicate = self.predicate.and(predicate);
        self
    }
}

impl Default for BaseFilter {
    fn default() -> Self {
        Self::none()
    }
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: &'static str,
    pub direction: SortDirection,
}

/// The windowed page query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub table: &'static str,
    pub columns: &'static [Column],
    pub filter: Predicate,
    pub order_by: Vec<OrderBy>,
    /// Requested page size plus one peek row.
    pub limit: usize,
}

/// The unbounded total count query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountQuery {
    pub table: &'static str,
    pub filter: Predicate,
    /// Count distinct values of this column instead of rows.
    pub distinct_on: Option<&'static str>,
}

fn order_for(descriptor: &SortKeyDescriptor, direction: PageDirection) -> Vec<OrderBy> {
    descriptor
        .order_by(direction)
        .into_iter()
        .map(|(column, direction)| OrderBy { column, direction })
        .collect()
}

/// Builds the page query.
///
/// - order: natural order forward, fully reversed backward;
/// - filter: base filter AND rows past `after` AND rows before `before`;
/// - limit: `request.limit + 1`.
#[must_use]
pub fn plan_page(
    collection: &Collection,
    base: &BaseFilter,
    request: &NormalizedRequest,
) -> QueryPlan {
    let descriptor = &collection.descriptor;
    let mut conjuncts = vec![base.predicate.clone()];
    if let Some(after) = &request.after {
        conjuncts.push(descriptor.bound(after, PageDirection::Forward));
    }
    if let Some(before) = &request.before {
        conjuncts.push(descriptor.bound(before, PageDirection::Backward));
    }

    QueryPlan {
        table: collection.table,
        columns: collection.columns,
        filter: Predicate::all(conjuncts),
        order_by: order_for(descriptor, request.direction),
        limit: request.limit.saturating_add(1),
    }
}

/// Builds the count query. Never includes cursor bounds or the limit.
#[must_use]
pub fn plan_count(collection: &Collection, base: &BaseFilter) -> CountQuery {
    CountQuery {
        table: collection.table,
        filter: base.predicate.clone(),
        distinct_on: base
            .distinct
            .then(|| collection.descriptor.unique_column()),
    }
}
