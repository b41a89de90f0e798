//! Page assembly: peek-row trimming, display order, boundary flags.

use serde::Serialize;

use crate::error::{PageError, RowError};
use crate::request::NormalizedRequest;
use crate::sort_key::{PageDirection, SortKeyDescriptor};
use crate::types::Row;

/// One result row with its resumption cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge<T> {
    pub node: T,
    pub cursor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

/// A connection page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T> {
    pub edges: Vec<Edge<T>>,
    pub nodes: Vec<T>,
    pub page_info: PageInfo,
    pub total_count: u64,
}

/// Builds a page from the rows a [`QueryPlan`](crate::plan::QueryPlan) returned.
///
/// `rows` are in query order (reversed natural order when paging backward)
/// and may hold one peek row beyond `request.limit`.
///
/// Boundary flags:
/// - `has_next_page = before given || (forward && peek row present)`
/// - `has_previous_page = after given || (backward && peek row present)`
///
/// The opposite-cursor half of each flag is not re-checked against the store.
///
/// # Errors
///
/// Returns [`PageError::Row`] if a row lacks its sort key or `map` fails.
/// No partial page is ever returned.
pub fn assemble<T, F>(
    descriptor: &SortKeyDescriptor,
    request: &NormalizedRequest,
    mut rows: Vec<Row>,
    total_count: u64,
    mut map: F,
) -> Result<PageResult<T>, PageError>
where
    T: Clone,
    F: FnMut(&Row) -> Result<T, RowError>,
{
    let extra = rows.len() > request.limit;
    rows.truncate(request.limit);

    let backward = request.direction == PageDirection::Backward;
    if backward {
        rows.reverse();
    }

    let mut edges = Vec::with_capacity(rows.len());
    for row in &rows {
        let key = descriptor.extract(row)?;
        let cursor = descriptor.encode(&key).map_err(|e| RowError::Invalid {
            column: descriptor.unique_column().to_string(),
            message: e.to_string(),
        })?;
        edges.push(Edge {
            node: map(row)?,
            cursor,
        });
    }

    let page_info = PageInfo {
        start_cursor: edges.first().map(|e| e.cursor.clone()),
        end_cursor: edges.last().map(|e| e.cursor.clone()),
        has_next_page: request.before.is_some() || (!backward && extra),
        has_previous_page: request.after.is_some() || (backward && extra),
    };
    let nodes = edges.iter().map(|e| e.node.clone()).collect();

    Ok(PageResult {
        edges,
        nodes,
        page_info,
        total_count,
    })
}
