//! Page request validation and normalization.

use serde::{Deserialize, Serialize};

use crate::error::{CursorSide, PageError, ValidationError};
use crate::sort_key::{PageDirection, SortKey, SortKeyDescriptor};

/// Raw connection arguments as received from the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
}

impl PageRequest {
    #[must_use]
    pub fn first(n: i64) -> Self {
        Self {
            first: Some(n),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn last(n: i64) -> Self {
        Self {
            last: Some(n),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.after = Some(cursor.into());
        self
    }

    #[must_use]
    pub fn before(mut self, cursor: impl Into<String>) -> Self {
        self.before = Some(cursor.into());
        self
    }
}

/// Page size limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationConfig {
    /// Hard upper bound on `first` / `last`. Larger requests are clamped.
    pub max_page_size: u32,
    /// Page size used when neither `first` nor `last` is given.
    pub default_page_size: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_page_size: 100,
            default_page_size: 100,
        }
    }
}

/// A validated request: resolved limit, direction and decoded bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRequest {
    pub limit: usize,
    pub direction: PageDirection,
    pub after: Option<SortKey>,
    pub before: Option<SortKey>,
}

fn positive(argument: &'static str, value: Option<i64>) -> Result<Option<u64>, ValidationError> {
    match value {
        None => Ok(None),
        Some(v) if v <= 0 => Err(ValidationError::NonPositive { argument, value: v }),
        Some(v) => Ok(Some(v.unsigned_abs())),
    }
}

fn decode(
    descriptor: &SortKeyDescriptor,
    side: CursorSide,
    token: Option<&str>,
) -> Result<Option<SortKey>, PageError> {
    token
        .map(|t| {
            descriptor
                .decode(t)
                .map_err(|source| PageError::CursorDecode { side, source })
        })
        .transpose()
}

/// Validates `request` and resolves it against `descriptor` and `config`.
///
/// `last` pages backward and `first` pages forward. With neither, the request
/// pages backward only when `before` is the sole cursor. Both cursors may be
/// present; their bounds intersect.
///
/// # Errors
///
/// - [`ValidationError::FirstAndLast`] when both sizes are set.
/// - [`ValidationError::NonPositive`] when a size is zero or negative.
/// - [`PageError::CursorDecode`] naming the side whose cursor is malformed.
pub fn normalize(
    request: &PageRequest,
    descriptor: &SortKeyDescriptor,
    config: &PaginationConfig,
) -> Result<NormalizedRequest, PageError> {
    if request.first.is_some() && request.last.is_some() {
        return Err(ValidationError::FirstAndLast.into());
    }
    let first = positive("first", request.first)?;
    let last = positive("last", request.last)?;

    let direction = match (first, last) {
        (_, Some(_)) => PageDirection::Backward,
        (Some(_), None) => PageDirection::Forward,
        (None, None) if request.before.is_some() && request.after.is_none() => {
            PageDirection::Backward
        }
        (None, None) => PageDirection::Forward,
    };

    let max = u64::from(config.max_page_size.max(1));
    let requested = first
        .or(last)
        .unwrap_or_else(|| u64::from(config.default_page_size.max(1)));
    if requested > max {
        tracing::debug!(requested, max, "clamping page size");
    }
    // `max` came from a u32, so the clamped value always fits in usize.
    #[allow(clippy::cast_possible_truncation)]
    let limit = requested.min(max) as usize;

    let after = decode(descriptor, CursorSide::After, request.after.as_deref())?;
    let before = decode(descriptor, CursorSide::Before, request.before.as_deref())?;

    Ok(NormalizedRequest {
        limit,
        direction,
        after,
        before,
    })
}
