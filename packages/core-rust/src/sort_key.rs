//! Sort key descriptors: which columns order a collection, in which
//! direction, and how a boundary row bounds the next query.

use std::cmp::Ordering;

use crate::cursor::CursorShape;
use crate::error::{CursorError, RowError};
use crate::predicate::{CompareOp, Predicate};
use crate::types::{Row, Value, ValueKind};

/// Direction of a single ordering column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Returns the opposite direction.
    #[must_use]
    pub fn reversed(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Applies this direction to an ascending comparison result.
    #[must_use]
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

/// Direction the caller is paging in, relative to natural order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageDirection {
    /// Toward the end of natural order (`first` / `after`).
    Forward,
    /// Toward the start of natural order (`last` / `before`).
    Backward,
}

impl PageDirection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

/// Operator bounding a column against a cursor value.
///
/// | field direction | paging    | operator |
/// |-----------------|-----------|----------|
/// | DESC            | forward   | `<`      |
/// | DESC            | backward  | `>`      |
/// | ASC             | forward   | `>`      |
/// | ASC             | backward  | `<`      |
#[must_use]
pub fn bound_op(field: SortDirection, paging: PageDirection) -> CompareOp {
    match (field, paging) {
        (SortDirection::Desc, PageDirection::Forward)
        | (SortDirection::Asc, PageDirection::Backward) => CompareOp::Lt,
        (SortDirection::Desc, PageDirection::Backward)
        | (SortDirection::Asc, PageDirection::Forward) => CompareOp::Gt,
    }
}

/// One ordering column of a sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub column: &'static str,
    pub kind: ValueKind,
    pub direction: SortDirection,
}

/// A concrete sort key value: one [`Value`] per descriptor field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortKey(Vec<Value>);

impl SortKey {
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

/// Static declaration of a collection's total order.
///
/// The final field must be unique per row so that no two rows tie on the
/// whole key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKeyDescriptor {
    shape: CursorShape,
    fields: Vec<SortField>,
    unique_column: &'static str,
}

impl SortKeyDescriptor {
    /// Orders by a single unique integer column.
    #[must_use]
    pub fn scalar(column: &'static str, direction: SortDirection) -> Self {
        Self {
            shape: CursorShape::Scalar,
            fields: vec![SortField {
                column,
                kind: ValueKind::Int,
                direction,
            }],
            unique_column: column,
        }
    }

    /// Orders by a timestamp column, tie-broken by a unique bytes column.
    #[must_use]
    pub fn timestamp_and_bytes(
        timestamp_column: &'static str,
        bytes_column: &'static str,
        direction: SortDirection,
    ) -> Self {
        Self {
            shape: CursorShape::TimestampAndBytes,
            fields: vec![
                SortField {
                    column: timestamp_column,
                    kind: ValueKind::Timestamp,
                    direction,
                },
                SortField {
                    column: bytes_column,
                    kind: ValueKind::Bytes,
                    direction,
                },
            ],
            unique_column: bytes_column,
        }
    }

    /// Overrides the direction of the field at `index`, for mixed orders
    /// such as "newest first, then id ascending". `None` if there is no such
    /// field.
    #[must_use]
    pub fn with_direction(mut self, index: usize, direction: SortDirection) -> Option<Self> {
        self.fields.get_mut(index)?.direction = direction;
        Some(self)
    }

    #[must_use]
    pub fn shape(&self) -> CursorShape {
        self.shape
    }

    #[must_use]
    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    /// The column that is unique per row (the final sort field).
    #[must_use]
    pub fn unique_column(&self) -> &'static str {
        self.unique_column
    }

    /// Reads this descriptor's columns out of a stored row.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] if a column is missing or has the wrong kind.
    pub fn extract(&self, row: &Row) -> Result<SortKey, RowError> {
        self.fields
            .iter()
            .map(|field| {
                let value = row.get(field.column).ok_or_else(|| RowError::MissingColumn {
                    column: field.column.to_string(),
                })?;
                if value.kind() == field.kind {
                    Ok(value.clone())
                } else {
                    Err(RowError::WrongKind {
                        column: field.column.to_string(),
                        expected: field.kind,
                        found: value.kind(),
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(SortKey::new)
    }

    /// Encodes a key into an opaque cursor.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError`] if the key does not match this descriptor's shape.
    pub fn encode(&self, key: &SortKey) -> Result<String, CursorError> {
        self.shape.encode(key)
    }

    /// Decodes an opaque cursor into a key of this descriptor's shape.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError`] if the token is malformed or of another shape.
    pub fn decode(&self, token: &str) -> Result<SortKey, CursorError> {
        self.shape.decode(token)
    }

    /// Compares two keys in natural order.
    #[must_use]
    pub fn compare(&self, a: &SortKey, b: &SortKey) -> Ordering {
        self.fields
            .iter()
            .zip(a.values().iter().zip(b.values()))
            .map(|(field, (x, y))| field.direction.apply(x.cmp(y)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Column order for a query paging in `direction`.
    ///
    /// Forward uses natural order; backward reverses every field so the
    /// store returns rows from the tail of natural order first.
    #[must_use]
    pub fn order_by(&self, direction: PageDirection) -> Vec<(&'static str, SortDirection)> {
        self.fields
            .iter()
            .map(|f| match direction {
                PageDirection::Forward => (f.column, f.direction),
                PageDirection::Backward => (f.column, f.direction.reversed()),
            })
            .collect()
    }

    /// Predicate admitting exactly the rows strictly beyond `key` in `toward`.
    ///
    /// Expands to a lexicographic tuple comparison:
    /// `(a OP1 ka) OR (a = ka AND b OP2 kb) OR ...`, one disjunct per field,
    /// each operator taken from [`bound_op`] for that field's own direction.
    #[must_use]
    pub fn bound(&self, key: &SortKey, toward: PageDirection) -> Predicate {
        let mut disjuncts = Vec::with_capacity(self.fields.len());
        for (level, field) in self.fields.iter().enumerate() {
            let mut conjuncts: Vec<Predicate> = self.fields[..level]
                .iter()
                .zip(key.values())
                .map(|(prefix, value)| Predicate::compare(prefix.column, CompareOp::Eq, value.clone()))
                .collect();
            let value = key.values().get(level).cloned().unwrap_or(Value::Null);
            conjuncts.push(Predicate::compare(
                field.column,
                bound_op(field.direction, toward),
                value,
            ));
            disjuncts.push(Predicate::all(conjuncts));
        }
        Predicate::any(disjuncts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts_key(ts: i64, id: u8) -> SortKey {
        SortKey::new(vec![Value::Timestamp(ts), Value::Bytes(vec![id])])
    }

    #[test]
    fn bound_operator_table() {
        assert_eq!(bound_op(SortDirection::Desc, PageDirection::Forward), CompareOp::Lt);
        assert_eq!(bound_op(SortDirection::Desc, PageDirection::Backward), CompareOp::Gt);
        assert_eq!(bound_op(SortDirection::Asc, PageDirection::Forward), CompareOp::Gt);
        assert_eq!(bound_op(SortDirection::Asc, PageDirection::Backward), CompareOp::Lt);
    }

    #[test]
    fn scalar_bound_is_a_single_comparison() {
        let d = SortKeyDescriptor::scalar("id", SortDirection::Desc);
        let key = SortKey::new(vec![Value::Int(10)]);
        assert_eq!(
            d.bound(&key, PageDirection::Forward),
            Predicate::compare("id", CompareOp::Lt, Value::Int(10))
        );
    }

    #[test]
    fn composite_bound_is_lexicographic_not_and_of_scalars() {
        let d = SortKeyDescriptor::timestamp_and_bytes("set_at", "id", SortDirection::Desc);
        let bound = d.bound(&ts_key(100, 5), PageDirection::Forward);

        let expected = Predicate::any(vec![
            Predicate::compare("set_at", CompareOp::Lt, Value::Timestamp(100)),
            Predicate::all(vec![
                Predicate::compare("set_at", CompareOp::Eq, Value::Timestamp(100)),
                Predicate::compare("id", CompareOp::Lt, Value::Bytes(vec![5])),
            ]),
        ]);
        assert_eq!(bound, expected);
    }

    #[test]
    fn mixed_direction_bound_uses_each_fields_operator() {
        let d = SortKeyDescriptor::timestamp_and_bytes("set_at", "id", SortDirection::Desc)
            .with_direction(1, SortDirection::Asc)
            .unwrap();
        let bound = d.bound(&ts_key(100, 5), PageDirection::Backward);

        let expected = Predicate::any(vec![
            Predicate::compare("set_at", CompareOp::Gt, Value::Timestamp(100)),
            Predicate::all(vec![
                Predicate::compare("set_at", CompareOp::Eq, Value::Timestamp(100)),
                Predicate::compare("id", CompareOp::Lt, Value::Bytes(vec![5])),
            ]),
        ]);
        assert_eq!(bound, expected);
    }

    #[test]
    fn backward_order_reverses_every_field() {
        let d = SortKeyDescriptor::timestamp_and_bytes("set_at", "id", SortDirection::Desc);
        assert_eq!(
            d.order_by(PageDirection::Forward),
            vec![("set_at", SortDirection::Desc), ("id", SortDirection::Desc)]
        );
        assert_eq!(
            d.order_by(PageDirection::Backward),
            vec![("set_at", SortDirection::Asc), ("id", SortDirection::Asc)]
        );
    }

    #[test]
    fn compare_follows_natural_order() {
        let d = SortKeyDescriptor::timestamp_and_bytes("set_at", "id", SortDirection::Desc);
        // newer first
        assert_eq!(d.compare(&ts_key(200, 1), &ts_key(100, 9)), Ordering::Less);
        // tie on timestamp broken by id, also descending
        assert_eq!(d.compare(&ts_key(100, 9), &ts_key(100, 1)), Ordering::Less);
        assert_eq!(d.compare(&ts_key(100, 1), &ts_key(100, 1)), Ordering::Equal);
    }

    #[test]
    fn extract_checks_presence_and_kind() {
        let d = SortKeyDescriptor::timestamp_and_bytes("set_at", "id", SortDirection::Desc);

        let ok = Row::new()
            .with("set_at", Value::Timestamp(5))
            .with("id", vec![1u8]);
        assert_eq!(d.extract(&ok).unwrap(), ts_key(5, 1));

        let missing = Row::new().with("set_at", Value::Timestamp(5));
        assert_eq!(
            d.extract(&missing),
            Err(RowError::MissingColumn {
                column: "id".to_string()
            })
        );

        let wrong = Row::new().with("set_at", 5).with("id", vec![1u8]);
        assert!(matches!(d.extract(&wrong), Err(RowError::WrongKind { .. })));
    }

    #[test]
    fn unique_column_is_the_last_field() {
        let d = SortKeyDescriptor::timestamp_and_bytes("set_at", "grant_id", SortDirection::Desc);
        assert_eq!(d.unique_column(), "grant_id");
        assert_eq!(SortKeyDescriptor::scalar("id", SortDirection::Desc).unique_column(), "id");
    }

    #[test]
    fn with_direction_rejects_missing_field() {
        let d = SortKeyDescriptor::scalar("token_id", SortDirection::Desc);
        assert!(d.clone().with_direction(1, SortDirection::Asc).is_none());

        let flipped = d.with_direction(0, SortDirection::Asc).unwrap();
        assert_eq!(flipped.fields()[0].direction, SortDirection::Asc);
        assert_eq!(flipped.unique_column(), "token_id");
    }
}
