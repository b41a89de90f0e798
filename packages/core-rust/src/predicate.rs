//! Store-agnostic filter expressions.
//!
//! A [`Predicate`] is built by the planner (cursor bounds) and by entity
//! catalogs (base filters), then evaluated by whichever store executes the
//! plan: the in-memory engine walks it directly, the SQL renderer turns it
//! into a parameterised `WHERE` clause.

use std::cmp::Ordering;
use std::fmt;

use crate::types::Value;

/// Binary comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Whether `lhs.cmp(rhs) == ordering` satisfies this operator.
    #[must_use]
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// Boolean filter over a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Matches every row.
    True,
    /// `column <op> value`. A NULL column never satisfies a comparison.
    Compare {
        column: &'static str,
        op: CompareOp,
        value: Value,
    },
    /// `column IN (values)`.
    In {
        column: &'static str,
        values: Vec<Value>,
    },
    /// `column IS NULL` (or `IS NOT NULL` when `negated`).
    IsNull { column: &'static str, negated: bool },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    /// Semi-join: some row of `table` has `foreign == this.local` and
    /// satisfies `filter`. Crossing a one-to-many relation this way is what
    /// makes a base filter require a distinct count.
    Related {
        table: &'static str,
        local: &'static str,
        foreign: &'static str,
        filter: Box<Predicate>,
    },
}

impl Predicate {
    #[must_use]
    pub fn compare(column: &'static str, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            column,
            op,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn equals(column: &'static str, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    #[must_use]
    pub fn is_in(column: &'static str, values: Vec<Value>) -> Self {
        Self::In { column, values }
    }

    #[must_use]
    pub fn is_null(column: &'static str) -> Self {
        Self::IsNull {
            column,
            negated: false,
        }
    }

    #[must_use]
    pub fn related(
        table: &'static str,
        local: &'static str,
        foreign: &'static str,
        filter: Predicate,
    ) -> Self {
        Self::Related {
            table,
            local,
            foreign,
            filter: Box::new(filter),
        }
    }

    /// Conjunction that flattens nested `And`s and drops `True`.
    ///
    /// Returns `True` for no conjuncts and the sole conjunct for one.
    #[must_use]
    pub fn all(parts: Vec<Predicate>) -> Self {
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Self::True => {}
                Self::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Self::True,
            1 => flat.pop().unwrap_or(Self::True),
            _ => Self::And(flat),
        }
    }

    /// Disjunction that flattens nested `Or`s; any `True` makes it `True`.
    ///
    /// An empty disjunction matches nothing.
    #[must_use]
    pub fn any(parts: Vec<Predicate>) -> Self {
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Self::True => return Self::True,
                Self::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.pop().unwrap_or(Self::True)
        } else {
            Self::Or(flat)
        }
    }

    /// `self AND other`.
    #[must_use]
    pub fn and(self, other: Predicate) -> Self {
        Self::all(vec![self, other])
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => f.write_str("TRUE"),
            Self::Compare { column, op, value } => {
                write!(f, "{column} {} {value}", op.as_sql())
            }
            Self::In { column, values } => {
                write!(f, "{column} IN (")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str(")")
            }
            Self::IsNull { column, negated } => {
                if *negated {
                    write!(f, "{column} IS NOT NULL")
                } else {
                    write!(f, "{column} IS NULL")
                }
            }
            Self::And(parts) => write_joined(f, parts, " AND ", "TRUE"),
            Self::Or(parts) => write_joined(f, parts, " OR ", "FALSE"),
            Self::Related {
                table,
                local,
                foreign,
                filter,
            } => write!(f, "EXISTS {table}({foreign} = {local} AND {filter})"),
        }
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    parts: &[Predicate],
    sep: &str,
    empty: &str,
) -> fmt::Result {
    if parts.is_empty() {
        return f.write_str(empty);
    }
    f.write_str("(")?;
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{p}")?;
    }
    f.write_str(")")
}
