//! Access grants on a vehicle, most recently set first.
//!
//! Many grants share a `set_at` (one transaction can set several), so the
//! sort key pairs it with `grant_id`, which is unique per
//! `(token, privilege, grantee)`.

use keyset_core::{
    BaseFilter, Collection, Column, Predicate, Row, RowError, SortDirection, SortKeyDescriptor,
    ValueKind,
};
use serde::Serialize;

use super::{address_column, Address};

pub const TABLE: &str = "privileges";
pub const KEY: &str = "grant_id";

const COLUMNS: &[Column] = &[
    Column::new("grant_id", ValueKind::Bytes),
    Column::new("token_id", ValueKind::Int),
    Column::new("privilege_id", ValueKind::Int),
    Column::new("grantee", ValueKind::Bytes),
    Column::new("set_at", ValueKind::Timestamp),
    Column::new("expires_at", ValueKind::Timestamp),
];

#[must_use]
pub fn collection() -> Collection {
    Collection {
        name: "privileges",
        table: TABLE,
        columns: COLUMNS,
        descriptor: SortKeyDescriptor::timestamp_and_bytes("set_at", KEY, SortDirection::Desc),
    }
}

/// Row identity: big-endian token id, big-endian privilege id, grantee.
#[must_use]
pub fn grant_id(token_id: i64, privilege_id: i64, grantee: &Address) -> Vec<u8> {
    let mut id = Vec::with_capacity(36);
    id.extend_from_slice(&token_id.to_be_bytes());
    id.extend_from_slice(&privilege_id.to_be_bytes());
    id.extend_from_slice(grantee.as_bytes());
    id
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Privilege {
    pub token_id: i64,
    pub privilege_id: i64,
    pub grantee: Address,
    pub set_at: i64,
    pub expires_at: i64,
}

impl Privilege {
    /// # Errors
    ///
    /// Returns [`RowError`] if a required column is missing or mistyped.
    pub fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            token_id: row.int("token_id")?,
            privilege_id: row.int("privilege_id")?,
            grantee: address_column(row, "grantee")?,
            set_at: row.timestamp("set_at")?,
            expires_at: row.timestamp("expires_at")?,
        })
    }
}

/// Grants on one vehicle, optionally narrowed to a grantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeFilter {
    pub token_id: i64,
    pub grantee: Option<Address>,
}

impl PrivilegeFilter {
    #[must_use]
    pub fn new(token_id: i64) -> Self {
        Self {
            token_id,
            grantee: None,
        }
    }

    #[must_use]
    pub fn base_filter(&self) -> BaseFilter {
        let mut base = BaseFilter::new(Predicate::equals("token_id", self.token_id));
        if let Some(grantee) = self.grantee {
            base = base.and(Predicate::equals("grantee", grantee));
        }
        base
    }
}
