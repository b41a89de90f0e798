//! Staking positions, newest stake first.

use keyset_core::{
    BaseFilter, Collection, Column, Predicate, Row, RowError, SortDirection, SortKeyDescriptor,
    ValueKind,
};
use serde::Serialize;

use super::{address_column, Address};

pub const TABLE: &str = "stakes";
pub const KEY: &str = "id";

const COLUMNS: &[Column] = &[
    Column::new("id", ValueKind::Int),
    Column::new("owner", ValueKind::Bytes),
    Column::new("level", ValueKind::Int),
    Column::new("amount", ValueKind::Text),
    Column::new("vehicle_id", ValueKind::Int),
    Column::new("staked_at", ValueKind::Timestamp),
    Column::new("ends_at", ValueKind::Timestamp),
    Column::new("withdrawn_at", ValueKind::Timestamp),
];

#[must_use]
pub fn collection() -> Collection {
    Collection {
        name: "stakes",
        table: TABLE,
        columns: COLUMNS,
        descriptor: SortKeyDescriptor::scalar(KEY, SortDirection::Desc),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stake {
    pub stake_id: i64,
    pub owner: Address,
    pub level: i64,
    /// Token amount as a decimal string; exceeds `i64`.
    pub amount: String,
    pub vehicle_id: Option<i64>,
    pub staked_at: i64,
    pub ends_at: i64,
    pub withdrawn_at: Option<i64>,
}

impl Stake {
    /// # Errors
    ///
    /// Returns [`RowError`] if a required column is missing or mistyped.
    pub fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            stake_id: row.int("id")?,
            owner: address_column(row, "owner")?,
            level: row.int("level")?,
            amount: row.text("amount")?,
            vehicle_id: row.opt_int("vehicle_id")?,
            staked_at: row.timestamp("staked_at")?,
            ends_at: row.timestamp("ends_at")?,
            withdrawn_at: row.opt_timestamp("withdrawn_at")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StakeFilter {
    pub owner: Option<Address>,
    pub vehicle_id: Option<i64>,
}

impl StakeFilter {
    #[must_use]
    pub fn base_filter(&self) -> BaseFilter {
        let mut base = BaseFilter::none();
        if let Some(owner) = self.owner {
            base = base.and(Predicate::equals("owner", owner));
        }
        if let Some(id) = self.vehicle_id {
            base = base.and(Predicate::equals("vehicle_id", id));
        }
        base
    }
}
