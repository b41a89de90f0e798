//! Reward history, most recently issued first.
//!
//! A batch transaction issues many rewards in the same block, so `issued_at`
//! is paired with `reward_id` (transaction hash followed by the big-endian
//! log index) as the tie-breaker.

use keyset_core::{
    BaseFilter, Collection, Column, Predicate, Row, RowError, SortDirection, SortKeyDescriptor,
    ValueKind,
};
use serde::Serialize;

use super::{address_column, Address};

pub const TABLE: &str = "rewards";
pub const KEY: &str = "reward_id";

const COLUMNS: &[Column] = &[
    Column::new("reward_id", ValueKind::Bytes),
    Column::new("recipient", ValueKind::Bytes),
    Column::new("vehicle_id", ValueKind::Int),
    Column::new("week", ValueKind::Int),
    Column::new("amount", ValueKind::Text),
    Column::new("issued_at", ValueKind::Timestamp),
];

#[must_use]
pub fn collection() -> Collection {
    Collection {
        name: "rewards",
        table: TABLE,
        columns: COLUMNS,
        descriptor: SortKeyDescriptor::timestamp_and_bytes("issued_at", KEY, SortDirection::Desc),
    }
}

#[must_use]
pub fn reward_id(tx_hash: &[u8], log_index: u32) -> Vec<u8> {
    let mut id = Vec::with_capacity(tx_hash.len() + 4);
    id.extend_from_slice(tx_hash);
    id.extend_from_slice(&log_index.to_be_bytes());
    id
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub recipient: Address,
    pub vehicle_id: i64,
    pub week: i64,
    pub amount: String,
    pub issued_at: i64,
}

impl Reward {
    /// # Errors
    ///
    /// Returns [`RowError`] if a required column is missing or mistyped.
    pub fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            recipient: address_column(row, "recipient")?,
            vehicle_id: row.int("vehicle_id")?,
            week: row.int("week")?,
            amount: row.text("amount")?,
            issued_at: row.timestamp("issued_at")?,
        })
    }
}

/// `user` and `vehicleId` arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardFilter {
    pub user: Option<Address>,
    pub vehicle_id: Option<i64>,
}

impl RewardFilter {
    #[must_use]
    pub fn base_filter(&self) -> BaseFilter {
        let mut base = BaseFilter::none();
        if let Some(user) = self.user {
            base = base.and(Predicate::equals("recipient", user));
        }
        if let Some(id) = self.vehicle_id {
            base = base.and(Predicate::equals("vehicle_id", id));
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use keyset_core::Value;

    use super::*;
    use crate::service::domain::fixtures::address;

    #[test]
    fn reward_ids_sort_by_log_index_within_a_transaction() {
        let tx = [7u8; 32];
        let a = reward_id(&tx, 2);
        let b = reward_id(&tx, 10);
        assert_eq!(a.len(), 36);
        assert!(a < b);
    }

    #[test]
    fn user_filters_on_recipient() {
        let filter = RewardFilter {
            user: Some(address(8)),
            ..RewardFilter::default()
        };
        assert_eq!(
            filter.base_filter().predicate,
            Predicate::equals("recipient", address(8))
        );
    }

    #[test]
    fn maps_a_row() {
        let row = Row::new()
            .with("reward_id", reward_id(&[1; 32], 0))
            .with("recipient", address(8))
            .with("vehicle_id", 12)
            .with("week", 40)
            .with("amount", "25")
            .with("issued_at", Value::Timestamp(77));
        let reward = Reward::from_row(&row).unwrap();
        assert_eq!(reward.vehicle_id, 12);
        assert_eq!(reward.issued_at, 77);
    }
}
