//! Aftermarket devices (registry records), newest token first.

use keyset_core::{
    BaseFilter, Collection, Column, Predicate, Row, RowError, SortDirection, SortKeyDescriptor,
    ValueKind,
};
use serde::Serialize;

use super::{address_column, Address};

pub const TABLE: &str = "aftermarket_devices";
pub const KEY: &str = "id";

const COLUMNS: &[Column] = &[
    Column::new("id", ValueKind::Int),
    Column::new("address", ValueKind::Bytes),
    Column::new("owner", ValueKind::Bytes),
    Column::new("manufacturer_id", ValueKind::Int),
    Column::new("serial", ValueKind::Text),
    Column::new("vehicle_id", ValueKind::Int),
    Column::new("minted_at", ValueKind::Timestamp),
];

#[must_use]
pub fn collection() -> Collection {
    Collection {
        name: "aftermarket_devices",
        table: TABLE,
        columns: COLUMNS,
        descriptor: SortKeyDescriptor::scalar(KEY, SortDirection::Desc),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AftermarketDevice {
    pub token_id: i64,
    pub address: Address,
    pub owner: Address,
    pub manufacturer_id: Option<i64>,
    pub serial: Option<String>,
    /// Vehicle the device is currently paired with.
    pub vehicle_id: Option<i64>,
    pub minted_at: i64,
}

impl AftermarketDevice {
    /// # Errors
    ///
    /// Returns [`RowError`] if a required column is missing or mistyped.
    pub fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            token_id: row.int("id")?,
            address: address_column(row, "address")?,
            owner: address_column(row, "owner")?,
            manufacturer_id: row.opt_int("manufacturer_id")?,
            serial: row.opt_text("serial")?,
            vehicle_id: row.opt_int("vehicle_id")?,
            minted_at: row.timestamp("minted_at")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AftermarketDeviceFilter {
    pub owner: Option<Address>,
    pub manufacturer_id: Option<i64>,
}

impl AftermarketDeviceFilter {
    #[must_use]
    pub fn base_filter(&self) -> BaseFilter {
        let mut base = BaseFilter::none();
        if let Some(owner) = self.owner {
            base = base.and(Predicate::equals("owner", owner));
        }
        if let Some(id) = self.manufacturer_id {
            base = base.and(Predicate::equals("manufacturer_id", id));
        }
        base
    }
}
