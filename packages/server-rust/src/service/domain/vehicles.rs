//! Vehicles, newest token first.

use keyset_core::{
    BaseFilter, Collection, Column, CompareOp, Predicate, Row, RowError, SortDirection,
    SortKeyDescriptor, Value, ValueKind,
};
use serde::Serialize;

use super::{address_column, privileges, Address};

pub const TABLE: &str = "vehicles";
pub const KEY: &str = "id";

const COLUMNS: &[Column] = &[
    Column::new("id", ValueKind::Int),
    Column::new("owner", ValueKind::Bytes),
    Column::new("manufacturer_id", ValueKind::Int),
    Column::new("make", ValueKind::Text),
    Column::new("model", ValueKind::Text),
    Column::new("year", ValueKind::Int),
    Column::new("minted_at", ValueKind::Timestamp),
];

#[must_use]
pub fn collection() -> Collection {
    Collection {
        name: "vehicles",
        table: TABLE,
        columns: COLUMNS,
        descriptor: SortKeyDescriptor::scalar(KEY, SortDirection::Desc),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub token_id: i64,
    pub owner: Address,
    pub manufacturer_id: Option<i64>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i64>,
    /// Epoch milliseconds.
    pub minted_at: i64,
}

impl Vehicle {
    /// # Errors
    ///
    /// Returns [`RowError`] if a required column is missing or mistyped.
    pub fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            token_id: row.int("id")?,
            owner: address_column(row, "owner")?,
            manufacturer_id: row.opt_int("manufacturer_id")?,
            make: row.opt_text("make")?,
            model: row.opt_text("model")?,
            year: row.opt_int("year")?,
            minted_at: row.timestamp("minted_at")?,
        })
    }
}

/// `owner`, `privileged` and `manufacturerId` arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VehicleFilter {
    pub owner: Option<Address>,
    /// Only vehicles on which this address holds an unexpired privilege.
    pub privileged: Option<Address>,
    pub manufacturer_id: Option<i64>,
}

impl VehicleFilter {
    /// Builds the base filter. `now_ms` decides which privileges are still
    /// active. A vehicle can carry several grants for the same grantee, so
    /// the `privileged` filter asks for a distinct count.
    #[must_use]
    pub fn base_filter(&self, now_ms: i64) -> BaseFilter {
        let mut base = BaseFilter::none();
        if let Some(owner) = self.owner {
            base = base.and(Predicate::equals("owner", owner));
        }
        if let Some(id) = self.manufacturer_id {
            base = base.and(Predicate::equals("manufacturer_id", id));
        }
        if let Some(grantee) = self.privileged {
            let active = Predicate::all(vec![
                Predicate::equals("grantee", grantee),
                Predicate::compare("expires_at", CompareOp::Gt, Value::Timestamp(now_ms)),
            ]);
            base = base
                .and(Predicate::related(privileges::TABLE, KEY, "token_id", active))
                .distinct();
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::domain::fixtures::address;

    #[test]
    fn empty_filter_matches_everything() {
        assert_eq!(VehicleFilter::default().base_filter(0), BaseFilter::none());
    }

    #[test]
    fn owner_and_manufacturer_are_conjoined() {
        let filter = VehicleFilter {
            owner: Some(address(1)),
            manufacturer_id: Some(42),
            ..VehicleFilter::default()
        };
        let base = filter.base_filter(0);
        assert!(!base.distinct);
        assert_eq!(
            base.predicate,
            Predicate::And(vec![
                Predicate::equals("owner", address(1)),
                Predicate::equals("manufacturer_id", 42),
            ])
        );
    }

    #[test]
    fn privileged_filter_is_a_distinct_semi_join() {
        let filter = VehicleFilter {
            privileged: Some(address(2)),
            ..VehicleFilter::default()
        };
        let base = filter.base_filter(1_000);
        assert!(base.distinct);
        match base.predicate {
            Predicate::Related {
                table,
                local,
                foreign,
                ..
            } => {
                assert_eq!((table, local, foreign), ("privileges", "id", "token_id"));
            }
            other => panic!("expected semi-join, got {other}"),
        }
    }

    #[test]
    fn maps_a_row() {
        let row = Row::new()
            .with("id", 7)
            .with("owner", address(3))
            .with("make", "Ford")
            .with("minted_at", Value::Timestamp(99));
        let vehicle = Vehicle::from_row(&row).unwrap();
        assert_eq!(vehicle.token_id, 7);
        assert_eq!(vehicle.owner, address(3));
        assert_eq!(vehicle.make.as_deref(), Some("Ford"));
        assert_eq!(vehicle.model, None);
        assert_eq!(vehicle.minted_at, 99);
    }
}
