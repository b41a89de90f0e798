//! List types served over HTTP.
//!
//! Each submodule defines one paginated collection: its table and sort key
//! ([`Collection`](keyset_core::Collection)), its record type and row
//! mapping, and its entity filter (turned into a
//! [`BaseFilter`](keyset_core::BaseFilter)).

use std::fmt;

use keyset_core::{ValidationError, Value};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod aftermarket;
pub mod privileges;
pub mod rewards;
pub mod stakes;
pub mod vehicles;

pub use aftermarket::{AftermarketDevice, AftermarketDeviceFilter};
pub use privileges::{Privilege, PrivilegeFilter};
pub use rewards::{Reward, RewardFilter};
pub use stakes::{Stake, StakeFilter};
pub use vehicles::{Vehicle, VehicleFilter};

/// A 20-byte account address, rendered as `0x`-prefixed lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Parses a `0x`-prefixed (or bare) 40-digit hex string.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidArgument`] naming `argument`.
    pub fn parse(argument: &'static str, input: &str) -> Result<Self, ValidationError> {
        let digits = input
            .strip_prefix("0x")
            .or_else(|| input.strip_prefix("0X"))
            .unwrap_or(input);
        let bytes = hex::decode(digits).map_err(|e| ValidationError::InvalidArgument {
            argument,
            message: e.to_string(),
        })?;
        Self::from_slice(&bytes).ok_or_else(|| ValidationError::InvalidArgument {
            argument,
            message: format!("expected 20 bytes, got {}", bytes.len()),
        })
    }

    /// Builds an address from exactly 20 bytes.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 20]>::try_from(bytes).ok().map(Self)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse("address", &s).map_err(serde::de::Error::custom)
    }
}

impl From<Address> for Value {
    fn from(address: Address) -> Self {
        Value::Bytes(address.0.to_vec())
    }
}

/// Reads a non-null address column.
pub(crate) fn address_column(
    row: &keyset_core::Row,
    column: &str,
) -> Result<Address, keyset_core::RowError> {
    let bytes = row.bytes(column)?;
    Address::from_slice(&bytes).ok_or_else(|| keyset_core::RowError::Invalid {
        column: column.to_string(),
        message: format!("expected 20 bytes, got {}", bytes.len()),
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::Address;

    pub fn address(n: u8) -> Address {
        Address([n; 20])
    }
}
