//! Decoded chain events, as read from a JSON-lines event log.
//!
//! Decoding contract logs is upstream's job; each line here is already a
//! typed event plus its block position.

use serde::{Deserialize, Deserializer};

use crate::service::domain::Address;

fn hex_bytes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    let digits = s.strip_prefix("0x").unwrap_or(&s);
    hex::decode(digits).map_err(serde::de::Error::custom)
}

/// Position of an event in the chain. Logs are totally ordered by
/// `(block_number, log_index)`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventLog {
    pub block_number: u64,
    #[serde(deserialize_with = "hex_bytes")]
    pub tx_hash: Vec<u8>,
    pub log_index: u32,
    /// Block timestamp in epoch milliseconds.
    pub block_time_ms: i64,
    pub event: ChainEvent,
}

impl EventLog {
    #[must_use]
    pub fn position(&self) -> (u64, u32) {
        (self.block_number, self.log_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainEvent {
    VehicleMinted {
        token_id: i64,
        owner: Address,
        #[serde(default)]
        manufacturer_id: Option<i64>,
        #[serde(default)]
        make: Option<String>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        year: Option<i64>,
    },
    VehicleTransferred {
        token_id: i64,
        to: Address,
    },
    VehicleBurned {
        token_id: i64,
    },
    AftermarketDeviceMinted {
        token_id: i64,
        address: Address,
        owner: Address,
        #[serde(default)]
        manufacturer_id: Option<i64>,
        #[serde(default)]
        serial: Option<String>,
    },
    /// `vehicle_id: None` unpairs the device.
    AftermarketDevicePaired {
        token_id: i64,
        #[serde(default)]
        vehicle_id: Option<i64>,
    },
    PrivilegeSet {
        token_id: i64,
        privilege_id: i64,
        grantee: Address,
        /// Epoch milliseconds.
        expires_at: i64,
    },
    StakeCreated {
        stake_id: i64,
        owner: Address,
        level: i64,
        amount: String,
        #[serde(default)]
        vehicle_id: Option<i64>,
        ends_at: i64,
    },
    StakeWithdrawn {
        stake_id: i64,
    },
    RewardIssued {
        recipient: Address,
        vehicle_id: i64,
        week: i64,
        amount: String,
    },
}

impl ChainEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::VehicleMinted { .. } => "vehicle_minted",
            Self::VehicleTransferred { .. } => "vehicle_transferred",
            Self::VehicleBurned { .. } => "vehicle_burned",
            Self::AftermarketDeviceMinted { .. } => "aftermarket_device_minted",
            Self::AftermarketDevicePaired { .. } => "aftermarket_device_paired",
            Self::PrivilegeSet { .. } => "privilege_set",
            Self::StakeCreated { .. } => "stake_created",
            Self::StakeWithdrawn { .. } => "stake_withdrawn",
            Self::RewardIssued { .. } => "reward_issued",
        }
    }
}
