//! Applies chain events to the list tables.

use std::sync::Arc;

use keyset_core::{Row, Value};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::indexer::events::{ChainEvent, EventLog};
use crate::service::domain::{aftermarket, privileges, rewards, stakes, vehicles};
use crate::traits::RowSink;

/// Turns [`EventLog`]s into row writes on a [`RowSink`].
///
/// Logs must arrive in chain order. The handler remembers the position of
/// the last applied log and skips anything at or before it, so a log file
/// can be replayed over a store that already holds part of it.
pub struct EventHandler {
    sink: Arc<dyn RowSink>,
    checkpoint: Mutex<Option<(u64, u32)>>,
}

impl EventHandler {
    #[must_use]
    pub fn new(sink: Arc<dyn RowSink>) -> Self {
        Self {
            sink,
            checkpoint: Mutex::new(None),
        }
    }

    /// Starts from a known position instead of the beginning of the chain.
    #[must_use]
    pub fn resume_after(self, position: (u64, u32)) -> Self {
        *self.checkpoint.lock() = Some(position);
        self
    }

    /// Position of the last applied log.
    #[must_use]
    pub fn checkpoint(&self) -> Option<(u64, u32)> {
        *self.checkpoint.lock()
    }

    /// Applies one log. Returns `false` if it was skipped as already applied.
    ///
    /// # Errors
    ///
    /// Propagates sink failures; the checkpoint is not advanced past a
    /// failed log.
    pub async fn handle(&self, log: &EventLog) -> anyhow::Result<bool> {
        if self.checkpoint().is_some_and(|done| log.position() <= done) {
            debug!(
                block = log.block_number,
                log_index = log.log_index,
                "skipping applied log"
            );
            return Ok(false);
        }

        self.apply(log).await?;
        *self.checkpoint.lock() = Some(log.position());
        debug!(
            block = log.block_number,
            log_index = log.log_index,
            event = log.event.name(),
            "applied log"
        );
        Ok(true)
    }

    /// Writes a partial row. Events for keys this store never saw minted
    /// (e.g. before the replay window) are dropped.
    async fn update(
        &self,
        log: &EventLog,
        table: &'static str,
        key_column: &'static str,
        row: Row,
    ) -> anyhow::Result<()> {
        let key = row.get(key_column).cloned().unwrap_or(Value::Null);
        if !self.sink.update(table, key_column, row).await? {
            warn!(
                block = log.block_number,
                log_index = log.log_index,
                event = log.event.name(),
                table,
                key = %key,
                "no row to update, event ignored"
            );
        }
        Ok(())
    }

    async fn apply(&self, log: &EventLog) -> anyhow::Result<()> {
        let at = Value::Timestamp(log.block_time_ms);
        match &log.event {
            ChainEvent::VehicleMinted {
                token_id,
                owner,
                manufacturer_id,
                make,
                model,
                year,
            } => {
                let row = Row::new()
                    .with("id", *token_id)
                    .with("owner", *owner)
                    .with("manufacturer_id", *manufacturer_id)
                    .with("make", make.clone())
                    .with("model", model.clone())
                    .with("year", *year)
                    .with("minted_at", at);
                self.sink.upsert(vehicles::TABLE, vehicles::KEY, row).await
            }
            ChainEvent::VehicleTransferred { token_id, to } => {
                let row = Row::new().with("id", *token_id).with("owner", *to);
                self.update(log, vehicles::TABLE, vehicles::KEY, row).await
            }
            ChainEvent::VehicleBurned { token_id } => {
                self.sink
                    .delete(vehicles::TABLE, vehicles::KEY, Value::Int(*token_id))
                    .await
            }
            ChainEvent::AftermarketDeviceMinted {
                token_id,
                address,
                owner,
                manufacturer_id,
                serial,
            } => {
                let row = Row::new()
                    .with("id", *token_id)
                    .with("address", *address)
                    .with("owner", *owner)
                    .with("manufacturer_id", *manufacturer_id)
                    .with("serial", serial.clone())
                    .with("minted_at", at);
                self.sink.upsert(aftermarket::TABLE, aftermarket::KEY, row).await
            }
            ChainEvent::AftermarketDevicePaired {
                token_id,
                vehicle_id,
            } => {
                let row = Row::new()
                    .with("id", *token_id)
                    .with("vehicle_id", *vehicle_id);
                self.update(log, aftermarket::TABLE, aftermarket::KEY, row).await
            }
            ChainEvent::PrivilegeSet {
                token_id,
                privilege_id,
                grantee,
                expires_at,
            } => {
                let row = Row::new()
                    .with(
                        privileges::KEY,
                        privileges::grant_id(*token_id, *privilege_id, grantee),
                    )
                    .with("token_id", *token_id)
                    .with("privilege_id", *privilege_id)
                    .with("grantee", *grantee)
                    .with("set_at", at)
                    .with("expires_at", Value::Timestamp(*expires_at));
                self.sink.upsert(privileges::TABLE, privileges::KEY, row).await
            }
            ChainEvent::StakeCreated {
                stake_id,
                owner,
                level,
                amount,
                vehicle_id,
                ends_at,
            } => {
                let row = Row::new()
                    .with("id", *stake_id)
                    .with("owner", *owner)
                    .with("level", *level)
                    .with("amount", amount.as_str())
                    .with("vehicle_id", *vehicle_id)
                    .with("staked_at", at)
                    .with("ends_at", Value::Timestamp(*ends_at));
                self.sink.upsert(stakes::TABLE, stakes::KEY, row).await
            }
            ChainEvent::StakeWithdrawn { stake_id } => {
                let row = Row::new().with("id", *stake_id).with("withdrawn_at", at);
                self.update(log, stakes::TABLE, stakes::KEY, row).await
            }
            ChainEvent::RewardIssued {
                recipient,
                vehicle_id,
                week,
                amount,
            } => {
                let row = Row::new()
                    .with(rewards::KEY, rewards::reward_id(&log.tx_hash, log.log_index))
                    .with("recipient", *recipient)
                    .with("vehicle_id", *vehicle_id)
                    .with("week", *week)
                    .with("amount", amount.as_str())
                    .with("issued_at", at);
                self.sink.upsert(rewards::TABLE, rewards::KEY, row).await
            }
        }
    }
}
