//! Ledger engine (application-level orchestration).
//!
//! `LedgerEngine` composes the pure domain crates with a [`LedgerStore`]. Every
//! mutating operation follows the same pipeline:
//!
//! ```text
//! Command
//!   ↓
//! 1. Validate input and actor (pure, no IO)
//!   ↓
//! 2. Begin transaction
//!   ↓
//! 3. Lock touched rows (balances in key order, then workflow documents)
//!   ↓
//! 4. Decide via domain types (Movement, ShippingInstruction, InboundPlan, ...)
//!   ↓
//! 5. Write balances, document state and history rows
//!   ↓
//! 6. Commit
//! ```
//!
//! Any error before step 6 drops the transaction, which rolls it back: no
//! balance change is ever visible without its history row and vice versa.
//!
//! ## Retries and timeouts
//!
//! Each attempt is bounded by `LedgerConfig::tx_timeout`. Attempts that fail
//! with [`LedgerError::ConcurrencyConflict`] are retried up to `max_retries`
//! times with exponential backoff; every other error surfaces immediately.
//!
//! The bound covers the commit as well. A commit that the database finishes
//! after the deadline is durable even though the caller sees
//! [`LedgerError::Timeout`]; callers must re-read before repeating such an
//! operation.

mod catalog;
mod ledger;
mod queries;
mod receiving;
mod replenishment;
mod shipping;

use std::collections::BTreeMap;
use std::future::Future;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use stockledger_catalog::{Location, Product};
use stockledger_core::{LocationId, ProductId};
use stockledger_inventory::{HistoryEntry, Movement, NewHistoryEntry};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::store::{LedgerStore, LedgerTx};

pub use ledger::{AdjustInventory, InspectReturn, StoreReturn, TransferInventory};
pub use queries::ProductStock;
pub use receiving::ReceiveInboundPlan;
pub use replenishment::ReplenishmentReport;

/// Transactional front door to the stock ledger.
///
/// Generic over the store so tests run against
/// [`InMemoryLedgerStore`](crate::store::InMemoryLedgerStore) and production
/// against [`PostgresLedgerStore`](crate::store::PostgresLedgerStore).
#[derive(Debug, Clone)]
pub struct LedgerEngine<S> {
    store: S,
    config: LedgerConfig,
}

impl<S> LedgerEngine<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Run `attempt` under the transaction timeout, retrying concurrency
    /// conflicts with exponential backoff.
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        let mut retries: u32 = 0;
        loop {
            let outcome = match tokio::time::timeout(self.config.tx_timeout, attempt()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(LedgerError::Timeout(format!(
                    "{operation} exceeded {}ms",
                    self.config.tx_timeout.as_millis()
                ))),
            };

            match outcome {
                Err(err) if err.is_retryable() && retries < self.config.max_retries => {
                    retries += 1;
                    let backoff = self.config.retry_backoff * 2u32.saturating_pow(retries - 1);
                    warn!(
                        operation,
                        attempt = retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "retrying after concurrency conflict"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    debug!(operation, error = %err, "operation rejected");
                    return Err(err);
                }
                Ok(value) => return Ok(value),
            }
        }
    }
}

/// Lock every balance the movement touches (in key order), apply it, and
/// write the new quantities back.
async fn move_stock(
    tx: &mut dyn LedgerTx,
    movement: &Movement,
    at: DateTime<Utc>,
) -> LedgerResult<()> {
    let mut balances = BTreeMap::new();
    for key in movement.touched_keys() {
        let quantity = tx.balance_for_update(key).await?;
        balances.insert(key, quantity);
    }

    movement.apply(&mut balances)?;

    for (key, quantity) in balances {
        tx.put_balance(key, quantity, at).await?;
    }
    Ok(())
}

/// Apply a movement and append its history row in the same transaction.
async fn record_movement(
    tx: &mut dyn LedgerTx,
    movement: &Movement,
    entry: NewHistoryEntry,
) -> LedgerResult<HistoryEntry> {
    move_stock(tx, movement, entry.occurred_at).await?;
    Ok(tx.append_history(entry).await?)
}

async fn load_product(tx: &mut dyn LedgerTx, id: ProductId) -> LedgerResult<Product> {
    tx.product(id)
        .await?
        .ok_or_else(|| LedgerError::not_found(format!("product {id}")))
}

async fn load_location(tx: &mut dyn LedgerTx, id: LocationId) -> LedgerResult<Location> {
    tx.location(id)
        .await?
        .ok_or_else(|| LedgerError::not_found(format!("location {id}")))
}
