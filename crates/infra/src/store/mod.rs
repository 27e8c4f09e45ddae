//! Transactional storage boundary for the ledger.
//!
//! The engine never talks to a database directly: it opens a [`LedgerTx`] via
//! [`LedgerStore::begin`], performs locked reads and writes, and commits.
//! Dropping a transaction without committing rolls it back, so an early `?`
//! return leaves no partial effect.
//!
//! Two implementations exist:
//! - [`InMemoryLedgerStore`]: one async mutex over the whole state (tests/dev)
//! - [`PostgresLedgerStore`]: read committed + `SELECT ... FOR UPDATE`

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use stockledger_catalog::{Location, Product};
use stockledger_core::{InboundPlanId, LocationId, ProductId, ShippingInstructionId};
use stockledger_inventory::{
    Balance, BalanceFilter, BalanceKey, HistoryEntry, HistoryFilter, NewHistoryEntry,
};
use stockledger_purchasing::{InboundPlan, InboundPlanStatus};
use stockledger_replenishment::{CriteriaFilter, ReplenishmentCriteria};
use stockledger_shipping::{ShippingInstruction, ShippingStatus};

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;

/// Storage-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Serialization failure or deadlock; safe to retry the whole transaction.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// Unique constraint violated.
    #[error("duplicate value: {0}")]
    Duplicate(String),

    /// Lock wait or statement exceeded the configured bound.
    #[error("transaction timed out: {0}")]
    Timeout(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// One open transaction.
///
/// `*_for_update` reads lock the row until commit/rollback. Balance locks are
/// taken even for rows that do not exist yet (absent means zero).
#[async_trait]
pub trait LedgerTx: Send {
    // Balances
    async fn balance_for_update(&mut self, key: BalanceKey) -> Result<i64, StoreError>;
    async fn put_balance(
        &mut self,
        key: BalanceKey,
        quantity: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn balances(&mut self, filter: &BalanceFilter) -> Result<Vec<Balance>, StoreError>;

    // History (append-only)
    async fn append_history(&mut self, entry: NewHistoryEntry) -> Result<HistoryEntry, StoreError>;
    /// Newest first.
    async fn history(&mut self, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>, StoreError>;

    // Products
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;
    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;
    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError>;
    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError>;
    async fn products(&mut self) -> Result<Vec<Product>, StoreError>;

    // Locations
    async fn location(&mut self, id: LocationId) -> Result<Option<Location>, StoreError>;
    async fn location_for_update(&mut self, id: LocationId) -> Result<Option<Location>, StoreError>;
    async fn insert_location(&mut self, location: &Location) -> Result<(), StoreError>;
    async fn update_location(&mut self, location: &Location) -> Result<(), StoreError>;
    /// Ordered by display order, then code.
    async fn locations(&mut self) -> Result<Vec<Location>, StoreError>;

    // Shipping instructions
    async fn shipping_instruction(
        &mut self,
        id: ShippingInstructionId,
    ) -> Result<Option<ShippingInstruction>, StoreError>;
    async fn shipping_instruction_for_update(
        &mut self,
        id: ShippingInstructionId,
    ) -> Result<Option<ShippingInstruction>, StoreError>;
    async fn insert_shipping_instruction(
        &mut self,
        instruction: &ShippingInstruction,
    ) -> Result<(), StoreError>;
    async fn update_shipping_instruction(
        &mut self,
        instruction: &ShippingInstruction,
    ) -> Result<(), StoreError>;
    /// Oldest first.
    async fn shipping_instructions(
        &mut self,
        status: Option<ShippingStatus>,
    ) -> Result<Vec<ShippingInstruction>, StoreError>;

    // Inbound plans
    async fn inbound_plan(&mut self, id: InboundPlanId) -> Result<Option<InboundPlan>, StoreError>;
    async fn inbound_plan_for_update(
        &mut self,
        id: InboundPlanId,
    ) -> Result<Option<InboundPlan>, StoreError>;
    async fn insert_inbound_plan(&mut self, plan: &InboundPlan) -> Result<(), StoreError>;
    async fn update_inbound_plan(&mut self, plan: &InboundPlan) -> Result<(), StoreError>;
    /// Oldest first.
    async fn inbound_plans(
        &mut self,
        status: Option<InboundPlanStatus>,
    ) -> Result<Vec<InboundPlan>, StoreError>;

    // Replenishment criteria
    async fn upsert_criteria(&mut self, criteria: &ReplenishmentCriteria) -> Result<(), StoreError>;
    async fn criteria(
        &mut self,
        filter: &CriteriaFilter,
    ) -> Result<Vec<ReplenishmentCriteria>, StoreError>;

    // Workflow locks, held until commit/rollback.
    /// Serialize auto-replenishment runs against each other.
    async fn lock_replenishment(&mut self) -> Result<(), StoreError>;
    /// Serialize new shipping instructions for one (product, destination).
    async fn lock_shipping_target(
        &mut self,
        product_id: ProductId,
        destination_id: LocationId,
    ) -> Result<(), StoreError>;

    /// Make every write visible atomically. The transaction is finished
    /// afterwards; further calls fail.
    async fn commit(&mut self) -> Result<(), StoreError>;
}

/// Factory for transactions.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        (**self).begin().await
    }
}
