//! Plain reads and the history/balance reconciliation check.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use stockledger_core::{InboundPlanId, ProductId, ShippingInstructionId};
use stockledger_inventory::{
    Balance, BalanceDrift, BalanceFilter, HistoryEntry, HistoryFilter, InventoryState, drift,
    fold_history,
};
use stockledger_purchasing::{InboundPlan, InboundPlanStatus};
use stockledger_replenishment::{CriteriaFilter, ReplenishmentCriteria};
use stockledger_shipping::{ShippingInstruction, ShippingStatus};

use super::{LedgerEngine, load_product};
use crate::error::{LedgerError, LedgerResult};
use crate::store::LedgerStore;

/// Totals per state for one product across every location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStock {
    pub product_id: ProductId,
    pub by_state: BTreeMap<InventoryState, i64>,
    pub total: i64,
}

impl<S: LedgerStore> LedgerEngine<S> {
    pub async fn balances(&self, filter: BalanceFilter) -> LedgerResult<Vec<Balance>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.balances(&filter).await?)
    }

    /// Newest first.
    pub async fn history(&self, filter: HistoryFilter) -> LedgerResult<Vec<HistoryEntry>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.history(&filter).await?)
    }

    pub async fn replenishment_criteria(
        &self,
        filter: CriteriaFilter,
    ) -> LedgerResult<Vec<ReplenishmentCriteria>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.criteria(&filter).await?)
    }

    pub async fn shipping_instructions(
        &self,
        status: Option<ShippingStatus>,
    ) -> LedgerResult<Vec<ShippingInstruction>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.shipping_instructions(status).await?)
    }

    pub async fn shipping_instruction(
        &self,
        id: ShippingInstructionId,
    ) -> LedgerResult<ShippingInstruction> {
        let mut tx = self.store.begin().await?;
        tx.shipping_instruction(id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("shipping instruction {id}")))
    }

    pub async fn inbound_plans(
        &self,
        status: Option<InboundPlanStatus>,
    ) -> LedgerResult<Vec<InboundPlan>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.inbound_plans(status).await?)
    }

    pub async fn inbound_plan(&self, id: InboundPlanId) -> LedgerResult<InboundPlan> {
        let mut tx = self.store.begin().await?;
        tx.inbound_plan(id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("inbound plan {id}")))
    }

    /// Every state is present in `by_state`, zero when nothing is stocked.
    pub async fn product_stock(&self, product_id: ProductId) -> LedgerResult<ProductStock> {
        let mut tx = self.store.begin().await?;
        load_product(tx.as_mut(), product_id).await?;
        let balances = tx.balances(&BalanceFilter::for_product(product_id)).await?;

        let mut by_state: BTreeMap<InventoryState, i64> =
            InventoryState::ALL.iter().map(|s| (*s, 0)).collect();
        for balance in &balances {
            *by_state.entry(balance.key.state).or_insert(0) += balance.quantity;
        }
        let total = by_state.values().sum();

        Ok(ProductStock {
            product_id,
            by_state,
            total,
        })
    }

    /// Replay the full history and compare it with the stored balances.
    /// An empty result means the two agree.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> LedgerResult<Vec<BalanceDrift>> {
        let mut tx = self.store.begin().await?;
        let history = tx.history(&HistoryFilter::default()).await?;
        let balances = tx.balances(&BalanceFilter::default()).await?;

        let drifts = drift(&balances, &fold_history(&history));
        if drifts.is_empty() {
            info!(entries = history.len(), "balances match history");
        } else {
            warn!(drifted = drifts.len(), "balances diverge from history");
        }
        Ok(drifts)
    }
}
