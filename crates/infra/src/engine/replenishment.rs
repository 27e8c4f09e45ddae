//! Low-stock alerts and the auto-replenishment batch.

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use stockledger_core::{Actor, LocationId, ProductId};
use stockledger_inventory::{BalanceFilter, InventoryState};
use stockledger_purchasing::{CreateInboundPlan, InboundPlan, InboundPlanStatus};
use stockledger_replenishment::{
    CriteriaFilter, CriteriaInput, LowStockAdvisor, LowStockAlert, ReplenishmentAction,
    ReplenishmentCriteria, ReplenishmentPlanner, SkipReason, SkippedAlert,
};
use stockledger_shipping::{CreateShippingInstruction, ShippingInstruction, ShippingStatus};

use super::receiving::create_inbound_plan_in;
use super::shipping::create_shipping_instruction_in;
use super::{LedgerEngine, load_location, load_product};
use crate::error::LedgerResult;
use crate::store::{LedgerStore, LedgerTx};

/// Outcome of one auto-replenishment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplenishmentReport {
    pub date: NaiveDate,
    pub created_instructions: Vec<ShippingInstruction>,
    pub created_plans: Vec<InboundPlan>,
    pub skipped: Vec<SkippedAlert>,
}

/// Criteria of active products at active locations, compared against NORMAL
/// stock. Pairs already targeted by a pending shipping instruction are covered.
async fn evaluate_alerts(tx: &mut dyn LedgerTx, limit: usize) -> LedgerResult<Vec<LowStockAlert>> {
    let active_products: HashSet<ProductId> = tx
        .products()
        .await?
        .into_iter()
        .filter(|p| p.is_active())
        .map(|p| p.id)
        .collect();
    let active_locations: HashSet<LocationId> = tx
        .locations()
        .await?
        .into_iter()
        .filter(|l| l.active)
        .map(|l| l.id)
        .collect();

    let criteria: Vec<ReplenishmentCriteria> = tx
        .criteria(&CriteriaFilter::default())
        .await?
        .into_iter()
        .filter(|c| {
            active_products.contains(&c.product_id) && active_locations.contains(&c.location_id)
        })
        .collect();

    let normal_stock: HashMap<(ProductId, LocationId), i64> = tx
        .balances(&BalanceFilter::default().with_state(InventoryState::Normal))
        .await?
        .into_iter()
        .map(|b| ((b.key.product_id, b.key.location_id), b.quantity))
        .collect();

    let covered: HashSet<(ProductId, LocationId)> = tx
        .shipping_instructions(Some(ShippingStatus::Pending))
        .await?
        .iter()
        .map(ShippingInstruction::targets)
        .collect();

    Ok(LowStockAdvisor::new(limit).evaluate(&criteria, &normal_stock, &covered))
}

/// Re-read under the target lock: a manual request may have committed after
/// the alerts were evaluated.
async fn target_is_covered(
    tx: &mut dyn LedgerTx,
    product_id: ProductId,
    destination_id: LocationId,
) -> LedgerResult<bool> {
    Ok(tx
        .shipping_instructions(Some(ShippingStatus::Pending))
        .await?
        .iter()
        .any(|si| si.targets() == (product_id, destination_id)))
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Create or replace the criteria for one (product, location).
    #[instrument(
        skip(self, input, actor),
        fields(product_id = %input.product_id, location_id = %input.location_id)
    )]
    pub async fn upsert_replenishment_criteria(
        &self,
        input: CriteriaInput,
        actor: &Actor,
    ) -> LedgerResult<ReplenishmentCriteria> {
        let input = &input;
        self.with_retry("upsert_replenishment_criteria", move || {
            self.try_upsert_criteria(input, actor)
        })
        .await
    }

    async fn try_upsert_criteria(
        &self,
        input: &CriteriaInput,
        actor: &Actor,
    ) -> LedgerResult<ReplenishmentCriteria> {
        actor.ensure_identified()?;
        let criteria = ReplenishmentCriteria::new(input.clone(), Utc::now())?;

        let mut tx = self.store.begin().await?;
        load_product(tx.as_mut(), criteria.product_id).await?;
        load_location(tx.as_mut(), criteria.location_id).await?;
        tx.upsert_criteria(&criteria).await?;
        tx.commit().await?;

        info!(
            min_stock = criteria.min_stock,
            target_stock = criteria.target_stock,
            standard_quantity = criteria.standard_quantity,
            "replenishment criteria saved"
        );
        Ok(criteria)
    }

    /// Read-only: top `alert_limit` shortages, largest first.
    #[instrument(skip(self))]
    pub async fn low_stock_alerts(&self) -> LedgerResult<Vec<LowStockAlert>> {
        self.with_retry("low_stock_alerts", move || self.try_low_stock_alerts())
            .await
    }

    async fn try_low_stock_alerts(&self) -> LedgerResult<Vec<LowStockAlert>> {
        let mut tx = self.store.begin().await?;
        evaluate_alerts(tx.as_mut(), self.config.alert_limit).await
    }

    /// Turn the current alerts into shipping instructions (store shortages)
    /// and inbound plans (warehouse shortages) in one transaction.
    ///
    /// Runs are serialized by the store's replenishment lock, so a shortage is
    /// never covered twice by concurrent runs.
    #[instrument(skip(self, actor), fields(date = %date, actor = %actor))]
    pub async fn auto_replenish(
        &self,
        date: NaiveDate,
        actor: &Actor,
    ) -> LedgerResult<ReplenishmentReport> {
        self.with_retry("auto_replenish", move || self.try_auto_replenish(date, actor))
            .await
    }

    async fn try_auto_replenish(
        &self,
        date: NaiveDate,
        actor: &Actor,
    ) -> LedgerResult<ReplenishmentReport> {
        actor.ensure_role(&[], "run auto-replenishment")?;

        let mut tx = self.store.begin().await?;
        tx.lock_replenishment().await?;
        let alerts = evaluate_alerts(tx.as_mut(), self.config.alert_limit).await?;
        let locations = tx.locations().await?;
        let pending_inbound: HashSet<ProductId> = tx
            .inbound_plans(Some(InboundPlanStatus::Pending))
            .await?
            .iter()
            .map(|p| p.product_id)
            .collect();

        let plan = ReplenishmentPlanner::new(&locations, &self.config.default_supplier, date)
            .plan(alerts, &pending_inbound);

        let memo = format!("auto-replenishment {date}");
        let mut report = ReplenishmentReport {
            date,
            created_instructions: Vec::new(),
            created_plans: Vec::new(),
            skipped: plan.skipped,
        };

        for planned in plan.actions {
            match planned.action {
                ReplenishmentAction::Ship {
                    product_id,
                    source_location_id,
                    destination_location_id,
                    quantity,
                    requested_by,
                } => {
                    tx.lock_shipping_target(product_id, destination_location_id)
                        .await?;
                    if target_is_covered(tx.as_mut(), product_id, destination_location_id).await? {
                        report.skipped.push(SkippedAlert {
                            alert: planned.alert,
                            reason: SkipReason::AlreadyCovered,
                        });
                        continue;
                    }
                    let cmd = CreateShippingInstruction {
                        product_id,
                        source_location_id,
                        destination_location_id,
                        quantity,
                        requested_by: Some(requested_by),
                        memo: Some(memo.clone()),
                        actor: actor.clone(),
                    };
                    let instruction = create_shipping_instruction_in(tx.as_mut(), &cmd).await?;
                    report.created_instructions.push(instruction);
                }
                ReplenishmentAction::Purchase {
                    product_id,
                    supplier,
                    quantity,
                    due_date,
                } => {
                    let cmd = CreateInboundPlan {
                        product_id,
                        supplier,
                        planned_quantity: quantity,
                        due_date: Some(due_date),
                        actor: actor.clone(),
                    };
                    let plan = create_inbound_plan_in(tx.as_mut(), &cmd).await?;
                    report.created_plans.push(plan);
                }
            }
        }
        tx.commit().await?;

        info!(
            instructions = report.created_instructions.len(),
            plans = report.created_plans.len(),
            skipped = report.skipped.len(),
            "auto-replenishment finished"
        );
        Ok(report)
    }
}
