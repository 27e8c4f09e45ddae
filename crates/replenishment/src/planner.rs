//! Auto-replenishment planning.
//!
//! Turns low-stock alerts into concrete actions: store shortages become
//! shipping instructions from the primary warehouse, warehouse shortages become
//! inbound plans from the default supplier.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockledger_catalog::{Location, LocationKind, primary_warehouse};
use stockledger_core::{LocationId, ProductId};

use crate::advisor::LowStockAlert;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReplenishmentAction {
    Ship {
        product_id: ProductId,
        source_location_id: LocationId,
        destination_location_id: LocationId,
        quantity: i64,
        requested_by: NaiveDate,
    },
    Purchase {
        product_id: ProductId,
        supplier: String,
        quantity: i64,
        due_date: NaiveDate,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Store shortage but no active warehouse to ship from.
    NoWarehouse,
    /// Both the standard and the recommended quantity are zero.
    NothingToOrder,
    /// A pending inbound plan already covers this product.
    InboundPlanPending,
    /// Alert refers to a location that is missing or inactive.
    UnknownLocation,
    /// A shipping instruction for the same target appeared before this run
    /// could create one.
    AlreadyCovered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub alert: LowStockAlert,
    pub action: ReplenishmentAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedAlert {
    pub alert: LowStockAlert,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplenishmentPlan {
    pub actions: Vec<PlannedAction>,
    pub skipped: Vec<SkippedAlert>,
}

pub struct ReplenishmentPlanner<'a> {
    locations: &'a [Location],
    default_supplier: &'a str,
    date: NaiveDate,
}

impl<'a> ReplenishmentPlanner<'a> {
    pub fn new(locations: &'a [Location], default_supplier: &'a str, date: NaiveDate) -> Self {
        Self {
            locations,
            default_supplier,
            date,
        }
    }

    /// `pending_inbound` holds products that already have a pending inbound plan.
    pub fn plan(
        &self,
        alerts: Vec<LowStockAlert>,
        pending_inbound: &HashSet<ProductId>,
    ) -> ReplenishmentPlan {
        let warehouse = primary_warehouse(self.locations);
        let mut purchasing = pending_inbound.clone();
        let mut plan = ReplenishmentPlan::default();

        for alert in alerts {
            match self.decide(&alert, warehouse, &mut purchasing) {
                Ok(action) => plan.actions.push(PlannedAction { alert, action }),
                Err(reason) => plan.skipped.push(SkippedAlert { alert, reason }),
            }
        }
        plan
    }

    fn decide(
        &self,
        alert: &LowStockAlert,
        warehouse: Option<&Location>,
        purchasing: &mut HashSet<ProductId>,
    ) -> Result<ReplenishmentAction, SkipReason> {
        let location = self
            .locations
            .iter()
            .find(|l| l.id == alert.location_id && l.active)
            .ok_or(SkipReason::UnknownLocation)?;

        let quantity = alert.order_quantity();
        if quantity <= 0 {
            return Err(SkipReason::NothingToOrder);
        }

        match location.kind {
            LocationKind::Store => {
                let warehouse = warehouse.ok_or(SkipReason::NoWarehouse)?;
                Ok(ReplenishmentAction::Ship {
                    product_id: alert.product_id,
                    source_location_id: warehouse.id,
                    destination_location_id: location.id,
                    quantity,
                    requested_by: self.date,
                })
            }
            LocationKind::Warehouse => {
                if !purchasing.insert(alert.product_id) {
                    return Err(SkipReason::InboundPlanPending);
                }
                Ok(ReplenishmentAction::Purchase {
                    product_id: alert.product_id,
                    supplier: self.default_supplier.to_string(),
                    quantity,
                    due_date: self.date,
                })
            }
        }
    }
}
