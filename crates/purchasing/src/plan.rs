use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    Actor, ActorRole, DomainError, DomainResult, InboundPlanId, ProductId, ensure_not_blank,
    ensure_positive,
};
use stockledger_inventory::GradedQuantity;

/// Inbound plan status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundPlanStatus {
    Pending,
    Completed,
    Canceled,
}

impl InboundPlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboundPlanStatus::Pending => "pending",
            InboundPlanStatus::Completed => "completed",
            InboundPlanStatus::Canceled => "canceled",
        }
    }
}

impl FromStr for InboundPlanStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InboundPlanStatus::Pending),
            "completed" => Ok(InboundPlanStatus::Completed),
            "canceled" => Ok(InboundPlanStatus::Canceled),
            other => Err(DomainError::validation(
                "status",
                format!("unknown inbound plan status '{other}'"),
            )),
        }
    }
}

/// Command: CreateInboundPlan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInboundPlan {
    pub product_id: ProductId,
    pub supplier: String,
    pub planned_quantity: i64,
    pub due_date: Option<NaiveDate>,
    pub actor: Actor,
}

/// Expected supplier delivery, fulfilled by one or more receipts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundPlan {
    pub id: InboundPlanId,
    pub product_id: ProductId,
    pub supplier: String,
    pub planned_quantity: i64,
    /// Monotonically non-decreasing, never above `planned_quantity`.
    pub received_quantity: i64,
    pub due_date: Option<NaiveDate>,
    pub status: InboundPlanStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InboundPlan {
    pub fn create(
        id: InboundPlanId,
        cmd: &CreateInboundPlan,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        cmd.actor
            .ensure_role(&[ActorRole::Warehouse], "create inbound plans")?;
        ensure_positive("planned_quantity", cmd.planned_quantity)?;
        ensure_not_blank("supplier", &cmd.supplier)?;

        Ok(Self {
            id,
            product_id: cmd.product_id,
            supplier: cmd.supplier.trim().to_string(),
            planned_quantity: cmd.planned_quantity,
            received_quantity: 0,
            due_date: cmd.due_date,
            status: InboundPlanStatus::Pending,
            created_by: cmd.actor.id().to_string(),
            created_at: at,
            updated_at: at,
        })
    }

    pub fn remaining(&self) -> i64 {
        self.planned_quantity - self.received_quantity
    }

    pub fn is_pending(&self) -> bool {
        self.status == InboundPlanStatus::Pending
    }

    fn ensure_pending(&self) -> DomainResult<()> {
        if !self.is_pending() {
            return Err(DomainError::invalid_state(format!(
                "inbound plan {} is {}",
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }

    /// Count a receipt against the plan; completes it when fully received.
    pub fn record_receipt(&mut self, received: &GradedQuantity, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_pending()?;

        // Invariant: received-to-date is capped at the planned quantity.
        let remaining = self.remaining();
        if received.total() > remaining {
            return Err(DomainError::validation(
                "quantity",
                format!(
                    "receipt of {} exceeds remaining quantity {}",
                    received.total(),
                    remaining
                ),
            ));
        }

        self.received_quantity += received.total();
        if self.received_quantity == self.planned_quantity {
            self.status = InboundPlanStatus::Completed;
        }
        self.updated_at = at;
        Ok(())
    }

    /// pending → canceled. Balances are untouched.
    pub fn cancel(&mut self, actor: &Actor, at: DateTime<Utc>) -> DomainResult<()> {
        actor.ensure_role(&[ActorRole::Warehouse], "cancel inbound plans")?;
        self.ensure_pending()?;
        self.status = InboundPlanStatus::Canceled;
        self.updated_at = at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn plan(planned: i64) -> InboundPlan {
        let cmd = CreateInboundPlan {
            product_id: ProductId::new(),
            supplier: "Acme Textiles".to_string(),
            planned_quantity: planned,
            due_date: NaiveDate::from_ymd_opt(2026, 5, 1),
            actor: Actor::warehouse("wh-1"),
        };
        InboundPlan::create(InboundPlanId::new(), &cmd, test_time()).unwrap()
    }

    #[test]
    fn partial_receipt_stays_pending() {
        let mut plan = plan(20);
        plan.record_receipt(&GradedQuantity::new(12, 3).unwrap(), test_time())
            .unwrap();
        assert_eq!(plan.received_quantity, 15);
        assert_eq!(plan.remaining(), 5);
        assert_eq!(plan.status, InboundPlanStatus::Pending);
    }

    #[test]
    fn full_receipt_completes_the_plan() {
        let mut plan = plan(20);
        plan.record_receipt(&GradedQuantity::new(15, 0).unwrap(), test_time())
            .unwrap();
        plan.record_receipt(&GradedQuantity::new(4, 1).unwrap(), test_time())
            .unwrap();
        assert_eq!(plan.status, InboundPlanStatus::Completed);

        let err = plan
            .record_receipt(&GradedQuantity::new(1, 0).unwrap(), test_time())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn over_receipt_is_rejected_without_changes() {
        let mut plan = plan(10);
        let before = plan.clone();
        let err = plan
            .record_receipt(&GradedQuantity::new(9, 2).unwrap(), test_time())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { ref field, .. } if field == "quantity"));
        assert_eq!(plan, before);
    }

    #[test]
    fn cancel_only_from_pending() {
        let mut plan = plan(10);
        assert!(matches!(
            plan.cancel(&Actor::store("s"), test_time()),
            Err(DomainError::Unauthorized(_))
        ));
        plan.cancel(&Actor::warehouse("wh"), test_time()).unwrap();
        assert_eq!(plan.status, InboundPlanStatus::Canceled);
        assert!(plan.cancel(&Actor::warehouse("wh"), test_time()).is_err());
    }

    #[test]
    fn create_requires_supplier_and_positive_quantity() {
        let mut cmd = CreateInboundPlan {
            product_id: ProductId::new(),
            supplier: " ".to_string(),
            planned_quantity: 5,
            due_date: None,
            actor: Actor::admin("ops"),
        };
        assert!(InboundPlan::create(InboundPlanId::new(), &cmd, test_time()).is_err());
        cmd.supplier = "Acme".to_string();
        cmd.planned_quantity = 0;
        assert!(InboundPlan::create(InboundPlanId::new(), &cmd, test_time()).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        #[test]
        fn received_never_exceeds_planned(
            planned in 1i64..200,
            receipts in prop::collection::vec((0i64..60, 0i64..20), 0..20),
        ) {
            let mut plan = plan(planned);
            for (good, defect) in receipts {
                if let Ok(graded) = GradedQuantity::new(good, defect) {
                    let _ = plan.record_receipt(&graded, test_time());
                }
                prop_assert!(plan.received_quantity <= plan.planned_quantity);
                prop_assert_eq!(
                    plan.status == InboundPlanStatus::Completed,
                    plan.received_quantity == plan.planned_quantity
                );
            }
        }
    }
}
