//! Replenishment: per-location thresholds, the low-stock advisor and the
//! auto-replenishment planner.
//!
//! Everything here is a pure, read-side computation. The engine in
//! `stockledger-infra` gathers the inputs inside a transaction and turns the
//! planner's decisions into shipping instructions and inbound plans.

pub mod advisor;
pub mod criteria;
pub mod planner;

pub use advisor::{LowStockAdvisor, LowStockAlert};
pub use criteria::{CriteriaFilter, CriteriaInput, ReplenishmentCriteria};
pub use planner::{
    PlannedAction, ReplenishmentAction, ReplenishmentPlan, ReplenishmentPlanner, SkipReason,
    SkippedAlert,
};
