//! Purchasing domain module (inbound supplier plans).
//!
//! This crate contains business rules for inbound plans and their incremental
//! receipts, implemented purely as deterministic domain logic (no IO, no
//! storage).

pub mod plan;

pub use plan::{CreateInboundPlan, InboundPlan, InboundPlanStatus};
