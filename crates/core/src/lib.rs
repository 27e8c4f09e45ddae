//! `stockledger-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model and the explicit actor that every
//! ledger operation is attributed to.

pub mod actor;
pub mod error;
pub mod id;

pub use actor::{Actor, ActorRole};
pub use error::{DomainError, DomainResult, ensure_non_negative, ensure_not_blank, ensure_positive};
pub use id::{HistoryEntryId, InboundPlanId, LocationId, ProductId, ShippingInstructionId};
