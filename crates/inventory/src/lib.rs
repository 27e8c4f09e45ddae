//! Inventory ledger primitives.
//!
//! This crate contains the four-state balance model, the movement arithmetic
//! used by the adjustment engine and the audit-log record types, implemented
//! purely as deterministic domain logic (no IO, no storage).

pub mod balance;
pub mod history;
pub mod kind;
pub mod movement;
pub mod projection;
pub mod state;

pub use balance::{Balance, BalanceFilter, BalanceKey};
pub use history::{HistoryEntry, HistoryFilter, HistoryReference, NewHistoryEntry};
pub use kind::OperationKind;
pub use movement::{GradedQuantity, Movement, Slot};
pub use projection::{BalanceDrift, drift, fold_history};
pub use state::InventoryState;
