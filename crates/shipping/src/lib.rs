//! Shipping instructions (warehouse → store transfer requests).
//!
//! Business rules only (no IO, no storage). Confirmation moves stock through
//! the ledger engine in `stockledger-infra`.

pub mod instruction;

pub use instruction::{CreateShippingInstruction, ShippingInstruction, ShippingStatus};
