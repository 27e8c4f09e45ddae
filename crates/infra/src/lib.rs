//! Infrastructure layer: transactional stores, the ledger engine, config.
//!
//! Domain crates stay pure; this crate owns every side effect.

pub mod config;
pub mod engine;
pub mod error;
pub mod store;


pub use config::LedgerConfig;
pub use engine::{
    AdjustInventory, InspectReturn, LedgerEngine, ProductStock, ReceiveInboundPlan,
    ReplenishmentReport, StoreReturn, TransferInventory,
};
pub use error::{LedgerError, LedgerResult};
pub use store::{InMemoryLedgerStore, LedgerStore, LedgerTx, PostgresLedgerStore, StoreError};
