use core::str::FromStr;

use serde::{Deserialize, Serialize};
use stockledger_core::DomainError;

/// Quality/availability state of a unit of stock.
///
/// Closed vocabulary: every unit lives in exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InventoryState {
    /// Sellable / shippable.
    Normal,
    /// Earmarked for a pending shipment.
    Reserved,
    /// Received but not yet graded.
    InInspection,
    /// Excluded from sale.
    Defective,
}

impl InventoryState {
    pub const ALL: [InventoryState; 4] = [
        InventoryState::Normal,
        InventoryState::Reserved,
        InventoryState::InInspection,
        InventoryState::Defective,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryState::Normal => "NORMAL",
            InventoryState::Reserved => "RESERVED",
            InventoryState::InInspection => "IN_INSPECTION",
            InventoryState::Defective => "DEFECTIVE",
        }
    }
}

impl core::fmt::Display for InventoryState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InventoryState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InventoryState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| DomainError::validation("state", format!("unknown inventory state '{s}'")))
    }
}
