use core::str::FromStr;

use serde::{Deserialize, Serialize};
use stockledger_core::DomainError;

/// Business meaning of a history record.
///
/// Metadata only: the kind never changes the movement arithmetic, it only
/// tells readers which workflow produced the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Sale,
    CustomerReturn,
    ShipRequestCreated,
    Reserve,
    ShipConfirmed,
    GoodsReceived,
    Shelved,
    StoreReturnSent,
    ReturnReceived,
    ReturnInspected,
}

impl OperationKind {
    pub const ALL: [OperationKind; 10] = [
        OperationKind::Sale,
        OperationKind::CustomerReturn,
        OperationKind::ShipRequestCreated,
        OperationKind::Reserve,
        OperationKind::ShipConfirmed,
        OperationKind::GoodsReceived,
        OperationKind::Shelved,
        OperationKind::StoreReturnSent,
        OperationKind::ReturnReceived,
        OperationKind::ReturnInspected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Sale => "sale",
            OperationKind::CustomerReturn => "customer-return",
            OperationKind::ShipRequestCreated => "ship-request-created",
            OperationKind::Reserve => "reserve",
            OperationKind::ShipConfirmed => "ship-confirmed",
            OperationKind::GoodsReceived => "goods-received",
            OperationKind::Shelved => "shelved",
            OperationKind::StoreReturnSent => "store-return-sent",
            OperationKind::ReturnReceived => "return-received",
            OperationKind::ReturnInspected => "return-inspected",
        }
    }

    /// Kinds that never move stock.
    pub fn is_informational(&self) -> bool {
        matches!(self, OperationKind::ShipRequestCreated)
    }
}

impl core::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DomainError::validation("kind", format!("unknown operation kind '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_serde() {
        for kind in OperationKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            assert_eq!(kind.as_str().parse::<OperationKind>().unwrap(), kind);
        }
    }

    #[test]
    fn only_ship_request_is_informational() {
        let informational: Vec<_> = OperationKind::ALL
            .into_iter()
            .filter(OperationKind::is_informational)
            .collect();
        assert_eq!(informational, vec![OperationKind::ShipRequestCreated]);
    }
}
