//! Balances as a fold over history.
//!
//! Stored balances are a materialized fast path; replaying the audit log must
//! always reproduce them exactly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::balance::{Balance, BalanceKey};
use crate::history::HistoryEntry;

/// Replay history rows into per-key quantities.
pub fn fold_history<'a, I>(entries: I) -> BTreeMap<BalanceKey, i64>
where
    I: IntoIterator<Item = &'a HistoryEntry>,
{
    let mut folded = BTreeMap::new();
    for entry in entries {
        if let Some(key) = entry.debit_key() {
            *folded.entry(key).or_insert(0) -= entry.quantity;
        }
        if let Some(key) = entry.credit_key() {
            *folded.entry(key).or_insert(0) += entry.quantity;
        }
    }
    folded
}

/// A key whose stored balance disagrees with the replayed history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDrift {
    pub key: BalanceKey,
    pub stored: i64,
    pub expected: i64,
}

/// Compare stored balances with a fold. Zero and absent are the same.
pub fn drift(stored: &[Balance], folded: &BTreeMap<BalanceKey, i64>) -> Vec<BalanceDrift> {
    let stored_map: BTreeMap<BalanceKey, i64> =
        stored.iter().map(|b| (b.key, b.quantity)).collect();

    let mut keys: Vec<BalanceKey> = stored_map.keys().chain(folded.keys()).copied().collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .filter_map(|key| {
            let stored = stored_map.get(&key).copied().unwrap_or(0);
            let expected = folded.get(&key).copied().unwrap_or(0);
            (stored != expected).then_some(BalanceDrift {
                key,
                stored,
                expected,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::NewHistoryEntry;
    use crate::kind::OperationKind;
    use crate::movement::Movement;
    use crate::state::InventoryState;
    use chrono::Utc;
    use stockledger_core::{Actor, HistoryEntryId, LocationId, ProductId};

    fn entry(seq: i64, kind: OperationKind, movement: Movement) -> HistoryEntry {
        let new = NewHistoryEntry::for_movement(kind, &movement, &Actor::admin("ops"), Utc::now());
        HistoryEntry::recorded(HistoryEntryId::new(), seq, new)
    }

    #[test]
    fn receipt_then_sale_folds_to_the_remainder() {
        let product = ProductId::new();
        let shelf = LocationId::new();
        let receipt =
            Movement::in_place(product, shelf, None, Some(InventoryState::Normal), 10).unwrap();
        let sale =
            Movement::in_place(product, shelf, Some(InventoryState::Normal), None, 3).unwrap();
        let info = HistoryEntry::recorded(
            HistoryEntryId::new(),
            3,
            NewHistoryEntry::informational(
                OperationKind::ShipRequestCreated,
                product,
                5,
                &Actor::store("s"),
                Utc::now(),
            ),
        );

        let history = vec![
            entry(1, OperationKind::GoodsReceived, receipt),
            entry(2, OperationKind::Sale, sale),
            info,
        ];
        let folded = fold_history(&history);
        let key = BalanceKey::new(product, shelf, InventoryState::Normal);
        assert_eq!(folded.get(&key), Some(&7));
        assert_eq!(folded.len(), 1);
    }

    #[test]
    fn drift_reports_only_mismatches() {
        let key = BalanceKey::new(ProductId::new(), LocationId::new(), InventoryState::Defective);
        let other = BalanceKey::new(ProductId::new(), LocationId::new(), InventoryState::Normal);
        let stored = vec![
            Balance {
                key,
                quantity: 4,
                updated_at: Utc::now(),
            },
            Balance {
                key: other,
                quantity: 0,
                updated_at: Utc::now(),
            },
        ];
        let mut folded = BTreeMap::new();
        folded.insert(key, 3);

        let drifts = drift(&stored, &folded);
        assert_eq!(
            drifts,
            vec![BalanceDrift {
                key,
                stored: 4,
                expected: 3
            }]
        );
    }
}
