//! Movement arithmetic behind every balance mutation.
//!
//! A [`Movement`] is a validated description of one adjustment: take
//! `quantity` out of an optional source slot and put it into an optional
//! destination slot. Engines read the touched rows (under lock), call
//! [`Movement::debit`] / [`Movement::credit`] and write the results back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use stockledger_core::{DomainError, DomainResult, LocationId, ProductId, ensure_non_negative, ensure_positive};

use crate::balance::BalanceKey;
use crate::state::InventoryState;

/// One side of a movement: a state at a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub location_id: LocationId,
    pub state: InventoryState,
}

impl Slot {
    pub fn new(location_id: LocationId, state: InventoryState) -> Self {
        Self { location_id, state }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub product_id: ProductId,
    pub from: Option<Slot>,
    pub to: Option<Slot>,
    pub quantity: i64,
}

impl Movement {
    /// Validate and build a movement.
    ///
    /// - `quantity` must be positive
    /// - at least one side must be present
    /// - source and destination must differ
    pub fn new(
        product_id: ProductId,
        from: Option<Slot>,
        to: Option<Slot>,
        quantity: i64,
    ) -> DomainResult<Self> {
        ensure_positive("quantity", quantity)?;
        match (from, to) {
            (None, None) => {
                return Err(DomainError::validation(
                    "state",
                    "at least one of fromState/toState is required",
                ));
            }
            (Some(a), Some(b)) if a == b => {
                return Err(DomainError::validation(
                    "state",
                    "source and destination are the same balance",
                ));
            }
            _ => {}
        }
        Ok(Self {
            product_id,
            from,
            to,
            quantity,
        })
    }

    /// Single-location adjustment (the shape of `adjust`).
    pub fn in_place(
        product_id: ProductId,
        location_id: LocationId,
        from_state: Option<InventoryState>,
        to_state: Option<InventoryState>,
        quantity: i64,
    ) -> DomainResult<Self> {
        Self::new(
            product_id,
            from_state.map(|s| Slot::new(location_id, s)),
            to_state.map(|s| Slot::new(location_id, s)),
            quantity,
        )
    }

    pub fn source_key(&self) -> Option<BalanceKey> {
        self.from
            .map(|s| BalanceKey::new(self.product_id, s.location_id, s.state))
    }

    pub fn destination_key(&self) -> Option<BalanceKey> {
        self.to
            .map(|s| BalanceKey::new(self.product_id, s.location_id, s.state))
    }

    /// Keys this movement touches, in lock order.
    pub fn touched_keys(&self) -> Vec<BalanceKey> {
        let mut keys: Vec<BalanceKey> = self
            .source_key()
            .into_iter()
            .chain(self.destination_key())
            .collect();
        keys.sort();
        keys
    }

    /// New source quantity after taking `quantity` out of `available`.
    pub fn debit(&self, available: i64) -> DomainResult<i64> {
        if self.quantity > available {
            let key = self
                .source_key()
                .map(|k| k.to_string())
                .unwrap_or_else(|| self.product_id.to_string());
            return Err(DomainError::insufficient(key, self.quantity, available));
        }
        Ok(available - self.quantity)
    }

    /// New destination quantity after adding `quantity` to `current`.
    pub fn credit(&self, current: i64) -> DomainResult<i64> {
        current
            .checked_add(self.quantity)
            .ok_or_else(|| DomainError::validation("quantity", "balance would overflow"))
    }

    /// Both sides present: the product total is unchanged.
    pub fn is_conserving(&self) -> bool {
        self.from.is_some() && self.to.is_some()
    }

    /// Apply to an in-memory balance map (absent rows read as zero).
    ///
    /// Leaves the map untouched on error.
    pub fn apply(&self, balances: &mut BTreeMap<BalanceKey, i64>) -> DomainResult<()> {
        let debited = match self.source_key() {
            Some(key) => Some((key, self.debit(balances.get(&key).copied().unwrap_or(0))?)),
            None => None,
        };
        let credited = match self.destination_key() {
            Some(key) => Some((key, self.credit(balances.get(&key).copied().unwrap_or(0))?)),
            None => None,
        };
        for (key, quantity) in debited.into_iter().chain(credited) {
            balances.insert(key, quantity);
        }
        Ok(())
    }
}

/// Split of an incoming or inspected batch into good and defective units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradedQuantity {
    pub good: i64,
    pub defective: i64,
}

impl GradedQuantity {
    pub fn new(good: i64, defective: i64) -> DomainResult<Self> {
        ensure_non_negative("goodQty", good)?;
        ensure_non_negative("defectQty", defective)?;
        let total = good
            .checked_add(defective)
            .ok_or_else(|| DomainError::validation("quantity", "total would overflow"))?;
        if total == 0 {
            return Err(DomainError::validation(
                "quantity",
                "goodQty + defectQty must be greater than zero",
            ));
        }
        Ok(Self { good, defective })
    }

    pub fn total(&self) -> i64 {
        self.good + self.defective
    }

    fn parts(&self) -> impl Iterator<Item = (InventoryState, i64)> {
        [
            (InventoryState::Normal, self.good),
            (InventoryState::Defective, self.defective),
        ]
        .into_iter()
        .filter(|(_, qty)| *qty > 0)
    }

    /// Increases into NORMAL / DEFECTIVE at `location_id` (goods receipt).
    pub fn movements_into(
        &self,
        product_id: ProductId,
        location_id: LocationId,
    ) -> DomainResult<Vec<Movement>> {
        self.parts()
            .map(|(state, qty)| Movement::in_place(product_id, location_id, None, Some(state), qty))
            .collect()
    }

    /// State changes out of `source` into NORMAL / DEFECTIVE (return grading).
    pub fn movements_from(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        source: InventoryState,
    ) -> DomainResult<Vec<Movement>> {
        self.parts()
            .map(|(state, qty)| {
                Movement::in_place(product_id, location_id, Some(source), Some(state), qty)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn product() -> ProductId {
        ProductId::from_uuid(uuid_from(1))
    }

    fn uuid_from(n: u128) -> uuid::Uuid {
        uuid::Uuid::from_u128(n)
    }

    fn location(n: u128) -> LocationId {
        LocationId::from_uuid(uuid_from(100 + n))
    }

    #[test]
    fn rejects_non_positive_quantity() {
        let err = Movement::in_place(product(), location(0), Some(InventoryState::Normal), None, 0)
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { ref field, .. } if field == "quantity"));
    }

    #[test]
    fn rejects_missing_states() {
        let err = Movement::in_place(product(), location(0), None, None, 1).unwrap_err();
        assert!(matches!(err, DomainError::Validation { ref field, .. } if field == "state"));
    }

    #[test]
    fn rejects_identical_sides() {
        let n = Some(InventoryState::Normal);
        assert!(Movement::in_place(product(), location(0), n, n, 1).is_err());
    }

    #[test]
    fn sale_from_ten_leaves_seven() {
        let mv =
            Movement::in_place(product(), location(0), Some(InventoryState::Normal), None, 3).unwrap();
        assert_eq!(mv.debit(10).unwrap(), 7);
        assert!(!mv.is_conserving());
    }

    #[test]
    fn debit_beyond_available_reports_the_key() {
        let mv =
            Movement::in_place(product(), location(0), Some(InventoryState::Normal), None, 5).unwrap();
        match mv.debit(3).unwrap_err() {
            DomainError::InsufficientInventory {
                key,
                requested,
                available,
            } => {
                assert!(key.ends_with("/NORMAL"));
                assert_eq!((requested, available), (5, 3));
            }
            other => panic!("expected InsufficientInventory, got {other:?}"),
        }
    }

    #[test]
    fn apply_is_all_or_nothing() {
        let mv = Movement::in_place(
            product(),
            location(0),
            Some(InventoryState::Normal),
            Some(InventoryState::Reserved),
            4,
        )
        .unwrap();
        let mut balances = BTreeMap::new();
        balances.insert(mv.source_key().unwrap(), 3);
        let before = balances.clone();
        assert!(mv.apply(&mut balances).is_err());
        assert_eq!(balances, before);
    }

    #[test]
    fn touched_keys_are_sorted() {
        let mv = Movement::new(
            product(),
            Some(Slot::new(location(9), InventoryState::Normal)),
            Some(Slot::new(location(1), InventoryState::Normal)),
            1,
        )
        .unwrap();
        let keys = mv.touched_keys();
        assert_eq!(keys.len(), 2);
        assert!(keys[0] < keys[1]);
        assert_eq!(keys[0].location_id, location(1));
    }

    #[test]
    fn graded_quantity_skips_zero_parts() {
        let graded = GradedQuantity::new(12, 0).unwrap();
        let moves = graded.movements_into(product(), location(0)).unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].to.unwrap().state, InventoryState::Normal);

        let graded = GradedQuantity::new(12, 3).unwrap();
        let moves = graded
            .movements_from(product(), location(0), InventoryState::InInspection)
            .unwrap();
        assert_eq!(moves.len(), 2);
        assert!(moves.iter().all(Movement::is_conserving));
    }

    #[test]
    fn graded_quantity_requires_a_positive_total() {
        assert!(GradedQuantity::new(0, 0).is_err());
        assert!(GradedQuantity::new(-1, 2).is_err());
    }

    fn arb_state() -> impl Strategy<Value = InventoryState> {
        prop::sample::select(InventoryState::ALL.to_vec())
    }

    fn arb_slot() -> impl Strategy<Value = Slot> {
        (0u128..3, arb_state()).prop_map(|(l, s)| Slot::new(location(l), s))
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        #[test]
        fn conserving_movements_keep_the_product_total(
            seed in prop::collection::vec((arb_slot(), 0i64..50), 0..8),
            moves in prop::collection::vec((arb_slot(), arb_slot(), 1i64..30), 0..40),
        ) {
            let mut balances = BTreeMap::new();
            for (slot, qty) in seed {
                let key = BalanceKey::new(product(), slot.location_id, slot.state);
                *balances.entry(key).or_insert(0) += qty;
            }
            let total: i64 = balances.values().sum();

            for (from, to, qty) in moves {
                if let Ok(mv) = Movement::new(product(), Some(from), Some(to), qty) {
                    let _ = mv.apply(&mut balances);
                }
                prop_assert_eq!(balances.values().sum::<i64>(), total);
            }
        }

        #[test]
        fn balances_never_go_negative(
            moves in prop::collection::vec(
                (prop::option::of(arb_slot()), prop::option::of(arb_slot()), 1i64..30),
                0..60,
            ),
        ) {
            let mut balances = BTreeMap::new();
            for (from, to, qty) in moves {
                if let Ok(mv) = Movement::new(product(), from, to, qty) {
                    let _ = mv.apply(&mut balances);
                }
                prop_assert!(balances.values().all(|q| *q >= 0));
            }
        }
    }
}
