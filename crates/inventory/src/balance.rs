use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stockledger_core::{LocationId, ProductId};

use crate::state::InventoryState;

/// Identity of a balance row: at most one row per (product, location, state).
///
/// The derived ordering is the lock order used when a movement touches two
/// rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BalanceKey {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub state: InventoryState,
}

impl BalanceKey {
    pub fn new(product_id: ProductId, location_id: LocationId, state: InventoryState) -> Self {
        Self {
            product_id,
            location_id,
            state,
        }
    }
}

impl core::fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}/{}", self.product_id, self.location_id, self.state)
    }
}

/// Materialized quantity for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub key: BalanceKey,
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
}

/// Filter for balance reads. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceFilter {
    pub product_id: Option<ProductId>,
    pub location_id: Option<LocationId>,
    pub state: Option<InventoryState>,
}

impl BalanceFilter {
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Self::default()
        }
    }

    pub fn for_location(location_id: LocationId) -> Self {
        Self {
            location_id: Some(location_id),
            ..Self::default()
        }
    }

    pub fn with_state(mut self, state: InventoryState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn matches(&self, key: &BalanceKey) -> bool {
        self.product_id.is_none_or(|p| p == key.product_id)
            && self.location_id.is_none_or(|l| l == key.location_id)
            && self.state.is_none_or(|s| s == key.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_narrows_by_each_field() {
        let product = ProductId::new();
        let location = LocationId::new();
        let key = BalanceKey::new(product, location, InventoryState::Normal);

        assert!(BalanceFilter::default().matches(&key));
        assert!(BalanceFilter::for_product(product).matches(&key));
        assert!(!BalanceFilter::for_product(ProductId::new()).matches(&key));
        assert!(
            !BalanceFilter::for_location(location)
                .with_state(InventoryState::Defective)
                .matches(&key)
        );
    }

    #[test]
    fn keys_order_by_product_then_location_then_state() {
        let product = ProductId::new();
        let location = LocationId::new();
        let normal = BalanceKey::new(product, location, InventoryState::Normal);
        let defective = BalanceKey::new(product, location, InventoryState::Defective);
        assert!(normal < defective);
    }
}
