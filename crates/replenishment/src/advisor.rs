//! Low-stock advisor.
//!
//! Pure function of (criteria, NORMAL balances, pairs already covered by a
//! pending shipping instruction). Never mutates anything.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use stockledger_core::{LocationId, ProductId};

use crate::criteria::ReplenishmentCriteria;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub current_stock: i64,
    pub min_stock: i64,
    pub target_stock: i64,
    /// `min_stock - current_stock`, always positive.
    pub shortage: i64,
    /// `max(0, target_stock - current_stock)`.
    pub recommended_quantity: i64,
    pub standard_quantity: i64,
}

impl LowStockAlert {
    /// Quantity an automatic order should use.
    pub fn order_quantity(&self) -> i64 {
        if self.standard_quantity > 0 {
            self.standard_quantity
        } else {
            self.recommended_quantity
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowStockAdvisor {
    limit: usize,
}

impl LowStockAdvisor {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Alerts sorted by descending shortage (ties by product, then location),
    /// truncated to the configured limit.
    pub fn evaluate(
        &self,
        criteria: &[ReplenishmentCriteria],
        normal_stock: &HashMap<(ProductId, LocationId), i64>,
        covered: &HashSet<(ProductId, LocationId)>,
    ) -> Vec<LowStockAlert> {
        let mut alerts: Vec<LowStockAlert> = criteria
            .iter()
            .filter_map(|c| {
                let pair = (c.product_id, c.location_id);
                let current = normal_stock.get(&pair).copied().unwrap_or(0);
                if current >= c.min_stock || covered.contains(&pair) {
                    return None;
                }
                Some(LowStockAlert {
                    product_id: c.product_id,
                    location_id: c.location_id,
                    current_stock: current,
                    min_stock: c.min_stock,
                    target_stock: c.target_stock,
                    shortage: c.min_stock - current,
                    recommended_quantity: (c.target_stock - current).max(0),
                    standard_quantity: c.standard_quantity,
                })
            })
            .collect();

        alerts.sort_by(|a, b| {
            b.shortage
                .cmp(&a.shortage)
                .then_with(|| a.product_id.cmp(&b.product_id))
                .then_with(|| a.location_id.cmp(&b.location_id))
        });
        alerts.truncate(self.limit);
        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn criteria(min: i64, target: i64) -> ReplenishmentCriteria {
        ReplenishmentCriteria {
            product_id: ProductId::new(),
            location_id: LocationId::new(),
            min_stock: min,
            target_stock: target,
            standard_quantity: 0,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn below_min_raises_an_alert_with_shortage_and_recommendation() {
        let c = criteria(5, 20);
        let mut stock = HashMap::new();
        stock.insert((c.product_id, c.location_id), 2);

        let alerts = LowStockAdvisor::new(50).evaluate(&[c.clone()], &stock, &HashSet::new());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].shortage, 3);
        assert_eq!(alerts[0].recommended_quantity, 18);
        assert_eq!(alerts[0].order_quantity(), 18);
    }

    #[test]
    fn at_min_is_not_low() {
        let c = criteria(5, 20);
        let mut stock = HashMap::new();
        stock.insert((c.product_id, c.location_id), 5);
        assert!(
            LowStockAdvisor::new(50)
                .evaluate(&[c], &stock, &HashSet::new())
                .is_empty()
        );
    }

    #[test]
    fn missing_balance_counts_as_zero() {
        let c = criteria(1, 1);
        let alerts = LowStockAdvisor::new(50).evaluate(&[c], &HashMap::new(), &HashSet::new());
        assert_eq!(alerts[0].current_stock, 0);
        assert_eq!(alerts[0].shortage, 1);
    }

    #[test]
    fn covered_pairs_are_excluded() {
        let c = criteria(5, 20);
        let covered: HashSet<_> = [(c.product_id, c.location_id)].into_iter().collect();
        assert!(
            LowStockAdvisor::new(50)
                .evaluate(&[c], &HashMap::new(), &covered)
                .is_empty()
        );
    }

    #[test]
    fn standard_quantity_wins_when_set() {
        let mut c = criteria(5, 20);
        c.standard_quantity = 12;
        let alerts = LowStockAdvisor::new(50).evaluate(&[c], &HashMap::new(), &HashSet::new());
        assert_eq!(alerts[0].order_quantity(), 12);
    }

    #[test]
    fn sorted_by_shortage_and_capped() {
        let small = criteria(2, 2);
        let large = criteria(9, 9);
        let middle = criteria(5, 5);
        let alerts = LowStockAdvisor::new(2).evaluate(
            &[small, large.clone(), middle.clone()],
            &HashMap::new(),
            &HashSet::new(),
        );
        let shortages: Vec<i64> = alerts.iter().map(|a| a.shortage).collect();
        assert_eq!(shortages, vec![9, 5]);
        assert_eq!(alerts[0].product_id, large.product_id);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        #[test]
        fn alerts_are_bounded_and_ordered(
            rows in prop::collection::vec((0i64..30, 0i64..30, 0i64..40), 0..25),
            limit in 0usize..10,
        ) {
            let mut stock = HashMap::new();
            let criteria: Vec<_> = rows
                .into_iter()
                .map(|(min, extra, current)| {
                    let c = criteria(min, min + extra);
                    stock.insert((c.product_id, c.location_id), current);
                    c
                })
                .collect();

            let alerts = LowStockAdvisor::new(limit).evaluate(&criteria, &stock, &HashSet::new());
            prop_assert!(alerts.len() <= limit);
            for pair in alerts.windows(2) {
                prop_assert!(pair[0].shortage >= pair[1].shortage);
            }
            for alert in &alerts {
                prop_assert!(alert.shortage > 0);
                prop_assert!(alert.recommended_quantity >= alert.shortage);
            }
        }
    }
}
