use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, LocationId, ProductId, ensure_non_negative};

/// Input for creating or replacing the thresholds of one (product, location).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaInput {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub min_stock: i64,
    pub target_stock: i64,
    pub standard_quantity: i64,
}

/// Thresholds for one (product, location).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplenishmentCriteria {
    pub product_id: ProductId,
    pub location_id: LocationId,
    /// Alert threshold.
    pub min_stock: i64,
    /// Replenishment goal.
    pub target_stock: i64,
    /// Default order size; zero means "order up to target".
    pub standard_quantity: i64,
    pub updated_at: DateTime<Utc>,
}

impl ReplenishmentCriteria {
    pub fn new(input: CriteriaInput, at: DateTime<Utc>) -> DomainResult<Self> {
        ensure_non_negative("min_stock", input.min_stock)?;
        ensure_non_negative("standard_quantity", input.standard_quantity)?;
        if input.target_stock < input.min_stock {
            return Err(DomainError::validation(
                "target_stock",
                "must be greater than or equal to min_stock",
            ));
        }
        Ok(Self {
            product_id: input.product_id,
            location_id: input.location_id,
            min_stock: input.min_stock,
            target_stock: input.target_stock,
            standard_quantity: input.standard_quantity,
            updated_at: at,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaFilter {
    pub product_id: Option<ProductId>,
    pub location_id: Option<LocationId>,
}

impl CriteriaFilter {
    pub fn matches(&self, criteria: &ReplenishmentCriteria) -> bool {
        self.product_id.is_none_or(|p| p == criteria.product_id)
            && self.location_id.is_none_or(|l| l == criteria.location_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(min: i64, target: i64, standard: i64) -> CriteriaInput {
        CriteriaInput {
            product_id: ProductId::new(),
            location_id: LocationId::new(),
            min_stock: min,
            target_stock: target,
            standard_quantity: standard,
        }
    }

    #[test]
    fn accepts_target_equal_to_min() {
        assert!(ReplenishmentCriteria::new(input(5, 5, 0), Utc::now()).is_ok());
    }

    #[test]
    fn rejects_target_below_min() {
        let err = ReplenishmentCriteria::new(input(5, 4, 10), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation { ref field, .. } if field == "target_stock"));
    }

    #[test]
    fn rejects_negative_values() {
        assert!(ReplenishmentCriteria::new(input(-1, 4, 10), Utc::now()).is_err());
        assert!(ReplenishmentCriteria::new(input(1, 4, -10), Utc::now()).is_err());
    }
}
