use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, ProductId, ensure_non_negative, ensure_not_blank};

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Retired,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Retired => "retired",
        }
    }
}

impl FromStr for ProductStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProductStatus::Active),
            "retired" => Ok(ProductStatus::Retired),
            other => Err(DomainError::validation(
                "status",
                format!("unknown product status '{other}'"),
            )),
        }
    }
}

/// Mutable pricing metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingMetadata {
    pub list_price: Option<i64>, // Price in smallest currency unit (e.g., cents)
    pub currency: Option<String>, // ISO currency code (e.g., "JPY", "EUR")
}

impl PricingMetadata {
    fn validate(&self) -> DomainResult<()> {
        if let Some(price) = self.list_price {
            ensure_non_negative("list_price", price)?;
        }
        if let Some(currency) = &self.currency {
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
                return Err(DomainError::validation(
                    "currency",
                    "must be a three-letter ISO code",
                ));
            }
        }
        Ok(())
    }
}

/// Input for registering a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub model: String,
    pub color: Option<String>,
    pub size: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub pricing: PricingMetadata,
}

/// Catalog product.
///
/// Identity fields (SKU, model, color, size, category) are fixed at creation;
/// only pricing and status change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub model: String,
    pub color: Option<String>,
    pub size: Option<String>,
    pub category: Option<String>,
    pub pricing: PricingMetadata,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn create(id: ProductId, input: NewProduct, at: DateTime<Utc>) -> DomainResult<Self> {
        ensure_not_blank("sku", &input.sku)?;
        ensure_not_blank("model", &input.model)?;
        input.pricing.validate()?;

        Ok(Self {
            id,
            sku: input.sku.trim().to_string(),
            model: input.model.trim().to_string(),
            color: input.color,
            size: input.size,
            category: input.category,
            pricing: input.pricing,
            status: ProductStatus::Active,
            created_at: at,
            updated_at: at,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }

    /// Ledger operations only accept active products.
    pub fn ensure_active(&self) -> DomainResult<()> {
        if !self.is_active() {
            return Err(DomainError::invalid_state(format!(
                "product {} is retired",
                self.sku
            )));
        }
        Ok(())
    }

    pub fn reprice(&mut self, pricing: PricingMetadata, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_active()?;
        pricing.validate()?;
        self.pricing = pricing;
        self.updated_at = at;
        Ok(())
    }

    /// Soft-deactivate. History keeps referencing the row.
    pub fn retire(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if self.status == ProductStatus::Retired {
            return Err(DomainError::invalid_state(format!(
                "product {} is already retired",
                self.sku
            )));
        }
        self.status = ProductStatus::Retired;
        self.updated_at = at;
        Ok(())
    }
}
