//! Catalog reference data: products and locations.
//!
//! Both are referenced by balances and history rows and are therefore never
//! deleted; products are retired and locations deactivated instead.

pub mod location;
pub mod product;

pub use location::{Location, LocationKind, NewLocation, primary_warehouse};
pub use product::{NewProduct, PricingMetadata, Product, ProductStatus};
