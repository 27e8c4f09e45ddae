//! Product and location reference data. Admin-only writes.

use chrono::Utc;
use tracing::{info, instrument};

use stockledger_catalog::{Location, NewLocation, NewProduct, PricingMetadata, Product};
use stockledger_core::{Actor, DomainResult, LocationId, ProductId};

use super::{LedgerEngine, load_product};
use crate::error::{LedgerError, LedgerResult};
use crate::store::LedgerStore;

impl<S: LedgerStore> LedgerEngine<S> {
    #[instrument(skip(self, input, actor), fields(sku = %input.sku))]
    pub async fn create_product(&self, input: NewProduct, actor: &Actor) -> LedgerResult<Product> {
        let input = &input;
        self.with_retry("create_product", move || self.try_create_product(input, actor))
            .await
    }

    async fn try_create_product(&self, input: &NewProduct, actor: &Actor) -> LedgerResult<Product> {
        actor.ensure_role(&[], "manage products")?;
        let product = Product::create(ProductId::new(), input.clone(), Utc::now())?;

        let mut tx = self.store.begin().await?;
        tx.insert_product(&product).await?;
        tx.commit().await?;

        info!(product_id = %product.id, "product created");
        Ok(product)
    }

    #[instrument(skip(self, pricing, actor), fields(product_id = %id))]
    pub async fn update_product_price(
        &self,
        id: ProductId,
        pricing: PricingMetadata,
        actor: &Actor,
    ) -> LedgerResult<Product> {
        let pricing = &pricing;
        self.with_retry("update_product_price", move || {
            self.try_update_product(id, actor, move |product| {
                product.reprice(pricing.clone(), Utc::now())
            })
        })
        .await
    }

    #[instrument(skip(self, actor), fields(product_id = %id))]
    pub async fn retire_product(&self, id: ProductId, actor: &Actor) -> LedgerResult<Product> {
        self.with_retry("retire_product", move || {
            self.try_update_product(id, actor, |product| product.retire(Utc::now()))
        })
        .await
    }

    async fn try_update_product<F>(
        &self,
        id: ProductId,
        actor: &Actor,
        change: F,
    ) -> LedgerResult<Product>
    where
        F: FnOnce(&mut Product) -> DomainResult<()>,
    {
        actor.ensure_role(&[], "manage products")?;

        let mut tx = self.store.begin().await?;
        let mut product = tx
            .product_for_update(id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("product {id}")))?;
        change(&mut product)?;
        tx.update_product(&product).await?;
        tx.commit().await?;

        info!(status = product.status.as_str(), "product updated");
        Ok(product)
    }

    #[instrument(skip(self, input, actor), fields(code = %input.code, kind = %input.kind))]
    pub async fn create_location(
        &self,
        input: NewLocation,
        actor: &Actor,
    ) -> LedgerResult<Location> {
        let input = &input;
        self.with_retry("create_location", move || self.try_create_location(input, actor))
            .await
    }

    async fn try_create_location(
        &self,
        input: &NewLocation,
        actor: &Actor,
    ) -> LedgerResult<Location> {
        actor.ensure_role(&[], "manage locations")?;
        let location = Location::create(LocationId::new(), input.clone(), Utc::now())?;

        let mut tx = self.store.begin().await?;
        tx.insert_location(&location).await?;
        tx.commit().await?;

        info!(location_id = %location.id, "location created");
        Ok(location)
    }

    /// Inactive locations keep their balances and history but reject new
    /// workflow documents and drop out of replenishment.
    #[instrument(skip(self, actor), fields(location_id = %id))]
    pub async fn deactivate_location(&self, id: LocationId, actor: &Actor) -> LedgerResult<Location> {
        self.with_retry("deactivate_location", move || self.try_deactivate_location(id, actor))
            .await
    }

    async fn try_deactivate_location(&self, id: LocationId, actor: &Actor) -> LedgerResult<Location> {
        actor.ensure_role(&[], "manage locations")?;

        let mut tx = self.store.begin().await?;
        let mut location = tx
            .location_for_update(id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("location {id}")))?;
        location.deactivate()?;
        tx.update_location(&location).await?;
        tx.commit().await?;

        info!(code = %location.code, "location deactivated");
        Ok(location)
    }

    pub async fn get_product(&self, id: ProductId) -> LedgerResult<Product> {
        let mut tx = self.store.begin().await?;
        load_product(tx.as_mut(), id).await
    }

    /// Ordered by SKU.
    pub async fn list_products(&self) -> LedgerResult<Vec<Product>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.products().await?)
    }

    /// Ordered by display order, then code.
    pub async fn list_locations(&self) -> LedgerResult<Vec<Location>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.locations().await?)
    }
}
