//! Postgres-backed ledger store.
//!
//! Transactions run at READ COMMITTED with explicit row locks: every balance,
//! shipping instruction and inbound plan the engine intends to change is read
//! with `SELECT ... FOR UPDATE` and stays locked until commit. Balance rows that
//! do not exist yet are inserted with quantity 0 first so there is a row to
//! lock. Each transaction sets `lock_timeout` and `statement_timeout` locally.
//!
//! Workflows that read before they insert (auto-replenishment, new shipping
//! instructions) take transaction-scoped advisory locks instead, released on
//! commit or rollback.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |----------------------|------------|----------|
//! | `40001` | `Conflict` | serialization failure |
//! | `40P01` | `Conflict` | deadlock detected |
//! | `55P03` | `Timeout` | lock not available within `lock_timeout` |
//! | `57014` | `Timeout` | statement canceled by `statement_timeout` |
//! | `23505` | `Duplicate` | unique violation (SKU, location code) |
//! | any other / pool errors | `Backend` | |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{Span, debug, instrument};
use uuid::Uuid;

use stockledger_catalog::{Location, PricingMetadata, Product};
use stockledger_core::{
    DomainError, HistoryEntryId, InboundPlanId, LocationId, ProductId, ShippingInstructionId,
};
use stockledger_inventory::{
    Balance, BalanceFilter, BalanceKey, HistoryEntry, HistoryFilter, HistoryReference,
    NewHistoryEntry,
};
use stockledger_purchasing::{InboundPlan, InboundPlanStatus};
use stockledger_replenishment::{CriteriaFilter, ReplenishmentCriteria};
use stockledger_shipping::{ShippingInstruction, ShippingStatus};

use super::{LedgerStore, LedgerTx, StoreError};
use crate::config::LedgerConfig;

/// Postgres ledger store.
///
/// `Clone` is cheap: the pool is reference counted.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
    tx_timeout: Duration,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool, tx_timeout: Duration) -> Self {
        Self { pool, tx_timeout }
    }

    /// Build a pool from `config.database_url`.
    pub async fn connect(config: &LedgerConfig) -> Result<Self, StoreError> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| StoreError::Backend("DATABASE_URL is not set".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.tx_timeout)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        Ok(Self::new(pool, config.tx_timeout))
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip(self), fields(timeout_ms = self.tx_timeout.as_millis() as u64), err)]
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let timeout = format!("{}ms", self.tx_timeout.as_millis());
        sqlx::query("SELECT set_config('lock_timeout', $1, true), set_config('statement_timeout', $1, true)")
            .bind(&timeout)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_timeouts", e))?;

        Ok(Box::new(PostgresLedgerTx { tx: Some(tx) }))
    }
}

/// One open Postgres transaction. Dropping it without commit rolls back.
pub struct PostgresLedgerTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresLedgerTx {
    fn conn(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx
            .as_mut()
            .ok_or_else(|| StoreError::Backend("transaction already finished".to_string()))
    }
}

/// Transaction-scoped advisory lock taken by every auto-replenishment run.
const REPLENISHMENT_LOCK_KEY: i64 = 0x5354_4b4c_5250_4c4e;

const BALANCE_COLUMNS: &str = "product_id, location_id, state, quantity, updated_at";
const HISTORY_COLUMNS: &str = "id, sequence, kind, product_id, quantity, from_location_id, \
     to_location_id, from_state, to_state, amount, memo, reference_type, reference_id, actor_id, \
     occurred_at";
const PRODUCT_COLUMNS: &str = "id, sku, model, color, size, category, list_price, currency, \
     status, created_at, updated_at";
const LOCATION_COLUMNS: &str = "id, code, name, kind, display_order, active, created_at";
const SHIPPING_COLUMNS: &str = "id, product_id, source_location_id, destination_location_id, \
     quantity, requested_by, status, created_by, created_at, completed_by, completed_at";
const INBOUND_COLUMNS: &str = "id, product_id, supplier, planned_quantity, received_quantity, \
     due_date, status, created_by, created_at, updated_at";
const CRITERIA_COLUMNS: &str =
    "product_id, location_id, min_stock, target_stock, standard_quantity, updated_at";

#[async_trait]
impl LedgerTx for PostgresLedgerTx {
    #[instrument(skip(self, key), fields(key = %key), err)]
    async fn balance_for_update(&mut self, key: BalanceKey) -> Result<i64, StoreError> {
        let tx = self.conn()?;

        sqlx::query(
            r#"
            INSERT INTO inventory_balances (product_id, location_id, state, quantity, updated_at)
            VALUES ($1, $2, $3, 0, now())
            ON CONFLICT (product_id, location_id, state) DO NOTHING
            "#,
        )
        .bind(key.product_id.as_uuid())
        .bind(key.location_id.as_uuid())
        .bind(key.state.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("ensure_balance_row", e))?;

        let quantity: i64 = sqlx::query_scalar(
            r#"
            SELECT quantity FROM inventory_balances
            WHERE product_id = $1 AND location_id = $2 AND state = $3
            FOR UPDATE
            "#,
        )
        .bind(key.product_id.as_uuid())
        .bind(key.location_id.as_uuid())
        .bind(key.state.as_str())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_balance", e))?;

        Ok(quantity)
    }

    async fn put_balance(
        &mut self,
        key: BalanceKey,
        quantity: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let tx = self.conn()?;
        sqlx::query(
            r#"
            INSERT INTO inventory_balances (product_id, location_id, state, quantity, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (product_id, location_id, state)
            DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key.product_id.as_uuid())
        .bind(key.location_id.as_uuid())
        .bind(key.state.as_str())
        .bind(quantity)
        .bind(at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("put_balance", e))?;
        Ok(())
    }

    async fn balances(&mut self, filter: &BalanceFilter) -> Result<Vec<Balance>, StoreError> {
        let tx = self.conn()?;
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {BALANCE_COLUMNS} FROM inventory_balances WHERE TRUE"
        ));
        if let Some(product_id) = filter.product_id {
            qb.push(" AND product_id = ").push_bind(*product_id.as_uuid());
        }
        if let Some(location_id) = filter.location_id {
            qb.push(" AND location_id = ").push_bind(*location_id.as_uuid());
        }
        if let Some(state) = filter.state {
            qb.push(" AND state = ").push_bind(state.as_str());
        }

        let rows: Vec<BalanceRow> = qb
            .build_query_as()
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("balances", e))?;

        let mut balances = rows
            .into_iter()
            .map(Balance::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        balances.sort_by_key(|b| b.key);
        Ok(balances)
    }

    #[instrument(skip(self, entry), fields(kind = %entry.kind, product_id = %entry.product_id, sequence = tracing::field::Empty), err)]
    async fn append_history(&mut self, entry: NewHistoryEntry) -> Result<HistoryEntry, StoreError> {
        let tx = self.conn()?;
        let id = HistoryEntryId::new();

        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO inventory_history (
                id, kind, product_id, quantity,
                from_location_id, to_location_id, from_state, to_state,
                amount, memo, reference_type, reference_id, actor_id, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING sequence
            "#,
        )
        .bind(id.as_uuid())
        .bind(entry.kind.as_str())
        .bind(entry.product_id.as_uuid())
        .bind(entry.quantity)
        .bind(entry.from_location_id.map(Uuid::from))
        .bind(entry.to_location_id.map(Uuid::from))
        .bind(entry.from_state.map(|s| s.as_str()))
        .bind(entry.to_state.map(|s| s.as_str()))
        .bind(entry.amount)
        .bind(entry.memo.as_deref())
        .bind(entry.reference.map(|r| r.kind_str()))
        .bind(entry.reference.map(|r| r.uuid()))
        .bind(&entry.actor_id)
        .bind(entry.occurred_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("append_history", e))?;

        Span::current().record("sequence", sequence);
        Ok(HistoryEntry::recorded(id, sequence, entry))
    }

    async fn history(&mut self, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>, StoreError> {
        let tx = self.conn()?;
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {HISTORY_COLUMNS} FROM inventory_history WHERE TRUE"
        ));
        if let Some(product_id) = filter.product_id {
            qb.push(" AND product_id = ").push_bind(*product_id.as_uuid());
        }
        if let Some(location_id) = filter.location_id {
            qb.push(" AND (from_location_id = ")
                .push_bind(*location_id.as_uuid())
                .push(" OR to_location_id = ")
                .push_bind(*location_id.as_uuid())
                .push(")");
        }
        if let Some(kind) = filter.kind {
            qb.push(" AND kind = ").push_bind(kind.as_str());
        }
        qb.push(" ORDER BY sequence DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows: Vec<HistoryRow> = qb
            .build_query_as()
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("history", e))?;

        debug!(rows = rows.len(), "loaded history");
        rows.into_iter().map(HistoryEntry::try_from).collect()
    }

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let tx = self.conn()?;
        let row: Option<ProductRow> =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("product", e))?;
        row.map(Product::try_from).transpose()
    }

    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let tx = self.conn()?;
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("product_for_update", e))?;
        row.map(Product::try_from).transpose()
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        let tx = self.conn()?;
        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, model, color, size, category, list_price, currency,
                status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.sku)
        .bind(&product.model)
        .bind(product.color.as_deref())
        .bind(product.size.as_deref())
        .bind(product.category.as_deref())
        .bind(product.pricing.list_price)
        .bind(product.pricing.currency.as_deref())
        .bind(product.status.as_str())
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError> {
        let tx = self.conn()?;
        sqlx::query(
            r#"
            UPDATE products
            SET list_price = $2, currency = $3, status = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(product.pricing.list_price)
        .bind(product.pricing.currency.as_deref())
        .bind(product.status.as_str())
        .bind(product.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;
        Ok(())
    }

    async fn products(&mut self) -> Result<Vec<Product>, StoreError> {
        let tx = self.conn()?;
        let rows: Vec<ProductRow> =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY sku"))
                .fetch_all(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("products", e))?;
        rows.into_iter().map(Product::try_from).collect()
    }

    async fn location(&mut self, id: LocationId) -> Result<Option<Location>, StoreError> {
        let tx = self.conn()?;
        let row: Option<LocationRow> =
            sqlx::query_as(&format!("SELECT {LOCATION_COLUMNS} FROM locations WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("location", e))?;
        row.map(Location::try_from).transpose()
    }

    async fn location_for_update(&mut self, id: LocationId) -> Result<Option<Location>, StoreError> {
        let tx = self.conn()?;
        let row: Option<LocationRow> = sqlx::query_as(&format!(
            "SELECT {LOCATION_COLUMNS} FROM locations WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("location_for_update", e))?;
        row.map(Location::try_from).transpose()
    }

    async fn insert_location(&mut self, location: &Location) -> Result<(), StoreError> {
        let tx = self.conn()?;
        sqlx::query(
            r#"
            INSERT INTO locations (id, code, name, kind, display_order, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(location.id.as_uuid())
        .bind(&location.code)
        .bind(&location.name)
        .bind(location.kind.as_str())
        .bind(location.display_order)
        .bind(location.active)
        .bind(location.created_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_location", e))?;
        Ok(())
    }

    async fn update_location(&mut self, location: &Location) -> Result<(), StoreError> {
        let tx = self.conn()?;
        sqlx::query("UPDATE locations SET name = $2, display_order = $3, active = $4 WHERE id = $1")
            .bind(location.id.as_uuid())
            .bind(&location.name)
            .bind(location.display_order)
            .bind(location.active)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("update_location", e))?;
        Ok(())
    }

    async fn locations(&mut self) -> Result<Vec<Location>, StoreError> {
        let tx = self.conn()?;
        let rows: Vec<LocationRow> = sqlx::query_as(&format!(
            "SELECT {LOCATION_COLUMNS} FROM locations ORDER BY display_order, code"
        ))
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("locations", e))?;
        rows.into_iter().map(Location::try_from).collect()
    }

    async fn shipping_instruction(
        &mut self,
        id: ShippingInstructionId,
    ) -> Result<Option<ShippingInstruction>, StoreError> {
        let tx = self.conn()?;
        let row: Option<ShippingRow> = sqlx::query_as(&format!(
            "SELECT {SHIPPING_COLUMNS} FROM shipping_instructions WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("shipping_instruction", e))?;
        row.map(ShippingInstruction::try_from).transpose()
    }

    #[instrument(skip(self), fields(shipping_instruction_id = %id), err)]
    async fn shipping_instruction_for_update(
        &mut self,
        id: ShippingInstructionId,
    ) -> Result<Option<ShippingInstruction>, StoreError> {
        let tx = self.conn()?;
        let row: Option<ShippingRow> = sqlx::query_as(&format!(
            "SELECT {SHIPPING_COLUMNS} FROM shipping_instructions WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_shipping_instruction", e))?;
        row.map(ShippingInstruction::try_from).transpose()
    }

    async fn insert_shipping_instruction(
        &mut self,
        instruction: &ShippingInstruction,
    ) -> Result<(), StoreError> {
        let tx = self.conn()?;
        sqlx::query(
            r#"
            INSERT INTO shipping_instructions (
                id, product_id, source_location_id, destination_location_id, quantity,
                requested_by, status, created_by, created_at, completed_by, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(instruction.id.as_uuid())
        .bind(instruction.product_id.as_uuid())
        .bind(instruction.source_location_id.as_uuid())
        .bind(instruction.destination_location_id.as_uuid())
        .bind(instruction.quantity)
        .bind(instruction.requested_by)
        .bind(instruction.status.as_str())
        .bind(&instruction.created_by)
        .bind(instruction.created_at)
        .bind(instruction.completed_by.as_deref())
        .bind(instruction.completed_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_shipping_instruction", e))?;
        Ok(())
    }

    async fn update_shipping_instruction(
        &mut self,
        instruction: &ShippingInstruction,
    ) -> Result<(), StoreError> {
        let tx = self.conn()?;
        sqlx::query(
            r#"
            UPDATE shipping_instructions
            SET status = $2, completed_by = $3, completed_at = $4
            WHERE id = $1
            "#,
        )
        .bind(instruction.id.as_uuid())
        .bind(instruction.status.as_str())
        .bind(instruction.completed_by.as_deref())
        .bind(instruction.completed_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_shipping_instruction", e))?;
        Ok(())
    }

    async fn shipping_instructions(
        &mut self,
        status: Option<ShippingStatus>,
    ) -> Result<Vec<ShippingInstruction>, StoreError> {
        let tx = self.conn()?;
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {SHIPPING_COLUMNS} FROM shipping_instructions"
        ));
        if let Some(status) = status {
            qb.push(" WHERE status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY created_at, id");

        let rows: Vec<ShippingRow> = qb
            .build_query_as()
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("shipping_instructions", e))?;
        rows.into_iter().map(ShippingInstruction::try_from).collect()
    }

    async fn inbound_plan(&mut self, id: InboundPlanId) -> Result<Option<InboundPlan>, StoreError> {
        let tx = self.conn()?;
        let row: Option<InboundRow> =
            sqlx::query_as(&format!("SELECT {INBOUND_COLUMNS} FROM inbound_plans WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("inbound_plan", e))?;
        row.map(InboundPlan::try_from).transpose()
    }

    #[instrument(skip(self), fields(inbound_plan_id = %id), err)]
    async fn inbound_plan_for_update(
        &mut self,
        id: InboundPlanId,
    ) -> Result<Option<InboundPlan>, StoreError> {
        let tx = self.conn()?;
        let row: Option<InboundRow> = sqlx::query_as(&format!(
            "SELECT {INBOUND_COLUMNS} FROM inbound_plans WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_inbound_plan", e))?;
        row.map(InboundPlan::try_from).transpose()
    }

    async fn insert_inbound_plan(&mut self, plan: &InboundPlan) -> Result<(), StoreError> {
        let tx = self.conn()?;
        sqlx::query(
            r#"
            INSERT INTO inbound_plans (
                id, product_id, supplier, planned_quantity, received_quantity,
                due_date, status, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(plan.id.as_uuid())
        .bind(plan.product_id.as_uuid())
        .bind(&plan.supplier)
        .bind(plan.planned_quantity)
        .bind(plan.received_quantity)
        .bind(plan.due_date)
        .bind(plan.status.as_str())
        .bind(&plan.created_by)
        .bind(plan.created_at)
        .bind(plan.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_inbound_plan", e))?;
        Ok(())
    }

    async fn update_inbound_plan(&mut self, plan: &InboundPlan) -> Result<(), StoreError> {
        let tx = self.conn()?;
        sqlx::query(
            r#"
            UPDATE inbound_plans
            SET received_quantity = $2, status = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(plan.id.as_uuid())
        .bind(plan.received_quantity)
        .bind(plan.status.as_str())
        .bind(plan.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_inbound_plan", e))?;
        Ok(())
    }

    async fn inbound_plans(
        &mut self,
        status: Option<InboundPlanStatus>,
    ) -> Result<Vec<InboundPlan>, StoreError> {
        let tx = self.conn()?;
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {INBOUND_COLUMNS} FROM inbound_plans"));
        if let Some(status) = status {
            qb.push(" WHERE status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY created_at, id");

        let rows: Vec<InboundRow> = qb
            .build_query_as()
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("inbound_plans", e))?;
        rows.into_iter().map(InboundPlan::try_from).collect()
    }

    async fn upsert_criteria(&mut self, criteria: &ReplenishmentCriteria) -> Result<(), StoreError> {
        let tx = self.conn()?;
        sqlx::query(
            r#"
            INSERT INTO replenishment_criteria (
                product_id, location_id, min_stock, target_stock, standard_quantity, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (product_id, location_id) DO UPDATE SET
                min_stock = EXCLUDED.min_stock,
                target_stock = EXCLUDED.target_stock,
                standard_quantity = EXCLUDED.standard_quantity,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(criteria.product_id.as_uuid())
        .bind(criteria.location_id.as_uuid())
        .bind(criteria.min_stock)
        .bind(criteria.target_stock)
        .bind(criteria.standard_quantity)
        .bind(criteria.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_criteria", e))?;
        Ok(())
    }

    async fn criteria(
        &mut self,
        filter: &CriteriaFilter,
    ) -> Result<Vec<ReplenishmentCriteria>, StoreError> {
        let tx = self.conn()?;
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {CRITERIA_COLUMNS} FROM replenishment_criteria WHERE TRUE"
        ));
        if let Some(product_id) = filter.product_id {
            qb.push(" AND product_id = ").push_bind(*product_id.as_uuid());
        }
        if let Some(location_id) = filter.location_id {
            qb.push(" AND location_id = ").push_bind(*location_id.as_uuid());
        }
        qb.push(" ORDER BY product_id, location_id");

        let rows: Vec<CriteriaRow> = qb
            .build_query_as()
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("criteria", e))?;
        Ok(rows.into_iter().map(ReplenishmentCriteria::from).collect())
    }

    #[instrument(skip(self), err)]
    async fn lock_replenishment(&mut self) -> Result<(), StoreError> {
        let tx = self.conn()?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(REPLENISHMENT_LOCK_KEY)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("lock_replenishment", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn lock_shipping_target(
        &mut self,
        product_id: ProductId,
        destination_id: LocationId,
    ) -> Result<(), StoreError> {
        let tx = self.conn()?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("shipping-target:{product_id}:{destination_id}"))
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("lock_shipping_target", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StoreError::Backend("transaction already finished".to_string()))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

/// Map SQLx errors into store errors.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                Some("55P03") | Some("57014") => StoreError::Timeout(msg),
                Some("23505") => StoreError::Duplicate(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Timeout(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn corrupt(err: DomainError) -> StoreError {
    StoreError::Backend(format!("corrupt row: {err}"))
}

// SQLx row types

#[derive(Debug, FromRow)]
struct BalanceRow {
    product_id: Uuid,
    location_id: Uuid,
    state: String,
    quantity: i64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BalanceRow> for Balance {
    type Error = StoreError;

    fn try_from(row: BalanceRow) -> Result<Self, Self::Error> {
        Ok(Balance {
            key: BalanceKey::new(
                row.product_id.into(),
                row.location_id.into(),
                row.state.parse().map_err(corrupt)?,
            ),
            quantity: row.quantity,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    id: Uuid,
    sequence: i64,
    kind: String,
    product_id: Uuid,
    quantity: i64,
    from_location_id: Option<Uuid>,
    to_location_id: Option<Uuid>,
    from_state: Option<String>,
    to_state: Option<String>,
    amount: Option<i64>,
    memo: Option<String>,
    reference_type: Option<String>,
    reference_id: Option<Uuid>,
    actor_id: String,
    occurred_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let reference = match (row.reference_type.as_deref(), row.reference_id) {
            (Some(kind), Some(id)) => Some(HistoryReference::from_parts(kind, id).map_err(corrupt)?),
            _ => None,
        };
        Ok(HistoryEntry {
            id: HistoryEntryId::from_uuid(row.id),
            sequence: row.sequence,
            kind: row.kind.parse().map_err(corrupt)?,
            product_id: row.product_id.into(),
            quantity: row.quantity,
            from_location_id: row.from_location_id.map(LocationId::from),
            to_location_id: row.to_location_id.map(LocationId::from),
            from_state: row
                .from_state
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(corrupt)?,
            to_state: row
                .to_state
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(corrupt)?,
            amount: row.amount,
            memo: row.memo,
            reference,
            actor_id: row.actor_id,
            occurred_at: row.occurred_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    sku: String,
    model: String,
    color: Option<String>,
    size: Option<String>,
    category: Option<String>,
    list_price: Option<i64>,
    currency: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: row.id.into(),
            sku: row.sku,
            model: row.model,
            color: row.color,
            size: row.size,
            category: row.category,
            pricing: PricingMetadata {
                list_price: row.list_price,
                currency: row.currency,
            },
            status: row.status.parse().map_err(corrupt)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LocationRow {
    id: Uuid,
    code: String,
    name: String,
    kind: String,
    display_order: i32,
    active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<LocationRow> for Location {
    type Error = StoreError;

    fn try_from(row: LocationRow) -> Result<Self, Self::Error> {
        Ok(Location {
            id: row.id.into(),
            code: row.code,
            name: row.name,
            kind: row.kind.parse().map_err(corrupt)?,
            display_order: row.display_order,
            active: row.active,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ShippingRow {
    id: Uuid,
    product_id: Uuid,
    source_location_id: Uuid,
    destination_location_id: Uuid,
    quantity: i64,
    requested_by: Option<NaiveDate>,
    status: String,
    created_by: String,
    created_at: DateTime<Utc>,
    completed_by: Option<String>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ShippingRow> for ShippingInstruction {
    type Error = StoreError;

    fn try_from(row: ShippingRow) -> Result<Self, Self::Error> {
        Ok(ShippingInstruction {
            id: row.id.into(),
            product_id: row.product_id.into(),
            source_location_id: row.source_location_id.into(),
            destination_location_id: row.destination_location_id.into(),
            quantity: row.quantity,
            requested_by: row.requested_by,
            status: row.status.parse().map_err(corrupt)?,
            created_by: row.created_by,
            created_at: row.created_at,
            completed_by: row.completed_by,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct InboundRow {
    id: Uuid,
    product_id: Uuid,
    supplier: String,
    planned_quantity: i64,
    received_quantity: i64,
    due_date: Option<NaiveDate>,
    status: String,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InboundRow> for InboundPlan {
    type Error = StoreError;

    fn try_from(row: InboundRow) -> Result<Self, Self::Error> {
        Ok(InboundPlan {
            id: row.id.into(),
            product_id: row.product_id.into(),
            supplier: row.supplier,
            planned_quantity: row.planned_quantity,
            received_quantity: row.received_quantity,
            due_date: row.due_date,
            status: row.status.parse().map_err(corrupt)?,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct CriteriaRow {
    product_id: Uuid,
    location_id: Uuid,
    min_stock: i64,
    target_stock: i64,
    standard_quantity: i64,
    updated_at: DateTime<Utc>,
}

impl From<CriteriaRow> for ReplenishmentCriteria {
    fn from(row: CriteriaRow) -> Self {
        ReplenishmentCriteria {
            product_id: ProductId::from(row.product_id),
            location_id: LocationId::from(row.location_id),
            min_stock: row.min_stock,
            target_stock: row.target_stock,
            standard_quantity: row.standard_quantity,
            updated_at: row.updated_at,
        }
    }
}
