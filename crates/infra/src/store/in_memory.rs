use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use stockledger_catalog::{Location, Product};
use stockledger_core::{
    HistoryEntryId, InboundPlanId, LocationId, ProductId, ShippingInstructionId,
};
use stockledger_inventory::{
    Balance, BalanceFilter, BalanceKey, HistoryEntry, HistoryFilter, NewHistoryEntry,
};
use stockledger_purchasing::{InboundPlan, InboundPlanStatus};
use stockledger_replenishment::{CriteriaFilter, ReplenishmentCriteria};
use stockledger_shipping::{ShippingInstruction, ShippingStatus};

use super::{LedgerStore, LedgerTx, StoreError};

/// Mutable tables. Staged wholesale per transaction.
#[derive(Debug, Clone, Default)]
struct Tables {
    balances: BTreeMap<BalanceKey, Balance>,
    products: HashMap<ProductId, Product>,
    locations: HashMap<LocationId, Location>,
    shipping: HashMap<ShippingInstructionId, ShippingInstruction>,
    inbound: HashMap<InboundPlanId, InboundPlan>,
    criteria: BTreeMap<(ProductId, LocationId), ReplenishmentCriteria>,
}

#[derive(Debug, Default)]
struct LedgerState {
    tables: Tables,
    history: Vec<HistoryEntry>,
    last_sequence: i64,
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Not optimized for performance: every transaction
/// holds one global async mutex until commit or drop, which makes execution
/// serializable by construction.
#[derive(Debug, Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
    lock_timeout: Duration,
    injected_conflicts: Arc<AtomicUsize>,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(Duration::from_secs(5))
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::default())),
            lock_timeout,
            injected_conflicts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make the next `count` commits fail with [`StoreError::Conflict`].
    ///
    /// Lets tests exercise the engine's retry path without a real database.
    pub fn inject_conflicts(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        let guard = tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| StoreError::Timeout("waiting for the ledger lock".to_string()))?;

        let staged = guard.tables.clone();
        let last_sequence = guard.last_sequence;
        Ok(Box::new(InMemoryTx {
            guard: Some(guard),
            staged,
            appended: Vec::new(),
            last_sequence,
            fail_commit: self.take_injected_conflict(),
        }))
    }
}

struct InMemoryTx {
    guard: Option<OwnedMutexGuard<LedgerState>>,
    staged: Tables,
    appended: Vec<HistoryEntry>,
    last_sequence: i64,
    fail_commit: bool,
}

impl InMemoryTx {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.guard.is_none() {
            return Err(StoreError::Backend("transaction already finished".to_string()));
        }
        Ok(())
    }

    fn committed_history(&self) -> &[HistoryEntry] {
        self.guard.as_ref().map(|g| g.history.as_slice()).unwrap_or(&[])
    }
}

fn sorted_by<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    rows.sort_by_key(key);
    rows
}

#[async_trait]
impl LedgerTx for InMemoryTx {
    async fn balance_for_update(&mut self, key: BalanceKey) -> Result<i64, StoreError> {
        self.ensure_open()?;
        Ok(self
            .staged
            .balances
            .get(&key)
            .map(|b| b.quantity)
            .unwrap_or(0))
    }

    async fn put_balance(
        &mut self,
        key: BalanceKey,
        quantity: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        if quantity < 0 {
            return Err(StoreError::Backend(format!(
                "balance {key} would become negative"
            )));
        }
        self.staged.balances.insert(
            key,
            Balance {
                key,
                quantity,
                updated_at: at,
            },
        );
        Ok(())
    }

    async fn balances(&mut self, filter: &BalanceFilter) -> Result<Vec<Balance>, StoreError> {
        self.ensure_open()?;
        Ok(self
            .staged
            .balances
            .values()
            .filter(|b| filter.matches(&b.key))
            .cloned()
            .collect())
    }

    async fn append_history(&mut self, entry: NewHistoryEntry) -> Result<HistoryEntry, StoreError> {
        self.ensure_open()?;
        self.last_sequence += 1;
        let recorded = HistoryEntry::recorded(HistoryEntryId::new(), self.last_sequence, entry);
        self.appended.push(recorded.clone());
        Ok(recorded)
    }

    async fn history(&mut self, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>, StoreError> {
        self.ensure_open()?;
        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(self
            .committed_history()
            .iter()
            .chain(self.appended.iter())
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.ensure_open()?;
        Ok(self.staged.products.get(&id).cloned())
    }

    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.product(id).await
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        self.ensure_open()?;
        if self.staged.products.values().any(|p| p.sku == product.sku) {
            return Err(StoreError::Duplicate(format!("sku '{}'", product.sku)));
        }
        if self.staged.products.contains_key(&product.id) {
            return Err(StoreError::Duplicate(format!("product {}", product.id)));
        }
        self.staged.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError> {
        self.ensure_open()?;
        match self.staged.products.get_mut(&product.id) {
            Some(row) => {
                *row = product.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!("product {} missing", product.id))),
        }
    }

    async fn products(&mut self) -> Result<Vec<Product>, StoreError> {
        self.ensure_open()?;
        let rows = self.staged.products.values().cloned().collect();
        Ok(sorted_by(rows, |p: &Product| p.sku.clone()))
    }

    async fn location(&mut self, id: LocationId) -> Result<Option<Location>, StoreError> {
        self.ensure_open()?;
        Ok(self.staged.locations.get(&id).cloned())
    }

    async fn location_for_update(&mut self, id: LocationId) -> Result<Option<Location>, StoreError> {
        self.location(id).await
    }

    async fn insert_location(&mut self, location: &Location) -> Result<(), StoreError> {
        self.ensure_open()?;
        if self.staged.locations.values().any(|l| l.code == location.code) {
            return Err(StoreError::Duplicate(format!("location code '{}'", location.code)));
        }
        if self.staged.locations.contains_key(&location.id) {
            return Err(StoreError::Duplicate(format!("location {}", location.id)));
        }
        self.staged.locations.insert(location.id, location.clone());
        Ok(())
    }

    async fn update_location(&mut self, location: &Location) -> Result<(), StoreError> {
        self.ensure_open()?;
        match self.staged.locations.get_mut(&location.id) {
            Some(row) => {
                *row = location.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!("location {} missing", location.id))),
        }
    }

    async fn locations(&mut self) -> Result<Vec<Location>, StoreError> {
        self.ensure_open()?;
        let rows = self.staged.locations.values().cloned().collect();
        Ok(sorted_by(rows, |l: &Location| (l.display_order, l.code.clone())))
    }

    async fn shipping_instruction(
        &mut self,
        id: ShippingInstructionId,
    ) -> Result<Option<ShippingInstruction>, StoreError> {
        self.ensure_open()?;
        Ok(self.staged.shipping.get(&id).cloned())
    }

    async fn shipping_instruction_for_update(
        &mut self,
        id: ShippingInstructionId,
    ) -> Result<Option<ShippingInstruction>, StoreError> {
        self.shipping_instruction(id).await
    }

    async fn insert_shipping_instruction(
        &mut self,
        instruction: &ShippingInstruction,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        if self.staged.shipping.contains_key(&instruction.id) {
            return Err(StoreError::Duplicate(format!(
                "shipping instruction {}",
                instruction.id
            )));
        }
        self.staged
            .shipping
            .insert(instruction.id, instruction.clone());
        Ok(())
    }

    async fn update_shipping_instruction(
        &mut self,
        instruction: &ShippingInstruction,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        match self.staged.shipping.get_mut(&instruction.id) {
            Some(row) => {
                *row = instruction.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!(
                "shipping instruction {} missing",
                instruction.id
            ))),
        }
    }

    async fn shipping_instructions(
        &mut self,
        status: Option<ShippingStatus>,
    ) -> Result<Vec<ShippingInstruction>, StoreError> {
        self.ensure_open()?;
        let rows = self
            .staged
            .shipping
            .values()
            .filter(|si| status.is_none_or(|s| si.status == s))
            .cloned()
            .collect();
        Ok(sorted_by(rows, |si: &ShippingInstruction| (si.created_at, si.id)))
    }

    async fn inbound_plan(&mut self, id: InboundPlanId) -> Result<Option<InboundPlan>, StoreError> {
        self.ensure_open()?;
        Ok(self.staged.inbound.get(&id).cloned())
    }

    async fn inbound_plan_for_update(
        &mut self,
        id: InboundPlanId,
    ) -> Result<Option<InboundPlan>, StoreError> {
        self.inbound_plan(id).await
    }

    async fn insert_inbound_plan(&mut self, plan: &InboundPlan) -> Result<(), StoreError> {
        self.ensure_open()?;
        if self.staged.inbound.contains_key(&plan.id) {
            return Err(StoreError::Duplicate(format!("inbound plan {}", plan.id)));
        }
        self.staged.inbound.insert(plan.id, plan.clone());
        Ok(())
    }

    async fn update_inbound_plan(&mut self, plan: &InboundPlan) -> Result<(), StoreError> {
        self.ensure_open()?;
        match self.staged.inbound.get_mut(&plan.id) {
            Some(row) => {
                *row = plan.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!("inbound plan {} missing", plan.id))),
        }
    }

    async fn inbound_plans(
        &mut self,
        status: Option<InboundPlanStatus>,
    ) -> Result<Vec<InboundPlan>, StoreError> {
        self.ensure_open()?;
        let rows = self
            .staged
            .inbound
            .values()
            .filter(|p| status.is_none_or(|s| p.status == s))
            .cloned()
            .collect();
        Ok(sorted_by(rows, |p: &InboundPlan| (p.created_at, p.id)))
    }

    async fn upsert_criteria(&mut self, criteria: &ReplenishmentCriteria) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.staged
            .criteria
            .insert((criteria.product_id, criteria.location_id), criteria.clone());
        Ok(())
    }

    async fn criteria(
        &mut self,
        filter: &CriteriaFilter,
    ) -> Result<Vec<ReplenishmentCriteria>, StoreError> {
        self.ensure_open()?;
        Ok(self
            .staged
            .criteria
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }

    // The whole-state guard already serializes every transaction.
    async fn lock_replenishment(&mut self) -> Result<(), StoreError> {
        self.ensure_open()
    }

    async fn lock_shipping_target(
        &mut self,
        _product_id: ProductId,
        _destination_id: LocationId,
    ) -> Result<(), StoreError> {
        self.ensure_open()
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let mut guard = self
            .guard
            .take()
            .ok_or_else(|| StoreError::Backend("transaction already finished".to_string()))?;

        if self.fail_commit {
            return Err(StoreError::Conflict("injected serialization failure".to_string()));
        }

        guard.tables = std::mem::take(&mut self.staged);
        guard.history.append(&mut self.appended);
        guard.last_sequence = self.last_sequence;
        Ok(())
    }
}
