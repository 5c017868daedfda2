//! # Cart State
//!
//! Items, cart-scoped conditions and metadata for one scope.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CartState  (scope "default")                                           │
//! │                                                                         │
//! │  items        BTreeMap<RowKey, Item>   one row per product + options    │
//! │  conditions   ConditionSet             unique by name, insertion order  │
//! │  metadata     BTreeMap<String, Value>                                   │
//! │  owner        Option<user identity>    set on merge / association       │
//! │  updated_at   DateTime<Utc>                                             │
//! │                                                                         │
//! │  CartState ◄──── from_record ──── CartRecord ◄──── CartStorage::get     │
//! │  CartState ───── to_record ─────► CartRecord ────► CartStorage::put     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `CartState` is plain data; invariants on mutation are enforced by
//! [`CartOperations`](crate::operations::CartOperations).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::conditions::{CartHandle, ConditionRecord, ConditionRegistry, ConditionSet};
use crate::error::{CartError, CartResult, StorageError};
use crate::item::{Item, ItemRecord, Metadata, RowKey};
use crate::money::Money;
use crate::totals::{CartTotals, PricingStage};

// =============================================================================
// Cart State
// =============================================================================

#[derive(Debug, Clone)]
pub struct CartState {
    scope: String,
    items: BTreeMap<RowKey, Item>,
    conditions: ConditionSet,
    metadata: Metadata,
    owner: Option<String>,
    updated_at: DateTime<Utc>,
}

impl CartState {
    /// An empty cart for `scope`.
    pub fn new(scope: impl Into<String>) -> Self {
        CartState {
            scope: scope.into(),
            items: BTreeMap::new(),
            conditions: ConditionSet::new(),
            metadata: Metadata::new(),
            owner: None,
            updated_at: Utc::now(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn item(&self, row_key: &RowKey) -> Option<&Item> {
        self.items.get(row_key)
    }

    pub fn contains_row(&self, row_key: &RowKey) -> bool {
        self.items.contains_key(row_key)
    }

    pub fn row_count(&self) -> usize {
        self.items.len()
    }

    /// Sum of row quantities, saturating at `i64::MAX`.
    pub fn total_quantity(&self) -> i64 {
        self.items
            .values()
            .fold(0i64, |total, item| total.saturating_add(item.quantity()))
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether any row carries `product_identity`.
    pub fn contains_product(&self, product_identity: &str) -> bool {
        self.items
            .values()
            .any(|item| item.product_identity() == product_identity)
    }

    pub fn conditions(&self) -> &ConditionSet {
        &self.conditions
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // -------------------------------------------------------------------------
    // Crate-internal mutation
    // -------------------------------------------------------------------------

    pub(crate) fn items_mut(&mut self) -> &mut BTreeMap<RowKey, Item> {
        &mut self.items
    }

    pub(crate) fn item_mut(&mut self, row_key: &RowKey) -> CartResult<&mut Item> {
        self.items
            .get_mut(row_key)
            .ok_or_else(|| CartError::UnknownRow(row_key.clone()))
    }

    /// Inserts a row, summing quantities if the key is already present.
    pub(crate) fn upsert(&mut self, item: Item) -> CartResult<()> {
        match self.items.get_mut(item.row_key()) {
            Some(existing) => {
                let quantity = existing
                    .quantity()
                    .checked_add(item.quantity())
                    .ok_or_else(|| CartError::QuantityOverflow(item.row_key().clone()))?;
                existing.set_quantity(quantity)
            }
            None => {
                self.items.insert(item.row_key().clone(), item);
                Ok(())
            }
        }
    }

    pub(crate) fn remove_row(&mut self, row_key: &RowKey) -> Option<Item> {
        self.items.remove(row_key)
    }

    /// Removes every row, returning how many there were.
    pub(crate) fn clear_items(&mut self) -> usize {
        let count = self.items.len();
        self.items.clear();
        count
    }

    pub(crate) fn conditions_mut(&mut self) -> &mut ConditionSet {
        &mut self.conditions
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub(crate) fn set_owner(&mut self, owner: Option<String>) {
        self.owner = owner;
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    // -------------------------------------------------------------------------
    // Serialization
    // -------------------------------------------------------------------------

    pub fn to_record(&self) -> CartRecord {
        CartRecord {
            scope: self.scope.clone(),
            items: self.items.values().map(Item::to_record).collect(),
            conditions: self.conditions.to_records(),
            metadata: self.metadata.clone(),
            owner: self.owner.clone(),
            updated_at: self.updated_at,
        }
    }

    /// Rebuilds a cart from storage.
    ///
    /// Rows whose keys collide after re-derivation are collapsed with
    /// summed quantities.
    pub fn from_record(
        record: CartRecord,
        registry: &ConditionRegistry,
    ) -> Result<Self, StorageError> {
        let conditions = ConditionSet::from_records(&record.conditions, registry)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;

        let mut state = CartState {
            scope: record.scope,
            items: BTreeMap::new(),
            conditions,
            metadata: record.metadata,
            owner: record.owner,
            updated_at: record.updated_at,
        };
        for item in record.items {
            let item = Item::from_record(item, registry)?;
            state
                .upsert(item)
                .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        }
        Ok(state)
    }
}

/// Serialized cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartRecord {
    pub scope: String,
    #[serde(default)]
    pub items: Vec<ItemRecord>,
    #[serde(default)]
    pub conditions: Vec<ConditionRecord>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub owner: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Snapshot
// =============================================================================

/// Read-only [`CartHandle`] over a state whose totals have already been
/// computed.
///
/// Conditions validate against this instead of the live cart, so nothing
/// they call can trigger another load or price resolution.
#[derive(Debug)]
pub struct CartSnapshot<'a> {
    state: &'a CartState,
    items_subtotal: Money,
    /// Running value each subtotal/total-stage condition received.
    stage_bases: HashMap<String, Money>,
}

impl<'a> CartSnapshot<'a> {
    pub fn new(state: &'a CartState, items_subtotal: Money) -> Self {
        CartSnapshot {
            state,
            items_subtotal,
            stage_bases: HashMap::new(),
        }
    }

    /// Snapshot carrying the base every cart-level step saw in `totals`.
    pub fn from_totals(state: &'a CartState, totals: &CartTotals) -> Self {
        let stage_bases = totals
            .trace
            .iter()
            .filter(|entry| entry.stage != PricingStage::Item)
            .map(|entry| (entry.step.name.clone(), entry.step.before))
            .collect();
        CartSnapshot {
            state,
            items_subtotal: totals.items_subtotal,
            stage_bases,
        }
    }
}

impl CartHandle for CartSnapshot<'_> {
    fn items_subtotal(&self) -> Money {
        self.items_subtotal
    }

    fn stage_base(&self, condition: &str) -> Option<Money> {
        self.stage_bases.get(condition).copied()
    }

    fn total_quantity(&self) -> i64 {
        self.state.total_quantity()
    }

    fn row_count(&self) -> usize {
        self.state.row_count()
    }

    fn contains_product(&self, product_identity: &str) -> bool {
        self.state.contains_product(product_identity)
    }

    fn metadata(&self, key: &str) -> Option<&Value> {
        self.state.metadata.get(key)
    }
}
