//! # Cart Operations
//!
//! The mutation state machine for one cart scope.
//!
//! ## Mutation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add / update / remove / clear / conditions                            │
//! │                                                                         │
//! │  1. Validate input            InvalidQuantity, UnknownRow, capacity    │
//! │  2. Pre-hook (cancelable)     Err ──► Canceled, nothing changed        │
//! │  3. Apply to a COPY           state in memory still untouched          │
//! │  4. Invalidate prices         every row re-resolves on next read       │
//! │  5. Persist the copy          Err ──► StorageWrite, nothing changed    │
//! │  6. Swap copy in              now the change is visible                 │
//! │  7. Post-hook                 rejection logged, change stands          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Load
//! The state is read from storage on first access and kept for the lifetime
//! of the instance. Unreadable records degrade to an empty cart. Cart
//! conditions that no longer validate are pruned (when configured) and the
//! pruned state is written back. If that write fails the loaded state is kept
//! as stored, so memory never runs ahead of storage.
//!
//! ## Row States
//! ```text
//! absent ──add──► present (unresolved) ──read──► present (resolved)
//!                        ▲                             │
//!                        └──────── add/update ─────────┘
//! present ──remove/clear/destroy──► removed
//! ```

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cart::{CartSnapshot, CartState};
use crate::conditions::{
    Condition, ConditionMeta, ConditionRegistry, ConditionTarget, ConditionType, TaxCondition,
    Validity,
};
use crate::config::{CartConfig, DefaultTax, ScopeConfig};
use crate::error::{CartError, CartResult};
use crate::item::{Item, Metadata, Options, RowKey};
use crate::money::Money;
use crate::notify::{CartEvent, NotificationPort, NullNotifier};
use crate::pricing::{PriceResolutionCache, PriceResolver, PricingContext, ResolvedPrice};
use crate::product::ProductDescriptor;
use crate::storage::CartStorage;
use crate::totals::{self, CartTotals};

/// Name of the tax condition synthesized from [`DefaultTax`].
pub const DEFAULT_TAX_NAME: &str = "default-tax";

/// Order of the synthesized default tax.
pub const DEFAULT_TAX_ORDER: i32 = 100;

// =============================================================================
// Update Attributes
// =============================================================================

/// Changes for [`CartOperations::update`].
///
/// `quantity` replaces; `options` and `meta` merge key by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemUpdate {
    pub quantity: Option<i64>,
    pub options: Options,
    pub meta: Metadata,
}

impl ItemUpdate {
    pub fn quantity(quantity: i64) -> Self {
        ItemUpdate {
            quantity: Some(quantity),
            ..Default::default()
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }
}

// =============================================================================
// Cart Operations
// =============================================================================

/// Operations on one cart scope for one owner.
pub struct CartOperations {
    scope: ScopeConfig,
    identifier: Option<String>,
    storage: Arc<dyn CartStorage>,
    notifier: Arc<dyn NotificationPort>,
    registry: Arc<ConditionRegistry>,
    prices: PriceResolutionCache,
    context: PricingContext,
    state: Option<CartState>,
    validating: bool,
}

impl CartOperations {
    /// Operations for `scope` with the scope's effective settings.
    pub fn new(
        config: &CartConfig,
        scope: &str,
        storage: Arc<dyn CartStorage>,
        resolver: Arc<dyn PriceResolver>,
    ) -> Self {
        CartOperations {
            scope: config.for_scope(scope),
            identifier: None,
            storage,
            notifier: Arc::new(NullNotifier),
            registry: Arc::new(ConditionRegistry::with_builtins()),
            prices: PriceResolutionCache::new(resolver),
            context: PricingContext::default(),
            state: None,
            validating: false,
        }
    }

    /// Storage identifier (guest id or user identity). Without one the
    /// storage backend decides whose cart it is.
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationPort>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_registry(mut self, registry: Arc<ConditionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_context(mut self, context: PricingContext) -> Self {
        self.context = context;
        self
    }

    pub fn scope(&self) -> &str {
        &self.scope.scope
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn settings(&self) -> &ScopeConfig {
        &self.scope
    }

    pub fn context(&self) -> &PricingContext {
        &self.context
    }

    /// Resolver round-trips made by this instance.
    pub fn resolutions(&self) -> u64 {
        self.prices.resolutions()
    }

    // =========================================================================
    // Item Mutations
    // =========================================================================

    /// Adds `quantity` of a product. Adding to an existing row increases its
    /// quantity; a new row is subject to the capacity and duplicate checks.
    ///
    /// Returns the row key.
    pub fn add(
        &mut self,
        product: &dyn ProductDescriptor,
        quantity: i64,
        options: Options,
        meta: Metadata,
    ) -> CartResult<RowKey> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        let row_key = RowKey::derive(product.product_identity(), &options);

        let (existing, rows, has_product) = {
            let state = self.loaded();
            (
                state.item(&row_key).map(Item::quantity),
                state.row_count(),
                state.contains_product(product.product_identity()),
            )
        };

        if let Some(existing) = existing {
            let summed = existing
                .checked_add(quantity)
                .ok_or_else(|| CartError::QuantityOverflow(row_key.clone()))?;
            let update = ItemUpdate {
                quantity: Some(summed),
                options: Options::new(),
                meta,
            };
            return self.update(&row_key, update);
        }

        if let Some(max) = self.scope.max_items {
            if rows >= max {
                return Err(CartError::CapacityExceeded {
                    scope: self.scope.scope.clone(),
                    max,
                });
            }
        }
        if !self.scope.allow_duplicates && has_product {
            return Err(CartError::DuplicateProduct {
                scope: self.scope.scope.clone(),
                product: product.product_identity().to_string(),
            });
        }

        let item = Item::new(product, quantity, options, meta)?;
        self.before(CartEvent::ItemAdding {
            scope: self.scope.scope.clone(),
            row_key: row_key.clone(),
            product_identity: product.product_identity().to_string(),
            quantity,
        })?;

        let mut next = self.working_copy();
        next.upsert(item)?;
        self.commit(next)?;

        debug!(scope = %self.scope.scope, row = %row_key.short(), quantity, "Item added");
        self.after(CartEvent::ItemAdded {
            scope: self.scope.scope.clone(),
            row_key: row_key.clone(),
            quantity,
        });
        Ok(row_key)
    }

    /// Updates a row. Quantity replaces, options and meta merge.
    ///
    /// Changing options changes the row key; if the new key is already in
    /// the cart the two rows collapse into one with summed quantities.
    /// Returns the (possibly new) row key.
    pub fn update(&mut self, row_key: &RowKey, update: ItemUpdate) -> CartResult<RowKey> {
        if let Some(quantity) = update.quantity {
            if quantity < 1 {
                return Err(CartError::InvalidQuantity(quantity));
            }
        }
        if !self.loaded().contains_row(row_key) {
            return Err(CartError::UnknownRow(row_key.clone()));
        }

        self.before(CartEvent::ItemUpdating {
            scope: self.scope.scope.clone(),
            row_key: row_key.clone(),
            quantity: update.quantity,
        })?;

        let mut next = self.working_copy();
        let mut item = next
            .remove_row(row_key)
            .ok_or_else(|| CartError::UnknownRow(row_key.clone()))?;
        if let Some(quantity) = update.quantity {
            item.set_quantity(quantity)?;
        }
        item.merge_options(update.options);
        item.merge_meta(update.meta);

        let new_key = item.row_key().clone();
        if &new_key != row_key && next.contains_row(&new_key) {
            debug!(from = %row_key.short(), into = %new_key.short(), "Collapsing re-keyed row");
        }
        next.upsert(item)?;
        let quantity = next.item(&new_key).map(Item::quantity).unwrap_or_default();
        self.commit(next)?;

        debug!(scope = %self.scope.scope, row = %new_key.short(), quantity, "Item updated");
        self.after(CartEvent::ItemUpdated {
            scope: self.scope.scope.clone(),
            row_key: new_key.clone(),
            quantity,
        });
        Ok(new_key)
    }

    /// Removes a row.
    pub fn remove(&mut self, row_key: &RowKey) -> CartResult<()> {
        if !self.loaded().contains_row(row_key) {
            return Err(CartError::UnknownRow(row_key.clone()));
        }
        self.before(CartEvent::ItemRemoving {
            scope: self.scope.scope.clone(),
            row_key: row_key.clone(),
        })?;

        let mut next = self.working_copy();
        next.remove_row(row_key);
        self.commit(next)?;

        debug!(scope = %self.scope.scope, row = %row_key.short(), "Item removed");
        self.after(CartEvent::ItemRemoved {
            scope: self.scope.scope.clone(),
            row_key: row_key.clone(),
        });
        Ok(())
    }

    /// Removes every row but keeps cart conditions and metadata.
    /// Returns how many rows were removed.
    pub fn clear(&mut self) -> CartResult<usize> {
        let rows = self.loaded().row_count();
        self.before(CartEvent::Clearing {
            scope: self.scope.scope.clone(),
            rows,
        })?;

        let mut next = self.working_copy();
        let removed = next.clear_items();
        self.commit(next)?;

        debug!(scope = %self.scope.scope, removed, "Cart cleared");
        self.after(CartEvent::Cleared {
            scope: self.scope.scope.clone(),
            removed,
        });
        Ok(removed)
    }

    /// Clears rows, drops conditions and metadata, and deletes the stored
    /// record.
    pub fn destroy(&mut self) -> CartResult<()> {
        let rows = self.loaded().row_count();
        self.before(CartEvent::Clearing {
            scope: self.scope.scope.clone(),
            rows,
        })?;

        self.storage
            .forget(&self.scope.scope, self.identifier.as_deref())
            .map_err(|source| CartError::StorageWrite {
                scope: self.scope.scope.clone(),
                source,
            })?;
        self.state = Some(CartState::new(self.scope.scope.clone()));

        info!(scope = %self.scope.scope, rows, "Cart destroyed");
        self.after(CartEvent::Cleared {
            scope: self.scope.scope.clone(),
            removed: rows,
        });
        Ok(())
    }

    // =========================================================================
    // Conditions
    // =========================================================================

    /// Adds a cart-scoped condition. A condition with the same name is
    /// replaced in place.
    pub fn add_condition(&mut self, condition: Arc<dyn Condition>) -> CartResult<()> {
        let name = condition.name().to_string();
        let mut next = self.working_copy();
        if next.conditions_mut().insert(condition).is_some() {
            debug!(condition = %name, "Replacing condition with the same name");
        }
        self.commit(next)?;

        self.after(CartEvent::ConditionAdded {
            scope: self.scope.scope.clone(),
            name,
            row_key: None,
        });
        Ok(())
    }

    /// Removes a cart-scoped condition. Returns false if there was none.
    pub fn remove_condition(&mut self, name: &str) -> CartResult<bool> {
        if !self.loaded().conditions().contains(name) {
            return Ok(false);
        }
        let mut next = self.working_copy();
        next.conditions_mut().remove(name);
        self.commit(next)?;

        self.after(CartEvent::ConditionRemoved {
            scope: self.scope.scope.clone(),
            name: name.to_string(),
            row_key: None,
        });
        Ok(true)
    }

    /// Removes every cart-scoped condition. Returns how many were removed.
    pub fn clear_conditions(&mut self) -> CartResult<usize> {
        let names: Vec<String> = self
            .loaded()
            .conditions()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        if names.is_empty() {
            return Ok(0);
        }

        let mut next = self.working_copy();
        let removed = next.conditions_mut().clear();
        self.commit(next)?;

        for name in names {
            self.after(CartEvent::ConditionRemoved {
                scope: self.scope.scope.clone(),
                name,
                row_key: None,
            });
        }
        Ok(removed)
    }

    /// Cart-scoped conditions of one type, in insertion order.
    pub fn conditions_by_type(&mut self, condition_type: ConditionType) -> Vec<Arc<dyn Condition>> {
        self.loaded()
            .conditions()
            .of_type(condition_type)
            .cloned()
            .collect()
    }

    /// Every cart-scoped condition, in insertion order.
    pub fn conditions(&mut self) -> Vec<Arc<dyn Condition>> {
        self.loaded().conditions().iter().cloned().collect()
    }

    /// Attaches a condition to one row.
    pub fn add_item_condition(
        &mut self,
        row_key: &RowKey,
        condition: Arc<dyn Condition>,
    ) -> CartResult<()> {
        let name = condition.name().to_string();
        let mut next = self.working_copy();
        next.item_mut(row_key)?.conditions_mut().insert(condition);
        self.commit(next)?;

        self.after(CartEvent::ConditionAdded {
            scope: self.scope.scope.clone(),
            name,
            row_key: Some(row_key.clone()),
        });
        Ok(())
    }

    /// Detaches a condition from one row. Returns false if it was not there.
    pub fn remove_item_condition(&mut self, row_key: &RowKey, name: &str) -> CartResult<bool> {
        let present = self
            .loaded()
            .item(row_key)
            .ok_or_else(|| CartError::UnknownRow(row_key.clone()))?
            .conditions()
            .contains(name);
        if !present {
            return Ok(false);
        }

        let mut next = self.working_copy();
        next.item_mut(row_key)?.conditions_mut().remove(name);
        self.commit(next)?;

        self.after(CartEvent::ConditionRemoved {
            scope: self.scope.scope.clone(),
            name: name.to_string(),
            row_key: Some(row_key.clone()),
        });
        Ok(true)
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) -> CartResult<()> {
        let mut next = self.working_copy();
        next.metadata_mut().insert(key.into(), value);
        self.commit(next)
    }

    pub fn metadata(&mut self, key: &str) -> Option<&Value> {
        self.loaded().metadata().get(key)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The loaded state, without resolving prices.
    pub fn state(&mut self) -> &CartState {
        self.loaded()
    }

    pub fn items(&mut self) -> impl Iterator<Item = &Item> + '_ {
        self.loaded().items()
    }

    pub fn item(&mut self, row_key: &RowKey) -> Option<&Item> {
        self.loaded().item(row_key)
    }

    pub fn is_empty(&mut self) -> bool {
        self.loaded().is_empty()
    }

    pub fn row_count(&mut self) -> usize {
        self.loaded().row_count()
    }

    pub fn total_quantity(&mut self) -> i64 {
        self.loaded().total_quantity()
    }

    /// Resolved price for one row. Resolves the whole cart if needed.
    pub fn item_price(&mut self, row_key: &RowKey) -> CartResult<ResolvedPrice> {
        self.priced()?
            .item(row_key)
            .and_then(|item| item.resolved_price().cloned())
            .ok_or_else(|| CartError::UnknownRow(row_key.clone()))
    }

    /// Line total after item-level conditions.
    pub fn line_total(&mut self, row_key: &RowKey) -> CartResult<Money> {
        let default_tax = self.scope.default_tax;
        let state = self.priced()?;
        let item = state
            .item(row_key)
            .ok_or_else(|| CartError::UnknownRow(row_key.clone()))?;
        let conditions = effective_conditions(default_tax, state);
        let (_, outcome) = totals::price_line(item, &conditions)?;
        Ok(outcome.value)
    }

    pub fn subtotal(&mut self) -> CartResult<Money> {
        Ok(self.totals()?.subtotal)
    }

    pub fn total(&mut self) -> CartResult<Money> {
        Ok(self.totals()?.total)
    }

    /// Subtotal, total, counts, per-type breakdown and full trace.
    pub fn totals(&mut self) -> CartResult<CartTotals> {
        let default_tax = self.scope.default_tax;
        let state = self.priced()?;
        let conditions = effective_conditions(default_tax, state);
        CartTotals::compute(state.items(), &conditions)
    }

    /// Drops every cached price; the next read resolves again.
    pub fn refresh_prices(&mut self) {
        let Self { state, prices, .. } = self;
        if let Some(state) = state.as_mut() {
            prices.invalidate(state.items_mut());
        }
    }

    /// Switches the pricing context. Cached prices are dropped on the next
    /// read if the context digest changed.
    pub fn set_context(&mut self, context: PricingContext) {
        self.context = context;
    }

    /// Forgets the in-memory state so the next access reads storage again.
    pub fn reload(&mut self) {
        self.state = None;
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// The state, loading it on first access.
    fn loaded(&mut self) -> &mut CartState {
        self.ensure_loaded();
        let Self { state, scope, .. } = self;
        state.get_or_insert_with(|| CartState::new(scope.scope.clone()))
    }

    /// The state with every row priced for the current context.
    fn priced(&mut self) -> CartResult<&CartState> {
        self.ensure_loaded();
        let Self {
            state,
            scope,
            prices,
            context,
            ..
        } = self;
        let state = state.get_or_insert_with(|| CartState::new(scope.scope.clone()));
        prices.ensure(state.items_mut(), context)?;
        Ok(state)
    }

    fn ensure_loaded(&mut self) {
        if self.state.is_some() {
            return;
        }
        self.state = Some(self.read_state());
        self.validate_conditions();
    }

    /// Reads the stored cart. Any failure degrades to an empty cart.
    fn read_state(&self) -> CartState {
        let scope = &self.scope.scope;
        let record = match self.storage.get(scope, self.identifier.as_deref()) {
            Ok(Some(record)) => record,
            Ok(None) => return CartState::new(scope.clone()),
            Err(source) => {
                let err = CartError::StorageRead {
                    scope: scope.clone(),
                    source,
                };
                warn!(error = %err, "Cart unreadable, starting empty");
                return CartState::new(scope.clone());
            }
        };

        match CartState::from_record(record, &self.registry) {
            Ok(state) => {
                debug!(scope = %scope, rows = state.row_count(), "Cart loaded");
                state
            }
            Err(e) => {
                warn!(scope = %scope, error = %e, "Stored cart is undecodable, starting empty");
                CartState::new(scope.clone())
            }
        }
    }

    /// Prunes cart conditions that no longer validate against the loaded
    /// cart. Runs at most once per load.
    fn validate_conditions(&mut self) {
        if self.validating || !self.scope.auto_remove_invalid_conditions {
            return;
        }
        self.validating = true;
        let pruned = self.find_invalid_conditions();
        self.validating = false;

        let Some((next, invalid)) = pruned else {
            return;
        };
        // Memory only moves to the pruned state once storage holds it too;
        // otherwise the prune is attempted again on the next load.
        if let Err(e) = self.write(&next) {
            warn!(
                scope = %self.scope.scope,
                error = %e,
                invalid = invalid.len(),
                "Could not persist pruned conditions, keeping them until the next load"
            );
            return;
        }
        for (name, reason) in &invalid {
            warn!(scope = %self.scope.scope, condition = %name, reason = %reason, "Removed invalid condition");
        }
        self.state = Some(next);

        for (name, reason) in invalid {
            self.after(CartEvent::ConditionInvalidated {
                scope: self.scope.scope.clone(),
                name,
                reason,
            });
        }
    }

    /// Returns the pruned state and the removed `(name, reason)` pairs, or
    /// `None` if nothing needs to change.
    fn find_invalid_conditions(&mut self) -> Option<(CartState, Vec<(String, String)>)> {
        let Self {
            state,
            prices,
            context,
            scope,
            ..
        } = self;
        let state = state.as_mut()?;
        if state.conditions().is_empty() {
            return None;
        }

        if let Err(e) = prices.ensure(state.items_mut(), context) {
            warn!(scope = %scope.scope, error = %e, "Skipping condition validation, prices unavailable");
            return None;
        }
        let conditions = effective_conditions(scope.default_tax, state);
        let totals = match CartTotals::compute(state.items(), &conditions) {
            Ok(totals) => totals,
            Err(e) => {
                warn!(scope = %scope.scope, error = %e, "Skipping condition validation");
                return None;
            }
        };

        let snapshot = CartSnapshot::from_totals(state, &totals);
        let invalid: Vec<(String, String)> = state
            .conditions()
            .iter()
            .filter_map(|condition| match condition.validate(&snapshot) {
                Validity::Valid => None,
                Validity::Invalid(reason) => Some((condition.name().to_string(), reason)),
            })
            .collect();
        if invalid.is_empty() {
            return None;
        }

        let mut next = state.clone();
        for (name, _) in &invalid {
            next.conditions_mut().remove(name);
        }
        next.touch();
        Some((next, invalid))
    }

    /// A copy of the loaded state to apply a mutation to.
    fn working_copy(&mut self) -> CartState {
        self.loaded().clone()
    }

    /// Persists `next` and makes it the current state. Prices are
    /// invalidated because any row may have changed.
    fn commit(&mut self, mut next: CartState) -> CartResult<()> {
        self.prices.invalidate(next.items_mut());
        next.touch();
        self.write(&next)?;
        self.state = Some(next);
        Ok(())
    }

    fn write(&self, state: &CartState) -> CartResult<()> {
        self.storage
            .put(
                &self.scope.scope,
                self.identifier.as_deref(),
                &state.to_record(),
            )
            .map_err(|source| CartError::StorageWrite {
                scope: self.scope.scope.clone(),
                source,
            })
    }

    /// Emits a cancelable event.
    fn before(&self, event: CartEvent) -> CartResult<()> {
        self.notifier
            .emit(&event)
            .map_err(|rejection| CartError::Canceled {
                event: event.name(),
                reason: rejection.reason,
            })
    }

    /// Emits an informational event. Rejections cannot undo anything.
    fn after(&self, event: CartEvent) {
        if let Err(rejection) = self.notifier.emit(&event) {
            warn!(event = event.name(), reason = %rejection, "Listener rejected a completed change");
        }
    }
}

/// Cart conditions plus the default tax when the cart has no tax of its own.
fn effective_conditions(default_tax: Option<DefaultTax>, state: &CartState) -> Vec<Arc<dyn Condition>> {
    let mut conditions: Vec<Arc<dyn Condition>> = state.conditions().iter().cloned().collect();
    if let Some(tax) = default_tax {
        if state.conditions().of_type(ConditionType::Tax).next().is_none() {
            conditions.push(Arc::new(TaxCondition::new(
                ConditionMeta::new(
                    DEFAULT_TAX_NAME,
                    ConditionType::Tax,
                    ConditionTarget::Total,
                    DEFAULT_TAX_ORDER,
                ),
                tax.rate(),
                tax.inclusive,
            )));
        }
    }
    conditions
}

// =============================================================================
// Unit Tests
// =============================================================================
