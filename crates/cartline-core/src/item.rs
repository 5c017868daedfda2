//! # Cart Items
//!
//! One cart line and its content-derived identity.
//!
//! ## Row Key
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  product identity  "sku:TSHIRT-01"                                      │
//! │  options           {size: "L", color: "navy"}                           │
//! │                                                                         │
//! │  canonical bytes = JSON of (identity, options sorted by key)            │
//! │  row key         = hex(SHA-256(canonical bytes))                        │
//! │                                                                         │
//! │  {color: navy, size: L} and {size: L, color: navy} → same row           │
//! │  {size: L} and {size: M}                            → different rows    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The resolved price is a cache slot, never persisted: prices are
//! recomputed from the catalog each time a cart is read.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use ts_rs::TS;

use crate::conditions::{ConditionRecord, ConditionRegistry, ConditionSet};
use crate::error::{CartError, CartResult, StorageError};
use crate::money::Money;
use crate::pricing::ResolvedPrice;
use crate::product::ProductDescriptor;

/// Variant options (size, color, ...). Sorted, so serialization is canonical.
pub type Options = BTreeMap<String, String>;

/// Free-form metadata attached to a line or a cart.
pub type Metadata = BTreeMap<String, Value>;

// =============================================================================
// Row Key
// =============================================================================

/// Content hash identifying a cart line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct RowKey(String);

impl RowKey {
    /// Derives the key for a product identity and option set.
    ///
    /// ```rust
    /// use cartline_core::item::{Options, RowKey};
    ///
    /// let mut a = Options::new();
    /// a.insert("size".into(), "L".into());
    /// a.insert("color".into(), "navy".into());
    ///
    /// let mut b = Options::new();
    /// b.insert("color".into(), "navy".into());
    /// b.insert("size".into(), "L".into());
    ///
    /// assert_eq!(RowKey::derive("sku:TSHIRT-01", &a), RowKey::derive("sku:TSHIRT-01", &b));
    /// ```
    pub fn derive(product_identity: &str, options: &Options) -> Self {
        let mut hasher = Sha256::new();
        // (str, BTreeMap) always serializes; the tuple keeps the identity and
        // options from running into each other.
        let canonical = serde_json::to_vec(&(product_identity, options)).unwrap_or_default();
        hasher.update(&canonical);
        RowKey(hex::encode(hasher.finalize()))
    }

    /// Wraps an existing key string without hashing.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        RowKey(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Product Reference
// =============================================================================

/// Where to look a product up again: catalog kind plus reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductRef {
    pub kind: String,
    pub reference: String,
}

impl ProductRef {
    pub fn new(kind: impl Into<String>, reference: impl Into<String>) -> Self {
        ProductRef {
            kind: kind.into(),
            reference: reference.into(),
        }
    }
}

impl fmt::Display for ProductRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.reference)
    }
}

// =============================================================================
// Item
// =============================================================================

/// One cart line.
///
/// ## Invariants
/// - `quantity >= 1`
/// - `row_key == RowKey::derive(product_identity, options)`
/// - item conditions are unique by name
#[derive(Debug, Clone)]
pub struct Item {
    row_key: RowKey,
    product_identity: String,
    product: ProductRef,
    quantity: i64,
    options: Options,
    meta: Metadata,
    conditions: ConditionSet,
    resolved: Option<ResolvedPrice>,
}

impl Item {
    /// Builds a new line for `product`.
    pub fn new(
        product: &dyn ProductDescriptor,
        quantity: i64,
        options: Options,
        meta: Metadata,
    ) -> CartResult<Self> {
        ensure_quantity(quantity)?;
        let product_identity = product.product_identity().to_string();
        Ok(Item {
            row_key: RowKey::derive(&product_identity, &options),
            product_identity,
            product: product.product_ref(),
            quantity,
            options,
            meta,
            conditions: ConditionSet::new(),
            resolved: None,
        })
    }

    pub fn row_key(&self) -> &RowKey {
        &self.row_key
    }

    pub fn product_identity(&self) -> &str {
        &self.product_identity
    }

    pub fn product(&self) -> &ProductRef {
        &self.product
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    pub fn conditions(&self) -> &ConditionSet {
        &self.conditions
    }

    /// Cached price, if this line has been resolved since the last change.
    pub fn resolved_price(&self) -> Option<&ResolvedPrice> {
        self.resolved.as_ref()
    }

    /// `unit_price × quantity`, once resolved.
    pub fn line_base(&self) -> Option<Money> {
        self.resolved
            .as_ref()
            .map(|price| price.unit_price.multiply_quantity(self.quantity))
    }

    // -------------------------------------------------------------------------
    // Crate-internal mutation
    // -------------------------------------------------------------------------

    pub(crate) fn set_quantity(&mut self, quantity: i64) -> CartResult<()> {
        ensure_quantity(quantity)?;
        self.quantity = quantity;
        Ok(())
    }

    /// Merges options key by key and re-derives the row key.
    pub(crate) fn merge_options(&mut self, options: Options) {
        if options.is_empty() {
            return;
        }
        self.options.extend(options);
        self.row_key = RowKey::derive(&self.product_identity, &self.options);
    }

    pub(crate) fn merge_meta(&mut self, meta: Metadata) {
        self.meta.extend(meta);
    }

    pub(crate) fn conditions_mut(&mut self) -> &mut ConditionSet {
        &mut self.conditions
    }

    pub(crate) fn set_resolved(&mut self, price: ResolvedPrice) {
        self.resolved = Some(price);
    }

    pub(crate) fn clear_resolved(&mut self) {
        self.resolved = None;
    }

    // -------------------------------------------------------------------------
    // Serialization
    // -------------------------------------------------------------------------

    pub fn to_record(&self) -> ItemRecord {
        ItemRecord {
            row_key: self.row_key.clone(),
            product_identity: self.product_identity.clone(),
            quantity: self.quantity,
            options: self.options.clone(),
            meta: self.meta.clone(),
            product_kind: self.product.kind.clone(),
            product_ref: self.product.reference.clone(),
            conditions: self.conditions.to_records(),
        }
    }

    /// Rebuilds a line from storage.
    ///
    /// The row key is re-derived from identity and options; a stored key
    /// that disagrees is replaced.
    pub fn from_record(
        record: ItemRecord,
        registry: &ConditionRegistry,
    ) -> Result<Self, StorageError> {
        if record.quantity < 1 {
            return Err(StorageError::Corrupt(format!(
                "row {} has quantity {}",
                record.row_key, record.quantity
            )));
        }
        let conditions = ConditionSet::from_records(&record.conditions, registry)
            .map_err(|e| StorageError::Corrupt(format!("row {}: {e}", record.row_key)))?;
        let row_key = RowKey::derive(&record.product_identity, &record.options);
        if row_key != record.row_key {
            tracing::debug!(
                stored = %record.row_key.short(),
                derived = %row_key.short(),
                "Stored row key did not match its content; using derived key"
            );
        }

        Ok(Item {
            row_key,
            product_identity: record.product_identity,
            product: ProductRef::new(record.product_kind, record.product_ref),
            quantity: record.quantity,
            options: record.options,
            meta: record.meta,
            conditions,
            resolved: None,
        })
    }
}

fn ensure_quantity(quantity: i64) -> CartResult<()> {
    if quantity < 1 {
        return Err(CartError::InvalidQuantity(quantity));
    }
    Ok(())
}

/// Serialized cart line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub row_key: RowKey,
    pub product_identity: String,
    pub quantity: i64,
    #[serde(default)]
    pub options: Options,
    #[serde(default)]
    pub meta: Metadata,
    pub product_kind: String,
    pub product_ref: String,
    #[serde(default)]
    pub conditions: Vec<ConditionRecord>,
}

// =============================================================================
// Unit Tests
// =============================================================================
