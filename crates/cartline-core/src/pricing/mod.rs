//! # Pricing
//!
//! Prices are resolved at read time and never persisted.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CartOperations::total()                                               │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  PriceResolutionCache::ensure(items, ctx)                               │
//! │        │  digest(ctx) changed?  ── yes ──► drop every cached price       │
//! │        │  any item unresolved?  ── no ───► done, no resolver call        │
//! │        ▼                                                                │
//! │  PriceResolver::resolve_many(all unresolved items, ctx)   (one call)    │
//! │        │  any item missing or failed? ── yes ──► UnresolvablePrice,     │
//! │        │                                         nothing cached         │
//! │        ▼                                                                │
//! │  every ResolvedPrice stored on its Item                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod cache;
mod catalog;

pub use cache::PriceResolutionCache;
pub use catalog::CatalogPriceResolver;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::error::ResolveError;
use crate::item::{Item, Metadata, RowKey};
use crate::money::Money;

// =============================================================================
// Pricing Context
// =============================================================================

/// Who is buying, and in which currency and locale.
///
/// Two contexts with the same digest price identically, so the digest is the
/// cache key for resolved prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingContext {
    pub user: Option<String>,
    pub currency: String,
    pub locale: String,
}

impl Default for PricingContext {
    fn default() -> Self {
        PricingContext {
            user: None,
            currency: "USD".to_string(),
            locale: "en-US".to_string(),
        }
    }
}

impl PricingContext {
    pub fn new(currency: impl Into<String>, locale: impl Into<String>) -> Self {
        PricingContext {
            user: None,
            currency: currency.into(),
            locale: locale.into(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Hex SHA-256 of `{user, currency, locale}`.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        let canonical =
            serde_json::to_vec(&(&self.user, &self.currency, &self.locale)).unwrap_or_default();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }
}

// =============================================================================
// Resolved Price
// =============================================================================

/// A price resolved for one item. Replaced wholesale, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPrice {
    pub unit_price: Money,
    /// List price, for "was / now" display.
    pub original_price: Money,
    /// Which resolver produced the price.
    pub source: String,
    #[serde(default)]
    pub meta: Metadata,
}

impl ResolvedPrice {
    pub fn new(unit_price: Money) -> Self {
        ResolvedPrice {
            unit_price,
            original_price: unit_price,
            source: "resolver".to_string(),
            meta: Metadata::new(),
        }
    }

    pub fn with_original(mut self, original_price: Money) -> Self {
        self.original_price = original_price;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Savings per unit against the list price (zero if not discounted).
    pub fn unit_savings(&self) -> Money {
        (self.original_price - self.unit_price).clamp_non_negative()
    }
}

// =============================================================================
// Resolver Port
// =============================================================================

/// Prices items for a context.
pub trait PriceResolver: Send + Sync {
    fn resolve(&self, item: &Item, ctx: &PricingContext) -> Result<ResolvedPrice, ResolveError>;

    /// Prices a batch. Fails as soon as one item cannot be priced.
    ///
    /// The default loops over [`resolve`](Self::resolve); resolvers backed by
    /// a remote catalog should override it with a single round-trip.
    fn resolve_many(
        &self,
        items: &[&Item],
        ctx: &PricingContext,
    ) -> Result<HashMap<RowKey, ResolvedPrice>, ResolveError> {
        items
            .iter()
            .map(|item| Ok((item.row_key().clone(), self.resolve(item, ctx)?)))
            .collect()
    }
}
