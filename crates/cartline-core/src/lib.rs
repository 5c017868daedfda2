//! # cartline-core: Shopping Cart Engine
//!
//! Cart state, read-time price resolution, an ordered condition pipeline and
//! guest-to-user cart merging. The crate performs no I/O of its own.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Host Application                               │
//! │    HTTP handlers / sessions / checkout                                  │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ cartline-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   CartOperations ──► CartState ──► Item (row key)               │   │
//! │  │        │                  │                                     │   │
//! │  │        │                  └──► ConditionSet                     │   │
//! │  │        ├──► PriceResolutionCache ──► PriceResolver (port)       │   │
//! │  │        ├──► ConditionPipeline ──► CartTotals                    │   │
//! │  │        └──► CartStorage (port), NotificationPort (port)         │   │
//! │  │                                                                 │   │
//! │  │   MergeCoordinator: guest cart ──► user cart on sign-in         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer minor-unit money and basis-point rates
//! - [`conditions`] - Tax, discount, fee and shipping adjustments
//! - [`pipeline`] - Ordered application of conditions with a trace
//! - [`item`] / [`cart`] - Cart rows and per-scope cart state
//! - [`pricing`] - Pricing context, resolver port, batched price cache
//! - [`operations`] - The mutation and read API for one cart
//! - [`merge`] - Guest-to-user reconciliation
//! - [`storage`] / [`notify`] - Persistence and lifecycle event ports
//! - [`config`] - TOML + environment configuration
//!
//! ## Design Principles
//!
//! 1. **Integer Money**: every amount is `i64` minor units, rounding is half-up
//! 2. **Prices Are Not State**: resolved at read time, never persisted
//! 3. **Commit After Write**: a failed storage write leaves the cart untouched
//! 4. **Explicit Errors**: typed errors, no panics on bad input
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use cartline_core::conditions::TaxCondition;
//! use cartline_core::item::{Metadata, Options};
//! use cartline_core::pricing::CatalogPriceResolver;
//! use cartline_core::product::{CatalogProduct, InMemoryCatalog};
//! use cartline_core::{CartConfig, CartOperations, InMemoryStorage, Money, Rate};
//!
//! let tee = CatalogProduct::new("TEE", "Navy Tee", Money::from_cents(2500));
//! let catalog = Arc::new(InMemoryCatalog::new().with(tee.clone()));
//!
//! let mut cart = CartOperations::new(
//!     &CartConfig::default(),
//!     cartline_core::DEFAULT_SCOPE,
//!     Arc::new(InMemoryStorage::new()),
//!     Arc::new(CatalogPriceResolver::new(catalog)),
//! )
//! .with_identifier(cartline_core::new_guest_id());
//!
//! cart.add(&tee, 2, Options::new(), Metadata::new())?;
//! cart.add_condition(Arc::new(TaxCondition::exclusive("tax", Rate::percent(10), 100)))?;
//!
//! // 2 × 25.00 = 50.00, + 10% tax
//! assert_eq!(cart.total()?.cents(), 5500);
//! # Ok::<(), cartline_core::CartError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod conditions;
pub mod config;
pub mod error;
pub mod item;
pub mod merge;
pub mod money;
pub mod notify;
pub mod operations;
pub mod pipeline;
pub mod pricing;
pub mod product;
pub mod storage;
pub mod telemetry;
pub mod totals;

#[cfg(test)]
pub(crate) mod test_support;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{CartRecord, CartState};
pub use conditions::{Condition, ConditionRegistry, ConditionTarget, ConditionType};
pub use config::{CartConfig, MergeStrategy, ScopeConfig};
pub use error::{CartError, CartResult, ConditionError, ResolveError, StorageError};
pub use item::{Item, RowKey};
pub use merge::{MergeCoordinator, MergeKind, MergeOutcome};
pub use money::{Money, Rate};
pub use notify::{CartEvent, HookRejection, NotificationPort};
pub use operations::{CartOperations, ItemUpdate};
pub use pipeline::ConditionPipeline;
pub use pricing::{PriceResolutionCache, PriceResolver, PricingContext, ResolvedPrice};
pub use storage::{CartStorage, InMemoryStorage};
pub use totals::CartTotals;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Scope used when the host does not name one.
pub const DEFAULT_SCOPE: &str = "default";

/// A fresh identifier for an anonymous shopper's cart.
pub fn new_guest_id() -> String {
    format!("guest-{}", uuid::Uuid::new_v4())
}
