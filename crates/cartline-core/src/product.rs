//! # Product Capabilities
//!
//! The cart never owns product data. It talks to products through two
//! capabilities:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ProductDescriptor  (identity)         PricedProduct  (pricing)         │
//! │  ──────────────────────────────        ──────────────────────────────   │
//! │  product_identity  "sku:TSHIRT-01"     current_price(ctx) → Money       │
//! │  display_label     "Navy T-Shirt"      original_price()   → Money       │
//! │  kind              "catalog"                                            │
//! │  reference         "TSHIRT-01"                                          │
//! │                                                                         │
//! │  add() needs only the identity.  Pricing is looked up again through a   │
//! │  ProductCatalog every time a cart is read.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::item::ProductRef;
use crate::money::Money;
use crate::pricing::PricingContext;

// =============================================================================
// Capability Traits
// =============================================================================

/// Identity capability: what a product is called and how to find it again.
pub trait ProductDescriptor {
    /// Stable identity used in the row key.
    fn product_identity(&self) -> &str;

    fn display_label(&self) -> &str;

    /// Catalog kind, e.g. `"catalog"` or `"gift-card"`.
    fn kind(&self) -> &str;

    /// Kind-specific lookup reference.
    fn reference(&self) -> &str;

    fn product_ref(&self) -> ProductRef {
        ProductRef::new(self.kind(), self.reference())
    }
}

/// Pricing capability.
pub trait PricedProduct: ProductDescriptor + Send + Sync {
    /// Price for this context, or `None` if the product cannot be sold in it.
    fn current_price(&self, ctx: &PricingContext) -> Option<Money>;

    /// List price before any context-specific pricing.
    fn original_price(&self) -> Money;
}

/// Looks products up by reference.
pub trait ProductCatalog: Send + Sync {
    fn find(&self, product: &ProductRef) -> Option<Arc<dyn PricedProduct>>;
}

// =============================================================================
// Reference Implementations
// =============================================================================

/// A plain catalog entry with an optional signed-in member price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogProduct {
    pub identity: String,
    pub label: String,
    pub kind: String,
    pub reference: String,
    pub price: Money,
    /// Charged instead of `price` when the context carries a user.
    pub member_price: Option<Money>,
    pub available: bool,
}

impl CatalogProduct {
    /// A `"catalog"`-kind product whose identity is `sku:<sku>`.
    pub fn new(sku: impl Into<String>, label: impl Into<String>, price: Money) -> Self {
        let sku = sku.into();
        CatalogProduct {
            identity: format!("sku:{sku}"),
            label: label.into(),
            kind: "catalog".to_string(),
            reference: sku,
            price,
            member_price: None,
            available: true,
        }
    }

    pub fn with_member_price(mut self, price: Money) -> Self {
        self.member_price = Some(price);
        self
    }

    pub fn discontinued(mut self) -> Self {
        self.available = false;
        self
    }
}

impl ProductDescriptor for CatalogProduct {
    fn product_identity(&self) -> &str {
        &self.identity
    }

    fn display_label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn reference(&self) -> &str {
        &self.reference
    }
}

impl PricedProduct for CatalogProduct {
    fn current_price(&self, ctx: &PricingContext) -> Option<Money> {
        if !self.available {
            return None;
        }
        match (ctx.user.as_ref(), self.member_price) {
            (Some(_), Some(member)) => Some(member),
            _ => Some(self.price),
        }
    }

    fn original_price(&self) -> Money {
        self.price
    }
}

/// Catalog held in memory, keyed by [`ProductRef`].
#[derive(Default)]
pub struct InMemoryCatalog {
    products: HashMap<ProductRef, Arc<dyn PricedProduct>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, product: Arc<dyn PricedProduct>) {
        self.products.insert(product.product_ref(), product);
    }

    pub fn with(mut self, product: impl PricedProduct + 'static) -> Self {
        self.insert(Arc::new(product));
        self
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl ProductCatalog for InMemoryCatalog {
    fn find(&self, product: &ProductRef) -> Option<Arc<dyn PricedProduct>> {
        self.products.get(product).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_price_needs_a_user() {
        let tee = CatalogProduct::new("TEE", "Tee", Money::from_cents(2000))
            .with_member_price(Money::from_cents(1800));

        let guest = PricingContext::default();
        let member = PricingContext::default().with_user("u-1");

        assert_eq!(tee.current_price(&guest), Some(Money::from_cents(2000)));
        assert_eq!(tee.current_price(&member), Some(Money::from_cents(1800)));
        assert_eq!(tee.original_price(), Money::from_cents(2000));
    }

    #[test]
    fn test_discontinued_has_no_price() {
        let tee = CatalogProduct::new("TEE", "Tee", Money::from_cents(2000)).discontinued();
        assert_eq!(tee.current_price(&PricingContext::default()), None);
    }

    #[test]
    fn test_catalog_lookup_by_ref() {
        let catalog = InMemoryCatalog::new()
            .with(CatalogProduct::new("TEE", "Tee", Money::from_cents(2000)));

        assert!(catalog.find(&ProductRef::new("catalog", "TEE")).is_some());
        assert!(catalog.find(&ProductRef::new("gift-card", "TEE")).is_none());
        assert_eq!(catalog.len(), 1);
    }
}
