//! Price resolver backed by a [`ProductCatalog`].

use std::sync::Arc;

use super::{PriceResolver, PricingContext, ResolvedPrice};
use crate::error::ResolveError;
use crate::item::Item;
use crate::product::ProductCatalog;

/// Looks each item's product up in a catalog and asks it for a price.
pub struct CatalogPriceResolver {
    catalog: Arc<dyn ProductCatalog>,
}

impl CatalogPriceResolver {
    pub const SOURCE: &'static str = "catalog";

    pub fn new(catalog: Arc<dyn ProductCatalog>) -> Self {
        CatalogPriceResolver { catalog }
    }
}

impl PriceResolver for CatalogPriceResolver {
    fn resolve(&self, item: &Item, ctx: &PricingContext) -> Result<ResolvedPrice, ResolveError> {
        let product = self.catalog.find(item.product()).ok_or_else(|| {
            ResolveError::new(
                item.row_key().clone(),
                format!("product {} not found", item.product()),
            )
        })?;

        let unit_price = product.current_price(ctx).ok_or_else(|| {
            ResolveError::new(
                item.row_key().clone(),
                format!("product {} is not for sale", item.product()),
            )
        })?;

        Ok(ResolvedPrice::new(unit_price)
            .with_original(product.original_price())
            .with_source(Self::SOURCE))
    }
}
