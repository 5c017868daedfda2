//! Per-operation-scope memoization of resolved prices.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{PriceResolver, PricingContext};
use crate::error::{CartError, CartResult};
use crate::item::{Item, RowKey};

/// Memoizes resolved prices on the items themselves, keyed by context digest.
///
/// ## Guarantees
/// - Unchanged digest and every item priced: no resolver call
/// - First unresolved access prices every unresolved item in one batch
/// - A failed batch caches nothing
pub struct PriceResolutionCache {
    resolver: Arc<dyn PriceResolver>,
    digest: Option<String>,
    resolutions: u64,
}

impl fmt::Debug for PriceResolutionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriceResolutionCache")
            .field("digest", &self.digest)
            .field("resolutions", &self.resolutions)
            .finish_non_exhaustive()
    }
}

impl PriceResolutionCache {
    pub fn new(resolver: Arc<dyn PriceResolver>) -> Self {
        PriceResolutionCache {
            resolver,
            digest: None,
            resolutions: 0,
        }
    }

    /// Number of `resolve_many` round-trips made so far.
    pub fn resolutions(&self) -> u64 {
        self.resolutions
    }

    /// Digest of the context the cached prices belong to.
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Drops every cached price.
    pub fn invalidate(&mut self, items: &mut BTreeMap<RowKey, Item>) {
        for item in items.values_mut() {
            item.clear_resolved();
        }
    }

    /// Makes sure every item carries a price for `ctx`.
    pub fn ensure(
        &mut self,
        items: &mut BTreeMap<RowKey, Item>,
        ctx: &PricingContext,
    ) -> CartResult<()> {
        let digest = ctx.digest();
        if self.digest.as_deref() != Some(digest.as_str()) {
            if self.digest.is_some() {
                debug!("Pricing context changed, dropping cached prices");
            }
            self.invalidate(items);
            self.digest = Some(digest);
        }

        let pending: Vec<&Item> = items
            .values()
            .filter(|item| item.resolved_price().is_none())
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        self.resolutions += 1;
        debug!(count = pending.len(), "Resolving prices");
        let mut resolved = self.resolver.resolve_many(&pending, ctx)?;

        // Check the whole batch before caching any of it
        if let Some(missing) = pending
            .iter()
            .find(|item| !resolved.contains_key(item.row_key()))
        {
            return Err(CartError::UnresolvablePrice {
                row_key: missing.row_key().clone(),
                reason: "resolver returned no price".to_string(),
            });
        }

        for item in items.values_mut() {
            if let Some(price) = resolved.remove(item.row_key()) {
                item.set_resolved(price);
            }
        }
        Ok(())
    }
}
