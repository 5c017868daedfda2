//! Fixtures shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::cart::CartRecord;
use crate::config::CartConfig;
use crate::error::{ResolveError, StorageError};
use crate::item::{Item, Options, RowKey};
use crate::money::Money;
use crate::notify::RecordingNotifier;
use crate::operations::CartOperations;
use crate::pricing::{PriceResolver, PricingContext, ResolvedPrice};
use crate::product::CatalogProduct;
use crate::storage::{CartStorage, InMemoryStorage};

/// A product whose identity and reference are both `name`.
pub(crate) fn product(name: &str, cents: i64) -> CatalogProduct {
    CatalogProduct {
        identity: name.to_string(),
        label: name.to_string(),
        kind: "test".to_string(),
        reference: name.to_string(),
        price: Money::from_cents(cents),
        member_price: None,
        available: true,
    }
}

pub(crate) fn options(pairs: &[(&str, &str)]) -> Options {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// =============================================================================
// Resolver
// =============================================================================

/// Prices by product identity and records every batch it is asked for.
#[derive(Debug, Default)]
pub(crate) struct StaticPriceResolver {
    prices: HashMap<String, Money>,
    omit_unknown: bool,
    batches: Mutex<Vec<usize>>,
}

impl StaticPriceResolver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn price(mut self, identity: &str, cents: i64) -> Self {
        self.prices
            .insert(identity.to_string(), Money::from_cents(cents));
        self
    }

    /// Leave unknown items out of the batch result instead of failing.
    pub(crate) fn omitting_unknown(mut self) -> Self {
        self.omit_unknown = true;
        self
    }

    pub(crate) fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

impl PriceResolver for StaticPriceResolver {
    fn resolve(&self, item: &Item, _ctx: &PricingContext) -> Result<ResolvedPrice, ResolveError> {
        self.prices
            .get(item.product_identity())
            .map(|price| ResolvedPrice::new(*price).with_source("static"))
            .ok_or_else(|| ResolveError::new(item.row_key().clone(), "unknown product"))
    }

    fn resolve_many(
        &self,
        items: &[&Item],
        ctx: &PricingContext,
    ) -> Result<HashMap<RowKey, ResolvedPrice>, ResolveError> {
        self.batches.lock().unwrap().push(items.len());
        let mut resolved = HashMap::new();
        for item in items {
            match self.resolve(item, ctx) {
                Ok(price) => {
                    resolved.insert(item.row_key().clone(), price);
                }
                Err(_) if self.omit_unknown => {}
                Err(e) => return Err(e),
            }
        }
        Ok(resolved)
    }
}

/// Fails every lookup, as if the pricing service were down.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct FailingResolver;

impl PriceResolver for FailingResolver {
    fn resolve(&self, item: &Item, _ctx: &PricingContext) -> Result<ResolvedPrice, ResolveError> {
        Err(ResolveError::new(
            item.row_key().clone(),
            "pricing service unavailable",
        ))
    }
}

// =============================================================================
// Storage
// =============================================================================

/// In-memory storage whose reads and writes can be switched to fail.
#[derive(Debug, Default)]
pub(crate) struct FlakyStorage {
    inner: InMemoryStorage,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_forgets: AtomicBool,
}

impl FlakyStorage {
    pub(crate) fn inner(&self) -> &InMemoryStorage {
        &self.inner
    }

    pub(crate) fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fails `forget` alone, leaving `put` working.
    pub(crate) fn fail_forgets(&self, fail: bool) {
        self.fail_forgets.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> Result<(), StorageError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("storage offline".to_string()));
        }
        Ok(())
    }
}

impl CartStorage for FlakyStorage {
    fn get(&self, scope: &str, identifier: Option<&str>) -> Result<Option<CartRecord>, StorageError> {
        Self::check(&self.fail_reads)?;
        self.inner.get(scope, identifier)
    }

    fn put(
        &self,
        scope: &str,
        identifier: Option<&str>,
        record: &CartRecord,
    ) -> Result<(), StorageError> {
        Self::check(&self.fail_writes)?;
        self.inner.put(scope, identifier, record)
    }

    fn forget(&self, scope: &str, identifier: Option<&str>) -> Result<(), StorageError> {
        Self::check(&self.fail_writes)?;
        Self::check(&self.fail_forgets)?;
        self.inner.forget(scope, identifier)
    }

    fn flush(&self, identifier: Option<&str>) -> Result<(), StorageError> {
        Self::check(&self.fail_writes)?;
        self.inner.flush(identifier)
    }
}

// =============================================================================
// Harness
// =============================================================================

/// Shared storage, resolver and notifier for building operations.
pub(crate) struct Harness {
    pub(crate) storage: Arc<FlakyStorage>,
    pub(crate) resolver: Arc<StaticPriceResolver>,
    pub(crate) notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Harness {
            storage: Arc::new(FlakyStorage::default()),
            resolver: Arc::new(StaticPriceResolver::new()),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    /// Only valid before the resolver is shared.
    pub(crate) fn price(mut self, identity: &str, cents: i64) -> Self {
        let resolver = Arc::try_unwrap(self.resolver).unwrap_or_default();
        self.resolver = Arc::new(resolver.price(identity, cents));
        self
    }

    /// Operations on the `default` scope of `guest-1`.
    pub(crate) fn ops(&self, config: &CartConfig) -> CartOperations {
        self.ops_for(config, "default", "guest-1")
    }

    pub(crate) fn ops_for(&self, config: &CartConfig, scope: &str, identifier: &str) -> CartOperations {
        CartOperations::new(config, scope, self.storage.clone(), self.resolver.clone())
            .with_identifier(identifier)
            .with_notifier(self.notifier.clone())
    }
}
