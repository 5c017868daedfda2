//! # Condition Registry
//!
//! Rebuilds conditions from their serialized records.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stored record                       registry                           │
//! │  {"kind": "discount", ...}  ──────►  "discount" → DiscountCondition::   │
//! │                                                   from_record           │
//! │                                      "tax"      → TaxCondition::...     │
//! │                                      "shipping" → ShippingCondition::...│
//! │                                      "custom"   → caller-registered     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every built-in variant exposes `register(&mut ConditionRegistry)`;
//! [`ConditionRegistry::with_builtins`] calls each of them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{
    Attributes, Condition, ConditionMeta, ConditionRecord, DiscountCondition, FixedCondition,
    PercentageCondition, ShippingCondition, TaxCondition,
};
use crate::error::ConditionError;

/// Builds a condition from its meta and attribute bag.
pub type ConditionFactory =
    fn(ConditionMeta, &Attributes) -> Result<Arc<dyn Condition>, ConditionError>;

/// Kind-keyed factory table.
#[derive(Clone, Default)]
pub struct ConditionRegistry {
    factories: HashMap<String, ConditionFactory>,
}

impl fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.factories.keys().collect();
        kinds.sort();
        f.debug_struct("ConditionRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

impl ConditionRegistry {
    /// An empty registry. Most callers want [`with_builtins`](Self::with_builtins).
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in variant registered.
    pub fn with_builtins() -> Self {
        let mut registry = ConditionRegistry::new();
        PercentageCondition::register(&mut registry);
        FixedCondition::register(&mut registry);
        TaxCondition::register(&mut registry);
        DiscountCondition::register(&mut registry);
        ShippingCondition::register(&mut registry);
        registry
    }

    /// Registers (or replaces) the factory for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, factory: ConditionFactory) {
        let kind = kind.into();
        debug!(kind = %kind, "Registering condition kind");
        self.factories.insert(kind, factory);
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Rebuilds a condition from its record.
    pub fn build(&self, record: &ConditionRecord) -> Result<Arc<dyn Condition>, ConditionError> {
        let factory = self
            .factories
            .get(&record.kind)
            .ok_or_else(|| ConditionError::UnknownKind(record.kind.clone()))?;
        factory(record.meta(), &record.attributes)
    }
}
