//! # Condition Pipeline
//!
//! Orders conditions and applies them one after another to a value.
//!
//! ## Why Order Is Semantic
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  value 10000, discount 20% capped at 1000, tax 10% (exclusive)          │
//! │                                                                         │
//! │  discount (order 50) then tax (order 100):                              │
//! │    10000 ──► 9000 ──► 9900                                              │
//! │                                                                         │
//! │  tax (order 50) then discount (order 100):                              │
//! │    10000 ──► 11000 ──► 10000                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! 1. Sort by `order` ascending; equal orders keep insertion order (stable sort)
//! 2. After every step the running value is clamped to ≥ 0
//! 3. Every step is recorded in the trace

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use ts_rs::TS;

use crate::conditions::{Condition, ConditionType};
use crate::money::Money;

// =============================================================================
// Trace Types
// =============================================================================

/// One applied condition in a calculation trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CalculationStep {
    pub name: String,
    pub condition_type: ConditionType,
    pub order: i32,
    pub before: Money,
    pub after: Money,
    /// Signed change attributed to this condition.
    pub change: Money,
}

/// Result of running a pipeline over one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PipelineOutcome {
    pub initial: Money,
    pub value: Money,
    pub steps: Vec<CalculationStep>,
}

impl PipelineOutcome {
    /// Sums step changes grouped by condition type.
    pub fn breakdown(&self) -> Breakdown {
        let mut breakdown = Breakdown::default();
        for step in &self.steps {
            breakdown.add(step.condition_type, step.change);
        }
        breakdown
    }
}

/// Signed totals per condition type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Breakdown(BTreeMap<ConditionType, Money>);

impl Breakdown {
    pub fn add(&mut self, condition_type: ConditionType, change: Money) {
        *self.0.entry(condition_type).or_default() += change;
    }

    /// Folds another breakdown into this one.
    pub fn merge(&mut self, other: &Breakdown) {
        for (condition_type, change) in &other.0 {
            self.add(*condition_type, *change);
        }
    }

    /// Total for one type, zero if the type never appeared.
    pub fn get(&self, condition_type: ConditionType) -> Money {
        self.0.get(&condition_type).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConditionType, Money)> + '_ {
        self.0.iter().map(|(t, m)| (*t, *m))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// An ordered sequence of conditions.
#[derive(Debug, Clone, Default)]
pub struct ConditionPipeline {
    conditions: Vec<Arc<dyn Condition>>,
}

impl ConditionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a condition; its insertion index is its tie-breaker.
    pub fn push(&mut self, condition: Arc<dyn Condition>) {
        self.conditions.push(condition);
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Conditions in application order.
    pub fn ordered(&self) -> Vec<&Arc<dyn Condition>> {
        let mut ordered: Vec<_> = self.conditions.iter().collect();
        // sort_by_key is stable: equal orders stay in insertion order
        ordered.sort_by_key(|c| c.order());
        ordered
    }

    /// Applies every condition in order to `value`.
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use cartline_core::conditions::{PercentageCondition, TaxCondition};
    /// use cartline_core::money::{Money, Rate};
    /// use cartline_core::pipeline::ConditionPipeline;
    ///
    /// let mut pipeline = ConditionPipeline::new();
    /// pipeline.push(Arc::new(TaxCondition::exclusive("tax", Rate::percent(10), 100)));
    /// pipeline.push(Arc::new(PercentageCondition::discount("promo", Rate::percent(15), 50)));
    ///
    /// let outcome = pipeline.process(Money::from_cents(10000));
    /// assert_eq!(outcome.value.cents(), 9350);
    /// assert_eq!(outcome.steps[0].name, "promo");
    /// ```
    pub fn process(&self, value: Money) -> PipelineOutcome {
        let mut running = value;
        let mut steps = Vec::with_capacity(self.conditions.len());

        for condition in self.ordered() {
            let before = running;
            let after = condition.calculate(before).clamp_non_negative();
            steps.push(CalculationStep {
                name: condition.name().to_string(),
                condition_type: condition.condition_type(),
                order: condition.order(),
                before,
                after,
                change: condition.reported_change(before, after),
            });
            running = after;
        }

        PipelineOutcome {
            initial: value,
            value: running,
            steps,
        }
    }
}

impl FromIterator<Arc<dyn Condition>> for ConditionPipeline {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Condition>>>(iter: I) -> Self {
        ConditionPipeline {
            conditions: iter.into_iter().collect(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
