//! # Cart Totals
//!
//! Turns a priced cart into subtotal, total and a full calculation trace.
//!
//! ## Stages
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  per row:   unit × qty ──► [cart item-target conds + item conds]        │
//! │                                  ──► line total                         │
//! │                                                                         │
//! │  Σ line totals = items subtotal                                         │
//! │                                                                         │
//! │  items subtotal ──► [cart subtotal-target conds] ──► subtotal           │
//! │  subtotal       ──► [cart total-target conds]    ──► total              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ts_rs::TS;

use crate::conditions::{Condition, ConditionTarget};
use crate::error::{CartError, CartResult};
use crate::item::{Item, RowKey};
use crate::money::Money;
use crate::pipeline::{Breakdown, CalculationStep, ConditionPipeline, PipelineOutcome};

/// Which pipeline a trace step came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PricingStage {
    Item,
    Subtotal,
    Total,
}

/// One calculation step tagged with its stage (and row, for item steps).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TraceEntry {
    pub stage: PricingStage,
    pub row_key: Option<RowKey>,
    #[serde(flatten)]
    pub step: CalculationStep,
}

/// Priced cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LineTotal {
    pub row_key: RowKey,
    pub quantity: i64,
    pub unit_price: Money,
    /// `unit_price × quantity`
    pub base: Money,
    /// After item-level conditions.
    pub total: Money,
}

/// Everything a storefront needs to render the cart summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartTotals {
    pub lines: Vec<LineTotal>,
    pub items_subtotal: Money,
    pub subtotal: Money,
    pub total: Money,
    pub row_count: usize,
    pub item_count: i64,
    pub breakdown: Breakdown,
    pub trace: Vec<TraceEntry>,
}

/// Runs the line pipeline for one priced row.
///
/// `cart_conditions` come first, so on equal order they apply before the
/// item's own conditions.
pub(crate) fn price_line(
    item: &Item,
    cart_conditions: &[Arc<dyn Condition>],
) -> CartResult<(Money, PipelineOutcome)> {
    let price = item
        .resolved_price()
        .ok_or_else(|| CartError::UnresolvablePrice {
            row_key: item.row_key().clone(),
            reason: "price not resolved".to_string(),
        })?;
    let base = price
        .unit_price
        .checked_multiply_quantity(item.quantity())
        .ok_or_else(|| CartError::AmountOverflow(item.row_key().clone()))?;

    let pipeline: ConditionPipeline = cart_conditions
        .iter()
        .filter(|c| c.target() == ConditionTarget::Item)
        .chain(item.conditions().iter())
        .cloned()
        .collect();

    Ok((price.unit_price, pipeline.process(base)))
}

fn pipeline_for(cart_conditions: &[Arc<dyn Condition>], target: ConditionTarget) -> ConditionPipeline {
    cart_conditions
        .iter()
        .filter(|c| c.target() == target)
        .cloned()
        .collect()
}

impl CartTotals {
    /// Computes totals for already-priced items.
    pub(crate) fn compute<'a>(
        items: impl IntoIterator<Item = &'a Item>,
        cart_conditions: &[Arc<dyn Condition>],
    ) -> CartResult<Self> {
        let mut lines = Vec::new();
        let mut trace = Vec::new();
        let mut breakdown = Breakdown::default();
        let mut item_count = 0;

        for item in items {
            let (unit_price, outcome) = price_line(item, cart_conditions)?;
            breakdown.merge(&outcome.breakdown());
            item_count += item.quantity();
            trace.extend(outcome.steps.iter().cloned().map(|step| TraceEntry {
                stage: PricingStage::Item,
                row_key: Some(item.row_key().clone()),
                step,
            }));
            lines.push(LineTotal {
                row_key: item.row_key().clone(),
                quantity: item.quantity(),
                unit_price,
                base: outcome.initial,
                total: outcome.value,
            });
        }

        let items_subtotal: Money = lines.iter().map(|line| line.total).sum();

        let subtotal = pipeline_for(cart_conditions, ConditionTarget::Subtotal).process(items_subtotal);
        let total = pipeline_for(cart_conditions, ConditionTarget::Total).process(subtotal.value);

        for (stage, outcome) in [(PricingStage::Subtotal, &subtotal), (PricingStage::Total, &total)] {
            breakdown.merge(&outcome.breakdown());
            trace.extend(outcome.steps.iter().cloned().map(|step| TraceEntry {
                stage,
                row_key: None,
                step,
            }));
        }

        Ok(CartTotals {
            row_count: lines.len(),
            lines,
            items_subtotal,
            subtotal: subtotal.value,
            total: total.value,
            item_count,
            breakdown,
            trace,
        })
    }

    pub fn line(&self, row_key: &RowKey) -> Option<&LineTotal> {
        self.lines.iter().find(|line| &line.row_key == row_key)
    }
}
