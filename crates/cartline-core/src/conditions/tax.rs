//! # Tax Condition
//!
//! ## Exclusive vs Inclusive
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  EXCLUSIVE (US sales tax style)                                         │
//! │    base 10000, rate 10%  → adjustment +1000 → value 11000               │
//! │                                                                         │
//! │  INCLUSIVE (EU VAT style, tax already in the shelf price)               │
//! │    base 11000, rate 10%  → value stays 11000                            │
//! │    reported tax = 11000 − round(11000 × 100 / 110) = 1000               │
//! │                                                                         │
//! │  Inclusive tax never moves the running value; its adjustment exists    │
//! │  only so the breakdown can show how much of the price is tax.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde_json::json;
use std::sync::Arc;

use super::{
    AttributeReader, Attributes, Condition, ConditionMeta, ConditionRegistry, ConditionTarget,
    ConditionType,
};
use crate::error::ConditionError;
use crate::money::{Money, Rate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxCondition {
    meta: ConditionMeta,
    rate: Rate,
    inclusive: bool,
}

impl TaxCondition {
    pub const KIND: &'static str = "tax";

    pub fn new(meta: ConditionMeta, rate: Rate, inclusive: bool) -> Self {
        TaxCondition {
            meta,
            rate,
            inclusive,
        }
    }

    /// Tax added on top of the cart total.
    pub fn exclusive(name: impl Into<String>, rate: Rate, order: i32) -> Self {
        Self::new(
            ConditionMeta::new(name, ConditionType::Tax, ConditionTarget::Total, order),
            rate,
            false,
        )
    }

    /// Tax already embedded in the cart total.
    pub fn inclusive(name: impl Into<String>, rate: Rate, order: i32) -> Self {
        Self::new(
            ConditionMeta::new(name, ConditionType::Tax, ConditionTarget::Total, order),
            rate,
            true,
        )
    }

    pub fn rate(&self) -> Rate {
        self.rate
    }

    pub fn is_inclusive(&self) -> bool {
        self.inclusive
    }

    pub fn register(registry: &mut ConditionRegistry) {
        registry.register(Self::KIND, Self::from_attributes);
    }

    fn from_attributes(
        meta: ConditionMeta,
        attributes: &Attributes,
    ) -> Result<Arc<dyn Condition>, ConditionError> {
        let reader = AttributeReader::new(&meta.name, attributes);
        let rate = reader.rate("rateBps")?;
        let inclusive = reader.flag("inclusive")?;
        Ok(Arc::new(TaxCondition::new(meta, rate, inclusive)))
    }
}

impl Condition for TaxCondition {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn meta(&self) -> &ConditionMeta {
        &self.meta
    }

    fn adjustment(&self, base: Money) -> Money {
        if self.inclusive {
            base.extract_inclusive(self.rate)
        } else {
            base.percentage(self.rate)
        }
    }

    fn calculate(&self, value: Money) -> Money {
        if self.inclusive {
            value
        } else {
            value + self.adjustment(value)
        }
    }

    fn reported_change(&self, before: Money, after: Money) -> Money {
        if self.inclusive {
            self.adjustment(before)
        } else {
            after - before
        }
    }

    fn attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("rateBps".to_string(), json!(self.rate.bps()));
        attributes.insert("inclusive".to_string(), json!(self.inclusive));
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_adds_on_top() {
        let tax = TaxCondition::exclusive("sales-tax", Rate::percent(10), 100);
        assert_eq!(tax.calculate(Money::from_cents(8500)).cents(), 9350);
    }

    #[test]
    fn test_inclusive_is_identity_and_reports_extracted_tax() {
        let vat = TaxCondition::inclusive("vat", Rate::percent(20), 100);
        let gross = Money::from_cents(1199);

        assert_eq!(vat.calculate(gross), gross);
        // 1199 × 100 / 120 = 999.17 → 999; tax = 200
        assert_eq!(vat.adjustment(gross).cents(), 200);
        assert_eq!(vat.reported_change(gross, gross).cents(), 200);
    }

    #[test]
    fn test_inclusive_subtotal_plus_tax_equals_price() {
        let rate = Rate::from_bps(825);
        let vat = TaxCondition::inclusive("vat", rate, 100);
        for cents in [1, 333, 1083, 4999, 99_999] {
            let price = Money::from_cents(cents);
            let tax = vat.adjustment(price);
            let subtotal = price - tax;
            assert_eq!(subtotal + tax, price);
            assert!(tax <= price);
        }
    }
}
