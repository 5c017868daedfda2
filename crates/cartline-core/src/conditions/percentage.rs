//! Percentage-of-base modifier.

use serde_json::json;
use std::sync::Arc;

use super::{
    signed_for, AttributeReader, Attributes, Condition, ConditionMeta, ConditionRegistry,
    ConditionTarget, ConditionType,
};
use crate::error::ConditionError;
use crate::money::{Money, Rate};

/// Adjusts by `round_half_up(base × rate)`; negative for discounts,
/// positive for fees, tax and shipping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PercentageCondition {
    meta: ConditionMeta,
    rate: Rate,
}

impl PercentageCondition {
    pub const KIND: &'static str = "percentage";

    pub fn new(meta: ConditionMeta, rate: Rate) -> Self {
        PercentageCondition { meta, rate }
    }

    /// Percentage off the cart total.
    pub fn discount(name: impl Into<String>, rate: Rate, order: i32) -> Self {
        Self::new(
            ConditionMeta::new(name, ConditionType::Discount, ConditionTarget::Total, order),
            rate,
        )
    }

    /// Percentage surcharge on the cart total.
    pub fn fee(name: impl Into<String>, rate: Rate, order: i32) -> Self {
        Self::new(
            ConditionMeta::new(name, ConditionType::Fee, ConditionTarget::Total, order),
            rate,
        )
    }

    pub fn rate(&self) -> Rate {
        self.rate
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
        Ok(Arc::new(PercentageCondition::new(meta, rate)))
    }
}

impl Condition for PercentageCondition {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn meta(&self) -> &ConditionMeta {
        &self.meta
    }

    fn adjustment(&self, base: Money) -> Money {
        signed_for(self.meta.condition_type, base.percentage(self.rate))
    }

    fn attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("rateBps".to_string(), json!(self.rate.bps()));
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_is_negative() {
        let promo = PercentageCondition::discount("promo", Rate::percent(15), 50);
        assert_eq!(promo.adjustment(Money::from_cents(10000)).cents(), -1500);
        assert_eq!(promo.calculate(Money::from_cents(10000)).cents(), 8500);
    }

    #[test]
    fn test_fee_is_positive_and_rounds_half_up() {
        // 1999 × 2.5% = 49.975 → 50
        let service = PercentageCondition::fee("service", Rate::from_bps(250), 10);
        assert_eq!(service.adjustment(Money::from_cents(1999)).cents(), 50);
    }
}
