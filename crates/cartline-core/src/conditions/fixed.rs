//! Fixed-amount modifier.

use serde_json::json;
use std::sync::Arc;

use super::{
    AttributeReader, Attributes, Condition, ConditionMeta, ConditionRegistry, ConditionTarget,
    ConditionType,
};
use crate::error::ConditionError;
use crate::money::Money;

/// Adds a signed fixed amount.
///
/// As a discount the magnitude is capped at the base, so a $10 coupon on an
/// $8 cart takes exactly $8 off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedCondition {
    meta: ConditionMeta,
    amount: Money,
}

impl FixedCondition {
    pub const KIND: &'static str = "fixed";

    pub fn new(meta: ConditionMeta, amount: Money) -> Self {
        FixedCondition { meta, amount }
    }

    /// Fixed amount off the cart total.
    pub fn discount(name: impl Into<String>, amount: Money, order: i32) -> Self {
        Self::new(
            ConditionMeta::new(name, ConditionType::Discount, ConditionTarget::Total, order),
            amount,
        )
    }

    /// Fixed surcharge on the cart total.
    pub fn fee(name: impl Into<String>, amount: Money, order: i32) -> Self {
        Self::new(
            ConditionMeta::new(name, ConditionType::Fee, ConditionTarget::Total, order),
            amount,
        )
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn register(registry: &mut ConditionRegistry) {
        registry.register(Self::KIND, Self::from_attributes);
    }

    fn from_attributes(
        meta: ConditionMeta,
        attributes: &Attributes,
    ) -> Result<Arc<dyn Condition>, ConditionError> {
        let amount = AttributeReader::new(&meta.name, attributes).money("amount")?;
        Ok(Arc::new(FixedCondition::new(meta, amount)))
    }
}

impl Condition for FixedCondition {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn meta(&self) -> &ConditionMeta {
        &self.meta
    }

    fn adjustment(&self, base: Money) -> Money {
        match self.meta.condition_type {
            ConditionType::Discount => -self.amount.abs().min(base.clamp_non_negative()),
            _ => self.amount,
        }
    }

    fn attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("amount".to_string(), json!(self.amount.cents()));
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_capped_at_base() {
        let coupon = FixedCondition::discount("coupon", Money::from_cents(1000), 10);
        assert_eq!(coupon.adjustment(Money::from_cents(5000)).cents(), -1000);
        assert_eq!(coupon.adjustment(Money::from_cents(800)).cents(), -800);
        assert_eq!(coupon.calculate(Money::from_cents(800)), Money::zero());
    }

    #[test]
    fn test_fee_keeps_its_sign() {
        let fee = FixedCondition::fee("handling", Money::from_cents(250), 10);
        assert_eq!(fee.adjustment(Money::zero()).cents(), 250);

        let credit = FixedCondition::fee("credit", Money::from_cents(-250), 10);
        assert_eq!(credit.adjustment(Money::from_cents(1000)).cents(), -250);
    }
}
