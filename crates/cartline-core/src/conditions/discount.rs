//! # Discount Condition
//!
//! A promotional discount, either a percentage or a fixed amount, with two
//! optional guards:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  max cap (percentage mode only)                                         │
//! │    15% of 30000 = 4500, cap 2000 → adjustment −2000                     │
//! │                                                                         │
//! │  minimum order                                                          │
//! │    base 4000 < minimum 5000 → adjustment 0                              │
//! │    stage base below minimum → validate() = Invalid(...)                │
//! │    (on load this gets the discount removed from the cart)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde_json::json;
use std::sync::Arc;

use super::{
    AttributeReader, Attributes, CartHandle, Condition, ConditionMeta, ConditionRegistry,
    ConditionTarget, ConditionType, Validity,
};
use crate::error::ConditionError;
use crate::money::{Money, Rate};

/// How the discount magnitude is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscountMode {
    Percentage(Rate),
    Fixed(Money),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountCondition {
    meta: ConditionMeta,
    mode: DiscountMode,
    max_cap: Option<Money>,
    minimum_order: Option<Money>,
}

impl DiscountCondition {
    pub const KIND: &'static str = "discount";

    pub fn new(meta: ConditionMeta, mode: DiscountMode) -> Self {
        DiscountCondition {
            meta,
            mode,
            max_cap: None,
            minimum_order: None,
        }
    }

    pub fn percentage(name: impl Into<String>, rate: Rate, order: i32) -> Self {
        Self::new(
            ConditionMeta::new(name, ConditionType::Discount, ConditionTarget::Total, order),
            DiscountMode::Percentage(rate),
        )
    }

    pub fn fixed(name: impl Into<String>, amount: Money, order: i32) -> Self {
        Self::new(
            ConditionMeta::new(name, ConditionType::Discount, ConditionTarget::Total, order),
            DiscountMode::Fixed(amount),
        )
    }

    /// Caps the discount magnitude. Ignored in fixed mode.
    pub fn with_max_cap(mut self, cap: Money) -> Self {
        self.max_cap = Some(cap);
        self
    }

    pub fn with_minimum_order(mut self, minimum: Money) -> Self {
        self.minimum_order = Some(minimum);
        self
    }

    pub fn mode(&self) -> DiscountMode {
        self.mode
    }

    pub fn max_cap(&self) -> Option<Money> {
        self.max_cap
    }

    pub fn minimum_order(&self) -> Option<Money> {
        self.minimum_order
    }

    fn below_minimum(&self, value: Money) -> bool {
        self.minimum_order.is_some_and(|minimum| value < minimum)
    }

    pub fn register(registry: &mut ConditionRegistry) {
        registry.register(Self::KIND, Self::from_attributes);
    }

    fn from_attributes(
        meta: ConditionMeta,
        attributes: &Attributes,
    ) -> Result<Arc<dyn Condition>, ConditionError> {
        let reader = AttributeReader::new(&meta.name, attributes);
        let mode = match reader.string("mode")? {
            "percentage" => DiscountMode::Percentage(reader.rate("rateBps")?),
            "fixed" => DiscountMode::Fixed(reader.money("amount")?),
            other => {
                return Err(ConditionError::InvalidAttribute {
                    condition: meta.name.clone(),
                    attribute: "mode".to_string(),
                    reason: format!("expected 'percentage' or 'fixed', got '{other}'"),
                })
            }
        };
        let max_cap = reader.optional_money("maxCap")?;
        let minimum_order = reader.optional_money("minimumOrder")?;

        Ok(Arc::new(DiscountCondition {
            meta,
            mode,
            max_cap,
            minimum_order,
        }))
    }
}

impl Condition for DiscountCondition {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn meta(&self) -> &ConditionMeta {
        &self.meta
    }

    fn adjustment(&self, base: Money) -> Money {
        let base = base.clamp_non_negative();
        if self.below_minimum(base) {
            return Money::zero();
        }

        let magnitude = match self.mode {
            DiscountMode::Percentage(rate) => {
                let raw = base.percentage(rate);
                match self.max_cap {
                    Some(cap) => raw.min(cap.abs()),
                    None => raw,
                }
            }
            DiscountMode::Fixed(amount) => amount.abs().min(base),
        };
        -magnitude
    }

    /// Checks the minimum order against the same base `adjustment` sees:
    /// the running value in this discount's stage, or the items subtotal
    /// when the cart was not priced with this discount.
    fn validate(&self, cart: &dyn CartHandle) -> Validity {
        let base = cart
            .stage_base(self.name())
            .unwrap_or_else(|| cart.items_subtotal());
        match self.minimum_order {
            Some(minimum) if base < minimum => Validity::Invalid(format!(
                "order value {base} is below the minimum order of {minimum}"
            )),
            _ => Validity::Valid,
        }
    }

    fn attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        match self.mode {
            DiscountMode::Percentage(rate) => {
                attributes.insert("mode".to_string(), json!("percentage"));
                attributes.insert("rateBps".to_string(), json!(rate.bps()));
            }
            DiscountMode::Fixed(amount) => {
                attributes.insert("mode".to_string(), json!("fixed"));
                attributes.insert("amount".to_string(), json!(amount.cents()));
            }
        }
        if let Some(cap) = self.max_cap {
            attributes.insert("maxCap".to_string(), json!(cap.cents()));
        }
        if let Some(minimum) = self.minimum_order {
            attributes.insert("minimumOrder".to_string(), json!(minimum.cents()));
        }
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    struct Subtotal(Money);

    impl CartHandle for Subtotal {
        fn items_subtotal(&self) -> Money {
            self.0
        }
        fn total_quantity(&self) -> i64 {
            1
        }
        fn row_count(&self) -> usize {
            1
        }
        fn contains_product(&self, _product_identity: &str) -> bool {
            false
        }
        fn metadata(&self, _key: &str) -> Option<&Value> {
            None
        }
    }

    /// Items subtotal plus the stage base one named condition saw.
    struct Staged(Money, &'static str, Money);

    impl CartHandle for Staged {
        fn items_subtotal(&self) -> Money {
            self.0
        }
        fn stage_base(&self, condition: &str) -> Option<Money> {
            (condition == self.1).then_some(self.2)
        }
        fn total_quantity(&self) -> i64 {
            1
        }
        fn row_count(&self) -> usize {
            1
        }
        fn contains_product(&self, _product_identity: &str) -> bool {
            false
        }
        fn metadata(&self, _key: &str) -> Option<&Value> {
            None
        }
    }

    #[test]
    fn test_cap_bounds_percentage_discount() {
        let capped = DiscountCondition::percentage("summer", Rate::percent(15), 50)
            .with_max_cap(Money::from_cents(2000));

        for base in [0, 1000, 13_333, 13_334, 30_000, 1_000_000] {
            let adjustment = capped.adjustment(Money::from_cents(base));
            assert!(adjustment.abs() <= Money::from_cents(2000), "base {base}");
        }
        assert_eq!(capped.adjustment(Money::from_cents(10_000)).cents(), -1500);
        assert_eq!(capped.adjustment(Money::from_cents(30_000)).cents(), -2000);
    }

    #[test]
    fn test_cap_is_ignored_in_fixed_mode() {
        let fixed = DiscountCondition::fixed("coupon", Money::from_cents(3000), 50)
            .with_max_cap(Money::from_cents(1000));
        assert_eq!(fixed.adjustment(Money::from_cents(10_000)).cents(), -3000);
        assert_eq!(fixed.adjustment(Money::from_cents(2000)).cents(), -2000);
    }

    #[test]
    fn test_minimum_order_gates_adjustment_and_validity() {
        let gated = DiscountCondition::percentage("big-basket", Rate::percent(10), 50)
            .with_minimum_order(Money::from_cents(5000));

        assert_eq!(gated.adjustment(Money::from_cents(4999)), Money::zero());
        assert_eq!(gated.adjustment(Money::from_cents(5000)).cents(), -500);

        assert!(gated.validate(&Subtotal(Money::from_cents(5000))).is_valid());
        match gated.validate(&Subtotal(Money::from_cents(4000))) {
            Validity::Invalid(reason) => assert!(reason.contains("below the minimum order")),
            Validity::Valid => panic!("expected invalid"),
        }
    }

    #[test]
    fn test_minimum_order_uses_stage_base_when_known() {
        let gated = DiscountCondition::percentage("big-basket", Rate::percent(10), 50)
            .with_minimum_order(Money::from_cents(5000));

        let marked_down = Staged(Money::from_cents(6000), "big-basket", Money::from_cents(4000));
        assert!(!gated.validate(&marked_down).is_valid());

        let other = Staged(Money::from_cents(6000), "markdown", Money::from_cents(4000));
        assert!(gated.validate(&other).is_valid());
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let registry = {
            let mut registry = ConditionRegistry::new();
            DiscountCondition::register(&mut registry);
            registry
        };
        let record = serde_json::from_value(json!({
            "kind": "discount",
            "name": "odd",
            "type": "discount",
            "target": "total",
            "attributes": { "mode": "bogo" }
        }))
        .unwrap();

        assert!(matches!(
            registry.build(&record),
            Err(ConditionError::InvalidAttribute { ref attribute, .. }) if attribute == "mode"
        ));
    }
}
