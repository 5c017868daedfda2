//! # Conditions
//!
//! Price modifiers (tax, discount, shipping, fee) applied by the
//! [`ConditionPipeline`](crate::pipeline::ConditionPipeline).
//!
//! ## Anatomy of a Condition
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ConditionMeta                    Variant-specific state                │
//! │  ─────────────                    ──────────────────────                │
//! │  name    "summer-sale"            rate 1500 bps                         │
//! │  type    discount                 max cap 2000                          │
//! │  target  total                    minimum order 5000                    │
//! │  order   50                                                             │
//! │                                                                         │
//! │  adjustment(base) → signed delta  (-1500 for base 10000)                │
//! │  calculate(value) → value + delta                                       │
//! │  validate(cart)   → Valid | Invalid("subtotal 40.00 below 50.00")       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Conditions are immutable value objects shared as `Arc<dyn Condition>`.
//! They persist as [`ConditionRecord`]s and come back through the
//! [`ConditionRegistry`].

mod discount;
mod fixed;
mod percentage;
mod registry;
mod set;
mod shipping;
mod tax;

pub use discount::{DiscountCondition, DiscountMode};
pub use fixed::FixedCondition;
pub use percentage::PercentageCondition;
pub use registry::{ConditionFactory, ConditionRegistry};
pub use set::ConditionSet;
pub use shipping::ShippingCondition;
pub use tax::TaxCondition;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use ts_rs::TS;

use crate::error::ConditionError;
use crate::money::{Money, Rate};

/// Free-form attribute bag used by condition records.
pub type Attributes = serde_json::Map<String, Value>;

// =============================================================================
// Type & Target
// =============================================================================

/// What kind of modifier a condition is. Drives sign and breakdown grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ConditionType {
    Tax,
    Discount,
    Shipping,
    Fee,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionType::Tax => write!(f, "tax"),
            ConditionType::Discount => write!(f, "discount"),
            ConditionType::Shipping => write!(f, "shipping"),
            ConditionType::Fee => write!(f, "fee"),
        }
    }
}

/// Which value a condition modifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ConditionTarget {
    /// Each line total (for item-scoped conditions, or cart-wide per-line rules).
    Item,
    /// The sum of line totals.
    Subtotal,
    /// The subtotal after subtotal conditions.
    Total,
}

// =============================================================================
// Meta
// =============================================================================

/// Identity and placement shared by every condition variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionMeta {
    pub name: String,
    pub condition_type: ConditionType,
    pub target: ConditionTarget,
    /// Lower applies first; ties keep insertion order.
    pub order: i32,
}

impl ConditionMeta {
    pub fn new(
        name: impl Into<String>,
        condition_type: ConditionType,
        target: ConditionTarget,
        order: i32,
    ) -> Self {
        ConditionMeta {
            name: name.into(),
            condition_type,
            target,
            order,
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Outcome of [`Condition::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    Valid,
    /// Invalid, with a diagnostic for the invalidation notification.
    Invalid(String),
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid)
    }
}

/// Read-only view of a cart that conditions may inspect while validating.
///
/// Implemented by [`CartSnapshot`](crate::cart::CartSnapshot); it is built
/// from already-resolved prices, so a condition can ask for the subtotal
/// without triggering another load.
pub trait CartHandle {
    /// Sum of line totals before cart-scoped subtotal/total conditions.
    fn items_subtotal(&self) -> Money;

    /// Running value the named cart-level condition received in its stage,
    /// if the cart was priced with it.
    fn stage_base(&self, _condition: &str) -> Option<Money> {
        None
    }

    /// Sum of all line quantities.
    fn total_quantity(&self) -> i64;

    /// Number of distinct rows.
    fn row_count(&self) -> usize;

    /// Whether any row carries this product identity.
    fn contains_product(&self, product_identity: &str) -> bool;

    /// Cart-level metadata value.
    fn metadata(&self, key: &str) -> Option<&Value>;
}

// =============================================================================
// Condition Trait
// =============================================================================

/// A price modifier.
///
/// Implementors only need `kind`, `meta`, `adjustment` and `attributes`;
/// everything else has a default in terms of those.
pub trait Condition: fmt::Debug + Send + Sync {
    /// Registry key used to rebuild this condition from a record.
    fn kind(&self) -> &'static str;

    fn meta(&self) -> &ConditionMeta;

    fn name(&self) -> &str {
        &self.meta().name
    }

    fn condition_type(&self) -> ConditionType {
        self.meta().condition_type
    }

    fn target(&self) -> ConditionTarget {
        self.meta().target
    }

    fn order(&self) -> i32 {
        self.meta().order
    }

    /// Signed change this condition makes to `base`.
    fn adjustment(&self, base: Money) -> Money;

    /// Applies the condition to a running value.
    fn calculate(&self, value: Money) -> Money {
        value + self.adjustment(value)
    }

    /// Change recorded in the calculation trace for one step.
    fn reported_change(&self, before: Money, after: Money) -> Money {
        after - before
    }

    /// Whether the condition still applies to `cart`.
    fn validate(&self, _cart: &dyn CartHandle) -> Validity {
        Validity::Valid
    }

    /// Variant-specific attributes for serialization.
    fn attributes(&self) -> Attributes;

    fn to_record(&self) -> ConditionRecord {
        let meta = self.meta();
        ConditionRecord {
            kind: self.kind().to_string(),
            name: meta.name.clone(),
            condition_type: meta.condition_type,
            target: meta.target,
            order: meta.order,
            attributes: self.attributes(),
        }
    }
}

/// Signed adjustment for a rate-based modifier: discounts subtract, every
/// other type adds.
pub(crate) fn signed_for(condition_type: ConditionType, magnitude: Money) -> Money {
    match condition_type {
        ConditionType::Discount => -magnitude.abs(),
        _ => magnitude,
    }
}

// =============================================================================
// Serialized Form
// =============================================================================

/// Serialized condition: `{kind, name, type, target, order, attributes}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionRecord {
    pub kind: String,
    pub name: String,
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub target: ConditionTarget,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub attributes: Attributes,
}

impl ConditionRecord {
    pub fn meta(&self) -> ConditionMeta {
        ConditionMeta::new(
            self.name.clone(),
            self.condition_type,
            self.target,
            self.order,
        )
    }
}

impl From<&Arc<dyn Condition>> for ConditionRecord {
    fn from(condition: &Arc<dyn Condition>) -> Self {
        condition.to_record()
    }
}

// =============================================================================
// Attribute Helpers
// =============================================================================

/// Typed accessors over an [`Attributes`] bag, producing `ConditionError`s
/// that name the condition and attribute.
pub(crate) struct AttributeReader<'a> {
    condition: &'a str,
    attributes: &'a Attributes,
}

impl<'a> AttributeReader<'a> {
    pub(crate) fn new(condition: &'a str, attributes: &'a Attributes) -> Self {
        AttributeReader {
            condition,
            attributes,
        }
    }

    fn missing(&self, attribute: &str) -> ConditionError {
        ConditionError::MissingAttribute {
            condition: self.condition.to_string(),
            attribute: attribute.to_string(),
        }
    }

    fn invalid(&self, attribute: &str, reason: &str) -> ConditionError {
        ConditionError::InvalidAttribute {
            condition: self.condition.to_string(),
            attribute: attribute.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn optional_i64(&self, attribute: &str) -> Result<Option<i64>, ConditionError> {
        match self.attributes.get(attribute) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_i64()
                .map(Some)
                .ok_or_else(|| self.invalid(attribute, "expected an integer")),
        }
    }

    pub(crate) fn money(&self, attribute: &str) -> Result<Money, ConditionError> {
        self.optional_money(attribute)?
            .ok_or_else(|| self.missing(attribute))
    }

    pub(crate) fn optional_money(&self, attribute: &str) -> Result<Option<Money>, ConditionError> {
        Ok(self.optional_i64(attribute)?.map(Money::from_cents))
    }

    pub(crate) fn rate(&self, attribute: &str) -> Result<Rate, ConditionError> {
        let bps = self
            .optional_i64(attribute)?
            .ok_or_else(|| self.missing(attribute))?;
        u32::try_from(bps)
            .map(Rate::from_bps)
            .map_err(|_| self.invalid(attribute, "rate must be a non-negative basis-point value"))
    }

    pub(crate) fn flag(&self, attribute: &str) -> Result<bool, ConditionError> {
        match self.attributes.get(attribute) {
            None | Some(Value::Null) => Ok(false),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| self.invalid(attribute, "expected a boolean")),
        }
    }

    pub(crate) fn string(&self, attribute: &str) -> Result<&'a str, ConditionError> {
        match self.attributes.get(attribute) {
            None | Some(Value::Null) => Err(self.missing(attribute)),
            Some(value) => value
                .as_str()
                .ok_or_else(|| self.invalid(attribute, "expected a string")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_uses_wire_field_names() {
        let condition = TaxCondition::exclusive("vat", Rate::percent(10), 100);
        let value = serde_json::to_value(condition.to_record()).unwrap();
        assert_eq!(value["kind"], "tax");
        assert_eq!(value["type"], "tax");
        assert_eq!(value["target"], "total");
        assert_eq!(value["order"], 100);
        assert_eq!(value["attributes"]["rateBps"], 1000);
    }

    #[test]
    fn test_attribute_reader_errors_name_the_attribute() {
        let attrs = json!({ "rateBps": -5, "amount": "ten" });
        let attrs = attrs.as_object().unwrap();
        let reader = AttributeReader::new("promo", attrs);

        assert!(matches!(
            reader.rate("rateBps"),
            Err(ConditionError::InvalidAttribute { ref attribute, .. }) if attribute == "rateBps"
        ));
        assert!(matches!(
            reader.money("amount"),
            Err(ConditionError::InvalidAttribute { .. })
        ));
        assert_eq!(
            reader.money("cap"),
            Err(ConditionError::MissingAttribute {
                condition: "promo".to_string(),
                attribute: "cap".to_string(),
            })
        );
        assert_eq!(reader.optional_money("cap"), Ok(None));
        assert_eq!(reader.flag("inclusive"), Ok(false));
    }

    #[test]
    fn test_signed_for() {
        let m = Money::from_cents(250);
        assert_eq!(signed_for(ConditionType::Discount, m).cents(), -250);
        assert_eq!(signed_for(ConditionType::Fee, m).cents(), 250);
        assert_eq!(signed_for(ConditionType::Tax, m).cents(), 250);
    }
}
