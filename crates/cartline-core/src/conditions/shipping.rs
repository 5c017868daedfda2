//! Shipping fee with an optional free-shipping threshold.

use serde_json::json;
use std::sync::Arc;

use super::{
    AttributeReader, Attributes, Condition, ConditionMeta, ConditionRegistry, ConditionTarget,
    ConditionType,
};
use crate::error::ConditionError;
use crate::money::Money;

/// Charges `fee` until the base reaches `free_threshold`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippingCondition {
    meta: ConditionMeta,
    fee: Money,
    free_threshold: Option<Money>,
}

impl ShippingCondition {
    pub const KIND: &'static str = "shipping";

    /// Shipping fee applied to the cart total.
    pub fn new(name: impl Into<String>, fee: Money, order: i32) -> Self {
        Self::with_meta(
            ConditionMeta::new(name, ConditionType::Shipping, ConditionTarget::Total, order),
            fee,
        )
    }

    pub fn with_meta(meta: ConditionMeta, fee: Money) -> Self {
        ShippingCondition {
            meta,
            fee,
            free_threshold: None,
        }
    }

    pub fn with_free_threshold(mut self, threshold: Money) -> Self {
        self.free_threshold = Some(threshold);
        self
    }

    pub fn fee(&self) -> Money {
        self.fee
    }

    pub fn free_threshold(&self) -> Option<Money> {
        self.free_threshold
    }

    pub fn register(registry: &mut ConditionRegistry) {
        registry.register(Self::KIND, Self::from_attributes);
    }

    fn from_attributes(
        meta: ConditionMeta,
        attributes: &Attributes,
    ) -> Result<Arc<dyn Condition>, ConditionError> {
        let reader = AttributeReader::new(&meta.name, attributes);
        let fee = reader.money("fee")?;
        let free_threshold = reader.optional_money("freeThreshold")?;
        Ok(Arc::new(ShippingCondition {
            meta,
            fee,
            free_threshold,
        }))
    }
}

impl Condition for ShippingCondition {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn meta(&self) -> &ConditionMeta {
        &self.meta
    }

    fn adjustment(&self, base: Money) -> Money {
        match self.free_threshold {
            Some(threshold) if base >= threshold => Money::zero(),
            _ => self.fee,
        }
    }

    fn attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("fee".to_string(), json!(self.fee.cents()));
        if let Some(threshold) = self.free_threshold {
            attributes.insert("freeThreshold".to_string(), json!(threshold.cents()));
        }
        attributes
    }
}
