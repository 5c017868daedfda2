//! Ordered, name-unique collection of conditions.

use std::sync::Arc;

use super::{Condition, ConditionRecord, ConditionRegistry, ConditionType};
use crate::error::ConditionError;

/// Conditions in insertion order, unique by name.
///
/// Inserting a condition whose name already exists replaces the old one in
/// place, so it keeps its original position for order tie-breaking.
#[derive(Debug, Clone, Default)]
pub struct ConditionSet {
    entries: Vec<Arc<dyn Condition>>,
}

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces by name. Returns the replaced condition, if any.
    pub fn insert(&mut self, condition: Arc<dyn Condition>) -> Option<Arc<dyn Condition>> {
        match self
            .entries
            .iter_mut()
            .find(|existing| existing.name() == condition.name())
        {
            Some(slot) => Some(std::mem::replace(slot, condition)),
            None => {
                self.entries.push(condition);
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Condition>> {
        let index = self.entries.iter().position(|c| c.name() == name)?;
        Some(self.entries.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Condition>> {
        self.entries.iter().find(|c| c.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Condition>> {
        self.entries.iter()
    }

    pub fn of_type(&self, condition_type: ConditionType) -> impl Iterator<Item = &Arc<dyn Condition>> {
        self.entries
            .iter()
            .filter(move |c| c.condition_type() == condition_type)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every condition, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn to_records(&self) -> Vec<ConditionRecord> {
        self.entries.iter().map(|c| c.to_record()).collect()
    }

    /// Rebuilds a set from records. Later duplicates replace earlier ones.
    pub fn from_records(
        records: &[ConditionRecord],
        registry: &ConditionRegistry,
    ) -> Result<Self, ConditionError> {
        let mut set = ConditionSet::new();
        for record in records {
            set.insert(registry.build(record)?);
        }
        Ok(set)
    }
}

impl<'a> IntoIterator for &'a ConditionSet {
    type Item = &'a Arc<dyn Condition>;
    type IntoIter = std::slice::Iter<'a, Arc<dyn Condition>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{FixedCondition, PercentageCondition};
    use crate::money::{Money, Rate};

    #[test]
    fn test_duplicate_name_replaces_in_place() {
        let mut set = ConditionSet::new();
        set.insert(Arc::new(FixedCondition::fee("handling", Money::from_cents(100), 10)));
        set.insert(Arc::new(FixedCondition::fee("gift-wrap", Money::from_cents(300), 10)));

        let replaced = set.insert(Arc::new(FixedCondition::fee(
            "handling",
            Money::from_cents(150),
            10,
        )));

        assert!(replaced.is_some());
        assert_eq!(set.len(), 2);
        let names: Vec<_> = set.iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["handling", "gift-wrap"]);
        assert_eq!(
            set.get("handling").unwrap().adjustment(Money::from_cents(1000)).cents(),
            150
        );
    }

    #[test]
    fn test_remove_and_filter_by_type() {
        let mut set = ConditionSet::new();
        set.insert(Arc::new(PercentageCondition::discount("promo", Rate::percent(10), 50)));
        set.insert(Arc::new(FixedCondition::fee("handling", Money::from_cents(100), 10)));

        assert_eq!(set.of_type(ConditionType::Discount).count(), 1);
        assert!(set.remove("promo").is_some());
        assert!(set.remove("promo").is_none());
        assert_eq!(set.len(), 1);
        assert_eq!(set.clear(), 1);
        assert!(set.is_empty());
    }
}
