//! # Guest to User Merge
//!
//! Reconciles a guest cart with the user's durable cart when the guest signs
//! in.
//!
//! ## Decision Table (per scope)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  guest rows   user cart     result                       events         │
//! │  ──────────   ─────────     ──────────────────────────   ────────────   │
//! │  none         any           Associated: user cart kept,  none           │
//! │                             owner stamped                               │
//! │  some         no rows       Relocated: guest cart moved  merging*,      │
//! │                             wholesale to the user        merged         │
//! │  some         some rows     Merged by strategy:          merging*,      │
//! │                               keep_guest  guest cart     merged         │
//! │                               keep_user   user cart                     │
//! │                               combine     both, summed,                 │
//! │                                           user conditions               │
//! │                                                                         │
//! │  * cancelable. The guest record is forgotten only after the user       │
//! │    record was written; a failed forget is reported as a write error.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Capacity limits do not apply to merge results: a sign-in never drops
//! rows the shopper already picked.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cart::CartState;
use crate::conditions::ConditionRegistry;
use crate::config::{CartConfig, MergeStrategy};
use crate::error::{CartError, CartResult};
use crate::notify::{CartEvent, NotificationPort, NullNotifier};
use crate::storage::CartStorage;

/// What a merge did to one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeKind {
    /// Guest had nothing; the user's cart was kept.
    Associated,
    /// User had nothing; the guest cart became the user's.
    Relocated,
    /// Both had content; combined by strategy.
    Merged,
}

/// Result of merging one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOutcome {
    pub scope: String,
    pub kind: MergeKind,
    /// Strategy used; only set for [`MergeKind::Merged`].
    pub strategy: Option<MergeStrategy>,
    /// Rows in the user's cart afterwards.
    pub rows: usize,
    /// Total quantity in the user's cart afterwards.
    pub item_count: i64,
}

/// Runs guest-to-user merges against one storage backend.
pub struct MergeCoordinator {
    config: CartConfig,
    storage: Arc<dyn CartStorage>,
    notifier: Arc<dyn NotificationPort>,
    registry: Arc<ConditionRegistry>,
}

impl MergeCoordinator {
    pub fn new(config: CartConfig, storage: Arc<dyn CartStorage>) -> Self {
        MergeCoordinator {
            config,
            storage,
            notifier: Arc::new(NullNotifier),
            registry: Arc::new(ConditionRegistry::with_builtins()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationPort>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_registry(mut self, registry: Arc<ConditionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Merges the guest's cart in `scope` into the user's.
    pub fn merge(&self, scope: &str, guest: &str, user: &str) -> CartResult<MergeOutcome> {
        let settings = self.config.for_scope(scope);
        let guest_state = self.read(scope, guest);
        let user_state = self.read(scope, user);

        if guest_state.is_empty() {
            return self.associate(scope, user, user_state);
        }

        let (kind, strategy) = if user_state.is_empty() {
            (MergeKind::Relocated, None)
        } else {
            (MergeKind::Merged, Some(settings.merge_strategy))
        };

        self.notifier
            .emit(&CartEvent::Merging {
                scope: scope.to_string(),
                guest: guest.to_string(),
                user: user.to_string(),
                strategy: settings.merge_strategy,
            })
            .map_err(|rejection| CartError::Canceled {
                event: "merging",
                reason: rejection.reason,
            })?;

        let mut merged = match strategy {
            None => guest_state,
            Some(strategy) => combine(strategy, guest_state, user_state)?,
        };
        merged.set_owner(Some(user.to_string()));
        merged.touch();

        self.write(scope, user, &merged)?;
        self.storage.forget(scope, Some(guest)).map_err(|source| {
            warn!(scope, guest, error = %source, "Merged cart saved but guest cart could not be removed");
            CartError::StorageWrite {
                scope: scope.to_string(),
                source,
            }
        })?;

        let outcome = MergeOutcome {
            scope: scope.to_string(),
            kind,
            strategy,
            rows: merged.row_count(),
            item_count: merged.total_quantity(),
        };
        info!(
            scope,
            guest,
            user,
            kind = ?outcome.kind,
            rows = outcome.rows,
            "Guest cart merged"
        );

        let merged_event = CartEvent::Merged {
            scope: scope.to_string(),
            user: user.to_string(),
            item_count: outcome.rows,
        };
        if let Err(rejection) = self.notifier.emit(&merged_event) {
            warn!(event = merged_event.name(), reason = %rejection, "Listener rejected a completed merge");
        }
        Ok(outcome)
    }

    /// Merges every scope independently. One scope failing does not stop
    /// the others.
    pub fn merge_all<'a>(
        &self,
        scopes: impl IntoIterator<Item = &'a str>,
        guest: &str,
        user: &str,
    ) -> Vec<(String, CartResult<MergeOutcome>)> {
        scopes
            .into_iter()
            .map(|scope| {
                let result = self.merge(scope, guest, user);
                if let Err(e) = &result {
                    warn!(scope, error = %e, "Scope merge failed");
                }
                (scope.to_string(), result)
            })
            .collect()
    }

    /// Stamps the user as owner of their (possibly new) cart.
    fn associate(&self, scope: &str, user: &str, mut state: CartState) -> CartResult<MergeOutcome> {
        if state.owner() != Some(user) {
            state.set_owner(Some(user.to_string()));
            state.touch();
            self.write(scope, user, &state)?;
        }
        debug!(scope, user, rows = state.row_count(), "Guest cart empty, user cart associated");
        Ok(MergeOutcome {
            scope: scope.to_string(),
            kind: MergeKind::Associated,
            strategy: None,
            rows: state.row_count(),
            item_count: state.total_quantity(),
        })
    }

    fn read(&self, scope: &str, identifier: &str) -> CartState {
        let record = match self.storage.get(scope, Some(identifier)) {
            Ok(Some(record)) => record,
            Ok(None) => return CartState::new(scope),
            Err(e) => {
                warn!(scope, identifier, error = %e, "Cart unreadable during merge, treating as empty");
                return CartState::new(scope);
            }
        };
        CartState::from_record(record, &self.registry).unwrap_or_else(|e| {
            warn!(scope, identifier, error = %e, "Stored cart is undecodable, treating as empty");
            CartState::new(scope)
        })
    }

    fn write(&self, scope: &str, identifier: &str, state: &CartState) -> CartResult<()> {
        self.storage
            .put(scope, Some(identifier), &state.to_record())
            .map_err(|source| CartError::StorageWrite {
                scope: scope.to_string(),
                source,
            })
    }
}

/// Builds the user's new cart from two carts that both have rows.
///
/// `keep_guest` promotes the guest cart whole, `keep_user` keeps the user
/// cart whole, and `combine` sums guest rows into the user cart while the
/// user's conditions and metadata stay. The caller stamps the owner.
fn combine(strategy: MergeStrategy, guest: CartState, user: CartState) -> CartResult<CartState> {
    match strategy {
        MergeStrategy::KeepUser => Ok(user),
        MergeStrategy::KeepGuest => Ok(guest),
        MergeStrategy::Combine => {
            let mut merged = user;
            for item in guest.items() {
                merged.upsert(item.clone())?;
            }
            Ok(merged)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::FixedCondition;
    use crate::item::{Metadata, Options, RowKey};
    use crate::money::Money;
    use crate::operations::CartOperations;
    use crate::test_support::{product, Harness};

    fn harness() -> Harness {
        Harness::new().price("a", 1000).price("b", 500).price("c", 250)
    }

    fn seed(harness: &Harness, scope: &str, identifier: &str, rows: &[(&str, i64)]) -> CartOperations {
        let mut ops = harness.ops_for(&CartConfig::default(), scope, identifier);
        for (name, qty) in rows {
            ops.add(&product(name, 0), *qty, Options::new(), Metadata::new())
                .unwrap();
        }
        ops
    }

    fn quantity(ops: &mut CartOperations, name: &str) -> Option<i64> {
        ops.item(&RowKey::derive(name, &Options::new()))
            .map(|item| item.quantity())
    }

    fn coordinator(harness: &Harness, config: CartConfig) -> MergeCoordinator {
        MergeCoordinator::new(config, harness.storage.clone()).with_notifier(harness.notifier.clone())
    }

    fn config_with(strategy: MergeStrategy) -> CartConfig {
        CartConfig {
            merge_strategy: strategy,
            ..CartConfig::default()
        }
    }

    #[test]
    fn test_combine_sums_rows_and_keeps_user_conditions() {
        let harness = harness();
        let mut guest = seed(&harness, "default", "g-1", &[("a", 2)]);
        guest
            .add_condition(Arc::new(FixedCondition::discount("guest-promo", Money::from_cents(100), 50)))
            .unwrap();
        let mut user = seed(&harness, "default", "u-1", &[("a", 1), ("b", 1)]);
        user.add_condition(Arc::new(FixedCondition::fee("user-fee", Money::from_cents(100), 10)))
            .unwrap();

        let outcome = coordinator(&harness, CartConfig::default())
            .merge("default", "g-1", "u-1")
            .unwrap();

        assert_eq!(outcome.kind, MergeKind::Merged);
        assert_eq!(outcome.strategy, Some(MergeStrategy::Combine));
        assert_eq!(outcome.rows, 2);
        assert_eq!(outcome.item_count, 4);

        let mut after = harness.ops_for(&CartConfig::default(), "default", "u-1");
        assert_eq!(quantity(&mut after, "a"), Some(3));
        assert_eq!(quantity(&mut after, "b"), Some(1));
        let names: Vec<_> = after.conditions().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["user-fee"]);
        assert_eq!(after.state().owner(), Some("u-1"));
        assert!(!harness.storage.inner().contains("default", Some("g-1")));
    }

    #[test]
    fn test_keep_guest_replaces_user_rows() {
        let harness = harness();
        seed(&harness, "default", "g-1", &[("a", 2)]);
        seed(&harness, "default", "u-1", &[("b", 1)]);

        coordinator(&harness, config_with(MergeStrategy::KeepGuest))
            .merge("default", "g-1", "u-1")
            .unwrap();

        let mut after = harness.ops_for(&CartConfig::default(), "default", "u-1");
        assert_eq!(quantity(&mut after, "a"), Some(2));
        assert_eq!(quantity(&mut after, "b"), None);
    }

    #[test]
    fn test_keep_guest_promotes_guest_conditions() {
        let harness = harness();
        let mut guest = seed(&harness, "default", "g-1", &[("a", 2)]);
        guest
            .add_condition(Arc::new(FixedCondition::discount("guest-promo", Money::from_cents(100), 50)))
            .unwrap();
        let mut user = seed(&harness, "default", "u-1", &[("b", 1)]);
        user.add_condition(Arc::new(FixedCondition::fee("user-fee", Money::from_cents(100), 10)))
            .unwrap();

        let outcome = coordinator(&harness, config_with(MergeStrategy::KeepGuest))
            .merge("default", "g-1", "u-1")
            .unwrap();

        assert_eq!(outcome.kind, MergeKind::Merged);
        let mut after = harness.ops_for(&CartConfig::default(), "default", "u-1");
        let names: Vec<_> = after.conditions().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["guest-promo"]);
        assert_eq!(after.state().owner(), Some("u-1"));
        assert!(!harness.storage.inner().contains("default", Some("g-1")));
    }

    #[test]
    fn test_keep_user_discards_guest_rows() {
        let harness = harness();
        seed(&harness, "default", "g-1", &[("a", 2)]);
        seed(&harness, "default", "u-1", &[("b", 1)]);

        coordinator(&harness, config_with(MergeStrategy::KeepUser))
            .merge("default", "g-1", "u-1")
            .unwrap();

        let mut after = harness.ops_for(&CartConfig::default(), "default", "u-1");
        assert_eq!(quantity(&mut after, "a"), None);
        assert_eq!(quantity(&mut after, "b"), Some(1));
        assert!(!harness.storage.inner().contains("default", Some("g-1")));
    }

    #[test]
    fn test_missing_user_cart_gets_guest_cart_wholesale() {
        let harness = harness();
        let mut guest = seed(&harness, "default", "g-1", &[("a", 2), ("c", 1)]);
        guest
            .add_condition(Arc::new(FixedCondition::discount("guest-promo", Money::from_cents(100), 50)))
            .unwrap();

        let outcome = coordinator(&harness, config_with(MergeStrategy::KeepUser))
            .merge("default", "g-1", "u-1")
            .unwrap();

        assert_eq!(outcome.kind, MergeKind::Relocated);
        assert_eq!(outcome.strategy, None);
        let mut after = harness.ops_for(&CartConfig::default(), "default", "u-1");
        assert_eq!(after.row_count(), 2);
        assert_eq!(after.conditions().len(), 1);
        assert_eq!(harness.notifier.names().last(), Some(&"merged"));
    }

    #[test]
    fn test_user_cart_without_rows_is_relocated_over() {
        let harness = harness();
        seed(&harness, "default", "g-1", &[("a", 2)]);
        let mut user = seed(&harness, "default", "u-1", &[]);
        user.add_condition(Arc::new(FixedCondition::fee("user-fee", Money::from_cents(100), 10)))
            .unwrap();

        let outcome = coordinator(&harness, config_with(MergeStrategy::KeepUser))
            .merge("default", "g-1", "u-1")
            .unwrap();

        assert_eq!(outcome.kind, MergeKind::Relocated);
        assert_eq!(outcome.rows, 1);
        let mut after = harness.ops_for(&CartConfig::default(), "default", "u-1");
        assert_eq!(quantity(&mut after, "a"), Some(2));
    }

    #[test]
    fn test_empty_guest_only_associates() {
        let harness = harness();
        seed(&harness, "default", "u-1", &[("b", 3)]);
        harness.notifier.clear();

        let outcome = coordinator(&harness, CartConfig::default())
            .merge("default", "g-1", "u-1")
            .unwrap();

        assert_eq!(outcome.kind, MergeKind::Associated);
        assert_eq!(outcome.item_count, 3);
        assert!(harness.notifier.events().is_empty());

        let mut after = harness.ops_for(&CartConfig::default(), "default", "u-1");
        assert_eq!(quantity(&mut after, "b"), Some(3));
        assert_eq!(after.state().owner(), Some("u-1"));
    }

    #[test]
    fn test_failed_write_keeps_guest_cart() {
        let harness = harness();
        seed(&harness, "default", "g-1", &[("a", 2)]);
        seed(&harness, "default", "u-1", &[("b", 1)]);
        harness.storage.fail_writes(true);

        let err = coordinator(&harness, CartConfig::default())
            .merge("default", "g-1", "u-1")
            .unwrap_err();

        assert!(matches!(err, CartError::StorageWrite { .. }));
        harness.storage.fail_writes(false);
        let mut guest = harness.ops_for(&CartConfig::default(), "default", "g-1");
        assert_eq!(quantity(&mut guest, "a"), Some(2));
        let mut user = harness.ops_for(&CartConfig::default(), "default", "u-1");
        assert_eq!(quantity(&mut user, "a"), None);
    }

    #[test]
    fn test_failed_guest_forget_is_reported() {
        let harness = harness();
        seed(&harness, "default", "g-1", &[("a", 2)]);
        seed(&harness, "default", "u-1", &[("b", 1)]);
        harness.storage.fail_forgets(true);

        let err = coordinator(&harness, CartConfig::default())
            .merge("default", "g-1", "u-1")
            .unwrap_err();

        assert!(matches!(err, CartError::StorageWrite { .. }));
        assert!(harness.storage.inner().contains("default", Some("g-1")));
        let mut user = harness.ops_for(&CartConfig::default(), "default", "u-1");
        assert_eq!(quantity(&mut user, "a"), Some(2));
        assert_eq!(quantity(&mut user, "b"), Some(1));
    }

    #[test]
    fn test_canceled_merge_changes_nothing() {
        let harness = harness();
        seed(&harness, "default", "g-1", &[("a", 2)]);
        seed(&harness, "default", "u-1", &[("b", 1)]);
        harness.notifier.veto("merging");

        let err = coordinator(&harness, CartConfig::default())
            .merge("default", "g-1", "u-1")
            .unwrap_err();

        assert!(matches!(err, CartError::Canceled { event: "merging", .. }));
        assert!(harness.storage.inner().contains("default", Some("g-1")));
        let mut user = harness.ops_for(&CartConfig::default(), "default", "u-1");
        assert_eq!(user.row_count(), 1);
    }

    #[test]
    fn test_merge_ignores_capacity() {
        let harness = harness();
        seed(&harness, "default", "g-1", &[("a", 1), ("c", 1)]);
        seed(&harness, "default", "u-1", &[("b", 1)]);
        let config = CartConfig {
            max_items_per_scope: Some(2),
            ..CartConfig::default()
        };

        let outcome = coordinator(&harness, config)
            .merge("default", "g-1", "u-1")
            .unwrap();

        assert_eq!(outcome.rows, 3);
    }

    #[test]
    fn test_merge_all_reports_each_scope() {
        let harness = harness();
        seed(&harness, "default", "g-1", &[("a", 1)]);
        seed(&harness, "wishlist", "g-1", &[("b", 1)]);
        seed(&harness, "wishlist", "u-1", &[("b", 2)]);

        let results = coordinator(&harness, CartConfig::default())
            .merge_all(["default", "wishlist", "saved"], "g-1", "u-1");

        let kinds: Vec<_> = results
            .iter()
            .map(|(scope, result)| (scope.as_str(), result.as_ref().map(|o| o.kind).ok()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("default", Some(MergeKind::Relocated)),
                ("wishlist", Some(MergeKind::Merged)),
                ("saved", Some(MergeKind::Associated)),
            ]
        );
        let mut wishlist = harness.ops_for(&CartConfig::default(), "wishlist", "u-1");
        assert_eq!(quantity(&mut wishlist, "b"), Some(3));
    }
}
