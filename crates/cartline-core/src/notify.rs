//! # Lifecycle Notifications
//!
//! Every mutation announces itself through a [`NotificationPort`].
//!
//! ## Event Pairs
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  cancelable (before)          informational (after)                     │
//! │  ───────────────────          ─────────────────────                     │
//! │  item_adding          ──────► item_added                                │
//! │  item_updating        ──────► item_updated                              │
//! │  item_removing        ──────► item_removed                              │
//! │  clearing             ──────► cleared                                   │
//! │  merging              ──────► merged                                    │
//! │                               condition_added                           │
//! │                               condition_removed                         │
//! │                               condition_invalidated                     │
//! │                                                                         │
//! │  Err(HookRejection) from a cancelable event aborts the operation        │
//! │  before anything changes. From an informational event it is logged     │
//! │  and ignored: the change has already happened.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Mutex;
use thiserror::Error;

use crate::config::MergeStrategy;
use crate::item::RowKey;

/// A cart lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CartEvent {
    ItemAdding {
        scope: String,
        row_key: RowKey,
        product_identity: String,
        quantity: i64,
    },
    ItemAdded {
        scope: String,
        row_key: RowKey,
        quantity: i64,
    },
    ItemUpdating {
        scope: String,
        row_key: RowKey,
        quantity: Option<i64>,
    },
    ItemUpdated {
        scope: String,
        row_key: RowKey,
        quantity: i64,
    },
    ItemRemoving {
        scope: String,
        row_key: RowKey,
    },
    ItemRemoved {
        scope: String,
        row_key: RowKey,
    },
    Clearing {
        scope: String,
        rows: usize,
    },
    Cleared {
        scope: String,
        removed: usize,
    },
    ConditionAdded {
        scope: String,
        name: String,
        /// Set for item-scoped conditions.
        row_key: Option<RowKey>,
    },
    ConditionRemoved {
        scope: String,
        name: String,
        row_key: Option<RowKey>,
    },
    ConditionInvalidated {
        scope: String,
        name: String,
        reason: String,
    },
    Merging {
        scope: String,
        guest: String,
        user: String,
        strategy: MergeStrategy,
    },
    Merged {
        scope: String,
        user: String,
        /// Rows in the user's cart after the merge.
        item_count: usize,
    },
}

impl CartEvent {
    /// Stable event name, as used in logs and rejections.
    pub fn name(&self) -> &'static str {
        match self {
            CartEvent::ItemAdding { .. } => "item_adding",
            CartEvent::ItemAdded { .. } => "item_added",
            CartEvent::ItemUpdating { .. } => "item_updating",
            CartEvent::ItemUpdated { .. } => "item_updated",
            CartEvent::ItemRemoving { .. } => "item_removing",
            CartEvent::ItemRemoved { .. } => "item_removed",
            CartEvent::Clearing { .. } => "clearing",
            CartEvent::Cleared { .. } => "cleared",
            CartEvent::ConditionAdded { .. } => "condition_added",
            CartEvent::ConditionRemoved { .. } => "condition_removed",
            CartEvent::ConditionInvalidated { .. } => "condition_invalidated",
            CartEvent::Merging { .. } => "merging",
            CartEvent::Merged { .. } => "merged",
        }
    }

    /// Whether a rejection aborts the operation.
    pub fn is_cancelable(&self) -> bool {
        matches!(
            self,
            CartEvent::ItemAdding { .. }
                | CartEvent::ItemUpdating { .. }
                | CartEvent::ItemRemoving { .. }
                | CartEvent::Clearing { .. }
                | CartEvent::Merging { .. }
        )
    }

    pub fn scope(&self) -> &str {
        match self {
            CartEvent::ItemAdding { scope, .. }
            | CartEvent::ItemAdded { scope, .. }
            | CartEvent::ItemUpdating { scope, .. }
            | CartEvent::ItemUpdated { scope, .. }
            | CartEvent::ItemRemoving { scope, .. }
            | CartEvent::ItemRemoved { scope, .. }
            | CartEvent::Clearing { scope, .. }
            | CartEvent::Cleared { scope, .. }
            | CartEvent::ConditionAdded { scope, .. }
            | CartEvent::ConditionRemoved { scope, .. }
            | CartEvent::ConditionInvalidated { scope, .. }
            | CartEvent::Merging { scope, .. }
            | CartEvent::Merged { scope, .. } => scope,
        }
    }
}

/// A listener's refusal of a cancelable event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct HookRejection {
    pub reason: String,
}

impl HookRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        HookRejection {
            reason: reason.into(),
        }
    }
}

/// Event delivery port.
pub trait NotificationPort: Send + Sync {
    fn emit(&self, event: &CartEvent) -> Result<(), HookRejection>;
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl NotificationPort for NullNotifier {
    fn emit(&self, _event: &CartEvent) -> Result<(), HookRejection> {
        Ok(())
    }
}

/// Keeps every event in memory and can veto events by name.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<CartEvent>>,
    vetoed: Mutex<HashSet<&'static str>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every future event with this name.
    pub fn veto(&self, event_name: &'static str) {
        if let Ok(mut vetoed) = self.vetoed.lock() {
            vetoed.insert(event_name);
        }
    }

    pub fn events(&self) -> Vec<CartEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .map(|events| events.iter().map(CartEvent::name).collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl NotificationPort for RecordingNotifier {
    fn emit(&self, event: &CartEvent) -> Result<(), HookRejection> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        let vetoed = self
            .vetoed
            .lock()
            .map(|v| v.contains(event.name()))
            .unwrap_or(false);
        if vetoed {
            return Err(HookRejection::new(format!("{} vetoed", event.name())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = CartEvent::Cleared {
            scope: "default".to_string(),
            removed: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "cleared");
        assert_eq!(json["removed"], 3);
        assert_eq!(event.scope(), "default");
    }

    #[test]
    fn test_only_before_events_are_cancelable() {
        let adding = CartEvent::ItemAdding {
            scope: "default".to_string(),
            row_key: RowKey::from_raw("k"),
            product_identity: "p".to_string(),
            quantity: 1,
        };
        let added = CartEvent::ItemAdded {
            scope: "default".to_string(),
            row_key: RowKey::from_raw("k"),
            quantity: 1,
        };
        assert!(adding.is_cancelable());
        assert!(!added.is_cancelable());
    }

    #[test]
    fn test_recording_notifier_veto() {
        let notifier = RecordingNotifier::new();
        notifier.veto("clearing");

        let clearing = CartEvent::Clearing {
            scope: "default".to_string(),
            rows: 2,
        };
        assert!(notifier.emit(&clearing).is_err());
        assert_eq!(notifier.names(), vec!["clearing"]);
    }
}
