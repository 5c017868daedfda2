//! # Cart Storage
//!
//! Where cart records live between requests.
//!
//! ## Addressing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  (identifier, scope) → CartRecord                                       │
//! │                                                                         │
//! │  identifier = None          session-style storage, the backend knows    │
//! │                             whose session it is                          │
//! │  identifier = Some("g-…")   guest cart, keyed by guest id               │
//! │  identifier = Some("u-42")  durable cart, keyed by user identity        │
//! │                                                                         │
//! │  flush(identifier) drops every scope stored for that identifier         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::cart::CartRecord;
use crate::error::StorageError;

/// Persistence port for cart records.
pub trait CartStorage: Send + Sync {
    fn get(&self, scope: &str, identifier: Option<&str>) -> Result<Option<CartRecord>, StorageError>;

    fn put(
        &self,
        scope: &str,
        identifier: Option<&str>,
        record: &CartRecord,
    ) -> Result<(), StorageError>;

    /// Deletes one scope. Deleting a missing record is not an error.
    fn forget(&self, scope: &str, identifier: Option<&str>) -> Result<(), StorageError>;

    /// Deletes every scope for `identifier`.
    fn flush(&self, identifier: Option<&str>) -> Result<(), StorageError>;
}

type SlotKey = (Option<String>, String);

/// Storage backed by a `HashMap` of JSON documents.
///
/// Records are stored encoded, the same as a real backend would hold them,
/// so decoding failures surface the same way.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    slots: Mutex<HashMap<SlotKey, String>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(scope: &str, identifier: Option<&str>) -> SlotKey {
        (identifier.map(str::to_string), scope.to_string())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<SlotKey, String>>, StorageError> {
        self.slots
            .lock()
            .map_err(|_| StorageError::Unavailable("storage lock poisoned".to_string()))
    }

    /// Stores a raw document, bypassing encoding.
    pub fn put_raw(
        &self,
        scope: &str,
        identifier: Option<&str>,
        document: impl Into<String>,
    ) -> Result<(), StorageError> {
        self.lock()?
            .insert(Self::key(scope, identifier), document.into());
        Ok(())
    }

    pub fn contains(&self, scope: &str, identifier: Option<&str>) -> bool {
        self.lock()
            .map(|slots| slots.contains_key(&Self::key(scope, identifier)))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CartStorage for InMemoryStorage {
    fn get(&self, scope: &str, identifier: Option<&str>) -> Result<Option<CartRecord>, StorageError> {
        let slots = self.lock()?;
        match slots.get(&Self::key(scope, identifier)) {
            Some(document) => Ok(Some(serde_json::from_str(document)?)),
            None => Ok(None),
        }
    }

    fn put(
        &self,
        scope: &str,
        identifier: Option<&str>,
        record: &CartRecord,
    ) -> Result<(), StorageError> {
        let document = serde_json::to_string(record)?;
        debug!(scope, identifier, bytes = document.len(), "Storing cart");
        self.lock()?.insert(Self::key(scope, identifier), document);
        Ok(())
    }

    fn forget(&self, scope: &str, identifier: Option<&str>) -> Result<(), StorageError> {
        self.lock()?.remove(&Self::key(scope, identifier));
        Ok(())
    }

    fn flush(&self, identifier: Option<&str>) -> Result<(), StorageError> {
        self.lock()?
            .retain(|(owner, _), _| owner.as_deref() != identifier);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::CartState;

    #[test]
    fn test_put_get_forget() {
        let storage = InMemoryStorage::new();
        let record = CartState::new("default").to_record();

        storage.put("default", Some("u-1"), &record).unwrap();
        assert_eq!(storage.get("default", Some("u-1")).unwrap(), Some(record));
        assert_eq!(storage.get("default", Some("u-2")).unwrap(), None);
        assert_eq!(storage.get("default", None).unwrap(), None);

        storage.forget("default", Some("u-1")).unwrap();
        assert!(!storage.contains("default", Some("u-1")));
        // Forgetting again is fine
        storage.forget("default", Some("u-1")).unwrap();
    }

    #[test]
    fn test_flush_only_touches_one_identifier() {
        let storage = InMemoryStorage::new();
        let record = CartState::new("default").to_record();
        storage.put("default", Some("g-1"), &record).unwrap();
        storage.put("wishlist", Some("g-1"), &record).unwrap();
        storage.put("default", Some("u-1"), &record).unwrap();

        storage.flush(Some("g-1")).unwrap();

        assert_eq!(storage.len(), 1);
        assert!(storage.contains("default", Some("u-1")));
    }

    #[test]
    fn test_undecodable_document_is_an_error() {
        let storage = InMemoryStorage::new();
        storage.put_raw("default", None, "{not json").unwrap();

        assert!(matches!(
            storage.get("default", None),
            Err(StorageError::Serialization(_))
        ));
    }
}
