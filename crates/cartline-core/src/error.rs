//! # Error Types
//!
//! Domain-specific error types for cartline-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  CartError          - everything a cart operation can return           │
//! │  ├── ConditionError - condition reconstruction / attribute problems    │
//! │  ├── StorageError   - what a CartStorage backend reports               │
//! │  └── ResolveError   - what a PriceResolver reports                     │
//! │                                                                         │
//! │  Propagation:                                                          │
//! │    InvalidQuantity, QuantityOverflow,    raised at the call,           │
//! │    UnknownRow,                                                         │
//! │    CapacityExceeded, DuplicateProduct ── state unchanged               │
//! │                                                                         │
//! │    UnresolvablePrice ─────────────────── fails the whole computation   │
//! │                                                                         │
//! │    StorageRead  ── logged, cart degrades to empty (never returned      │
//! │                    from reads)                                         │
//! │    StorageWrite ── always returned                                     │
//! │                                                                         │
//! │    Canceled ───────────────────────────── a pre-hook vetoed the call   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::item::RowKey;

// =============================================================================
// Cart Error
// =============================================================================

/// Errors returned by cart operations and the merge coordinator.
#[derive(Debug, Error)]
pub enum CartError {
    /// A quantity below 1 was supplied to add or update.
    #[error("Invalid quantity {0}: quantity must be at least 1")]
    InvalidQuantity(i64),

    /// Summing quantities for a row would overflow.
    #[error("Quantity for row {0} is too large")]
    QuantityOverflow(RowKey),

    /// A line amount does not fit in minor units.
    #[error("Line amount for row {0} is too large")]
    AmountOverflow(RowKey),

    /// The row key does not exist in this scope.
    #[error("Unknown cart row: {0}")]
    UnknownRow(RowKey),

    /// The price resolver could not price an item.
    ///
    /// ## When This Occurs
    /// - Product no longer exists in the catalog
    /// - Resolver returned a batch that is missing one of the requested rows
    #[error("Unable to resolve price for {row_key}: {reason}")]
    UnresolvablePrice { row_key: RowKey, reason: String },

    /// A new row would exceed the scope's item limit.
    #[error("Cart scope '{scope}' cannot have more than {max} rows")]
    CapacityExceeded { scope: String, max: usize },

    /// Duplicates are disallowed and the product is already in the scope.
    #[error("Product '{product}' is already in cart scope '{scope}'")]
    DuplicateProduct { scope: String, product: String },

    /// Reading the stored cart failed.
    ///
    /// Cart reads never return this: it is logged and the cart degrades to
    /// empty. It exists so storage adapters and callers of `CartStorage`
    /// directly can report the condition with the same type.
    #[error("Failed to read cart '{scope}': {source}")]
    StorageRead {
        scope: String,
        #[source]
        source: StorageError,
    },

    /// Writing the cart failed. Always surfaced to the caller.
    #[error("Failed to write cart '{scope}': {source}")]
    StorageWrite {
        scope: String,
        #[source]
        source: StorageError,
    },

    /// A cancelable lifecycle hook rejected the operation.
    #[error("Operation canceled by {event} handler: {reason}")]
    Canceled { event: &'static str, reason: String },

    /// Condition could not be built or reconstructed.
    #[error(transparent)]
    Condition(#[from] ConditionError),

    /// Configuration is invalid.
    #[error("Invalid cart configuration: {0}")]
    Config(String),
}

impl CartError {
    /// True for errors that leave no trace in the cart: bad input or a veto.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CartError::InvalidQuantity(_)
                | CartError::QuantityOverflow(_)
                | CartError::UnknownRow(_)
                | CartError::CapacityExceeded { .. }
                | CartError::DuplicateProduct { .. }
        )
    }
}

// =============================================================================
// Condition Error
// =============================================================================

/// Errors building a condition from serialized attributes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConditionError {
    /// No factory is registered for this kind.
    #[error("Unknown condition kind: {0}")]
    UnknownKind(String),

    /// A required attribute is absent.
    #[error("Condition '{condition}' is missing attribute '{attribute}'")]
    MissingAttribute { condition: String, attribute: String },

    /// An attribute is present but unusable.
    #[error("Condition '{condition}' has invalid attribute '{attribute}': {reason}")]
    InvalidAttribute {
        condition: String,
        attribute: String,
        reason: String,
    },
}

// =============================================================================
// Collaborator Errors
// =============================================================================

/// Errors reported by a `CartStorage` backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A record exists but cannot be decoded.
    #[error("Stored cart is corrupt: {0}")]
    Corrupt(String),

    /// Encoding or decoding failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors reported by a `PriceResolver`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Cannot price {row_key}: {reason}")]
pub struct ResolveError {
    pub row_key: RowKey,
    pub reason: String,
}

impl ResolveError {
    pub fn new(row_key: RowKey, reason: impl Into<String>) -> Self {
        ResolveError {
            row_key,
            reason: reason.into(),
        }
    }
}

impl From<ResolveError> for CartError {
    fn from(err: ResolveError) -> Self {
        CartError::UnresolvablePrice {
            row_key: err.row_key,
            reason: err.reason,
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CartError.
pub type CartResult<T> = Result<T, CartError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CartError::CapacityExceeded {
            scope: "wishlist".to_string(),
            max: 20,
        };
        assert_eq!(
            err.to_string(),
            "Cart scope 'wishlist' cannot have more than 20 rows"
        );

        let err = CartError::InvalidQuantity(0);
        assert_eq!(err.to_string(), "Invalid quantity 0: quantity must be at least 1");
    }

    #[test]
    fn test_resolve_error_converts_to_unresolvable_price() {
        let key = RowKey::from_raw("abc");
        let err: CartError = ResolveError::new(key.clone(), "discontinued").into();
        match err {
            CartError::UnresolvablePrice { row_key, reason } => {
                assert_eq!(row_key, key);
                assert_eq!(reason, "discontinued");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_condition_error_converts_to_cart_error() {
        let err: CartError = ConditionError::UnknownKind("bogo".to_string()).into();
        assert!(matches!(err, CartError::Condition(_)));
        assert_eq!(err.to_string(), "Unknown condition kind: bogo");
    }

    #[test]
    fn test_validation_classification() {
        assert!(CartError::InvalidQuantity(0).is_validation());
        assert!(!CartError::Config("x".into()).is_validation());
    }
}
