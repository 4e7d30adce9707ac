//! Error taxonomy for store operations.

use livedict_core::{CollectionId, ValueKind};

/// Errors returned by dictionary operations.
///
/// All variants except [`StoreError::CollectionIdentifierMismatch`] are
/// recoverable and surfaced to the caller as typed failures.
/// `CollectionIdentifierMismatch` indicates an internal invariant violation
/// (diffing snapshots of two different collections); it should be propagated
/// with `?` and never caught and retried.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested key is not present in the collection.
    #[error("key not found: {key}")]
    KeyNotFound {
        /// The key that was looked up.
        key: String,
    },

    /// A mutation was attempted outside an open write transaction.
    #[error("mutation outside an open write transaction")]
    ReadOnlyViolation,

    /// The handle's owning session has been closed.
    #[error("collection handle is no longer valid")]
    StaleCollectionReference,

    /// The value's tag is incompatible with the requested operation.
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        /// The tag the operation requires.
        expected: ValueKind,
        /// The tag actually stored.
        actual: ValueKind,
    },

    /// Two snapshots of different collections were diffed. Programming
    /// error; fatal.
    #[error("snapshot collection identifiers differ: {left} vs {right}")]
    CollectionIdentifierMismatch {
        /// Identifier of the prior snapshot.
        left: CollectionId,
        /// Identifier of the current snapshot.
        right: CollectionId,
    },
}
