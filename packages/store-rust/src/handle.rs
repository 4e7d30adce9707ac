//! Shareable handles onto live collections.
//!
//! A [`CollectionHandle`] is a cheap-to-clone façade over one collection
//! core. Many handles may reference the same collection; none owns it — the
//! [`Database`](crate::database::Database) session is the sole owner, and
//! closing it invalidates every handle. Every operation checks validity
//! first and fails with [`StoreError::StaleCollectionReference`] afterwards.
//!
//! Reads on the thread that owns an open write transaction observe the
//! transaction's uncommitted working state; every other reader observes the
//! latest committed snapshot, even while a transaction is open elsewhere.

use std::sync::Arc;

use livedict_core::{CollectionId, Value, ValueKind};

use crate::database::SessionFlags;
use crate::error::StoreError;
use crate::snapshot::{KeyIter, Snapshot};
use crate::store::{CollectionCore, WorkingState};

/// Lightweight, shareable reference to a live collection.
#[derive(Clone)]
pub struct CollectionHandle {
    core: Arc<CollectionCore>,
    flags: Arc<SessionFlags>,
}

impl CollectionHandle {
    pub(crate) fn new(core: Arc<CollectionCore>, flags: Arc<SessionFlags>) -> Self {
        Self { core, flags }
    }

    /// Identifier of the referenced collection.
    #[must_use]
    pub fn id(&self) -> &CollectionId {
        self.core.id()
    }

    /// Whether the owning session is still open.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.flags.is_open()
    }

    fn ensure_valid(&self) -> Result<(), StoreError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(StoreError::StaleCollectionReference)
        }
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        self.ensure_valid()?;
        if self.flags.is_writer_thread() {
            Ok(())
        } else {
            Err(StoreError::ReadOnlyViolation)
        }
    }

    /// Working-state access, visible only on the thread that owns the open
    /// write transaction. Every other caller falls back to the committed
    /// snapshot.
    fn read_working<R>(&self, f: impl FnOnce(&WorkingState) -> R) -> Option<R> {
        if self.flags.is_writer_thread() {
            self.core.read_working(f)
        } else {
            None
        }
    }

    /// Looks up the value stored under `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError::KeyNotFound`] if absent,
    /// [`StoreError::StaleCollectionReference`] after session close.
    pub fn get(&self, key: &str) -> Result<Value, StoreError> {
        self.ensure_valid()?;
        let value = match self.read_working(|w| w.get(key).cloned()) {
            Some(visible) => visible,
            None => self.core.committed().get(key).cloned(),
        };
        value.ok_or_else(|| StoreError::KeyNotFound {
            key: key.to_string(),
        })
    }

    /// Whether `key` is present.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleCollectionReference`] after session close.
    pub fn contains_key(&self, key: &str) -> Result<bool, StoreError> {
        self.ensure_valid()?;
        Ok(match self.read_working(|w| w.contains_key(key)) {
            Some(present) => present,
            None => self.core.committed().contains_key(key),
        })
    }

    /// Number of entries. O(1): the working state maintains a live count
    /// and committed snapshots know their size.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleCollectionReference`] after session close.
    pub fn size(&self) -> Result<usize, StoreError> {
        self.ensure_valid()?;
        Ok(match self.read_working(WorkingState::len) {
            Some(len) => len,
            None => self.core.committed().len(),
        })
    }

    /// Whether the collection has no entries.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleCollectionReference`] after session close.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.size()? == 0)
    }

    /// Lazy, restartable iterator over the keys visible at call time.
    ///
    /// The sequence is pinned when this method is called: later commits (or
    /// later mutations in the open transaction) do not leak into an
    /// already-obtained iterator.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleCollectionReference`] after session close.
    pub fn keys(&self) -> Result<Keys, StoreError> {
        self.ensure_valid()?;
        let inner = match self.read_working(WorkingState::sorted_keys) {
            Some(keys) => KeysInner::Working(keys.into_iter()),
            None => KeysInner::Committed(self.core.committed().keys()),
        };
        Ok(Keys(inner))
    }

    /// Frozen view of the latest committed state, unaffected by the open
    /// transaction (if any) and by later commits.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleCollectionReference`] after session close.
    pub fn snapshot(&self) -> Result<Snapshot, StoreError> {
        self.ensure_valid()?;
        Ok(self.core.committed())
    }

    /// Inserts or overwrites `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError::ReadOnlyViolation`] outside an open write transaction,
    /// [`StoreError::StaleCollectionReference`] after session close.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), StoreError> {
        self.ensure_writable()?;
        let value = value.into();
        self.core.with_working(|w| w.set(key, value));
        Ok(())
    }

    /// Tombstones `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError::KeyNotFound`] if absent,
    /// [`StoreError::ReadOnlyViolation`] outside a write transaction,
    /// [`StoreError::StaleCollectionReference`] after session close.
    pub fn erase(&self, key: &str) -> Result<(), StoreError> {
        self.ensure_writable()?;
        self.core.with_working(|w| w.erase(key))
    }

    /// Adds `by` to the integer stored under `key`, saturating at the i64
    /// bounds, and returns the new value.
    ///
    /// # Errors
    ///
    /// [`StoreError::TypeMismatch`] if the stored value is not an `Int`,
    /// [`StoreError::KeyNotFound`] if absent, plus the usual write-path
    /// failures.
    pub fn increment(&self, key: &str, by: i64) -> Result<i64, StoreError> {
        self.ensure_writable()?;
        self.core.with_working(|w| {
            let current = w.get(key).ok_or_else(|| StoreError::KeyNotFound {
                key: key.to_string(),
            })?;
            let old = current.as_int().ok_or_else(|| StoreError::TypeMismatch {
                expected: ValueKind::Int,
                actual: current.kind(),
            })?;
            let next = old.saturating_add(by);
            w.set(key, Value::Int(next));
            Ok(next)
        })
    }
}

/// Iterator over the keys of a collection, pinned at the call to
/// [`CollectionHandle::keys`].
#[derive(Clone)]
pub struct Keys(KeysInner);

#[derive(Clone)]
enum KeysInner {
    /// Over a committed snapshot: genuinely lazy range probes.
    Committed(KeyIter),
    /// Over an uncommitted working state: materialized at call time, since
    /// the overlay keeps changing underneath.
    Working(std::vec::IntoIter<String>),
}

impl Iterator for Keys {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        match &mut self.0 {
            KeysInner::Committed(iter) => iter.next(),
            KeysInner::Working(iter) => iter.next(),
        }
    }
}
