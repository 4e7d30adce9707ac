//! Collection cores: authoritative committed state plus the per-transaction
//! working overlay.
//!
//! A [`CollectionCore`] is the single in-memory representation of one
//! dictionary collection. The committed [`Snapshot`](crate::snapshot::Snapshot)
//! sits behind an `arc-swap` cell so readers load it lock-free; every handle
//! referencing the core observes the same committed state until the next
//! write transaction commits.
//!
//! Inside a write transaction, mutations accumulate in a [`WorkingState`]:
//! the pre-transaction base snapshot plus an overlay of pending entries,
//! where an entry is either a new value or a tombstone. Tombstones are kept
//! until commit so the diff runs against the pre-transaction snapshot, never
//! an intermediate state.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use livedict_core::{ChangeSet, CollectionId, Value};
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::snapshot::Snapshot;
use crate::tracker::ChangeTracker;

/// A pending, uncommitted entry in the working overlay.
#[derive(Debug, Clone)]
enum PendingEntry {
    /// Key set (inserted or overwritten) in this transaction.
    Value(Value),
    /// Key erased in this transaction; existed in the base snapshot.
    Tombstone,
}

/// Uncommitted state of one collection within an open write transaction.
#[derive(Debug)]
pub(crate) struct WorkingState {
    base: Snapshot,
    overlay: BTreeMap<String, PendingEntry>,
    len: usize,
}

impl WorkingState {
    fn new(base: Snapshot) -> Self {
        let len = base.len();
        Self {
            base,
            overlay: BTreeMap::new(),
            len,
        }
    }

    /// Visible value of `key`: the overlay wins over the base snapshot.
    pub(crate) fn get(&self, key: &str) -> Option<&Value> {
        match self.overlay.get(key) {
            Some(PendingEntry::Value(value)) => Some(value),
            Some(PendingEntry::Tombstone) => None,
            None => self.base.get(key),
        }
    }

    pub(crate) fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Visible entry count, maintained incrementally.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Inserts or overwrites `key`.
    pub(crate) fn set(&mut self, key: &str, value: Value) {
        if !self.contains_key(key) {
            self.len += 1;
        }
        self.overlay
            .insert(key.to_string(), PendingEntry::Value(value));
    }

    /// Tombstones `key`.
    ///
    /// A key inserted earlier in the same transaction is removed outright,
    /// so the commit diff records nothing for it.
    ///
    /// # Errors
    ///
    /// [`StoreError::KeyNotFound`] if the key is not visible.
    pub(crate) fn erase(&mut self, key: &str) -> Result<(), StoreError> {
        if !self.contains_key(key) {
            return Err(StoreError::KeyNotFound {
                key: key.to_string(),
            });
        }
        if self.base.contains_key(key) {
            self.overlay
                .insert(key.to_string(), PendingEntry::Tombstone);
        } else {
            self.overlay.remove(key);
        }
        self.len -= 1;
        Ok(())
    }

    /// Visible keys in sorted order, materialized at call time.
    pub(crate) fn sorted_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len);
        let mut overlay = self.overlay.iter().peekable();
        for base_key in self.base.entries().keys() {
            while let Some((pending_key, entry)) = overlay.peek() {
                if *pending_key < base_key {
                    if matches!(entry, PendingEntry::Value(_)) {
                        keys.push((*pending_key).clone());
                    }
                    overlay.next();
                } else {
                    break;
                }
            }
            match overlay.peek() {
                Some((pending_key, entry)) if *pending_key == base_key => {
                    if matches!(entry, PendingEntry::Value(_)) {
                        keys.push(base_key.clone());
                    }
                    overlay.next();
                }
                _ => keys.push(base_key.clone()),
            }
        }
        for (pending_key, entry) in overlay {
            if matches!(entry, PendingEntry::Value(_)) {
                keys.push(pending_key.clone());
            }
        }
        keys
    }

    /// Applies the overlay to the base entries, producing the committed map.
    fn materialize(&self) -> BTreeMap<String, Value> {
        let mut entries = self.base.entries().clone();
        for (key, entry) in &self.overlay {
            match entry {
                PendingEntry::Value(value) => {
                    entries.insert(key.clone(), value.clone());
                }
                PendingEntry::Tombstone => {
                    entries.remove(key);
                }
            }
        }
        entries
    }
}

/// The single authoritative in-memory representation of one collection.
pub(crate) struct CollectionCore {
    id: CollectionId,
    committed: ArcSwap<Snapshot>,
    working: Mutex<Option<WorkingState>>,
}

impl CollectionCore {
    pub(crate) fn new(id: CollectionId) -> Self {
        let committed = ArcSwap::from_pointee(Snapshot::empty(id.clone()));
        Self {
            id,
            committed,
            working: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> &CollectionId {
        &self.id
    }

    /// Latest committed snapshot. Lock-free.
    pub(crate) fn committed(&self) -> Snapshot {
        Snapshot::clone(&self.committed.load())
    }

    /// Runs `f` against the transaction's working state, creating it from
    /// the committed snapshot on first mutation.
    pub(crate) fn with_working<R>(&self, f: impl FnOnce(&mut WorkingState) -> R) -> R {
        let mut guard = self.working.lock();
        let working = guard.get_or_insert_with(|| WorkingState::new(self.committed()));
        f(working)
    }

    /// Runs `f` against the working state if one exists.
    pub(crate) fn read_working<R>(&self, f: impl FnOnce(&WorkingState) -> R) -> Option<R> {
        self.working.lock().as_ref().map(f)
    }

    /// Commits the working state, if any: materializes the new snapshot at
    /// `version`, diffs it against the pre-transaction base, and swaps the
    /// authoritative snapshot.
    ///
    /// Returns `None` when this collection was not touched in the
    /// transaction.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError::CollectionIdentifierMismatch`] from the
    /// diff; the core never constructs mismatched snapshots itself.
    pub(crate) fn commit_working(&self, version: u64) -> Result<Option<ChangeSet>, StoreError> {
        let Some(working) = self.working.lock().take() else {
            return Ok(None);
        };
        let next = Snapshot::from_entries(self.id.clone(), version, working.materialize());
        let changes = ChangeTracker::diff(&working.base, &next)?;
        self.committed.store(Arc::new(next));
        Ok(Some(changes))
    }

    /// Drops the working state without committing.
    pub(crate) fn discard_working(&self) {
        *self.working.lock() = None;
    }
}
