//! Immutable, versioned views of a collection's committed entries.
//!
//! A [`Snapshot`] is created at transaction boundaries and never mutated
//! afterwards. Readers and pending notifications hold `Arc`s into the entry
//! map, so a snapshot stays alive exactly as long as something references
//! it and is reclaimed by the allocator once the last `Arc` drops.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use livedict_core::{CollectionId, Value};

/// Immutable view of a collection's entries as of a specific commit.
///
/// Entries are key-sorted (byte-wise `String` ordering) so that two
/// snapshots of the same collection can be diffed by a linear merge.
/// Cloning is cheap: the entry map is shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Snapshot {
    collection: CollectionId,
    version: u64,
    entries: Arc<BTreeMap<String, Value>>,
}

impl Snapshot {
    /// Creates the version-0 snapshot of an empty collection.
    #[must_use]
    pub fn empty(collection: CollectionId) -> Self {
        Self {
            collection,
            version: 0,
            entries: Arc::new(BTreeMap::new()),
        }
    }

    /// Creates a snapshot from a materialized entry map.
    #[must_use]
    pub(crate) fn from_entries(
        collection: CollectionId,
        version: u64,
        entries: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            collection,
            version,
            entries: Arc::new(entries),
        }
    }

    /// Identifier of the collection this snapshot belongs to.
    #[must_use]
    pub fn collection(&self) -> &CollectionId {
        &self.collection
    }

    /// Commit version this snapshot was taken at. Version 0 is the empty
    /// pre-creation state.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Looks up a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Whether the key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lazy, restartable iterator over the keys in sorted order.
    ///
    /// The iterator holds its own `Arc` to the entry map, so it keeps
    /// reflecting this snapshot even after later commits. Clone it to
    /// restart from the current position; call `keys()` again to restart
    /// from the beginning.
    #[must_use]
    pub fn keys(&self) -> KeyIter {
        KeyIter {
            entries: Arc::clone(&self.entries),
            last: None,
        }
    }

    /// Shared handle to the sorted entry map, for linear-merge diffing.
    pub(crate) fn entries(&self) -> &BTreeMap<String, Value> {
        &self.entries
    }
}

/// Lazy key iterator over a [`Snapshot`].
///
/// Each step is an `O(log n)` range probe past the previously yielded key,
/// which avoids borrowing from the snapshot and keeps the iterator `Clone`
/// and `Send`.
#[derive(Debug, Clone)]
pub struct KeyIter {
    entries: Arc<BTreeMap<String, Value>>,
    last: Option<String>,
}

impl Iterator for KeyIter {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let next = match &self.last {
            None => self.entries.keys().next().cloned(),
            Some(last) => self
                .entries
                .range::<String, _>((Bound::Excluded(last.clone()), Bound::Unbounded))
                .next()
                .map(|(k, _)| k.clone()),
        };
        self.last.clone_from(&next);
        next
    }
}
