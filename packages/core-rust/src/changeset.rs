//! Change sets: the delta between two committed versions of a collection.
//!
//! A [`ChangeSet`] partitions the touched keys of a collection into three
//! pairwise-disjoint categories. Change sets compose: [`ChangeSet::merge`]
//! folds a newer delta into an older undelivered one, producing the net
//! effect an observer would have seen had it diffed the endpoints directly.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Keys inserted, modified, and deleted between two snapshots.
///
/// Invariant: the three sets are pairwise disjoint. A key in `deletions`
/// existed in the prior snapshot and is absent from the newer one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Keys present only in the newer snapshot.
    pub insertions: BTreeSet<String>,
    /// Keys present in both snapshots with differing values.
    pub modifications: BTreeSet<String>,
    /// Keys present only in the prior snapshot.
    pub deletions: BTreeSet<String>,
}

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no key appears in any category.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty() && self.modifications.is_empty() && self.deletions.is_empty()
    }

    /// Total number of keys across all categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.insertions.len() + self.modifications.len() + self.deletions.len()
    }

    /// Folds `newer` into `self`, keeping the net effect.
    ///
    /// `self` is the older, still-undelivered delta; `newer` was produced by
    /// a later commit on the same collection. Per-key rules:
    ///
    /// - newer insertion of a key `self` deleted: the observer last saw the
    ///   key present, so the pair collapses to a modification;
    /// - newer modification of a key `self` inserted: the observer never saw
    ///   the key, so it stays an insertion;
    /// - newer deletion of a key `self` inserted: the key came and went
    ///   unobserved, so it drops out entirely;
    /// - newer deletion of a key `self` modified: the deletion wins.
    pub fn merge(&mut self, newer: ChangeSet) {
        for key in newer.insertions {
            if self.deletions.remove(&key) {
                self.modifications.insert(key);
            } else {
                self.insertions.insert(key);
            }
        }
        for key in newer.modifications {
            if !self.insertions.contains(&key) {
                self.modifications.insert(key);
            }
        }
        for key in newer.deletions {
            if self.insertions.remove(&key) {
                continue;
            }
            self.modifications.remove(&key);
            self.deletions.insert(key);
        }
    }
}
