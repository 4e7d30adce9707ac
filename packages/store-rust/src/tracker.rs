//! Diffing committed snapshots into [`ChangeSet`]s.

use std::cmp::Ordering;

use livedict_core::ChangeSet;

use crate::error::StoreError;
use crate::snapshot::Snapshot;

/// Computes the delta between two committed versions of one collection.
pub struct ChangeTracker;

impl ChangeTracker {
    /// Diffs `prior` against `current`.
    ///
    /// Both snapshots keep their entries key-sorted, so this is a single
    /// linear merge: a key only in `current` is an insertion, a key in both
    /// with differing values (deep equality, tag + content) is a
    /// modification, a key only in `prior` is a deletion.
    ///
    /// The commit path always diffs against the pre-transaction snapshot,
    /// never an intermediate state, so a key deleted and re-inserted with an
    /// identical value within one transaction produces no entry here.
    ///
    /// # Errors
    ///
    /// [`StoreError::CollectionIdentifierMismatch`] if the snapshots belong
    /// to different collections. This is a programming error; propagate it,
    /// do not retry.
    pub fn diff(prior: &Snapshot, current: &Snapshot) -> Result<ChangeSet, StoreError> {
        if prior.collection() != current.collection() {
            return Err(StoreError::CollectionIdentifierMismatch {
                left: prior.collection().clone(),
                right: current.collection().clone(),
            });
        }

        let mut changes = ChangeSet::new();
        let mut old = prior.entries().iter().peekable();
        let mut new = current.entries().iter().peekable();

        loop {
            match (old.peek(), new.peek()) {
                (Some((old_key, old_value)), Some((new_key, new_value))) => {
                    match old_key.cmp(new_key) {
                        Ordering::Less => {
                            changes.deletions.insert((*old_key).clone());
                            old.next();
                        }
                        Ordering::Greater => {
                            changes.insertions.insert((*new_key).clone());
                            new.next();
                        }
                        Ordering::Equal => {
                            if old_value != new_value {
                                changes.modifications.insert((*new_key).clone());
                            }
                            old.next();
                            new.next();
                        }
                    }
                }
                (Some((old_key, _)), None) => {
                    changes.deletions.insert((*old_key).clone());
                    old.next();
                }
                (None, Some((new_key, _))) => {
                    changes.insertions.insert((*new_key).clone());
                    new.next();
                }
                (None, None) => break,
            }
        }

        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use livedict_core::{CollectionId, Value};

    use super::*;

    fn snap(version: u64, entries: &[(&str, Value)]) -> Snapshot {
        let map: BTreeMap<String, Value> = entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        Snapshot::from_entries(CollectionId::new("obj", "dict"), version, map)
    }

    fn names(set: &std::collections::BTreeSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    #[test]
    fn empty_to_populated_is_all_insertions() {
        let prior = snap(0, &[]);
        let current = snap(1, &[("a", Value::Int(1)), ("b", Value::from("x"))]);

        let changes = ChangeTracker::diff(&prior, &current).unwrap();
        assert_eq!(names(&changes.insertions), vec!["a", "b"]);
        assert!(changes.modifications.is_empty());
        assert!(changes.deletions.is_empty());
    }

    #[test]
    fn erase_and_rewrite_are_categorized() {
        // One commit that erases "a" and rewrites "b".
        let prior = snap(1, &[("a", Value::Int(1)), ("b", Value::from("x"))]);
        let current = snap(2, &[("b", Value::from("y"))]);

        let changes = ChangeTracker::diff(&prior, &current).unwrap();
        assert!(changes.insertions.is_empty());
        assert_eq!(names(&changes.modifications), vec!["b"]);
        assert_eq!(names(&changes.deletions), vec!["a"]);
    }

    #[test]
    fn identical_value_rewrite_is_not_a_modification() {
        let prior = snap(1, &[("a", Value::Int(1))]);
        let current = snap(2, &[("a", Value::Int(1))]);

        let changes = ChangeTracker::diff(&prior, &current).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn tag_change_with_same_magnitude_is_a_modification() {
        let prior = snap(1, &[("a", Value::Int(1))]);
        let current = snap(2, &[("a", Value::Float(1.0))]);

        let changes = ChangeTracker::diff(&prior, &current).unwrap();
        assert_eq!(names(&changes.modifications), vec!["a"]);
    }

    #[test]
    fn interleaved_keys_merge_linearly() {
        let prior = snap(1, &[("b", Value::Int(1)), ("d", Value::Int(2))]);
        let current = snap(
            2,
            &[("a", Value::Int(0)), ("b", Value::Int(9)), ("e", Value::Int(3))],
        );

        let changes = ChangeTracker::diff(&prior, &current).unwrap();
        assert_eq!(names(&changes.insertions), vec!["a", "e"]);
        assert_eq!(names(&changes.modifications), vec!["b"]);
        assert_eq!(names(&changes.deletions), vec!["d"]);
    }

    #[test]
    fn mismatched_collections_are_rejected() {
        let prior = Snapshot::empty(CollectionId::new("obj-1", "dict"));
        let current = Snapshot::empty(CollectionId::new("obj-2", "dict"));

        let err = ChangeTracker::diff(&prior, &current).unwrap_err();
        assert!(matches!(
            err,
            StoreError::CollectionIdentifierMismatch { .. }
        ));
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        fn arb_entries() -> impl Strategy<Value = BTreeMap<String, Value>> {
            proptest::collection::btree_map("[a-e]{1,3}", (-3_i64..3).prop_map(Value::Int), 0..12)
        }

        proptest! {
            /// Applying the delta's categories to the prior key set must
            /// reproduce the current key set exactly.
            #[test]
            fn diff_reconstructs_the_current_key_set(
                old in arb_entries(),
                new in arb_entries(),
            ) {
                let prior = Snapshot::from_entries(CollectionId::new("obj", "dict"), 1, old.clone());
                let current = Snapshot::from_entries(CollectionId::new("obj", "dict"), 2, new.clone());
                let changes = ChangeTracker::diff(&prior, &current).unwrap();

                let mut keys: std::collections::BTreeSet<String> = old.into_keys().collect();
                for key in &changes.deletions {
                    prop_assert!(keys.remove(key), "deletion of absent key {key}");
                }
                for key in &changes.insertions {
                    prop_assert!(keys.insert(key.clone()), "insertion of present key {key}");
                }
                for key in &changes.modifications {
                    prop_assert!(keys.contains(key), "modification of absent key {key}");
                }
                let expected: std::collections::BTreeSet<String> = new.into_keys().collect();
                prop_assert_eq!(keys, expected);
            }
        }
    }

    #[test]
    fn categories_are_pairwise_disjoint() {
        let prior = snap(
            1,
            &[("a", Value::Int(1)), ("b", Value::Int(2)), ("c", Value::Int(3))],
        );
        let current = snap(
            2,
            &[("b", Value::Int(2)), ("c", Value::Int(9)), ("d", Value::Int(4))],
        );

        let changes = ChangeTracker::diff(&prior, &current).unwrap();
        assert!(changes.insertions.is_disjoint(&changes.modifications));
        assert!(changes.insertions.is_disjoint(&changes.deletions));
        assert!(changes.modifications.is_disjoint(&changes.deletions));
    }
}
