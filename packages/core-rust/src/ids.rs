//! Stable collection identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier tying a dictionary instance to its owning parent
/// record, independent of any particular open transaction.
///
/// Two snapshots are diffable only if their identifiers are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionId {
    /// Identifier of the parent record/object that owns the dictionary.
    pub object: String,
    /// Name of the dictionary-valued property on the parent.
    pub property: String,
}

impl CollectionId {
    /// Creates a collection identifier from a parent object id and a
    /// property name.
    #[must_use]
    pub fn new(object: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            property: property.into(),
        }
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.object, self.property)
    }
}
