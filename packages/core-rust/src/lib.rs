//! `LiveDict` Core — dynamic values, collection identifiers, and change sets.

pub mod changeset;
pub mod ids;
pub mod value;

pub use changeset::ChangeSet;
pub use ids::CollectionId;
pub use value::{ObjectRef, Timestamp, Value, ValueKind};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
