//! Transactionally consistent dictionary collections with coalesced change
//! notifications.
//!
//! A [`Database`] session owns named dictionary collections of string keys
//! and dynamically typed [`livedict_core::Value`]s. All mutation happens
//! inside a single exclusive [`WriteTransaction`]; readers observe immutable
//! committed snapshots without blocking. Each commit produces one
//! [`livedict_core::ChangeSet`] per touched collection — disjoint key sets
//! of insertions, modifications, and deletions — delivered asynchronously to
//! registered observers on a [`DeliveryContext`] of their choosing, at most
//! one outstanding delta per observer, in commit order.

pub mod database;
pub mod error;
pub mod handle;
pub mod notifier;
pub mod snapshot;
mod store;
pub mod tracker;

pub use database::{Database, WriteTransaction};
pub use error::StoreError;
pub use handle::{CollectionHandle, Keys};
pub use notifier::{
    ChangeCallback, DeliveryContext, DeliveryWork, NotificationScheduler, ObserverToken,
    TokioContext, WorkerContext, WorkerHandle,
};
pub use snapshot::{KeyIter, Snapshot};
pub use tracker::ChangeTracker;
