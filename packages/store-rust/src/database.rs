//! The owning session: collection registry, single-writer transactions, and
//! observer wiring.
//!
//! A [`Database`] owns every collection core and is the only writer gate.
//! Writes happen inside an exclusive [`WriteTransaction`]; readers observe
//! committed snapshots lock-free and never block on writers or on
//! notification delivery. Closing (or dropping) the database invalidates
//! all handles and observers deterministically — lifetime never depends on
//! a garbage collector.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use livedict_core::{ChangeSet, CollectionId};
use parking_lot::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::handle::CollectionHandle;
use crate::notifier::{ChangeCallback, DeliveryContext, NotificationScheduler, ObserverToken};
use crate::store::CollectionCore;

/// Session-wide validity flags shared with every handle.
pub(crate) struct SessionFlags {
    open: AtomicBool,
    writer: Mutex<Option<ThreadId>>,
}

impl SessionFlags {
    fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            writer: Mutex::new(None),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Whether the calling thread holds the open write transaction.
    ///
    /// Uncommitted working state is visible only to that thread; every
    /// other reader observes committed snapshots.
    pub(crate) fn is_writer_thread(&self) -> bool {
        *self.writer.lock() == Some(thread::current().id())
    }

    fn set_writer(&self) {
        *self.writer.lock() = Some(thread::current().id());
    }

    fn clear_writer(&self) {
        *self.writer.lock() = None;
    }
}

struct DbInner {
    collections: DashMap<CollectionId, Arc<CollectionCore>>,
    flags: Arc<SessionFlags>,
    write_gate: Mutex<()>,
    version: AtomicU64,
    scheduler: NotificationScheduler,
}

/// An open session over a set of dictionary collections.
pub struct Database {
    inner: Arc<DbInner>,
}

impl Database {
    /// Opens an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DbInner {
                collections: DashMap::new(),
                flags: Arc::new(SessionFlags::new()),
                write_gate: Mutex::new(()),
                version: AtomicU64::new(0),
                scheduler: NotificationScheduler::new(),
            }),
        }
    }

    /// Returns a handle onto the collection with the given identifier,
    /// creating the (empty) collection on first access.
    ///
    /// All handles for one identifier share the same underlying core and
    /// observe the same committed state.
    #[must_use]
    pub fn collection(&self, id: &CollectionId) -> CollectionHandle {
        let core = self
            .inner
            .collections
            .entry(id.clone())
            .or_insert_with(|| Arc::new(CollectionCore::new(id.clone())))
            .clone();
        CollectionHandle::new(core, Arc::clone(&self.inner.flags))
    }

    /// Begins the exclusive write transaction, blocking until any other
    /// writer finishes. Readers are unaffected.
    ///
    /// The transaction is confined to the calling thread: reads on that
    /// thread observe its uncommitted state, mutations from any other
    /// thread fail with [`StoreError::ReadOnlyViolation`], and concurrent
    /// readers keep observing the committed snapshot until commit.
    #[must_use]
    pub fn begin_write(&self) -> WriteTransaction<'_> {
        let gate = self.inner.write_gate.lock();
        self.inner.flags.set_writer();
        WriteTransaction {
            inner: &self.inner,
            _gate: gate,
            finished: false,
        }
    }

    /// Registers an observer for `collection`, delivered on `context`.
    pub fn register_observer(
        &self,
        collection: &CollectionId,
        callback: ChangeCallback,
        context: Arc<dyn DeliveryContext>,
    ) -> ObserverToken {
        self.inner
            .scheduler
            .register(collection.clone(), callback, context)
    }

    /// Cancels an observer registration; any undelivered delta is dropped.
    pub fn unregister(&self, token: ObserverToken) {
        self.inner.scheduler.unregister(token);
    }

    /// Closes the session: every handle becomes stale and every observer is
    /// invalidated, cancelling pending deliveries. Idempotent; also runs on
    /// drop.
    pub fn close(&self) {
        if self.inner.flags.open.swap(false, Ordering::AcqRel) {
            self.inner.scheduler.invalidate_all();
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.close();
    }
}

/// Exclusive write transaction over a [`Database`].
///
/// Mutations go through [`CollectionHandle`]s while the transaction is
/// open. Dropping without committing rolls back.
pub struct WriteTransaction<'db> {
    inner: &'db DbInner,
    _gate: MutexGuard<'db, ()>,
    finished: bool,
}

impl WriteTransaction<'_> {
    /// Commits every touched collection.
    ///
    /// For each collection with uncommitted changes this materializes the
    /// new snapshot at the next global version, diffs it against the
    /// pre-transaction snapshot, swaps the authoritative snapshot, and then
    /// — after the write window is closed — enqueues non-empty deltas with
    /// the scheduler. Observer callbacks never run inside this call.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError::CollectionIdentifierMismatch`] from the
    /// diff. That indicates an internal invariant violation; the
    /// transaction is abandoned, not retried.
    pub fn commit(mut self) -> Result<(), StoreError> {
        let version = self.inner.version.fetch_add(1, Ordering::AcqRel) + 1;

        let mut deltas: Vec<(CollectionId, ChangeSet)> = Vec::new();
        for entry in self.inner.collections.iter() {
            if let Some(changes) = entry.value().commit_working(version)? {
                if !changes.is_empty() {
                    deltas.push((entry.key().clone(), changes));
                }
            }
        }

        self.finished = true;
        self.inner.flags.clear_writer();

        for (id, changes) in deltas {
            self.inner.scheduler.enqueue(&id, &changes);
        }
        Ok(())
    }

    /// Discards all uncommitted changes. No notifications are produced.
    pub fn rollback(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        if self.finished {
            return;
        }
        for entry in self.inner.collections.iter() {
            entry.value().discard_working();
        }
        self.inner.flags.clear_writer();
        self.finished = true;
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        self.abort();
    }
}
