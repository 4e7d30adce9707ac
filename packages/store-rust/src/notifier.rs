//! Observer registration and coalesced change delivery.
//!
//! The [`NotificationScheduler`] associates observers with collections via
//! explicit [`ObserverToken`]s. Each observer walks a small state machine:
//!
//! ```text
//! Idle -> Pending -> Delivering -> Idle
//!   \        |           |
//!    `-------+-----------+--> Invalidated (absorbing)
//! ```
//!
//! A commit enqueues at most one [`ChangeSet`] per collection; if the
//! observer still has an undelivered delta, the new one is merged into it
//! (net effect, deletions win) instead of queued behind it. An observer
//! therefore never has more than one outstanding delta and never sees
//! deltas out of commit order. Delivery runs on the observer's
//! [`DeliveryContext`], never inside the committing transaction's critical
//! section. A pending delta that coalesced to a net no-op is dropped at
//! delivery time, never handed to the callback. Invalidation is
//! cooperative: it is checked at each delivery attempt, and a delta already
//! computed for an invalidated observer is dropped silently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use livedict_core::{ChangeSet, CollectionId};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

/// Observer callback invoked with each coalesced delta.
///
/// A returned error is logged and never propagates to other observers or
/// back into the commit path.
pub type ChangeCallback = Arc<dyn Fn(&ChangeSet) -> anyhow::Result<()> + Send + Sync>;

/// Unit of scheduled delivery work.
pub type DeliveryWork = Box<dyn FnOnce() + Send>;

/// Execution context observers choose at registration time.
///
/// Implementations must not run `work` synchronously inside `schedule`
/// when `schedule` is reachable from a committing transaction; both
/// provided implementations hand the work to a tokio runtime.
pub trait DeliveryContext: Send + Sync {
    /// Schedules `work` to run on this context. Must not block.
    fn schedule(&self, work: DeliveryWork);
}

/// Delivery context that runs callbacks on a tokio runtime's blocking pool.
///
/// Observer callbacks may be arbitrarily long, so they go through
/// `spawn_blocking` rather than onto the async executor.
pub struct TokioContext {
    handle: tokio::runtime::Handle,
}

impl TokioContext {
    /// Creates a context targeting the given runtime.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates a context targeting the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl DeliveryContext for TokioContext {
    fn schedule(&self, work: DeliveryWork) {
        self.handle.spawn_blocking(work);
    }
}

/// Dedicated serial delivery worker fed by an unbounded channel.
///
/// All work scheduled on one `WorkerContext` runs in submission order on a
/// single tokio task. Work scheduled after the worker stops is dropped.
pub struct WorkerContext {
    tx: mpsc::UnboundedSender<DeliveryWork>,
}

impl WorkerContext {
    /// Spawns the worker loop on the current runtime.
    ///
    /// Returns the context (to hand to `register_observer`) and a
    /// [`WorkerHandle`] for graceful shutdown.
    #[must_use]
    pub fn spawn() -> (Arc<Self>, WorkerHandle) {
        let (tx, mut rx) = mpsc::unbounded_channel::<DeliveryWork>();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    work = rx.recv() => {
                        match work {
                            Some(w) => w(),
                            None => break, // Channel closed.
                        }
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }
        });

        (
            Arc::new(Self { tx }),
            WorkerHandle {
                shutdown_tx: Some(shutdown_tx),
                handle: Some(handle),
            },
        )
    }
}

impl DeliveryContext for WorkerContext {
    fn schedule(&self, work: DeliveryWork) {
        // A closed channel means the worker stopped; the work is dropped,
        // matching cancelled-delivery semantics.
        let _ = self.tx.send(work);
    }
}

/// Shutdown handle for a [`WorkerContext`] loop.
pub struct WorkerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Stops the worker and waits for the loop to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

/// Opaque registration token.
///
/// Held by the caller to unregister; it is a cancellation signal, not a
/// resource that must be freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Pending,
    Delivering,
    Invalidated,
}

struct ObserverState {
    phase: Phase,
    pending: Option<ChangeSet>,
}

struct ObserverEntry {
    token: ObserverToken,
    collection: CollectionId,
    callback: ChangeCallback,
    context: Arc<dyn DeliveryContext>,
    state: Mutex<ObserverState>,
}

/// Registers observers and fans committed deltas out to their contexts.
///
/// Registration and unregistration are non-blocking with respect to
/// in-flight deliveries: they only flip the per-observer state under a
/// short-lived mutex.
#[derive(Default)]
pub struct NotificationScheduler {
    observers: DashMap<u64, Arc<ObserverEntry>>,
    next_token: AtomicU64,
}

impl NotificationScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for changes to `collection`, delivered on
    /// `context`.
    pub fn register(
        &self,
        collection: CollectionId,
        callback: ChangeCallback,
        context: Arc<dyn DeliveryContext>,
    ) -> ObserverToken {
        let token = ObserverToken(self.next_token.fetch_add(1, Ordering::Relaxed) + 1);
        let entry = Arc::new(ObserverEntry {
            token,
            collection,
            callback,
            context,
            state: Mutex::new(ObserverState {
                phase: Phase::Idle,
                pending: None,
            }),
        });
        self.observers.insert(token.0, entry);
        token
    }

    /// Invalidates the observer and drops any undelivered delta. Idempotent.
    pub fn unregister(&self, token: ObserverToken) {
        if let Some((_, entry)) = self.observers.remove(&token.0) {
            invalidate(&entry);
        }
    }

    /// Invalidates every observer. Used when the owning session closes.
    pub fn invalidate_all(&self) {
        for entry in self.observers.iter() {
            invalidate(entry.value());
        }
        self.observers.clear();
    }

    /// Whether the token still refers to a live registration.
    #[must_use]
    pub fn is_registered(&self, token: ObserverToken) -> bool {
        self.observers.contains_key(&token.0)
    }

    /// Hands one committed delta to every observer of `collection`.
    ///
    /// Merges into any undelivered pending delta; schedules a delivery only
    /// for observers that were idle. Never runs a callback synchronously.
    pub fn enqueue(&self, collection: &CollectionId, changes: &ChangeSet) {
        // Collect the matching entries before scheduling anything: no map
        // shard guard may be held while a context runs work, since the work
        // may call back into register/unregister.
        let matching: Vec<Arc<ObserverEntry>> = self
            .observers
            .iter()
            .filter(|entry| entry.value().collection == *collection)
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for entry in matching {
            let mut state = entry.state.lock();
            match state.phase {
                Phase::Invalidated => {}
                Phase::Pending | Phase::Delivering => {
                    // A delivery is already outstanding: fold the new delta
                    // into the pending one instead of queueing it behind.
                    match &mut state.pending {
                        Some(pending) => pending.merge(changes.clone()),
                        None => state.pending = Some(changes.clone()),
                    }
                }
                Phase::Idle => {
                    state.pending = Some(changes.clone());
                    state.phase = Phase::Pending;
                    // Schedule outside the state lock so a context that runs
                    // work promptly cannot contend with this registration.
                    drop(state);
                    let next = Arc::clone(&entry);
                    entry.context.schedule(Box::new(move || deliver(&next)));
                }
            }
        }
    }
}

/// One delivery attempt for an observer.
///
/// Takes the pending delta, invokes the callback outside any lock, then
/// either returns to `Idle` or reschedules itself if a commit raced in a
/// new delta while the callback ran.
fn deliver(entry: &Arc<ObserverEntry>) {
    let changes = {
        let mut state = entry.state.lock();
        if state.phase == Phase::Invalidated {
            state.pending = None;
            return;
        }
        match state.pending.take() {
            Some(changes) if !changes.is_empty() => {
                state.phase = Phase::Delivering;
                changes
            }
            // No pending delta, or one that coalesced to a net no-op:
            // nothing to deliver.
            _ => {
                state.phase = Phase::Idle;
                return;
            }
        }
    };

    if let Err(error) = (entry.callback)(&changes) {
        tracing::warn!(
            collection = %entry.collection,
            token = entry.token.0,
            error = %error,
            "observer callback failed; continuing with other observers"
        );
    }

    let mut state = entry.state.lock();
    if state.phase == Phase::Invalidated {
        state.pending = None;
        return;
    }
    if state.pending.is_some() {
        // A commit raced in a new delta while the callback ran.
        state.phase = Phase::Pending;
        drop(state);
        let next = Arc::clone(entry);
        entry.context.schedule(Box::new(move || deliver(&next)));
    } else {
        state.phase = Phase::Idle;
    }
}

fn invalidate(entry: &Arc<ObserverEntry>) {
    let mut state = entry.state.lock();
    state.phase = Phase::Invalidated;
    state.pending = None;
}
