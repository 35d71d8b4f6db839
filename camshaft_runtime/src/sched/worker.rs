use std::{
    cell::UnsafeCell,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    sync::Arc,
};

use camshaft_tinyvec::Vector;
use parking_lot::{Condvar, Mutex};

use crate::{pqueue::ReactionQueue, Reaction};

/// Identifier for a scheduler worker.
pub type WorkerId = usize;

const IDLE: usize = 1;
const BUSY: usize = 0;

/// A single-owner cell handed back and forth across the `is_idle` barrier.
///
/// Access is unsynchronized; soundness rests entirely on the handoff rule:
/// the worker that owns the enclosing slot dereferences only while its
/// `is_idle` flag is 0, the dispatcher only after observing 1 with an
/// Acquire load. The flag transitions use Release stores / AcqRel CAS, so
/// each side sees the other's completed writes when the license changes
/// hands.
pub(crate) struct HandoffCell<T>(UnsafeCell<T>);

// SAFETY: see the handoff rule above; at most one thread holds the license
// at any time, and the license transfer synchronizes through `is_idle`.
unsafe impl<T: Send> Sync for HandoffCell<T> {}

impl<T> HandoffCell<T> {
    fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// # Safety
    ///
    /// The caller must hold the handoff license for the enclosing worker
    /// slot: either it is the owning worker's thread and the slot is busy,
    /// or it is the dispatcher and it observed the slot idle since its last
    /// license release.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn get(&self) -> &mut T {
        &mut *self.0.get()
    }
}

/// Per-worker handoff state.
///
/// The ready queue is protected by its mutex, which doubles as the park
/// mutex for `cond`. The output and done buffers carry no lock; see
/// [`HandoffCell`].
pub(crate) struct WorkerSlot {
    /// Reactions assigned to this worker, pending execution.
    pub(crate) ready: Mutex<ReactionQueue>,
    /// Signaled by the dispatcher when work lands in `ready` or at stop.
    pub(crate) cond: Condvar,
    /// Reactions this worker triggered during its current execution and has
    /// not yet published globally.
    pub(crate) outputs: HandoffCell<Vector<Arc<Reaction>>>,
    /// Reactions this worker finished and has not yet retired from the
    /// executing queue.
    pub(crate) done: HandoffCell<Vector<Arc<Reaction>>>,
    /// 0 = busy (worker owns the handoff buffers), 1 = idle (dispatcher
    /// owns them).
    is_idle: AtomicUsize,
    pub(crate) should_stop: AtomicBool,
}

impl std::fmt::Debug for WorkerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerSlot")
            .field("is_idle", &self.is_idle())
            .field("should_stop", &self.should_stop())
            .finish_non_exhaustive()
    }
}

impl WorkerSlot {
    pub(crate) fn new(initial_capacity: usize) -> Self {
        Self {
            ready: Mutex::new(ReactionQueue::new()),
            cond: Condvar::new(),
            outputs: HandoffCell::new(Vector::new(initial_capacity)),
            done: HandoffCell::new(Vector::new(initial_capacity)),
            is_idle: AtomicUsize::new(BUSY),
            should_stop: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.is_idle.load(Ordering::Acquire) == IDLE
    }

    /// Release the handoff license to the dispatcher. No-op if already
    /// idle.
    pub(crate) fn make_idle(&self) {
        let _ = self
            .is_idle
            .compare_exchange(BUSY, IDLE, Ordering::Release, Ordering::Relaxed);
    }

    /// Reclaim the handoff license for the worker. Returns `true` if this
    /// call performed the transition.
    pub(crate) fn make_busy(&self) -> bool {
        self.is_idle
            .compare_exchange(IDLE, BUSY, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    pub(crate) fn should_stop(&self) -> bool {
        self.should_stop.load(Ordering::Acquire)
    }
}
