use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use camshaft_tinyvec::Vector;
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

use super::{
    pool::WorkerCtx,
    worker::{WorkerId, WorkerSlot},
    Config, SchedError,
};
use crate::{clock::TagAdvancer, pqueue::ReactionQueue, Reaction, ReactionStatus};

/// Everything guarded by the global state lock: the global queues, the
/// placement cursor, and tag advancement.
struct SchedState {
    /// Reactions eligible at the current tag, not yet dispatched.
    reaction_q: ReactionQueue,
    /// Reactions dispatched at the current tag and not yet retired; consulted
    /// by the precedence filter.
    executing_q: ReactionQueue,
    /// Per-round holding area for popped reactions that could not be
    /// dispatched; drained back into `reaction_q` at round end.
    transfer_q: Vector<Arc<Reaction>>,
    /// Cursor for round-robin placement within a dispatch round.
    balancing_index: usize,
    /// Workers that already received a reaction this round; their `is_idle`
    /// flag only flips at notification time, so the flag alone cannot tell
    /// them apart from untouched idle workers.
    placed: Box<[bool]>,
    clock: Box<dyn TagAdvancer>,
}

/// The PEDF-NP scheduler.
///
/// One value encapsulates all scheduler state; share it across threads as
/// `Arc<Scheduler>`. Worker-side operations go through the [`WorkerCtx`]
/// handles returned by [`Scheduler::take_workers`]; the host triggers
/// reactions from its own threads with [`Scheduler::trigger_reaction`].
///
/// Dropping the scheduler releases all queues and worker slots.
pub struct Scheduler {
    state: Mutex<SchedState>,
    /// Election flag: the worker that wins the CAS runs the dispatcher.
    scheduling_in_progress: AtomicBool,
    workers: Box<[CachePadded<WorkerSlot>]>,
    contexts_taken: AtomicBool,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("workers", &self.workers.len())
            .field(
                "scheduling_in_progress",
                &self.scheduling_in_progress.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a scheduler managing `config.workers` worker slots. Workers
    /// start busy so the first dispatcher round cannot touch their handoff
    /// buffers before the worker threads exist.
    pub fn new(config: Config, clock: Box<dyn TagAdvancer>) -> Result<Self, SchedError> {
        if config.workers == 0 {
            return Err(SchedError::NoWorkers);
        }
        if config.initial_queue_capacity == 0 {
            return Err(SchedError::ZeroCapacity);
        }
        tracing::info!(workers = config.workers, "initializing scheduler");

        let workers: Box<[_]> = (0..config.workers)
            .map(|_| CachePadded::new(WorkerSlot::new(config.initial_queue_capacity)))
            .collect();

        Ok(Self {
            state: Mutex::new(SchedState {
                reaction_q: ReactionQueue::new(),
                executing_q: ReactionQueue::new(),
                transfer_q: Vector::new(config.initial_queue_capacity),
                balancing_index: 0,
                placed: vec![false; config.workers].into_boxed_slice(),
                clock,
            }),
            scheduling_in_progress: AtomicBool::new(false),
            workers,
            contexts_taken: AtomicBool::new(false),
        })
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Hand out the per-worker capability handles, one per slot.
    ///
    /// Each [`WorkerCtx`] is the sole license to run that worker's side of
    /// the scheduler; this can only be called once.
    ///
    /// # Panics
    ///
    /// Panics if the contexts were already taken.
    pub fn take_workers(this: &Arc<Self>) -> Vec<WorkerCtx> {
        assert!(
            !this.contexts_taken.swap(true, Ordering::SeqCst),
            "worker contexts already taken"
        );
        (0..this.workers.len())
            .map(|id| WorkerCtx::new(Arc::clone(this), id))
            .collect()
    }

    /// Publish `reaction` as eligible at the current tag, from a context
    /// that is not a worker thread.
    ///
    /// Triggering a reaction that is already queued or running is a no-op:
    /// the same reaction is never enqueued twice at a tag.
    pub fn trigger_reaction(&self, reaction: Arc<Reaction>) {
        let mut state = self.state.lock();
        if reaction
            .transition(ReactionStatus::Inactive, ReactionStatus::Queued)
            .is_ok()
        {
            tracing::debug!(
                reaction = %reaction.get_name(),
                level = reaction.level(),
                "enqueueing triggered reaction"
            );
            state.reaction_q.insert(reaction);
        }
    }

    /// Worker-side trigger: the reaction inherits the worker as its
    /// affinity hint and lands in the worker's output buffer, published
    /// globally by the next dispatcher round. No global lock is taken.
    pub(crate) fn worker_trigger_reaction(&self, worker: WorkerId, reaction: Arc<Reaction>) {
        if reaction
            .transition(ReactionStatus::Inactive, ReactionStatus::Queued)
            .is_ok()
        {
            tracing::debug!(
                worker,
                reaction = %reaction.get_name(),
                level = reaction.level(),
                "buffering triggered reaction"
            );
            reaction.set_worker_affinity(worker);
            // SAFETY: called from worker `worker`'s thread while it executes
            // a reaction, so the slot is busy and the worker holds the
            // handoff license.
            unsafe { self.workers[worker].outputs.get() }.push(reaction);
        }
    }

    /// Report `reaction` as finished by `worker`. The reaction is retired
    /// from the executing queue by the next dispatcher round.
    ///
    /// # Panics
    ///
    /// Panics if the reaction is not currently `Running`.
    pub(crate) fn worker_done_with_reaction(&self, worker: WorkerId, reaction: &Arc<Reaction>) {
        if let Err(observed) =
            reaction.transition(ReactionStatus::Running, ReactionStatus::Inactive)
        {
            panic!(
                "unexpected status {observed:?} for finished reaction {}; expected Running",
                reaction.get_name()
            );
        }
        // SAFETY: as in `worker_trigger_reaction`, the calling worker is
        // busy and holds the handoff license.
        unsafe { self.workers[worker].done.get() }.push(Arc::clone(reaction));
    }

    /// Return the next reaction for `worker`, or `None` once it is time for
    /// the worker to stop. Blocks until either is the case.
    pub(crate) fn worker_get_ready_reaction(&self, worker: WorkerId) -> Option<Arc<Reaction>> {
        let slot = &self.workers[worker];
        while !slot.should_stop() {
            let mut reaction = slot.ready.lock().pop();

            if reaction.is_none() && self.workers.len() > 1 {
                // One-hop steal from the neighbor.
                let victim = (worker + 1) % self.workers.len();
                reaction = self.workers[victim].ready.lock().pop();
                if let Some(stolen) = &reaction {
                    tracing::debug!(
                        worker,
                        victim,
                        reaction = %stolen.get_name(),
                        "stole a reaction from the neighbor"
                    );
                }
            }

            match reaction {
                Some(reaction) => {
                    // Re-assert the busy state before user code touches the
                    // handoff buffers; this only performs a transition after
                    // a spurious wakeup, where nobody flipped the flag back.
                    slot.make_busy();
                    return Some(reaction);
                }
                None => {
                    tracing::trace!(worker, "out of ready reactions");
                    self.wait_for_work(worker);
                }
            }
        }
        None
    }

    /// Mark the worker idle, then either run a dispatcher round (if this
    /// worker wins the scheduling election) or park until signaled.
    fn wait_for_work(&self, worker: WorkerId) {
        let slot = &self.workers[worker];
        slot.make_idle();

        if self
            .scheduling_in_progress
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            if self.try_advance_tag_and_distribute() {
                self.signal_stop();
            }
            slot.make_busy();
            let _ = self.scheduling_in_progress.compare_exchange(
                true,
                false,
                Ordering::Release,
                Ordering::Relaxed,
            );
        } else {
            let mut ready = slot.ready.lock();
            if slot.should_stop() {
                return;
            }
            // A dispatcher round may have assigned work between the idle
            // transition above and this lock acquisition; parking now would
            // miss its signal.
            if !ready.is_empty() {
                return;
            }
            tracing::trace!(worker, "parking until work is handed out");
            slot.cond.wait(&mut ready);
        }
    }

    /// One scheduling round: drain worker buffers, advance the tag if fully
    /// quiescent, distribute ready reactions, notify the workers that
    /// received work. Returns `true` iff the stop tag was reached.
    #[tracing::instrument(skip(self))]
    fn try_advance_tag_and_distribute(&self) -> bool {
        let mut reached_stop = false;

        let mut state = self.state.lock();
        let any_busy = self.update_queues(&mut state);
        if !any_busy && state.reaction_q.is_empty() && state.executing_q.is_empty() {
            tracing::debug!("quiescent; advancing the tag");
            if state.clock.advance_tag() {
                tracing::debug!("reached the stop tag");
                reached_stop = true;
            }
        }
        let distributed = self.distribute_ready_reactions(&mut state);
        drop(state);

        if distributed > 0 {
            self.notify_workers();
        }
        reached_stop
    }

    /// Publish the worker-side buffers of every idle worker into the global
    /// queues: outputs into the reaction queue, done reactions out of the
    /// executing queue. Returns `true` if any worker was observed busy.
    fn update_queues(&self, state: &mut SchedState) -> bool {
        let mut any_busy = false;
        for (i, slot) in self.workers.iter().enumerate() {
            if !slot.is_idle() {
                tracing::trace!(worker = i, "busy; leaving its buffers alone");
                any_busy = true;
                continue;
            }

            // SAFETY: the worker was observed idle (Acquire), so the
            // dispatcher holds the handoff license for its buffers until the
            // flag flips back at notification.
            let outputs = unsafe { slot.outputs.get() };
            while let Some(reaction) = outputs.pop() {
                tracing::debug!(
                    worker = i,
                    reaction = %reaction.get_name(),
                    "moving worker output into the reaction queue"
                );
                state.reaction_q.insert(reaction);
            }
            outputs.vote();

            // SAFETY: as above.
            let done = unsafe { slot.done.get() };
            while let Some(reaction) = done.pop() {
                tracing::debug!(
                    worker = i,
                    reaction = %reaction.get_name(),
                    "retiring finished reaction from the executing queue"
                );
                if !state.executing_q.remove(&reaction) {
                    panic!(
                        "finished reaction {} was not on the executing queue",
                        reaction.get_name()
                    );
                }
            }
            done.vote();
        }
        any_busy
    }

    /// `true` iff `reaction` must not start yet: something executing or set
    /// aside this round is at a lower level with an overlapping chain.
    fn is_blocked(state: &SchedState, reaction: &Reaction) -> bool {
        // The head of the executing queue carries its minimum index. A
        // candidate at or below that index cannot be blocked by anything
        // executing, and transfer-queue entries are themselves blocked by
        // executing reactions, so transitivity lets us skip both scans.
        if let Some(head) = state.executing_q.peek() {
            if reaction.index() <= head.index() {
                return false;
            }
        }

        for running in state.executing_q.iter() {
            if running.has_precedence_over(reaction) {
                tracing::trace!(
                    reaction = %reaction.get_name(),
                    by = %running.get_name(),
                    "blocked by executing reaction"
                );
                return true;
            }
        }

        for blocked in state.transfer_q.iter() {
            if blocked.has_precedence_over(reaction) {
                tracing::trace!(
                    reaction = %reaction.get_name(),
                    by = %blocked.get_name(),
                    "blocked by set-aside reaction"
                );
                return true;
            }
        }
        false
    }

    /// Pop every ready reaction and either place it on an idle worker or
    /// set it aside on the transfer queue; drain the transfer queue back at
    /// the end. Returns the number of reactions placed.
    fn distribute_ready_reactions(&self, state: &mut SchedState) -> usize {
        state.placed.fill(false);
        let mut distributed = 0;

        while let Some(reaction) = state.reaction_q.pop() {
            if !Self::is_blocked(state, &reaction) {
                if self.place(state, &reaction) {
                    distributed += 1;
                    continue;
                }
                tracing::debug!(
                    reaction = %reaction.get_name(),
                    "no idle worker available"
                );
            }
            // Could not dispatch; set it aside for this round.
            state.transfer_q.push(reaction);
        }

        while let Some(reaction) = state.transfer_q.pop() {
            state.reaction_q.insert(reaction);
        }
        state.transfer_q.vote();

        // This work distribution round is over.
        state.balancing_index = 0;
        distributed
    }

    /// Place `reaction` on the first idle worker at or after
    /// `max(worker_affinity, balancing_index)`, scanning all workers once
    /// in circular order. A worker accepts at most one placement per round.
    fn place(&self, state: &mut SchedState, reaction: &Arc<Reaction>) -> bool {
        let num_workers = self.workers.len();
        let mut worker_id = reaction.worker_affinity().max(state.balancing_index) % num_workers;
        let mut found = false;

        for _ in 0..num_workers {
            if !state.placed[worker_id] && self.workers[worker_id].is_idle() {
                tracing::debug!(
                    reaction = %reaction.get_name(),
                    worker = worker_id,
                    "assigning reaction"
                );
                if let Err(observed) =
                    reaction.transition(ReactionStatus::Queued, ReactionStatus::Running)
                {
                    panic!(
                        "unexpected status {observed:?} for reaction {} at placement; expected Queued",
                        reaction.get_name()
                    );
                }
                self.workers[worker_id].ready.lock().insert(Arc::clone(reaction));
                // Keep it visible to the precedence filter until the worker
                // reports it done.
                state.executing_q.insert(Arc::clone(reaction));
                state.placed[worker_id] = true;
                found = true;
            }

            worker_id = (worker_id + 1) % num_workers;
            if found {
                break;
            }
        }

        // Next placement starts past the worker just used.
        state.balancing_index = worker_id;
        found
    }

    /// Wake every worker that has work waiting. The CAS prevents
    /// double-waking and hands the worker its handoff license back.
    fn notify_workers(&self) {
        for (i, slot) in self.workers.iter().enumerate() {
            let ready = slot.ready.lock();
            if !ready.is_empty() && slot.make_busy() {
                tracing::debug!(worker = i, "notifying worker of new work");
                slot.cond.notify_one();
            }
        }
    }

    /// Broadcast stop to every worker.
    fn signal_stop(&self) {
        tracing::info!("signaling all workers to stop");
        for slot in self.workers.iter() {
            let _ready = slot.ready.lock();
            slot.should_stop.store(true, Ordering::Release);
            slot.cond.notify_one();
        }
    }
}
