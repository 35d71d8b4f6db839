use std::sync::Arc;
use std::thread::JoinHandle;

use super::{pedf::Scheduler, worker::WorkerId};
use crate::Reaction;

/// The worker-side handle to the scheduler.
///
/// Exactly one context exists per worker; holding it is the license to run
/// that worker's half of the handoff protocol, which is why all operations
/// take `&mut self`. Obtain the contexts from [`Scheduler::take_workers`],
/// or let [`WorkerPool::spawn`] drive them on dedicated threads.
#[derive(Debug)]
pub struct WorkerCtx {
    sched: Arc<Scheduler>,
    id: WorkerId,
}

impl WorkerCtx {
    pub(crate) fn new(sched: Arc<Scheduler>, id: WorkerId) -> Self {
        Self { sched, id }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Ask the scheduler for one more reaction.
    ///
    /// Blocks until a reaction is available for this worker (possibly
    /// stolen from the neighbor) or it is time for the worker to stop and
    /// exit, in which case `None` is returned.
    pub fn get_ready_reaction(&mut self) -> Option<Arc<Reaction>> {
        self.sched.worker_get_ready_reaction(self.id)
    }

    /// Inform the scheduler that this worker finished executing `reaction`.
    pub fn done_with_reaction(&mut self, reaction: &Arc<Reaction>) {
        self.sched.worker_done_with_reaction(self.id, reaction);
    }

    /// Trigger `reaction` at the current tag. The reaction inherits this
    /// worker as its placement hint.
    pub fn trigger_reaction(&mut self, reaction: Arc<Reaction>) {
        self.sched.worker_trigger_reaction(self.id, reaction);
    }
}

/// One OS thread per worker, each running the get/execute/done loop until
/// the scheduler reports stop.
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Take the scheduler's worker contexts and spawn a thread for each.
    ///
    /// # Panics
    ///
    /// Panics if the contexts were already taken, or if a thread cannot be
    /// spawned.
    pub fn spawn(sched: &Arc<Scheduler>) -> Self {
        let handles = Scheduler::take_workers(sched)
            .into_iter()
            .map(|mut ctx| {
                std::thread::Builder::new()
                    .name(format!("camshaft-worker-{}", ctx.id()))
                    .spawn(move || worker_loop(&mut ctx))
                    .expect("failed to spawn worker thread")
            })
            .collect();
        Self { handles }
    }

    /// Wait for every worker to exit.
    ///
    /// # Panics
    ///
    /// Panics if a worker thread panicked (a reaction body or an invariant
    /// violation).
    pub fn join(self) {
        for handle in self.handles {
            handle.join().expect("worker thread panicked");
        }
    }
}

fn worker_loop(ctx: &mut WorkerCtx) {
    while let Some(reaction) = ctx.get_ready_reaction() {
        tracing::trace!(
            worker = ctx.id(),
            reaction = %reaction.get_name(),
            "executing reaction"
        );
        reaction.trigger(ctx);
        ctx.done_with_reaction(&reaction);
    }
    tracing::debug!(worker = ctx.id(), "worker exiting");
}
