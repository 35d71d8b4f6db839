use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use camshaft_core::ReactionIndex;

use crate::sched::WorkerCtx;

/// Lifecycle of a reaction within one triggering.
///
/// The only transitions that may succeed are `Inactive → Queued` (trigger),
/// `Queued → Running` (placement on a worker) and `Running → Inactive`
/// (completion), each performed by a compare-and-swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReactionStatus {
    /// Not triggered at the current tag.
    Inactive = 0,
    /// Triggered and awaiting dispatch.
    Queued = 1,
    /// Owned by a worker thread.
    Running = 2,
}

impl ReactionStatus {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Inactive,
            1 => Self::Queued,
            2 => Self::Running,
            _ => unreachable!("invalid reaction status {raw}"),
        }
    }
}

/// The body of a reaction, invoked by a worker thread. Downstream reactions
/// are triggered through the [`WorkerCtx`] passed in.
pub trait ReactionFn: Fn(&mut WorkerCtx) + Send + Sync {}
impl<F> ReactionFn for F where F: Fn(&mut WorkerCtx) + Send + Sync {}

/// A unit of work invoked at a specific tag.
///
/// Reactions are owned by the host and shared with the scheduler as
/// `Arc<Reaction>`; the scheduler's queues hold non-owning clones and use
/// pointer identity to refer to a particular reaction.
pub struct Reaction {
    name: String,
    /// Packed priority key; smaller keys run first.
    index: ReactionIndex,
    /// Two reactions may interact iff their chain masks share a bit.
    chain_id: u64,
    status: AtomicU8,
    /// Placement hint: the worker that last triggered this reaction.
    worker_affinity: AtomicUsize,
    body: Box<dyn ReactionFn>,
}

impl std::fmt::Debug for Reaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaction")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("chain_id", &format_args!("{:#b}", self.chain_id))
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Reaction {
    pub fn new(
        name: impl Into<String>,
        index: ReactionIndex,
        chain_id: u64,
        body: Box<dyn ReactionFn>,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            chain_id,
            status: AtomicU8::new(ReactionStatus::Inactive as u8),
            worker_affinity: AtomicUsize::new(0),
            body,
        }
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> ReactionIndex {
        self.index
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Topological depth of this reaction in the dependency graph.
    pub fn level(&self) -> u16 {
        self.index.level()
    }

    pub fn worker_affinity(&self) -> usize {
        self.worker_affinity.load(Ordering::Relaxed)
    }

    pub fn set_worker_affinity(&self, worker: usize) {
        self.worker_affinity.store(worker, Ordering::Relaxed);
    }

    pub fn status(&self) -> ReactionStatus {
        ReactionStatus::from_raw(self.status.load(Ordering::Acquire))
    }

    /// Attempt the status transition `from → to`. On failure the observed
    /// status is returned unchanged.
    pub fn transition(
        &self,
        from: ReactionStatus,
        to: ReactionStatus,
    ) -> Result<(), ReactionStatus> {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(ReactionStatus::from_raw)
    }

    /// `true` iff this reaction must run before `other` within a tag: it is
    /// at a strictly lower level and their chain masks overlap.
    pub fn has_precedence_over(&self, other: &Reaction) -> bool {
        self.level() < other.level() && self.chain_id & other.chain_id != 0
    }

    /// Execute the reaction body on the calling worker.
    pub fn trigger(&self, ctx: &mut WorkerCtx) {
        (self.body)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str, index: ReactionIndex, chain_id: u64) -> Reaction {
        Reaction::new(name, index, chain_id, Box::new(|_: &mut WorkerCtx| {}))
    }

    #[test]
    fn test_status_lifecycle() {
        let r = noop("r", ReactionIndex::from_level(0), 0b1);
        assert_eq!(r.status(), ReactionStatus::Inactive);

        assert!(r.transition(ReactionStatus::Inactive, ReactionStatus::Queued).is_ok());
        // A second trigger must observe `Queued` and fail.
        assert_eq!(
            r.transition(ReactionStatus::Inactive, ReactionStatus::Queued),
            Err(ReactionStatus::Queued)
        );
        assert!(r.transition(ReactionStatus::Queued, ReactionStatus::Running).is_ok());
        assert!(r.transition(ReactionStatus::Running, ReactionStatus::Inactive).is_ok());
        assert_eq!(r.status(), ReactionStatus::Inactive);
    }

    #[test]
    fn test_skipping_a_state_fails() {
        let r = noop("r", ReactionIndex::from_level(0), 0b1);
        assert_eq!(
            r.transition(ReactionStatus::Queued, ReactionStatus::Running),
            Err(ReactionStatus::Inactive)
        );
        assert_eq!(
            r.transition(ReactionStatus::Running, ReactionStatus::Inactive),
            Err(ReactionStatus::Inactive)
        );
    }

    #[test]
    fn test_precedence_predicate() {
        let upstream = noop("up", ReactionIndex::from_level(0), 0b011);
        let downstream = noop("down", ReactionIndex::from_level(2), 0b010);
        let unrelated = noop("other", ReactionIndex::from_level(2), 0b100);

        assert!(upstream.has_precedence_over(&downstream));
        // Overlap without a lower level is not precedence.
        assert!(!downstream.has_precedence_over(&upstream));
        // A lower level without chain overlap is not precedence.
        assert!(!upstream.has_precedence_over(&unrelated));
    }
}
