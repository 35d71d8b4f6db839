//! A partitioned earliest-deadline-first, non-preemptive (PEDF-NP) reaction
//! scheduler for a deterministic reactor runtime.
//!
//! At each logical instant ("tag") a set of [`Reaction`]s becomes eligible.
//! The scheduler dispatches them to a fixed pool of worker threads while
//! preserving the partial order defined by reaction levels and chain
//! identifiers, advances logical time when nothing remains to do, and
//! terminates cleanly at the stop tag.
//!
//! The scheduler is embedded: the host owns the reactions, supplies the
//! tag-advance logic through [`TagAdvancer`], and either drives workers
//! itself through [`WorkerCtx`] or lets [`WorkerPool`] spawn one OS thread
//! per worker.

#![deny(clippy::all)]

mod clock;
mod pqueue;
mod reaction;
mod sched;

pub use clock::{StepClock, TagAdvancer};
pub use pqueue::ReactionQueue;
pub use reaction::{Reaction, ReactionFn, ReactionStatus};
pub use sched::{Config, SchedError, Scheduler, WorkerCtx, WorkerId, WorkerPool};

// Re-export the core types hosts need to build reactions and clocks.
pub use camshaft_core::{ReactionIndex, Tag, Timestamp};
