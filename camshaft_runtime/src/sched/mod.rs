//! The PEDF-NP scheduler: global queues, the dispatcher round, and the
//! worker-side API.
//!
//! One dispatcher round runs at a time, executed by whichever worker wins
//! the scheduling election after failing to find work. Workers otherwise
//! execute reactions from their own ready queues, stealing one from their
//! neighbor before parking.

mod pedf;
mod pool;
mod worker;

pub use pedf::Scheduler;
pub use pool::{WorkerCtx, WorkerPool};
pub use worker::WorkerId;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of worker threads the scheduler manages.
    pub(crate) workers: usize,
    /// Initial capacity of the per-worker handoff buffers and the transfer
    /// queue.
    pub(crate) initial_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            initial_queue_capacity: 16,
        }
    }
}

impl Config {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_initial_queue_capacity(mut self, capacity: usize) -> Self {
        self.initial_queue_capacity = capacity;
        self
    }
}

/// Scheduler errors
#[derive(Debug, thiserror::Error)]
pub enum SchedError {
    #[error("scheduler requires at least one worker")]
    NoWorkers,

    #[error("initial queue capacity must be at least 1")]
    ZeroCapacity,
}
