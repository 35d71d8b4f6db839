//! End-to-end scheduler scenarios driving real worker threads.

use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    sync::Arc,
    time::Duration,
};

use camshaft_runtime::{
    Config, Reaction, ReactionFn, ReactionIndex, Scheduler, StepClock, Tag, WorkerCtx,
    WorkerPool,
};

/// Stop after the first quiescence: every scenario below runs at a single
/// tag.
fn one_tag_clock() -> Box<StepClock> {
    Box::new(StepClock::new(Tag::new(Duration::ZERO, 1)))
}

fn reaction(name: &str, level: u16, chain_id: u64, body: impl ReactionFn + 'static) -> Arc<Reaction> {
    Arc::new(Reaction::new(
        name,
        ReactionIndex::from_level(level),
        chain_id,
        Box::new(body),
    ))
}

fn run_to_completion(workers: usize, reactions: &[Arc<Reaction>]) {
    let sched = Arc::new(
        Scheduler::new(Config::default().with_workers(workers), one_tag_clock()).unwrap(),
    );
    for r in reactions {
        sched.trigger_reaction(Arc::clone(r));
    }
    let pool = WorkerPool::spawn(&sched);
    pool.join();
}

#[test_log::test]
fn single_worker_runs_in_level_order() {
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let (log_a, log_b) = (Arc::clone(&log), Arc::clone(&log));

    run_to_completion(
        1,
        &[
            reaction("a", 0, 0b1, move |_: &mut WorkerCtx| log_a.lock().push("a")),
            reaction("b", 1, 0b1, move |_: &mut WorkerCtx| log_b.lock().push("b")),
        ],
    );

    assert_eq!(*log.lock(), ["a", "b"]);
}

#[test_log::test]
fn downstream_trigger_executes_at_the_same_tag() {
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let log_b = Arc::clone(&log);
    let b = reaction("b", 1, 0b1, move |_: &mut WorkerCtx| log_b.lock().push("b"));

    let log_a = Arc::clone(&log);
    let a = reaction("a", 0, 0b1, move |ctx: &mut WorkerCtx| {
        log_a.lock().push("a");
        ctx.trigger_reaction(Arc::clone(&b));
    });

    run_to_completion(1, &[a]);

    assert_eq!(*log.lock(), ["a", "b"]);
}

#[test_log::test]
fn upstream_retires_before_overlapping_downstream_starts() {
    let a_done = Arc::new(AtomicBool::new(false));
    let observed = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let flag = Arc::clone(&a_done);
    let a = reaction("a", 0, 0b11, move |_: &mut WorkerCtx| {
        // Linger so that an (incorrect) early dispatch of b or c would
        // overlap with us.
        std::thread::sleep(Duration::from_millis(30));
        flag.store(true, Ordering::Release);
    });

    let (flag_b, seen_b) = (Arc::clone(&a_done), Arc::clone(&observed));
    let b = reaction("b", 1, 0b01, move |_: &mut WorkerCtx| {
        seen_b.lock().push(("b", flag_b.load(Ordering::Acquire)));
    });
    let (flag_c, seen_c) = (Arc::clone(&a_done), Arc::clone(&observed));
    let c = reaction("c", 1, 0b10, move |_: &mut WorkerCtx| {
        seen_c.lock().push(("c", flag_c.load(Ordering::Acquire)));
    });

    run_to_completion(2, &[a, b, c]);

    let observed = observed.lock();
    assert_eq!(observed.len(), 2);
    for (name, saw_a_done) in observed.iter() {
        assert!(*saw_a_done, "{name} started before a was retired");
    }
}

#[test_log::test]
fn disjoint_chains_run_concurrently() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let workers_used = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let mk = |_name: &'static str| {
        let in_flight = Arc::clone(&in_flight);
        let max_in_flight = Arc::clone(&max_in_flight);
        let workers_used = Arc::clone(&workers_used);
        move |ctx: &mut WorkerCtx| {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_in_flight.fetch_max(now, Ordering::SeqCst);
            workers_used.lock().push(ctx.id());
            std::thread::sleep(Duration::from_millis(30));
            in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    };

    run_to_completion(2, &[reaction("a", 0, 0b01, mk("a")), reaction("b", 0, 0b10, mk("b"))]);

    assert_eq!(max_in_flight.load(Ordering::SeqCst), 2, "reactions were serialized");
    let workers_used = workers_used.lock();
    assert_eq!(workers_used.len(), 2);
    assert_ne!(workers_used[0], workers_used[1]);
}

#[test_log::test]
fn stop_tag_terminates_every_worker() {
    // No reactions at all: the first quiescence reaches the stop tag and
    // every worker's next poll returns none. Joining is the proof.
    run_to_completion(2, &[]);
}

/// Deterministic xorshift, to vary chains without an RNG dependency.
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }
}

#[test_log::test]
fn precedence_holds_under_load() {
    const N: usize = 48;

    let mut rng = XorShift(0x5eed);
    let meta: Arc<Vec<(u16, u64)>> = Arc::new(
        (0..N)
            .map(|i| {
                let level = (i % 6) as u16;
                let chain_id = (1 << (rng.next() % 8)) | (1 << (rng.next() % 8));
                (level, chain_id)
            })
            .collect(),
    );
    let done: Arc<Vec<AtomicBool>> = Arc::new((0..N).map(|_| AtomicBool::new(false)).collect());
    let violations = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let reactions: Vec<_> = (0..N)
        .map(|i| {
            let (level, chain_id) = meta[i];
            let meta = Arc::clone(&meta);
            let done = Arc::clone(&done);
            let violations = Arc::clone(&violations);
            let completed = Arc::clone(&completed);
            reaction(&format!("r{i}"), level, chain_id, move |_: &mut WorkerCtx| {
                // Every upstream with an overlapping chain must have been
                // retired before we were allowed to start.
                for (j, &(other_level, other_chain)) in meta.iter().enumerate() {
                    if other_level < level
                        && other_chain & chain_id != 0
                        && !done[j].load(Ordering::Acquire)
                    {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                }
                done[i].store(true, Ordering::Release);
                completed.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    run_to_completion(4, &reactions);

    assert_eq!(completed.load(Ordering::SeqCst), N);
    assert_eq!(violations.load(Ordering::SeqCst), 0);
}
