//! Ordering and exclusion invariants for the worker.
//!
//! 1. Jobs from one submitter run in that submitter's order.
//! 2. The global execution order equals the order submits were accepted.
//! 3. No two jobs ever run at the same time, under concurrent submission.
//! 4. Bounded queues give the same guarantees.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use proptest::prelude::*;
use tdash_runtime::{StopSignal, StopTrigger, Worker, WorkerConfig};

fn start(config: WorkerConfig) -> (Arc<Worker>, StopTrigger) {
    let (signal, trigger) = StopSignal::new();
    let worker = Worker::start(config, signal).expect("spawn worker");
    (Arc::new(worker), trigger)
}

fn drain(worker: &Worker) {
    let (tx, rx) = mpsc::channel();
    worker
        .submit(Box::new(move || {
            let _ = tx.send(());
        }))
        .expect("submit");
    rx.recv_timeout(Duration::from_secs(10)).expect("queue drained");
}

/// Submit `per_thread` jobs from each of `threads` threads and record
/// `(thread, seq)` as they run. Acceptance order is recorded under the same
/// lock as the submit call so it can be compared with execution order.
fn hammer(
    worker: &Arc<Worker>,
    threads: usize,
    per_thread: usize,
) -> (Vec<(usize, usize)>, Vec<(usize, usize)>, usize) {
    let executed = Arc::new(Mutex::new(Vec::new()));
    let accepted = Arc::new(Mutex::new(Vec::new()));
    let running = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let worker = Arc::clone(worker);
            let executed = Arc::clone(&executed);
            let accepted = Arc::clone(&accepted);
            let running = Arc::clone(&running);
            let overlaps = Arc::clone(&overlaps);
            thread::spawn(move || {
                for seq in 0..per_thread {
                    let executed = Arc::clone(&executed);
                    let running = Arc::clone(&running);
                    let overlaps = Arc::clone(&overlaps);
                    let mut log = accepted.lock().unwrap();
                    worker
                        .submit(Box::new(move || {
                            if running.fetch_add(1, Ordering::SeqCst) != 0 {
                                overlaps.fetch_add(1, Ordering::SeqCst);
                            }
                            executed.lock().unwrap().push((t, seq));
                            running.fetch_sub(1, Ordering::SeqCst);
                        }))
                        .unwrap();
                    log.push((t, seq));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    drain(worker);

    let executed = executed.lock().unwrap().clone();
    let accepted = accepted.lock().unwrap().clone();
    (executed, accepted, overlaps.load(Ordering::SeqCst))
}

#[test]
fn concurrent_submitters_fifo_and_exclusive() {
    let (worker, _trigger) = start(WorkerConfig::default());
    let (executed, accepted, overlaps) = hammer(&worker, 8, 200);

    assert_eq!(executed.len(), 8 * 200);
    assert_eq!(executed, accepted);
    assert_eq!(overlaps, 0);
    for t in 0..8 {
        let seqs: Vec<usize> = executed
            .iter()
            .filter(|(thread, _)| *thread == t)
            .map(|(_, seq)| *seq)
            .collect();
        assert_eq!(seqs, (0..200).collect::<Vec<_>>());
    }
}

#[test]
fn bounded_queue_under_contention() {
    let (worker, _trigger) = start(WorkerConfig::default().with_capacity(4));
    let (executed, accepted, overlaps) = hammer(&worker, 4, 100);
    assert_eq!(executed, accepted);
    assert_eq!(overlaps, 0);
}

#[test]
fn cancellation_skips_the_backlog() {
    let (worker, trigger) = start(WorkerConfig::default());
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let ran = Arc::new(AtomicUsize::new(0));
    worker
        .submit(Box::new(move || {
            let _ = gate_rx.recv();
        }))
        .unwrap();
    for _ in 0..100 {
        let ran = Arc::clone(&ran);
        worker
            .submit(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
    }
    trigger.stop();
    worker.wake();
    gate_tx.send(()).unwrap();
    worker.join();
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn single_submitter_order_is_preserved(
        values in proptest::collection::vec(any::<u32>(), 0..200),
        capacity in proptest::option::of(1usize..8),
    ) {
        let config = WorkerConfig { capacity, ..WorkerConfig::default() };
        let (worker, _trigger) = start(config);
        let seen = Arc::new(Mutex::new(Vec::new()));
        for &v in &values {
            let seen = Arc::clone(&seen);
            worker.submit(Box::new(move || seen.lock().unwrap().push(v))).unwrap();
        }
        drain(&worker);
        prop_assert_eq!(&*seen.lock().unwrap(), &values);
    }
}
