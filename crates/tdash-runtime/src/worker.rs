#![forbid(unsafe_code)]

//! Serialized execution of deferred jobs on one dedicated thread.
//!
//! Every job handed to [`Worker::submit`] runs on the worker thread, one at
//! a time, in submission order. Jobs touching terminal output are therefore
//! never interleaved with each other.
//!
//! Cancellation is cooperative. Once the [`StopSignal`] the worker was
//! started with is raised, the thread exits after the job it is currently
//! running; queued jobs that have not started are dropped unexecuted.
//! [`Worker::wake`] nudges an idle thread so it notices the signal without
//! waiting for the next poll.
//!
//! A job that panics is caught and logged; the thread keeps serving the
//! queue.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crate::cancel::StopSignal;
use crate::error::SubmitError;

/// A deferred unit of work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker queue configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// `None` for an unbounded queue. With `Some(n)`, [`Worker::submit`]
    /// blocks while `n` jobs are already waiting.
    pub capacity: Option<usize>,
    /// How long an idle worker sleeps before rechecking its stop signal.
    pub stop_poll: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            stop_poll: Duration::from_millis(50),
        }
    }
}

impl WorkerConfig {
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn with_stop_poll(mut self, stop_poll: Duration) -> Self {
        self.stop_poll = stop_poll;
        self
    }
}

enum Message {
    Run(Job),
    Wake,
}

enum Queue {
    Unbounded(mpsc::Sender<Message>),
    Bounded(mpsc::SyncSender<Message>),
}

impl Queue {
    fn send(&self, msg: Message) -> Result<(), SubmitError> {
        let sent = match self {
            Queue::Unbounded(tx) => tx.send(msg).is_ok(),
            Queue::Bounded(tx) => tx.send(msg).is_ok(),
        };
        if sent { Ok(()) } else { Err(SubmitError::Closed) }
    }

    /// Non-blocking send; a full bounded queue already guarantees the
    /// thread will wake.
    fn nudge(&self) {
        match self {
            Queue::Unbounded(tx) => {
                let _ = tx.send(Message::Wake);
            }
            Queue::Bounded(tx) => match tx.try_send(Message::Wake) {
                Ok(()) | Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {}
            },
        }
    }
}

/// Handle to a running worker thread.
pub struct Worker {
    queue: Queue,
    stop: StopSignal,
    thread_id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
    executed: Arc<AtomicU64>,
}

impl Worker {
    /// Spawn the worker thread.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn start(config: WorkerConfig, stop: StopSignal) -> std::io::Result<Self> {
        let executed = Arc::new(AtomicU64::new(0));
        let (queue, rx) = match config.capacity {
            Some(n) => {
                let (tx, rx) = mpsc::sync_channel(n);
                (Queue::Bounded(tx), rx)
            }
            None => {
                let (tx, rx) = mpsc::channel();
                (Queue::Unbounded(tx), rx)
            }
        };

        let loop_stop = stop.clone();
        let loop_executed = Arc::clone(&executed);
        let handle = thread::Builder::new()
            .name("tdash-worker".into())
            .spawn(move || worker_loop(rx, loop_stop, config.stop_poll, loop_executed))?;

        tracing::debug!(capacity = ?config.capacity, "worker started");
        Ok(Self {
            queue,
            stop,
            thread_id: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
            executed,
        })
    }

    /// Queue `job` behind everything already submitted.
    ///
    /// Blocks while a bounded queue is full.
    ///
    /// # Errors
    ///
    /// [`SubmitError::Closed`] once the worker has been cancelled; the job
    /// is dropped without running.
    pub fn submit(&self, job: Job) -> Result<(), SubmitError> {
        if self.stop.is_stopped() {
            return Err(SubmitError::Closed);
        }
        self.queue.send(Message::Run(job))
    }

    /// Wake an idle worker so it rechecks its stop signal immediately.
    pub fn wake(&self) {
        self.queue.nudge();
    }

    /// Wait for the worker thread to exit.
    ///
    /// A no-op when called from the worker thread itself, or when the
    /// thread was already joined.
    pub fn join(&self) {
        if self.is_worker_thread() {
            return;
        }
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
            crate::debug_trace!("worker joined: executed={}", self.executed());
        }
    }

    /// Whether the caller is running on the worker thread.
    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Jobs that have finished running, including ones that panicked.
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("cancelled", &self.is_cancelled())
            .field("executed", &self.executed())
            .finish()
    }
}

fn worker_loop(
    rx: mpsc::Receiver<Message>,
    stop: StopSignal,
    poll: Duration,
    executed: Arc<AtomicU64>,
) {
    crate::debug_trace!("worker loop started");
    #[cfg(not(target_arch = "wasm32"))]
    tdash_core::terminal_session::recover_panics_on_this_thread();
    loop {
        if stop.is_stopped() {
            break;
        }
        match rx.recv_timeout(poll) {
            Ok(Message::Run(job)) => {
                // Cancellation may have landed while this job was queued.
                if stop.is_stopped() {
                    break;
                }
                run_job(job);
                executed.fetch_add(1, Ordering::AcqRel);
            }
            Ok(Message::Wake) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    crate::debug_trace!("worker loop exited");
}

fn run_job(job: Job) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        tracing::warn!(reason = panic_reason(&*payload), "deferred job panicked");
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
