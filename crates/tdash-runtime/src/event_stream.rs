#![forbid(unsafe_code)]

//! The session event bus.
//!
//! Event sources run on their own threads and funnel [`BusEvent`]s into one
//! channel. [`EventStream::run_loop`] drains that channel on the calling
//! thread and dispatches each event to the handler registered under the
//! longest path prefix, then to the hook.
//!
//! Paths are slash-separated:
//!
//! | Path                | Payload                          |
//! |---------------------|----------------------------------|
//! | `/sys/kbd/<name>`   | [`EventPayload::Key`]            |
//! | `/sys/mouse`        | [`EventPayload::Mouse`]          |
//! | `/sys/wnd/resize`   | [`EventPayload::Resize`]         |
//! | `/sys/wnd/focus`    | [`EventPayload::Focus`]          |
//! | `/sys/paste`        | [`EventPayload::Paste`]          |
//! | `/timer/<interval>` | [`EventPayload::Tick`]           |
//! | `/usr/<path>`       | [`EventPayload::Custom`]         |
//!
//! A handler registered at `/sys/kbd` sees every key; one at `/sys/kbd/q`
//! only sees `q`, and wins over the shorter prefix.
//!
//! Events wait in the channel until a loop dispatches them. At most
//! [`DEFAULT_BACKLOG`] (or the limit given to [`EventStream::with_backlog`])
//! may wait at once; further events are dropped and counted, so a stream
//! nobody drains stays bounded.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use tdash_core::event::{Event, KeyEvent, MouseEvent};

use crate::cancel::{StopSignal, StopTrigger};
use crate::source::EventSource;

pub const KBD_PREFIX: &str = "/sys/kbd/";
pub const MOUSE_PATH: &str = "/sys/mouse";
pub const RESIZE_PATH: &str = "/sys/wnd/resize";
pub const FOCUS_PATH: &str = "/sys/wnd/focus";
pub const PASTE_PATH: &str = "/sys/paste";
pub const TIMER_PREFIX: &str = "/timer/";
pub const USER_PREFIX: &str = "/usr/";

/// Events that may wait undispatched before new ones are dropped.
pub const DEFAULT_BACKLOG: usize = 1024;

/// What an event carries.
#[derive(Debug, Clone)]
pub enum EventPayload {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize { width: u16, height: u16 },
    Focus(bool),
    Paste(String),
    /// The `count`th tick of a timer, starting at 1.
    Tick { count: u64 },
    Custom(Arc<dyn Any + Send + Sync>),
}

/// An event travelling over the bus.
#[derive(Debug, Clone)]
pub struct BusEvent {
    /// Name of the source that produced it.
    pub from: String,
    pub path: String,
    pub payload: EventPayload,
    pub time: Instant,
}

impl BusEvent {
    pub fn new(from: impl Into<String>, path: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            from: from.into(),
            path: path.into(),
            payload,
            time: Instant::now(),
        }
    }

    /// Translate a terminal input event into its bus form.
    pub fn from_terminal(from: impl Into<String>, event: Event) -> Self {
        let (path, payload) = match event {
            Event::Key(key) => (format!("{KBD_PREFIX}{}", key.name()), EventPayload::Key(key)),
            Event::Mouse(mouse) => (MOUSE_PATH.to_owned(), EventPayload::Mouse(mouse)),
            Event::Resize { width, height } => (
                RESIZE_PATH.to_owned(),
                EventPayload::Resize { width, height },
            ),
            Event::Focus(gained) => (FOCUS_PATH.to_owned(), EventPayload::Focus(gained)),
            Event::Paste(text) => (PASTE_PATH.to_owned(), EventPayload::Paste(text)),
        };
        Self::new(from, path, payload)
    }

    /// Downcast a custom payload.
    pub fn custom<T: Any + Send + Sync>(&self) -> Option<&T> {
        match &self.payload {
            EventPayload::Custom(data) => data.downcast_ref::<T>(),
            _ => None,
        }
    }
}

/// Path of the tick events a timer with `interval` produces.
///
/// Whole seconds print as `1s`, whole milliseconds as `250ms`, anything
/// finer in microseconds.
pub fn timer_path(interval: Duration) -> String {
    let nanos = interval.as_nanos();
    if nanos != 0 && nanos % 1_000_000_000 == 0 {
        format!("{TIMER_PREFIX}{}s", interval.as_secs())
    } else if nanos % 1_000_000 == 0 {
        format!("{TIMER_PREFIX}{}ms", interval.as_millis())
    } else {
        format!("{TIMER_PREFIX}{}us", interval.as_micros())
    }
}

/// Path of a user event; a leading slash on `path` is ignored.
pub fn user_path(path: &str) -> String {
    format!("{USER_PREFIX}{}", path.trim_start_matches('/'))
}

/// Whether `pattern` is a path-segment prefix of `path`.
///
/// `/sys/kbd` matches `/sys/kbd/q` but not `/sys/kbdx`.
pub fn path_matches(pattern: &str, path: &str) -> bool {
    let pattern = pattern.trim_end_matches('/');
    if pattern.is_empty() {
        return path.starts_with('/');
    }
    match path.strip_prefix(pattern) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Pick the longest pattern matching `path`.
pub fn longest_match<'a, I>(patterns: I, path: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    patterns
        .into_iter()
        .filter(|p| path_matches(p, path))
        .max_by_key(|p| p.trim_end_matches('/').len())
}

/// An event callback.
pub type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

struct Backlog {
    limit: usize,
    pending: AtomicUsize,
    dropped: AtomicU64,
}

impl Backlog {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            pending: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Reserve a slot, or count the event as dropped.
    fn admit(&self) -> bool {
        let admitted = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .is_ok();
        if !admitted && self.dropped.fetch_add(1, Ordering::Relaxed) == 0 {
            tracing::warn!(
                limit = self.limit,
                "event backlog full; dropping events until a loop drains it"
            );
        }
        admitted
    }

    fn release(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Queue `event` if the backlog has room. `false` only when the receiving
/// end is gone; a dropped event still counts as delivered.
fn enqueue(tx: &mpsc::Sender<Envelope>, backlog: &Backlog, event: BusEvent) -> bool {
    if !backlog.admit() {
        return true;
    }
    if tx.send(Envelope::Event(event)).is_err() {
        backlog.release();
        return false;
    }
    true
}

/// Sending half handed to an [`EventSource`]. Stamps every event with the
/// source's name.
#[derive(Clone)]
pub struct Emitter {
    name: Arc<str>,
    tx: mpsc::Sender<Envelope>,
    backlog: Arc<Backlog>,
}

impl Emitter {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publish an event. Returns `false` once the stream is gone.
    pub fn emit(&self, path: impl Into<String>, payload: EventPayload) -> bool {
        let event = BusEvent::new(&*self.name, path, payload);
        enqueue(&self.tx, &self.backlog, event)
    }

    /// Publish a translated terminal event.
    pub fn emit_terminal(&self, event: Event) -> bool {
        let event = BusEvent::from_terminal(&*self.name, event);
        enqueue(&self.tx, &self.backlog, event)
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter").field("name", &self.name).finish()
    }
}

enum Envelope {
    Event(BusEvent),
    StopLoop,
}

struct RunningSource {
    name: String,
    trigger: StopTrigger,
    thread: Option<thread::JoinHandle<()>>,
}

impl RunningSource {
    fn stop(mut self) {
        self.trigger.stop();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        tracing::debug!(source = %self.name, "event source stopped");
    }
}

/// Merged event sources plus path-routed dispatch.
pub struct EventStream {
    tx: mpsc::Sender<Envelope>,
    rx: Mutex<mpsc::Receiver<Envelope>>,
    backlog: Arc<Backlog>,
    handlers: RwLock<BTreeMap<String, Handler>>,
    hook: RwLock<Option<Handler>>,
    sources: Mutex<Vec<RunningSource>>,
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStream {
    pub fn new() -> Self {
        Self::with_backlog(DEFAULT_BACKLOG)
    }

    /// A stream holding at most `limit` undispatched events.
    pub fn with_backlog(limit: usize) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            backlog: Arc::new(Backlog::new(limit)),
            handlers: RwLock::new(BTreeMap::new()),
            hook: RwLock::new(None),
            sources: Mutex::new(Vec::new()),
        }
    }

    /// Start `source` on its own thread, feeding this stream.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn merge(&self, name: &str, source: impl EventSource) -> std::io::Result<()> {
        let (signal, trigger) = StopSignal::new();
        let emitter = Emitter {
            name: Arc::from(name),
            tx: self.tx.clone(),
            backlog: Arc::clone(&self.backlog),
        };
        let boxed: Box<dyn EventSource> = Box::new(source);
        let thread = thread::Builder::new()
            .name(format!("tdash-src-{name}"))
            .spawn(move || boxed.run(emitter, signal))?;

        crate::debug_trace!("event source started: {}", name);
        tracing::debug!(source = name, "event source started");
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RunningSource {
                name: name.to_owned(),
                trigger,
                thread: Some(thread),
            });
        Ok(())
    }

    /// Stop and join every merged source.
    pub fn stop_sources(&self) {
        let sources: Vec<_> = self
            .sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for source in sources {
            source.stop();
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Register `handler` for `path` and everything below it, replacing any
    /// handler already there.
    pub fn handle(&self, path: &str, handler: impl Fn(&BusEvent) + Send + Sync + 'static) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_owned(), Arc::new(handler));
    }

    pub fn remove_handler(&self, path: &str) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
            .is_some()
    }

    /// Install the hook that sees every event after its handler.
    pub fn set_hook(&self, hook: Handler) {
        *self.hook.write().unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    /// Inject an event as if a source had produced it.
    pub fn send(&self, event: BusEvent) {
        enqueue(&self.tx, &self.backlog, event);
    }

    /// Events queued and not yet dispatched.
    pub fn pending(&self) -> usize {
        self.backlog.pending.load(Ordering::Acquire)
    }

    /// Events discarded because the backlog was full.
    pub fn dropped(&self) -> u64 {
        self.backlog.dropped.load(Ordering::Relaxed)
    }

    /// Dispatch one event synchronously on the calling thread.
    pub fn dispatch(&self, event: &BusEvent) {
        let handler = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            longest_match(handlers.keys().map(String::as_str), &event.path)
                .and_then(|p| handlers.get(p))
                .cloned()
        };
        let hook = self
            .hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match handler {
            Some(handler) => handler(event),
            None => tracing::trace!(path = %event.path, "no handler for event"),
        }
        if let Some(hook) = hook {
            hook(event);
        }
    }

    /// Dispatch events until [`stop_loop`](Self::stop_loop) is called.
    ///
    /// Only one loop runs at a time; a second caller waits for the first to
    /// return.
    pub fn run_loop(&self) {
        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!("event loop started");
        while let Ok(envelope) = rx.recv() {
            match envelope {
                Envelope::Event(event) => {
                    self.backlog.release();
                    self.dispatch(&event);
                }
                Envelope::StopLoop => break,
            }
        }
        tracing::debug!("event loop stopped");
    }

    /// Make the running (or next) [`run_loop`](Self::run_loop) return after
    /// the events already queued ahead of this request.
    pub fn stop_loop(&self) {
        let _ = self.tx.send(Envelope::StopLoop);
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        f.debug_struct("EventStream")
            .field("handlers", &handlers)
            .field("sources", &self.source_count())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.stop_sources();
    }
}
