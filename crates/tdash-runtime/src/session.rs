#![forbid(unsafe_code)]

//! Session lifecycle: initialization, the running dashboard, and teardown.
//!
//! A [`Session`] owns everything a dashboard needs while it runs: the shared
//! terminal driver, the worker that serializes terminal operations, the
//! render pipeline, the event stream with its sources, the widget manager,
//! the geometry cache and the root container.
//!
//! ```text
//! Uninitialized --init--> Running --close--> Closed
//! ```
//!
//! [`Session::close`] is idempotent: the first call shuts the terminal down
//! (as a job on the worker, so it runs after every operation already
//! queued) and stops all background threads. Every other call, including
//! the one from `Drop`, waits for that teardown to finish and does nothing
//! else.
//!
//! Events are only dispatched while [`Session::run_loop`] runs. Without a
//! loop, events queue up to [`SessionConfig::event_backlog`] and newer ones
//! are dropped.
//!
//! # Example
//!
//! ```
//! use tdash_core::attribute::Attribute;
//! use tdash_core::geometry::Rect;
//! use tdash_render::buffer::Buffer;
//! use tdash_render::cell::Cell;
//! use tdash_render::headless::HeadlessDriver;
//! use tdash_runtime::session::{Session, SessionConfig};
//!
//! let term = HeadlessDriver::new(20, 5);
//! let screen = term.handle();
//! let session = Session::init(term, SessionConfig::default()).unwrap();
//!
//! let mut label = Buffer::new(Rect::new(0, 0, 5, 1));
//! label.set_string(0, 0, "hello", Attribute::DEFAULT, Attribute::DEFAULT);
//! session.render(&[&label]);
//!
//! session.close();
//! assert_eq!(&screen.front_row(0)[..5], "hello");
//! assert_eq!(screen.shutdown_calls(), 1);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tdash_core::attribute::Attribute;
use tdash_core::driver::{InputSource, SharedDriver, TerminalDriver, lock, share};
use tdash_core::geometry::Rect;
use tdash_render::buffer::Drawable;

use crate::cancel::{StopSignal, StopTrigger};
use crate::error::{InitError, SubmitError};
use crate::event_stream::{BusEvent, DEFAULT_BACKLOG, EventPayload, EventStream, RESIZE_PATH};
use crate::geometry_cache::GeometryCache;
use crate::grid::{Grid, SharedGrid};
use crate::render::{RenderJob, RenderQueue, Renderer};
use crate::source::{CustomSender, CustomSource, TerminalEvents, TimerSource};
use crate::widget_manager::WidgetManager;
use crate::worker::{Job, Worker, WorkerConfig};

/// Name under which terminal input is merged.
pub const TERMINAL_SOURCE: &str = "termbox";
pub const TIMER_SOURCE: &str = "timer";
pub const CUSTOM_SOURCE: &str = "custom";

/// Session configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Worker queue bound; `None` for unbounded.
    pub queue_capacity: Option<usize>,
    /// Period of the built-in timer source.
    pub timer_interval: Duration,
    /// Background for [`Session::clear`] and the root container.
    pub background: Attribute,
    /// Upper bound on how long input and custom sources take to notice a
    /// stop request.
    pub input_poll: Duration,
    /// Render jobs that may wait before [`Session::submit_render`] blocks.
    pub render_queue_capacity: usize,
    /// Undispatched events kept before new ones are dropped.
    pub event_backlog: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: None,
            timer_interval: Duration::from_secs(1),
            background: Attribute::DEFAULT,
            input_poll: Duration::from_millis(50),
            render_queue_capacity: 16,
            event_backlog: DEFAULT_BACKLOG,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn with_timer_interval(mut self, interval: Duration) -> Self {
        self.timer_interval = interval;
        self
    }

    #[must_use]
    pub fn with_background(mut self, background: Attribute) -> Self {
        self.background = background;
        self
    }

    #[must_use]
    pub fn with_input_poll(mut self, poll: Duration) -> Self {
        self.input_poll = poll;
        self
    }

    #[must_use]
    pub fn with_render_queue_capacity(mut self, capacity: usize) -> Self {
        self.render_queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_event_backlog(mut self, limit: usize) -> Self {
        self.event_backlog = limit;
        self
    }

    fn worker(&self) -> WorkerConfig {
        WorkerConfig {
            capacity: self.queue_capacity,
            stop_poll: self.input_poll,
        }
    }
}

/// A running dashboard.
pub struct Session {
    driver: SharedDriver,
    worker: Arc<Worker>,
    worker_stop: StopTrigger,
    renderer: Arc<Renderer>,
    render_queue: RenderQueue,
    geometry: Arc<GeometryCache>,
    body: SharedGrid,
    events: Arc<EventStream>,
    widgets: Arc<WidgetManager>,
    custom: CustomSender,
    closed: AtomicBool,
    torn_down: StopSignal,
    teardown_done: StopTrigger,
}

impl Session {
    /// Initialize `driver` and start the session.
    ///
    /// # Errors
    ///
    /// [`InitError::Driver`] if the driver refuses to initialize;
    /// [`InitError::Spawn`] if a background thread cannot be started, in
    /// which case the driver is shut down again. Either way nothing is left
    /// running.
    pub fn init(
        mut driver: impl TerminalDriver + 'static,
        config: SessionConfig,
    ) -> Result<Self, InitError> {
        driver.init().map_err(InitError::Driver)?;
        let input = driver.input_source();
        let driver = share(driver);

        match Self::start(Arc::clone(&driver), input, &config) {
            Ok(session) => {
                let (width, height) = session.geometry.cached();
                tracing::info!(width, height, "session started");
                Ok(session)
            }
            Err(err) => {
                // Threads started so far exited when their handles dropped.
                if let Err(shutdown) = lock(&driver).shutdown() {
                    tracing::warn!(error = %shutdown, "terminal shutdown after failed init");
                }
                Err(err)
            }
        }
    }

    fn start(
        driver: SharedDriver,
        input: Box<dyn InputSource>,
        config: &SessionConfig,
    ) -> Result<Self, InitError> {
        let (signal, worker_stop) = StopSignal::new();
        let worker = Arc::new(Worker::start(config.worker(), signal).map_err(InitError::Spawn)?);

        let geometry = Arc::new(GeometryCache::new());
        let (width, _) = geometry.refresh(&driver);
        let body: SharedGrid = Arc::new(RwLock::new(Grid::new(width, config.background)));

        let events = Arc::new(EventStream::with_backlog(config.event_backlog));
        let widgets = Arc::new(WidgetManager::new());
        events.handle("/", |_| {});
        {
            let body = Arc::clone(&body);
            let geometry = Arc::clone(&geometry);
            events.handle(RESIZE_PATH, move |event| {
                if let EventPayload::Resize { width, height } = event.payload {
                    body.write().unwrap_or_else(PoisonError::into_inner).width = width;
                    geometry.store(width, height);
                    tracing::debug!(width, height, "terminal resized");
                }
            });
        }
        events.set_hook(widgets.hook());

        let (custom_source, custom) = CustomSource::channel(config.input_poll);
        let merged = events
            .merge(TERMINAL_SOURCE, TerminalEvents::new(input, config.input_poll))
            .and_then(|()| events.merge(TIMER_SOURCE, TimerSource::new(config.timer_interval)))
            .and_then(|()| events.merge(CUSTOM_SOURCE, custom_source));
        if let Err(err) = merged {
            events.stop_sources();
            stop_worker(&worker, &worker_stop);
            return Err(InitError::Spawn(err));
        }

        let renderer = Arc::new(Renderer::new(
            Arc::clone(&driver),
            Arc::clone(&worker),
            config.background,
        ));
        let render_queue =
            match RenderQueue::start(Arc::clone(&renderer), config.render_queue_capacity) {
                Ok(queue) => queue,
                Err(err) => {
                    events.stop_sources();
                    stop_worker(&worker, &worker_stop);
                    return Err(InitError::Spawn(err));
                }
            };

        let (torn_down, teardown_done) = StopSignal::new();
        Ok(Self {
            driver,
            worker,
            worker_stop,
            renderer,
            render_queue,
            geometry,
            body,
            events,
            widgets,
            custom,
            closed: AtomicBool::new(false),
            torn_down,
            teardown_done,
        })
    }

    /// Composite `surfaces` in order (later ones win) and defer a flush.
    ///
    /// Returns the number of cells written.
    pub fn render<D: Drawable + ?Sized>(&self, surfaces: &[&D]) -> usize {
        self.renderer.render(surfaces)
    }

    /// Queue surfaces for the render-job loop. Blocks while the render queue
    /// is full.
    ///
    /// # Errors
    ///
    /// [`SubmitError::Closed`] once the session is closed.
    pub fn submit_render(&self, job: RenderJob) -> Result<(), SubmitError> {
        if self.is_closed() {
            return Err(SubmitError::Closed);
        }
        self.render_queue.submit(job)
    }

    /// Defer blanking the terminal with the configured background.
    pub fn clear(&self) {
        self.renderer.clear();
    }

    /// Defer blanking `rect` with background `bg`.
    pub fn clear_area(&self, rect: Rect, bg: Attribute) {
        self.renderer.clear_area(rect, bg);
    }

    /// Run `job` on the worker after everything already queued.
    ///
    /// Must not call [`width`](Self::width) or [`height`](Self::height)
    /// while holding the driver lock.
    ///
    /// # Errors
    ///
    /// [`SubmitError::Closed`] once the session is closed.
    pub fn defer(&self, job: impl FnOnce() + Send + 'static) -> Result<(), SubmitError> {
        self.worker.submit(Box::new(job))
    }

    /// Current terminal width, queried now.
    pub fn width(&self) -> u16 {
        self.geometry.width(&self.driver)
    }

    /// Current terminal height, queried now.
    pub fn height(&self) -> u16 {
        self.geometry.height(&self.driver)
    }

    /// The root container.
    pub fn body(&self) -> SharedGrid {
        Arc::clone(&self.body)
    }

    pub fn events(&self) -> &Arc<EventStream> {
        &self.events
    }

    pub fn widgets(&self) -> &Arc<WidgetManager> {
        &self.widgets
    }

    /// A sender for `/usr/...` events.
    pub fn custom_sender(&self) -> CustomSender {
        self.custom.clone()
    }

    /// The shared driver, for deferred jobs that draw directly.
    pub fn driver(&self) -> &SharedDriver {
        &self.driver
    }

    /// Dispatch events on the calling thread until
    /// [`stop_loop`](Self::stop_loop).
    pub fn run_loop(&self) {
        self.events.run_loop();
    }

    pub fn stop_loop(&self) {
        self.events.stop_loop();
    }

    /// Inject an event as if a source had produced it.
    pub fn send_event(&self, event: BusEvent) {
        self.events.send(event);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Shut the terminal down and stop every background thread.
    ///
    /// Only the first call does anything; the others block until it has
    /// finished. Safe to call from any thread, including from inside a
    /// deferred job or an event handler. A job calling `close` while another
    /// thread's teardown waits behind it returns without waiting.
    pub fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            if !self.worker.is_worker_thread() {
                self.torn_down.wait();
            }
            return;
        }
        tracing::info!("session closing");

        self.events.stop_loop();
        self.events.stop_sources();
        if self.worker.is_worker_thread() {
            // The render thread may be blocked handing a flush to this
            // worker; it exits once the worker does.
            self.render_queue.detach();
        } else {
            self.render_queue.stop();
        }

        self.shutdown_terminal();

        stop_worker(&self.worker, &self.worker_stop);
        self.teardown_done.stop();
        tracing::info!(jobs = self.worker.executed(), "session closed");
    }

    /// Cancel the worker and shut the driver down, as a job behind every
    /// operation already queued.
    fn shutdown_terminal(&self) {
        let driver = Arc::clone(&self.driver);
        let cancel = self.worker_stop.clone();
        let teardown = move || {
            // Renders check cancellation under the driver lock, so none can
            // land after the shutdown below.
            cancel.stop();
            shutdown_driver(&driver);
        };
        if self.worker.is_worker_thread() {
            // Queued jobs would never run ahead of it; shut down in place.
            teardown();
            return;
        }
        let (done_tx, done_rx) = mpsc::channel();
        let job: Job = Box::new(move || {
            teardown();
            let _ = done_tx.send(());
        });
        match self.worker.submit(job) {
            Ok(()) => {
                if done_rx.recv().is_err() {
                    // The job was dropped without running.
                    self.worker_stop.stop();
                    shutdown_driver(&self.driver);
                }
            }
            Err(SubmitError::Closed) => shutdown_driver(&self.driver),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("closed", &self.is_closed())
            .field("worker", &self.worker)
            .field("geometry", &self.geometry.cached())
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn shutdown_driver(driver: &SharedDriver) {
    if let Err(err) = lock(driver).shutdown() {
        tracing::warn!(error = %err, "terminal shutdown failed");
    }
}

fn stop_worker(worker: &Worker, trigger: &StopTrigger) {
    trigger.stop();
    worker.wake();
    worker.join();
}
