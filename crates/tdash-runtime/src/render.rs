#![forbid(unsafe_code)]

//! The render pipeline.
//!
//! [`Renderer::render`] composites surfaces onto the driver's back buffer on
//! the calling thread, under the driver lock, then defers one flush onto the
//! worker. Surfaces are painted left to right and a later surface overwrites
//! any cell an earlier one wrote. Cells outside a surface's bounding
//! rectangle are never written.
//!
//! [`RenderQueue`] is the asynchronous entry point: a thread that drains
//! queued render jobs and hands each to the same [`Renderer`].

use std::io;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tdash_core::attribute::Attribute;
use tdash_core::driver::{SharedDriver, TerminalDriver, lock};
use tdash_core::geometry::Rect;
use tdash_render::buffer::{Buffer, Drawable};
use tdash_render::composite;

use crate::error::SubmitError;
use crate::worker::Worker;

/// Surfaces composited together by the render-job loop.
pub type RenderJob = Vec<Box<dyn Drawable + Send>>;

pub struct Renderer {
    driver: SharedDriver,
    worker: Arc<Worker>,
    background: Attribute,
}

impl Renderer {
    /// `background` is what [`clear`](Self::clear) paints with.
    pub fn new(driver: SharedDriver, worker: Arc<Worker>, background: Attribute) -> Self {
        Self {
            driver,
            worker,
            background,
        }
    }

    /// Composite `surfaces` and defer a flush.
    ///
    /// Returns the number of cells written. A write error abandons the rest
    /// of that surface only.
    pub fn render<D: Drawable + ?Sized>(&self, surfaces: &[&D]) -> usize {
        let buffers: Vec<Buffer> = surfaces.iter().map(|s| s.buffer()).collect();
        let mut written = 0;
        {
            let mut driver = lock(&self.driver);
            // Checked under the lock: teardown cancels before shutting down.
            if self.worker.is_cancelled() {
                tracing::debug!("worker closed; render dropped");
                return 0;
            }
            for buf in &buffers {
                match composite::paint(&mut **driver, buf) {
                    Ok(n) => written += n,
                    Err(err) => tracing::warn!(error = %err, "cell write failed"),
                }
            }
        }
        tracing::trace!(surfaces = buffers.len(), cells = written, "rendered");
        self.defer_io("flush", |driver| driver.flush());
        written
    }

    /// Defer blanking the whole terminal with the configured background.
    pub fn clear(&self) {
        let bg = self.background;
        self.defer_io("clear", move |driver| {
            driver.clear(Attribute::DEFAULT, bg)?;
            driver.flush()
        });
    }

    /// Defer blanking `rect` with background `bg`.
    pub fn clear_area(&self, rect: Rect, bg: Attribute) {
        self.defer_io("clear_area", move |driver| {
            composite::fill_area(driver, rect, bg)?;
            driver.flush()
        });
    }

    pub fn background(&self) -> Attribute {
        self.background
    }

    fn defer_io<F>(&self, op: &'static str, f: F)
    where
        F: FnOnce(&mut dyn TerminalDriver) -> io::Result<()> + Send + 'static,
    {
        let driver = Arc::clone(&self.driver);
        let job = Box::new(move || {
            let mut guard = lock(&driver);
            if let Err(err) = f(&mut **guard) {
                tracing::warn!(op, error = %err, "deferred terminal operation failed");
            }
        });
        if self.worker.submit(job).is_err() {
            tracing::debug!(op, "worker closed; terminal operation dropped");
        }
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("worker", &self.worker)
            .field("background", &self.background)
            .finish_non_exhaustive()
    }
}

/// Thread draining queued [`RenderJob`]s into a [`Renderer`].
pub struct RenderQueue {
    tx: Mutex<Option<mpsc::SyncSender<RenderJob>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RenderQueue {
    /// Start the loop. [`submit`](Self::submit) blocks once `capacity` jobs
    /// are waiting.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn start(renderer: Arc<Renderer>, capacity: usize) -> io::Result<Self> {
        let (tx, rx) = mpsc::sync_channel::<RenderJob>(capacity);
        let handle = thread::Builder::new()
            .name("tdash-render".into())
            .spawn(move || {
                crate::debug_trace!("render loop started");
                let mut jobs: u64 = 0;
                for job in rx {
                    let surfaces: Vec<&Box<dyn Drawable + Send>> = job.iter().collect();
                    renderer.render(&surfaces);
                    jobs += 1;
                }
                crate::debug_trace!("render loop exited: jobs={}", jobs);
            })?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue a job behind those already waiting.
    ///
    /// # Errors
    ///
    /// [`SubmitError::Closed`] after [`stop`](Self::stop).
    pub fn submit(&self, job: RenderJob) -> Result<(), SubmitError> {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SubmitError::Closed)?;
        tx.send(job).map_err(|_| SubmitError::Closed)
    }

    /// Stop accepting jobs and let the thread exit on its own once the jobs
    /// already queued have been handed to the renderer.
    pub fn detach(&self) {
        drop(self.tx.lock().unwrap_or_else(PoisonError::into_inner).take());
        drop(
            self.handle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
    }

    /// Stop accepting jobs, let queued ones finish, and join the thread.
    pub fn stop(&self) {
        drop(self.tx.lock().unwrap_or_else(PoisonError::into_inner).take());
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for RenderQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let open = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        f.debug_struct("RenderQueue").field("open", &open).finish()
    }
}

impl Drop for RenderQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::{StopSignal, StopTrigger};
    use crate::worker::WorkerConfig;
    use std::time::Duration;
    use tdash_core::attribute::Color;
    use tdash_core::driver::share;
    use tdash_render::cell::Cell;
    use tdash_render::headless::{HeadlessDriver, HeadlessHandle};

    struct Fixture {
        renderer: Arc<Renderer>,
        worker: Arc<Worker>,
        handle: HeadlessHandle,
        _trigger: StopTrigger,
    }

    fn fixture(width: u16, height: u16) -> Fixture {
        let term = HeadlessDriver::new(width, height);
        let handle = term.handle();
        let (signal, trigger) = StopSignal::new();
        let worker = Arc::new(Worker::start(WorkerConfig::default(), signal).unwrap());
        let renderer = Arc::new(Renderer::new(
            share(term),
            Arc::clone(&worker),
            Attribute::new(Color::Blue),
        ));
        Fixture {
            renderer,
            worker,
            handle,
            _trigger: trigger,
        }
    }

    fn settle(worker: &Worker) {
        let (tx, rx) = mpsc::channel();
        worker
            .submit(Box::new(move || {
                let _ = tx.send(());
            }))
            .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    fn square(x: u16, y: u16, size: u16, ch: char) -> Buffer {
        Buffer::filled(Rect::new(x, y, size, size), Cell::from_char(ch))
    }

    #[test]
    fn flush_is_deferred_to_the_worker() {
        let fx = fixture(4, 1);
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        fx.worker
            .submit(Box::new(move || {
                let _ = gate_rx.recv();
            }))
            .unwrap();

        fx.renderer.render(&[&square(0, 0, 1, 'x')]);
        assert_eq!(fx.handle.back_cell(0, 0).ch, 'x');
        assert_eq!(fx.handle.front_row(0), "    ");

        gate_tx.send(()).unwrap();
        settle(&fx.worker);
        assert_eq!(fx.handle.front_row(0), "x   ");
        assert_eq!(fx.handle.flush_calls(), 1);
    }

    #[test]
    fn later_surfaces_win() {
        let fx = fixture(13, 13);
        let a = square(0, 0, 5, 'A');
        let b = square(2, 2, 5, 'B');
        let c = square(10, 10, 2, 'C');
        fx.renderer.render(&[&a, &b, &c]);
        settle(&fx.worker);

        assert_eq!(fx.handle.front_char(0, 0), 'A');
        assert_eq!(fx.handle.front_char(4, 1), 'A');
        assert_eq!(fx.handle.front_char(1, 4), 'A');
        for y in 2..7 {
            for x in 2..7 {
                assert_eq!(fx.handle.front_char(x, y), 'B', "({x},{y})");
            }
        }
        for (x, y) in [(10, 10), (11, 10), (10, 11), (11, 11)] {
            assert_eq!(fx.handle.front_char(x, y), 'C');
        }
        assert_eq!(fx.handle.front_char(12, 12), ' ');
    }

    #[test]
    fn out_of_area_cells_are_never_written() {
        let fx = fixture(10, 10);
        let mut buf = square(1, 1, 2, 'i');
        buf.set(8, 8, Cell::from_char('o'));
        buf.set(0, 0, Cell::from_char('o'));
        let written = fx.renderer.render(&[&buf]);
        settle(&fx.worker);

        assert_eq!(written, 4);
        assert!(fx.handle.writes().iter().all(|&(_, _, ch)| ch == 'i'));
    }

    #[test]
    fn write_errors_are_not_fatal() {
        let fx = fixture(2, 1);
        fx.handle.fail_writes(true);
        assert_eq!(fx.renderer.render(&[&square(0, 0, 1, 'x')]), 0);
        fx.handle.fail_writes(false);
        assert_eq!(fx.renderer.render(&[&square(1, 0, 1, 'y')]), 1);
        settle(&fx.worker);
        assert_eq!(fx.handle.front_row(0), " y");
    }

    #[test]
    fn clear_uses_configured_background_and_flushes() {
        let fx = fixture(2, 1);
        fx.renderer.render(&[&square(0, 0, 1, 'x')]);
        fx.renderer.clear();
        settle(&fx.worker);
        assert_eq!(fx.handle.clear_calls(), 1);
        assert_eq!(fx.handle.flush_calls(), 2);
        assert_eq!(
            fx.handle.front_cell(0, 0),
            Cell::blank(Attribute::new(Color::Blue))
        );
    }

    #[test]
    fn clear_area_touches_only_the_rect() {
        let fx = fixture(3, 3);
        fx.renderer.render(&[&square(0, 0, 3, '#')]);
        let red = Attribute::new(Color::Red);
        fx.renderer.clear_area(Rect::new(1, 1, 1, 1), red);
        settle(&fx.worker);
        assert_eq!(fx.handle.front_cell(1, 1), Cell::blank(red));
        assert_eq!(fx.handle.front_row(0), "###");
        assert_eq!(fx.handle.front_row(1), "# #");
    }

    #[test]
    fn queue_matches_direct_render() {
        let direct = fixture(8, 8);
        let queued = fixture(8, 8);
        let surfaces = [square(0, 0, 4, 'a'), square(2, 2, 4, 'b')];

        direct.renderer.render(&[&surfaces[0], &surfaces[1]]);
        settle(&direct.worker);

        let queue = RenderQueue::start(Arc::clone(&queued.renderer), 4).unwrap();
        let job: RenderJob = surfaces
            .iter()
            .cloned()
            .map(|b| Box::new(b) as Box<dyn Drawable + Send>)
            .collect();
        queue.submit(job).unwrap();
        queue.stop();
        settle(&queued.worker);

        for y in 0..8 {
            assert_eq!(direct.handle.front_row(y), queued.handle.front_row(y));
        }
        assert_eq!(queue.submit(Vec::new()), Err(SubmitError::Closed));
    }

    #[test]
    fn render_after_cancel_writes_nothing() {
        let term = HeadlessDriver::new(2, 1);
        let handle = term.handle();
        let (signal, trigger) = StopSignal::new();
        let worker = Arc::new(Worker::start(WorkerConfig::default(), signal).unwrap());
        let renderer = Renderer::new(share(term), Arc::clone(&worker), Attribute::DEFAULT);
        trigger.stop();
        worker.wake();
        worker.join();

        assert_eq!(renderer.render(&[&square(0, 0, 1, 'x')]), 0);
        assert!(handle.writes().is_empty());
        assert_eq!(handle.back_cell(0, 0).ch, ' ');
    }

    #[test]
    fn detach_does_not_wait_for_a_blocked_job() {
        let fx = fixture(2, 1);
        let queue = RenderQueue::start(Arc::clone(&fx.renderer), 1).unwrap();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        fx.worker
            .submit(Box::new(move || {
                let _ = entered_tx.send(());
                let _ = gate_rx.recv();
            }))
            .unwrap();
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let job: RenderJob = vec![Box::new(square(0, 0, 1, 'q'))];
        queue.submit(job).unwrap();

        let start = std::time::Instant::now();
        queue.detach();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(queue.submit(Vec::new()), Err(SubmitError::Closed));

        gate_tx.send(()).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while fx.handle.flush_calls() == 0 {
            assert!(std::time::Instant::now() < deadline, "flush never ran");
            std::thread::sleep(Duration::from_millis(2));
        }
        settle(&fx.worker);
        assert_eq!(fx.handle.front_row(0), "q ");
    }
}
