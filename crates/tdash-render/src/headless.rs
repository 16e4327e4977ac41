#![forbid(unsafe_code)]

//! In-memory terminal driver for tests and headless runs.
//!
//! [`HeadlessDriver`] keeps a back buffer (what `set_cell` wrote) and a front
//! buffer (what the last `flush` made visible), and counts every lifecycle
//! call. A cloneable [`HeadlessHandle`] reads that state, resizes the fake
//! terminal and injects input, even after the driver itself has been moved
//! into a session.
//!
//! ```
//! use tdash_core::driver::TerminalDriver;
//! use tdash_core::attribute::Attribute;
//! use tdash_render::headless::HeadlessDriver;
//!
//! let mut term = HeadlessDriver::new(4, 1);
//! let handle = term.handle();
//! term.set_cell(0, 0, 'h', Attribute::DEFAULT, Attribute::DEFAULT).unwrap();
//! assert_eq!(handle.front_row(0), "    ");
//! term.flush().unwrap();
//! assert_eq!(handle.front_row(0), "h   ");
//! ```

use std::io;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tdash_core::attribute::Attribute;
use tdash_core::driver::{InputSource, TerminalDriver};
use tdash_core::event::Event;

use crate::cell::Cell;
use crate::screen::Screen;

#[derive(Debug)]
struct State {
    back: Screen,
    front: Screen,
    writes: Vec<(u16, u16, char)>,
    init_calls: usize,
    shutdown_calls: usize,
    flush_calls: usize,
    clear_calls: usize,
    size_queries: usize,
    fail_init: bool,
    fail_writes: bool,
}

/// Inspection and control handle for a [`HeadlessDriver`].
#[derive(Debug, Clone)]
pub struct HeadlessHandle {
    state: Arc<Mutex<State>>,
    input: mpsc::Sender<Event>,
}

impl HeadlessHandle {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `init` fail with an I/O error.
    pub fn fail_init(&self, fail: bool) {
        self.state().fail_init = fail;
    }

    /// Make every `set_cell` fail with an I/O error.
    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Change the fake terminal's size and deliver a resize event, the way a
    /// real terminal reports a window change.
    pub fn resize(&self, width: u16, height: u16) {
        {
            let mut state = self.state();
            state.back.resize(width, height);
            state.front.resize(width, height);
        }
        self.push_event(Event::Resize { width, height });
    }

    /// Change the size without delivering an event.
    pub fn resize_silently(&self, width: u16, height: u16) {
        let mut state = self.state();
        state.back.resize(width, height);
        state.front.resize(width, height);
    }

    /// Queue an input event for the driver's input source.
    pub fn push_event(&self, event: Event) {
        let _ = self.input.send(event);
    }

    pub fn size(&self) -> (u16, u16) {
        let state = self.state();
        (state.back.width, state.back.height)
    }

    /// Visible cell at `(x, y)`; blank when out of bounds.
    pub fn front_cell(&self, x: u16, y: u16) -> Cell {
        self.state().front.get(x, y)
    }

    pub fn front_char(&self, x: u16, y: u16) -> char {
        self.front_cell(x, y).ch
    }

    /// Visible row `y` as a string.
    pub fn front_row(&self, y: u16) -> String {
        self.state().front.row(y)
    }

    /// Not-yet-flushed cell at `(x, y)`.
    pub fn back_cell(&self, x: u16, y: u16) -> Cell {
        self.state().back.get(x, y)
    }

    /// Every `set_cell` call so far, in order, including out-of-bounds ones.
    pub fn writes(&self) -> Vec<(u16, u16, char)> {
        self.state().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state().writes.clear();
    }

    pub fn init_calls(&self) -> usize {
        self.state().init_calls
    }

    pub fn shutdown_calls(&self) -> usize {
        self.state().shutdown_calls
    }

    pub fn flush_calls(&self) -> usize {
        self.state().flush_calls
    }

    pub fn clear_calls(&self) -> usize {
        self.state().clear_calls
    }

    pub fn size_queries(&self) -> usize {
        self.state().size_queries
    }
}

/// A terminal driver backed by memory.
#[derive(Debug)]
pub struct HeadlessDriver {
    handle: HeadlessHandle,
    input: Option<mpsc::Receiver<Event>>,
}

impl HeadlessDriver {
    pub fn new(width: u16, height: u16) -> Self {
        let (tx, rx) = mpsc::channel();
        let state = State {
            back: Screen::new(width, height),
            front: Screen::new(width, height),
            writes: Vec::new(),
            init_calls: 0,
            shutdown_calls: 0,
            flush_calls: 0,
            clear_calls: 0,
            size_queries: 0,
            fail_init: false,
            fail_writes: false,
        };
        Self {
            handle: HeadlessHandle {
                state: Arc::new(Mutex::new(state)),
                input: tx,
            },
            input: Some(rx),
        }
    }

    /// A handle that stays valid after the driver is moved.
    pub fn handle(&self) -> HeadlessHandle {
        self.handle.clone()
    }

    pub fn back_cell(&self, x: u16, y: u16) -> Cell {
        self.handle.back_cell(x, y)
    }

    pub fn back_char(&self, x: u16, y: u16) -> char {
        self.back_cell(x, y).ch
    }

    /// Not-yet-flushed row `y` as a string.
    pub fn back_row(&self, y: u16) -> String {
        self.handle.state().back.row(y)
    }
}

impl TerminalDriver for HeadlessDriver {
    fn init(&mut self) -> io::Result<()> {
        let mut state = self.handle.state();
        if state.fail_init {
            return Err(io::Error::other("headless terminal refused initialization"));
        }
        state.init_calls += 1;
        Ok(())
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.handle.state().shutdown_calls += 1;
        Ok(())
    }

    fn size(&mut self) -> io::Result<(u16, u16)> {
        let mut state = self.handle.state();
        state.size_queries += 1;
        Ok((state.back.width, state.back.height))
    }

    fn set_cell(
        &mut self,
        x: u16,
        y: u16,
        glyph: char,
        fg: Attribute,
        bg: Attribute,
    ) -> io::Result<()> {
        let mut state = self.handle.state();
        if state.fail_writes {
            return Err(io::Error::other("headless write failure"));
        }
        state.writes.push((x, y, glyph));
        state.back.set(x, y, Cell::new(glyph, fg, bg));
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.handle.state();
        state.flush_calls += 1;
        let cells = state.back.cells.clone();
        state.front.cells = cells;
        Ok(())
    }

    fn clear(&mut self, fg: Attribute, bg: Attribute) -> io::Result<()> {
        let mut state = self.handle.state();
        state.clear_calls += 1;
        state.back.cells.fill(Cell::new(' ', fg, bg));
        Ok(())
    }

    fn input_source(&mut self) -> Box<dyn InputSource> {
        // A second caller gets a source that never yields.
        let rx = self.input.take().unwrap_or_else(|| mpsc::channel().1);
        Box::new(HeadlessInput { rx })
    }
}

struct HeadlessInput {
    rx: mpsc::Receiver<Event>,
}

impl InputSource for HeadlessInput {
    fn poll_event(&mut self, timeout: Duration) -> io::Result<Option<Event>> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_invisible_until_flush() {
        let mut term = HeadlessDriver::new(3, 1);
        let handle = term.handle();
        term.set_cell(1, 0, 'x', Attribute::DEFAULT, Attribute::DEFAULT)
            .unwrap();
        assert_eq!(handle.front_row(0), "   ");
        term.flush().unwrap();
        assert_eq!(handle.front_row(0), " x ");
        assert_eq!(handle.flush_calls(), 1);
    }

    #[test]
    fn out_of_bounds_writes_are_logged_not_stored() {
        let mut term = HeadlessDriver::new(2, 2);
        term.set_cell(9, 9, 'z', Attribute::DEFAULT, Attribute::DEFAULT)
            .unwrap();
        assert_eq!(term.handle().writes(), vec![(9, 9, 'z')]);
        assert_eq!(term.back_row(0), "  ");
    }

    #[test]
    fn resize_preserves_overlap_and_reports_event() {
        let mut term = HeadlessDriver::new(2, 1);
        let handle = term.handle();
        term.set_cell(0, 0, 'a', Attribute::DEFAULT, Attribute::DEFAULT)
            .unwrap();
        handle.resize(4, 2);
        assert_eq!(term.size().unwrap(), (4, 2));
        assert_eq!(term.back_row(0), "a   ");

        let mut input = term.input_source();
        let event = input.poll_event(Duration::from_millis(10)).unwrap();
        assert_eq!(
            event,
            Some(Event::Resize {
                width: 4,
                height: 2
            })
        );
    }

    #[test]
    fn fail_init_is_reported() {
        let mut term = HeadlessDriver::new(1, 1);
        term.handle().fail_init(true);
        assert!(term.init().is_err());
        assert_eq!(term.handle().init_calls(), 0);
    }

    #[test]
    fn clear_resets_back_buffer() {
        let mut term = HeadlessDriver::new(2, 1);
        term.set_cell(0, 0, 'q', Attribute::DEFAULT, Attribute::DEFAULT)
            .unwrap();
        term.clear(Attribute::DEFAULT, Attribute::DEFAULT).unwrap();
        assert_eq!(term.back_row(0), "  ");
        assert_eq!(term.handle().clear_calls(), 1);
    }
}
