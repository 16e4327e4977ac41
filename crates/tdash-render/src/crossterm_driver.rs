#![forbid(unsafe_code)]

//! Native terminal driver built on Crossterm.
//!
//! `set_cell` only touches an in-memory back buffer. `flush` compares it with
//! a front buffer holding what the terminal currently shows and emits just
//! the changed cells, tracking cursor position and the active style so that
//! repeated runs of one style cost a single SGR sequence.

use std::io::{self, BufWriter, Stdout, Write};
use std::time::Duration;

use crossterm::style::{self as cs, Attribute as CtAttribute};
use crossterm::{cursor, queue, terminal};

use tdash_core::attribute::{Attribute, Color, StyleFlags};
use tdash_core::driver::{InputSource, TerminalDriver};
use tdash_core::event::Event;
use tdash_core::terminal_session::{SessionOptions, TerminalSession};

use crate::cell::Cell;
use crate::screen::Screen;

/// Size of the output write buffer (64KB).
const BUFFER_CAPACITY: usize = 64 * 1024;

/// Convert an abstract color into Crossterm's.
pub fn to_native_color(color: Color) -> cs::Color {
    match color {
        Color::Default => cs::Color::Reset,
        Color::Black => cs::Color::Black,
        Color::Red => cs::Color::DarkRed,
        Color::Green => cs::Color::DarkGreen,
        Color::Yellow => cs::Color::DarkYellow,
        Color::Blue => cs::Color::DarkBlue,
        Color::Magenta => cs::Color::DarkMagenta,
        Color::Cyan => cs::Color::DarkCyan,
        Color::White => cs::Color::Grey,
        Color::Indexed(i) => cs::Color::AnsiValue(i),
        Color::Rgb(r, g, b) => cs::Color::Rgb { r, g, b },
    }
}

/// Convert style flags into Crossterm's attribute set.
pub fn to_native_attributes(flags: StyleFlags) -> cs::Attributes {
    let mut attrs = cs::Attributes::default();
    if flags.contains(StyleFlags::BOLD) {
        attrs.set(CtAttribute::Bold);
    }
    if flags.contains(StyleFlags::UNDERLINE) {
        attrs.set(CtAttribute::Underlined);
    }
    if flags.contains(StyleFlags::REVERSE) {
        attrs.set(CtAttribute::Reverse);
    }
    attrs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pen {
    fg: Attribute,
    bg: Attribute,
}

/// A [`TerminalDriver`] writing to the process's stdout.
pub struct CrosstermDriver {
    options: SessionOptions,
    session: Option<TerminalSession>,
    back: Screen,
    /// `None` means the terminal contents are unknown and everything is
    /// repainted on the next flush.
    front: Option<Screen>,
    out: BufWriter<Stdout>,
    pen: Option<Pen>,
    cursor: Option<(u16, u16)>,
}

impl CrosstermDriver {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            session: None,
            back: Screen::new(0, 0),
            front: None,
            out: BufWriter::with_capacity(BUFFER_CAPACITY, io::stdout()),
            pen: None,
            cursor: None,
        }
    }

    fn invalidate(&mut self) {
        self.front = None;
        self.pen = None;
        self.cursor = None;
    }

    fn emit_cell(&mut self, x: u16, y: u16, cell: Cell) -> io::Result<()> {
        if self.cursor != Some((x, y)) {
            queue!(self.out, cursor::MoveTo(x, y))?;
        }
        let pen = Pen {
            fg: cell.fg,
            bg: cell.bg,
        };
        if self.pen != Some(pen) {
            queue!(
                self.out,
                cs::SetAttribute(CtAttribute::Reset),
                cs::SetAttributes(to_native_attributes(cell.fg.flags | cell.bg.flags)),
                cs::SetForegroundColor(to_native_color(cell.fg.color)),
                cs::SetBackgroundColor(to_native_color(cell.bg.color)),
            )?;
            self.pen = Some(pen);
        }
        let width = cell.width();
        let ch = if width == 0 { ' ' } else { cell.ch };
        queue!(self.out, cs::Print(ch))?;
        // After a wide glyph the cursor column is terminal-dependent.
        self.cursor = (width <= 1).then(|| (x.saturating_add(1), y));
        Ok(())
    }
}

/// Cells of `back` that differ from what `front` shows, in row-major order.
///
/// The column after a wide glyph is its continuation and is never emitted.
/// When a wide glyph is replaced by a narrow one, the column it used to
/// cover is repainted even if its stored cell did not change.
fn changed_cells(front: Option<&Screen>, back: &Screen) -> Vec<(u16, u16, Cell)> {
    let mut changed = Vec::new();
    for y in 0..back.height {
        let mut continuation = false;
        let mut uncovered = false;
        for x in 0..back.width {
            if continuation {
                continuation = false;
                uncovered = false;
                continue;
            }
            let cell = back.get(x, y);
            let old = front.map(|f| f.get(x, y));
            if uncovered || old != Some(cell) {
                changed.push((x, y, cell));
            }
            uncovered = old.is_some_and(|o| o.width() == 2 && o != cell);
            continuation = cell.width() == 2;
        }
    }
    changed
}

impl Default for CrosstermDriver {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl std::fmt::Debug for CrosstermDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrosstermDriver")
            .field("options", &self.options)
            .field("live", &self.session.is_some())
            .field("size", &(self.back.width, self.back.height))
            .finish()
    }
}

impl TerminalDriver for CrosstermDriver {
    fn init(&mut self) -> io::Result<()> {
        let session = TerminalSession::new(self.options.clone())?;
        let (width, height) = terminal::size()?;
        queue!(self.out, terminal::Clear(terminal::ClearType::All))?;
        self.out.flush()?;
        self.back = Screen::new(width, height);
        self.invalidate();
        self.session = Some(session);
        tdash_core::debug!(width, height, "crossterm driver initialized");
        Ok(())
    }

    fn shutdown(&mut self) -> io::Result<()> {
        let _ = queue!(self.out, cs::SetAttribute(CtAttribute::Reset), cs::ResetColor);
        let flushed = self.out.flush();
        // Dropping the session restores cursor, screen and cooked mode.
        if self.session.take().is_some() {
            tdash_core::debug!("crossterm driver shut down");
        }
        flushed
    }

    fn size(&mut self) -> io::Result<(u16, u16)> {
        let (width, height) = terminal::size()?;
        if (width, height) != (self.back.width, self.back.height) {
            self.back.resize(width, height);
            self.invalidate();
        }
        Ok((width, height))
    }

    fn set_cell(
        &mut self,
        x: u16,
        y: u16,
        glyph: char,
        fg: Attribute,
        bg: Attribute,
    ) -> io::Result<()> {
        self.back.set(x, y, Cell::new(glyph, fg, bg));
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        let back = self.back.clone();
        let front = self
            .front
            .take()
            .filter(|f| f.width == back.width && f.height == back.height);
        for (x, y, cell) in changed_cells(front.as_ref(), &back) {
            self.emit_cell(x, y, cell)?;
        }
        self.out.flush()?;
        self.front = Some(back);
        Ok(())
    }

    fn clear(&mut self, fg: Attribute, bg: Attribute) -> io::Result<()> {
        self.back.cells.fill(Cell::new(' ', fg, bg));
        Ok(())
    }

    fn input_source(&mut self) -> Box<dyn InputSource> {
        Box::new(CrosstermInput)
    }
}

/// Reads native events through Crossterm's global event queue.
#[derive(Debug, Default)]
pub struct CrosstermInput;

impl InputSource for CrosstermInput {
    fn poll_event(&mut self, timeout: Duration) -> io::Result<Option<Event>> {
        if crossterm::event::poll(timeout)? {
            Ok(Event::from_crossterm(crossterm::event::read()?))
        } else {
            Ok(None)
        }
    }
}
