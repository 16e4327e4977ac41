#![forbid(unsafe_code)]

//! Event sources merged into the session's [`EventStream`].
//!
//! Each source runs on a dedicated thread until its [`StopSignal`] fires or
//! the stream it feeds is dropped. Three are built in:
//!
//! - [`TerminalEvents`] polls the driver's input source (`termbox`).
//! - [`TimerSource`] ticks at a fixed interval (`timer`).
//! - [`CustomSource`] relays application events sent through a
//!   [`CustomSender`] (`custom`).
//!
//! [`EventStream`]: crate::event_stream::EventStream

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use tdash_core::driver::InputSource;

use crate::cancel::StopSignal;
use crate::event_stream::{Emitter, EventPayload, timer_path, user_path};

/// A producer of bus events.
pub trait EventSource: Send + 'static {
    /// Produce events until `stop` is raised or [`Emitter::emit`] reports
    /// the stream gone. Runs on the source's own thread.
    fn run(self: Box<Self>, emitter: Emitter, stop: StopSignal);
}

/// Ticks at a fixed interval, publishing `/timer/<interval>`.
#[derive(Debug, Clone)]
pub struct TimerSource {
    interval: Duration,
}

impl TimerSource {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl EventSource for TimerSource {
    fn run(self: Box<Self>, emitter: Emitter, stop: StopSignal) {
        let path = timer_path(self.interval);
        let mut count: u64 = 0;
        crate::debug_trace!("timer started: interval={:?}", self.interval);
        while !stop.wait_timeout(self.interval) {
            count += 1;
            if !emitter.emit(path.clone(), EventPayload::Tick { count }) {
                break;
            }
        }
        crate::debug_trace!("timer stopped: ticks={}", count);
    }
}

/// Translates native terminal input into bus events.
pub struct TerminalEvents {
    input: Box<dyn InputSource>,
    poll: Duration,
}

impl TerminalEvents {
    /// `poll` bounds how long a stop request can go unnoticed.
    pub fn new(input: Box<dyn InputSource>, poll: Duration) -> Self {
        Self { input, poll }
    }
}

impl fmt::Debug for TerminalEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalEvents")
            .field("poll", &self.poll)
            .finish()
    }
}

impl EventSource for TerminalEvents {
    fn run(mut self: Box<Self>, emitter: Emitter, stop: StopSignal) {
        while !stop.is_stopped() {
            match self.input.poll_event(self.poll) {
                Ok(Some(event)) => {
                    if !emitter.emit_terminal(event) {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "terminal input poll failed");
                    if stop.wait_timeout(self.poll) {
                        break;
                    }
                }
            }
        }
    }
}

struct CustomMessage {
    path: String,
    data: Arc<dyn Any + Send + Sync>,
}

/// Publishes application events onto the bus under `/usr/<path>`.
#[derive(Clone)]
pub struct CustomSender {
    tx: mpsc::Sender<CustomMessage>,
}

impl CustomSender {
    /// Send `data` to handlers of `/usr/<path>`.
    ///
    /// Returns `false` once the session's custom source has stopped.
    pub fn send<T: Any + Send + Sync>(&self, path: &str, data: T) -> bool {
        self.tx
            .send(CustomMessage {
                path: user_path(path),
                data: Arc::new(data),
            })
            .is_ok()
    }
}

impl fmt::Debug for CustomSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomSender").finish_non_exhaustive()
    }
}

/// Relays [`CustomSender`] messages.
pub struct CustomSource {
    rx: mpsc::Receiver<CustomMessage>,
    poll: Duration,
}

impl CustomSource {
    pub fn channel(poll: Duration) -> (Self, CustomSender) {
        let (tx, rx) = mpsc::channel();
        (Self { rx, poll }, CustomSender { tx })
    }
}

impl fmt::Debug for CustomSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomSource")
            .field("poll", &self.poll)
            .finish()
    }
}

impl EventSource for CustomSource {
    fn run(self: Box<Self>, emitter: Emitter, stop: StopSignal) {
        while !stop.is_stopped() {
            match self.rx.recv_timeout(self.poll) {
                Ok(msg) => {
                    if !emitter.emit(msg.path, EventPayload::Custom(msg.data)) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                // Every sender dropped; nothing more can arrive.
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_stream::{BusEvent, EventStream};
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;
    use tdash_core::event::{Event, KeyCode, KeyEvent};

    struct Scripted(VecDeque<io::Result<Option<Event>>>);

    impl InputSource for Scripted {
        fn poll_event(&mut self, timeout: Duration) -> io::Result<Option<Event>> {
            match self.0.pop_front() {
                Some(next) => next,
                None => {
                    std::thread::sleep(timeout);
                    Ok(None)
                }
            }
        }
    }

    fn collect(stream: &Arc<EventStream>, want: usize) -> Vec<BusEvent> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let st = Arc::clone(stream);
        stream.handle("/", move |e| {
            let mut seen = s.lock().unwrap();
            if seen.len() < want {
                seen.push(e.clone());
                if seen.len() == want {
                    st.stop_loop();
                }
            }
        });
        stream.run_loop();
        stream.remove_handler("/");
        let out = seen.lock().unwrap().clone();
        out
    }

    #[test]
    fn timer_ticks_count_up() {
        let stream = Arc::new(EventStream::new());
        stream
            .merge("timer", TimerSource::new(Duration::from_millis(5)))
            .unwrap();
        let events = collect(&stream, 3);
        stream.stop_sources();

        assert!(events.iter().all(|e| e.path == "/timer/5ms" && e.from == "timer"));
        let counts: Vec<u64> = events
            .iter()
            .map(|e| match e.payload {
                EventPayload::Tick { count } => count,
                _ => 0,
            })
            .collect();
        assert_eq!(counts, vec![1, 2, 3]);
    }

    #[test]
    fn terminal_events_survive_poll_errors() {
        let script = VecDeque::from(vec![
            Err(io::Error::other("transient")),
            Ok(Some(Event::Key(KeyEvent::new(KeyCode::Char('x'))))),
        ]);
        let stream = Arc::new(EventStream::new());
        stream
            .merge(
                "termbox",
                TerminalEvents::new(Box::new(Scripted(script)), Duration::from_millis(5)),
            )
            .unwrap();
        let events = collect(&stream, 1);
        stream.stop_sources();
        assert_eq!(events[0].path, "/sys/kbd/x");
        assert_eq!(events[0].from, "termbox");
    }

    #[test]
    fn custom_sender_reaches_usr_paths() {
        let stream = Arc::new(EventStream::new());
        let (source, sender) = CustomSource::channel(Duration::from_millis(5));
        stream.merge("custom", source).unwrap();
        assert!(sender.send("metrics/cpu", 42_u8));
        let events = collect(&stream, 1);
        stream.stop_sources();

        assert_eq!(events[0].path, "/usr/metrics/cpu");
        assert_eq!(events[0].custom::<u8>(), Some(&42));
        assert!(!sender.send("late", ()));
    }

    #[test]
    fn stop_sources_joins_promptly() {
        let stream = EventStream::new();
        stream
            .merge("timer", TimerSource::new(Duration::from_secs(3600)))
            .unwrap();
        assert_eq!(stream.source_count(), 1);
        let start = std::time::Instant::now();
        stream.stop_sources();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(stream.source_count(), 0);
    }
}
