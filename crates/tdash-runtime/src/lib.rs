#![forbid(unsafe_code)]

//! tdash runtime
//!
//! Everything that runs while a dashboard is up:
//!
//! - [`Worker`] - one thread executing deferred terminal operations in
//!   submission order
//! - [`Renderer`] / [`RenderQueue`] - painter's-algorithm compositing with a
//!   deferred flush, called directly or through a job queue
//! - [`EventStream`] - merged event sources with path-routed handlers
//! - [`WidgetManager`] - per-widget handlers behind the stream's hook
//! - [`GeometryCache`] - terminal size, refreshed on every read
//! - [`Session`] - init/close lifecycle tying the above together
//!
//! # How it fits in the system
//! `tdash-core` defines the driver contract and input events,
//! `tdash-render` the drawable surfaces and drivers. This crate owns the
//! threads and the shared state between them.

pub mod cancel;
pub mod debug_trace;
pub mod error;
pub mod event_stream;
pub mod geometry_cache;
pub mod grid;
pub mod render;
pub mod session;
pub mod source;
pub mod widget_manager;
pub mod worker;

pub use cancel::{StopSignal, StopTrigger};
pub use error::{InitError, SubmitError};
pub use event_stream::{BusEvent, DEFAULT_BACKLOG, Emitter, EventPayload, EventStream, Handler};
pub use geometry_cache::GeometryCache;
pub use grid::{Grid, SharedGrid};
pub use render::{RenderJob, RenderQueue, Renderer};
pub use session::{Session, SessionConfig};
pub use source::{CustomSender, CustomSource, EventSource, TerminalEvents, TimerSource};
pub use widget_manager::WidgetManager;
pub use worker::{Job, Worker, WorkerConfig};
