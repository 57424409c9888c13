//! Logging functionality for ragwatch
//!
//! This module provides the append-only event stream read by presentation
//! layers and the optional JSON-lines file sink that mirrors it.

mod event_log;
mod sink;

pub use event_log::EventLog;
pub use sink::{EventSink, SinkRecord};
