//! Injectable logging for pipeline components.
//!
//! A [`Logger`] is constructed explicitly with a minimum level and one or
//! more sinks, then passed to every component that narrates its work. There
//! is no process-wide logger.

mod console;
mod level;
mod sink;

pub use console::Console;
pub use level::{LogLevel, LogRecord, ParseLogLevelError};
pub use sink::{CollectingLogSink, LogSink, NoOpLogSink, TracingLogSink, WriterLogSink};

use std::sync::Arc;

/// Filters records by level and fans them out to sinks.
#[derive(Clone)]
pub struct Logger {
    min_level: LogLevel,
    sinks: Vec<Arc<dyn LogSink>>,
}

impl Logger {
    /// Creates a logger with a single sink.
    #[must_use]
    pub fn new(min_level: LogLevel, sink: Arc<dyn LogSink>) -> Self {
        Self {
            min_level,
            sinks: vec![sink],
        }
    }

    /// Creates a logger that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            min_level: LogLevel::Error,
            sinks: Vec::new(),
        }
    }

    /// Creates a logger writing formatted lines to standard error.
    #[must_use]
    pub fn stderr(min_level: LogLevel) -> Self {
        Self::new(min_level, Arc::new(WriterLogSink::stderr()))
    }

    /// Adds another sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// The minimum level that reaches the sinks.
    #[must_use]
    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    /// Returns true if a record at `level` would be emitted.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level && !self.sinks.is_empty()
    }

    /// Logs a message at the given level.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        if !self.enabled(level) {
            return;
        }
        let record = LogRecord::new(level, message);
        for sink in &self.sinks {
            sink.emit(&record);
        }
    }

    /// Logs at DEBUG.
    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    /// Logs at INFO.
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    /// Logs at WARNING.
    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    /// Logs at ERROR.
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("min_level", &self.min_level)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
