//! Log sink trait and implementations.

use super::level::{LogLevel, LogRecord};
use parking_lot::Mutex;
use std::io::Write;

/// Trait for destinations that receive log records.
///
/// Sinks must never fail the caller: write errors are swallowed.
pub trait LogSink: Send + Sync {
    /// Receives a record that passed the logger's level filter.
    fn emit(&self, record: &LogRecord);
}

/// A sink that discards all records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpLogSink;

impl LogSink for NoOpLogSink {
    fn emit(&self, _record: &LogRecord) {}
}

/// A sink that writes formatted lines to any writer.
pub struct WriterLogSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl WriterLogSink {
    /// Creates a sink over the given writer.
    #[must_use]
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Creates a sink writing to standard error.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl std::fmt::Debug for WriterLogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterLogSink").finish_non_exhaustive()
    }
}

impl LogSink for WriterLogSink {
    fn emit(&self, record: &LogRecord) {
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "{}", record.format_line());
        let _ = writer.flush();
    }
}

/// A sink that forwards records to the `tracing` framework.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn emit(&self, record: &LogRecord) {
        match record.level {
            LogLevel::Debug => tracing::debug!(target: "samflow", "{}", record.message),
            LogLevel::Info => tracing::info!(target: "samflow", "{}", record.message),
            LogLevel::Warning => tracing::warn!(target: "samflow", "{}", record.message),
            LogLevel::Error => tracing::error!(target: "samflow", "{}", record.message),
        }
    }
}

/// A sink that keeps records in memory.
#[derive(Debug, Default)]
pub struct CollectingLogSink {
    records: Mutex<Vec<LogRecord>>,
}

impl CollectingLogSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected records.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Returns the messages logged at exactly `level`.
    #[must_use]
    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.level == level)
            .map(|r| r.message.clone())
            .collect()
    }

    /// Returns the number of collected records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Clears all collected records.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl LogSink for CollectingLogSink {
    fn emit(&self, record: &LogRecord) {
        self.records.lock().push(record.clone());
    }
}
