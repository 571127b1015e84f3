//! Capture of text emitted by external computations.

use super::{LogLevel, Logger};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Line-buffered console handed to an external computation.
///
/// Everything the computation writes is forwarded to the logger one line
/// at a time, prefixed with the computation name, instead of reaching the
/// terminal directly. A trailing partial line is held until the next
/// newline or [`Console::finish`].
#[derive(Debug)]
pub struct Console {
    source: String,
    logger: Logger,
    level: LogLevel,
    pending: Mutex<String>,
    lines: AtomicUsize,
}

impl Console {
    /// Creates a console forwarding at INFO.
    #[must_use]
    pub fn new(source: impl Into<String>, logger: Logger) -> Self {
        Self {
            source: source.into(),
            logger,
            level: LogLevel::Info,
            pending: Mutex::new(String::new()),
            lines: AtomicUsize::new(0),
        }
    }

    /// Sets the level captured lines are logged at.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Writes text, forwarding every completed line.
    pub fn write(&self, text: &str) {
        let mut pending = self.pending.lock();
        pending.push_str(text);

        while let Some(pos) = pending.find('\n') {
            let line: String = pending.drain(..=pos).collect();
            self.forward(&line);
        }
    }

    /// Writes a complete line.
    pub fn line(&self, text: &str) {
        self.write(&format!("{text}\n"));
    }

    /// Flushes a trailing partial line.
    pub fn finish(&self) {
        let rest = std::mem::take(&mut *self.pending.lock());
        self.forward(&rest);
    }

    /// Number of lines forwarded so far.
    #[must_use]
    pub fn lines_forwarded(&self) -> usize {
        self.lines.load(Ordering::Relaxed)
    }

    fn forward(&self, raw: &str) {
        let line = raw.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            return;
        }
        self.lines.fetch_add(1, Ordering::Relaxed);
        self.logger.log(self.level, format!("[{}] {}", self.source, line));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::CollectingLogSink;
    use std::sync::Arc;

    fn console() -> (Console, Arc<CollectingLogSink>) {
        let sink = Arc::new(CollectingLogSink::new());
        let logger = Logger::new(LogLevel::Debug, sink.clone());
        (Console::new("align", logger), sink)
    }

    #[test]
    fn test_forwards_line_by_line() {
        let (console, sink) = console();

        console.write("iteration 1\niteration 2\n");

        assert_eq!(
            sink.messages_at(LogLevel::Info),
            vec!["[align] iteration 1".to_string(), "[align] iteration 2".to_string()]
        );
        assert_eq!(console.lines_forwarded(), 2);
    }

    #[test]
    fn test_partial_lines_are_joined() {
        let (console, sink) = console();

        console.write("stitch");
        assert!(sink.is_empty());
        console.write("ed\r\n");

        assert_eq!(sink.messages_at(LogLevel::Info), vec!["[align] stitched".to_string()]);
    }

    #[test]
    fn test_finish_flushes_remainder() {
        let (console, sink) = console();

        console.write("done without newline");
        console.finish();
        console.finish();

        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_blank_lines_are_dropped() {
        let (console, sink) = console();
        console.write("\n\n  \nvalue\n");
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_custom_level() {
        let sink = Arc::new(CollectingLogSink::new());
        let logger = Logger::new(LogLevel::Debug, sink.clone());
        let console = Console::new("stderr", logger).with_level(LogLevel::Warning);

        console.line("careful");

        assert_eq!(sink.messages_at(LogLevel::Warning), vec!["[stderr] careful".to_string()]);
    }
}
