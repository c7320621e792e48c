//! Logger implementation.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::record::{Level, Record};

/// Log output target trait
pub trait LogSink: Send + Sync {
    /// Write one log record
    fn write(&self, record: &Record);
}

/// Logger configuration and state
pub struct Logger {
    /// Current level, atomically updatable at runtime
    level: AtomicU8,
    /// Output targets
    sinks: Mutex<Vec<Box<dyn LogSink>>>,
}

impl Logger {
    /// Create a new logger with no sinks
    pub fn new(level: Level) -> Arc<Self> {
        Arc::new(Logger {
            level: AtomicU8::new(level as u8),
            sinks: Mutex::new(Vec::new()),
        })
    }

    /// Attach an output target, builder style
    pub fn with_sink<S: LogSink + 'static>(self: Arc<Self>, sink: S) -> Arc<Self> {
        self.add_sink(sink);
        self
    }

    /// Attach an output target
    pub fn add_sink<S: LogSink + 'static>(&self, sink: S) {
        if let Ok(mut sinks) = self.sinks.lock() {
            sinks.push(Box::new(sink));
        }
    }

    /// Change the level at runtime
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    /// Current level
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed)).unwrap_or(Level::Info)
    }

    /// Whether records at `level` pass the filter
    pub fn is_enabled(&self, level: Level) -> bool {
        level >= self.level()
    }

    /// Record a message. Prefer the `trace!`..`error!` macros which
    /// check the level before formatting.
    #[inline(never)]
    pub fn log(&self, level: Level, target: &'static str, message: impl Into<String>) {
        if !self.is_enabled(level) {
            return;
        }

        let record = Record::new(level, target, message);
        if let Ok(sinks) = self.sinks.lock() {
            for sink in sinks.iter() {
                sink.write(&record);
            }
        }
    }

    /// A silent logger for tests and disabled diagnostics
    pub fn noop() -> Arc<Self> {
        Self::new(Level::Error)
    }
}

// Arc<Logger> as a sink allows chaining loggers
impl LogSink for Arc<Logger> {
    fn write(&self, record: &Record) {
        self.log(record.level, record.target, record.message.clone());
    }
}

/// Standard output sink
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn write(&self, record: &Record) {
        println!("{}", record.format());
    }
}

/// Standard error sink
pub struct StderrSink;

impl LogSink for StderrSink {
    fn write(&self, record: &Record) {
        eprintln!("{}", record.format());
    }
}

/// In-memory sink for tests and embedders that poll diagnostics
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<Record>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy out everything recorded so far
    pub fn dump(&self) -> Vec<Record> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemorySink {
    fn write(&self, record: &Record) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_creation() {
        let logger = Logger::new(Level::Debug);
        assert_eq!(logger.level(), Level::Debug);
        assert!(logger.is_enabled(Level::Debug));
        assert!(!logger.is_enabled(Level::Trace));
    }

    #[test]
    fn test_level_change() {
        let logger = Logger::new(Level::Info);
        assert!(!logger.is_enabled(Level::Debug));

        logger.set_level(Level::Debug);
        assert!(logger.is_enabled(Level::Debug));
    }

    #[test]
    fn test_log_with_memory_sink() {
        let sink = MemorySink::new();
        let logger = Logger::new(Level::Debug).with_sink(sink.clone());

        logger.log(Level::Info, "test", "hello world");

        let records = sink.dump();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "hello world");
    }

    #[test]
    fn test_log_disabled_level() {
        let sink = MemorySink::new();
        let logger = Logger::new(Level::Warn).with_sink(sink.clone());

        logger.log(Level::Debug, "test", "should not appear");
        assert_eq!(sink.len(), 0);

        logger.log(Level::Warn, "test", "should appear");
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_chained_loggers() {
        let sink = MemorySink::new();
        let inner = Logger::new(Level::Debug).with_sink(sink.clone());

        let outer = Logger::new(Level::Debug);
        outer.add_sink(inner.clone());

        outer.log(Level::Info, "chain", "chained log");
        assert!(!sink.is_empty());
    }

    #[test]
    fn test_noop_logger() {
        let logger = Logger::noop();
        logger.log(Level::Error, "test", "goes nowhere");
    }
}
