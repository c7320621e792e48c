//! turi-log - structured logging for the Turi scripting engine
//!
//! Design points:
//! - **Explicit passing**: no global logger, every component receives an
//!   `Arc<Logger>` handle.
//! - **Host-pluggable sinks**: embedders route engine diagnostics anywhere
//!   by implementing [`LogSink`].
//! - **Cheap when disabled**: level check happens before formatting.
//!
//! ```ignore
//! use turi_log::{Logger, Level, StderrSink, info};
//!
//! let logger = Logger::new(Level::Info).with_sink(StderrSink);
//! info!(logger, "script loaded: {} functions", 3);
//! ```

mod logger;
mod macros;
mod record;

pub use logger::{LogSink, Logger, MemorySink, StderrSink, StdoutSink};
pub use record::{Level, ParseLevelError, Record};
