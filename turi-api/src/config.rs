//! Run configuration and the optional process wide default.
//!
//! Library embedders build a [`RunConfig`] and pass it explicitly.
//! The global singleton exists for the CLI and other single-run hosts.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use turi_config::{LimitConfig, LoadConfig};
use turi_log::{Level, Logger, StderrSink};

/// Everything a run needs: a logger handle plus the load and limit
/// settings handed to the engine.
#[derive(Clone)]
pub struct RunConfig {
    pub logger: Arc<Logger>,
    pub load: LoadConfig,
    pub limits: LimitConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            logger: Logger::new(Level::Warn).with_sink(StderrSink),
            load: LoadConfig::default(),
            limits: LimitConfig::default(),
        }
    }
}

static CONFIG: OnceCell<RunConfig> = OnceCell::new();

/// Installs the process wide configuration. Later calls are ignored.
pub fn init(config: RunConfig) {
    let _ = CONFIG.set(config);
}

pub fn is_initialized() -> bool {
    CONFIG.get().is_some()
}

/// The process wide configuration, or the default when none was
/// installed.
pub fn config() -> RunConfig {
    CONFIG.get().cloned().unwrap_or_default()
}
