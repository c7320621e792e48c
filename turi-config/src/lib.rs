//! Turi Config - Pure configuration data structures
//!
//! This crate contains only data structures, no logic or global state.
//! It serves as the shared configuration vocabulary across all Turi crates.

use serde::{Deserialize, Serialize};

/// Configuration for script loading behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Whether compiled scripts register break-marked statements
    pub enable_breakpoints: bool,
    /// Whether the tokenizer keeps comment text on expressions
    pub keep_comments: bool,
}

/// Configuration for execution budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Maximum nested call depth for a single run
    pub depth_limit: u16,
    /// Wall-clock budget for a single run, in milliseconds
    pub time_limit_ms: u64,
    /// Cooperative slice before a voluntary pause, in milliseconds
    pub preemption_slice_ms: u64,
}

/// Engine phase enum for phase-specific diagnostics
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Parser,
    Reducer,
    Preprocessor,
    Compiler,
    Engine,
}

impl Phase {
    /// Get the string name of the phase
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Parser => "parser",
            Phase::Reducer => "reducer",
            Phase::Preprocessor => "preprocessor",
            Phase::Compiler => "compiler",
            Phase::Engine => "engine",
        }
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            enable_breakpoints: false,
            keep_comments: false,
        }
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            depth_limit: 500,
            time_limit_ms: 10_000,
            preemption_slice_ms: 100,
        }
    }
}
