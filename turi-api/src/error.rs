//! Unified error type and structured error reports.

use std::fmt;

use thiserror::Error;
use turi_config::Phase;

pub use turi_core::{LoadError, ScriptError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TuriError {
    /// Parse, preprocess or compile failure.
    #[error("{0}")]
    Load(#[from] LoadError),

    /// Failure while a script was running.
    #[error("{0}")]
    Runtime(#[from] ScriptError),
}

impl TuriError {
    /// Source line of the failure, where one is known.
    pub fn line(&self) -> Option<usize> {
        match self {
            TuriError::Load(e) => e.line,
            TuriError::Runtime(_) => None,
        }
    }

    /// Stage that produced the failure. Load errors carry the front
    /// end stage that rejected the script.
    pub fn phase(&self) -> Phase {
        match self {
            TuriError::Load(e) => e.phase,
            TuriError::Runtime(_) => Phase::Engine,
        }
    }

    /// Structured report for hosts that present errors themselves.
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            phase: self.phase(),
            line: self.line(),
            message: self.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub phase: Phase,
    pub line: Option<usize>,
    pub message: String,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "[{}] line {}: {}", self.phase.as_str(), line, self.message),
            None => write!(f, "[{}] {}", self.phase.as_str(), self.message),
        }
    }
}
