//! Load stage error type.

use thiserror::Error;
use turi_config::Phase;

/// Failure while parsing, preprocessing or compiling a script. The
/// message embeds the offending source line where one is known; the
/// phase records which front end stage rejected it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LoadError {
    pub phase: Phase,
    pub line: Option<usize>,
    pub message: String,
}

impl LoadError {
    pub fn new(message: impl Into<String>) -> LoadError {
        LoadError {
            phase: Phase::Compiler,
            line: None,
            message: message.into(),
        }
    }

    pub fn at_line(line: usize, message: impl Into<String>) -> LoadError {
        LoadError {
            phase: Phase::Compiler,
            line: Some(line),
            message: message.into(),
        }
    }

    pub fn in_phase(mut self, phase: Phase) -> LoadError {
        self.phase = phase;
        self
    }
}
