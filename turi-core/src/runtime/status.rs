//! Execution status codes and runtime errors.

use thiserror::Error;

/// Runtime failure of a script operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("function not found")]
    NotFound,
    #[error("invalid arguments")]
    Argument,
    #[error("invalid syntax")]
    Syntax,
    #[error("execution interrupted")]
    Interrupt,
    #[error("invalid control flow: {0}")]
    Flow(String),
    #[error("stack limit reached")]
    Stack,
    #[error("time limit reached")]
    Time,
    #[error("native function failed: {0}")]
    Native(String),
    #[error("function call failed")]
    Call,
}

/// Outcome of running one op, one frame or one whole call.
///
/// The suspension variants leave the frame chain intact so the host can
/// resume it later. `Terminate` discards the chain without finalizing
/// pending calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Preemption slice expired before the frame finished.
    Pause,
    /// A breakpoint fired.
    Break,
    /// A native requested host attention before continuing.
    Interrupt,
    /// Script asked to stop, no error.
    Terminate,
    Ok,
    Err(ScriptError),
}

impl Status {
    /// Suspended with a live frame chain that can be resumed.
    pub fn is_suspension(&self) -> bool {
        matches!(self, Status::Pause | Status::Break | Status::Interrupt)
    }

    /// Finished one way or the other, nothing left to resume.
    pub fn is_settled(&self) -> bool {
        matches!(self, Status::Ok | Status::Err(_))
    }

    pub fn is_err(&self) -> bool {
        matches!(self, Status::Err(_))
    }
}
