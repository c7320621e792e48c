//! Session state and run outcomes.

use turi_core::runtime::debug::DebugState;
use turi_core::{ArgMap, Frame};

/// How a run or a debug step ended, short of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The entry function ran to its end.
    Done,
    /// The script ended itself with `Quit ()`.
    Terminated,
    /// The run used up its cooperative slice and can be resumed.
    Paused,
    /// A breakpoint fired; the run can be resumed or stepped.
    Stopped,
    /// A native requested an interrupt; the run can be resumed.
    Interrupted,
}

impl Outcome {
    pub fn is_suspended(&self) -> bool {
        matches!(self, Outcome::Paused | Outcome::Stopped | Outcome::Interrupted)
    }
}

/// A resumable run of one entry function. The argument cells are live
/// while the run is suspended, so the host can inspect and adjust them
/// between steps.
pub struct Session {
    pub(crate) fx: String,
    pub args: ArgMap,
    pub(crate) frame: Option<Box<Frame>>,
    pub(crate) debug: Option<Box<DebugState>>,
}

impl Session {
    pub fn function(&self) -> &str {
        &self.fx
    }

    /// True while a suspended frame is parked in the session.
    pub fn is_suspended(&self) -> bool {
        self.frame.is_some()
    }
}
