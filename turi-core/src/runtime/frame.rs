//! Execution state: shared string cells, variable maps and call frames.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::script::Function;

/// A mutable string cell. Arguments are bound by sharing the cell, so a
/// callee writing an output argument is visible to the caller.
pub type Value = Rc<RefCell<String>>;

/// Variable scope, shared between frames of the same function activation.
pub type VarMap = Rc<RefCell<BTreeMap<String, Value>>>;

/// Arguments of one call, by name.
pub type ArgMap = BTreeMap<String, Value>;

pub fn new_value(text: impl Into<String>) -> Value {
    Rc::new(RefCell::new(text.into()))
}

/// A cell produced while evaluating an expression. Named temps mirror a
/// variable path and are written back once the statement settles.
#[derive(Debug, Clone)]
pub struct TempSlot {
    pub name: String,
    pub value: Value,
}

impl TempSlot {
    pub fn unnamed(text: impl Into<String>) -> TempSlot {
        TempSlot {
            name: String::new(),
            value: new_value(text),
        }
    }

    pub fn named(name: impl Into<String>, text: impl Into<String>) -> TempSlot {
        TempSlot {
            name: name.into(),
            value: new_value(text),
        }
    }
}

/// A call whose arguments are bound but whose body has not finished.
/// Kept on the caller frame across suspensions so the callee can resume.
#[derive(Debug)]
pub struct CallState {
    pub function: String,
    pub args: ArgMap,
    pub temps: Vec<TempSlot>,
}

/// One level of the resumable frame chain.
#[derive(Debug)]
pub struct Frame {
    pub vars: VarMap,
    pub fx: Rc<Function>,
    pub fx_name: String,
    /// Index of the next op to run.
    pub cursor: usize,
    /// 0 disables preemption; `u64::MAX` means armed but no deadline yet;
    /// anything else is the absolute deadline in clock millis.
    pub next_pause: u64,
    /// Remaining call depth below this frame.
    pub depth_limit: u16,
    /// Remaining time budget in ms while suspended; while the frame runs
    /// it holds the absolute deadline.
    pub time_limit: i64,
    /// Set when a breakpoint fired here, so resuming skips it once.
    pub debug: bool,
    pub call_state: Option<CallState>,
    pub sub_state: Option<Box<Frame>>,
}

impl Frame {
    pub fn new(
        fx: Rc<Function>,
        fx_name: impl Into<String>,
        next_pause: u64,
        depth_limit: u16,
        time_limit: i64,
    ) -> Frame {
        Frame {
            vars: Rc::new(RefCell::new(BTreeMap::new())),
            fx,
            fx_name: fx_name.into(),
            cursor: 0,
            next_pause,
            depth_limit,
            time_limit,
            debug: false,
            call_state: None,
            sub_state: None,
        }
    }
}

/// Everything an op sees while it runs: the frame it belongs to, the
/// arguments of the enclosing call, the global scope and the host object
/// natives may downcast.
pub struct Scope<'a> {
    pub frame: &'a mut Frame,
    pub args: &'a mut ArgMap,
    pub gvars: VarMap,
    pub host: Option<&'a mut dyn Any>,
}
