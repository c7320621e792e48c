//! Cooperative execution engine.
//!
//! An [`Engine`] holds the compiled functions of one script together
//! with registered native functions and data segments. Execution state
//! lives outside the engine in a chain of [`Frame`]s owned by the
//! caller, so a suspended run can be kept, resumed or dropped without
//! touching the engine itself.

pub mod clock;
pub mod debug;
pub mod eval;
mod exec;
pub mod frame;
pub mod natives;
pub mod ops;
pub mod status;
pub mod vars;

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::Arc;

use turi_config::{LimitConfig, LoadConfig};
use turi_log::{error, Logger};

use crate::script::{compile, line_up, preprocess, strip_comment, Exprs, Function, LoadError};

pub use frame::{new_value, ArgMap, Frame, Value, VarMap};
pub use natives::{NativeCtx, NativeFn};
pub use status::{ScriptError, Status};

/// A break position inside a compiled function. Mode 0 traces the
/// statement and continues, any other mode suspends the run. Optional
/// conditions are evaluated in the broken frame's scope; the break only
/// takes effect when they hold.
#[derive(Debug, Clone, Default)]
pub struct Breakpoint {
    pub mode: i32,
    pub conditions: Option<Exprs>,
}

pub struct Engine {
    functions: BTreeMap<String, Rc<Function>>,
    natives: HashMap<String, NativeFn>,
    segments: BTreeMap<String, Vec<String>>,
    breakpoints: HashMap<(String, usize), Breakpoint>,
    script_lines: Vec<String>,
    logger: Arc<Logger>,
    load: LoadConfig,
    limits: LimitConfig,
}

impl Engine {
    pub fn new(logger: Arc<Logger>, load: LoadConfig, limits: LimitConfig) -> Engine {
        let mut engine = Engine {
            functions: BTreeMap::new(),
            natives: HashMap::new(),
            segments: BTreeMap::new(),
            breakpoints: HashMap::new(),
            script_lines: Vec::new(),
            logger,
            load,
            limits,
        };
        natives::register_builtins(&mut engine);
        engine
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    pub fn limits(&self) -> &LimitConfig {
        &self.limits
    }

    /// Registers a native function. Returns false when the name is
    /// already taken; the existing entry is kept.
    pub fn register_native(&mut self, name: &str, function: NativeFn) -> bool {
        if self.natives.contains_key(name) {
            return false;
        }
        self.natives.insert(name.to_string(), function);
        true
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn function(&self, name: &str) -> Option<&Rc<Function>> {
        self.functions.get(name)
    }

    pub fn segment(&self, name: &str) -> Option<&[String]> {
        self.segments.get(name).map(Vec::as_slice)
    }

    /// Replaces the loaded script. Previously compiled functions, data
    /// segments and breakpoints are dropped even when loading fails.
    pub fn load_script(&mut self, script: &str) -> Result<(), LoadError> {
        self.functions.clear();
        self.segments.clear();
        self.breakpoints.clear();
        self.script_lines.clear();

        let lines = line_up(script);
        let pre = preprocess(&lines).map_err(|e| self.report(e))?;
        let compiled = compile(pre.blocks, &lines).map_err(|e| self.report(e))?;

        self.functions = compiled.functions;
        self.segments = pre.segments;
        if self.load.enable_breakpoints {
            for (fx, index) in compiled.breaks {
                self.breakpoints.insert(
                    (fx, index),
                    Breakpoint {
                        mode: 1,
                        conditions: None,
                    },
                );
            }
        }
        self.script_lines = if self.load.keep_comments {
            lines
        } else {
            lines.iter().map(|l| strip_comment(l).to_string()).collect()
        };
        Ok(())
    }

    fn report(&self, err: LoadError) -> LoadError {
        error!(self.logger, "{}", err.message);
        err
    }

    pub fn set_breakpoint(&mut self, fx: &str, index: usize, breakpoint: Breakpoint) {
        self.breakpoints.insert((fx.to_string(), index), breakpoint);
    }

    pub fn clear_breakpoint(&mut self, fx: &str, index: usize) -> bool {
        self.breakpoints.remove(&(fx.to_string(), index)).is_some()
    }

    pub fn breakpoint(&self, fx: &str, index: usize) -> Option<&Breakpoint> {
        self.breakpoints.get(&(fx.to_string(), index))
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turi_log::Level;

    fn engine(load: LoadConfig) -> Engine {
        Engine::new(Logger::new(Level::Error), load, LimitConfig::default())
    }

    #[test]
    fn load_installs_functions_and_segments() {
        let mut engine = engine(LoadConfig::default());
        engine
            .load_script(
                "Function main Begin\n\
                 x = 1\n\
                 Function End\n\
                 Data table Begin\n\
                 alpha\n\
                 Data End\n",
            )
            .unwrap();
        assert!(engine.has_function("main"));
        assert_eq!(engine.segment("table").unwrap(), ["alpha".to_string()]);
    }

    #[test]
    fn reload_drops_previous_script() {
        let mut engine = engine(LoadConfig::default());
        engine
            .load_script("Function first Begin\nx = 1\nFunction End\n")
            .unwrap();
        engine
            .load_script("Function second Begin\nx = 1\nFunction End\n")
            .unwrap();
        assert!(!engine.has_function("first"));
        assert!(engine.has_function("second"));
    }

    #[test]
    fn break_markers_become_breakpoints_when_enabled() {
        let script = "Function main Begin\n? x = 1\nFunction End\n";
        let mut plain = engine(LoadConfig::default());
        plain.load_script(script).unwrap();
        assert!(plain.breakpoint("main", 0).is_none());

        let mut engine = engine(LoadConfig {
            enable_breakpoints: true,
            ..LoadConfig::default()
        });
        engine.load_script(script).unwrap();
        assert_eq!(engine.breakpoint("main", 0).unwrap().mode, 1);
    }

    #[test]
    fn duplicate_native_registration_is_rejected() {
        let mut engine = engine(LoadConfig::default());
        fn noop(_: &mut NativeCtx<'_>, _: &mut ArgMap) -> Status {
            Status::Ok
        }
        assert!(engine.register_native("Custom", noop));
        assert!(!engine.register_native("Custom", noop));
    }
}
