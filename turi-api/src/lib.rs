//! Turi API - run orchestration layer.
//!
//! Wraps the core engine into a [`Runner`] that owns the engine and
//! the data store a run's natives operate on, and into [`Session`]s
//! that carry suspended runs across preemption pauses, breakpoints and
//! debug steps.
//!
//! For CLI convenience a process wide [`RunConfig`] singleton is
//! available; library embedders should pass configs explicitly.

use std::any::Any;

use turi_log::info;

pub use turi_core::runtime::debug::{DebugOp, DebugState};
pub use turi_core::runtime::Breakpoint;
pub use turi_core::store::DataStore;

use turi_core::script::{order_equation, parse_line};
use turi_core::store;

pub mod config;
pub mod error;
pub mod types;

pub use config::{config as get_config, init as init_config, is_initialized, RunConfig};
pub use error::{ErrorReport, LoadError, ScriptError, TuriError};
pub use types::{Outcome, Session};

pub use turi_config::{LimitConfig, LoadConfig, Phase};
pub use turi_core::{new_value, ArgMap, Engine, NativeCtx, NativeFn, Status, Value};
pub use turi_log::{Level, LogSink, Logger, MemorySink, StderrSink, StdoutSink};

/// A loaded script plus the data store its natives operate on.
pub struct Runner {
    engine: Engine,
    store: DataStore,
}

impl Runner {
    pub fn new(config: &RunConfig) -> Runner {
        let mut engine = Engine::new(
            config.logger.clone(),
            config.load.clone(),
            config.limits.clone(),
        );
        store::register(&mut engine);
        Runner {
            engine,
            store: DataStore::new(),
        }
    }

    /// Replaces the loaded script. Sessions from the previous script
    /// become invalid and fail on their next resume.
    pub fn load(&mut self, source: &str) -> Result<(), TuriError> {
        self.engine.load_script(source)?;
        info!(
            self.engine.logger(),
            "script loaded: {} functions",
            self.engine.function_names().count()
        );
        Ok(())
    }

    /// Runs `fx` to completion on the current thread. The call shares
    /// the argument cells, so output arguments land back in `args`.
    pub fn call(&mut self, fx: &str, args: &mut ArgMap) -> Result<Outcome, TuriError> {
        let limits = self.engine.limits().clone();
        let status = self.engine.enter_function(
            fx,
            args,
            Some(&mut self.store as &mut dyn Any),
            None,
            None,
            false,
            limits.depth_limit,
            limits.time_limit_ms as i64,
        );
        settle(status)
    }

    /// Starts a resumable run of `fx`. Nothing executes until the first
    /// [`Runner::resume`].
    pub fn begin(&mut self, fx: &str, args: ArgMap) -> Session {
        Session {
            fx: fx.to_string(),
            args,
            frame: None,
            debug: None,
        }
    }

    /// Runs or continues a session until it settles or suspends again.
    pub fn resume(&mut self, session: &mut Session) -> Result<Outcome, TuriError> {
        let limits = self.engine.limits().clone();
        let status = self.engine.enter_function(
            &session.fx,
            &mut session.args,
            Some(&mut self.store as &mut dyn Any),
            Some(&mut session.frame),
            None,
            true,
            limits.depth_limit,
            limits.time_limit_ms as i64,
        );
        settle(status)
    }

    /// Queues a debug operation on a suspended session. Operations
    /// nest, newest first.
    pub fn queue_debug(&self, session: &mut Session, op: DebugOp) {
        DebugState::push(&mut session.debug, op);
    }

    /// Applies the newest queued debug operation to the innermost frame
    /// of the session.
    pub fn step(&mut self, session: &mut Session) -> Result<Outcome, TuriError> {
        let Session {
            args, frame, debug, ..
        } = session;
        let Some(frame) = frame.as_deref_mut() else {
            return Err(TuriError::Runtime(ScriptError::Interrupt));
        };
        let gvars = frame.vars.clone();
        let status = self.engine.execute_debug(
            debug,
            frame,
            args,
            gvars,
            Some(&mut self.store as &mut dyn Any),
        );
        settle(status)
    }

    /// Arms a breakpoint on the `index`th op of `fx`. `condition` is an
    /// equation evaluated in the live scope; the breakpoint only fires
    /// while it holds.
    pub fn set_breakpoint(
        &mut self,
        fx: &str,
        index: usize,
        condition: Option<&str>,
    ) -> Result<(), TuriError> {
        let conditions = match condition {
            Some(text) => {
                let mut exprs = parse_line(text, None).ok_or_else(|| {
                    LoadError::new("empty breakpoint condition").in_phase(Phase::Parser)
                })?;
                order_equation(&mut exprs, true)
                    .map_err(|e| LoadError::new(e).in_phase(Phase::Reducer))?;
                Some(exprs)
            }
            None => None,
        };
        self.engine
            .set_breakpoint(fx, index, Breakpoint { mode: 1, conditions });
        Ok(())
    }

    pub fn clear_breakpoint(&mut self, fx: &str, index: usize) -> bool {
        self.engine.clear_breakpoint(fx, index)
    }

    /// Adds a host native. Returns false when the name is taken.
    pub fn register_native(&mut self, name: &str, function: NativeFn) -> bool {
        self.engine.register_native(name, function)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut DataStore {
        &mut self.store
    }
}

fn settle(status: Status) -> Result<Outcome, TuriError> {
    match status {
        Status::Ok => Ok(Outcome::Done),
        Status::Terminate => Ok(Outcome::Terminated),
        Status::Pause => Ok(Outcome::Paused),
        Status::Break => Ok(Outcome::Stopped),
        Status::Interrupt => Ok(Outcome::Interrupted),
        Status::Err(err) => Err(TuriError::Runtime(err)),
    }
}

/// Loads `source` and runs its `main` function to completion,
/// returning the argument cells.
pub fn run(source: &str, config: &RunConfig) -> Result<ArgMap, TuriError> {
    let mut runner = Runner::new(config);
    runner.load(source)?;
    let mut args = ArgMap::new();
    runner.call("main", &mut args)?;
    Ok(args)
}

/// [`run`] with the process wide configuration.
pub fn run_script(source: &str) -> Result<ArgMap, TuriError> {
    run(source, &config::config())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> RunConfig {
        RunConfig {
            logger: Logger::new(Level::Error),
            ..RunConfig::default()
        }
    }

    #[test]
    fn call_runs_to_completion() {
        let mut runner = Runner::new(&quiet_config());
        runner
            .load("Function main Begin\nOut = A + B\nFunction End\n")
            .unwrap();
        let mut args: ArgMap = [
            ("A".to_string(), new_value("2")),
            ("B".to_string(), new_value("3")),
            ("Out".to_string(), new_value("")),
        ]
        .into();
        assert_eq!(runner.call("main", &mut args), Ok(Outcome::Done));
        assert_eq!(args["Out"].borrow().clone(), "5");
    }

    #[test]
    fn missing_entry_is_a_runtime_error() {
        let mut runner = Runner::new(&quiet_config());
        runner
            .load("Function main Begin\nx = 1\nFunction End\n")
            .unwrap();
        let mut args = ArgMap::new();
        assert_eq!(
            runner.call("other", &mut args),
            Err(TuriError::Runtime(ScriptError::NotFound))
        );
    }

    #[test]
    fn load_errors_carry_the_line_and_phase() {
        let mut runner = Runner::new(&quiet_config());
        let err = runner
            .load("Function main Begin\nend\nFunction End\n")
            .unwrap_err();
        let report = err.to_report();
        assert_eq!(report.phase, Phase::Preprocessor);
        assert!(report.line.is_some());

        let mut runner = Runner::new(&quiet_config());
        let err = runner
            .load("Function main Begin\na = b ^ c\nFunction End\n")
            .unwrap_err();
        assert_eq!(err.phase(), Phase::Compiler);

        let mut runner = Runner::new(&quiet_config());
        runner
            .load("Function main Begin\nx = 1\nFunction End\n")
            .unwrap();
        let err = runner.set_breakpoint("main", 0, Some("x ^ 1")).unwrap_err();
        assert_eq!(err.phase(), Phase::Reducer);
    }

    #[test]
    fn sessions_pause_and_resume() {
        let mut config = quiet_config();
        config.limits.preemption_slice_ms = 0;
        let script = "\
Function main Begin
i = 0
Sum = 0
loop (i < 20000)
i = i + 1
Sum = Sum + i
end
Function End
";
        let mut runner = Runner::new(&config);
        runner.load(script).unwrap();

        let mut session = runner.begin("main", [("Sum".to_string(), new_value(""))].into());
        let mut pauses = 0;
        loop {
            match runner.resume(&mut session).unwrap() {
                Outcome::Paused => pauses += 1,
                Outcome::Done => break,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert!(pauses >= 1);
        assert!(!session.is_suspended());
        assert_eq!(session.args["Sum"].borrow().clone(), "200010000");
    }

    #[test]
    fn breakpoints_stop_and_steps_advance() {
        let script = "\
Function main Begin
x = 1
Out = x + 1
Function End
";
        let mut runner = Runner::new(&quiet_config());
        runner.load(script).unwrap();
        runner.set_breakpoint("main", 1, None).unwrap();

        let mut session = runner.begin("main", [("Out".to_string(), new_value(""))].into());
        assert_eq!(runner.resume(&mut session), Ok(Outcome::Stopped));
        assert!(session.is_suspended());

        runner.queue_debug(&mut session, DebugOp::SingleStep);
        assert_eq!(runner.step(&mut session), Ok(Outcome::Done));
        assert_eq!(session.args["Out"].borrow().clone(), "2");

        assert_eq!(runner.resume(&mut session), Ok(Outcome::Done));
        assert!(!session.is_suspended());
    }

    #[test]
    fn breakpoint_conditions_keep_operator_precedence() {
        let script = "\
Function main Begin
x = 5
y = 2
Out = x
Function End
";
        // 5 == (2 + 1) is false; a flat left-to-right read would give
        // (5 == 2) + 1 and fire.
        let mut runner = Runner::new(&quiet_config());
        runner.load(script).unwrap();
        runner.set_breakpoint("main", 2, Some("x == y + 1")).unwrap();
        let mut session = runner.begin("main", [("Out".to_string(), new_value(""))].into());
        assert_eq!(runner.resume(&mut session), Ok(Outcome::Done));
        assert_eq!(session.args["Out"].borrow().clone(), "5");

        // 5 == (2 + 3) holds, so the same breakpoint fires.
        let mut runner = Runner::new(&quiet_config());
        runner.load(script).unwrap();
        runner.set_breakpoint("main", 2, Some("x == y + 3")).unwrap();
        let mut session = runner.begin("main", [("Out".to_string(), new_value(""))].into());
        assert_eq!(runner.resume(&mut session), Ok(Outcome::Stopped));
        assert!(session.is_suspended());
    }

    #[test]
    fn store_natives_collect_results() {
        let script = "\
Function main Begin
StoreData (Path = \"results\", Name = \"Item#\", Value = In)
Function End
";
        let mut runner = Runner::new(&quiet_config());
        runner.load(script).unwrap();
        let mut args: ArgMap = [("In".to_string(), new_value("payload"))].into();
        runner.call("main", &mut args).unwrap();
        assert_eq!(runner.store().print_store(), "results\\Item#1=payload\n");
    }

    #[test]
    fn quit_terminates_the_run() {
        let mut runner = Runner::new(&quiet_config());
        runner
            .load("Function main Begin\nQuit ()\nOut = 1\nFunction End\n")
            .unwrap();
        let mut args: ArgMap = [("Out".to_string(), new_value(""))].into();
        assert_eq!(runner.call("main", &mut args), Ok(Outcome::Terminated));
        assert_eq!(args["Out"].borrow().clone(), "");
    }
}
