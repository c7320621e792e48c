//! Op execution and the resumable call chain.
//!
//! A run enters through [`Engine::enter_function`], which owns the
//! frame for the duration of the call and hands it back to the caller's
//! resume slot when the run suspends. Time budgets are kept relative
//! while a frame is suspended and absolute while it runs; the switch
//! happens on every entry and exit so nested calls and pauses charge
//! the same clock.

use std::any::Any;
use std::rc::Rc;

use turi_log::{error, info};

use crate::runtime::clock::now_ms;
use crate::runtime::eval::do_equation;
use crate::runtime::frame::{new_value, ArgMap, CallState, Frame, Scope, VarMap};
use crate::runtime::ops::is_false;
use crate::runtime::status::{ScriptError, Status};
use crate::runtime::vars::{get_variable, print_state, push_unnamed, set_variables};
use crate::runtime::{Breakpoint, Engine};
use crate::script::compile::{AssignMode, CallArg, Op, OpKind};
use crate::script::print::print_op;
use crate::script::Expr;

/// Wording used when reporting a failed equation.
pub(crate) fn equation_issue(err: &ScriptError) -> &'static str {
    match err {
        ScriptError::Syntax => "Invalid Syntax",
        _ => "Invalid Arguments",
    }
}

impl Engine {
    /// Runs `fx_name` until it settles or suspends.
    ///
    /// With a `resume` slot the call picks up a previously suspended
    /// frame from it, and parks the frame there again on suspension.
    /// Without a slot any suspension is an error, the function must run
    /// to completion. `gvars` defaults to the frame's own variables so
    /// a plain call has no separate global scope.
    #[allow(clippy::too_many_arguments)]
    pub fn enter_function(
        &mut self,
        fx_name: &str,
        args: &mut ArgMap,
        host: Option<&mut dyn Any>,
        mut resume: Option<&mut Option<Box<Frame>>>,
        gvars: Option<VarMap>,
        preemption: bool,
        depth_limit: u16,
        time_limit: i64,
    ) -> Status {
        let Some(fx) = self.functions.get(fx_name) else {
            return Status::Err(ScriptError::NotFound);
        };
        if depth_limit == 0 {
            error!(
                self.logger,
                "Function: \"{fx_name}\" can not be called; stack limit reached"
            );
            return Status::Err(ScriptError::Stack);
        }
        let fx = Rc::clone(fx);

        let mut frame = match resume.as_mut().and_then(|slot| slot.take()) {
            Some(frame) => frame,
            None => Box::new(Frame::new(
                fx,
                fx_name,
                if preemption { u64::MAX } else { 0 },
                depth_limit - 1,
                time_limit,
            )),
        };
        let gvars = gvars.unwrap_or_else(|| frame.vars.clone());

        let ret = self.execute_function(&mut frame, args, gvars, host);

        if ret.is_suspension() {
            match resume {
                Some(slot) => *slot = Some(frame),
                None => {
                    error!(
                        self.logger,
                        "Function: \"{fx_name}\" can not handle interrupt requests"
                    );
                    return Status::Err(ScriptError::Interrupt);
                }
            }
        } else if let Some(slot) = resume {
            *slot = None;
        }
        ret
    }

    /// Runs the ops of one frame from its cursor.
    pub(crate) fn execute_function(
        &mut self,
        frame: &mut Frame,
        args: &mut ArgMap,
        gvars: VarMap,
        mut host: Option<&mut dyn Any>,
    ) -> Status {
        let valid = self
            .functions
            .get(&frame.fx_name)
            .is_some_and(|fx| Rc::ptr_eq(fx, &frame.fx))
            && frame.cursor <= frame.fx.ops.len();
        if !valid {
            error!(self.logger, "resume failed, script state is no longer valid");
            return Status::Err(ScriptError::Interrupt);
        }

        if frame.next_pause != 0 {
            frame.next_pause = now_ms() + self.limits.preemption_slice_ms;
        }
        let fx = Rc::clone(&frame.fx);
        frame.time_limit += now_ms() as i64;

        let mut ret = Status::Ok;
        while frame.cursor < fx.ops.len() {
            if now_ms() as i64 > frame.time_limit {
                error!(
                    self.logger,
                    "Function: \"{}\" has to be terminated; time limit reached", frame.fx_name
                );
                ret = Status::Err(ScriptError::Time);
                break;
            }

            if !self.breakpoints.is_empty() {
                let key = (frame.fx_name.clone(), frame.cursor);
                if let Some(bp) = self.breakpoints.get(&key) {
                    if frame.debug {
                        // resuming from this very breakpoint, skip it once
                        frame.debug = false;
                    } else {
                        let bp = bp.clone();
                        let mut scope = Scope {
                            frame: &mut *frame,
                            args: &mut *args,
                            gvars: gvars.clone(),
                            host: host.as_mut().map(|h| &mut **h),
                        };
                        let fired = self.break_op(&bp, &fx.ops[key.1], &mut scope);
                        if fired {
                            frame.debug = true;
                            ret = Status::Break;
                            break;
                        }
                    }
                }
            }

            if frame.next_pause != 0 && frame.next_pause < now_ms() {
                ret = Status::Pause;
                break;
            }

            let mut scope = Scope {
                frame: &mut *frame,
                args: &mut *args,
                gvars: gvars.clone(),
                host: host.as_mut().map(|h| &mut **h),
            };
            ret = self.execute_op(&fx.ops[scope.frame.cursor], &mut scope);
            if ret != Status::Ok {
                break;
            }
            frame.cursor += 1;
        }

        frame.time_limit -= now_ms() as i64;
        ret
    }

    pub(crate) fn execute_op(&mut self, op: &Op, scope: &mut Scope<'_>) -> Status {
        match &op.kind {
            OpKind::Label(_) => Status::Ok,

            OpKind::Goto {
                label,
                not,
                conditions,
            } => {
                if let Some(conds) = conditions {
                    let result = new_value("");
                    if let Err(err) = do_equation(Some(&result), conds, scope) {
                        error!(
                            self.logger,
                            "Function: {} encountered an error, Line: {}; goto condition has {}",
                            scope.frame.fx_name,
                            op.line,
                            equation_issue(&err)
                        );
                        return Status::Err(err);
                    }
                    if is_false(&result.borrow()) != *not {
                        return Status::Ok;
                    }
                }
                let fx = Rc::clone(&scope.frame.fx);
                let target = fx
                    .ops
                    .iter()
                    .position(|c| matches!(&c.kind, OpKind::Label(n) if n == label));
                match target {
                    // the loop increment skips the label itself
                    Some(index) => {
                        scope.frame.cursor = index;
                        Status::Ok
                    }
                    None => {
                        error!(
                            self.logger,
                            "Function: {} encountered an error, Line: {}; invalid goto label: {}",
                            scope.frame.fx_name,
                            op.line,
                            label
                        );
                        Status::Err(ScriptError::Flow(label.clone()))
                    }
                }
            }

            OpKind::Equation(exprs) => match do_equation(None, exprs, scope) {
                Ok(()) => Status::Ok,
                Err(err) => {
                    error!(
                        self.logger,
                        "Function: {} encountered an error, Line: {}; equation has {}",
                        scope.frame.fx_name,
                        op.line,
                        equation_issue(&err)
                    );
                    Status::Err(err)
                }
            },

            OpKind::Call { function, args } => self.execute_call(op.line, function, args, scope),
        }
    }

    fn execute_call(
        &mut self,
        line: usize,
        name: &str,
        call_args: &[CallArg],
        scope: &mut Scope<'_>,
    ) -> Status {
        if scope.frame.call_state.is_none() {
            if let Err(err) = self.prepare_call(line, name, call_args, scope) {
                return Status::Err(err);
            }
        }

        let frame = &mut *scope.frame;
        let Some(cs) = frame.call_state.as_mut() else {
            return Status::Err(ScriptError::Call);
        };

        // the callee runs on the remaining budget of this frame
        frame.time_limit -= now_ms() as i64;
        let mut ret = self.call_function(
            &cs.function,
            &mut cs.args,
            scope.host.as_mut().map(|h| &mut **h),
            &scope.gvars,
        );
        if ret == Status::Err(ScriptError::NotFound) {
            let fx_name = cs.function.clone();
            ret = self.enter_function(
                &fx_name,
                &mut cs.args,
                scope.host.as_mut().map(|h| &mut **h),
                Some(&mut frame.sub_state),
                Some(scope.gvars.clone()),
                frame.next_pause != 0,
                frame.depth_limit,
                frame.time_limit,
            );
        }
        frame.time_limit += now_ms() as i64;

        // suspensions and termination keep the call pending
        if !ret.is_settled() {
            return ret;
        }
        self.finish_call(scope);

        if let Status::Err(err) = ret {
            let mut message = format!(
                "Function: {} encountered an error, Line: {}",
                scope.frame.fx_name, line
            );
            let err = if err == ScriptError::NotFound {
                message.push_str(&format!("; Function: {name} Not Found"));
                ScriptError::Call
            } else {
                err
            };
            error!(self.logger, "{message}");
            return Status::Err(err);
        }
        ret
    }

    /// Binds the call arguments into a fresh call state on the frame.
    /// A `[name]` callee is resolved through the variable layer first.
    pub(crate) fn prepare_call(
        &self,
        line: usize,
        name: &str,
        call_args: &[CallArg],
        scope: &mut Scope<'_>,
    ) -> Result<(), ScriptError> {
        let mut cs = CallState {
            function: name.to_string(),
            args: ArgMap::new(),
            temps: Vec::new(),
        };

        if let Some(inner) = name.strip_prefix('[').and_then(|n| n.strip_suffix(']')) {
            let mut temps = Vec::new();
            if let Some(value) = get_variable(inner, scope, &mut temps) {
                let resolved = value.borrow().clone();
                if !resolved.is_empty() {
                    cs.function = resolved;
                }
            }
        }

        for arg in call_args {
            let value = match &arg.value {
                Expr::Group(group) => {
                    let cell = push_unnamed(&mut cs.temps, "");
                    if let Err(err) = do_equation(Some(&cell), group, scope) {
                        error!(
                            self.logger,
                            "Function: {} encountered an error, Line: {}; \
                             invalid argument equation: {}; with {}",
                            scope.frame.fx_name,
                            line,
                            arg.name,
                            equation_issue(&err)
                        );
                        return Err(err);
                    }
                    cell
                }
                other => match get_variable(other.text(), scope, &mut cs.temps) {
                    Some(cell) => cell,
                    None => {
                        error!(
                            self.logger,
                            "Function: {} encountered an error, Line: {}; invalid argument: {}",
                            scope.frame.fx_name,
                            line,
                            arg.name
                        );
                        return Err(ScriptError::Argument);
                    }
                },
            };
            if arg.assign == AssignMode::Clear {
                value.borrow_mut().clear();
            }
            cs.args.insert(arg.name.clone(), value);
        }

        scope.frame.call_state = Some(cs);
        Ok(())
    }

    /// Settles a finished call, flushing its named temps back into the
    /// caller's variables.
    pub(crate) fn finish_call(&self, scope: &mut Scope<'_>) {
        if let Some(cs) = scope.frame.call_state.take() {
            set_variables(&cs.temps, scope);
        }
    }

    /// Dispatches a native function by name.
    pub fn call_function(
        &mut self,
        name: &str,
        args: &mut ArgMap,
        host: Option<&mut dyn Any>,
        gvars: &VarMap,
    ) -> Status {
        let Some(native) = self.natives.get(name).copied() else {
            return Status::Err(ScriptError::NotFound);
        };
        let mut ctx = crate::runtime::natives::NativeCtx {
            engine: self,
            gvars: gvars.clone(),
            host,
        };
        native(&mut ctx, args)
    }

    /// Decides whether a breakpoint suspends the run. Tracepoints (mode
    /// 0 without conditions) log the scope and keep going.
    pub(crate) fn break_op(&self, bp: &Breakpoint, op: &Op, scope: &mut Scope<'_>) -> bool {
        if let Some(conds) = &bp.conditions {
            let result = new_value("");
            if let Err(err) = do_equation(Some(&result), conds, scope) {
                error!(
                    self.logger,
                    "Function: {} encountered an error, Line: {}; breakpoint condition has {}",
                    scope.frame.fx_name,
                    op.line,
                    equation_issue(&err)
                );
                return false;
            }
            return !is_false(&result.borrow());
        }
        if bp.mode == 0 {
            info!(
                self.logger,
                "reached breakpoint at: \"{}\"; Line: {}{}\n+++",
                print_op(op),
                op.line,
                print_state(scope)
            );
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use turi_config::{LimitConfig, LoadConfig};
    use turi_log::{Level, Logger, MemorySink};

    fn engine() -> Engine {
        Engine::new(
            Logger::new(Level::Error),
            LoadConfig::default(),
            LimitConfig::default(),
        )
    }

    fn arg_map(args: &[(&str, &str)]) -> ArgMap {
        args.iter()
            .map(|(k, v)| (k.to_string(), new_value(*v)))
            .collect()
    }

    fn texts(args: &ArgMap) -> BTreeMap<String, String> {
        args.iter()
            .map(|(k, v)| (k.clone(), v.borrow().clone()))
            .collect()
    }

    fn run(script: &str, fx: &str, args: &[(&str, &str)]) -> (Status, BTreeMap<String, String>) {
        let mut engine = engine();
        engine.load_script(script).unwrap();
        let mut map = arg_map(args);
        let status = engine.enter_function(fx, &mut map, None, None, None, false, 100, 10_000);
        (status, texts(&map))
    }

    #[test]
    fn arguments_flow_in_and_out() {
        let (status, out) = run(
            "Function main Begin\nOut = A + B\nFunction End",
            "main",
            &[("A", "2"), ("B", "3"), ("Out", "")],
        );
        assert_eq!(status, Status::Ok);
        assert_eq!(out["Out"], "5");
    }

    #[test]
    fn branches_pick_a_side() {
        let script = "Function main Begin\n\
                      if (A > 2)\n\
                      Out = \"big\"\n\
                      else\n\
                      Out = \"small\"\n\
                      end\n\
                      Function End";
        let (status, out) = run(script, "main", &[("A", "5"), ("Out", "")]);
        assert_eq!(status, Status::Ok);
        assert_eq!(out["Out"], "big");
        let (_, out) = run(script, "main", &[("A", "1"), ("Out", "")]);
        assert_eq!(out["Out"], "small");
    }

    #[test]
    fn loops_accumulate() {
        let script = "Function main Begin\n\
                      i = 0\n\
                      loop (i < N)\n\
                      i = i + 1\n\
                      Sum = Sum + i\n\
                      end\n\
                      Function End";
        let (status, out) = run(script, "main", &[("N", "5"), ("Sum", "")]);
        assert_eq!(status, Status::Ok);
        assert_eq!(out["Sum"], "15");
    }

    #[test]
    fn calls_share_argument_cells() {
        let script = "Function main Begin\n\
                      Double (X = A, Res := Out)\n\
                      Function End\n\
                      Function Double Begin\n\
                      Res = X * 2\n\
                      Function End";
        let (status, out) = run(script, "main", &[("A", "4"), ("Out", "seed")]);
        assert_eq!(status, Status::Ok);
        // := cleared the seed before the callee wrote through the cell
        assert_eq!(out["Out"], "8");
    }

    #[test]
    fn call_arguments_evaluate_equations() {
        let script = "Function main Begin\n\
                      Double (X = A + 1, Res := Out)\n\
                      Function End\n\
                      Function Double Begin\n\
                      Res = X * 2\n\
                      Function End";
        let (status, out) = run(script, "main", &[("A", "4"), ("Out", "")]);
        assert_eq!(status, Status::Ok);
        assert_eq!(out["Out"], "10");
    }

    #[test]
    fn indirect_calls_resolve_through_variables() {
        let script = "Function main Begin\n\
                      Target = \"Double\"\n\
                      [Target] (X = A, Res := Out)\n\
                      Function End\n\
                      Function Double Begin\n\
                      Res = X * 2\n\
                      Function End";
        let (status, out) = run(script, "main", &[("A", "3"), ("Out", "")]);
        assert_eq!(status, Status::Ok);
        assert_eq!(out["Out"], "6");
    }

    #[test]
    fn missing_callee_is_a_call_error() {
        let (status, _) = run(
            "Function main Begin\nNoSuch ()\nFunction End",
            "main",
            &[],
        );
        assert_eq!(status, Status::Err(ScriptError::Call));
    }

    #[test]
    fn recursion_hits_the_stack_limit() {
        let script = "Function main Begin\nmain ()\nFunction End";
        let mut engine = engine();
        engine.load_script(script).unwrap();
        let mut args = ArgMap::new();
        let status = engine.enter_function("main", &mut args, None, None, None, false, 5, 10_000);
        assert_eq!(status, Status::Err(ScriptError::Stack));
    }

    #[test]
    fn runaway_loop_hits_the_time_limit() {
        let script = "Function main Begin\n\
                      loop (1)\n\
                      x = x + 1\n\
                      end\n\
                      Function End";
        let mut engine = engine();
        engine.load_script(script).unwrap();
        let mut args = ArgMap::new();
        let status = engine.enter_function("main", &mut args, None, None, None, false, 100, 1);
        assert_eq!(status, Status::Err(ScriptError::Time));
    }

    #[test]
    fn preemption_pauses_and_resumes() {
        let script = "Function main Begin\n\
                      i = 0\n\
                      loop (i < N)\n\
                      i = i + 1\n\
                      Sum = Sum + i\n\
                      end\n\
                      Function End";
        let mut engine = Engine::new(
            Logger::new(Level::Error),
            LoadConfig::default(),
            LimitConfig {
                preemption_slice_ms: 0,
                ..LimitConfig::default()
            },
        );
        engine.load_script(script).unwrap();
        let mut args = arg_map(&[("N", "20000"), ("Sum", "")]);
        let mut slot: Option<Box<Frame>> = None;
        let mut pauses = 0usize;
        let mut status = engine.enter_function(
            "main",
            &mut args,
            None,
            Some(&mut slot),
            None,
            true,
            100,
            60_000,
        );
        while status == Status::Pause {
            pauses += 1;
            assert!(slot.is_some());
            status = engine.enter_function(
                "main",
                &mut args,
                None,
                Some(&mut slot),
                None,
                true,
                100,
                60_000,
            );
        }
        assert_eq!(status, Status::Ok);
        assert!(slot.is_none());
        assert!(pauses >= 1);
        assert_eq!(args["Sum"].borrow().as_str(), "200010000");
    }

    #[test]
    fn suspension_without_a_resume_slot_is_an_error() {
        let script = "Function main Begin\n\
                      i = 0\n\
                      loop (i < 100000)\n\
                      i = i + 1\n\
                      end\n\
                      Function End";
        let mut engine = Engine::new(
            Logger::new(Level::Error),
            LoadConfig::default(),
            LimitConfig {
                preemption_slice_ms: 0,
                ..LimitConfig::default()
            },
        );
        engine.load_script(script).unwrap();
        let mut args = ArgMap::new();
        let status =
            engine.enter_function("main", &mut args, None, None, None, true, 100, 60_000);
        assert_eq!(status, Status::Err(ScriptError::Interrupt));
    }

    #[test]
    fn breakpoints_suspend_and_resume_past_the_break() {
        let script = "Function main Begin\n\
                      A = 1\n\
                      B = A + 1\n\
                      Out = B + 1\n\
                      Function End";
        let mut engine = engine();
        engine.load_script(script).unwrap();
        engine.set_breakpoint(
            "main",
            1,
            Breakpoint {
                mode: 1,
                conditions: None,
            },
        );
        let mut args = arg_map(&[("Out", "")]);
        let mut slot: Option<Box<Frame>> = None;
        let status = engine.enter_function(
            "main", &mut args, None, Some(&mut slot), None, false, 100, 10_000,
        );
        assert_eq!(status, Status::Break);
        assert_eq!(slot.as_ref().unwrap().cursor, 1);
        assert_eq!(args["Out"].borrow().as_str(), "");

        let status = engine.enter_function(
            "main", &mut args, None, Some(&mut slot), None, false, 100, 10_000,
        );
        assert_eq!(status, Status::Ok);
        assert!(slot.is_none());
        assert_eq!(args["Out"].borrow().as_str(), "3");
    }

    #[test]
    fn conditional_breakpoint_only_fires_when_it_holds() {
        let script = "Function main Begin\n\
                      i = 0\n\
                      loop (i < 5)\n\
                      i = i + 1\n\
                      end\n\
                      Out = i\n\
                      Function End";
        let mut engine = engine();
        engine.load_script(script).unwrap();
        // break on the loop body once the counter reaches 3
        let conds = {
            let mut e = crate::script::parse_line("i >= 3", None).unwrap();
            crate::script::order_equation(&mut e, true).unwrap();
            e
        };
        let body = engine
            .function("main")
            .unwrap()
            .ops
            .iter()
            .position(|op| matches!(&op.kind, OpKind::Equation(e) if e.text(0) == "i" && e.is_group(2)))
            .unwrap();
        engine.set_breakpoint(
            "main",
            body,
            Breakpoint {
                mode: 1,
                conditions: Some(conds),
            },
        );
        let mut args = arg_map(&[("Out", "")]);
        let mut slot: Option<Box<Frame>> = None;
        let mut breaks = 0usize;
        let mut status = engine.enter_function(
            "main", &mut args, None, Some(&mut slot), None, false, 100, 10_000,
        );
        while status == Status::Break {
            breaks += 1;
            status = engine.enter_function(
                "main", &mut args, None, Some(&mut slot), None, false, 100, 10_000,
            );
        }
        assert_eq!(status, Status::Ok);
        assert_eq!(breaks, 2);
        assert_eq!(args["Out"].borrow().as_str(), "5");
    }

    #[test]
    fn tracepoints_log_and_continue() {
        let sink = MemorySink::new();
        let logger = Logger::new(Level::Trace).with_sink(sink.clone());
        let mut engine = Engine::new(logger, LoadConfig::default(), LimitConfig::default());
        engine
            .load_script("Function main Begin\nOut = 1\nFunction End")
            .unwrap();
        engine.set_breakpoint(
            "main",
            0,
            Breakpoint {
                mode: 0,
                conditions: None,
            },
        );
        let mut args = arg_map(&[("Out", "")]);
        let status = engine.enter_function("main", &mut args, None, None, None, false, 100, 10_000);
        assert_eq!(status, Status::Ok);
        assert_eq!(args["Out"].borrow().as_str(), "1");
        assert!(sink
            .dump()
            .iter()
            .any(|r| r.message.contains("reached breakpoint")));
    }

    #[test]
    fn quit_terminates_the_run() {
        let (status, out) = run(
            "Function main Begin\nQuit ()\nOut = \"after\"\nFunction End",
            "main",
            &[("Out", "")],
        );
        assert_eq!(status, Status::Terminate);
        assert_eq!(out["Out"], "");
    }

    #[test]
    fn goto_to_a_missing_label_is_a_flow_error() {
        let (status, _) = run(
            "Function main Begin\ngoto nowhere\nFunction End",
            "main",
            &[],
        );
        assert_eq!(status, Status::Err(ScriptError::Flow("nowhere".to_string())));
    }

    #[test]
    fn exit_jumps_to_the_end_of_the_function() {
        let (status, out) = run(
            "Function main Begin\n\
             Out = \"before\"\n\
             exit\n\
             Out = \"after\"\n\
             Function End",
            "main",
            &[("Out", "")],
        );
        assert_eq!(status, Status::Ok);
        assert_eq!(out["Out"], "before");
    }
}
