//! Debug stepper for suspended runs.
//!
//! Operations always apply to the innermost frame of the suspended
//! call chain. Queued operations nest, newest first, and each one is
//! consumed once it settles; a suspension leaves it queued for the
//! next attempt.

use std::any::Any;
use std::rc::Rc;

use turi_log::error;

use crate::runtime::clock::now_ms;
use crate::runtime::frame::{ArgMap, Frame, Scope, VarMap};
use crate::runtime::status::{ScriptError, Status};
use crate::runtime::Engine;
use crate::script::compile::{Op, OpKind};

#[derive(Debug, Clone)]
pub enum DebugOp {
    /// Runs one op out of band in the innermost frame, leaving the
    /// cursor alone.
    Interleave(Op),
    /// Runs the op at the cursor and advances past it.
    SingleStep,
    /// Advances past the op at the cursor without running it.
    SkipStep,
    /// Enters the call at the cursor, making the callee the innermost
    /// frame. Does nothing on a non call op.
    StepIn,
    /// Runs the innermost frame to its end and returns to the caller.
    StepOut,
}

/// One queued debug operation, stacked over the ones queued before it.
#[derive(Debug)]
pub struct DebugState {
    op: DebugOp,
    sup: Option<Box<DebugState>>,
}

impl DebugState {
    pub fn push(states: &mut Option<Box<DebugState>>, op: DebugOp) {
        let sup = states.take();
        *states = Some(Box::new(DebugState { op, sup }));
    }
}

impl Engine {
    /// Applies the newest queued debug operation to the innermost frame
    /// of `frame`'s call chain. The operation is dequeued when it
    /// settles.
    pub fn execute_debug(
        &mut self,
        states: &mut Option<Box<DebugState>>,
        frame: &mut Frame,
        args: &mut ArgMap,
        gvars: VarMap,
        host: Option<&mut dyn Any>,
    ) -> Status {
        let Some(state) = states.as_deref() else {
            return Status::Ok;
        };
        let op = state.op.clone();
        let (ret, _) = self.debug_step(&op, frame, args, gvars, host);
        if ret.is_settled() {
            if let Some(done) = states.take() {
                *states = done.sup;
            }
        }
        ret
    }

    /// Descends to the innermost frame and applies `op` there. The
    /// returned flag reports that the frame ran off its end, which
    /// unwinds one level at the immediate caller.
    fn debug_step(
        &mut self,
        op: &DebugOp,
        frame: &mut Frame,
        args: &mut ArgMap,
        gvars: VarMap,
        mut host: Option<&mut dyn Any>,
    ) -> (Status, bool) {
        if frame.sub_state.is_some() {
            let f = &mut *frame;
            let (Some(cs), Some(child)) = (f.call_state.as_mut(), f.sub_state.as_mut()) else {
                error!(
                    self.logger,
                    "Debug operation failed! Script state is out of the debug scope or invalid."
                );
                return (Status::Err(ScriptError::Interrupt), false);
            };
            let (ret, stepped_out) = self.debug_step(
                op,
                child,
                &mut cs.args,
                gvars.clone(),
                host.as_mut().map(|h| &mut **h),
            );
            if stepped_out {
                frame.sub_state = None;
                let mut scope = Scope {
                    frame,
                    args,
                    gvars,
                    host,
                };
                self.finish_call(&mut scope);
                scope.frame.cursor += 1;
            }
            return (ret, false);
        }

        let valid = self
            .functions
            .get(&frame.fx_name)
            .is_some_and(|fx| Rc::ptr_eq(fx, &frame.fx))
            && frame.cursor <= frame.fx.ops.len();
        if !valid {
            error!(
                self.logger,
                "Debug operation failed! Script state is out of the debug scope or invalid."
            );
            return (Status::Err(ScriptError::Interrupt), false);
        }

        let fx = Rc::clone(&frame.fx);
        frame.time_limit += now_ms() as i64;

        let mut ret = Status::Ok;
        let mut stepped_out = false;
        match op {
            DebugOp::Interleave(extra) => {
                let mut scope = Scope {
                    frame: &mut *frame,
                    args,
                    gvars,
                    host,
                };
                ret = self.execute_op(extra, &mut scope);
            }

            DebugOp::SingleStep => {
                if frame.cursor >= fx.ops.len() {
                    stepped_out = true;
                } else {
                    let mut scope = Scope {
                        frame: &mut *frame,
                        args,
                        gvars,
                        host,
                    };
                    ret = self.execute_op(&fx.ops[scope.frame.cursor], &mut scope);
                    if ret == Status::Ok {
                        frame.cursor += 1;
                        if frame.cursor >= fx.ops.len() {
                            stepped_out = true;
                        }
                    }
                }
            }

            DebugOp::SkipStep => {
                frame.cursor += 1;
                if frame.cursor >= fx.ops.len() {
                    stepped_out = true;
                }
            }

            DebugOp::StepIn => {
                if frame.cursor < fx.ops.len() {
                    if let OpKind::Call {
                        function,
                        args: call_args,
                    } = &fx.ops[frame.cursor].kind
                    {
                        let line = fx.ops[frame.cursor].line;
                        let mut scope = Scope {
                            frame: &mut *frame,
                            args: &mut *args,
                            gvars: gvars.clone(),
                            host: host.as_mut().map(|h| &mut **h),
                        };
                        match self.prepare_call(line, function, call_args, &mut scope) {
                            Ok(()) => {
                                let callee = frame
                                    .call_state
                                    .as_ref()
                                    .map(|cs| cs.function.clone())
                                    .unwrap_or_default();
                                match self.functions.get(&callee) {
                                    Some(callee_fx) => {
                                        // step in keeps the caller's depth budget
                                        let child = Frame::new(
                                            Rc::clone(callee_fx),
                                            callee,
                                            if frame.next_pause != 0 { u64::MAX } else { 0 },
                                            frame.depth_limit,
                                            frame.time_limit - now_ms() as i64,
                                        );
                                        frame.sub_state = Some(Box::new(child));
                                    }
                                    None => {
                                        let mut scope = Scope {
                                            frame: &mut *frame,
                                            args,
                                            gvars,
                                            host,
                                        };
                                        self.finish_call(&mut scope);
                                        error!(
                                            self.logger,
                                            "Function: {callee} Not Found in the debug scope"
                                        );
                                        ret = Status::Err(ScriptError::NotFound);
                                    }
                                }
                            }
                            Err(err) => ret = Status::Err(err),
                        }
                    }
                }
            }

            DebugOp::StepOut => {
                while frame.cursor < fx.ops.len() {
                    if now_ms() as i64 > frame.time_limit {
                        error!(
                            self.logger,
                            "Function: \"{}\" has to be terminated; time limit reached",
                            frame.fx_name
                        );
                        ret = Status::Err(ScriptError::Time);
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
                if ret.is_settled() {
                    stepped_out = true;
                }
            }
        }
        frame.time_limit -= now_ms() as i64;

        (ret, stepped_out)
    }
}
