//! Compiler from preprocessed statement blocks to typed instructions.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::script::error::LoadError;
use crate::script::expr::{Expr, Exprs};
use crate::script::parse::describe_line;
use crate::script::preprocess::Block;
use crate::script::reduce::order_equation;

/// A compiled function: a linear instruction list addressed by index.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub ops: Vec<Op>,
}

#[derive(Debug, Clone)]
pub struct Op {
    pub kind: OpKind,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub enum OpKind {
    Label(String),
    Goto {
        label: String,
        not: bool,
        conditions: Option<Exprs>,
    },
    Equation(Exprs),
    Call {
        function: String,
        args: Vec<CallArg>,
    },
}

#[derive(Debug, Clone)]
pub struct CallArg {
    pub name: String,
    pub assign: AssignMode,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignMode {
    /// `=`: the argument cell starts with the passed value.
    Direct,
    /// `:=`: an output argument, cleared before the call.
    Clear,
}

impl AssignMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignMode::Direct => "=",
            AssignMode::Clear => ":=",
        }
    }
}

#[derive(Debug, Default)]
pub struct Compiled {
    pub functions: BTreeMap<String, Rc<Function>>,
    /// Statements carrying a break marker, as (function, op index).
    pub breaks: Vec<(String, usize)>,
}

pub fn compile(blocks: Vec<Block>, lines: &[String]) -> Result<Compiled, LoadError> {
    let mut out = Compiled::default();
    let mut current: Option<(String, Vec<Op>)> = None;

    for block in blocks {
        if current.is_none() {
            // outside a function only a function begin is valid
            if block.exprs.text(0) != "Function" {
                return Err(parse_fail(
                    lines,
                    block.line,
                    "statement is invalid outside a function",
                ));
            }
            let name = block.exprs.text(1).to_string();
            if name.is_empty() {
                return Err(parse_fail(
                    lines,
                    block.line,
                    "function begin does not have a valid name",
                ));
            }
            if block.exprs.text(2) != "Begin" || block.exprs.len() > 3 {
                return Err(parse_fail(lines, block.line, "is not a valid function begin"));
            }
            if out.functions.contains_key(&name) {
                return Err(LoadError::at_line(
                    block.line,
                    format!("Function: {name} already exists"),
                ));
            }
            current = Some((name, Vec::new()));
            continue;
        }

        if block.exprs.text(0) == "Function" {
            if block.exprs.text(1) != "End" || block.exprs.len() > 2 {
                return Err(parse_fail(lines, block.line, "is not a valid function end"));
            }
            let (name, ops) = current.take().unwrap_or_default();
            out.functions.insert(name.clone(), Rc::new(Function { name, ops }));
            continue;
        }

        let kind = compile_op(block.exprs).map_err(|reason| {
            LoadError::at_line(
                block.line,
                format!(
                    "Failed to compile line: {}; {}",
                    describe_line(lines, block.line),
                    reason
                ),
            )
        })?;
        if let Some((name, ops)) = current.as_mut() {
            if block.brk {
                out.breaks.push((name.clone(), ops.len()));
            }
            ops.push(Op {
                kind,
                line: block.line,
            });
        }
    }

    if let Some((name, _)) = current {
        return Err(LoadError::new(format!(
            "Failed to parse script, last Function: {name} is not complete"
        )));
    }
    Ok(out)
}

fn parse_fail(lines: &[String], number: usize, reason: &str) -> LoadError {
    LoadError::at_line(
        number,
        format!(
            "Failed to parse line: {}; {}",
            describe_line(lines, number),
            reason
        ),
    )
}

fn take_expr(exprs: &mut Exprs, index: usize) -> Expr {
    match exprs.get_mut(index) {
        Some(slot) => std::mem::replace(slot, Expr::Word(String::new())),
        None => Expr::Word(String::new()),
    }
}

fn compile_op(mut exprs: Exprs) -> Result<OpKind, String> {
    // label
    if exprs.text(1) == ":" {
        if exprs.is_group(0) || exprs.len() > 2 {
            return Err("invalid label".to_string());
        }
        return Ok(OpKind::Label(exprs.text(0).to_string()));
    }

    // goto
    if exprs.text(0) == "goto" {
        let (not, conds_at, label_at) = match exprs.len() {
            2 => (false, None, Some(1)),
            3 => (false, Some(1), Some(2)),
            4 if exprs.text(1) == "!" => (true, Some(2), Some(3)),
            _ => (false, None, None),
        };
        let label_ok = label_at.is_some_and(|at| exprs.get(at).is_some() && !exprs.is_group(at));
        let conds_ok = conds_at.is_none_or(|at| exprs.is_group(at));
        if !label_ok || !conds_ok {
            return Err("invalid goto".to_string());
        }
        let label = label_at.map(|at| exprs.text(at).to_string()).unwrap_or_default();
        let conditions = match conds_at {
            Some(at) => match take_expr(&mut exprs, at) {
                Expr::Group(mut conds) => {
                    order_equation(&mut conds, true)
                        .map_err(|e| format!("invalid equation, {e}"))?;
                    Some(conds)
                }
                _ => return Err("invalid goto".to_string()),
            },
            None => None,
        };
        return Ok(OpKind::Goto {
            label,
            not,
            conditions,
        });
    }

    // equation
    if exprs.is_op(1) {
        order_equation(&mut exprs, false).map_err(|e| format!("invalid equation, {e}"))?;
        return Ok(OpKind::Equation(exprs));
    }

    // function call
    if exprs.is_group(1) {
        let function = exprs.text(0).to_string();
        if function.is_empty() || exprs.len() != 2 {
            return Err("invalid function call".to_string());
        }
        let Expr::Group(mut list) = take_expr(&mut exprs, 1) else {
            return Err("invalid function call".to_string());
        };

        let mut args = Vec::new();
        let mut i = 0usize;
        while i < list.len() {
            let name = list.text(i).to_string();
            i += 1;
            if name.is_empty() {
                return Err("invalid argument list".to_string());
            }
            let assign = match list.text(i) {
                "=" => AssignMode::Direct,
                ":=" => AssignMode::Clear,
                _ => return Err("invalid argument list".to_string()),
            };
            i += 1;

            let mut togo = 1usize;
            while list.text(i + togo) != "," && i + togo < list.len() {
                togo += 1;
            }
            if togo > 1 && !list.subordinate(i, togo) {
                return Err("invalid argument list".to_string());
            }
            if list.get(i).is_none() {
                return Err("invalid argument list".to_string());
            }
            let mut value = take_expr(&mut list, i);
            i += 1;

            if let Expr::Group(g) = &mut value {
                order_equation(g, true).map_err(|e| format!("invalid equation, {e}"))?;
                if assign != AssignMode::Direct {
                    return Err(
                        "Function Argument Equations must use direct assignment \"=\"".to_string()
                    );
                }
            }
            // quoted names let scripts pass arbitrary argument names
            let name = if name.starts_with('"') && name.len() >= 2 {
                name[1..name.len() - 1].to_string()
            } else {
                name
            };
            args.push(CallArg {
                name,
                assign,
                value,
            });
            i += 1; // skip the comma
        }
        return Ok(OpKind::Call { function, args });
    }

    Err("unknown expression".to_string())
}
