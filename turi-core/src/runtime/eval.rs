//! Equation evaluator.
//!
//! Walks an ordered expression list left to right, resolving operands
//! through the variable layer and applying operators pairwise into an
//! accumulator cell. Parenthesized groups recurse with their own
//! temporary set; named temporaries are written back to their source
//! variables only when the whole statement succeeds.

use crate::runtime::frame::{new_value, Scope, TempSlot, Value};
use crate::runtime::ops::{self, is_false};
use crate::runtime::status::ScriptError;
use crate::runtime::vars::{get_variable, push_unnamed, set_variables};
use crate::script::{Expr, Exprs};

/// Evaluates `exprs` into `acc`, or into the variable named by the
/// leading expression when `acc` is `None`.
pub fn do_equation(
    acc: Option<&Value>,
    exprs: &Exprs,
    scope: &mut Scope<'_>,
) -> Result<(), ScriptError> {
    let mut temps: Vec<TempSlot> = Vec::new();
    equation_inner(acc, exprs, scope, &mut temps)?;
    set_variables(&temps, scope);
    Ok(())
}

fn equation_inner(
    acc_in: Option<&Value>,
    exprs: &Exprs,
    scope: &mut Scope<'_>,
    temps: &mut Vec<TempSlot>,
) -> Result<(), ScriptError> {
    let acc: Value;
    let mut operator: String;
    let mut counter: usize;
    match acc_in {
        Some(value) => {
            acc = value.clone();
            operator = "=".to_string();
            counter = 0;
        }
        None => {
            acc = get_variable(exprs.text(0), scope, temps).ok_or(ScriptError::Argument)?;
            operator = exprs.text(1).to_string();
            counter = 2;
        }
    }

    loop {
        // Ternary selection is handled on the operator itself, the
        // not taken branch is skipped without evaluation.
        if operator == "?" {
            operator = "=".to_string();
            if is_false(&acc.borrow()) {
                counter += 1;
                if exprs.text(counter) != ":" {
                    return Err(ScriptError::Syntax);
                }
                counter += 1;
                continue;
            }
        } else if operator == ":" {
            counter += 1;
            if exprs.get(counter).is_some() {
                return Err(ScriptError::Syntax);
            }
            break;
        }

        let expr = exprs.get(counter).ok_or(ScriptError::Argument)?;
        counter += 1;

        let operand: Value = match expr {
            Expr::Group(group) => {
                let target: Value;
                if group.text(1) == "=" {
                    let head = group.get(0).ok_or(ScriptError::Syntax)?;
                    if head.is_group() || head.is_op() {
                        return Err(ScriptError::Syntax);
                    }
                    target =
                        get_variable(head.text(), scope, temps).ok_or(ScriptError::Argument)?;
                } else {
                    target = push_unnamed(temps, "");
                }
                do_equation(Some(&target), group, scope)?;
                target
            }
            Expr::Op(op) => {
                // A leading operator acts as a unary prefix.
                if counter != 1 {
                    return Err(ScriptError::Syntax);
                }
                operator = op.clone();
                continue;
            }
            _ => {
                if let Some(Expr::Group(group)) = exprs.get(counter) {
                    counter += 1;
                    let mut args: Vec<String> = Vec::new();
                    for sub in group.iter() {
                        let arg = sub.as_group().ok_or(ScriptError::Argument)?;
                        let value = new_value("");
                        do_equation(Some(&value), arg, scope)?;
                        args.push(value.borrow().clone());
                    }
                    let result = ops::do_function(expr.text(), &args)?;
                    push_unnamed(temps, result)
                } else {
                    get_variable(expr.text(), scope, temps).ok_or(ScriptError::Argument)?
                }
            }
        };

        ops::do_operation(&acc, &operator, &operand)?;

        match exprs.get(counter) {
            None => break,
            Some(Expr::Op(op)) => {
                operator = op.clone();
                counter += 1;
            }
            Some(_) => return Err(ScriptError::Syntax),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::frame::{ArgMap, Frame};
    use crate::runtime::vars::set_variable;
    use crate::script::{order_equation, parse_line, Function};
    use std::collections::BTreeMap;
    use std::rc::Rc;

    fn with_scope<R>(run: impl FnOnce(&mut Scope<'_>) -> R) -> R {
        let fx = Rc::new(Function {
            name: "test".to_string(),
            ops: Vec::new(),
        });
        let mut frame = Frame::new(fx, "test", 0, 100, 1000);
        let gvars = Rc::new(std::cell::RefCell::new(BTreeMap::new()));
        let mut args = ArgMap::new();
        let mut scope = Scope {
            frame: &mut frame,
            args: &mut args,
            gvars,
            host: None,
        };
        run(&mut scope)
    }

    fn equation(source: &str) -> Exprs {
        let mut exprs = parse_line(source, None).unwrap();
        order_equation(&mut exprs, false).unwrap();
        exprs
    }

    fn run(source: &str, scope: &mut Scope<'_>) -> Result<(), ScriptError> {
        do_equation(None, &equation(source), scope)
    }

    fn read(name: &str, scope: &mut Scope<'_>) -> String {
        let mut temps = Vec::new();
        get_variable(name, scope, &mut temps)
            .map(|v| v.borrow().clone())
            .unwrap_or_default()
    }

    #[test]
    fn assignment_and_arithmetic() {
        with_scope(|scope| {
            run("x = 2 + 3 * 4", scope).unwrap();
            assert_eq!(read("x", scope), "14");
            run("x = (2 + 3) * 4", scope).unwrap();
            assert_eq!(read("x", scope), "20");
        });
    }

    #[test]
    fn string_concat_and_compare() {
        with_scope(|scope| {
            set_variable("name", "world", scope);
            run("greet = \"hello \" & name", scope).unwrap();
            assert_eq!(read("greet", scope), "hello world");
            run("same = greet == \"hello world\"", scope).unwrap();
            assert_eq!(read("same", scope), "true");
        });
    }

    #[test]
    fn ternary_takes_one_branch() {
        with_scope(|scope| {
            set_variable("flag", "true", scope);
            run("x = flag ? \"yes\" : \"no\"", scope).unwrap();
            assert_eq!(read("x", scope), "yes");
            set_variable("flag", "0", scope);
            run("x = flag ? \"yes\" : \"no\"", scope).unwrap();
            assert_eq!(read("x", scope), "no");
        });
    }

    #[test]
    fn ternary_skips_the_untaken_branch() {
        // an untaken branch with a sub-assignment must leave no trace
        with_scope(|scope| {
            set_variable("flag", "true", scope);
            run("x = flag ? (y = 1) : (z = 2)", scope).unwrap();
            assert_eq!(read("x", scope), "1");
            assert_eq!(read("y", scope), "1");
            assert_eq!(read("z", scope), "");

            set_variable("flag", "false", scope);
            run("x2 = flag ? (y2 = 1) : (z2 = 2)", scope).unwrap();
            assert_eq!(read("x2", scope), "2");
            assert_eq!(read("z2", scope), "2");
            assert_eq!(read("y2", scope), "");
        });
    }

    #[test]
    fn inline_sub_assignment() {
        with_scope(|scope| {
            run("x = (y = 5) + 1", scope).unwrap();
            assert_eq!(read("x", scope), "6");
            assert_eq!(read("y", scope), "5");
        });
    }

    #[test]
    fn unary_prefix_in_group() {
        with_scope(|scope| {
            set_variable("flag", "false", scope);
            run("x = (! flag)", scope).unwrap();
            assert_eq!(read("x", scope), "true");
        });
    }

    #[test]
    fn intrinsic_function_call() {
        with_scope(|scope| {
            set_variable("text", "  padded  ", scope);
            run("x = Trim(text)", scope).unwrap();
            assert_eq!(read("x", scope), "padded");
            run("n = Len(text) - 4", scope).unwrap();
            assert_eq!(read("n", scope), "6");
        });
    }

    #[test]
    fn structured_member_assignment() {
        with_scope(|scope| {
            run("obj.count = 1 + 2", scope).unwrap();
            assert_eq!(read("obj.count", scope), "3");
            assert_eq!(read("obj", scope), "{\"count\":\"3\"}");
        });
    }

    #[test]
    fn missing_operand_is_an_argument_error() {
        with_scope(|scope| {
            assert!(matches!(
                run("x = 1 +", scope),
                Err(ScriptError::Argument)
            ));
        });
    }

    #[test]
    fn ternary_trailing_token_is_a_syntax_error() {
        with_scope(|scope| {
            set_variable("flag", "true", scope);
            assert!(matches!(
                run("x = flag ? 1 : 2 : 3", scope),
                Err(ScriptError::Syntax)
            ));
        });
    }
}
