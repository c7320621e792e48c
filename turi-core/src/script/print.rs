//! Canonical text rendering of expressions and compiled instructions.
//!
//! The output parses back to an equivalent program, which keeps state
//! dumps and round trips honest.

use crate::script::compile::{Function, Op, OpKind};
use crate::script::expr::{Expr, Exprs};

/// Re-escapes the control characters the tokenizer decodes.
pub fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        let code = match ch {
            '\\' => Some('\\'),
            '\'' => Some('\''),
            '"' => Some('"'),
            '\u{7}' => Some('a'),
            '\u{8}' => Some('b'),
            '\u{c}' => Some('f'),
            '\n' => Some('n'),
            '\r' => Some('r'),
            '\t' => Some('t'),
            '\u{b}' => Some('v'),
            _ => None,
        };
        match code {
            Some(c) => {
                out.push('\\');
                out.push(c);
            }
            None => out.push(ch),
        }
    }
    out
}

fn quoted_body(text: &str) -> &str {
    text.get(1..text.len().saturating_sub(1)).unwrap_or("")
}

pub fn print_exprs(exprs: &Exprs) -> String {
    let mut out = String::new();
    for expr in exprs.iter() {
        if !out.is_empty() && !out.ends_with(' ') {
            out.push(' ');
        }
        match expr {
            Expr::Group(inner) => {
                out.push('(');
                out.push_str(&print_exprs(inner));
                out.push(')');
            }
            Expr::Str(s) => {
                out.push('"');
                out.push_str(&escape_string(quoted_body(s)));
                out.push('"');
            }
            Expr::Word(w) | Expr::Op(w) => out.push_str(w),
        }
    }
    out
}

pub fn print_op(op: &Op) -> String {
    let mut out = String::new();
    match &op.kind {
        OpKind::Label(name) => {
            out.push_str(name);
            out.push(':');
        }
        OpKind::Goto {
            label,
            not,
            conditions,
        } => {
            out.push_str("goto ");
            if let Some(conds) = conditions {
                if *not {
                    out.push('!');
                }
                out.push('(');
                out.push_str(&print_exprs(conds));
                out.push_str(") ");
            }
            out.push_str(label);
        }
        OpKind::Equation(exprs) => out.push_str(&print_exprs(exprs)),
        OpKind::Call { function, args } => {
            out.push_str(function);
            out.push_str(" ( ");
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&arg.name);
                out.push(' ');
                out.push_str(arg.assign.as_str());
                out.push(' ');
                match &arg.value {
                    Expr::Group(inner) => {
                        out.push('(');
                        out.push_str(&print_exprs(inner));
                        out.push(')');
                    }
                    Expr::Str(s) => {
                        out.push('"');
                        out.push_str(&escape_string(quoted_body(s)));
                        out.push('"');
                    }
                    other => out.push_str(other.text()),
                }
            }
            out.push_str(" )");
        }
    }
    out
}

pub fn print_function(function: &Function) -> String {
    let mut out = String::new();
    for op in &function.ops {
        out.push_str(&print_op(op));
        out.push('\n');
    }
    out
}

/// Truncates long variable values in state dumps.
pub fn limited_print(value: &str) -> String {
    if value.len() > 1024 {
        let cut = value
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|&i| i <= 1024)
            .last()
            .unwrap_or(0);
        format!("{} ... \n({})", &value[..cut], value.len())
    } else {
        value.to_string()
    }
}
