//! Control flow preprocessor.
//!
//! Rewrites structured statements (if/else/loop/break/continue/exit)
//! into labels and conditional gotos, extracts bracketed member access
//! into dotted paths with hoisted temporaries, collects Data segments,
//! and rewrites object function calls into indirect calls with a
//! `this` argument. Synthesized lines are pushed back onto the work
//! queue and re-processed like source lines.

use std::collections::{BTreeMap, VecDeque};

use turi_config::Phase;

use crate::runtime::ops::to_int;
use crate::script::error::LoadError;
use crate::script::expr::{has_operator, Expr, Exprs};
use crate::script::parse::{describe_line, get_word, parse_line, split_blocks};
use crate::script::print::print_exprs;

/// One preprocessed statement, ready for compilation.
#[derive(Debug, Clone)]
pub struct Block {
    pub exprs: Exprs,
    pub line: usize,
    pub brk: bool,
}

#[derive(Debug, Default)]
pub struct Preprocessed {
    pub blocks: Vec<Block>,
    pub segments: BTreeMap<String, Vec<String>>,
}

#[derive(PartialEq)]
enum CtrlKind {
    If,
    Else,
    Loop,
}

struct CtrlScope {
    kind: CtrlKind,
    name: String,
    ends: Vec<String>,
}

fn fail(lines: &[String], number: usize, reason: &str) -> LoadError {
    LoadError::at_line(
        number,
        format!(
            "Failed to pre process line: {}; {}",
            describe_line(lines, number),
            reason
        ),
    )
    .in_phase(Phase::Preprocessor)
}

fn parse_fail(lines: &[String], number: usize) -> LoadError {
    LoadError::at_line(
        number,
        format!("Failed to parse line: {}", describe_line(lines, number)),
    )
    .in_phase(Phase::Parser)
}

pub fn preprocess(lines: &[String]) -> Result<Preprocessed, LoadError> {
    let mut out = Preprocessed::default();
    let mut queue: VecDeque<(String, usize)> = lines
        .iter()
        .enumerate()
        .map(|(i, l)| (l.clone(), i + 1))
        .collect();

    let mut counter: i32 = 1;
    let mut in_function = false;
    let mut segment: Option<String> = None;
    let mut ctrl: Vec<CtrlScope> = Vec::new();

    while let Some((raw, lno)) = queue.pop_front() {
        let mut offset = 0usize;
        let first = get_word(&raw, &mut offset);
        if first.is_empty() || first.starts_with('\'') {
            continue;
        }

        if let Some(name) = segment.clone() {
            if first == "Data" && get_word(&raw, &mut offset) == "End" {
                segment = None;
            } else if let Some(res) = out.segments.get_mut(&name) {
                res.push(raw.clone());
            }
            continue;
        }

        if !in_function {
            let name = get_word(&raw, &mut offset);
            if name.is_empty() {
                return Err(fail(
                    lines,
                    lno,
                    &format!("{first} begin does not have a valid name"),
                ));
            }
            if get_word(&raw, &mut offset) != "Begin" {
                return Err(fail(lines, lno, &format!("is not a valid {first} begin")));
            }
            if first == "Function" {
                in_function = true;
            } else if first == "Data" {
                if out.segments.contains_key(&name) {
                    return Err(LoadError::at_line(
                        lno,
                        format!("Data: {name} already exists"),
                    ));
                }
                out.segments.insert(name.clone(), Vec::new());
                segment = Some(name);
                continue;
            }
            // the begin line itself flows to the compiler
        } else if first == "Function" && get_word(&raw, &mut offset) == "End" {
            // every function gets a terminal label for exit jumps
            if let Some(eof) = parse_line("eof:", None) {
                out.blocks.push(Block {
                    exprs: eof,
                    line: lno,
                    brk: false,
                });
            }
            in_function = false;
            // the end marker flows to the compiler as well
        }

        let mut line = raw;
        let mut brk = false;
        if first == "?" {
            brk = true;
            if let Some(pos) = line.find('?') {
                line.remove(pos);
            }
        }
        let tab: String = line
            .chars()
            .take_while(|c| matches!(c, ' ' | '\t'))
            .collect();

        let mut comment = String::new();
        let Some(exprs) = parse_line(&line, Some(&mut comment)) else {
            return Err(parse_fail(lines, lno));
        };
        let word = exprs.text(0).to_string();

        let object_fn = word.contains(".[") && !word.starts_with('[') && exprs.is_group(1);
        let control = matches!(
            word.as_str(),
            "end" | "if" | "else" | "loop" | "break" | "continue" | "exit"
        );

        if !object_fn && !control {
            let mut exprs = exprs;
            let mut hoisted: BTreeMap<String, String> = BTreeMap::new();
            let Ok(changes) = extract_block(&mut exprs, &mut hoisted, &mut counter) else {
                return Err(fail(lines, lno, "invalid blocks"));
            };
            if changes > 0 {
                // hoisted temporaries first, then the rewritten line
                let mut synth: Vec<(String, usize)> = hoisted
                    .iter()
                    .map(|(tmp, inner)| (format!("{tab}{tmp} = {inner}"), lno))
                    .collect();
                let mut main = String::new();
                if brk {
                    main.push_str("? ");
                }
                main.push_str(&tab);
                main.push_str(&print_exprs(&exprs));
                append_comment(&mut main, &comment);
                synth.push((main, lno));
                push_front_all(&mut queue, synth);
            } else {
                out.blocks.push(Block {
                    exprs,
                    line: lno,
                    brk,
                });
            }
            continue;
        }

        if object_fn {
            let function = word;
            let args = exprs.get(1).and_then(Expr::as_group);
            let (Some(args), true) = (args, exprs.len() == 2) else {
                return Err(fail(lines, lno, "not a valid function call"));
            };
            let mut this_clause = String::new();
            if !args.is_empty() {
                this_clause.push_str(", ");
            }
            this_clause.push_str("this = ");
            let pos = function.rfind(['.', '[']).unwrap_or(0);
            this_clause.push_str(&function[..pos]);

            let mut rewritten = String::new();
            if brk {
                rewritten.push_str("? ");
            }
            rewritten.push_str(&tab);
            rewritten.push('[');
            rewritten.push_str(&function);
            rewritten.push_str("] (");
            rewritten.push_str(&print_exprs(args));
            rewritten.push_str(&this_clause);
            rewritten.push(')');
            append_comment(&mut rewritten, &comment);
            queue.push_front((rewritten, lno));
            continue;
        }

        let mut synth: Vec<(String, usize)> = Vec::new();
        match word.as_str() {
            "end" => {
                let Some(scope) = ctrl.pop() else {
                    return Err(fail(lines, lno, "out of place \"end\" statement"));
                };
                for end in scope.ends.iter().rev() {
                    let mut l = end.clone();
                    append_comment(&mut l, &comment);
                    synth.push((l, lno));
                }
            }
            "if" => {
                let name = counter.to_string();
                counter += 1;
                let Some(conds) = exprs.get(1).and_then(Expr::as_group) else {
                    return Err(fail(lines, lno, "invalid \"if\" statement"));
                };
                let mut jump = String::new();
                if brk {
                    jump.push_str("? ");
                }
                jump.push_str(&tab);
                jump.push_str(&format!("goto !({}) end_if_{}", print_exprs(conds), name));
                append_comment(&mut jump, &comment);
                synth.push((jump, lno));

                let ends = vec![format!("{tab}end_if_{name}:")];
                if exprs.text(2) == "then" {
                    match queue.pop_front() {
                        Some((stmt, stmt_lno)) => {
                            let mut o = 0usize;
                            let sw = get_word(&stmt, &mut o);
                            if matches!(sw.as_str(), "if" | "else" | "loop" | "end") {
                                return Err(fail(
                                    lines,
                                    stmt_lno,
                                    "\"if (...) then\" can only be followed by a simple statement",
                                ));
                            }
                            synth.push((stmt, stmt_lno));
                            synth.push(("end".to_string(), stmt_lno));
                        }
                        None => synth.push(("end".to_string(), lno)),
                    }
                }
                ctrl.push(CtrlScope {
                    kind: CtrlKind::If,
                    name,
                    ends,
                });
            }
            "else" => {
                let Some(top) = ctrl.last_mut() else {
                    return Err(fail(lines, lno, "\"else\", outside \"if\" block"));
                };
                if top.kind != CtrlKind::If {
                    return Err(fail(lines, lno, "\"else\", outside \"if\" block"));
                }
                synth.push((format!("{tab}goto end_else_{}", top.name), lno));
                if let Some(mut end_if) = top.ends.pop() {
                    append_comment(&mut end_if, &comment);
                    synth.push((end_if, lno));
                }
                top.ends.push(format!("{tab}end_else_{}:", top.name));

                if exprs.text(1) == "if" {
                    let name = counter.to_string();
                    counter += 1;
                    top.name = name.clone();
                    let Some(conds) = exprs.get(2).and_then(Expr::as_group) else {
                        return Err(fail(lines, lno, "invalid \"else if\" statement"));
                    };
                    let mut jump = String::new();
                    if brk {
                        jump.push_str("? ");
                    }
                    jump.push_str(&tab);
                    jump.push_str(&format!("goto !({}) end_if_{}", print_exprs(conds), name));
                    synth.push((jump, lno));
                    top.ends.push(format!("{tab}end_if_{name}:"));
                } else {
                    top.kind = CtrlKind::Else;
                }
            }
            "exit" => {
                let mut jump = String::new();
                if brk {
                    jump.push_str("? ");
                }
                jump.push_str(&tab);
                jump.push_str("goto eof");
                synth.push((jump, lno));
            }
            "loop" => {
                let name = counter.to_string();
                counter += 1;
                let mut label = format!("{tab}loop_{name}:");
                append_comment(&mut label, &comment);
                synth.push((label, lno));

                if let Some(conds) = exprs.get(1) {
                    // loops can be unconditional
                    let Some(conds) = conds.as_group() else {
                        return Err(fail(lines, lno, "invalid \"loop\" statement"));
                    };
                    let mut jump = String::new();
                    if brk {
                        jump.push_str("? ");
                    }
                    jump.push_str(&tab);
                    jump.push_str(&format!(
                        "goto !({}) end_loop_{}",
                        print_exprs(conds),
                        name
                    ));
                    synth.push((jump, lno));
                }
                ctrl.push(CtrlScope {
                    kind: CtrlKind::Loop,
                    name: name.clone(),
                    ends: vec![
                        format!("{tab}end_loop_{name}:"),
                        format!("{tab}goto loop_{name}"),
                    ],
                });
            }
            "break" | "continue" => {
                let mut remaining = if exprs.len() > 1 {
                    to_int(exprs.text(1))
                } else {
                    1
                };
                let mut target: Option<&CtrlScope> = None;
                for scope in ctrl.iter().rev() {
                    if scope.kind == CtrlKind::Loop {
                        remaining -= 1;
                        if remaining == 0 {
                            target = Some(scope);
                            break;
                        }
                    }
                }
                let Some(target) = target else {
                    return Err(fail(
                        lines,
                        lno,
                        &format!("out of place \"{word}\" statement"),
                    ));
                };
                let mut jump = String::new();
                if brk {
                    jump.push_str("? ");
                }
                jump.push_str(&tab);
                jump.push_str("goto ");
                if word == "break" {
                    jump.push_str("end_");
                }
                jump.push_str(&format!("loop_{}", target.name));
                append_comment(&mut jump, &comment);
                synth.push((jump, lno));
            }
            _ => {}
        }
        push_front_all(&mut queue, synth);
    }

    if !ctrl.is_empty() {
        return Err(LoadError::new(
            "Failed to pre process script: Block stack is not complete",
        )
        .in_phase(Phase::Preprocessor));
    }
    Ok(out)
}

fn append_comment(line: &mut String, comment: &str) {
    if !comment.is_empty() {
        line.push(' ');
        line.push_str(comment);
    }
}

fn push_front_all(queue: &mut VecDeque<(String, usize)>, synth: Vec<(String, usize)>) {
    for item in synth.into_iter().rev() {
        queue.push_front(item);
    }
}

/// Rewrites bracketed member access inside words into dotted paths.
/// Bracket segments holding full expressions are hoisted into uniquely
/// named temporaries collected in `blocks`. Returns the number of
/// rewrites, or `Err` on unbalanced brackets.
fn extract_block(
    exprs: &mut Exprs,
    blocks: &mut BTreeMap<String, String>,
    counter: &mut i32,
) -> Result<usize, ()> {
    let mut changes = 0usize;
    for expr in exprs.iter_mut() {
        match expr {
            Expr::Group(inner) => changes += extract_block(inner, blocks, counter)?,
            Expr::Word(word) => {
                let (parts, balanced) = split_blocks(word, false);
                if !balanced || parts.is_empty() {
                    return Err(());
                }
                if parts.len() == 1 && !parts[0].starts_with('[') {
                    continue;
                }
                let mut rebuilt = String::new();
                for part in &parts {
                    if !part.starts_with('[') {
                        rebuilt.push_str(part);
                        continue;
                    }
                    let inner = part.get(1..part.len() - 1).unwrap_or("");
                    let second = inner.chars().next();
                    if has_operator(part) {
                        let tmp = format!("tmp_var_{}", *counter);
                        *counter += 1;
                        blocks.insert(tmp.clone(), inner.to_string());
                        rebuilt.push('[');
                        rebuilt.push_str(&tmp);
                        rebuilt.push(']');
                    } else if second.is_some_and(|c| c.is_ascii_digit()) {
                        rebuilt.push('.');
                        rebuilt.push_str(inner);
                    } else if second == Some('"') {
                        rebuilt.push('.');
                        rebuilt.push_str(part.get(2..part.len().saturating_sub(2)).unwrap_or(""));
                    } else if !rebuilt.is_empty() && !rebuilt.ends_with('.') {
                        rebuilt.push('.');
                        rebuilt.push_str(part);
                    } else {
                        rebuilt.push_str(part);
                        continue;
                    }
                    changes += 1;
                }
                *word = rebuilt;
            }
            _ => {}
        }
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse::line_up;

    fn run(source: &str) -> Preprocessed {
        preprocess(&line_up(source)).unwrap()
    }

    fn printed(source: &str) -> Vec<String> {
        run(source)
            .blocks
            .iter()
            .map(|b| print_exprs(&b.exprs))
            .collect()
    }

    #[test]
    fn if_desugars_to_goto_and_label() {
        let lines = printed("Function main Begin\nif (a == 1)\n  x = 2\nend\nFunction End");
        assert_eq!(
            lines,
            vec![
                "Function main Begin",
                "goto ! (a == 1) end_if_1",
                "x = 2",
                "end_if_1 :",
                "eof :",
                "Function End",
            ]
        );
    }

    #[test]
    fn else_chains_jump_past_each_other() {
        let lines = printed(
            "Function main Begin\nif (a)\n x = 1\nelse\n x = 2\nend\nFunction End",
        );
        assert_eq!(
            lines,
            vec![
                "Function main Begin",
                "goto ! (a) end_if_1",
                "x = 1",
                "goto end_else_1",
                "end_if_1 :",
                "x = 2",
                "end_else_1 :",
                "eof :",
                "Function End",
            ]
        );
    }

    #[test]
    fn loop_emits_back_jump_before_end_label() {
        let lines = printed(
            "Function main Begin\nloop (i < 3)\n i = i + 1\nend\nFunction End",
        );
        assert_eq!(
            lines,
            vec![
                "Function main Begin",
                "loop_1 :",
                "goto ! (i < 3) end_loop_1",
                "i = i + 1",
                "goto loop_1",
                "end_loop_1 :",
                "eof :",
                "Function End",
            ]
        );
    }

    #[test]
    fn break_and_continue_target_enclosing_loops() {
        let lines = printed(
            "Function main Begin\nloop\nloop\nbreak 2\ncontinue\nend\nend\nFunction End",
        );
        assert!(lines.contains(&"goto end_loop_1".to_string()));
        assert!(lines.contains(&"goto loop_2".to_string()));
    }

    #[test]
    fn then_takes_the_next_statement() {
        let lines = printed("Function main Begin\nif (a) then\nexit\nFunction End");
        assert_eq!(
            lines,
            vec![
                "Function main Begin",
                "goto ! (a) end_if_1",
                "goto eof",
                "end_if_1 :",
                "eof :",
                "Function End",
            ]
        );
    }

    #[test]
    fn then_rejects_nested_blocks() {
        let err =
            preprocess(&line_up("Function main Begin\nif (a) then\nloop\nend\nFunction End"))
                .unwrap_err();
        assert!(err.message.contains("simple statement"), "{}", err.message);
    }

    #[test]
    fn data_segments_are_captured_verbatim() {
        let out = run("Data greeting Begin\nhello world\n  two\nData End\nFunction main Begin\nFunction End");
        assert_eq!(
            out.segments.get("greeting"),
            Some(&vec!["hello world".to_string(), "  two".to_string()])
        );
        assert_eq!(out.blocks.len(), 3);
    }

    #[test]
    fn duplicate_data_segment_fails() {
        let err = preprocess(&line_up(
            "Data d Begin\nData End\nData d Begin\nData End",
        ))
        .unwrap_err();
        assert!(err.message.contains("already exists"));
    }

    #[test]
    fn bracket_expressions_hoist_temporaries() {
        let lines = printed("Function main Begin\nx = list.[i + 1]\nFunction End");
        assert_eq!(
            lines,
            vec![
                "Function main Begin",
                "tmp_var_1 = i + 1",
                "x = list.[tmp_var_1]",
                "eof :",
                "Function End",
            ]
        );
    }

    #[test]
    fn numeric_brackets_become_dotted_members() {
        let lines = printed("Function main Begin\nx = list[0]\nFunction End");
        assert_eq!(lines[1], "x = list.0");
    }

    #[test]
    fn object_call_gains_this_argument() {
        let lines = printed("Function main Begin\nobj.[handler] (v = 1)\nFunction End");
        assert!(
            lines[1].starts_with("[obj.[handler]] ("),
            "{}",
            lines[1]
        );
        assert!(lines[1].contains("this = obj"), "{}", lines[1]);
    }

    #[test]
    fn unterminated_block_fails() {
        let err = preprocess(&line_up("Function main Begin\nloop\nFunction End")).unwrap_err();
        assert!(err.message.contains("Block stack"));
    }

    #[test]
    fn break_marker_is_stripped_and_flagged() {
        let out = run("Function main Begin\n? x = 1\nFunction End");
        assert!(out.blocks[1].brk);
        assert_eq!(print_exprs(&out.blocks[1].exprs), "x = 1");
    }
}
