//! Expression reducer.
//!
//! Normalizes a flat token list into nested groups so that evaluation
//! can proceed strictly left to right. Higher binding operators get
//! wrapped into sub groups, function call shapes get their argument
//! chunks normalized, and chained assignments nest to the right.

use crate::script::expr::{operator_level, Expr, Exprs};

const OP_LEVELS: usize = 7;

/// Reorders `exprs` in place. With `sub` the list is a subordinate
/// group; otherwise it is a top level equation whose first two
/// elements (target and operator) stay untouched.
pub fn order_equation(exprs: &mut Exprs, sub: bool) -> Result<(), String> {
    // keep a = b & a & c from clobbering a mid evaluation
    if !sub && exprs.len() > 3 && exprs.text(1) == "=" {
        let count = exprs.len();
        if !exprs.subordinate(2, count - 2) {
            return Err("malformed expression".to_string());
        }
    }

    let mut prev: isize = if sub { -1 } else { 1 };
    let mut order: Vec<u8> = vec![0];
    let mut start = [0isize; OP_LEVELS];
    let mut i: isize = 0;
    while i <= exprs.len() as isize {
        let mut exp_str = String::new();
        if (i as usize) < exprs.len() {
            let idx = i as usize;
            if exprs.is_group(idx) {
                if idx > 0 && !exprs.is_op(idx - 1) {
                    // function call shape: word followed by a group
                    normalize_arguments(
                        exprs
                            .get_mut(idx)
                            .and_then(Expr::as_group_mut)
                            .ok_or_else(|| "malformed expression".to_string())?,
                    )?;
                    // wrap callee and arguments so later sorting cannot
                    // tear them apart
                    i -= 1;
                    if !exprs.subordinate(i as usize, 2) {
                        return Err("malformed expression".to_string());
                    }
                    i += 1;
                    continue;
                }

                order_equation(
                    exprs
                        .get_mut(idx)
                        .and_then(Expr::as_group_mut)
                        .ok_or_else(|| "malformed expression".to_string())?,
                    true,
                )?;
                i += 1;
                continue;
            }

            match exprs.get(idx) {
                Some(e) if e.is_op() => exp_str = e.text().to_string(),
                _ => {
                    i += 1;
                    continue;
                }
            }
        }

        if i < if sub { 0 } else { 2 } {
            i += 1;
            continue;
        }

        if i == prev + 1 {
            // two operators in a row, fold the unary run
            let mut togo: isize = 1;
            let mut index = i;
            loop {
                let was_op = exprs.is_op((i + togo) as usize);
                togo += 1;
                if !was_op {
                    break;
                }
            }
            if togo == exprs.len() as isize {
                togo -= 1;
                index += 1;
            }
            if togo > 1 {
                if !exprs.subordinate(index as usize, togo as usize) {
                    return Err("malformed expression".to_string());
                }
                continue;
            }
        }

        prev = i;
        if i == 0 {
            i += 1;
            continue;
        }

        let level =
            operator_level(&exp_str).ok_or_else(|| format!("unknown operator \"{exp_str}\""))?;
        let back = order.last().copied().unwrap_or(0);
        if level < back {
            // step down, subordinate the tighter binding run
            let index = start[back as usize] - 1;
            order.pop();
            let togo = i - index;
            if togo < exprs.len() as isize - if sub { 0 } else { 2 } {
                i = index - 1;
                if index < 0 || !exprs.subordinate(index as usize, togo as usize) {
                    return Err("malformed expression".to_string());
                }
                i += 1;
                continue;
            }
        }
        let back = order.last().copied().unwrap_or(0);
        if level > back {
            order.push(level);
            start[level as usize] = i;
        }
        i += 1;
    }

    // a = b = c + d nests into a = (b = c + d) so both targets get the sum
    let mut i = if sub { 0 } else { 2 };
    while i < exprs.len() {
        if i > 0 && !exprs.is_group(i) && exprs.text(i) == "=" {
            let count = exprs.len();
            exprs.subordinate(i - 1, count - (i - 1));
        }
        i += 1;
    }

    Ok(())
}

/// Splits a call argument group at commas, normalizing each chunk as a
/// subordinate equation and dropping the separators.
fn normalize_arguments(group: &mut Exprs) -> Result<(), String> {
    let mut j = 0usize;
    while j < group.len() {
        let mut togo = 1usize;
        while group.text(j + togo) != "," && j + togo < group.len() {
            togo += 1;
        }
        if !group.subordinate(j, togo) {
            return Err("malformed expression".to_string());
        }
        order_equation(
            group
                .get_mut(j)
                .and_then(Expr::as_group_mut)
                .ok_or_else(|| "malformed expression".to_string())?,
            true,
        )?;
        group.remove(j + 1);
        j += 1;
    }
    Ok(())
}
