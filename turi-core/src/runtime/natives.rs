//! Built in native functions and the native dispatch types.
//!
//! Natives receive the call arguments as shared cells, so writing into
//! an argument writes straight through to the caller's variable. All
//! offsets and lengths are in characters, not bytes.

use std::any::Any;

use turi_log::error;

use crate::runtime::frame::{ArgMap, Value, VarMap};
use crate::runtime::ops::{
    char_vec, find_first_not_of, find_first_of, find_last_not_of, find_last_of, find_sub,
    fold_char, is_false, rfind_sub, to_int,
};
use crate::runtime::status::{ScriptError, Status};
use crate::runtime::Engine;
use crate::store::wildcard::wild_cmp;

/// Native function entry point.
pub type NativeFn = fn(&mut NativeCtx<'_>, &mut ArgMap) -> Status;

/// Context handed to a native call: the engine, the global variables of
/// the calling frame and the host object passed into the run.
pub struct NativeCtx<'a> {
    pub engine: &'a mut Engine,
    pub gvars: VarMap,
    pub host: Option<&'a mut dyn Any>,
}

pub fn get_argument(args: &ArgMap, name: &str) -> Option<Value> {
    args.get(name).cloned()
}

pub fn required(args: &ArgMap, name: &str) -> Result<Value, ScriptError> {
    get_argument(args, name).ok_or(ScriptError::Argument)
}

/// Boolean argument; absent means `default`, present means "not false".
pub fn arg_true(args: &ArgMap, name: &str, default: bool) -> bool {
    match args.get(name) {
        Some(value) => !is_false(&value.borrow()),
        None => default,
    }
}

/// Offset or length argument. Negative values saturate out of range so
/// a reverse default of `usize::MAX` means "from the end".
pub fn arg_index(args: &ArgMap, name: &str, default: usize) -> usize {
    match args.get(name) {
        Some(value) => {
            let n = to_int(&value.borrow());
            if n < 0 {
                usize::MAX
            } else {
                n as usize
            }
        }
        None => default,
    }
}

fn settle(result: Result<(), ScriptError>) -> Status {
    match result {
        Ok(()) => Status::Ok,
        Err(err) => Status::Err(err),
    }
}

pub(crate) fn register_builtins(engine: &mut Engine) {
    engine.register_native("Data", fx_data);
    engine.register_native("Quit", fx_quit);
    engine.register_native("Find", fx_find);
    engine.register_native("Match", fx_match);
    engine.register_native("Split", fx_split);
    engine.register_native("Replace", fx_replace);
    engine.register_native("SubStr", fx_substr);
    engine.register_native("Insert", fx_insert);
    engine.register_native("Erase", fx_erase);
    engine.register_native("Compare", fx_compare);
    engine.register_native("Length", fx_length);
}

/// `Data`: reads a data segment, either one line at a time through an
/// auto incrementing `Line` cursor or joined as a whole.
fn fx_data(ctx: &mut NativeCtx<'_>, args: &mut ArgMap) -> Status {
    settle(data_impl(ctx, args))
}

fn data_impl(ctx: &mut NativeCtx<'_>, args: &ArgMap) -> Result<(), ScriptError> {
    let name = required(args, "Name")?.borrow().clone();
    let data_cell = required(args, "Data")?;
    let lines = ctx
        .engine
        .segment(&name)
        .ok_or(ScriptError::Argument)?
        .to_vec();

    data_cell.borrow_mut().clear();
    if let Some(line_cell) = get_argument(args, "Line") {
        let text = line_cell.borrow().clone();
        let index = if text.is_empty() { 0 } else { parse_index(&text) };
        if index >= 0 && (index as usize) < lines.len() {
            let line = lines[index as usize].trim_matches([' ', '\t', '\r', '\n']);
            *data_cell.borrow_mut() = line.to_string();
            *line_cell.borrow_mut() = (index + 1).to_string();
        } else {
            line_cell.borrow_mut().clear();
        }
    } else {
        let nl = match get_argument(args, "NL") {
            Some(cell) => cell.borrow().clone(),
            None => "\r\n".to_string(),
        };
        let mut joined = String::new();
        for (i, line) in lines.iter().enumerate() {
            joined.push_str(line.trim_end_matches(['\r', '\n']));
            if i + 1 < lines.len() {
                joined.push_str(&nl);
            }
        }
        *data_cell.borrow_mut() = joined;
    }
    Ok(())
}

/// Line cursors distinguish "no number" from zero: garbage indexes
/// land out of range instead of restarting at the first line.
fn parse_index(text: &str) -> i64 {
    let t = text.trim();
    let digits = t.strip_prefix('-').unwrap_or(t);
    if digits.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        to_int(t)
    } else {
        -1
    }
}

/// `Quit`: ends the run; with an `Error` argument the run fails.
fn fx_quit(ctx: &mut NativeCtx<'_>, args: &mut ArgMap) -> Status {
    if let Some(cell) = get_argument(args, "Error") {
        let message = cell.borrow().clone();
        error!(ctx.engine.logger(), "Script quit with ERROR: {message}");
        return Status::Err(ScriptError::Native(message));
    }
    Status::Terminate
}

/// `Find`: locates a substring or a character of a set, forward or
/// reverse. Exactly one search mode may be given; `Pos` receives the
/// position or -1.
fn fx_find(_ctx: &mut NativeCtx<'_>, args: &mut ArgMap) -> Status {
    settle(find_impl(args))
}

fn find_impl(args: &ArgMap) -> Result<(), ScriptError> {
    let hay = char_vec(&required(args, "Str")?.borrow());
    let pos_cell = required(args, "Pos")?;
    if args.contains_key("Sub") || args.contains_key("Len") {
        return Err(ScriptError::Argument);
    }
    let modes = ["Find", "RFind", "OneOf", "ROneOf", "NoneOf", "RNoneOf"];
    if modes.iter().filter(|m| args.contains_key(**m)).count() != 1 {
        return Err(ScriptError::Argument);
    }
    let icase = arg_true(args, "ICase", true);

    let found = if let Some(pat) = get_argument(args, "Find") {
        let needle = char_vec(&pat.borrow());
        find_sub(&hay, &needle, arg_index(args, "Off", 0), icase)
    } else if let Some(pat) = get_argument(args, "RFind") {
        let needle = char_vec(&pat.borrow());
        rfind_sub(&hay, &needle, arg_index(args, "Off", usize::MAX), icase)
    } else if let Some(set) = get_argument(args, "OneOf") {
        find_first_of(&hay, &char_vec(&set.borrow()), arg_index(args, "Off", 0))
    } else if let Some(set) = get_argument(args, "ROneOf") {
        find_last_of(
            &hay,
            &char_vec(&set.borrow()),
            arg_index(args, "Off", usize::MAX),
        )
    } else if let Some(set) = get_argument(args, "NoneOf") {
        find_first_not_of(&hay, &char_vec(&set.borrow()), arg_index(args, "Off", 0))
    } else if let Some(set) = get_argument(args, "RNoneOf") {
        find_last_not_of(
            &hay,
            &char_vec(&set.borrow()),
            arg_index(args, "Off", usize::MAX),
        )
    } else {
        return Err(ScriptError::Argument);
    };

    *pos_cell.borrow_mut() = match found {
        Some(at) => at.to_string(),
        None => "-1".to_string(),
    };
    Ok(())
}

/// `Match`: compares `Str` from `Off` against `Match`, or counts the
/// non overlapping occurrences into `Count`.
fn fx_match(_ctx: &mut NativeCtx<'_>, args: &mut ArgMap) -> Status {
    settle(match_impl(args))
}

fn match_impl(args: &ArgMap) -> Result<(), ScriptError> {
    let hay = char_vec(&required(args, "Str")?.borrow());
    let pat = char_vec(&required(args, "Match")?.borrow());
    let res_cell = get_argument(args, "Res");
    let count_cell = get_argument(args, "Count");
    if res_cell.is_none() && count_cell.is_none() {
        return Err(ScriptError::Argument);
    }
    let icase = arg_true(args, "ICase", true);

    if let Some(res_cell) = res_cell {
        let offset = arg_index(args, "Off", 0).min(hay.len());
        let len = arg_index(args, "Len", usize::MAX);
        let a = &hay[offset..offset.saturating_add(len).min(hay.len())];
        let b = &pat[..len.min(pat.len())];
        let equal = a.len() == b.len()
            && a.iter().zip(b).all(|(x, y)| {
                if icase {
                    fold_char(*x) == fold_char(*y)
                } else {
                    x == y
                }
            });
        *res_cell.borrow_mut() = if equal { "true" } else { "false" }.to_string();
    } else if let Some(count_cell) = count_cell {
        let mut count = 0i64;
        if !pat.is_empty() {
            let mut pos = 0usize;
            while let Some(at) = find_sub(&hay, &pat, pos, icase) {
                count += 1;
                pos = at + pat.len();
            }
        }
        *count_cell.borrow_mut() = count.to_string();
    }
    Ok(())
}

/// `Split`: walks the pieces of `Str` one call at a time. `Index`
/// selects a piece and comes back incremented, or as -1 past the end.
fn fx_split(_ctx: &mut NativeCtx<'_>, args: &mut ArgMap) -> Status {
    settle(split_impl(args))
}

fn split_impl(args: &ArgMap) -> Result<(), ScriptError> {
    let hay = char_vec(&required(args, "Str")?.borrow());
    let seps = char_vec(&required(args, "Find")?.borrow());
    let sub_cell = required(args, "Sub")?;
    let index_cell = required(args, "Index")?;
    let icase = arg_true(args, "ICase", true);
    let keep_empty = arg_true(args, "KeepEmpty", false);
    let index = to_int(&index_cell.borrow());

    let mut count = 0i64;
    let mut pos = 0usize;
    let mut sep = 0usize;
    while sep < hay.len() {
        sep = find_sub(&hay, &seps, pos, icase).unwrap_or(hay.len());
        if sep > pos || keep_empty {
            if count == index {
                break;
            }
            count += 1;
        }
        pos = sep + seps.len().max(1);
    }

    let hit = count == index && sep > pos;
    *sub_cell.borrow_mut() = if hit {
        hay[pos..sep].iter().collect()
    } else {
        String::new()
    };
    *index_cell.borrow_mut() = if hit {
        (index + 1).to_string()
    } else {
        "-1".to_string()
    };
    Ok(())
}

/// `Replace`: replaces every match of `Find` (or the first match of
/// `FindOne`) with `Sub`, in place.
fn fx_replace(_ctx: &mut NativeCtx<'_>, args: &mut ArgMap) -> Status {
    settle(replace_impl(args))
}

fn replace_impl(args: &ArgMap) -> Result<(), ScriptError> {
    let str_cell = required(args, "Str")?;
    let sub_cell = required(args, "Sub")?;
    let find_one = get_argument(args, "FindOne");
    let single = find_one.is_some();
    let find_cell = match find_one.or_else(|| get_argument(args, "Find")) {
        Some(cell) => cell,
        None => return Err(ScriptError::Argument),
    };
    let icase = arg_true(args, "ICase", true);

    let pat = char_vec(&find_cell.borrow());
    if pat.is_empty() {
        return Ok(());
    }
    let rep = char_vec(&sub_cell.borrow());
    let mut hay = char_vec(&str_cell.borrow());

    // search continues after the inserted text, so a replacement that
    // contains the pattern does not loop
    let mut from = 0usize;
    while let Some(at) = find_sub(&hay, &pat, from, icase) {
        hay.splice(at..at + pat.len(), rep.iter().copied());
        from = at + rep.len();
        if single {
            break;
        }
    }
    *str_cell.borrow_mut() = hay.into_iter().collect();
    Ok(())
}

/// `SubStr`: copies `Len` characters from `Off` into `Sub`.
fn fx_substr(_ctx: &mut NativeCtx<'_>, args: &mut ArgMap) -> Status {
    settle(substr_impl(args))
}

fn substr_impl(args: &ArgMap) -> Result<(), ScriptError> {
    let hay = char_vec(&required(args, "Str")?.borrow());
    let sub_cell = required(args, "Sub")?;
    let off = arg_index(args, "Off", 0);
    if off > hay.len() {
        return Err(ScriptError::Argument);
    }
    let len = arg_index(args, "Len", usize::MAX);
    let end = off.saturating_add(len).min(hay.len());
    *sub_cell.borrow_mut() = hay[off..end].iter().collect();
    Ok(())
}

/// `Insert`: inserts `Sub` (optionally a slice of it) into `Str` at
/// `Pos`.
fn fx_insert(_ctx: &mut NativeCtx<'_>, args: &mut ArgMap) -> Status {
    settle(insert_impl(args))
}

fn insert_impl(args: &ArgMap) -> Result<(), ScriptError> {
    let str_cell = required(args, "Str")?;
    required(args, "Pos")?;
    let sub = char_vec(&required(args, "Sub")?.borrow());
    let pos = arg_index(args, "Pos", 0);
    let off = arg_index(args, "Off", 0);
    let len = arg_index(args, "Len", usize::MAX);

    let mut hay = char_vec(&str_cell.borrow());
    if pos > hay.len() || off > sub.len() {
        return Err(ScriptError::Argument);
    }
    let end = off.saturating_add(len).min(sub.len());
    hay.splice(pos..pos, sub[off..end].iter().copied());
    *str_cell.borrow_mut() = hay.into_iter().collect();
    Ok(())
}

/// `Erase`: removes `Len` characters at `Pos` from `Str`.
fn fx_erase(_ctx: &mut NativeCtx<'_>, args: &mut ArgMap) -> Status {
    settle(erase_impl(args))
}

fn erase_impl(args: &ArgMap) -> Result<(), ScriptError> {
    let str_cell = required(args, "Str")?;
    let pos = arg_index(args, "Pos", 0);
    let len = arg_index(args, "Len", usize::MAX);

    let mut hay = char_vec(&str_cell.borrow());
    if pos > hay.len() {
        return Err(ScriptError::Argument);
    }
    let end = pos.saturating_add(len).min(hay.len());
    hay.drain(pos..end);
    *str_cell.borrow_mut() = hay.into_iter().collect();
    Ok(())
}

/// `Compare`: orders two strings into `Res` (-1, 0 or 1), or matches
/// `StrL` against the wildcard pattern `StrW` (0 on match).
fn fx_compare(_ctx: &mut NativeCtx<'_>, args: &mut ArgMap) -> Status {
    settle(compare_impl(args))
}

fn compare_impl(args: &ArgMap) -> Result<(), ScriptError> {
    let strl = required(args, "StrL")?.borrow().clone();
    let res_cell = required(args, "Res")?;

    if let Some(pattern) = get_argument(args, "StrW") {
        let matched = wild_cmp(&pattern.borrow(), &strl);
        *res_cell.borrow_mut() = if matched { "0" } else { "1" }.to_string();
        return Ok(());
    }

    let strr = required(args, "StrR")?.borrow().clone();
    let left = char_vec(&strl);
    let right = char_vec(&strr);
    let offl = arg_index(args, "OffL", 0);
    let offr = arg_index(args, "OffR", 0);
    if offl > left.len() || offr > right.len() {
        return Err(ScriptError::Argument);
    }
    let len = arg_index(args, "Len", usize::MAX);
    let a = &left[offl..offl.saturating_add(len).min(left.len())];
    let b = &right[offr..offr.saturating_add(len).min(right.len())];

    let order = if arg_true(args, "ICase", true) {
        a.iter().map(|&c| fold_char(c)).cmp(b.iter().map(|&c| fold_char(c)))
    } else {
        a.iter().cmp(b.iter())
    };
    *res_cell.borrow_mut() = match order {
        std::cmp::Ordering::Less => "-1",
        std::cmp::Ordering::Equal => "0",
        std::cmp::Ordering::Greater => "1",
    }
    .to_string();
    Ok(())
}

/// `Length`: character count of `Str` into `Len`.
fn fx_length(_ctx: &mut NativeCtx<'_>, args: &mut ArgMap) -> Status {
    settle(length_impl(args))
}

fn length_impl(args: &ArgMap) -> Result<(), ScriptError> {
    let count = required(args, "Str")?.borrow().chars().count();
    *required(args, "Len")?.borrow_mut() = count.to_string();
    Ok(())
}
