//! Variable resolution: scoping, constants, indirection and structured
//! members.
//!
//! Resolution always yields a shared cell. Plain names resolve into the
//! local, global or argument map, vivifying locals on a miss. A dotted
//! tail (`x.a.0`) walks the JSON document held by the root cell and
//! yields a named temp; writing such a temp back re-serializes the
//! document. A `#` prefix queries existence or element count instead of
//! the value.

use std::rc::Rc;

use serde_json::Value as Json;

use crate::runtime::frame::{new_value, Scope, TempSlot, Value, VarMap};
use crate::runtime::ops::{fmt_f64, to_int};
use crate::script::parse::split_blocks;
use crate::script::print::limited_print;

pub(crate) fn push_unnamed(temps: &mut Vec<TempSlot>, text: impl Into<String>) -> Value {
    let slot = TempSlot::unnamed(text);
    let value = slot.value.clone();
    temps.push(slot);
    value
}

pub(crate) fn push_named(temps: &mut Vec<TempSlot>, name: String, text: String) -> Value {
    let slot = TempSlot::named(name, text);
    let value = slot.value.clone();
    temps.push(slot);
    value
}

fn scalar_text(item: &Json) -> String {
    match item {
        Json::Null => String::new(),
        Json::Bool(true) => "true".to_string(),
        Json::Bool(false) => "false".to_string(),
        Json::Number(n) => fmt_f64(n.as_f64().unwrap_or(0.0)),
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolve a name to a value cell, or `None` when the name is malformed
/// or an indirection comes up empty.
pub fn get_variable(name: &str, scope: &mut Scope<'_>, temps: &mut Vec<TempSlot>) -> Option<Value> {
    if name.is_empty() {
        return None;
    }

    let mut name = name.to_string();
    let mut bhash = false;
    if name.starts_with('#') {
        name.remove(0);
        bhash = true;
        if name.is_empty() {
            return None;
        }
    }
    let bglobal = name.len() > 1 && name.starts_with('.');
    let head = if bglobal { 1 } else { 0 };

    // [name] resolves through the cell it names, unless an argument is
    // literally called that
    if name[head..].starts_with('[') && !scope.args.contains_key(&name) {
        if let Some(inner) = name[head + 1..].strip_suffix(']') {
            let inner = inner.to_string();
            let reference = get_variable(&inner, scope, temps)?;
            let text = reference.borrow().clone();
            if text.is_empty() {
                return None;
            }
            name = text;
        }
    }

    // constants become unnamed temps
    let first = name.chars().next()?;
    if first == '"' {
        let inner = name[1..name.len().saturating_sub(1)].to_string();
        return Some(push_unnamed(temps, inner));
    }
    if first.is_ascii_digit() || name == "true" || name == "false" {
        return Some(push_unnamed(temps, name));
    }
    if name == "npos" {
        return Some(push_unnamed(temps, "-1"));
    }

    let dot = name
        .char_indices()
        .skip(1)
        .find(|&(_, c)| c == '.')
        .map(|(i, _)| i);
    let subname = match dot {
        Some(at) => {
            let tail = name[at..].to_string();
            name.truncate(at);
            tail
        }
        None => String::new(),
    };

    let map: VarMap = if bglobal {
        scope.gvars.clone()
    } else {
        scope.frame.vars.clone()
    };
    let mut variable = map.borrow().get(&name).cloned();
    if variable.is_none() {
        variable = scope.args.get(&name).cloned();
    }
    let variable = match variable {
        Some(found) => found,
        None => {
            if bhash {
                return Some(push_unnamed(temps, "false"));
            }
            let cell = new_value("");
            map.borrow_mut().insert(name.clone(), cell.clone());
            cell
        }
    };

    if !subname.is_empty() {
        let mut full = name.clone();
        let (segments, _) = split_blocks(&subname, true);
        let mut ret = String::new();

        let text = variable.borrow().clone();
        let root: Json = serde_json::from_str(&text).unwrap_or(Json::Null);
        let mut item: Option<&Json> = Some(&root);

        for seg in &segments {
            if seg.len() < 2 {
                return None;
            }
            let mut member = seg[1..].to_string();
            if member.starts_with('[') {
                if member == "[]" {
                    continue;
                }
                if let Some(inner) = member[1..].strip_suffix(']') {
                    let inner = inner.to_string();
                    if let Some(reference) = get_variable(&inner, scope, temps) {
                        member = reference.borrow().clone();
                        if member.is_empty() {
                            member = "0".to_string();
                        }
                    }
                }
            }

            let Some(cur) = item else {
                full.push('.');
                full.push_str(&member);
                continue;
            };

            if member.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                let index = to_int(&member);
                // a numeric member of an object names its n'th key
                if let Some(obj) = cur.as_object() {
                    if index >= 0 && (index as usize) < obj.len() {
                        ret = obj.keys().nth(index as usize).cloned().unwrap_or_default();
                        break;
                    }
                }
                full.push('.');
                full.push_str(&member);
                item = match cur.as_array() {
                    Some(list) if index >= 0 => list.get(index as usize),
                    _ => None,
                };
            } else {
                full.push('.');
                full.push_str(&member);
                item = cur.as_object().and_then(|obj| obj.get(&member));
            }

            if item.is_none() && bhash {
                break;
            }
        }

        if bhash {
            match item {
                None => ret = "0".to_string(),
                Some(Json::Array(list)) => ret = list.len().to_string(),
                Some(Json::Object(obj)) => ret = obj.len().to_string(),
                Some(_) => {}
            }
        }
        if !ret.is_empty() {
            return Some(push_unnamed(temps, ret));
        }

        let variable = match item {
            None => push_named(temps, full, String::new()),
            Some(value @ (Json::Array(_) | Json::Object(_))) => {
                push_named(temps, full, value.to_string())
            }
            Some(value) => push_named(temps, full, scalar_text(value)),
        };
        if bhash {
            return Some(push_unnamed(temps, "true"));
        }
        return Some(variable);
    }

    if bhash {
        return Some(push_unnamed(temps, "true"));
    }
    Some(variable)
}

fn descend<'a>(item: &'a mut Json, member: &str) -> &'a mut Json {
    if member.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        let index = to_int(member).max(0) as usize;
        if !item.is_array() {
            *item = Json::Array(Vec::new());
        }
        match item {
            Json::Array(list) => {
                while list.len() <= index {
                    list.push(Json::Null);
                }
                &mut list[index]
            }
            other => other,
        }
    } else {
        if !item.is_object() {
            *item = Json::Object(serde_json::Map::new());
        }
        match item {
            Json::Object(obj) => obj.entry(member).or_insert(Json::Null),
            other => other,
        }
    }
}

/// Write a value under a possibly dotted name, creating containers along
/// the way.
pub fn set_variable(name: &str, value: &str, scope: &mut Scope<'_>) {
    if name.is_empty() {
        return;
    }
    let bglobal = name.len() > 1 && name.starts_with('.');

    let dot = name
        .char_indices()
        .skip(1)
        .find(|&(_, c)| c == '.')
        .map(|(i, _)| i);
    let (name, subname) = match dot {
        Some(at) => (&name[..at], &name[at..]),
        None => (name, ""),
    };

    let map: VarMap = if bglobal {
        scope.gvars.clone()
    } else {
        scope.frame.vars.clone()
    };
    let mut variable = map.borrow().get(name).cloned();
    if variable.is_none() {
        variable = scope.args.get(name).cloned();
    }
    let variable = match variable {
        Some(found) => found,
        None => {
            let cell = new_value("");
            map.borrow_mut().insert(name.to_string(), cell.clone());
            cell
        }
    };

    let mut text = value.to_string();
    if !subname.is_empty() {
        let (segments, _) = split_blocks(subname, true);
        let current = variable.borrow().clone();
        let mut root: Json = serde_json::from_str(&current).unwrap_or(Json::Null);
        let mut item = &mut root;
        for seg in &segments {
            if seg.len() < 2 {
                continue;
            }
            item = descend(item, &seg[1..]);
        }
        *item = serde_json::from_str(value).unwrap_or_else(|_| Json::String(value.to_string()));
        text = root.to_string();
    }
    *variable.borrow_mut() = text;
}

/// Flush the named temps of a settled statement back into variables.
pub fn set_variables(temps: &[TempSlot], scope: &mut Scope<'_>) {
    for slot in temps {
        if slot.name.is_empty() {
            continue;
        }
        let text = slot.value.borrow().clone();
        set_variable(&slot.name, &text, scope);
    }
}

/// Dump of the visible scope, used by breakpoint logging.
pub fn print_state(scope: &Scope<'_>) -> String {
    let mut out = String::new();
    out.push_str("\nArguments:");
    for (name, value) in scope.args.iter() {
        out.push_str(&format!("\n{} = {}", name, limited_print(&value.borrow())));
    }
    out.push_str("\nVariables:");
    for (name, value) in scope.frame.vars.borrow().iter() {
        out.push_str(&format!("\n{} = {}", name, limited_print(&value.borrow())));
    }
    if !Rc::ptr_eq(&scope.gvars, &scope.frame.vars) {
        for (name, value) in scope.gvars.borrow().iter() {
            out.push_str(&format!("\n{} = {}", name, limited_print(&value.borrow())));
        }
    }
    out
}
