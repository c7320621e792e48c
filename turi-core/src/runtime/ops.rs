//! Value coercion, the operator table and the expression builtins.
//!
//! Every script value is a string. The helpers here define how strings
//! coerce to numbers and booleans, and the two dispatch tables
//! [`do_operation`] and [`do_function`] implement the operators and the
//! builtin expression functions on top of them.

use crate::runtime::clock::now_ms;
use crate::runtime::frame::Value;
use crate::runtime::status::ScriptError;
use crate::store::wildcard::wild_cmp;

/// Integer prefix parse. Skips leading whitespace, reads an optional sign
/// and digits, anything else ends the number. No digits yields 0.
pub fn to_int(text: &str) -> i64 {
    let t = text.trim_start();
    let b = t.as_bytes();
    let mut i = 0;
    if matches!(b.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let digits_at = i;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_at {
        return 0;
    }
    t[..i].parse().unwrap_or(0)
}

/// Float prefix parse with the same tolerance as [`to_int`].
pub fn to_f64(text: &str) -> f64 {
    let t = text.trim_start();
    let b = t.as_bytes();
    let mut i = 0;
    if matches!(b.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let mut digits = 0;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
        digits += 1;
    }
    if i < b.len() && b[i] == b'.' {
        i += 1;
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return 0.0;
    }
    let mut end = i;
    if matches!(b.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(b.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        let exp_at = j;
        while j < b.len() && b[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_at {
            end = j;
        }
    }
    t[..end].parse().unwrap_or(0.0)
}

/// Numbers print without a decimal point when integral, otherwise with
/// six fractional digits and trailing zeros trimmed.
pub fn fmt_f64(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let mut text = format!("{value:.6}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    text
}

/// Falsy values: the empty string, any casing of "false", and numeric
/// zero spelled with a leading '0'.
pub fn is_false(text: &str) -> bool {
    text.is_empty()
        || eq_ci(text, "false")
        || (text.starts_with('0') && to_f64(text) == 0.0)
}

pub fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

pub fn eq_ci(a: &str, b: &str) -> bool {
    a.chars().map(fold_char).eq(b.chars().map(fold_char))
}

fn bool_str(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

// Positions in script strings count characters, so the search helpers
// work on char slices.

pub fn char_vec(text: &str) -> Vec<char> {
    text.chars().collect()
}

fn eq_at(hay: &[char], needle: &[char], at: usize, icase: bool) -> bool {
    hay.len() - at >= needle.len()
        && needle.iter().zip(&hay[at..]).all(|(n, h)| {
            if icase {
                fold_char(*n) == fold_char(*h)
            } else {
                n == h
            }
        })
}

pub fn find_sub(hay: &[char], needle: &[char], from: usize, icase: bool) -> Option<usize> {
    if needle.is_empty() {
        return (from <= hay.len()).then_some(from);
    }
    if from >= hay.len() {
        return None;
    }
    (from..=hay.len().saturating_sub(needle.len())).find(|&at| eq_at(hay, needle, at, icase))
}

/// Reverse search; `upto` is the highest allowed match position.
pub fn rfind_sub(hay: &[char], needle: &[char], upto: usize, icase: bool) -> Option<usize> {
    if needle.len() > hay.len() {
        return None;
    }
    let max = upto.min(hay.len() - needle.len());
    (0..=max).rev().find(|&at| eq_at(hay, needle, at, icase))
}

pub fn find_first_of(hay: &[char], set: &[char], from: usize) -> Option<usize> {
    (from..hay.len()).find(|&i| set.contains(&hay[i]))
}

pub fn find_first_not_of(hay: &[char], set: &[char], from: usize) -> Option<usize> {
    (from..hay.len()).find(|&i| !set.contains(&hay[i]))
}

pub fn find_last_of(hay: &[char], set: &[char], upto: usize) -> Option<usize> {
    if hay.is_empty() {
        return None;
    }
    let max = upto.min(hay.len() - 1);
    (0..=max).rev().find(|&i| set.contains(&hay[i]))
}

pub fn find_last_not_of(hay: &[char], set: &[char], upto: usize) -> Option<usize> {
    if hay.is_empty() {
        return None;
    }
    let max = upto.min(hay.len() - 1);
    (0..=max).rev().find(|&i| !set.contains(&hay[i]))
}

/// Position of the n'th occurrence of `sep` (1-based), or the text length
/// when there are fewer occurrences.
fn find_nth(text: &[char], sep: &[char], mut n: usize) -> usize {
    if sep.is_empty() || n == 0 {
        return text.len();
    }
    let mut from = 0;
    while let Some(pos) = find_sub(text, sep, from, false) {
        n -= 1;
        if n == 0 {
            return pos;
        }
        from = pos + sep.len();
    }
    text.len()
}

/// Length of the suffix after the n'th occurrence of `sep` counted from
/// the right, or the text length when there are fewer occurrences.
fn find_nth_back(text: &[char], sep: &[char], mut n: usize) -> usize {
    if sep.is_empty() || n == 0 {
        return text.len();
    }
    let mut upto = text.len();
    while let Some(pos) = rfind_sub(text, sep, upto, false) {
        n -= 1;
        if n == 0 {
            return text.len() - (pos + sep.len());
        }
        if pos == 0 {
            break;
        }
        upto = pos - 1;
    }
    text.len()
}

fn tokens<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    if sep.is_empty() {
        return vec![text];
    }
    text.split(sep).collect()
}

/// Apply one binary (or unary) operator to the accumulator cell.
///
/// The operand is copied out first, so the accumulator and operand may be
/// the same cell.
pub fn do_operation(acc: &Value, operator: &str, operand: &Value) -> Result<(), ScriptError> {
    let rhs = operand.borrow().clone();
    let mut lhs = acc.borrow_mut();
    match operator {
        "=" => *lhs = rhs,
        "==" => {
            let r = *lhs == rhs;
            *lhs = bool_str(r);
        }
        "!=" => {
            let r = *lhs != rhs;
            *lhs = bool_str(r);
        }
        "~=" => {
            let r = eq_ci(lhs.as_str(), &rhs);
            *lhs = bool_str(r);
        }
        "~~" => {
            let r = wild_cmp(&rhs, lhs.as_str());
            *lhs = bool_str(r);
        }
        "&" => lhs.push_str(&rhs),
        "|" => {
            if lhs.is_empty() {
                *lhs = rhs;
            }
        }
        "*" => *lhs = fmt_f64(to_f64(lhs.as_str()) * to_f64(&rhs)),
        "+" => *lhs = fmt_f64(to_f64(lhs.as_str()) + to_f64(&rhs)),
        "-" => *lhs = fmt_f64(to_f64(lhs.as_str()) - to_f64(&rhs)),
        "/" => *lhs = fmt_f64(to_f64(lhs.as_str()) / to_f64(&rhs)),
        "%" => {
            let by = to_int(&rhs);
            *lhs = if by != 0 {
                (to_int(lhs.as_str()) % by).to_string()
            } else {
                "NaN".to_string()
            };
        }
        "<" => {
            let r = to_f64(lhs.as_str()) < to_f64(&rhs);
            *lhs = bool_str(r);
        }
        "<=" => {
            let r = to_f64(lhs.as_str()) <= to_f64(&rhs);
            *lhs = bool_str(r);
        }
        ">" => {
            let r = to_f64(lhs.as_str()) > to_f64(&rhs);
            *lhs = bool_str(r);
        }
        ">=" => {
            let r = to_f64(lhs.as_str()) >= to_f64(&rhs);
            *lhs = bool_str(r);
        }
        "!" => *lhs = bool_str(is_false(&rhs)),
        "&&" => {
            let r = !is_false(lhs.as_str()) && !is_false(&rhs);
            *lhs = bool_str(r);
        }
        "||" => {
            let r = !is_false(lhs.as_str()) || !is_false(&rhs);
            *lhs = bool_str(r);
        }
        _ => return Err(ScriptError::Syntax),
    }
    Ok(())
}

/// Builtin expression functions, called with positional string arguments.
pub fn do_function(function: &str, args: &[String]) -> Result<String, ScriptError> {
    let arg = |index: usize| args.get(index).ok_or(ScriptError::Argument);
    let num1 = |f: fn(f64) -> f64| -> Result<String, ScriptError> {
        Ok(fmt_f64(f(to_f64(arg(0)?))))
    };
    match function {
        "Clock" => Ok(fmt_f64(now_ms() as f64 / 1000.0)),

        "Trim" => Ok(arg(0)?.trim().to_string()),
        "Upper" => Ok(arg(0)?.to_uppercase()),
        "Lower" => Ok(arg(0)?.to_lowercase()),

        "Find" => {
            let hay = char_vec(arg(0)?);
            let needle = char_vec(arg(1)?);
            Ok(match find_sub(&hay, &needle, 0, true) {
                Some(pos) => pos.to_string(),
                None => "-1".to_string(),
            })
        }
        "Len" => Ok(arg(0)?.chars().count().to_string()),
        "SubStr" => {
            let text = char_vec(arg(0)?);
            let off = to_int(arg(1)?);
            if off < 0 || off as usize > text.len() {
                return Err(ScriptError::Argument);
            }
            let take = match args.get(2) {
                Some(len) if to_int(len) >= 0 => to_int(len) as usize,
                _ => text.len(),
            };
            Ok(text[off as usize..].iter().take(take).collect())
        }

        "Left" => {
            let text = char_vec(arg(0)?);
            let mut cut = to_int(arg(1)?).max(0) as usize;
            if args.len() >= 3 {
                cut = find_nth(&text, &char_vec(arg(2)?), cut);
            }
            Ok(text[..cut.min(text.len())].iter().collect())
        }
        "Right" => {
            let text = char_vec(arg(0)?);
            let mut take = to_int(arg(1)?).max(0) as usize;
            if args.len() >= 3 {
                take = find_nth_back(&text, &char_vec(arg(2)?), take);
            }
            if take > text.len() {
                return Err(ScriptError::Argument);
            }
            Ok(text[text.len() - take..].iter().collect())
        }
        "Token" => {
            let pieces = tokens(arg(0)?, arg(1)?);
            if args.len() >= 3 {
                let index = to_int(arg(2)?);
                if index < 0 {
                    return Ok(String::new());
                }
                Ok(pieces.get(index as usize).copied().unwrap_or("").to_string())
            } else {
                Ok(pieces.len().to_string())
            }
        }

        "const" => Ok(match arg(0)?.as_str() {
            "pi" => "3.14159265358979323846",
            "e" => "2.71828182845904523536",
            _ => "",
        }
        .to_string()),

        "cos" => num1(f64::cos),
        "sin" => num1(f64::sin),
        "tan" => num1(f64::tan),
        "acos" => num1(f64::acos),
        "asin" => num1(f64::asin),
        "atan" => num1(f64::atan),
        "cosh" => num1(f64::cosh),
        "sinh" => num1(f64::sinh),
        "tanh" => num1(f64::tanh),
        "exp" => num1(f64::exp),
        "log" => num1(f64::ln),
        "log10" => num1(f64::log10),
        "pow" => Ok(fmt_f64(to_f64(arg(0)?).powf(to_f64(arg(1)?)))),
        "sqrt" => num1(f64::sqrt),
        "ceil" => num1(f64::ceil),
        "floor" => num1(f64::floor),
        "abs" => num1(f64::abs),
        "int" => num1(f64::trunc),
        "fract" => num1(f64::fract),
        "mod" => Ok(fmt_f64(to_f64(arg(0)?) % to_f64(arg(1)?))),

        _ => Err(ScriptError::Syntax),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::frame::new_value;

    #[test]
    fn number_parsing_takes_prefixes() {
        assert_eq!(to_int(" -42x"), -42);
        assert_eq!(to_int("abc"), 0);
        assert_eq!(to_f64("12.5abc"), 12.5);
        assert_eq!(to_f64("1e3!"), 1000.0);
        assert_eq!(to_f64("."), 0.0);
    }

    #[test]
    fn number_formatting() {
        assert_eq!(fmt_f64(3.0), "3");
        assert_eq!(fmt_f64(-2.5), "-2.5");
        assert_eq!(fmt_f64(1.0 / 3.0), "0.333333");
        assert_eq!(fmt_f64(f64::NAN), "NaN");
    }

    #[test]
    fn falsiness() {
        assert!(is_false(""));
        assert!(is_false("False"));
        assert!(is_false("0"));
        assert!(is_false("0.000"));
        assert!(!is_false("1"));
        assert!(!is_false("0.5"));
        assert!(!is_false("no"));
    }

    #[test]
    fn operators() {
        let run = |lhs: &str, op: &str, rhs: &str| {
            let acc = new_value(lhs);
            do_operation(&acc, op, &new_value(rhs)).unwrap();
            let out = acc.borrow().clone();
            out
        };
        assert_eq!(run("2", "+", "3"), "5");
        assert_eq!(run("10", "%", "3"), "1");
        assert_eq!(run("10", "%", "0"), "NaN");
        assert_eq!(run("10", "<", "9"), "false");
        assert_eq!(run("ab", "&", "cd"), "abcd");
        assert_eq!(run("", "|", "fallback"), "fallback");
        assert_eq!(run("kept", "|", "other"), "kept");
        assert_eq!(run("Hello", "~=", "hello"), "true");
        assert_eq!(run("hello", "~~", "h*o"), "true");
        assert_eq!(run("x", "!", "false"), "true");
        assert_eq!(run("true", "&&", "1"), "true");
        let acc = new_value("a");
        assert!(do_operation(&acc, "^", &new_value("b")).is_err());
    }

    #[test]
    fn operand_may_alias_the_accumulator() {
        let cell = new_value("ab");
        do_operation(&cell, "&", &cell).unwrap();
        assert_eq!(*cell.borrow(), "abab");
    }

    #[test]
    fn string_builtins() {
        assert_eq!(do_function("Find", &["Hello".into(), "LL".into()]).unwrap(), "2");
        assert_eq!(do_function("Find", &["abc".into(), "x".into()]).unwrap(), "-1");
        assert_eq!(do_function("Len", &["abcd".into()]).unwrap(), "4");
        assert_eq!(
            do_function("SubStr", &["abcdef".into(), "2".into(), "3".into()]).unwrap(),
            "cde"
        );
        assert!(do_function("SubStr", &["ab".into(), "5".into()]).is_err());
        assert_eq!(
            do_function("Left", &["one,two,three".into(), "1".into(), ",".into()]).unwrap(),
            "one"
        );
        assert_eq!(do_function("Left", &["abcdef".into(), "2".into()]).unwrap(), "ab");
        assert_eq!(
            do_function("Right", &["one,two".into(), "1".into(), ",".into()]).unwrap(),
            "two"
        );
        assert_eq!(do_function("Right", &["abcdef".into(), "2".into()]).unwrap(), "ef");
        assert_eq!(
            do_function("Token", &["a,b,c".into(), ",".into(), "1".into()]).unwrap(),
            "b"
        );
        assert_eq!(do_function("Token", &["a,b,c".into(), ",".into()]).unwrap(), "3");
    }

    #[test]
    fn math_builtins() {
        assert_eq!(do_function("int", &["3.7".into()]).unwrap(), "3");
        assert_eq!(do_function("fract", &["3.5".into()]).unwrap(), "0.5");
        assert_eq!(do_function("mod", &["7".into(), "4".into()]).unwrap(), "3");
        assert_eq!(do_function("pow", &["2".into(), "10".into()]).unwrap(), "1024");
        assert_eq!(do_function("sqrt", &["16".into()]).unwrap(), "4");
        assert!(do_function("nosuch", &[]).is_err());
        assert!(do_function("pow", &["2".into()]).is_err());
    }
}
