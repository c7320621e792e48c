//! Source line assembly and the expression tokenizer.

use crate::script::expr::{is_operator_char, Expr, Exprs};

/// Splits a script into lines, joining lines that end with a `\`
/// continuation. Each merged line is followed by empty placeholder
/// lines so diagnostics keep the original numbering.
pub fn line_up(script: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pending = String::new();
    let mut merged = 0usize;
    let mut joining = false;
    for part in script.split('\n') {
        if joining {
            // the continuation line joins without its indentation
            pending.push_str(part.trim_start_matches([' ', '\t']));
        } else {
            pending.push_str(part);
        }
        let trimmed = pending.trim_end_matches(['\r', '\n']);
        if trimmed.ends_with('\\') {
            pending.truncate(trimmed.len() - 1);
            merged += 1;
            joining = true;
            continue;
        }
        joining = false;
        lines.push(std::mem::take(&mut pending));
        for _ in 0..merged {
            lines.push(String::new());
        }
        merged = 0;
    }
    if !pending.is_empty() {
        lines.push(pending);
        for _ in 0..merged {
            lines.push(String::new());
        }
    }
    lines
}

/// Renders a 1 based line number with its trimmed source text for
/// diagnostics. Break markers print as plain statements.
pub fn describe_line(lines: &[String], number: usize) -> String {
    if number >= 1 && number <= lines.len() {
        let mut line = lines[number - 1].clone();
        if line.starts_with('?') {
            line.replace_range(0..1, " ");
        }
        format!("{} (\"{}\")", number, line.trim())
    } else {
        "*unknown*".to_string()
    }
}

/// Reads the next whitespace delimited word, stopping at `(` as well.
pub fn get_word(line: &str, offset: &mut usize) -> String {
    let bytes = line.as_bytes();
    let mut start = *offset;
    while start < bytes.len() && matches!(bytes[start], b' ' | b'\t' | b'\r' | b'\n') {
        start += 1;
    }
    if start >= bytes.len() {
        *offset = bytes.len();
        return String::new();
    }
    let mut stop = start;
    while stop < bytes.len() && !matches!(bytes[stop], b'(' | b' ' | b'\t' | b'\r' | b'\n') {
        stop += 1;
    }
    *offset = stop;
    line[start..stop].to_string()
}

fn decode_escape(ch: char) -> char {
    match ch {
        '\\' => '\\',
        '\'' => '\'',
        '"' => '"',
        'a' => '\u{7}',
        'b' => '\u{8}',
        'f' => '\u{c}',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'v' => '\u{b}',
        _ => '?',
    }
}

/// Tokenizes one logical line into an expression list.
///
/// String literals keep their quotes, bracket runs stay opaque single
/// words, parenthesized regions are re-tokenized recursively into
/// groups. A `'` outside of strings starts a comment captured into
/// `comment`. Returns `None` on unterminated strings or unbalanced
/// parentheses.
pub fn parse_line(line: &str, mut comment: Option<&mut String>) -> Option<Exprs> {
    let mut exprs = Exprs::new();
    let mut token = String::new();

    let mut esc = false;
    let mut in_string = false;
    let mut blocks = 0i32;
    let mut parens = 0i32;
    let mut operator = false;

    for (i, ch) in line.char_indices() {
        // -1 flush then keep char, 1 keep char then flush,
        // 2 flush and drop char, -2 flush as sub expression
        let mut end = 0i32;
        if in_string {
            if esc {
                esc = false;
                if parens == 0 && blocks == 0 {
                    token.push(decode_escape(ch));
                } else {
                    // kept raw for the recursive re-parse
                    token.push('\\');
                    token.push(ch);
                }
                continue;
            } else if ch == '\\' {
                esc = true;
                continue;
            }
            if ch == '"' {
                in_string = false;
                if parens == 0 && blocks == 0 {
                    end = 1;
                }
            }
        } else if ch == '"' {
            in_string = true;
            if parens == 0 && blocks == 0 {
                end = -1;
            }
        } else if ch == '\'' {
            if let Some(out) = comment.as_deref_mut() {
                *out = line[i..].to_string();
            }
            break;
        } else if blocks > 0 || ch == '[' {
            if ch == '[' {
                blocks += 1;
            } else if ch == ']' {
                blocks -= 1;
            }
        } else if ch == '(' {
            operator = false;
            if parens == 0 {
                end = 2;
            }
            parens += 1;
        } else if ch == ')' {
            parens -= 1;
            if parens == 0 {
                end = -2;
            }
        } else if parens == 0 {
            if matches!(ch, ' ' | '\t' | '\r' | '\n') {
                end = 2;
            } else if is_operator_char(ch) != operator {
                operator = !operator;
                end = -1;
            }
        }

        if end == 0 || end == 1 {
            token.push(ch);
        }
        if end != 0 {
            if end == -2 {
                let inner = parse_line(&token, None)?;
                exprs.push(Expr::Group(inner));
            } else if !token.is_empty() {
                exprs.push(Expr::classify(std::mem::take(&mut token)));
            }
            token.clear();
        }
        if end == -1 {
            token.push(ch);
        }
    }

    if !token.is_empty() {
        exprs.push(Expr::classify(token));
    }
    if in_string || parens != 0 {
        return None;
    }
    Some(exprs)
}

/// Returns `line` up to its comment, trailing whitespace removed.
/// Mirrors the tokenizer: a `'` inside a string literal is not a
/// comment.
pub fn strip_comment(line: &str) -> &str {
    let mut esc = false;
    let mut in_string = false;
    for (i, ch) in line.char_indices() {
        if in_string {
            if esc {
                esc = false;
            } else if ch == '\\' {
                esc = true;
            } else if ch == '"' {
                in_string = false;
            }
        } else if ch == '"' {
            in_string = true;
        } else if ch == '\'' {
            return line[..i].trim_end();
        }
    }
    line
}

/// Splits a word into bracket delimited segments. With `dot` the split
/// also happens at top level dots, each segment keeping its leading
/// dot. The flag is false on unbalanced brackets; the partial segment
/// list is still returned.
pub fn split_blocks(text: &str, dot: bool) -> (Vec<String>, bool) {
    let bytes = text.as_bytes();
    let mut list = Vec::new();
    let mut begin = 0usize;
    let mut end = 0usize;
    let mut count = 0i32;
    let mut pos = 0usize;
    while pos < bytes.len() {
        let found = bytes[pos..]
            .iter()
            .position(|&b| b == b'[' || b == b']' || (dot && b == b'.'))
            .map(|off| pos + off);
        let tmp = match found {
            None => {
                end = bytes.len();
                bytes.len()
            }
            Some(at) => {
                match bytes[at] {
                    b'[' => {
                        if count == 0 && !dot {
                            end = at;
                        }
                        count += 1;
                    }
                    b']' => {
                        count -= 1;
                        if count == 0 {
                            end = at + 1;
                        }
                    }
                    _ => {
                        if count == 0 {
                            end = at;
                        }
                    }
                }
                at
            }
        };
        if end > begin {
            list.push(text[begin..end].to_string());
            begin = end;
        }
        pos = tmp + 1;
    }
    (list, count == 0)
}
