//! Case-insensitive wildcard matching, plain and path-aware.

use crate::runtime::ops::fold_char;

/// Full-string wildcard compare. `?` matches one character, `*` any run.
pub fn wild_cmp(pattern: &str, text: &str) -> bool {
    fn step(p: &[char], t: &[char]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some('*') => (0..=t.len()).any(|k| step(&p[1..], &t[k..])),
            Some('?') => !t.is_empty() && step(&p[1..], &t[1..]),
            Some(&c) => {
                t.first().is_some_and(|&h| fold_char(h) == fold_char(c)) && step(&p[1..], &t[1..])
            }
        }
    }
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    step(&pattern, &text)
}

/// Path-aware wildcard match. `?` and `*` never cross a `/` boundary.
/// On success returns the unmatched tail of `text`, which is either empty
/// or a deeper path starting with `/`.
pub fn wild_match<'a>(pattern: &str, text: &'a str) -> Option<&'a str> {
    fn step<'a>(mut p: &str, mut t: &'a str) -> Option<&'a str> {
        loop {
            let Some(pc) = p.chars().next() else {
                return (t.is_empty() || t.starts_with('/')).then_some(t);
            };
            let p_rest = &p[pc.len_utf8()..];
            match pc {
                '*' => {
                    let mut t_at = t;
                    loop {
                        if let Some(rest) = step(p_rest, t_at) {
                            return Some(rest);
                        }
                        let tc = t_at.chars().next()?;
                        if tc == '/' {
                            return None;
                        }
                        t_at = &t_at[tc.len_utf8()..];
                    }
                }
                '?' => {
                    let tc = t.chars().next()?;
                    if tc == '/' {
                        return None;
                    }
                    p = p_rest;
                    t = &t[tc.len_utf8()..];
                }
                _ => {
                    let tc = t.chars().next()?;
                    if fold_char(tc) != fold_char(pc) {
                        return None;
                    }
                    p = p_rest;
                    t = &t[tc.len_utf8()..];
                }
            }
        }
    }
    step(pattern, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_wildcards() {
        assert!(wild_cmp("h*o", "hello"));
        assert!(wild_cmp("h?llo", "HELLO"));
        assert!(wild_cmp("*", ""));
        assert!(!wild_cmp("h?o", "hello"));
        assert!(!wild_cmp("hello", "hell"));
    }

    #[test]
    fn path_match_stops_at_separators() {
        assert_eq!(wild_match("a/*", "a/b"), Some(""));
        assert_eq!(wild_match("a", "a/b/c"), Some("/b/c"));
        assert_eq!(wild_match("a/*", "a/b/c"), Some("/c"));
        assert_eq!(wild_match("a/?", "a/bc"), None);
        assert_eq!(wild_match("A/B", "a/b"), Some(""));
        assert_eq!(wild_match("a/x", "a/b"), None);
    }
}
