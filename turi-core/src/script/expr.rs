//! Expression tree built by the tokenizer.
//!
//! A parsed line is a flat list of expressions; parenthesized regions
//! become nested groups. Tokens are classified by their first character
//! only, the reducer and compiler give them meaning later.

/// Characters that form operator tokens.
pub const OPERATOR_CHARS: &str = "*+-/%&^|!=<>,:?~";

pub fn is_operator_char(ch: char) -> bool {
    OPERATOR_CHARS.contains(ch)
}

pub fn has_operator(text: &str) -> bool {
    text.chars().any(is_operator_char)
}

/// Binding strength of an infix operator, higher binds tighter.
/// Unknown operators yield `None` and fail compilation.
pub fn operator_level(op: &str) -> Option<u8> {
    match op {
        "" => Some(0),
        "*" | "/" | "!" | "%" => Some(6),
        "+" | "-" | "=" => Some(5),
        "&" | "|" => Some(4),
        "==" | "!=" | "~=" | "~~" | "<" | ">" | "<=" | ">=" => Some(3),
        "&&" | "||" => Some(2),
        ":" | "?" => Some(1),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Identifier, literal number or keyword.
    Word(String),
    /// Run of operator characters.
    Op(String),
    /// String literal, stored with its surrounding quotes.
    Str(String),
    /// Parenthesized sub expression.
    Group(Exprs),
}

impl Expr {
    /// Classifies a raw token by its first character.
    pub fn classify(token: String) -> Expr {
        match token.chars().next() {
            Some(ch) if is_operator_char(ch) => Expr::Op(token),
            Some('"') => Expr::Str(token),
            _ => Expr::Word(token),
        }
    }

    /// Token text; empty for groups.
    pub fn text(&self) -> &str {
        match self {
            Expr::Word(s) | Expr::Op(s) | Expr::Str(s) => s,
            Expr::Group(_) => "",
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Expr::Group(_))
    }

    pub fn is_op(&self) -> bool {
        matches!(self, Expr::Op(_))
    }

    pub fn is_word(&self) -> bool {
        matches!(self, Expr::Word(_))
    }

    pub fn as_group(&self) -> Option<&Exprs> {
        match self {
            Expr::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_group_mut(&mut self) -> Option<&mut Exprs> {
        match self {
            Expr::Group(g) => Some(g),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Exprs(pub Vec<Expr>);

impl Exprs {
    pub fn new() -> Exprs {
        Exprs(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, expr: Expr) {
        self.0.push(expr);
    }

    pub fn get(&self, index: usize) -> Option<&Expr> {
        self.0.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Expr> {
        self.0.get_mut(index)
    }

    /// Token text at `index`; empty for groups and out of range.
    pub fn text(&self, index: usize) -> &str {
        self.0.get(index).map_or("", Expr::text)
    }

    pub fn is_group(&self, index: usize) -> bool {
        self.0.get(index).is_some_and(Expr::is_group)
    }

    pub fn is_op(&self, index: usize) -> bool {
        self.0.get(index).is_some_and(Expr::is_op)
    }

    pub fn remove(&mut self, index: usize) {
        if index < self.0.len() {
            self.0.remove(index);
        }
    }

    /// Wraps `count` expressions starting at `index` into a nested group.
    pub fn subordinate(&mut self, index: usize, count: usize) -> bool {
        if count == 0 {
            return true;
        }
        if index + count > self.0.len() {
            return false;
        }
        let inner: Vec<Expr> = self.0.drain(index..index + count).collect();
        self.0.insert(index, Expr::Group(Exprs(inner)));
        true
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Expr> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Expr> {
        self.0.iter_mut()
    }
}
