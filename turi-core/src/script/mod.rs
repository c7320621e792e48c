//! Script front end: tokenizer, reducer, preprocessor and compiler.

pub mod compile;
pub mod error;
pub mod expr;
pub mod parse;
pub mod preprocess;
pub mod print;
pub mod reduce;

pub use compile::{compile, AssignMode, CallArg, Function, Op, OpKind};
pub use error::LoadError;
pub use expr::{Expr, Exprs};
pub use parse::{describe_line, line_up, parse_line, strip_comment};
pub use preprocess::{preprocess, Preprocessed};
pub use reduce::order_equation;
