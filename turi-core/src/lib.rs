//! Turi scripting engine.
//!
//! The crate is split into three layers:
//!
//! - [`script`]: source text handling, the tokenizer, the expression
//!   reducer, the control flow preprocessor and the compiler that turns
//!   a script into linear per-function instruction lists.
//! - [`runtime`]: the cooperative execution engine, the variable model,
//!   native function dispatch and the debug stepper.
//! - [`store`]: the hierarchical key/value data store and its native
//!   function bindings.

pub mod runtime;
pub mod script;
pub mod store;

pub use runtime::{
    new_value, ArgMap, Engine, Frame, NativeCtx, NativeFn, ScriptError, Status, Value, VarMap,
};
pub use script::LoadError;
