//! Turi - an embeddable line oriented scripting engine.
//!
//! Scripts are plain text: one statement per line, `Function`/`Data`
//! blocks, structured control flow desugared to gotos, and call
//! arguments passed as shared cells so functions hand results back
//! through their arguments. Runs are cooperative; they suspend on
//! preemption pauses and breakpoints and resume from a parked frame.
//!
//! # Architecture
//!
//! ```text
//! turi-config/ - configuration data structures
//! turi-log/    - explicit-handle structured logging
//! turi-core/   - tokenizer, reducer, preprocessor, compiler, engine, store
//! turi-api/    - run orchestration (Runner, Session)
//! turi-cli/    - command line front end
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use turi::{run, RunConfig};
//!
//! let script = "Function main Begin\nOut = 20 + 22\nFunction End\n";
//! let args = run(script, &RunConfig::default()).unwrap();
//! assert_eq!(args["Out"].borrow().as_str(), "42");
//! ```

pub use turi_api;
pub use turi_config;
pub use turi_core;
pub use turi_log;

pub use turi_api::{
    get_config, init_config, is_initialized, new_value, run, run_script, ArgMap, Breakpoint,
    DataStore, DebugOp, DebugState, Engine, ErrorReport, Level, LimitConfig, LoadConfig, LoadError,
    Logger, MemorySink, NativeCtx, NativeFn, Outcome, Phase, RunConfig, Runner, ScriptError,
    Session, StderrSink, Status, StdoutSink, TuriError, Value,
};

/// Installs the process wide configuration (CLI convenience). Library
/// embedders should pass a [`RunConfig`] explicitly instead.
pub fn init(config: RunConfig) {
    turi_api::init_config(config);
}
