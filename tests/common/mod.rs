//! End to end test helpers.

use std::collections::BTreeMap;

use turi::{
    new_value, ArgMap, Level, LimitConfig, LoadConfig, Logger, Outcome, RunConfig, Runner,
    TuriError,
};

pub fn quiet_config() -> RunConfig {
    RunConfig {
        logger: Logger::new(Level::Error),
        load: LoadConfig::default(),
        limits: LimitConfig::default(),
    }
}

/// Loads `script` and calls `entry` with the given arguments, returning
/// the outcome and the final argument texts.
pub fn run_entry(
    script: &str,
    entry: &str,
    args: &[(&str, &str)],
) -> Result<(Outcome, BTreeMap<String, String>), TuriError> {
    let mut runner = Runner::new(&quiet_config());
    runner.load(script)?;
    let mut arg_map: ArgMap = args
        .iter()
        .map(|(name, value)| (name.to_string(), new_value(*value)))
        .collect();
    let outcome = runner.call(entry, &mut arg_map)?;
    let texts = arg_map
        .iter()
        .map(|(name, cell)| (name.clone(), cell.borrow().clone()))
        .collect();
    Ok((outcome, texts))
}

/// [`run_entry`] on `main`, asserting success.
pub fn run_main(script: &str, args: &[(&str, &str)]) -> BTreeMap<String, String> {
    match run_entry(script, "main", args) {
        Ok((_, texts)) => texts,
        Err(e) => panic!("script failed: {e}"),
    }
}
