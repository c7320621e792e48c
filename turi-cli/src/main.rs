//! Turi CLI - runs a script file and prints the resulting arguments.

use std::path::PathBuf;
use std::process;

use clap::Parser;

use turi_api::{
    init_config, new_value, ArgMap, Level, LimitConfig, LoadConfig, Logger, Runner, RunConfig,
    StderrSink,
};

#[derive(Parser)]
#[command(
    name = "turi",
    about = "Turi scripting engine - run a script file",
    version
)]
struct Cli {
    /// Script file to run
    script: PathBuf,

    /// Entry function
    #[arg(long, default_value = "main")]
    entry: String,

    /// Argument passed to the entry function, as Name=Value. Repeatable.
    #[arg(long = "arg", value_name = "NAME=VALUE", value_parser = parse_arg)]
    args: Vec<(String, String)>,

    /// Diagnostic verbosity on stderr
    #[arg(long, default_value = "warn")]
    log_level: Level,

    /// Wall-clock budget for the run, in milliseconds
    #[arg(long)]
    time_limit_ms: Option<u64>,

    /// Maximum nested call depth
    #[arg(long)]
    depth_limit: Option<u16>,

    /// Register break markers (`?` lines) as breakpoints
    #[arg(long)]
    enable_breakpoints: bool,

    /// Print the data store contents after the run
    #[arg(long)]
    print_store: bool,
}

fn parse_arg(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{s}'")),
    }
}

fn main() {
    let cli = Cli::parse();

    let source = match std::fs::read_to_string(&cli.script) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {e}", cli.script.display());
            process::exit(1);
        }
    };

    let mut config = RunConfig {
        logger: Logger::new(cli.log_level).with_sink(StderrSink),
        load: LoadConfig::default(),
        limits: LimitConfig::default(),
    };
    config.load.enable_breakpoints = cli.enable_breakpoints;
    if let Some(ms) = cli.time_limit_ms {
        config.limits.time_limit_ms = ms;
    }
    if let Some(depth) = cli.depth_limit {
        config.limits.depth_limit = depth;
    }
    init_config(config.clone());

    let mut runner = Runner::new(&config);
    if let Err(e) = runner.load(&source) {
        eprintln!("{}", e.to_report());
        process::exit(1);
    }

    let mut args: ArgMap = cli
        .args
        .iter()
        .map(|(name, value)| (name.clone(), new_value(value.clone())))
        .collect();

    match runner.call(&cli.entry, &mut args) {
        Ok(_) => {
            for (name, value) in &args {
                println!("{name}={}", value.borrow());
            }
            if cli.print_store {
                print!("{}", runner.store().print_store());
            }
        }
        Err(e) => {
            eprintln!("{}", e.to_report());
            process::exit(1);
        }
    }
}
