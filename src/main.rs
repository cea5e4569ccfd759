//! quysh entry point.
//!
//! ```bash
//! quysh            # interactive
//! quysh -c 'ls | wc -l'
//! ```

use anyhow::Result;
use quysh::config::Args;
use quysh::{Config, Interpreter};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> Result<()> {
    let args: Args = argh::from_env();

    // RUST_LOG wins over the verbosity flag.
    let default_filter = if args.verbose { "quysh=debug" } else { "quysh=warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    let mut shell = Interpreter::new(Config::from(&args));
    match args.command {
        Some(line) => shell.run_once(&line),
        None => shell.repl(),
    }
}
