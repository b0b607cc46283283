//! fniter - command-line harness for the iteration engines.
//!
//! Loads or generates a self-map, preprocesses it with both engines and
//! answers, cross-checks or times `f^i(x)` queries.
//!
//! # Usage
//!
//! ```bash
//! # Random map over 1000 elements, reproducible from a seed
//! fniter eval --random 1000 --seed 7 --skip-naive 12 1000000000000
//!
//! # Check both engines against naive iteration
//! fniter check --file map.txt
//!
//! # Preprocessing and sweep timings, including the chain-heavy worst case
//! fniter time --staircase 200 --naive
//!
//! # Write a random map in the binary format
//! fniter generate 100000 --seed 1 --output map.bin --binary
//! ```

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

/// Initialize tracing subscriber with environment-based filtering.
///
/// - `quiet`: Suppress all logging output
/// - `verbose`: Enable debug-level logging
fn init_tracing(quiet: bool, verbose: bool) {
    let filter = if quiet {
        EnvFilter::new("off")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.global.is_quiet, cli.global.is_verbose);

    cli.run()
}
