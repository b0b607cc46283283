//! CLI argument parsing and command dispatch.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use functional_iteration::{
    build_engines, cross_check, steps_from_signed, time_engine, time_naive, BinaryLiftingEngine,
    CheckParams, FunctionMap, GeneratorParams, GraphDecompositionEngine, IterationEngine, Timing,
};

/// Command-line harness for iterated evaluation of finite self-maps.
#[derive(Parser)]
#[command(name = "fniter")]
#[command(version)]
#[command(about = "Answer f^i(x) queries over a finite self-map")]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Commands,
}

/// Global options available to all commands.
#[derive(Args, Clone)]
pub struct GlobalOptions {
    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose", global = true)]
    pub is_verbose: bool,

    /// Suppress all logging output.
    #[arg(short = 'q', long = "quiet", global = true)]
    pub is_quiet: bool,
}

/// Where the self-map comes from. Exactly one source is required.
#[derive(Args, Clone)]
pub struct SourceArgs {
    /// Generate a uniformly random map over SIZE elements.
    #[arg(long, value_name = "SIZE", conflicts_with_all = ["file", "binary_file", "staircase"])]
    pub random: Option<usize>,

    /// Seed for --random; ignored with a warning by the other sources.
    /// Drawn from the OS when absent.
    #[arg(long, env = "FNITER_SEED")]
    pub seed: Option<u64>,

    /// Read a map in the text format (whitespace-separated images).
    #[arg(long, value_name = "PATH", conflicts_with_all = ["binary_file", "staircase"])]
    pub file: Option<PathBuf>,

    /// Read a map in the binary format (little-endian u32 count and images).
    #[arg(long, value_name = "PATH", conflicts_with = "staircase")]
    pub binary_file: Option<PathBuf>,

    /// Use the chain-heavy staircase map with STEPS spine steps.
    #[arg(long, value_name = "STEPS")]
    pub staircase: Option<usize>,
}

impl SourceArgs {
    /// A seed that was given but has no effect on the selected source.
    fn ignored_seed(&self) -> Option<u64> {
        self.seed.filter(|_| self.random.is_none())
    }

    fn load(&self) -> Result<FunctionMap> {
        if let Some(seed) = self.ignored_seed() {
            warn!(seed, "seed only applies to --random, ignoring it");
        }
        if let Some(size) = self.random {
            let seed = resolve_seed(self.seed);
            return GeneratorParams::new(size, seed)
                .generate()
                .context("failed to generate random map");
        }
        if let Some(path) = &self.file {
            return FunctionMap::from_path(path)
                .with_context(|| format!("failed to read {}", path.display()));
        }
        if let Some(path) = &self.binary_file {
            let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            return FunctionMap::read_binary(file)
                .with_context(|| format!("failed to read {}", path.display()));
        }
        if let Some(steps) = self.staircase {
            return Ok(FunctionMap::staircase(steps));
        }
        bail!("no map source given: use --random, --file, --binary-file or --staircase")
    }
}

fn resolve_seed(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(|| {
        let seed = rand::random::<u64>();
        info!(seed, "no seed given, drew one");
        eprintln!("seed: {}", seed);
        seed
    })
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the map and the shape of its decomposition.
    Show {
        #[command(flatten)]
        source: SourceArgs,

        /// Also print the doubling table.
        #[arg(long)]
        table: bool,
    },

    /// Compute f^i(x) naively and with both engines.
    Eval {
        #[command(flatten)]
        source: SourceArgs,

        /// Domain element.
        x: usize,

        /// Number of applications.
        #[arg(allow_negative_numbers = true)]
        i: i64,

        /// Skip the naive O(i) computation.
        #[arg(long)]
        skip_naive: bool,
    },

    /// Check both engines against naive iteration for every x and i.
    Check {
        #[command(flatten)]
        source: SourceArgs,

        /// Check every i below this bound; defaults to the domain size.
        #[arg(long)]
        max_steps: Option<u64>,

        /// Run the sweep on one thread.
        #[arg(long)]
        sequential: bool,
    },

    /// Time preprocessing and an all-points query sweep for each engine.
    Time {
        #[command(flatten)]
        source: SourceArgs,

        /// Sweep every i below this bound; defaults to the domain size.
        #[arg(long)]
        max_steps: Option<u64>,

        /// Also time the naive sweep.
        #[arg(long)]
        naive: bool,
    },

    /// Write a random map to a file.
    Generate {
        /// Domain size.
        size: usize,

        /// Generator seed. Drawn from the OS when absent.
        #[arg(long, env = "FNITER_SEED")]
        seed: Option<u64>,

        /// Output path.
        #[arg(short, long)]
        output: PathBuf,

        /// Write the binary format instead of text.
        #[arg(long)]
        binary: bool,
    },
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Show { source, table } => show(&source.load()?, table),
            Commands::Eval { source, x, i, skip_naive } => eval(&source.load()?, x, i, skip_naive),
            Commands::Check { source, max_steps, sequential } => {
                let map = source.load()?;
                let params = CheckParams {
                    max_steps: max_steps.unwrap_or(map.size() as u64),
                    parallel: !sequential,
                };
                check(&map, &params)
            }
            Commands::Time { source, max_steps, naive } => {
                let map = source.load()?;
                let params = CheckParams {
                    max_steps: max_steps.unwrap_or(map.size() as u64),
                    parallel: false,
                };
                time(&map, &params, naive)
            }
            Commands::Generate { size, seed, output, binary } => {
                generate(size, resolve_seed(seed), &output, binary)
            }
        }
    }
}

fn show(map: &FunctionMap, table: bool) -> Result<()> {
    for (x, y) in map.as_slice().iter().enumerate() {
        println!("f({}) : {}", x, y);
    }

    let (lifting, graph) = build_engines(map)?;
    let stats = graph.stats();
    println!();
    println!("cycles: {}", lifting.cycles().len());
    println!("doubling levels: {}", lifting.levels());
    println!("doubling storage (words): {}", lifting.storage_words());
    println!("decomposition nodes: {}", stats.nodes);
    println!("longest segment: {}", stats.longest_segment);
    println!("max chain depth: {}", stats.max_chain_depth);

    if table {
        println!();
        print!("{}", lifting);
    }
    Ok(())
}

fn eval(map: &FunctionMap, x: usize, i: i64, skip_naive: bool) -> Result<()> {
    let steps = steps_from_signed(i)?;
    let (lifting, graph) = build_engines(map)?;

    if !skip_naive {
        println!("naive: {}", map.iterate(x, steps)?);
    }
    let (y, cost) = lifting.eval_with_cost(x, steps)?;
    println!("{}: {} ({} table lookups)", BinaryLiftingEngine::NAME, y, cost.table_lookups);
    let (y, cost) = graph.eval_with_cost(x, steps)?;
    println!("{}: {} ({} segments crossed)", GraphDecompositionEngine::NAME, y, cost.segments_crossed);
    Ok(())
}

fn check(map: &FunctionMap, params: &CheckParams) -> Result<()> {
    let (lifting, graph) = build_engines(map)?;
    let reports = [cross_check(map, &lifting, params)?, cross_check(map, &graph, params)?];

    let mut failed = false;
    for report in &reports {
        println!(
            "{}: {} queries, {} mismatches",
            report.engine,
            report.queries,
            report.mismatches.len()
        );
        for m in report.mismatches.iter().take(10) {
            println!("  f^{}({}): expected {}, got {}", m.i, m.x, m.expected, m.actual);
        }
        failed |= !report.is_clean();
    }

    if failed {
        bail!("cross-check failed");
    }
    println!("Sanity check complete");
    Ok(())
}

fn print_timing(timing: &Timing) {
    println!(
        "{}: preprocessing {} us, {} queries in {} us",
        timing.engine,
        timing.preprocessing.as_micros(),
        timing.queries,
        timing.sweep.as_micros()
    );
}

fn time(map: &FunctionMap, params: &CheckParams, naive: bool) -> Result<()> {
    let (_, timing) = time_engine::<BinaryLiftingEngine>(map, params)?;
    print_timing(&timing);

    let (graph, timing) = time_engine::<GraphDecompositionEngine>(map, params)?;
    print_timing(&timing);
    println!("  max chain depth: {}", graph.stats().max_chain_depth);

    if naive {
        let elapsed = time_naive(map, params)?;
        println!("naive: {} us", elapsed.as_micros());
    }
    Ok(())
}

fn generate(size: usize, seed: u64, output: &Path, binary: bool) -> Result<()> {
    let map = GeneratorParams::new(size, seed).generate()?;
    let file = File::create(output).with_context(|| format!("failed to create {}", output.display()))?;
    if binary {
        map.write_binary(file)?;
    } else {
        map.write_text(file)?;
    }
    info!(size, seed, path = %output.display(), "wrote map");
    Ok(())
}
