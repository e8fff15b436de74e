//! gcharness - CLI

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use gcharness::runtime::gc::AllocatorKind;
use gcharness::util::config::{load_config, HarnessConfig};
use gcharness::util::logger;
use gcharness::vm::VM;
use gcharness::workload::{reachability_scenario, run_list_churn, run_random_graph};
use gcharness::{NAME, VERSION};

/// Run mutator workloads against pluggable garbage collection strategies
#[derive(Parser, Debug)]
#[command(name = "gcharness")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a workload and print a report
    Run {
        /// TOML configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Collection strategy (bump, mark-sweep)
        #[arg(short, long)]
        strategy: Option<AllocatorKind>,

        /// Heap size in cells, including the null index
        #[arg(long)]
        heap_size: Option<usize>,

        /// Slots per cell
        #[arg(long)]
        cell_size: Option<usize>,

        /// Mutator threads
        #[arg(short, long)]
        threads: Option<usize>,

        /// Iterations per thread
        #[arg(short, long)]
        iterations: Option<usize>,

        /// Run the seeded random graph instead of list churn
        #[arg(long)]
        random: bool,
    },

    /// Run the reachability scenario: a released but still linked object
    /// must survive a full collection
    Scenario {
        /// Collection strategy (bump, mark-sweep)
        #[arg(short, long, default_value_t = AllocatorKind::MarkSweep)]
        strategy: AllocatorKind,
    },

    /// Print the effective configuration as TOML
    Config {
        /// TOML configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

fn read_config(path: Option<&PathBuf>) -> Result<HarnessConfig> {
    match path {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => Ok(HarnessConfig::default()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Run {
            config,
            strategy,
            heap_size,
            cell_size,
            threads,
            iterations,
            random,
        } => {
            let mut config = read_config(config.as_ref())?;
            if let Some(strategy) = strategy {
                config.gc.strategy = strategy;
            }
            if let Some(heap_size) = heap_size {
                config.gc.heap_size = heap_size;
            }
            if let Some(cell_size) = cell_size {
                config.gc.cell_size = cell_size;
            }
            if let Some(threads) = threads {
                config.workload.threads = threads;
            }
            if let Some(iterations) = iterations {
                config.workload.iterations = iterations;
            }

            if args.verbose {
                logger::init_cli(true);
            } else {
                logger::init_with_level(config.log.level);
            }

            let vm = VM::from_gc_config(&config.gc_config(), config.vm_config())
                .context("Failed to create VM")?;
            let report = if random {
                run_random_graph(&vm, &config.workload)
            } else {
                run_list_churn(&vm, &config.workload)
            };
            println!("{}", report);
            if let Some(e) = report.first_error() {
                bail!("workload failed: {}", e);
            }
        }
        Commands::Scenario { strategy } => {
            logger::init_cli(args.verbose);
            let report = reachability_scenario(strategy).context("Scenario failed")?;
            println!("strategy:  {}", strategy);
            println!("released:  object {}", report.released);
            println!("reclaimed: {}", report.reclaimed);
            println!("refilled:  {:?}", report.refilled);
            println!(
                "object {} {}",
                report.released,
                if report.survived { "survived" } else { "was reclaimed" }
            );
            if !report.survived {
                bail!("reachable object was reclaimed");
            }
        }
        Commands::Config { config } => {
            let config = read_config(config.as_ref())?;
            print!("{}", config.to_toml_string()?);
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}
