//! QNET Command-Line Interface
//!
//! The main entry point for the `qnet` tool: reduce netlists of quantum
//! optical components to circuit expressions and inspect channel
//! permutations.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::{Parser, Subcommand};
use console::style;
use qnet_algebra::AlgebraConfig;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{connect, permutation, version};

/// QNET - symbolic algebra for quantum optical networks
#[derive(Parser)]
#[command(name = "qnet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Disable memoization of constructor results
    #[arg(long, global = true)]
    no_cache: bool,

    /// Maximum number of rule applications per rewrite sweep
    #[arg(long, global = true, env = "QNET_MAX_REWRITE_STEPS")]
    max_rewrite_steps: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect the components of a netlist and print the reduced circuit
    Connect {
        /// Netlist file (JSON or YAML)
        #[arg(short, long)]
        input: String,

        /// Also print the block structure of the result
        #[arg(long)]
        blocks: bool,
    },

    /// Inspect a channel permutation given by its image tuple
    Permutation {
        /// Image of each input channel
        #[arg(required = true, num_args = 1..)]
        image: Vec<usize>,
    },

    /// Show version information
    Version,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    let mut config = AlgebraConfig::new().with_cache(!cli.no_cache);
    if let Some(steps) = cli.max_rewrite_steps {
        config = config.with_max_rewrite_steps(steps);
    }
    qnet_algebra::config::set_config(config);

    // Execute command
    let result = match cli.command {
        Commands::Connect { input, blocks } => connect::execute(&input, blocks),
        Commands::Permutation { image } => permutation::execute(&image),
        Commands::Version => {
            version::execute();
            Ok(())
        }
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
