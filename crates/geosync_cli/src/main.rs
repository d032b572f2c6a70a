//! geosync CLI
//!
//! Offline maintenance tools for geosync cache stores.
//!
//! # Commands
//!
//! - `list` - List cached datasets with row counts and sync stamps
//! - `inspect` - Display one dataset's header, schema and record stats
//! - `verify` - Scan cache files and check every record checksum
//! - `clear` - Remove cached artifacts for one dataset or all of them

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// geosync cache store maintenance tools.
#[derive(Parser)]
#[command(name = "geosync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the cache store directory
    #[arg(global = true, short, long)]
    store: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List cached datasets with row counts and sync stamps
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Display one dataset's header, schema and record stats
    Inspect {
        /// Dataset id to inspect
        dataset: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Scan cache files and check every record checksum
    Verify {
        /// Dataset id to verify
        dataset: Option<u64>,

        /// Verify every dataset in the store
        #[arg(short, long)]
        all: bool,
    },

    /// Remove cached artifacts for one dataset or all of them
    Clear {
        /// Dataset id to clear
        dataset: Option<u64>,

        /// Clear every dataset in the store
        #[arg(short, long)]
        all: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::List { format } => {
            let store = cli.store.ok_or("Store path required for list")?;
            commands::list::run(&store, &format)?;
        }
        Commands::Inspect { dataset, format } => {
            let store = cli.store.ok_or("Store path required for inspect")?;
            commands::inspect::run(&store, dataset, &format)?;
        }
        Commands::Verify { dataset, all } => {
            let store = cli.store.ok_or("Store path required for verify")?;
            if dataset.is_none() && !all {
                return Err("Specify a dataset id or --all".into());
            }
            commands::verify::run(&store, dataset, all)?;
        }
        Commands::Clear { dataset, all } => {
            let store = cli.store.ok_or("Store path required for clear")?;
            if dataset.is_none() && !all {
                return Err("Specify a dataset id or --all".into());
            }
            commands::clear::run(&store, dataset, all)?;
        }
        Commands::Version => {
            println!("geosync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
