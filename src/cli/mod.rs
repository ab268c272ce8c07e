pub mod run;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hook-ledger")]
#[command(about = "Token ledger with fault-isolated balance extensions", long_about = None)]
pub struct Cli {
    /// Ledger configuration file (created with defaults if missing)
    #[arg(long, default_value = "hook-ledger.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Play a scenario file and print a JSON report
    Run {
        scenario: PathBuf,
        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },
    /// Check that a wasm or wat module implements the extension ABI
    Check {
        module: PathBuf,
    },
}
