//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Drive a session interactively from stdin against the in-memory engine
    Run {
        /// Echo every packet the interface sends back through the engine
        #[arg(short, long)]
        loopback: bool,
        /// Publish detailed status snapshots on every poll
        #[arg(long)]
        live: bool,
    },
    /// Validate a comma-separated DNS server list
    CheckDns {
        /// Resolver list, e.g. "1.1.1.1, [2606:4700:4700::1111]"
        list: String,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}
