//! meshtun CLI library
//!
//! Host-side pieces of the `meshtun` binary: argument parsing, configuration loading and
//! the interactive tunnel host.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;

pub use app::{spawn_event_printer, Flow, TunnelApp};
pub use cli::{Cli, Commands};
pub use config::AppConfig;
pub use error::{CliError, Result};
