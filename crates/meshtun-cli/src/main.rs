//! meshtun CLI entry point

use clap::Parser;
use std::io;
use tracing::{error, info};

use meshtun_cli::{
    app::{spawn_event_printer, TunnelApp},
    cli::{Cli, Commands},
    config::AppConfig,
    error::Result,
};
use meshtun_core::dns::parse_dns_servers_detailed;

fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    // Load configuration
    let mut config = load_configuration(&cli)?;

    match cli.command {
        Commands::Run { loopback, live } => {
            config.demo.loopback |= loopback;
            config.ui.live_updates |= live;
            if let Err(e) = run_host(config) {
                error!("Tunnel host failed: {}", e);
                std::process::exit(1);
            }
        }
        Commands::CheckDns { list } => check_dns(&list),
        Commands::ShowConfig => print!("{}", config.to_toml()?),
    }

    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from file or use defaults
fn load_configuration(cli: &Cli) -> Result<AppConfig> {
    if let Some(config_path) = &cli.config {
        info!("Loading configuration from: {}", config_path);
        AppConfig::load_from_file(config_path)
    } else {
        info!("Using default configuration");
        Ok(AppConfig::default())
    }
}

fn run_host(config: AppConfig) -> Result<()> {
    let app = TunnelApp::new(config)?;
    let printer = spawn_event_printer(app.subscribe())?;

    app.run(io::stdin().lock(), io::stdout())?;

    // Dropping the session closes the status channel and ends the printer
    drop(app);
    if printer.join().is_err() {
        error!("Event printer panicked");
    }
    info!("meshtun exited");
    Ok(())
}

fn check_dns(list: &str) {
    for (entry, outcome) in parse_dns_servers_detailed(list) {
        match outcome {
            Ok(server) => println!("ok      {}", server),
            Err(reason) => println!("skipped {} ({})", entry, reason),
        }
    }
}
