//! mediadeck - media server registry and connection prober
//!
//! Keeps the list of Stremio/TorrServer style servers a streaming
//! front-end talks to, tracks the active server per type and checks
//! whether each one is reachable.
//!
//! # Usage
//!
//! ```bash
//! mediadeck add -t stremio -n "Living Room" -u http://192.168.1.20:11470 --current
//! mediadeck list --json
//! mediadeck check -t stremio
//! ```

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mediadeck::cli::{Cli, Command, ExitCode, Output};
use mediadeck::commands;
use mediadeck::config::Config;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::load_from(path),
        None => Config::load(),
    };
    init_logging(&config);

    run_cli(cli, &config).await.into()
}

/// Install the stderr tracing subscriber, keeping stdout for command output
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_new(config.log_filter()).unwrap_or_else(|e| {
        eprintln!("Invalid log filter ({}), using \"warn\"", e);
        EnvFilter::new("warn")
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Unable to set global default subscriber: {}", e);
    }
}

/// Run CLI command and return exit code
async fn run_cli(cli: Cli, config: &Config) -> ExitCode {
    let output = Output::new(&cli);

    let timeout = match cli.command {
        Command::Check(ref cmd) => cmd.timeout.map(Duration::from_millis),
        _ => None,
    };

    let registry = match commands::open_registry(config, timeout) {
        Ok(registry) => registry,
        Err(e) => return output.error(format!("{:#}", e), ExitCode::StorageError),
    };

    match cli.command {
        Command::List(cmd) => commands::list_cmd(cmd, &registry, &output).await,
        Command::Add(cmd) => commands::add_cmd(cmd, &registry, &output).await,
        Command::Edit(cmd) => commands::edit_cmd(cmd, &registry, &output).await,
        Command::Use(cmd) => commands::use_cmd(cmd, &registry, &output).await,
        Command::Remove(cmd) => commands::remove_cmd(cmd, &registry, &output).await,
        Command::Check(cmd) => commands::check_cmd(cmd, &registry, &output).await,
    }
}
