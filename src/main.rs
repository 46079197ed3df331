//! scanreport entry point
//!
//! Wires configuration, logging, and the CLI together, then maps the
//! command's outcome to a process exit code.

use clap::Parser;

use scanreport::cli::{exit_codes, Cli, CliApp, CliContext};
use scanreport::config::{Config, ConfigLoadError};
use scanreport::logging::init_tracing;

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: failed to load .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {}", err);
            std::process::exit(exit_codes::CONFIG_ERROR);
        }
    };

    if let Err(err) = init_tracing(&config.logging) {
        eprintln!("Failed to initialize logging: {}", err);
        std::process::exit(exit_codes::GENERAL_ERROR);
    }

    let app = CliApp::new(cli, CliContext::new(config));
    let code = match app.run().await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "Command failed");
            eprintln!("Error: {:#}", err);
            exit_codes::GENERAL_ERROR
        }
    };
    std::process::exit(code);
}

/// Load layered configuration, honoring --config and --verbose
fn load_config(cli: &Cli) -> Result<Config, ConfigLoadError> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    Ok(config)
}
