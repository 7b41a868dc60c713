//! # Olympiad - Stage Manager
//!
//! The main binary for the Olympiad stage engine.
//!
//! ## Usage
//!
//! ```bash
//! olympiad init
//! olympiad event add "Table Tennis"
//! olympiad stage add 1 single_elimination
//! olympiad participant add "Ada"
//! olympiad enroll 1 1
//! olympiad generate 1
//! olympiad show 1
//! ```

use clap::Parser;
use olympiad::cli;
use olympiad::config::{FileConfig, LogFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();
    let config = FileConfig::discover(cli.config.as_deref());

    // OLYMPIAD_LOG_FORMAT=json enables machine-parseable output.
    let env_format = std::env::var("OLYMPIAD_LOG_FORMAT").ok();
    let log_format = match &config {
        Ok(file) => LogFormat::resolve(env_format.as_deref(), file),
        Err(_) => LogFormat::resolve(env_format.as_deref(), &FileConfig::default()),
    };
    init_tracing(log_format, cli.quiet);

    let result = config.and_then(|file| cli::execute(cli, &file));
    if let Err(e) = result {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
fn init_tracing(format: LogFormat, quiet: bool) {
    let default_filter = if quiet { "olympiad=warn" } else { "olympiad=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
