// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Nudge - proactive engagement trigger engine.
//!
//! This is the binary entry point: catalog inspection, script replay, and
//! configuration checks.

mod catalog;
mod replay;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nudge_config::NudgeConfig;

/// Nudge - proactive engagement trigger engine.
#[derive(Parser, Debug)]
#[command(name = "nudge", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// List the enabled trigger catalog for an organization.
    Catalog {
        /// Organization id (defaults to engine.organization_id).
        #[arg(long)]
        org: Option<String>,
        /// Print the catalog as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Replay a timed visitor script through a live engine.
    Replay {
        /// Path to the JSON script.
        script: PathBuf,
        /// Organization id (defaults to engine.organization_id).
        #[arg(long)]
        org: Option<String>,
        /// Keep trigger events in memory instead of writing them to the backend.
        #[arg(long)]
        dry_run: bool,
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Validate configuration and exit.
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => nudge_config::load_and_validate_path(path),
        None => nudge_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            nudge_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.engine.log_level);

    let result = match cli.command {
        Some(Commands::Catalog { org, json, plain }) => {
            match organization(&config, org) {
                Some(org) => catalog::run_catalog(&config, &org, json, plain).await,
                None => std::process::exit(1),
            }
        }
        Some(Commands::Replay {
            script,
            org,
            dry_run,
            plain,
        }) => match organization(&config, org) {
            Some(org) => replay::run_replay(&config, &org, &script, dry_run, plain).await,
            None => std::process::exit(1),
        },
        Some(Commands::CheckConfig) => {
            check_config(&config);
            Ok(())
        }
        None => {
            println!("nudge: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Resolve the organization from the flag or the config, rendering a
/// diagnostic when neither is set.
fn organization(config: &NudgeConfig, flag: Option<String>) -> Option<String> {
    if let Some(org) = flag.filter(|o| !o.trim().is_empty()) {
        return Some(org);
    }
    match nudge_config::require_organization(config) {
        Ok(org) => Some(org.to_string()),
        Err(e) => {
            nudge_config::render_errors(&[e]);
            None
        }
    }
}

fn check_config(config: &NudgeConfig) {
    println!("nudge: configuration OK");
    println!(
        "  organization   {}",
        config.engine.organization_id.as_deref().unwrap_or("(unset)")
    );
    println!("  backend        {}", config.backend.base_url);
    println!(
        "  tick           {}s, scroll throttle {}ms, prompt visible {}s",
        config.engine.tick_interval_secs,
        config.engine.scroll_throttle_ms,
        config.engine.visibility_secs
    );
    println!("  cart key       {}", config.cart.storage_key);
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "nudge={log_level},nudge_engine={log_level},nudge_client={log_level},warn"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
