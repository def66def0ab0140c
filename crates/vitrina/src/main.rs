// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vitrina - WhatsApp storefront responder.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod check;
mod serve;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vitrina_config::{ConfigError, VitrinaConfig};

/// Vitrina - WhatsApp storefront responder.
#[derive(Parser, Debug)]
#[command(name = "vitrina", version, about, long_about = None)]
struct Cli {
    /// Read this file instead of the standard config locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook server and conversation engine.
    Serve,
    /// Query a running instance for sessions and token balance.
    Status {
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Load and validate the configuration, then exit.
    CheckConfig,
}

fn load(path: Option<&PathBuf>) -> Result<VitrinaConfig, Vec<ConfigError>> {
    match path {
        Some(path) => vitrina_config::load_and_validate_path(path),
        None => vitrina_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            vitrina_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Status { json }) => status::run_status(&config, json).await,
        Some(Commands::CheckConfig) => {
            check::run_check_config(&config);
            Ok(())
        }
        None => {
            println!("vitrina: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
