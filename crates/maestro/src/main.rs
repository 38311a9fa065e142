// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Maestro - plugin orchestrator.
//!
//! This is the binary entry point: it loads the configuration, then runs the
//! plugin manager (`serve`), validates the configuration (`check`), or lists
//! the known plugin definitions (`plugins`).

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod builtin;
mod plugins;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use maestro_config::MaestroConfig;

/// Maestro - plugin orchestrator.
#[derive(Parser, Debug)]
#[command(name = "maestro", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the plugin manager and run until SIGINT or SIGTERM.
    Serve {
        /// Replay JSON-lines event messages from this file after start-up.
        #[arg(long)]
        events: Option<PathBuf>,
        /// Post replayed events on the inbound interface.
        #[arg(long)]
        inbound: bool,
    },
    /// Validate the configuration and exit.
    Check,
    /// List plugin definitions and their configurations.
    Plugins,
}

fn load_config(path: Option<&PathBuf>) -> MaestroConfig {
    let loaded = match path {
        Some(path) => maestro_config::load_and_validate_path(path),
        None => maestro_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            maestro_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref());

    let result = match cli.command {
        Some(Commands::Serve { events, inbound }) => {
            serve::run_serve(config, serve::ServeOptions { events, inbound }).await
        }
        Some(Commands::Check) => {
            println!(
                "maestro: config ok ({} definitions, {} configurations)",
                config.definitions.len(),
                config.configurations.len()
            );
            Ok(())
        }
        Some(Commands::Plugins) => plugins::run_plugins(&config).await,
        None => {
            println!("maestro: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
