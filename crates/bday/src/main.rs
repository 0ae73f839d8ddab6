// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! bday - timezone-aware birthday and anniversary message scheduler.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod admin;
mod passes;
mod serve;

use std::path::PathBuf;

use bday_config::BdayConfig;
use bday_core::{BdayError, MessageStatus};
use clap::{Parser, Subcommand};

/// bday - timezone-aware birthday and anniversary message scheduler.
#[derive(Parser, Debug)]
#[command(name = "bday", version, about, long_about = None)]
struct Cli {
    /// Load this TOML file instead of the default search path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the seeder, dispatcher and worker pool until signalled.
    Serve,
    /// Run one seeding pass.
    Seed,
    /// Run one dispatch pass.
    Dispatch {
        /// Also run a reconciliation pass.
        #[arg(long)]
        reconcile: bool,
    },
    /// Inspect and repair scheduled messages. Prints JSON.
    Admin {
        #[command(subcommand)]
        action: AdminCommand,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Subcommand, Debug)]
pub(crate) enum AdminCommand {
    /// Message counts per status and queue depth.
    Stats,
    /// Show one message by id.
    Get { id: String },
    /// Show the message for one occurrence.
    Find {
        user_id: String,
        message_type: String,
        year: i32,
    },
    /// List messages in a status.
    List {
        #[arg(value_parser = parse_status)]
        status: MessageStatus,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Reset a FAILED or DEAD_LETTERED message to SCHEDULED with a fresh attempt budget.
    Requeue { id: String },
    /// Cancel a message that has not started sending.
    Cancel { id: String },
    /// List dead-lettered queue envelopes.
    DeadLetters {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

fn parse_status(value: &str) -> Result<MessageStatus, String> {
    value.parse().map_err(|_| {
        let valid: Vec<&str> = MessageStatus::ALL.iter().map(|s| s.as_str()).collect();
        format!("unknown status `{value}`, expected one of {}", valid.join(", "))
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => bday_config::load_and_validate_path(path),
        None => bday_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            bday_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.service.log_level);

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Seed) => passes::run_seed(&config).await,
        Some(Commands::Dispatch { reconcile }) => passes::run_dispatch(&config, reconcile).await,
        Some(Commands::Admin { action }) => admin::run_admin(&config, action).await,
        Some(Commands::Config) => print_config(&config),
        None => {
            println!("bday: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn print_config(config: &BdayConfig) -> Result<(), BdayError> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| BdayError::Internal(format!("failed to render config: {e}")))?;
    print!("{rendered}");
    Ok(())
}

/// `RUST_LOG` wins over `service.log_level`.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("bday={log_level},bday_engine={log_level},warn"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
