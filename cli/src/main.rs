// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

//! # homelab-paas control plane
//!
//! The `paas` binary runs the control plane and talks to a running one.
//!
//! ## Commands
//!
//! - `paas serve` - run the control plane (ingress, mesh, deploy queue, cleanup)
//! - `paas config show|validate` - configuration management
//! - `paas deploy FILE` - submit a service descriptor
//! - `paas status DEPLOYMENT_ID` - show a deployment record

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use homelab_paas::commands::{self, ConfigCommand, DeployArgs, StatusArgs};
use homelab_paas::daemon;
use paas_core::domain::platform_config::{LogFormat, PlatformConfig};

/// homelab-paas - self-hosted container platform
#[derive(Parser)]
#[command(name = "paas")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "PAAS_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config file's value
    #[arg(long, global = true, env = "PAAS_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the control plane
    #[command(name = "serve")]
    Serve,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Submit a service descriptor to a running control plane
    #[command(name = "deploy")]
    Deploy(DeployArgs),

    /// Show a deployment record
    #[command(name = "status")]
    Status(StatusArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let config = PlatformConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
            let level = cli.log_level.as_deref().unwrap_or(&config.observability.log_level);
            init_logging(level, config.observability.log_format)?;
            info!("Starting homelab-paas control plane");
            daemon::start_daemon(config).await
        }
        Commands::Config { command } => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), LogFormat::Text)?;
            commands::config::handle_command(command, cli.config).await
        }
        Commands::Deploy(args) => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), LogFormat::Text)?;
            commands::deploy::deploy(args).await
        }
        Commands::Status(args) => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), LogFormat::Text)?;
            commands::deploy::status(args).await
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.compact().init(),
    }

    Ok(())
}
