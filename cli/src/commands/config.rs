// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use paas_core::domain::platform_config::PlatformConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show effective configuration (secrets redacted)
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. PAAS_CONFIG_PATH: {}",
            std::env::var("PAAS_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./paas-config.yaml");
        println!("  4. /etc/homelab-paas/config.yaml");
        println!();
    }

    let config = PlatformConfig::load(config_override.as_deref()).context("Failed to load configuration")?;
    let rendered = serde_yaml::to_string(&config.redacted()).context("Failed to render configuration")?;

    println!("{}", "Current configuration:".bold());
    println!();
    print!("{}", rendered);
    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = PlatformConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());
    println!("  Root domain: {}", config.root_domain);
    println!("  Ingress: {}", config.network.ingress_bind);
    println!("  Mesh: {}", config.network.mesh_bind);
    println!("  Storage: {:?} ({})", config.storage.backend, config.storage.data_dir.display());
    Ok(())
}
