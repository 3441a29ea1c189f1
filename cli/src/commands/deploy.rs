// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

//! Client commands against a running control plane
//!
//! Commands: deploy, status

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args)]
pub struct DeployArgs {
    /// Service descriptor (YAML)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Platform API base URL, e.g. https://example.com
    #[arg(long, env = "PAAS_URL")]
    pub url: String,

    /// Deploy token
    #[arg(long, env = "PAAS_DEPLOY_TOKEN", hide_env_values = true)]
    pub token: String,
}

#[derive(Args)]
pub struct StatusArgs {
    #[arg(value_name = "DEPLOYMENT_ID")]
    pub deployment_id: String,

    /// Platform API base URL, e.g. https://example.com
    #[arg(long, env = "PAAS_URL")]
    pub url: String,
}

fn client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

pub async fn deploy(args: DeployArgs) -> Result<()> {
    let descriptor = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let response = client()?
        .post(endpoint(&args.url, "/service/deploy"))
        .bearer_auth(&args.token)
        .json(&json!({ "serviceDescriptor": descriptor }))
        .send()
        .await
        .context("Failed to reach the platform API")?;

    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        eprintln!("{}", format!("✗ Deploy rejected ({})", status).red());
        if let Some(errors) = body.get("validationErrors").and_then(Value::as_array) {
            for error in errors {
                eprintln!("  - {}", error);
            }
        } else if let Some(message) = body.get("message").and_then(Value::as_str) {
            eprintln!("  {}", message);
        }
        bail!("deploy failed with status {}", status);
    }

    let deployment_id = body
        .get("deploymentId")
        .and_then(Value::as_str)
        .context("Response did not include a deployment id")?;
    println!("{}", format!("✓ Deployment queued: {}", deployment_id).green());
    Ok(())
}

pub async fn status(args: StatusArgs) -> Result<()> {
    let response = client()?
        .get(endpoint(&args.url, &format!("/deployment/{}", args.deployment_id)))
        .send()
        .await
        .context("Failed to reach the platform API")?;

    let status = response.status();
    if !status.is_success() {
        bail!("deployment lookup failed with status {}", status);
    }

    let record: Value = response.json().await.context("Invalid deployment record")?;
    let state = record.get("status").and_then(Value::as_str).unwrap_or("unknown");
    let rendered = match state {
        "running" => state.green(),
        "failed" => state.red(),
        "deploying" => state.yellow(),
        _ => state.dimmed(),
    };

    println!("{} {}", "Deployment:".bold(), args.deployment_id);
    println!("  Service: {}", record.get("serviceId").and_then(Value::as_str).unwrap_or("-"));
    println!("  Status: {}", rendered);
    if let Some(reason) = record.get("failureReason").and_then(Value::as_str) {
        println!("  Failure: {}", reason);
    }
    if let Some(container) = record.get("container") {
        println!(
            "  Container: {}:{}",
            container.get("hostname").and_then(Value::as_str).unwrap_or("-"),
            container.get("port").and_then(Value::as_u64).unwrap_or_default()
        );
    }
    Ok(())
}
