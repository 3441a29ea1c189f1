// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the paas CLI

pub mod config;
pub mod deploy;

pub use self::config::ConfigCommand;
pub use self::deploy::{DeployArgs, StatusArgs};
