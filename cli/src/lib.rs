// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0
//! homelab-paas CLI library - exposes testable components
//!
//! - [`daemon`]: control plane wiring and listeners
//! - [`commands`]: client-side subcommands

pub mod commands;
pub mod daemon;
