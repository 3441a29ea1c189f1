// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

//! Control plane process
//!
//! Handles:
//! - Component wiring from the loaded configuration
//! - Startup, queue and periodic task runners
//! - Ingress and mesh listeners
//! - Graceful shutdown

pub mod server;

pub use server::start_daemon;
