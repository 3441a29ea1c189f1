// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0
//! Core of the homelab-paas control plane.
//!
//! # Architecture
//!
//! - [`domain`]: service and deployment records, descriptors, repository
//!   and runtime ports, platform configuration
//! - [`application`]: deploy queue, cleanup reconciler, network sync and
//!   the task runners that drive them
//! - [`infrastructure`]: sled/in-memory state store, Docker runtime, JWT
//!   sessions, HTTP forwarding
//! - [`presentation`]: platform API, ingress proxy, mesh proxy

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
