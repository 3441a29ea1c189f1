// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod auth;
pub mod forwarder;
pub mod kv_store;
pub mod repositories;
pub mod runtime;

pub use auth::JwtAuthService;
pub use forwarder::{HttpRequestForwarder, RequestForwarder};
pub use runtime::DockerRuntime;
