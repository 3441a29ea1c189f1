// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer
//!
//! HTTP surface of the control plane. Handlers translate requests into
//! application calls; no deployment logic lives here.
//!
//! | Module | Listener | Description |
//! |--------|----------|-------------|
//! | [`api`] | ingress, root domain | deploy and query endpoints |
//! | [`ingress`] | ingress, service hosts | authenticating reverse proxy |
//! | [`mesh`] | mesh | service-to-service proxy |

pub mod api;
pub mod host;
pub mod ingress;
pub mod mesh;
