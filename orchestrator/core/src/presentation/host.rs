// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0
//! Host header and peer address parsing shared by both proxies.

use axum::http::{header, Request};
use std::net::IpAddr;

use crate::domain::platform_config::normalize_domain;
use crate::domain::service::ServiceId;

/// Request authority as sent by the client (`Host`, or the URI authority for
/// HTTP/2), port included.
pub fn request_authority<B>(request: &Request<B>) -> Option<String> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.as_str().to_string()))
}

/// Lowercased hostname with any port removed.
pub fn hostname(authority: &str) -> String {
    let host = match authority.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => authority,
    };
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// Service addressed by `<serviceId>.<root_domain>`. Deeper names resolve
/// to the label directly left of the root domain.
pub fn ingress_service_id(hostname: &str, root_domain: &str) -> Option<ServiceId> {
    let root_domain = normalize_domain(root_domain);
    let prefix = hostname.strip_suffix(root_domain.as_str())?.strip_suffix('.')?;
    let label = prefix.rsplit('.').next()?;
    (!label.is_empty()).then(|| ServiceId::new(label))
}

/// True when `hostname` (already passed through [`hostname`]) is the root
/// domain itself.
pub fn is_root_domain(hostname: &str, root_domain: &str) -> bool {
    hostname == normalize_domain(root_domain)
}

/// Mesh target is the first label (`svc-b.mesh` → `svc-b`).
pub fn mesh_target_id(hostname: &str) -> Option<ServiceId> {
    let label = hostname.split('.').next()?;
    (!label.is_empty()).then(|| ServiceId::new(label))
}

/// IPv4-mapped IPv6 peers (`::ffff:a.b.c.d`) compare as plain IPv4.
pub fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}
