// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0
//! Service-mesh proxy
//!
//! Service containers reach peers through `<peer>.mesh`, which resolves to
//! the control plane on the caller's service network. The caller is
//! identified by its source address, the target by the first host label, and
//! the call is allowed only when the caller lists the target in its mesh
//! egress and the target lists the caller in its mesh ingress.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error};

use crate::application::active_deployment::ActiveDeploymentResolver;
use crate::domain::runtime::{ContainerRuntime, ManagedContainer};
use crate::domain::service::ServiceId;
use crate::infrastructure::forwarder::RequestForwarder;
use crate::presentation::host::{hostname, mesh_target_id, normalize_ip, request_authority};

pub struct MeshState {
    pub resolver: ActiveDeploymentResolver,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub forwarder: Arc<dyn RequestForwarder>,
}

/// Serve with `into_make_service_with_connect_info::<SocketAddr>()` so the
/// peer address is available.
pub fn router(state: Arc<MeshState>) -> Router {
    Router::new().fallback(route_mesh).with_state(state)
}

async fn route_mesh(
    State(state): State<Arc<MeshState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let response = proxy(&state, peer.ip(), request).await;
    metrics::counter!(
        "paas_proxy_requests_total",
        "proxy" => "mesh",
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);
    response
}

/// Service owning the managed container that has `ip` on any network.
async fn service_for_ip(runtime: &dyn ContainerRuntime, ip: IpAddr) -> anyhow::Result<Option<ServiceId>> {
    let ip = normalize_ip(ip);
    let containers = runtime.list_containers().await?;
    Ok(containers
        .into_iter()
        .filter(ManagedContainer::is_running)
        .find(|container| container.ip_addresses.iter().any(|addr| normalize_ip(*addr) == ip))
        .and_then(|container| container.service_id))
}

async fn proxy(state: &MeshState, peer_ip: IpAddr, request: Request) -> Response {
    let host = hostname(&request_authority(&request).unwrap_or_default());
    let Some(target_id) = mesh_target_id(&host) else {
        error!(host = %host, "Failed to parse mesh target from host");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let requester_id = match service_for_ip(state.runtime.as_ref(), peer_ip).await {
        Ok(Some(service_id)) => service_id,
        Ok(None) => {
            error!(peer_ip = %peer_ip, "No managed container owns the caller address");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        Err(e) => {
            error!(peer_ip = %peer_ip, error = %e, "Failed to identify mesh caller");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let (requester, target) = match tokio::try_join!(
        state.resolver.resolve(&requester_id),
        state.resolver.resolve(&target_id)
    ) {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %e, "Failed to resolve mesh deployments");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let (Some(requester), Some(target)) = (requester, target) else {
        debug!(requester = %requester_id, target = %target_id, "Mesh peer has no active deployment");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let allowed = target.service_descriptor.mesh_ingress().contains(&requester_id)
        && requester.service_descriptor.mesh_egress().contains(&target_id);
    if !allowed {
        debug!(requester = %requester_id, target = %target_id, "Mesh call denied");
        return StatusCode::FORBIDDEN.into_response();
    }

    let Some(container) = target.container else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    state.forwarder.forward(request, &container).await
}
