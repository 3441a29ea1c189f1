// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0
//! Ingress reverse proxy
//!
//! Every request to the ingress listener passes through [`route_ingress`].
//! Requests for the root domain fall through to the platform API; anything
//! addressed to `<serviceId>.<root_domain>` is authenticated (unless the
//! service is public) and forwarded to the active deployment's container
//! with the caller's identity attached as `PaasAuth-*` headers.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::application::active_deployment::ActiveDeploymentResolver;
use crate::domain::auth::{is_user_authorized, AuthService, AuthedUser};
use crate::infrastructure::forwarder::RequestForwarder;
use crate::presentation::host::{hostname, ingress_service_id, is_root_domain, request_authority};

const IDENTITY_HEADER_PREFIX: &str = "paasauth-";
const HEADER_USER_ID: &str = "paasauth-userid";
const HEADER_NAME: &str = "paasauth-name";
const HEADER_AVATAR: &str = "paasauth-avatar";
const HEADER_EMAIL: &str = "paasauth-email";

pub struct IngressState {
    pub root_domain: String,
    pub public_scheme: String,
    pub cookie_name: String,
    pub resolver: ActiveDeploymentResolver,
    pub auth: Arc<dyn AuthService>,
    pub forwarder: Arc<dyn RequestForwarder>,
}

/// Wraps the platform API router so that service hosts are proxied before
/// routing happens.
pub fn router(state: Arc<IngressState>, platform: Router) -> Router {
    platform.layer(middleware::from_fn_with_state(state, route_ingress))
}

pub async fn route_ingress(State(state): State<Arc<IngressState>>, request: Request, next: Next) -> Response {
    let authority = request_authority(&request).unwrap_or_default();
    let host = hostname(&authority);
    if is_root_domain(&host, &state.root_domain) {
        return next.run(request).await;
    }

    let response = proxy(&state, &authority, &host, request).await;
    metrics::counter!(
        "paas_proxy_requests_total",
        "proxy" => "ingress",
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);
    response
}

async fn proxy(state: &IngressState, authority: &str, host: &str, mut request: Request) -> Response {
    let Some(service_id) = ingress_service_id(host, &state.root_domain) else {
        error!(host = %host, "Failed to parse service id from host");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let deployment = match state.resolver.resolve(&service_id).await {
        Ok(deployment) => deployment,
        Err(e) => {
            error!(service_id = %service_id, error = %e, "Failed to resolve active deployment");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let descriptor = deployment.as_ref().map(|d| &d.service_descriptor);
    let is_public = descriptor.map(|d| d.is_public()).unwrap_or(false);

    let user = if is_public {
        None
    } else {
        let user = session_token(request.headers(), &state.cookie_name)
            .and_then(|token| state.auth.verify_credential(&token));
        let Some(user) = user else {
            let path_and_query = request.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
            let return_url = format!("{}://{}{}", state.public_scheme, authority, path_and_query);
            debug!(service_id = %service_id, "Redirecting unauthenticated request to login");
            return (
                StatusCode::FOUND,
                [(header::LOCATION, state.auth.login_url(&return_url))],
            )
                .into_response();
        };
        let authorized_users = descriptor.and_then(|d| d.authorized_users());
        if !is_user_authorized(state.auth.as_ref(), &user.user_id, authorized_users) {
            debug!(service_id = %service_id, user_id = %user.user_id, "User not authorized for service");
            return StatusCode::FORBIDDEN.into_response();
        }
        Some(user)
    };

    let Some(container) = deployment.and_then(|d| d.container) else {
        debug!(service_id = %service_id, "No running container for service");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    set_identity_headers(request.headers_mut(), user.as_ref());
    state.forwarder.forward(request, &container).await
}

/// Value of the session cookie, if the request carries one.
fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// Drops caller-supplied identity headers and, for authenticated requests,
/// sets the verified ones.
fn set_identity_headers(headers: &mut HeaderMap, user: Option<&AuthedUser>) {
    let spoofed: Vec<HeaderName> = headers
        .keys()
        .filter(|name| name.as_str().starts_with(IDENTITY_HEADER_PREFIX))
        .cloned()
        .collect();
    for name in spoofed {
        headers.remove(name);
    }

    let Some(user) = user else {
        return;
    };
    let identity = [
        (HEADER_USER_ID, Some(user.user_id.as_str())),
        (HEADER_NAME, user.name.as_deref()),
        (HEADER_AVATAR, user.avatar_url.as_deref()),
        (HEADER_EMAIL, user.email.as_deref()),
    ];
    for (name, value) in identity {
        let Some(value) = value else { continue };
        match HeaderValue::from_str(value) {
            Ok(value) => {
                headers.insert(HeaderName::from_static(name), value);
            }
            Err(_) => warn!(header = name, "Identity value is not a valid header value"),
        }
    }
}
