// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

//! Streaming HTTP forwarder shared by the ingress and mesh proxies.
//!
//! Request and response bodies are streamed in both directions, never
//! buffered. Connection failures answer 502; an elapsed
//! `proxy.request_timeout_secs` answers 504.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, Request, Response, StatusCode};
use axum::response::IntoResponse;
use std::time::Duration;
use tracing::warn;

use crate::domain::deployment::ContainerEndpoint;

#[async_trait]
pub trait RequestForwarder: Send + Sync {
    /// Send `request` to `target` and relay whatever comes back.
    async fn forward(&self, request: Request<Body>, target: &ContainerEndpoint) -> Response<Body>;
}

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    HeaderName::from_static("keep-alive"),
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

pub struct HttpRequestForwarder {
    client: reqwest::Client,
}

impl HttpRequestForwarder {
    pub fn new(timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl RequestForwarder for HttpRequestForwarder {
    async fn forward(&self, request: Request<Body>, target: &ContainerEndpoint) -> Response<Body> {
        let (parts, body) = request.into_parts();
        let path_and_query = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let url = format!("http://{}{}", target.authority(), path_and_query);

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);

        let outbound = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()));

        match outbound.send().await {
            Ok(upstream) => {
                let status = upstream.status();
                let mut response_headers = upstream.headers().clone();
                strip_hop_by_hop(&mut response_headers);

                let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
                *response.status_mut() = status;
                *response.headers_mut() = response_headers;
                response
            }
            Err(e) if e.is_timeout() => {
                warn!(target = %target.authority(), error = %e, "Upstream request timed out");
                StatusCode::GATEWAY_TIMEOUT.into_response()
            }
            Err(e) => {
                warn!(target = %target.authority(), error = %e, "Upstream request failed");
                StatusCode::BAD_GATEWAY.into_response()
            }
        }
    }
}
