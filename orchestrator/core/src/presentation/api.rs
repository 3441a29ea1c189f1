// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0
//! Platform HTTP API, served on the root domain.
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /health` | liveness |
//! | `POST /service/deploy` | queue a deployment (bearer deploy token) |
//! | `GET /service/{serviceId}` | service record |
//! | `GET /service/{serviceId}/deployments` | deployment history, newest first |
//! | `GET /deployment/{deploymentId}` | deployment record |

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{error, info};

use crate::application::deploy_service::DeployService;
use crate::domain::deployment::{DeploymentId, DeploymentRecord};
use crate::domain::errors::{DomainError, ValidationError};
use crate::domain::repository::{DeploymentRepository, RepositoryError, ServiceRepository};
use crate::domain::service::{ServiceId, ServiceRecord};
use crate::domain::service_descriptor::ServiceDescriptor;

pub struct ApiState {
    pub deploy_service: Arc<DeployService>,
    pub service_repository: Arc<dyn ServiceRepository>,
    pub deployment_repository: Arc<dyn DeploymentRepository>,
    pub deploy_token: Option<String>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/service/deploy", post(deploy_service))
        .route("/service/{service_id}", get(get_service))
        .route("/service/{service_id}/deployments", get(list_service_deployments))
        .route("/deployment/{deployment_id}", get(get_deployment))
        .fallback(not_found)
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("ValidationError")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    MalformedBody(#[from] JsonRejection),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Domain(domain) => ApiError::Domain(domain),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(err) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": "ValidationError", "validationErrors": err.errors })),
            )
                .into_response(),
            ApiError::Domain(err) => {
                info!(error = %err, "Rejected request");
                (StatusCode::BAD_REQUEST, Json(json!({ "message": err.message }))).into_response()
            }
            ApiError::MalformedBody(rejection) => {
                (rejection.status(), Json(json!({ "message": rejection.body_text() }))).into_response()
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, Json(json!({ "message": message }))).into_response(),
            ApiError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "message": message }))).into_response()
            }
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, Json(json!({ "message": message }))).into_response(),
            ApiError::Internal(err) => {
                error!(error = ?err, "Unhandled API error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "message": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    /// YAML document as a string, or the descriptor as a JSON object.
    pub service_descriptor: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResponse {
    pub deployment_id: DeploymentId,
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "up" }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".to_string())
}

fn check_deploy_token(expected: Option<&str>, headers: &HeaderMap) -> Result<(), ApiError> {
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or_else(|| ApiError::Unauthorized("Missing deploy token".to_string()))?;

    let Some(expected) = expected else {
        return Err(ApiError::Forbidden("Deploy endpoint is disabled".to_string()));
    };

    if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Invalid deploy token".to_string()))
    }
}

fn parse_descriptor(document: serde_json::Value) -> Result<ServiceDescriptor, ValidationError> {
    match document {
        serde_json::Value::String(yaml) => ServiceDescriptor::from_yaml_str(&yaml),
        other => ServiceDescriptor::from_json_value(other),
    }
}

async fn deploy_service(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    request: Result<Json<DeployRequest>, JsonRejection>,
) -> Result<Json<DeployResponse>, ApiError> {
    // The token is checked before the body is looked at.
    check_deploy_token(state.deploy_token.as_deref(), &headers)?;
    let Json(request) = request?;
    let descriptor = parse_descriptor(request.service_descriptor)?;
    let deployment_id = state.deploy_service.start_deployment(descriptor);
    Ok(Json(DeployResponse { deployment_id }))
}

async fn get_service(
    State(state): State<Arc<ApiState>>,
    Path(service_id): Path<String>,
) -> Result<Json<ServiceRecord>, ApiError> {
    state
        .service_repository
        .query(&ServiceId::new(service_id.as_str()))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Service {} not found", service_id)))
}

async fn list_service_deployments(
    State(state): State<Arc<ApiState>>,
    Path(service_id): Path<String>,
) -> Result<Json<Vec<DeploymentRecord>>, ApiError> {
    let deployments = state
        .deployment_repository
        .query_for_service(&ServiceId::new(service_id))
        .await?;
    Ok(Json(deployments))
}

async fn get_deployment(
    State(state): State<Arc<ApiState>>,
    Path(deployment_id): Path<String>,
) -> Result<Json<DeploymentRecord>, ApiError> {
    state
        .deployment_repository
        .query(&DeploymentId::new(deployment_id.as_str()))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Deployment {} not found", deployment_id)))
}
