// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

//! Ingress and mesh routing decisions, exercised through the routers with
//! an in-memory state store, a static container listing and a recording
//! forwarder in place of the upstream HTTP call.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Request, Response, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use paas_core::application::active_deployment::ActiveDeploymentResolver;
use paas_core::application::task_runner::InMemoryTaskQueue;
use paas_core::application::{DeployService, DeployTaskDescriptor};
use paas_core::domain::auth::AuthedUser;
use paas_core::domain::deployment::{ContainerEndpoint, DeploymentId, DeploymentRecord};
use paas_core::domain::repository::{DeploymentRepository, ServiceRepository};
use paas_core::domain::runtime::{
    ContainerRuntime, ManagedContainer, RunContainerRequest, RuntimeError, StartedContainer,
};
use paas_core::domain::service::{ServiceId, ServiceRecord};
use paas_core::domain::service_descriptor::ServiceDescriptor;
use paas_core::infrastructure::kv_store::InMemoryKeyValueStore;
use paas_core::infrastructure::repositories::{KvDeploymentRepository, KvServiceRepository};
use paas_core::infrastructure::{JwtAuthService, RequestForwarder};
use paas_core::presentation::api::{self, ApiState};
use paas_core::presentation::ingress::{self, IngressState};
use paas_core::presentation::mesh::{self, MeshState};

const ROOT_DOMAIN: &str = "example.com";
const LOGIN_URL: &str = "https://example.com/auth/login";
const COOKIE: &str = "paasauth";

struct StaticRuntime {
    containers: Vec<ManagedContainer>,
}

fn unsupported() -> RuntimeError {
    RuntimeError::Api("not used by the proxies".to_string())
}

#[async_trait]
impl ContainerRuntime for StaticRuntime {
    async fn find_network(&self, _service_id: &ServiceId) -> Result<Option<String>, RuntimeError> {
        Err(unsupported())
    }

    async fn create_network(&self, _service_id: &ServiceId) -> Result<String, RuntimeError> {
        Err(unsupported())
    }

    async fn connect_network(&self, _: &str, _: &str, _: Vec<String>) -> Result<(), RuntimeError> {
        Err(unsupported())
    }

    async fn disconnect_network(&self, _: &str, _: &str) -> Result<(), RuntimeError> {
        Err(unsupported())
    }

    async fn list_containers(&self) -> Result<Vec<ManagedContainer>, RuntimeError> {
        Ok(self.containers.clone())
    }

    async fn run_container(&self, _request: RunContainerRequest) -> Result<StartedContainer, RuntimeError> {
        Err(unsupported())
    }

    async fn terminate_container(&self, _container_id: &str) -> Result<(), RuntimeError> {
        Err(unsupported())
    }

    async fn pull_image_if_absent(&self, _image: &str) -> Result<(), RuntimeError> {
        Err(unsupported())
    }

    async fn is_container_running(&self, _: &ServiceId, _: &DeploymentId) -> Result<bool, RuntimeError> {
        Err(unsupported())
    }
}

#[derive(Default)]
struct RecordingForwarder {
    calls: Mutex<Vec<(HeaderMap, ContainerEndpoint)>>,
}

#[async_trait]
impl RequestForwarder for RecordingForwarder {
    async fn forward(&self, request: Request<Body>, target: &ContainerEndpoint) -> Response<Body> {
        self.calls.lock().push((request.headers().clone(), target.clone()));
        Response::new(Body::from("forwarded"))
    }
}

struct Platform {
    services: Arc<KvServiceRepository>,
    deployments: Arc<KvDeploymentRepository>,
    auth: Arc<JwtAuthService>,
    forwarder: Arc<RecordingForwarder>,
}

impl Platform {
    fn new() -> Self {
        Self {
            services: Arc::new(KvServiceRepository::new(Arc::new(
                InMemoryKeyValueStore::<ServiceRecord>::new(),
            ))),
            deployments: Arc::new(KvDeploymentRepository::new(Arc::new(
                InMemoryKeyValueStore::<DeploymentRecord>::new(),
            ))),
            auth: Arc::new(
                JwtAuthService::new(
                    "integration-secret",
                    vec!["alice".to_string(), "bob".to_string()],
                    LOGIN_URL,
                    Duration::from_secs(3600),
                )
                .unwrap(),
            ),
            forwarder: Arc::new(RecordingForwarder::default()),
        }
    }

    fn resolver(&self) -> ActiveDeploymentResolver {
        ActiveDeploymentResolver::new(self.services.clone(), self.deployments.clone())
    }

    /// Store `yaml` as the running, active deployment of its service.
    async fn activate(&self, yaml: &str, deployment_id: &str) {
        let descriptor = ServiceDescriptor::from_yaml_str(yaml).unwrap();
        let service_id = descriptor.service_id.clone();
        let id = DeploymentId::new(deployment_id);
        if self.services.query(&service_id).await.unwrap().is_none() {
            self.services.create(&service_id).await.unwrap();
        }
        self.deployments.create(&id, descriptor).await.unwrap();
        self.deployments
            .mark_running(
                &id,
                ContainerEndpoint {
                    hostname: format!("{}-{}", service_id, deployment_id),
                    port: 8080,
                },
            )
            .await
            .unwrap();
        self.services.set_active_deployment(&service_id, &id).await.unwrap();
    }

    fn session_cookie(&self, user_id: &str) -> String {
        let token = self
            .auth
            .issue_token(&AuthedUser {
                user_id: user_id.to_string(),
                name: Some("Alice Example".to_string()),
                email: Some(format!("{}@example.com", user_id)),
                avatar_url: None,
            })
            .unwrap();
        format!("{}={}", COOKIE, token)
    }

    fn ingress(&self) -> Router {
        self.ingress_for(ROOT_DOMAIN)
    }

    fn ingress_for(&self, root_domain: &str) -> Router {
        let queue = Arc::new(InMemoryTaskQueue::<DeployTaskDescriptor>::new());
        let platform_api = api::router(Arc::new(ApiState {
            deploy_service: Arc::new(DeployService::new(queue)),
            service_repository: self.services.clone(),
            deployment_repository: self.deployments.clone(),
            deploy_token: None,
        }));
        ingress::router(
            Arc::new(IngressState {
                root_domain: root_domain.to_string(),
                public_scheme: "https".to_string(),
                cookie_name: COOKIE.to_string(),
                resolver: self.resolver(),
                auth: self.auth.clone(),
                forwarder: self.forwarder.clone(),
            }),
            platform_api,
        )
    }

    fn mesh(&self, containers: Vec<ManagedContainer>) -> Router {
        mesh::router(Arc::new(MeshState {
            resolver: self.resolver(),
            runtime: Arc::new(StaticRuntime { containers }),
            forwarder: self.forwarder.clone(),
        }))
    }

    fn forwarded(&self) -> Vec<(HeaderMap, ContainerEndpoint)> {
        self.forwarder.calls.lock().clone()
    }
}

const PRIVATE_SVC: &str = "
serviceId: svc1
image: img:latest
networking:
  ingress:
    containerPort: 8080
    authorizedUsers: [alice]
";

const PUBLIC_SVC: &str = "
serviceId: blog
image: img:latest
networking:
  ingress:
    containerPort: 8080
    public: true
";

fn ingress_request(host: &str, path: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(path).header(header::HOST, host);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_root_domain_is_served_by_platform_api() {
    let platform = Platform::new();

    let response = platform
        .ingress()
        .oneshot(ingress_request("example.com", "/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], br#"{"status":"up"}"#);
    assert!(platform.forwarded().is_empty());
}

#[tokio::test]
async fn test_root_domain_match_ignores_case() {
    let platform = Platform::new();

    let response = platform
        .ingress_for("Example.com")
        .oneshot(ingress_request("EXAMPLE.COM:443", "/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(platform.forwarded().is_empty());
}

#[tokio::test]
async fn test_private_service_redirects_to_login_with_return_url() {
    let platform = Platform::new();
    platform.activate(PRIVATE_SVC, "d1").await;

    let response = platform
        .ingress()
        .oneshot(ingress_request("svc1.example.com", "/path?q=1", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    let location = url::Url::parse(location).unwrap();
    assert_eq!(location.path(), "/auth/login");
    let redirect_uri = location
        .query_pairs()
        .find(|(key, _)| key == "redirect_uri")
        .map(|(_, value)| value.into_owned());
    assert_eq!(redirect_uri.as_deref(), Some("https://svc1.example.com/path?q=1"));
}

#[tokio::test]
async fn test_unknown_service_requires_login() {
    let platform = Platform::new();

    let response = platform
        .ingress()
        .oneshot(ingress_request("ghost.example.com", "/", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn test_forged_session_redirects_to_login() {
    let platform = Platform::new();
    platform.activate(PRIVATE_SVC, "d1").await;

    let response = platform
        .ingress()
        .oneshot(ingress_request("svc1.example.com", "/", Some("paasauth=not.a.jwt")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn test_user_outside_service_allow_list_is_forbidden() {
    let platform = Platform::new();
    platform.activate(PRIVATE_SVC, "d1").await;
    let cookie = platform.session_cookie("bob");

    let response = platform
        .ingress()
        .oneshot(ingress_request("svc1.example.com", "/", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(platform.forwarded().is_empty());
}

#[tokio::test]
async fn test_authorized_user_is_forwarded_with_identity_headers() {
    let platform = Platform::new();
    platform.activate(PRIVATE_SVC, "d1").await;
    let cookie = platform.session_cookie("alice");

    let mut request = ingress_request("svc1.example.com", "/dashboard", Some(&cookie));
    request
        .headers_mut()
        .insert("paasauth-userid", "mallory".parse().unwrap());

    let response = platform.ingress().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let calls = platform.forwarded();
    assert_eq!(calls.len(), 1);
    let (headers, target) = &calls[0];
    assert_eq!(target.authority(), "svc1-d1:8080");
    assert_eq!(headers.get("paasauth-userid").unwrap(), "alice");
    assert_eq!(headers.get("paasauth-name").unwrap(), "Alice Example");
    assert_eq!(headers.get("paasauth-email").unwrap(), "alice@example.com");
    assert_eq!(headers.get_all("paasauth-userid").iter().count(), 1);
}

#[tokio::test]
async fn test_authenticated_request_without_deployment_is_unavailable() {
    let platform = Platform::new();
    let cookie = platform.session_cookie("alice");

    let response = platform
        .ingress()
        .oneshot(ingress_request("svc2.example.com", "/", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_public_service_skips_auth_and_strips_identity_headers() {
    let platform = Platform::new();
    platform.activate(PUBLIC_SVC, "d7").await;

    let mut request = ingress_request("blog.example.com:443", "/", None);
    request
        .headers_mut()
        .insert("paasauth-userid", "mallory".parse().unwrap());

    let response = platform.ingress().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let calls = platform.forwarded();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].0.get("paasauth-userid").is_none());
    assert_eq!(calls[0].1.hostname, "blog-d7");
}

const MESH_CALLER: &str = "
serviceId: svc-a
image: img:latest
networking:
  ingress:
    containerPort: 8080
  serviceProxy:
    egress: [svc-b]
";

const MESH_TARGET: &str = "
serviceId: svc-b
image: img:latest
networking:
  ingress:
    containerPort: 8080
  serviceProxy:
    ingress: [svc-a]
";

const MESH_TARGET_CLOSED: &str = "
serviceId: svc-b
image: img:latest
networking:
  ingress:
    containerPort: 8080
";

fn managed(container_id: &str, service_id: &str, deployment_id: &str, ip: &str) -> ManagedContainer {
    ManagedContainer {
        container_id: container_id.to_string(),
        service_id: Some(ServiceId::new(service_id)),
        deployment_id: Some(DeploymentId::new(deployment_id)),
        ip_addresses: vec![ip.parse::<IpAddr>().unwrap()],
        state: Some("running".to_string()),
    }
}

fn mesh_containers() -> Vec<ManagedContainer> {
    vec![
        managed("c-a", "svc-a", "da", "172.18.0.5"),
        managed("c-b", "svc-b", "db", "172.19.0.7"),
    ]
}

fn mesh_request(target_host: &str, peer: &str) -> Request<Body> {
    let mut request = Request::builder()
        .uri("/api/items")
        .header(header::HOST, target_host)
        .body(Body::empty())
        .unwrap();
    let peer: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    request
}

#[tokio::test]
async fn test_mesh_call_allowed_in_both_directions_is_forwarded() {
    let platform = Platform::new();
    platform.activate(MESH_CALLER, "da").await;
    platform.activate(MESH_TARGET, "db").await;

    let response = platform
        .mesh(mesh_containers())
        .oneshot(mesh_request("svc-b.mesh", "[::ffff:172.18.0.5]:40312"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let calls = platform.forwarded();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1.authority(), "svc-b-db:8080");
    assert!(calls[0].0.get("paasauth-userid").is_none());
}

#[tokio::test]
async fn test_mesh_call_without_target_ingress_is_forbidden() {
    let platform = Platform::new();
    platform.activate(MESH_CALLER, "da").await;
    platform.activate(MESH_TARGET_CLOSED, "db").await;

    let response = platform
        .mesh(mesh_containers())
        .oneshot(mesh_request("svc-b.mesh", "172.18.0.5:40312"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(platform.forwarded().is_empty());
}

#[tokio::test]
async fn test_mesh_call_against_caller_egress_is_forbidden() {
    let platform = Platform::new();
    platform.activate(MESH_CALLER, "da").await;
    platform.activate(MESH_TARGET, "db").await;

    // svc-b may receive from svc-a, but svc-b itself declares no egress.
    let response = platform
        .mesh(mesh_containers())
        .oneshot(mesh_request("svc-a.mesh", "172.19.0.7:5000"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_mesh_caller_not_owned_by_any_container_is_server_error() {
    let platform = Platform::new();
    platform.activate(MESH_TARGET, "db").await;

    let response = platform
        .mesh(mesh_containers())
        .oneshot(mesh_request("svc-b.mesh", "10.0.0.99:5000"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_mesh_target_without_deployment_is_unavailable() {
    let platform = Platform::new();
    platform.activate(MESH_CALLER, "da").await;

    let response = platform
        .mesh(mesh_containers())
        .oneshot(mesh_request("svc-b.mesh", "172.18.0.5:40312"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_mesh_caller_with_exited_container_is_server_error() {
    let platform = Platform::new();
    platform.activate(MESH_CALLER, "da").await;
    platform.activate(MESH_TARGET, "db").await;

    let mut exited = managed("c-a", "svc-a", "da", "172.18.0.5");
    exited.state = Some("exited".to_string());
    let containers = vec![exited, managed("c-b", "svc-b", "db", "172.19.0.7")];

    let response = platform
        .mesh(containers)
        .oneshot(mesh_request("svc-b.mesh", "172.18.0.5:40312"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(platform.forwarded().is_empty());
}
