// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

//! Control plane server implementation

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use paas_core::{
    application::{
        active_deployment::ActiveDeploymentResolver,
        lifecycle::Lifecycle,
        network_service::NetworkService,
        task_runner::{InMemoryTaskQueue, PeriodicTaskRunner, QueueTaskRunner, StartupTask, StartupTaskRunner},
        CleanupTask, DeployService, DeployTask, DeployTaskDescriptor, NetworkSyncTask, ReadinessPolicy,
        TokioSleeper,
    },
    domain::platform_config::PlatformConfig,
    infrastructure::{repositories::build_repositories, DockerRuntime, HttpRequestForwarder, JwtAuthService},
    presentation::{
        api::{self, ApiState},
        ingress::{self, IngressState},
        mesh::{self, MeshState},
    },
};

pub async fn start_daemon(config: PlatformConfig) -> Result<()> {
    config.validate().context("Configuration validation failed")?;
    info!(config = ?config.redacted(), "Configuration loaded");

    if let Some(addr) = config.observability.metrics_bind {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Metrics listening on {}", addr);
    }

    // Infrastructure
    let runtime = Arc::new(
        DockerRuntime::new(config.docker.socket_path.as_deref(), config.managed_by_label.clone())
            .context("Failed to connect to Docker")?,
    );
    runtime.healthcheck().await.context("Docker daemon is not reachable")?;

    let (service_repository, deployment_repository) =
        build_repositories(&config.storage.backend, &config.storage.data_dir)
            .context("Failed to open state store")?;

    let auth = Arc::new(
        JwtAuthService::new(
            &config.auth.jwt_secret,
            config.auth.authorized_users.clone(),
            &config.login_url(),
            Duration::from_secs(config.auth.session_lifetime_secs),
        )
        .context("Failed to initialize session verification")?,
    );
    let forwarder = Arc::new(HttpRequestForwarder::new(config.proxy_timeout()).context("Failed to build HTTP client")?);

    // Application services
    let resolver = ActiveDeploymentResolver::new(service_repository.clone(), deployment_repository.clone());
    let network_service = Arc::new(NetworkService::new(
        runtime.clone(),
        resolver.clone(),
        config.container_name.clone(),
    ));
    let queue = Arc::new(InMemoryTaskQueue::<DeployTaskDescriptor>::new());
    let deploy_service = Arc::new(DeployService::new(queue.clone()));
    let deploy_task = Arc::new(DeployTask::new(
        service_repository.clone(),
        deployment_repository.clone(),
        runtime.clone(),
        network_service.clone(),
        Arc::new(TokioSleeper),
        ReadinessPolicy {
            max_attempts: config.tasks.readiness_max_attempts,
            delay: config.readiness_delay(),
        },
    ));
    let cleanup_task = Arc::new(CleanupTask::new(
        service_repository.clone(),
        deployment_repository.clone(),
        runtime.clone(),
    ));

    // Startup tasks complete before any listener accepts traffic
    let startup_tasks: Vec<Arc<dyn StartupTask>> = vec![Arc::new(NetworkSyncTask::new(
        network_service.clone(),
        service_repository.clone(),
    ))];
    StartupTaskRunner::new(startup_tasks).run().await;

    let lifecycle = Lifecycle::new();
    let deploy_runner = Arc::new(QueueTaskRunner::<DeployTaskDescriptor>::new(
        queue,
        deploy_task,
        config.queue_idle_delay(),
        lifecycle.clone(),
    ))
    .start();
    let cleanup_runner =
        Arc::new(PeriodicTaskRunner::new(cleanup_task, config.cleanup_period(), lifecycle.clone())).start();

    // HTTP surfaces
    let platform_api = api::router(Arc::new(ApiState {
        deploy_service,
        service_repository: service_repository.clone(),
        deployment_repository: deployment_repository.clone(),
        deploy_token: config.auth.deploy_token.clone(),
    }));
    let ingress_app = ingress::router(
        Arc::new(IngressState {
            root_domain: config.root_domain.clone(),
            public_scheme: config.public_scheme.clone(),
            cookie_name: config.auth.cookie_name.clone(),
            resolver: resolver.clone(),
            auth,
            forwarder: forwarder.clone(),
        }),
        platform_api,
    )
    .layer(TraceLayer::new_for_http());
    let mesh_app = mesh::router(Arc::new(MeshState {
        resolver,
        runtime,
        forwarder,
    }))
    .layer(TraceLayer::new_for_http());

    let ingress_listener = TcpListener::bind(config.network.ingress_bind)
        .await
        .with_context(|| format!("Failed to bind ingress to {}", config.network.ingress_bind))?;
    let mesh_listener = TcpListener::bind(config.network.mesh_bind)
        .await
        .with_context(|| format!("Failed to bind mesh to {}", config.network.mesh_bind))?;

    info!("Ingress listening on {}", config.network.ingress_bind);
    info!("Mesh listening on {}", config.network.mesh_bind);

    let signal_lifecycle = lifecycle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_lifecycle.close();
    });

    let ingress_shutdown = lifecycle.clone();
    let mesh_shutdown = lifecycle.clone();
    let served = tokio::try_join!(
        async {
            axum::serve(ingress_listener, ingress_app)
                .with_graceful_shutdown(async move { ingress_shutdown.closed().await })
                .await
                .context("Ingress server failed")
        },
        async {
            axum::serve(
                mesh_listener,
                mesh_app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { mesh_shutdown.closed().await })
            .await
            .context("Mesh server failed")
        },
    );

    info!("Control plane shutting down");
    lifecycle.close();
    let (deploy_result, cleanup_result) = tokio::join!(deploy_runner, cleanup_runner);
    for result in [deploy_result, cleanup_result] {
        if let Err(e) = result {
            error!(error = %e, "Task runner panicked");
        }
    }

    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
