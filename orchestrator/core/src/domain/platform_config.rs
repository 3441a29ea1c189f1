// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

// Platform Configuration
//
// Defines the configuration for a homelab-paas control plane:
// - Root domain and the control plane's own container identity
// - Listener addresses for ingress and mesh traffic
// - Storage backend and data directory
// - Task timing (queue idle delay, cleanup period, readiness polling)
// - Session authentication and deploy token
// - Logging and metrics settings
//
// Loaded once at startup (YAML file + environment overrides), validated, then
// shared read-only with every component that needs it.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::repository::StorageBackend;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Domain under which every service is exposed as `<serviceId>.<root_domain>`
    #[serde(default)]
    pub root_domain: String,

    /// Scheme callers use to reach the edge (used to rebuild login return URLs)
    #[serde(default = "default_public_scheme")]
    pub public_scheme: String,

    /// Name of the control plane's own container, attached to every service network
    #[serde(default = "default_container_name")]
    pub container_name: String,

    /// Value of the `managed-by` label on every network and container we own
    #[serde(default = "default_managed_by_label")]
    pub managed_by_label: String,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub tasks: TaskConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub docker: DockerConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_ingress_bind")]
    pub ingress_bind: SocketAddr,

    #[serde(default = "default_mesh_bind")]
    pub mesh_bind: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default = "default_queue_idle_delay_ms")]
    pub queue_idle_delay_ms: u64,

    #[serde(default = "default_cleanup_period_ms")]
    pub cleanup_period_ms: u64,

    #[serde(default = "default_readiness_max_attempts")]
    pub readiness_max_attempts: u32,

    #[serde(default = "default_readiness_delay_ms")]
    pub readiness_delay_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Upper bound for a forwarded request. `None` leaves requests unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// HS256 secret for session tokens (supports `PAAS_AUTH_JWT_SECRET`)
    #[serde(default)]
    pub jwt_secret: String,

    /// User ids allowed onto the platform at all
    #[serde(default)]
    pub authorized_users: Vec<String>,

    #[serde(default = "default_session_lifetime_secs")]
    pub session_lifetime_secs: u64,

    /// Login page; defaults to `<public_scheme>://<root_domain>/auth/login`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_url: Option<String>,

    /// Bearer token required by the deploy endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Prometheus exporter address; disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_bind: Option<SocketAddr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

fn default_public_scheme() -> String {
    "https".to_string()
}

fn default_container_name() -> String {
    "/homelab-paas-1".to_string()
}

fn default_managed_by_label() -> String {
    "homelab-paas".to_string()
}

fn default_ingress_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_mesh_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8081))
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Sled
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/etc/homelab-paas")
}

fn default_queue_idle_delay_ms() -> u64 {
    5_000
}

fn default_cleanup_period_ms() -> u64 {
    15_000
}

fn default_readiness_max_attempts() -> u32 {
    5
}

fn default_readiness_delay_ms() -> u64 {
    5_000
}

fn default_cookie_name() -> String {
    "homelab-paas-auth".to_string()
}

fn default_session_lifetime_secs() -> u64 {
    60 * 60 * 24 * 7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ingress_bind: default_ingress_bind(),
            mesh_bind: default_mesh_bind(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            queue_idle_delay_ms: default_queue_idle_delay_ms(),
            cleanup_period_ms: default_cleanup_period_ms(),
            readiness_max_attempts: default_readiness_max_attempts(),
            readiness_delay_ms: default_readiness_delay_ms(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            jwt_secret: String::new(),
            authorized_users: Vec::new(),
            session_lifetime_secs: default_session_lifetime_secs(),
            login_url: None,
            deploy_token: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_bind: None,
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            root_domain: String::new(),
            public_scheme: default_public_scheme(),
            container_name: default_container_name(),
            managed_by_label: default_managed_by_label(),
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
            tasks: TaskConfig::default(),
            proxy: ProxyConfig::default(),
            auth: AuthConfig::default(),
            docker: DockerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl PlatformConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. PAAS_CONFIG_PATH environment variable
    /// 2. ./paas-config.yaml (working directory)
    /// 3. /etc/homelab-paas/config.yaml
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("PAAS_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        [
            PathBuf::from("./paas-config.yaml"),
            PathBuf::from("/etc/homelab-paas/config.yaml"),
        ]
        .into_iter()
        .find(|candidate| candidate.exists())
    }

    /// Load configuration with discovery, fallback to defaults.
    /// Environment overrides are applied in every case.
    pub fn load(cli_path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = if let Some(path) = cli_path {
            tracing::info!(path = %path.display(), "Loading configuration from explicit path");
            Self::from_yaml_file(path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {}: {}", path.display(), e)
            })?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!(path = %path.display(), "Loading configuration from discovered path");
            Self::from_yaml_file(&path)?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("PAAS_ROOT_DOMAIN") {
            self.root_domain = val;
        }
        if let Some(val) = lookup("PAAS_CONTAINER_NAME") {
            self.container_name = val;
        }
        if let Some(val) = lookup("PAAS_AUTH_JWT_SECRET") {
            self.auth.jwt_secret = val;
        }
        if let Some(val) = lookup("PAAS_AUTH_AUTHORIZED_USERS") {
            self.auth.authorized_users = val
                .split(',')
                .map(str::trim)
                .filter(|user| !user.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(val) = lookup("PAAS_DEPLOY_TOKEN") {
            self.auth.deploy_token = Some(val);
        }
        if let Some(val) = lookup("PAAS_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(val);
        }
        self.root_domain = normalize_domain(&self.root_domain);
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.root_domain.trim().is_empty() {
            anyhow::bail!("root_domain cannot be empty (set it in the config file or PAAS_ROOT_DOMAIN)");
        }

        if self.root_domain.starts_with('.') || self.root_domain.ends_with('.') {
            anyhow::bail!("root_domain must not start or end with '.': '{}'", self.root_domain);
        }

        if self.auth.jwt_secret.is_empty() {
            anyhow::bail!("auth.jwt_secret cannot be empty (set it in the config file or PAAS_AUTH_JWT_SECRET)");
        }

        if self.public_scheme != "http" && self.public_scheme != "https" {
            anyhow::bail!("public_scheme must be 'http' or 'https', got '{}'", self.public_scheme);
        }

        if self.tasks.readiness_max_attempts == 0 {
            anyhow::bail!("tasks.readiness_max_attempts must be at least 1");
        }

        if self.network.ingress_bind == self.network.mesh_bind {
            anyhow::bail!(
                "network.ingress_bind and network.mesh_bind must differ (both {})",
                self.network.ingress_bind
            );
        }

        if let Some(login_url) = &self.auth.login_url {
            url::Url::parse(login_url)
                .map_err(|e| anyhow::anyhow!("auth.login_url is not a valid URL: {}", e))?;
        }

        Ok(())
    }

    pub fn queue_idle_delay(&self) -> Duration {
        Duration::from_millis(self.tasks.queue_idle_delay_ms)
    }

    pub fn cleanup_period(&self) -> Duration {
        Duration::from_millis(self.tasks.cleanup_period_ms)
    }

    pub fn readiness_delay(&self) -> Duration {
        Duration::from_millis(self.tasks.readiness_delay_ms)
    }

    pub fn proxy_timeout(&self) -> Option<Duration> {
        self.proxy.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn login_url(&self) -> String {
        self.auth
            .login_url
            .clone()
            .unwrap_or_else(|| format!("{}://{}/auth/login", self.public_scheme, self.root_domain))
    }

    /// Copy safe to print: secrets are replaced.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.auth.jwt_secret.is_empty() {
            copy.auth.jwt_secret = "<redacted>".to_string();
        }
        if copy.auth.deploy_token.is_some() {
            copy.auth.deploy_token = Some("<redacted>".to_string());
        }
        copy
    }
}

/// Hostnames are matched lowercased and without the trailing root dot.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}
