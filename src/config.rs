use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::{Token, TokenSource};
use crate::source::SourceSettings;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Configuration file structure for the exporter.
///
/// Loaded from the path given on the command line or from the current
/// directory. Command-line flags override values read here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Scrape endpoint settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Kubernetes API access
    #[serde(default)]
    pub kubernetes: KubernetesConfig,

    /// Collection behaviour
    #[serde(default)]
    pub collector: CollectorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Address the scrape endpoint binds to
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,

    /// HTTP path serving the exposition
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KubernetesConfig {
    /// API server base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Namespace to list PipelineRuns from; all namespaces when unset
    pub namespace: Option<String>,

    /// `group/version` of the PipelineRun resource
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Bearer token; takes precedence over `token-file`
    pub token: Option<String>,

    /// File holding the bearer token, re-read on every list
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,

    /// PEM bundle used to verify the API server certificate
    #[serde(default = "default_ca_file")]
    pub ca_file: PathBuf,

    /// Skip API server certificate verification
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,

    /// Items requested per list page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Deadline for each list request; no deadline when unset
    #[serde(default)]
    pub request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CollectorConfig {
    /// Drop series of PipelineRuns no longer returned by the API
    #[serde(default)]
    pub prune_stale: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            metrics_path: default_metrics_path(),
        }
    }
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            namespace: None,
            api_version: default_api_version(),
            token: None,
            token_file: default_token_file(),
            ca_file: default_ca_file(),
            insecure_skip_tls_verify: false,
            page_size: default_page_size(),
            request_timeout_seconds: None,
        }
    }
}

fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9117))
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

/// In-cluster API server address, derived from the service environment when present.
fn default_api_url() -> String {
    match (
        std::env::var("KUBERNETES_SERVICE_HOST"),
        std::env::var("KUBERNETES_SERVICE_PORT"),
    ) {
        (Ok(host), Ok(port)) if host.contains(':') => format!("https://[{host}]:{port}"),
        (Ok(host), Ok(port)) => format!("https://{host}:{port}"),
        _ => "https://kubernetes.default.svc".to_string(),
    }
}

fn default_api_version() -> String {
    "tekton.dev/v1".to_string()
}

fn default_token_file() -> PathBuf {
    Path::new(SERVICE_ACCOUNT_DIR).join("token")
}

fn default_ca_file() -> PathBuf {
    Path::new(SERVICE_ACCOUNT_DIR).join("ca.crt")
}

fn default_page_size() -> usize {
    500
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./pipelinerun-exporter.toml
    /// 3. ./pipelinerun-exporter.json
    /// 4. ./pipelinerun-exporter.yaml
    /// 5. ./pipelinerun-exporter.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "pipelinerun-exporter.toml",
            "pipelinerun-exporter.json",
            "pipelinerun-exporter.yaml",
            "pipelinerun-exporter.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Settings for the Kubernetes source.
    ///
    /// The service-account token and CA files are only used when they exist,
    /// so the defaults also work outside a cluster.
    pub fn source_settings(&self) -> SourceSettings {
        let k8s = &self.kubernetes;

        let token = match &k8s.token {
            Some(token) => TokenSource::Static(Token::from(token.as_str())),
            None if k8s.token_file.exists() => TokenSource::File(k8s.token_file.clone()),
            None => {
                debug!(
                    "No token configured and {} not found, sending unauthenticated requests",
                    k8s.token_file.display()
                );
                TokenSource::None
            }
        };

        let ca_file = if k8s.ca_file.exists() {
            Some(k8s.ca_file.clone())
        } else {
            debug!("CA file {} not found, using system roots", k8s.ca_file.display());
            None
        };

        SourceSettings {
            api_url: k8s.api_url.clone(),
            api_version: k8s.api_version.clone(),
            namespace: k8s.namespace.clone(),
            token,
            ca_file,
            insecure_skip_tls_verify: k8s.insecure_skip_tls_verify,
            page_size: k8s.page_size,
            request_timeout: k8s.request_timeout_seconds.map(Duration::from_secs),
        }
    }
}
