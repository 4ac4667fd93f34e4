use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Certificate, Client};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use super::PipelineRunSource;
use crate::auth::{Token, TokenSource};
use crate::error::{ExporterError, Result};
use crate::pipelinerun::PipelineRun;

/// Connection settings for [`KubernetesSource`].
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// API server base URL (e.g., <https://kubernetes.default.svc>)
    pub api_url: String,
    /// `group/version` serving the `pipelineruns` resource
    pub api_version: String,
    /// Restrict listing to one namespace; `None` lists cluster-wide
    pub namespace: Option<String>,
    pub token: TokenSource,
    /// PEM bundle trusted in addition to the system roots
    pub ca_file: Option<PathBuf>,
    pub insecure_skip_tls_verify: bool,
    /// Items requested per page (`limit` query parameter)
    pub page_size: usize,
    /// Per-request deadline; `None` waits for the API server indefinitely
    pub request_timeout: Option<Duration>,
}

/// Lists Tekton `PipelineRun` objects straight from the Kubernetes API.
pub struct KubernetesSource {
    client: Client,
    list_url: Url,
    token: TokenSource,
    page_size: usize,
}

impl KubernetesSource {
    /// Builds the HTTP client and resolves the list endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the API URL or `api_version` is malformed, or if
    /// the CA bundle cannot be read.
    pub fn new(settings: SourceSettings) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(concat!("pipelinerun-exporter/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(settings.insecure_skip_tls_verify);

        if let Some(ca_file) = &settings.ca_file {
            let pem = std::fs::read(ca_file).map_err(|e| {
                ExporterError::Config(format!(
                    "Failed to read CA file {}: {e}",
                    ca_file.display()
                ))
            })?;
            let certificate = Certificate::from_pem(&pem)
                .map_err(|e| ExporterError::Config(format!("Invalid CA certificate: {e}")))?;
            builder = builder.add_root_certificate(certificate);
        }

        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| ExporterError::Config(format!("Failed to create HTTP client: {e}")))?;

        let list_url = list_url(
            &settings.api_url,
            &settings.api_version,
            settings.namespace.as_deref(),
        )?;

        Ok(Self {
            client,
            list_url,
            token: settings.token,
            page_size: settings.page_size.max(1),
        })
    }

    pub fn list_url(&self) -> &Url {
        &self.list_url
    }

    async fn fetch_page(
        &self,
        bearer: Option<&Token>,
        continue_token: Option<&str>,
    ) -> Result<PipelineRunList> {
        let mut url = self.list_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &self.page_size.to_string());
            if let Some(token) = continue_token {
                query.append_pair("continue", token);
            }
        }

        let mut request = self.client.get(url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token.as_str());
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(ExporterError::Api {
                status: status.as_u16(),
                message: status_message(&body),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl PipelineRunSource for KubernetesSource {
    async fn list(&self) -> Result<Vec<PipelineRun>> {
        let bearer = self.token.resolve().await?;
        let mut runs = Vec::new();
        let mut seen_tokens = HashSet::new();
        let mut continue_token: Option<String> = None;

        loop {
            let page = self
                .fetch_page(bearer.as_ref(), continue_token.as_deref())
                .await?;
            runs.extend(page.items.into_iter().filter_map(decode_item));

            match page.metadata.continue_ {
                Some(token) if !token.is_empty() => {
                    if !seen_tokens.insert(token.clone()) {
                        return Err(ExporterError::Pagination(format!(
                            "continue token '{token}' was returned twice"
                        )));
                    }
                    continue_token = Some(token);
                }
                _ => break,
            }
        }

        debug!("Listed {} PipelineRuns from {}", runs.len(), self.list_url);

        Ok(runs)
    }
}

fn list_url(api_url: &str, api_version: &str, namespace: Option<&str>) -> Result<Url> {
    let (group, version) = api_version
        .split_once('/')
        .filter(|(group, version)| {
            !group.is_empty() && !version.is_empty() && !version.contains('/')
        })
        .ok_or_else(|| {
            ExporterError::Config(format!(
                "API version must be in format 'group/version', got '{api_version}'"
            ))
        })?;

    let mut url = Url::parse(api_url)
        .map_err(|e| ExporterError::Config(format!("Invalid API URL: {e}")))?;

    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| ExporterError::Config(format!("API URL cannot be a base: {api_url}")))?;
        segments.pop_if_empty().extend(["apis", group, version]);
        if let Some(namespace) = namespace {
            segments.extend(["namespaces", namespace]);
        }
        segments.push("pipelineruns");
    }

    Ok(url)
}

/// Decodes one list item, skipping objects that are not PipelineRuns.
fn decode_item(item: serde_json::Value) -> Option<PipelineRun> {
    match serde_json::from_value(item) {
        Ok(run) => Some(run),
        Err(e) => {
            warn!(error:% = e; "Skipping undecodable PipelineRun");
            None
        }
    }
}

/// Extracts `message` from a Kubernetes `Status` body, falling back to the raw text.
fn status_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Status {
        message: String,
    }

    serde_json::from_str::<Status>(body)
        .map(|status| status.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Response body of a `list` call.
#[derive(Deserialize)]
struct PipelineRunList {
    #[serde(default)]
    metadata: ListMeta,
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

#[derive(Deserialize, Default)]
struct ListMeta {
    #[serde(rename = "continue", default)]
    continue_: Option<String>,
}
