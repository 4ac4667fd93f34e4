use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::metrics::{encode_text, CollectError, PipelineRunCollector};
use crate::server;
use crate::source::KubernetesSource;

#[derive(Parser)]
#[command(name = "pipelinerun-exporter")]
#[command(author, version, about = "Tekton PipelineRun duration exporter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Only export PipelineRuns from this namespace
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// Kubernetes API server URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Bearer token for the Kubernetes API
    #[arg(long, global = true, env = "KUBERNETES_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the scrape endpoint until interrupted
    Serve {
        #[arg(short, long)]
        listen_address: Option<SocketAddr>,

        #[arg(long)]
        metrics_path: Option<String>,

        /// Drop series of PipelineRuns that no longer exist
        #[arg(long, default_value_t = false)]
        prune_stale: bool,
    },
    /// Run a single collection pass and print the exposition
    Collect {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    /// Loads the config file and lays command-line flags over it.
    fn config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(namespace) = &self.namespace {
            config.kubernetes.namespace = Some(namespace.clone());
        }
        if let Some(api_url) = &self.api_url {
            config.kubernetes.api_url = api_url.clone();
        }
        if let Some(token) = &self.token {
            config.kubernetes.token = Some(token.clone());
        }

        if let Commands::Serve {
            listen_address,
            metrics_path,
            prune_stale,
        } = &self.command
        {
            if let Some(listen_address) = listen_address {
                config.server.listen_address = *listen_address;
            }
            if let Some(metrics_path) = metrics_path {
                config.server.metrics_path = metrics_path.clone();
            }
            config.collector.prune_stale |= *prune_stale;
        }

        Ok(config)
    }

    fn collector(config: &Config) -> Result<Arc<PipelineRunCollector>> {
        let source = KubernetesSource::new(config.source_settings())
            .context("Failed to configure Kubernetes source")?;
        info!("Listing PipelineRuns from {}", source.list_url());

        let collector = PipelineRunCollector::new(Arc::new(source), config.collector.prune_stale)
            .context("Failed to register metrics")?;

        Ok(Arc::new(collector))
    }

    async fn execute_serve(config: &Config) -> Result<()> {
        let collector = Self::collector(config)?;

        for desc in collector.describe() {
            info!(
                metric = desc.fq_name.as_str(),
                labels:? = desc.variable_labels;
                "Advertising metric"
            );
        }

        let app = server::router(&config.server.metrics_path, collector)?;
        server::serve(config.server.listen_address, app).await?;

        Ok(())
    }

    async fn execute_collect(config: &Config, output: Option<&Path>) -> Result<()> {
        let collector = Self::collector(config)?;
        let pass = collector.collect_pass().await;

        if let Some(CollectError::SourceUnavailable(e)) = pass
            .errors
            .into_iter()
            .find(|e| matches!(e, CollectError::SourceUnavailable(_)))
        {
            return Err(e).context("Failed to list PipelineRuns");
        }

        let (body, _) = encode_text(&pass.families)?;

        if let Some(output_path) = output {
            std::fs::write(output_path, body)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            info!("Metrics written to: {}", output_path.display());
        } else {
            print!("{}", String::from_utf8_lossy(&body));
        }

        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        let config = self.config()?;

        match &self.command {
            Commands::Serve { .. } => Self::execute_serve(&config).await,
            Commands::Collect { output } => Self::execute_collect(&config, output.as_deref()).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_serve_flags_override_config_file() {
        let mut config_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(
            config_file,
            r#"
[server]
listen-address = "127.0.0.1:9200"

[kubernetes]
namespace = "from-file"
api-url = "https://file.example.com"
"#
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "pipelinerun-exporter",
            "--config",
            config_file.path().to_str().unwrap(),
            "serve",
            "--listen-address",
            "0.0.0.0:9300",
            "--namespace",
            "from-flag",
            "--prune-stale",
        ])
        .unwrap();

        let config = cli.config().unwrap();
        assert_eq!(config.server.listen_address.port(), 9300);
        assert_eq!(config.kubernetes.namespace, Some("from-flag".to_string()));
        assert_eq!(config.kubernetes.api_url, "https://file.example.com");
        assert!(config.collector.prune_stale);
    }

    #[test]
    fn test_prune_stale_from_file_is_kept_without_flag() {
        let mut config_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(config_file, "[collector]\nprune-stale = true").unwrap();

        let cli = Cli::try_parse_from([
            "pipelinerun-exporter",
            "serve",
            "-c",
            config_file.path().to_str().unwrap(),
        ])
        .unwrap();

        assert!(cli.config().unwrap().collector.prune_stale);
    }

    #[test]
    fn test_collect_command() {
        let cli = Cli::try_parse_from([
            "pipelinerun-exporter",
            "collect",
            "--output",
            "metrics.prom",
            "--api-url",
            "http://127.0.0.1:8001",
        ])
        .unwrap();

        assert!(matches!(&cli.command, Commands::Collect { output: Some(p) } if p.ends_with("metrics.prom")));
        assert_eq!(cli.api_url.as_deref(), Some("http://127.0.0.1:8001"));
    }

    #[test]
    fn test_invalid_listen_address() {
        assert!(Cli::try_parse_from([
            "pipelinerun-exporter",
            "serve",
            "--listen-address",
            "nowhere"
        ])
        .is_err());
    }

    #[tokio::test]
    async fn test_collect_writes_exposition() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock(
                "GET",
                mockito::Matcher::Regex(r"^/apis/tekton\.dev/v1/namespaces/ci/pipelineruns".to_string()),
            )
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"metadata":{},"items":[{
                    "metadata":{"name":"a","uid":"1","creationTimestamp":"2023-05-04T10:00:00Z"},
                    "status":{"startTime":"2023-05-04T10:00:05Z","completionTime":"2023-05-04T10:00:20Z"}
                }]}"#,
            )
            .create_async()
            .await;

        let output = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.kubernetes.api_url = server.url();
        config.kubernetes.namespace = Some("ci".to_string());
        config.kubernetes.token = Some("t".to_string());

        Cli::execute_collect(&config, Some(output.path()))
            .await
            .unwrap();

        let written = std::fs::read_to_string(output.path()).unwrap();
        let samples = crate::metrics::testing::parse_exposition(&written);
        assert_eq!(
            samples.get(r#"pipelinerun_duration_scheduled_seconds{name="a",uid="1"}"#),
            Some(&5.0)
        );
        assert_eq!(
            samples.get(r#"pipelinerun_duration_completed_seconds{name="a",uid="1"}"#),
            Some(&20.0)
        );
    }

    #[tokio::test]
    async fn test_collect_fails_when_source_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(401)
            .with_body(r#"{"kind":"Status","message":"Unauthorized","code":401}"#)
            .create_async()
            .await;

        let mut config = Config::default();
        config.kubernetes.api_url = server.url();
        config.kubernetes.token = Some("expired".to_string());

        let err = Cli::execute_collect(&config, None).await.unwrap_err();
        assert!(format!("{err:#}").contains("Unauthorized"));
    }
}
