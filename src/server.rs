//! HTTP scrape endpoint.
//!
//! Exposes:
//! - the metrics path (default `/metrics`) - one collection pass per request,
//!   rendered in the Prometheus text format
//! - `/health` - health check endpoint (returns 200 OK)

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use log::{error, info};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::error::{ExporterError, Result};
use crate::metrics::{encode_text, PipelineRunCollector};

/// Builds the router serving `metrics_path` and `/health`.
pub fn router(metrics_path: &str, collector: Arc<PipelineRunCollector>) -> Result<Router> {
    if !metrics_path.starts_with('/') || metrics_path == "/health" {
        return Err(ExporterError::Config(format!(
            "Metrics path must start with '/' and differ from /health, got '{metrics_path}'"
        )));
    }

    Ok(Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(collector))
}

/// Binds `addr` and serves until Ctrl-C.
pub async fn serve(addr: SocketAddr, app: Router) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Serving metrics on http://{}", listener.local_addr()?);

    run(listener, app, shutdown_signal()).await
}

async fn run(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error:% = e; "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn metrics_handler(State(collector): State<Arc<PipelineRunCollector>>) -> Response {
    let families = collector.collect().await;
    exposition_response(encode_text(&families))
}

fn exposition_response(encoded: Result<(Vec<u8>, String)>) -> Response {
    match encoded {
        Ok((body, content_type)) => ([(CONTENT_TYPE, content_type)], body).into_response(),
        Err(e) => {
            error!(error:% = e; "Error encoding metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn health_handler() -> &'static str {
    "ok\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::testing::parse_exposition;
    use crate::pipelinerun::PipelineRun;
    use crate::source::PipelineRunSource;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use prometheus::proto::MetricFamily;
    use tokio::sync::oneshot;

    struct OneRun;

    #[async_trait]
    impl PipelineRunSource for OneRun {
        async fn list(&self) -> Result<Vec<PipelineRun>> {
            let created = Utc.with_ymd_and_hms(2023, 5, 4, 10, 0, 0).unwrap();
            Ok(vec![PipelineRun {
                name: "a".to_string(),
                uid: "1".to_string(),
                created: Some(created),
                started: Some(created + Duration::seconds(5)),
                completed: Some(created + Duration::seconds(20)),
            }])
        }
    }

    async fn start(metrics_path: &str) -> (String, oneshot::Sender<()>) {
        let collector = Arc::new(PipelineRunCollector::new(Arc::new(OneRun), false).unwrap());
        let app = router(metrics_path, collector).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel();
        tokio::spawn(run(listener, app, async move {
            let _ = rx.await;
        }));

        (base, tx)
    }

    #[tokio::test]
    async fn test_scrape_returns_exposition() {
        let (base, shutdown) = start("/metrics").await;

        let response = reqwest::get(format!("{base}/metrics")).await.unwrap();
        assert_eq!(response.status(), 200);
        let content_type = response.headers()[CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/plain"));

        let body = response.text().await.unwrap();
        assert!(body.contains("# TYPE pipelinerun_duration_scheduled_seconds gauge"));
        assert!(body.contains("# TYPE pipelinerun_duration_completed_seconds gauge"));

        let samples = parse_exposition(&body);
        assert_eq!(
            samples.get(r#"pipelinerun_duration_scheduled_seconds{name="a",uid="1"}"#),
            Some(&5.0)
        );
        assert_eq!(
            samples.get(r#"pipelinerun_duration_completed_seconds{name="a",uid="1"}"#),
            Some(&20.0)
        );

        shutdown.send(()).unwrap();
    }

    #[tokio::test]
    async fn test_health_and_custom_metrics_path() {
        let (base, shutdown) = start("/custom").await;

        let health = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(health.status(), 200);
        assert_eq!(health.text().await.unwrap(), "ok\n");

        let custom = reqwest::get(format!("{base}/custom")).await.unwrap();
        assert_eq!(custom.status(), 200);

        let default = reqwest::get(format!("{base}/metrics")).await.unwrap();
        assert_eq!(default.status(), 404);

        shutdown.send(()).unwrap();
    }

    #[test]
    fn test_encode_failure_is_internal_server_error() {
        let encoded = encode_text(&[MetricFamily::default()]);
        assert!(encoded.is_err());

        let response = exposition_response(encoded);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_invalid_metrics_path() {
        for path in ["metrics", "/health"] {
            let collector =
                Arc::new(PipelineRunCollector::new(Arc::new(OneRun), false).unwrap());
            assert!(matches!(
                router(path, collector),
                Err(ExporterError::Config(_))
            ));
        }
    }
}
