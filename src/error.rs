use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("Kubernetes API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unable to read credentials: {0}")]
    Credentials(String),

    #[error("Kubernetes API pagination did not terminate: {0}")]
    Pagination(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExporterError>;
