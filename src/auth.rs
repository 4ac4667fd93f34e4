use std::fmt;
use std::path::PathBuf;

use crate::error::{ExporterError, Result};

/// Bearer token for the Kubernetes API.
///
/// The `Debug` output is redacted so tokens never end up in log records.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.trim().to_string())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// Where the bearer token comes from.
///
/// Projected service-account tokens are rotated by the kubelet, so a
/// file-backed token is re-read on every list call.
#[derive(Debug, Clone)]
pub enum TokenSource {
    None,
    Static(Token),
    File(PathBuf),
}

impl TokenSource {
    pub async fn resolve(&self) -> Result<Option<Token>> {
        match self {
            Self::None => Ok(None),
            Self::Static(token) => Ok(Some(token.clone())),
            Self::File(path) => {
                let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
                    ExporterError::Credentials(format!(
                        "Failed to read token file {}: {e}",
                        path.display()
                    ))
                })?;

                let token = Token::from(contents.as_str());
                if token.as_str().is_empty() {
                    return Err(ExporterError::Credentials(format!(
                        "Token file {} is empty",
                        path.display()
                    )));
                }

                Ok(Some(token))
            }
        }
    }
}
