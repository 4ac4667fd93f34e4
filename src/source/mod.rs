mod client;

use async_trait::async_trait;

use crate::error::Result;
use crate::pipelinerun::PipelineRun;

pub use client::{KubernetesSource, SourceSettings};

/// Supplies the current snapshot of pipeline-runs for one collection pass.
#[async_trait]
pub trait PipelineRunSource: Send + Sync {
    /// Lists every pipeline-run visible to this source.
    ///
    /// Failures are returned as-is; the caller decides what to do with them.
    async fn list(&self) -> Result<Vec<PipelineRun>>;
}
