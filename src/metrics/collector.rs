use log::{debug, error};
use prometheus::core::Desc;
use prometheus::proto::MetricFamily;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use super::gauges::DurationGauges;
use crate::duration::{self, DurationError, DurationKind};
use crate::error::{ExporterError, Result};
use crate::pipelinerun::{PipelineRun, RunKey};
use crate::source::PipelineRunSource;

/// A failure logged during a collection pass. None of these reach the scraper.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("Error while fetching PipelineRuns: {0}")]
    SourceUnavailable(#[source] ExporterError),

    #[error("Error while calculating the {kind} duration of PipelineRun {name} ({uid}): {source}")]
    Duration {
        kind: DurationKind,
        name: String,
        uid: String,
        #[source]
        source: DurationError,
    },
}

/// Outcome of one pass: the exported families and every error that was logged.
pub(crate) struct CollectPass {
    pub families: Vec<MetricFamily>,
    pub errors: Vec<CollectError>,
}

#[derive(Default)]
struct PassState {
    /// Label tuples returned by the last successful list, tracked for pruning.
    known: HashSet<RunKey>,
}

/// Turns the current PipelineRuns into the two duration gauges on every scrape.
///
/// Passes are serialized: a scrape arriving while another pass runs waits for
/// it to finish, so two passes never interleave gauge updates.
pub struct PipelineRunCollector {
    source: Arc<dyn PipelineRunSource>,
    gauges: DurationGauges,
    prune_stale: bool,
    state: Mutex<PassState>,
}

impl PipelineRunCollector {
    /// Creates a collector reading from `source`.
    ///
    /// With `prune_stale` set, series of PipelineRuns that disappear from the
    /// source are dropped after the next successful list. Otherwise they keep
    /// their last value for the life of the process.
    pub fn new(source: Arc<dyn PipelineRunSource>, prune_stale: bool) -> Result<Self> {
        Ok(Self {
            source,
            gauges: DurationGauges::new()?,
            prune_stale,
            state: Mutex::new(PassState::default()),
        })
    }

    /// Descriptors of both exported gauges.
    pub fn describe(&self) -> Vec<&Desc> {
        self.gauges.desc()
    }

    /// Runs one collection pass and returns the families to export.
    ///
    /// Always yields a snapshot. When the source fails the previous values are
    /// exported unchanged.
    pub async fn collect(&self) -> Vec<MetricFamily> {
        self.collect_pass().await.families
    }

    pub(crate) async fn collect_pass(&self) -> CollectPass {
        let mut errors = Vec::new();

        let families = {
            let mut state = self.state.lock().await;

            match self.source.list().await {
                Ok(runs) => self.record(&runs, &mut state, &mut errors),
                Err(e) => errors.push(report(CollectError::SourceUnavailable(e))),
            }

            self.gauges.collect()
        };

        CollectPass { families, errors }
    }

    fn record(&self, runs: &[PipelineRun], state: &mut PassState, errors: &mut Vec<CollectError>) {
        debug!(count = runs.len(); "Collecting durations for PipelineRuns");

        for run in runs {
            for kind in [DurationKind::Scheduled, DurationKind::Completed] {
                match duration::duration(kind, run) {
                    Ok(seconds) => self.gauges.set(kind, &run.name, &run.uid, seconds),
                    Err(source) => errors.push(report(CollectError::Duration {
                        kind,
                        name: run.name.clone(),
                        uid: run.uid.clone(),
                        source,
                    })),
                }
            }
        }

        if self.prune_stale {
            let seen: HashSet<RunKey> = runs.iter().map(PipelineRun::key).collect();
            for stale in state.known.difference(&seen) {
                debug!(name = stale.name.as_str(), uid = stale.uid.as_str(); "Pruning stale PipelineRun series");
                self.gauges.remove(&stale.name, &stale.uid);
            }
            state.known = seen;
        }
    }
}

fn report(err: CollectError) -> CollectError {
    match &err {
        CollectError::SourceUnavailable(source) => {
            error!(error:% = source; "Error while fetching PipelineRuns");
        }
        CollectError::Duration {
            kind,
            name,
            uid,
            source,
        } => {
            error!(
                kind:% = kind,
                name = name.as_str(),
                uid = uid.as_str(),
                error:% = source;
                "Error while calculating the duration of a PipelineRun"
            );
        }
    }
    err
}
