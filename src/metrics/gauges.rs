use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts, Registry};

use crate::duration::DurationKind;
use crate::error::Result;

pub const SCHEDULED_METRIC: &str = "pipelinerun_duration_scheduled_seconds";
pub const COMPLETED_METRIC: &str = "pipelinerun_duration_completed_seconds";

const LABELS: [&str; 2] = ["name", "uid"];

/// The two duration gauges, keyed by PipelineRun `name` and `uid`.
///
/// Both gauges are registered in a registry owned by this value rather than
/// in the process-global default registry.
pub struct DurationGauges {
    registry: Registry,
    scheduled: GaugeVec,
    completed: GaugeVec,
}

impl DurationGauges {
    pub fn new() -> Result<Self> {
        let scheduled = GaugeVec::new(
            Opts::new(
                SCHEDULED_METRIC,
                "Duration in seconds for a PipelineRun to be scheduled.",
            ),
            &LABELS,
        )?;

        let completed = GaugeVec::new(
            Opts::new(
                COMPLETED_METRIC,
                "Duration in seconds for a PipelineRun to complete.",
            ),
            &LABELS,
        )?;

        let registry = Registry::new();
        registry.register(Box::new(scheduled.clone()))?;
        registry.register(Box::new(completed.clone()))?;

        Ok(Self {
            registry,
            scheduled,
            completed,
        })
    }

    fn gauge(&self, kind: DurationKind) -> &GaugeVec {
        match kind {
            DurationKind::Scheduled => &self.scheduled,
            DurationKind::Completed => &self.completed,
        }
    }

    /// Upserts one value; the last write for a label tuple wins.
    pub fn set(&self, kind: DurationKind, name: &str, uid: &str, seconds: f64) {
        self.gauge(kind).with_label_values(&[name, uid]).set(seconds);
    }

    /// Drops a label tuple from both gauges. Tuples a gauge never held are ignored.
    pub fn remove(&self, name: &str, uid: &str) {
        for gauge in [&self.scheduled, &self.completed] {
            // Err only means the series was never set on this gauge.
            let _ = gauge.remove_label_values(&[name, uid]);
        }
    }

    pub fn desc(&self) -> Vec<&Desc> {
        self.scheduled
            .desc()
            .into_iter()
            .chain(self.completed.desc())
            .collect()
    }

    /// Current families of both gauges. A gauge holding no series is left out.
    pub fn collect(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}
