use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

use crate::pipelinerun::PipelineRun;

/// Which of the two exported durations a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationKind {
    Scheduled,
    Completed,
}

impl fmt::Display for DurationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => f.write_str("scheduled"),
            Self::Completed => f.write_str("completed"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationError {
    #[error("PipelineRun has no {field}")]
    MissingTimestamp { field: &'static str },

    #[error("{later} ({later_at}) precedes {earlier} ({earlier_at})")]
    InvalidOrdering {
        earlier: &'static str,
        earlier_at: DateTime<Utc>,
        later: &'static str,
        later_at: DateTime<Utc>,
    },
}

/// Seconds between creation and the start of execution.
pub fn scheduled_duration(run: &PipelineRun) -> Result<f64, DurationError> {
    elapsed(
        ("creationTimestamp", run.created),
        ("startTime", run.started),
    )
}

/// Seconds between creation and completion.
///
/// Measured from creation rather than start, so the value includes the time
/// spent waiting to be scheduled.
pub fn completed_duration(run: &PipelineRun) -> Result<f64, DurationError> {
    elapsed(
        ("creationTimestamp", run.created),
        ("completionTime", run.completed),
    )
}

pub fn duration(kind: DurationKind, run: &PipelineRun) -> Result<f64, DurationError> {
    match kind {
        DurationKind::Scheduled => scheduled_duration(run),
        DurationKind::Completed => completed_duration(run),
    }
}

fn elapsed(
    (earlier, earlier_at): (&'static str, Option<DateTime<Utc>>),
    (later, later_at): (&'static str, Option<DateTime<Utc>>),
) -> Result<f64, DurationError> {
    let earlier_at = earlier_at.ok_or(DurationError::MissingTimestamp { field: earlier })?;
    let later_at = later_at.ok_or(DurationError::MissingTimestamp { field: later })?;

    // A negative delta is an upstream anomaly; report it instead of clamping.
    (later_at - earlier_at)
        .to_std()
        .map(|elapsed| elapsed.as_secs_f64())
        .map_err(|_| DurationError::InvalidOrdering {
            earlier,
            earlier_at,
            later,
            later_at,
        })
}
