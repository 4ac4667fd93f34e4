use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Deserializer};

/// A Tekton `PipelineRun` reduced to the fields the exporter reads.
///
/// Any lifecycle timestamp may be unset: a run that is still pending has no
/// start time, a running one has no completion time. A timestamp that does
/// not parse as RFC 3339 is treated as unset.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "PipelineRunObject")]
pub struct PipelineRun {
    /// `metadata.name`
    pub name: String,
    /// `metadata.uid`
    pub uid: String,
    /// `metadata.creationTimestamp`
    pub created: Option<DateTime<Utc>>,
    /// `status.startTime`
    pub started: Option<DateTime<Utc>>,
    /// `status.completionTime`
    pub completed: Option<DateTime<Utc>>,
}

/// Label tuple identifying one series in both duration gauges.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunKey {
    pub name: String,
    pub uid: String,
}

impl PipelineRun {
    pub fn key(&self) -> RunKey {
        RunKey {
            name: self.name.clone(),
            uid: self.uid.clone(),
        }
    }
}

// Wire shape of the Kubernetes object.

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineRunObject {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    status: Option<PipelineRunStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
    #[serde(default)]
    name: String,
    #[serde(default)]
    uid: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    creation_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineRunStatus {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    completion_time: Option<DateTime<Utc>>,
}

/// Reads an optional RFC 3339 timestamp, mapping anything unparseable to `None`.
///
/// One malformed object must only cost its own durations, never the page it
/// arrived in.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;

    Ok(match raw {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(text)) => match DateTime::parse_from_rfc3339(&text) {
            Ok(parsed) => Some(parsed.with_timezone(&Utc)),
            Err(e) => {
                warn!(value = text.as_str(), error:% = e; "Ignoring unparseable timestamp");
                None
            }
        },
        Some(other) => {
            warn!(value:% = other; "Ignoring non-string timestamp");
            None
        }
    })
}

impl From<PipelineRunObject> for PipelineRun {
    fn from(object: PipelineRunObject) -> Self {
        let status = object.status.unwrap_or_default();
        Self {
            name: object.metadata.name,
            uid: object.metadata.uid,
            created: object.metadata.creation_timestamp,
            started: status.start_time,
            completed: status.completion_time,
        }
    }
}
