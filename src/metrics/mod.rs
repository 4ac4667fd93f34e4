mod collector;
mod gauges;

pub use collector::{CollectError, PipelineRunCollector};

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};

use crate::error::Result;

/// Renders metric families in the Prometheus text exposition format.
///
/// Returns the encoded body together with its content type.
pub fn encode_text(families: &[MetricFamily]) -> Result<(Vec<u8>, String)> {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    encoder.encode(families, &mut buffer)?;

    Ok((buffer, encoder.format_type().to_owned()))
}
