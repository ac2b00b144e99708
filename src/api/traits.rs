/// Metrics sink abstraction - where finished measurement batches go
///
/// The orchestrator only produces well-formed batches; how they are stored
/// (InfluxDB, a log, a test buffer) is up to the sink implementation.
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Numeric field value, kept integral where the meter reports integers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Integer(v) => write!(f, "{v}"),
            MetricValue::Float(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fields {
    pub value: MetricValue,
}

/// One timestamped point in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: Fields,
    pub time: DateTime<Utc>,
}

impl Measurement {
    pub fn new(
        measurement: impl Into<String>,
        tags: BTreeMap<String, String>,
        value: MetricValue,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            measurement: measurement.into(),
            tags,
            fields: Fields { value },
            time,
        }
    }
}

/// Destination for measurement batches.
pub trait MetricsSink {
    /// Write one batch. Errors are returned to the caller unchanged.
    fn write_points(&mut self, batch: &[Measurement]) -> Result<()>;
}

/// Sink that logs each batch as JSON
pub struct LoggingSink;

impl MetricsSink for LoggingSink {
    fn write_points(&mut self, batch: &[Measurement]) -> Result<()> {
        log::info!("Measurements: {}", serde_json::to_string(batch)?);
        Ok(())
    }
}

/// Sink that keeps every batch in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub batches: Vec<Vec<Measurement>>,
}

impl MetricsSink for CollectingSink {
    fn write_points(&mut self, batch: &[Measurement]) -> Result<()> {
        self.batches.push(batch.to_vec());
        Ok(())
    }
}
