//! InfluxDB (1.x HTTP API) metrics sink.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;

use crate::api::traits::{Measurement, MetricValue, MetricsSink};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Writes batches to an InfluxDB database using the line protocol.
pub struct InfluxSink {
    agent: ureq::Agent,
    base_url: String,
    database: String,
}

impl InfluxSink {
    /// Connect to `host:port` and create `database` when it does not exist yet.
    pub fn connect(host: &str, port: u16, database: &str) -> Result<Self> {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(HTTP_TIMEOUT))
            .build();
        let sink = Self {
            agent: ureq::Agent::new_with_config(config),
            base_url: format!("http://{host}:{port}"),
            database: database.to_string(),
        };
        sink.ensure_database()?;
        Ok(sink)
    }

    fn ensure_database(&self) -> Result<()> {
        let url = format!("{}/query", self.base_url);
        let listing: serde_json::Value = self
            .agent
            .get(&url)
            .query("q", "SHOW DATABASES")
            .call()
            .with_context(|| format!("Failed to list databases at {}", self.base_url))?
            .body_mut()
            .read_json()
            .context("Unexpected SHOW DATABASES response")?;

        if database_listed(&listing, &self.database) {
            log::debug!("InfluxDB database {} exists", self.database);
            return Ok(());
        }

        log::info!("Creating InfluxDB database {}", self.database);
        self.agent
            .post(&url)
            .query("q", format!("CREATE DATABASE \"{}\"", self.database))
            .send_empty()
            .with_context(|| format!("Failed to create database {}", self.database))?;
        Ok(())
    }
}

impl MetricsSink for InfluxSink {
    fn write_points(&mut self, batch: &[Measurement]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let body = to_line_protocol(batch);
        self.agent
            .post(&format!("{}/write", self.base_url))
            .query("db", &self.database)
            .query("precision", "ns")
            .content_type("text/plain; charset=utf-8")
            .send(body.as_str())
            .map_err(|err| anyhow!("Failed to write {} points to InfluxDB: {err}", batch.len()))?;
        log::debug!("Wrote {} points to {}", batch.len(), self.database);
        Ok(())
    }
}

/// Whether a `SHOW DATABASES` result lists `database`.
pub fn database_listed(listing: &serde_json::Value, database: &str) -> bool {
    listing["results"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|result| result["series"].as_array())
        .flatten()
        .filter_map(|series| series["values"].as_array())
        .flatten()
        .any(|row| row[0].as_str() == Some(database))
}

/// Render a batch in InfluxDB line protocol, one point per line.
pub fn to_line_protocol(batch: &[Measurement]) -> String {
    batch
        .iter()
        .map(|point| {
            let mut line = escape(&point.measurement, &[',', ' ']);
            for (key, value) in &point.tags {
                line.push(',');
                line.push_str(&escape(key, &[',', '=', ' ']));
                line.push('=');
                line.push_str(&escape(value, &[',', '=', ' ']));
            }
            let value = match point.fields.value {
                MetricValue::Integer(v) => format!("{v}i"),
                MetricValue::Float(v) => format!("{v}"),
            };
            let nanos = point.time.timestamp_nanos_opt().unwrap_or_default();
            format!("{line} value={value} {nanos}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape(text: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
