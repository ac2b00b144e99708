//! Polling cycle: read every configured register, then hand the batch to a sink.

use anyhow::Result;
use chrono::Utc;
use std::{collections::BTreeMap, time::Duration};

use super::{
    error::AdapterError,
    poller::RegisterPoller,
    traits::{Measurement, MetricValue, MetricsSink},
};
use crate::{
    core::config::{PollTarget, PollingConfig},
    protocol::{channel::LineChannel, echonet::RegisterValue},
    utils::{Shutdown, Sleeper},
};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub targets: Vec<PollTarget>,
    pub register_interval: Duration,
    pub cycle_interval: Duration,
    pub energy_multiplier: i64,
    /// Attached to every measurement.
    pub tags: BTreeMap<String, String>,
}

impl OrchestratorSettings {
    /// Settings from the `[polling]` section, tagging points with `host`.
    pub fn from_config(polling: &PollingConfig, host: &str) -> Self {
        Self {
            targets: polling.targets.clone(),
            register_interval: Duration::from_secs(polling.register_interval_secs),
            cycle_interval: Duration::from_secs(polling.cycle_interval_secs),
            energy_multiplier: polling.energy_multiplier,
            tags: BTreeMap::from([("host".to_string(), host.to_string())]),
        }
    }
}

pub struct PollingOrchestrator<'a> {
    poller: RegisterPoller<'a>,
    settings: OrchestratorSettings,
    sleeper: &'a dyn Sleeper,
    shutdown: Shutdown,
}

impl<'a> PollingOrchestrator<'a> {
    pub fn new(
        poller: RegisterPoller<'a>,
        settings: OrchestratorSettings,
        sleeper: &'a dyn Sleeper,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            poller,
            settings,
            sleeper,
            shutdown,
        }
    }

    /// Poll every target once, pausing between registers.
    ///
    /// Returns `None` when shutdown was requested before the batch completed.
    pub fn collect_batch(&self, channel: &mut dyn LineChannel) -> Result<Option<Vec<Measurement>>> {
        let mut batch = Vec::with_capacity(self.settings.targets.len());

        for target in &self.settings.targets {
            if self.shutdown.is_triggered() {
                return Ok(None);
            }
            let value = match self.poller.poll(channel, target.register) {
                Ok(value) => value,
                Err(err) if is_interrupted(&err) => return Ok(None),
                Err(err) => return Err(err),
            };
            let metric = to_metric(value, self.settings.energy_multiplier);
            log::info!("{} ({}): {metric}", target.measurement, target.register);
            batch.push(Measurement::new(
                target.measurement.clone(),
                self.settings.tags.clone(),
                metric,
                Utc::now(),
            ));
            self.sleeper.sleep(self.settings.register_interval);
        }

        Ok(Some(batch))
    }

    /// One full cycle. Returns `false` once shutdown cut it short.
    pub fn run_cycle(&self, channel: &mut dyn LineChannel, sink: &mut dyn MetricsSink) -> Result<bool> {
        let Some(batch) = self.collect_batch(channel)? else {
            return Ok(false);
        };
        sink.write_points(&batch)?;
        log::info!("Wrote {} measurements", batch.len());
        Ok(true)
    }

    /// Cycle until shutdown. Sink and channel failures end the loop.
    pub fn run(&self, channel: &mut dyn LineChannel, sink: &mut dyn MetricsSink) -> Result<()> {
        log::info!(
            "Polling {} registers every {}s",
            self.settings.targets.len(),
            self.settings.cycle_interval.as_secs()
        );
        while self.run_cycle(channel, sink)? {
            if self.shutdown.is_triggered() {
                break;
            }
            self.sleeper.sleep(self.settings.cycle_interval);
        }
        log::info!("Polling stopped");
        Ok(())
    }
}

fn is_interrupted(err: &anyhow::Error) -> bool {
    err.downcast_ref::<AdapterError>() == Some(&AdapterError::Interrupted)
}

/// Convert a decoded register value to the number that gets stored.
///
/// Energy counts are scaled by `energy_multiplier`. Only the R phase of the
/// current reading is kept.
pub fn to_metric(value: RegisterValue, energy_multiplier: i64) -> MetricValue {
    match value {
        RegisterValue::Energy(count) => {
            MetricValue::Integer(i64::from(count).saturating_mul(energy_multiplier))
        }
        RegisterValue::Power(watts) => MetricValue::Integer(i64::from(watts)),
        RegisterValue::Current { r_phase, .. } => MetricValue::Float(r_phase),
    }
}
