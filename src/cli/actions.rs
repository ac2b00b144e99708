use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Duration;

use clap::ArgMatches;

use crate::{
    api::{
        traits::{LoggingSink, MetricsSink},
        AuthHandshake, JoinSequencer, OrchestratorSettings, PollingOrchestrator, RegisterPoller,
        ScanSettings,
    },
    core::{
        config::{AppConfig, Credentials},
        influx::InfluxSink,
        persistence::{self, Session},
    },
    protocol::{
        channel::{LineChannel, SerialLineChannel, SerialSettings},
        ports, skstack,
    },
    utils::{Shutdown, Sleeper, ThreadSleeper},
};

/// How the session cache is used for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Skip reading the cache, but still refresh it.
    pub force_rescan: bool,
    /// Neither read nor write the cache.
    pub no_cache: bool,
}

impl SessionOptions {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            force_rescan: matches.get_flag("force-rescan"),
            no_cache: matches.get_flag("no-config-cache"),
        }
    }
}

#[derive(Serialize)]
struct PortInfo<'a> {
    port_name: &'a str,
    description: String,
}

/// Handle the commands that exit right away. Returns `true` if one ran.
pub fn run_one_shot_actions(matches: &ArgMatches, config: &AppConfig) -> Result<bool> {
    if matches.get_flag("list-ports") {
        let ports = ports::available_ports_sorted();
        if matches.get_flag("json") {
            let out: Vec<PortInfo> = ports
                .iter()
                .map(|p| PortInfo {
                    port_name: &p.port_name,
                    description: ports::describe_port(p),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        } else {
            for p in &ports {
                println!("{}", ports::describe_port(p));
            }
        }
        return Ok(true);
    }

    if matches.get_flag("device-version") {
        let mut channel = SerialLineChannel::open(&serial_settings(config))?;
        let version = skstack::read_version(&mut channel);
        channel.close()?;
        match version? {
            Some(version) => println!("{version}"),
            None => anyhow::bail!("Adapter on {} did not report a version", config.serial.device),
        }
        return Ok(true);
    }

    Ok(false)
}

pub fn serial_settings(config: &AppConfig) -> SerialSettings {
    SerialSettings::new(&config.serial.device)
        .with_baud_rate(config.serial.baud_rate)
        .with_read_timeout(Duration::from_secs(config.serial.read_timeout_secs))
}

/// Open the adapter, connect to the meter and poll until shutdown.
///
/// The serial port is closed on every exit path, including failures in the
/// handshake or join phase.
pub fn run_meter(matches: &ArgMatches, config: &AppConfig, shutdown: Shutdown) -> Result<()> {
    let options = SessionOptions::from_matches(matches);

    let mut sink: Box<dyn MetricsSink> = if matches.get_flag("dry-run") {
        log::info!("Dry run: measurements are only logged");
        Box::new(LoggingSink)
    } else {
        let influx = &config.influx;
        Box::new(InfluxSink::connect(&influx.host, influx.port, &influx.database)?)
    };

    let mut channel = SerialLineChannel::open(&serial_settings(config))?;
    let sleeper = ThreadSleeper::new(shutdown.clone());
    run_on_channel(
        &mut channel,
        sink.as_mut(),
        config,
        options,
        &sleeper,
        shutdown,
    )
}

/// Run [`run_session`] and close `channel` whatever the outcome.
///
/// A session error takes precedence over a failure to close.
pub fn run_on_channel(
    channel: &mut dyn LineChannel,
    sink: &mut dyn MetricsSink,
    config: &AppConfig,
    options: SessionOptions,
    sleeper: &dyn Sleeper,
    shutdown: Shutdown,
) -> Result<()> {
    let result = run_session(channel, sink, config, options, sleeper, shutdown);
    let closed = channel.close();
    if let Err(err) = &closed {
        log::warn!("Failed to close adapter channel: {err:#}");
    }
    result.and(closed)
}

/// Establish a session on `channel`, join, and run the polling loop.
pub fn run_session(
    channel: &mut dyn LineChannel,
    sink: &mut dyn MetricsSink,
    config: &AppConfig,
    options: SessionOptions,
    sleeper: &dyn Sleeper,
    shutdown: Shutdown,
) -> Result<()> {
    let session = establish_session(channel, config, options)?;
    JoinSequencer::new(&session).connect(channel)?;

    let poller = RegisterPoller::new(session.link_local_addr.clone(), sleeper, shutdown.clone())
        .with_retry_interval(Duration::from_secs(config.polling.retry_interval_secs));
    let settings = OrchestratorSettings::from_config(&config.polling, &config.influx.host);
    PollingOrchestrator::new(poller, settings, sleeper, shutdown).run(channel, sink)
}

/// Use the cached session when it is fresh, otherwise authenticate and scan.
pub fn establish_session(
    channel: &mut dyn LineChannel,
    config: &AppConfig,
    options: SessionOptions,
) -> Result<Session> {
    let cache_path = &config.session.cache_path;

    if !options.no_cache && !options.force_rescan {
        if let Some(session) = persistence::load(cache_path, config.session.ttl())? {
            return Ok(session);
        }
    }

    let credentials = Credentials::from_file(&config.credentials.path)
        .context("B-route credentials are required to scan for the meter")?;
    let scan = ScanSettings {
        initial_duration: config.scan.initial_duration,
        max_duration: config.scan.max_duration,
    };
    let session = AuthHandshake::new(&credentials, scan).run(channel)?;

    if !options.no_cache {
        persistence::store(cache_path, &session)?;
    }
    Ok(session)
}
