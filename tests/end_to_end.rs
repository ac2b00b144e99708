use anyhow::Result;
use std::time::Duration;

use wisun_meter::{
    api::{AdapterError, CollectingSink, MetricValue},
    cli::actions::{run_on_channel, run_session, SessionOptions},
    core::{
        config::AppConfig,
        persistence::{self, Session},
    },
    protocol::ScriptedChannel,
    utils::{RecordingSleeper, Shutdown, Sleeper},
};

const MAC: &str = "001D129000038474";
const METER: &str = "FE80:0000:0000:0000:021D:1290:0003:8474";

/// Records sleeps and requests shutdown once the first cycle is over.
struct StopAfterFirstCycle {
    inner: RecordingSleeper,
    cycle_interval: Duration,
    shutdown: Shutdown,
}

impl Sleeper for StopAfterFirstCycle {
    fn sleep(&self, duration: Duration) {
        self.inner.sleep(duration);
        if duration == self.cycle_interval {
            self.shutdown.trigger();
        }
    }
}

fn push_all<I, S>(channel: &mut ScriptedChannel, lines: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    for line in lines {
        channel.push_line(line);
    }
}

fn push_reading(channel: &mut ScriptedChannel, epc: &str, edt: &str) {
    push_all(
        channel,
        [
            format!("SKSENDTO 1 {METER} 0E1A 1 000E "),
            format!("EVENT 21 {METER} 00"),
            "OK".to_string(),
            format!(
                "ERXUDP {METER} FE80:0000:0000:0000:021D:1290:1234:5678 0E1A 0E1A {MAC} 1 0012 1081000102880105FF017201{epc}04{edt}"
            ),
        ],
    );
}

fn adapter_script() -> ScriptedChannel {
    let mut channel = ScriptedChannel::default();
    push_all(
        &mut channel,
        [
            "SKSETPWD C 0123456789AB".to_string(),
            "OK".to_string(),
            "SKSETRBID 00112233445566778899AABBCCDDEEFF".to_string(),
            "OK".to_string(),
            "SKSCAN 2 FFFFFFFF 4".to_string(),
            "OK".to_string(),
            format!("EVENT 20 {METER}"),
            "EPANDESC".to_string(),
            "  Channel:3B".to_string(),
            "  Channel Page:09".to_string(),
            "  Pan ID:1234".to_string(),
            format!("  Addr:{MAC}"),
            "  LQI:E1".to_string(),
            format!("EVENT 22 {METER}"),
            format!("SKLL64 {MAC}"),
            METER.to_string(),
            "SKSREG S2 3B".to_string(),
            "OK".to_string(),
            "SKSREG S3 1234".to_string(),
            "OK".to_string(),
            format!("SKJOIN {METER}"),
            "OK".to_string(),
            format!("EVENT 21 {METER} 02"),
            format!("EVENT 25 {METER}"),
            format!("ERXUDP {METER} FF02:0000:0000:0000:0000:0000:0000:0001 0E1A 0E1A {MAC} 1 0012 108100000EF0010EF0017301D50401028801"),
        ],
    );
    push_reading(&mut channel, "E0", "12345600");
    push_reading(&mut channel, "E7", "00000064");
    push_reading(&mut channel, "E8", "012C00C8");
    channel
}

/// Credentials, then a scan that finds the meter, up to the `SKJOIN` result.
fn script_until_join() -> ScriptedChannel {
    let mut channel = ScriptedChannel::default();
    push_all(
        &mut channel,
        [
            "SKSETPWD C 0123456789AB".to_string(),
            "OK".to_string(),
            "SKSETRBID 00112233445566778899AABBCCDDEEFF".to_string(),
            "OK".to_string(),
            "SKSCAN 2 FFFFFFFF 4".to_string(),
            "OK".to_string(),
            "EPANDESC".to_string(),
            "  Channel:3B".to_string(),
            "  Pan ID:1234".to_string(),
            format!("  Addr:{MAC}"),
            format!("EVENT 22 {METER}"),
            format!("SKLL64 {MAC}"),
            METER.to_string(),
            "SKSREG S2 3B".to_string(),
            "OK".to_string(),
            "SKSREG S3 1234".to_string(),
            "OK".to_string(),
            format!("SKJOIN {METER}"),
            "OK".to_string(),
        ],
    );
    channel
}

fn config_in(dir: &std::path::Path) -> Result<AppConfig> {
    let credentials = dir.join("b_route.toml");
    std::fs::write(
        &credentials,
        "password = \"0123456789AB\"\nb_route_id = \"00112233445566778899AABBCCDDEEFF\"\n",
    )?;

    let mut config = AppConfig::default();
    config.session.cache_path = dir.join("cache").join("wi_sun_config.toml").display().to_string();
    config.credentials.path = credentials.display().to_string();
    Ok(config)
}

#[test]
fn test_scan_join_and_one_polling_cycle() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config_in(dir.path())?;

    let shutdown = Shutdown::new();
    let sleeper = StopAfterFirstCycle {
        inner: RecordingSleeper::new(),
        cycle_interval: Duration::from_secs(config.polling.cycle_interval_secs),
        shutdown: shutdown.clone(),
    };
    let mut channel = adapter_script();
    let mut sink = CollectingSink::default();

    run_session(
        &mut channel,
        &mut sink,
        &config,
        SessionOptions::default(),
        &sleeper,
        shutdown,
    )?;

    assert_eq!(sink.batches.len(), 1);
    let batch = &sink.batches[0];
    let summary: Vec<(&str, MetricValue)> = batch
        .iter()
        .map(|point| (point.measurement.as_str(), point.fields.value))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("integ_energy", MetricValue::Integer(0x1234_5600 * 1000)),
            ("inst_energy", MetricValue::Integer(100)),
            ("inst_current", MetricValue::Float(30.0)),
        ]
    );
    assert!(batch
        .iter()
        .all(|point| point.tags.get("host").map(String::as_str) == Some("localhost")));

    assert_eq!(
        sleeper.inner.recorded(),
        vec![
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(30),
        ]
    );
    assert_eq!(channel.remaining(), 0);
    assert_eq!(channel.close_count(), 0);

    let cached = persistence::load(&config.session.cache_path, config.session.ttl())?;
    assert_eq!(cached, Some(Session::new("3B", "1234", METER)));
    Ok(())
}

#[test]
fn test_no_cache_option_leaves_no_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config_in(dir.path())?;

    let shutdown = Shutdown::new();
    let sleeper = StopAfterFirstCycle {
        inner: RecordingSleeper::new(),
        cycle_interval: Duration::from_secs(config.polling.cycle_interval_secs),
        shutdown: shutdown.clone(),
    };
    let mut channel = adapter_script();
    let mut sink = CollectingSink::default();
    let options = SessionOptions {
        force_rescan: false,
        no_cache: true,
    };

    run_session(&mut channel, &mut sink, &config, options, &sleeper, shutdown)?;

    assert_eq!(sink.batches.len(), 1);
    assert!(!std::path::Path::new(&config.session.cache_path).exists());
    Ok(())
}

#[test]
fn test_completed_run_closes_channel() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config_in(dir.path())?;

    let shutdown = Shutdown::new();
    let sleeper = StopAfterFirstCycle {
        inner: RecordingSleeper::new(),
        cycle_interval: Duration::from_secs(config.polling.cycle_interval_secs),
        shutdown: shutdown.clone(),
    };
    let mut channel = adapter_script();
    let mut sink = CollectingSink::default();

    run_on_channel(
        &mut channel,
        &mut sink,
        &config,
        SessionOptions::default(),
        &sleeper,
        shutdown,
    )?;

    assert_eq!(sink.batches.len(), 1);
    assert_eq!(channel.close_count(), 1);
    Ok(())
}

#[test]
fn test_join_failure_closes_channel() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config_in(dir.path())?;

    let mut channel = script_until_join();
    channel.push_line(format!("EVENT 21 {METER} 02"));
    channel.push_line(format!("EVENT 24 {METER}"));
    let sleeper = RecordingSleeper::new();
    let mut sink = CollectingSink::default();

    let err = run_on_channel(
        &mut channel,
        &mut sink,
        &config,
        SessionOptions::default(),
        &sleeper,
        Shutdown::new(),
    )
    .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<AdapterError>(),
        Some(AdapterError::JoinFailed { .. })
    ));
    assert_eq!(channel.close_count(), 1);
    assert!(sink.batches.is_empty());
    assert!(sleeper.recorded().is_empty());
    Ok(())
}

#[test]
fn test_exhausted_scan_closes_channel() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config_in(dir.path())?;

    let mut channel = ScriptedChannel::default();
    push_all(
        &mut channel,
        [
            "SKSETPWD C 0123456789AB",
            "OK",
            "SKSETRBID 00112233445566778899AABBCCDDEEFF",
            "OK",
        ],
    );
    for duration in config.scan.initial_duration..=config.scan.max_duration {
        channel.push_line(format!("SKSCAN 2 FFFFFFFF {duration}"));
        channel.push_line("OK");
        channel.push_timeout();
        channel.push_line(format!("EVENT 22 {METER}"));
    }
    let mut sink = CollectingSink::default();

    let err = run_on_channel(
        &mut channel,
        &mut sink,
        &config,
        SessionOptions::default(),
        &RecordingSleeper::new(),
        Shutdown::new(),
    )
    .unwrap_err();

    assert_eq!(
        err.downcast_ref::<AdapterError>(),
        Some(&AdapterError::ScanExhausted {
            duration: config.scan.max_duration + 1,
            max_duration: config.scan.max_duration,
        })
    );
    assert_eq!(channel.close_count(), 1);
    assert_eq!(channel.remaining(), 0);
    assert!(!std::path::Path::new(&config.session.cache_path).exists());
    Ok(())
}
