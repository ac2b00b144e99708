use anyhow::Result;

use wisun_meter::{
    api::{AdapterError, JoinSequencer},
    core::persistence::Session,
    protocol::ScriptedChannel,
};

const LINK_LOCAL: &str = "FE80:0000:0000:0000:021D:1290:0003:8474";

fn register_exchanges(channel: &mut ScriptedChannel) {
    for line in [
        "SKSREG S2 3B".to_string(),
        "OK".to_string(),
        "SKSREG S3 1234".to_string(),
        "OK".to_string(),
        format!("SKJOIN {LINK_LOCAL}"),
        "OK".to_string(),
    ] {
        channel.push_line(line);
    }
}

#[test]
fn test_join_waits_through_timeouts_and_noise() -> Result<()> {
    let mut channel = ScriptedChannel::default();
    register_exchanges(&mut channel);
    channel.push_timeout();
    channel.push_line(format!("EVENT 21 {LINK_LOCAL} 02"));
    channel.push_timeout();
    channel.push_line(format!("ERXUDP {LINK_LOCAL} FE80::2 02CC 02CC 001D129000038474 0 0028 00000028C0000002"));
    channel.push_line(format!("EVENT 25 {LINK_LOCAL}"));
    channel.push_line(format!("ERXUDP {LINK_LOCAL} FF02:0000:0000:0000:0000:0000:0000:0001 0E1A 0E1A 001D129000038474 1 0012 108100000EF0010EF0017301D50401028801"));

    let session = Session::new("3B", "1234", LINK_LOCAL);
    JoinSequencer::new(&session).connect(&mut channel)?;

    assert_eq!(
        channel.written_commands(),
        vec![
            "SKSREG S2 3B\r\n".to_string(),
            "SKSREG S3 1234\r\n".to_string(),
            format!("SKJOIN {LINK_LOCAL}\r\n"),
        ]
    );
    assert_eq!(channel.remaining(), 0);
    Ok(())
}

#[test]
fn test_join_failure_is_fatal() {
    let mut channel = ScriptedChannel::default();
    register_exchanges(&mut channel);
    channel.push_line(format!("EVENT 21 {LINK_LOCAL} 02"));
    channel.push_line(format!("EVENT 24 {LINK_LOCAL}"));

    let session = Session::new("3B", "1234", LINK_LOCAL);
    let err = JoinSequencer::new(&session)
        .connect(&mut channel)
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<AdapterError>(),
        Some(AdapterError::JoinFailed { .. })
    ));
    assert!(err.to_string().starts_with("Failed PANA connection"));
}

#[test]
fn test_register_failures_are_not_fatal() -> Result<()> {
    let mut channel = ScriptedChannel::default();
    channel.push_line("SKSREG S2 3B");
    channel.push_line("FAIL ER04");
    channel.push_line("SKSREG S3 1234");
    channel.push_line("FAIL ER04");
    channel.push_line(format!("SKJOIN {LINK_LOCAL}"));
    channel.push_line("OK");
    channel.push_line(format!("EVENT 25 {LINK_LOCAL}"));
    channel.push_timeout();

    let session = Session::new("3B", "1234", LINK_LOCAL);
    JoinSequencer::new(&session).connect(&mut channel)?;
    assert_eq!(channel.remaining(), 0);
    Ok(())
}
