//! B-route authentication and network discovery.
//!
//! Drives the adapter through credential injection, active scanning with a
//! growing scan duration, and MAC to link-local address conversion. The
//! result is a [`Session`] that the join step and the cache consume.

use anyhow::Result;
use std::collections::BTreeMap;

use super::error::AdapterError;
use crate::{
    core::{config::Credentials, persistence::Session},
    protocol::{
        channel::LineChannel,
        event::{classify, AdapterEvent},
        skstack,
    },
};

pub const KEY_CHANNEL: &str = "Channel";
pub const KEY_PAN_ID: &str = "Pan ID";
pub const KEY_ADDR: &str = "Addr";

/// Bounds of the active-scan retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    pub initial_duration: u32,
    pub max_duration: u32,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            initial_duration: 4,
            max_duration: 7,
        }
    }
}

/// Handshake phases, in the order they run.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HandshakeState {
    SendPassword,
    SendId,
    Scanning { duration: u32 },
    Resolving,
    Done(Session),
}

/// Runs the authentication state machine over a [`LineChannel`].
pub struct AuthHandshake<'a> {
    credentials: &'a Credentials,
    scan: ScanSettings,
}

impl<'a> AuthHandshake<'a> {
    pub fn new(credentials: &'a Credentials, scan: ScanSettings) -> Self {
        Self { credentials, scan }
    }

    /// Authenticate and discover the meter's network.
    ///
    /// Fails with [`AdapterError::ScanExhausted`] when no channel shows up
    /// within the allowed scan durations.
    pub fn run(&self, channel: &mut dyn LineChannel) -> Result<Session> {
        let mut scan_result: BTreeMap<String, String> = BTreeMap::new();
        let mut state = HandshakeState::SendPassword;

        loop {
            state = match state {
                HandshakeState::SendPassword => {
                    skstack::exchange(
                        channel,
                        skstack::set_password(&self.credentials.password).as_bytes(),
                        "Send passwd for auth B route: \"SKSETPWD C ********\"",
                    )?;
                    HandshakeState::SendId
                }
                HandshakeState::SendId => {
                    let command = skstack::set_route_b_id(&self.credentials.b_route_id);
                    skstack::exchange(
                        channel,
                        command.as_bytes(),
                        &format!("Sent ID for auth B route: \"{}\"", command.trim_end()),
                    )?;
                    HandshakeState::Scanning {
                        duration: self.scan.initial_duration,
                    }
                }
                HandshakeState::Scanning { duration } => {
                    scan_once(channel, duration, &mut scan_result)?;
                    if scan_result.contains_key(KEY_CHANNEL) {
                        HandshakeState::Resolving
                    } else {
                        let next = duration + 1;
                        if next > self.scan.max_duration {
                            let err = AdapterError::ScanExhausted {
                                duration: next,
                                max_duration: self.scan.max_duration,
                            };
                            log::error!("{err}");
                            return Err(err.into());
                        }
                        log::info!("No channel found with duration {duration}, rescanning with {next}");
                        HandshakeState::Scanning { duration: next }
                    }
                }
                HandshakeState::Resolving => {
                    HandshakeState::Done(resolve(channel, &mut scan_result)?)
                }
                HandshakeState::Done(session) => {
                    log::info!("PANA parameters resolved: {session:?}");
                    return Ok(session);
                }
            };
        }
    }
}

/// Issue one active scan and collect descriptor entries until it completes.
fn scan_once(
    channel: &mut dyn LineChannel,
    duration: u32,
    scan_result: &mut BTreeMap<String, String>,
) -> Result<()> {
    let command = skstack::active_scan(duration);
    channel.write(command.as_bytes())?;
    log::info!("Sent scan for auth PANA: \"{}\"", command.trim_end());

    loop {
        let Some(line) = channel.read_line()? else {
            log::debug!("Scan still running (duration {duration})");
            continue;
        };
        log::debug!("Msg in auth PANA: {line}");

        match classify(&line) {
            AdapterEvent::ScanComplete => return Ok(()),
            AdapterEvent::ScanEntry { key, value } => {
                scan_result.insert(key, value);
            }
            _ => {}
        }
    }
}

/// Convert the scanned MAC address to a link-local address and build the session.
fn resolve(
    channel: &mut dyn LineChannel,
    scan_result: &mut BTreeMap<String, String>,
) -> Result<Session> {
    let mac = required(scan_result, KEY_ADDR)?;
    channel.write(skstack::link_local_address(&mac).as_bytes())?;

    let echo = channel.read_line()?;
    log::info!("(Echo back) {}", echo.as_deref().unwrap_or(""));
    let address = channel
        .read_line()?
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .ok_or_else(|| AdapterError::EmptyAddress { mac: mac.clone() })?;
    log::info!("Link-local address of {mac}: {address}");
    scan_result.insert(KEY_ADDR.to_string(), address);

    Ok(Session::new(
        required(scan_result, KEY_CHANNEL)?,
        required(scan_result, KEY_PAN_ID)?,
        required(scan_result, KEY_ADDR)?,
    ))
}

fn required(scan_result: &BTreeMap<String, String>, key: &str) -> Result<String, AdapterError> {
    scan_result
        .get(key)
        .filter(|value| !value.is_empty())
        .cloned()
        .ok_or_else(|| AdapterError::MissingScanField {
            field: key.to_string(),
        })
}
