//! SKSTACK command builders and the echo/result exchange helper.

use anyhow::Result;

use super::{
    channel::LineChannel,
    event::{classify, AdapterEvent},
};

/// UDP port ECHONET-Lite listens on.
pub const ECHONET_UDP_PORT: u16 = 0x0E1A;

/// Active scan over all channels (mode 2, mask FFFFFFFF).
pub const SCAN_MODE_ACTIVE: u8 = 2;
pub const SCAN_CHANNEL_MASK: &str = "FFFFFFFF";

/// Virtual register holding the logical channel.
pub const REG_CHANNEL: &str = "S2";
/// Virtual register holding the PAN id.
pub const REG_PAN_ID: &str = "S3";

pub fn set_password(password: &str) -> String {
    format!("SKSETPWD C {password}\r\n")
}

pub fn set_route_b_id(b_route_id: &str) -> String {
    format!("SKSETRBID {b_route_id}\r\n")
}

pub fn active_scan(duration: u32) -> String {
    format!("SKSCAN {SCAN_MODE_ACTIVE} {SCAN_CHANNEL_MASK} {duration}\r\n")
}

/// Convert a 64-bit MAC address into its IPv6 link-local form.
pub fn link_local_address(mac: &str) -> String {
    format!("SKLL64 {mac}\r\n")
}

pub fn set_register(register: &str, value: &str) -> String {
    format!("SKSREG {register} {value}\r\n")
}

/// Start PANA authentication towards `address`.
pub fn join(address: &str) -> String {
    format!("SKJOIN {address}\r\n")
}

pub fn version() -> &'static str {
    "SKVER\r\n"
}

/// `SKSENDTO` with the binary payload appended after the header.
///
/// The adapter reads exactly `payload.len()` bytes after the trailing space,
/// so no line terminator follows.
pub fn send_to(address: &str, payload: &[u8]) -> Vec<u8> {
    let header = format!(
        "SKSENDTO 1 {address} {ECHONET_UDP_PORT:04X} 1 {:04X} ",
        payload.len()
    );
    let mut command = header.into_bytes();
    command.extend_from_slice(payload);
    command
}

/// Echo line and result line that follow a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exchange {
    pub echo: Option<String>,
    pub result: Option<String>,
}

/// Send `command`, then read and log the echo and result lines.
///
/// Neither line is validated: adapters differ in what they print on
/// success. `description` is what gets logged in place of the raw command,
/// so secrets can be masked.
pub fn exchange(
    channel: &mut dyn LineChannel,
    command: &[u8],
    description: &str,
) -> Result<Exchange> {
    channel.write(command)?;
    log::info!("{description}");

    let echo = channel.read_line()?;
    log::info!("(Echo back) {}", echo.as_deref().unwrap_or(""));
    let result = channel.read_line()?;
    log::info!("(Result) {}", result.as_deref().unwrap_or(""));

    Ok(Exchange { echo, result })
}

/// Ask the adapter for its firmware version.
///
/// Reads until the `EVER` line shows up, the command result arrives or a
/// read times out.
pub fn read_version(channel: &mut dyn LineChannel) -> Result<Option<String>> {
    channel.write(version().as_bytes())?;
    let mut found = None;
    while let Some(line) = channel.read_line()? {
        match classify(&line) {
            AdapterEvent::Version(version) => found = Some(version),
            AdapterEvent::Result(_) => break,
            _ => log::debug!("Msg in version query: {line}"),
        }
    }
    Ok(found)
}
