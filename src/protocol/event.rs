//! Classification of adapter output lines.
//!
//! Every line the adapter prints goes through [`classify`] once, so callers
//! match on [`AdapterEvent`] instead of comparing string prefixes.

/// Beacon received during an active scan.
pub const EVENT_BEACON: u8 = 0x20;
/// UDP transmission finished.
pub const EVENT_UDP_SENT: u8 = 0x21;
/// Active scan finished.
pub const EVENT_SCAN_COMPLETE: u8 = 0x22;
/// PANA connection failed.
pub const EVENT_PANA_FAILED: u8 = 0x24;
/// PANA connection succeeded.
pub const EVENT_PANA_CONNECTED: u8 = 0x25;

/// Outcome reported by the adapter after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Ok,
    /// `FAIL ER<code>`, holding the code as printed.
    Fail(String),
}

/// A classified adapter line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    /// Echo of a command we sent (`SK...`).
    Echo(String),
    /// `OK` or `FAIL ER..`.
    Result(CommandResult),
    /// Indented `key:value` line printed under `EPANDESC`.
    ScanEntry { key: String, value: String },
    ScanComplete,
    JoinSuccess,
    JoinFailure,
    /// `ERXUDP ...` line, kept verbatim for the frame codec.
    DataReceived(String),
    /// Any other `EVENT xx`.
    Event(u8),
    /// `EVER <version>` answer to `SKVER`.
    Version(String),
    Unrecognized(String),
}

/// Classify a single line (terminator already stripped).
pub fn classify(line: &str) -> AdapterEvent {
    if let Some(entry) = line.strip_prefix("  ") {
        let entry = entry.trim();
        if let Some((key, value)) = entry.split_once(':') {
            return AdapterEvent::ScanEntry {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            };
        }
        return AdapterEvent::Unrecognized(line.to_string());
    }

    let trimmed = line.trim();
    if trimmed.starts_with("ERXUDP") {
        return AdapterEvent::DataReceived(trimmed.to_string());
    }
    if let Some(rest) = trimmed.strip_prefix("EVENT ") {
        let code = rest.split_whitespace().next().unwrap_or_default();
        return match u8::from_str_radix(code, 16) {
            Ok(EVENT_SCAN_COMPLETE) => AdapterEvent::ScanComplete,
            Ok(EVENT_PANA_FAILED) => AdapterEvent::JoinFailure,
            Ok(EVENT_PANA_CONNECTED) => AdapterEvent::JoinSuccess,
            Ok(other) => AdapterEvent::Event(other),
            Err(_) => AdapterEvent::Unrecognized(line.to_string()),
        };
    }
    if let Some(version) = trimmed.strip_prefix("EVER ") {
        return AdapterEvent::Version(version.trim().to_string());
    }
    if trimmed == "OK" || trimmed.starts_with("OK ") {
        return AdapterEvent::Result(CommandResult::Ok);
    }
    if let Some(rest) = trimmed.strip_prefix("FAIL") {
        let code = rest.trim().trim_start_matches("ER").to_string();
        return AdapterEvent::Result(CommandResult::Fail(code));
    }
    if trimmed.starts_with("SK") {
        return AdapterEvent::Echo(trimmed.to_string());
    }
    AdapterEvent::Unrecognized(line.to_string())
}
