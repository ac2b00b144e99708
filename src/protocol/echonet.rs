//! ECHONET-Lite frame codec for the low-voltage smart meter object.
//!
//! Requests are fixed-format `Get` frames for a single property. Responses
//! arrive as `ERXUDP` lines whose last column is the datagram in hex.

use serde::{Deserialize, Serialize};
use strum::{EnumIter, FromRepr};

/// ECHONET-Lite header (EHD1/EHD2).
pub const EHD: [u8; 2] = [0x10, 0x81];
/// Transaction id. Responses are matched on EPC, not on TID.
pub const TID: [u8; 2] = [0x00, 0x01];
/// Controller class object (source of our requests).
pub const SEOJ_CONTROLLER: [u8; 3] = [0x05, 0xFF, 0x01];
/// Low-voltage smart electric energy meter object.
pub const DEOJ_SMART_METER: [u8; 3] = [0x02, 0x88, 0x01];
/// Property value read request.
pub const ESV_GET: u8 = 0x62;
/// Property value read response.
pub const ESV_GET_RES: u8 = 0x72;

/// Object code the meter must answer from, as printed by the adapter.
pub const METER_OBJECT_CODE: &str = "028801";
/// `Get_Res` service code as printed by the adapter.
pub const GET_RESPONSE_CODE: &str = "72";

/// Column of the payload in an `ERXUDP` line.
const PAYLOAD_COLUMN: usize = 8;

/// Meter registers (EPC codes) this crate reads.
#[repr(u8)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, FromRepr, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RegisterId {
    CumulativeForwardEnergy = 0xE0,
    CumulativeReverseEnergy = 0xE3,
    InstantaneousPower = 0xE7,
    InstantaneousCurrent = 0xE8,
}

impl RegisterId {
    pub fn epc(self) -> u8 {
        self as u8
    }

    /// Two-digit uppercase hex, as it appears inside adapter output.
    pub fn epc_hex(self) -> String {
        format!("{:02X}", self.epc())
    }
}

impl std::fmt::Display for RegisterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RegisterId::CumulativeForwardEnergy => "cumulative_forward_energy",
            RegisterId::CumulativeReverseEnergy => "cumulative_reverse_energy",
            RegisterId::InstantaneousPower => "instantaneous_power",
            RegisterId::InstantaneousCurrent => "instantaneous_current",
        };
        write!(f, "{name} (0x{:02X})", self.epc())
    }
}

impl TryFrom<&str> for RegisterId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let hex = value
            .trim()
            .trim_start_matches("0x")
            .trim_start_matches("0X");
        if let Ok(code) = u8::from_str_radix(hex, 16) {
            if let Some(id) = Self::from_repr(code) {
                return Ok(id);
            }
        }
        match value.trim() {
            "cumulative_forward_energy" => Ok(Self::CumulativeForwardEnergy),
            "cumulative_reverse_energy" => Ok(Self::CumulativeReverseEnergy),
            "instantaneous_power" => Ok(Self::InstantaneousPower),
            "instantaneous_current" => Ok(Self::InstantaneousCurrent),
            other => Err(anyhow::anyhow!("Unknown register: {other}")),
        }
    }
}

/// Single-property `Get` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFrame {
    pub register: RegisterId,
}

impl RequestFrame {
    pub fn new(register: RegisterId) -> Self {
        Self { register }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(14);
        frame.extend_from_slice(&EHD);
        frame.extend_from_slice(&TID);
        frame.extend_from_slice(&SEOJ_CONTROLLER);
        frame.extend_from_slice(&DEOJ_SMART_METER);
        frame.push(ESV_GET);
        frame.push(0x01); // OPC
        frame.push(self.register.epc());
        frame.push(0x00); // PDC: a Get carries no data
        frame
    }
}

/// Build the request frame bytes for `register`.
pub fn build_request(register: RegisterId) -> Vec<u8> {
    RequestFrame::new(register).to_bytes()
}

/// Fields pulled out of an `ERXUDP` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRecord {
    pub seoj: String,
    pub esv: String,
    pub epc: String,
    /// Last 8 hex characters of the payload.
    pub raw_value: String,
}

/// Decoded register value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterValue {
    /// Integrated energy count, before the unit multiplier.
    Energy(u32),
    /// Instantaneous power in watts.
    Power(i32),
    /// Instantaneous current per phase in amperes.
    Current { r_phase: f64, t_phase: f64 },
}

/// Split an `ERXUDP` line into its response fields.
///
/// Returns `None` for any other line or a payload too short to hold the
/// header fields.
pub fn parse_record(line: &str) -> Option<ResponseRecord> {
    let line = line.trim();
    if !line.starts_with("ERXUDP") {
        return None;
    }
    let cols: Vec<&str> = line.split(' ').collect();
    let payload = cols.get(PAYLOAD_COLUMN)?;
    if payload.len() < 8 {
        return None;
    }

    Some(ResponseRecord {
        seoj: payload.get(8..14)?.to_string(),
        esv: payload.get(20..22)?.to_string(),
        epc: payload.get(24..26)?.to_string(),
        raw_value: payload.get(payload.len() - 8..)?.to_string(),
    })
}

/// Match an adapter line against the request for `expected` and decode it.
///
/// Any mismatch is a plain `None`; the caller decides whether to retry.
pub fn parse_response(line: &str, expected: RegisterId) -> Option<RegisterValue> {
    let record = parse_record(line)?;
    if !record.seoj.eq_ignore_ascii_case(METER_OBJECT_CODE) {
        log::debug!("Ignoring response from object {}", record.seoj);
        return None;
    }
    if record.esv != GET_RESPONSE_CODE {
        log::debug!("Ignoring response with ESV {}", record.esv);
        return None;
    }
    if !record.epc.eq_ignore_ascii_case(&expected.epc_hex()) {
        log::debug!(
            "Ignoring response for EPC {} while waiting for {}",
            record.epc,
            expected.epc_hex()
        );
        return None;
    }
    decode_value(expected, &record.raw_value)
}

/// Decode the 32-bit big-endian hex value of `register`.
pub fn decode_value(register: RegisterId, raw_hex: &str) -> Option<RegisterValue> {
    if raw_hex.len() != 8 {
        return None;
    }
    let raw = u32::from_str_radix(raw_hex, 16).ok()?;
    let value = match register {
        RegisterId::CumulativeForwardEnergy | RegisterId::CumulativeReverseEnergy => {
            RegisterValue::Energy(raw)
        }
        RegisterId::InstantaneousPower => RegisterValue::Power(raw as i32),
        RegisterId::InstantaneousCurrent => {
            let r_phase = (raw >> 16) as u16 as i16;
            let t_phase = (raw & 0xFFFF) as u16 as i16;
            RegisterValue::Current {
                r_phase: f64::from(r_phase) / 10.0,
                t_phase: f64::from(t_phase) / 10.0,
            }
        }
    };
    Some(value)
}
