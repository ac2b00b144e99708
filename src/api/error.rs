use derive_more::{Display, Error};

/// Adapter conditions that end the run.
///
/// These travel inside `anyhow::Error`; use `downcast_ref::<AdapterError>()`
/// to tell them apart from I/O failures.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// No network answered even with the longest allowed scan.
    #[display("Failed to authenticate PANA: no channel found after scanning up to duration {max_duration} (next would be {duration})")]
    ScanExhausted { duration: u32, max_duration: u32 },

    /// The adapter reported `EVENT 24`.
    #[display("Failed PANA connection: {line}")]
    JoinFailed { line: String },

    /// The scan found a channel but not this descriptor field.
    #[display("Scan result is missing \"{field}\"")]
    MissingScanField { field: String },

    /// `SKLL64` did not produce an address.
    #[display("Adapter returned no link-local address for {mac}")]
    EmptyAddress { mac: String },

    /// Shutdown was requested while waiting on the adapter.
    #[display("Interrupted by shutdown request")]
    Interrupted,
}
