//! Adapter session phases and the polling loop built on them.
//!
//! Each phase borrows the [`LineChannel`](crate::protocol::LineChannel)
//! instead of owning it, so the caller decides when the device is released.

pub mod error;
pub mod handshake;
pub mod join;
pub mod orchestrator;
pub mod poller;
pub mod traits;

pub use error::AdapterError;
pub use handshake::{AuthHandshake, ScanSettings};
pub use join::JoinSequencer;
pub use orchestrator::{to_metric, OrchestratorSettings, PollingOrchestrator};
pub use poller::RegisterPoller;
pub use traits::{CollectingSink, LoggingSink, Measurement, MetricValue, MetricsSink};
