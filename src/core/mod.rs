/// Configuration, session cache and the InfluxDB sink
///
/// Everything here is independent of the adapter protocol and can be used
/// (and tested) without a serial device.
pub mod config;
pub mod influx;
pub mod persistence;

pub use config::{AppConfig, Credentials, PollTarget};
pub use influx::InfluxSink;
pub use persistence::Session;
