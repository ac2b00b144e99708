//! wisun-meter: read a smart electricity meter over the Wi-SUN B route
//!
//! The crate drives an SKSTACK-compatible USB adapter over its serial port,
//! authenticates against the meter's PAN, and polls ECHONET-Lite properties
//! (cumulative energy, instantaneous power and current). Readings are
//! forwarded to a [`MetricsSink`](api::MetricsSink), usually InfluxDB.
//!
//! The adapter phases live in [`api`], the wire formats in [`protocol`].
//! Process setup (logging, signal handling, the CLI) is kept out of the
//! generated documentation.

pub mod api;
#[doc(hidden)]
pub mod boot;
#[doc(hidden)]
pub mod cli;
pub mod core;
pub mod protocol;
#[doc(hidden)]
pub mod utils;

pub use api::*;
