//! Shared utilities
//!
//! - Injectable sleeping for poll pacing and retry delays
//! - Cooperative shutdown flag

pub mod shutdown;
pub mod sleep;

pub use shutdown::Shutdown;
pub use sleep::{RecordingSleeper, Sleeper, ThreadSleeper};
