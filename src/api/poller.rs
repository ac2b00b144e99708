//! ECHONET-Lite register reads with retry-until-answered semantics.

use anyhow::Result;
use std::time::Duration;

use super::error::AdapterError;
use crate::{
    protocol::{
        channel::LineChannel,
        echonet::{build_request, parse_response, RegisterId, RegisterValue},
        skstack,
    },
    utils::{Shutdown, Sleeper},
};

/// Default pause before a request is sent again.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Reads one register at a time from the joined meter.
///
/// A wrong, malformed or missing reply never ends [`RegisterPoller::poll`];
/// the request is simply sent again after the retry interval. Only transport
/// failures of the channel itself and a shutdown request leave the loop.
pub struct RegisterPoller<'a> {
    address: String,
    retry_interval: Duration,
    sleeper: &'a dyn Sleeper,
    shutdown: Shutdown,
}

impl<'a> RegisterPoller<'a> {
    pub fn new(address: impl Into<String>, sleeper: &'a dyn Sleeper, shutdown: Shutdown) -> Self {
        Self {
            address: address.into(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            sleeper,
            shutdown,
        }
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Block until the meter answers for `register`.
    pub fn poll(&self, channel: &mut dyn LineChannel, register: RegisterId) -> Result<RegisterValue> {
        let command = skstack::send_to(&self.address, &build_request(register));
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            channel.write(&command)?;
            log::debug!("Sent request for {register} (attempt {attempt})");

            // Echo, EVENT 21 and the OK result carry nothing we need.
            for what in ["echo", "event", "result"] {
                let line = channel.read_line()?;
                log::trace!("({what}) {}", line.as_deref().unwrap_or(""));
            }

            match channel.read_line()? {
                Some(line) => {
                    if let Some(value) = parse_response(&line, register) {
                        log::debug!("{register} = {value:?}");
                        return Ok(value);
                    }
                    log::warn!("Unexpected reply for {register}: {line}");
                }
                None => log::warn!("No reply for {register}"),
            }

            if self.shutdown.is_triggered() {
                return Err(AdapterError::Interrupted.into());
            }
            log::info!(
                "Retrying {register} in {}s",
                self.retry_interval.as_secs()
            );
            self.sleeper.sleep(self.retry_interval);
        }
    }
}
