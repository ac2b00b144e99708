//! PANA join: program channel and PAN id, then wait for the session.

use anyhow::Result;

use super::error::AdapterError;
use crate::{
    core::persistence::Session,
    protocol::{
        channel::LineChannel,
        event::{classify, AdapterEvent},
        skstack,
    },
};

/// Joins the meter's PAN described by a resolved [`Session`].
pub struct JoinSequencer<'a> {
    session: &'a Session,
}

impl<'a> JoinSequencer<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Returns once the adapter reports `EVENT 25`.
    ///
    /// `EVENT 24` is fatal and yields [`AdapterError::JoinFailed`]. Read
    /// timeouts keep the wait going.
    pub fn connect(&self, channel: &mut dyn LineChannel) -> Result<()> {
        let session = self.session;

        let command = skstack::set_register(skstack::REG_CHANNEL, &session.channel);
        skstack::exchange(
            channel,
            command.as_bytes(),
            &format!("Set channel to register: \"{}\"", command.trim_end()),
        )?;

        let command = skstack::set_register(skstack::REG_PAN_ID, &session.pan_id);
        skstack::exchange(
            channel,
            command.as_bytes(),
            &format!("Set PAN ID to register: \"{}\"", command.trim_end()),
        )?;

        let command = skstack::join(&session.link_local_addr);
        skstack::exchange(
            channel,
            command.as_bytes(),
            &format!("Try to PANA connect: \"{}\"", command.trim_end()),
        )?;

        loop {
            let Some(line) = channel.read_line()? else {
                log::debug!("Waiting for PANA result");
                continue;
            };

            match classify(&line) {
                AdapterEvent::JoinFailure => {
                    log::error!("Failed PANA connection: {line}");
                    return Err(AdapterError::JoinFailed { line }.into());
                }
                AdapterEvent::JoinSuccess => {
                    log::info!("Succeeded PANA connection: {line}");
                    break;
                }
                _ => log::debug!("Msg in PANA connection: {line}"),
            }
        }

        // The adapter prints one more notification after EVENT 25.
        let trailing = channel.read_line()?;
        log::debug!("Discarded after join: {}", trailing.as_deref().unwrap_or(""));
        Ok(())
    }
}
