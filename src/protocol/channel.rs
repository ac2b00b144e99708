//! Line-oriented transport over the Wi-SUN adapter's serial port.
//!
//! The adapter speaks newline-terminated text, so everything above this
//! module works with whole lines. Reads are bounded by the configured timeout
//! and report a silent device as `Ok(None)` instead of blocking forever.

use anyhow::{anyhow, Context, Result};
use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    time::{Duration, Instant},
};

/// Default baud rate of SKSTACK-based adapters.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default bound for a single `read_line` call.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Blocking, timeout-bounded line transport.
pub trait LineChannel {
    /// Send raw bytes verbatim.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read one line with its trailing CR/LF removed.
    ///
    /// Returns `Ok(None)` when the read bound elapsed without any data.
    fn read_line(&mut self) -> Result<Option<String>>;

    /// Release the underlying device. Calling it twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Serial port settings for the adapter.
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl SerialSettings {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

/// [`LineChannel`] backed by a real serial device.
///
/// The port handle is released when the channel is dropped, so holding the
/// channel in the outermost scope guarantees release on every exit path.
pub struct SerialLineChannel {
    port: Option<Box<dyn serialport::SerialPort>>,
    port_name: String,
    read_timeout: Duration,
    pending: Vec<u8>,
}

impl SerialLineChannel {
    /// Open the serial port, enabling exclusive access on Unix systems.
    pub fn open(settings: &SerialSettings) -> Result<Self> {
        let port = open_serial_port(&settings.port_name, settings.baud_rate)?;
        log::info!(
            "Opened {} at {} baud (read timeout {:?})",
            settings.port_name,
            settings.baud_rate,
            settings.read_timeout
        );
        Ok(Self {
            port: Some(port),
            port_name: settings.port_name.clone(),
            read_timeout: settings.read_timeout,
            pending: Vec::new(),
        })
    }

    fn take_pending_line(&mut self) -> Option<String> {
        let newline = self.pending.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=newline).collect();
        Some(decode_line(&raw))
    }
}

impl LineChannel for SerialLineChannel {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| anyhow!("Serial port {} is closed", self.port_name))?;
        port.write_all(bytes)
            .with_context(|| format!("Failed to write to {}", self.port_name))?;
        port.flush()
            .with_context(|| format!("Failed to flush {}", self.port_name))?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.take_pending_line() {
            return Ok(Some(line));
        }

        let deadline = Instant::now() + self.read_timeout;
        let mut buffer = [0u8; 256];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let port = self
                .port
                .as_mut()
                .ok_or_else(|| anyhow!("Serial port {} is closed", self.port_name))?;
            port.set_timeout(remaining)
                .with_context(|| format!("Failed to set timeout on {}", self.port_name))?;

            match port.read(&mut buffer) {
                Ok(0) => continue,
                Ok(n) => {
                    self.pending.extend_from_slice(&buffer[..n]);
                    if let Some(line) = self.take_pending_line() {
                        return Ok(Some(line));
                    }
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                    ) =>
                {
                    continue
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(err).with_context(|| format!("Failed to read from {}", self.port_name))
                }
            }
        }

        // A partial line is still returned, like a readline with a timeout.
        if self.pending.is_empty() {
            Ok(None)
        } else {
            let raw = std::mem::take(&mut self.pending);
            Ok(Some(decode_line(&raw)))
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            log::info!("Closing serial port device {} ...", self.port_name);
            let _ = port.flush();
        }
        Ok(())
    }
}

impl Drop for SerialLineChannel {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for SerialLineChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLineChannel")
            .field("port_name", &self.port_name)
            .field("read_timeout", &self.read_timeout)
            .field("open", &self.port.is_some())
            .finish()
    }
}

fn open_serial_port(port: &str, baud_rate: u32) -> Result<Box<dyn serialport::SerialPort>> {
    let builder = serialport::new(port, baud_rate).timeout(DEFAULT_READ_TIMEOUT);

    #[cfg(unix)]
    {
        let mut handle = builder
            .open_native()
            .map_err(|err| anyhow!("Failed to open port {port}: {err}"))?;
        handle
            .set_exclusive(true)
            .map_err(|err| anyhow!("Failed to acquire exclusive access to {port}: {err}"))?;
        Ok(Box::new(handle))
    }

    #[cfg(not(unix))]
    {
        builder
            .open()
            .map_err(|err| anyhow!("Failed to open port {port}: {err}"))
    }
}

/// Lossy UTF-8 decode with the line terminator stripped.
fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

/// In-memory [`LineChannel`] that replays a fixed script.
///
/// Each entry is either a line or `None` for a read timeout. Every write is
/// recorded. Reading past the end of the script fails with
/// `UnexpectedEof`, so a test driving a loop never hangs.
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    script: VecDeque<Option<String>>,
    writes: Vec<Vec<u8>>,
    close_count: usize,
}

impl ScriptedChannel {
    pub fn new<I, S>(script: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            script: script.into_iter().map(|line| line.map(Into::into)).collect(),
            ..Default::default()
        }
    }

    /// Build a script from lines only, without timeouts.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(lines.into_iter().map(Some))
    }

    pub fn push_line(&mut self, line: impl Into<String>) {
        self.script.push_back(Some(line.into()));
    }

    pub fn push_timeout(&mut self) {
        self.script.push_back(None);
    }

    /// Raw bytes of every write, in order.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// Writes decoded lossily, convenient for asserting on commands.
    pub fn written_commands(&self) -> Vec<String> {
        self.writes
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    /// Number of script entries not consumed yet.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    /// How many times `close` actually released the channel.
    pub fn close_count(&self) -> usize {
        self.close_count
    }
}

impl LineChannel for ScriptedChannel {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.writes.push(bytes.to_vec());
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        match self.script.pop_front() {
            Some(entry) => Ok(entry),
            None => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted").into()),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.close_count == 0 {
            self.close_count = 1;
        }
        Ok(())
    }
}
