//! Application configuration and B-route credentials.
//!
//! Both files are TOML. Every application setting has a default, so a
//! partial (or missing) config file still yields a runnable setup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::Path, time::Duration};

use crate::protocol::echonet::RegisterId;

pub const DEFAULT_CONFIG_PATH: &str = "./config/wisun_meter.toml";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub scan: ScanConfig,
    pub session: SessionConfig,
    pub polling: PollingConfig,
    pub influx: InfluxConfig,
    pub credentials: CredentialsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub device: String,
    pub baud_rate: u32,
    pub read_timeout_secs: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            read_timeout_secs: 10,
        }
    }
}

/// Active scan durations. Durations above 7 are known not to work with
/// common adapters even though the command accepts up to 14.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub initial_duration: u32,
    pub max_duration: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            initial_duration: 4,
            max_duration: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cache_path: String,
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_path: "./config/wi_sun_config.toml".to_string(),
            ttl_secs: 24 * 60 * 60,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// A register to read and the measurement name it is reported under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollTarget {
    pub register: RegisterId,
    pub measurement: String,
}

impl PollTarget {
    pub fn new(register: RegisterId, measurement: impl Into<String>) -> Self {
        Self {
            register,
            measurement: measurement.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub retry_interval_secs: u64,
    pub register_interval_secs: u64,
    pub cycle_interval_secs: u64,
    /// Applied to integrated-energy counts, e.g. 1000 when the meter counts kWh.
    pub energy_multiplier: i64,
    pub targets: Vec<PollTarget>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            retry_interval_secs: 10,
            register_interval_secs: 1,
            cycle_interval_secs: 30,
            energy_multiplier: 1000,
            targets: vec![
                PollTarget::new(RegisterId::CumulativeForwardEnergy, "integ_energy"),
                PollTarget::new(RegisterId::InstantaneousPower, "inst_energy"),
                PollTarget::new(RegisterId::InstantaneousCurrent, "inst_current"),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8086,
            database: "wi_sun".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub path: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: "./secret/b_route.toml".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Append log records to this file as well as stdout.
    pub file: Option<String>,
}

impl AppConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse application config")
    }

    /// Read configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {path:?}"))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config file {path:?}"))
    }

    /// Like [`AppConfig::from_file`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize application config")
    }
}

/// B-route account issued by the electricity provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub password: String,
    pub b_route_id: String,
}

impl Credentials {
    pub fn new(password: impl Into<String>, b_route_id: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            b_route_id: b_route_id.into(),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let credentials: Self =
            toml::from_str(content).context("Failed to parse B-route credentials")?;
        anyhow::ensure!(
            !credentials.password.is_empty() && !credentials.b_route_id.is_empty(),
            "B-route credentials must have a password and an id"
        );
        Ok(credentials)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials from {path:?}"))?;
        Self::from_toml(&content)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &"********")
            .field("b_route_id", &self.b_route_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() -> Result<()> {
        let config = AppConfig::from_toml("")?;
        assert_eq!(config.serial.device, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.scan.initial_duration, 4);
        assert_eq!(config.scan.max_duration, 7);
        assert_eq!(config.session.ttl(), Duration::from_secs(86_400));
        assert_eq!(config.polling.targets.len(), 3);
        assert_eq!(config.polling.energy_multiplier, 1000);
        Ok(())
    }

    #[test]
    fn test_partial_config_overrides() -> Result<()> {
        let config = AppConfig::from_toml(
            r#"
            [serial]
            device = "/dev/ttyACM0"

            [polling]
            cycle_interval_secs = 60

            [[polling.targets]]
            register = "cumulative_reverse_energy"
            measurement = "reverse_energy"

            [influx]
            host = "influx.local"
            "#,
        )?;
        assert_eq!(config.serial.device, "/dev/ttyACM0");
        assert_eq!(config.serial.read_timeout_secs, 10);
        assert_eq!(config.polling.cycle_interval_secs, 60);
        assert_eq!(config.polling.retry_interval_secs, 10);
        assert_eq!(
            config.polling.targets,
            vec![PollTarget::new(
                RegisterId::CumulativeReverseEnergy,
                "reverse_energy"
            )]
        );
        assert_eq!(config.influx.host, "influx.local");
        assert_eq!(config.influx.port, 8086);
        Ok(())
    }

    #[test]
    fn test_config_survives_serialization() -> Result<()> {
        let text = AppConfig::default().to_toml()?;
        let parsed = AppConfig::from_toml(&text)?;
        assert_eq!(parsed.polling.targets, AppConfig::default().polling.targets);
        Ok(())
    }

    #[test]
    fn test_credentials() -> Result<()> {
        let credentials = Credentials::from_toml(
            r#"
            password = "0123456789AB"
            b_route_id = "00112233445566778899AABBCCDDEEFF"
            "#,
        )?;
        assert_eq!(credentials.password, "0123456789AB");
        assert!(!format!("{credentials:?}").contains("0123456789AB"));

        assert!(Credentials::from_toml("password = \"\"\nb_route_id = \"x\"").is_err());
        assert!(Credentials::from_toml("password = \"x\"").is_err());
        Ok(())
    }
}
