//! Session cache persistence
//!
//! The negotiated network session (channel, PAN id, link-local address) is
//! cached on disk so a restart can skip the slow active scan. Freshness is
//! judged from the file's modification time, never from its content.
//!
//! Writes go to a sibling temporary file that is then renamed over the cache,
//! so a crash mid-write cannot leave a truncated file that looks valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

/// Network parameters needed to join the meter's PAN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "Channel")]
    pub channel: String,
    #[serde(rename = "Pan ID")]
    pub pan_id: String,
    /// IPv6 link-local address of the meter.
    #[serde(rename = "Addr")]
    pub link_local_addr: String,
}

impl Session {
    pub fn new(
        channel: impl Into<String>,
        pan_id: impl Into<String>,
        link_local_addr: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            pan_id: pan_id.into(),
            link_local_addr: link_local_addr.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.channel.is_empty() && !self.pan_id.is_empty() && !self.link_local_addr.is_empty()
    }
}

/// Load a cached session if the file exists and is younger than `ttl`.
pub fn load(path: impl AsRef<Path>, ttl: Duration) -> Result<Option<Session>> {
    load_at(path, ttl, SystemTime::now())
}

/// [`load`] with an explicit clock.
pub fn load_at(path: impl AsRef<Path>, ttl: Duration, now: SystemTime) -> Result<Option<Session>> {
    let path = path.as_ref();

    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No cached session at {path:?}");
            return Ok(None);
        }
        Err(err) => return Err(err).with_context(|| format!("Failed to stat {path:?}")),
    };

    let modified = metadata
        .modified()
        .with_context(|| format!("Failed to read modification time of {path:?}"))?;
    // A timestamp in the future counts as brand new.
    let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
    if age >= ttl {
        log::info!(
            "Cached session at {path:?} expired ({}s old, lifetime {}s)",
            age.as_secs(),
            ttl.as_secs()
        );
        return Ok(None);
    }

    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read session from {path:?}"))?;
    match toml::from_str::<Session>(&content) {
        Ok(session) if session.is_complete() => {
            log::info!("Loaded cached session from {path:?}: {session:?}");
            Ok(Some(session))
        }
        Ok(_) => {
            log::warn!("Cached session at {path:?} has empty fields, ignoring it");
            Ok(None)
        }
        Err(err) => {
            log::warn!("Cached session at {path:?} is unreadable, ignoring it: {err}");
            Ok(None)
        }
    }
}

/// Replace the cache file with `session`.
pub fn store(path: impl AsRef<Path>, session: &Session) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create cache directory {parent:?}"))?;
    }

    let content = toml::to_string(session).context("Failed to serialize session")?;
    let tmp = temp_path(path);
    fs::write(&tmp, content).with_context(|| format!("Failed to write session to {tmp:?}"))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move session cache into place at {path:?}"))?;

    log::info!("Saved session to {path:?}");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Session {
        Session::new("39", "8A2F", "FE80:0000:0000:0000:021D:1290:0003:8474")
    }

    #[test]
    fn test_file_format_is_human_editable() -> Result<()> {
        let text = toml::to_string(&sample())?;
        assert!(text.contains("Channel = \"39\""));
        assert!(text.contains("\"Pan ID\" = \"8A2F\""));
        assert!(text.contains("Addr = "));
        Ok(())
    }

    #[test]
    fn test_store_then_load_fresh() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("wi_sun_config.toml");

        store(&path, &sample())?;
        assert!(!temp_path(&path).exists());
        assert_eq!(load(&path, Duration::from_secs(3600))?, Some(sample()));
        Ok(())
    }

    #[test]
    fn test_missing_file_is_absent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert_eq!(load(dir.path().join("none.toml"), Duration::from_secs(3600))?, None);
        Ok(())
    }

    #[test]
    fn test_expired_file_is_absent_regardless_of_content() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("wi_sun_config.toml");
        store(&path, &sample())?;

        let ttl = Duration::from_secs(24 * 60 * 60);
        let later = SystemTime::now() + ttl;
        assert_eq!(load_at(&path, ttl, later)?, None);

        let almost = SystemTime::now() + ttl - Duration::from_secs(60);
        assert_eq!(load_at(&path, ttl, almost)?, Some(sample()));
        Ok(())
    }

    #[test]
    fn test_corrupt_or_incomplete_file_is_absent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("wi_sun_config.toml");

        fs::write(&path, "Channel = ")?;
        assert_eq!(load(&path, Duration::from_secs(3600))?, None);

        fs::write(&path, "Channel = \"39\"\n\"Pan ID\" = \"\"\nAddr = \"FE80::1\"\n")?;
        assert_eq!(load(&path, Duration::from_secs(3600))?, None);
        Ok(())
    }
}
