use serde::{Deserialize, Serialize};
use std::path::Path;

use super::SettingsError;

/// A light gun recognised by its USB ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KnownDevice {
    pub vid: u16,
    pub pid: u16,
    pub name: String,
}

impl KnownDevice {
    fn new(vid: u16, pid: u16, name: &str) -> Self {
        Self { vid, pid, name: name.to_string() }
    }
}

/// Per-phase response deadlines, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    pub probe_ms: u64,
    pub identity_ms: u64,
    pub load_ms: u64,
    pub pin_line_ms: u64,
    pub commit_ms: u64,
    pub clear_ms: u64,
    pub feed_poll_ms: u64,
    pub drain_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe_ms: 2000,
            identity_ms: 1000,
            load_ms: 2000,
            pin_line_ms: 1000,
            commit_ms: 2000,
            clear_ms: 5000,
            feed_poll_ms: 20,
            drain_ms: 50,
        }
    }
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppSettings {
    pub baud_rate: u32,
    pub timeouts: Timeouts,
    /// Send a keep-alive after this many streamed reply lines
    pub keepalive_every: usize,
    pub known_devices: Vec<KnownDevice>,
    pub log_level: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            timeouts: Timeouts::default(),
            keepalive_every: 15,
            known_devices: vec![
                KnownDevice::new(0x0321, 0x0420, "Piggie 1"),
                KnownDevice::new(0x0322, 0x0421, "Piggie 2"),
                KnownDevice::new(0x0323, 0x0422, "Piggie 3"),
                KnownDevice::new(0x0324, 0x0423, "Piggie 4"),
            ],
            log_level: "info".to_string(),
        }
    }
}

impl AppSettings {
    /// Read settings from a JSON file, or defaults when no file is given
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, SettingsError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text)?;
        log::debug!("Loaded app settings from {}", path.display());
        Ok(settings)
    }

    pub fn known_device(&self, vid: u16, pid: u16) -> Option<&KnownDevice> {
        self.known_devices.iter().find(|d| d.vid == vid && d.pid == pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let settings: AppSettings =
            serde_json::from_str(r#"{ "baud_rate": 115200, "timeouts": { "commit_ms": 500 } }"#).unwrap();
        assert_eq!(settings.baud_rate, 115200);
        assert_eq!(settings.timeouts.commit_ms, 500);
        assert_eq!(settings.timeouts.clear_ms, 5000);
        assert_eq!(settings.known_devices.len(), 4);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_str::<AppSettings>(r#"{ "theme": "dark" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn known_device_lookup() {
        let settings = AppSettings::default();
        assert_eq!(settings.known_device(0x0323, 0x0422).map(|d| d.name.as_str()), Some("Piggie 3"));
        assert!(settings.known_device(0x2e8a, 0x000a).is_none());
    }
}
