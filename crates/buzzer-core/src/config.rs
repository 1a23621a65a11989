//! Device configuration.
//!
//! Every field has a default matching the production board, so a config
//! file only needs to name what differs:
//!
//! ```json
//! {
//!   "host": { "address": "127.0.0.1:9753" },
//!   "wifi": { "ssid": "quiz", "password": "secret" },
//!   "timing": { "reconnectDelayMs": 500 }
//! }
//! ```

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::DEFAULT_MAX_RETRIES;
use crate::tick::{DEFAULT_PLAYBACK_TICKS, DEFAULT_STATUS_DIVIDER};

/// Port the host listens on.
pub const DEFAULT_HOST_PORT: u16 = 9753;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Complete device configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceConfig {
    pub host: HostConfig,
    pub wifi: WifiConfig,
    pub timing: TimingConfig,
}

/// Where the host lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostConfig {
    pub address: SocketAddr,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::new(192, 168, 2, 5),
                DEFAULT_HOST_PORT,
            )),
        }
    }
}

/// Wireless network credentials and retry ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WifiConfig {
    pub ssid: String,

    /// Empty for open networks.
    pub password: String,

    /// Retries after the first failed association.
    pub max_retries: u32,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Tick rates and task periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimingConfig {
    /// Fast tick frequency.
    pub tick_hz: u32,

    /// Fast ticks per audio pattern.
    pub audio_duration_ticks: u32,

    /// Fast ticks per status tick.
    pub status_divider: u32,

    pub button_poll_ms: u64,
    pub heartbeat_ms: u64,

    /// Wait after a cycle that never reached a session.
    pub reconnect_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_hz: 1000,
            audio_duration_ticks: DEFAULT_PLAYBACK_TICKS,
            status_divider: DEFAULT_STATUS_DIVIDER,
            button_poll_ms: 10,
            heartbeat_ms: 1000,
            reconnect_delay_ms: 2000,
        }
    }
}

impl TimingConfig {
    pub fn button_poll(&self) -> Duration {
        Duration::from_millis(self.button_poll_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl DeviceConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: DeviceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let timing = &self.timing;
        let checks = [
            (timing.tick_hz == 0, "timing.tickHz", "must be non-zero"),
            (
                timing.status_divider == 0,
                "timing.statusDivider",
                "must be at least 1",
            ),
            (
                timing.audio_duration_ticks == 0,
                "timing.audioDurationTicks",
                "must be non-zero",
            ),
            (
                timing.audio_duration_ticks % 2 != 0,
                "timing.audioDurationTicks",
                "must be even so the transducer ends low",
            ),
            (
                timing.button_poll_ms == 0,
                "timing.buttonPollMs",
                "must be non-zero",
            ),
            (
                timing.heartbeat_ms == 0,
                "timing.heartbeatMs",
                "must be non-zero",
            ),
        ];

        match checks.into_iter().find(|(failed, _, _)| *failed) {
            Some((_, field, reason)) => Err(ConfigError::Invalid { field, reason }),
            None => Ok(()),
        }
    }
}
