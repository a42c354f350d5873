//! Configuration system for LanLink.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $LANLINK_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/lanlink/config.toml
//!   3. ~/.config/lanlink/config.toml
//!
//! This layer only ever reads these values; the host session owns
//! persisting anything (such as a remembered join address) back.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanLinkConfig {
    pub join: JoinConfig,
    pub label_sync: LabelSyncConfig,
    pub latency: LatencyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    /// Default address or hostname offered when joining a session.
    pub default_address: String,
    /// Default join port.
    pub default_port: u16,
    /// Let the host overwrite the defaults with the last successfully
    /// resolved address/port. The protocol layer only reads this flag.
    pub remember_last: bool,
    /// Resolve a service-record target via AAAA before A.
    pub prefer_ipv6: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelSyncConfig {
    /// Enable display-label synchronization.
    pub enabled: bool,
    /// Label used by the authority before any change arrives.
    pub host_default_label: String,
    /// Label announced when joining, before the user picks one.
    pub join_default_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    /// Enable latency measurement entirely.
    pub enabled: bool,
    /// Use the custom probe/echo protocol. When false (or when the
    /// authority never answers), the transport-provided RTT is used.
    pub custom_probe: bool,
    /// Report round-trip time; false reports a one-way estimate (RTT/2).
    pub rtt_measurement: bool,
    /// Surface user-visible warnings on probe failures and a slow
    /// authority. Disabling this silences warnings, not measurement.
    pub warn_on_failure: bool,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for LanLinkConfig {
    fn default() -> Self {
        Self {
            join: JoinConfig::default(),
            label_sync: LabelSyncConfig::default(),
            latency: LatencyConfig::default(),
        }
    }
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            default_address: "127.0.0.1".to_string(),
            default_port: 7777,
            remember_last: false,
            prefer_ipv6: false,
        }
    }
}

impl Default for LabelSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host_default_label: "Host".to_string(),
            join_default_label: "Guest".to_string(),
        }
    }
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            custom_probe: true,
            rtt_measurement: true,
            warn_on_failure: true,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_or_tmp().join(".config"))
        .join("lanlink")
}

fn home_or_tmp() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl LanLinkConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            LanLinkConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("LANLINK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&LanLinkConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply LANLINK_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LANLINK_JOIN__DEFAULT_ADDRESS") {
            self.join.default_address = v;
        }
        if let Ok(v) = std::env::var("LANLINK_JOIN__DEFAULT_PORT") {
            if let Ok(p) = v.parse() {
                self.join.default_port = p;
            }
        }
        if let Ok(v) = std::env::var("LANLINK_JOIN__REMEMBER_LAST") {
            self.join.remember_last = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("LANLINK_JOIN__PREFER_IPV6") {
            self.join.prefer_ipv6 = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("LANLINK_LABEL_SYNC__ENABLED") {
            self.label_sync.enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("LANLINK_LABEL_SYNC__HOST_DEFAULT_LABEL") {
            self.label_sync.host_default_label = v;
        }
        if let Ok(v) = std::env::var("LANLINK_LABEL_SYNC__JOIN_DEFAULT_LABEL") {
            self.label_sync.join_default_label = v;
        }
        if let Ok(v) = std::env::var("LANLINK_LATENCY__ENABLED") {
            self.latency.enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("LANLINK_LATENCY__CUSTOM_PROBE") {
            self.latency.custom_probe = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("LANLINK_LATENCY__RTT_MEASUREMENT") {
            self.latency.rtt_measurement = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("LANLINK_LATENCY__WARN_ON_FAILURE") {
            self.latency.warn_on_failure = v == "true" || v == "1";
        }
    }
}
