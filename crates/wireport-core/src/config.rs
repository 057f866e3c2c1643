//! Reconciler configuration.
//!
//! Loaded from TOML. Every section is optional and falls back to defaults:
//!
//! ```toml
//! [link]
//! kind = "wireguard"
//! ip_command = "/sbin/ip"
//!
//! [reconciler]
//! import_source = "kernel"
//!
//! [defaults]
//! mtu = 1420
//! listen_port = 51820
//! persistent_keepalive = 25
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Smallest MTU that still carries IPv6.
pub const MIN_MTU: u32 = 1280;

/// Link-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LinkSettings {
    /// Link type passed to the link client when creating an interface.
    pub kind: String,
    /// Path of the iproute2 binary.
    pub ip_command: PathBuf,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            kind: "wireguard".to_string(),
            ip_command: PathBuf::from("/sbin/ip"),
        }
    }
}

/// Reconciler settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReconcilerSettings {
    /// Provenance label written to every interface read.
    pub import_source: String,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self { import_source: "kernel".to_string() }
    }
}

/// Values applied by operators' tooling when creating new entities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Defaults {
    /// MTU for new interfaces.
    pub mtu: u32,
    /// Listen port for new interfaces.
    pub listen_port: u16,
    /// Keepalive interval in seconds for new peers.
    pub persistent_keepalive: u16,
}

impl Default for Defaults {
    fn default() -> Self {
        Self { mtu: 1420, listen_port: 51820, persistent_keepalive: 25 }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WireportConfig {
    /// Link settings.
    pub link: LinkSettings,
    /// Reconciler settings.
    pub reconciler: ReconcilerSettings,
    /// Creation defaults.
    pub defaults: Defaults,
}

impl WireportConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.link.kind.trim().is_empty() {
            return Err(ConfigError::Invalid("link.kind cannot be empty".to_string()));
        }
        if self.link.ip_command.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("link.ip_command cannot be empty".to_string()));
        }
        if self.defaults.mtu != 0 && self.defaults.mtu < MIN_MTU {
            return Err(ConfigError::Invalid(format!(
                "defaults.mtu must be 0 or at least {MIN_MTU}, got {}",
                self.defaults.mtu
            )));
        }
        Ok(())
    }
}
