//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use wireport_core::{Interface, Peer};

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// Interface information for display.
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceInfo {
    /// Interface name.
    pub name: String,
    /// Public key, if a private key is configured.
    pub public_key: Option<String>,
    /// Listen port, 0 if unset.
    pub listen_port: u16,
    /// Addresses in CIDR notation.
    pub addresses: Vec<String>,
    /// MTU.
    pub mtu: u32,
    /// Firewall mark, 0 if unset.
    pub firewall_mark: i32,
    /// Administrative state.
    pub up: bool,
    /// Backing tunnel implementation.
    pub device_type: String,
    /// Where the view was read from.
    pub import_source: String,
    /// Bytes sent.
    pub bytes_upload: u64,
    /// Bytes received.
    pub bytes_download: u64,
}

impl From<&Interface> for InterfaceInfo {
    fn from(iface: &Interface) -> Self {
        Self {
            name: iface.identifier.to_string(),
            public_key: iface.public_key().map(ToString::to_string),
            listen_port: iface.listen_port,
            addresses: iface.addresses.iter().map(ToString::to_string).collect(),
            mtu: iface.mtu,
            firewall_mark: iface.firewall_mark,
            up: iface.device_up,
            device_type: iface.device_type.clone(),
            import_source: iface.import_source.clone(),
            bytes_upload: iface.bytes_upload,
            bytes_download: iface.bytes_download,
        }
    }
}

impl TableDisplay for InterfaceInfo {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Interface: {}", self.name)?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Public Key:   {}", self.public_key.as_deref().unwrap_or("(none)"))?;
        writeln!(writer, "Listen Port:  {}", unset_if_zero(i64::from(self.listen_port)))?;
        writeln!(writer, "MTU:          {}", self.mtu)?;
        writeln!(writer, "Fwmark:       {}", unset_if_zero(i64::from(self.firewall_mark)))?;
        writeln!(writer, "State:        {}", state(self.up))?;
        writeln!(writer, "Type:         {}", self.device_type)?;
        writeln!(writer, "Source:       {}", self.import_source)?;
        writeln!(writer)?;
        writeln!(writer, "Addresses")?;
        if self.addresses.is_empty() {
            writeln!(writer, "  (none)")?;
        }
        for addr in &self.addresses {
            writeln!(writer, "  {addr}")?;
        }
        writeln!(writer)?;
        writeln!(writer, "Transfer")?;
        writeln!(writer, "  Sent:       {}", format_bytes(self.bytes_upload))?;
        writeln!(writer, "  Received:   {}", format_bytes(self.bytes_download))?;
        Ok(())
    }
}

/// List of interfaces for display.
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceList {
    /// Interfaces on this host.
    pub interfaces: Vec<InterfaceInfo>,
}

impl TableDisplay for InterfaceList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.interfaces.is_empty() {
            writeln!(writer, "No WireGuard interfaces")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<15}  {:<44}  {:>5}  {:>5}  {:<5}  ADDRESSES",
            "NAME", "PUBLIC KEY", "PORT", "MTU", "STATE"
        )?;
        writeln!(writer, "{}", "─".repeat(100))?;

        for iface in &self.interfaces {
            writeln!(
                writer,
                "{:<15}  {:<44}  {:>5}  {:>5}  {:<5}  {}",
                iface.name,
                iface.public_key.as_deref().unwrap_or("-"),
                iface.listen_port,
                iface.mtu,
                state(iface.up),
                iface.addresses.join(", ")
            )?;
        }

        writeln!(writer)?;
        writeln!(writer, "Total: {} interface(s)", self.interfaces.len())?;
        Ok(())
    }
}

/// Peer information for display.
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    /// Public key.
    pub public_key: String,
    /// Endpoint, if known.
    pub endpoint: Option<String>,
    /// Allowed IP ranges.
    pub allowed_ips: Vec<String>,
    /// Keepalive interval in seconds, 0 when disabled.
    pub persistent_keepalive: u16,
    /// Last handshake in seconds since the epoch.
    pub latest_handshake: Option<u64>,
    /// Whether a preshared key is configured.
    pub preshared_key: bool,
    /// Protocol version.
    pub protocol_version: u32,
    /// Bytes received from the peer.
    pub bytes_upload: u64,
    /// Bytes sent to the peer.
    pub bytes_download: u64,
}

impl From<&Peer> for PeerInfo {
    fn from(peer: &Peer) -> Self {
        Self {
            public_key: peer.identifier.to_string(),
            endpoint: peer.endpoint.as_ref().map(ToString::to_string),
            allowed_ips: peer.allowed_ips.iter().map(ToString::to_string).collect(),
            persistent_keepalive: peer.persistent_keepalive,
            latest_handshake: peer
                .last_handshake
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs()),
            preshared_key: peer.preshared_key.is_some(),
            protocol_version: peer.protocol_version,
            bytes_upload: peer.bytes_upload,
            bytes_download: peer.bytes_download,
        }
    }
}

impl TableDisplay for PeerInfo {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Peer: {}", self.public_key)?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Endpoint:     {}", self.endpoint.as_deref().unwrap_or("(none)"))?;
        writeln!(writer, "Allowed IPs:  {}", joined_or_none(&self.allowed_ips))?;
        writeln!(writer, "Keepalive:    {}", keepalive(self.persistent_keepalive))?;
        writeln!(writer, "Handshake:    {}", handshake_ago(self.latest_handshake, SystemTime::now()))?;
        writeln!(writer, "Preshared:    {}", if self.preshared_key { "yes" } else { "no" })?;
        writeln!(writer, "Received:     {}", format_bytes(self.bytes_upload))?;
        writeln!(writer, "Sent:         {}", format_bytes(self.bytes_download))?;
        Ok(())
    }
}

/// List of peers for display.
#[derive(Debug, Clone, Serialize)]
pub struct PeerList {
    /// Interface the peers belong to.
    pub interface: String,
    /// Peers of the interface.
    pub peers: Vec<PeerInfo>,
}

impl TableDisplay for PeerList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.peers.is_empty() {
            writeln!(writer, "No peers on {}", self.interface)?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<44}  {:<24}  {:<32}  {:<12}  TRANSFER",
            "PUBLIC KEY", "ENDPOINT", "ALLOWED IPS", "HANDSHAKE"
        )?;
        writeln!(writer, "{}", "─".repeat(140))?;

        let now = SystemTime::now();
        for peer in &self.peers {
            writeln!(
                writer,
                "{:<44}  {:<24}  {:<32}  {:<12}  {} rx / {} tx",
                peer.public_key,
                peer.endpoint.as_deref().unwrap_or("-"),
                truncate(&joined_or_none(&peer.allowed_ips), 32),
                handshake_ago(peer.latest_handshake, now),
                format_bytes(peer.bytes_upload),
                format_bytes(peer.bytes_download)
            )?;
        }

        writeln!(writer)?;
        writeln!(writer, "Total: {} peer(s)", self.peers.len())?;
        Ok(())
    }
}

/// A generated key pair.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedKeys {
    /// Private key in base64.
    pub private_key: String,
    /// Public key in base64.
    pub public_key: String,
}

impl TableDisplay for GeneratedKeys {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Private Key:  {}", self.private_key)?;
        writeln!(writer, "Public Key:   {}", self.public_key)?;
        Ok(())
    }
}

/// A generated preshared key.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedPresharedKey {
    /// Preshared key in base64.
    pub preshared_key: String,
}

impl TableDisplay for GeneratedPresharedKey {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "{}", self.preshared_key)?;
        Ok(())
    }
}

/// Simple message output.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    /// Message text.
    pub message: String,
    /// Whether this is a success message.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub success: bool,
}

impl Message {
    /// Create a success message.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self { message: message.into(), success: true }
    }

    /// Create an informational message.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self { message: message.into(), success: false }
    }
}

impl TableDisplay for Message {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.success {
            writeln!(writer, "✓ {}", self.message)?;
        } else {
            writeln!(writer, "{}", self.message)?;
        }
        Ok(())
    }
}

fn state(up: bool) -> &'static str {
    if up { "up" } else { "down" }
}

fn unset_if_zero(value: i64) -> String {
    if value == 0 { "(unset)".to_string() } else { value.to_string() }
}

fn keepalive(secs: u16) -> String {
    if secs == 0 { "off".to_string() } else { format!("every {secs}s") }
}

fn joined_or_none(items: &[String]) -> String {
    if items.is_empty() { "(none)".to_string() } else { items.join(", ") }
}

/// Render a handshake timestamp relative to `now`.
fn handshake_ago(epoch_secs: Option<u64>, now: SystemTime) -> String {
    let Some(secs) = epoch_secs else {
        return "never".to_string();
    };
    let now_secs = now.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
    format!("{}s ago", now_secs.saturating_sub(secs))
}

/// Format a byte count with binary units.
#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 { format!("{bytes} B") } else { format!("{value:.2} {}", UNITS[unit]) }
}

/// Truncate a string to a maximum length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else if max_len > 3 {
        format!("{}...", &s[..max_len - 3])
    } else {
        s[..max_len].to_string()
    }
}
