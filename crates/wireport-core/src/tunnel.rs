//! Tunnel client boundary.
//!
//! The tunnel subsystem owns keys, listen port, firewall mark and the peer
//! table of each `WireGuard` device. Types here mirror the kernel's generic
//! netlink attributes; the canonical model lives in [`crate::model`].

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use ipnet::IpNet;

use crate::client::{CallContext, ClientError};
use crate::keys::{KEY_SIZE, PresharedKey, PrivateKey, PublicKey};

/// Which implementation backs a tunnel device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TunnelDeviceType {
    /// The in-kernel `WireGuard` module.
    LinuxKernel,
    /// A userspace implementation speaking the cross-platform API.
    Userspace,
    /// Not reported by the client.
    #[default]
    Unknown,
}

impl fmt::Display for TunnelDeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinuxKernel => write!(f, "linux_kernel"),
            Self::Userspace => write!(f, "userspace"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A tunnel device as reported by the tunnel client.
#[derive(Debug, Clone, Default)]
pub struct TunnelDevice {
    /// Device (and link) name.
    pub name: String,
    /// Backing implementation.
    pub device_type: TunnelDeviceType,
    /// Private key, `None` while unset.
    pub private_key: Option<PrivateKey>,
    /// Public key, `None` while no private key is set.
    pub public_key: Option<PublicKey>,
    /// UDP listen port, 0 if unset.
    pub listen_port: u16,
    /// Firewall mark, 0 if unset.
    pub firewall_mark: u32,
    /// Peer table.
    pub peers: Vec<TunnelPeer>,
}

/// A peer entry in a tunnel device's peer table.
#[derive(Debug, Clone)]
pub struct TunnelPeer {
    /// The peer's public key.
    pub public_key: PublicKey,
    /// Raw preshared key; all zeros when none is configured.
    pub preshared_key: [u8; KEY_SIZE],
    /// Configured or last observed endpoint.
    pub endpoint: Option<SocketAddr>,
    /// Keepalive interval, zero when disabled.
    pub persistent_keepalive_interval: Duration,
    /// Last handshake; `UNIX_EPOCH` when none has happened.
    pub last_handshake_time: SystemTime,
    /// Bytes received from the peer.
    pub receive_bytes: u64,
    /// Bytes transmitted to the peer.
    pub transmit_bytes: u64,
    /// Allowed IP ranges.
    pub allowed_ips: Vec<IpNet>,
    /// Protocol version in use.
    pub protocol_version: u32,
}

impl TunnelPeer {
    /// A fresh peer entry with only a public key.
    #[must_use]
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            preshared_key: [0u8; KEY_SIZE],
            endpoint: None,
            persistent_keepalive_interval: Duration::ZERO,
            last_handshake_time: SystemTime::UNIX_EPOCH,
            receive_bytes: 0,
            transmit_bytes: 0,
            allowed_ips: Vec::new(),
            protocol_version: 0,
        }
    }
}

/// Incremental configuration applied to one device.
///
/// `None` fields are left untouched by the kernel.
#[derive(Debug, Clone, Default)]
pub struct DeviceConfig {
    /// New private key.
    pub private_key: Option<PrivateKey>,
    /// New listen port.
    pub listen_port: Option<u16>,
    /// New firewall mark.
    pub firewall_mark: Option<u32>,
    /// Remove every existing peer before applying `peers`.
    pub replace_peers: bool,
    /// Peer changes.
    pub peers: Vec<PeerConfig>,
}

/// Configuration for one peer inside a [`DeviceConfig`].
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// The peer's public key.
    pub public_key: PublicKey,
    /// Remove the peer instead of configuring it.
    pub remove: bool,
    /// Only update an existing peer; never create one.
    pub update_only: bool,
    /// New preshared key.
    pub preshared_key: Option<PresharedKey>,
    /// New endpoint.
    pub endpoint: Option<SocketAddr>,
    /// New keepalive interval; zero disables.
    pub persistent_keepalive_interval: Option<Duration>,
    /// Clear the allowed IPs before adding `allowed_ips`.
    pub replace_allowed_ips: bool,
    /// Allowed IPs to add.
    pub allowed_ips: Vec<IpNet>,
}

impl PeerConfig {
    /// A config naming only the peer.
    #[must_use]
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            remove: false,
            update_only: false,
            preshared_key: None,
            endpoint: None,
            persistent_keepalive_interval: None,
            replace_allowed_ips: false,
            allowed_ips: Vec::new(),
        }
    }
}

/// Capability to observe and configure `WireGuard` devices.
///
/// Implementations must report an absent device as
/// [`ClientError::NotFound`]. Each call is expected to be a single kernel
/// transaction, safe to issue concurrently with other calls.
pub trait TunnelClient: Send + Sync {
    /// Lists every tunnel device on the host.
    fn devices(&self, ctx: &CallContext) -> Result<Vec<TunnelDevice>, ClientError>;

    /// Fetches one device including its peer table.
    fn device(&self, ctx: &CallContext, name: &str) -> Result<TunnelDevice, ClientError>;

    /// Applies an incremental configuration to a device.
    fn configure_device(&self, ctx: &CallContext, name: &str, config: &DeviceConfig) -> Result<(), ClientError>;
}

impl<T: TunnelClient + ?Sized> TunnelClient for Arc<T> {
    fn devices(&self, ctx: &CallContext) -> Result<Vec<TunnelDevice>, ClientError> {
        (**self).devices(ctx)
    }

    fn device(&self, ctx: &CallContext, name: &str) -> Result<TunnelDevice, ClientError> {
        (**self).device(ctx, name)
    }

    fn configure_device(&self, ctx: &CallContext, name: &str, config: &DeviceConfig) -> Result<(), ClientError> {
        (**self).configure_device(ctx, name, config)
    }
}
