//! Canonical interface and peer entities.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::SystemTime;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::error::{EntityKind, ReconcileError};
use crate::keys::{KeyPair, PresharedKey, PublicKey};

/// Longest link name the kernel accepts (`IFNAMSIZ - 1`).
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Name of a tunnel interface; also its kernel link name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterfaceIdentifier(String);

impl InterfaceIdentifier {
    /// Wraps a name without validating it.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks that the name is usable as a kernel link name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentifier` describing the first violated rule.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        let reason = if self.0.is_empty() {
            "name is empty"
        } else if self.0.len() > MAX_INTERFACE_NAME_LEN {
            "name longer than 15 bytes"
        } else if self.0 == "." || self.0 == ".." {
            "name is a path component"
        } else if self.0.chars().any(|c| c.is_whitespace() || c == '/' || c == ':') {
            "name contains whitespace, '/' or ':'"
        } else {
            return Ok(());
        };
        Err(ReconcileError::invalid(EntityKind::Interface, &self.0, reason))
    }
}

impl fmt::Display for InterfaceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InterfaceIdentifier {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for InterfaceIdentifier {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a peer: its public key in base64.
///
/// Arbitrary strings can be wrapped; the reconciler rejects anything that
/// is not a public key before touching the kernel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerIdentifier(String);

impl PeerIdentifier {
    /// Wraps a string without validating it.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier parses as a public key.
    pub fn is_public_key(&self) -> bool {
        crate::keys::is_public_key(&self.0)
    }

    /// Parses the identifier as a public key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentifier` if it is not a base64 32-byte key.
    pub fn to_public_key(&self) -> Result<PublicKey, ReconcileError> {
        PublicKey::from_base64(&self.0)
            .map_err(|e| ReconcileError::invalid(EntityKind::Peer, &self.0, e.to_string()))
    }
}

impl fmt::Display for PeerIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerIdentifier {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PeerIdentifier {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&PublicKey> for PeerIdentifier {
    fn from(key: &PublicKey) -> Self {
        Self(key.to_base64())
    }
}

/// An IP address with prefix length in CIDR notation.
///
/// Host bits are preserved, so `10.0.0.1/24` stays an interface address
/// rather than collapsing to its network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cidr(IpNet);

impl Cidr {
    /// Creates a new CIDR from an `IpNet`.
    #[must_use]
    pub const fn new(network: IpNet) -> Self {
        Self(network)
    }

    /// Returns the underlying network.
    #[must_use]
    pub const fn network(&self) -> &IpNet {
        &self.0
    }

    /// Returns the address part.
    #[must_use]
    pub fn addr(&self) -> IpAddr {
        self.0.addr()
    }

    /// Returns the prefix length.
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.0.prefix_len()
    }
}

impl FromStr for Cidr {
    type Err = ipnet::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<IpNet>().map(Self)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<IpNet> for Cidr {
    fn from(net: IpNet) -> Self {
        Self(net)
    }
}

impl From<Cidr> for IpNet {
    fn from(cidr: Cidr) -> Self {
        cidr.0
    }
}

/// A `WireGuard` peer endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    /// Creates a new endpoint from a socket address.
    #[must_use]
    pub const fn new(address: SocketAddr) -> Self {
        Self(address)
    }

    /// Returns the socket address.
    #[must_use]
    pub const fn address(&self) -> &SocketAddr {
        &self.0
    }
}

impl FromStr for Endpoint {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<SocketAddr>().map(Self)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical view of one tunnel device.
///
/// Always merged from both subsystems when read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Interface name, the join key across both subsystems.
    pub identifier: InterfaceIdentifier,
    /// Key pair; `None` until a private key has been configured.
    pub key_pair: Option<KeyPair>,
    /// UDP listen port, 0 if unset.
    pub listen_port: u16,
    /// Addresses; the first is applied with replace, the rest with add.
    pub addresses: Vec<Cidr>,
    /// MTU; 0 leaves the current value on write.
    pub mtu: u32,
    /// Firewall mark, 0 if unset.
    pub firewall_mark: i32,
    /// Administrative state.
    pub device_up: bool,
    /// Backing tunnel implementation.
    pub device_type: String,
    /// Where this view was read from.
    pub import_source: String,
    /// Bytes sent, from the link counters.
    pub bytes_upload: u64,
    /// Bytes received, from the link counters.
    pub bytes_download: u64,
}

impl Interface {
    /// A blank interface carrying only its identifier.
    #[must_use]
    pub fn new(identifier: InterfaceIdentifier) -> Self {
        Self {
            identifier,
            key_pair: None,
            listen_port: 0,
            addresses: Vec::new(),
            mtu: 0,
            firewall_mark: 0,
            device_up: false,
            device_type: String::new(),
            import_source: String::new(),
            bytes_upload: 0,
            bytes_download: 0,
        }
    }

    /// Returns the public key if a key pair is configured.
    pub fn public_key(&self) -> Option<&PublicKey> {
        self.key_pair.as_ref().map(|kp| &kp.public_key)
    }
}

/// Canonical view of one peer of a tunnel device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// The peer's public key as text; its only stable handle.
    pub identifier: PeerIdentifier,
    /// Public key only; peers are remote.
    pub key_pair: KeyPair,
    /// Preshared key, `None` when unset.
    #[serde(default, skip_serializing)]
    pub preshared_key: Option<PresharedKey>,
    /// Endpoint, `None` when unset.
    pub endpoint: Option<Endpoint>,
    /// Allowed IPs; a write always replaces the whole set.
    pub allowed_ips: Vec<Cidr>,
    /// Keepalive interval in seconds, 0 when disabled.
    pub persistent_keepalive: u16,
    /// Last handshake, `None` if none has happened.
    pub last_handshake: Option<SystemTime>,
    /// Negotiated protocol version.
    pub protocol_version: u32,
    /// Bytes the peer sent to us.
    pub bytes_upload: u64,
    /// Bytes we sent to the peer.
    pub bytes_download: u64,
}

impl Peer {
    /// A blank peer for the given public key.
    #[must_use]
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            identifier: PeerIdentifier::from(&public_key),
            key_pair: KeyPair::public_only(public_key),
            preshared_key: None,
            endpoint: None,
            allowed_ips: Vec::new(),
            persistent_keepalive: 0,
            last_handshake: None,
            protocol_version: 0,
            bytes_upload: 0,
            bytes_download: 0,
        }
    }

    /// Returns the peer's public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.key_pair.public_key
    }
}
