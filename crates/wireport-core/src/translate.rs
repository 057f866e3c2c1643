//! Pure mappings between client-native types and the canonical model.
//!
//! Nothing here talks to the kernel. Zero values the kernel uses as
//! "unset" are mapped to `None` on the way in and omitted on the way out.

use std::time::{Duration, SystemTime};

use ipnet::IpNet;

use crate::error::ReconcileError;
use crate::keys::{KeyPair, PresharedKey, PublicKey};
use crate::link::{Link, OperState};
use crate::model::{Cidr, Endpoint, Interface, InterfaceIdentifier, Peer, PeerIdentifier};
use crate::tunnel::{DeviceConfig, PeerConfig, TunnelDevice, TunnelPeer};

/// Derives administrative state from a link's operational state.
///
/// `WireGuard` links never report `UP`; `UNKNOWN` is their only running
/// state. Everything else is down.
pub fn is_device_up(state: OperState) -> bool {
    state == OperState::Unknown
}

/// Merges a tunnel device with its link into one canonical interface.
pub fn interface_from_parts(
    device: &TunnelDevice,
    link: &Link,
    addresses: &[IpNet],
    import_source: &str,
) -> Interface {
    let key_pair = match (&device.private_key, device.public_key) {
        (Some(private), _) => Some(KeyPair::from_private_key(private.clone())),
        (None, Some(public)) => Some(KeyPair::public_only(public)),
        (None, None) => None,
    };
    let stats = link.statistics.unwrap_or_default();

    Interface {
        identifier: InterfaceIdentifier::new(device.name.clone()),
        key_pair,
        listen_port: device.listen_port,
        addresses: addresses.iter().copied().map(Cidr::from).collect(),
        mtu: link.mtu,
        firewall_mark: device.firewall_mark as i32,
        device_up: is_device_up(link.oper_state),
        device_type: device.device_type.to_string(),
        import_source: import_source.to_string(),
        bytes_upload: stats.tx_bytes,
        bytes_download: stats.rx_bytes,
    }
}

/// Maps a tunnel peer entry to a canonical peer.
pub fn peer_from_tunnel(peer: &TunnelPeer) -> Peer {
    let last_handshake = if peer.last_handshake_time <= SystemTime::UNIX_EPOCH {
        None
    } else {
        Some(peer.last_handshake_time)
    };

    Peer {
        identifier: PeerIdentifier::from(&peer.public_key),
        key_pair: KeyPair::public_only(peer.public_key),
        preshared_key: PresharedKey::from_kernel(&peer.preshared_key),
        endpoint: peer.endpoint.map(Endpoint::new),
        allowed_ips: peer.allowed_ips.iter().copied().map(Cidr::from).collect(),
        persistent_keepalive: u16::try_from(peer.persistent_keepalive_interval.as_secs()).unwrap_or(u16::MAX),
        last_handshake,
        protocol_version: peer.protocol_version,
        bytes_upload: peer.receive_bytes,
        bytes_download: peer.transmit_bytes,
    }
}

/// Builds the device-level configuration for an interface.
///
/// Never touches the peer table.
///
/// # Errors
///
/// Returns `MissingPrivateKey` when the interface carries no private key.
pub fn device_config_for(iface: &Interface) -> Result<DeviceConfig, ReconcileError> {
    let private_key = iface
        .key_pair
        .as_ref()
        .and_then(KeyPair::private_key)
        .cloned()
        .ok_or_else(|| ReconcileError::MissingPrivateKey { interface: iface.identifier.to_string() })?;

    Ok(DeviceConfig {
        private_key: Some(private_key),
        listen_port: (iface.listen_port != 0).then_some(iface.listen_port),
        firewall_mark: (iface.firewall_mark != 0).then_some(iface.firewall_mark as u32),
        replace_peers: false,
        peers: Vec::new(),
    })
}

/// Minimal configuration that creates a peer with only its public key.
pub fn peer_create_config(public_key: &PublicKey) -> DeviceConfig {
    DeviceConfig {
        peers: vec![PeerConfig::new(*public_key)],
        ..DeviceConfig::default()
    }
}

/// Full replacement configuration for one existing peer.
///
/// Sibling peers are never affected: `replace_peers` stays false and
/// `update_only` prevents resurrecting a peer removed concurrently.
pub fn peer_update_config(peer: &Peer) -> DeviceConfig {
    let config = PeerConfig {
        public_key: *peer.public_key(),
        remove: false,
        update_only: true,
        preshared_key: peer.preshared_key.clone(),
        endpoint: peer.endpoint.map(|e| *e.address()),
        persistent_keepalive_interval: Some(Duration::from_secs(u64::from(peer.persistent_keepalive))),
        replace_allowed_ips: true,
        allowed_ips: peer.allowed_ips.iter().copied().map(IpNet::from).collect(),
    };

    DeviceConfig {
        peers: vec![config],
        ..DeviceConfig::default()
    }
}

/// Configuration removing a single peer.
pub fn peer_remove_config(public_key: &PublicKey) -> DeviceConfig {
    let mut config = PeerConfig::new(*public_key);
    config.remove = true;
    DeviceConfig {
        peers: vec![config],
        ..DeviceConfig::default()
    }
}
