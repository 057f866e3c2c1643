//! Linux kernel `WireGuard` tunnel client using generic netlink.
//!
//! Wraps `wireguard-uapi` to implement [`TunnelClient`] against the
//! in-kernel module. Needs `CAP_NET_ADMIN`; without it the kernel withholds
//! private keys and rejects every write.

use std::net::IpAddr;
use std::time::{Duration, SystemTime};

use ipnet::IpNet;
use parking_lot::Mutex;
use tracing::debug;
use wireguard_uapi::set::{WgDeviceF, WgPeerF};
use wireguard_uapi::{get, set, DeviceInterface, RouteSocket, WgSocket};

use crate::client::{CallContext, ClientError};
use crate::keys::{PresharedKey, PrivateKey, PublicKey};
use crate::tunnel::{DeviceConfig, PeerConfig, TunnelClient, TunnelDevice, TunnelDeviceType, TunnelPeer};

fn kernel_err(op: &str, e: impl std::fmt::Display) -> ClientError {
    ClientError::Kernel(format!("{op}: {e}"))
}

/// Tunnel client for the in-kernel `WireGuard` module.
///
/// Both netlink sockets are opened once and serialized behind mutexes.
pub struct KernelTunnelClient {
    wg: Mutex<WgSocket>,
    route: Mutex<RouteSocket>,
}

impl std::fmt::Debug for KernelTunnelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelTunnelClient").finish_non_exhaustive()
    }
}

impl KernelTunnelClient {
    /// Opens the generic netlink and route sockets.
    ///
    /// # Errors
    ///
    /// Returns `Kernel` if either socket cannot be opened, typically because
    /// the `wireguard` module is not loaded.
    pub fn connect() -> Result<Self, ClientError> {
        let wg = WgSocket::connect().map_err(|e| kernel_err("connect wireguard socket", e))?;
        let route = RouteSocket::connect().map_err(|e| kernel_err("connect route socket", e))?;
        Ok(Self { wg: Mutex::new(wg), route: Mutex::new(route) })
    }

    fn device_names(&self) -> Result<Vec<String>, ClientError> {
        self.route
            .lock()
            .list_device_names()
            .map_err(|e| kernel_err("list devices", e))
    }

    fn fetch(&self, name: &str) -> Result<TunnelDevice, ClientError> {
        let raw = self
            .wg
            .lock()
            .get_device(DeviceInterface::from_name(name))
            .map_err(|e| kernel_err("get device", e))?;
        from_kernel_device(raw)
    }
}

fn from_kernel_device(raw: get::Device) -> Result<TunnelDevice, ClientError> {
    let peers = raw.peers.into_iter().map(from_kernel_peer).collect::<Result<Vec<_>, _>>()?;

    Ok(TunnelDevice {
        name: raw.ifname,
        device_type: TunnelDeviceType::LinuxKernel,
        private_key: raw.private_key.map(PrivateKey::from_bytes_array),
        public_key: raw.public_key.map(PublicKey::from_bytes_array),
        listen_port: raw.listen_port,
        firewall_mark: raw.fwmark,
        peers,
    })
}

fn from_kernel_peer(raw: get::Peer) -> Result<TunnelPeer, ClientError> {
    let allowed_ips = raw
        .allowed_ips
        .iter()
        .map(|a| IpNet::new(a.ipaddr, a.cidr_mask).map_err(|e| ClientError::parse("allowed ip", e)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TunnelPeer {
        public_key: PublicKey::from_bytes_array(raw.public_key),
        preshared_key: raw.preshared_key,
        endpoint: raw.endpoint,
        persistent_keepalive_interval: Duration::from_secs(u64::from(raw.persistent_keepalive_interval)),
        last_handshake_time: SystemTime::UNIX_EPOCH + raw.last_handshake_time,
        receive_bytes: raw.rx_bytes,
        transmit_bytes: raw.tx_bytes,
        allowed_ips,
        protocol_version: raw.protocol_version,
    })
}

fn to_kernel_peer<'a>(config: &'a PeerConfig, allowed: &'a [(IpAddr, u8)]) -> set::Peer<'a> {
    let mut flags = Vec::new();
    if config.remove {
        flags.push(WgPeerF::RemoveMe);
    }
    if config.update_only {
        flags.push(WgPeerF::UpdateOnly);
    }
    if config.replace_allowed_ips {
        flags.push(WgPeerF::ReplaceAllowedIps);
    }

    let mut peer = set::Peer::from_public_key(config.public_key.as_bytes()).flags(flags);
    if let Some(psk) = config.preshared_key.as_ref().map(PresharedKey::as_bytes) {
        peer = peer.preshared_key(psk);
    }
    if let Some(endpoint) = config.endpoint.as_ref() {
        peer = peer.endpoint(endpoint);
    }
    if let Some(keepalive) = config.persistent_keepalive_interval {
        peer = peer.persistent_keepalive_interval(u16::try_from(keepalive.as_secs()).unwrap_or(u16::MAX));
    }
    peer.allowed_ips(
        allowed
            .iter()
            .map(|(ipaddr, mask)| set::AllowedIp { ipaddr, cidr_mask: Some(*mask) })
            .collect(),
    )
}

impl TunnelClient for KernelTunnelClient {
    fn devices(&self, ctx: &CallContext) -> Result<Vec<TunnelDevice>, ClientError> {
        let names = self.device_names()?;
        debug!(count = names.len(), operation = ctx.operation(), "listed wireguard devices");
        names.iter().map(|name| self.fetch(name)).collect()
    }

    fn device(&self, _ctx: &CallContext, name: &str) -> Result<TunnelDevice, ClientError> {
        if !self.device_names()?.iter().any(|n| n == name) {
            return Err(ClientError::NotFound(format!("device {name}")));
        }
        self.fetch(name)
    }

    fn configure_device(&self, _ctx: &CallContext, name: &str, config: &DeviceConfig) -> Result<(), ClientError> {
        let allowed: Vec<Vec<(IpAddr, u8)>> = config
            .peers
            .iter()
            .map(|p| p.allowed_ips.iter().map(|n| (n.addr(), n.prefix_len())).collect())
            .collect();
        let peers = config
            .peers
            .iter()
            .zip(&allowed)
            .map(|(pc, ips)| to_kernel_peer(pc, ips))
            .collect();

        let mut device = set::Device::from_ifname(name).peers(peers);
        if config.replace_peers {
            device = device.flags(vec![WgDeviceF::ReplacePeers]);
        }
        if let Some(private) = config.private_key.as_ref() {
            device = device.private_key(private.as_bytes());
        }
        if let Some(port) = config.listen_port {
            device = device.listen_port(port);
        }
        if let Some(mark) = config.firewall_mark {
            device = device.fwmark(mark);
        }

        self.wg.lock().set_device(device).map_err(|e| kernel_err("set device", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iproute::IpLinkClient;
    use crate::keys::KeyPair;
    use crate::model::{InterfaceIdentifier, PeerIdentifier};
    use crate::reconciler::Reconciler;

    // Run with: sudo cargo test -p wireport-core --features linux -- --ignored

    fn delete_link(name: &str) {
        let _ = std::process::Command::new("/sbin/ip").args(["link", "del", "dev", name]).status();
    }

    fn reconciler() -> Reconciler<KernelTunnelClient, IpLinkClient> {
        Reconciler::new(KernelTunnelClient::connect().expect("connect"), IpLinkClient::default())
    }

    #[test]
    #[ignore = "requires root and WireGuard kernel module"]
    fn kernel_save_and_read_interface() {
        let rec = reconciler();
        let ctx = CallContext::background();
        let id = InterfaceIdentifier::from("wprtest0");

        rec.save_interface(&ctx, &id, |mut iface| {
            iface.key_pair = Some(KeyPair::generate());
            iface.listen_port = 51999;
            iface.mtu = 1420;
            iface.addresses = vec!["10.213.0.1/24".parse().expect("cidr")];
            iface.device_up = true;
            Ok::<_, std::convert::Infallible>(iface)
        })
        .expect("save");

        let iface = rec.get_interface(&ctx, &id).expect("get");
        assert_eq!(iface.listen_port, 51999);
        assert_eq!(iface.addresses[0].to_string(), "10.213.0.1/24");
        assert!(iface.device_up);
        assert_eq!(iface.device_type, "linux_kernel");

        delete_link("wprtest0");
    }

    #[test]
    #[ignore = "requires root and WireGuard kernel module"]
    fn kernel_peer_lifecycle() {
        let rec = reconciler();
        let ctx = CallContext::background();
        let id = InterfaceIdentifier::from("wprtest1");
        rec.save_interface(&ctx, &id, |mut iface| {
            iface.key_pair = Some(KeyPair::generate());
            Ok::<_, std::convert::Infallible>(iface)
        })
        .expect("save interface");

        let peer_key = PrivateKey::generate().public_key();
        let peer_id = PeerIdentifier::from(&peer_key);
        rec.save_peer(&ctx, &id, &peer_id, |mut peer| {
            peer.allowed_ips = vec!["10.213.1.2/32".parse().expect("cidr")];
            peer.persistent_keepalive = 25;
            Ok::<_, std::convert::Infallible>(peer)
        })
        .expect("save peer");

        let peer = rec.get_peer(&ctx, &id, &peer_id).expect("get peer");
        assert_eq!(peer.persistent_keepalive, 25);
        assert!(peer.preshared_key.is_none());

        rec.delete_peer(&ctx, &id, &peer_id).expect("delete");
        assert!(rec.get_peer(&ctx, &id, &peer_id).expect_err("gone").is_not_found());

        delete_link("wprtest1");
    }

    #[test]
    #[ignore = "requires root and WireGuard kernel module"]
    fn kernel_missing_device_is_not_found() {
        let client = KernelTunnelClient::connect().expect("connect");
        let err = client.device(&CallContext::background(), "wprnone").expect_err("missing");
        assert!(err.is_not_found());
    }
}
