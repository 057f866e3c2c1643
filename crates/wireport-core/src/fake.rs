//! In-memory kernel for tests.
//!
//! [`FakeKernel`] implements both [`TunnelClient`] and [`LinkClient`] over one
//! shared state, so adding a `wireguard` link also creates its tunnel device
//! the way the real kernel does. Every call is recorded in an ordered journal
//! and any operation can be made to fail.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use ipnet::IpNet;
use parking_lot::Mutex;

use crate::client::{CallContext, ClientError};
use crate::keys::PublicKey;
use crate::link::{Link, LinkClient, LinkStatistics, OperState};
use crate::tunnel::{DeviceConfig, PeerConfig, TunnelClient, TunnelDevice, TunnelDeviceType, TunnelPeer};

/// MTU the kernel assigns to a new `WireGuard` link.
pub const DEFAULT_LINK_MTU: u32 = 1420;

/// Client operations, used to target failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    /// `TunnelClient::devices`.
    Devices,
    /// `TunnelClient::device`.
    Device,
    /// `TunnelClient::configure_device`.
    ConfigureDevice,
    /// `LinkClient::link_by_name`.
    LinkByName,
    /// `LinkClient::link_add`.
    LinkAdd,
    /// `LinkClient::link_set_mtu`.
    LinkSetMtu,
    /// `LinkClient::addr_replace`.
    AddrReplace,
    /// `LinkClient::addr_add`.
    AddrAdd,
    /// `LinkClient::addr_del`.
    AddrDel,
    /// `LinkClient::addr_list`.
    AddrList,
    /// `LinkClient::link_set_up`.
    LinkSetUp,
    /// `LinkClient::link_set_down`.
    LinkSetDown,
}

/// One recorded client call.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub enum KernelCall {
    Devices,
    Device { name: String },
    ConfigureDevice { name: String, config: DeviceConfig },
    LinkByName { name: String },
    LinkAdd { name: String, kind: String },
    LinkSetMtu { name: String, mtu: u32 },
    AddrReplace { name: String, addr: IpNet },
    AddrAdd { name: String, addr: IpNet },
    AddrDel { name: String, addr: IpNet },
    AddrList { name: String },
    LinkSetUp { name: String },
    LinkSetDown { name: String },
}

impl KernelCall {
    /// The operation this call belongs to.
    pub fn op(&self) -> FakeOp {
        match self {
            Self::Devices => FakeOp::Devices,
            Self::Device { .. } => FakeOp::Device,
            Self::ConfigureDevice { .. } => FakeOp::ConfigureDevice,
            Self::LinkByName { .. } => FakeOp::LinkByName,
            Self::LinkAdd { .. } => FakeOp::LinkAdd,
            Self::LinkSetMtu { .. } => FakeOp::LinkSetMtu,
            Self::AddrReplace { .. } => FakeOp::AddrReplace,
            Self::AddrAdd { .. } => FakeOp::AddrAdd,
            Self::AddrDel { .. } => FakeOp::AddrDel,
            Self::AddrList { .. } => FakeOp::AddrList,
            Self::LinkSetUp { .. } => FakeOp::LinkSetUp,
            Self::LinkSetDown { .. } => FakeOp::LinkSetDown,
        }
    }

    /// Returns true if the call mutates kernel state.
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            Self::Devices | Self::Device { .. } | Self::LinkByName { .. } | Self::AddrList { .. }
        )
    }
}

#[derive(Debug, Clone)]
struct FakeLink {
    link: Link,
    addresses: Vec<IpNet>,
}

#[derive(Debug, Default)]
struct FakeState {
    links: BTreeMap<String, FakeLink>,
    devices: BTreeMap<String, TunnelDevice>,
    journal: Vec<KernelCall>,
    failures: HashMap<FakeOp, String>,
    next_index: u32,
}

impl FakeState {
    /// Records the call, then returns the injected failure for it, if any.
    fn record(&mut self, call: KernelCall) -> Result<(), ClientError> {
        let op = call.op();
        self.journal.push(call);
        match self.failures.get(&op) {
            Some(msg) => Err(ClientError::Kernel(msg.clone())),
            None => Ok(()),
        }
    }

    fn insert_link(&mut self, name: &str, kind: &str) {
        self.next_index += 1;
        let link = Link {
            name: name.to_string(),
            index: self.next_index,
            kind: Some(kind.to_string()),
            mtu: DEFAULT_LINK_MTU,
            oper_state: OperState::Down,
            statistics: Some(LinkStatistics::default()),
        };
        self.links.insert(name.to_string(), FakeLink { link, addresses: Vec::new() });
    }

    fn link_mut(&mut self, name: &str) -> Result<&mut FakeLink, ClientError> {
        self.links
            .get_mut(name)
            .ok_or_else(|| ClientError::NotFound(format!("link {name}")))
    }

    fn device_mut(&mut self, name: &str) -> Result<&mut TunnelDevice, ClientError> {
        self.devices
            .get_mut(name)
            .ok_or_else(|| ClientError::NotFound(format!("device {name}")))
    }

    fn peer_mut(&mut self, name: &str, key: &PublicKey) -> Result<&mut TunnelPeer, ClientError> {
        self.device_mut(name)?
            .peers
            .iter_mut()
            .find(|p| &p.public_key == key)
            .ok_or_else(|| ClientError::NotFound(format!("peer {}", key.short())))
    }
}

fn new_device(name: &str) -> TunnelDevice {
    TunnelDevice {
        name: name.to_string(),
        device_type: TunnelDeviceType::LinuxKernel,
        ..TunnelDevice::default()
    }
}

fn apply_peer(device: &mut TunnelDevice, config: &PeerConfig) {
    if config.remove {
        device.peers.retain(|p| p.public_key != config.public_key);
        return;
    }

    let idx = match device.peers.iter().position(|p| p.public_key == config.public_key) {
        Some(idx) => idx,
        // The kernel silently skips update-only entries for unknown peers.
        None if config.update_only => return,
        None => {
            device.peers.push(TunnelPeer::new(config.public_key));
            device.peers.len() - 1
        }
    };
    let peer = &mut device.peers[idx];

    if let Some(psk) = &config.preshared_key {
        peer.preshared_key = *psk.as_bytes();
    }
    if let Some(endpoint) = config.endpoint {
        peer.endpoint = Some(endpoint);
    }
    if let Some(keepalive) = config.persistent_keepalive_interval {
        peer.persistent_keepalive_interval = keepalive;
    }
    if config.replace_allowed_ips {
        peer.allowed_ips.clear();
    }
    for net in &config.allowed_ips {
        if !peer.allowed_ips.contains(net) {
            peer.allowed_ips.push(*net);
        }
    }
}

/// A shared in-memory kernel.
///
/// Clones share state, so one handle can be given to a reconciler as both
/// clients while the test keeps another for inspection.
#[derive(Debug, Clone, Default)]
pub struct FakeKernel {
    state: Arc<Mutex<FakeState>>,
}

impl FakeKernel {
    /// Creates an empty kernel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every future call of `op` fail with a kernel error.
    pub fn fail_on(&self, op: FakeOp, message: impl Into<String>) {
        self.state.lock().failures.insert(op, message.into());
    }

    /// Removes every injected failure.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<KernelCall> {
        self.state.lock().journal.clone()
    }

    /// Every mutating call made so far, in order.
    pub fn writes(&self) -> Vec<KernelCall> {
        self.state.lock().journal.iter().filter(|c| c.is_write()).cloned().collect()
    }

    /// Forgets recorded calls.
    pub fn clear_journal(&self) {
        self.state.lock().journal.clear();
    }

    /// Adds a `wireguard` link and its device without recording a call.
    pub fn add_interface(&self, name: &str) {
        let mut state = self.state.lock();
        state.insert_link(name, "wireguard");
        state.devices.insert(name.to_string(), new_device(name));
    }

    /// Adds a tunnel device with no link behind it.
    pub fn insert_device_without_link(&self, name: &str) {
        self.state.lock().devices.insert(name.to_string(), new_device(name));
    }

    /// Adds a link of the given kind with no tunnel device.
    pub fn insert_link_without_device(&self, name: &str, kind: &str) {
        self.state.lock().insert_link(name, kind);
    }

    /// Deletes a link and its device, as `ip link del` would.
    pub fn remove_interface(&self, name: &str) {
        let mut state = self.state.lock();
        state.links.remove(name);
        state.devices.remove(name);
    }

    /// Current device state, if present.
    pub fn device_snapshot(&self, name: &str) -> Option<TunnelDevice> {
        self.state.lock().devices.get(name).cloned()
    }

    /// Current link state and addresses, if present.
    pub fn link_snapshot(&self, name: &str) -> Option<(Link, Vec<IpNet>)> {
        self.state
            .lock()
            .links
            .get(name)
            .map(|l| (l.link.clone(), l.addresses.clone()))
    }

    /// Adds to a link's counters.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the link does not exist.
    pub fn simulate_traffic(&self, name: &str, rx_bytes: u64, tx_bytes: u64) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        let link = state.link_mut(name)?;
        let stats = link.link.statistics.get_or_insert_with(LinkStatistics::default);
        stats.rx_bytes = stats.rx_bytes.saturating_add(rx_bytes);
        stats.tx_bytes = stats.tx_bytes.saturating_add(tx_bytes);
        Ok(())
    }

    /// Adds to a peer's counters.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the device or peer does not exist.
    pub fn simulate_peer_traffic(
        &self,
        name: &str,
        public_key: &PublicKey,
        receive_bytes: u64,
        transmit_bytes: u64,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        let peer = state.peer_mut(name, public_key)?;
        peer.receive_bytes = peer.receive_bytes.saturating_add(receive_bytes);
        peer.transmit_bytes = peer.transmit_bytes.saturating_add(transmit_bytes);
        Ok(())
    }

    /// Records a handshake with a peer at `secs` after the epoch.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the device or peer does not exist.
    pub fn simulate_handshake(&self, name: &str, public_key: &PublicKey, secs: u64) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        let peer = state.peer_mut(name, public_key)?;
        peer.last_handshake_time = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);
        peer.protocol_version = 1;
        Ok(())
    }
}

impl TunnelClient for FakeKernel {
    fn devices(&self, _ctx: &CallContext) -> Result<Vec<TunnelDevice>, ClientError> {
        let mut state = self.state.lock();
        state.record(KernelCall::Devices)?;
        Ok(state.devices.values().cloned().collect())
    }

    fn device(&self, _ctx: &CallContext, name: &str) -> Result<TunnelDevice, ClientError> {
        let mut state = self.state.lock();
        state.record(KernelCall::Device { name: name.to_string() })?;
        state
            .devices
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("device {name}")))
    }

    fn configure_device(&self, _ctx: &CallContext, name: &str, config: &DeviceConfig) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.record(KernelCall::ConfigureDevice { name: name.to_string(), config: config.clone() })?;
        let device = state.device_mut(name)?;

        if let Some(private) = &config.private_key {
            device.public_key = Some(private.public_key());
            device.private_key = Some(private.clone());
        }
        if let Some(port) = config.listen_port {
            device.listen_port = port;
        }
        if let Some(mark) = config.firewall_mark {
            device.firewall_mark = mark;
        }
        if config.replace_peers {
            device.peers.clear();
        }
        for peer in &config.peers {
            apply_peer(device, peer);
        }
        Ok(())
    }
}

impl LinkClient for FakeKernel {
    fn link_by_name(&self, _ctx: &CallContext, name: &str) -> Result<Link, ClientError> {
        let mut state = self.state.lock();
        state.record(KernelCall::LinkByName { name: name.to_string() })?;
        state.link_mut(name).map(|l| l.link.clone())
    }

    fn link_add(&self, _ctx: &CallContext, name: &str, kind: &str) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.record(KernelCall::LinkAdd { name: name.to_string(), kind: kind.to_string() })?;
        if state.links.contains_key(name) {
            return Err(ClientError::Kernel(format!("link {name} already exists")));
        }
        state.insert_link(name, kind);
        if kind == "wireguard" {
            state.devices.insert(name.to_string(), new_device(name));
        }
        Ok(())
    }

    fn link_set_mtu(&self, _ctx: &CallContext, link: &Link, mtu: u32) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.record(KernelCall::LinkSetMtu { name: link.name.clone(), mtu })?;
        state.link_mut(&link.name)?.link.mtu = mtu;
        Ok(())
    }

    fn addr_replace(&self, _ctx: &CallContext, link: &Link, addr: &IpNet) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.record(KernelCall::AddrReplace { name: link.name.clone(), addr: *addr })?;
        let entry = state.link_mut(&link.name)?;
        if !entry.addresses.contains(addr) {
            entry.addresses.push(*addr);
        }
        Ok(())
    }

    fn addr_add(&self, _ctx: &CallContext, link: &Link, addr: &IpNet) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.record(KernelCall::AddrAdd { name: link.name.clone(), addr: *addr })?;
        let entry = state.link_mut(&link.name)?;
        if entry.addresses.contains(addr) {
            return Err(ClientError::Kernel(format!("address {addr} already assigned")));
        }
        entry.addresses.push(*addr);
        Ok(())
    }

    fn addr_del(&self, _ctx: &CallContext, link: &Link, addr: &IpNet) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.record(KernelCall::AddrDel { name: link.name.clone(), addr: *addr })?;
        let entry = state.link_mut(&link.name)?;
        let before = entry.addresses.len();
        entry.addresses.retain(|a| a != addr);
        if entry.addresses.len() == before {
            return Err(ClientError::Kernel(format!("address {addr} not assigned")));
        }
        Ok(())
    }

    fn addr_list(&self, _ctx: &CallContext, link: &Link) -> Result<Vec<IpNet>, ClientError> {
        let mut state = self.state.lock();
        state.record(KernelCall::AddrList { name: link.name.clone() })?;
        state.link_mut(&link.name).map(|l| l.addresses.clone())
    }

    fn link_set_up(&self, _ctx: &CallContext, link: &Link) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.record(KernelCall::LinkSetUp { name: link.name.clone() })?;
        // WireGuard links have no carrier and report UNKNOWN once up.
        state.link_mut(&link.name)?.link.oper_state = OperState::Unknown;
        Ok(())
    }

    fn link_set_down(&self, _ctx: &CallContext, link: &Link) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.record(KernelCall::LinkSetDown { name: link.name.clone() })?;
        state.link_mut(&link.name)?.link.oper_state = OperState::Down;
        Ok(())
    }
}
