//! Reconciler: one consistent view over the tunnel and link subsystems.
//!
//! Reads merge both clients into canonical entities. Writes follow
//! get-or-create-then-update: read the current state (creating the entity
//! first if absent), apply a caller-supplied transform, then push the result
//! to the link client first and the tunnel client second.
//!
//! No locking is done here. Two concurrent saves of the same entity may
//! interleave at the kernel level; callers that need atomicity serialize
//! per interface or per peer. A failed save leaves the entity in an
//! unknown intermediate state and must be re-read before retrying.

use ipnet::IpNet;
use tracing::{debug, info, warn};

use crate::client::{CallContext, ClientError};
use crate::config::WireportConfig;
use crate::error::{BoxError, EntityKind, ReconcileError, Result};
use crate::keys::PublicKey;
use crate::link::{Link, LinkClient};
use crate::model::{Interface, InterfaceIdentifier, Peer, PeerIdentifier};
use crate::translate;
use crate::tunnel::{TunnelClient, TunnelDevice};

/// Reconciles canonical interfaces and peers onto kernel state.
///
/// Holds long-lived client handles and no cached state: every read goes to
/// the kernel.
#[derive(Debug, Clone)]
pub struct Reconciler<T, L> {
    tunnel: T,
    link: L,
    link_kind: String,
    import_source: String,
}

impl<T: TunnelClient, L: LinkClient> Reconciler<T, L> {
    /// Creates a reconciler with default settings.
    pub fn new(tunnel: T, link: L) -> Self {
        Self::with_config(tunnel, link, &WireportConfig::default())
    }

    /// Creates a reconciler using the link kind and import source from `config`.
    pub fn with_config(tunnel: T, link: L, config: &WireportConfig) -> Self {
        Self {
            tunnel,
            link,
            link_kind: config.link.kind.clone(),
            import_source: config.reconciler.import_source.clone(),
        }
    }

    /// Returns the tunnel client.
    pub fn tunnel_client(&self) -> &T {
        &self.tunnel
    }

    /// Returns the link client.
    pub fn link_client(&self) -> &L {
        &self.link
    }

    /// Lists every tunnel interface, merged with its link data.
    ///
    /// A single merge failure fails the whole list.
    pub fn list_interfaces(&self, ctx: &CallContext) -> Result<Vec<Interface>> {
        let devices = self
            .tunnel
            .devices(ctx)
            .map_err(|source| ReconcileError::Enumeration { source })?;

        devices.iter().map(|device| self.merge(ctx, device)).collect()
    }

    /// Reads one interface.
    pub fn get_interface(&self, ctx: &CallContext, id: &InterfaceIdentifier) -> Result<Interface> {
        id.validate()?;
        let device = self.device(ctx, id)?;
        self.merge(ctx, &device)
    }

    /// Lists the peers of an interface.
    pub fn list_peers(&self, ctx: &CallContext, interface: &InterfaceIdentifier) -> Result<Vec<Peer>> {
        interface.validate()?;
        let device = self.device(ctx, interface)?;
        Ok(device.peers.iter().map(translate::peer_from_tunnel).collect())
    }

    /// Reads one peer of an interface.
    pub fn get_peer(&self, ctx: &CallContext, interface: &InterfaceIdentifier, id: &PeerIdentifier) -> Result<Peer> {
        let public_key = Self::validate_peer(interface, id)?;
        self.find_peer(ctx, interface, &public_key)
    }

    /// Creates or updates an interface.
    ///
    /// `transform` receives the current state (freshly created if the
    /// interface did not exist) and returns the desired state. Its error is
    /// surfaced as [`ReconcileError::Transform`] and nothing is written.
    pub fn save_interface<F, E>(&self, ctx: &CallContext, id: &InterfaceIdentifier, transform: F) -> Result<()>
    where
        F: FnOnce(Interface) -> std::result::Result<Interface, E>,
        E: Into<BoxError>,
    {
        id.validate()?;
        let current = self.get_or_create_interface(ctx, id)?;

        let desired = transform(current).map_err(|e| ReconcileError::Transform {
            kind: EntityKind::Interface,
            id: id.to_string(),
            source: e.into(),
        })?;
        if &desired.identifier != id {
            return Err(ReconcileError::invalid(
                EntityKind::Interface,
                &desired.identifier,
                format!("transform renamed interface {id}"),
            ));
        }

        // Rejects a missing private key before any write is issued.
        let device_config = translate::device_config_for(&desired)?;

        self.update_link(ctx, &desired).inspect_err(|e| {
            warn!(interface = %id, error = %e, "link stage of interface save failed");
        })?;

        debug!(interface = %id, "configuring tunnel device");
        self.tunnel
            .configure_device(ctx, id.as_str(), &device_config)
            .map_err(|source| {
                warn!(interface = %id, error = %source, "tunnel stage of interface save failed");
                ReconcileError::TunnelUpdate { kind: EntityKind::Interface, id: id.to_string(), source }
            })
    }

    /// Creates or updates one peer of an interface.
    ///
    /// Only this peer is pushed; sibling peers are never touched.
    pub fn save_peer<F, E>(
        &self,
        ctx: &CallContext,
        interface: &InterfaceIdentifier,
        id: &PeerIdentifier,
        transform: F,
    ) -> Result<()>
    where
        F: FnOnce(Peer) -> std::result::Result<Peer, E>,
        E: Into<BoxError>,
    {
        let public_key = Self::validate_peer(interface, id)?;
        let current = self.get_or_create_peer(ctx, interface, &public_key)?;

        let desired = transform(current).map_err(|e| ReconcileError::Transform {
            kind: EntityKind::Peer,
            id: id.to_string(),
            source: e.into(),
        })?;
        if desired.public_key() != &public_key {
            return Err(ReconcileError::invalid(
                EntityKind::Peer,
                desired.public_key(),
                format!("transform changed the key of peer {}", public_key.short()),
            ));
        }

        debug!(interface = %interface, peer = %public_key.short(), "updating peer");
        self.tunnel
            .configure_device(ctx, interface.as_str(), &translate::peer_update_config(&desired))
            .map_err(|source| ReconcileError::TunnelUpdate { kind: EntityKind::Peer, id: id.to_string(), source })
    }

    /// Removes one peer of an interface.
    ///
    /// Removing a peer that does not exist succeeds as far as the kernel
    /// does; whatever the tunnel client reports is surfaced.
    pub fn delete_peer(&self, ctx: &CallContext, interface: &InterfaceIdentifier, id: &PeerIdentifier) -> Result<()> {
        let public_key = Self::validate_peer(interface, id)?;

        self.tunnel
            .configure_device(ctx, interface.as_str(), &translate::peer_remove_config(&public_key))
            .map_err(|source| ReconcileError::TunnelUpdate { kind: EntityKind::Peer, id: id.to_string(), source })?;

        info!(interface = %interface, peer = %public_key.short(), "removed peer");
        Ok(())
    }

    fn validate_peer(interface: &InterfaceIdentifier, id: &PeerIdentifier) -> Result<PublicKey> {
        interface.validate()?;
        id.to_public_key()
    }

    fn device(&self, ctx: &CallContext, id: &InterfaceIdentifier) -> Result<TunnelDevice> {
        self.tunnel.device(ctx, id.as_str()).map_err(|source| {
            if source.is_not_found() {
                ReconcileError::not_found(EntityKind::Interface, id)
            } else {
                ReconcileError::TunnelQuery { interface: id.to_string(), source }
            }
        })
    }

    fn merge(&self, ctx: &CallContext, device: &TunnelDevice) -> Result<Interface> {
        let merge_err = |source: ClientError| ReconcileError::Merge { interface: device.name.clone(), source };

        let link = self.link.link_by_name(ctx, &device.name).map_err(merge_err)?;
        let addresses = self.link.addr_list(ctx, &link).map_err(merge_err)?;

        Ok(translate::interface_from_parts(device, &link, &addresses, &self.import_source))
    }

    fn find_peer(&self, ctx: &CallContext, interface: &InterfaceIdentifier, public_key: &PublicKey) -> Result<Peer> {
        let device = self.device(ctx, interface)?;
        device
            .peers
            .iter()
            .find(|p| &p.public_key == public_key)
            .map(translate::peer_from_tunnel)
            .ok_or_else(|| ReconcileError::not_found(EntityKind::Peer, public_key))
    }

    fn get_or_create_interface(&self, ctx: &CallContext, id: &InterfaceIdentifier) -> Result<Interface> {
        match self.get_interface(ctx, id) {
            Ok(iface) => return Ok(iface),
            Err(e) if e.is_not_found_for(EntityKind::Interface) => {}
            Err(e) => return Err(e),
        }

        info!(interface = %id, kind = %self.link_kind, "creating link");
        let create_err = |source: BoxError| ReconcileError::Create {
            kind: EntityKind::Interface,
            id: id.to_string(),
            source,
        };

        self.link
            .link_add(ctx, id.as_str(), &self.link_kind)
            .map_err(|e| create_err(e.into()))?;

        self.get_interface(ctx, id).map_err(|e| create_err(e.into()))
    }

    fn get_or_create_peer(&self, ctx: &CallContext, interface: &InterfaceIdentifier, public_key: &PublicKey) -> Result<Peer> {
        match self.find_peer(ctx, interface, public_key) {
            Ok(peer) => return Ok(peer),
            Err(e) if e.is_not_found_for(EntityKind::Peer) => {}
            Err(e) => return Err(e),
        }

        info!(interface = %interface, peer = %public_key.short(), "creating peer");
        let create_err = |source: BoxError| ReconcileError::Create {
            kind: EntityKind::Peer,
            id: public_key.to_string(),
            source,
        };

        self.tunnel
            .configure_device(ctx, interface.as_str(), &translate::peer_create_config(public_key))
            .map_err(|e| create_err(e.into()))?;

        self.find_peer(ctx, interface, public_key).map_err(|e| create_err(e.into()))
    }

    /// Pushes MTU, addresses and administrative state.
    ///
    /// Addresses no longer desired, or out of order, are removed first.
    /// Then the first address is replaced and the rest are added unless
    /// already present in the right position.
    fn update_link(&self, ctx: &CallContext, iface: &Interface) -> Result<()> {
        let id = &iface.identifier;
        let link_err = |source: ClientError| ReconcileError::LinkUpdate { interface: id.to_string(), source };

        let link = self.link.link_by_name(ctx, id.as_str()).map_err(link_err)?;

        if iface.mtu != 0 {
            debug!(interface = %id, mtu = iface.mtu, "setting mtu");
            self.link.link_set_mtu(ctx, &link, iface.mtu).map_err(link_err)?;
        }

        let desired: Vec<IpNet> = iface.addresses.iter().copied().map(IpNet::from).collect();
        self.sync_addresses(ctx, &link, &desired).map_err(link_err)?;

        if iface.device_up {
            debug!(interface = %id, "setting link up");
            self.link.link_set_up(ctx, &link).map_err(link_err)
        } else {
            debug!(interface = %id, "setting link down");
            self.link.link_set_down(ctx, &link).map_err(link_err)
        }
    }

    fn sync_addresses(&self, ctx: &CallContext, link: &Link, desired: &[IpNet]) -> std::result::Result<(), ClientError> {
        let existing = self.link.addr_list(ctx, link)?;

        // Addresses already in desired position stay; everything after the
        // first mismatch is re-added so the kernel order matches.
        let in_place = existing
            .iter()
            .filter(|a| desired.contains(a))
            .zip(desired)
            .take_while(|(have, want)| have == want)
            .count();
        let keep = &desired[..in_place];

        // Removals go first, newest first, so deleting a primary never
        // flushes a secondary that was just added in the same subnet.
        for old in existing.iter().rev().filter(|a| !keep.contains(a)) {
            debug!(interface = %link.name, address = %old, "removing address");
            self.link.addr_del(ctx, link, old)?;
        }

        for (i, addr) in desired.iter().enumerate() {
            if i == 0 {
                debug!(interface = %link.name, address = %addr, "replacing address");
                self.link.addr_replace(ctx, link, addr)?;
            } else if i >= in_place {
                debug!(interface = %link.name, address = %addr, "adding address");
                self.link.addr_add(ctx, link, addr)?;
            }
        }

        Ok(())
    }
}
