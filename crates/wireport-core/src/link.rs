//! Link client boundary.
//!
//! The link subsystem owns existence, addressing, MTU and administrative
//! state of the network interface underneath a tunnel device.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ipnet::IpNet;

use crate::client::{CallContext, ClientError};

/// RFC 2863 operational state as reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OperState {
    /// State is not known. `WireGuard` links report this while up.
    #[default]
    Unknown,
    /// Some component is missing.
    NotPresent,
    /// The link is down.
    Down,
    /// Down because of a lower-layer interface.
    LowerLayerDown,
    /// In test mode.
    Testing,
    /// Waiting for an external event.
    Dormant,
    /// Up and able to pass packets.
    Up,
}

impl FromStr for OperState {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, ClientError> {
        match s.to_ascii_uppercase().as_str() {
            "UNKNOWN" => Ok(Self::Unknown),
            "NOTPRESENT" => Ok(Self::NotPresent),
            "DOWN" => Ok(Self::Down),
            "LOWERLAYERDOWN" => Ok(Self::LowerLayerDown),
            "TESTING" => Ok(Self::Testing),
            "DORMANT" => Ok(Self::Dormant),
            "UP" => Ok(Self::Up),
            other => Err(ClientError::parse("operstate", format!("unknown state {other:?}"))),
        }
    }
}

impl fmt::Display for OperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "UNKNOWN",
            Self::NotPresent => "NOTPRESENT",
            Self::Down => "DOWN",
            Self::LowerLayerDown => "LOWERLAYERDOWN",
            Self::Testing => "TESTING",
            Self::Dormant => "DORMANT",
            Self::Up => "UP",
        };
        write!(f, "{s}")
    }
}

/// Traffic counters of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStatistics {
    /// Bytes received.
    pub rx_bytes: u64,
    /// Bytes transmitted.
    pub tx_bytes: u64,
}

/// A network link as reported by the link client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Link name.
    pub name: String,
    /// Kernel interface index.
    pub index: u32,
    /// Link type, e.g. `wireguard`.
    pub kind: Option<String>,
    /// Current MTU.
    pub mtu: u32,
    /// Operational state.
    pub oper_state: OperState,
    /// Counters, when the kernel reports them.
    pub statistics: Option<LinkStatistics>,
}

/// Capability to manage network links.
///
/// Implementations must report an absent link as [`ClientError::NotFound`].
pub trait LinkClient: Send + Sync {
    /// Resolves a link by name.
    fn link_by_name(&self, ctx: &CallContext, name: &str) -> Result<Link, ClientError>;

    /// Creates a link of the given type.
    fn link_add(&self, ctx: &CallContext, name: &str, kind: &str) -> Result<(), ClientError>;

    /// Sets the MTU.
    fn link_set_mtu(&self, ctx: &CallContext, link: &Link, mtu: u32) -> Result<(), ClientError>;

    /// Replaces an address, adding it if absent.
    fn addr_replace(&self, ctx: &CallContext, link: &Link, addr: &IpNet) -> Result<(), ClientError>;

    /// Adds an address; fails if it already exists.
    fn addr_add(&self, ctx: &CallContext, link: &Link, addr: &IpNet) -> Result<(), ClientError>;

    /// Removes an address.
    fn addr_del(&self, ctx: &CallContext, link: &Link, addr: &IpNet) -> Result<(), ClientError>;

    /// Lists the addresses assigned to a link.
    fn addr_list(&self, ctx: &CallContext, link: &Link) -> Result<Vec<IpNet>, ClientError>;

    /// Sets the link administratively up.
    fn link_set_up(&self, ctx: &CallContext, link: &Link) -> Result<(), ClientError>;

    /// Sets the link administratively down.
    fn link_set_down(&self, ctx: &CallContext, link: &Link) -> Result<(), ClientError>;
}

impl<T: LinkClient + ?Sized> LinkClient for Arc<T> {
    fn link_by_name(&self, ctx: &CallContext, name: &str) -> Result<Link, ClientError> {
        (**self).link_by_name(ctx, name)
    }

    fn link_add(&self, ctx: &CallContext, name: &str, kind: &str) -> Result<(), ClientError> {
        (**self).link_add(ctx, name, kind)
    }

    fn link_set_mtu(&self, ctx: &CallContext, link: &Link, mtu: u32) -> Result<(), ClientError> {
        (**self).link_set_mtu(ctx, link, mtu)
    }

    fn addr_replace(&self, ctx: &CallContext, link: &Link, addr: &IpNet) -> Result<(), ClientError> {
        (**self).addr_replace(ctx, link, addr)
    }

    fn addr_add(&self, ctx: &CallContext, link: &Link, addr: &IpNet) -> Result<(), ClientError> {
        (**self).addr_add(ctx, link, addr)
    }

    fn addr_del(&self, ctx: &CallContext, link: &Link, addr: &IpNet) -> Result<(), ClientError> {
        (**self).addr_del(ctx, link, addr)
    }

    fn addr_list(&self, ctx: &CallContext, link: &Link) -> Result<Vec<IpNet>, ClientError> {
        (**self).addr_list(ctx, link)
    }

    fn link_set_up(&self, ctx: &CallContext, link: &Link) -> Result<(), ClientError> {
        (**self).link_set_up(ctx, link)
    }

    fn link_set_down(&self, ctx: &CallContext, link: &Link) -> Result<(), ClientError> {
        (**self).link_set_down(ctx, link)
    }
}
