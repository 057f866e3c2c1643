//! Reconciles declarative `WireGuard` interfaces and peers onto kernel state.
//!
//! A tunnel device lives in two kernel subsystems: the `WireGuard` module owns
//! keys, listen port, firewall mark and peers, while the link layer owns
//! existence, addresses, MTU and up/down state. [`Reconciler`] presents both
//! as one canonical [`Interface`] with its [`Peer`]s, and pushes edits back
//! through a get-or-create-then-update cycle.
//!
//! The kernel is reached through two capability traits, [`TunnelClient`] and
//! [`LinkClient`]. [`fake::FakeKernel`] implements both in memory; with the
//! `linux` feature, `linux::KernelTunnelClient` talks generic netlink and
//! [`iproute::IpLinkClient`] drives iproute2.
//!
//! ```
//! use wireport_core::fake::FakeKernel;
//! use wireport_core::{CallContext, InterfaceIdentifier, KeyPair, Reconciler};
//!
//! let kernel = FakeKernel::new();
//! let reconciler = Reconciler::new(kernel.clone(), kernel);
//! let ctx = CallContext::background();
//! let id = InterfaceIdentifier::from("wg0");
//!
//! reconciler
//!     .save_interface(&ctx, &id, |mut iface| {
//!         iface.key_pair = Some(KeyPair::generate());
//!         iface.addresses = vec!["10.0.0.1/24".parse()?];
//!         iface.device_up = true;
//!         Ok::<_, ipnet::AddrParseError>(iface)
//!     })
//!     .expect("save");
//!
//! assert!(reconciler.get_interface(&ctx, &id).expect("get").device_up);
//! ```

#![forbid(unsafe_code)]

pub mod client;
pub mod config;
pub mod error;
pub mod fake;
pub mod iproute;
pub mod keys;
pub mod link;
#[cfg(all(feature = "linux", target_os = "linux"))]
pub mod linux;
pub mod model;
pub mod reconciler;
pub mod translate;
pub mod tunnel;

pub use client::{CallContext, ClientError};
pub use config::WireportConfig;
pub use error::{BoxError, ConfigError, EntityKind, KeyError, ReconcileError, Result};
pub use keys::{KEY_SIZE, KeyPair, PresharedKey, PrivateKey, PublicKey, is_public_key};
pub use link::{Link, LinkClient, LinkStatistics, OperState};
pub use model::{Cidr, Endpoint, Interface, InterfaceIdentifier, Peer, PeerIdentifier};
pub use reconciler::Reconciler;
pub use tunnel::{DeviceConfig, PeerConfig, TunnelClient, TunnelDevice, TunnelDeviceType, TunnelPeer};
