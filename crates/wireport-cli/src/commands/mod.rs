//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`interface`] - Interface inspection and editing
//! - [`peer`] - Peer inspection and editing
//! - [`key`] - Key generation

pub mod interface;
pub mod key;
pub mod peer;

pub use interface::InterfaceCommand;
pub use key::KeyCommand;
pub use peer::PeerCommand;
