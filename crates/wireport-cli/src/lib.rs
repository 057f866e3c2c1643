//! # wireport-cli
//!
//! Operator command-line interface for `wireport`.
//!
//! Provides commands for:
//! - Listing, showing and editing `WireGuard` interfaces
//! - Listing, showing, editing and removing peers
//! - Generating private and preshared keys
//!
//! # Architecture
//!
//! Every kernel-facing command goes through a [`wireport_core::Reconciler`];
//! the command handlers in [`commands`] are generic over its clients so they
//! run unchanged against the in-memory fake in tests.
//!
//! ```text
//! ┌──────────────┐               ┌────────────┐  netlink   ┌─────────┐
//! │ wireport-cli │──────────────►│ Reconciler │───────────►│ kernel  │
//! └──────────────┘               └────────────┘  iproute2  └─────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format, InterfaceCommands, PeerCommands};
pub use error::CliError;
pub use output::OutputFormat;
