//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use wireport_core::{Cidr, Endpoint, PresharedKey, PrivateKey};

/// Inspect and edit `WireGuard` interfaces and peers on this host.
#[derive(Parser, Debug, Clone)]
#[command(name = "wireport")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML).
    #[arg(short, long, env = "WIREPORT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Log level for wireport crates; overrides `RUST_LOG`.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Interface management commands.
    Interface {
        /// Interface subcommand to execute.
        #[command(subcommand)]
        command: InterfaceCommands,
    },

    /// Peer management commands.
    Peer {
        /// Peer subcommand to execute.
        #[command(subcommand)]
        command: PeerCommands,
    },

    /// Generate a new key pair.
    Genkey,

    /// Generate a new preshared key.
    Genpsk,
}

/// Interface subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum InterfaceCommands {
    /// List all tunnel interfaces.
    List,

    /// Show one interface.
    Show {
        /// Interface name.
        name: String,
    },

    /// Create or update an interface.
    ///
    /// A new interface gets a generated private key and the configured
    /// default listen port and MTU unless given here.
    Set(InterfaceSetArgs),
}

/// Arguments for `interface set`.
#[derive(Args, Debug, Clone)]
pub struct InterfaceSetArgs {
    /// Interface name.
    pub name: String,

    /// Private key in base64.
    #[arg(long, value_parser = PrivateKey::from_base64, conflicts_with = "generate_key")]
    pub private_key: Option<PrivateKey>,

    /// Replace the private key with a freshly generated one.
    #[arg(long)]
    pub generate_key: bool,

    /// UDP listen port.
    #[arg(short, long)]
    pub listen_port: Option<u16>,

    /// MTU.
    #[arg(short, long)]
    pub mtu: Option<u32>,

    /// Firewall mark.
    #[arg(long)]
    pub fwmark: Option<i32>,

    /// Address in CIDR notation; repeat for several. Replaces the current set.
    #[arg(short, long = "address", value_name = "CIDR")]
    pub addresses: Vec<Cidr>,

    /// Bring the interface up.
    #[arg(long, conflicts_with = "down")]
    pub up: bool,

    /// Bring the interface down.
    #[arg(long)]
    pub down: bool,
}

/// Peer subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum PeerCommands {
    /// List the peers of an interface.
    List {
        /// Interface name.
        interface: String,
    },

    /// Show one peer.
    Show {
        /// Interface name.
        interface: String,
        /// Peer public key in base64.
        public_key: String,
    },

    /// Create or update a peer.
    Set(PeerSetArgs),

    /// Remove a peer.
    Remove {
        /// Interface name.
        interface: String,
        /// Peer public key in base64.
        public_key: String,
    },
}

/// Arguments for `peer set`.
#[derive(Args, Debug, Clone)]
pub struct PeerSetArgs {
    /// Interface name.
    pub interface: String,

    /// Peer public key in base64.
    pub public_key: String,

    /// Allowed IP range; repeat for several. Replaces the current set.
    #[arg(short, long = "allowed-ip", value_name = "CIDR")]
    pub allowed_ips: Vec<Cidr>,

    /// Peer endpoint (`host:port`).
    #[arg(short, long)]
    pub endpoint: Option<Endpoint>,

    /// Persistent keepalive interval in seconds; 0 disables.
    #[arg(short, long)]
    pub keepalive: Option<u16>,

    /// Preshared key in base64.
    #[arg(long, value_parser = PresharedKey::from_base64)]
    pub preshared_key: Option<PresharedKey>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interface_set() {
        let cli = Cli::parse_from([
            "wireport", "interface", "set", "wg0", "--listen-port", "51820", "--address", "10.0.0.1/24",
            "--address", "fd00::1/64", "--up",
        ]);
        let Commands::Interface { command: InterfaceCommands::Set(args) } = cli.command else {
            panic!("expected interface set");
        };
        assert_eq!(args.name, "wg0");
        assert_eq!(args.listen_port, Some(51820));
        assert_eq!(args.addresses.len(), 2);
        assert!(args.up && !args.down);
    }

    #[test]
    fn up_and_down_conflict() {
        let result = Cli::try_parse_from(["wireport", "interface", "set", "wg0", "--up", "--down"]);
        assert!(result.is_err());
    }

    #[test]
    fn bad_private_key_rejected_at_parse_time() {
        let result = Cli::try_parse_from(["wireport", "interface", "set", "wg0", "--private-key", "nope"]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_peer_set() {
        let key = PrivateKey::generate().public_key().to_base64();
        let cli = Cli::parse_from([
            "wireport", "peer", "set", "wg0", key.as_str(), "--allowed-ip", "10.0.0.2/32", "--endpoint",
            "192.0.2.1:51820", "--keepalive", "25",
        ]);
        let Commands::Peer { command: PeerCommands::Set(args) } = cli.command else {
            panic!("expected peer set");
        };
        assert_eq!(args.public_key, key);
        assert_eq!(args.keepalive, Some(25));
        assert!(args.endpoint.is_some());
    }

    #[test]
    fn format_and_config_flags() {
        let cli = Cli::parse_from(["wireport", "--format", "json", "--config", "/etc/wireport.toml", "genkey"]);
        assert_eq!(cli.format, Format::Json);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/wireport.toml")));
        assert!(matches!(cli.command, Commands::Genkey));
    }
}
