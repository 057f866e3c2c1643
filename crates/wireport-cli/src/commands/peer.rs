//! Peer command implementation.

use std::convert::Infallible;
use std::io::Write;

use tracing::debug;
use wireport_core::config::Defaults;
use wireport_core::{
    CallContext, EntityKind, InterfaceIdentifier, LinkClient, Peer, PeerIdentifier, Reconciler, TunnelClient,
};

use crate::cli::{PeerCommands, PeerSetArgs};
use crate::error::CliError;
use crate::output::{Message, OutputFormat, PeerInfo, PeerList};

/// Handler for peer subcommands.
pub struct PeerCommand<'a, T, L> {
    reconciler: &'a Reconciler<T, L>,
    defaults: &'a Defaults,
}

impl<'a, T: TunnelClient, L: LinkClient> PeerCommand<'a, T, L> {
    /// Creates a new peer command handler.
    #[must_use]
    pub const fn new(reconciler: &'a Reconciler<T, L>, defaults: &'a Defaults) -> Self {
        Self { reconciler, defaults }
    }

    /// Executes the peer subcommand.
    ///
    /// # Errors
    ///
    /// Returns error if the reconciler rejects the operation or output fails.
    pub fn execute<W: Write>(&self, out: &mut W, format: &OutputFormat, command: &PeerCommands) -> Result<(), CliError> {
        match command {
            PeerCommands::List { interface } => self.list(out, format, interface),
            PeerCommands::Show { interface, public_key } => self.show(out, format, interface, public_key),
            PeerCommands::Set(args) => self.set(out, format, args),
            PeerCommands::Remove { interface, public_key } => self.remove(out, format, interface, public_key),
        }
    }

    fn list<W: Write>(&self, out: &mut W, format: &OutputFormat, interface: &str) -> Result<(), CliError> {
        let ctx = CallContext::background().for_operation("peer list");
        let peers = self.reconciler.list_peers(&ctx, &InterfaceIdentifier::from(interface))?;
        let list = PeerList { interface: interface.to_string(), peers: peers.iter().map(PeerInfo::from).collect() };
        format.write(out, &list)
    }

    fn show<W: Write>(&self, out: &mut W, format: &OutputFormat, interface: &str, key: &str) -> Result<(), CliError> {
        let ctx = CallContext::background().for_operation("peer show");
        let peer =
            self.reconciler
                .get_peer(&ctx, &InterfaceIdentifier::from(interface), &PeerIdentifier::from(key))?;
        format.write(out, &PeerInfo::from(&peer))
    }

    fn set<W: Write>(&self, out: &mut W, format: &OutputFormat, args: &PeerSetArgs) -> Result<(), CliError> {
        let ctx = CallContext::background().for_operation("peer set");
        let interface = InterfaceIdentifier::from(args.interface.as_str());
        let id = PeerIdentifier::from(args.public_key.as_str());

        let is_new = match self.reconciler.get_peer(&ctx, &interface, &id) {
            Ok(_) => false,
            Err(e) if e.is_not_found_for(EntityKind::Peer) => true,
            Err(e) => return Err(e.into()),
        };
        debug!(interface = %interface, peer = %id, is_new, "saving peer");

        self.reconciler.save_peer(&ctx, &interface, &id, |peer| {
            Ok::<_, Infallible>(apply_args(peer, args, is_new, self.defaults))
        })?;

        let verb = if is_new { "added to" } else { "updated on" };
        format.write(out, &Message::success(format!("Peer {id} {verb} {interface}")))
    }

    fn remove<W: Write>(&self, out: &mut W, format: &OutputFormat, interface: &str, key: &str) -> Result<(), CliError> {
        let ctx = CallContext::background().for_operation("peer remove");
        let interface = InterfaceIdentifier::from(interface);
        let id = PeerIdentifier::from(key);

        let existed = match self.reconciler.get_peer(&ctx, &interface, &id) {
            Ok(_) => true,
            Err(e) if e.is_not_found_for(EntityKind::Peer) => false,
            Err(e) => return Err(e.into()),
        };
        self.reconciler.delete_peer(&ctx, &interface, &id)?;

        let message = if existed {
            Message::success(format!("Peer {id} removed from {interface}"))
        } else {
            Message::info(format!("Peer {id} was not present on {interface}"))
        };
        format.write(out, &message)
    }
}

/// Applies command-line overrides, and the keepalive default for a new peer.
fn apply_args(mut peer: Peer, args: &PeerSetArgs, is_new: bool, defaults: &Defaults) -> Peer {
    if !args.allowed_ips.is_empty() {
        peer.allowed_ips.clone_from(&args.allowed_ips);
    }
    if let Some(endpoint) = args.endpoint {
        peer.endpoint = Some(endpoint);
    }
    if let Some(secs) = args.keepalive {
        peer.persistent_keepalive = secs;
    } else if is_new {
        peer.persistent_keepalive = defaults.persistent_keepalive;
    }
    if let Some(psk) = &args.preshared_key {
        peer.preshared_key = Some(psk.clone());
    }
    peer
}
