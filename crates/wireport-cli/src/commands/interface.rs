//! Interface command implementation.

use std::convert::Infallible;
use std::io::Write;

use tracing::debug;
use wireport_core::config::Defaults;
use wireport_core::{
    CallContext, EntityKind, Interface, InterfaceIdentifier, KeyPair, LinkClient, Reconciler, TunnelClient,
};

use crate::cli::{InterfaceCommands, InterfaceSetArgs};
use crate::error::CliError;
use crate::output::{InterfaceInfo, InterfaceList, Message, OutputFormat};

/// Handler for interface subcommands.
pub struct InterfaceCommand<'a, T, L> {
    reconciler: &'a Reconciler<T, L>,
    defaults: &'a Defaults,
}

impl<'a, T: TunnelClient, L: LinkClient> InterfaceCommand<'a, T, L> {
    /// Creates a new interface command handler.
    #[must_use]
    pub const fn new(reconciler: &'a Reconciler<T, L>, defaults: &'a Defaults) -> Self {
        Self { reconciler, defaults }
    }

    /// Executes the interface subcommand.
    ///
    /// # Errors
    ///
    /// Returns error if the reconciler rejects the operation or output fails.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        command: &InterfaceCommands,
    ) -> Result<(), CliError> {
        match command {
            InterfaceCommands::List => self.list(out, format),
            InterfaceCommands::Show { name } => self.show(out, format, name),
            InterfaceCommands::Set(args) => self.set(out, format, args),
        }
    }

    fn list<W: Write>(&self, out: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        let ctx = CallContext::background().for_operation("interface list");
        let interfaces = self.reconciler.list_interfaces(&ctx)?;
        let list = InterfaceList { interfaces: interfaces.iter().map(InterfaceInfo::from).collect() };
        format.write(out, &list)
    }

    fn show<W: Write>(&self, out: &mut W, format: &OutputFormat, name: &str) -> Result<(), CliError> {
        let ctx = CallContext::background().for_operation("interface show");
        let iface = self.reconciler.get_interface(&ctx, &InterfaceIdentifier::from(name))?;
        format.write(out, &InterfaceInfo::from(&iface))
    }

    fn set<W: Write>(&self, out: &mut W, format: &OutputFormat, args: &InterfaceSetArgs) -> Result<(), CliError> {
        let ctx = CallContext::background().for_operation("interface set");
        let id = InterfaceIdentifier::from(args.name.as_str());

        let is_new = match self.reconciler.get_interface(&ctx, &id) {
            Ok(_) => false,
            Err(e) if e.is_not_found_for(EntityKind::Interface) => true,
            Err(e) => return Err(e.into()),
        };
        debug!(interface = %id, is_new, "saving interface");

        self.reconciler
            .save_interface(&ctx, &id, |iface| Ok::<_, Infallible>(apply_args(iface, args, is_new, self.defaults)))?;

        let verb = if is_new { "created" } else { "updated" };
        format.write(out, &Message::success(format!("Interface {id} {verb}")))
    }
}

/// Applies command-line overrides, and creation defaults for a new interface.
fn apply_args(mut iface: Interface, args: &InterfaceSetArgs, is_new: bool, defaults: &Defaults) -> Interface {
    if let Some(key) = &args.private_key {
        iface.key_pair = Some(KeyPair::from_private_key(key.clone()));
    } else if args.generate_key || (is_new && iface.key_pair.is_none()) {
        iface.key_pair = Some(KeyPair::generate());
    }

    if let Some(port) = args.listen_port {
        iface.listen_port = port;
    } else if is_new {
        iface.listen_port = defaults.listen_port;
    }

    if let Some(mtu) = args.mtu {
        iface.mtu = mtu;
    } else if is_new && defaults.mtu != 0 {
        iface.mtu = defaults.mtu;
    }

    if let Some(mark) = args.fwmark {
        iface.firewall_mark = mark;
    }
    if !args.addresses.is_empty() {
        iface.addresses.clone_from(&args.addresses);
    }
    if args.up {
        iface.device_up = true;
    } else if args.down {
        iface.device_up = false;
    }
    iface
}
