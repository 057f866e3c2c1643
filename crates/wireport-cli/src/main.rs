//! `wireport` binary entrypoint.

use std::io;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wireport_cli::CliError;
use wireport_cli::cli::{Cli, Commands, InterfaceCommands, PeerCommands};
use wireport_cli::commands::KeyCommand;
use wireport_cli::output::OutputFormat;
use wireport_core::WireportConfig;

const DEFAULT_FILTER: &str = "wireport=info";

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(cli.log_level.as_deref()))
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// `--log-level` wins over `RUST_LOG`, which wins over the default.
fn env_filter(log_level: Option<&str>) -> EnvFilter {
    let filter = match log_level {
        Some(level) => EnvFilter::try_new(format!("wireport={level}")).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    };
    filter.unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

fn load_config(cli: &Cli) -> anyhow::Result<WireportConfig> {
    match &cli.config {
        Some(path) => WireportConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Ok(WireportConfig::default()),
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    match &cli.command {
        Commands::Genkey => KeyCommand::new().genkey(&mut stdout, &format)?,
        Commands::Genpsk => KeyCommand::new().genpsk(&mut stdout, &format)?,
        Commands::Interface { command } => {
            let config = load_config(&cli)?;
            run_kernel(&config, &mut stdout, &format, KernelCommand::Interface(command))?;
        }
        Commands::Peer { command } => {
            let config = load_config(&cli)?;
            run_kernel(&config, &mut stdout, &format, KernelCommand::Peer(command))?;
        }
    }

    Ok(())
}

/// Commands that need the kernel clients.
#[cfg_attr(not(all(feature = "linux", target_os = "linux")), allow(dead_code))]
enum KernelCommand<'a> {
    Interface(&'a InterfaceCommands),
    Peer(&'a PeerCommands),
}

#[cfg(all(feature = "linux", target_os = "linux"))]
fn run_kernel<W: io::Write>(
    config: &WireportConfig,
    out: &mut W,
    format: &OutputFormat,
    command: KernelCommand<'_>,
) -> Result<(), CliError> {
    use wireport_cli::commands::{InterfaceCommand, PeerCommand};
    use wireport_core::Reconciler;
    use wireport_core::iproute::IpLinkClient;
    use wireport_core::linux::KernelTunnelClient;

    let tunnel = KernelTunnelClient::connect()?;
    let link = IpLinkClient::from_config(config);
    let reconciler = Reconciler::with_config(tunnel, link, config);

    match command {
        KernelCommand::Interface(command) => {
            InterfaceCommand::new(&reconciler, &config.defaults).execute(out, format, command)
        }
        KernelCommand::Peer(command) => PeerCommand::new(&reconciler, &config.defaults).execute(out, format, command),
    }
}

#[cfg(not(all(feature = "linux", target_os = "linux")))]
fn run_kernel<W: io::Write>(
    _config: &WireportConfig,
    _out: &mut W,
    _format: &OutputFormat,
    _command: KernelCommand<'_>,
) -> Result<(), CliError> {
    Err(CliError::Unsupported(
        "kernel access requires a Linux build with the `linux` feature".to_string(),
    ))
}
