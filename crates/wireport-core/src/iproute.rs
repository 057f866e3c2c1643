//! Link client backed by the iproute2 `ip` tool.
//!
//! Reads use `ip -j` and parse the JSON output; writes run the matching
//! `ip link` / `ip addr` command. Calls are synchronous and ignore the
//! context deadline.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::Command;

use ipnet::IpNet;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::client::{CallContext, ClientError};
use crate::config::WireportConfig;
use crate::link::{Link, LinkClient, LinkStatistics, OperState};

/// Link client that shells out to `ip`.
#[derive(Debug, Clone)]
pub struct IpLinkClient {
    command: PathBuf,
}

impl IpLinkClient {
    /// Creates a client running the given `ip` binary.
    #[must_use]
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self { command: command.into() }
    }

    /// Creates a client using `link.ip_command` from the configuration.
    #[must_use]
    pub fn from_config(config: &WireportConfig) -> Self {
        Self::new(config.link.ip_command.clone())
    }

    /// Path of the `ip` binary.
    pub fn command(&self) -> &Path {
        &self.command
    }

    /// Runs `ip` with `args` and returns its standard output.
    fn run(&self, ctx: &CallContext, name: &str, args: &[&str]) -> Result<String, ClientError> {
        trace!(cmd = %self.command.display(), args = ?args, operation = ctx.operation(), "executing ip");

        let output = Command::new(&self.command).args(args).output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if is_missing_device(&stderr) {
                return Err(ClientError::NotFound(format!("link {name}")));
            }
            return Err(ClientError::Command {
                command: format!("{} {}", self.command.display(), args.join(" ")),
                status: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for IpLinkClient {
    fn default() -> Self {
        Self::from_config(&WireportConfig::default())
    }
}

fn is_missing_device(stderr: &str) -> bool {
    stderr.contains("does not exist") || stderr.contains("Cannot find device")
}

#[derive(Debug, Deserialize)]
struct RawLink {
    ifindex: u32,
    ifname: String,
    #[serde(default)]
    mtu: u32,
    #[serde(default)]
    operstate: Option<String>,
    #[serde(default)]
    linkinfo: Option<RawLinkInfo>,
    #[serde(default)]
    stats64: Option<RawStats>,
    #[serde(default)]
    stats: Option<RawStats>,
}

#[derive(Debug, Deserialize)]
struct RawLinkInfo {
    #[serde(default)]
    info_kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStats {
    #[serde(default)]
    rx: RawCounters,
    #[serde(default)]
    tx: RawCounters,
}

#[derive(Debug, Default, Deserialize)]
struct RawCounters {
    #[serde(default)]
    bytes: u64,
}

#[derive(Debug, Deserialize)]
struct RawAddrLink {
    #[serde(default)]
    addr_info: Vec<RawAddr>,
}

#[derive(Debug, Deserialize)]
struct RawAddr {
    #[serde(default)]
    local: Option<IpAddr>,
    #[serde(default)]
    prefixlen: Option<u8>,
}

/// Parses `ip -j -s -d link show dev NAME` output.
///
/// # Errors
///
/// Returns `NotFound` for an empty list and `Parse` for malformed output.
pub fn parse_link(name: &str, json: &str) -> Result<Link, ClientError> {
    let links: Vec<RawLink> = serde_json::from_str(json).map_err(|e| ClientError::parse("ip link output", e))?;
    let raw = links
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::NotFound(format!("link {name}")))?;

    let oper_state = match raw.operstate.as_deref() {
        Some(s) => s.parse()?,
        None => OperState::Unknown,
    };
    let statistics = raw.stats64.or(raw.stats).map(|s| LinkStatistics {
        rx_bytes: s.rx.bytes,
        tx_bytes: s.tx.bytes,
    });

    Ok(Link {
        name: raw.ifname,
        index: raw.ifindex,
        kind: raw.linkinfo.and_then(|li| li.info_kind),
        mtu: raw.mtu,
        oper_state,
        statistics,
    })
}

/// Parses `ip -j addr show dev NAME` output.
///
/// # Errors
///
/// Returns `Parse` for malformed output or an impossible prefix length.
pub fn parse_addresses(json: &str) -> Result<Vec<IpNet>, ClientError> {
    let links: Vec<RawAddrLink> = serde_json::from_str(json).map_err(|e| ClientError::parse("ip addr output", e))?;

    let mut out = Vec::new();
    for addr in links.into_iter().flat_map(|l| l.addr_info) {
        let (Some(local), Some(prefix)) = (addr.local, addr.prefixlen) else {
            continue;
        };
        out.push(IpNet::new(local, prefix).map_err(|e| ClientError::parse("address prefix", e))?);
    }
    Ok(out)
}

impl LinkClient for IpLinkClient {
    fn link_by_name(&self, ctx: &CallContext, name: &str) -> Result<Link, ClientError> {
        let out = self.run(ctx, name, &["-j", "-s", "-d", "link", "show", "dev", name])?;
        parse_link(name, &out)
    }

    fn link_add(&self, ctx: &CallContext, name: &str, kind: &str) -> Result<(), ClientError> {
        debug!(link = %name, kind = %kind, "ip link add");
        self.run(ctx, name, &["link", "add", "dev", name, "type", kind]).map(drop)
    }

    fn link_set_mtu(&self, ctx: &CallContext, link: &Link, mtu: u32) -> Result<(), ClientError> {
        let mtu = mtu.to_string();
        self.run(ctx, &link.name, &["link", "set", "dev", &link.name, "mtu", &mtu]).map(drop)
    }

    fn addr_replace(&self, ctx: &CallContext, link: &Link, addr: &IpNet) -> Result<(), ClientError> {
        let addr = addr.to_string();
        self.run(ctx, &link.name, &["addr", "replace", &addr, "dev", &link.name]).map(drop)
    }

    fn addr_add(&self, ctx: &CallContext, link: &Link, addr: &IpNet) -> Result<(), ClientError> {
        let addr = addr.to_string();
        self.run(ctx, &link.name, &["addr", "add", &addr, "dev", &link.name]).map(drop)
    }

    fn addr_del(&self, ctx: &CallContext, link: &Link, addr: &IpNet) -> Result<(), ClientError> {
        let addr = addr.to_string();
        self.run(ctx, &link.name, &["addr", "del", &addr, "dev", &link.name]).map(drop)
    }

    fn addr_list(&self, ctx: &CallContext, link: &Link) -> Result<Vec<IpNet>, ClientError> {
        let out = self.run(ctx, &link.name, &["-j", "addr", "show", "dev", &link.name])?;
        parse_addresses(&out)
    }

    fn link_set_up(&self, ctx: &CallContext, link: &Link) -> Result<(), ClientError> {
        self.run(ctx, &link.name, &["link", "set", "dev", &link.name, "up"]).map(drop)
    }

    fn link_set_down(&self, ctx: &CallContext, link: &Link) -> Result<(), ClientError> {
        self.run(ctx, &link.name, &["link", "set", "dev", &link.name, "down"]).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WG_LINK: &str = r#"[{"ifindex":7,"ifname":"wg0","flags":["POINTOPOINT","NOARP","UP","LOWER_UP"],
        "mtu":1420,"qdisc":"noqueue","operstate":"UNKNOWN","linkmode":"DEFAULT","group":"default",
        "txqlen":1000,"link_type":"none","promiscuity":0,"min_mtu":0,"max_mtu":2147483552,
        "linkinfo":{"info_kind":"wireguard"},"num_tx_queues":1,"num_rx_queues":1,
        "stats64":{"rx":{"bytes":4128,"packets":31,"errors":0,"dropped":0,"over_errors":0,"multicast":0},
        "tx":{"bytes":9312,"packets":44,"errors":0,"dropped":3,"carrier_errors":0,"collisions":0}}}]"#;

    const WG_ADDRS: &str = r#"[{"ifindex":7,"ifname":"wg0","flags":["POINTOPOINT","NOARP","UP","LOWER_UP"],
        "mtu":1420,"qdisc":"noqueue","operstate":"UNKNOWN","group":"default","txqlen":1000,"link_type":"none",
        "addr_info":[{"family":"inet","local":"10.0.0.1","prefixlen":24,"scope":"global","label":"wg0",
        "valid_life_time":4294967295,"preferred_life_time":4294967295},
        {"family":"inet6","local":"fd00::1","prefixlen":64,"scope":"global",
        "valid_life_time":4294967295,"preferred_life_time":4294967295}]}]"#;

    #[test]
    fn parses_wireguard_link() {
        let link = parse_link("wg0", WG_LINK).expect("parse");
        assert_eq!(link.name, "wg0");
        assert_eq!(link.index, 7);
        assert_eq!(link.kind.as_deref(), Some("wireguard"));
        assert_eq!(link.mtu, 1420);
        assert_eq!(link.oper_state, OperState::Unknown);
        assert_eq!(link.statistics, Some(LinkStatistics { rx_bytes: 4128, tx_bytes: 9312 }));
    }

    #[test]
    fn link_without_stats_or_details() {
        let json = r#"[{"ifindex":3,"ifname":"wg1","mtu":1380,"operstate":"DOWN"}]"#;
        let link = parse_link("wg1", json).expect("parse");
        assert_eq!(link.oper_state, OperState::Down);
        assert!(link.kind.is_none());
        assert!(link.statistics.is_none());
    }

    #[test]
    fn legacy_stats_key_is_accepted() {
        let json = r#"[{"ifindex":3,"ifname":"wg1","mtu":1420,"operstate":"UNKNOWN",
            "stats":{"rx":{"bytes":1},"tx":{"bytes":2}}}]"#;
        let link = parse_link("wg1", json).expect("parse");
        assert_eq!(link.statistics, Some(LinkStatistics { rx_bytes: 1, tx_bytes: 2 }));
    }

    #[test]
    fn empty_link_list_is_not_found() {
        assert!(parse_link("wg9", "[]").expect_err("empty").is_not_found());
    }

    #[test]
    fn malformed_link_output_is_parse_error() {
        let err = parse_link("wg0", "Device \"wg0\" does not exist.").expect_err("garbage");
        assert!(matches!(err, ClientError::Parse { .. }));
    }

    #[test]
    fn parses_addresses_with_host_bits() {
        let addrs = parse_addresses(WG_ADDRS).expect("parse");
        assert_eq!(
            addrs,
            vec![
                "10.0.0.1/24".parse::<IpNet>().expect("v4"),
                "fd00::1/64".parse::<IpNet>().expect("v6"),
            ]
        );
    }

    #[test]
    fn empty_addr_entries_are_skipped() {
        let json = r#"[{"ifindex":7,"ifname":"wg0","addr_info":[{},{}]}]"#;
        assert!(parse_addresses(json).expect("parse").is_empty());
    }

    #[test]
    fn impossible_prefix_is_rejected() {
        let json = r#"[{"addr_info":[{"local":"10.0.0.1","prefixlen":40}]}]"#;
        assert!(parse_addresses(json).is_err());
    }

    #[test]
    fn missing_device_messages() {
        assert!(is_missing_device("Device \"wg0\" does not exist."));
        assert!(is_missing_device("Cannot find device \"wg0\""));
        assert!(!is_missing_device("RTNETLINK answers: Operation not permitted"));
    }

    #[test]
    fn missing_binary_is_io_error() {
        let client = IpLinkClient::new("/nonexistent/ip");
        let err = client
            .link_by_name(&CallContext::background(), "wg0")
            .expect_err("no binary");
        assert!(matches!(err, ClientError::Io(_)));
    }

    #[test]
    fn default_uses_configured_path() {
        assert_eq!(IpLinkClient::default().command(), Path::new("/sbin/ip"));
    }
}
