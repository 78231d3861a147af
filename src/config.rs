//! Node configuration: CLI flags (teacher's `clap::Parser` style) plus an
//! optional `rust-ini` file for the tunables spec.md §6 calls out
//! (listener port, multicast group/port, finger size, list capacity, RPC
//! timeout).

use std::time::Duration;

use clap::Parser;
use ini::Ini;
use log::warn;

pub const DEFAULT_MULTICAST_GROUP: &str = "239.255.0.1";
pub const DEFAULT_MULTICAST_PORT: u16 = 9988;
pub const SUCCESSOR_LIST_CAPACITY: usize = 3;

#[derive(Parser, Debug, Clone)]
#[command(name = "ringtalk", about = "Chord-ring distributed key-value node")]
pub struct Cli {
    /// Address this node's peer RPC endpoint binds to and advertises.
    #[arg(long, default_value = "127.0.0.1")]
    pub address: String,

    /// Port the peer RPC endpoint listens on.
    #[arg(long, default_value_t = 9000)]
    pub port: u16,

    /// Port the demo HTTP web UI listens on. Set to 0 to disable it.
    #[arg(long, default_value_t = 8080)]
    pub http_port: u16,

    /// Address of an existing ring member to join through. If omitted, the
    /// node tries multicast discovery and otherwise starts a new ring.
    #[arg(long)]
    pub peer: Option<String>,

    /// Optional rust-ini config file overriding the tunables below.
    #[arg(long)]
    pub config: Option<String>,

    #[arg(long, default_value = DEFAULT_MULTICAST_GROUP)]
    pub multicast_group: String,

    #[arg(long, default_value_t = DEFAULT_MULTICAST_PORT)]
    pub multicast_port: u16,

    #[arg(long, default_value_t = SUCCESSOR_LIST_CAPACITY)]
    pub list_capacity: usize,

    /// Per-RPC timeout in milliseconds.
    #[arg(long, default_value_t = 3000)]
    pub rpc_timeout_ms: u64,
}

/// Fully-resolved configuration, after merging CLI flags with an optional
/// ini file (ini values only fill in what the CLI left at its default,
/// matching the teacher's practice of treating `rust-ini` as the on-disk
/// override for CLI defaults).
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub address: String,
    pub port: u16,
    pub http_port: u16,
    pub peer: Option<String>,
    pub multicast_group: String,
    pub multicast_port: u16,
    pub list_capacity: usize,
    pub rpc_timeout: Duration,
}

impl NodeConfig {
    pub fn from_cli(cli: Cli) -> Self {
        let mut cfg = NodeConfig {
            address: cli.address,
            port: cli.port,
            http_port: cli.http_port,
            peer: cli.peer,
            multicast_group: cli.multicast_group,
            multicast_port: cli.multicast_port,
            list_capacity: cli.list_capacity,
            rpc_timeout: Duration::from_millis(cli.rpc_timeout_ms),
        };

        if let Some(path) = cli.config {
            match Ini::load_from_file(&path) {
                Ok(ini) => cfg.apply_ini(&ini),
                Err(e) => warn!("failed to load config file {}: {}", path, e),
            }
        }
        cfg
    }

    #[cfg(test)]
    pub fn for_test(address: String, port: u16) -> Self {
        NodeConfig {
            address,
            port,
            http_port: 0,
            peer: None,
            multicast_group: DEFAULT_MULTICAST_GROUP.to_string(),
            multicast_port: DEFAULT_MULTICAST_PORT,
            list_capacity: SUCCESSOR_LIST_CAPACITY,
            rpc_timeout: Duration::from_millis(200),
        }
    }

    fn apply_ini(&mut self, ini: &Ini) {
        let section = ini.section(Some("node"));
        if let Some(section) = section {
            if let Some(v) = section.get("multicast_group") {
                self.multicast_group = v.to_string();
            }
            if let Some(v) = section.get("multicast_port").and_then(|v| v.parse().ok()) {
                self.multicast_port = v;
            }
            if let Some(v) = section.get("list_capacity").and_then(|v| v.parse().ok()) {
                self.list_capacity = v;
            }
            if let Some(v) = section
                .get("rpc_timeout_ms")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
            {
                self.rpc_timeout = v;
            }
        }
    }
}
