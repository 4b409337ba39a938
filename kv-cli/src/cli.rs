use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Distributed in-memory key-value cache: node process and one-shot
/// client operations, mirroring the original's `start node` / ad hoc
/// dial-and-send shape as a single structured CLI.
#[derive(Parser, Debug)]
#[command(name = "kv-node", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a cluster node: client listener, raft control listener,
    /// cache engine, and consensus adapter.
    Start(NodeArgs),
    /// One-shot GET against a running node.
    Get(GetArgs),
    /// One-shot SET against a running node.
    Put(PutArgs),
    /// One-shot DEL against a running node.
    Del(DelArgs),
}

#[derive(Args, Debug)]
pub struct NodeArgs {
    /// Unique node identifier across the cluster.
    #[arg(long)]
    pub id: u64,

    /// Client-facing TCP listen address, e.g. 127.0.0.1:4000.
    #[arg(long)]
    pub listen: String,

    /// Raft control-plane TCP listen address, e.g. 127.0.0.1:4100.
    #[arg(long)]
    pub raft_listen: String,

    /// Peer reference as `id=addr`; repeatable. The raft control
    /// address is expected, not the client address.
    #[arg(long = "peer", value_parser = parse_peer)]
    pub peers: Vec<(u64, String)>,

    /// Designates this node the bootstrap seed: it initializes the
    /// cluster membership from `--id`/`--raft-listen` plus `--peer`.
    /// Invoked exactly once, on exactly one node.
    #[arg(long)]
    pub bootstrap: bool,

    /// Directory holding this node's `raft-log-<id>`/`raft-stable-<id>`
    /// sled trees.
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Maximum number of entries the local cache holds.
    #[arg(long, default_value_t = 10_000)]
    pub capacity: usize,

    /// Cache-wide default TTL in milliseconds; 0 means entries never
    /// expire unless a SET carries its own TTL.
    #[arg(long, default_value_t = 0)]
    pub default_ttl_ms: u64,

    /// Serve GET from the local cache without `verify_leader()`,
    /// trading linearizability for latency.
    #[arg(long)]
    pub local_reads: bool,

    /// Write logs to this file instead of stdout.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Default tracing filter when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Node address to connect to.
    #[arg(long)]
    pub addr: String,
    /// Key to fetch.
    #[arg(long)]
    pub key: String,
}

#[derive(Args, Debug)]
pub struct PutArgs {
    #[arg(long)]
    pub addr: String,
    #[arg(long)]
    pub key: String,
    #[arg(long)]
    pub value: String,
    /// TTL in milliseconds; 0 defers to the server's default.
    #[arg(long, default_value_t = 0)]
    pub ttl_ms: u64,
}

#[derive(Args, Debug)]
pub struct DelArgs {
    #[arg(long)]
    pub addr: String,
    #[arg(long)]
    pub key: String,
}

fn parse_peer(s: &str) -> Result<(u64, String), String> {
    let (id, addr) = s
        .split_once('=')
        .ok_or_else(|| format!("peer '{s}' must be in the form id=addr"))?;
    let id: u64 = id
        .parse()
        .map_err(|_| format!("peer id '{id}' is not a valid u64"))?;
    Ok((id, addr.to_string()))
}
