mod cli;
mod logging;

use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command, DelArgs, GetArgs, NodeArgs, PutArgs};
use kv_common::Ttl;
use kv_consensus::NodeId;
use kv_engine::Cache;
use kv_server::AppState;
use tokio::net::TcpListener;
use tracing::info;

fn main() {
    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("error: failed to start tokio runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(run(cli)) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Start(args) => run_node(args).await,
        Command::Get(args) => run_get(args).await,
        Command::Put(args) => run_put(args).await,
        Command::Del(args) => run_del(args).await,
    }
}

async fn run_node(args: NodeArgs) -> anyhow::Result<()> {
    let _logging = logging::init(args.log_file.clone(), &args.log_level)?;

    std::fs::create_dir_all(&args.data_dir)?;
    let listen_addr = kv_server::socket_addr(&args.listen)?;
    let raft_listen_addr = kv_server::socket_addr(&args.raft_listen)?;

    let cache = Arc::new(Cache::new(args.capacity, Ttl::from_duration(
        std::time::Duration::from_millis(args.default_ttl_ms),
    ), None));

    let raft_config = openraft::Config {
        heartbeat_interval: 250,
        election_timeout_min: 800,
        election_timeout_max: 1200,
        ..Default::default()
    };

    let adapter = kv_consensus::start_node(
        &args.data_dir,
        args.id,
        raft_listen_addr,
        cache.clone(),
        raft_config,
    )
    .await?;

    if args.bootstrap {
        let mut members: Vec<(NodeId, String)> =
            vec![(args.id, args.raft_listen.clone())];
        members.extend(args.peers.iter().cloned());
        info!(?members, "bootstrapping cluster");
        adapter.bootstrap(members).await?;
    } else if !args.peers.is_empty() {
        // Non-bootstrap nodes still need to know the raft addresses of
        // peers to resolve `leader()` into a dialable address; the
        // consensus membership itself is established by the bootstrap
        // node's `initialize` call and subsequent config changes.
        adapter.set_peers(args.peers.into_iter().collect());
    }

    tokio::spawn(run_ttl_sweeper(cache.clone()));

    let state = Arc::new(
        AppState::new(cache, adapter).with_local_reads(args.local_reads),
    );

    let listener = TcpListener::bind(listen_addr).await?;
    info!(addr = %args.listen, id = args.id, "node listening for clients");

    tokio::select! {
        _ = kv_server::run_listener(listener, state) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    Ok(())
}

/// Periodically forces an expiry sweep. Correctness never depends on
/// this running — lazy expiry on access is sufficient — but it bounds
/// how long an expired entry can sit in the store between accesses.
async fn run_ttl_sweeper(cache: Arc<Cache>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
    loop {
        interval.tick().await;
        cache.tick();
    }
}

async fn run_get(args: GetArgs) -> anyhow::Result<()> {
    let client = kv_client::KvClient::connect(&args.addr).await?;
    match client.get(args.key.as_bytes()).await? {
        kv_client::GetOutcome::Found(value) => {
            println!("{}", String::from_utf8_lossy(&value));
        }
        kv_client::GetOutcome::NotFound => {
            println!("(not found)");
        }
        kv_client::GetOutcome::Expired => {
            println!("(expired)");
        }
    }
    Ok(())
}

async fn run_put(args: PutArgs) -> anyhow::Result<()> {
    let client = kv_client::KvClient::connect(&args.addr).await?;
    let ttl = Ttl::from_duration(std::time::Duration::from_millis(args.ttl_ms));
    client
        .put(args.key.as_bytes(), args.value.as_bytes(), ttl)
        .await?;
    println!("OK");
    Ok(())
}

async fn run_del(args: DelArgs) -> anyhow::Result<()> {
    let client = kv_client::KvClient::connect(&args.addr).await?;
    client.delete(args.key.as_bytes()).await?;
    println!("OK");
    Ok(())
}
