pub mod adapter;
pub mod fsm;
pub mod network;
pub mod storage;
pub mod types;

pub use adapter::{ConsensusHandle, RaftAdapter};
pub use fsm::{Fsm, SnapshotEntry};
pub use network::{serve_raft_network, TcpNetwork, TcpNetworkFactory};
pub use storage::SledStorage;
pub use types::{FsmReply, NodeAddress, NodeId, RaftInstance, TypeConfig};

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use kv_engine::Cache;
use openraft::storage::Adaptor;

/// Builds a running `RaftAdapter` for one node: opens `sled`-backed
/// storage under `data_dir`, wires it into `openraft::Raft`, and starts
/// the TCP control-port listener used by [`TcpNetwork`].
pub async fn start_node(
    data_dir: &Path,
    node_id: NodeId,
    raft_listen_addr: std::net::SocketAddr,
    cache: Arc<Cache>,
    raft_config: openraft::Config,
) -> anyhow::Result<Arc<RaftAdapter>> {
    let fsm = Arc::new(Fsm::new(cache));
    let storage = SledStorage::open(data_dir, node_id, fsm)?;
    let (log_store, state_machine) = Adaptor::new(storage);

    let config = Arc::new(raft_config.validate()?);
    let raft = Arc::new(
        openraft::Raft::new(
            node_id,
            config,
            TcpNetworkFactory,
            log_store,
            state_machine,
        )
        .await?,
    );

    let listener = tokio::net::TcpListener::bind(raft_listen_addr).await?;
    tokio::spawn(serve_raft_network(listener, raft.clone()));

    Ok(Arc::new(RaftAdapter::new(raft, BTreeMap::new())))
}
