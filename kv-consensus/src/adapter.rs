//! The thin contract the rest of the system depends on: `apply`, `leader`,
//! `verify_leader`, `bootstrap`. Everything else about the replicated log —
//! elections, snapshot transport, membership changes — is openraft's
//! problem and stays behind this seam.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use kv_common::HkvError;
use openraft::BasicNode;
use parking_lot::RwLock;

use crate::types::{FsmReply, NodeAddress, NodeId, RaftInstance};

pub trait ConsensusHandle: Send + Sync {
    async fn apply(&self, payload: Vec<u8>, timeout: Duration) -> Result<FsmReply, HkvError>;

    fn leader(&self) -> Option<NodeAddress>;

    async fn verify_leader(&self) -> Result<(), HkvError>;

    async fn bootstrap(&self, peers: Vec<(NodeId, String)>) -> Result<(), HkvError>;
}

pub struct RaftAdapter {
    raft: Arc<RaftInstance>,
    peers: RwLock<BTreeMap<NodeId, String>>,
}

impl RaftAdapter {
    pub fn new(raft: Arc<RaftInstance>, peers: BTreeMap<NodeId, String>) -> Self {
        RaftAdapter {
            raft,
            peers: RwLock::new(peers),
        }
    }

    pub fn set_peers(&self, peers: BTreeMap<NodeId, String>) {
        *self.peers.write() = peers;
    }
}

impl ConsensusHandle for RaftAdapter {
    async fn apply(&self, payload: Vec<u8>, timeout: Duration) -> Result<FsmReply, HkvError> {
        match tokio::time::timeout(timeout, self.raft.client_write(payload)).await {
            Err(_elapsed) => Err(HkvError::ApplyTimeout),
            Ok(Err(err)) => {
                if err.to_string().to_lowercase().contains("not leader") {
                    Err(HkvError::NotLeader)
                } else {
                    Err(HkvError::Internal(err.to_string()))
                }
            }
            Ok(Ok(resp)) => Ok(resp.data),
        }
    }

    fn leader(&self) -> Option<NodeAddress> {
        let metrics = self.raft.metrics().borrow().clone();
        let leader_id = metrics.current_leader?;
        let peers = self.peers.read();
        peers.get(&leader_id).map(|addr| NodeAddress {
            id: leader_id,
            addr: addr.clone(),
        })
    }

    async fn verify_leader(&self) -> Result<(), HkvError> {
        self.raft
            .ensure_linearizable()
            .await
            .map(|_| ())
            .map_err(|_| HkvError::NotLeader)
    }

    async fn bootstrap(&self, peers: Vec<(NodeId, String)>) -> Result<(), HkvError> {
        let members: BTreeMap<NodeId, BasicNode> = peers
            .iter()
            .map(|(id, addr)| (*id, BasicNode { addr: addr.clone() }))
            .collect();
        self.set_peers(peers.into_iter().collect());
        self.raft
            .initialize(members)
            .await
            .map_err(|err| HkvError::Internal(err.to_string()))
    }
}
