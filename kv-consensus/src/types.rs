use std::io::Cursor;

use openraft::{BasicNode, Entry, TokioRuntime};
use serde::{Deserialize, Serialize};

pub type NodeId = u64;

/// Result of applying one committed log entry to the cache: `()` for
/// SET/DEL, the resolved value for GET. The consensus adapter hands this
/// back to the caller of `apply` as its `apply_result`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FsmReply {
    pub value: Option<Vec<u8>>,
}

// The `D` type is the codec's encoded command bytes: SET entries are
// byte-identical whether they arrive over the client socket or replay
// from the log, so the log payload is just what the codec produced.
openraft::declare_raft_types!(
    pub TypeConfig:
        D = Vec<u8>,
        R = FsmReply,
        NodeId = NodeId,
        Node = BasicNode,
        Entry = Entry<TypeConfig>,
        SnapshotData = Cursor<Vec<u8>>,
        AsyncRuntime = TokioRuntime,
);

pub type RaftInstance = openraft::Raft<TypeConfig>;

#[derive(Debug, Clone)]
pub struct NodeAddress {
    pub id: NodeId,
    pub addr: String,
}
