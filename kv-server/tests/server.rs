//! Server-level scenarios that don't belong in `kv-client`'s tests: raw
//! socket behavior around partial frames and disconnects, and LRU
//! eviction observed end-to-end through the wire protocol.

use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use kv_common::{HkvError, Ttl};
use kv_consensus::{ConsensusHandle, Fsm, FsmReply, NodeAddress, NodeId};
use kv_engine::Cache;
use kv_server::{run_listener, AppState};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

struct SoloLeader {
    fsm: Fsm,
}

impl ConsensusHandle for SoloLeader {
    async fn apply(&self, payload: Vec<u8>, _timeout: Duration) -> Result<FsmReply, HkvError> {
        Ok(self.fsm.apply(&payload))
    }

    fn leader(&self) -> Option<NodeAddress> {
        Some(NodeAddress { id: 1, addr: "self".to_string() })
    }

    async fn verify_leader(&self) -> Result<(), HkvError> {
        Ok(())
    }

    async fn bootstrap(&self, _peers: Vec<(NodeId, String)>) -> Result<(), HkvError> {
        Ok(())
    }
}

async fn spawn_server_with_capacity(capacity: usize) -> String {
    let cache = Arc::new(Cache::new(capacity, Ttl::ZERO, None));
    let consensus = Arc::new(SoloLeader { fsm: Fsm::new(cache.clone()) });
    let state = Arc::new(AppState::new(cache, consensus));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(run_listener(listener, state));
    addr
}

#[tokio::test]
async fn partial_frame_then_disconnect_does_not_crash_the_listener() {
    let addr = spawn_server_with_capacity(4).await;

    // Write the first 3 bytes of a SET frame, then drop the connection.
    let mut stream = TcpStream::connect(&addr).await.unwrap();
    let mut partial = BytesMut::new();
    partial.put_u8(0x01); // SET tag
    partial.put_u8(0x03); // first byte of a 4-byte key length
    partial.put_u8(0x00);
    stream.write_all(&partial).await.unwrap();
    drop(stream);

    // The listener must still be serving other connections afterward.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut stream = TcpStream::connect(&addr).await.unwrap();
    let mut frame = BytesMut::new();
    kv_codec::encode_command(
        &kv_codec::Command::Get { key: kv_common::Key::new(b"x".to_vec()).unwrap() },
        &mut frame,
    );
    stream.write_all(&frame).await.unwrap();
    let mut resp = [0u8; 5];
    stream.read_exact(&mut resp).await.unwrap();
    assert_eq!(resp[0], kv_codec::Status::NotFound.as_u8());
}

#[tokio::test]
async fn lru_eviction_observed_through_the_wire() {
    let addr = spawn_server_with_capacity(2).await;
    let client = kv_client::KvClient::connect(&addr).await.unwrap();

    client.put(b"a", b"1", Ttl::ZERO).await.unwrap();
    client.put(b"b", b"2", Ttl::ZERO).await.unwrap();
    client.get(b"a").await.unwrap(); // a is now MRU, b is LRU
    client.put(b"c", b"3", Ttl::ZERO).await.unwrap();

    assert_eq!(
        client.get(b"a").await.unwrap(),
        kv_client::GetOutcome::Found(b"1".to_vec())
    );
    assert_eq!(
        client.get(b"c").await.unwrap(),
        kv_client::GetOutcome::Found(b"3".to_vec())
    );
    assert_eq!(client.get(b"b").await.unwrap(), kv_client::GetOutcome::NotFound);
}
