//! End-to-end exercise of the wire protocol: a real `TcpListener` running
//! `kv_server`'s dispatch loop, driven by `KvClient` over real sockets.
//!
//! The consensus seam is filled by a single-node, always-leader stub that
//! applies directly to the FSM — there is exactly one node, so there is
//! nothing to elect and nothing to replicate, but the dispatch and codec
//! path is exercised exactly as it would be against a real `RaftAdapter`.

use std::sync::Arc;
use std::time::Duration;

use kv_common::{HkvError, Ttl};
use kv_consensus::{ConsensusHandle, Fsm, FsmReply, NodeAddress, NodeId};
use kv_engine::Cache;
use kv_server::{run_listener, AppState};
use tokio::net::TcpListener;

struct SoloLeader {
    fsm: Fsm,
}

impl ConsensusHandle for SoloLeader {
    async fn apply(&self, payload: Vec<u8>, _timeout: Duration) -> Result<FsmReply, HkvError> {
        Ok(self.fsm.apply(&payload))
    }

    fn leader(&self) -> Option<NodeAddress> {
        Some(NodeAddress {
            id: 1,
            addr: "self".to_string(),
        })
    }

    async fn verify_leader(&self) -> Result<(), HkvError> {
        Ok(())
    }

    async fn bootstrap(&self, _peers: Vec<(NodeId, String)>) -> Result<(), HkvError> {
        Ok(())
    }
}

async fn spawn_server() -> String {
    let cache = Arc::new(Cache::new(64, Ttl::ZERO, None));
    let consensus = Arc::new(SoloLeader {
        fsm: Fsm::new(cache.clone()),
    });
    let state = Arc::new(AppState::new(cache, consensus));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(run_listener(listener, state));
    addr
}

#[tokio::test]
async fn put_then_get_roundtrips_over_the_wire() {
    let addr = spawn_server().await;
    let client = kv_client::KvClient::connect(&addr).await.unwrap();

    client.put(b"foo", b"bar", Ttl::ZERO).await.unwrap();
    let outcome = client.get(b"foo").await.unwrap();
    assert_eq!(outcome, kv_client::GetOutcome::Found(b"bar".to_vec()));
}

#[tokio::test]
async fn get_missing_key_reports_not_found() {
    let addr = spawn_server().await;
    let client = kv_client::KvClient::connect(&addr).await.unwrap();

    let outcome = client.get(b"nope").await.unwrap();
    assert_eq!(outcome, kv_client::GetOutcome::NotFound);
}

#[tokio::test]
async fn ttl_expiry_is_observed_over_the_wire() {
    let addr = spawn_server().await;
    let client = kv_client::KvClient::connect(&addr).await.unwrap();

    client
        .put(b"k", b"v", Ttl::from_duration(Duration::from_millis(20)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    let outcome = client.get(b"k").await.unwrap();
    assert_eq!(outcome, kv_client::GetOutcome::Expired);
}

#[tokio::test]
async fn delete_then_get_reports_not_found() {
    let addr = spawn_server().await;
    let client = kv_client::KvClient::connect(&addr).await.unwrap();

    client.put(b"a", b"1", Ttl::ZERO).await.unwrap();
    client.delete(b"a").await.unwrap();
    let outcome = client.get(b"a").await.unwrap();
    assert_eq!(outcome, kv_client::GetOutcome::NotFound);
}

#[tokio::test]
async fn two_requests_on_one_connection_are_answered_in_order() {
    let addr = spawn_server().await;
    let client = kv_client::KvClient::connect(&addr).await.unwrap();

    client.put(b"a", b"1", Ttl::ZERO).await.unwrap();
    client.put(b"b", b"2", Ttl::ZERO).await.unwrap();
    assert_eq!(
        client.get(b"a").await.unwrap(),
        kv_client::GetOutcome::Found(b"1".to_vec())
    );
    assert_eq!(
        client.get(b"b").await.unwrap(),
        kv_client::GetOutcome::Found(b"2".to_vec())
    );
}
