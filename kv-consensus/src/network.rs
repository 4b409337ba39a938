//! Plain TCP transport for openraft's `RaftNetwork`/`RaftNetworkFactory`,
//! carrying length-prefixed JSON frames — no second wire format alongside
//! the client-facing binary protocol beyond what replication needs.

use std::sync::Arc;

use openraft::error::{InstallSnapshotError, RPCError, RaftError, Unreachable};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use openraft::{AnyError, BasicNode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::types::{NodeId, RaftInstance, TypeConfig};

const TAG_APPEND_ENTRIES: u8 = 1;
const TAG_VOTE: u8 = 2;
const TAG_INSTALL_SNAPSHOT: u8 = 3;

#[derive(Serialize, Deserialize)]
enum RpcReply<T> {
    Ok(T),
    Err(String),
}

fn unreachable(msg: impl std::fmt::Display) -> Unreachable {
    Unreachable::new(&AnyError::error(msg.to_string()))
}

async fn write_frame<Req: Serialize>(
    stream: &mut TcpStream,
    tag: u8,
    req: &Req,
) -> std::io::Result<()> {
    let payload = serde_json::to_vec(req)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    stream.write_u8(tag).await?;
    stream.write_u32_le(payload.len() as u32).await?;
    stream.write_all(&payload).await?;
    stream.flush().await
}

async fn read_payload(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let len = stream.read_u32_le().await?;
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

fn parse<T: DeserializeOwned>(bytes: &[u8]) -> std::io::Result<T> {
    serde_json::from_slice(bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// A lazily-connected, auto-reconnecting client to one peer's raft control
/// port.
pub struct TcpNetwork {
    target_addr: String,
    stream: Option<TcpStream>,
}

impl TcpNetwork {
    async fn call<Req, Resp>(&mut self, tag: u8, req: &Req) -> std::io::Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        if self.stream.is_none() {
            self.stream = Some(TcpStream::connect(&self.target_addr).await?);
        }
        let outcome: std::io::Result<Resp> = async {
            let stream = self.stream.as_mut().unwrap();
            write_frame(stream, tag, req).await?;
            let payload = read_payload(stream).await?;
            match parse::<RpcReply<Resp>>(&payload)? {
                RpcReply::Ok(resp) => Ok(resp),
                RpcReply::Err(msg) => Err(std::io::Error::new(std::io::ErrorKind::Other, msg)),
            }
        }
        .await;
        if outcome.is_err() {
            self.stream = None;
        }
        outcome
    }
}

impl RaftNetwork<TypeConfig> for TcpNetwork {
    async fn append_entries(
        &mut self,
        rpc: AppendEntriesRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<AppendEntriesResponse<NodeId>, RPCError<NodeId, BasicNode, RaftError<NodeId>>> {
        self.call(TAG_APPEND_ENTRIES, &rpc)
            .await
            .map_err(|e| RPCError::Unreachable(unreachable(e)))
    }

    async fn vote(
        &mut self,
        rpc: VoteRequest<NodeId>,
        _option: RPCOption,
    ) -> Result<VoteResponse<NodeId>, RPCError<NodeId, BasicNode, RaftError<NodeId>>> {
        self.call(TAG_VOTE, &rpc)
            .await
            .map_err(|e| RPCError::Unreachable(unreachable(e)))
    }

    async fn install_snapshot(
        &mut self,
        rpc: InstallSnapshotRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<
        InstallSnapshotResponse<NodeId>,
        RPCError<NodeId, BasicNode, RaftError<NodeId, InstallSnapshotError>>,
    > {
        self.call(TAG_INSTALL_SNAPSHOT, &rpc)
            .await
            .map_err(|e| RPCError::Unreachable(unreachable(e)))
    }
}

pub struct TcpNetworkFactory;

impl RaftNetworkFactory<TypeConfig> for TcpNetworkFactory {
    type Network = TcpNetwork;

    async fn new_client(&mut self, _target: NodeId, node: &BasicNode) -> Self::Network {
        TcpNetwork {
            target_addr: node.addr.clone(),
            stream: None,
        }
    }
}

/// Accepts incoming raft control connections and dispatches each frame to
/// the local `Raft` instance. Runs until the listener errors out.
pub async fn serve_raft_network(listener: TcpListener, raft: Arc<RaftInstance>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(v) => v,
            Err(err) => {
                warn!(%err, "raft control listener accept failed");
                continue;
            }
        };
        let raft = raft.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, raft).await {
                debug!(%err, %peer, "raft control connection closed");
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, raft: Arc<RaftInstance>) -> std::io::Result<()> {
    loop {
        let tag = match stream.read_u8().await {
            Ok(t) => t,
            Err(_) => return Ok(()),
        };
        let payload = read_payload(&mut stream).await?;

        match tag {
            TAG_APPEND_ENTRIES => {
                let req: AppendEntriesRequest<TypeConfig> = parse(&payload)?;
                let reply = match raft.append_entries(req).await {
                    Ok(resp) => RpcReply::Ok(resp),
                    Err(err) => RpcReply::Err(err.to_string()),
                };
                respond(&mut stream, &reply).await?;
            }
            TAG_VOTE => {
                let req: VoteRequest<NodeId> = parse(&payload)?;
                let reply = match raft.vote(req).await {
                    Ok(resp) => RpcReply::Ok(resp),
                    Err(err) => RpcReply::Err(err.to_string()),
                };
                respond(&mut stream, &reply).await?;
            }
            TAG_INSTALL_SNAPSHOT => {
                let req: InstallSnapshotRequest<TypeConfig> = parse(&payload)?;
                let reply = match raft.install_snapshot(req).await {
                    Ok(resp) => RpcReply::Ok(resp),
                    Err(err) => RpcReply::Err(err.to_string()),
                };
                respond(&mut stream, &reply).await?;
            }
            other => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unknown raft rpc tag {other}"),
                ));
            }
        }
    }
}

async fn respond<T: Serialize>(stream: &mut TcpStream, reply: &RpcReply<T>) -> std::io::Result<()> {
    let bytes = serde_json::to_vec(reply)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    stream.write_u32_le(bytes.len() as u32).await?;
    stream.write_all(&bytes).await?;
    stream.flush().await
}
