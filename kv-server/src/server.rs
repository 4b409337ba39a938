//! Accept loop and command dispatch.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use kv_codec::{encode_get_response, encode_set_response, Command, Status};
use kv_common::HkvError;
use kv_consensus::ConsensusHandle;
use kv_engine::Cache;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::connection::handle_connection;
use crate::forward::forward_set;
use crate::metrics::Metrics;

pub const DEFAULT_APPLY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct AppState<C: ConsensusHandle> {
    pub cache: Arc<Cache>,
    pub consensus: Arc<C>,
    pub metrics: Arc<Metrics>,
    pub apply_timeout: Duration,
    /// When set, GET is served from the local cache without
    /// `verify_leader()` — an explicit opt-in that trades linearizability
    /// for latency.
    pub local_reads: bool,
}

impl<C: ConsensusHandle> AppState<C> {
    pub fn new(cache: Arc<Cache>, consensus: Arc<C>) -> Self {
        AppState {
            cache,
            consensus,
            metrics: Arc::new(Metrics::new()),
            apply_timeout: DEFAULT_APPLY_TIMEOUT,
            local_reads: false,
        }
    }

    pub fn with_local_reads(mut self, local_reads: bool) -> Self {
        self.local_reads = local_reads;
        self
    }
}

pub struct DispatchResponse {
    bytes: BytesMut,
    err: bool,
}

impl DispatchResponse {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_err_status(&self) -> bool {
        self.err
    }
}

pub async fn run_listener<C: ConsensusHandle + 'static>(
    listener: TcpListener,
    state: Arc<AppState<C>>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!(%addr, "accepted connection");
                let state = state.clone();
                tokio::spawn(async move {
                    handle_connection(stream, state).await;
                });
            }
            Err(err) => {
                error!(%err, "accept failed");
            }
        }
    }
}

pub async fn dispatch_command<C: ConsensusHandle>(
    state: &AppState<C>,
    cmd: Command,
) -> DispatchResponse {
    match cmd {
        Command::Get { ref key } => {
            if !state.local_reads {
                if let Err(err) = state.consensus.verify_leader().await {
                    warn!(%err, "get rejected: not leader");
                    let mut bytes = BytesMut::new();
                    encode_get_response(&mut bytes, Status::Err, None);
                    return DispatchResponse { bytes, err: true };
                }
            }
            let mut bytes = BytesMut::new();
            match state.cache.get(key) {
                Ok(value) => encode_get_response(&mut bytes, Status::Ok, Some(&value)),
                Err(HkvError::Expired(_)) => encode_get_response(&mut bytes, Status::Expired, None),
                Err(_) => encode_get_response(&mut bytes, Status::NotFound, None),
            }
            DispatchResponse { bytes, err: false }
        }

        Command::Set { .. } | Command::Del { .. } => {
            let mut payload = BytesMut::new();
            kv_codec::encode_command(&cmd, &mut payload);
            let mut bytes = BytesMut::new();

            match state
                .consensus
                .apply(payload.to_vec(), state.apply_timeout)
                .await
            {
                Ok(_) => {
                    encode_set_response(&mut bytes, Status::Ok);
                    DispatchResponse { bytes, err: false }
                }
                Err(HkvError::NotLeader) => match state.consensus.leader() {
                    Some(leader) => match forward_set(&leader.addr, &cmd).await {
                        Ok(status) => {
                            encode_set_response(&mut bytes, status);
                            DispatchResponse {
                                bytes,
                                err: !matches!(status, Status::Ok),
                            }
                        }
                        Err(err) => {
                            warn!(%err, "forward to leader failed");
                            encode_set_response(&mut bytes, Status::Err);
                            DispatchResponse { bytes, err: true }
                        }
                    },
                    None => {
                        warn!("not leader and no known leader to forward to");
                        encode_set_response(&mut bytes, Status::Err);
                        DispatchResponse { bytes, err: true }
                    }
                },
                Err(err) => {
                    warn!(%err, "apply failed");
                    encode_set_response(&mut bytes, Status::Err);
                    DispatchResponse { bytes, err: true }
                }
            }
        }

        Command::Join => {
            // Membership changes go through the consensus transport (see
            // `kv_consensus::ConsensusHandle::bootstrap`); this frame
            // carries no meaning at this layer, so it is a no-op reply.
            let mut bytes = BytesMut::new();
            encode_set_response(&mut bytes, Status::Ok);
            DispatchResponse { bytes, err: false }
        }
    }
}

pub fn socket_addr(addr: &str) -> std::io::Result<SocketAddr> {
    addr.parse()
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid listen address"))
}
