//! Per-connection framing loop.
//!
//! `READING_FRAME` → parse one command from the socket. `DISPATCHING` →
//! route it. `WRITING_RESPONSE` → write the encoded reply, then back to
//! `READING_FRAME`. Dispatch runs synchronously inside this loop so
//! responses on one connection are always emitted in request order —
//! nothing here spawns a task per command.

use std::sync::Arc;

use bytes::BytesMut;
use kv_codec::decode_command;
use kv_consensus::ConsensusHandle;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::server::{dispatch_command, AppState};

const READ_CHUNK: usize = 4096;

pub async fn handle_connection<C: ConsensusHandle + 'static>(
    mut stream: TcpStream,
    state: Arc<AppState<C>>,
) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let mut read_buf = BytesMut::with_capacity(READ_CHUNK);

    loop {
        // READING_FRAME: keep filling the buffer until one full command
        // parses out of it, or the socket is closed.
        let cmd = loop {
            match decode_command(&mut read_buf) {
                Ok(Some(cmd)) => break Some(cmd),
                Ok(None) => {}
                Err(err) => {
                    warn!(%peer, %err, "protocol error, closing connection");
                    return;
                }
            }

            let mut chunk = [0u8; READ_CHUNK];
            match stream.read(&mut chunk).await {
                Ok(0) => break None, // clean EOF at a frame boundary
                Ok(n) => read_buf.extend_from_slice(&chunk[..n]),
                Err(err) => {
                    debug!(%peer, %err, "transport error reading frame");
                    return;
                }
            }
        };

        let Some(cmd) = cmd else {
            if read_buf.is_empty() {
                debug!(%peer, "connection closed at frame boundary");
            } else {
                warn!(%peer, buffered = read_buf.len(), "eof mid-frame, closing connection");
            }
            return;
        };

        // DISPATCHING
        let start = state.metrics.record_request_start();
        let response = dispatch_command(&state, cmd).await;
        state.metrics.record_request_end(start);
        if response.is_err_status() {
            state.metrics.record_error();
        }

        // WRITING_RESPONSE
        if let Err(err) = stream.write_all(response.as_bytes()).await {
            debug!(%peer, %err, "transport error writing response");
            return;
        }
    }
}
