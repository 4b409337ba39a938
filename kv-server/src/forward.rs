//! Transparent forwarding of a SET command to the current leader, used
//! when a follower receives a write it cannot apply itself.

use bytes::BytesMut;
use kv_codec::{decode_set_response, encode_command, Command, Status};
use kv_common::HkvError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Dials `leader_addr`, sends `cmd` verbatim, and returns the leader's
/// parsed SET response status. A fresh connection is used per forward —
/// this is not on the hot path for a stable leader and keeping it
/// connectionless avoids another piece of long-lived state to manage.
pub async fn forward_set(leader_addr: &str, cmd: &Command) -> Result<Status, HkvError> {
    let mut stream = TcpStream::connect(leader_addr)
        .await
        .map_err(HkvError::Transport)?;

    let mut out = BytesMut::new();
    encode_command(cmd, &mut out);
    stream.write_all(&out).await.map_err(HkvError::Transport)?;

    let mut in_buf = BytesMut::new();
    loop {
        if let Some(status) = decode_set_response(&mut in_buf)
            .map_err(|e| HkvError::Protocol(e.to_string()))?
        {
            return Ok(status);
        }
        let mut chunk = [0u8; 256];
        let n = stream.read(&mut chunk).await.map_err(HkvError::Transport)?;
        if n == 0 {
            return Err(HkvError::Transport(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "leader closed connection mid-response",
            )));
        }
        in_buf.extend_from_slice(&chunk[..n]);
    }
}
