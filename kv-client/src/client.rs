//! Synchronous-from-the-caller's-perspective client over one persistent
//! TCP connection: write a frame, read exactly the matching response,
//! translate the status byte into a [`ClientResult`].
//!
//! No connection pool and no transparent retry: a single connection is
//! held for the client's lifetime, and callers own retry policy.

use std::time::Duration;

use bytes::BytesMut;
use kv_codec::{
    decode_get_response, decode_set_response, encode_command, Command, Status,
};
use kv_common::{HkvError, Key, Ttl, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("key not found")]
    NotFound,
    #[error("key expired")]
    Expired,
    #[error("server returned an error status")]
    Server,
    #[error("invalid key or value: {0}")]
    InvalidArgument(#[from] HkvError),
    #[error("operation cancelled")]
    Cancelled,
}

/// Outcome of a `get`, distinguishing "present" from the two non-error
/// absent states a GET response can carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetOutcome {
    Found(Vec<u8>),
    NotFound,
    Expired,
}

/// One persistent connection to a single node. Not `Clone`: callers that
/// need concurrent operations from multiple tasks should wrap this in an
/// `Arc`, which is safe since each call takes the internal lock for the
/// duration of its own request/response round trip.
pub struct KvClient {
    stream: Mutex<TcpStream>,
}

impl KvClient {
    pub async fn connect(addr: &str) -> ClientResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(KvClient {
            stream: Mutex::new(stream),
        })
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        KvClient {
            stream: Mutex::new(stream),
        }
    }

    /// Sets `key` to `value`. `ttl == Ttl::ZERO` defers to the server's
    /// configured default TTL.
    pub async fn put(&self, key: &[u8], value: &[u8], ttl: Ttl) -> ClientResult<()> {
        let cmd = Command::Set {
            key: Key::new(key.to_vec())?,
            value: Value::new(value.to_vec())?,
            ttl,
        };
        let mut guard = self.stream.lock().await;
        write_command(&mut guard, &cmd).await?;
        let status = read_set_response(&mut guard).await?;
        status_to_unit(status)
    }

    pub async fn get(&self, key: &[u8]) -> ClientResult<GetOutcome> {
        let cmd = Command::Get {
            key: Key::new(key.to_vec())?,
        };
        let mut guard = self.stream.lock().await;
        write_command(&mut guard, &cmd).await?;
        let (status, value) = read_get_response(&mut guard).await?;
        match status {
            Status::Ok => Ok(GetOutcome::Found(value)),
            Status::NotFound => Ok(GetOutcome::NotFound),
            Status::Expired => Ok(GetOutcome::Expired),
            Status::Err => Err(ClientError::Server),
        }
    }

    pub async fn delete(&self, key: &[u8]) -> ClientResult<()> {
        let cmd = Command::Del {
            key: Key::new(key.to_vec())?,
        };
        let mut guard = self.stream.lock().await;
        write_command(&mut guard, &cmd).await?;
        let status = read_set_response(&mut guard).await?;
        status_to_unit(status)
    }

    /// Convenience wrapper applying a deadline to an in-flight call; on
    /// timeout, the underlying connection is shut down so any
    /// subsequently-completing write/read on it observes an error rather
    /// than silently finishing against a caller who has moved on.
    pub async fn put_with_timeout(
        &self,
        key: &[u8],
        value: &[u8],
        ttl: Ttl,
        timeout: Duration,
    ) -> ClientResult<()> {
        match tokio::time::timeout(timeout, self.put(key, value, ttl)).await {
            Ok(result) => result,
            Err(_) => {
                self.cancel().await;
                Err(ClientError::Cancelled)
            }
        }
    }

    /// Aborts any in-flight operation by shutting down the socket. A
    /// subsequent call on this client will fail; callers that want to
    /// keep using the client should construct a new one.
    pub async fn cancel(&self) {
        debug!("cancelling in-flight operation, closing connection");
        let mut guard = self.stream.lock().await;
        let _ = guard.shutdown().await;
    }
}

async fn write_command(stream: &mut TcpStream, cmd: &Command) -> ClientResult<()> {
    let mut buf = BytesMut::new();
    encode_command(cmd, &mut buf);
    stream.write_all(&buf).await?;
    Ok(())
}

async fn read_set_response(stream: &mut TcpStream) -> ClientResult<Status> {
    let mut buf = BytesMut::new();
    loop {
        if let Some(status) =
            decode_set_response(&mut buf).map_err(|e| ClientError::Protocol(e.to_string()))?
        {
            return Ok(status);
        }
        read_more(stream, &mut buf).await?;
    }
}

async fn read_get_response(stream: &mut TcpStream) -> ClientResult<(Status, Vec<u8>)> {
    let mut buf = BytesMut::new();
    loop {
        if let Some(result) =
            decode_get_response(&mut buf).map_err(|e| ClientError::Protocol(e.to_string()))?
        {
            return Ok(result);
        }
        read_more(stream, &mut buf).await?;
    }
}

async fn read_more(stream: &mut TcpStream, buf: &mut BytesMut) -> ClientResult<()> {
    let mut chunk = [0u8; 4096];
    let n = stream.read(&mut chunk).await?;
    if n == 0 {
        return Err(ClientError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed before a full response was read",
        )));
    }
    buf.extend_from_slice(&chunk[..n]);
    Ok(())
}

fn status_to_unit(status: Status) -> ClientResult<()> {
    match status {
        Status::Ok => Ok(()),
        Status::Err => Err(ClientError::Server),
        Status::NotFound => Err(ClientError::NotFound),
        Status::Expired => Err(ClientError::Expired),
    }
}
