use std::fmt;

/// Typed failure kinds shared across the codec, engine, consensus, and
/// server layers. Every request-facing error the core can produce maps to
/// exactly one of these variants.
#[derive(Debug, thiserror::Error)]
pub enum HkvError {
    /// Malformed frame, unknown command byte, or an oversized length
    /// field. Connection-fatal: the caller must close the socket.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Key absent from the cache.
    #[error("key not found: {0}")]
    NotFound(KeyDisplay),

    /// Key present but past its TTL. The entry has already been removed.
    #[error("key expired: {0}")]
    Expired(KeyDisplay),

    /// A write, or a linearizable read, was attempted on a node that is
    /// not (or is no longer) the Raft leader.
    #[error("not leader")]
    NotLeader,

    /// Consensus did not report commit within the configured timeout.
    /// The entry may still apply later; callers must treat this as
    /// "unknown", not "failed".
    #[error("apply timed out")]
    ApplyTimeout,

    /// Socket-level I/O failure. Connection-fatal, never surfaced to the
    /// remote peer as a response frame.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// An invariant was violated. The process should not continue.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

/// Lossy display of a key for error messages; keys are opaque bytes and
/// may not be valid UTF-8.
#[derive(Debug, Clone)]
pub struct KeyDisplay(pub Vec<u8>);

impl fmt::Display for KeyDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl From<&[u8]> for KeyDisplay {
    fn from(bytes: &[u8]) -> Self {
        KeyDisplay(bytes.to_vec())
    }
}

pub type HkvResult<T> = Result<T, HkvError>;
