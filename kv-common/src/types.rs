use std::time::Duration;

use crate::error::HkvError;

/// Maximum key length in bytes: 0 < length ≤ 65535.
pub const MAX_KEY_LEN: usize = 65_535;

/// Maximum value length in bytes: 0 ≤ length ≤ 16 MiB.
pub const MAX_VALUE_LEN: usize = 16 * 1024 * 1024;

/// An opaque byte string compared by byte identity. Bounded to
/// [`MAX_KEY_LEN`]; construction is the only place the bound is enforced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Vec<u8>);

impl Key {
    pub fn new(bytes: Vec<u8>) -> Result<Self, HkvError> {
        if bytes.is_empty() || bytes.len() > MAX_KEY_LEN {
            return Err(HkvError::Protocol(format!(
                "key length {} out of bounds (1..={})",
                bytes.len(),
                MAX_KEY_LEN
            )));
        }
        Ok(Key(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// An opaque value payload, bounded to [`MAX_VALUE_LEN`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value(Vec<u8>);

impl Value {
    pub fn new(bytes: Vec<u8>) -> Result<Self, HkvError> {
        if bytes.len() > MAX_VALUE_LEN {
            return Err(HkvError::Protocol(format!(
                "value length {} exceeds maximum {}",
                bytes.len(),
                MAX_VALUE_LEN
            )));
        }
        Ok(Value(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Value {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A per-entry or cache-wide time-to-live, stored as nanoseconds on the
/// wire. `ZERO` means "use the cache's default" when attached to a
/// command, and "never expire" when it is the resolved, effective TTL of
/// an entry — the codec and the engine disambiguate these two meanings
/// at the point each is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ttl(u64);

impl Ttl {
    pub const ZERO: Ttl = Ttl(0);

    pub fn from_nanos(nanos: u64) -> Self {
        Ttl(nanos)
    }

    pub fn from_duration(d: Duration) -> Self {
        Ttl(d.as_nanos().min(u64::MAX as u128) as u64)
    }

    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_nanos(self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Resolves a per-entry override against a cache-wide default: a zero
    /// override means "use the default"; a zero default and zero override
    /// together mean "never expire".
    pub fn effective(override_ttl: Ttl, default_ttl: Ttl) -> Ttl {
        if override_ttl.is_zero() {
            default_ttl
        } else {
            override_ttl
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_rejects_empty_and_oversized() {
        assert!(Key::new(vec![]).is_err());
        assert!(Key::new(vec![0u8; MAX_KEY_LEN + 1]).is_err());
        assert!(Key::new(vec![0u8; MAX_KEY_LEN]).is_ok());
    }

    #[test]
    fn value_allows_empty_rejects_oversized() {
        assert!(Value::new(vec![]).is_ok());
        assert!(Value::new(vec![0u8; MAX_VALUE_LEN + 1]).is_err());
    }

    #[test]
    fn ttl_effective_prefers_override() {
        let default = Ttl::from_nanos(1_000);
        assert_eq!(Ttl::effective(Ttl::ZERO, default), default);
        assert_eq!(
            Ttl::effective(Ttl::from_nanos(5), default),
            Ttl::from_nanos(5)
        );
        assert_eq!(Ttl::effective(Ttl::ZERO, Ttl::ZERO), Ttl::ZERO);
    }
}
