//! Deterministic projection from committed log entries to cache state.

use std::sync::Arc;

use bytes::BytesMut;
use kv_codec::{decode_command, Command};
use kv_common::Ttl;
use kv_engine::Cache;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::FsmReply;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub remaining_ttl_nanos: u64,
}

pub struct Fsm {
    cache: Arc<Cache>,
}

impl Fsm {
    pub fn new(cache: Arc<Cache>) -> Self {
        Fsm { cache }
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// Decodes `payload` with the shared codec and dispatches by command
    /// variant. A payload that fails to decode is logged and treated as
    /// applied — blocking log progress on it would let nodes disagree
    /// about what "applied" means.
    pub fn apply(&self, payload: &[u8]) -> FsmReply {
        let mut buf = BytesMut::from(payload);
        let cmd = match decode_command(&mut buf) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => {
                warn!("log entry payload is a truncated frame; applying as no-op");
                return FsmReply::default();
            }
            Err(err) => {
                warn!(%err, "log entry payload failed to decode; applying as no-op");
                return FsmReply::default();
            }
        };

        match cmd {
            Command::Set { key, value, ttl } => {
                self.cache.put(key, value, ttl);
                FsmReply::default()
            }
            Command::Del { key } => {
                self.cache.delete(&key);
                FsmReply::default()
            }
            Command::Get { key } => FsmReply {
                value: self.cache.get(&key).ok(),
            },
            Command::Join => FsmReply::default(),
        }
    }

    pub fn snapshot_entries(&self) -> Vec<SnapshotEntry> {
        self.cache
            .snapshot()
            .into_iter()
            .map(|(key, value, ttl)| SnapshotEntry {
                key,
                value,
                remaining_ttl_nanos: ttl.as_nanos(),
            })
            .collect()
    }

    pub fn restore(&self, entries: Vec<SnapshotEntry>) {
        let restored = entries
            .into_iter()
            .map(|e| (e.key, e.value, Ttl::from_nanos(e.remaining_ttl_nanos)))
            .collect();
        self.cache.restore(restored);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_codec::encode_command;
    use kv_common::{Key, Value};

    fn fsm() -> Fsm {
        Fsm::new(Arc::new(Cache::new(8, Ttl::ZERO, None)))
    }

    #[test]
    fn apply_set_then_get_through_cache() {
        let fsm = fsm();
        let mut buf = BytesMut::new();
        encode_command(
            &Command::Set {
                key: Key::new(b"k".to_vec()).unwrap(),
                value: Value::new(b"v".to_vec()).unwrap(),
                ttl: Ttl::ZERO,
            },
            &mut buf,
        );
        fsm.apply(&buf);
        assert!(fsm.cache().has(&Key::new(b"k".to_vec()).unwrap()));
    }

    #[test]
    fn apply_truncated_payload_does_not_panic() {
        let fsm = fsm();
        let reply = fsm.apply(&[0x02, 0x05, 0x00]);
        assert!(reply.value.is_none());
    }

    #[test]
    fn snapshot_restore_roundtrips() {
        let fsm = fsm();
        fsm.cache
            .put(Key::new(b"a".to_vec()).unwrap(), Value::new(b"1".to_vec()).unwrap(), Ttl::ZERO);
        let entries = fsm.snapshot_entries();

        let fsm2 = fsm();
        fsm2.restore(entries);
        assert!(fsm2.cache().has(&Key::new(b"a".to_vec()).unwrap()));
    }
}
