//! `sled`-backed implementation of openraft's v1 `RaftStorage`, wrapped by
//! `openraft::storage::Adaptor` into the v2 `RaftLogStorage` +
//! `RaftStateMachine` split `Raft::new` expects.
//!
//! Two separate `sled` trees back this, named after the node ID per the
//! persisted-state convention: `raft-log-<id>` holds the replicated log,
//! `raft-stable-<id>` holds the vote and state-machine bookkeeping.

use std::io::Cursor;
use std::ops::RangeBounds;
use std::path::Path;
use std::sync::Arc;

use openraft::storage::{RaftLogReader, RaftSnapshotBuilder, RaftStorage};
use openraft::{
    BasicNode, Entry, EntryPayload, LogId, LogState, RaftLogId, Snapshot, SnapshotMeta,
    StorageError, StorageIOError, StoredMembership, Vote,
};

use crate::fsm::{Fsm, SnapshotEntry};
use crate::types::{FsmReply, NodeId, TypeConfig};

const KEY_VOTE: &str = "vote";
const KEY_COMMITTED: &str = "committed";
const KEY_LAST_APPLIED: &str = "last_applied";
const KEY_LAST_MEMBERSHIP: &str = "last_membership";
const KEY_LAST_PURGED: &str = "last_purged";

fn io_err(e: impl std::error::Error + Send + Sync + 'static) -> StorageError<NodeId> {
    StorageIOError::write(&e).into()
}

pub struct SledStorage {
    log_db: sled::Db,
    stable_db: sled::Db,
    fsm: Arc<Fsm>,
}

impl SledStorage {
    pub fn open(data_dir: &Path, node_id: NodeId, fsm: Arc<Fsm>) -> sled::Result<Self> {
        let log_db = sled::open(data_dir.join(format!("raft-log-{node_id}")))?;
        let stable_db = sled::open(data_dir.join(format!("raft-stable-{node_id}")))?;
        Ok(SledStorage {
            log_db,
            stable_db,
            fsm,
        })
    }

    fn get_typed<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError<NodeId>> {
        let raw = self.stable_db.get(key).map_err(io_err)?;
        match raw {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(io_err)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn put_typed<T: serde::Serialize>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), StorageError<NodeId>> {
        let bytes = serde_json::to_vec(value).map_err(io_err)?;
        self.stable_db.insert(key, bytes).map_err(io_err)?;
        Ok(())
    }
}

impl RaftLogReader<TypeConfig> for SledStorage {
    async fn try_get_log_entries<RB>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry<TypeConfig>>, StorageError<NodeId>>
    where
        RB: RangeBounds<u64> + Clone + std::fmt::Debug + Send,
    {
        read_log_range(&self.log_db, range)
    }
}

fn read_log_range<RB>(
    log_db: &sled::Db,
    range: RB,
) -> Result<Vec<Entry<TypeConfig>>, StorageError<NodeId>>
where
    RB: RangeBounds<u64>,
{
    let mut entries = Vec::new();
    for item in log_db.iter() {
        let (k, v) = item.map_err(io_err)?;
        let idx = u64::from_be_bytes(k.as_ref().try_into().unwrap());
        if range.contains(&idx) {
            let entry: Entry<TypeConfig> = serde_json::from_slice(&v).map_err(io_err)?;
            entries.push(entry);
        }
    }
    entries.sort_by_key(|e| e.get_log_id().index);
    Ok(entries)
}

pub struct SledLogReader {
    log_db: sled::Db,
}

impl RaftLogReader<TypeConfig> for SledLogReader {
    async fn try_get_log_entries<RB>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry<TypeConfig>>, StorageError<NodeId>>
    where
        RB: RangeBounds<u64> + Clone + std::fmt::Debug + Send,
    {
        read_log_range(&self.log_db, range)
    }
}

pub struct SledSnapshotBuilder {
    last_applied: Option<LogId<NodeId>>,
    last_membership: StoredMembership<NodeId, BasicNode>,
    fsm: Arc<Fsm>,
}

impl RaftSnapshotBuilder<TypeConfig> for SledSnapshotBuilder {
    async fn build_snapshot(&mut self) -> Result<Snapshot<TypeConfig>, StorageError<NodeId>> {
        let entries = self.fsm.snapshot_entries();
        let data = serde_json::to_vec(&entries).map_err(io_err)?;
        let snap_id = format!(
            "{}-{}",
            self.last_applied.map(|l| l.index).unwrap_or(0),
            data.len()
        );
        Ok(Snapshot {
            meta: SnapshotMeta {
                last_log_id: self.last_applied,
                last_membership: self.last_membership.clone(),
                snapshot_id: snap_id,
            },
            snapshot: Box::new(Cursor::new(data)),
        })
    }
}

impl RaftStorage<TypeConfig> for SledStorage {
    type LogReader = SledLogReader;
    type SnapshotBuilder = SledSnapshotBuilder;

    async fn save_vote(&mut self, vote: &Vote<NodeId>) -> Result<(), StorageError<NodeId>> {
        self.put_typed(KEY_VOTE, vote)
    }

    async fn read_vote(&mut self) -> Result<Option<Vote<NodeId>>, StorageError<NodeId>> {
        self.get_typed(KEY_VOTE)
    }

    async fn get_log_state(&mut self) -> Result<LogState<TypeConfig>, StorageError<NodeId>> {
        let last_purged = self.get_typed(KEY_LAST_PURGED)?;
        let last = read_log_range(&self.log_db, ..)?
            .into_iter()
            .last()
            .map(|e| *e.get_log_id());
        Ok(LogState {
            last_purged_log_id: last_purged,
            last_log_id: last,
        })
    }

    async fn save_committed(
        &mut self,
        committed: Option<LogId<NodeId>>,
    ) -> Result<(), StorageError<NodeId>> {
        self.put_typed(KEY_COMMITTED, &committed)
    }

    async fn read_committed(&mut self) -> Result<Option<LogId<NodeId>>, StorageError<NodeId>> {
        Ok(self.get_typed(KEY_COMMITTED)?.flatten())
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        SledLogReader {
            log_db: self.log_db.clone(),
        }
    }

    async fn append_to_log<I>(&mut self, entries: I) -> Result<(), StorageError<NodeId>>
    where
        I: IntoIterator<Item = Entry<TypeConfig>> + Send,
    {
        for entry in entries {
            let idx = entry.get_log_id().index;
            let bytes = serde_json::to_vec(&entry).map_err(io_err)?;
            self.log_db
                .insert(idx.to_be_bytes(), bytes)
                .map_err(io_err)?;
        }
        Ok(())
    }

    async fn delete_conflict_logs_since(
        &mut self,
        log_id: LogId<NodeId>,
    ) -> Result<(), StorageError<NodeId>> {
        let to_remove: Vec<_> = self
            .log_db
            .iter()
            .keys()
            .filter_map(|k| k.ok())
            .filter(|k| u64::from_be_bytes(k.as_ref().try_into().unwrap()) >= log_id.index)
            .collect();
        for k in to_remove {
            self.log_db.remove(k).map_err(io_err)?;
        }
        Ok(())
    }

    async fn purge_logs_upto(&mut self, log_id: LogId<NodeId>) -> Result<(), StorageError<NodeId>> {
        let to_remove: Vec<_> = self
            .log_db
            .iter()
            .keys()
            .filter_map(|k| k.ok())
            .filter(|k| u64::from_be_bytes(k.as_ref().try_into().unwrap()) <= log_id.index)
            .collect();
        for k in to_remove {
            self.log_db.remove(k).map_err(io_err)?;
        }
        self.put_typed(KEY_LAST_PURGED, &log_id)
    }

    async fn last_applied_state(
        &mut self,
    ) -> Result<(Option<LogId<NodeId>>, StoredMembership<NodeId, BasicNode>), StorageError<NodeId>>
    {
        let last_applied = self.get_typed(KEY_LAST_APPLIED)?.flatten();
        let last_membership = self
            .get_typed(KEY_LAST_MEMBERSHIP)?
            .unwrap_or_default();
        Ok((last_applied, last_membership))
    }

    async fn apply_to_state_machine(
        &mut self,
        entries: &[Entry<TypeConfig>],
    ) -> Result<Vec<FsmReply>, StorageError<NodeId>> {
        let mut replies = Vec::with_capacity(entries.len());
        let mut last_applied = None;
        let mut last_membership = None;

        for entry in entries {
            last_applied = Some(*entry.get_log_id());
            match &entry.payload {
                EntryPayload::Blank => replies.push(FsmReply::default()),
                EntryPayload::Normal(payload) => replies.push(self.fsm.apply(payload)),
                EntryPayload::Membership(m) => {
                    let membership = StoredMembership::new(Some(*entry.get_log_id()), m.clone());
                    last_membership = Some(membership);
                    replies.push(FsmReply::default());
                }
            }
        }

        if let Some(l) = last_applied {
            self.put_typed(KEY_LAST_APPLIED, &Some(l))?;
        }
        if let Some(m) = last_membership {
            self.put_typed(KEY_LAST_MEMBERSHIP, &m)?;
        }
        Ok(replies)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        let (last_applied, last_membership) = self
            .last_applied_state()
            .await
            .unwrap_or((None, StoredMembership::default()));
        SledSnapshotBuilder {
            last_applied,
            last_membership,
            fsm: self.fsm.clone(),
        }
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<Box<Cursor<Vec<u8>>>, StorageError<NodeId>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<NodeId, BasicNode>,
        snapshot: Box<Cursor<Vec<u8>>>,
    ) -> Result<(), StorageError<NodeId>> {
        let entries: Vec<SnapshotEntry> =
            serde_json::from_slice(snapshot.get_ref()).map_err(io_err)?;
        self.fsm.restore(entries);
        self.put_typed(KEY_LAST_APPLIED, &meta.last_log_id)?;
        self.put_typed(KEY_LAST_MEMBERSHIP, &meta.last_membership)?;
        Ok(())
    }

    async fn get_current_snapshot(
        &mut self,
    ) -> Result<Option<Snapshot<TypeConfig>>, StorageError<NodeId>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_common::Ttl;
    use kv_engine::Cache;
    use openraft::CommittedLeaderId;

    fn storage() -> (tempfile::TempDir, SledStorage) {
        let dir = tempfile::tempdir().unwrap();
        let fsm = Arc::new(Fsm::new(Arc::new(Cache::new(8, Ttl::ZERO, None))));
        let storage = SledStorage::open(dir.path(), 1, fsm).unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn vote_roundtrips() {
        let (_dir, mut s) = storage();
        let vote = Vote::new(1, 7);
        s.save_vote(&vote).await.unwrap();
        assert_eq!(s.read_vote().await.unwrap(), Some(vote));
    }

    #[tokio::test]
    async fn append_and_read_log_entries() {
        let (_dir, mut s) = storage();
        let log_id = LogId::new(CommittedLeaderId::new(1, 1), 1);
        let entry = Entry::<TypeConfig> {
            log_id,
            payload: EntryPayload::Blank,
        };
        s.append_to_log(vec![entry]).await.unwrap();
        let entries = s.try_get_log_entries(0..10).await.unwrap();
        assert_eq!(entries.len(), 1);
    }
}
