//! Bounded LRU + per-entry TTL cache.
//!
//! The structure is an intrusive doubly-linked list (head = most recently
//! used, tail = least recently used) layered over an index arena, paired
//! with a hash map from key to arena index. A single `RwLock` guards both;
//! `get` mutates LRU order and so always takes the write side, while `has`
//! and `stats` only read and take the read side. This mirrors a sharded
//! arena-backed engine collapsed to one shard: LRU order and expiry are
//! checked and updated under one exclusive critical section rather than
//! striped locking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ahash::RandomState;
use kv_common::error::KeyDisplay;
use kv_common::{HkvError, Key, Ttl, Value};
use parking_lot::RwLock;
use tracing::debug;

/// Invoked with the evicted `(key, value)` after the entry has left the
/// store and after the cache's internal lock has been released. Never
/// invoked for explicit `delete` or for TTL-expiry removals — only for
/// capacity-driven LRU eviction.
pub type EvictionCallback = Arc<dyn Fn(Vec<u8>, Vec<u8>) + Send + Sync>;

struct Node {
    key: Arc<[u8]>,
    value: Vec<u8>,
    inserted_at: Instant,
    effective_ttl: Ttl,
    prev: Option<usize>,
    next: Option<usize>,
}

impl Node {
    fn is_expired(&self, now: Instant) -> bool {
        !self.effective_ttl.is_zero()
            && now.duration_since(self.inserted_at) >= self.effective_ttl.as_duration()
    }
}

struct Inner {
    map: HashMap<Arc<[u8]>, usize, RandomState>,
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl Inner {
    fn new() -> Self {
        Inner {
            map: HashMap::with_hasher(RandomState::new()),
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.nodes[idx].as_ref().unwrap();
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.nodes[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.nodes[idx].as_mut().unwrap();
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            self.nodes[h].as_mut().unwrap().prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn touch(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn alloc(&mut self, node: Node) -> usize {
        if let Some(idx) = self.free.pop() {
            self.nodes[idx] = Some(node);
            idx
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    /// Removes the node at `idx` from the list and the index arena, and
    /// from the key map. Returns the removed node so the caller can
    /// extract its key/value after releasing the lock.
    fn remove_idx(&mut self, idx: usize) -> Node {
        self.unlink(idx);
        let node = self.nodes[idx].take().unwrap();
        self.free.push(idx);
        self.map.remove(&node.key);
        self.len -= 1;
        node
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

pub struct Cache {
    inner: RwLock<Inner>,
    capacity: usize,
    default_ttl: Ttl,
    on_evict: Option<EvictionCallback>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl Cache {
    pub fn new(capacity: usize, default_ttl: Ttl, on_evict: Option<EvictionCallback>) -> Self {
        Cache {
            inner: RwLock::new(Inner::new()),
            capacity: capacity.max(1),
            default_ttl,
            on_evict,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Upsert. Never fails for capacity reasons: evicts the LRU entry
    /// first if the store is full and the key is new.
    pub fn put(&self, key: Key, value: Value, ttl_override: Ttl) {
        let key_arc: Arc<[u8]> = Arc::from(key.as_bytes());
        let effective_ttl = Ttl::effective(ttl_override, self.default_ttl);
        let now = Instant::now();

        let evicted = {
            let mut inner = self.inner.write();
            if let Some(&idx) = inner.map.get(key_arc.as_ref()) {
                {
                    let node = inner.nodes[idx].as_mut().unwrap();
                    node.value = value.into_bytes();
                    node.inserted_at = now;
                    node.effective_ttl = effective_ttl;
                }
                inner.touch(idx);
                None
            } else {
                let evicted = if inner.len >= self.capacity {
                    inner.tail.map(|tail_idx| inner.remove_idx(tail_idx))
                } else {
                    None
                };
                let node = Node {
                    key: key_arc.clone(),
                    value: value.into_bytes(),
                    inserted_at: now,
                    effective_ttl,
                    prev: None,
                    next: None,
                };
                let idx = inner.alloc(node);
                inner.push_front(idx);
                inner.map.insert(key_arc, idx);
                inner.len += 1;
                evicted
            }
        };

        if let Some(node) = evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            if let Some(cb) = &self.on_evict {
                cb(node.key.to_vec(), node.value);
            }
        }
    }

    /// On hit, checks expiry under the same exclusive critical section
    /// that bumps LRU order — no release-and-reacquire window.
    pub fn get(&self, key: &Key) -> Result<Vec<u8>, HkvError> {
        let now = Instant::now();
        let mut inner = self.inner.write();
        let idx = match inner.map.get(key.as_bytes()) {
            Some(&idx) => idx,
            None => {
                drop(inner);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Err(HkvError::NotFound(KeyDisplay(key.as_bytes().to_vec())));
            }
        };

        if inner.nodes[idx].as_ref().unwrap().is_expired(now) {
            inner.remove_idx(idx);
            drop(inner);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Err(HkvError::Expired(KeyDisplay(key.as_bytes().to_vec())));
        }

        inner.touch(idx);
        let value = inner.nodes[idx].as_ref().unwrap().value.clone();
        drop(inner);
        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    /// Non-mutating presence check. Expired entries read as absent but
    /// are left in place so a shared read never mutates structure.
    pub fn has(&self, key: &Key) -> bool {
        let now = Instant::now();
        let inner = self.inner.read();
        match inner.map.get(key.as_bytes()) {
            Some(&idx) => !inner.nodes[idx].as_ref().unwrap().is_expired(now),
            None => false,
        }
    }

    /// Idempotent removal. Does not invoke the eviction callback — that
    /// callback is reserved for capacity-driven LRU eviction.
    pub fn delete(&self, key: &Key) -> bool {
        let mut inner = self.inner.write();
        match inner.map.get(key.as_bytes()).copied() {
            Some(idx) => {
                inner.remove_idx(idx);
                true
            }
            None => false,
        }
    }

    /// Forces an expiry sweep over the whole store. Correctness never
    /// depends on this running; lazy expiry on access is sufficient.
    pub fn tick(&self) {
        let now = Instant::now();
        let mut expired_count = 0u64;
        {
            let mut inner = self.inner.write();
            let mut idx = inner.head;
            let mut to_remove = Vec::new();
            while let Some(i) = idx {
                let node = inner.nodes[i].as_ref().unwrap();
                idx = node.next;
                if node.is_expired(now) {
                    to_remove.push(i);
                }
            }
            for i in to_remove {
                inner.remove_idx(i);
                expired_count += 1;
            }
        }
        if expired_count > 0 {
            self.expirations.fetch_add(expired_count, Ordering::Relaxed);
            debug!(expired_count, "tick: swept expired entries");
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries ordered LRU-first, each as `(key, value, remaining_ttl)`
    /// relative to now. Expired entries are omitted. Feeds consensus
    /// snapshot building.
    pub fn snapshot(&self) -> Vec<(Vec<u8>, Vec<u8>, Ttl)> {
        let now = Instant::now();
        let inner = self.inner.read();
        let mut entries = Vec::with_capacity(inner.len);
        let mut idx = inner.tail;
        while let Some(i) = idx {
            let node = inner.nodes[i].as_ref().unwrap();
            if !node.is_expired(now) {
                let remaining = if node.effective_ttl.is_zero() {
                    Ttl::ZERO
                } else {
                    let elapsed = now.duration_since(node.inserted_at);
                    Ttl::from_duration(node.effective_ttl.as_duration().saturating_sub(elapsed))
                };
                entries.push((node.key.to_vec(), node.value.clone(), remaining));
            }
            idx = node.prev;
        }
        entries
    }

    /// Restores a snapshot produced by [`Cache::snapshot`]. Entries are
    /// inserted in the order given, so the last one ends up
    /// most-recently-used, matching the order `snapshot` produced them in.
    pub fn restore(&self, entries: Vec<(Vec<u8>, Vec<u8>, Ttl)>) {
        for (key, value, ttl) in entries {
            if let (Ok(key), Ok(value)) = (Key::new(key), Value::new(value)) {
                self.put(key, value, ttl);
            }
        }
    }
}
