//! Bounded in-process cache of completed resolutions
//!
//! [`BoundedStore`] keeps at most `capacity` entries and evicts the least
//! recently used one when a new key is inserted into a full store. Recency is
//! tracked with an explicit doubly linked list threaded through a slab of
//! nodes, plus a key to slot index, so eviction order never depends on the
//! iteration order of a hash map.
//!
//! All operations take one mutex, which makes lookup, insertion and eviction
//! mutually exclusive: a lookup racing with the eviction of the same key either
//! sees the entry (and bumps it to most recent) or misses.

use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

struct Node<K, V> {
    key: K,
    value: V,
    /// Neighbour towards the most recently used end
    prev: Option<usize>,
    /// Neighbour towards the least recently used end
    next: Option<usize>,
}

/// Single-threaded LRU list. `head` is the most recently used entry, `tail`
/// the eviction candidate.
struct LruList<K, V> {
    nodes: Vec<Node<K, V>>,
    index: HashMap<K, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V> LruList<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity.min(1024)),
            index: HashMap::with_capacity(capacity.min(1024)),
            head: None,
            tail: None,
            capacity,
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[idx].prev = None;
        self.nodes[idx].next = None;
    }

    fn push_front(&mut self, idx: usize) {
        self.nodes[idx].prev = None;
        self.nodes[idx].next = self.head;
        if let Some(h) = self.head {
            self.nodes[h].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn touch(&mut self, idx: usize) {
        if self.head != Some(idx) {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    /// Remove the node in slot `idx`. The last slot is moved into the hole, so
    /// its neighbours and index entry are repointed.
    fn remove_at(&mut self, idx: usize) -> Node<K, V> {
        self.unlink(idx);
        let node = self.nodes.swap_remove(idx);
        self.index.remove(&node.key);

        if idx < self.nodes.len() {
            let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
            match prev {
                Some(p) => self.nodes[p].next = Some(idx),
                None => self.head = Some(idx),
            }
            match next {
                Some(n) => self.nodes[n].prev = Some(idx),
                None => self.tail = Some(idx),
            }
            if let Some(slot) = self.index.get_mut(&self.nodes[idx].key) {
                *slot = idx;
            }
        }
        node
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.touch(idx);
        Some(&self.nodes[idx].value)
    }

    fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&idx) = self.index.get(&key) {
            self.nodes[idx].value = value;
            self.touch(idx);
            return None;
        }

        let evicted = match self.tail {
            Some(lru) if self.nodes.len() >= self.capacity => {
                let node = self.remove_at(lru);
                Some((node.key, node.value))
            }
            _ => None,
        };

        let idx = self.nodes.len();
        self.nodes.push(Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        self.index.insert(key, idx);
        self.push_front(idx);
        evicted
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let idx = *self.index.get(key)?;
        Some(self.remove_at(idx).value)
    }

    fn keys_by_recency(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.nodes.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            keys.push(self.nodes[idx].key.clone());
            cursor = self.nodes[idx].next;
        }
        keys
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }
}

/// Thread-safe, capacity-bounded LRU store.
pub struct BoundedStore<K, V> {
    inner: Mutex<LruList<K, V>>,
    capacity: NonZeroUsize,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedStore<K, V> {
    /// Create an empty store holding at most `capacity` entries
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(LruList::new(capacity.get())),
            capacity,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LruList<K, V>>> {
        self.inner
            .lock()
            .map_err(|_| Error::poisoned("bounded cache store"))
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Look up a value and mark it as most recently used.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.lock()?.get(key).cloned())
    }

    /// Insert or replace a value, marking it most recently used.
    ///
    /// When a new key is inserted into a full store the least recently used
    /// entry is evicted first; its key is returned.
    pub fn put(&self, key: K, value: V) -> Result<Option<K>> {
        Ok(self.lock()?.insert(key, value).map(|(evicted, _)| evicted))
    }

    /// Check for a key without touching its recency
    pub fn contains(&self, key: &K) -> Result<bool> {
        Ok(self.lock()?.index.contains_key(key))
    }

    /// Remove an entry, returning its value
    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        Ok(self.lock()?.remove(key))
    }

    /// Keys ordered from most to least recently used
    pub fn keys_by_recency(&self) -> Result<Vec<K>> {
        Ok(self.lock()?.keys_by_recency())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.nodes.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.nodes.is_empty())
    }

    /// Drop every entry
    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}
