use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::expiry::{Deadline, ExpiryHeap};
use crate::lru::{LruList, Node};
use crate::{sweeper, CacheError, CacheOptions, Result};

/// Heap entries allowed beyond the live entry count before a rebuild
const HEAP_SLACK: usize = 64;

/// Thread-safe LRU cache with optional per-entry TTL.
///
/// Cloning is cheap and yields a handle to the same storage. The background
/// sweeper stops when [`Cache::close`] is called or the last handle is dropped.
pub struct Cache<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

pub(crate) struct Shared<K, V> {
    state: Mutex<State<K, V>>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
}

impl<K, V> Drop for Shared<K, V> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct State<K, V> {
    index: HashMap<K, usize>,
    list: LruList<K, V>,
    heap: ExpiryHeap,
    next_seq: u64,
    capacity: usize,
    closed: bool,
}

impl<K, V> State<K, V> {
    fn is_live(&self, d: &Deadline) -> bool {
        self.list
            .get(d.slot)
            .map(|n| n.expiry_seq == d.seq && n.expires_at.is_some())
            .unwrap_or(false)
    }

    fn earliest_deadline(&mut self) -> Option<Instant> {
        let list = &self.list;
        self.heap.peek_live(|d| {
            list.get(d.slot)
                .map(|n| n.expiry_seq == d.seq && n.expires_at.is_some())
                .unwrap_or(false)
        })
    }

    fn compact_heap(&mut self) {
        if self.heap.len() <= self.index.len() * 2 + HEAP_SLACK {
            return;
        }
        let live = self.list.iter().filter_map(|(slot, n)| {
            n.expires_at.map(|at| Deadline {
                at,
                seq: n.expiry_seq,
                slot,
            })
        });
        self.heap.rebuild(live);
    }
}

impl<K, V> State<K, V>
where
    K: Eq + Hash,
{
    fn remove_slot(&mut self, slot: usize) -> Option<Node<K, V>> {
        let node = self.list.remove(slot)?;
        self.index.remove(&node.key);
        Some(node)
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Create a cache. The sweeper is spawned on the current tokio runtime when
    /// one is available and `options.sweeper` is set; otherwise expired entries
    /// are only purged when read.
    pub fn new(options: CacheOptions) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                index: HashMap::new(),
                list: LruList::new(),
                heap: ExpiryHeap::default(),
                next_seq: 0,
                capacity: options.effective_capacity(),
                closed: false,
            }),
            wake: Arc::new(Notify::new()),
            cancel: CancellationToken::new(),
        });

        if options.sweeper {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(sweeper::run(
                        Arc::downgrade(&shared),
                        shared.wake.clone(),
                        shared.cancel.clone(),
                        options.effective_interval(),
                    ));
                }
                Err(_) => debug!("no tokio runtime available, cache sweeper disabled"),
            }
        }

        Self { shared }
    }

    /// Insert or replace `key`. A zero `ttl` stores the entry without expiry.
    ///
    /// Inserting beyond capacity evicts least recently used entries until the
    /// size bound holds again. Fails only once the cache has been closed.
    pub fn set(&self, key: K, value: V, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(CacheError::Closed);
        }

        let expires_at = (!ttl.is_zero()).then(|| now + ttl);
        let before = state.earliest_deadline();

        state.next_seq += 1;
        let seq = state.next_seq;

        let slot = match state.index.get(&key).copied() {
            Some(slot) => {
                if let Some(node) = state.list.get_mut(slot) {
                    node.value = value;
                    node.expires_at = expires_at;
                    node.expiry_seq = seq;
                }
                state.list.move_to_front(slot);
                slot
            }
            None => {
                let slot = state
                    .list
                    .push_front(Node::new(key.clone(), value, expires_at, seq));
                state.index.insert(key, slot);
                slot
            }
        };

        if let Some(at) = expires_at {
            state.heap.push(Deadline { at, seq, slot });
        }

        while state.index.len() > state.capacity {
            let Some(tail) = state.list.tail() else {
                break;
            };
            state.remove_slot(tail);
        }
        state.compact_heap();

        let earlier = match (expires_at, before) {
            (Some(new), Some(old)) => new < old,
            (Some(_), None) => true,
            (None, _) => false,
        };
        drop(state);

        if earlier {
            // Single stored permit; repeated wakes before the sweeper runs coalesce.
            self.shared.wake.notify_one();
        }
        Ok(())
    }

    /// Look up `key`, promoting it to most recently used on a hit.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut state = self.shared.state.lock();
        if state.closed {
            return None;
        }
        let slot = *state.index.get(key)?;
        let expired = state.list.get(slot).map(|n| n.is_expired(now))?;
        if expired {
            state.remove_slot(slot);
            return None;
        }
        state.list.move_to_front(slot);
        state.list.get(slot).map(|n| n.value.clone())
    }

    /// Same as [`Cache::get`] without touching recency or purging.
    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        let state = self.shared.state.lock();
        state
            .index
            .get(key)
            .and_then(|slot| state.list.get(*slot))
            .map(|n| !n.is_expired(now))
            .unwrap_or(false)
    }

    pub fn delete(&self, key: &K) {
        let mut state = self.shared.state.lock();
        if let Some(slot) = state.index.get(key).copied() {
            state.remove_slot(slot);
        }
    }

    /// Snapshot of the keys currently held, expired-but-unswept ones included.
    pub fn keys(&self) -> Vec<K> {
        self.shared.state.lock().index.keys().cloned().collect()
    }

    /// Current entry count, possibly including expired entries not yet swept.
    pub fn len(&self) -> usize {
        self.shared.state.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current size bound
    pub fn capacity(&self) -> usize {
        self.shared.state.lock().capacity
    }

    /// Change the size bound; values below 1 are raised to 1. Shrinking
    /// evicts least recently used entries at once.
    pub fn set_capacity(&self, capacity: usize) {
        let mut state = self.shared.state.lock();
        state.capacity = capacity.max(1);
        while state.index.len() > state.capacity {
            let Some(tail) = state.list.tail() else {
                break;
            };
            state.remove_slot(tail);
        }
        state.compact_heap();
    }

    /// Stop the sweeper and drop every entry. Idempotent.
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.index.clear();
        state.list.clear();
        state.heap.clear();
        drop(state);
        self.shared.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

impl<K, V> Shared<K, V>
where
    K: Eq + Hash,
{
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.state.lock().earliest_deadline()
    }

    /// Remove every entry whose deadline is at or before `now`.
    pub(crate) fn purge_expired(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        let mut purged = 0;
        while let Some(due) = state.heap.pop_due(now) {
            if state.is_live(&due) && state.remove_slot(due.slot).is_some() {
                purged += 1;
            }
        }
        purged
    }
}
