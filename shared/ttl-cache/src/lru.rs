//! Slab-backed doubly linked recency list
//!
//! Nodes live in a `Vec` and link to each other by slot index, so promotion and
//! removal are O(1) without unsafe pointer juggling. Freed slots are recycled.

use tokio::time::Instant;

pub(crate) struct Node<K, V> {
    pub key: K,
    pub value: V,
    pub expires_at: Option<Instant>,
    /// Sequence number of the heap entry that currently owns this node's deadline
    pub expiry_seq: u64,
    prev: Option<usize>,
    next: Option<usize>,
}

impl<K, V> Node<K, V> {
    pub fn new(key: K, value: V, expires_at: Option<Instant>, expiry_seq: u64) -> Self {
        Self {
            key,
            value,
            expires_at,
            expiry_seq,
            prev: None,
            next: None,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

pub(crate) struct LruList<K, V> {
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K, V> LruList<K, V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    pub fn get(&self, slot: usize) -> Option<&Node<K, V>> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Node<K, V>> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    pub fn tail(&self) -> Option<usize> {
        self.tail
    }

    /// Insert as most recently used and return the slot.
    pub fn push_front(&mut self, node: Node<K, V>) -> usize {
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.link_front(slot);
        slot
    }

    pub fn move_to_front(&mut self, slot: usize) {
        if self.head == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.link_front(slot);
    }

    pub fn remove(&mut self, slot: usize) -> Option<Node<K, V>> {
        self.get(slot)?;
        self.unlink(slot);
        let node = self.slots[slot].take();
        self.free.push(slot);
        node
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    /// Live nodes with their slots, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Node<K, V>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, node)| node.as_ref().map(|n| (slot, n)))
    }

    fn link_front(&mut self, slot: usize) {
        let old_head = self.head;
        if let Some(node) = self.get_mut(slot) {
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(h) => {
                if let Some(head) = self.get_mut(h) {
                    head.prev = Some(slot);
                }
            }
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = match self.get_mut(slot) {
            Some(node) => (node.prev.take(), node.next.take()),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(node) = self.get_mut(p) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.get_mut(n) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }
}
