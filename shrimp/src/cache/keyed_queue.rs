//! Indexed queue of key-multivalue items.
//!
//! [`KeyedQueue`] holds any number of values per key while preserving two
//! orders at once: values for one key come out in their insertion order,
//! and [`KeyedQueue::oldest`] finds the single oldest value across the
//! whole structure. Each node sits on two intrusive doubly-linked lists:
//! a global chronology chain and a per-key chain. Both give O(1) unlink
//! given a handle.
//!
//! This is the shape request coalescing wants: "everything waiting for
//! this key" is one chain walk, and "the oldest admitted request" is the
//! head of the global chain.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

/// Opaque reference to one queued value.
///
/// Valid until the value it names is erased or extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueHandle(usize);

#[derive(Debug, Clone, Copy)]
struct KeyChain {
    head: usize,
    tail: usize,
}

struct Node<K, V> {
    key: K,
    value: V,
    inserted_at: Instant,
    prev: Option<usize>,
    next: Option<usize>,
    key_prev: Option<usize>,
    key_next: Option<usize>,
}

/// FIFO of (key, value) pairs preserving per-key insertion order.
pub struct KeyedQueue<K, V> {
    index: HashMap<K, KeyChain>,
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    oldest: Option<usize>,
    newest: Option<usize>,
    len: usize,
}

impl<K, V> KeyedQueue<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            oldest: None,
            newest: None,
            len: 0,
        }
    }

    /// Append a value at the newest end, stamped with the current time.
    pub fn insert(&mut self, key: K, value: V) {
        let node = Node {
            key: key.clone(),
            value,
            inserted_at: Instant::now(),
            prev: None,
            next: None,
            key_prev: None,
            key_next: None,
        };
        let slot = self.alloc(node);
        self.link_newest(slot);

        match self.index.get(&key).copied() {
            Some(chain) => {
                self.node_mut(slot).key_prev = Some(chain.tail);
                self.node_mut(chain.tail).key_next = Some(slot);
                self.index.insert(
                    key,
                    KeyChain {
                        head: chain.head,
                        tail: slot,
                    },
                );
            }
            None => {
                self.index.insert(key, KeyChain { head: slot, tail: slot });
            }
        }
        self.len += 1;
    }

    pub fn has_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// The oldest value stored under a key.
    pub fn find_first_for_key(&self, key: &K) -> Option<QueueHandle> {
        self.index.get(key).map(|chain| QueueHandle(chain.head))
    }

    /// The oldest value across all keys.
    pub fn oldest(&self) -> Option<QueueHandle> {
        self.oldest.map(QueueHandle)
    }

    /// Remove one value, returning it. The handle becomes invalid.
    pub fn erase(&mut self, handle: QueueHandle) -> V {
        let slot = handle.0;
        self.unlink(slot);

        let node = self.slots[slot].take().expect("stale queue handle");
        self.free.push(slot);
        self.len -= 1;

        match (node.key_prev, node.key_next) {
            (None, None) => {
                self.index.remove(&node.key);
            }
            (Some(p), None) => {
                self.node_mut(p).key_next = None;
                if let Some(chain) = self.index.get_mut(&node.key) {
                    chain.tail = p;
                }
            }
            (None, Some(n)) => {
                self.node_mut(n).key_prev = None;
                if let Some(chain) = self.index.get_mut(&node.key) {
                    chain.head = n;
                }
            }
            (Some(p), Some(n)) => {
                self.node_mut(p).key_next = Some(n);
                self.node_mut(n).key_prev = Some(p);
            }
        }

        node.value
    }

    /// Remove every value stored under the handle's key and feed them to
    /// `sink` in insertion order.
    ///
    /// The whole chain is detached from the container before the sink sees
    /// the first value, so a panicking sink cannot leave the container in
    /// a corrupted state. The unique-key count drops by exactly one.
    pub fn extract_values_for_key(&mut self, handle: QueueHandle, mut sink: impl FnMut(V)) {
        let key = self.node(handle.0).key.clone();
        let chain = self.index.remove(&key).expect("stale queue handle");

        let mut values = Vec::new();
        let mut cursor = Some(chain.head);
        while let Some(slot) = cursor {
            self.unlink(slot);
            let node = self.slots[slot].take().expect("broken key chain");
            self.free.push(slot);
            self.len -= 1;
            cursor = node.key_next;
            values.push(node.value);
        }

        for value in values {
            sink(value);
        }
    }

    /// Number of distinct keys currently present.
    pub fn unique_keys_count(&self) -> usize {
        self.index.len()
    }

    /// Total number of stored values.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn key(&self, handle: QueueHandle) -> &K {
        &self.node(handle.0).key
    }

    pub fn value(&self, handle: QueueHandle) -> &V {
        &self.node(handle.0).value
    }

    /// When the value was inserted.
    pub fn access_time(&self, handle: QueueHandle) -> Instant {
        self.node(handle.0).inserted_at
    }

    fn node(&self, slot: usize) -> &Node<K, V> {
        self.slots[slot].as_ref().expect("stale queue handle")
    }

    fn node_mut(&mut self, slot: usize) -> &mut Node<K, V> {
        self.slots[slot].as_mut().expect("stale queue handle")
    }

    fn alloc(&mut self, node: Node<K, V>) -> usize {
        if let Some(slot) = self.free.pop() {
            self.slots[slot] = Some(node);
            slot
        } else {
            self.slots.push(Some(node));
            self.slots.len() - 1
        }
    }

    fn link_newest(&mut self, slot: usize) {
        let prev = self.newest;
        {
            let node = self.node_mut(slot);
            node.prev = prev;
            node.next = None;
        }
        match prev {
            Some(p) => self.node_mut(p).next = Some(slot),
            None => self.oldest = Some(slot),
        }
        self.newest = Some(slot);
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let node = self.node(slot);
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.oldest = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.newest = prev,
        }
    }
}

impl<K, V> Default for KeyedQueue<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
