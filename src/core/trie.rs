//! Multi-level counter trie keyed by address bytes.
//!
//! Each [`Node`] is one key position with [`FANOUT`] slots. A populated slot
//! holds a [`Counter`]: forward/reverse rates for that prefix plus an optional
//! child Node for the next byte. Nodes and Counters live in generation-checked
//! arenas; a Node's `parent` is the id of the Counter that owns it and is only
//! used to clear that Counter's `child` link when the Node is evicted.
//!
//! Every Node, root included, is threaded through an [`AgeList`] so the fold
//! sweep can visit the least recently touched Nodes first without walking the
//! trie.

use std::collections::TryReserveError;
use std::mem::size_of;

use crate::clock::Tick;
use crate::config::FANOUT;
use crate::core::age_list::{AgeLink, AgeList, Aged};
use crate::core::arena::{Arena, Id};
use crate::core::ewma::RateEstimator;
use crate::error::{MonitorError, Result};

pub type NodeId = Id<Node>;
pub type CounterId = Id<Counter>;

/// Accounted size of one Node: header plus its slot table.
pub const NODE_BYTES: usize = size_of::<Node>() + FANOUT * size_of::<Option<CounterId>>();

/// Accounted size of one Counter.
pub const COUNTER_BYTES: usize = size_of::<Counter>();

/// Which side of the monitored link a packet came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Locally sourced traffic.
    Forward,
    /// Remotely sourced traffic.
    Reverse,
}

/// One trie level.
pub struct Node {
    slots: Box<[Option<CounterId>]>,
    parent: Option<CounterId>,
    age: AgeLink<Node>,
}

impl Node {
    fn new(slots: Box<[Option<CounterId>]>, parent: Option<CounterId>) -> Self {
        Self {
            slots,
            parent,
            age: AgeLink::default(),
        }
    }

    /// The Counter owning this Node, `None` for the root.
    pub fn parent(&self) -> Option<CounterId> {
        self.parent
    }

    /// Populated slots in byte order.
    pub fn populated(&self) -> impl Iterator<Item = (u8, CounterId)> + '_ {
        (0..=u8::MAX).filter_map(move |byte| self.slots[usize::from(byte)].map(|c| (byte, c)))
    }
}

impl Aged for Node {
    fn age_link(&self) -> &AgeLink<Self> {
        &self.age
    }

    fn age_link_mut(&mut self) -> &mut AgeLink<Self> {
        &mut self.age
    }
}

/// Rates of one prefix.
#[derive(Debug, Default)]
pub struct Counter {
    pub fwd: RateEstimator,
    pub rev: RateEstimator,
    child: Option<NodeId>,
}

impl Counter {
    /// Estimator for `direction`.
    pub fn rate(&self, direction: Direction) -> &RateEstimator {
        match direction {
            Direction::Forward => &self.fwd,
            Direction::Reverse => &self.rev,
        }
    }

    /// Mutable estimator for `direction`.
    pub fn rate_mut(&mut self, direction: Direction) -> &mut RateEstimator {
        match direction {
            Direction::Forward => &mut self.fwd,
            Direction::Reverse => &mut self.rev,
        }
    }

    /// The next-level Node, if one has been created.
    pub fn child(&self) -> Option<NodeId> {
        self.child
    }

    /// Decay both directions up to `now`.
    pub fn touch(&mut self, now: Tick) {
        self.fwd.update(now, 0);
        self.rev.update(now, 0);
    }
}

fn try_slot_table() -> std::result::Result<Box<[Option<CounterId>]>, TryReserveError> {
    let mut slots = Vec::new();
    slots.try_reserve_exact(FANOUT)?;
    slots.resize(FANOUT, None);
    Ok(slots.into_boxed_slice())
}

/// Counter trie with exact memory accounting and age-ordered eviction.
pub struct CounterTrie {
    nodes: Arena<Node>,
    counters: Arena<Counter>,
    age: AgeList<Node>,
    root: NodeId,
    depth: usize,
    alloced_mem: usize,
}

impl CounterTrie {
    /// Create a trie consuming at most `depth` key bytes per observation.
    pub fn new(depth: usize) -> Result<Self> {
        let mut nodes = Arena::new();
        let root = nodes.try_insert(Node::new(try_slot_table()?, None))?;
        let mut age = AgeList::new();
        age.push_front(&mut nodes, root);
        Ok(Self {
            nodes,
            counters: Arena::new(),
            age,
            root,
            depth,
            alloced_mem: NODE_BYTES,
        })
    }

    /// The root Node, never evicted.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Maximum number of key bytes consumed per observation.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Bytes currently accounted to Nodes and Counters.
    pub fn memory_usage(&self) -> usize {
        self.alloced_mem
    }

    /// Live Nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Live Counters across all levels.
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }

    /// The Node behind `id`. Panics on a stale id.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// The Counter behind `id`. Panics on a stale id.
    pub fn counter(&self, id: CounterId) -> &Counter {
        &self.counters[id]
    }

    /// Mutable access to the Counter behind `id`.
    pub fn counter_mut(&mut self, id: CounterId) -> &mut Counter {
        &mut self.counters[id]
    }

    /// The Counter for exactly `prefix`, if it has been observed.
    pub fn lookup(&self, prefix: &[u8]) -> Option<&Counter> {
        let (&last, init) = prefix.split_last()?;
        let mut node = self.root;
        for &byte in init {
            let cid = self.nodes[node].slots[usize::from(byte)]?;
            node = self.counters[cid].child?;
        }
        let cid = self.nodes[node].slots[usize::from(last)]?;
        Some(&self.counters[cid])
    }

    /// Node ids from most recently touched to least recently touched.
    pub fn age_order(&self) -> Vec<NodeId> {
        self.age.iter(&self.nodes).collect()
    }

    /// Record `amount` for `key` in `direction` at every prefix level.
    ///
    /// Missing Counters and Nodes along the path are created first. If any
    /// of them cannot be allocated the trie is left untouched.
    pub fn observe(
        &mut self,
        key: &[u8],
        direction: Direction,
        amount: u64,
        now: Tick,
    ) -> Result<()> {
        let key = &key[..key.len().min(self.depth)];
        if key.is_empty() {
            return Ok(());
        }

        let (new_counters, new_nodes) = self.missing_along(key);
        let mut tables = match self.reserve(new_counters, new_nodes) {
            Ok(tables) => tables.into_iter(),
            Err(e) => {
                tracing::warn!(
                    new_counters,
                    new_nodes,
                    mem = self.alloced_mem,
                    "Cannot allocate trie entries: {e}"
                );
                return Err(MonitorError::OutOfMemory(e.to_string()));
            }
        };

        let mut node = self.root;
        for (level, &byte) in key.iter().enumerate() {
            let slot = usize::from(byte);
            let cid = match self.nodes[node].slots[slot] {
                Some(cid) => cid,
                None => {
                    let cid = self.counters.insert(Counter::default());
                    self.nodes[node].slots[slot] = Some(cid);
                    self.alloced_mem += COUNTER_BYTES;
                    cid
                }
            };
            self.counters[cid].rate_mut(direction).update(now, amount);
            if node != self.root {
                self.age.move_to_front(&mut self.nodes, node);
            }

            if level + 1 == key.len() {
                break;
            }
            node = match self.counters[cid].child {
                Some(child) => child,
                None => {
                    let Some(slots) = tables.next() else {
                        unreachable!("slot tables reserved for every missing level");
                    };
                    let child = self.nodes.insert(Node::new(slots, Some(cid)));
                    self.counters[cid].child = Some(child);
                    self.age.push_front(&mut self.nodes, child);
                    self.alloced_mem += NODE_BYTES;
                    child
                }
            };
        }
        Ok(())
    }

    /// Count the Counters and Nodes an observation of `key` would create.
    fn missing_along(&self, key: &[u8]) -> (usize, usize) {
        let mut node = Some(self.root);
        let mut new_counters = 0;
        let mut new_nodes = 0;
        for (level, &byte) in key.iter().enumerate() {
            let has_next_level = level + 1 < key.len();
            let existing = node.and_then(|n| self.nodes[n].slots[usize::from(byte)]);
            match existing {
                Some(cid) => {
                    node = self.counters[cid].child;
                    if node.is_none() && has_next_level {
                        new_nodes += 1;
                    }
                }
                None => {
                    node = None;
                    new_counters += 1;
                    if has_next_level {
                        new_nodes += 1;
                    }
                }
            }
        }
        (new_counters, new_nodes)
    }

    fn reserve(
        &mut self,
        new_counters: usize,
        new_nodes: usize,
    ) -> std::result::Result<Vec<Box<[Option<CounterId>]>>, TryReserveError> {
        self.counters.try_reserve(new_counters)?;
        self.nodes.try_reserve(new_nodes)?;
        let mut tables = Vec::new();
        tables.try_reserve_exact(new_nodes)?;
        for _ in 0..new_nodes {
            tables.push(try_slot_table()?);
        }
        Ok(tables)
    }

    /// Reset every rate to empty and drop all levels below the root.
    ///
    /// The root's own Counters stay allocated.
    pub fn clear(&mut self) {
        self.clear_node(self.root);
        tracing::debug!(mem = self.alloced_mem, "Counter trie cleared");
    }

    /// Drop every subtree below `id` and reinitialize its Counters. The
    /// Node itself keeps its place in the age list.
    pub fn clear_node(&mut self, id: NodeId) {
        for slot in 0..FANOUT {
            let Some(cid) = self.nodes[id].slots[slot] else {
                continue;
            };
            if let Some(child) = self.counters[cid].child {
                self.delete_node(child);
            }
            let counter = &mut self.counters[cid];
            counter.fwd.initialize();
            counter.rev.initialize();
        }
    }

    /// Free `id`, its Counters and everything below it. Clears the owning
    /// Counter's child link. Returns the age-list predecessor `id` had once
    /// its descendants were gone.
    fn delete_node(&mut self, id: NodeId) -> Option<NodeId> {
        for slot in 0..FANOUT {
            let Some(cid) = self.nodes[id].slots[slot] else {
                continue;
            };
            if let Some(child) = self.counters[cid].child {
                self.delete_node(child);
            }
            self.counters.remove(cid);
            self.alloced_mem -= COUNTER_BYTES;
        }

        let prev = self.age.unlink(&mut self.nodes, id);
        if let Some(parent) = self.nodes[id].parent {
            self.counters[parent].child = None;
        }
        self.nodes.remove(id);
        self.alloced_mem -= NODE_BYTES;
        prev
    }

    /// Evict stale Nodes, oldest first.
    ///
    /// A non-root Node is deleted when both decayed rates of the Counter
    /// that owns it are below `threshold`. The owning Counter itself is kept.
    /// Returns the number of Nodes freed, descendants included.
    pub fn fold(&mut self, threshold: u64, now: Tick) -> usize {
        let before = self.nodes.len();
        let mut cursor = self.age.last();

        while let Some(id) = cursor {
            let Some(owner) = self.nodes[id].parent else {
                cursor = self.age.prev(&self.nodes, id);
                continue;
            };

            let counter = &mut self.counters[owner];
            counter.touch(now);
            if counter.fwd.average() < threshold && counter.rev.average() < threshold {
                cursor = self.delete_node(id);
            } else {
                cursor = self.age.prev(&self.nodes, id);
            }
        }

        let evicted = before - self.nodes.len();
        tracing::debug!(
            threshold,
            now,
            evicted,
            mem = self.alloced_mem,
            "Fold complete"
        );
        evicted
    }

    /// Check every structural invariant. Panics on the first violation.
    #[cfg(test)]
    pub(crate) fn audit(&self) {
        use std::collections::HashSet;

        let forward: Vec<_> = self.age.iter(&self.nodes).collect();
        let unique: HashSet<_> = forward.iter().copied().collect();
        assert_eq!(unique.len(), forward.len(), "age list revisits a node");
        assert_eq!(forward.len(), self.nodes.len(), "age list misses nodes");
        assert_eq!(self.age.len(), self.nodes.len());
        assert_eq!(self.age.first(), forward.first().copied());
        assert_eq!(self.age.last(), forward.last().copied());
        let mut backward: Vec<_> =
            std::iter::successors(self.age.last(), |&id| self.age.prev(&self.nodes, id))
                .collect();
        backward.reverse();
        assert_eq!(backward, forward, "prev links disagree with next links");

        assert!(self.nodes[self.root].parent.is_none());
        let mut owned_counters = 0;
        for (id, node) in self.nodes.iter() {
            if id != self.root {
                let parent = node.parent.expect("non-root node without parent");
                assert_eq!(self.counters[parent].child, Some(id));
            }
            for (_, cid) in node.populated() {
                owned_counters += 1;
                if let Some(child) = self.counters[cid].child {
                    assert_eq!(self.nodes[child].parent, Some(cid));
                }
            }
        }
        assert_eq!(owned_counters, self.counters.len(), "orphaned counters");

        assert_eq!(
            self.alloced_mem,
            self.nodes.len() * NODE_BYTES + self.counters.len() * COUNTER_BYTES,
            "memory accounting drifted"
        );
    }
}
