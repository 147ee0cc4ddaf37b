//! Index-addressed storage for graphs that may contain cycles.
//!
//! Reference counting cannot reclaim a cycle of [`SharedPtr`]s. When the
//! data is graph shaped, store the nodes in an [`Arena`] instead: the arena
//! owns every value, and edges are plain [`NodeId`] pairs kept in separate
//! strong and weak edge sets. Edges never keep a node alive, so dropping the
//! arena (or removing a node) frees values exactly once no matter how the
//! edges loop.
//!
//! [`Arena::remove`] treats both edge sets alike. [`Arena::remove_owned`]
//! follows strong edges only: a node goes with its owners once none of them
//! are left, while weak edges never pull anything along.
//!
//! [`SharedPtr`]: crate::SharedPtr

use std::collections::{ BTreeMap, BTreeSet };
use crate::error::Error;

/// Stable handle to a node. A removed node's id never resolves again, even
/// after its slot is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    index: usize,
    generation: u32
}

impl NodeId {
    pub fn index(&self) -> usize { self.index }
}

enum Slot<T> {
    Occupied { value: T, generation: u32 },
    Vacant { generation: u32, next_free: Option<usize> }
}

type EdgeSet = BTreeMap<NodeId, BTreeSet<NodeId>>;

pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<usize>,
    len: usize,
    strong: EdgeSet,
    weak: EdgeSet
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
            strong: BTreeMap::new(),
            weak: BTreeMap::new()
        }
    }

    pub fn len(&self) -> usize { self.len }
    pub fn is_empty(&self) -> bool { self.len == 0 }

    pub fn insert(&mut self, value: T) -> NodeId {
        self.len += 1;
        match self.free_head {
            Some(index) => {
                let generation = match self.slots[index] {
                    Slot::Vacant { generation, next_free } => {
                        self.free_head = next_free;
                        generation
                    },
                    Slot::Occupied { .. } => unreachable!("free list points at an occupied slot")
                };
                self.slots[index] = Slot::Occupied { value, generation };
                NodeId { index, generation }
            },
            None => {
                let index = self.slots.len();
                self.slots.push(Slot::Occupied { value, generation: 0 });
                NodeId { index, generation: 0 }
            }
        }
    }

    pub fn contains(&self, id: NodeId) -> bool { self.get(id).is_ok() }

    pub fn get(&self, id: NodeId) -> Result<&T, Error> {
        match self.slots.get(id.index) {
            Some(Slot::Occupied { value, generation }) if *generation == id.generation => Ok(value),
            _ => Err(Error::stale_node(id.index))
        }
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut T, Error> {
        match self.slots.get_mut(id.index) {
            Some(Slot::Occupied { value, generation }) if *generation == id.generation => Ok(value),
            _ => Err(Error::stale_node(id.index))
        }
    }

    /// Removes the node and every edge touching it, returning its value.
    pub fn remove(&mut self, id: NodeId) -> Result<T, Error> {
        self.get(id)?;
        // a generation that cannot be bumped retires the slot for good
        let next = id.generation.checked_add(1);
        let vacant = Slot::Vacant {
            generation: next.unwrap_or(u32::MAX),
            next_free: if next.is_some() { self.free_head } else { None }
        };
        let value = match std::mem::replace(&mut self.slots[id.index], vacant) {
            Slot::Occupied { value, .. } => value,
            Slot::Vacant { .. } => unreachable!("slot checked as occupied")
        };
        if next.is_some() {
            self.free_head = Some(id.index);
        }
        self.len -= 1;
        Self::drop_edges_of(&mut self.strong, id);
        Self::drop_edges_of(&mut self.weak, id);
        log::trace!("arena: removed node {}", id.index);
        Ok(value)
    }

    /// Removes `id` along with everything it owns. Every node reachable from
    /// `id` over strong edges goes too, unless a node outside that set still
    /// owns it (directly or through other kept nodes). Owned cycles are freed
    /// with their owner. Returns the removed values in discovery order.
    pub fn remove_owned(&mut self, id: NodeId) -> Result<Vec<T>, Error> {
        self.get(id)?;
        let owned = self.strong_reachable([id], |_| true);
        let members: BTreeSet<NodeId> = owned.iter().copied().collect();
        let seeds = owned.iter().copied().filter(|&n| n != id && self.strong.iter()
            .any(|(from, targets)| !members.contains(from) && targets.contains(&n)));
        let kept: BTreeSet<NodeId> = self.strong_reachable(seeds, |n| n != id).into_iter().collect();
        let mut removed = Vec::new();
        for node in owned.into_iter().filter(|n| !kept.contains(n)) {
            removed.push(self.remove(node)?);
        }
        log::trace!("arena: removed {} node(s) owned by {}", removed.len(), id.index);
        Ok(removed)
    }

    // Nodes reachable over strong edges from `roots`, roots included, in
    // discovery order. Only nodes passing `follow` are visited.
    fn strong_reachable(&self, roots: impl IntoIterator<Item = NodeId>, follow: impl Fn(NodeId) -> bool) -> Vec<NodeId> {
        let mut seen = BTreeSet::new();
        let mut order = Vec::new();
        let mut stack: Vec<NodeId> = roots.into_iter().collect();
        stack.reverse();
        while let Some(node) = stack.pop() {
            if !follow(node) || !seen.insert(node) { continue }
            order.push(node);
            let mut next: Vec<NodeId> = self.strong_edges(node).collect();
            next.reverse();
            stack.extend(next);
        }
        order
    }

    fn drop_edges_of(edges: &mut EdgeSet, id: NodeId) {
        edges.remove(&id);
        edges.retain(|_, targets| {
            targets.remove(&id);
            !targets.is_empty()
        });
    }

    fn link(&mut self, from: NodeId, to: NodeId, strong: bool) -> Result<(), Error> {
        self.get(from)?;
        self.get(to)?;
        let edges = if strong { &mut self.strong } else { &mut self.weak };
        edges.entry(from).or_default().insert(to);
        Ok(())
    }

    /// Records an owning edge `from -> to`.
    pub fn link_strong(&mut self, from: NodeId, to: NodeId) -> Result<(), Error> {
        self.link(from, to, true)
    }

    /// Records a back reference `from -> to`.
    pub fn link_weak(&mut self, from: NodeId, to: NodeId) -> Result<(), Error> {
        self.link(from, to, false)
    }

    /// Removes the edge `from -> to` from both edge sets. Returns whether one existed.
    pub fn unlink(&mut self, from: NodeId, to: NodeId) -> bool {
        let mut found = false;
        for edges in [&mut self.strong, &mut self.weak] {
            if let Some(targets) = edges.get_mut(&from) {
                found |= targets.remove(&to);
                if targets.is_empty() { edges.remove(&from); }
            }
        }
        found
    }

    pub fn strong_edges(&self, from: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.strong.get(&from).into_iter().flatten().copied()
    }

    pub fn weak_edges(&self, from: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.weak.get(&from).into_iter().flatten().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Occupied { value, generation } => Some((NodeId { index, generation: *generation }, value)),
            Slot::Vacant { .. } => None
        })
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self { Self::new() }
}
