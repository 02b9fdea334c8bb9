//! Recency ordering over trie Nodes.
//!
//! An intrusive doubly-linked list: the links live inside each arena value
//! ([`AgeLink`]), the boundaries live in [`AgeList`]. `first` is the most
//! recently created or touched entry, `last` the least recently touched.

use std::fmt;

use crate::core::arena::{Arena, Id};

/// Position of one value in an [`AgeList`].
pub struct AgeLink<T> {
    prev: Option<Id<T>>,
    next: Option<Id<T>>,
}

impl<T> Default for AgeLink<T> {
    fn default() -> Self {
        Self {
            prev: None,
            next: None,
        }
    }
}

impl<T> Clone for AgeLink<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AgeLink<T> {}

impl<T> fmt::Debug for AgeLink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgeLink")
            .field("prev", &self.prev)
            .field("next", &self.next)
            .finish()
    }
}

/// Arena values that carry an [`AgeLink`].
pub trait Aged: Sized {
    fn age_link(&self) -> &AgeLink<Self>;
    fn age_link_mut(&mut self) -> &mut AgeLink<Self>;
}

pub struct AgeList<T> {
    first: Option<Id<T>>,
    last: Option<Id<T>>,
    len: usize,
}

impl<T> Default for AgeList<T> {
    fn default() -> Self {
        Self {
            first: None,
            last: None,
            len: 0,
        }
    }
}

impl<T> fmt::Debug for AgeList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgeList")
            .field("first", &self.first)
            .field("last", &self.last)
            .field("len", &self.len)
            .finish()
    }
}

impl<T: Aged> AgeList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn first(&self) -> Option<Id<T>> {
        self.first
    }

    pub fn last(&self) -> Option<Id<T>> {
        self.last
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The neighbour of `id` on the more recent side.
    pub fn prev(&self, arena: &Arena<T>, id: Id<T>) -> Option<Id<T>> {
        arena[id].age_link().prev
    }

    /// The neighbour of `id` on the older side.
    pub fn next(&self, arena: &Arena<T>, id: Id<T>) -> Option<Id<T>> {
        arena[id].age_link().next
    }

    /// Link `id` in as the most recent entry. `id` must not already be linked.
    pub fn push_front(&mut self, arena: &mut Arena<T>, id: Id<T>) {
        *arena[id].age_link_mut() = AgeLink {
            prev: None,
            next: self.first,
        };
        match self.first {
            Some(first) => arena[first].age_link_mut().prev = Some(id),
            None => self.last = Some(id),
        }
        self.first = Some(id);
        self.len += 1;
    }

    /// Unlink `id`, relinking its neighbours. Returns its former predecessor.
    pub fn unlink(&mut self, arena: &mut Arena<T>, id: Id<T>) -> Option<Id<T>> {
        let AgeLink { prev, next } = std::mem::take(arena[id].age_link_mut());
        match prev {
            Some(p) => arena[p].age_link_mut().next = next,
            None => self.first = next,
        }
        match next {
            Some(n) => arena[n].age_link_mut().prev = prev,
            None => self.last = prev,
        }
        self.len -= 1;
        prev
    }

    /// Mark `id` as most recently touched.
    pub fn move_to_front(&mut self, arena: &mut Arena<T>, id: Id<T>) {
        if self.first == Some(id) {
            return;
        }
        self.unlink(arena, id);
        self.push_front(arena, id);
    }

    /// Ids from most recent to least recent.
    pub fn iter<'a>(&self, arena: &'a Arena<T>) -> impl Iterator<Item = Id<T>> + 'a {
        std::iter::successors(self.first, move |&id| arena[id].age_link().next)
    }
}
