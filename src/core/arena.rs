//! Generation-checked slab used to store trie Nodes and Counters.
//!
//! Ids are `(index, generation)` pairs. Removing a value bumps the slot's
//! generation, so an id that outlived its value never aliases a newer one.

use std::collections::TryReserveError;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// Typed handle into an [`Arena<T>`].
pub struct Id<T> {
    index: usize,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    fn new(index: usize, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({}v{})", self.index, self.generation)
    }
}

enum Entry<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32, next_free: Option<usize> },
}

pub struct Arena<T> {
    entries: Vec<Entry<T>>,
    free_head: Option<usize>,
    free_len: usize,
    len: usize,
    /// Live-value cap that makes `try_reserve` fail once exceeded.
    #[cfg(test)]
    limit: Option<usize>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_head: None,
            free_len: 0,
            len: 0,
            #[cfg(test)]
            limit: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    /// Make room for `additional` more live values. After this succeeds the
    /// next `additional` calls to [`Arena::insert`] do not allocate.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        #[cfg(test)]
        if self.limit.is_some_and(|limit| self.len + additional > limit) {
            return Vec::<u64>::new().try_reserve(usize::MAX);
        }
        let needed = additional.saturating_sub(self.free_len);
        self.entries.try_reserve(needed)
    }

    pub fn insert(&mut self, value: T) -> Id<T> {
        self.len += 1;
        if let Some(index) = self.free_head {
            let generation = match &self.entries[index] {
                Entry::Vacant {
                    generation,
                    next_free,
                } => {
                    self.free_head = *next_free;
                    *generation
                }
                Entry::Occupied { .. } => unreachable!("free list points at an occupied slot"),
            };
            self.free_len -= 1;
            self.entries[index] = Entry::Occupied { generation, value };
            return Id::new(index, generation);
        }
        let index = self.entries.len();
        self.entries.push(Entry::Occupied {
            generation: 0,
            value,
        });
        Id::new(index, 0)
    }

    pub fn try_insert(&mut self, value: T) -> Result<Id<T>, TryReserveError> {
        self.try_reserve(1)?;
        Ok(self.insert(value))
    }

    pub fn remove(&mut self, id: Id<T>) -> Option<T> {
        match self.entries.get(id.index) {
            Some(Entry::Occupied { generation, .. }) if *generation == id.generation => {}
            _ => return None,
        }
        let vacant = Entry::Vacant {
            generation: id.generation.wrapping_add(1),
            next_free: self.free_head,
        };
        let old = std::mem::replace(&mut self.entries[id.index], vacant);
        self.free_head = Some(id.index);
        self.free_len += 1;
        self.len -= 1;
        match old {
            Entry::Occupied { value, .. } => Some(value),
            Entry::Vacant { .. } => None,
        }
    }

    pub fn get(&self, id: Id<T>) -> Option<&T> {
        match self.entries.get(id.index) {
            Some(Entry::Occupied { generation, value }) if *generation == id.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: Id<T>) -> Option<&mut T> {
        match self.entries.get_mut(id.index) {
            Some(Entry::Occupied { generation, value }) if *generation == id.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live `(id, value)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match entry {
                Entry::Occupied { generation, value } => Some((Id::new(index, *generation), value)),
                Entry::Vacant { .. } => None,
            })
    }
}

impl<T> Index<Id<T>> for Arena<T> {
    type Output = T;

    fn index(&self, id: Id<T>) -> &T {
        match self.get(id) {
            Some(value) => value,
            None => panic!("stale arena id {id:?}"),
        }
    }
}

impl<T> IndexMut<Id<T>> for Arena<T> {
    fn index_mut(&mut self, id: Id<T>) -> &mut T {
        match self.get_mut(id) {
            Some(value) => value,
            None => panic!("stale arena id {id:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena[a], "a");
        assert_eq!(arena[b], "b");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_removed_id_is_stale_after_reuse() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        assert_eq!(arena.remove(a), Some(1));
        let b = arena.insert(2);
        assert_eq!(a.index(), b.index(), "slot is recycled");
        assert_ne!(a, b);
        assert!(arena.get(a).is_none());
        assert_eq!(arena[b], 2);
        assert_eq!(arena.remove(a), None);
    }

    #[test]
    fn test_reserve_counts_free_slots() {
        let mut arena = Arena::new();
        let ids: Vec<_> = (0..4).map(|i| arena.insert(i)).collect();
        for id in ids {
            arena.remove(id);
        }
        let capacity = arena.entries.capacity();
        arena.try_reserve(4).unwrap();
        assert_eq!(arena.entries.capacity(), capacity);
        for i in 0..4 {
            arena.insert(i);
        }
        assert_eq!(arena.entries.len(), 4);
    }

    #[test]
    fn test_reserve_failure_is_reported() {
        let mut arena: Arena<u64> = Arena::new();
        assert!(arena.try_reserve(usize::MAX).is_err());
        assert!(arena.is_empty());
    }

    #[test]
    fn test_limit_fails_reservation_past_cap() {
        let mut arena = Arena::new();
        arena.insert(1);
        arena.set_limit(Some(2));
        assert!(arena.try_reserve(1).is_ok());
        assert!(arena.try_reserve(2).is_err());
        assert!(arena.try_insert(2).is_ok());
        assert!(arena.try_insert(3).is_err());
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_iter_skips_vacant_slots() {
        let mut arena = Arena::new();
        let a = arena.insert('a');
        let b = arena.insert('b');
        let c = arena.insert('c');
        arena.remove(b);
        let live: Vec<_> = arena.iter().map(|(id, v)| (id, *v)).collect();
        assert_eq!(live, vec![(a, 'a'), (c, 'c')]);
    }

    #[test]
    #[should_panic(expected = "stale arena id")]
    fn test_index_with_stale_id_panics() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        arena.remove(a);
        let _ = arena[a];
    }
}
