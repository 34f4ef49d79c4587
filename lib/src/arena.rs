//! Append-only arena addressed by typed ids.
//!
//! Entries are never removed individually: an arena lives exactly as long as
//! the collection that owns it, so an id handed out once stays valid and
//! enumeration order is insertion order.

use std::{marker::PhantomData, ops::Index};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Arena<Id: IdLike + Copy, T> {
    inner: Vec<T>,
    #[serde(skip)]
    _phantom: PhantomData<Id>,
}

impl<Id: IdLike + Copy, T> Arena<Id, T> {
    pub fn new() -> Self {
        Self {
            inner: Vec::new(),
            _phantom: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The id the next [`Arena::push`] will return.
    pub fn next_id(&self) -> Id {
        Id::from_raw(self.inner.len())
    }

    pub fn push(&mut self, x: T) -> Id {
        let id = self.next_id();
        self.inner.push(x);
        id
    }

    pub fn contains(&self, id: Id) -> bool {
        id.into_raw() < self.inner.len()
    }

    pub fn get(&self, id: Id) -> Option<&T> {
        self.inner.get(id.into_raw())
    }

    pub fn get_mut(&mut self, id: Id) -> Option<&mut T> {
        self.inner.get_mut(id.into_raw())
    }

    pub fn ids(&self) -> impl Iterator<Item = Id> + '_ {
        (0..self.inner.len()).map(Id::from_raw)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id, &T)> {
        self.inner.iter().enumerate().map(|(i, v)| (Id::from_raw(i), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Id, &mut T)> {
        self.inner
            .iter_mut()
            .enumerate()
            .map(|(i, v)| (Id::from_raw(i), v))
    }

    pub fn as_slice(&self) -> &[T] {
        &self.inner
    }
}

impl<Id: IdLike + Copy, T> Default for Arena<Id, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: IdLike + Copy, T> Index<Id> for Arena<Id, T> {
    type Output = T;

    fn index(&self, index: Id) -> &Self::Output {
        &self.inner[index.into_raw()]
    }
}

pub trait IdLike {
    fn from_raw(index: usize) -> Self;
    fn into_raw(self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    struct TestId(usize);

    impl IdLike for TestId {
        fn from_raw(index: usize) -> Self {
            Self(index)
        }

        fn into_raw(self) -> usize {
            self.0
        }
    }

    #[test]
    fn ids_follow_insertion_order() {
        let mut arena: Arena<TestId, &str> = Arena::new();
        let a = arena.push("a");
        let b = arena.push("b");
        assert_eq!(a, TestId(0));
        assert_eq!(b, TestId(1));
        assert_eq!(arena[b], "b");
        assert_eq!(
            arena.iter().map(|(id, v)| (id, *v)).collect::<Vec<_>>(),
            vec![(a, "a"), (b, "b")]
        );
        assert!(arena.contains(b));
        assert!(!arena.contains(TestId(2)));
        assert_eq!(arena.get(TestId(7)), None);
    }
}
