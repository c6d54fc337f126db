//! Intrusive doubly-linked list over index-addressed storage
//!
//! A [`List`] only records its first and last element. The `next`/`prev`
//! relations live in a [`Link`] embedded in each element, and elements are
//! addressed by their `usize` index in whatever store implements [`Links`].
//! The list never allocates or frees elements, so every operation is O(1).
//!
//! An element must be a member of at most one list per embedded [`Link`].

/// Embedded `next`/`prev` relation of a list element
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Link {
    next: Option<usize>,
    prev: Option<usize>,
}

impl Link {
    /// Index of the following element in the same list
    pub fn next(&self) -> Option<usize> {
        self.next
    }

    /// Index of the preceding element in the same list
    pub fn prev(&self) -> Option<usize> {
        self.prev
    }
}

/// An element type that embeds one [`Link`]
pub trait Linked {
    fn link(&self) -> &Link;
    fn link_mut(&mut self) -> &mut Link;
}

/// Index-addressed storage whose elements carry list links
pub trait Links {
    fn link(&self, index: usize) -> &Link;
    fn link_mut(&mut self, index: usize) -> &mut Link;
}

impl<T: Linked> Links for [T] {
    fn link(&self, index: usize) -> &Link {
        self[index].link()
    }

    fn link_mut(&mut self, index: usize) -> &mut Link {
        self[index].link_mut()
    }
}

impl<T: Linked> Links for Vec<T> {
    fn link(&self, index: usize) -> &Link {
        self[index].link()
    }

    fn link_mut(&mut self, index: usize) -> &mut Link {
        self[index].link_mut()
    }
}

/// Head of an intrusive list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct List {
    first: Option<usize>,
    last: Option<usize>,
    len: usize,
}

impl List {
    pub const fn new() -> Self {
        List {
            first: None,
            last: None,
            len: 0,
        }
    }

    pub fn first(&self) -> Option<usize> {
        self.first
    }

    pub fn last(&self) -> Option<usize> {
        self.last
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }

    /// Insert at the front (the default insertion point)
    pub fn insert<S: Links + ?Sized>(&mut self, store: &mut S, item: usize) {
        self.insert_first(store, item);
    }

    pub fn insert_first<S: Links + ?Sized>(&mut self, store: &mut S, item: usize) {
        *store.link_mut(item) = Link {
            next: self.first,
            prev: None,
        };
        match self.first {
            Some(first) => store.link_mut(first).prev = Some(item),
            None => self.last = Some(item),
        }
        self.first = Some(item);
        self.len += 1;
    }

    pub fn insert_last<S: Links + ?Sized>(&mut self, store: &mut S, item: usize) {
        *store.link_mut(item) = Link {
            next: None,
            prev: self.last,
        };
        match self.last {
            Some(last) => store.link_mut(last).next = Some(item),
            None => self.first = Some(item),
        }
        self.last = Some(item);
        self.len += 1;
    }

    /// Insert `item` directly after `after`; `None` inserts at the front
    pub fn insert_after<S: Links + ?Sized>(
        &mut self,
        store: &mut S,
        after: Option<usize>,
        item: usize,
    ) {
        let Some(after) = after else {
            self.insert_first(store, item);
            return;
        };

        let next = store.link(after).next;
        match next {
            Some(next) => store.link_mut(next).prev = Some(item),
            None => self.last = Some(item),
        }
        *store.link_mut(item) = Link {
            next,
            prev: Some(after),
        };
        store.link_mut(after).next = Some(item);
        self.len += 1;
    }

    /// Insert `item` directly before `before`; `None` inserts at the back
    pub fn insert_before<S: Links + ?Sized>(
        &mut self,
        store: &mut S,
        before: Option<usize>,
        item: usize,
    ) {
        let Some(before) = before else {
            self.insert_last(store, item);
            return;
        };

        let prev = store.link(before).prev;
        match prev {
            Some(prev) => store.link_mut(prev).next = Some(item),
            None => self.first = Some(item),
        }
        *store.link_mut(item) = Link {
            next: Some(before),
            prev,
        };
        store.link_mut(before).prev = Some(item);
        self.len += 1;
    }

    /// Unlink `item`, which must currently be a member of this list
    pub fn delete<S: Links + ?Sized>(&mut self, store: &mut S, item: usize) {
        let Link { next, prev } = *store.link(item);

        match prev {
            Some(prev) => store.link_mut(prev).next = next,
            None => self.first = next,
        }
        match next {
            Some(next) => store.link_mut(next).prev = prev,
            None => self.last = prev,
        }

        *store.link_mut(item) = Link::default();
        self.len = self.len.saturating_sub(1);
    }

    /// Remove and return the first element
    pub fn pop_first<S: Links + ?Sized>(&mut self, store: &mut S) -> Option<usize> {
        let first = self.first?;
        self.delete(store, first);
        Some(first)
    }

    /// Remove and return the last element
    pub fn pop_last<S: Links + ?Sized>(&mut self, store: &mut S) -> Option<usize> {
        let last = self.last?;
        self.delete(store, last);
        Some(last)
    }

    /// Walk the list front to back
    pub fn iter<'a, S: Links + ?Sized>(&self, store: &'a S) -> Iter<'a, S> {
        Iter {
            store,
            cur: self.first,
        }
    }
}

/// Front-to-back walk over a [`List`]
pub struct Iter<'a, S: ?Sized> {
    store: &'a S,
    cur: Option<usize>,
}

impl<S: Links + ?Sized> Iterator for Iter<'_, S> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let cur = self.cur?;
        self.cur = self.store.link(cur).next;
        Some(cur)
    }
}
