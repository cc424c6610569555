//! FIFO queue over [`LinkedList`] with an O(1) length counter.

use super::linked_list::LinkedList;

#[derive(Debug)]
pub struct Queue<T> {
    list: LinkedList<T>,
    len: usize,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            list: LinkedList::new(),
            len: 0,
        }
    }

    pub fn push(&mut self, item: T) {
        self.list.add_last(item);
        self.len += 1;
    }

    /// Remove and return the oldest item; `None` when empty.
    pub fn pop(&mut self) -> Option<T> {
        let first = self.list.first()?;
        let value = self.list.remove(first)?;
        self.len -= 1;
        Some(value)
    }

    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        self.list.first().and_then(|id| self.list.get(id))
    }

    /// Snapshot of the queued items, oldest first.
    #[must_use]
    pub fn items(&self) -> Vec<&T> {
        self.list.iter().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn is_not_empty(&self) -> bool {
        self.len > 0
    }
}
