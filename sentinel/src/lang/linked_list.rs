//! Arena-backed doubly linked list.
//!
//! Two permanent sentinel slots (head and tail) bound the list, so every
//! user value sits between two real neighbours and insertion/removal never
//! special-case the ends. Values are addressed by [`NodeId`]; a removed slot
//! bumps its generation, so stale ids are detected instead of aliasing a
//! recycled slot.

const HEAD: usize = 0;
const TAIL: usize = 1;

/// Handle to a value stored in a [`LinkedList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: usize,
    generation: u64,
}

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
    prev: usize,
    next: usize,
    generation: u64,
}

#[derive(Debug)]
pub struct LinkedList<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
}

impl<T> Default for LinkedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LinkedList<T> {
    #[must_use]
    pub fn new() -> Self {
        let head = Slot {
            value: None,
            prev: HEAD,
            next: TAIL,
            generation: 0,
        };
        let tail = Slot {
            value: None,
            prev: HEAD,
            next: TAIL,
            generation: 0,
        };
        Self {
            slots: vec![head, tail],
            free: Vec::new(),
        }
    }

    pub fn add_first(&mut self, value: T) -> NodeId {
        let next = self.slots[HEAD].next;
        self.insert_between(HEAD, next, value)
    }

    pub fn add_last(&mut self, value: T) -> NodeId {
        let prev = self.slots[TAIL].prev;
        self.insert_between(prev, TAIL, value)
    }

    /// Unlink `id` and return its value. Removing an already removed (or
    /// otherwise stale) id is a no-op returning `None`.
    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        if !self.is_live(id) {
            return None;
        }
        self.unlink(id.index);
        let slot = &mut self.slots[id.index];
        slot.generation += 1;
        self.free.push(id.index);
        slot.value.take()
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&T> {
        if self.is_live(id) {
            self.slots[id.index].value.as_ref()
        } else {
            None
        }
    }

    #[must_use]
    pub fn first(&self) -> Option<NodeId> {
        self.node_at(self.slots[HEAD].next)
    }

    #[must_use]
    pub fn last(&self) -> Option<NodeId> {
        self.node_at(self.slots[TAIL].prev)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots[HEAD].next == TAIL
    }

    /// Front-to-back iterator over the stored values.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.slots[HEAD].next,
        }
    }

    fn node_at(&self, index: usize) -> Option<NodeId> {
        if index == HEAD || index == TAIL {
            return None;
        }
        Some(NodeId {
            index,
            generation: self.slots[index].generation,
        })
    }

    fn is_live(&self, id: NodeId) -> bool {
        id.index > TAIL
            && self
                .slots
                .get(id.index)
                .is_some_and(|s| s.generation == id.generation && s.value.is_some())
    }

    fn insert_between(&mut self, prev: usize, next: usize, value: T) -> NodeId {
        let index = if let Some(index) = self.free.pop() {
            self.slots[index].value = Some(value);
            index
        } else {
            self.slots.push(Slot {
                value: Some(value),
                prev,
                next,
                generation: 0,
            });
            self.slots.len() - 1
        };
        self.link(index, prev, next);
        NodeId {
            index,
            generation: self.slots[index].generation,
        }
    }

    fn link(&mut self, index: usize, prev: usize, next: usize) {
        self.slots[index].prev = prev;
        self.slots[index].next = next;
        self.slots[prev].next = index;
        self.slots[next].prev = index;
    }

    fn unlink(&mut self, index: usize) {
        let (prev, next) = (self.slots[index].prev, self.slots[index].next);
        self.slots[prev].next = next;
        self.slots[next].prev = prev;
        self.slots[index].prev = index;
        self.slots[index].next = index;
    }
}

pub struct Iter<'a, T> {
    list: &'a LinkedList<T>,
    cursor: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == TAIL {
            return None;
        }
        let slot = &self.list.slots[self.cursor];
        self.cursor = slot.next;
        slot.value.as_ref()
    }
}

impl<'a, T> IntoIterator for &'a LinkedList<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
