//! Generational arena for surface records.
//!
//! Everything that refers to a surface from outside the arena (scene
//! windows, effect bookkeeping, the stacking order) stores a
//! [`SurfaceHandle`]. A handle whose slot has been freed and reused no longer
//! resolves, so teardown order never matters.

use std::fmt;

/// Stable, copyable reference to a surface stored in a [`SurfaceArena`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceHandle {
    index: u32,
    generation: u32,
}

impl SurfaceHandle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Surface({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug)]
enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

/// Slot vector with free-list reuse and per-slot generation counters.
#[derive(Debug)]
pub struct SurfaceArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for SurfaceArena<T> {
    fn default() -> Self {
        Self { slots: Vec::new(), free: Vec::new(), len: 0 }
    }
}

impl<T> SurfaceArena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, value: T) -> SurfaceHandle {
        self.insert_with(|_| value)
    }

    /// Inserts a value that needs to know its own handle.
    pub fn insert_with(&mut self, make: impl FnOnce(SurfaceHandle) -> T) -> SurfaceHandle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            let generation = match slot {
                Slot::Vacant { generation } => generation.wrapping_add(1),
                Slot::Occupied { .. } => unreachable!("free list points at an occupied slot"),
            };
            let handle = SurfaceHandle { index, generation };
            *slot = Slot::Occupied { generation, value: make(handle) };
            return handle;
        }
        let index = self.slots.len() as u32;
        let handle = SurfaceHandle { index, generation: 0 };
        self.slots.push(Slot::Occupied { generation: 0, value: make(handle) });
        handle
    }

    pub fn contains(&self, handle: SurfaceHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: SurfaceHandle) -> Option<&T> {
        match self.slots.get(handle.index as usize)? {
            Slot::Occupied { generation, value } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: SurfaceHandle) -> Option<&mut T> {
        match self.slots.get_mut(handle.index as usize)? {
            Slot::Occupied { generation, value } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    pub fn remove(&mut self, handle: SurfaceHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == handle.generation => {
                let vacant = Slot::Vacant { generation: handle.generation };
                let old = std::mem::replace(slot, vacant);
                self.free.push(handle.index);
                self.len -= 1;
                match old {
                    Slot::Occupied { value, .. } => Some(value),
                    Slot::Vacant { .. } => None,
                }
            }
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SurfaceHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Occupied { generation, value } => Some((
                SurfaceHandle { index: index as u32, generation: *generation },
                value,
            )),
            Slot::Vacant { .. } => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SurfaceHandle, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Occupied { generation, value } => Some((
                SurfaceHandle { index: index as u32, generation: *generation },
                value,
            )),
            Slot::Vacant { .. } => None,
        })
    }

    pub fn handles(&self) -> Vec<SurfaceHandle> {
        self.iter().map(|(handle, _)| handle).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handle_does_not_resolve_after_reuse() {
        let mut arena = SurfaceArena::new();
        let first = arena.insert("first");
        assert_eq!(arena.remove(first), Some("first"));
        let second = arena.insert("second");
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert!(arena.get(first).is_none());
        assert_eq!(arena.get(second), Some(&"second"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn insert_with_sees_own_handle() {
        let mut arena = SurfaceArena::new();
        let handle = arena.insert_with(|h| h);
        assert_eq!(arena.get(handle), Some(&handle));
    }

    #[test]
    fn double_remove_is_none() {
        let mut arena = SurfaceArena::new();
        let h = arena.insert(1);
        assert!(arena.remove(h).is_some());
        assert!(arena.remove(h).is_none());
        assert!(arena.is_empty());
    }
}
