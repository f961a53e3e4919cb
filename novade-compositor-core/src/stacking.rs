//! Bottom-to-top stacking order of surfaces.
//!
//! The window manager owns the order of managed windows; the compositor adds
//! deleted placeholders on top of that, each kept just above whatever was
//! below it when its window closed.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::arena::SurfaceHandle;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackingOrder {
    order: Vec<SurfaceHandle>,
}

impl StackingOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, handle: SurfaceHandle) -> bool {
        self.order.contains(&handle)
    }

    pub fn position(&self, handle: SurfaceHandle) -> Option<usize> {
        self.order.iter().position(|h| *h == handle)
    }

    pub fn push_top(&mut self, handle: SurfaceHandle) {
        self.remove(handle);
        self.order.push(handle);
    }

    /// Inserts `handle` directly above `sibling`, or at the bottom when
    /// `sibling` is `None` or not in the order.
    pub fn insert_above(&mut self, handle: SurfaceHandle, sibling: Option<SurfaceHandle>) {
        self.remove(handle);
        let index = sibling.and_then(|s| self.position(s)).map(|i| i + 1).unwrap_or(0);
        self.order.insert(index, handle);
    }

    pub fn remove(&mut self, handle: SurfaceHandle) -> bool {
        match self.position(handle) {
            Some(index) => {
                self.order.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn raise(&mut self, handle: SurfaceHandle) {
        if self.remove(handle) {
            self.order.push(handle);
        }
    }

    pub fn lower(&mut self, handle: SurfaceHandle) {
        if self.remove(handle) {
            self.order.insert(0, handle);
        }
    }

    /// Replaces the order with the window manager's `managed` order while
    /// keeping every placeholder (as decided by `is_placeholder`) above the
    /// nearest surface that was below it before.
    ///
    /// Handles that are not in the order, and repeats, are ignored. Surfaces
    /// missing from `managed` keep their relative order on top.
    pub fn restack(
        &mut self,
        managed: &[SurfaceHandle],
        is_placeholder: impl Fn(SurfaceHandle) -> bool,
    ) {
        let known: HashSet<SurfaceHandle> = self.order.iter().copied().collect();
        let mut seen = HashSet::with_capacity(managed.len());
        let mut surfaces: Vec<SurfaceHandle> = managed
            .iter()
            .copied()
            .filter(|&h| known.contains(&h) && !is_placeholder(h) && seen.insert(h))
            .collect();
        let left_out: Vec<SurfaceHandle> =
            self.order.iter().copied().filter(|&h| !is_placeholder(h) && !seen.contains(&h)).collect();
        if !left_out.is_empty() {
            debug!(missing = left_out.len(), "restack left surfaces out, keeping them on top");
            surfaces.extend(left_out);
        }

        let mut anchored: Vec<(Option<SurfaceHandle>, SurfaceHandle)> = Vec::new();
        let mut anchor = None;
        for &handle in &self.order {
            if is_placeholder(handle) {
                anchored.push((anchor, handle));
            } else {
                anchor = Some(handle);
            }
        }

        let mut order = Vec::with_capacity(self.order.len());
        order.extend(anchored.iter().filter(|(a, _)| a.is_none()).map(|(_, h)| *h));
        for &handle in &surfaces {
            order.push(handle);
            order.extend(anchored.iter().filter(|(a, _)| *a == Some(handle)).map(|(_, h)| *h));
        }
        debug_assert_eq!(order.len(), self.order.len(), "restack changed the set of surfaces");
        trace!(surfaces = order.len(), placeholders = anchored.len(), "restacked");
        self.order = order;
    }

    /// Bottom-to-top.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = SurfaceHandle> + '_ {
        self.order.iter().copied()
    }

    pub fn iter_top_down(&self) -> impl Iterator<Item = SurfaceHandle> + '_ {
        self.order.iter().rev().copied()
    }

    pub fn as_slice(&self) -> &[SurfaceHandle] {
        &self.order
    }

    /// A copy the scene can paint from while the live order keeps changing.
    pub fn snapshot(&self) -> Vec<SurfaceHandle> {
        self.order.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::SurfaceArena;
    use pretty_assertions::assert_eq;

    fn handles(n: usize) -> Vec<SurfaceHandle> {
        let mut arena = SurfaceArena::new();
        (0..n).map(|i| arena.insert(i)).collect()
    }

    #[test]
    fn raise_and_lower() {
        let h = handles(3);
        let mut order = StackingOrder::new();
        for handle in &h {
            order.push_top(*handle);
        }
        order.raise(h[0]);
        assert_eq!(order.snapshot(), vec![h[1], h[2], h[0]]);
        order.lower(h[2]);
        assert_eq!(order.snapshot(), vec![h[2], h[1], h[0]]);
        assert_eq!(order.iter_top_down().next(), Some(h[0]));
    }

    #[test]
    fn insert_above_sibling() {
        let h = handles(3);
        let mut order = StackingOrder::new();
        order.push_top(h[0]);
        order.push_top(h[1]);
        order.insert_above(h[2], Some(h[0]));
        assert_eq!(order.snapshot(), vec![h[0], h[2], h[1]]);
        order.insert_above(h[1], None);
        assert_eq!(order.snapshot(), vec![h[1], h[0], h[2]]);
    }

    #[test]
    fn restack_keeps_placeholders_above_their_anchor() {
        let h = handles(4);
        let placeholder = h[3];
        let mut order = StackingOrder::new();
        for handle in [h[0], h[1], placeholder, h[2]] {
            order.push_top(handle);
        }
        order.restack(&[h[2], h[1], h[0]], |x| x == placeholder);
        assert_eq!(order.snapshot(), vec![h[2], h[1], placeholder, h[0]]);
    }

    #[test]
    fn restack_keeps_left_out_surfaces_on_top() {
        let h = handles(4);
        let placeholder = h[3];
        let mut order = StackingOrder::new();
        for handle in [h[0], placeholder, h[1], h[2]] {
            order.push_top(handle);
        }
        order.restack(&[h[2]], |x| x == placeholder);
        assert_eq!(order.snapshot(), vec![h[2], h[0], placeholder, h[1]]);
    }

    #[test]
    fn restack_ignores_repeats_and_strangers() {
        let h = handles(3);
        let mut order = StackingOrder::new();
        order.push_top(h[0]);
        order.push_top(h[1]);
        order.restack(&[h[1], h[2], h[0], h[1]], |_| false);
        assert_eq!(order.snapshot(), vec![h[1], h[0]]);
    }
}
