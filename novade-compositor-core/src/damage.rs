//! Per-surface damage and repaint accumulation.
//!
//! Two regions are tracked, both in surface-local coordinates (relative to
//! the frame's top-left corner):
//!
//! - **damage**: pixels the client redrew and that have not yet been
//!   captured into the backend resource. Cleared piecewise by
//!   [`DamageTracker::reset_damage`] once captured.
//! - **repaints**: pixels of the surface that must be redrawn on screen this
//!   frame for any reason. Every damage also becomes a repaint, but moves,
//!   resizes, opacity changes and effects add repaints without damage.

use tracing::trace;

use crate::geometry::{Rectangle, Size};
use crate::region::Region;

#[derive(Debug, Clone, Default)]
pub struct DamageTracker {
    size: Size,
    damage: Region,
    repaints: Region,
}

impl DamageTracker {
    pub fn new(size: Size) -> Self {
        Self { size, damage: Region::new(), repaints: Region::new() }
    }

    fn bounds(&self) -> Rectangle {
        Rectangle::from_size(self.size)
    }

    /// Records client damage. The rectangle is clamped to the surface,
    /// since damage events for a shrinking window can still carry the old,
    /// larger size. Returns the clamped rectangle, or `None` if nothing of
    /// it lies on the surface.
    pub fn add_damage(&mut self, rect: Rectangle) -> Option<Rectangle> {
        let clamped = rect.clipped_to(&self.bounds());
        if clamped.is_empty() {
            return None;
        }
        self.damage.add_rect(clamped);
        self.repaints.add_rect(clamped);
        trace!(?clamped, "damage added");
        Some(clamped)
    }

    /// Marks the whole surface as damaged and returns the surface rect.
    /// Repaints already queued around the frame are kept.
    pub fn add_damage_full(&mut self) -> Rectangle {
        let bounds = self.bounds();
        self.damage = Region::from_rect(bounds);
        self.repaints.add_rect(bounds);
        bounds
    }

    /// Forgets damage whose pixels have been captured. Subtracting the same
    /// rectangle twice is a no-op the second time.
    pub fn reset_damage(&mut self, rect: Rectangle) {
        self.damage.subtract_rect(rect);
    }

    pub fn damage(&self) -> &Region {
        &self.damage
    }

    pub fn has_damage(&self) -> bool {
        !self.damage.is_empty()
    }

    /// Adds an on-screen repaint. Not clamped: decorations and effects may
    /// ask for areas around the frame.
    pub fn add_repaint(&mut self, rect: Rectangle) {
        self.repaints.add_rect(rect);
    }

    pub fn add_repaint_region(&mut self, region: &Region) {
        self.repaints.union_with(region);
    }

    pub fn add_repaint_full(&mut self) {
        self.repaints.add_rect(self.bounds());
    }

    pub fn repaints(&self) -> &Region {
        &self.repaints
    }

    pub fn has_repaints(&self) -> bool {
        !self.repaints.is_empty()
    }

    pub fn reset_repaints(&mut self, rect: Rectangle) {
        self.repaints.subtract_rect(rect);
    }

    pub fn clear_repaints(&mut self) {
        self.repaints.clear();
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Adapts to a new surface size. Damage outside the new bounds is
    /// dropped; the whole new area is added to the repaints.
    pub fn resize(&mut self, size: Size) {
        self.size = size;
        self.damage.intersect_rect(self.bounds());
        self.add_repaint_full();
    }
}
