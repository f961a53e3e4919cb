//! Surface records.
//!
//! A [`Toplevel`] is what the compositor knows about one on-screen window:
//! where it is, what shape it has, how opaque it is and which of its pixels
//! still have to be captured or redrawn. Managed windows, override-redirect
//! windows and the frozen placeholders of just-closed windows all share this
//! record and differ only in their [`ToplevelKind`].

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::damage::DamageTracker;
use crate::geometry::{Point, Rectangle, Size};
use crate::region::Region;

/// Display-server identifier of the underlying window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId(pub u32);

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WindowType {
    #[default]
    Normal,
    Desktop,
    Dock,
    Dialog,
    Menu,
    Tooltip,
    Splash,
    Utility,
    Notification,
}

impl WindowType {
    /// Desktop backgrounds, panels and splash screens never get a drop
    /// shadow.
    pub fn casts_shadow(&self) -> bool {
        !matches!(self, WindowType::Desktop | WindowType::Dock | WindowType::Splash)
    }

    /// Windows that belong to the workspace furniture rather than to a
    /// desktop the user switches between.
    pub fn is_special(&self) -> bool {
        matches!(self, WindowType::Desktop | WindowType::Dock | WindowType::Splash)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToplevelKind {
    /// A window the window manager manages.
    Managed,
    /// An override-redirect window (menus, tooltips, drag icons).
    Unmanaged,
    /// A frozen snapshot of a closed window.
    Deleted,
}

/// Virtual desktop membership. Desktops are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Desktop {
    All,
    Number(u32),
}

impl Default for Desktop {
    fn default() -> Self {
        Desktop::Number(1)
    }
}

impl Desktop {
    pub fn contains(&self, desktop: u32) -> bool {
        match self {
            Desktop::All => true,
            Desktop::Number(n) => *n == desktop,
        }
    }
}

/// One piece of decoration-supplied shadow artwork: a pixmap on the display
/// server and its pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowTile {
    pub pixmap: u32,
    pub size: Size,
}

/// Bordered shadow artwork a decoration can supply instead of the generic
/// nine-patch. Tiles go clockwise starting at the top-left corner; the
/// paddings say how far the artwork reaches beyond the frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecorationShadow {
    pub tiles: [ShadowTile; 8],
    pub padding_left: i32,
    pub padding_top: i32,
    pub padding_right: i32,
    pub padding_bottom: i32,
}

impl DecorationShadow {
    pub const TOP_LEFT: usize = 0;
    pub const TOP: usize = 1;
    pub const TOP_RIGHT: usize = 2;
    pub const RIGHT: usize = 3;
    pub const BOTTOM_RIGHT: usize = 4;
    pub const BOTTOM: usize = 5;
    pub const BOTTOM_LEFT: usize = 6;
    pub const LEFT: usize = 7;
}

/// Everything the window-management layer tells the compositor about a new
/// surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceDescriptor {
    pub window: WindowId,
    pub managed: bool,
    pub window_type: WindowType,
    /// Frame rectangle in screen coordinates.
    pub geometry: Rectangle,
    /// Client area relative to the frame's top-left corner.
    pub client_rect: Rectangle,
    /// Frame-local shape; `None` means rectangular.
    pub shape: Option<Region>,
    pub opacity: f64,
    pub has_alpha: bool,
    pub has_decoration: bool,
    pub decoration_shadow: Option<DecorationShadow>,
    pub desktop: Desktop,
    pub minimized: bool,
    pub ready_for_painting: bool,
}

impl SurfaceDescriptor {
    /// A plain, opaque, undecorated normal window covering `geometry`.
    pub fn new(window: WindowId, geometry: Rectangle) -> Self {
        Self {
            window,
            managed: true,
            window_type: WindowType::Normal,
            geometry,
            client_rect: Rectangle::from_size(geometry.size()),
            shape: None,
            opacity: 1.0,
            has_alpha: false,
            has_decoration: false,
            decoration_shadow: None,
            desktop: Desktop::default(),
            minimized: false,
            ready_for_painting: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Toplevel {
    window: WindowId,
    kind: ToplevelKind,
    window_type: WindowType,
    geometry: Rectangle,
    client_rect: Rectangle,
    shape: Option<Region>,
    opacity: f64,
    has_alpha: bool,
    has_decoration: bool,
    decoration_shadow: Option<DecorationShadow>,
    desktop: Desktop,
    minimized: bool,
    ready_for_painting: bool,
    damage: DamageTracker,
    /// Bumped whenever cached quads or captured pixmaps become invalid.
    geometry_generation: u64,
}

impl Toplevel {
    pub fn new(descriptor: SurfaceDescriptor) -> Self {
        let kind = if descriptor.managed { ToplevelKind::Managed } else { ToplevelKind::Unmanaged };
        let mut damage = DamageTracker::new(descriptor.geometry.size());
        damage.add_damage_full();
        Self {
            window: descriptor.window,
            kind,
            window_type: descriptor.window_type,
            geometry: descriptor.geometry,
            client_rect: descriptor.client_rect,
            shape: descriptor.shape,
            opacity: descriptor.opacity.clamp(0.0, 1.0),
            has_alpha: descriptor.has_alpha,
            has_decoration: descriptor.has_decoration,
            decoration_shadow: descriptor.decoration_shadow,
            desktop: descriptor.desktop,
            minimized: descriptor.minimized,
            ready_for_painting: descriptor.ready_for_painting,
            damage,
            geometry_generation: 0,
        }
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn kind(&self) -> ToplevelKind {
        self.kind
    }

    pub fn is_deleted(&self) -> bool {
        self.kind == ToplevelKind::Deleted
    }

    pub fn window_type(&self) -> WindowType {
        self.window_type
    }

    /// Frame rectangle in screen coordinates.
    pub fn geometry(&self) -> Rectangle {
        self.geometry
    }

    pub fn pos(&self) -> Point {
        self.geometry.origin()
    }

    pub fn size(&self) -> Size {
        self.geometry.size()
    }

    /// Frame rectangle in frame-local coordinates.
    pub fn rect(&self) -> Rectangle {
        Rectangle::from_size(self.geometry.size())
    }

    pub fn client_rect(&self) -> Rectangle {
        self.client_rect
    }

    pub fn shape(&self) -> Option<&Region> {
        self.shape.as_ref()
    }

    /// The frame-local silhouette: the shape if there is one, otherwise the
    /// whole frame. Always clipped to the frame.
    pub fn shape_region(&self) -> Region {
        match &self.shape {
            Some(shape) => {
                let mut region = shape.clone();
                region.intersect_rect(self.rect());
                region
            }
            None => Region::from_rect(self.rect()),
        }
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    pub fn has_decoration(&self) -> bool {
        self.has_decoration
    }

    pub fn decoration_shadow(&self) -> Option<&DecorationShadow> {
        self.decoration_shadow.as_ref()
    }

    pub fn desktop(&self) -> Desktop {
        self.desktop
    }

    pub fn is_on_desktop(&self, desktop: u32) -> bool {
        self.desktop.contains(desktop)
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    pub fn ready_for_painting(&self) -> bool {
        self.ready_for_painting
    }

    pub fn geometry_generation(&self) -> u64 {
        self.geometry_generation
    }

    /// Only a fully opaque window without an alpha channel and without a
    /// shape may be painted without blending and used to clip what is below.
    pub fn is_opaque(&self) -> bool {
        self.opacity >= 1.0 && !self.has_alpha && self.shape.is_none()
    }

    pub fn damage(&self) -> &DamageTracker {
        &self.damage
    }

    pub fn damage_mut(&mut self) -> &mut DamageTracker {
        &mut self.damage
    }

    /// Repaint region translated to screen coordinates.
    pub fn screen_repaints(&self) -> Region {
        self.damage.repaints().translated(self.geometry.x, self.geometry.y)
    }

    /// Moves and/or resizes the frame. Returns the screen area exposed by the
    /// change (old frame ∪ new frame), empty when nothing changed.
    pub fn set_geometry(&mut self, geometry: Rectangle) -> Region {
        if geometry == self.geometry {
            return Region::new();
        }
        let old = self.geometry;
        self.geometry = geometry;
        if old.size() != geometry.size() {
            self.damage.resize(geometry.size());
            self.damage.add_damage_full();
            self.geometry_generation += 1;
            debug!(window = %self.window, ?old, new = ?geometry, "surface resized");
        } else {
            self.damage.add_repaint_full();
            trace!(window = %self.window, ?old, new = ?geometry, "surface moved");
        }
        let mut exposed = Region::from_rect(old);
        exposed.add_rect(geometry);
        exposed
    }

    pub fn set_client_rect(&mut self, client_rect: Rectangle) {
        if client_rect != self.client_rect {
            self.client_rect = client_rect;
            self.geometry_generation += 1;
            self.damage.add_repaint_full();
        }
    }

    /// Replaces the shape. The whole surface is marked for repaint, not just
    /// the difference, since the silhouette moved.
    pub fn set_shape(&mut self, shape: Option<Region>) {
        if shape == self.shape {
            return;
        }
        self.shape = shape;
        self.geometry_generation += 1;
        self.damage.add_repaint_full();
    }

    /// Clamps to `[0, 1]`. Returns the previous opacity when it changed.
    pub fn set_opacity(&mut self, opacity: f64) -> Option<f64> {
        let opacity = opacity.clamp(0.0, 1.0);
        if (opacity - self.opacity).abs() < f64::EPSILON {
            return None;
        }
        let old = std::mem::replace(&mut self.opacity, opacity);
        self.damage.add_repaint_full();
        Some(old)
    }

    pub fn set_has_alpha(&mut self, has_alpha: bool) {
        if has_alpha != self.has_alpha {
            self.has_alpha = has_alpha;
            self.damage.add_repaint_full();
        }
    }

    pub fn set_decoration_shadow(&mut self, shadow: Option<DecorationShadow>) {
        self.decoration_shadow = shadow;
        self.damage.add_repaint_full();
    }

    pub fn set_desktop(&mut self, desktop: Desktop) {
        self.desktop = desktop;
    }

    pub fn set_minimized(&mut self, minimized: bool) {
        if minimized != self.minimized {
            self.minimized = minimized;
            self.damage.add_repaint_full();
        }
    }

    pub fn set_ready_for_painting(&mut self, ready: bool) {
        if ready && !self.ready_for_painting {
            self.damage.add_repaint_full();
        }
        self.ready_for_painting = ready;
    }

    /// Freezes the record into a placeholder for a closed window. Pending
    /// damage is dropped since there is no client left to capture from.
    pub fn into_deleted(&mut self) {
        self.kind = ToplevelKind::Deleted;
        let captured = self.rect();
        self.damage.reset_damage(captured);
        debug!(window = %self.window, "surface frozen as deleted placeholder");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn toplevel(geometry: Rectangle) -> Toplevel {
        let mut t = Toplevel::new(SurfaceDescriptor::new(WindowId(0x40), geometry));
        let rect = t.rect();
        t.damage_mut().reset_damage(rect);
        t.damage_mut().clear_repaints();
        t
    }

    #[test]
    fn damage_then_reset_leaves_nothing() {
        let mut t = toplevel(Rectangle::new(100, 100, 200, 200));
        let rect = Rectangle::new(5, 5, 10, 10);
        assert_eq!(t.damage_mut().add_damage(rect), Some(rect));
        t.damage_mut().reset_damage(rect);
        assert!(!t.damage().has_damage());
        t.damage_mut().reset_damage(rect);
        assert!(!t.damage().has_damage());
        assert_eq!(t.screen_repaints(), Region::from_rect(Rectangle::new(105, 105, 10, 10)));
        t.damage_mut().clear_repaints();
        assert!(!t.damage().has_repaints());
    }

    #[test]
    fn move_exposes_old_and_new_frames() {
        let mut t = toplevel(Rectangle::new(0, 0, 50, 50));
        let generation = t.geometry_generation();
        let exposed = t.set_geometry(Rectangle::new(100, 0, 50, 50));
        assert_eq!(
            exposed,
            Region::from_rects([Rectangle::new(0, 0, 50, 50), Rectangle::new(100, 0, 50, 50)])
        );
        assert_eq!(t.geometry_generation(), generation);
        assert!(t.damage().repaints().contains_rect(&t.rect()));
        assert!(t.set_geometry(Rectangle::new(100, 0, 50, 50)).is_empty());
    }

    #[test]
    fn resize_invalidates_captured_content() {
        let mut t = toplevel(Rectangle::new(0, 0, 50, 50));
        t.set_geometry(Rectangle::new(0, 0, 80, 60));
        assert_eq!(t.geometry_generation(), 1);
        assert_eq!(t.damage().size(), Size::new(80, 60));
        assert_eq!(t.damage().damage(), &Region::from_rect(Rectangle::new(0, 0, 80, 60)));
    }

    #[test]
    fn shape_change_repaints_everything() {
        let mut t = toplevel(Rectangle::new(0, 0, 40, 40));
        t.set_shape(Some(Region::from_rect(Rectangle::new(10, 10, 5, 5))));
        assert_eq!(t.damage().repaints(), &Region::from_rect(t.rect()));
        assert_eq!(t.shape_region(), Region::from_rect(Rectangle::new(10, 10, 5, 5)));
        assert!(!t.is_opaque());
    }

    #[rstest]
    #[case(1.0, false, false, true)]
    #[case(0.99, false, false, false)]
    #[case(1.0, true, false, false)]
    #[case(1.0, false, true, false)]
    fn opaque_only_without_alpha_or_shape(
        #[case] opacity: f64,
        #[case] has_alpha: bool,
        #[case] shaped: bool,
        #[case] expected: bool,
    ) {
        let mut desc = SurfaceDescriptor::new(WindowId(1), Rectangle::new(0, 0, 10, 10));
        desc.opacity = opacity;
        desc.has_alpha = has_alpha;
        if shaped {
            desc.shape = Some(Region::from_rect(Rectangle::new(0, 0, 5, 5)));
        }
        assert_eq!(Toplevel::new(desc).is_opaque(), expected);
    }

    #[test]
    fn opacity_is_clamped_and_reports_change() {
        let mut t = toplevel(Rectangle::new(0, 0, 10, 10));
        assert_eq!(t.set_opacity(1.5), None);
        assert_eq!(t.set_opacity(0.5), Some(1.0));
        assert!(t.damage().has_repaints());
    }

    #[test]
    fn deleted_drops_pending_damage() {
        let mut t = toplevel(Rectangle::new(0, 0, 10, 10));
        t.damage_mut().add_damage(Rectangle::new(0, 0, 3, 3));
        t.into_deleted();
        assert!(t.is_deleted());
        assert!(!t.damage().has_damage());
    }
}
