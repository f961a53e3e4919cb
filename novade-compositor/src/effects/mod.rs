//! The effect pipeline.
//!
//! Effects are an ordered [`EffectChain`] of [`Effect`] hook sets. Every
//! hook has a no-op default, so an effect implements only what it needs:
//!
//! - `pre_paint_screen` / `pre_paint_window` may change masks, extend paint
//!   regions, add screen passes or re-enable painting of placeholders;
//! - `paint_window` adjusts the window's paint data and may draw extra
//!   images (a shadow) through the [`EffectPainter`] before the window;
//! - `post_paint_screen` advances animations and asks for the next frame.
//!
//! Effects never touch surfaces directly. They see an [`EffectWindow`] view
//! built for the call and talk back through [`EffectRequests`], which the
//! compositor applies after the frame.

pub mod cube;
pub mod fade;
pub mod shadow;
pub mod timeline;

use std::any::Any;
use std::rc::Rc;
use std::time::Instant;

use novade_compositor_core::{Point, Rectangle, Region, Size, SurfaceHandle, Toplevel, WindowType};
use tracing::debug;

use crate::compositor::DeletedRef;
use crate::display::{DisplayConnection, PictureId, PixmapId, TextureId};
use crate::scene::{
    BackendKind, PaintMask, ScreenPrePaintData, WindowPaintData, WindowPrePaintData, WindowQuad,
};

pub use cube::CubeEffect;
pub use fade::FadeEffect;
pub use shadow::ShadowEffect;
pub use timeline::{AnimationState, Curve, Timeline};

/// An image an effect uploaded to the active backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageHandle {
    Texture(TextureId, Size),
    Picture(PictureId, Size),
}

impl ImageHandle {
    pub fn size(&self) -> Size {
        match self {
            ImageHandle::Texture(_, size) | ImageHandle::Picture(_, size) => *size,
        }
    }
}

/// One effect draw: `quads` are local to `pos` and go through the same
/// transform `data` gives the window they belong to.
#[derive(Debug, Clone, Copy)]
pub struct ImageDraw<'a> {
    pub image: ImageHandle,
    pub quads: &'a [WindowQuad],
    pub pos: Point,
    pub data: &'a WindowPaintData,
    pub opacity: f64,
    /// Screen clip; infinite for unclipped.
    pub region: &'a Region,
}

/// What effects may do with the active backend while painting.
pub trait EffectPainter {
    fn backend(&self) -> BackendKind;
    fn upload_image(&mut self, size: Size, rgba: &[u8]) -> Option<ImageHandle>;
    fn image_from_pixmap(&mut self, pixmap: PixmapId, size: Size) -> Option<ImageHandle>;
    fn release_image(&mut self, image: ImageHandle);
    fn draw_image(&mut self, draw: &ImageDraw<'_>);
}

/// Read-only view of a surface handed to effect hooks.
#[derive(Debug, Clone, Copy)]
pub struct EffectWindow<'a> {
    handle: SurfaceHandle,
    toplevel: &'a Toplevel,
    stacking_index: usize,
    active: bool,
}

impl<'a> EffectWindow<'a> {
    pub fn new(handle: SurfaceHandle, toplevel: &'a Toplevel, stacking_index: usize, active: bool) -> Self {
        Self { handle, toplevel, stacking_index, active }
    }

    pub fn handle(&self) -> SurfaceHandle {
        self.handle
    }

    pub fn toplevel(&self) -> &'a Toplevel {
        self.toplevel
    }

    /// Position in the stacking order, 0 at the bottom.
    pub fn stacking_index(&self) -> usize {
        self.stacking_index
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn geometry(&self) -> Rectangle {
        self.toplevel.geometry()
    }

    pub fn pos(&self) -> Point {
        self.toplevel.pos()
    }

    pub fn window_type(&self) -> WindowType {
        self.toplevel.window_type()
    }

    pub fn is_deleted(&self) -> bool {
        self.toplevel.is_deleted()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesktopLayout {
    pub count: u32,
    /// 1-based.
    pub current: u32,
}

impl DesktopLayout {
    pub fn new(count: u32, current: u32) -> Self {
        let count = count.max(1);
        Self { count, current: current.clamp(1, count) }
    }

    /// The desktop `steps` positions away, wrapping around.
    pub fn offset(&self, from: u32, steps: i64) -> u32 {
        let count = i64::from(self.count);
        let index = (i64::from(from) - 1 + steps).rem_euclid(count);
        (index + 1) as u32
    }
}

impl Default for DesktopLayout {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

/// What effects ask of the compositor; applied after the current hook
/// returns control to it.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EffectRequests {
    pub full_repaint: bool,
    /// Screen coordinates.
    pub workspace_repaints: Region,
    /// Surface-local rectangles.
    pub window_repaints: Vec<(SurfaceHandle, Rectangle)>,
    /// Desktops to switch to, in order.
    pub desktop_switches: Vec<u32>,
}

impl EffectRequests {
    pub fn add_repaint(&mut self, rect: Rectangle) {
        if !rect.is_empty() {
            self.workspace_repaints.add_rect(rect);
        }
    }

    pub fn add_repaint_full(&mut self) {
        self.full_repaint = true;
    }

    pub fn add_window_repaint(&mut self, handle: SurfaceHandle, rect: Rectangle) {
        self.window_repaints.push((handle, rect));
    }

    pub fn switch_desktop(&mut self, desktop: u32) {
        self.desktop_switches.push(desktop);
    }

    pub fn is_empty(&self) -> bool {
        !self.full_repaint
            && self.workspace_repaints.is_empty()
            && self.window_repaints.is_empty()
            && self.desktop_switches.is_empty()
    }
}

/// Everything an effect hook may look at besides the window.
pub struct EffectContext<'a> {
    pub display: &'a Rc<dyn DisplayConnection>,
    pub backend: BackendKind,
    pub screen: Rectangle,
    pub desktops: DesktopLayout,
    pub now: Instant,
    pub active_window: Option<SurfaceHandle>,
    pub requests: &'a mut EffectRequests,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKey {
    Escape,
    Return,
    Left,
    Right,
    Up,
    Down,
}

#[allow(unused_variables)]
pub trait Effect: Any {
    fn name(&self) -> &'static str;

    /// Whether the effect is animating and needs another frame.
    fn is_active(&self) -> bool {
        false
    }

    /// Whether the effect takes over the whole screen and input.
    fn is_fullscreen(&self) -> bool {
        false
    }

    fn pre_paint_screen(&mut self, data: &mut ScreenPrePaintData, ctx: &mut EffectContext<'_>) {}

    fn pre_paint_window(
        &mut self,
        window: &EffectWindow<'_>,
        data: &mut WindowPrePaintData,
        ctx: &mut EffectContext<'_>,
    ) {
    }

    fn paint_window(
        &mut self,
        window: &EffectWindow<'_>,
        mask: PaintMask,
        region: &Region,
        data: &mut WindowPaintData,
        painter: &mut dyn EffectPainter,
    ) {
    }

    /// Runs after the last window of the frame, before presenting.
    fn paint_screen_done(&mut self, painter: &mut dyn EffectPainter) {}

    fn post_paint_screen(&mut self, ctx: &mut EffectContext<'_>) {}

    fn window_added(&mut self, window: &EffectWindow<'_>, ctx: &mut EffectContext<'_>) {}

    /// `deleted` is the placeholder, if one was kept; cloning it keeps the
    /// placeholder alive.
    fn window_closed(&mut self, window: &EffectWindow<'_>, deleted: Option<&DeletedRef>, ctx: &mut EffectContext<'_>) {}

    /// The surface is gone for good; drop anything keyed on its handle.
    fn window_deleted(&mut self, handle: SurfaceHandle) {}

    /// `damage` is surface-local and already clamped to the surface.
    fn window_damaged(&mut self, window: &EffectWindow<'_>, damage: Rectangle, ctx: &mut EffectContext<'_>) {}

    fn window_geometry_changed(&mut self, window: &EffectWindow<'_>, old: Rectangle, ctx: &mut EffectContext<'_>) {}

    fn window_opacity_changed(&mut self, window: &EffectWindow<'_>, old: f64, ctx: &mut EffectContext<'_>) {}

    /// Returns whether the key was consumed.
    fn handle_key(&mut self, key: EffectKey, ctx: &mut EffectContext<'_>) -> bool {
        false
    }

    /// Drops input grabs and animations immediately.
    fn cancel(&mut self, ctx: &mut EffectContext<'_>) {}

    /// Gives back images uploaded to the backend that is going away.
    fn release_images(&mut self, painter: &mut dyn EffectPainter) {}

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// The loaded effects, called in load order.
#[derive(Default)]
pub struct EffectChain {
    effects: Vec<Box<dyn Effect>>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: Box<dyn Effect>) {
        debug!(effect = effect.name(), "effect loaded");
        self.effects.push(effect);
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.effects.iter().map(|e| e.name()).collect()
    }

    pub fn get_mut<T: Effect>(&mut self) -> Option<&mut T> {
        self.effects.iter_mut().find_map(|e| e.as_any_mut().downcast_mut::<T>())
    }

    /// Unloads every effect, cancelling what is running.
    pub fn clear(&mut self, ctx: &mut EffectContext<'_>) {
        for effect in &mut self.effects {
            effect.cancel(ctx);
        }
        self.effects.clear();
    }

    pub fn is_active(&self) -> bool {
        self.effects.iter().any(|e| e.is_active())
    }

    pub fn pre_paint_screen(&mut self, data: &mut ScreenPrePaintData, ctx: &mut EffectContext<'_>) {
        for effect in &mut self.effects {
            effect.pre_paint_screen(data, ctx);
        }
    }

    pub fn pre_paint_window(
        &mut self,
        window: &EffectWindow<'_>,
        data: &mut WindowPrePaintData,
        ctx: &mut EffectContext<'_>,
    ) {
        for effect in &mut self.effects {
            effect.pre_paint_window(window, data, ctx);
        }
    }

    pub fn paint_window(
        &mut self,
        window: &EffectWindow<'_>,
        mask: PaintMask,
        region: &Region,
        data: &mut WindowPaintData,
        painter: &mut dyn EffectPainter,
    ) {
        for effect in &mut self.effects {
            effect.paint_window(window, mask, region, data, painter);
        }
    }

    pub fn paint_screen_done(&mut self, painter: &mut dyn EffectPainter) {
        for effect in &mut self.effects {
            effect.paint_screen_done(painter);
        }
    }

    pub fn post_paint_screen(&mut self, ctx: &mut EffectContext<'_>) {
        for effect in &mut self.effects {
            effect.post_paint_screen(ctx);
        }
    }

    pub fn window_added(&mut self, window: &EffectWindow<'_>, ctx: &mut EffectContext<'_>) {
        for effect in &mut self.effects {
            effect.window_added(window, ctx);
        }
    }

    pub fn window_closed(&mut self, window: &EffectWindow<'_>, deleted: Option<&DeletedRef>, ctx: &mut EffectContext<'_>) {
        for effect in &mut self.effects {
            effect.window_closed(window, deleted, ctx);
        }
    }

    pub fn window_deleted(&mut self, handle: SurfaceHandle) {
        for effect in &mut self.effects {
            effect.window_deleted(handle);
        }
    }

    pub fn window_damaged(&mut self, window: &EffectWindow<'_>, damage: Rectangle, ctx: &mut EffectContext<'_>) {
        for effect in &mut self.effects {
            effect.window_damaged(window, damage, ctx);
        }
    }

    pub fn window_geometry_changed(&mut self, window: &EffectWindow<'_>, old: Rectangle, ctx: &mut EffectContext<'_>) {
        for effect in &mut self.effects {
            effect.window_geometry_changed(window, old, ctx);
        }
    }

    pub fn window_opacity_changed(&mut self, window: &EffectWindow<'_>, old: f64, ctx: &mut EffectContext<'_>) {
        for effect in &mut self.effects {
            effect.window_opacity_changed(window, old, ctx);
        }
    }

    /// Offers the key to each effect until one consumes it.
    pub fn handle_key(&mut self, key: EffectKey, ctx: &mut EffectContext<'_>) -> bool {
        self.effects.iter_mut().any(|e| e.handle_key(key, ctx))
    }

    /// Cancels every full-screen effect except `keep`.
    pub fn cancel_fullscreen(&mut self, keep: &'static str, ctx: &mut EffectContext<'_>) {
        for effect in &mut self.effects {
            if effect.is_fullscreen() && effect.name() != keep {
                debug!(effect = effect.name(), "cancelled for another full-screen effect");
                effect.cancel(ctx);
            }
        }
    }

    pub fn release_images(&mut self, painter: &mut dyn EffectPainter) {
        for effect in &mut self.effects {
            effect.release_images(painter);
        }
    }
}

impl std::fmt::Debug for EffectChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 1, 2)]
    #[case(4, -1, 3)]
    #[case(1, -1, 4)]
    #[case(4, 1, 1)]
    #[case(2, 6, 4)]
    fn desktop_offset_wraps(#[case] from: u32, #[case] steps: i64, #[case] expected: u32) {
        assert_eq!(DesktopLayout::new(4, 1).offset(from, steps), expected);
    }

    #[test]
    fn current_desktop_is_clamped() {
        assert_eq!(DesktopLayout::new(4, 9).current, 4);
        assert_eq!(DesktopLayout::new(0, 0), DesktopLayout::new(1, 1));
    }

    struct Counting {
        keys: usize,
        consume: bool,
    }

    impl Effect for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn handle_key(&mut self, _key: EffectKey, _ctx: &mut EffectContext<'_>) -> bool {
            self.keys += 1;
            self.consume
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn consumed_key_stops_the_chain() {
        use crate::display::HeadlessDisplay;

        let display: Rc<dyn DisplayConnection> = Rc::new(HeadlessDisplay::new(Size::new(100, 100)));
        let mut requests = EffectRequests::default();
        let mut ctx = EffectContext {
            display: &display,
            backend: BackendKind::OpenGl,
            screen: Rectangle::new(0, 0, 100, 100),
            desktops: DesktopLayout::default(),
            now: Instant::now(),
            active_window: None,
            requests: &mut requests,
        };
        let mut chain = EffectChain::new();
        chain.push(Box::new(Counting { keys: 0, consume: true }));
        chain.push(Box::new(Counting { keys: 0, consume: true }));
        assert!(chain.handle_key(EffectKey::Escape, &mut ctx));
        let first = chain.get_mut::<Counting>().map(|c| c.keys);
        assert_eq!(first, Some(1));
        assert_eq!(chain.names(), vec!["counting", "counting"]);
    }
}
