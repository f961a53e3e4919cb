//! Fades windows in when they appear, out when they close, and smooths
//! opacity changes.
//!
//! A closing window is kept as a placeholder for as long as its fade holds
//! the [`DeletedRef`]; dropping the fade lets the compositor tear it down.

use std::any::Any;
use std::collections::HashMap;
use std::time::Duration;

use novade_compositor_core::{Rectangle, Region, SurfaceHandle, WindowType};
use novade_core::config::FadeConfig;
use tracing::{debug, trace};

use super::timeline::{Curve, Timeline};
use super::{Effect, EffectContext, EffectPainter, EffectWindow};
use crate::compositor::DeletedRef;
use crate::scene::{PaintMask, PaintingDisabled, ScreenPrePaintData, WindowPaintData, WindowPrePaintData};

#[derive(Debug)]
struct Fade {
    timeline: Timeline,
    from: f64,
    to: f64,
    /// Keeps the placeholder of a closed window alive.
    deleted: Option<DeletedRef>,
    extent: Rectangle,
}

impl Fade {
    /// Opacity multiplier for the current frame.
    fn factor(&self) -> f64 {
        self.from + (self.to - self.from) * self.timeline.value()
    }
}

#[derive(Debug)]
pub struct FadeEffect {
    fade_in: Duration,
    fade_out: Duration,
    fades: HashMap<SurfaceHandle, Fade>,
}

impl FadeEffect {
    pub const NAME: &'static str = "fade";

    pub fn new(fade_in: Duration, fade_out: Duration) -> Self {
        Self { fade_in, fade_out, fades: HashMap::new() }
    }

    pub fn from_config(config: &FadeConfig, scale: impl Fn(u64) -> u64) -> Self {
        Self::new(
            Duration::from_millis(scale(config.fade_in_ms)),
            Duration::from_millis(scale(config.fade_out_ms)),
        )
    }

    pub fn is_fading(&self, handle: SurfaceHandle) -> bool {
        self.fades.contains_key(&handle)
    }

    /// Current opacity multiplier of a fading window.
    pub fn factor(&self, handle: SurfaceHandle) -> Option<f64> {
        self.fades.get(&handle).map(Fade::factor)
    }

    fn start(
        &mut self,
        window: &EffectWindow<'_>,
        from: f64,
        to: f64,
        duration: Duration,
        deleted: Option<DeletedRef>,
        ctx: &mut EffectContext<'_>,
    ) {
        // A fade interrupted half way continues from where it is.
        let from = self.fades.get(&window.handle()).map_or(from, Fade::factor);
        let extent = window.geometry();
        trace!(surface = ?window.handle(), from, to, "fade started");
        self.fades.insert(
            window.handle(),
            Fade { timeline: Timeline::new(ctx.now, duration, Curve::Linear), from, to, deleted, extent },
        );
        ctx.requests.add_repaint(extent);
    }
}

impl Effect for FadeEffect {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn is_active(&self) -> bool {
        !self.fades.is_empty()
    }

    fn pre_paint_screen(&mut self, _data: &mut ScreenPrePaintData, ctx: &mut EffectContext<'_>) {
        for fade in self.fades.values_mut() {
            fade.timeline.update(ctx.now);
        }
    }

    fn pre_paint_window(
        &mut self,
        window: &EffectWindow<'_>,
        data: &mut WindowPrePaintData,
        _ctx: &mut EffectContext<'_>,
    ) {
        let Some(fade) = self.fades.get_mut(&window.handle()) else {
            return;
        };
        data.set_translucent();
        if fade.deleted.is_some() {
            data.enable_painting(PaintingDisabled::BY_DELETE);
        }
        fade.extent = fade.extent.union(&data.extent);
    }

    fn paint_window(
        &mut self,
        window: &EffectWindow<'_>,
        _mask: PaintMask,
        _region: &Region,
        data: &mut WindowPaintData,
        _painter: &mut dyn EffectPainter,
    ) {
        if let Some(fade) = self.fades.get(&window.handle()) {
            data.opacity = (data.opacity * fade.factor()).clamp(0.0, 1.0);
        }
    }

    fn post_paint_screen(&mut self, ctx: &mut EffectContext<'_>) {
        for fade in self.fades.values() {
            ctx.requests.add_repaint(fade.extent);
        }
        self.fades.retain(|handle, fade| {
            let running = !fade.timeline.is_done();
            if !running {
                trace!(surface = ?handle, "fade finished");
            }
            running
        });
    }

    fn window_added(&mut self, window: &EffectWindow<'_>, ctx: &mut EffectContext<'_>) {
        if window.window_type() == WindowType::Desktop || self.fade_in.is_zero() {
            return;
        }
        self.start(window, 0.0, 1.0, self.fade_in, None, ctx);
    }

    fn window_closed(&mut self, window: &EffectWindow<'_>, deleted: Option<&DeletedRef>, ctx: &mut EffectContext<'_>) {
        let Some(deleted) = deleted else {
            self.fades.remove(&window.handle());
            return;
        };
        if self.fade_out.is_zero() || window.window_type() == WindowType::Desktop {
            self.fades.remove(&window.handle());
            return;
        }
        debug!(surface = ?window.handle(), "fading out closed window");
        self.start(window, 1.0, 0.0, self.fade_out, Some(deleted.clone()), ctx);
    }

    fn window_deleted(&mut self, handle: SurfaceHandle) {
        self.fades.remove(&handle);
    }

    fn window_opacity_changed(&mut self, window: &EffectWindow<'_>, old: f64, ctx: &mut EffectContext<'_>) {
        let new = window.toplevel().opacity();
        if new <= 0.0 || window.is_deleted() || self.fade_in.is_zero() {
            return;
        }
        // The multiplier starts where the old opacity was and settles at 1.
        self.start(window, old / new, 1.0, self.fade_in, None, ctx);
    }

    fn cancel(&mut self, ctx: &mut EffectContext<'_>) {
        for fade in self.fades.values() {
            ctx.requests.add_repaint(fade.extent);
        }
        self.fades.clear();
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{DisplayConnection, HeadlessDisplay};
    use crate::effects::{DesktopLayout, EffectRequests};
    use crate::scene::BackendKind;
    use novade_compositor_core::{Size, SurfaceArena, SurfaceDescriptor, Toplevel, WindowId};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Instant;

    struct Harness {
        display: Rc<dyn DisplayConnection>,
        requests: EffectRequests,
        now: Instant,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                display: Rc::new(HeadlessDisplay::new(Size::new(640, 480))),
                requests: EffectRequests::default(),
                now: Instant::now(),
            }
        }

        fn with<R>(&mut self, f: impl FnOnce(&mut EffectContext<'_>) -> R) -> R {
            let mut ctx = EffectContext {
                display: &self.display,
                backend: BackendKind::XRender,
                screen: Rectangle::new(0, 0, 640, 480),
                desktops: DesktopLayout::default(),
                now: self.now,
                active_window: None,
                requests: &mut self.requests,
            };
            f(&mut ctx)
        }

        fn frame(&mut self, fade: &mut FadeEffect, ms: u64) {
            self.now += Duration::from_millis(ms);
            let mut data = ScreenPrePaintData::new(PaintMask::empty(), Region::new());
            self.with(|ctx| {
                fade.pre_paint_screen(&mut data, ctx);
                fade.post_paint_screen(ctx);
            });
        }
    }

    fn surface() -> (SurfaceHandle, Toplevel) {
        let toplevel = Toplevel::new(SurfaceDescriptor::new(WindowId(7), Rectangle::new(10, 10, 100, 50)));
        let mut arena = SurfaceArena::new();
        (arena.insert(()), toplevel)
    }

    fn effect() -> FadeEffect {
        FadeEffect::new(Duration::from_millis(100), Duration::from_millis(100))
    }

    #[test]
    fn fades_in_on_add() {
        let mut h = Harness::new();
        let mut fade = effect();
        let (handle, toplevel) = surface();
        let window = EffectWindow::new(handle, &toplevel, 0, false);
        h.with(|ctx| fade.window_added(&window, ctx));
        assert_eq!(fade.factor(handle), Some(0.0));
        assert!(fade.is_active());

        h.frame(&mut fade, 50);
        let factor = fade.factor(handle).unwrap_or_default();
        assert!((factor - 0.5).abs() < 1e-3);

        let mut data = WindowPaintData::new(0.8);
        let mut region = Region::new();
        region.add_rect(Rectangle::new(0, 0, 1, 1));
        // Painter is not touched by the fade.
        struct NoPainter;
        impl EffectPainter for NoPainter {
            fn backend(&self) -> BackendKind {
                BackendKind::XRender
            }
            fn upload_image(&mut self, _: Size, _: &[u8]) -> Option<crate::effects::ImageHandle> {
                None
            }
            fn image_from_pixmap(
                &mut self,
                _: crate::display::PixmapId,
                _: Size,
            ) -> Option<crate::effects::ImageHandle> {
                None
            }
            fn release_image(&mut self, _: crate::effects::ImageHandle) {}
            fn draw_image(&mut self, _: &crate::effects::ImageDraw<'_>) {}
        }
        fade.paint_window(&window, PaintMask::WINDOW_TRANSLUCENT, &region, &mut data, &mut NoPainter);
        assert!((data.opacity - 0.4).abs() < 1e-3);

        h.frame(&mut fade, 60);
        assert!(!fade.is_fading(handle));
        assert!(!fade.is_active());
    }

    #[test]
    fn desktop_windows_do_not_fade() {
        let mut h = Harness::new();
        let mut fade = effect();
        let mut arena = SurfaceArena::new();
        let handle = arena.insert(());
        let descriptor = SurfaceDescriptor {
            window_type: WindowType::Desktop,
            ..SurfaceDescriptor::new(WindowId(1), Rectangle::new(0, 0, 640, 480))
        };
        let toplevel = Toplevel::new(descriptor);
        let window = EffectWindow::new(handle, &toplevel, 0, false);
        h.with(|ctx| fade.window_added(&window, ctx));
        assert!(!fade.is_active());
    }

    #[test]
    fn fade_out_holds_the_placeholder_until_done() {
        let mut h = Harness::new();
        let mut fade = effect();
        let (handle, mut toplevel) = surface();
        toplevel.into_deleted();
        let released = Rc::new(RefCell::new(Vec::new()));
        let deleted = DeletedRef::new(handle, released.clone());
        let window = EffectWindow::new(handle, &toplevel, 0, false);
        h.with(|ctx| fade.window_closed(&window, Some(&deleted), ctx));
        drop(deleted);
        assert!(released.borrow().is_empty());

        let mut data = WindowPrePaintData::new(&toplevel, &Region::new(), PaintingDisabled::BY_DELETE);
        h.with(|ctx| fade.pre_paint_window(&window, &mut data, ctx));
        assert!(data.is_painting_enabled());
        assert!(data.mask.contains(PaintMask::WINDOW_TRANSLUCENT));

        h.frame(&mut fade, 120);
        assert_eq!(*released.borrow(), vec![handle]);
    }

    #[test]
    fn cancel_drops_everything() {
        let mut h = Harness::new();
        let mut fade = effect();
        let (handle, toplevel) = surface();
        let released = Rc::new(RefCell::new(Vec::new()));
        let deleted = DeletedRef::new(handle, released.clone());
        let window = EffectWindow::new(handle, &toplevel, 0, false);
        h.with(|ctx| fade.window_closed(&window, Some(&deleted), ctx));
        drop(deleted);
        h.with(|ctx| fade.cancel(ctx));
        assert!(!fade.is_active());
        assert_eq!(released.borrow().len(), 1);
    }
}
