//! The compositing context.
//!
//! [`Compositor`] is the one object the window manager talks to. It owns the
//! surface arena, the stacking order, the active scene (when compositing is
//! on), the effect chain and the frame scheduler, and it runs one frame per
//! [`Compositor::timer_fired`].
//!
//! All methods take `&mut self`, so nothing can change the surfaces or the
//! stacking order while a frame is being painted; anything effects ask for
//! during a frame is applied once the frame is done.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use novade_compositor_core::{
    Desktop, Rectangle, Region, Size, SurfaceArena, SurfaceDescriptor, SurfaceHandle, StackingOrder, Toplevel, WindowId,
};
use novade_core::config::{BackendPreference, CompositingConfig};
use tracing::{debug, error, info, trace, warn};

use crate::display::{DisplayConnection, DisplayError, ServerGrab};
use crate::effects::{
    CubeEffect, DesktopLayout, Effect, EffectChain, EffectContext, EffectKey, EffectRequests, EffectWindow,
    FadeEffect, ShadowEffect,
};
use crate::error::{CompositingError, UnavailableReason};
use crate::extensions::Extensions;
use crate::scene::{
    Backend, BackendKind, GlBackend, PaintInput, PaintMask, RenderBackend, Scene, ScreenPrePaintData,
};
use crate::scheduler::{refresh_rate, FrameScheduler};

struct DeletedInner {
    handle: SurfaceHandle,
    released: Rc<RefCell<Vec<SurfaceHandle>>>,
}

impl Drop for DeletedInner {
    fn drop(&mut self) {
        trace!(surface = ?self.handle, "last placeholder reference dropped");
        self.released.borrow_mut().push(self.handle);
    }
}

/// Shared ownership of a closed window's placeholder.
///
/// The placeholder stays in the stacking order and keeps its captured
/// content while any `DeletedRef` to it exists. When the last one is
/// dropped the compositor removes it at the next safe point.
#[derive(Clone)]
pub struct DeletedRef(Rc<DeletedInner>);

impl DeletedRef {
    pub(crate) fn new(handle: SurfaceHandle, released: Rc<RefCell<Vec<SurfaceHandle>>>) -> Self {
        Self(Rc::new(DeletedInner { handle, released }))
    }

    pub fn handle(&self) -> SurfaceHandle {
        self.0.handle
    }
}

impl std::fmt::Debug for DeletedRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DeletedRef").field(&self.0.handle).finish()
    }
}

/// Whether compositing is on, and why not if it is off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositingStatus {
    pub enabled: bool,
    pub backend: Option<BackendKind>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames: u64,
    /// Timer firings that found nothing to paint.
    pub empty_frames: u64,
    pub last_painted_area: i64,
    pub last_painted_windows: usize,
    pub last_skipped_windows: usize,
    pub total_skipped_windows: u64,
}

pub struct Compositor {
    display: Rc<dyn DisplayConnection>,
    config: CompositingConfig,
    extensions: Extensions,
    grab: ServerGrab,
    surfaces: SurfaceArena<Toplevel>,
    by_window: HashMap<WindowId, SurfaceHandle>,
    stacking: StackingOrder,
    scene: Option<Scene>,
    effects: EffectChain,
    scheduler: FrameScheduler,
    /// Screen-space repaints not tied to one surface.
    workspace_repaints: Region,
    reason: Option<UnavailableReason>,
    deleted: HashMap<SurfaceHandle, Weak<DeletedInner>>,
    /// References taken at close time, dropped at the next release pass.
    pending_deleted: Vec<DeletedRef>,
    released: Rc<RefCell<Vec<SurfaceHandle>>>,
    desktops: DesktopLayout,
    desktop_switches: Vec<u32>,
    active_window: Option<SurfaceHandle>,
    stats: FrameStats,
    /// Without the damage extension every content change repaints the
    /// whole window.
    full_repaint_mode: bool,
    wakeup: Option<Box<dyn Fn()>>,
}

impl Compositor {
    pub fn new(display: Rc<dyn DisplayConnection>, config: CompositingConfig) -> Self {
        let extensions = Extensions::probe(display.as_ref());
        Self {
            grab: ServerGrab::new(display.clone()),
            scheduler: FrameScheduler::new(refresh_rate(None, config.refresh_rate), config.vsync),
            display,
            config,
            extensions,
            surfaces: SurfaceArena::new(),
            by_window: HashMap::new(),
            stacking: StackingOrder::new(),
            scene: None,
            effects: EffectChain::new(),
            workspace_repaints: Region::new(),
            reason: None,
            deleted: HashMap::new(),
            pending_deleted: Vec::new(),
            released: Rc::new(RefCell::new(Vec::new())),
            desktops: DesktopLayout::default(),
            desktop_switches: Vec::new(),
            active_window: None,
            stats: FrameStats::default(),
            full_repaint_mode: false,
            wakeup: None,
        }
    }

    pub fn display(&self) -> &Rc<dyn DisplayConnection> {
        &self.display
    }

    pub fn config(&self) -> &CompositingConfig {
        &self.config
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// The shared, reference-counted server grab.
    pub fn server_grab(&self) -> &ServerGrab {
        &self.grab
    }

    /// Called whenever a new frame deadline is set, so the event loop can
    /// (re)arm its timer.
    pub fn set_wakeup(&mut self, wakeup: impl Fn() + 'static) {
        self.wakeup = Some(Box::new(wakeup));
    }

    pub fn compositing(&self) -> bool {
        self.scene.is_some()
    }

    pub fn compositing_status(&self) -> CompositingStatus {
        CompositingStatus {
            enabled: self.compositing(),
            backend: self.scene.as_ref().map(Scene::kind),
            reason: self.reason.as_ref().map(ToString::to_string),
        }
    }

    fn unavailable(&mut self, reason: UnavailableReason) -> Result<(), CompositingError> {
        warn!(%reason, "compositing unavailable");
        self.reason = Some(reason.clone());
        Err(CompositingError::Unavailable(reason))
    }

    /// Turns compositing on: probes the display, picks a backend, redirects
    /// windows and schedules a full repaint. On failure nothing is left
    /// half set up and the reason is kept for [`Self::compositing_status`].
    pub fn setup_compositing(&mut self) -> Result<(), CompositingError> {
        if self.compositing() {
            return Ok(());
        }
        if !self.config.enabled {
            return self.unavailable(UnavailableReason::DisabledByConfig);
        }
        self.extensions = Extensions::probe(self.display.as_ref());
        if let Err(reason) = self.extensions.compositing_possible() {
            return self.unavailable(reason);
        }
        let preference = self.config.backend_preference().unwrap_or(BackendPreference::OpenGl);
        let screen = self.display.screen_size();
        let backend = match self.create_backend(preference, screen) {
            Ok(backend) => backend,
            Err(reason) => return self.unavailable(reason),
        };

        let redirected = {
            let _grab = self.grab.guard();
            self.display.redirect_subwindows()
        };
        if let Err(e) = redirected {
            drop(backend);
            return self.unavailable(UnavailableReason::BackendInit(e.to_string()));
        }

        self.full_repaint_mode = !self.extensions.has_damage();
        if self.full_repaint_mode {
            warn!("no damage extension, every change repaints whole windows");
        }
        let display_rate = self.display.outputs().iter().find_map(|output| output.refresh_rate);
        self.scheduler = FrameScheduler::new(refresh_rate(display_rate, self.config.refresh_rate), self.config.vsync);

        let mut scene = Scene::new(backend, screen);
        for (handle, toplevel) in self.surfaces.iter_mut() {
            if toplevel.is_deleted() {
                continue;
            }
            if !self.full_repaint_mode {
                if let Err(e) = self.display.create_damage(toplevel.window()) {
                    warn!(surface = ?handle, "failed to track damage: {}", e);
                }
            }
            toplevel.damage_mut().add_damage_full();
            scene.add_window(handle, toplevel);
        }
        info!(backend = %scene.kind(), windows = scene.window_count(), "compositing enabled");
        self.scene = Some(scene);
        self.reason = None;
        self.load_effects();
        self.add_repaint_full();
        Ok(())
    }

    /// OpenGL when asked for and possible, otherwise the 2D backend.
    fn create_backend(
        &self,
        preference: BackendPreference,
        screen: Size,
    ) -> Result<Backend, UnavailableReason> {
        if preference == BackendPreference::OpenGl {
            match GlBackend::new(self.display.clone(), screen) {
                Ok(gl) => return Ok(Backend::OpenGl(gl)),
                Err(reason) => warn!(%reason, "OpenGL backend unavailable, falling back to XRender"),
            }
        }
        if !self.extensions.has_render() {
            return Err(UnavailableReason::ExtensionMissing("RENDER"));
        }
        RenderBackend::new(self.display.clone(), screen).map(Backend::XRender)
    }

    fn load_effects(&mut self) {
        let kind = self.scene.as_ref().map(Scene::kind);
        let config = &self.config;
        let mut effects = EffectChain::new();
        if config.shadow.enabled {
            effects.push(Box::new(ShadowEffect::new(config.shadow.clone())));
        }
        if config.fade.enabled {
            effects.push(Box::new(FadeEffect::from_config(&config.fade, |ms| config.scaled_duration_ms(ms))));
        }
        if config.cube.enabled && kind == Some(BackendKind::OpenGl) {
            let duration = Duration::from_millis(config.scaled_duration_ms(config.cube.rotation_duration_ms));
            effects.push(Box::new(CubeEffect::new(config.cube.clone(), duration)));
        }
        debug!(effects = ?effects, "effects loaded");
        self.effects = effects;
    }

    /// Turns compositing off, releasing every backend resource, placeholder
    /// and input grab before returning.
    pub fn finish_compositing(&mut self) {
        let Some(mut scene) = self.scene.take() else {
            return;
        };
        scene.release_effect_images(&mut self.effects);
        let mut requests = EffectRequests::default();
        {
            let mut ctx = EffectContext {
                display: &self.display,
                backend: scene.kind(),
                screen: scene.screen(),
                desktops: self.desktops,
                now: Instant::now(),
                active_window: self.active_window,
                requests: &mut requests,
            };
            self.effects.clear(&mut ctx);
        }
        self.scene = Some(scene);
        self.release_deleted();
        let placeholders: Vec<SurfaceHandle> =
            self.surfaces.iter().filter(|(_, t)| t.is_deleted()).map(|(h, _)| h).collect();
        for handle in placeholders {
            self.destroy_surface(handle);
        }
        if let Some(scene) = self.scene.take() {
            scene.teardown();
        }

        {
            let _grab = self.grab.guard();
            if !self.full_repaint_mode {
                for (_, toplevel) in self.surfaces.iter() {
                    self.display.destroy_damage(toplevel.window());
                }
            }
            self.display.unredirect_subwindows();
        }
        self.scheduler.reset();
        self.workspace_repaints.clear();
        info!("compositing disabled");
    }

    /// Tears the current backend down completely, then sets up again with
    /// `preference`.
    pub fn switch_backend(&mut self, preference: BackendPreference) -> Result<(), CompositingError> {
        info!(backend = %preference, "switching compositing backend");
        self.finish_compositing();
        self.config.backend = preference.as_str().to_string();
        self.setup_compositing()
    }

    /// Runs `f` over the effect chain with a fresh context, then applies
    /// whatever the effects asked for.
    fn run_effects<R>(
        &mut self,
        f: impl FnOnce(&mut EffectChain, &SurfaceArena<Toplevel>, &mut EffectContext<'_>) -> R,
    ) -> R {
        let mut requests = EffectRequests::default();
        let backend = self.scene.as_ref().map_or(BackendKind::XRender, Scene::kind);
        let screen = Rectangle::from_size(self.display.screen_size());
        let now = Instant::now();
        let result = {
            let mut ctx = EffectContext {
                display: &self.display,
                backend,
                screen,
                desktops: self.desktops,
                now,
                active_window: self.active_window,
                requests: &mut requests,
            };
            f(&mut self.effects, &self.surfaces, &mut ctx)
        };
        self.apply_requests(requests);
        result
    }

    /// Calls one effect hook for the window behind `handle`.
    fn notify_effects(
        &mut self,
        handle: SurfaceHandle,
        hook: impl FnOnce(&mut EffectChain, &EffectWindow<'_>, &mut EffectContext<'_>),
    ) {
        if !self.compositing() {
            return;
        }
        let index = self.stacking.position(handle).unwrap_or(0);
        self.run_effects(|effects, surfaces, ctx| {
            if let Some(toplevel) = surfaces.get(handle) {
                let window = EffectWindow::new(handle, toplevel, index, ctx.active_window == Some(handle));
                hook(effects, &window, ctx);
            }
        });
    }

    fn apply_requests(&mut self, requests: EffectRequests) {
        if requests.is_empty() {
            return;
        }
        if requests.full_repaint {
            self.add_repaint_full();
        }
        if !requests.workspace_repaints.is_empty() {
            self.add_repaint_region(&requests.workspace_repaints);
        }
        for (handle, rect) in requests.window_repaints {
            if let Some(toplevel) = self.surfaces.get_mut(handle) {
                toplevel.damage_mut().add_repaint(rect);
            }
        }
        for desktop in requests.desktop_switches {
            let desktop = desktop.clamp(1, self.desktops.count);
            if desktop != self.desktops.current {
                debug!(desktop, "desktop switched by effect");
                self.desktops.current = desktop;
                self.desktop_switches.push(desktop);
                self.add_repaint_full();
            }
        }
        self.schedule();
    }

    fn schedule(&mut self) {
        if !self.compositing() {
            return;
        }
        if self.scheduler.schedule(Instant::now()) {
            if let Some(wakeup) = &self.wakeup {
                wakeup();
            }
        }
    }

    /// Asks for `rect` (screen coordinates) to be repainted.
    pub fn add_repaint(&mut self, rect: Rectangle) {
        self.add_repaint_region(&Region::from_rect(rect));
    }

    pub fn add_repaint_region(&mut self, region: &Region) {
        if !self.compositing() {
            return;
        }
        let screen = Rectangle::from_size(self.display.screen_size());
        let mut region = region.clone();
        region.intersect_rect(screen);
        if region.is_empty() {
            return;
        }
        self.workspace_repaints.union_with(&region);
        self.schedule();
    }

    pub fn add_repaint_full(&mut self) {
        self.add_repaint(Rectangle::from_size(self.display.screen_size()));
    }

    /// The area a window covered last frame, effects included.
    fn window_extent(&self, handle: SurfaceHandle) -> Option<Rectangle> {
        let scene_extent = self.scene.as_ref().and_then(|scene| scene.window(handle)).map(|w| w.extent());
        scene_extent.or_else(|| self.surfaces.get(handle).map(Toplevel::geometry))
    }

    /// A new top-level surface. It is placed on top of the stacking order.
    pub fn window_added(&mut self, descriptor: SurfaceDescriptor) -> SurfaceHandle {
        if let Some(&handle) = self.by_window.get(&descriptor.window) {
            warn!(window = %descriptor.window, surface = ?handle, "window added twice");
            return handle;
        }
        let window = descriptor.window;
        let handle = self.surfaces.insert(Toplevel::new(descriptor));
        self.by_window.insert(window, handle);
        self.stacking.push_top(handle);
        debug!(%window, surface = ?handle, "window added");
        if !self.compositing() {
            return handle;
        }
        if !self.full_repaint_mode {
            if let Err(e) = self.display.create_damage(window) {
                warn!(surface = ?handle, "failed to track damage: {}", e);
            }
        }
        if let (Some(scene), Some(toplevel)) = (self.scene.as_mut(), self.surfaces.get(handle)) {
            scene.add_window(handle, toplevel);
        }
        self.notify_effects(handle, |effects, window, ctx| effects.window_added(window, ctx));
        self.schedule();
        handle
    }

    /// The window is gone. With `keep_placeholder` a frozen copy stays in
    /// the stacking order for as long as anyone holds a [`DeletedRef`]; the
    /// compositor itself holds one until the next frame starts.
    pub fn window_closed(&mut self, handle: SurfaceHandle, keep_placeholder: bool) -> Result<(), CompositingError> {
        let compositing = self.scene.is_some();
        let toplevel = self.surfaces.get_mut(handle).ok_or(CompositingError::UnknownSurface(handle))?;
        if toplevel.is_deleted() {
            return Ok(());
        }
        let window = toplevel.window();
        if self.by_window.get(&window) == Some(&handle) {
            self.by_window.remove(&window);
        }
        if self.active_window == Some(handle) {
            self.active_window = None;
        }
        if compositing && !self.full_repaint_mode {
            self.display.destroy_damage(window);
        }

        if keep_placeholder && compositing {
            toplevel.into_deleted();
            let deleted = DeletedRef::new(handle, self.released.clone());
            self.deleted.insert(handle, Rc::downgrade(&deleted.0));
            debug!(%window, surface = ?handle, "window closed, placeholder kept");
            self.notify_effects(handle, |effects, window, ctx| effects.window_closed(window, Some(&deleted), ctx));
            self.pending_deleted.push(deleted);
            if let Some(extent) = self.window_extent(handle) {
                self.add_repaint(extent);
            }
        } else {
            debug!(%window, surface = ?handle, "window closed");
            self.notify_effects(handle, |effects, window, ctx| effects.window_closed(window, None, ctx));
            self.destroy_surface(handle);
        }
        Ok(())
    }

    /// Another reference to a placeholder, `None` once it is on its way out.
    pub fn deleted_ref(&self, handle: SurfaceHandle) -> Option<DeletedRef> {
        self.deleted.get(&handle).and_then(Weak::upgrade).map(DeletedRef)
    }

    fn destroy_surface(&mut self, handle: SurfaceHandle) {
        let Some(toplevel) = self.surfaces.remove(handle) else {
            return;
        };
        self.deleted.remove(&handle);
        if self.by_window.get(&toplevel.window()) == Some(&handle) {
            self.by_window.remove(&toplevel.window());
        }
        self.stacking.remove(handle);
        let extent = self.scene.as_mut().and_then(|scene| scene.remove_window(handle));
        self.effects.window_deleted(handle);
        self.add_repaint(extent.unwrap_or_else(|| toplevel.geometry()));
        debug!(window = %toplevel.window(), surface = ?handle, "surface destroyed");
    }

    /// Removes placeholders whose last reference was dropped.
    fn release_deleted(&mut self) {
        drop(std::mem::take(&mut self.pending_deleted));
        let released: Vec<SurfaceHandle> = self.released.borrow_mut().drain(..).collect();
        for handle in released {
            if self.surfaces.get(handle).is_some_and(Toplevel::is_deleted) {
                self.destroy_surface(handle);
            }
        }
    }

    fn toplevel_mut(&mut self, handle: SurfaceHandle) -> Result<&mut Toplevel, CompositingError> {
        self.surfaces.get_mut(handle).ok_or(CompositingError::UnknownSurface(handle))
    }

    pub fn window_geometry_changed(&mut self, handle: SurfaceHandle, geometry: Rectangle) -> Result<(), CompositingError> {
        let toplevel = self.toplevel_mut(handle)?;
        let old = toplevel.geometry();
        let exposed = toplevel.set_geometry(geometry);
        if exposed.is_empty() {
            return Ok(());
        }
        self.after_geometry_change(handle, old, exposed);
        Ok(())
    }

    /// Frame-local client area.
    pub fn window_client_rect_changed(&mut self, handle: SurfaceHandle, client_rect: Rectangle) -> Result<(), CompositingError> {
        let toplevel = self.toplevel_mut(handle)?;
        let old = toplevel.geometry();
        toplevel.set_client_rect(client_rect);
        self.after_geometry_change(handle, old, Region::from_rect(old));
        Ok(())
    }

    /// `shape` is frame-local; `None` makes the window rectangular again.
    pub fn window_shape_changed(&mut self, handle: SurfaceHandle, shape: Option<Region>) -> Result<(), CompositingError> {
        let toplevel = self.toplevel_mut(handle)?;
        let old = toplevel.geometry();
        toplevel.set_shape(shape);
        self.after_geometry_change(handle, old, Region::from_rect(old));
        Ok(())
    }

    fn after_geometry_change(&mut self, handle: SurfaceHandle, old: Rectangle, exposed: Region) {
        if !self.compositing() {
            return;
        }
        let mut repaint = exposed;
        if let Some(extent) = self.window_extent(handle) {
            repaint.add_rect(extent);
        }
        if let (Some(scene), Some(toplevel)) = (self.scene.as_mut(), self.surfaces.get(handle)) {
            scene.window_geometry_changed(handle, toplevel);
        }
        self.notify_effects(handle, |effects, window, ctx| effects.window_geometry_changed(window, old, ctx));
        self.add_repaint_region(&repaint);
    }

    pub fn window_opacity_changed(&mut self, handle: SurfaceHandle, opacity: f64) -> Result<(), CompositingError> {
        let Some(old) = self.toplevel_mut(handle)?.set_opacity(opacity) else {
            return Ok(());
        };
        if let Some(scene) = self.scene.as_mut() {
            scene.window_opacity_changed(handle);
        }
        self.notify_effects(handle, |effects, window, ctx| effects.window_opacity_changed(window, old, ctx));
        self.schedule();
        Ok(())
    }

    /// The window finished drawing and may be shown.
    pub fn window_ready(&mut self, handle: SurfaceHandle, ready: bool) -> Result<(), CompositingError> {
        self.toplevel_mut(handle)?.set_ready_for_painting(ready);
        self.schedule();
        Ok(())
    }

    pub fn set_minimized(&mut self, handle: SurfaceHandle, minimized: bool) -> Result<(), CompositingError> {
        self.toplevel_mut(handle)?.set_minimized(minimized);
        self.schedule();
        Ok(())
    }

    pub fn set_window_desktop(&mut self, handle: SurfaceHandle, desktop: Desktop) -> Result<(), CompositingError> {
        self.toplevel_mut(handle)?.set_desktop(desktop);
        if let Some(extent) = self.window_extent(handle) {
            self.add_repaint(extent);
        }
        Ok(())
    }

    pub fn set_active_window(&mut self, handle: Option<SurfaceHandle>) {
        if handle == self.active_window {
            return;
        }
        let old = std::mem::replace(&mut self.active_window, handle);
        for handle in [old, handle].into_iter().flatten() {
            if let Some(extent) = self.window_extent(handle) {
                self.add_repaint(extent);
            }
        }
    }

    /// Adopts the window manager's bottom-to-top order. Placeholders keep
    /// their place above the window that was below them; known surfaces the
    /// order leaves out stay on top, and unknown or repeated handles are
    /// ignored.
    pub fn restack(&mut self, order: &[SurfaceHandle]) {
        let surfaces = &self.surfaces;
        self.stacking.restack(order, |h| surfaces.get(h).is_some_and(Toplevel::is_deleted));
        self.add_repaint_full();
    }

    pub fn set_desktop_layout(&mut self, count: u32, current: u32) {
        let layout = DesktopLayout::new(count, current);
        if layout != self.desktops {
            self.desktops = layout;
            self.add_repaint_full();
        }
    }

    pub fn desktops(&self) -> DesktopLayout {
        self.desktops
    }

    /// Desktop switches effects made since the last call, for the window
    /// manager to follow.
    pub fn take_desktop_switches(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.desktop_switches)
    }

    /// A damage notification from the display server, in window-local
    /// coordinates.
    pub fn damage_notify(&mut self, window: WindowId, rect: Rectangle) {
        let Some(&handle) = self.by_window.get(&window) else {
            trace!(%window, "damage for unknown window");
            return;
        };
        let full = self.full_repaint_mode;
        let Some(toplevel) = self.surfaces.get_mut(handle) else {
            return;
        };
        let damaged = if full {
            Some(toplevel.damage_mut().add_damage_full())
        } else {
            toplevel.damage_mut().add_damage(rect)
        };
        let Some(damaged) = damaged else {
            return;
        };
        self.notify_effects(handle, |effects, window, ctx| effects.window_damaged(window, damaged, ctx));
        self.schedule();
    }

    /// Brings up the desktop cube, cancelling any other full-screen effect
    /// first. Returns whether the cube started.
    pub fn activate_cube(&mut self) -> bool {
        if !self.compositing() {
            return false;
        }
        self.run_effects(|effects, _, ctx| {
            effects.cancel_fullscreen(CubeEffect::NAME, ctx);
            effects.get_mut::<CubeEffect>().is_some_and(|cube| cube.activate(ctx))
        })
    }

    /// Offers a key press to the effects. Returns whether one consumed it.
    pub fn handle_key(&mut self, key: EffectKey) -> bool {
        if !self.compositing() {
            return false;
        }
        self.run_effects(|effects, _, ctx| effects.handle_key(key, ctx))
    }

    pub fn effect_mut<T: Effect>(&mut self) -> Option<&mut T> {
        self.effects.get_mut::<T>()
    }

    pub fn effect_names(&self) -> Vec<&'static str> {
        self.effects.names()
    }

    pub fn surface(&self, handle: SurfaceHandle) -> Option<&Toplevel> {
        self.surfaces.get(handle)
    }

    pub fn handle_for(&self, window: WindowId) -> Option<SurfaceHandle> {
        self.by_window.get(&window).copied()
    }

    pub fn stacking(&self) -> &[SurfaceHandle] {
        self.stacking.as_slice()
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// When the frame timer should fire next.
    pub fn next_timeout(&self) -> Option<Instant> {
        if self.compositing() {
            self.scheduler.deadline()
        } else {
            None
        }
    }

    /// Screen repaints of every surface plus the workspace repaints; the
    /// surfaces' repaint regions are consumed.
    fn collect_repaints(&mut self) -> Region {
        let mut damage = std::mem::take(&mut self.workspace_repaints);
        for handle in self.stacking.iter() {
            if let Some(toplevel) = self.surfaces.get_mut(handle) {
                if toplevel.damage().has_repaints() {
                    damage.union_with(&toplevel.screen_repaints());
                    toplevel.damage_mut().clear_repaints();
                }
            }
        }
        damage
    }

    /// The frame timer fired. Paints one frame if one is due and there is
    /// anything to paint. Returns whether a frame was painted.
    pub fn timer_fired(&mut self, now: Instant) -> bool {
        if !self.compositing() {
            self.scheduler.reset();
            return false;
        }
        if !self.scheduler.begin_frame(now) {
            return false;
        }
        self.release_deleted();
        let mut damage = self.collect_repaints();
        damage.intersect_rect(Rectangle::from_size(self.display.screen_size()));
        if damage.is_empty() && !self.effects.is_active() {
            self.stats.empty_frames += 1;
            self.scheduler.cancel_frame(now);
            return false;
        }

        let stacking = self.stacking.snapshot();
        let mut requests = EffectRequests::default();
        let Some(scene) = self.scene.as_mut() else {
            return false;
        };
        let outcome = {
            let mut ctx = EffectContext {
                display: &self.display,
                backend: scene.kind(),
                screen: scene.screen(),
                desktops: self.desktops,
                now,
                active_window: self.active_window,
                requests: &mut requests,
            };
            let mut screen_data = ScreenPrePaintData::new(PaintMask::SCREEN_REGION, damage);
            self.effects.pre_paint_screen(&mut screen_data, &mut ctx);
            let input = PaintInput { surfaces: &self.surfaces, stacking: &stacking, grab: &self.grab };
            let outcome = scene.paint(&input, screen_data, &mut self.effects, &mut ctx);
            self.effects.post_paint_screen(&mut ctx);
            outcome
        };

        for (handle, captured) in &outcome.captured {
            if let Some(toplevel) = self.surfaces.get_mut(*handle) {
                for rect in captured.rects() {
                    toplevel.damage_mut().reset_damage(*rect);
                }
            }
        }
        for handle in &outcome.deferred {
            if let Some(toplevel) = self.surfaces.get_mut(*handle) {
                toplevel.damage_mut().add_repaint_full();
            }
        }
        self.apply_requests(requests);
        self.release_deleted();

        self.stats.frames += 1;
        self.stats.last_painted_area = outcome.painted.area();
        self.stats.last_painted_windows = outcome.painted_windows.len();
        self.stats.last_skipped_windows = outcome.skipped.len();
        self.stats.total_skipped_windows += outcome.skipped.len() as u64;
        trace!(frame = self.stats.frames, area = self.stats.last_painted_area, "frame done");

        let more = self.effects.is_active() || !outcome.deferred.is_empty();
        self.scheduler.end_frame(now, outcome.swap, more);

        if let Some(DisplayError::ContextLost) = outcome.present_error {
            error!("rendering context lost, compositing disabled");
            self.finish_compositing();
            self.reason = Some(UnavailableReason::BackendInit(DisplayError::ContextLost.to_string()));
        }
        true
    }
}

impl Drop for Compositor {
    fn drop(&mut self) {
        self.finish_compositing();
    }
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("compositing", &self.compositing())
            .field("surfaces", &self.surfaces.len())
            .field("effects", &self.effects)
            .field("scheduler", &self.scheduler.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::HeadlessDisplay;

    fn config() -> CompositingConfig {
        let mut config = CompositingConfig::default();
        config.fade.enabled = false;
        config
    }

    fn compositor(display: &Rc<HeadlessDisplay>) -> Compositor {
        let dyn_display: Rc<dyn DisplayConnection> = display.clone();
        Compositor::new(dyn_display, config())
    }

    #[test]
    fn deleted_ref_queues_release_on_last_drop() {
        let released = Rc::new(RefCell::new(Vec::new()));
        let mut arena = SurfaceArena::new();
        let handle = arena.insert(());
        let first = DeletedRef::new(handle, released.clone());
        let second = first.clone();
        drop(first);
        assert!(released.borrow().is_empty());
        drop(second);
        assert_eq!(*released.borrow(), vec![handle]);
    }

    #[test]
    fn disabled_by_config_reports_reason() {
        let display = Rc::new(HeadlessDisplay::new(Size::new(320, 240)));
        let mut config = config();
        config.enabled = false;
        let mut compositor = Compositor::new(display.clone(), config);
        let err = compositor.setup_compositing().err();
        assert_eq!(
            err.as_ref().and_then(CompositingError::unavailable_reason),
            Some(&UnavailableReason::DisabledByConfig)
        );
        let status = compositor.compositing_status();
        assert!(!status.enabled);
        assert_eq!(status.reason.as_deref(), Some("disabled by configuration"));
        assert!(!display.is_redirected());
    }

    #[test]
    fn setup_and_finish_leave_nothing_behind() {
        let display = Rc::new(HeadlessDisplay::new(Size::new(320, 240)));
        display.map_window(WindowId(1), Size::new(100, 100));
        let mut compositor = compositor(&display);
        compositor.window_added(SurfaceDescriptor::new(WindowId(1), Rectangle::new(0, 0, 100, 100)));
        assert!(compositor.setup_compositing().is_ok());
        assert!(display.is_redirected());
        assert_eq!(compositor.compositing_status().backend, Some(BackendKind::OpenGl));
        assert_eq!(display.live_damage_objects(), 1);

        let now = Instant::now() + Duration::from_secs(1);
        assert!(compositor.timer_fired(now));
        assert!(display.live_textures() > 0);

        compositor.finish_compositing();
        assert!(!compositor.compositing());
        assert!(!display.is_redirected());
        assert!(!display.has_gl_context());
        assert_eq!(display.live_textures(), 0);
        assert_eq!(display.live_pixmaps(), 0);
        assert_eq!(display.live_damage_objects(), 0);
        assert!(!display.server_grabbed());
    }

    #[test]
    fn unknown_surface_is_an_error() {
        let display = Rc::new(HeadlessDisplay::new(Size::new(320, 240)));
        let mut compositor = compositor(&display);
        let handle = compositor.window_added(SurfaceDescriptor::new(WindowId(5), Rectangle::new(0, 0, 10, 10)));
        assert!(compositor.window_closed(handle, false).is_ok());
        assert!(matches!(
            compositor.window_opacity_changed(handle, 0.5),
            Err(CompositingError::UnknownSurface(h)) if h == handle
        ));
    }
}
