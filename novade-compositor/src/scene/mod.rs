//! The scene: one frame from damage to presentation.
//!
//! [`Scene::paint`] runs the per-frame algorithm over a consistent snapshot
//! of the surfaces and the stacking order:
//!
//! 1. every window gets a pre-paint record; effects may change its mask,
//!    extend its paint region or disable it for this frame;
//! 2. without screen transforms ("simple" paint) opaque windows are painted
//!    top to bottom, each one removing its shape from what is left to paint,
//!    then the uncovered rest gets the background, then translucent windows
//!    are blended bottom to top;
//! 3. with a screen transform ("generic" paint) the background covers
//!    everything first and every window is painted bottom to top without
//!    occlusion culling, once per screen pass;
//! 4. the backend presents the painted region.
//!
//! Backends are a closed set ([`Backend`]) chosen at setup.

pub mod opengl;
pub mod quads;
pub mod window;
pub mod xrender;

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use glam::{Mat4, Vec3};
use novade_compositor_core::{Rectangle, Region, Size, SurfaceArena, SurfaceHandle, Toplevel};
use novade_core::config::BackendPreference;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use crate::display::{Color, DisplayConnection, DisplayError, PixmapId, ServerGrab, SwapResult};
use crate::effects::{EffectChain, EffectContext, EffectPainter, EffectWindow, ImageDraw, ImageHandle};

pub use opengl::GlBackend;
pub use quads::{QuadKind, WindowQuad, WindowQuadList, WindowVertex};
pub use window::{SceneWindow, WindowResource};
pub use xrender::RenderBackend;

bitflags! {
    /// How a window or the screen is being painted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PaintMask: u32 {
        const WINDOW_OPAQUE = 1 << 0;
        const WINDOW_TRANSLUCENT = 1 << 1;
        const WINDOW_TRANSFORMED = 1 << 2;
        /// Only part of the screen is repainted.
        const SCREEN_REGION = 1 << 3;
        const SCREEN_TRANSFORMED = 1 << 4;
        const SCREEN_WITH_TRANSFORMED_WINDOWS = 1 << 5;
        const SCREEN_BACKGROUND_FIRST = 1 << 6;
    }
}

bitflags! {
    /// Reasons a window is not painted this frame. Effects clear the ones
    /// they override.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PaintingDisabled: u32 {
        const BY_DELETE = 1 << 0;
        const BY_DESKTOP = 1 << 1;
        const BY_MINIMIZE = 1 << 2;
        const BY_EFFECT = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationAxis {
    X,
    Y,
    Z,
}

impl RotationAxis {
    fn vector(self) -> Vec3 {
        match self {
            RotationAxis::X => Vec3::X,
            RotationAxis::Y => Vec3::Y,
            RotationAxis::Z => Vec3::Z,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationData {
    pub axis: RotationAxis,
    /// Degrees.
    pub angle: f32,
    /// Point the rotation happens around, in the local coordinates of what
    /// is rotated.
    pub origin: Vec3,
}

impl RotationData {
    fn matrix(&self) -> Mat4 {
        Mat4::from_translation(self.origin)
            * Mat4::from_axis_angle(self.axis.vector(), self.angle.to_radians())
            * Mat4::from_translation(-self.origin)
    }
}

/// Per-window paint parameters, reset every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowPaintData {
    pub opacity: f64,
    pub saturation: f64,
    pub brightness: f64,
    pub scale: Vec3,
    pub translate: Vec3,
    pub rotation: Option<RotationData>,
}

impl WindowPaintData {
    pub fn new(opacity: f64) -> Self {
        Self {
            opacity: opacity.clamp(0.0, 1.0),
            saturation: 1.0,
            brightness: 1.0,
            scale: Vec3::ONE,
            translate: Vec3::ZERO,
            rotation: None,
        }
    }

    pub fn is_transformed(&self) -> bool {
        self.scale != Vec3::ONE || self.translate != Vec3::ZERO || self.rotation.is_some()
    }

    /// Maps frame-local coordinates of a window at `pos` to screen space.
    pub fn matrix(&self, pos: novade_compositor_core::Point) -> Mat4 {
        let origin = Vec3::new(pos.x as f32, pos.y as f32, 0.0) + self.translate;
        let rotation = self.rotation.map_or(Mat4::IDENTITY, |r| r.matrix());
        Mat4::from_translation(origin) * Mat4::from_scale(self.scale) * rotation
    }
}

impl Default for WindowPaintData {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Screen-wide transform of one screen pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenPaintData {
    pub scale: Vec3,
    pub translate: Vec3,
    pub rotation: Option<RotationData>,
    /// Applied after `rotation`, tilting the already rotated scene.
    pub tilt: Option<RotationData>,
}

impl ScreenPaintData {
    pub fn is_identity(&self) -> bool {
        self.scale == Vec3::ONE && self.translate == Vec3::ZERO && self.rotation.is_none() && self.tilt.is_none()
    }

    pub fn has_rotation(&self) -> bool {
        self.rotation.is_some() || self.tilt.is_some()
    }

    pub fn matrix(&self) -> Mat4 {
        let rotation = self.rotation.map_or(Mat4::IDENTITY, |r| r.matrix());
        let tilt = self.tilt.map_or(Mat4::IDENTITY, |r| r.matrix());
        Mat4::from_translation(self.translate) * Mat4::from_scale(self.scale) * tilt * rotation
    }
}

impl Default for ScreenPaintData {
    fn default() -> Self {
        Self { scale: Vec3::ONE, translate: Vec3::ZERO, rotation: None, tilt: None }
    }
}

/// One repetition of the screen paint with its own transform.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenPass {
    pub data: ScreenPaintData,
    /// Paint the windows of this desktop instead of the current one.
    pub desktop: Option<u32>,
    /// Multiplies every window's opacity in this pass.
    pub opacity: f64,
}

impl Default for ScreenPass {
    fn default() -> Self {
        Self { data: ScreenPaintData::default(), desktop: None, opacity: 1.0 }
    }
}

/// What effects may change about the whole frame before it is painted.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenPrePaintData {
    pub mask: PaintMask,
    /// Screen region to repaint.
    pub paint: Region,
    /// Overrides the scene's background color.
    pub background: Option<Color>,
    /// Empty for a single untransformed pass.
    pub passes: Vec<ScreenPass>,
}

impl ScreenPrePaintData {
    pub fn new(mask: PaintMask, paint: Region) -> Self {
        Self { mask, paint, background: None, passes: Vec::new() }
    }
}

/// What effects may change about one window before it is painted.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowPrePaintData {
    pub mask: PaintMask,
    /// Screen region this window asks to be repainted.
    pub paint: Region,
    /// Screen region the window covers opaquely; hides what is below.
    pub clip: Region,
    pub disabled: PaintingDisabled,
    /// Screen area the window covers including anything effects draw for
    /// it, such as a shadow.
    pub extent: Rectangle,
    grid: Option<i32>,
}

impl WindowPrePaintData {
    pub(crate) fn new(toplevel: &Toplevel, paint: &Region, disabled: PaintingDisabled) -> Self {
        let opaque = toplevel.is_opaque();
        Self {
            mask: if opaque { PaintMask::WINDOW_OPAQUE } else { PaintMask::WINDOW_TRANSLUCENT },
            paint: paint.clone(),
            clip: if opaque {
                toplevel.shape_region().translated(toplevel.pos().x, toplevel.pos().y)
            } else {
                Region::new()
            },
            disabled,
            extent: toplevel.geometry(),
            grid: None,
        }
    }

    /// Switches the window to the blended pass.
    pub fn set_translucent(&mut self) {
        self.mask.remove(PaintMask::WINDOW_OPAQUE);
        self.mask.insert(PaintMask::WINDOW_TRANSLUCENT);
        self.clip.clear();
    }

    pub fn set_transformed(&mut self) {
        self.mask.insert(PaintMask::WINDOW_TRANSFORMED);
        self.clip.clear();
    }

    pub fn enable_painting(&mut self, reason: PaintingDisabled) {
        self.disabled.remove(reason);
    }

    pub fn disable_painting(&mut self, reason: PaintingDisabled) {
        self.disabled.insert(reason);
    }

    pub fn is_painting_enabled(&self) -> bool {
        self.disabled.is_empty()
    }

    /// Asks for quads no larger than `max_size` from the next frame on.
    pub fn request_vertex_grid(&mut self, max_size: i32) {
        self.grid = Some(self.grid.map_or(max_size, |g| g.min(max_size)));
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error("window is not viewable")]
    NotViewable,
    #[error("window has zero size")]
    ZeroSize,
    #[error("placeholder has no captured content")]
    NoContent,
    #[error("stale pixmap: pixmap is {}x{} but the surface is {}x{}", pixmap.width, pixmap.height, surface.width, surface.height)]
    StalePixmap { pixmap: Size, surface: Size },
    #[error("capture failed: {0}")]
    Capture(DisplayError),
    #[error("resource creation failed: {0}")]
    Resource(DisplayError),
}

/// Everything the compositor needs to know after a frame.
#[derive(Debug, Default)]
pub struct FrameOutcome {
    /// Screen region that was redrawn and presented.
    pub painted: Region,
    pub swap: SwapResult,
    pub painted_windows: Vec<SurfaceHandle>,
    pub skipped: Vec<(SurfaceHandle, SkipReason)>,
    /// Windows whose capture was stale and that must be retried.
    pub deferred: Vec<SurfaceHandle>,
    /// Surface-local damage captured into backend resources.
    pub captured: Vec<(SurfaceHandle, Region)>,
    pub present_error: Option<DisplayError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    OpenGl,
    XRender,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::OpenGl => "opengl",
            BackendKind::XRender => "xrender",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<BackendPreference> for BackendKind {
    fn from(preference: BackendPreference) -> Self {
        match preference {
            BackendPreference::OpenGl => BackendKind::OpenGl,
            BackendPreference::XRender => BackendKind::XRender,
        }
    }
}

/// The active rendering backend.
#[derive(Debug)]
pub enum Backend {
    OpenGl(GlBackend),
    XRender(RenderBackend),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::OpenGl(_) => BackendKind::OpenGl,
            Backend::XRender(_) => BackendKind::XRender,
        }
    }

    fn display(&self) -> Rc<dyn DisplayConnection> {
        match self {
            Backend::OpenGl(gl) => gl.display(),
            Backend::XRender(render) => render.display(),
        }
    }

    fn paint_background(&mut self, region: &Region, color: Color) {
        match self {
            Backend::OpenGl(gl) => gl.paint_background(region, color),
            Backend::XRender(render) => render.paint_background(region, color),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn perform_paint(
        &mut self,
        window: &mut SceneWindow,
        toplevel: &Toplevel,
        mask: PaintMask,
        region: &Region,
        data: &WindowPaintData,
        screen: &ScreenPaintData,
        grab: &ServerGrab,
    ) -> Result<bool, SkipReason> {
        if !mask_allows(mask, toplevel, data) {
            return Ok(false);
        }
        // Damage does not match transformed positions, so transformed
        // windows are not clipped.
        let region = if mask.intersects(PaintMask::WINDOW_TRANSFORMED | PaintMask::SCREEN_TRANSFORMED) {
            Region::infinite()
        } else {
            region.clone()
        };
        match self {
            Backend::OpenGl(gl) => gl.perform_paint(window, toplevel, &region, data, screen, grab),
            Backend::XRender(render) => render.perform_paint(window, toplevel, &region, data, screen, grab),
        }
    }

    fn present(&mut self, region: &Region) -> Result<SwapResult, DisplayError> {
        match self {
            Backend::OpenGl(gl) => gl.present(region),
            Backend::XRender(render) => Ok(render.present(region)),
        }
    }

    fn teardown(&mut self) {
        match self {
            Backend::OpenGl(gl) => gl.teardown(),
            Backend::XRender(render) => render.teardown(),
        }
    }
}

/// A window painted in an opaque-only pass must be opaque at the opacity it
/// is painted with, and vice versa.
fn mask_allows(mask: PaintMask, toplevel: &Toplevel, data: &WindowPaintData) -> bool {
    let opaque = toplevel.is_opaque() && data.opacity >= 1.0;
    let opaque_pass = mask.contains(PaintMask::WINDOW_OPAQUE);
    let translucent_pass = mask.contains(PaintMask::WINDOW_TRANSLUCENT);
    if opaque_pass != translucent_pass {
        if opaque_pass {
            return opaque;
        }
        return !opaque;
    }
    true
}

/// Draw access handed to effects while a window is painted.
struct ScenePainter<'a> {
    backend: &'a mut Backend,
    screen: &'a ScreenPaintData,
}

impl EffectPainter for ScenePainter<'_> {
    fn backend(&self) -> BackendKind {
        self.backend.kind()
    }

    fn upload_image(&mut self, size: Size, rgba: &[u8]) -> Option<ImageHandle> {
        match self.backend {
            Backend::OpenGl(gl) => gl.upload_image(size, rgba),
            Backend::XRender(render) => render.upload_image(size, rgba),
        }
    }

    fn image_from_pixmap(&mut self, pixmap: PixmapId, size: Size) -> Option<ImageHandle> {
        match self.backend {
            Backend::OpenGl(gl) => gl.image_from_pixmap(pixmap, size),
            Backend::XRender(render) => render.image_from_pixmap(pixmap, size),
        }
    }

    fn release_image(&mut self, image: ImageHandle) {
        match self.backend {
            Backend::OpenGl(gl) => gl.release_image(image),
            Backend::XRender(render) => render.release_image(image),
        }
    }

    fn draw_image(&mut self, draw: &ImageDraw<'_>) {
        match self.backend {
            Backend::OpenGl(gl) => gl.draw_image(draw, self.screen),
            Backend::XRender(render) => render.draw_image(draw, self.screen),
        }
    }
}

/// Surfaces and stacking order frozen for one frame.
pub struct PaintInput<'a> {
    pub surfaces: &'a SurfaceArena<Toplevel>,
    /// Bottom to top.
    pub stacking: &'a [SurfaceHandle],
    pub grab: &'a ServerGrab,
}

struct PaintEntry {
    handle: SurfaceHandle,
    index: usize,
    data: WindowPrePaintData,
}

#[derive(Debug)]
pub struct Scene {
    backend: Backend,
    windows: HashMap<SurfaceHandle, SceneWindow>,
    screen: Rectangle,
    background: Color,
}

impl Scene {
    pub fn new(backend: Backend, screen: Size) -> Self {
        debug!(backend = %backend.kind(), ?screen, "scene created");
        Self { backend, windows: HashMap::new(), screen: Rectangle::from_size(screen), background: Color::BLACK }
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn screen(&self) -> Rectangle {
        self.screen
    }

    pub fn set_background(&mut self, color: Color) {
        self.background = color;
    }

    pub fn add_window(&mut self, handle: SurfaceHandle, toplevel: &Toplevel) {
        self.windows.entry(handle).or_insert_with(|| SceneWindow::new(handle, toplevel));
    }

    /// Releases the window's resources. Returns the area it last covered.
    pub fn remove_window(&mut self, handle: SurfaceHandle) -> Option<Rectangle> {
        let mut window = self.windows.remove(&handle)?;
        window.release_resources(self.backend.display().as_ref());
        Some(window.extent())
    }

    pub fn window(&self, handle: SurfaceHandle) -> Option<&SceneWindow> {
        self.windows.get(&handle)
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Drops caches invalidated by a geometry or shape change right away
    /// instead of at the next paint.
    pub fn window_geometry_changed(&mut self, handle: SurfaceHandle, toplevel: &Toplevel) {
        let display = self.backend.display();
        if let Some(window) = self.windows.get_mut(&handle) {
            window.sync_generation(toplevel, display.as_ref());
        }
    }

    pub fn window_opacity_changed(&mut self, handle: SurfaceHandle) {
        if let (Backend::XRender(render), Some(window)) = (&mut self.backend, self.windows.get_mut(&handle)) {
            render.invalidate_alpha(window);
        }
    }

    /// Paints and presents one frame.
    pub fn paint(
        &mut self,
        input: &PaintInput<'_>,
        screen_data: ScreenPrePaintData,
        effects: &mut EffectChain,
        ctx: &mut EffectContext<'_>,
    ) -> FrameOutcome {
        let display = self.backend.display();
        for &handle in input.stacking {
            let Some(toplevel) = input.surfaces.get(handle) else {
                continue;
            };
            let window = self.windows.entry(handle).or_insert_with(|| SceneWindow::new(handle, toplevel));
            window.sync_generation(toplevel, display.as_ref());
            window.begin_frame();
        }

        let ScreenPrePaintData { mask, paint, background, passes } = screen_data;
        let background = background.unwrap_or(self.background);
        let mut outcome = FrameOutcome::default();

        let painted = if mask.intersects(PaintMask::SCREEN_TRANSFORMED | PaintMask::SCREEN_WITH_TRANSFORMED_WINDOWS) {
            self.paint_generic(input, mask, background, passes, effects, ctx, &mut outcome);
            Region::from_rect(self.screen)
        } else {
            let pass = passes.into_iter().next().unwrap_or_default();
            let mut region = paint;
            region.intersect_rect(self.screen);
            self.paint_simple(input, mask, region, background, &pass, effects, ctx, &mut outcome)
        };

        let identity = ScreenPaintData::default();
        effects.paint_screen_done(&mut ScenePainter { backend: &mut self.backend, screen: &identity });

        match self.backend.present(&painted) {
            Ok(swap) => outcome.swap = swap,
            Err(e) => {
                error!(backend = %self.backend.kind(), "presenting the frame failed: {}", e);
                outcome.present_error = Some(e);
            }
        }
        outcome.painted = painted;
        for (handle, window) in &mut self.windows {
            let captured = window.take_captured();
            if !captured.is_empty() {
                outcome.captured.push((*handle, captured));
            }
        }
        trace!(
            painted = outcome.painted_windows.len(),
            skipped = outcome.skipped.len(),
            "frame painted"
        );
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    fn paint_simple(
        &mut self,
        input: &PaintInput<'_>,
        mask: PaintMask,
        mut region: Region,
        background: Color,
        pass: &ScreenPass,
        effects: &mut EffectChain,
        ctx: &mut EffectContext<'_>,
        outcome: &mut FrameOutcome,
    ) -> Region {
        let desktop = pass.desktop.unwrap_or(ctx.desktops.current);
        let mut entries = Vec::new();
        for (index, &handle) in input.stacking.iter().enumerate().rev() {
            if let Some(data) = self.pre_paint_window(input, handle, index, mask, &region, desktop, effects, ctx) {
                region.union_with(&data.paint);
                entries.push(PaintEntry { handle, index, data });
            }
        }
        region.intersect_rect(self.screen);

        let background_first = mask.contains(PaintMask::SCREEN_BACKGROUND_FIRST);
        if background_first {
            self.backend.paint_background(&region, background);
        }

        let mut remaining = region.clone();
        let mut translucent = Vec::new();
        for entry in &entries {
            if entry.data.mask.contains(PaintMask::WINDOW_TRANSLUCENT) {
                translucent.push((entry, remaining.clone()));
            }
            if entry.data.mask.contains(PaintMask::WINDOW_OPAQUE) {
                let window_mask = entry.data.mask - PaintMask::WINDOW_TRANSLUCENT;
                self.paint_window(input, entry.handle, entry.index, window_mask, &remaining, pass, effects, ctx, outcome);
                remaining.subtract(&entry.data.clip);
            }
        }

        if !background_first {
            self.backend.paint_background(&remaining, background);
        }

        for (entry, window_region) in translucent.iter().rev() {
            let window_mask = entry.data.mask - PaintMask::WINDOW_OPAQUE;
            self.paint_window(input, entry.handle, entry.index, window_mask, window_region, pass, effects, ctx, outcome);
        }
        region
    }

    #[allow(clippy::too_many_arguments)]
    fn paint_generic(
        &mut self,
        input: &PaintInput<'_>,
        mask: PaintMask,
        background: Color,
        passes: Vec<ScreenPass>,
        effects: &mut EffectChain,
        ctx: &mut EffectContext<'_>,
        outcome: &mut FrameOutcome,
    ) {
        let everything = Region::infinite();
        self.backend.paint_background(&everything, background);
        let passes = if passes.is_empty() { vec![ScreenPass::default()] } else { passes };
        for pass in &passes {
            let desktop = pass.desktop.unwrap_or(ctx.desktops.current);
            for (index, &handle) in input.stacking.iter().enumerate() {
                let Some(data) = self.pre_paint_window(input, handle, index, mask, &everything, desktop, effects, ctx)
                else {
                    continue;
                };
                self.paint_window(input, handle, index, data.mask, &everything, pass, effects, ctx, outcome);
            }
        }
    }

    /// Builds the pre-paint record and runs the effects over it. `None` when
    /// the window is not painted this frame.
    #[allow(clippy::too_many_arguments)]
    fn pre_paint_window(
        &mut self,
        input: &PaintInput<'_>,
        handle: SurfaceHandle,
        index: usize,
        screen_mask: PaintMask,
        region: &Region,
        desktop: u32,
        effects: &mut EffectChain,
        ctx: &mut EffectContext<'_>,
    ) -> Option<WindowPrePaintData> {
        let toplevel = input.surfaces.get(handle)?;
        if !toplevel.ready_for_painting() && !toplevel.is_deleted() {
            return None;
        }
        let mut disabled = PaintingDisabled::empty();
        if toplevel.is_deleted() {
            disabled |= PaintingDisabled::BY_DELETE;
        }
        if !toplevel.is_on_desktop(desktop) {
            disabled |= PaintingDisabled::BY_DESKTOP;
        }
        if toplevel.is_minimized() {
            disabled |= PaintingDisabled::BY_MINIMIZE;
        }
        let mut data = WindowPrePaintData::new(toplevel, region, disabled);
        data.mask |= screen_mask - (PaintMask::WINDOW_OPAQUE | PaintMask::WINDOW_TRANSLUCENT);
        let window = EffectWindow::new(handle, toplevel, index, ctx.active_window == Some(handle));
        effects.pre_paint_window(&window, &mut data, ctx);

        if let Some(scene_window) = self.windows.get_mut(&handle) {
            if let Some(grid) = data.grid {
                scene_window.request_vertex_grid(grid);
            }
            if data.is_painting_enabled() {
                scene_window.set_extent(data.extent);
            }
        }
        if !data.is_painting_enabled() {
            trace!(surface = ?handle, disabled = ?data.disabled, "window not painted");
            return None;
        }
        if data.mask.contains(PaintMask::WINDOW_TRANSLUCENT) {
            data.clip.clear();
        }
        Some(data)
    }

    #[allow(clippy::too_many_arguments)]
    fn paint_window(
        &mut self,
        input: &PaintInput<'_>,
        handle: SurfaceHandle,
        index: usize,
        mask: PaintMask,
        region: &Region,
        pass: &ScreenPass,
        effects: &mut EffectChain,
        ctx: &mut EffectContext<'_>,
        outcome: &mut FrameOutcome,
    ) {
        let Some(toplevel) = input.surfaces.get(handle) else {
            return;
        };
        let window = EffectWindow::new(handle, toplevel, index, ctx.active_window == Some(handle));
        let mut data = WindowPaintData::new(toplevel.opacity() * pass.opacity);
        effects.paint_window(
            &window,
            mask,
            region,
            &mut data,
            &mut ScenePainter { backend: &mut self.backend, screen: &pass.data },
        );

        let Some(scene_window) = self.windows.get_mut(&handle) else {
            return;
        };
        match self.backend.perform_paint(scene_window, toplevel, mask, region, &data, &pass.data, input.grab) {
            Ok(true) => outcome.painted_windows.push(handle),
            Ok(false) => {}
            Err(reason) => {
                match &reason {
                    SkipReason::StalePixmap { .. } => {
                        debug!(surface = ?handle, "{}, retrying next frame", reason);
                        outcome.deferred.push(handle);
                    }
                    SkipReason::Capture(_) | SkipReason::Resource(_) => {
                        warn!(surface = ?handle, "window not painted: {}", reason)
                    }
                    _ => debug!(surface = ?handle, "window not painted: {}", reason),
                }
                outcome.skipped.push((handle, reason));
            }
        }
    }

    /// Lets effects give back the images they uploaded.
    pub fn release_effect_images(&mut self, effects: &mut EffectChain) {
        let identity = ScreenPaintData::default();
        effects.release_images(&mut ScenePainter { backend: &mut self.backend, screen: &identity });
    }

    /// Releases every window resource and then the backend itself.
    pub fn teardown(mut self) {
        let display = self.backend.display();
        for window in self.windows.values_mut() {
            window.release_resources(display.as_ref());
        }
        self.windows.clear();
        self.backend.teardown();
        debug!("scene torn down");
    }
}
