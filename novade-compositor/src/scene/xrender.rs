//! 2D backend: window pixmaps wrapped in pictures and composited into an
//! off-screen buffer that is copied to the screen on present.
//!
//! Only scaling and translation are supported; rotations are ignored.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use glam::Vec3;
use novade_compositor_core::{Point, Rectangle, Region, Size, Toplevel};
use tracing::{debug, info, trace, warn};

use super::quads::WindowQuad;
use super::window::{AlphaMask, SceneWindow, WindowResource};
use super::{ScreenPaintData, SkipReason, WindowPaintData};
use crate::display::{
    clip_rects, Color, CompositeCall, CompositeOp, DisplayConnection, PictureId, PixmapId, ServerGrab,
    SwapResult,
};
use crate::effects::{ImageDraw, ImageHandle};
use crate::error::UnavailableReason;

pub struct RenderBackend {
    display: Rc<dyn DisplayConnection>,
    screen: Size,
    buffer: Option<PictureId>,
    images: HashSet<PictureId>,
    /// 1x1 alpha pictures for effect images, keyed by opacity in 1/255 steps.
    alpha_cache: HashMap<u8, PictureId>,
}

impl RenderBackend {
    pub fn new(display: Rc<dyn DisplayConnection>, screen: Size) -> Result<Self, UnavailableReason> {
        let buffer = display
            .create_buffer_picture(screen)
            .map_err(|e| UnavailableReason::BackendInit(e.to_string()))?;
        info!(width = screen.width, height = screen.height, "XRender backend initialized");
        Ok(Self { display, screen, buffer: Some(buffer), images: HashSet::new(), alpha_cache: HashMap::new() })
    }

    pub(crate) fn display(&self) -> Rc<dyn DisplayConnection> {
        self.display.clone()
    }

    pub fn buffer(&self) -> Option<PictureId> {
        self.buffer
    }

    pub(crate) fn paint_background(&mut self, region: &Region, color: Color) {
        let Some(buffer) = self.buffer else {
            return;
        };
        let screen = [Rectangle::from_size(self.screen)];
        let rects = clip_rects(region).unwrap_or(&screen);
        if !rects.is_empty() {
            self.display.fill_rectangles(buffer, color, rects);
        }
    }

    /// Pictures track the live pixmap, so damage needs no upload; it only
    /// counts as captured.
    fn bind(
        &mut self,
        window: &mut SceneWindow,
        toplevel: &Toplevel,
        grab: &ServerGrab,
    ) -> Result<(PictureId, Size), SkipReason> {
        if let WindowResource::Picture { picture, size, .. } = window.resource {
            let damage = toplevel.damage().damage();
            if !damage.is_empty() {
                window.note_captured(damage);
            }
            return Ok((picture, size));
        }
        let info = window.ensure_pixmap(toplevel, self.display.as_ref(), grab)?;
        let picture = self
            .display
            .create_picture(info.pixmap, toplevel.has_alpha())
            .map_err(SkipReason::Resource)?;
        trace!(surface = ?window.handle(), ?picture, "picture created");
        window.resource = WindowResource::Picture { picture, size: info.size, alpha: None };
        window.note_captured(&Region::from_rect(Rectangle::from_size(info.size)));
        Ok((picture, info.size))
    }

    /// The window's alpha picture for `opacity`, recreated when the opacity
    /// moved since it was made.
    fn window_alpha(&mut self, window: &mut SceneWindow, opacity: f64) -> Result<PictureId, SkipReason> {
        let WindowResource::Picture { alpha, .. } = &mut window.resource else {
            return Err(SkipReason::NoContent);
        };
        if let Some(mask) = alpha {
            if (mask.opacity - opacity).abs() < f64::EPSILON {
                return Ok(mask.picture);
            }
            self.display.free_picture(mask.picture);
            *alpha = None;
        }
        let picture = self
            .display
            .create_solid_picture(Color { r: 0.0, g: 0.0, b: 0.0, a: opacity as f32 })
            .map_err(SkipReason::Resource)?;
        *alpha = Some(AlphaMask { opacity, picture });
        Ok(picture)
    }

    pub(crate) fn invalidate_alpha(&mut self, window: &mut SceneWindow) {
        if let WindowResource::Picture { alpha, .. } = &mut window.resource {
            if let Some(mask) = alpha.take() {
                self.display.free_picture(mask.picture);
            }
        }
    }

    pub(crate) fn perform_paint(
        &mut self,
        window: &mut SceneWindow,
        toplevel: &Toplevel,
        region: &Region,
        data: &WindowPaintData,
        screen: &ScreenPaintData,
        grab: &ServerGrab,
    ) -> Result<bool, SkipReason> {
        let Some(buffer) = self.buffer else {
            return Ok(false);
        };
        if region.is_empty() {
            return Ok(false);
        }
        let transform = Transform2d::new(toplevel.pos(), data, screen);
        let shape = transform.apply_region(&toplevel.shape_region());
        let clip = if region.is_infinite() { shape } else { region.intersected(&shape) };
        if clip.is_empty() {
            return Ok(false);
        }

        let (picture, _) = self.bind(window, toplevel, grab)?;
        let opaque = toplevel.is_opaque() && data.opacity >= 1.0;
        let mask = if data.opacity < 1.0 { Some(self.window_alpha(window, data.opacity)?) } else { None };
        let op = if opaque { CompositeOp::Src } else { CompositeOp::Over };
        for quad in window.quads(toplevel).iter() {
            self.display.composite(&CompositeCall {
                op,
                source: picture,
                mask,
                dest: buffer,
                src_rect: texture_rect(quad),
                dst_rect: transform.apply_rect(quad.bounding_rect()),
                clip: Some(clip.rects()),
            });
        }
        Ok(true)
    }

    /// Copies the painted part of the buffer to the screen. Never blocks.
    pub(crate) fn present(&mut self, region: &Region) -> SwapResult {
        if let Some(buffer) = self.buffer {
            let damage = region.intersected(&Region::from_rect(Rectangle::from_size(self.screen)));
            if !damage.is_empty() {
                self.display.copy_to_screen(buffer, &damage);
            }
        }
        SwapResult { blocked_on_vsync: false }
    }

    pub(crate) fn upload_image(&mut self, size: Size, rgba: &[u8]) -> Option<ImageHandle> {
        match self.display.upload_picture(size, rgba) {
            Ok(picture) => {
                self.images.insert(picture);
                Some(ImageHandle::Picture(picture, size))
            }
            Err(e) => {
                warn!("failed to upload effect image: {}", e);
                None
            }
        }
    }

    pub(crate) fn image_from_pixmap(&mut self, pixmap: PixmapId, size: Size) -> Option<ImageHandle> {
        match self.display.create_picture(pixmap, true) {
            Ok(picture) => {
                self.images.insert(picture);
                Some(ImageHandle::Picture(picture, size))
            }
            Err(e) => {
                warn!(?pixmap, "failed to wrap effect pixmap: {}", e);
                None
            }
        }
    }

    pub(crate) fn release_image(&mut self, image: ImageHandle) {
        if let ImageHandle::Picture(picture, _) = image {
            if self.images.remove(&picture) {
                self.display.free_picture(picture);
            }
        }
    }

    fn cached_alpha(&mut self, opacity: f64) -> Option<PictureId> {
        let key = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        if key == u8::MAX {
            return None;
        }
        if let Some(picture) = self.alpha_cache.get(&key) {
            return Some(*picture);
        }
        match self.display.create_solid_picture(Color { r: 0.0, g: 0.0, b: 0.0, a: f32::from(key) / 255.0 }) {
            Ok(picture) => {
                self.alpha_cache.insert(key, picture);
                Some(picture)
            }
            Err(e) => {
                warn!("failed to create alpha picture: {}", e);
                None
            }
        }
    }

    pub(crate) fn draw_image(&mut self, draw: &ImageDraw<'_>, screen: &ScreenPaintData) {
        let ImageHandle::Picture(picture, _) = draw.image else {
            debug!("texture image handed to the XRender backend, ignoring");
            return;
        };
        let Some(buffer) = self.buffer else {
            return;
        };
        if draw.quads.is_empty() || draw.region.is_empty() || draw.opacity <= 0.0 {
            return;
        }
        let mask = self.cached_alpha(draw.opacity);
        let transform = Transform2d::new(draw.pos, draw.data, screen);
        for quad in draw.quads {
            self.display.composite(&CompositeCall {
                op: CompositeOp::Over,
                source: picture,
                mask,
                dest: buffer,
                src_rect: texture_rect(quad),
                dst_rect: transform.apply_rect(quad.bounding_rect()),
                clip: clip_rects(draw.region),
            });
        }
    }

    pub(crate) fn teardown(&mut self) {
        for (_, picture) in self.alpha_cache.drain() {
            self.display.free_picture(picture);
        }
        for picture in self.images.drain() {
            self.display.free_picture(picture);
        }
        if let Some(buffer) = self.buffer.take() {
            self.display.free_picture(buffer);
            debug!("XRender backend torn down");
        }
    }
}

impl Drop for RenderBackend {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for RenderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderBackend")
            .field("screen", &self.screen)
            .field("buffer", &self.buffer)
            .field("images", &self.images.len())
            .field("alpha_cache", &self.alpha_cache.len())
            .finish()
    }
}

/// The part of the window's texture a quad samples from.
fn texture_rect(quad: &WindowQuad) -> Rectangle {
    let v = quad.vertices();
    let (left, top) = (v[0].tx.min(v[3].tx), v[0].ty.min(v[1].ty));
    let (right, bottom) = (v[1].tx.max(v[2].tx), v[2].ty.max(v[3].ty));
    Rectangle::from_edges(left.floor() as i32, top.floor() as i32, right.ceil() as i32, bottom.ceil() as i32)
}

/// Window and screen transforms reduced to scale plus offset.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Transform2d {
    scale_x: f64,
    scale_y: f64,
    offset_x: f64,
    offset_y: f64,
}

impl Transform2d {
    fn new(pos: Point, data: &WindowPaintData, screen: &ScreenPaintData) -> Self {
        let origin = Vec3::new(pos.x as f32, pos.y as f32, 0.0) + data.translate;
        let offset = screen.translate + screen.scale * origin;
        let scale = screen.scale * data.scale;
        Self {
            scale_x: f64::from(scale.x),
            scale_y: f64::from(scale.y),
            offset_x: f64::from(offset.x),
            offset_y: f64::from(offset.y),
        }
    }

    fn apply_rect(&self, rect: Rectangle) -> Rectangle {
        let left = (rect.left() as f64 * self.scale_x + self.offset_x).floor() as i32;
        let top = (rect.top() as f64 * self.scale_y + self.offset_y).floor() as i32;
        let right = (rect.right() as f64 * self.scale_x + self.offset_x).ceil() as i32;
        let bottom = (rect.bottom() as f64 * self.scale_y + self.offset_y).ceil() as i32;
        Rectangle::from_edges(left, top, right, bottom)
    }

    fn apply_region(&self, region: &Region) -> Region {
        Region::from_rects(region.rects().iter().map(|r| self.apply_rect(*r)))
    }
}
