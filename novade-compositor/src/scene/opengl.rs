//! OpenGL backend: window pixmaps bound as textures, drawn as textured
//! quads through an orthographic or perspective projection.

use std::collections::HashSet;
use std::rc::Rc;

use glam::{Mat4, Vec3};
use novade_compositor_core::{Rectangle, Region, Size, Toplevel};
use tracing::{debug, info, trace, warn};

use super::window::{SceneWindow, WindowResource};
use super::{ScreenPaintData, SkipReason, WindowPaintData};
use crate::display::{
    clip_rects, Color, DisplayConnection, DisplayError, GlContextInfo, PixmapId, ServerGrab, SwapResult, TextureId,
    TexturedDraw,
};
use crate::effects::{ImageDraw, ImageHandle};
use crate::error::UnavailableReason;

const FIELD_OF_VIEW_DEGREES: f32 = 60.0;
const DEPTH_RANGE: f32 = 1000.0;

pub struct GlBackend {
    display: Rc<dyn DisplayConnection>,
    screen: Size,
    context: GlContextInfo,
    orthographic: Mat4,
    perspective: Mat4,
    images: HashSet<TextureId>,
    context_alive: bool,
}

impl GlBackend {
    pub fn new(display: Rc<dyn DisplayConnection>, screen: Size) -> Result<Self, UnavailableReason> {
        if !display.gl_context_available() {
            return Err(UnavailableReason::NoGpuContext);
        }
        if screen.is_empty() {
            return Err(UnavailableReason::BackendInit(format!(
                "invalid screen size {}x{}",
                screen.width, screen.height
            )));
        }
        let context = display
            .create_gl_context()
            .map_err(|e| UnavailableReason::BackendInit(e.to_string()))?;
        info!(renderer = %context.renderer, direct = context.direct, "OpenGL backend initialized");
        if !context.direct {
            warn!("OpenGL context is indirect, expect slow painting");
        }
        Ok(Self {
            orthographic: orthographic(screen),
            perspective: perspective(screen),
            display,
            screen,
            context,
            images: HashSet::new(),
            context_alive: true,
        })
    }

    pub(crate) fn display(&self) -> Rc<dyn DisplayConnection> {
        self.display.clone()
    }

    pub fn context(&self) -> &GlContextInfo {
        &self.context
    }

    fn projection(&self, screen: &ScreenPaintData, data: &WindowPaintData) -> Mat4 {
        let needs_depth = screen.has_rotation()
            || data.rotation.is_some()
            || screen.translate.z != 0.0
            || data.translate.z != 0.0;
        if needs_depth {
            self.perspective
        } else {
            self.orthographic
        }
    }

    pub(crate) fn paint_background(&mut self, region: &Region, color: Color) {
        let screen = [Rectangle::from_size(self.screen)];
        let rects = clip_rects(region).unwrap_or(&screen);
        if !rects.is_empty() {
            self.display.fill_solid(color, rects);
        }
    }

    /// Makes sure the window has an up-to-date texture. An existing texture
    /// only gets the pending damage re-uploaded.
    fn bind(
        &mut self,
        window: &mut SceneWindow,
        toplevel: &Toplevel,
        grab: &ServerGrab,
    ) -> Result<(TextureId, Size), SkipReason> {
        if let WindowResource::Texture { texture, size } = window.resource {
            let damage = toplevel.damage().damage();
            if !damage.is_empty() {
                self.display.update_texture(texture, damage).map_err(SkipReason::Capture)?;
                window.note_captured(damage);
            }
            return Ok((texture, size));
        }
        let info = window.ensure_pixmap(toplevel, self.display.as_ref(), grab)?;
        let texture = self.display.bind_texture(info.pixmap).map_err(SkipReason::Resource)?;
        trace!(surface = ?window.handle(), ?texture, "texture bound");
        window.resource = WindowResource::Texture { texture, size: info.size };
        window.note_captured(&Region::from_rect(Rectangle::from_size(info.size)));
        Ok((texture, info.size))
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
        if region.is_empty() {
            return Ok(false);
        }
        let (texture, texture_size) = self.bind(window, toplevel, grab)?;
        let quads = window.quads(toplevel);
        if quads.is_empty() {
            return Ok(false);
        }
        self.display.draw_textured_quads(&TexturedDraw {
            texture,
            texture_size,
            quads: quads.as_slice(),
            model: screen.matrix() * data.matrix(toplevel.pos()),
            projection: self.projection(screen, data),
            opacity: data.opacity as f32,
            brightness: data.brightness as f32,
            saturation: data.saturation as f32,
            blend: !toplevel.is_opaque() || data.opacity < 1.0,
            clip: clip_rects(region),
        });
        Ok(true)
    }

    pub(crate) fn present(&mut self, region: &Region) -> Result<SwapResult, DisplayError> {
        let damage = region.intersected(&Region::from_rect(Rectangle::from_size(self.screen)));
        self.display.swap_buffers(&damage)
    }

    pub(crate) fn upload_image(&mut self, size: Size, rgba: &[u8]) -> Option<ImageHandle> {
        match self.display.upload_texture(size, rgba) {
            Ok(texture) => {
                self.images.insert(texture);
                Some(ImageHandle::Texture(texture, size))
            }
            Err(e) => {
                warn!("failed to upload effect image: {}", e);
                None
            }
        }
    }

    pub(crate) fn image_from_pixmap(&mut self, pixmap: PixmapId, size: Size) -> Option<ImageHandle> {
        match self.display.bind_texture(pixmap) {
            Ok(texture) => {
                self.images.insert(texture);
                Some(ImageHandle::Texture(texture, size))
            }
            Err(e) => {
                warn!(?pixmap, "failed to bind effect pixmap: {}", e);
                None
            }
        }
    }

    pub(crate) fn release_image(&mut self, image: ImageHandle) {
        if let ImageHandle::Texture(texture, _) = image {
            if self.images.remove(&texture) {
                self.display.release_texture(texture);
            }
        }
    }

    pub(crate) fn draw_image(&mut self, draw: &ImageDraw<'_>, screen: &ScreenPaintData) {
        let ImageHandle::Texture(texture, texture_size) = draw.image else {
            debug!("picture image handed to the OpenGL backend, ignoring");
            return;
        };
        if draw.quads.is_empty() || draw.region.is_empty() {
            return;
        }
        self.display.draw_textured_quads(&TexturedDraw {
            texture,
            texture_size,
            quads: draw.quads,
            model: screen.matrix() * draw.data.matrix(draw.pos),
            projection: self.projection(screen, draw.data),
            opacity: draw.opacity as f32,
            brightness: 1.0,
            saturation: 1.0,
            blend: true,
            clip: clip_rects(draw.region),
        });
    }

    pub(crate) fn teardown(&mut self) {
        if !self.context_alive {
            return;
        }
        for texture in self.images.drain() {
            self.display.release_texture(texture);
        }
        self.display.destroy_gl_context();
        self.context_alive = false;
        debug!("OpenGL backend torn down");
    }
}

impl Drop for GlBackend {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for GlBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlBackend")
            .field("screen", &self.screen)
            .field("renderer", &self.context.renderer)
            .field("images", &self.images.len())
            .finish()
    }
}

/// Screen pixels to clip space, y pointing down.
fn orthographic(screen: Size) -> Mat4 {
    Mat4::orthographic_rh_gl(0.0, screen.width as f32, screen.height as f32, 0.0, -DEPTH_RANGE, DEPTH_RANGE)
}

/// A camera placed so that the plane z = 0 maps exactly onto the screen.
/// Larger z is further away.
fn perspective(screen: Size) -> Mat4 {
    let (w, h) = (screen.width as f32, screen.height as f32);
    let fov = FIELD_OF_VIEW_DEGREES.to_radians();
    let distance = (h / 2.0) / (fov / 2.0).tan();
    let projection = Mat4::perspective_rh_gl(fov, w / h, 1.0, distance + DEPTH_RANGE * 10.0);
    let view = Mat4::look_at_rh(
        Vec3::new(w / 2.0, h / 2.0, -distance),
        Vec3::new(w / 2.0, h / 2.0, 0.0),
        Vec3::new(0.0, -1.0, 0.0),
    );
    projection * view
}
