//! The contract between the compositing engine and the display server.
//!
//! Everything the engine needs from the outside world goes through
//! [`DisplayConnection`]: capability queries, the server grab, window
//! redirection, pixmap capture, GPU and 2D drawing, and input grabs.
//! Implementations are single-threaded handles; all methods take `&self`
//! and use interior mutability where they keep state.
//!
//! Drawing calls do not return errors. Like the protocol they model, a bad
//! draw is reported asynchronously at worst and the frame goes on.

pub mod grab;
pub mod headless;

use glam::Mat4;
use novade_compositor_core::{Rectangle, Region, Size, WindowId};
use thiserror::Error;

use crate::scene::quads::WindowQuad;

pub use grab::{InputGrab, ServerGrab, ServerGrabGuard};
pub use headless::HeadlessDisplay;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DisplayError {
    #[error("bad drawable: window {0} no longer exists")]
    BadDrawable(WindowId),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("resource allocation failed: {0}")]
    Allocation(String),

    #[error("rendering context lost")]
    ContextLost,

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

/// Optional protocol extensions the engine probes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    Composite,
    Damage,
    Fixes,
    Render,
    Shape,
    Sync,
    RandR,
}

impl Extension {
    pub const ALL: [Extension; 7] = [
        Extension::Composite,
        Extension::Damage,
        Extension::Fixes,
        Extension::Render,
        Extension::Shape,
        Extension::Sync,
        Extension::RandR,
    ];

    /// The extension's protocol name.
    pub fn name(&self) -> &'static str {
        match self {
            Extension::Composite => "Composite",
            Extension::Damage => "DAMAGE",
            Extension::Fixes => "XFIXES",
            Extension::Render => "RENDER",
            Extension::Shape => "SHAPE",
            Extension::Sync => "SYNC",
            Extension::RandR => "RANDR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionInfo {
    pub major: u32,
    pub minor: u32,
    pub event_base: u8,
}

impl ExtensionInfo {
    pub const fn new(major: u32, minor: u32, event_base: u8) -> Self {
        Self { major, minor, event_base }
    }

    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

/// A monitor as reported by the display.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub name: String,
    pub geometry: Rectangle,
    /// Refresh rate in Hz, when the display knows it.
    pub refresh_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixmapId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PictureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputWindowId(pub u32);

/// Result of naming a redirected window's backing pixmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixmapInfo {
    pub pixmap: PixmapId,
    /// Actual pixel size of the pixmap, which may lag behind the window's
    /// logical size while a resize is in flight.
    pub size: Size,
    pub viewable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlContextInfo {
    pub renderer: String,
    pub direct: bool,
}

/// Straight (non-premultiplied) RGBA color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color { r: 0.0, g: 0.0, b: 0.0, a: 1.0 };

    pub fn from_rgb8(rgb: [u8; 3]) -> Self {
        Self {
            r: f32::from(rgb[0]) / 255.0,
            g: f32::from(rgb[1]) / 255.0,
            b: f32::from(rgb[2]) / 255.0,
            a: 1.0,
        }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a: a.clamp(0.0, 1.0), ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwapResult {
    /// The swap waited for the vertical retrace before returning.
    pub blocked_on_vsync: bool,
}

/// One GPU draw: a list of quads sampling one texture.
///
/// Quad positions are local to whatever `model` maps from (usually the
/// window's top-left corner); texture coordinates are in texels.
#[derive(Debug, Clone)]
pub struct TexturedDraw<'a> {
    pub texture: TextureId,
    pub texture_size: Size,
    pub quads: &'a [WindowQuad],
    pub model: Mat4,
    pub projection: Mat4,
    pub opacity: f32,
    pub brightness: f32,
    pub saturation: f32,
    pub blend: bool,
    /// Scissor rectangles in screen coordinates; `None` draws unclipped.
    pub clip: Option<&'a [Rectangle]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOp {
    /// Replace the destination; only valid for fully opaque sources.
    Src,
    Over,
}

/// One 2D composition from `source` (through an optional alpha `mask`)
/// into `dest`. A `dst_rect` larger or smaller than `src_rect` scales.
#[derive(Debug, Clone)]
pub struct CompositeCall<'a> {
    pub op: CompositeOp,
    pub source: PictureId,
    pub mask: Option<PictureId>,
    pub dest: PictureId,
    pub src_rect: Rectangle,
    pub dst_rect: Rectangle,
    pub clip: Option<&'a [Rectangle]>,
}

/// Connection to the display server as seen by the compositing engine.
pub trait DisplayConnection {
    fn query_extension(&self, extension: Extension) -> Option<ExtensionInfo>;
    fn gl_context_available(&self) -> bool;
    fn outputs(&self) -> Vec<Output>;
    fn screen_size(&self) -> Size;

    /// Raw server grab. Callers pair grabs through [`ServerGrab`].
    fn grab_server(&self);
    fn ungrab_server(&self);

    fn redirect_subwindows(&self) -> Result<(), DisplayError>;
    fn unredirect_subwindows(&self);
    fn create_damage(&self, window: WindowId) -> Result<(), DisplayError>;
    fn destroy_damage(&self, window: WindowId);

    fn name_window_pixmap(&self, window: WindowId) -> Result<PixmapInfo, DisplayError>;
    fn free_pixmap(&self, pixmap: PixmapId);

    fn create_gl_context(&self) -> Result<GlContextInfo, DisplayError>;
    fn destroy_gl_context(&self);
    /// Binds a pixmap to a new texture, capturing its whole content.
    fn bind_texture(&self, pixmap: PixmapId) -> Result<TextureId, DisplayError>;
    /// Refreshes the damaged part of a texture bound from a pixmap.
    fn update_texture(&self, texture: TextureId, damage: &Region) -> Result<(), DisplayError>;
    /// Creates a texture from client-side RGBA pixels.
    fn upload_texture(&self, size: Size, rgba: &[u8]) -> Result<TextureId, DisplayError>;
    fn release_texture(&self, texture: TextureId);
    fn draw_textured_quads(&self, draw: &TexturedDraw<'_>);
    fn fill_solid(&self, color: Color, rects: &[Rectangle]);
    fn swap_buffers(&self, damage: &Region) -> Result<SwapResult, DisplayError>;

    fn create_picture(&self, pixmap: PixmapId, has_alpha: bool) -> Result<PictureId, DisplayError>;
    /// An off-screen picture of `size` to compose frames into.
    fn create_buffer_picture(&self, size: Size) -> Result<PictureId, DisplayError>;
    /// A 1x1 repeating picture of `color`, used as an alpha mask.
    fn create_solid_picture(&self, color: Color) -> Result<PictureId, DisplayError>;
    fn upload_picture(&self, size: Size, rgba: &[u8]) -> Result<PictureId, DisplayError>;
    fn free_picture(&self, picture: PictureId);
    fn composite(&self, call: &CompositeCall<'_>);
    fn fill_rectangles(&self, picture: PictureId, color: Color, rects: &[Rectangle]);
    fn copy_to_screen(&self, buffer: PictureId, clip: &Region);

    fn grab_keyboard(&self) -> bool;
    fn ungrab_keyboard(&self);
    fn create_input_window(&self, rect: Rectangle) -> Result<InputWindowId, DisplayError>;
    fn destroy_input_window(&self, window: InputWindowId);
}

/// Clip rectangles for a draw call: `None` for the infinite region.
pub(crate) fn clip_rects(region: &Region) -> Option<&[Rectangle]> {
    if region.is_infinite() {
        None
    } else {
        Some(region.rects())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_version_comparison() {
        let composite = ExtensionInfo::new(0, 4, 0);
        assert!(composite.at_least(0, 2));
        assert!(composite.at_least(0, 4));
        assert!(!composite.at_least(1, 0));
    }

    #[test]
    fn color_from_rgb8_is_opaque() {
        let color = Color::from_rgb8([255, 0, 51]);
        assert_eq!(color.r, 1.0);
        assert_eq!(color.a, 1.0);
        assert!((color.b - 0.2).abs() < 1e-6);
        assert_eq!(color.with_alpha(2.0).a, 1.0);
    }

    #[test]
    fn infinite_region_draws_unclipped() {
        assert!(clip_rects(&Region::infinite()).is_none());
        let region = Region::from_rect(Rectangle::new(0, 0, 4, 4));
        assert_eq!(clip_rects(&region), Some(&[Rectangle::new(0, 0, 4, 4)][..]));
    }
}
