//! An in-process display that draws nothing and remembers everything.
//!
//! [`HeadlessDisplay`] keeps a log of every operation the engine issues
//! ([`DisplayOp`]) together with the resources that are alive, so tests and
//! the demo binary can run whole frames without a display server. Windows
//! are registered with [`HeadlessDisplay::map_window`]; capabilities and
//! failures are configured with the `set_*` methods.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use glam::Vec3;
use novade_compositor_core::{Rectangle, Region, Size, WindowId};
use tracing::trace;

use super::{
    Color, CompositeCall, CompositeOp, DisplayConnection, DisplayError, Extension, ExtensionInfo,
    GlContextInfo, InputWindowId, Output, PictureId, PixmapId, PixmapInfo, SwapResult, TextureId,
    TexturedDraw,
};

/// One GPU draw as the headless display saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub texture: TextureId,
    pub texture_size: Size,
    /// Screen-space bounding box of every quad after the model transform.
    pub quads: Vec<Rectangle>,
    pub clip: Option<Vec<Rectangle>>,
    pub opacity: f32,
    pub blend: bool,
}

impl DrawRecord {
    fn clip_region(&self) -> Region {
        match &self.clip {
            Some(rects) => Region::from_rects(rects.iter().copied()),
            None => Region::infinite(),
        }
    }

    /// Pixels touched by the draw.
    pub fn drawn_region(&self) -> Region {
        let covered = Region::from_rects(self.quads.iter().copied());
        covered.intersected(&self.clip_region())
    }

    /// Pixels written, counting pixels covered by two quads twice.
    pub fn drawn_area(&self) -> i64 {
        let clip = self.clip_region();
        self.quads.iter().map(|q| Region::from_rect(*q).intersected(&clip).area()).sum()
    }
}

/// One 2D composition as the headless display saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeRecord {
    pub op: CompositeOp,
    pub source: PictureId,
    pub mask: Option<PictureId>,
    pub dest: PictureId,
    pub src_rect: Rectangle,
    pub dst_rect: Rectangle,
    pub clip: Option<Vec<Rectangle>>,
}

impl CompositeRecord {
    pub fn drawn_region(&self) -> Region {
        let dst = Region::from_rect(self.dst_rect);
        match &self.clip {
            Some(rects) => dst.intersected(&Region::from_rects(rects.iter().copied())),
            None => dst,
        }
    }

    pub fn drawn_area(&self) -> i64 {
        self.drawn_region().area()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayOp {
    GrabServer,
    UngrabServer,
    RedirectSubwindows,
    UnredirectSubwindows,
    CreateDamage(WindowId),
    DestroyDamage(WindowId),
    NameWindowPixmap { window: WindowId, pixmap: PixmapId, size: Size },
    FreePixmap(PixmapId),
    CreateGlContext,
    DestroyGlContext,
    BindTexture { pixmap: PixmapId, texture: TextureId, size: Size },
    UpdateTexture { texture: TextureId, damage: Region },
    UploadTexture { texture: TextureId, size: Size },
    ReleaseTexture(TextureId),
    Draw(DrawRecord),
    FillSolid { color: Color, rects: Vec<Rectangle> },
    SwapBuffers { damage: Region },
    CreatePicture { picture: PictureId, size: Size },
    FreePicture(PictureId),
    Composite(CompositeRecord),
    FillRectangles { picture: PictureId, color: Color, rects: Vec<Rectangle> },
    CopyToScreen { buffer: PictureId, clip: Region },
    GrabKeyboard,
    UngrabKeyboard,
    CreateInputWindow(InputWindowId),
    DestroyInputWindow(InputWindowId),
}

#[derive(Debug, Clone, Copy)]
struct HeadlessWindow {
    size: Size,
    /// Size the next captured pixmap will have, when it lags behind `size`.
    pixmap_size: Option<Size>,
    viewable: bool,
}

#[derive(Debug)]
struct HeadlessState {
    screen: Size,
    extensions: HashMap<Extension, ExtensionInfo>,
    gl_available: bool,
    gl_context_fails: bool,
    refresh_rate: Option<f64>,
    vsync_blocking: bool,
    keyboard_grab_fails: bool,

    ops: Vec<DisplayOp>,
    next_id: u32,
    windows: HashMap<WindowId, HeadlessWindow>,
    pixmaps: HashMap<PixmapId, Size>,
    textures: HashMap<TextureId, Size>,
    pictures: HashMap<PictureId, Size>,
    damage_objects: HashSet<WindowId>,
    input_windows: HashSet<InputWindowId>,
    server_grabs: i64,
    keyboard_grabbed: bool,
    gl_context: bool,
    redirected: bool,
}

impl HeadlessState {
    fn alloc(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, op: DisplayOp) {
        trace!(?op, "headless op");
        self.ops.push(op);
    }
}

pub struct HeadlessDisplay {
    state: RefCell<HeadlessState>,
}

impl HeadlessDisplay {
    /// A display of `screen` size offering every extension, GL and a 60 Hz
    /// refresh rate.
    pub fn new(screen: Size) -> Self {
        let extensions = HashMap::from([
            (Extension::Composite, ExtensionInfo::new(0, 4, 0)),
            (Extension::Damage, ExtensionInfo::new(1, 1, 91)),
            (Extension::Fixes, ExtensionInfo::new(5, 0, 87)),
            (Extension::Render, ExtensionInfo::new(0, 11, 0)),
            (Extension::Shape, ExtensionInfo::new(1, 1, 64)),
            (Extension::Sync, ExtensionInfo::new(3, 1, 83)),
            (Extension::RandR, ExtensionInfo::new(1, 5, 89)),
        ]);
        Self {
            state: RefCell::new(HeadlessState {
                screen,
                extensions,
                gl_available: true,
                gl_context_fails: false,
                refresh_rate: Some(60.0),
                vsync_blocking: false,
                keyboard_grab_fails: false,
                ops: Vec::new(),
                next_id: 0,
                windows: HashMap::new(),
                pixmaps: HashMap::new(),
                textures: HashMap::new(),
                pictures: HashMap::new(),
                damage_objects: HashSet::new(),
                input_windows: HashSet::new(),
                server_grabs: 0,
                keyboard_grabbed: false,
                gl_context: false,
                redirected: false,
            }),
        }
    }

    pub fn set_extension(&self, extension: Extension, info: Option<ExtensionInfo>) {
        let mut state = self.state.borrow_mut();
        match info {
            Some(info) => state.extensions.insert(extension, info),
            None => state.extensions.remove(&extension),
        };
    }

    pub fn set_gl_available(&self, available: bool) {
        self.state.borrow_mut().gl_available = available;
    }

    /// Makes context creation fail even though GL is advertised.
    pub fn set_gl_context_fails(&self, fails: bool) {
        self.state.borrow_mut().gl_context_fails = fails;
    }

    pub fn set_refresh_rate(&self, rate: Option<f64>) {
        self.state.borrow_mut().refresh_rate = rate;
    }

    pub fn set_vsync_blocking(&self, blocking: bool) {
        self.state.borrow_mut().vsync_blocking = blocking;
    }

    pub fn set_keyboard_grab_fails(&self, fails: bool) {
        self.state.borrow_mut().keyboard_grab_fails = fails;
    }

    /// Registers a viewable window whose pixmap has `size`.
    pub fn map_window(&self, window: WindowId, size: Size) {
        self.state
            .borrow_mut()
            .windows
            .insert(window, HeadlessWindow { size, pixmap_size: None, viewable: true });
    }

    /// Changes the window's size; its pixmap follows immediately.
    pub fn resize_window(&self, window: WindowId, size: Size) {
        if let Some(w) = self.state.borrow_mut().windows.get_mut(&window) {
            w.size = size;
            w.pixmap_size = None;
        }
    }

    /// Makes the next captured pixmap report `size` instead of the
    /// window's size, as if the client had not caught up with a resize.
    pub fn set_pixmap_size(&self, window: WindowId, size: Option<Size>) {
        if let Some(w) = self.state.borrow_mut().windows.get_mut(&window) {
            w.pixmap_size = size;
        }
    }

    pub fn set_viewable(&self, window: WindowId, viewable: bool) {
        if let Some(w) = self.state.borrow_mut().windows.get_mut(&window) {
            w.viewable = viewable;
        }
    }

    /// Forgets the window, so capturing it fails with a bad drawable.
    pub fn destroy_window(&self, window: WindowId) {
        self.state.borrow_mut().windows.remove(&window);
    }

    pub fn ops(&self) -> Vec<DisplayOp> {
        self.state.borrow().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.borrow_mut().ops.clear();
    }

    pub fn count_ops(&self, pred: impl Fn(&DisplayOp) -> bool) -> usize {
        self.state.borrow().ops.iter().filter(|op| pred(op)).count()
    }

    pub fn draws(&self) -> Vec<DrawRecord> {
        self.state
            .borrow()
            .ops
            .iter()
            .filter_map(|op| match op {
                DisplayOp::Draw(draw) => Some(draw.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn composites(&self) -> Vec<CompositeRecord> {
        self.state
            .borrow()
            .ops
            .iter()
            .filter_map(|op| match op {
                DisplayOp::Composite(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of frames presented by either backend.
    pub fn present_count(&self) -> usize {
        self.count_ops(|op| matches!(op, DisplayOp::SwapBuffers { .. } | DisplayOp::CopyToScreen { .. }))
    }

    pub fn server_grabbed(&self) -> bool {
        self.state.borrow().server_grabs > 0
    }

    pub fn keyboard_grabbed(&self) -> bool {
        self.state.borrow().keyboard_grabbed
    }

    pub fn is_redirected(&self) -> bool {
        self.state.borrow().redirected
    }

    pub fn has_gl_context(&self) -> bool {
        self.state.borrow().gl_context
    }

    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    pub fn live_pictures(&self) -> usize {
        self.state.borrow().pictures.len()
    }

    pub fn live_pixmaps(&self) -> usize {
        self.state.borrow().pixmaps.len()
    }

    pub fn live_input_windows(&self) -> usize {
        self.state.borrow().input_windows.len()
    }

    pub fn live_damage_objects(&self) -> usize {
        self.state.borrow().damage_objects.len()
    }

    pub fn texture_size(&self, texture: TextureId) -> Option<Size> {
        self.state.borrow().textures.get(&texture).copied()
    }

    pub fn picture_size(&self, picture: PictureId) -> Option<Size> {
        self.state.borrow().pictures.get(&picture).copied()
    }
}

impl std::fmt::Debug for HeadlessDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("HeadlessDisplay")
            .field("screen", &state.screen)
            .field("ops", &state.ops.len())
            .field("textures", &state.textures.len())
            .field("pictures", &state.pictures.len())
            .finish()
    }
}

fn transformed_bounds(draw: &TexturedDraw<'_>) -> Vec<Rectangle> {
    draw.quads
        .iter()
        .map(|quad| {
            let (mut left, mut top) = (f32::INFINITY, f32::INFINITY);
            let (mut right, mut bottom) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
            for v in quad.vertices() {
                let p = draw.model.transform_point3(Vec3::new(v.x as f32, v.y as f32, 0.0));
                left = left.min(p.x);
                top = top.min(p.y);
                right = right.max(p.x);
                bottom = bottom.max(p.y);
            }
            Rectangle::from_edges(
                left.round() as i32,
                top.round() as i32,
                right.round() as i32,
                bottom.round() as i32,
            )
        })
        .collect()
}

impl DisplayConnection for HeadlessDisplay {
    fn query_extension(&self, extension: Extension) -> Option<ExtensionInfo> {
        self.state.borrow().extensions.get(&extension).copied()
    }

    fn gl_context_available(&self) -> bool {
        self.state.borrow().gl_available
    }

    fn outputs(&self) -> Vec<Output> {
        let state = self.state.borrow();
        vec![Output {
            name: "HEADLESS-1".to_string(),
            geometry: Rectangle::from_size(state.screen),
            refresh_rate: state.refresh_rate,
        }]
    }

    fn screen_size(&self) -> Size {
        self.state.borrow().screen
    }

    fn grab_server(&self) {
        let mut state = self.state.borrow_mut();
        state.server_grabs += 1;
        state.record(DisplayOp::GrabServer);
    }

    fn ungrab_server(&self) {
        let mut state = self.state.borrow_mut();
        state.server_grabs -= 1;
        state.record(DisplayOp::UngrabServer);
    }

    fn redirect_subwindows(&self) -> Result<(), DisplayError> {
        let mut state = self.state.borrow_mut();
        if !state.extensions.contains_key(&Extension::Composite) {
            return Err(DisplayError::Unsupported("Composite"));
        }
        state.redirected = true;
        state.record(DisplayOp::RedirectSubwindows);
        Ok(())
    }

    fn unredirect_subwindows(&self) {
        let mut state = self.state.borrow_mut();
        state.redirected = false;
        state.record(DisplayOp::UnredirectSubwindows);
    }

    fn create_damage(&self, window: WindowId) -> Result<(), DisplayError> {
        let mut state = self.state.borrow_mut();
        if !state.windows.contains_key(&window) {
            return Err(DisplayError::BadDrawable(window));
        }
        state.damage_objects.insert(window);
        state.record(DisplayOp::CreateDamage(window));
        Ok(())
    }

    fn destroy_damage(&self, window: WindowId) {
        let mut state = self.state.borrow_mut();
        state.damage_objects.remove(&window);
        state.record(DisplayOp::DestroyDamage(window));
    }

    fn name_window_pixmap(&self, window: WindowId) -> Result<PixmapInfo, DisplayError> {
        let mut state = self.state.borrow_mut();
        if !state.redirected {
            return Err(DisplayError::Protocol("windows are not redirected".to_string()));
        }
        let w = *state.windows.get(&window).ok_or(DisplayError::BadDrawable(window))?;
        let size = w.pixmap_size.unwrap_or(w.size);
        let pixmap = PixmapId(state.alloc());
        state.pixmaps.insert(pixmap, size);
        state.record(DisplayOp::NameWindowPixmap { window, pixmap, size });
        Ok(PixmapInfo { pixmap, size, viewable: w.viewable })
    }

    fn free_pixmap(&self, pixmap: PixmapId) {
        let mut state = self.state.borrow_mut();
        state.pixmaps.remove(&pixmap);
        state.record(DisplayOp::FreePixmap(pixmap));
    }

    fn create_gl_context(&self) -> Result<GlContextInfo, DisplayError> {
        let mut state = self.state.borrow_mut();
        if !state.gl_available || state.gl_context_fails {
            return Err(DisplayError::Allocation("no suitable GL visual".to_string()));
        }
        state.gl_context = true;
        state.record(DisplayOp::CreateGlContext);
        Ok(GlContextInfo { renderer: "headless".to_string(), direct: true })
    }

    fn destroy_gl_context(&self) {
        let mut state = self.state.borrow_mut();
        state.gl_context = false;
        state.textures.clear();
        state.record(DisplayOp::DestroyGlContext);
    }

    fn bind_texture(&self, pixmap: PixmapId) -> Result<TextureId, DisplayError> {
        let mut state = self.state.borrow_mut();
        if !state.gl_context {
            return Err(DisplayError::ContextLost);
        }
        let size = *state
            .pixmaps
            .get(&pixmap)
            .ok_or_else(|| DisplayError::Protocol(format!("unknown pixmap {:?}", pixmap)))?;
        if size.is_empty() {
            return Err(DisplayError::Allocation("zero-size pixmap".to_string()));
        }
        let texture = TextureId(state.alloc());
        state.textures.insert(texture, size);
        state.record(DisplayOp::BindTexture { pixmap, texture, size });
        Ok(texture)
    }

    fn update_texture(&self, texture: TextureId, damage: &Region) -> Result<(), DisplayError> {
        let mut state = self.state.borrow_mut();
        if !state.textures.contains_key(&texture) {
            return Err(DisplayError::Protocol(format!("unknown texture {:?}", texture)));
        }
        state.record(DisplayOp::UpdateTexture { texture, damage: damage.clone() });
        Ok(())
    }

    fn upload_texture(&self, size: Size, _rgba: &[u8]) -> Result<TextureId, DisplayError> {
        let mut state = self.state.borrow_mut();
        if !state.gl_context {
            return Err(DisplayError::ContextLost);
        }
        let texture = TextureId(state.alloc());
        state.textures.insert(texture, size);
        state.record(DisplayOp::UploadTexture { texture, size });
        Ok(texture)
    }

    fn release_texture(&self, texture: TextureId) {
        let mut state = self.state.borrow_mut();
        state.textures.remove(&texture);
        state.record(DisplayOp::ReleaseTexture(texture));
    }

    fn draw_textured_quads(&self, draw: &TexturedDraw<'_>) {
        let record = DrawRecord {
            texture: draw.texture,
            texture_size: draw.texture_size,
            quads: transformed_bounds(draw),
            clip: draw.clip.map(|rects| rects.to_vec()),
            opacity: draw.opacity,
            blend: draw.blend,
        };
        self.state.borrow_mut().record(DisplayOp::Draw(record));
    }

    fn fill_solid(&self, color: Color, rects: &[Rectangle]) {
        self.state.borrow_mut().record(DisplayOp::FillSolid { color, rects: rects.to_vec() });
    }

    fn swap_buffers(&self, damage: &Region) -> Result<SwapResult, DisplayError> {
        let mut state = self.state.borrow_mut();
        if !state.gl_context {
            return Err(DisplayError::ContextLost);
        }
        state.record(DisplayOp::SwapBuffers { damage: damage.clone() });
        Ok(SwapResult { blocked_on_vsync: state.vsync_blocking })
    }

    fn create_picture(&self, pixmap: PixmapId, _has_alpha: bool) -> Result<PictureId, DisplayError> {
        let mut state = self.state.borrow_mut();
        let size = *state
            .pixmaps
            .get(&pixmap)
            .ok_or_else(|| DisplayError::Protocol(format!("unknown pixmap {:?}", pixmap)))?;
        if size.is_empty() {
            return Err(DisplayError::Allocation("zero-size pixmap".to_string()));
        }
        let picture = PictureId(state.alloc());
        state.pictures.insert(picture, size);
        state.record(DisplayOp::CreatePicture { picture, size });
        Ok(picture)
    }

    fn create_buffer_picture(&self, size: Size) -> Result<PictureId, DisplayError> {
        let mut state = self.state.borrow_mut();
        if !state.extensions.contains_key(&Extension::Render) {
            return Err(DisplayError::Unsupported("RENDER"));
        }
        let picture = PictureId(state.alloc());
        state.pictures.insert(picture, size);
        state.record(DisplayOp::CreatePicture { picture, size });
        Ok(picture)
    }

    fn create_solid_picture(&self, _color: Color) -> Result<PictureId, DisplayError> {
        let mut state = self.state.borrow_mut();
        let picture = PictureId(state.alloc());
        let size = Size::new(1, 1);
        state.pictures.insert(picture, size);
        state.record(DisplayOp::CreatePicture { picture, size });
        Ok(picture)
    }

    fn upload_picture(&self, size: Size, _rgba: &[u8]) -> Result<PictureId, DisplayError> {
        let mut state = self.state.borrow_mut();
        let picture = PictureId(state.alloc());
        state.pictures.insert(picture, size);
        state.record(DisplayOp::CreatePicture { picture, size });
        Ok(picture)
    }

    fn free_picture(&self, picture: PictureId) {
        let mut state = self.state.borrow_mut();
        state.pictures.remove(&picture);
        state.record(DisplayOp::FreePicture(picture));
    }

    fn composite(&self, call: &CompositeCall<'_>) {
        let record = CompositeRecord {
            op: call.op,
            source: call.source,
            mask: call.mask,
            dest: call.dest,
            src_rect: call.src_rect,
            dst_rect: call.dst_rect,
            clip: call.clip.map(|rects| rects.to_vec()),
        };
        self.state.borrow_mut().record(DisplayOp::Composite(record));
    }

    fn fill_rectangles(&self, picture: PictureId, color: Color, rects: &[Rectangle]) {
        self.state.borrow_mut().record(DisplayOp::FillRectangles { picture, color, rects: rects.to_vec() });
    }

    fn copy_to_screen(&self, buffer: PictureId, clip: &Region) {
        self.state.borrow_mut().record(DisplayOp::CopyToScreen { buffer, clip: clip.clone() });
    }

    fn grab_keyboard(&self) -> bool {
        let mut state = self.state.borrow_mut();
        if state.keyboard_grab_fails || state.keyboard_grabbed {
            return false;
        }
        state.keyboard_grabbed = true;
        state.record(DisplayOp::GrabKeyboard);
        true
    }

    fn ungrab_keyboard(&self) {
        let mut state = self.state.borrow_mut();
        state.keyboard_grabbed = false;
        state.record(DisplayOp::UngrabKeyboard);
    }

    fn create_input_window(&self, rect: Rectangle) -> Result<InputWindowId, DisplayError> {
        let mut state = self.state.borrow_mut();
        if rect.is_empty() {
            return Err(DisplayError::Allocation("empty input window".to_string()));
        }
        let window = InputWindowId(state.alloc());
        state.input_windows.insert(window);
        state.record(DisplayOp::CreateInputWindow(window));
        Ok(window)
    }

    fn destroy_input_window(&self, window: InputWindowId) {
        let mut state = self.state.borrow_mut();
        state.input_windows.remove(&window);
        state.record(DisplayOp::DestroyInputWindow(window));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::quads::{QuadKind, WindowQuad};
    use glam::Mat4;
    use pretty_assertions::assert_eq;

    #[test]
    fn capture_reports_lagging_pixmap_size() {
        let display = HeadlessDisplay::new(Size::new(640, 480));
        display.redirect_subwindows().unwrap();
        display.map_window(WindowId(7), Size::new(100, 80));
        display.set_pixmap_size(WindowId(7), Some(Size::new(90, 80)));
        let info = display.name_window_pixmap(WindowId(7)).unwrap();
        assert_eq!(info.size, Size::new(90, 80));
        assert!(info.viewable);
        assert_eq!(display.live_pixmaps(), 1);
    }

    #[test]
    fn destroyed_window_is_a_bad_drawable() {
        let display = HeadlessDisplay::new(Size::new(640, 480));
        display.redirect_subwindows().unwrap();
        display.map_window(WindowId(7), Size::new(10, 10));
        display.destroy_window(WindowId(7));
        assert_eq!(display.name_window_pixmap(WindowId(7)), Err(DisplayError::BadDrawable(WindowId(7))));
    }

    #[test]
    fn draw_records_transformed_and_clipped_area() {
        let display = HeadlessDisplay::new(Size::new(640, 480));
        display.create_gl_context().unwrap();
        let quads = [WindowQuad::from_rect(QuadKind::Contents, Rectangle::new(0, 0, 100, 100))];
        let clip = [Rectangle::new(0, 0, 150, 60)];
        display.draw_textured_quads(&TexturedDraw {
            texture: TextureId(1),
            texture_size: Size::new(100, 100),
            quads: &quads,
            model: Mat4::from_translation(glam::Vec3::new(100.0, 10.0, 0.0)),
            projection: Mat4::IDENTITY,
            opacity: 1.0,
            brightness: 1.0,
            saturation: 1.0,
            blend: false,
            clip: Some(&clip),
        });
        let draws = display.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].quads, vec![Rectangle::new(100, 10, 100, 100)]);
        assert_eq!(draws[0].drawn_area(), 50 * 50);
    }

    #[test]
    fn destroying_the_context_drops_its_textures() {
        let display = HeadlessDisplay::new(Size::new(64, 64));
        display.create_gl_context().unwrap();
        display.upload_texture(Size::new(4, 4), &[0; 64]).unwrap();
        assert_eq!(display.live_textures(), 1);
        display.destroy_gl_context();
        assert_eq!(display.live_textures(), 0);
    }
}
