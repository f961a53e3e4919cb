//! Per-surface paint state kept by the scene.
//!
//! A [`SceneWindow`] refers to its surface by handle only. It caches the
//! captured pixmap, the backend resource bound from it and the window's
//! quads, all tagged with the surface's geometry generation so a resize or
//! shape change discards them before the next paint.

use novade_compositor_core::{Rectangle, Region, Size, SurfaceHandle, Toplevel, WindowId};
use tracing::{debug, trace};

use super::quads::{QuadKind, WindowQuad, WindowQuadList};
use super::SkipReason;
use crate::display::{DisplayConnection, PictureId, PixmapInfo, ServerGrab, TextureId};

/// 1x1 alpha picture for one opacity value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlphaMask {
    pub opacity: f64,
    pub picture: PictureId,
}

/// The backend-specific handle to the captured content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowResource {
    None,
    Texture { texture: TextureId, size: Size },
    Picture { picture: PictureId, size: Size, alpha: Option<AlphaMask> },
}

#[derive(Debug)]
pub struct SceneWindow {
    handle: SurfaceHandle,
    window: WindowId,
    generation: u64,
    pixmap: Option<PixmapInfo>,
    pub(crate) resource: WindowResource,
    quads: Option<WindowQuadList>,
    grid_quads: Option<WindowQuadList>,
    active_grid: Option<i32>,
    requested_grid: Option<i32>,
    /// Damage captured into the resource during the current frame.
    captured: Region,
    /// Screen area the window and its decorations from effects covered in
    /// the last frame it was painted.
    extent: Rectangle,
}

impl SceneWindow {
    pub fn new(handle: SurfaceHandle, toplevel: &Toplevel) -> Self {
        Self {
            handle,
            window: toplevel.window(),
            generation: toplevel.geometry_generation(),
            pixmap: None,
            resource: WindowResource::None,
            quads: None,
            grid_quads: None,
            active_grid: None,
            requested_grid: None,
            captured: Region::new(),
            extent: toplevel.geometry(),
        }
    }

    pub fn handle(&self) -> SurfaceHandle {
        self.handle
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn resource(&self) -> WindowResource {
        self.resource
    }

    pub fn pixmap(&self) -> Option<PixmapInfo> {
        self.pixmap
    }

    pub fn extent(&self) -> Rectangle {
        self.extent
    }

    pub(crate) fn set_extent(&mut self, extent: Rectangle) {
        self.extent = extent;
    }

    /// Asks for quads no larger than `max_size` in the next frame. The
    /// densest request of a frame wins.
    pub fn request_vertex_grid(&mut self, max_size: i32) {
        if max_size <= 0 {
            return;
        }
        self.requested_grid = Some(self.requested_grid.map_or(max_size, |g| g.min(max_size)));
    }

    pub fn active_grid(&self) -> Option<i32> {
        self.active_grid
    }

    /// Promotes the grid requested during the previous frame.
    pub(crate) fn begin_frame(&mut self) {
        let grid = self.requested_grid.take();
        if grid != self.active_grid {
            trace!(surface = ?self.handle, ?grid, "vertex grid changed");
            self.active_grid = grid;
            self.grid_quads = None;
        }
    }

    /// Discards everything derived from the old geometry when the surface's
    /// generation moved on. Returns whether anything was discarded.
    pub(crate) fn sync_generation(&mut self, toplevel: &Toplevel, display: &dyn DisplayConnection) -> bool {
        if toplevel.geometry_generation() == self.generation {
            return false;
        }
        debug!(surface = ?self.handle, "geometry changed, discarding caches");
        self.generation = toplevel.geometry_generation();
        self.quads = None;
        self.grid_quads = None;
        self.release_resources(display);
        true
    }

    /// Drops the bound texture or picture and the captured pixmap.
    pub(crate) fn release_resources(&mut self, display: &dyn DisplayConnection) {
        match std::mem::replace(&mut self.resource, WindowResource::None) {
            WindowResource::None => {}
            WindowResource::Texture { texture, .. } => display.release_texture(texture),
            WindowResource::Picture { picture, alpha, .. } => {
                display.free_picture(picture);
                if let Some(alpha) = alpha {
                    display.free_picture(alpha.picture);
                }
            }
        }
        if let Some(info) = self.pixmap.take() {
            display.free_pixmap(info.pixmap);
        }
    }

    /// Captures the window's pixmap if none is held. A pixmap whose size
    /// does not match the surface is a stale capture from before a resize;
    /// it is dropped and the window skipped until the client catches up.
    pub(crate) fn ensure_pixmap(
        &mut self,
        toplevel: &Toplevel,
        display: &dyn DisplayConnection,
        grab: &ServerGrab,
    ) -> Result<PixmapInfo, SkipReason> {
        if let Some(info) = self.pixmap {
            return Ok(info);
        }
        if toplevel.is_deleted() {
            return Err(SkipReason::NoContent);
        }
        if toplevel.size().is_empty() {
            return Err(SkipReason::ZeroSize);
        }
        let info = {
            let _grab = grab.guard();
            display.name_window_pixmap(self.window).map_err(SkipReason::Capture)?
        };
        if !info.viewable {
            display.free_pixmap(info.pixmap);
            return Err(SkipReason::NotViewable);
        }
        if info.size != toplevel.size() {
            display.free_pixmap(info.pixmap);
            return Err(SkipReason::StalePixmap { pixmap: info.size, surface: toplevel.size() });
        }
        self.pixmap = Some(info);
        Ok(info)
    }

    pub(crate) fn note_captured(&mut self, region: &Region) {
        self.captured.union_with(region);
    }

    pub(crate) fn take_captured(&mut self) -> Region {
        std::mem::take(&mut self.captured)
    }

    /// The window's quads in frame-local coordinates, subdivided to the
    /// active vertex grid. Rebuilt only after a geometry change or a grid
    /// change.
    pub fn quads(&mut self, toplevel: &Toplevel) -> WindowQuadList {
        if self.quads.is_none() {
            self.quads = Some(build_quads(toplevel));
            self.grid_quads = None;
        }
        let base = self.quads.as_ref().cloned().unwrap_or_default();
        match self.active_grid {
            None => base,
            Some(grid) => {
                if self.grid_quads.is_none() {
                    self.grid_quads = Some(base.make_grid(grid));
                }
                self.grid_quads.clone().unwrap_or(base)
            }
        }
    }
}

/// Splits the surface's shape into contents quads (inside the client
/// rectangle) and decoration quads (the rest of the frame).
fn build_quads(toplevel: &Toplevel) -> WindowQuadList {
    let shape = toplevel.shape_region();
    let mut list = WindowQuadList::new();
    if !toplevel.has_decoration() {
        for rect in shape.rects() {
            list.push(WindowQuad::from_rect(QuadKind::Contents, *rect));
        }
        return list;
    }
    let client = Region::from_rect(toplevel.client_rect());
    for rect in shape.intersected(&client).rects() {
        list.push(WindowQuad::from_rect(QuadKind::Contents, *rect));
    }
    for rect in shape.subtracted(&client).rects() {
        list.push(WindowQuad::from_rect(QuadKind::Decoration, *rect));
    }
    list
}
