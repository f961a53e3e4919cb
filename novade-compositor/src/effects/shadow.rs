//! Drop shadows.
//!
//! A shadow is drawn from one of two sources: the eight bordered tiles a
//! decoration supplies, or a generated nine-patch image stretched around
//! the window. The shadow of window W covers W's frame grown by
//! `fuzzyness + size` on every side and moved by the configured offset.
//!
//! While windows are painted opaque and untransformed, shadows are queued
//! instead of drawn, since lower windows painted later would cover them.
//! The queue is flushed below the first translucent window that is higher
//! than the owners, and at the end of the frame. Under transforms or for
//! translucent windows the shadow is drawn right before its window.

use std::any::Any;
use std::collections::HashMap;

use novade_compositor_core::{DecorationShadow, Point, Rectangle, Region, Size, SurfaceHandle, Toplevel};
use novade_core::config::ShadowConfig;
use tracing::{debug, trace};

use super::{Effect, EffectContext, EffectPainter, EffectWindow, ImageDraw, ImageHandle};
use crate::display::PixmapId;
use crate::scene::{PaintMask, QuadKind, WindowPaintData, WindowPrePaintData, WindowQuad, WindowQuadList};

/// Opacity multiplier for the active window's shadow.
const ACTIVE_INTENSITY: f64 = 1.5;

struct QueuedShadow {
    owner_index: usize,
    pos: Point,
    data: WindowPaintData,
    opacity: f64,
    region: Region,
    parts: Vec<(ImageHandle, WindowQuadList)>,
}

pub struct ShadowEffect {
    config: ShadowConfig,
    fallback: Option<ImageHandle>,
    decoration_images: HashMap<SurfaceHandle, Vec<ImageHandle>>,
    release_pending: Vec<ImageHandle>,
    queue: Vec<QueuedShadow>,
}

impl ShadowEffect {
    pub const NAME: &'static str = "shadow";

    pub fn new(config: ShadowConfig) -> Self {
        Self {
            config,
            fallback: None,
            decoration_images: HashMap::new(),
            release_pending: Vec::new(),
            queue: Vec::new(),
        }
    }

    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// How far the generated shadow reaches past the offset frame.
    pub fn spread(&self) -> i32 {
        (self.config.fuzzyness + self.config.size).max(0)
    }

    /// Shadow area in frame-local coordinates.
    pub fn shadow_rect_local(&self, toplevel: &Toplevel) -> Rectangle {
        let rect = Rectangle::from_size(toplevel.size());
        if let Some(shadow) = toplevel.decoration_shadow() {
            return rect.adjusted(-shadow.padding_left, -shadow.padding_top, shadow.padding_right, shadow.padding_bottom);
        }
        self.offset_rect(rect)
    }

    /// Shadow area on screen.
    pub fn shadow_rect(&self, toplevel: &Toplevel) -> Rectangle {
        let pos = toplevel.pos();
        self.shadow_rect_local(toplevel).translate(pos.x, pos.y)
    }

    fn offset_rect(&self, rect: Rectangle) -> Rectangle {
        let g = self.spread();
        let (dx, dy) = (self.config.x_offset, self.config.y_offset);
        rect.adjusted(dx - g, dy - g, dx + g, dy + g)
    }

    fn casts_shadow(&self, toplevel: &Toplevel) -> bool {
        self.config.enabled && toplevel.window_type().casts_shadow() && !toplevel.size().is_empty()
    }

    fn shadow_opacity(&self, window: &EffectWindow<'_>) -> f64 {
        let opacity = self.config.opacity;
        if self.config.intensify_active_shadow && window.is_active() {
            (opacity * ACTIVE_INTENSITY).min(1.0)
        } else {
            opacity
        }
    }

    /// Nine-patch quads around a window of `size`, in frame-local
    /// coordinates. The image is a square of side `2 * spread + 1`; corners
    /// sample its quarters, edges and centre its middle row and column.
    pub fn fallback_quads(&self, size: Size) -> WindowQuadList {
        let mut list = WindowQuadList::new();
        let g = self.spread();
        if g == 0 {
            return list;
        }
        let rect = self.offset_rect(Rectangle::from_size(size));
        let corner = g.min(rect.width / 2).min(rect.height / 2);
        let (l, t, r, b) = (rect.left(), rect.top(), rect.right(), rect.bottom());
        let (cl, ct, cr, cb) = (l + corner, t + corner, r - corner, b - corner);
        let g = f64::from(g);
        let (lo, mid, hi) = ((0.0, g), (g, g + 1.0), (g + 1.0, 2.0 * g + 1.0));
        let cells = [
            ((l, t, cl, ct), (lo, lo)),
            ((cl, t, cr, ct), (mid, lo)),
            ((cr, t, r, ct), (hi, lo)),
            ((cr, ct, r, cb), (hi, mid)),
            ((cr, cb, r, b), (hi, hi)),
            ((cl, cb, cr, b), (mid, hi)),
            ((l, cb, cl, b), (lo, hi)),
            ((l, ct, cl, cb), (lo, mid)),
            ((cl, ct, cr, cb), (mid, mid)),
        ];
        for ((x0, y0, x1, y1), ((tx0, tx1), (ty0, ty1))) in cells {
            if x1 <= x0 || y1 <= y0 {
                continue;
            }
            list.push(WindowQuad::new(
                QuadKind::Shadow,
                [f64::from(x0), f64::from(y0), f64::from(x1), f64::from(y1)],
                [tx0, ty0, tx1, ty1],
            ));
        }
        list
    }

    /// One quad per decoration tile, in frame-local coordinates. Index `i`
    /// of the result samples tile `i`.
    pub fn decoration_quads(shadow: &DecorationShadow, size: Size) -> Vec<Option<WindowQuad>> {
        let tile = |i: usize| shadow.tiles[i].size;
        let (l, t) = (-shadow.padding_left, -shadow.padding_top);
        let (r, b) = (size.width + shadow.padding_right, size.height + shadow.padding_bottom);
        let tl = tile(DecorationShadow::TOP_LEFT);
        let top = tile(DecorationShadow::TOP);
        let tr = tile(DecorationShadow::TOP_RIGHT);
        let right = tile(DecorationShadow::RIGHT);
        let br = tile(DecorationShadow::BOTTOM_RIGHT);
        let bottom = tile(DecorationShadow::BOTTOM);
        let bl = tile(DecorationShadow::BOTTOM_LEFT);
        let left = tile(DecorationShadow::LEFT);
        let edges = [
            (l, t, l + tl.width, t + tl.height),
            (l + tl.width, t, r - tr.width, t + top.height),
            (r - tr.width, t, r, t + tr.height),
            (r - right.width, t + tr.height, r, b - br.height),
            (r - br.width, b - br.height, r, b),
            (l + bl.width, b - bottom.height, r - br.width, b),
            (l, b - bl.height, l + bl.width, b),
            (l, t + tl.height, l + left.width, b - bl.height),
        ];
        edges
            .iter()
            .enumerate()
            .map(|(i, &(x0, y0, x1, y1))| {
                let size = tile(i);
                if x1 <= x0 || y1 <= y0 || size.is_empty() {
                    return None;
                }
                Some(WindowQuad::new(
                    QuadKind::Shadow,
                    [f64::from(x0), f64::from(y0), f64::from(x1), f64::from(y1)],
                    [0.0, 0.0, f64::from(size.width), f64::from(size.height)],
                ))
            })
            .collect()
    }

    /// RGBA pixels of the nine-patch image: solid within `size` of the
    /// centre, fading out over `fuzzyness`.
    fn fallback_pixels(&self) -> (Size, Vec<u8>) {
        let g = self.spread();
        let side = 2 * g + 1;
        let [red, green, blue] = self.config.color;
        let solid = f64::from(self.config.size.max(0));
        let fuzzy = f64::from(self.config.fuzzyness.max(1));
        let mut pixels = Vec::with_capacity((side * side * 4) as usize);
        for y in 0..side {
            for x in 0..side {
                let dx = f64::from((x - g).abs());
                let dy = f64::from((y - g).abs());
                let distance = (dx * dx + dy * dy).sqrt();
                let alpha = (1.0 - (distance - solid) / fuzzy).clamp(0.0, 1.0);
                pixels.extend_from_slice(&[red, green, blue, (alpha * 255.0).round() as u8]);
            }
        }
        (Size::new(side, side), pixels)
    }

    fn shadow_parts(
        &mut self,
        window: &EffectWindow<'_>,
        painter: &mut dyn EffectPainter,
    ) -> Option<Vec<(ImageHandle, WindowQuadList)>> {
        let toplevel = window.toplevel();
        if let Some(shadow) = toplevel.decoration_shadow() {
            if !self.decoration_images.contains_key(&window.handle()) {
                let mut images = Vec::with_capacity(shadow.tiles.len());
                for tile in &shadow.tiles {
                    match painter.image_from_pixmap(PixmapId(tile.pixmap), tile.size) {
                        Some(image) => images.push(image),
                        None => {
                            for image in images {
                                painter.release_image(image);
                            }
                            return None;
                        }
                    }
                }
                trace!(surface = ?window.handle(), "decoration shadow tiles bound");
                self.decoration_images.insert(window.handle(), images);
            }
            let images = self.decoration_images.get(&window.handle())?;
            let quads = Self::decoration_quads(shadow, toplevel.size());
            let parts = images
                .iter()
                .zip(quads)
                .filter_map(|(image, quad)| quad.map(|q| (*image, std::iter::once(q).collect())))
                .collect();
            return Some(parts);
        }
        if self.fallback.is_none() {
            let (size, pixels) = self.fallback_pixels();
            self.fallback = painter.upload_image(size, &pixels);
            debug!(width = size.width, "shadow image uploaded");
        }
        let quads = self.fallback_quads(toplevel.size());
        if quads.is_empty() {
            return None;
        }
        Some(vec![(self.fallback?, quads)])
    }

    fn draw(painter: &mut dyn EffectPainter, shadow: &QueuedShadow) {
        for (image, quads) in &shadow.parts {
            painter.draw_image(&ImageDraw {
                image: *image,
                quads: quads.as_slice(),
                pos: shadow.pos,
                data: &shadow.data,
                opacity: shadow.opacity,
                region: &shadow.region,
            });
        }
    }

    /// Draws the queued shadows of windows below `index`, lowest first.
    fn flush_below(&mut self, index: usize, painter: &mut dyn EffectPainter) {
        let (below, keep): (Vec<_>, Vec<_>) = self.queue.drain(..).partition(|s| s.owner_index < index);
        self.queue = keep;
        for shadow in below.iter().rev() {
            Self::draw(painter, shadow);
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl Effect for ShadowEffect {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn pre_paint_window(
        &mut self,
        window: &EffectWindow<'_>,
        data: &mut WindowPrePaintData,
        _ctx: &mut EffectContext<'_>,
    ) {
        if !self.casts_shadow(window.toplevel()) {
            return;
        }
        let rect = self.shadow_rect(window.toplevel());
        if data.paint.intersects_rect(&rect) || data.paint.is_infinite() {
            data.paint.add_rect(rect);
        }
        data.extent = data.extent.union(&rect);
    }

    fn paint_window(
        &mut self,
        window: &EffectWindow<'_>,
        mask: PaintMask,
        region: &Region,
        data: &mut WindowPaintData,
        painter: &mut dyn EffectPainter,
    ) {
        let toplevel = window.toplevel();
        if !self.casts_shadow(toplevel) {
            return;
        }
        let opacity = self.shadow_opacity(window) * data.opacity;
        if opacity <= 0.0 {
            return;
        }
        let Some(parts) = self.shadow_parts(window, painter) else {
            return;
        };
        let pos = toplevel.pos();
        let rect = Region::from_rect(self.shadow_rect(toplevel));
        let own_shape = toplevel.shape_region().translated(pos.x, pos.y);
        let transformed = mask.intersects(
            PaintMask::WINDOW_TRANSFORMED
                | PaintMask::SCREEN_TRANSFORMED
                | PaintMask::SCREEN_WITH_TRANSFORMED_WINDOWS,
        );
        let clip_to = |region: &Region| if region.is_infinite() { rect.clone() } else { region.intersected(&rect) };

        if !transformed && !mask.contains(PaintMask::WINDOW_TRANSLUCENT) {
            let region = clip_to(region).subtracted(&own_shape);
            if region.is_empty() {
                return;
            }
            self.queue.push(QueuedShadow {
                owner_index: window.stacking_index(),
                pos,
                data: data.clone(),
                opacity,
                region,
                parts,
            });
            return;
        }

        self.flush_below(window.stacking_index(), painter);
        let region = if transformed {
            Region::infinite()
        } else {
            clip_to(region).subtracted(&own_shape)
        };
        Self::draw(painter, &QueuedShadow { owner_index: window.stacking_index(), pos, data: data.clone(), opacity, region, parts });
    }

    fn paint_screen_done(&mut self, painter: &mut dyn EffectPainter) {
        self.flush_below(usize::MAX, painter);
        for image in self.release_pending.drain(..) {
            painter.release_image(image);
        }
    }

    fn window_damaged(&mut self, window: &EffectWindow<'_>, damage: Rectangle, ctx: &mut EffectContext<'_>) {
        if !self.casts_shadow(window.toplevel()) {
            return;
        }
        let pos = window.pos();
        let rect = self.offset_rect(damage.translate(pos.x, pos.y));
        ctx.requests.add_repaint(rect.intersection(&self.shadow_rect(window.toplevel())));
    }

    fn window_geometry_changed(&mut self, window: &EffectWindow<'_>, old: Rectangle, ctx: &mut EffectContext<'_>) {
        if !self.casts_shadow(window.toplevel()) {
            return;
        }
        let local = self.shadow_rect_local(window.toplevel());
        ctx.requests.add_repaint(local.translate(old.x, old.y));
        ctx.requests.add_repaint(self.shadow_rect(window.toplevel()));
    }

    fn window_opacity_changed(&mut self, window: &EffectWindow<'_>, _old: f64, ctx: &mut EffectContext<'_>) {
        if self.casts_shadow(window.toplevel()) {
            ctx.requests.add_repaint(self.shadow_rect(window.toplevel()));
        }
    }

    fn window_deleted(&mut self, handle: SurfaceHandle) {
        if let Some(images) = self.decoration_images.remove(&handle) {
            self.release_pending.extend(images);
        }
    }

    fn cancel(&mut self, _ctx: &mut EffectContext<'_>) {
        self.queue.clear();
    }

    fn release_images(&mut self, painter: &mut dyn EffectPainter) {
        self.queue.clear();
        if let Some(image) = self.fallback.take() {
            painter.release_image(image);
        }
        for (_, images) in self.decoration_images.drain() {
            for image in images {
                painter.release_image(image);
            }
        }
        for image in self.release_pending.drain(..) {
            painter.release_image(image);
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl std::fmt::Debug for ShadowEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowEffect")
            .field("config", &self.config)
            .field("queued", &self.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use novade_compositor_core::{ShadowTile, SurfaceDescriptor, WindowId};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn config(x_offset: i32, y_offset: i32) -> ShadowConfig {
        ShadowConfig { x_offset, y_offset, fuzzyness: 10, size: 5, ..ShadowConfig::default() }
    }

    #[rstest]
    #[case(0, 0)]
    #[case(0, 3)]
    #[case(-4, 7)]
    fn fallback_quads_cover_the_grown_frame(#[case] dx: i32, #[case] dy: i32) {
        let effect = ShadowEffect::new(config(dx, dy));
        let quads = effect.fallback_quads(Size::new(200, 100));
        assert_eq!(quads.len(), 9);
        assert_eq!(quads.bounding_rect(), Rectangle::new(dx - 15, dy - 15, 230, 130));
        let area: i64 = quads.iter().map(|q| q.bounding_rect().area()).sum();
        assert_eq!(area, 230 * 130);
    }

    #[test]
    fn tiny_windows_shrink_the_corners() {
        let effect = ShadowEffect::new(config(0, 0));
        let quads = effect.fallback_quads(Size::new(2, 2));
        assert_eq!(quads.bounding_rect(), Rectangle::new(-15, -15, 32, 32));
        for quad in quads.iter() {
            assert!(quad.bounding_rect().width <= 16);
        }
    }

    #[test]
    fn no_spread_no_quads() {
        let effect = ShadowEffect::new(ShadowConfig { fuzzyness: 0, size: 0, ..ShadowConfig::default() });
        assert!(effect.fallback_quads(Size::new(100, 100)).is_empty());
    }

    #[test]
    fn image_is_solid_in_the_middle_and_clear_at_the_corner() {
        let effect = ShadowEffect::new(config(0, 0));
        let (size, pixels) = effect.fallback_pixels();
        assert_eq!(size, Size::new(31, 31));
        let alpha = |x: i32, y: i32| pixels[((y * size.width + x) * 4 + 3) as usize];
        assert_eq!(alpha(15, 15), 255);
        assert_eq!(alpha(0, 0), 0);
        assert!(alpha(15, 3) > 0 && alpha(15, 3) < 255);
    }

    #[test]
    fn decoration_tiles_surround_the_padded_frame() {
        let tile = |w, h| ShadowTile { pixmap: 1, size: Size::new(w, h) };
        let shadow = DecorationShadow {
            tiles: [tile(20, 20), tile(1, 12), tile(20, 20), tile(12, 1), tile(20, 20), tile(1, 12), tile(20, 20), tile(12, 1)],
            padding_left: 12,
            padding_top: 12,
            padding_right: 12,
            padding_bottom: 12,
        };
        let quads = ShadowEffect::decoration_quads(&shadow, Size::new(100, 60));
        let list: WindowQuadList = quads.into_iter().flatten().collect();
        assert_eq!(list.len(), 8);
        assert_eq!(list.bounding_rect(), Rectangle::new(-12, -12, 124, 84));

        let mut desc = SurfaceDescriptor::new(WindowId(3), Rectangle::new(50, 50, 100, 60));
        desc.decoration_shadow = Some(shadow);
        let effect = ShadowEffect::new(config(0, 3));
        assert_eq!(effect.shadow_rect(&Toplevel::new(desc)), Rectangle::new(38, 38, 124, 84));
    }
}
