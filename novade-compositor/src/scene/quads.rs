//! Window quads: the vertex representation windows are drawn from.
//!
//! A window is drawn as a list of textured quads. Each vertex carries its
//! current position, the position it was created at and a texture
//! coordinate in texels of the source. Effects may subdivide the list
//! ([`WindowQuadList::make_grid`]) to deform parts of a window
//! independently.

use novade_compositor_core::Rectangle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuadKind {
    Contents,
    Decoration,
    Shadow,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowVertex {
    pub x: f64,
    pub y: f64,
    pub tx: f64,
    pub ty: f64,
    pub original_x: f64,
    pub original_y: f64,
}

impl WindowVertex {
    pub fn new(x: f64, y: f64, tx: f64, ty: f64) -> Self {
        Self { x, y, tx, ty, original_x: x, original_y: y }
    }

    fn lerp(&self, other: &WindowVertex, t: f64) -> WindowVertex {
        let mix = |a: f64, b: f64| a + (b - a) * t;
        WindowVertex {
            x: mix(self.x, other.x),
            y: mix(self.y, other.y),
            tx: mix(self.tx, other.tx),
            ty: mix(self.ty, other.ty),
            original_x: mix(self.original_x, other.original_x),
            original_y: mix(self.original_y, other.original_y),
        }
    }
}

/// Four vertices in the order top-left, top-right, bottom-right,
/// bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowQuad {
    kind: QuadKind,
    vertices: [WindowVertex; 4],
}

impl WindowQuad {
    /// An axis-aligned quad covering `[left, top, right, bottom]`, sampling
    /// the texel rectangle `tex` given in the same edge order.
    pub fn new(kind: QuadKind, pos: [f64; 4], tex: [f64; 4]) -> Self {
        let [left, top, right, bottom] = pos;
        let [tl, tt, tr, tb] = tex;
        Self {
            kind,
            vertices: [
                WindowVertex::new(left, top, tl, tt),
                WindowVertex::new(right, top, tr, tt),
                WindowVertex::new(right, bottom, tr, tb),
                WindowVertex::new(left, bottom, tl, tb),
            ],
        }
    }

    /// A quad whose texels match its position one to one, as for window
    /// content sampled from the window's own pixmap.
    pub fn from_rect(kind: QuadKind, rect: Rectangle) -> Self {
        let edges = [
            f64::from(rect.left()),
            f64::from(rect.top()),
            f64::from(rect.right()),
            f64::from(rect.bottom()),
        ];
        Self::new(kind, edges, edges)
    }

    pub fn kind(&self) -> QuadKind {
        self.kind
    }

    pub fn vertices(&self) -> &[WindowVertex; 4] {
        &self.vertices
    }

    pub fn vertices_mut(&mut self) -> &mut [WindowVertex; 4] {
        &mut self.vertices
    }

    pub fn left(&self) -> f64 {
        self.vertices.iter().map(|v| v.x).fold(f64::INFINITY, f64::min)
    }

    pub fn right(&self) -> f64 {
        self.vertices.iter().map(|v| v.x).fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn top(&self) -> f64 {
        self.vertices.iter().map(|v| v.y).fold(f64::INFINITY, f64::min)
    }

    pub fn bottom(&self) -> f64 {
        self.vertices.iter().map(|v| v.y).fold(f64::NEG_INFINITY, f64::max)
    }

    /// Smallest integer rectangle containing the quad.
    pub fn bounding_rect(&self) -> Rectangle {
        Rectangle::from_edges(
            self.left().floor() as i32,
            self.top().floor() as i32,
            self.right().ceil() as i32,
            self.bottom().ceil() as i32,
        )
    }

    /// Whether an effect has moved any vertex.
    pub fn is_transformed(&self) -> bool {
        self.vertices.iter().any(|v| v.x != v.original_x || v.y != v.original_y)
    }

    pub fn translated(&self, dx: f64, dy: f64) -> WindowQuad {
        let mut quad = *self;
        for v in &mut quad.vertices {
            v.x += dx;
            v.y += dy;
        }
        quad
    }

    /// Splits at the vertical line `x`. `None` when the line does not cross
    /// the quad's interior.
    pub fn split_at_x(&self, x: f64) -> Option<(WindowQuad, WindowQuad)> {
        let (left, right) = (self.left(), self.right());
        if x <= left || x >= right {
            return None;
        }
        let t = (x - left) / (right - left);
        let [tl, tr, br, bl] = self.vertices;
        let top = tl.lerp(&tr, t);
        let bottom = bl.lerp(&br, t);
        Some((
            WindowQuad { kind: self.kind, vertices: [tl, top, bottom, bl] },
            WindowQuad { kind: self.kind, vertices: [top, tr, br, bottom] },
        ))
    }

    pub fn split_at_y(&self, y: f64) -> Option<(WindowQuad, WindowQuad)> {
        let (top, bottom) = (self.top(), self.bottom());
        if y <= top || y >= bottom {
            return None;
        }
        let t = (y - top) / (bottom - top);
        let [tl, tr, br, bl] = self.vertices;
        let left = tl.lerp(&bl, t);
        let right = tr.lerp(&br, t);
        Some((
            WindowQuad { kind: self.kind, vertices: [tl, tr, right, left] },
            WindowQuad { kind: self.kind, vertices: [left, right, br, bl] },
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowQuadList {
    quads: Vec<WindowQuad>,
}

impl WindowQuadList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, quad: WindowQuad) {
        self.quads.push(quad);
    }

    pub fn extend(&mut self, other: WindowQuadList) {
        self.quads.extend(other.quads);
    }

    pub fn len(&self) -> usize {
        self.quads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WindowQuad> {
        self.quads.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, WindowQuad> {
        self.quads.iter_mut()
    }

    pub fn as_slice(&self) -> &[WindowQuad] {
        &self.quads
    }

    pub fn select(&self, kind: QuadKind) -> WindowQuadList {
        self.quads.iter().filter(|q| q.kind == kind).copied().collect()
    }

    pub fn filter_out(&self, kind: QuadKind) -> WindowQuadList {
        self.quads.iter().filter(|q| q.kind != kind).copied().collect()
    }

    pub fn split_at_x(&self, x: f64) -> WindowQuadList {
        let mut out = WindowQuadList::new();
        for quad in &self.quads {
            match quad.split_at_x(x) {
                Some((a, b)) => {
                    out.push(a);
                    out.push(b);
                }
                None => out.push(*quad),
            }
        }
        out
    }

    pub fn split_at_y(&self, y: f64) -> WindowQuadList {
        let mut out = WindowQuadList::new();
        for quad in &self.quads {
            match quad.split_at_y(y) {
                Some((a, b)) => {
                    out.push(a);
                    out.push(b);
                }
                None => out.push(*quad),
            }
        }
        out
    }

    /// Subdivides every quad along a grid of `max_size` pixel cells anchored
    /// at the list's top-left corner, so no resulting quad is larger than
    /// one cell.
    pub fn make_grid(&self, max_size: i32) -> WindowQuadList {
        if self.quads.is_empty() || max_size <= 0 {
            return self.clone();
        }
        let step = f64::from(max_size);
        let origin_x = self.quads.iter().map(WindowQuad::left).fold(f64::INFINITY, f64::min);
        let origin_y = self.quads.iter().map(WindowQuad::top).fold(f64::INFINITY, f64::min);

        let mut out = WindowQuadList::new();
        for quad in &self.quads {
            let mut columns = Vec::new();
            let mut rest = *quad;
            let mut x = origin_x + step * ((rest.left() - origin_x) / step).floor() + step;
            while x < quad.right() {
                if let Some((head, tail)) = rest.split_at_x(x) {
                    columns.push(head);
                    rest = tail;
                }
                x += step;
            }
            columns.push(rest);

            for column in columns {
                let mut rest = column;
                let mut y = origin_y + step * ((rest.top() - origin_y) / step).floor() + step;
                while y < column.bottom() {
                    if let Some((head, tail)) = rest.split_at_y(y) {
                        out.push(head);
                        rest = tail;
                    }
                    y += step;
                }
                out.push(rest);
            }
        }
        out
    }

    /// Smallest integer rectangle containing every quad; empty for an
    /// empty list.
    pub fn bounding_rect(&self) -> Rectangle {
        self.quads.iter().fold(Rectangle::default(), |acc, q| acc.union(&q.bounding_rect()))
    }

    pub fn translated(&self, dx: f64, dy: f64) -> WindowQuadList {
        self.quads.iter().map(|q| q.translated(dx, dy)).collect()
    }
}

impl FromIterator<WindowQuad> for WindowQuadList {
    fn from_iter<I: IntoIterator<Item = WindowQuad>>(iter: I) -> Self {
        Self { quads: iter.into_iter().collect() }
    }
}

impl IntoIterator for WindowQuadList {
    type Item = WindowQuad;
    type IntoIter = std::vec::IntoIter<WindowQuad>;

    fn into_iter(self) -> Self::IntoIter {
        self.quads.into_iter()
    }
}

impl<'a> IntoIterator for &'a WindowQuadList {
    type Item = &'a WindowQuad;
    type IntoIter = std::slice::Iter<'a, WindowQuad>;

    fn into_iter(self) -> Self::IntoIter {
        self.quads.iter()
    }
}
