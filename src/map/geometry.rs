use super::canvas::FrameCanvas;
use super::pixel::ViewportPixel;
use super::projection;
use super::viewport::Viewport;
use crate::geo::{self, BoundingBox, GeoCoordinate};
use glam::DVec2;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tiny_skia::{Color, Paint, PathBuilder, Pixmap, Shader};

/// Segments used to approximate an ellipse outline
const ELLIPSE_SEGMENTS: usize = 64;

/// Anything a layer can paint.
pub trait Drawable: Send + Sync {
    /// Paint into `canvas`; `rect` is the geographic area being drawn
    fn draw(&self, canvas: &mut FrameCanvas<'_>, rect: &BoundingBox);

    fn is_visible(&self) -> bool;

    /// Geographic extent. Pixel-sized items depend on the viewport zoom.
    fn bounding_box(&self, viewport: &Viewport) -> BoundingBox;
}

/// Pen and brush for a geometry, built eagerly with defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Style {
    pub pen: Color,
    pub pen_width: f32,
    /// Fill for points, polygons and ellipses. `None` leaves them hollow.
    pub brush: Option<Color>,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            pen: Color::from_rgba8(30, 30, 30, 255),
            pen_width: 1.5,
            brush: Some(Color::from_rgba8(220, 60, 60, 160)),
        }
    }
}

fn solid(color: Color) -> Paint<'static> {
    Paint {
        shader: Shader::SolidColor(color),
        anti_alias: true,
        ..Default::default()
    }
}

/// Where a point marker sits relative to its coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Middle,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Alignment {
    /// Offset of the marker's top-left corner from the anchor pixel
    fn top_left_offset(self, size: DVec2) -> DVec2 {
        match self {
            Alignment::Middle => -size / 2.0,
            Alignment::TopLeft => DVec2::ZERO,
            Alignment::TopRight => DVec2::new(-size.x, 0.0),
            Alignment::BottomLeft => DVec2::new(0.0, -size.y),
            Alignment::BottomRight => -size,
        }
    }
}

/// How a point geometry is drawn inside its marker rect
#[derive(Debug, Clone, Default)]
pub enum Marker {
    /// Circle inscribed in the rect
    #[default]
    Circle,
    /// Arrowhead turned to a compass heading, 0 points north
    Arrow { heading_deg: f64 },
    /// Pixmap blitted at its own size
    Image(Arc<Pixmap>),
}

#[derive(Debug, Clone)]
pub enum GeometryKind {
    /// Fixed-pixel marker anchored at a coordinate
    Point {
        coord: GeoCoordinate,
        size_px: DVec2,
        alignment: Alignment,
        marker: Marker,
    },
    LineString(Vec<GeoCoordinate>),
    /// Outer ring; closing vertex optional
    Polygon(Vec<GeoCoordinate>),
    /// Ground-sized ellipse, axes in metres, bearing of the major axis in degrees
    Ellipse {
        center: GeoCoordinate,
        semi_major_m: f64,
        semi_minor_m: f64,
        bearing_deg: f64,
    },
}

/// A vector feature: one shape plus common display properties.
#[derive(Debug)]
pub struct Geometry {
    kind: GeometryKind,
    name: String,
    style: Style,
    visible: AtomicBool,
    zoom_min: u8,
    zoom_max: u8,
    metadata: HashMap<String, String>,
}

impl Geometry {
    pub fn new(kind: GeometryKind) -> Self {
        Self {
            kind,
            name: String::new(),
            style: Style::default(),
            visible: AtomicBool::new(true),
            zoom_min: 0,
            zoom_max: u8::MAX,
            metadata: HashMap::new(),
        }
    }

    pub fn point(coord: GeoCoordinate, size_px: f64) -> Self {
        Self::marker(coord, DVec2::splat(size_px), Marker::Circle)
    }

    pub fn arrow(coord: GeoCoordinate, size_px: f64, heading_deg: f64) -> Self {
        Self::marker(coord, DVec2::splat(size_px), Marker::Arrow { heading_deg })
    }

    /// Point drawn as `image`; the marker takes the image's size
    pub fn image(coord: GeoCoordinate, image: Arc<Pixmap>) -> Self {
        let size_px = DVec2::new(image.width() as f64, image.height() as f64);
        Self::marker(coord, size_px, Marker::Image(image))
    }

    fn marker(coord: GeoCoordinate, size_px: DVec2, marker: Marker) -> Self {
        Self::new(GeometryKind::Point {
            coord,
            size_px,
            alignment: Alignment::Middle,
            marker,
        })
    }

    pub fn line_string(coords: Vec<GeoCoordinate>) -> Self {
        Self::new(GeometryKind::LineString(coords))
    }

    pub fn polygon(coords: Vec<GeoCoordinate>) -> Self {
        Self::new(GeometryKind::Polygon(coords))
    }

    pub fn ellipse(
        center: GeoCoordinate,
        semi_major_m: f64,
        semi_minor_m: f64,
        bearing_deg: f64,
    ) -> Self {
        Self::new(GeometryKind::Ellipse {
            center,
            semi_major_m,
            semi_minor_m,
            bearing_deg,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn with_zoom_range(mut self, min: u8, max: u8) -> Self {
        self.zoom_min = min.min(max);
        self.zoom_max = min.max(max);
        self
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        if let GeometryKind::Point { alignment: a, .. } = &mut self.kind {
            *a = alignment;
        }
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> &GeometryKind {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Relaxed);
    }

    pub fn in_zoom_range(&self, zoom: u8) -> bool {
        (self.zoom_min..=self.zoom_max).contains(&zoom)
    }

    /// Coordinate used to index point geometries. Shapes with a ground
    /// extent have none and are culled by bounding box instead.
    pub fn anchor(&self) -> Option<GeoCoordinate> {
        match &self.kind {
            GeometryKind::Point { coord, .. } => Some(*coord),
            _ => None,
        }
    }

    /// Farthest a point marker can reach from its anchor along either
    /// axis, in pixels, whatever its alignment or rotation. Zero for shapes.
    pub fn marker_reach_px(&self) -> f64 {
        match &self.kind {
            GeometryKind::Point { size_px, .. } => size_px.length(),
            _ => 0.0,
        }
    }

    /// Marker rect in viewport pixels for a point geometry
    fn marker_rect(&self, viewport: &Viewport) -> Option<(ViewportPixel, DVec2)> {
        match &self.kind {
            GeometryKind::Point {
                coord,
                size_px,
                alignment,
                ..
            } => {
                let anchor = projection::to_viewport_px(viewport, coord);
                Some((anchor + alignment.top_left_offset(*size_px), *size_px))
            }
            _ => None,
        }
    }

    fn ellipse_outline(&self) -> Vec<GeoCoordinate> {
        let GeometryKind::Ellipse {
            center,
            semi_major_m,
            semi_minor_m,
            bearing_deg,
        } = &self.kind
        else {
            return Vec::new();
        };

        (0..ELLIPSE_SEGMENTS)
            .map(|i| {
                let theta = i as f64 / ELLIPSE_SEGMENTS as f64 * std::f64::consts::TAU;
                let along = semi_major_m * theta.cos();
                let across = semi_minor_m * theta.sin();
                let distance = along.hypot(across);
                let bearing = bearing_deg + across.atan2(along).to_degrees();
                geo::destination_point(center, distance, bearing)
            })
            .collect()
    }

    /// Whether the geometry overlaps `area`. Used for hit testing.
    pub fn touches(&self, area: &BoundingBox, viewport: &Viewport) -> bool {
        match &self.kind {
            GeometryKind::Point { .. } | GeometryKind::Ellipse { .. } => {
                self.bounding_box(viewport).intersects(area)
            }
            GeometryKind::LineString(coords) => {
                coords.iter().any(|c| area.contains(c))
                    || coords
                        .windows(2)
                        .any(|w| segment_intersects_box(&w[0], &w[1], area))
            }
            GeometryKind::Polygon(coords) => {
                if coords.is_empty() {
                    return false;
                }
                coords.iter().any(|c| area.contains(c))
                    || ring_edges(coords).any(|(a, b)| segment_intersects_box(a, b, area))
                    || polygon_contains(coords, &area.center())
            }
        }
    }

    fn path_through(
        canvas: &FrameCanvas<'_>,
        coords: &[GeoCoordinate],
        close: bool,
    ) -> Option<tiny_skia::Path> {
        let (first, rest) = coords.split_first()?;
        let mut pb = PathBuilder::new();
        let (x, y) = canvas.geo_to_canvas(first);
        pb.move_to(x, y);
        for c in rest {
            let (x, y) = canvas.geo_to_canvas(c);
            pb.line_to(x, y);
        }
        if close {
            pb.close();
        }
        pb.finish()
    }

    fn fill_and_stroke(&self, canvas: &mut FrameCanvas<'_>, path: &tiny_skia::Path) {
        if let Some(brush) = self.style.brush {
            canvas.fill_path(path, &solid(brush));
        }
        if self.style.pen_width > 0.0 {
            canvas.stroke_path(path, &solid(self.style.pen), self.style.pen_width);
        }
    }
}

impl Drawable for Geometry {
    fn draw(&self, canvas: &mut FrameCanvas<'_>, rect: &BoundingBox) {
        let zoom = canvas.viewport().zoom();
        if !self.is_visible() || !self.in_zoom_range(zoom) {
            return;
        }
        if !self.bounding_box(canvas.viewport()).intersects(rect) {
            return;
        }

        match &self.kind {
            GeometryKind::Point { marker, .. } => {
                let Some((top_left, size)) = self.marker_rect(canvas.viewport()) else {
                    return;
                };
                let world = canvas.viewport().to_world_px(top_left);
                match marker {
                    Marker::Circle => {
                        let (x, y) = canvas.to_canvas(world);
                        let (w, h) = (size.x as f32, size.y as f32);
                        let radius = w.min(h) / 2.0;
                        let circle = PathBuilder::from_circle(x + w / 2.0, y + h / 2.0, radius);
                        if let Some(path) = circle {
                            self.fill_and_stroke(canvas, &path);
                        }
                    }
                    Marker::Arrow { heading_deg } => {
                        let (x, y) = canvas.to_canvas(world);
                        let top_left = DVec2::new(x as f64, y as f64);
                        if let Some(path) = arrow_path(top_left, size, *heading_deg) {
                            self.fill_and_stroke(canvas, &path);
                        }
                    }
                    Marker::Image(image) => canvas.draw_image(world, image),
                }
            }
            GeometryKind::LineString(coords) => {
                if let Some(path) = Self::path_through(canvas, coords, false) {
                    canvas.stroke_path(&path, &solid(self.style.pen), self.style.pen_width);
                }
            }
            GeometryKind::Polygon(coords) => {
                if let Some(path) = Self::path_through(canvas, coords, true) {
                    self.fill_and_stroke(canvas, &path);
                }
            }
            GeometryKind::Ellipse { .. } => {
                let outline = self.ellipse_outline();
                if let Some(path) = Self::path_through(canvas, &outline, true) {
                    self.fill_and_stroke(canvas, &path);
                }
            }
        }
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }

    fn bounding_box(&self, viewport: &Viewport) -> BoundingBox {
        match &self.kind {
            GeometryKind::Point { .. } => match self.marker_rect(viewport) {
                Some((top_left, size)) => BoundingBox::new(
                    projection::viewport_px_to_geo(viewport, top_left),
                    projection::viewport_px_to_geo(viewport, top_left + size),
                ),
                None => BoundingBox::default(),
            },
            GeometryKind::LineString(coords) | GeometryKind::Polygon(coords) => {
                BoundingBox::enclosing(coords).unwrap_or_default()
            }
            GeometryKind::Ellipse {
                center,
                semi_major_m,
                semi_minor_m,
                ..
            } => {
                let r = semi_major_m.max(*semi_minor_m);
                let north = geo::destination_point(center, r, 0.0);
                let east = geo::destination_point(center, r, 90.0);
                let south = geo::destination_point(center, r, 180.0);
                let west = geo::destination_point(center, r, 270.0);
                BoundingBox::from_edges(
                    west.longitude,
                    south.latitude,
                    east.longitude,
                    north.latitude,
                )
            }
        }
    }
}

/// Arrowhead filling a `size` rect at `top_left`, rotated about its centre.
/// Pixel y grows downwards, so a positive angle turns clockwise.
fn arrow_path(top_left: DVec2, size: DVec2, heading_deg: f64) -> Option<tiny_skia::Path> {
    let half = size / 2.0;
    let turn = DVec2::from_angle(heading_deg.to_radians());
    let corners = [
        DVec2::new(0.0, -half.y),
        DVec2::new(half.x, half.y),
        DVec2::ZERO,
        DVec2::new(-half.x, half.y),
    ]
    .map(|v| top_left + half + turn.rotate(v));

    let mut pb = PathBuilder::new();
    pb.move_to(corners[0].x as f32, corners[0].y as f32);
    for c in &corners[1..] {
        pb.line_to(c.x as f32, c.y as f32);
    }
    pb.close();
    pb.finish()
}

/// Consecutive vertex pairs of a ring, including the closing edge
fn ring_edges(
    coords: &[GeoCoordinate],
) -> impl Iterator<Item = (&GeoCoordinate, &GeoCoordinate)> {
    let closing = coords.last().zip(coords.first());
    coords
        .windows(2)
        .map(|w| (&w[0], &w[1]))
        .chain(closing)
}

/// Even-odd ray cast
fn polygon_contains(ring: &[GeoCoordinate], p: &GeoCoordinate) -> bool {
    let mut inside = false;
    for (a, b) in ring_edges(ring) {
        if (a.latitude > p.latitude) != (b.latitude > p.latitude) {
            let t = (p.latitude - a.latitude) / (b.latitude - a.latitude);
            let x = a.longitude + t * (b.longitude - a.longitude);
            if p.longitude < x {
                inside = !inside;
            }
        }
    }
    inside
}

/// Liang-Barsky clip of segment `a`-`b` against `area`
fn segment_intersects_box(a: &GeoCoordinate, b: &GeoCoordinate, area: &BoundingBox) -> bool {
    let dx = b.longitude - a.longitude;
    let dy = b.latitude - a.latitude;
    let checks = [
        (-dx, a.longitude - area.left()),
        (dx, area.right() - a.longitude),
        (-dy, a.latitude - area.bottom()),
        (dy, area.top() - a.latitude),
    ];

    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in checks {
        if p == 0.0 {
            if q < 0.0 {
                return false;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                t0 = t0.max(r);
            } else {
                t1 = t1.min(r);
            }
            if t0 > t1 {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::ProjectionKind;
    use glam::UVec2;

    fn viewport(zoom: u8) -> Viewport {
        let mut vp = Viewport::new(
            UVec2::new(512, 512),
            ProjectionKind::SphericalMercator,
            UVec2::splat(256),
        );
        vp.set_zoom(zoom);
        vp
    }

    #[test]
    fn test_point_bbox_grows_when_zoomed_out() {
        let point = Geometry::point(GeoCoordinate::new(10.0, 10.0), 10.0);
        let near = point.bounding_box(&viewport(10));
        let far = point.bounding_box(&viewport(2));
        assert!(near.contains(&GeoCoordinate::new(10.0, 10.0)));
        assert!(far.width() > near.width());
    }

    #[test]
    fn test_point_alignment() {
        let vp = viewport(4);
        let at = GeoCoordinate::new(0.0, 0.0);
        let tl = Geometry::point(at, 10.0).with_alignment(Alignment::TopLeft);
        let bbox = tl.bounding_box(&vp);
        assert!((bbox.left() - at.longitude).abs() < 1e-9);
        assert!((bbox.top() - at.latitude).abs() < 1e-9);
    }

    #[test]
    fn test_line_touches_crossing_box() {
        let line = Geometry::line_string(vec![
            GeoCoordinate::new(-10.0, 0.0),
            GeoCoordinate::new(10.0, 0.0),
        ]);
        let vp = viewport(3);
        assert!(line.touches(&BoundingBox::from_edges(-1.0, -1.0, 1.0, 1.0), &vp));
        assert!(!line.touches(&BoundingBox::from_edges(-1.0, 2.0, 1.0, 3.0), &vp));
    }

    #[test]
    fn test_polygon_touches_interior_click() {
        let square = Geometry::polygon(vec![
            GeoCoordinate::new(0.0, 0.0),
            GeoCoordinate::new(10.0, 0.0),
            GeoCoordinate::new(10.0, 10.0),
            GeoCoordinate::new(0.0, 10.0),
        ]);
        let vp = viewport(3);
        assert!(square.touches(&BoundingBox::from_edges(4.9, 4.9, 5.1, 5.1), &vp));
        assert!(!square.touches(&BoundingBox::from_edges(20.0, 20.0, 21.0, 21.0), &vp));
    }

    #[test]
    fn test_ellipse_bbox_covers_axes() {
        let center = GeoCoordinate::new(5.0, 45.0);
        let ellipse = Geometry::ellipse(center, 10_000.0, 5_000.0, 30.0);
        let bbox = ellipse.bounding_box(&viewport(8));
        assert!(bbox.contains(&center));
        for c in ellipse.ellipse_outline() {
            assert!(bbox.expanded(1e-9, 1e-9).contains(&c));
        }
    }

    fn paint(geometry: &Geometry, vp: &Viewport) -> Pixmap {
        let size = vp.size_px();
        let mut pixmap = Pixmap::new(size.x, size.y).unwrap();
        let origin = vp.to_world_px(ViewportPixel::new(0.0, 0.0));
        let mut canvas = FrameCanvas::new(&mut pixmap, origin, vp);
        geometry.draw(&mut canvas, &vp.visible_world_rect());
        pixmap
    }

    fn painted(pixmap: &Pixmap, x: u32, y: u32) -> bool {
        pixmap.pixel(x, y).unwrap().alpha() > 0
    }

    #[test]
    fn test_arrow_points_along_heading() {
        let vp = viewport(4);
        let at = GeoCoordinate::new(0.0, 0.0);

        // 40px arrow centred on pixel (256, 256)
        let north = paint(&Geometry::arrow(at, 40.0, 0.0), &vp);
        assert!(painted(&north, 256, 244));
        assert!(!painted(&north, 272, 256));

        let east = paint(&Geometry::arrow(at, 40.0, 90.0), &vp);
        assert!(painted(&east, 268, 256));
        assert!(!painted(&east, 256, 240));
    }

    #[test]
    fn test_image_marker_is_blitted_at_anchor() {
        let vp = viewport(4);
        let mut icon = Pixmap::new(10, 10).unwrap();
        icon.fill(Color::from_rgba8(0, 200, 0, 255));
        let marker = Geometry::image(GeoCoordinate::new(0.0, 0.0), Arc::new(icon))
            .with_alignment(Alignment::TopLeft);
        assert_eq!(marker.marker_reach_px(), 200f64.sqrt());

        let pixmap = paint(&marker, &vp);
        let px = pixmap.pixel(260, 260).unwrap();
        assert_eq!((px.red(), px.green(), px.alpha()), (0, 200, 255));
        assert!(!painted(&pixmap, 250, 250));
        assert!(!painted(&pixmap, 267, 267));
    }

    #[test]
    fn test_zoom_range_normalised() {
        let g = Geometry::point(GeoCoordinate::default(), 4.0).with_zoom_range(9, 3);
        assert!(g.in_zoom_range(3) && g.in_zoom_range(9));
        assert!(!g.in_zoom_range(10));
    }

    #[test]
    fn test_visibility_toggle() {
        let g = Geometry::point(GeoCoordinate::default(), 4.0);
        assert!(g.is_visible());
        g.set_visible(false);
        assert!(!g.is_visible());
    }
}
