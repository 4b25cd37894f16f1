use super::canvas::FrameCanvas;
use super::geometry::{Drawable, Geometry};
use super::pixel::ViewportPixel;
use super::projection;
use super::renderer::RedrawSignal;
use super::spatial::Quadtree;
use super::viewport::Viewport;
use crate::geo::BoundingBox;
use glam::DVec2;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Leaf capacity for the per-layer point index
const POINT_CAPACITY: usize = 50;

/// A named stack entry: tiles and other drawables plus vector geometries.
///
/// Point geometries are indexed in a quadtree guarded by a reader-writer
/// lock; everything else is a flat list culled by bounding box.
pub struct Layer {
    name: String,
    visible: AtomicBool,
    zoom_min: AtomicU8,
    zoom_max: AtomicU8,
    mouse_events: AtomicBool,
    drawables: RwLock<Vec<Arc<dyn Drawable>>>,
    points: RwLock<Quadtree<Arc<Geometry>>>,
    fixed: RwLock<Vec<Arc<Geometry>>>,
    /// Largest marker reach among the points, as f64 bits. Only grows
    /// until `clear`; non-negative floats order the same as their bits.
    marker_reach: AtomicU64,
    signal: RwLock<Option<RedrawSignal>>,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: AtomicBool::new(true),
            zoom_min: AtomicU8::new(0),
            zoom_max: AtomicU8::new(u8::MAX),
            mouse_events: AtomicBool::new(true),
            drawables: RwLock::new(Vec::new()),
            points: RwLock::new(Quadtree::world(POINT_CAPACITY)),
            fixed: RwLock::new(Vec::new()),
            marker_reach: AtomicU64::new(0),
            signal: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn attach(&self, signal: RedrawSignal) {
        *self.signal.write() = Some(signal);
    }

    fn request_redraw(&self) {
        if let Some(signal) = self.signal.read().as_ref() {
            signal.request();
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }

    pub fn set_visible(&self, visible: bool) {
        if self.visible.swap(visible, Ordering::Relaxed) != visible {
            self.request_redraw();
        }
    }

    pub fn set_zoom_range(&self, min: u8, max: u8) {
        self.zoom_min.store(min.min(max), Ordering::Relaxed);
        self.zoom_max.store(min.max(max), Ordering::Relaxed);
        self.request_redraw();
    }

    /// Visible and inside its zoom range
    pub fn is_visible_at(&self, zoom: u8) -> bool {
        self.is_visible()
            && zoom >= self.zoom_min.load(Ordering::Relaxed)
            && zoom <= self.zoom_max.load(Ordering::Relaxed)
    }

    pub fn set_mouse_events(&self, enabled: bool) {
        self.mouse_events.store(enabled, Ordering::Relaxed);
    }

    pub fn add_drawable(&self, drawable: Arc<dyn Drawable>) {
        self.drawables.write().push(drawable);
        self.request_redraw();
    }

    /// Returns false for a point outside the index boundary
    pub fn add_geometry(&self, geometry: Arc<Geometry>) -> bool {
        let added = match geometry.anchor() {
            Some(coord) => {
                let reach = geometry.marker_reach_px();
                let added = self.points.write().insert(coord, geometry);
                if added {
                    self.marker_reach.fetch_max(reach.to_bits(), Ordering::Relaxed);
                }
                added
            }
            None => {
                self.fixed.write().push(geometry);
                true
            }
        };
        if added {
            self.request_redraw();
        }
        added
    }

    pub fn remove_geometry(&self, geometry: &Arc<Geometry>) -> bool {
        let removed = match geometry.anchor() {
            Some(coord) => self.points.write().erase(&coord, geometry) > 0,
            None => {
                let mut fixed = self.fixed.write();
                let before = fixed.len();
                fixed.retain(|g| !Arc::ptr_eq(g, geometry));
                fixed.len() != before
            }
        };
        if removed {
            self.request_redraw();
        }
        removed
    }

    pub fn clear(&self) {
        self.points.write().clear();
        self.fixed.write().clear();
        self.drawables.write().clear();
        self.marker_reach.store(0, Ordering::Relaxed);
        self.request_redraw();
    }

    pub fn geometry_count(&self) -> usize {
        self.points.read().len() + self.fixed.read().len()
    }

    fn marker_reach_px(&self) -> f64 {
        f64::from_bits(self.marker_reach.load(Ordering::Relaxed))
    }

    /// Geometries whose anchor or extent falls inside `range`
    pub fn visible_geometries(
        &self,
        range: &BoundingBox,
        viewport: &Viewport,
    ) -> Vec<Arc<Geometry>> {
        let mut out = self.points.read().query(range);
        out.extend(
            self.fixed
                .read()
                .iter()
                .filter(|g| g.bounding_box(viewport).intersects(range))
                .cloned(),
        );
        out.retain(|g| g.is_visible() && g.in_zoom_range(viewport.zoom()));
        out
    }

    /// Paint drawables first, then geometries, into the frame canvas
    pub fn paint(&self, canvas: &mut FrameCanvas<'_>, rect: &BoundingBox) {
        let viewport = canvas.viewport().clone();
        if !self.is_visible_at(viewport.zoom()) {
            return;
        }

        let drawables = self.drawables.read().clone();
        for drawable in drawables.iter().filter(|d| d.is_visible()) {
            drawable.draw(canvas, rect);
        }

        for geometry in self.visible_geometries(rect, &viewport) {
            geometry.draw(canvas, rect);
        }
    }

    /// Geometries under a viewport pixel, within `fuzz_px` pixels.
    ///
    /// Points are indexed by anchor, so the index query is widened by the
    /// largest marker reach and the exact test is left to `touches`.
    pub fn hit_test(
        &self,
        viewport: &Viewport,
        px: ViewportPixel,
        fuzz_px: f64,
    ) -> Vec<Arc<Geometry>> {
        if !self.mouse_events.load(Ordering::Relaxed) || !self.is_visible_at(viewport.zoom()) {
            return Vec::new();
        }

        let pixel_box = |pad: f64| {
            BoundingBox::new(
                projection::viewport_px_to_geo(viewport, px + DVec2::splat(-pad)),
                projection::viewport_px_to_geo(viewport, px + DVec2::splat(pad)),
            )
        };
        let area = pixel_box(fuzz_px);
        let search = pixel_box(fuzz_px + self.marker_reach_px());

        let hits: Vec<_> = self
            .visible_geometries(&search, viewport)
            .into_iter()
            .filter(|g| g.touches(&area, viewport))
            .collect();
        debug!(layer = %self.name, hits = hits.len(), "Hit test");
        hits
    }
}

/// Ordered layer stack, bottom first.
pub struct LayerManager {
    layers: RwLock<Vec<Arc<Layer>>>,
    signal: RedrawSignal,
}

impl LayerManager {
    pub fn new(signal: RedrawSignal) -> Self {
        Self {
            layers: RwLock::new(Vec::new()),
            signal,
        }
    }

    pub fn signal(&self) -> &RedrawSignal {
        &self.signal
    }

    /// Insert at `index` (or on top). A layer with the same name is replaced.
    pub fn add(&self, layer: Arc<Layer>, index: Option<usize>) {
        layer.attach(self.signal.clone());
        {
            let mut layers = self.layers.write();
            layers.retain(|l| l.name() != layer.name());
            let at = index.unwrap_or(layers.len()).min(layers.len());
            layers.insert(at, layer);
        }
        self.signal.request();
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Layer>> {
        let removed = {
            let mut layers = self.layers.write();
            let pos = layers.iter().position(|l| l.name() == name)?;
            layers.remove(pos)
        };
        self.signal.request();
        Some(removed)
    }

    pub fn layer(&self, name: &str) -> Option<Arc<Layer>> {
        self.layers.read().iter().find(|l| l.name() == name).cloned()
    }

    /// Snapshot of the stack, bottom first
    pub fn layers(&self) -> Vec<Arc<Layer>> {
        self.layers.read().clone()
    }

    /// Hit test every layer, topmost results first
    pub fn hit_test(
        &self,
        viewport: &Viewport,
        px: ViewportPixel,
        fuzz_px: f64,
    ) -> Vec<Arc<Geometry>> {
        self.layers()
            .iter()
            .rev()
            .flat_map(|l| l.hit_test(viewport, px, fuzz_px))
            .collect()
    }
}
