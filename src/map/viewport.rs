use super::pixel::{ViewportPixel, WorldPixel};
use super::projection::{self, ProjectionKind};
use crate::geo::{BoundingBox, GeoCoordinate};
use glam::{DVec2, UVec2};
use parking_lot::RwLock;
use std::sync::Arc;

/// The visible map area: size, projection, tile size, zoom and focus point.
///
/// A `Viewport` is a plain value. Renderers clone one snapshot per frame
/// and never observe a half-applied mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    size_px: UVec2,
    projection: ProjectionKind,
    tile_size_px: UVec2,
    zoom: u8,
    focus: GeoCoordinate,
}

impl Viewport {
    pub fn new(size_px: UVec2, projection: ProjectionKind, tile_size_px: UVec2) -> Self {
        Self {
            size_px,
            projection,
            tile_size_px,
            zoom: 0,
            focus: GeoCoordinate::default(),
        }
    }

    pub fn size_px(&self) -> UVec2 {
        self.size_px
    }

    /// Centre of the visible area in viewport pixels
    pub fn center_px(&self) -> ViewportPixel {
        ViewportPixel(self.size_px.as_dvec2() / 2.0)
    }

    pub fn projection(&self) -> ProjectionKind {
        self.projection
    }

    pub fn tile_size_px(&self) -> UVec2 {
        self.tile_size_px
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Geographic coordinate in the centre of the viewport
    pub fn focus(&self) -> GeoCoordinate {
        self.focus
    }

    pub fn focus_world_px(&self) -> WorldPixel {
        projection::to_world_px(self, &self.focus)
    }

    /// World pixel under a viewport pixel, for an explicit focus pixel
    #[inline]
    pub fn to_world_px_from(&self, focus_px: WorldPixel, px: ViewportPixel) -> WorldPixel {
        focus_px + (px - self.center_px())
    }

    /// Viewport pixel of a world pixel, for an explicit focus pixel
    #[inline]
    pub fn to_viewport_px_from(&self, focus_px: WorldPixel, px: WorldPixel) -> ViewportPixel {
        self.center_px() + (px - focus_px)
    }

    pub fn to_world_px(&self, px: ViewportPixel) -> WorldPixel {
        self.to_world_px_from(self.focus_world_px(), px)
    }

    pub fn to_viewport_px(&self, px: WorldPixel) -> ViewportPixel {
        self.to_viewport_px_from(self.focus_world_px(), px)
    }

    /// Visible area in world pixels as (top-left, bottom-right)
    pub fn visible_world_px_rect(&self) -> (WorldPixel, WorldPixel) {
        self.world_px_rect_for(self.focus_world_px())
    }

    pub(crate) fn world_px_rect_for(&self, focus_px: WorldPixel) -> (WorldPixel, WorldPixel) {
        let top_left = self.to_world_px_from(focus_px, ViewportPixel::new(0.0, 0.0));
        let bottom_right = self.to_world_px_from(focus_px, ViewportPixel(self.size_px.as_dvec2()));
        (top_left, bottom_right)
    }

    /// Visible area in geographic coordinates
    pub fn visible_world_rect(&self) -> BoundingBox {
        self.world_rect_for(self.focus_world_px())
    }

    pub(crate) fn world_rect_for(&self, focus_px: WorldPixel) -> BoundingBox {
        let (top_left, bottom_right) = self.world_px_rect_for(focus_px);
        BoundingBox::new(
            projection::to_geo(self, top_left),
            projection::to_geo(self, bottom_right),
        )
    }

    /// Translate a world-pixel rect given by its corners into geographic coordinates
    pub fn world_px_rect_to_geo(&self, top_left: WorldPixel, size: DVec2) -> BoundingBox {
        BoundingBox::new(
            projection::to_geo(self, top_left),
            projection::to_geo(self, top_left + size),
        )
    }

    pub(crate) fn set_size(&mut self, size_px: UVec2) {
        self.size_px = size_px;
    }

    pub(crate) fn set_projection(&mut self, projection: ProjectionKind) {
        self.projection = projection;
    }

    pub(crate) fn set_tile_size(&mut self, tile_size_px: UVec2) {
        self.tile_size_px = tile_size_px;
    }

    pub(crate) fn set_zoom(&mut self, zoom: u8) {
        self.zoom = zoom;
    }

    pub(crate) fn set_focus(&mut self, focus: GeoCoordinate) {
        self.focus = focus;
    }
}

/// Shared handle to the latest committed viewport.
///
/// The controller publishes after every mutation; readers take a full
/// snapshot under one read lock.
#[derive(Clone)]
pub struct ViewportSource {
    current: Arc<RwLock<Viewport>>,
}

impl ViewportSource {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            current: Arc::new(RwLock::new(viewport)),
        }
    }

    pub fn snapshot(&self) -> Viewport {
        self.current.read().clone()
    }

    pub(crate) fn publish(&self, viewport: &Viewport) {
        self.current.write().clone_from(viewport);
    }
}
