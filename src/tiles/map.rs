use super::{TileCache, TileKey, TileSource};
use crate::geo::BoundingBox;
use crate::map::projection::{tile_count_x, tile_count_y};
use crate::map::{Drawable, FrameCanvas, Viewport, WorldPixel};
use glam::DVec2;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

/// Inclusive range of tile indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl TileRange {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        (self.x_min..=self.x_max).contains(&x) && (self.y_min..=self.y_max).contains(&y)
    }

    pub fn tile_count(&self) -> usize {
        ((self.x_max - self.x_min + 1) * (self.y_max - self.y_min + 1)) as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.y_min..=self.y_max).flat_map(move |y| (self.x_min..=self.x_max).map(move |x| (x, y)))
    }
}

/// Tiles overlapping a world-pixel rectangle, grown by `margin` tiles on
/// each side and clipped to the world. `None` if nothing remains.
pub fn tiles_covering(
    viewport: &Viewport,
    origin: WorldPixel,
    size: DVec2,
    margin: i64,
) -> Option<TileRange> {
    let tile = viewport.tile_size_px().as_dvec2();
    let count_x = tile_count_x(viewport) as i64;
    let count_y = tile_count_y(viewport) as i64;
    if size.x <= 0.0 || size.y <= 0.0 || count_x == 0 || count_y == 0 {
        return None;
    }

    let first = (origin.0 / tile).floor();
    let last = ((origin.0 + size) / tile).ceil() - DVec2::ONE;

    let x_min = (first.x as i64 - margin).max(0);
    let y_min = (first.y as i64 - margin).max(0);
    let x_max = (last.x as i64 + margin).min(count_x - 1);
    let y_max = (last.y as i64 + margin).min(count_y - 1);
    if x_min > x_max || y_min > y_max {
        return None;
    }

    Some(TileRange {
        x_min: x_min as u32,
        y_min: y_min as u32,
        x_max: x_max as u32,
        y_max: y_max as u32,
    })
}

/// Base layer painting raster tiles from a [`TileSource`] through a
/// [`TileCache`]. Also warms the cache with the ring of tiles around the
/// drawn area.
pub struct TileMap {
    source: TileSource,
    cache: TileCache,
    visible: AtomicBool,
}

impl TileMap {
    pub fn new(source: TileSource, cache: TileCache) -> Self {
        Self {
            source,
            cache,
            visible: AtomicBool::new(true),
        }
    }

    pub fn source(&self) -> &TileSource {
        &self.source
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Relaxed);
    }

    fn key(&self, viewport: &Viewport, x: u32, y: u32) -> TileKey {
        let size = viewport.tile_size_px();
        TileKey::new(self.source.tile_url(x, y, viewport.zoom()), size.x, size.y)
    }
}

impl Drawable for TileMap {
    fn draw(&self, canvas: &mut FrameCanvas<'_>, _rect: &BoundingBox) {
        let viewport = canvas.viewport().clone();
        if !self.source.supports(viewport.projection()) {
            return;
        }

        let origin = canvas.origin();
        let size = DVec2::new(canvas.width() as f64, canvas.height() as f64);
        let Some(visible) = tiles_covering(&viewport, origin, size, 0) else {
            return;
        };

        let tile = viewport.tile_size_px().as_dvec2();
        for (x, y) in visible.iter() {
            let image = self.cache.get_image(&self.key(&viewport, x, y));
            if let Some(pixmap) = &image.pixmap {
                let at = WorldPixel(DVec2::new(x as f64, y as f64) * tile);
                canvas.draw_image(at, pixmap);
            }
        }

        if let Some(ring) = tiles_covering(&viewport, origin, size, 1) {
            let mut warmed = 0usize;
            for (x, y) in ring.iter().filter(|&(x, y)| !visible.contains(x, y)) {
                self.cache.prefetch(&self.key(&viewport, x, y));
                warmed += 1;
            }
            trace!(
                zoom = viewport.zoom(),
                drawn = visible.tile_count(),
                prefetched = warmed,
                "Tiles requested"
            );
        }
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }

    fn bounding_box(&self, _viewport: &Viewport) -> BoundingBox {
        BoundingBox::world()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::map::ProjectionKind;
    use crate::tiles::{FetchFuture, TileFetcher};
    use glam::UVec2;
    use std::sync::Arc;
    use std::time::Duration;
    use tiny_skia::Pixmap;

    /// Never answers, so every requested tile stays in flight
    struct Silent;

    impl TileFetcher for Silent {
        fn fetch(&self, _url: &str) -> FetchFuture {
            Box::pin(std::future::pending::<Result<Vec<u8>, FetchError>>())
        }
    }

    fn viewport(projection: ProjectionKind, zoom: u8) -> Viewport {
        let mut vp = Viewport::new(UVec2::new(256, 256), projection, UVec2::new(256, 256));
        vp.set_zoom(zoom);
        vp
    }

    fn draw(map: &TileMap, vp: &Viewport) {
        let mut pixmap = Pixmap::new(256, 256).unwrap();
        let origin = WorldPixel(vp.focus_world_px().0 - DVec2::splat(128.0));
        let mut canvas = FrameCanvas::new(&mut pixmap, origin, vp);
        map.draw(&mut canvas, &BoundingBox::world());
    }

    #[test]
    fn test_covering_clips_to_world() {
        let vp = viewport(ProjectionKind::SphericalMercator, 1);
        let range = tiles_covering(&vp, WorldPixel::new(-100.0, -100.0), DVec2::splat(1000.0), 1)
            .unwrap();
        assert_eq!((range.x_min, range.y_min, range.x_max, range.y_max), (0, 0, 1, 1));
    }

    #[test]
    fn test_covering_exact_tile() {
        let vp = viewport(ProjectionKind::SphericalMercator, 3);
        let range = tiles_covering(&vp, WorldPixel::new(512.0, 256.0), DVec2::splat(256.0), 0)
            .unwrap();
        assert_eq!(range.tile_count(), 1);
        assert!(range.contains(2, 1));
    }

    #[test]
    fn test_covering_outside_world() {
        let vp = viewport(ProjectionKind::SphericalMercator, 0);
        let outside = tiles_covering(&vp, WorldPixel::new(1000.0, 0.0), DVec2::splat(100.0), 0);
        assert!(outside.is_none());
    }

    #[test]
    fn test_draw_requests_visible_and_ring() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let cache = TileCache::with_parts(
            Arc::new(Silent),
            None,
            Duration::from_secs(30),
            rt.handle().clone(),
        );
        let map = TileMap::new(TileSource::openstreetmap(), cache.clone());

        // World is 2048px, the canvas covers tiles 3..=4 on both axes
        draw(&map, &viewport(ProjectionKind::SphericalMercator, 3));
        assert_eq!(cache.stats().fetches_started, 16);

        // Second frame finds everything already in flight
        draw(&map, &viewport(ProjectionKind::SphericalMercator, 3));
        assert_eq!(cache.stats().fetches_started, 16);
        cache.abort_all();
    }

    #[test]
    fn test_unsupported_projection_draws_nothing() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let cache = TileCache::with_parts(
            Arc::new(Silent),
            None,
            Duration::from_secs(30),
            rt.handle().clone(),
        );
        let map = TileMap::new(TileSource::openstreetmap(), cache.clone());

        draw(&map, &viewport(ProjectionKind::Equirectangular, 2));
        assert_eq!(cache.stats().fetches_started, 0);
    }
}
