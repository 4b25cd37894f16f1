use super::pixel::WorldPixel;
use super::projection;
use super::viewport::Viewport;
use crate::geo::GeoCoordinate;
use tiny_skia::{FillRule, Paint, Path, Pixmap, PixmapPaint, Stroke, Transform};

/// Offscreen drawing target addressed in world pixels.
///
/// `origin` is the world pixel that lands on the pixmap's top-left corner.
pub struct FrameCanvas<'a> {
    pixmap: &'a mut Pixmap,
    origin: WorldPixel,
    viewport: &'a Viewport,
}

impl<'a> FrameCanvas<'a> {
    pub fn new(pixmap: &'a mut Pixmap, origin: WorldPixel, viewport: &'a Viewport) -> Self {
        Self {
            pixmap,
            origin,
            viewport,
        }
    }

    /// Snapshot this frame is drawn for
    pub fn viewport(&self) -> &Viewport {
        self.viewport
    }

    pub fn origin(&self) -> WorldPixel {
        self.origin
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// World pixel to pixmap pixel
    #[inline]
    pub fn to_canvas(&self, px: WorldPixel) -> (f32, f32) {
        let d = px - self.origin;
        (d.x as f32, d.y as f32)
    }

    #[inline]
    pub fn geo_to_canvas(&self, coord: &GeoCoordinate) -> (f32, f32) {
        self.to_canvas(projection::to_world_px(self.viewport, coord))
    }

    pub fn fill_path(&mut self, path: &Path, paint: &Paint) {
        self.pixmap
            .fill_path(path, paint, FillRule::EvenOdd, Transform::identity(), None);
    }

    pub fn stroke_path(&mut self, path: &Path, paint: &Paint, width: f32) {
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(path, paint, &stroke, Transform::identity(), None);
    }

    /// Blit an image with its top-left corner at a world pixel
    pub fn draw_image(&mut self, at: WorldPixel, image: &Pixmap) {
        let (x, y) = self.to_canvas(at);
        self.pixmap.draw_pixmap(
            x.round() as i32,
            y.round() as i32,
            image.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }
}
