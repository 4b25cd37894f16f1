use super::canvas::FrameCanvas;
use super::layer::{Layer, LayerManager};
use super::pixel::WorldPixel;
use super::viewport::{Viewport, ViewportSource};
use crate::config::SchedulerConfig;
use crate::geo::BoundingBox;
use glam::{DVec2, UVec2};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tiny_skia::Pixmap;
use tracing::{debug, info, trace};

/// Shared "something changed" flag.
///
/// Any number of `request` calls between two `take` calls collapse into a
/// single pending redraw.
#[derive(Clone, Default)]
pub struct RedrawSignal {
    inner: Arc<SignalState>,
}

#[derive(Default)]
struct SignalState {
    pending: AtomicBool,
    requests: AtomicU64,
}

impl RedrawSignal {
    pub fn request(&self) {
        self.inner.requests.fetch_add(1, Ordering::Relaxed);
        self.inner.pending.store(true, Ordering::Release);
    }

    /// Clear and return the pending flag
    pub fn take(&self) -> bool {
        self.inner.pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Total requests ever made
    pub fn requests(&self) -> u64 {
        self.inner.requests.load(Ordering::Relaxed)
    }
}

/// A composed offscreen image and the part of the world it shows.
pub struct Frame {
    pub pixmap: Pixmap,
    /// World pixel at the pixmap's top-left corner
    pub origin: WorldPixel,
    pub world_rect: BoundingBox,
    pub zoom: u8,
    /// Snapshot the frame was drawn from
    pub viewport: Viewport,
}

/// Receiver of finished frames, typically the display surface.
pub trait FrameSurface: Send + Sync {
    fn publish_frame(&self, frame: Frame);

    /// Called on every scheduler iteration that had nothing to draw
    fn rendering_finished(&self);
}

/// Latest-frame slot. Readers get the bitmap, rect and zoom together.
#[derive(Default)]
pub struct FrameBuffer {
    latest: Mutex<Option<Arc<Frame>>>,
    published: AtomicU64,
    idle: AtomicBool,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.latest.lock().clone()
    }

    pub fn frames_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::Relaxed)
    }
}

impl FrameSurface for FrameBuffer {
    fn publish_frame(&self, frame: Frame) {
        *self.latest.lock() = Some(Arc::new(frame));
        self.published.fetch_add(1, Ordering::Relaxed);
        self.idle.store(false, Ordering::Relaxed);
    }

    fn rendering_finished(&self) {
        self.idle.store(true, Ordering::Relaxed);
    }
}

/// Offscreen buffer size: the viewport scaled up to leave a panning margin
pub fn drawing_size_px(viewport: &Viewport, scale: u32) -> UVec2 {
    viewport.size_px() * scale.max(1)
}

/// World pixel of the drawing buffer's top-left corner, centred on the focus
pub fn drawing_origin(viewport: &Viewport, scale: u32) -> WorldPixel {
    let half = drawing_size_px(viewport, scale).as_dvec2() / 2.0;
    WorldPixel((viewport.focus_world_px().0 - half).floor())
}

/// Geographic area covered by the drawing buffer
pub fn drawing_rect_world_coord(viewport: &Viewport, scale: u32) -> BoundingBox {
    let size = drawing_size_px(viewport, scale).as_dvec2();
    viewport.world_px_rect_to_geo(drawing_origin(viewport, scale), size)
}

/// Compose one frame from `layers`, bottom to top.
///
/// Returns `None` for an empty viewport.
pub fn render_frame(viewport: &Viewport, layers: &[Arc<Layer>], scale: u32) -> Option<Frame> {
    let size = drawing_size_px(viewport, scale);
    let mut pixmap = Pixmap::new(size.x, size.y)?;
    let origin = drawing_origin(viewport, scale);
    let world_rect = viewport.world_px_rect_to_geo(origin, size.as_dvec2());

    {
        let mut canvas = FrameCanvas::new(&mut pixmap, origin, viewport);
        for layer in layers.iter().filter(|l| l.is_visible_at(viewport.zoom())) {
            layer.paint(&mut canvas, &world_rect);
        }
    }

    Some(Frame {
        pixmap,
        origin,
        world_rect,
        zoom: viewport.zoom(),
        viewport: viewport.clone(),
    })
}

/// One scheduler iteration: take the pending flag and, if set, render and
/// publish a frame. Reports idle otherwise. Returns whether a frame was made.
pub fn process_pending(
    source: &ViewportSource,
    layers: &LayerManager,
    surface: &dyn FrameSurface,
    scale: u32,
) -> bool {
    if !layers.signal().take() {
        surface.rendering_finished();
        return false;
    }

    let viewport = source.snapshot();
    let started = Instant::now();
    match render_frame(&viewport, &layers.layers(), scale) {
        Some(frame) => {
            debug!(
                zoom = frame.zoom,
                width = frame.pixmap.width(),
                height = frame.pixmap.height(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Frame rendered"
            );
            surface.publish_frame(frame);
            true
        }
        None => {
            trace!("Viewport has no area, nothing to render");
            surface.rendering_finished();
            false
        }
    }
}

/// Background worker that turns redraw requests into frames.
///
/// Polls at a fixed cadence. Dropping the scheduler stops and joins the
/// worker thread.
pub struct RenderScheduler {
    shutdown: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl RenderScheduler {
    pub fn spawn(
        source: ViewportSource,
        layers: Arc<LayerManager>,
        surface: Arc<dyn FrameSurface>,
        config: &SchedulerConfig,
    ) -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let frames = Arc::new(AtomicU64::new(0));
        let poll = config.poll_interval();
        let scale = config.buffer_scale;

        let handle = {
            let shutdown = shutdown.clone();
            let frames = frames.clone();
            thread::Builder::new()
                .name("map-render".into())
                .spawn(move || {
                    info!(poll_ms = poll.as_millis() as u64, scale, "Render scheduler started");
                    run_loop(&shutdown, &frames, &source, &layers, surface.as_ref(), scale, poll);
                    info!("Render scheduler stopped");
                })?
        };

        Ok(Self {
            shutdown,
            frames,
            handle: Some(handle),
        })
    }

    /// Frames published so far
    pub fn frames_rendered(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Stop the worker and wait for it. Idempotent.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(
    shutdown: &AtomicBool,
    frames: &AtomicU64,
    source: &ViewportSource,
    layers: &LayerManager,
    surface: &dyn FrameSurface,
    scale: u32,
    poll: Duration,
) {
    while !shutdown.load(Ordering::Acquire) {
        if process_pending(source, layers, surface, scale) {
            frames.fetch_add(1, Ordering::Relaxed);
        }
        thread::park_timeout(poll);
    }
}

/// Offset in world pixels from a frame's origin to the current viewport's
/// top-left corner. Only meaningful when zooms match.
pub fn frame_offset(frame: &Frame, viewport: &Viewport) -> Option<DVec2> {
    if frame.zoom != viewport.zoom() || frame.viewport.projection() != viewport.projection() {
        return None;
    }
    let (top_left, _) = viewport.visible_world_px_rect();
    Some(top_left - frame.origin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoCoordinate;
    use crate::map::geometry::Geometry;
    use crate::map::ProjectionKind;

    fn source(w: u32, h: u32) -> ViewportSource {
        let mut vp = Viewport::new(
            UVec2::new(w, h),
            ProjectionKind::SphericalMercator,
            UVec2::splat(256),
        );
        vp.set_zoom(4);
        vp.set_focus(GeoCoordinate::new(0.0, 0.0));
        ViewportSource::new(vp)
    }

    #[test]
    fn test_requests_coalesce_into_one_frame() {
        let signal = RedrawSignal::default();
        let layers = LayerManager::new(signal.clone());
        let surface = FrameBuffer::new();
        let src = source(64, 48);

        for _ in 0..25 {
            signal.request();
        }
        assert!(process_pending(&src, &layers, &surface, 2));
        assert!(!process_pending(&src, &layers, &surface, 2));
        assert_eq!(surface.frames_published(), 1);
        assert!(surface.is_idle());
        assert_eq!(signal.requests(), 25);
    }

    #[test]
    fn test_frame_is_double_viewport_and_centred() {
        let src = source(100, 80);
        let vp = src.snapshot();
        let frame = render_frame(&vp, &[], 2).unwrap();
        assert_eq!((frame.pixmap.width(), frame.pixmap.height()), (200, 160));
        assert!(frame.world_rect.contains(&vp.focus()));
        assert!(frame.world_rect.contains_box(&vp.visible_world_rect()));

        let offset = frame_offset(&frame, &vp).unwrap();
        assert_eq!(offset, DVec2::new(50.0, 40.0));
    }

    #[test]
    fn test_layers_paint_into_frame() {
        let signal = RedrawSignal::default();
        let layers = LayerManager::new(signal.clone());
        let layer = Arc::new(Layer::new("marks"));
        layer.add_geometry(Arc::new(Geometry::point(GeoCoordinate::new(0.0, 0.0), 12.0)));
        layers.add(layer.clone(), None);

        let vp = source(64, 64).snapshot();
        let frame = render_frame(&vp, &layers.layers(), 2).unwrap();
        let center = frame.pixmap.pixel(64, 64).unwrap();
        assert!(center.alpha() > 0);
        let corner = frame.pixmap.pixel(0, 0).unwrap();
        assert_eq!(corner.alpha(), 0);

        layer.set_visible(false);
        let hidden = render_frame(&vp, &layers.layers(), 2).unwrap();
        assert_eq!(hidden.pixmap.pixel(64, 64).unwrap().alpha(), 0);
    }

    #[test]
    fn test_empty_viewport_renders_nothing() {
        let vp = source(0, 10).snapshot();
        assert!(render_frame(&vp, &[], 2).is_none());
    }

    #[test]
    fn test_scheduler_publishes_and_joins() {
        let signal = RedrawSignal::default();
        let layers = Arc::new(LayerManager::new(signal.clone()));
        let surface = Arc::new(FrameBuffer::new());
        let config = SchedulerConfig {
            poll_interval_ms: 5,
            buffer_scale: 2,
        };

        let mut scheduler =
            RenderScheduler::spawn(source(32, 32), layers, surface.clone(), &config).unwrap();
        signal.request();

        let deadline = Instant::now() + Duration::from_secs(5);
        while surface.frames_published() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(surface.frames_published(), 1);
        assert!(surface.latest().is_some());

        scheduler.shutdown();
        assert_eq!(scheduler.frames_rendered(), 1);
    }
}
