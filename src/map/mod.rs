//! Map core: projections, the viewport and its controller with kinetic
//! scrolling, spatial indexing, drawables and the background frame renderer.

mod canvas;
mod controller;
mod geometry;
mod inertia;
mod layer;
mod pixel;
pub mod projection;
mod renderer;
pub mod spatial;
mod viewport;

pub use canvas::FrameCanvas;
pub use controller::ViewportController;
pub use geometry::{Alignment, Drawable, Geometry, GeometryKind, Marker, Style};
pub use inertia::{Inertia, KineticState, INERTIA_TICK};
pub use layer::{Layer, LayerManager};
pub use pixel::{ViewportPixel, WorldPixel};
pub use projection::{Projection, ProjectionKind};
pub use renderer::{
    drawing_origin, drawing_rect_world_coord, drawing_size_px, frame_offset, process_pending,
    render_frame, Frame, FrameBuffer, FrameSurface, RedrawSignal, RenderScheduler,
};
pub use spatial::Quadtree;
pub use viewport::{Viewport, ViewportSource};
