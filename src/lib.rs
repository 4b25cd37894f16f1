//! Embeddable slippy-map core.
//!
//! Geographic coordinates are projected into world pixels at a zoom level,
//! a [`ViewportController`](map::ViewportController) owns the visible area,
//! layers of drawables are composed off the UI thread by a
//! [`RenderScheduler`](map::RenderScheduler), and raster tiles come from a
//! [`TileCache`](tiles::TileCache) backed by memory, disk and HTTP.

pub mod config;
pub mod data;
pub mod error;
pub mod geo;
pub mod logging;
pub mod map;
pub mod tiles;

pub use config::MapConfig;
pub use error::{CacheError, ConfigError, FetchError, ViewportError};
pub use geo::{BoundingBox, GeoCoordinate};
