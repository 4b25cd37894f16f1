//! Map configuration.
//!
//! Every section has working defaults, so an empty JSON object (or no file
//! at all) yields an OpenStreetMap view in spherical Mercator.

use crate::error::ConfigError;
use crate::map::ProjectionKind;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TILE_URL: &str = "http://tile.openstreetmap.org/%zoom/%x/%y.png";
pub const DEFAULT_USER_AGENT: &str = concat!("mapview/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub viewport: ViewportConfig,
    pub tiles: TileCacheConfig,
    pub source: TileSourceConfig,
    pub scheduler: SchedulerConfig,
    /// Directory scanned for GeoJSON overlays
    pub data_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
    pub projection: ProjectionKind,
    pub tile_width: u32,
    pub tile_height: u32,
    pub zoom_min: u8,
    pub zoom_max: u8,
    pub zoom: u8,
    pub focus_lon: f64,
    pub focus_lat: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            projection: ProjectionKind::SphericalMercator,
            tile_width: 256,
            tile_height: 256,
            zoom_min: 0,
            zoom_max: 18,
            zoom: 2,
            focus_lon: 0.0,
            focus_lat: 20.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TileCacheConfig {
    /// How long a failed tile keeps its failed placeholder before a retry
    pub failed_expiry_secs: u64,
    /// Flat directory for the persistent tile cache. `None` keeps tiles in memory only.
    pub cache_dir: Option<PathBuf>,
    /// Age after which a persisted tile is discarded. `None` means never.
    pub max_age_minutes: Option<u64>,
    pub user_agent: String,
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            failed_expiry_secs: 30,
            cache_dir: None,
            max_age_minutes: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl TileCacheConfig {
    pub fn failed_expiry(&self) -> Duration {
        Duration::from_secs(self.failed_expiry_secs)
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_minutes.map(|m| Duration::from_secs(m * 60))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TileSourceConfig {
    /// URL with `%x`, `%y` and `%zoom` placeholders
    pub url_template: String,
    pub zoom_offset: i32,
    /// Count zoom levels down from `inversion_base` instead of up from zero
    pub inverted_zoom: bool,
    pub inversion_base: i32,
    pub projections: Vec<ProjectionKind>,
}

impl Default for TileSourceConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_TILE_URL.to_string(),
            zoom_offset: 0,
            inverted_zoom: false,
            inversion_base: 17,
            projections: vec![ProjectionKind::SphericalMercator],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_ms: u64,
    /// Offscreen buffer size as a multiple of the viewport size
    pub buffer_scale: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            buffer_scale: 2,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl MapConfig {
    /// Read and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut bytes = fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: MapConfig =
            simd_json::serde::from_slice(&mut bytes).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Fix what can be fixed, reject what cannot
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let vp = &mut self.viewport;
        if vp.zoom_min > vp.zoom_max {
            std::mem::swap(&mut vp.zoom_min, &mut vp.zoom_max);
        }
        if vp.tile_width == 0 || vp.tile_height == 0 {
            return Err(ConfigError::InvalidTileSize {
                width: vp.tile_width,
                height: vp.tile_height,
            });
        }
        self.scheduler.buffer_scale = self.scheduler.buffer_scale.max(1);
        Ok(())
    }
}
