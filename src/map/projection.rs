use super::pixel::{ViewportPixel, WorldPixel};
use super::viewport::Viewport;
use crate::error::ConfigError;
use crate::geo::GeoCoordinate;
use glam::UVec2;
use serde::Deserialize;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Supported map projections. Closed set: anything else is a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum ProjectionKind {
    /// EPSG:3857, the slippy-map projection
    SphericalMercator,
    /// EPSG:4326, plate carrée
    Equirectangular,
}

impl ProjectionKind {
    pub fn epsg(self) -> u32 {
        match self {
            ProjectionKind::SphericalMercator => 3857,
            ProjectionKind::Equirectangular => 4326,
        }
    }

    pub fn from_epsg(code: u32) -> Result<Self, ConfigError> {
        match code {
            3857 => Ok(ProjectionKind::SphericalMercator),
            4326 => Ok(ProjectionKind::Equirectangular),
            other => Err(ConfigError::UnsupportedProjection(format!("EPSG:{other}"))),
        }
    }
}

impl fmt::Display for ProjectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for ProjectionKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "mercator" | "spherical-mercator" | "web-mercator" => {
                Ok(ProjectionKind::SphericalMercator)
            }
            "equirectangular" | "plate-carree" => Ok(ProjectionKind::Equirectangular),
            _ => {
                let code = lower.strip_prefix("epsg:").unwrap_or(&lower);
                code.parse::<u32>()
                    .map_err(|_| ConfigError::UnsupportedProjection(s.to_string()))
                    .and_then(ProjectionKind::from_epsg)
            }
        }
    }
}

impl TryFrom<String> for ProjectionKind {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Geographic coordinate <-> world pixel mapping at a given zoom and tile size.
pub trait Projection: Send + Sync {
    fn epsg_number(&self) -> u32;
    fn world_width_px(&self, zoom: u8, tile_size: UVec2) -> f64;
    fn world_height_px(&self, zoom: u8, tile_size: UVec2) -> f64;
    fn to_world_px(&self, zoom: u8, tile_size: UVec2, coord: &GeoCoordinate) -> WorldPixel;
    fn to_geo(&self, zoom: u8, tile_size: UVec2, px: WorldPixel) -> GeoCoordinate;
}

#[inline]
fn zoom_scale(zoom: u8) -> f64 {
    2f64.powi(zoom as i32)
}

/// Square world, latitude valid to roughly +-85.0511 degrees.
pub struct SphericalMercator;

impl Projection for SphericalMercator {
    fn epsg_number(&self) -> u32 {
        3857
    }

    fn world_width_px(&self, zoom: u8, tile_size: UVec2) -> f64 {
        zoom_scale(zoom) * tile_size.x as f64
    }

    fn world_height_px(&self, zoom: u8, tile_size: UVec2) -> f64 {
        // Square tiles are assumed by the tile scheme, height follows width
        zoom_scale(zoom) * tile_size.x as f64
    }

    fn to_world_px(&self, zoom: u8, tile_size: UVec2, coord: &GeoCoordinate) -> WorldPixel {
        let w = self.world_width_px(zoom, tile_size);
        let h = self.world_height_px(zoom, tile_size);
        let lat = coord.latitude.to_radians();

        let x = w * (coord.longitude + 180.0) / 360.0;
        let y = h * (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0;
        WorldPixel::new(x, y)
    }

    fn to_geo(&self, zoom: u8, tile_size: UVec2, px: WorldPixel) -> GeoCoordinate {
        let w = self.world_width_px(zoom, tile_size);
        let h = self.world_height_px(zoom, tile_size);

        let lon = px.x() * 360.0 / w - 180.0;
        let lat = (PI * (1.0 - 2.0 * px.y() / h)).sinh().atan().to_degrees();
        GeoCoordinate::new(lon, lat)
    }
}

/// Two-by-one world, linear in both axes.
pub struct Equirectangular;

impl Projection for Equirectangular {
    fn epsg_number(&self) -> u32 {
        4326
    }

    fn world_width_px(&self, zoom: u8, tile_size: UVec2) -> f64 {
        zoom_scale(zoom) * 2.0 * tile_size.x as f64
    }

    fn world_height_px(&self, zoom: u8, tile_size: UVec2) -> f64 {
        zoom_scale(zoom) * tile_size.y as f64
    }

    fn to_world_px(&self, zoom: u8, tile_size: UVec2, coord: &GeoCoordinate) -> WorldPixel {
        let w = self.world_width_px(zoom, tile_size);
        let h = self.world_height_px(zoom, tile_size);

        let x = (coord.longitude + 180.0) * w / 360.0;
        let y = (90.0 - coord.latitude) * h / 180.0;
        WorldPixel::new(x, y)
    }

    fn to_geo(&self, zoom: u8, tile_size: UVec2, px: WorldPixel) -> GeoCoordinate {
        let w = self.world_width_px(zoom, tile_size);
        let h = self.world_height_px(zoom, tile_size);

        let lon = px.x() * 360.0 / w - 180.0;
        let lat = 90.0 - px.y() * 180.0 / h;
        GeoCoordinate::new(lon, lat)
    }
}

static MERCATOR: SphericalMercator = SphericalMercator;
static EQUIRECTANGULAR: Equirectangular = Equirectangular;

/// Implementation for a projection kind
pub fn projection_for(kind: ProjectionKind) -> &'static dyn Projection {
    match kind {
        ProjectionKind::SphericalMercator => &MERCATOR,
        ProjectionKind::Equirectangular => &EQUIRECTANGULAR,
    }
}

pub fn world_width_px(viewport: &Viewport) -> f64 {
    projection_for(viewport.projection()).world_width_px(viewport.zoom(), viewport.tile_size_px())
}

pub fn world_height_px(viewport: &Viewport) -> f64 {
    projection_for(viewport.projection()).world_height_px(viewport.zoom(), viewport.tile_size_px())
}

pub fn to_world_px(viewport: &Viewport, coord: &GeoCoordinate) -> WorldPixel {
    projection_for(viewport.projection()).to_world_px(
        viewport.zoom(),
        viewport.tile_size_px(),
        coord,
    )
}

pub fn to_geo(viewport: &Viewport, px: WorldPixel) -> GeoCoordinate {
    projection_for(viewport.projection()).to_geo(viewport.zoom(), viewport.tile_size_px(), px)
}

/// Geographic coordinate straight to a position in the visible area
pub fn to_viewport_px(viewport: &Viewport, coord: &GeoCoordinate) -> ViewportPixel {
    viewport.to_viewport_px(to_world_px(viewport, coord))
}

pub fn viewport_px_to_geo(viewport: &Viewport, px: ViewportPixel) -> GeoCoordinate {
    to_geo(viewport, viewport.to_world_px(px))
}

/// Number of tile columns covering the world at the viewport's zoom
pub fn tile_count_x(viewport: &Viewport) -> u32 {
    (world_width_px(viewport) / viewport.tile_size_px().x as f64).ceil() as u32
}

/// Number of tile rows covering the world at the viewport's zoom
pub fn tile_count_y(viewport: &Viewport) -> u32 {
    (world_height_px(viewport) / viewport.tile_size_px().y as f64).ceil() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const TILE: UVec2 = UVec2::new(256, 256);

    fn sample_coords() -> Vec<GeoCoordinate> {
        let mut coords = Vec::new();
        let mut lon = -180.0;
        while lon <= 180.0 {
            let mut lat = -85.0;
            while lat <= 85.0 {
                coords.push(GeoCoordinate::new(lon, lat));
                lat += 8.5;
            }
            lon += 22.5;
        }
        coords.push(GeoCoordinate::new(-0.1278, 51.5074));
        coords.push(GeoCoordinate::new(151.2093, -33.8688));
        coords
    }

    #[test]
    fn test_round_trip_both_projections() {
        for kind in [ProjectionKind::SphericalMercator, ProjectionKind::Equirectangular] {
            let proj = projection_for(kind);
            for zoom in [0u8, 3, 10, 17] {
                for c in sample_coords() {
                    let back = proj.to_geo(zoom, TILE, proj.to_world_px(zoom, TILE, &c));
                    assert!(
                        (back.longitude - c.longitude).abs() < 1e-9
                            && (back.latitude - c.latitude).abs() < 1e-9,
                        "{kind} z{zoom}: {c:?} -> {back:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_mercator_world_width() {
        assert_eq!(SphericalMercator.world_width_px(0, TILE), 256.0);
        assert_eq!(SphericalMercator.world_width_px(3, TILE), 2048.0);
        assert_eq!(SphericalMercator.world_height_px(3, TILE), 2048.0);
    }

    #[test]
    fn test_equirectangular_world_size() {
        assert_eq!(Equirectangular.world_width_px(0, TILE), 512.0);
        assert_eq!(Equirectangular.world_height_px(0, TILE), 256.0);
        assert_eq!(Equirectangular.world_width_px(2, TILE), 2048.0);
    }

    #[test]
    fn test_mercator_origin_is_center() {
        let px = SphericalMercator.to_world_px(0, TILE, &GeoCoordinate::new(0.0, 0.0));
        assert!((px.x() - 128.0).abs() < 1e-9);
        assert!((px.y() - 128.0).abs() < 1e-9);
    }

    #[test]
    fn test_equirectangular_corners() {
        let tl = Equirectangular.to_world_px(1, TILE, &GeoCoordinate::new(-180.0, 90.0));
        let br = Equirectangular.to_world_px(1, TILE, &GeoCoordinate::new(180.0, -90.0));
        assert_eq!(tl, WorldPixel::new(0.0, 0.0));
        assert_eq!(br, WorldPixel::new(1024.0, 512.0));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(
            "EPSG:3857".parse::<ProjectionKind>().ok(),
            Some(ProjectionKind::SphericalMercator)
        );
        assert_eq!("4326".parse::<ProjectionKind>().ok(), Some(ProjectionKind::Equirectangular));
        assert_eq!(
            "mercator".parse::<ProjectionKind>().ok(),
            Some(ProjectionKind::SphericalMercator)
        );
        assert!(matches!(
            "EPSG:27700".parse::<ProjectionKind>(),
            Err(ConfigError::UnsupportedProjection(_))
        ));
        assert!(ProjectionKind::from_epsg(900913).is_err());
    }

    #[test]
    fn test_epsg_numbers() {
        assert_eq!(projection_for(ProjectionKind::SphericalMercator).epsg_number(), 3857);
        assert_eq!(projection_for(ProjectionKind::Equirectangular).epsg_number(), 4326);
        assert_eq!(ProjectionKind::Equirectangular.to_string(), "EPSG:4326");
    }
}
