use crate::config::TileSourceConfig;
use crate::map::ProjectionKind;

/// Base used for inverted zoom numbering unless configured otherwise
pub const DEFAULT_INVERSION_BASE: i32 = 17;

/// Google layer selector, the `lyrs=` query value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoogleLayer {
    Satellite,
    Terrain,
    Hybrid,
    Roads,
    Map,
}

impl GoogleLayer {
    fn code(self) -> &'static str {
        match self {
            GoogleLayer::Satellite => "s",
            GoogleLayer::Terrain => "t",
            GoogleLayer::Hybrid => "h",
            GoogleLayer::Roads => "r",
            GoogleLayer::Map => "m",
        }
    }
}

/// URL scheme of a tile service.
///
/// The template carries `%x`, `%y` and `%zoom` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct TileSource {
    name: String,
    url_template: String,
    zoom_offset: i32,
    inverted_zoom: bool,
    inversion_base: i32,
    projections: Vec<ProjectionKind>,
}

impl TileSource {
    pub fn new(name: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url_template: url_template.into(),
            zoom_offset: 0,
            inverted_zoom: false,
            inversion_base: DEFAULT_INVERSION_BASE,
            projections: vec![ProjectionKind::SphericalMercator],
        }
    }

    pub fn from_config(name: impl Into<String>, config: &TileSourceConfig) -> Self {
        Self {
            name: name.into(),
            url_template: config.url_template.clone(),
            zoom_offset: config.zoom_offset,
            inverted_zoom: config.inverted_zoom,
            inversion_base: config.inversion_base,
            projections: config.projections.clone(),
        }
    }

    pub fn openstreetmap() -> Self {
        Self::new("OpenStreetMap", crate::config::DEFAULT_TILE_URL)
    }

    pub fn google(layer: GoogleLayer) -> Self {
        Self::new(
            "Google",
            format!(
                "http://mt1.google.com/vt/v=ap.106&hl=en&x=%x&y=%y&zoom=%zoom&lyrs={}",
                layer.code()
            ),
        )
        .with_inverted_zoom(DEFAULT_INVERSION_BASE)
    }

    pub fn with_zoom_offset(mut self, offset: i32) -> Self {
        self.zoom_offset = offset;
        self
    }

    /// Number zoom levels down from `base`
    pub fn with_inverted_zoom(mut self, base: i32) -> Self {
        self.inverted_zoom = true;
        self.inversion_base = base;
        self
    }

    pub fn with_projections(mut self, projections: Vec<ProjectionKind>) -> Self {
        self.projections = projections;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn supports(&self, projection: ProjectionKind) -> bool {
        self.projections.contains(&projection)
    }

    /// Zoom number the service expects for a map zoom level
    pub fn local_zoom(&self, zoom: u8) -> i32 {
        if self.inverted_zoom {
            self.inversion_base - zoom as i32 - self.zoom_offset
        } else {
            zoom as i32 + self.zoom_offset
        }
    }

    pub fn tile_url(&self, x: u32, y: u32, zoom: u8) -> String {
        self.url_template
            .replace("%x", &x.to_string())
            .replace("%y", &y.to_string())
            .replace("%zoom", &self.local_zoom(zoom).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_osm_url() {
        let osm = TileSource::openstreetmap();
        assert_eq!(osm.tile_url(3, 5, 4), "http://tile.openstreetmap.org/4/3/5.png");
    }

    #[test]
    fn test_zoom_offset() {
        let source = TileSource::new("t", "%zoom").with_zoom_offset(2);
        assert_eq!(source.local_zoom(5), 7);
    }

    #[test]
    fn test_google_inverted_zoom() {
        let google = TileSource::google(GoogleLayer::Satellite);
        assert_eq!(google.local_zoom(0), 17);
        assert_eq!(google.local_zoom(5), 12);
        assert!(google.tile_url(1, 2, 5).ends_with("x=1&y=2&zoom=12&lyrs=s"));
    }

    #[test]
    fn test_inversion_base_is_configurable() {
        let source = TileSource::new("t", "%zoom")
            .with_inverted_zoom(20)
            .with_zoom_offset(1);
        assert_eq!(source.local_zoom(4), 15);
    }

    #[test]
    fn test_from_config() {
        let config = TileSourceConfig {
            url_template: "https://tiles.example/%zoom/%x/%y".into(),
            zoom_offset: -1,
            projections: vec![ProjectionKind::Equirectangular],
            ..TileSourceConfig::default()
        };
        let source = TileSource::from_config("example", &config);
        assert_eq!(source.tile_url(0, 1, 3), "https://tiles.example/2/0/1");
        assert!(source.supports(ProjectionKind::Equirectangular));
        assert!(!source.supports(ProjectionKind::SphericalMercator));
    }
}
