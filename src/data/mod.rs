use crate::geo::GeoCoordinate;
use crate::map::{Geometry, Layer, Style};
use anyhow::{Context, Result};
use geojson::{Feature, GeoJson, Value};
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tiny_skia::Color;
use tracing::{debug, info, warn};

/// Marker size for GeoJSON points, in pixels
const POINT_PX: f64 = 6.0;

/// Built-in places: name, longitude, latitude, population
pub const DEFAULT_PLACES: &[(&str, f64, f64, u64)] = &[
    ("New York", -74.0, 40.7, 18_800_000),
    ("London", -0.1, 51.5, 9_000_000),
    ("Paris", 2.3, 48.9, 11_000_000),
    ("Tokyo", 139.7, 35.7, 37_400_000),
    ("Sydney", 151.2, -33.9, 5_300_000),
    ("Rio", -43.2, -22.9, 13_500_000),
    ("Moscow", 37.6, 55.8, 12_500_000),
    ("Beijing", 116.4, 39.9, 21_500_000),
    ("Delhi", 77.2, 28.6, 32_900_000),
    ("Los Angeles", -118.2, 34.0, 12_400_000),
    ("Washington", -77.0, 38.9, 5_300_000),
    ("Mexico City", -99.1, 19.4, 21_800_000),
    ("Buenos Aires", -58.4, -34.6, 15_000_000),
];

/// Coarse continent outlines for drawing without tiles
const WORLD_OUTLINE: &[&[(f64, f64)]] = &[
    &[
        (-168.0, 65.0), (-141.0, 60.0), (-125.0, 48.0), (-117.0, 32.0),
        (-97.0, 25.0), (-82.0, 24.0), (-81.0, 31.0), (-70.0, 41.0),
        (-55.0, 47.0), (-64.0, 60.0), (-95.0, 62.0), (-130.0, 70.0),
        (-168.0, 65.0),
    ],
    &[
        (-80.0, 10.0), (-60.0, 5.0), (-35.0, -5.0), (-40.0, -22.0),
        (-55.0, -34.0), (-68.0, -50.0), (-75.0, -52.0), (-72.0, -30.0),
        (-80.0, -5.0), (-80.0, 10.0),
    ],
    &[
        (-10.0, 36.0), (5.0, 43.0), (20.0, 40.0), (30.0, 40.0),
        (40.0, 43.0), (40.0, 55.0), (25.0, 65.0), (10.0, 71.0),
        (5.0, 58.0), (-10.0, 52.0), (-5.0, 43.0), (-10.0, 36.0),
    ],
    &[
        (-17.0, 15.0), (-5.0, 35.0), (20.0, 33.0), (35.0, 30.0),
        (42.0, 12.0), (50.0, 12.0), (35.0, -20.0), (20.0, -35.0),
        (10.0, -15.0), (5.0, 5.0), (-10.0, 10.0), (-17.0, 15.0),
    ],
    &[
        (40.0, 43.0), (60.0, 25.0), (80.0, 8.0), (92.0, 22.0),
        (105.0, 10.0), (122.0, 25.0), (140.0, 40.0), (145.0, 50.0),
        (130.0, 52.0), (110.0, 45.0), (70.0, 55.0), (40.0, 43.0),
    ],
    &[
        (115.0, -20.0), (130.0, -12.0), (145.0, -15.0), (153.0, -30.0),
        (145.0, -38.0), (130.0, -32.0), (115.0, -35.0), (115.0, -20.0),
    ],
];

fn point_style() -> Style {
    Style {
        pen: Color::from_rgba8(120, 20, 20, 255),
        pen_width: 1.0,
        brush: Some(Color::from_rgba8(230, 60, 50, 255)),
    }
}

fn line_style() -> Style {
    Style {
        pen: Color::from_rgba8(40, 90, 200, 255),
        pen_width: 1.5,
        brush: None,
    }
}

fn polygon_style() -> Style {
    Style {
        pen: Color::from_rgba8(30, 120, 60, 255),
        pen_width: 1.0,
        brush: Some(Color::from_rgba8(60, 170, 90, 80)),
    }
}

/// Parse GeoJSON text. The buffer is used as scratch space by the parser.
pub fn parse_geojson(bytes: &mut [u8]) -> Result<GeoJson> {
    simd_json::serde::from_slice(bytes).context("Invalid GeoJSON")
}

/// Add every supported feature in a GeoJSON file to `layer`.
/// Returns the number of geometries added.
pub fn load_geojson(layer: &Layer, path: &Path) -> Result<usize> {
    let mut bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let geojson =
        parse_geojson(&mut bytes).with_context(|| format!("Failed to parse {}", path.display()))?;

    let geometries = geometries_from(&geojson);
    let total = geometries.len();
    let added = geometries
        .into_iter()
        .map(Arc::new)
        .filter(|g| layer.add_geometry(g.clone()))
        .count();

    if added < total {
        warn!(
            path = %path.display(),
            skipped = total - added,
            "Some features fell outside the index"
        );
    }
    info!(path = %path.display(), layer = layer.name(), added, "Loaded GeoJSON");
    Ok(added)
}

/// Load every `.json` and `.geojson` file in a directory into `layer`
pub fn load_dir(layer: &Layer, dir: &Path) -> Result<usize> {
    let mut added = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        let is_geojson = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json") || e.eq_ignore_ascii_case("geojson"));
        if !is_geojson {
            continue;
        }
        match load_geojson(layer, &path) {
            Ok(n) => added += n,
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping data file"),
        }
    }
    Ok(added)
}

/// Convert a parsed document into drawable geometries.
/// Features of a collection are converted in parallel.
pub fn geometries_from(geojson: &GeoJson) -> Vec<Geometry> {
    match geojson {
        GeoJson::FeatureCollection(fc) => fc
            .features
            .par_iter()
            .flat_map_iter(feature_geometries)
            .collect(),
        GeoJson::Feature(feature) => feature_geometries(feature),
        GeoJson::Geometry(geometry) => {
            let mut out = Vec::new();
            convert(&geometry.value, None, &mut out);
            out
        }
    }
}

fn feature_geometries(feature: &Feature) -> Vec<Geometry> {
    let name = feature
        .properties
        .as_ref()
        .and_then(|p| p.get("name"))
        .and_then(|v| v.as_str());

    let mut out = Vec::new();
    if let Some(geometry) = &feature.geometry {
        convert(&geometry.value, name, &mut out);
    }
    out
}

fn position(p: &[f64]) -> Option<GeoCoordinate> {
    match p {
        [lon, lat, ..] => Some(GeoCoordinate::new(*lon, *lat)),
        _ => None,
    }
}

fn positions(ps: &[Vec<f64>]) -> Vec<GeoCoordinate> {
    ps.iter().filter_map(|p| position(p)).collect()
}

fn convert(value: &Value, name: Option<&str>, out: &mut Vec<Geometry>) {
    let named = |g: Geometry| match name {
        Some(name) => g.with_name(name),
        None => g,
    };

    match value {
        Value::Point(p) => {
            if let Some(coord) = position(p) {
                out.push(named(Geometry::point(coord, POINT_PX).with_style(point_style())));
            }
        }
        Value::MultiPoint(ps) => {
            for coord in positions(ps) {
                out.push(named(Geometry::point(coord, POINT_PX).with_style(point_style())));
            }
        }
        Value::LineString(ps) => push_line(positions(ps), &named, out),
        Value::MultiLineString(lines) => {
            for ps in lines {
                push_line(positions(ps), &named, out);
            }
        }
        // Holes are not drawn
        Value::Polygon(rings) => {
            if let Some(exterior) = rings.first() {
                push_polygon(positions(exterior), &named, out);
            }
        }
        Value::MultiPolygon(polygons) => {
            for exterior in polygons.iter().filter_map(|rings| rings.first()) {
                push_polygon(positions(exterior), &named, out);
            }
        }
        Value::GeometryCollection(geometries) => {
            for g in geometries {
                convert(&g.value, name, out);
            }
        }
    }
}

fn push_line(
    coords: Vec<GeoCoordinate>,
    named: &impl Fn(Geometry) -> Geometry,
    out: &mut Vec<Geometry>,
) {
    if coords.len() < 2 {
        debug!(points = coords.len(), "Skipping degenerate line string");
        return;
    }
    out.push(named(Geometry::line_string(coords).with_style(line_style())));
}

fn push_polygon(
    coords: Vec<GeoCoordinate>,
    named: &impl Fn(Geometry) -> Geometry,
    out: &mut Vec<Geometry>,
) {
    if coords.len() < 3 {
        debug!(points = coords.len(), "Skipping degenerate polygon");
        return;
    }
    out.push(named(Geometry::polygon(coords).with_style(polygon_style())));
}

/// Add the built-in city markers, sized by population
pub fn add_default_places(layer: &Layer) -> usize {
    DEFAULT_PLACES
        .iter()
        .filter(|&&(name, lon, lat, population)| {
            let size = if population >= 15_000_000 { 10.0 } else { 7.0 };
            let place = Geometry::point(GeoCoordinate::new(lon, lat), size)
                .with_name(name)
                .with_style(point_style())
                .with_metadata("population", population.to_string());
            layer.add_geometry(Arc::new(place))
        })
        .count()
}

/// Add coarse continent outlines
pub fn add_world_outline(layer: &Layer) -> usize {
    let style = Style {
        pen: Color::from_rgba8(90, 90, 90, 255),
        pen_width: 1.0,
        brush: None,
    };
    WORLD_OUTLINE
        .iter()
        .filter(|ring| {
            let coords = ring.iter().map(|&c| GeoCoordinate::from(c)).collect();
            layer.add_geometry(Arc::new(Geometry::line_string(coords).with_style(style)))
        })
        .count()
}

/// Locations of the built-in places, in order
pub fn default_place_coords() -> Vec<GeoCoordinate> {
    DEFAULT_PLACES
        .iter()
        .map(|&(_, lon, lat, _)| GeoCoordinate::new(lon, lat))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::GeometryKind;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"name": "Oslo"},
             "geometry": {"type": "Point", "coordinates": [10.75, 59.91]}},
            {"type": "Feature", "properties": {},
             "geometry": {"type": "LineString",
                          "coordinates": [[0.0, 0.0], [1.0, 1.0], [2.0, 0.5]]}},
            {"type": "Feature", "properties": null,
             "geometry": {"type": "MultiPolygon", "coordinates": [
                [[[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 0.0]]],
                [[[10.0, 10.0], [12.0, 10.0], [12.0, 12.0], [10.0, 10.0]]]
             ]}},
            {"type": "Feature", "properties": {},
             "geometry": {"type": "LineString", "coordinates": [[5.0, 5.0]]}}
        ]
    }"#;

    #[test]
    fn test_geometries_from_collection() {
        let mut bytes = SAMPLE.as_bytes().to_vec();
        let geojson = parse_geojson(&mut bytes).unwrap();
        let geometries = geometries_from(&geojson);

        // Point, line, two polygons; the one-point line is dropped
        assert_eq!(geometries.len(), 4);
        let oslo = geometries.iter().find(|g| g.name() == "Oslo").unwrap();
        assert!(matches!(oslo.kind(), GeometryKind::Point { .. }));
        let polygons = geometries
            .iter()
            .filter(|g| matches!(g.kind(), GeometryKind::Polygon(_)))
            .count();
        assert_eq!(polygons, 2);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let mut bytes = b"{\"type\": \"Nonsense\"}".to_vec();
        assert!(parse_geojson(&mut bytes).is_err());
    }

    #[test]
    fn test_load_geojson_file() {
        let mut file = tempfile::Builder::new().suffix(".geojson").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let layer = Layer::new("data");
        let added = load_geojson(&layer, file.path()).unwrap();
        assert_eq!(added, 4);
        assert_eq!(layer.geometry_count(), 4);
    }

    #[test]
    fn test_load_dir_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), SAMPLE).unwrap();
        fs::write(dir.path().join("notes.txt"), "not data").unwrap();
        fs::write(dir.path().join("broken.geojson"), "{").unwrap();

        let layer = Layer::new("data");
        assert_eq!(load_dir(&layer, dir.path()).unwrap(), 4);
    }

    #[test]
    fn test_default_places() {
        let layer = Layer::new("places");
        assert_eq!(add_default_places(&layer), DEFAULT_PLACES.len());
        assert_eq!(default_place_coords().len(), DEFAULT_PLACES.len());
    }

    #[test]
    fn test_world_outline() {
        let layer = Layer::new("outline");
        assert_eq!(add_world_outline(&layer), WORLD_OUTLINE.len());
    }
}
