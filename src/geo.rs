//! Geographic primitives: coordinates, north-up bounding boxes and a few
//! great-circle helpers used for geometry sizing.

/// Mean earth radius in metres (haversine model)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoCoordinate {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoCoordinate {
    pub const fn new(longitude: f64, latitude: f64) -> Self {
        Self { longitude, latitude }
    }

    /// Euclidean distance in degree space, only meaningful for tolerance checks
    pub fn degree_distance(&self, other: &GeoCoordinate) -> f64 {
        (self.longitude - other.longitude).hypot(self.latitude - other.latitude)
    }
}

impl From<(f64, f64)> for GeoCoordinate {
    fn from((longitude, latitude): (f64, f64)) -> Self {
        Self::new(longitude, latitude)
    }
}

/// Axis-aligned rectangle in world coordinates, north-up.
///
/// Corners are normalised on construction so `left <= right` and
/// `top >= bottom` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    top_left: GeoCoordinate,
    bottom_right: GeoCoordinate,
}

impl BoundingBox {
    pub fn new(a: GeoCoordinate, b: GeoCoordinate) -> Self {
        Self {
            top_left: GeoCoordinate::new(
                a.longitude.min(b.longitude),
                a.latitude.max(b.latitude),
            ),
            bottom_right: GeoCoordinate::new(
                a.longitude.max(b.longitude),
                a.latitude.min(b.latitude),
            ),
        }
    }

    /// Build from west/south/east/north edges
    pub fn from_edges(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self::new(GeoCoordinate::new(west, north), GeoCoordinate::new(east, south))
    }

    /// The whole lon/lat plane
    pub fn world() -> Self {
        Self::from_edges(-180.0, -90.0, 180.0, 90.0)
    }

    /// Smallest box enclosing every coordinate, `None` for an empty slice
    pub fn enclosing(coords: &[GeoCoordinate]) -> Option<Self> {
        let first = coords.first()?;
        let (mut west, mut south, mut east, mut north) =
            (first.longitude, first.latitude, first.longitude, first.latitude);
        for c in &coords[1..] {
            west = west.min(c.longitude);
            east = east.max(c.longitude);
            south = south.min(c.latitude);
            north = north.max(c.latitude);
        }
        Some(Self::from_edges(west, south, east, north))
    }

    pub fn top_left(&self) -> GeoCoordinate {
        self.top_left
    }

    pub fn bottom_right(&self) -> GeoCoordinate {
        self.bottom_right
    }

    pub fn left(&self) -> f64 {
        self.top_left.longitude
    }

    pub fn right(&self) -> f64 {
        self.bottom_right.longitude
    }

    pub fn top(&self) -> f64 {
        self.top_left.latitude
    }

    pub fn bottom(&self) -> f64 {
        self.bottom_right.latitude
    }

    pub fn width(&self) -> f64 {
        self.right() - self.left()
    }

    pub fn height(&self) -> f64 {
        self.top() - self.bottom()
    }

    pub fn center(&self) -> GeoCoordinate {
        GeoCoordinate::new(
            (self.left() + self.right()) / 2.0,
            (self.top() + self.bottom()) / 2.0,
        )
    }

    /// Top-left, top-right, bottom-right, bottom-left
    pub fn corners(&self) -> [GeoCoordinate; 4] {
        [
            self.top_left,
            GeoCoordinate::new(self.right(), self.top()),
            self.bottom_right,
            GeoCoordinate::new(self.left(), self.bottom()),
        ]
    }

    /// A box with zero area. Used as the "no restriction" marker.
    pub fn is_null(&self) -> bool {
        self.width() == 0.0 || self.height() == 0.0
    }

    /// Closed-interval containment test
    #[inline]
    pub fn contains(&self, coord: &GeoCoordinate) -> bool {
        coord.longitude >= self.left()
            && coord.longitude <= self.right()
            && coord.latitude >= self.bottom()
            && coord.latitude <= self.top()
    }

    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        self.contains(&other.top_left) && self.contains(&other.bottom_right)
    }

    /// Closed-interval overlap test; touching edges count as intersecting
    #[inline]
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.left() <= other.right()
            && other.left() <= self.right()
            && self.bottom() <= other.top()
            && other.bottom() <= self.top()
    }

    /// Grow every edge by the given number of degrees
    pub fn expanded(&self, degrees_x: f64, degrees_y: f64) -> Self {
        Self::from_edges(
            self.left() - degrees_x,
            self.bottom() - degrees_y,
            self.right() + degrees_x,
            self.top() + degrees_y,
        )
    }
}

/// Wrap a longitude into [-180, 180)
#[inline(always)]
pub fn normalize_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Arithmetic mean of longitudes and latitudes
pub fn mean(coords: &[GeoCoordinate]) -> Option<GeoCoordinate> {
    if coords.is_empty() {
        return None;
    }
    let n = coords.len() as f64;
    let (lon, lat) = coords.iter().fold((0.0, 0.0), |(lon, lat), c| {
        (lon + c.longitude, lat + c.latitude)
    });
    Some(GeoCoordinate::new(lon / n, lat / n))
}

/// Great-circle distance in metres (haversine)
pub fn distance_m(a: &GeoCoordinate, b: &GeoCoordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Point reached after travelling `distance_m` from `start` on the initial
/// bearing `bearing_deg` (clockwise from north)
pub fn destination_point(
    start: &GeoCoordinate,
    distance_m: f64,
    bearing_deg: f64,
) -> GeoCoordinate {
    let angular = distance_m / EARTH_RADIUS_M;
    let bearing = bearing_deg.to_radians();
    let lat1 = start.latitude.to_radians();
    let lon1 = start.longitude.to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * angular.sin() * lat1.cos())
            .atan2(angular.cos() - lat1.sin() * lat2.sin());

    GeoCoordinate::new(normalize_lon(lon2.to_degrees()), lat2.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_normalises_corners() {
        let bbox = BoundingBox::new(GeoCoordinate::new(10.0, -5.0), GeoCoordinate::new(-10.0, 5.0));
        assert_eq!(bbox.left(), -10.0);
        assert_eq!(bbox.right(), 10.0);
        assert_eq!(bbox.top(), 5.0);
        assert_eq!(bbox.bottom(), -5.0);
    }

    #[test]
    fn test_corners_clockwise_from_top_left() {
        let b = BoundingBox::from_edges(-10.0, -5.0, 20.0, 15.0);
        let [tl, tr, br, bl] = b.corners();
        assert_eq!((tl.longitude, tl.latitude), (-10.0, 15.0));
        assert_eq!((tr.longitude, tr.latitude), (20.0, 15.0));
        assert_eq!((br.longitude, br.latitude), (20.0, -5.0));
        assert_eq!((bl.longitude, bl.latitude), (-10.0, -5.0));
    }

    #[test]
    fn test_contains_is_closed() {
        let bbox = BoundingBox::from_edges(0.0, 0.0, 10.0, 10.0);
        assert!(bbox.contains(&GeoCoordinate::new(0.0, 0.0)));
        assert!(bbox.contains(&GeoCoordinate::new(10.0, 10.0)));
        assert!(!bbox.contains(&GeoCoordinate::new(10.000_001, 5.0)));
    }

    #[test]
    fn test_intersects() {
        let a = BoundingBox::from_edges(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::from_edges(10.0, 10.0, 20.0, 20.0);
        let c = BoundingBox::from_edges(11.0, 0.0, 20.0, 10.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_null_box() {
        assert!(BoundingBox::default().is_null());
        assert!(BoundingBox::from_edges(0.0, 5.0, 10.0, 5.0).is_null());
        assert!(!BoundingBox::world().is_null());
    }

    #[test]
    fn test_mean() {
        let coords = [GeoCoordinate::new(0.0, 0.0), GeoCoordinate::new(10.0, 20.0)];
        assert_eq!(mean(&coords), Some(GeoCoordinate::new(5.0, 10.0)));
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_distance_london_paris() {
        let london = GeoCoordinate::new(-0.1278, 51.5074);
        let paris = GeoCoordinate::new(2.3522, 48.8566);
        let d = distance_m(&london, &paris);
        assert!((d - 343_500.0).abs() < 2_000.0, "distance was {d}");
    }

    #[test]
    fn test_destination_roundtrip_distance() {
        let start = GeoCoordinate::new(-3.0, 55.0);
        let end = destination_point(&start, 10_000.0, 45.0);
        assert!((distance_m(&start, &end) - 10_000.0).abs() < 1.0);
        assert!(end.longitude > start.longitude);
        assert!(end.latitude > start.latitude);
    }

    #[test]
    fn test_normalize_lon() {
        assert_eq!(normalize_lon(190.0), -170.0);
        assert_eq!(normalize_lon(-180.0), -180.0);
        assert_eq!(normalize_lon(45.0), 45.0);
    }
}
