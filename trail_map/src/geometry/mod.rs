//! Geographic primitives and bounds accumulation for GeoJSON overlays.

pub mod point3;
pub use point3::Point3;

use geojson::{FeatureCollection, Geometry};
use serde_json::Value;

/// Metres spanned by one degree of latitude.
pub const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Representation of a geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Returns `true` when both components are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.lng.is_finite() && self.lat.is_finite()
    }

    /// Linear interpolation in degree space, `t` in `[0, 1]`.
    pub fn lerp(self, other: LngLat, t: f64) -> LngLat {
        LngLat::new(
            self.lng + (other.lng - self.lng) * t,
            self.lat + (other.lat - self.lat) * t,
        )
    }
}

/// Metres spanned by one degree of longitude at `lat` degrees.
pub fn meters_per_degree_lng(lat: f64) -> f64 {
    METERS_PER_DEGREE_LAT * lat.to_radians().cos()
}

/// East/north displacement in metres from `a` to `b`.
///
/// Uses an equirectangular approximation evaluated at the mean latitude of
/// the pair. The error stays well below a metre per kilometre at town scale.
pub fn planar_offset(a: LngLat, b: LngLat) -> (f64, f64) {
    let mid_lat = (a.lat + b.lat) / 2.0;
    let dx = (b.lng - a.lng) * meters_per_degree_lng(mid_lat);
    let dy = (b.lat - a.lat) * METERS_PER_DEGREE_LAT;
    (dx, dy)
}

/// Planar distance in metres between two positions.
pub fn planar_distance(a: LngLat, b: LngLat) -> f64 {
    let (dx, dy) = planar_offset(a, b);
    dx.hypot(dy)
}

/// Axis aligned geographic envelope. Empty until first extended.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LngLatBounds {
    extent: Option<(LngLat, LngLat)>,
}

impl LngLatBounds {
    /// Creates empty bounds.
    pub fn new() -> Self {
        Self { extent: None }
    }

    /// Grows the envelope to include `p`.
    pub fn extend(&mut self, p: LngLat) {
        self.extent = Some(match self.extent {
            None => (p, p),
            Some((sw, ne)) => (
                LngLat::new(sw.lng.min(p.lng), sw.lat.min(p.lat)),
                LngLat::new(ne.lng.max(p.lng), ne.lat.max(p.lat)),
            ),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.extent.is_none()
    }

    pub fn south_west(&self) -> Option<LngLat> {
        self.extent.map(|(sw, _)| sw)
    }

    pub fn north_east(&self) -> Option<LngLat> {
        self.extent.map(|(_, ne)| ne)
    }

    /// Returns `true` when both corners are finite.
    pub fn is_finite(&self) -> bool {
        self.extent
            .map(|(sw, ne)| sw.is_finite() && ne.is_finite())
            .unwrap_or(false)
    }

    /// Returns `true` if `p` lies inside or on the envelope.
    pub fn contains(&self, p: LngLat) -> bool {
        match self.extent {
            Some((sw, ne)) => {
                p.lng >= sw.lng && p.lng <= ne.lng && p.lat >= sw.lat && p.lat <= ne.lat
            }
            None => false,
        }
    }

    pub fn center(&self) -> Option<LngLat> {
        self.extent.map(|(sw, ne)| sw.lerp(ne, 0.5))
    }
}

/// Coordinate structure of a GeoJSON geometry of any nesting depth.
#[derive(Debug, Clone, PartialEq)]
pub enum Coordinates {
    Position(LngLat),
    Nested(Vec<Coordinates>),
}

impl Coordinates {
    /// Builds coordinates from a raw JSON `coordinates` member.
    ///
    /// An array whose first two elements are numbers is a position; any
    /// other array is one more nesting level. Non-array values yield `None`
    /// and are dropped from their parent.
    pub fn from_json(value: &Value) -> Option<Self> {
        let items = value.as_array()?;
        let lng = items.first().and_then(Value::as_f64);
        let lat = items.get(1).and_then(Value::as_f64);
        match (lng, lat) {
            (Some(lng), Some(lat)) => Some(Self::Position(LngLat::new(lng, lat))),
            _ => Some(Self::Nested(
                items.iter().filter_map(Self::from_json).collect(),
            )),
        }
    }

    /// Visits every position depth-first.
    pub fn for_each_position<F: FnMut(LngLat)>(&self, f: &mut F) {
        match self {
            Coordinates::Position(p) => f(*p),
            Coordinates::Nested(children) => {
                for child in children {
                    child.for_each_position(f);
                }
            }
        }
    }
}

/// Extends `bounds` with every position in `coords` and returns how many
/// positions were visited.
pub fn extend(bounds: &mut LngLatBounds, coords: &Coordinates) -> usize {
    let mut visited = 0;
    coords.for_each_position(&mut |p| {
        bounds.extend(p);
        visited += 1;
    });
    visited
}

/// Extends `bounds` from a GeoJSON geometry. Geometry collections walk each
/// member geometry.
pub fn extend_from_geometry(bounds: &mut LngLatBounds, geometry: &Geometry) -> usize {
    match serde_json::to_value(geometry) {
        Ok(value) => extend_from_geometry_json(bounds, &value),
        Err(_) => 0,
    }
}

fn extend_from_geometry_json(bounds: &mut LngLatBounds, geometry: &Value) -> usize {
    if let Some(coords) = geometry.get("coordinates").and_then(Coordinates::from_json) {
        return extend(bounds, &coords);
    }
    geometry
        .get("geometries")
        .and_then(Value::as_array)
        .map(|members| {
            members
                .iter()
                .map(|g| extend_from_geometry_json(bounds, g))
                .sum()
        })
        .unwrap_or(0)
}

/// Extends `bounds` from every feature of `collection`.
///
/// Returns `true` when at least one feature carried a geometry. Features
/// without geometry are skipped.
pub fn extend_from_feature_collection(
    bounds: &mut LngLatBounds,
    collection: &FeatureCollection,
) -> bool {
    let mut extended = false;
    for feature in &collection.features {
        if let Some(geometry) = &feature.geometry {
            extend_from_geometry(bounds, geometry);
            extended = true;
        }
    }
    extended
}

/// Even-odd test: counts ring edges crossed by a ray cast east from `p`.
pub fn point_in_ring(p: LngLat, ring: &[LngLat]) -> bool {
    let Some(&last) = ring.last() else {
        return false;
    };
    let crossings = std::iter::once(last)
        .chain(ring.iter().copied())
        .zip(ring.iter().copied())
        .filter(|&(a, b)| (a.lat > p.lat) != (b.lat > p.lat))
        .filter(|&(a, b)| {
            let t = (p.lat - a.lat) / (b.lat - a.lat);
            p.lng < a.lng + t * (b.lng - a.lng)
        })
        .count();
    crossings % 2 == 1
}

/// Returns `true` if `p` lies inside the outer ring and outside every hole.
pub fn point_in_polygon(p: LngLat, rings: &[Vec<LngLat>]) -> bool {
    match rings.split_first() {
        Some((outer, holes)) => {
            point_in_ring(p, outer) && !holes.iter().any(|h| point_in_ring(p, h))
        }
        None => false,
    }
}
