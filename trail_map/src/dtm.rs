//! Triangulated terrain surface used to answer elevation queries.

use crate::geometry::{LngLat, LngLatBounds, Point3};

/// Elevation of `p` on the plane through `tri`, or `None` when `p` is
/// outside the triangle or the triangle is degenerate.
fn interpolate(tri: [Point3; 3], p: LngLat) -> Option<f64> {
    let [a, b, c] = tri;
    let (abx, aby) = (b.x - a.x, b.y - a.y);
    let (acx, acy) = (c.x - a.x, c.y - a.y);
    let area = abx * acy - aby * acx;
    if area.abs() < 1e-18 {
        return None;
    }
    let (apx, apy) = (p.lng - a.x, p.lat - a.y);
    let wb = (apx * acy - apy * acx) / area;
    let wc = (abx * apy - aby * apx) / area;
    let wa = 1.0 - wb - wc;
    const EDGE: f64 = -1e-9;
    (wa >= EDGE && wb >= EDGE && wc >= EDGE).then(|| wa * a.z + wb * b.z + wc * c.z)
}

/// Triangulated elevation surface over longitude/latitude samples.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Tin {
    pub vertices: Vec<Point3>,
    /// Vertex indices, three per triangle.
    pub triangles: Vec<[usize; 3]>,
}

impl Tin {
    /// Delaunay-triangulates the samples in the lng/lat plane. Fewer than
    /// three samples, or collinear ones, give a surface without triangles.
    pub fn from_points(points: Vec<Point3>) -> Self {
        let plane: Vec<delaunator::Point> = points
            .iter()
            .map(|p| delaunator::Point { x: p.x, y: p.y })
            .collect();
        let triangles = delaunator::triangulate(&plane)
            .triangles
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect();
        Self {
            vertices: points,
            triangles,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Envelope of all vertices.
    pub fn bounds(&self) -> LngLatBounds {
        let mut bounds = LngLatBounds::new();
        for v in &self.vertices {
            bounds.extend(v.lng_lat());
        }
        bounds
    }

    /// Interpolated elevation at `at`, `None` off the surface.
    pub fn elevation_at(&self, at: LngLat) -> Option<f64> {
        self.triangles.iter().find_map(|&[i, j, k]| {
            interpolate([self.vertices[i], self.vertices[j], self.vertices[k]], at)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane() -> Tin {
        // z = 100 + 1000 * lat
        Tin::from_points(vec![
            Point3::new(0.0, 0.0, 100.0),
            Point3::new(0.01, 0.0, 100.0),
            Point3::new(0.01, 0.01, 110.0),
            Point3::new(0.0, 0.01, 110.0),
        ])
    }

    #[test]
    fn interpolates_inside_surface() {
        let tin = plane();
        assert_eq!(tin.triangles.len(), 2);
        let z = tin.elevation_at(LngLat::new(0.005, 0.005)).unwrap();
        assert!((z - 105.0).abs() < 1e-6);
    }

    #[test]
    fn vertices_are_inside() {
        let tin = plane();
        let z = tin.elevation_at(LngLat::new(0.01, 0.01)).unwrap();
        assert!((z - 110.0).abs() < 1e-6);
    }

    #[test]
    fn outside_surface_is_none() {
        let tin = plane();
        assert!(tin.elevation_at(LngLat::new(1.0, 1.0)).is_none());
        assert!(tin.bounds().contains(LngLat::new(0.005, 0.0)));
    }

    #[test]
    fn too_few_points_is_empty() {
        let tin = Tin::from_points(vec![Point3::new(0.0, 0.0, 1.0), Point3::new(1.0, 1.0, 2.0)]);
        assert!(tin.is_empty());
        assert!(tin.elevation_at(LngLat::new(0.5, 0.5)).is_none());
    }
}
