//! Terrain sample type: longitude, latitude and elevation in metres.

use super::LngLat;

/// Representation of a 3D point. `x`/`y` are longitude/latitude degrees and
/// `z` is elevation in metres.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn lng_lat(&self) -> LngLat {
        LngLat::new(self.x, self.y)
    }
}
