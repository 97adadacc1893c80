//! Terrain-aware path measurement.
//!
//! Paths are densified to a fixed planar step, every sample is given an
//! elevation and the 3-D segment lengths are summed.

use geojson::{Feature, FeatureCollection, Geometry};
use log::{debug, info, warn};
use serde_json::json;

use crate::geometry::{planar_distance, planar_offset, LngLat};
use crate::render::{Cursor, LayerSpec, LayerType, RenderError, Renderer, SourceSpec};
use crate::styles::LinePaint;

pub const MEASURE_LINE: &str = "measure-line";
pub const MEASURE_POINTS: &str = "measure-points";
pub const DEFAULT_STEP_M: f64 = 25.0;
pub const METERS_PER_MILE: f64 = 1609.344;
/// Most parts a single segment is split into.
pub const MAX_SEGMENT_STEPS: usize = 10_000;

/// A sampling step must be a positive, finite number of metres.
pub fn is_valid_step(step_m: f64) -> bool {
    step_m.is_finite() && step_m > 0.0
}

/// Inserts intermediate samples so that no planar step exceeds `step_m`.
///
/// Each segment is split into `ceil(len / step_m)` equal parts, at least one
/// and at most [`MAX_SEGMENT_STEPS`]. An invalid step falls back to
/// [`DEFAULT_STEP_M`]. The original vertices are kept and paths with fewer
/// than two points are returned unchanged.
pub fn densify(path: &[LngLat], step_m: f64) -> Vec<LngLat> {
    if path.len() < 2 {
        return path.to_vec();
    }
    let step_m = if is_valid_step(step_m) {
        step_m
    } else {
        DEFAULT_STEP_M
    };
    let mut out = vec![path[0]];
    for pair in path.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let len = planar_distance(a, b);
        let n = if len.is_finite() {
            ((len / step_m).ceil() as usize).clamp(1, MAX_SEGMENT_STEPS)
        } else {
            1
        };
        for i in 1..=n {
            out.push(a.lerp(b, i as f64 / n as f64));
        }
    }
    out
}

/// Length of `path` in metres including elevation change.
///
/// `elevation` returns metres above datum; `None` counts as 0.
pub fn terrain_distance<F>(path: &[LngLat], step_m: f64, elevation: F) -> f64
where
    F: Fn(LngLat) -> Option<f64>,
{
    let samples = densify(path, step_m);
    let heights: Vec<f64> = samples
        .iter()
        .map(|p| elevation(*p).unwrap_or(0.0))
        .collect();
    samples
        .windows(2)
        .zip(heights.windows(2))
        .map(|(p, z)| {
            let (dx, dy) = planar_offset(p[0], p[1]);
            let dz = z[1] - z[0];
            (dx * dx + dy * dy + dz * dz).sqrt()
        })
        .sum()
}

/// Formats metres as miles with two decimals.
pub fn format_miles(meters: f64) -> String {
    format!("{:.2} mi", meters / METERS_PER_MILE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeasureState {
    #[default]
    Idle,
    Measuring,
}

fn feature(geometry: geojson::Value) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geometry)),
        id: None,
        properties: None,
        foreign_members: None,
    }
}

fn collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Measurement session: owns the path and its on-map visualization.
#[derive(Debug, Clone)]
pub struct TerrainMeasurer {
    state: MeasureState,
    path: Vec<LngLat>,
    step_m: f64,
    distance_m: f64,
}

impl Default for TerrainMeasurer {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_M)
    }
}

impl TerrainMeasurer {
    /// Creates an idle measurer. An invalid step is replaced by
    /// [`DEFAULT_STEP_M`].
    pub fn new(step_m: f64) -> Self {
        let step_m = if is_valid_step(step_m) {
            step_m
        } else {
            warn!("measure: invalid step {step_m}, using {DEFAULT_STEP_M} m");
            DEFAULT_STEP_M
        };
        Self {
            state: MeasureState::Idle,
            path: Vec::new(),
            step_m,
            distance_m: 0.0,
        }
    }

    pub fn state(&self) -> MeasureState {
        self.state
    }

    pub fn is_measuring(&self) -> bool {
        self.state == MeasureState::Measuring
    }

    pub fn path(&self) -> &[LngLat] {
        &self.path
    }

    pub fn step_m(&self) -> f64 {
        self.step_m
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn readout(&self) -> String {
        format_miles(self.distance_m)
    }

    /// Starts a new measurement, discarding the previous path.
    pub fn activate(&mut self, renderer: &mut dyn Renderer) -> Result<(), RenderError> {
        info!("measure: activate");
        self.path.clear();
        self.distance_m = 0.0;
        self.ensure_layers(renderer)?;
        self.redraw(renderer)?;
        renderer.set_cursor(Cursor::Crosshair);
        self.state = MeasureState::Measuring;
        Ok(())
    }

    /// Stops capturing clicks. The path stays on the map.
    pub fn deactivate(&mut self, renderer: &mut dyn Renderer) {
        if self.state == MeasureState::Measuring {
            info!("measure: deactivate with {} points", self.path.len());
        }
        renderer.set_cursor(Cursor::Default);
        self.state = MeasureState::Idle;
    }

    /// Appends a vertex while measuring. Returns `false` when idle so the
    /// caller can route the click elsewhere.
    pub fn on_click(
        &mut self,
        renderer: &mut dyn Renderer,
        at: LngLat,
    ) -> Result<bool, RenderError> {
        if self.state != MeasureState::Measuring {
            return Ok(false);
        }
        self.path.push(at);
        self.distance_m = terrain_distance(&self.path, self.step_m, |p| {
            renderer.query_elevation(p)
        });
        debug!(
            "measure: {} points, {:.1} m",
            self.path.len(),
            self.distance_m
        );
        self.redraw(renderer)?;
        Ok(true)
    }

    /// Empties the path in either state.
    pub fn clear(&mut self, renderer: &mut dyn Renderer) -> Result<(), RenderError> {
        self.path.clear();
        self.distance_m = 0.0;
        self.redraw(renderer)
    }

    /// Recreates the visualization after a base-style swap.
    pub fn restore(&mut self, renderer: &mut dyn Renderer) -> Result<(), RenderError> {
        if self.path.is_empty() {
            return Ok(());
        }
        self.ensure_layers(renderer)?;
        self.redraw(renderer)
    }

    fn ensure_layers(&self, renderer: &mut dyn Renderer) -> Result<(), RenderError> {
        for id in [MEASURE_LINE, MEASURE_POINTS] {
            if !renderer.has_source(id) {
                renderer.add_source(
                    id,
                    SourceSpec::GeoJson {
                        data: collection(Vec::new()),
                        promote_id: None,
                    },
                )?;
            }
        }
        if !renderer.has_layer(MEASURE_LINE) {
            let paint = LinePaint::new("#ff6600", 3.0).dashed(&[2.0, 1.0]);
            renderer.add_layer(
                LayerSpec::new(MEASURE_LINE, LayerType::Line)
                    .with_source(MEASURE_LINE)
                    .with_paint(paint.to_paint()),
                None,
            )?;
        }
        if !renderer.has_layer(MEASURE_POINTS) {
            let mut paint = geojson::JsonObject::new();
            paint.insert("circle-radius".into(), json!(4));
            paint.insert("circle-color".into(), json!("#ff6600"));
            paint.insert("circle-stroke-color".into(), json!("#ffffff"));
            paint.insert("circle-stroke-width".into(), json!(1));
            renderer.add_layer(
                LayerSpec::new(MEASURE_POINTS, LayerType::Circle)
                    .with_source(MEASURE_POINTS)
                    .with_paint(paint),
                None,
            )?;
        }
        Ok(())
    }

    fn redraw(&self, renderer: &mut dyn Renderer) -> Result<(), RenderError> {
        let line = if self.path.len() >= 2 {
            let coords = self.path.iter().map(|p| vec![p.lng, p.lat]).collect();
            vec![feature(geojson::Value::LineString(coords))]
        } else {
            Vec::new()
        };
        let points = self
            .path
            .iter()
            .map(|p| feature(geojson::Value::Point(vec![p.lng, p.lat])))
            .collect();
        if renderer.has_source(MEASURE_LINE) {
            renderer.set_source_data(MEASURE_LINE, collection(line))?;
        }
        if renderer.has_source(MEASURE_POINTS) {
            renderer.set_source_data(MEASURE_POINTS, collection(points))?;
        }
        Ok(())
    }
}
