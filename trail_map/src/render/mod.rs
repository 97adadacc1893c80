//! Boundary to the map rendering engine.
//!
//! The engine owns tile fetching, projection and compositing. This crate only
//! talks to it through [`Renderer`], which mirrors the imperative
//! source/layer API of a style-driven map. [`SceneRenderer`] is a headless
//! implementation that keeps the scene in memory.

pub mod scene;
pub use scene::SceneRenderer;

use geojson::{Feature, FeatureCollection, JsonObject};
use log::debug;
use serde_json::Value;

use crate::geometry::{LngLat, LngLatBounds};

/// Filter expression that no feature satisfies.
pub fn match_nothing() -> Value {
    Value::Bool(false)
}

/// Errors reported by a renderer for a single operation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("layer `{0}` already exists")]
    DuplicateLayer(String),
    #[error("source `{0}` already exists")]
    DuplicateSource(String),
    #[error("layer `{0}` does not exist")]
    MissingLayer(String),
    #[error("source `{0}` does not exist")]
    MissingSource(String),
    #[error("cannot insert before `{0}`: layer does not exist")]
    MissingAnchor(String),
}

/// Layer kinds understood by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerType {
    Fill,
    Line,
    Symbol,
    Circle,
    Hillshade,
    Sky,
    Raster,
}

/// Layer visibility as stored in the `visibility` layout property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    None,
}

impl Visibility {
    pub fn from_bool(visible: bool) -> Self {
        if visible {
            Visibility::Visible
        } else {
            Visibility::None
        }
    }

    pub fn is_visible(self) -> bool {
        self == Visibility::Visible
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Visible => "visible",
            Visibility::None => "none",
        }
    }

    /// Anything other than `"none"` counts as visible.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("none") => Visibility::None,
            _ => Visibility::Visible,
        }
    }
}

/// Declarative layer definition handed to [`Renderer::add_layer`].
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub id: String,
    pub kind: LayerType,
    pub source: Option<String>,
    pub paint: JsonObject,
    pub layout: JsonObject,
    pub filter: Option<Value>,
}

impl LayerSpec {
    pub fn new(id: impl Into<String>, kind: LayerType) -> Self {
        Self {
            id: id.into(),
            kind,
            source: None,
            paint: JsonObject::new(),
            layout: JsonObject::new(),
            filter: None,
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn with_paint(mut self, paint: JsonObject) -> Self {
        self.paint.extend(paint);
        self
    }

    pub fn with_layout(mut self, layout: JsonObject) -> Self {
        self.layout.extend(layout);
        self
    }

    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.layout
            .insert("visibility".into(), Value::from(visibility.as_str()));
        self
    }
}

/// Data source definition.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    GeoJson {
        data: FeatureCollection,
        promote_id: Option<String>,
    },
    RasterDem {
        url: String,
        tile_size: u32,
        max_zoom: u8,
    },
}

/// 3D terrain setting.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainSpec {
    pub source: String,
    pub exaggeration: f64,
}

/// Camera state.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Camera {
    pub center: LngLat,
    pub zoom: f64,
    #[serde(default)]
    pub bearing: f64,
    #[serde(default)]
    pub pitch: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            center: LngLat::new(-73.31708, 42.36243),
            zoom: 11.81,
            bearing: 0.0,
            pitch: 0.0,
        }
    }
}

/// Marker placed on the map for a pin.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSpec {
    pub at: LngLat,
    pub color: String,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(pub u64);

/// Popup content as label/value rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub at: LngLat,
    pub rows: Vec<(String, String)>,
}

/// Pointer affordance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor {
    #[default]
    Default,
    Crosshair,
}

/// Imperative API of the map rendering engine.
pub trait Renderer {
    fn has_source(&self, id: &str) -> bool;
    fn add_source(&mut self, id: &str, source: SourceSpec) -> Result<(), RenderError>;
    fn remove_source(&mut self, id: &str) -> Result<(), RenderError>;
    /// Replaces the data of an existing GeoJSON source.
    fn set_source_data(&mut self, id: &str, data: FeatureCollection) -> Result<(), RenderError>;

    fn has_layer(&self, id: &str) -> bool;
    /// Adds a layer on top of the stack, or directly below `before`.
    fn add_layer(&mut self, layer: LayerSpec, before: Option<&str>) -> Result<(), RenderError>;
    fn remove_layer(&mut self, id: &str) -> Result<(), RenderError>;
    /// Layer ids bottom to top.
    fn layer_ids(&self) -> Vec<String>;

    fn paint_property(&self, layer: &str, name: &str) -> Option<Value>;
    fn set_paint_property(&mut self, layer: &str, name: &str, value: Value)
        -> Result<(), RenderError>;
    fn layout_property(&self, layer: &str, name: &str) -> Option<Value>;
    fn set_layout_property(
        &mut self,
        layer: &str,
        name: &str,
        value: Value,
    ) -> Result<(), RenderError>;
    fn set_filter(&mut self, layer: &str, filter: Option<Value>) -> Result<(), RenderError>;

    fn set_terrain(&mut self, terrain: Option<TerrainSpec>);
    /// Terrain elevation in metres, `None` when no terrain covers `at`.
    fn query_elevation(&self, at: LngLat) -> Option<f64>;
    /// Features of the given layers rendered at `at`.
    fn query_rendered_features(&self, at: LngLat, layers: &[&str]) -> Vec<Feature>;

    fn camera(&self) -> Camera;
    fn jump_to(&mut self, camera: Camera);
    fn fly_to(&mut self, center: LngLat, zoom: Option<f64>);
    fn fit_bounds(&mut self, bounds: &LngLatBounds, padding: f64);

    fn add_marker(&mut self, marker: MarkerSpec) -> MarkerId;
    fn remove_marker(&mut self, id: MarkerId);
    fn show_popup(&mut self, popup: Popup);

    fn has_image(&self, name: &str) -> bool;
    fn add_image(&mut self, name: &str, bytes: Vec<u8>);

    fn set_cursor(&mut self, cursor: Cursor);
    /// Swaps the base style. Sources, layers and terrain added by the
    /// application are discarded; markers and popups survive.
    fn set_style(&mut self, style: &str);

    /// Current visibility of `id`, `None` if the layer does not exist.
    fn visibility(&self, id: &str) -> Option<Visibility> {
        if !self.has_layer(id) {
            return None;
        }
        Some(Visibility::from_value(
            self.layout_property(id, "visibility").as_ref(),
        ))
    }

    fn set_visibility(&mut self, id: &str, visibility: Visibility) -> Result<(), RenderError> {
        self.set_layout_property(id, "visibility", Value::from(visibility.as_str()))
    }
}

/// Adds `layer` directly below the first anchor that exists, falling back to
/// the top of the stack. Returns the anchor used.
pub fn add_layer_below_any(
    renderer: &mut dyn Renderer,
    layer: LayerSpec,
    anchors: &[String],
) -> Result<Option<String>, RenderError> {
    for anchor in anchors {
        match renderer.add_layer(layer.clone(), Some(anchor)) {
            Ok(()) => return Ok(Some(anchor.clone())),
            Err(RenderError::MissingAnchor(_)) => {
                debug!("anchor {anchor} unavailable for {}", layer.id);
            }
            Err(e) => return Err(e),
        }
    }
    renderer.add_layer(layer, None).map(|_| None)
}
