//! Headless in-memory renderer.
//!
//! Keeps the layer stack, sources and camera the way a style-driven map
//! engine would, without drawing anything. Hit testing covers fill layers
//! over polygon geometry; elevation comes from an optional [`Tin`] surface
//! and is only reported while terrain is enabled.

use std::collections::{BTreeMap, HashMap};

use geojson::{Feature, FeatureCollection, JsonObject};
use serde_json::Value;

use super::{
    Camera, Cursor, LayerSpec, LayerType, MarkerId, MarkerSpec, Popup, RenderError, Renderer,
    SourceSpec, TerrainSpec, Visibility,
};
use crate::dtm::Tin;
use crate::geometry::{point_in_polygon, LngLat, LngLatBounds};

/// Base style layers that application layers can be anchored to.
pub fn default_styles() -> HashMap<String, Vec<String>> {
    let outdoors = ["land", "water", "road-street", "waterway-label", "road-label", "poi-label"];
    let streets = ["land", "water", "road-street", "road-label", "poi-label"];
    let satellite = ["satellite"];
    [
        ("outdoors", &outdoors[..]),
        ("streets", &streets[..]),
        ("satellite", &satellite[..]),
    ]
    .into_iter()
    .map(|(name, layers)| {
        (
            name.to_string(),
            layers.iter().map(|l| l.to_string()).collect(),
        )
    })
    .collect()
}

fn base_layer_kind(id: &str) -> LayerType {
    if id.ends_with("-label") {
        LayerType::Symbol
    } else if id.starts_with("road") {
        LayerType::Line
    } else if id == "satellite" {
        LayerType::Raster
    } else {
        LayerType::Fill
    }
}

#[derive(Debug, Clone)]
pub struct SceneRenderer {
    styles: HashMap<String, Vec<String>>,
    style: String,
    base_layers: Vec<LayerSpec>,
    layers: Vec<LayerSpec>,
    sources: BTreeMap<String, SourceSpec>,
    terrain: Option<TerrainSpec>,
    surface: Option<Tin>,
    camera: Camera,
    markers: BTreeMap<MarkerId, MarkerSpec>,
    next_marker: u64,
    popups: Vec<Popup>,
    images: BTreeMap<String, Vec<u8>>,
    cursor: Cursor,
}

impl SceneRenderer {
    /// Creates a renderer showing `style` from the default style set.
    pub fn new(style: &str) -> Self {
        Self::with_styles(default_styles(), style)
    }

    pub fn with_styles(styles: HashMap<String, Vec<String>>, style: &str) -> Self {
        let mut scene = Self {
            styles,
            style: String::new(),
            base_layers: Vec::new(),
            layers: Vec::new(),
            sources: BTreeMap::new(),
            terrain: None,
            surface: None,
            camera: Camera::default(),
            markers: BTreeMap::new(),
            next_marker: 1,
            popups: Vec::new(),
            images: BTreeMap::new(),
            cursor: Cursor::Default,
        };
        scene.set_style(style);
        scene
    }

    /// Attaches the elevation surface sampled when terrain is enabled.
    pub fn with_surface(mut self, surface: Tin) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn style(&self) -> &str {
        &self.style
    }

    pub fn layer(&self, id: &str) -> Option<&LayerSpec> {
        self.base_layers
            .iter()
            .chain(self.layers.iter())
            .find(|l| l.id == id)
    }

    pub fn source(&self, id: &str) -> Option<&SourceSpec> {
        self.sources.get(id)
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    pub fn terrain(&self) -> Option<&TerrainSpec> {
        self.terrain.as_ref()
    }

    pub fn markers(&self) -> impl Iterator<Item = (&MarkerId, &MarkerSpec)> {
        self.markers.iter()
    }

    pub fn popups(&self) -> &[Popup] {
        &self.popups
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Returns `true` for layers that belong to the base style.
    pub fn is_base_layer(&self, id: &str) -> bool {
        self.base_layers.iter().any(|l| l.id == id)
    }

    fn layer_mut(&mut self, id: &str) -> Result<&mut LayerSpec, RenderError> {
        self.base_layers
            .iter_mut()
            .chain(self.layers.iter_mut())
            .find(|l| l.id == id)
            .ok_or_else(|| RenderError::MissingLayer(id.to_string()))
    }

    fn hit_features(&self, layer: &LayerSpec, at: LngLat) -> Vec<Feature> {
        if layer.kind != LayerType::Fill || !layout_visible(&layer.layout) {
            return Vec::new();
        }
        let Some(SourceSpec::GeoJson { data, .. }) =
            layer.source.as_deref().and_then(|s| self.sources.get(s))
        else {
            return Vec::new();
        };
        data.features
            .iter()
            .filter(|f| filter_matches(layer.filter.as_ref(), f.properties.as_ref()))
            .filter(|f| feature_contains(f, at))
            .cloned()
            .collect()
    }
}

fn layout_visible(layout: &JsonObject) -> bool {
    Visibility::from_value(layout.get("visibility")).is_visible()
}

/// Evaluates boolean literals and the `["==", ["get", key], value]` filter
/// form; other expressions pass every feature.
fn filter_matches(filter: Option<&Value>, properties: Option<&JsonObject>) -> bool {
    if let Some(Value::Bool(literal)) = filter {
        return *literal;
    }
    let Some(expr) = filter.and_then(Value::as_array) else {
        return true;
    };
    match (expr.first().and_then(Value::as_str), expr.get(1), expr.get(2)) {
        (Some("=="), Some(Value::Array(get)), Some(expected))
            if get.first().and_then(Value::as_str) == Some("get") =>
        {
            let key = get.get(1).and_then(Value::as_str).unwrap_or_default();
            let actual = properties.and_then(|p| p.get(key)).unwrap_or(&Value::Null);
            actual == expected
        }
        _ => true,
    }
}

fn ring(points: &[Vec<f64>]) -> Vec<LngLat> {
    points
        .iter()
        .filter(|p| p.len() >= 2)
        .map(|p| LngLat::new(p[0], p[1]))
        .collect()
}

fn feature_contains(feature: &Feature, at: LngLat) -> bool {
    let Some(geometry) = &feature.geometry else {
        return false;
    };
    match &geometry.value {
        geojson::Value::Polygon(rings) => {
            let rings: Vec<_> = rings.iter().map(|r| ring(r)).collect();
            point_in_polygon(at, &rings)
        }
        geojson::Value::MultiPolygon(polygons) => polygons.iter().any(|rings| {
            let rings: Vec<_> = rings.iter().map(|r| ring(r)).collect();
            point_in_polygon(at, &rings)
        }),
        _ => false,
    }
}

impl Renderer for SceneRenderer {
    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn add_source(&mut self, id: &str, source: SourceSpec) -> Result<(), RenderError> {
        if self.sources.contains_key(id) {
            return Err(RenderError::DuplicateSource(id.to_string()));
        }
        self.sources.insert(id.to_string(), source);
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<(), RenderError> {
        self.sources
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RenderError::MissingSource(id.to_string()))
    }

    fn set_source_data(&mut self, id: &str, data: FeatureCollection) -> Result<(), RenderError> {
        match self.sources.get_mut(id) {
            Some(SourceSpec::GeoJson { data: current, .. }) => {
                *current = data;
                Ok(())
            }
            _ => Err(RenderError::MissingSource(id.to_string())),
        }
    }

    fn has_layer(&self, id: &str) -> bool {
        self.is_base_layer(id) || self.layers.iter().any(|l| l.id == id)
    }

    fn add_layer(&mut self, layer: LayerSpec, before: Option<&str>) -> Result<(), RenderError> {
        if self.has_layer(&layer.id) {
            return Err(RenderError::DuplicateLayer(layer.id));
        }
        if let Some(source) = &layer.source {
            if !self.sources.contains_key(source) {
                return Err(RenderError::MissingSource(source.clone()));
            }
        }
        match before {
            None => self.layers.push(layer),
            Some(anchor) if self.is_base_layer(anchor) => {
                // Base style layers sit below every application layer.
                self.layers.insert(0, layer)
            }
            Some(anchor) => {
                let idx = self
                    .layers
                    .iter()
                    .position(|l| l.id == anchor)
                    .ok_or_else(|| RenderError::MissingAnchor(anchor.to_string()))?;
                self.layers.insert(idx, layer);
            }
        }
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), RenderError> {
        if let Some(idx) = self.layers.iter().position(|l| l.id == id) {
            self.layers.remove(idx);
        } else if let Some(idx) = self.base_layers.iter().position(|l| l.id == id) {
            self.base_layers.remove(idx);
        } else {
            return Err(RenderError::MissingLayer(id.to_string()));
        }
        Ok(())
    }

    fn layer_ids(&self) -> Vec<String> {
        self.base_layers
            .iter()
            .chain(self.layers.iter())
            .map(|l| l.id.clone())
            .collect()
    }

    fn paint_property(&self, layer: &str, name: &str) -> Option<Value> {
        self.layer(layer).and_then(|l| l.paint.get(name).cloned())
    }

    fn set_paint_property(
        &mut self,
        layer: &str,
        name: &str,
        value: Value,
    ) -> Result<(), RenderError> {
        self.layer_mut(layer)?.paint.insert(name.to_string(), value);
        Ok(())
    }

    fn layout_property(&self, layer: &str, name: &str) -> Option<Value> {
        self.layer(layer).and_then(|l| l.layout.get(name).cloned())
    }

    fn set_layout_property(
        &mut self,
        layer: &str,
        name: &str,
        value: Value,
    ) -> Result<(), RenderError> {
        self.layer_mut(layer)?.layout.insert(name.to_string(), value);
        Ok(())
    }

    fn set_filter(&mut self, layer: &str, filter: Option<Value>) -> Result<(), RenderError> {
        self.layer_mut(layer)?.filter = filter;
        Ok(())
    }

    fn set_terrain(&mut self, terrain: Option<TerrainSpec>) {
        self.terrain = terrain;
    }

    fn query_elevation(&self, at: LngLat) -> Option<f64> {
        self.terrain.as_ref()?;
        self.surface.as_ref()?.elevation_at(at)
    }

    fn query_rendered_features(&self, at: LngLat, layers: &[&str]) -> Vec<Feature> {
        layers
            .iter()
            .filter_map(|id| self.layer(id))
            .flat_map(|layer| self.hit_features(layer, at))
            .collect()
    }

    fn camera(&self) -> Camera {
        self.camera
    }

    fn jump_to(&mut self, camera: Camera) {
        self.camera = camera;
    }

    fn fly_to(&mut self, center: LngLat, zoom: Option<f64>) {
        self.camera.center = center;
        if let Some(zoom) = zoom {
            self.camera.zoom = zoom;
        }
    }

    fn fit_bounds(&mut self, bounds: &LngLatBounds, _padding: f64) {
        let (Some(sw), Some(ne)) = (bounds.south_west(), bounds.north_east()) else {
            return;
        };
        let span = (ne.lng - sw.lng).max(ne.lat - sw.lat);
        let zoom = if span > 0.0 {
            (360.0 / span).log2().clamp(0.0, 22.0)
        } else {
            22.0
        };
        self.camera.center = sw.lerp(ne, 0.5);
        self.camera.zoom = zoom;
    }

    fn add_marker(&mut self, marker: MarkerSpec) -> MarkerId {
        let id = MarkerId(self.next_marker);
        self.next_marker += 1;
        self.markers.insert(id, marker);
        id
    }

    fn remove_marker(&mut self, id: MarkerId) {
        self.markers.remove(&id);
    }

    fn show_popup(&mut self, popup: Popup) {
        // One popup at a time; a new click closes the previous one.
        self.popups.clear();
        self.popups.push(popup);
    }

    fn has_image(&self, name: &str) -> bool {
        self.images.contains_key(name)
    }

    fn add_image(&mut self, name: &str, bytes: Vec<u8>) {
        self.images.insert(name.to_string(), bytes);
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }

    fn set_style(&mut self, style: &str) {
        self.style = style.to_string();
        self.base_layers = self
            .styles
            .get(style)
            .map(|ids| {
                ids.iter()
                    .map(|id| LayerSpec::new(id.as_str(), base_layer_kind(id)))
                    .collect()
            })
            .unwrap_or_default();
        self.layers.clear();
        self.sources.clear();
        self.terrain = None;
        self.images.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point3;
    use crate::render::match_nothing;
    use serde_json::json;

    fn square_collection() -> FeatureCollection {
        let fc = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "MAP_PAR_ID": "7-12" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]]
                }
            }]
        });
        serde_json::from_value(fc).unwrap()
    }

    #[test]
    fn anchors_follow_style() {
        let mut scene = SceneRenderer::new("outdoors");
        assert!(scene.has_layer("waterway-label"));
        let layer = LayerSpec::new("steepness", LayerType::Hillshade);
        assert!(scene.add_layer(layer.clone(), Some("waterway-label")).is_ok());

        scene.set_style("satellite");
        assert!(!scene.has_layer("steepness"));
        assert_eq!(
            scene.add_layer(layer, Some("waterway-label")),
            Err(RenderError::MissingAnchor("waterway-label".into()))
        );
    }

    #[test]
    fn base_layers_accept_property_changes() {
        let mut scene = SceneRenderer::new("outdoors");
        assert_eq!(scene.visibility("water"), Some(Visibility::Visible));
        scene.set_visibility("water", Visibility::None).unwrap();
        assert_eq!(scene.visibility("water"), Some(Visibility::None));
        scene
            .set_paint_property("water", "fill-color", json!("#0000ff"))
            .unwrap();
        assert_eq!(scene.paint_property("water", "fill-color"), Some(json!("#0000ff")));
        assert_eq!(scene.layer("road-label").map(|l| l.kind), Some(LayerType::Symbol));

        scene.set_style("outdoors");
        assert_eq!(scene.visibility("water"), Some(Visibility::Visible));
    }

    #[test]
    fn literal_false_filter_matches_nothing() {
        let props = json!({ "MAP_PAR_ID": null }).as_object().cloned();
        assert!(!filter_matches(Some(&match_nothing()), props.as_ref()));
        assert!(!filter_matches(Some(&match_nothing()), None));
        assert!(filter_matches(Some(&json!(true)), None));
    }

    #[test]
    fn duplicate_layer_rejected() {
        let mut scene = SceneRenderer::new("outdoors");
        scene.add_layer(LayerSpec::new("a", LayerType::Sky), None).unwrap();
        assert_eq!(
            scene.add_layer(LayerSpec::new("a", LayerType::Sky), None),
            Err(RenderError::DuplicateLayer("a".into()))
        );
    }

    #[test]
    fn insert_before_application_layer() {
        let mut scene = SceneRenderer::new("satellite");
        scene.add_layer(LayerSpec::new("top", LayerType::Sky), None).unwrap();
        scene
            .add_layer(LayerSpec::new("below", LayerType::Sky), Some("top"))
            .unwrap();
        assert_eq!(scene.layer_ids(), vec!["satellite", "below", "top"]);
    }

    #[test]
    fn hit_test_respects_visibility_and_filter() {
        let mut scene = SceneRenderer::new("outdoors");
        scene
            .add_source(
                "parcels",
                SourceSpec::GeoJson {
                    data: square_collection(),
                    promote_id: None,
                },
            )
            .unwrap();
        scene
            .add_layer(
                LayerSpec::new("parcels-hit", LayerType::Fill).with_source("parcels"),
                None,
            )
            .unwrap();
        let inside = LngLat::new(0.5, 0.5);
        assert_eq!(scene.query_rendered_features(inside, &["parcels-hit"]).len(), 1);
        assert!(scene
            .query_rendered_features(LngLat::new(2.0, 2.0), &["parcels-hit"])
            .is_empty());

        scene
            .set_filter("parcels-hit", Some(json!(["==", ["get", "MAP_PAR_ID"], "other"])))
            .unwrap();
        assert!(scene.query_rendered_features(inside, &["parcels-hit"]).is_empty());

        scene.set_filter("parcels-hit", None).unwrap();
        scene
            .set_visibility("parcels-hit", Visibility::None)
            .unwrap();
        assert!(scene.query_rendered_features(inside, &["parcels-hit"]).is_empty());
    }

    #[test]
    fn elevation_requires_terrain() {
        let tin = Tin::from_points(vec![
            Point3::new(0.0, 0.0, 10.0),
            Point3::new(1.0, 0.0, 10.0),
            Point3::new(0.0, 1.0, 10.0),
        ]);
        let mut scene = SceneRenderer::new("outdoors").with_surface(tin);
        let at = LngLat::new(0.2, 0.2);
        assert_eq!(scene.query_elevation(at), None);
        scene.set_terrain(Some(TerrainSpec {
            source: "terrain-dem".into(),
            exaggeration: 1.3,
        }));
        assert!((scene.query_elevation(at).unwrap() - 10.0).abs() < 1e-9);
    }
}
