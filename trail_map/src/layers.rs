//! Overlay layer declarations and their reconciliation against the renderer.
//!
//! Every overlay is described once by a [`LayerConfig`]. [`LayerRegistry::reconcile`]
//! makes the renderer's source/layer set match those declarations. It only
//! ever adds what is missing, so it can run on initial load, after every
//! base-style swap and from a lazy toggle without producing duplicates.

use geojson::{FeatureCollection, JsonObject};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::context::MapContext;
use crate::geometry::{extend_from_feature_collection, LngLatBounds};
use crate::io::{DatasetSource, FetchError};
use crate::render::{
    add_layer_below_any, match_nothing, LayerSpec, LayerType, RenderError, Renderer, SourceSpec, TerrainSpec,
    Visibility,
};
use crate::styles::{
    FillPaint, HillshadeStyle, LineLayout, LinePaint, SkyStyle, Swatch, TextStyle,
};

/// Property names tried, in order, when a line label key is not declared.
pub const LABEL_KEY_CANDIDATES: [&str; 10] = [
    "name", "Name", "NAME", "label", "Label", "LABEL", "elev", "elevation", "ELEV", "ELEVATION",
];

/// Returns the first label candidate present in `properties`.
pub fn detect_label_key(properties: &JsonObject) -> Option<&'static str> {
    LABEL_KEY_CANDIDATES
        .iter()
        .copied()
        .find(|k| properties.contains_key(*k))
}

/// Renderer layers materialized for one overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubLayer {
    Fill {
        paint: FillPaint,
    },
    Line {
        paint: LinePaint,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        layout: Option<LineLayout>,
    },
    /// Point symbols for features whose `property` equals `value`.
    CategorySymbol {
        property: String,
        value: String,
        /// Sprite names tried in order.
        #[serde(default)]
        icons: Vec<String>,
        /// Optional custom image loaded from the dataset source.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        icon_asset: Option<IconAsset>,
    },
    /// Text placed along lines.
    LineLabel {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        text: TextStyle,
    },
    /// Text placed at each feature from a fixed property.
    FeatureLabel {
        property: String,
        text: TextStyle,
    },
    /// Nearly transparent fill capturing clicks.
    HitTest,
    /// Fill shown only for the selected feature.
    Highlight {
        id_property: String,
        paint: FillPaint,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IconAsset {
    pub name: String,
    pub path: String,
}

fn slug(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

impl SubLayer {
    /// Renderer layer id derived from the overlay id.
    pub fn layer_id(&self, overlay: &str) -> String {
        match self {
            SubLayer::Fill { .. } => format!("{overlay}-fill"),
            SubLayer::Line { .. } => format!("{overlay}-line"),
            SubLayer::CategorySymbol { value, .. } => format!("{overlay}-{}", slug(value)),
            SubLayer::LineLabel { .. } | SubLayer::FeatureLabel { .. } => {
                format!("{overlay}-label")
            }
            SubLayer::HitTest => format!("{overlay}-hit"),
            SubLayer::Highlight { .. } => format!("{overlay}-highlight"),
        }
    }

    /// Builds the layer definition. `None` when the layer cannot be built
    /// from this payload, e.g. a line label without any label property.
    fn build(
        &self,
        overlay: &str,
        ctx: &mut MapContext,
        payload: &FeatureCollection,
    ) -> Option<LayerSpec> {
        let id = self.layer_id(overlay);
        let spec = match self {
            SubLayer::Fill { paint } => LayerSpec::new(id, LayerType::Fill).with_paint(paint.to_paint()),
            SubLayer::Line { paint, layout } => {
                let spec = LayerSpec::new(id, LayerType::Line).with_paint(paint.to_paint());
                match layout {
                    Some(layout) => spec.with_layout(layout.to_layout()),
                    None => spec,
                }
            }
            SubLayer::CategorySymbol {
                property,
                value,
                icons,
                icon_asset,
            } => {
                let mut images: Vec<Value> = Vec::new();
                if let Some(asset) = icon_asset {
                    images.push(json!(["image", asset.name]));
                }
                images.extend(icons.iter().map(|i| json!(["image", i])));
                let mut layout = JsonObject::new();
                let mut icon_image = vec![json!("coalesce")];
                icon_image.extend(images);
                layout.insert("icon-image".into(), Value::Array(icon_image));
                layout.insert("icon-size".into(), json!(1.0));
                layout.insert("icon-allow-overlap".into(), json!(true));
                LayerSpec::new(id, LayerType::Symbol)
                    .with_layout(layout)
                    .with_filter(json!(["==", ["get", property], value]))
            }
            SubLayer::LineLabel { key, text } => {
                let key = resolve_label_key(overlay, key.as_deref(), ctx, payload)?;
                let mut layout = JsonObject::new();
                layout.insert("symbol-placement".into(), json!("line"));
                layout.insert("text-field".into(), json!(["coalesce", ["get", key], ""]));
                layout.insert("text-size".into(), json!(text.size));
                layout.insert("text-rotation-alignment".into(), json!("map"));
                layout.insert("text-keep-upright".into(), json!(true));
                layout.insert("text-padding".into(), json!(1));
                LayerSpec::new(id, LayerType::Symbol)
                    .with_layout(layout)
                    .with_paint(text.to_paint())
            }
            SubLayer::FeatureLabel { property, text } => {
                let mut layout = JsonObject::new();
                layout.insert(
                    "text-field".into(),
                    json!(["coalesce", ["get", property], ""]),
                );
                layout.insert("text-size".into(), json!(text.size));
                layout.insert("text-allow-overlap".into(), json!(false));
                LayerSpec::new(id, LayerType::Symbol)
                    .with_layout(layout)
                    .with_paint(text.to_paint())
            }
            SubLayer::HitTest => LayerSpec::new(id, LayerType::Fill)
                .with_paint(FillPaint::new("#000000", 0.001).to_paint()),
            SubLayer::Highlight { id_property, paint } => LayerSpec::new(id, LayerType::Fill)
                .with_paint(paint.to_paint())
                .with_filter(match_nothing())
                .with_visibility(Visibility::None),
        };
        Some(spec.with_source(overlay))
    }
}

/// Explicit key, then the key cached for this overlay, then detection from
/// the first feature. A found key is cached.
fn resolve_label_key(
    overlay: &str,
    explicit: Option<&str>,
    ctx: &mut MapContext,
    payload: &FeatureCollection,
) -> Option<String> {
    let key = explicit
        .map(str::to_string)
        .or_else(|| ctx.label_keys.get(overlay).cloned())
        .or_else(|| {
            payload
                .features
                .first()
                .and_then(|f| f.properties.as_ref())
                .and_then(detect_label_key)
                .map(str::to_string)
        })?;
    ctx.label_keys.insert(overlay.to_string(), key.clone());
    Some(key)
}

/// Static description of one overlay dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub id: String,
    pub source_file: String,
    #[serde(default)]
    pub sublayers: Vec<SubLayer>,
}

impl LayerConfig {
    pub fn new(id: &str, source_file: &str) -> Self {
        Self {
            id: id.to_string(),
            source_file: source_file.to_string(),
            sublayers: Vec::new(),
        }
    }

    pub fn with(mut self, sublayer: SubLayer) -> Self {
        self.sublayers.push(sublayer);
        self
    }

    pub fn with_line(self, paint: LinePaint, layout: Option<LineLayout>) -> Self {
        self.with(SubLayer::Line { paint, layout })
    }

    pub fn with_fill(self, paint: FillPaint) -> Self {
        self.with(SubLayer::Fill { paint })
    }

    pub fn sublayer_ids(&self) -> Vec<String> {
        self.sublayers.iter().map(|s| s.layer_id(&self.id)).collect()
    }

    /// Legend swatch for one of this overlay's layers.
    pub fn swatch_for(&self, layer_id: &str) -> Option<Swatch> {
        self.sublayers
            .iter()
            .find(|s| s.layer_id(&self.id) == layer_id)
            .and_then(|s| match s {
                SubLayer::Line { paint, .. } => Some(Swatch::from_line(paint)),
                SubLayer::Fill { paint } => Some(Swatch::from_fill(paint)),
                _ => None,
            })
    }
}

/// Raster terrain, its shading layer and the sky.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    pub source_id: String,
    pub url: String,
    pub tile_size: u32,
    pub max_zoom: u8,
    pub exaggeration: f64,
    /// Id of the lazily created terrain-shading layer.
    pub shading_layer_id: String,
    pub shading: HillshadeStyle,
    /// Base-style layers the shading is inserted below, in preference order.
    pub anchors: Vec<String>,
    pub sky: Option<SkyStyle>,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            source_id: "terrain-dem".into(),
            url: "mapbox://mapbox.terrain-rgb".into(),
            tile_size: 512,
            max_zoom: 14,
            exaggeration: 1.3,
            shading_layer_id: "steepness".into(),
            shading: HillshadeStyle::default(),
            anchors: vec!["waterway-label".into(), "road-label".into()],
            sky: Some(SkyStyle::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Fit the camera to the overlays if this is the first reconciliation.
    pub auto_fit: bool,
}

#[derive(Debug)]
pub struct SkippedLayer {
    pub id: String,
    pub error: FetchError,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub added_sources: Vec<String>,
    pub added_layers: Vec<String>,
    pub skipped: Vec<SkippedLayer>,
    pub fitted: Option<LngLatBounds>,
}

/// Declared overlays plus terrain, reconciled against a renderer.
#[derive(Debug, Clone)]
pub struct LayerRegistry {
    layers: Vec<LayerConfig>,
    terrain: TerrainConfig,
    fit_padding: f64,
}

impl LayerRegistry {
    pub fn new(layers: Vec<LayerConfig>, terrain: TerrainConfig, fit_padding: f64) -> Self {
        Self {
            layers,
            terrain,
            fit_padding,
        }
    }

    pub fn layers(&self) -> &[LayerConfig] {
        &self.layers
    }

    pub fn terrain(&self) -> &TerrainConfig {
        &self.terrain
    }

    /// Overlay owning the renderer layer `layer_id`.
    pub fn overlay_for(&self, layer_id: &str) -> Option<&LayerConfig> {
        self.layers
            .iter()
            .find(|cfg| cfg.sublayers.iter().any(|s| s.layer_id(&cfg.id) == layer_id))
    }

    /// Ensures every declared source and layer exists.
    ///
    /// A dataset that cannot be fetched or parsed skips its own overlay only.
    /// Nothing is ever added twice.
    pub fn reconcile(
        &self,
        ctx: &mut MapContext,
        renderer: &mut dyn Renderer,
        source: &dyn DatasetSource,
        options: ReconcileOptions,
    ) -> ReconcileReport {
        info!("reconcile: start (auto_fit={})", options.auto_fit);
        let mut report = ReconcileReport::default();
        self.ensure_terrain(ctx, renderer, &mut report);
        self.ensure_sky(renderer, &mut report);

        let mut bounds = LngLatBounds::new();
        let mut have_bounds = false;
        for cfg in &self.layers {
            let payload = match source.fetch_collection(&cfg.source_file) {
                Ok(payload) => payload,
                Err(error) => {
                    warn!("reconcile: skip {}: {error}", cfg.id);
                    report.skipped.push(SkippedLayer {
                        id: cfg.id.clone(),
                        error,
                    });
                    continue;
                }
            };
            if extend_from_feature_collection(&mut bounds, &payload) {
                have_bounds = true;
            }
            if let Err(e) = self.materialize(cfg, &payload, ctx, renderer, source, &mut report) {
                warn!("reconcile: {} incomplete: {e}", cfg.id);
            }
        }

        if options.auto_fit && !ctx.overlays_initialized && have_bounds && bounds.is_finite() {
            info!("reconcile: fit bounds on first load");
            renderer.fit_bounds(&bounds, self.fit_padding);
            report.fitted = Some(bounds);
        } else {
            debug!(
                "reconcile: skip fit (auto_fit={}, initialized={}, have_bounds={})",
                options.auto_fit, ctx.overlays_initialized, have_bounds
            );
        }
        ctx.overlays_initialized = true;
        info!(
            "reconcile: done, {} layers added, {} skipped",
            report.added_layers.len(),
            report.skipped.len()
        );
        report
    }

    fn materialize(
        &self,
        cfg: &LayerConfig,
        payload: &FeatureCollection,
        ctx: &mut MapContext,
        renderer: &mut dyn Renderer,
        source: &dyn DatasetSource,
        report: &mut ReconcileReport,
    ) -> Result<(), RenderError> {
        if !renderer.has_source(&cfg.id) {
            renderer.add_source(
                &cfg.id,
                SourceSpec::GeoJson {
                    data: payload.clone(),
                    promote_id: Some("id".into()),
                },
            )?;
            report.added_sources.push(cfg.id.clone());
        }
        for sub in &cfg.sublayers {
            let id = sub.layer_id(&cfg.id);
            if renderer.has_layer(&id) {
                continue;
            }
            if let SubLayer::CategorySymbol {
                icon_asset: Some(asset),
                ..
            } = sub
            {
                ensure_icon(renderer, source, asset);
            }
            let Some(spec) = sub.build(&cfg.id, ctx, payload) else {
                debug!("reconcile: nothing to build for {id}");
                continue;
            };
            renderer.add_layer(spec, None)?;
            debug!("reconcile: added layer {id}");
            report.added_layers.push(id);
        }
        Ok(())
    }

    fn ensure_terrain(
        &self,
        ctx: &MapContext,
        renderer: &mut dyn Renderer,
        report: &mut ReconcileReport,
    ) {
        let t = &self.terrain;
        if !renderer.has_source(&t.source_id) {
            let dem = SourceSpec::RasterDem {
                url: t.url.clone(),
                tile_size: t.tile_size,
                max_zoom: t.max_zoom,
            };
            match renderer.add_source(&t.source_id, dem) {
                Ok(()) => report.added_sources.push(t.source_id.clone()),
                Err(e) => {
                    warn!("reconcile: terrain source unavailable: {e}");
                    return;
                }
            }
        }
        renderer.set_terrain(Some(TerrainSpec {
            source: t.source_id.clone(),
            exaggeration: t.exaggeration,
        }));

        if renderer.has_layer(&t.shading_layer_id) {
            return;
        }
        let shading = LayerSpec::new(t.shading_layer_id.clone(), LayerType::Hillshade)
            .with_source(&t.source_id)
            .with_paint(t.shading.to_paint())
            .with_visibility(Visibility::from_bool(ctx.shading_desired_visible));
        match add_layer_below_any(renderer, shading, &t.anchors) {
            Ok(Some(anchor)) => {
                info!("reconcile: added {} before {anchor}", t.shading_layer_id);
                report.added_layers.push(t.shading_layer_id.clone());
            }
            Ok(None) => {
                info!("reconcile: added {} at top", t.shading_layer_id);
                report.added_layers.push(t.shading_layer_id.clone());
            }
            Err(e) => warn!("reconcile: {} not added: {e}", t.shading_layer_id),
        }
    }

    fn ensure_sky(&self, renderer: &mut dyn Renderer, report: &mut ReconcileReport) {
        let Some(sky) = &self.terrain.sky else {
            return;
        };
        let paint = sky.to_paint();
        if renderer.has_layer("sky") {
            for (name, value) in paint {
                if let Err(e) = renderer.set_paint_property("sky", &name, value) {
                    debug!("reconcile: sky paint {name}: {e}");
                }
            }
            return;
        }
        match renderer.add_layer(LayerSpec::new("sky", LayerType::Sky).with_paint(paint), None) {
            Ok(()) => report.added_layers.push("sky".into()),
            Err(e) => warn!("reconcile: sky not added: {e}"),
        }
    }
}

/// Loads a custom icon once. Failure is ignored: the symbol layer's icon
/// chain falls back to the style sprites.
fn ensure_icon(renderer: &mut dyn Renderer, source: &dyn DatasetSource, asset: &IconAsset) {
    if renderer.has_image(&asset.name) {
        return;
    }
    match source.fetch_bytes(&asset.path) {
        Ok(bytes) => renderer.add_image(&asset.name, bytes),
        Err(e) => debug!("icon {} unavailable: {e}", asset.name),
    }
}
