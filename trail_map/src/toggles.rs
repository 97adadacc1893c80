//! Layer toggle panel state.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::context::MapContext;
use crate::io::DatasetSource;
use crate::layers::{LayerRegistry, ReconcileOptions};
use crate::render::{RenderError, Renderer, Visibility};
use crate::styles::Swatch;

/// One checkbox of the layer panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleItem {
    pub layer_id: String,
    pub label: String,
    /// Layers that always follow the primary layer's visibility.
    #[serde(default)]
    pub coupled: Vec<String>,
}

impl ToggleItem {
    pub fn new(layer_id: &str, label: &str) -> Self {
        Self {
            layer_id: layer_id.to_string(),
            label: label.to_string(),
            coupled: Vec::new(),
        }
    }

    pub fn coupled_with(mut self, layer_id: &str) -> Self {
        self.coupled.push(layer_id.to_string());
        self
    }
}

/// A rendered panel row.
#[derive(Debug, Clone, PartialEq)]
pub struct ToggleRow {
    pub layer_id: String,
    pub label: String,
    pub checked: bool,
    pub swatch: Option<Swatch>,
}

#[derive(Debug, Clone)]
pub struct ToggleController {
    items: Vec<ToggleItem>,
    shading_layer_id: String,
}

impl ToggleController {
    pub fn new(items: Vec<ToggleItem>, shading_layer_id: &str) -> Self {
        Self {
            items,
            shading_layer_id: shading_layer_id.to_string(),
        }
    }

    pub fn items(&self) -> &[ToggleItem] {
        &self.items
    }

    pub fn shading_layer_id(&self) -> &str {
        &self.shading_layer_id
    }

    /// Sets visibility of `id`; absent layers are ignored.
    pub fn set_visibility(
        renderer: &mut dyn Renderer,
        id: &str,
        visible: bool,
    ) -> Result<(), RenderError> {
        if !renderer.has_layer(id) {
            debug!("toggle: {id} absent, ignoring");
            return Ok(());
        }
        renderer.set_visibility(id, Visibility::from_bool(visible))
    }

    /// Applies a checkbox change to the primary layer and every coupled layer.
    ///
    /// Switching on the terrain-shading layer before it exists runs a full
    /// reconciliation first.
    pub fn toggle(
        &self,
        ctx: &mut MapContext,
        renderer: &mut dyn Renderer,
        registry: &LayerRegistry,
        source: &dyn DatasetSource,
        id: &str,
        visible: bool,
    ) -> Result<(), RenderError> {
        if id == self.shading_layer_id {
            ctx.shading_desired_visible = visible;
            if !renderer.has_layer(id) {
                info!("toggle: materializing {id}");
                registry.reconcile(ctx, renderer, source, ReconcileOptions::default());
            }
        }
        Self::set_visibility(renderer, id, visible)?;
        if let Some(item) = self.items.iter().find(|i| i.layer_id == id) {
            for coupled in &item.coupled {
                Self::set_visibility(renderer, coupled, visible)?;
            }
        }
        Ok(())
    }

    /// Rebuilds the panel rows from the current renderer state.
    ///
    /// Only existing layers get a row, except the terrain-shading item which
    /// is always listed.
    pub fn build_rows(
        &self,
        ctx: &MapContext,
        renderer: &dyn Renderer,
        registry: &LayerRegistry,
    ) -> Vec<ToggleRow> {
        let mut rows = Vec::new();
        for item in &self.items {
            let is_shading = item.layer_id == self.shading_layer_id;
            let checked = match renderer.visibility(&item.layer_id) {
                Some(v) => v.is_visible(),
                None if is_shading => ctx.shading_desired_visible,
                None => continue,
            };
            let swatch = registry
                .overlay_for(&item.layer_id)
                .and_then(|cfg| cfg.swatch_for(&item.layer_id));
            rows.push(ToggleRow {
                layer_id: item.layer_id.clone(),
                label: item.label.clone(),
                checked,
                swatch,
            });
        }
        rows
    }

    /// Steepness intensity slider, clamped to `[0, 1]`.
    pub fn set_shading_intensity(
        &self,
        renderer: &mut dyn Renderer,
        value: f64,
    ) -> Result<f64, RenderError> {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        if renderer.has_layer(&self.shading_layer_id) {
            renderer.set_paint_property(
                &self.shading_layer_id,
                "hillshade-exaggeration",
                json!(value),
            )?;
        }
        Ok(value)
    }
}
