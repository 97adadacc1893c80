//! Parcel inspection: popup rows and highlight for a clicked parcel.

use geojson::JsonObject;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::context::MapContext;
use crate::geometry::LngLat;
use crate::render::{match_nothing, Popup, RenderError, Renderer, Visibility};

/// Which layers and properties describe a parcel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParcelConfig {
    pub hit_layer: String,
    pub highlight_layer: String,
    pub id_property: String,
    pub owner_property: String,
    pub address_property: String,
}

impl Default for ParcelConfig {
    fn default() -> Self {
        Self {
            hit_layer: "parcels-hit".into(),
            highlight_layer: "parcels-highlight".into(),
            id_property: "MAP_PAR_ID".into(),
            owner_property: "parcel_owners_Owner Name".into(),
            address_property: "parcel_owners_Property Address".into(),
        }
    }
}

/// Parcel attributes shown in the popup. Missing values are empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParcelInfo {
    pub id: String,
    pub owner: String,
    pub address: String,
}

fn text(properties: &JsonObject, key: &str) -> String {
    match properties.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

impl ParcelInfo {
    pub fn from_properties(config: &ParcelConfig, properties: &JsonObject) -> Self {
        Self {
            id: text(properties, &config.id_property),
            owner: text(properties, &config.owner_property),
            address: text(properties, &config.address_property),
        }
    }

    pub fn rows(&self) -> Vec<(String, String)> {
        vec![
            ("Parcel".into(), self.id.clone()),
            ("Owner".into(), self.owner.clone()),
            ("Address".into(), self.address.clone()),
        ]
    }
}

/// Shows the popup for the first parcel under `at` and highlights it.
///
/// Returns `Ok(None)` when no parcel is hit or the parcel layers are not
/// materialized.
pub fn inspect(
    config: &ParcelConfig,
    ctx: &mut MapContext,
    renderer: &mut dyn Renderer,
    at: LngLat,
) -> Result<Option<ParcelInfo>, RenderError> {
    if !renderer.has_layer(&config.hit_layer) {
        return Ok(None);
    }
    let hits = renderer.query_rendered_features(at, &[config.hit_layer.as_str()]);
    let Some(properties) = hits.first().and_then(|f| f.properties.as_ref()) else {
        debug!("no parcel at {:.5}, {:.5}", at.lng, at.lat);
        return Ok(None);
    };
    let info = ParcelInfo::from_properties(config, properties);
    let raw_id = properties
        .get(&config.id_property)
        .filter(|v| !v.is_null())
        .cloned();
    renderer.show_popup(Popup {
        at,
        rows: info.rows(),
    });
    let has_highlight = renderer.has_layer(&config.highlight_layer);
    match raw_id {
        Some(raw_id) => {
            if has_highlight {
                renderer.set_filter(
                    &config.highlight_layer,
                    Some(json!(["==", ["get", config.id_property], raw_id])),
                )?;
                renderer.set_visibility(&config.highlight_layer, Visibility::Visible)?;
            }
            ctx.selected_parcel = Some(info.id.clone());
        }
        None => {
            debug!("parcel without {}, not highlighted", config.id_property);
            if has_highlight {
                renderer.set_filter(&config.highlight_layer, Some(match_nothing()))?;
                renderer.set_visibility(&config.highlight_layer, Visibility::None)?;
            }
            ctx.selected_parcel = None;
        }
    }
    Ok(Some(info))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_values_render_empty() {
        let props = json!({"MAP_PAR_ID": "12-3", "parcel_owners_Owner Name": null})
            .as_object()
            .cloned()
            .unwrap();
        let info = ParcelInfo::from_properties(&ParcelConfig::default(), &props);
        assert_eq!(info.id, "12-3");
        assert_eq!(info.owner, "");
        assert_eq!(
            info.rows()[2],
            ("Address".to_string(), String::new())
        );
    }

    #[test]
    fn numeric_ids_are_stringified() {
        let props = json!({"MAP_PAR_ID": 42}).as_object().cloned().unwrap();
        let info = ParcelInfo::from_properties(&ParcelConfig::default(), &props);
        assert_eq!(info.id, "42");
    }
}
