//! Application configuration.
//!
//! Every field has a default describing the Lenox, MA overlay set, so a
//! configuration file only needs the values it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::layers::{IconAsset, LayerConfig, SubLayer, TerrainConfig};
use crate::measure::{is_valid_step, DEFAULT_STEP_M};
use crate::parcel::ParcelConfig;
use crate::pins::{RetryPolicy, DEFAULT_CACHE_KEY};
use crate::render::Camera;
use crate::styles::{FillPaint, LineLayout, LinePaint, TextStyle};
use crate::toggles::ToggleItem;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot access config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config {path}: {message}")]
    Invalid { path: String, message: String },
}

/// Pin persistence settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinsConfig {
    /// Base URL of the remote pin store; pins stay local when unset.
    pub remote_url: Option<String>,
    pub cache_key: String,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for PinsConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            cache_key: DEFAULT_CACHE_KEY.into(),
            retry_attempts: 3,
            retry_delay_ms: 200,
        }
    }
}

impl PinsConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory or base URL the overlay files are read from.
    pub data_root: String,
    pub style: String,
    pub camera: Camera,
    pub layers: Vec<LayerConfig>,
    pub toggles: Vec<ToggleItem>,
    pub terrain: TerrainConfig,
    pub measure_step_m: f64,
    pub fit_padding: f64,
    pub pins: PinsConfig,
    pub parcel: ParcelConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_root: "data".into(),
            style: "outdoors".into(),
            camera: Camera::default(),
            layers: default_layers(),
            toggles: default_toggles(),
            terrain: TerrainConfig::default(),
            measure_step_m: DEFAULT_STEP_M,
            fit_padding: 40.0,
            pins: PinsConfig::default(),
            parcel: ParcelConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = crate::io::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?;
        if !is_valid_step(config.measure_step_m) {
            return Err(ConfigError::Invalid {
                path: path.to_string(),
                message: format!(
                    "measure_step_m must be a positive number of metres, got {}",
                    config.measure_step_m
                ),
            });
        }
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        crate::io::write_string(path, &json).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })
    }
}

/// The eight overlays shown by default, in drawing order.
pub fn default_layers() -> Vec<LayerConfig> {
    let parcel = ParcelConfig::default();
    vec![
        LayerConfig::new("trails", "trails.geojson")
            .with_line(LinePaint::new("#1b7f3a", 2.0), None)
            .with(SubLayer::LineLabel {
                key: None,
                text: TextStyle::new(12.0, "#20492f"),
            }),
        LayerConfig::new("sidewalks", "extant_sidewalks.geojson")
            .with_line(LinePaint::new("#6f6f6f", 1.5), None),
        LayerConfig::new("proposed_sidewalks", "proposed_sidewalks.geojson")
            .with_line(LinePaint::new("#444", 1.0).dashed(&[1.0, 1.0]), None),
        LayerConfig::new("proposed_paths", "proposed_shared_use_paths.geojson")
            .with_line(LinePaint::new("#a15a00", 2.0).dashed(&[2.0, 1.0]), None),
        LayerConfig::new("poi", "POI.geojson").with(SubLayer::CategorySymbol {
            property: "Name".into(),
            value: "Parking".into(),
            icons: vec!["parking-15".into(), "parking".into(), "marker-15".into()],
            icon_asset: Some(IconAsset {
                name: "parking-icon".into(),
                path: "icons/parking.svg".into(),
            }),
        }),
        LayerConfig::new("parcels", "parcels.geojson")
            .with_line(LinePaint::new("#b59b55", 0.8), None)
            .with(SubLayer::HitTest)
            .with(SubLayer::Highlight {
                id_property: parcel.id_property,
                paint: FillPaint::new("#f2c94c", 0.45),
            })
            .with(SubLayer::FeatureLabel {
                property: parcel.owner_property,
                text: TextStyle::new(12.0, "#333333"),
            }),
        LayerConfig::new("easements", "easements.geojson")
            .with_fill(FillPaint::new("#c7e6d0", 0.35)),
        LayerConfig::new("contours", "1400_ft_contour.geojson").with_line(
            LinePaint::new("#000000", 3.0).dashed(&[0.0, 1.5]),
            Some(LineLayout::round_cap()),
        ),
    ]
}

pub fn default_toggles() -> Vec<ToggleItem> {
    vec![
        ToggleItem::new("steepness", "Steepness"),
        ToggleItem::new("trails-line", "Trails").coupled_with("trails-label"),
        ToggleItem::new("sidewalks-line", "Existing sidewalks"),
        ToggleItem::new("proposed_sidewalks-line", "Proposed sidewalks"),
        ToggleItem::new("proposed_paths-line", "Proposed shared-use paths"),
        ToggleItem::new("parcels-line", "Parcels").coupled_with("parcels-label"),
        ToggleItem::new("easements-fill", "Easements"),
        ToggleItem::new("contours-line", "1,400 ft. contour line"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("map.json");
        file.write_str(r#"{"data_root": "/srv/data", "pins": {"remote_url": "http://pins"}}"#)
            .unwrap();
        let cfg = AppConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.data_root, "/srv/data");
        assert_eq!(cfg.pins.remote_url.as_deref(), Some("http://pins"));
        assert_eq!(cfg.pins.cache_key, DEFAULT_CACHE_KEY);
        assert_eq!(cfg.layers.len(), 8);
        assert_eq!(cfg.fit_padding, 40.0);
    }

    #[test]
    fn save_then_load() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path = dir.child("cfg.json");
        let mut cfg = AppConfig::default();
        cfg.measure_step_m = 10.0;
        cfg.save(path.path().to_str().unwrap()).unwrap();
        let loaded = AppConfig::load(path.path().to_str().unwrap()).unwrap();
        assert_eq!(loaded.measure_step_m, 10.0);
        assert_eq!(loaded.layers, cfg.layers);
        assert_eq!(loaded.toggles, cfg.toggles);
    }

    #[test]
    fn invalid_json_names_file() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("bad.json");
        file.write_str("{").unwrap();
        let err = AppConfig::load(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn non_positive_step_is_rejected() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("step.json");
        file.write_str(r#"{"measure_step_m": -25.0}"#).unwrap();
        let err = AppConfig::load(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("measure_step_m"));
    }

    #[test]
    fn toggles_reference_declared_layers() {
        let layers = default_layers();
        let ids: Vec<String> = layers.iter().flat_map(|l| l.sublayer_ids()).collect();
        for item in default_toggles().iter().filter(|t| t.layer_id != "steepness") {
            assert!(ids.contains(&item.layer_id), "{}", item.layer_id);
            for c in &item.coupled {
                assert!(ids.contains(c), "{c}");
            }
        }
    }
}
