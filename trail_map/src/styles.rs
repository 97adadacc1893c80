//! Typed paint and layout descriptions for overlay layers.
//!
//! Each style converts to the property map the renderer consumes, using the
//! renderer's hyphenated property names.

use geojson::JsonObject;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

fn object(entries: Vec<(&str, Value)>) -> JsonObject {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Paint for a line layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinePaint {
    pub color: String,
    pub width: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dasharray: Option<Vec<f64>>,
}

impl LinePaint {
    pub fn new(color: &str, width: f64) -> Self {
        Self {
            color: color.to_string(),
            width,
            dasharray: None,
        }
    }

    /// Returns a dashed copy of this paint.
    pub fn dashed(mut self, pattern: &[f64]) -> Self {
        self.dasharray = Some(pattern.to_vec());
        self
    }

    pub fn to_paint(&self) -> JsonObject {
        let mut paint = object(vec![
            ("line-color", json!(self.color)),
            ("line-width", json!(self.width)),
        ]);
        if let Some(dash) = &self.dasharray {
            paint.insert("line-dasharray".into(), json!(dash));
        }
        paint
    }
}

/// Layout for a line layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineLayout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<String>,
}

impl LineLayout {
    pub fn round_cap() -> Self {
        Self {
            cap: Some("round".into()),
            join: None,
        }
    }

    pub fn to_layout(&self) -> JsonObject {
        let mut layout = JsonObject::new();
        if let Some(cap) = &self.cap {
            layout.insert("line-cap".into(), json!(cap));
        }
        if let Some(join) = &self.join {
            layout.insert("line-join".into(), json!(join));
        }
        layout
    }
}

/// Paint for a fill layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillPaint {
    pub color: String,
    pub opacity: f64,
}

impl FillPaint {
    pub fn new(color: &str, opacity: f64) -> Self {
        Self {
            color: color.to_string(),
            opacity,
        }
    }

    pub fn to_paint(&self) -> JsonObject {
        object(vec![
            ("fill-color", json!(self.color)),
            ("fill-opacity", json!(self.opacity)),
        ])
    }
}

/// Text style definition for label layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub size: f64,
    pub color: String,
    pub halo_color: String,
    pub halo_width: f64,
}

impl TextStyle {
    pub fn new(size: f64, color: &str) -> Self {
        Self {
            size,
            color: color.to_string(),
            halo_color: "#ffffff".into(),
            halo_width: 1.0,
        }
    }

    pub fn to_paint(&self) -> JsonObject {
        object(vec![
            ("text-color", json!(self.color)),
            ("text-halo-color", json!(self.halo_color)),
            ("text-halo-width", json!(self.halo_width)),
        ])
    }
}

/// Terrain shading (hillshade) paint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HillshadeStyle {
    pub exaggeration: f64,
    pub shadow_color: String,
    pub highlight_color: String,
    pub accent_color: String,
}

impl Default for HillshadeStyle {
    fn default() -> Self {
        Self {
            exaggeration: 0.85,
            shadow_color: "#3b2f2f".into(),
            highlight_color: "#fff9f0".into(),
            accent_color: "#d7c7b9".into(),
        }
    }
}

impl HillshadeStyle {
    pub fn to_paint(&self) -> JsonObject {
        object(vec![
            ("hillshade-exaggeration", json!(self.exaggeration)),
            ("hillshade-shadow-color", json!(self.shadow_color)),
            ("hillshade-highlight-color", json!(self.highlight_color)),
            ("hillshade-accent-color", json!(self.accent_color)),
        ])
    }
}

/// Radial gradient sky.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkyStyle {
    pub inner_color: String,
    pub outer_color: String,
    pub radius: f64,
    pub opacity: f64,
}

impl Default for SkyStyle {
    fn default() -> Self {
        Self {
            inner_color: "rgba(135, 206, 235, 1.0)".into(),
            outer_color: "rgba(135, 206, 235, 0.0)".into(),
            radius: 90.0,
            opacity: 1.0,
        }
    }
}

impl SkyStyle {
    pub fn to_paint(&self) -> JsonObject {
        object(vec![
            ("sky-type", json!("gradient")),
            (
                "sky-gradient",
                json!([
                    "interpolate",
                    ["linear"],
                    ["sky-radial-progress"],
                    0,
                    self.inner_color,
                    1,
                    self.outer_color
                ]),
            ),
            ("sky-gradient-center", json!([0, 0])),
            ("sky-gradient-radius", json!(self.radius)),
            ("sky-opacity", json!(self.opacity)),
        ])
    }
}

/// Legend swatch shown next to a layer toggle.
#[derive(Debug, Clone, PartialEq)]
pub enum Swatch {
    Line { color: String, dashed: bool },
    Fill { color: String, opacity: f64 },
}

impl Swatch {
    pub fn from_line(paint: &LinePaint) -> Self {
        Swatch::Line {
            color: paint.color.clone(),
            dashed: paint.dasharray.is_some(),
        }
    }

    pub fn from_fill(paint: &FillPaint) -> Self {
        Swatch::Fill {
            color: paint.color.clone(),
            opacity: paint.opacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dashed_line_paint() {
        let paint = LinePaint::new("#444", 1.0).dashed(&[1.0, 1.0]).to_paint();
        assert_eq!(paint["line-color"], json!("#444"));
        assert_eq!(paint["line-dasharray"], json!([1.0, 1.0]));
    }

    #[test]
    fn empty_layout_has_no_properties() {
        assert!(LineLayout::default().to_layout().is_empty());
        assert_eq!(LineLayout::round_cap().to_layout()["line-cap"], json!("round"));
    }

    #[test]
    fn swatch_reports_dash() {
        let swatch = Swatch::from_line(&LinePaint::new("#a15a00", 2.0).dashed(&[2.0, 1.0]));
        assert_eq!(
            swatch,
            Swatch::Line {
                color: "#a15a00".into(),
                dashed: true
            }
        );
    }
}
