//! Core library for the trail map: overlay layers, terrain measurement and
//! annotation pins on top of a style-driven map renderer.

pub mod app;
pub mod config;
pub mod context;
pub mod dtm;
pub mod geometry;
pub mod io;
pub mod layers;
pub mod measure;
pub mod parcel;
pub mod pins;
pub mod prompt;
pub mod render;
pub mod styles;
pub mod toggles;

pub use app::{AppError, ClickOutcome, MapApp, MapEvent};
pub use config::AppConfig;
pub use context::MapContext;
pub use geometry::{LngLat, LngLatBounds};
pub use layers::{LayerConfig, LayerRegistry, ReconcileOptions, ReconcileReport, SubLayer};
pub use measure::TerrainMeasurer;
pub use pins::{Pin, PinStore};
pub use render::{Renderer, SceneRenderer};
pub use toggles::ToggleController;
