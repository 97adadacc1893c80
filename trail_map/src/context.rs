//! Session state shared by reconciliation, toggles and the coordinator.

use std::collections::HashMap;

/// Explicit map session state, owned by the coordinator and passed to the
/// components that read or update it.
#[derive(Debug, Clone, Default)]
pub struct MapContext {
    /// Set after the first reconciliation pass; later passes never re-fit.
    pub overlays_initialized: bool,
    /// Requested visibility of the terrain-shading layer, kept while the
    /// layer does not exist yet.
    pub shading_desired_visible: bool,
    /// Label property detected per overlay id.
    pub label_keys: HashMap<String, String>,
    /// Identifier of the highlighted parcel.
    pub selected_parcel: Option<String>,
}

impl MapContext {
    pub fn new() -> Self {
        Self::default()
    }
}
