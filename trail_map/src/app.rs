//! Event coordinator owning the map session.

use log::{info, warn};

use crate::config::AppConfig;
use crate::context::MapContext;
use crate::geometry::LngLat;
use crate::io::DatasetSource;
use crate::layers::{LayerRegistry, ReconcileOptions, ReconcileReport};
use crate::measure::TerrainMeasurer;
use crate::parcel::{self, ParcelConfig, ParcelInfo};
use crate::pins::{PinError, PinStore};
use crate::prompt::{Prompt, PromptOutcome, PromptRequest};
use crate::render::{Cursor, RenderError, Renderer};
use crate::toggles::{ToggleController, ToggleRow};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Pin(#[from] PinError),
}

/// Renderer lifecycle and pointer events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapEvent {
    Load,
    StyleLoad,
    Click(LngLat),
    DoubleClick(LngLat),
    ContextClick(LngLat),
}

/// What a pointer event did.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    Measured { points: usize, readout: String },
    MeasureStopped,
    PinAdded(String),
    PinCancelled,
    Parcel(ParcelInfo),
    Nothing,
}

pub struct MapApp<R: Renderer> {
    renderer: R,
    source: Box<dyn DatasetSource>,
    registry: LayerRegistry,
    toggles: ToggleController,
    measurer: TerrainMeasurer,
    pins: PinStore,
    parcel: ParcelConfig,
    ctx: MapContext,
    placing: bool,
    rows: Vec<ToggleRow>,
}

impl<R: Renderer> MapApp<R> {
    pub fn new(
        config: &AppConfig,
        renderer: R,
        source: Box<dyn DatasetSource>,
        pins: PinStore,
    ) -> Self {
        Self {
            renderer,
            source,
            registry: LayerRegistry::new(
                config.layers.clone(),
                config.terrain.clone(),
                config.fit_padding,
            ),
            toggles: ToggleController::new(
                config.toggles.clone(),
                &config.terrain.shading_layer_id,
            ),
            measurer: TerrainMeasurer::new(config.measure_step_m),
            pins,
            parcel: config.parcel.clone(),
            ctx: MapContext::new(),
            placing: false,
            rows: Vec::new(),
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn context(&self) -> &MapContext {
        &self.ctx
    }

    pub fn registry(&self) -> &LayerRegistry {
        &self.registry
    }

    pub fn toggle_rows(&self) -> &[ToggleRow] {
        &self.rows
    }

    pub fn measurer(&self) -> &TerrainMeasurer {
        &self.measurer
    }

    pub fn pins(&self) -> &PinStore {
        &self.pins
    }

    pub fn is_placing(&self) -> bool {
        self.placing
    }

    /// Dispatches one event. Pointer events may ask `prompt` for a pin label.
    pub fn handle(
        &mut self,
        event: MapEvent,
        prompt: &mut dyn Prompt,
    ) -> Result<ClickOutcome, AppError> {
        match event {
            MapEvent::Load => {
                self.on_load();
                Ok(ClickOutcome::Nothing)
            }
            MapEvent::StyleLoad => {
                self.on_style_load();
                Ok(ClickOutcome::Nothing)
            }
            MapEvent::Click(at) => self.click(at, prompt),
            MapEvent::DoubleClick(_) | MapEvent::ContextClick(_) => {
                if self.measurer.is_measuring() {
                    self.measurer.deactivate(&mut self.renderer);
                    return Ok(ClickOutcome::MeasureStopped);
                }
                Ok(ClickOutcome::Nothing)
            }
        }
    }

    /// First load: overlays with camera fit, then saved pins.
    pub fn on_load(&mut self) -> ReconcileReport {
        info!("event: load");
        let report = self.reconcile(true);
        if let Err(e) = self.pins.load(&mut self.renderer) {
            warn!("pins not loaded: {e}");
        }
        report
    }

    /// A new base style finished loading. Measuring and the parcel
    /// selection never survive it.
    pub fn on_style_load(&mut self) -> ReconcileReport {
        info!("event: style load");
        self.measurer.deactivate(&mut self.renderer);
        self.ctx.selected_parcel = None;
        let report = self.reconcile(false);
        if let Err(e) = self.measurer.restore(&mut self.renderer) {
            warn!("measurement not restored: {e}");
        }
        report
    }

    fn reconcile(&mut self, auto_fit: bool) -> ReconcileReport {
        let report = self.registry.reconcile(
            &mut self.ctx,
            &mut self.renderer,
            self.source.as_ref(),
            ReconcileOptions { auto_fit },
        );
        self.rows = self
            .toggles
            .build_rows(&self.ctx, &self.renderer, &self.registry);
        report
    }

    /// Swaps the base style, keeping the camera.
    pub fn change_basemap(&mut self, style: &str) -> ReconcileReport {
        info!("basemap: {style}");
        let camera = self.renderer.camera();
        self.renderer.set_style(style);
        let report = self.on_style_load();
        self.renderer.jump_to(camera);
        report
    }

    pub fn toggle(&mut self, layer_id: &str, visible: bool) -> Result<(), AppError> {
        self.toggles.toggle(
            &mut self.ctx,
            &mut self.renderer,
            &self.registry,
            self.source.as_ref(),
            layer_id,
            visible,
        )?;
        self.rows = self
            .toggles
            .build_rows(&self.ctx, &self.renderer, &self.registry);
        Ok(())
    }

    pub fn set_shading_intensity(&mut self, value: f64) -> Result<f64, AppError> {
        Ok(self.toggles.set_shading_intensity(&mut self.renderer, value)?)
    }

    pub fn start_measuring(&mut self) -> Result<(), AppError> {
        self.placing = false;
        self.measurer.activate(&mut self.renderer)?;
        Ok(())
    }

    pub fn stop_measuring(&mut self) {
        self.measurer.deactivate(&mut self.renderer);
    }

    pub fn clear_measurement(&mut self) -> Result<(), AppError> {
        self.measurer.clear(&mut self.renderer)?;
        Ok(())
    }

    /// Arms pin placement; the next click asks for a label.
    pub fn start_placing(&mut self) {
        if self.measurer.is_measuring() {
            self.measurer.deactivate(&mut self.renderer);
        }
        self.placing = true;
        self.renderer.set_cursor(Cursor::Crosshair);
    }

    pub fn cancel_placing(&mut self) {
        self.placing = false;
        self.renderer.set_cursor(Cursor::Default);
    }

    fn click(&mut self, at: LngLat, prompt: &mut dyn Prompt) -> Result<ClickOutcome, AppError> {
        if self.measurer.on_click(&mut self.renderer, at)? {
            return Ok(ClickOutcome::Measured {
                points: self.measurer.path().len(),
                readout: self.measurer.readout(),
            });
        }
        if self.placing {
            self.cancel_placing();
            let request = PromptRequest::new("Pin label").with_default(&self.pins.default_label());
            return match prompt.request(request) {
                PromptOutcome::Confirmed(label) => {
                    let pin = self.pins.add(&mut self.renderer, at, &label)?;
                    Ok(ClickOutcome::PinAdded(pin.id.clone()))
                }
                PromptOutcome::Cancelled => Ok(ClickOutcome::PinCancelled),
            };
        }
        match parcel::inspect(&self.parcel, &mut self.ctx, &mut self.renderer, at)? {
            Some(info) => Ok(ClickOutcome::Parcel(info)),
            None => Ok(ClickOutcome::Nothing),
        }
    }

    pub fn load_pins(&mut self) -> Result<(), AppError> {
        self.pins.load(&mut self.renderer)?;
        Ok(())
    }

    /// Asks for a new label. Returns `false` if cancelled or left blank.
    pub fn rename_pin(&mut self, id: &str, prompt: &mut dyn Prompt) -> Result<bool, AppError> {
        let current = self
            .pins
            .get(id)
            .map(|p| p.label.clone())
            .ok_or_else(|| PinError::NotFound(id.to_string()))?;
        match prompt.request(PromptRequest::new("Rename pin").with_default(&current)) {
            PromptOutcome::Confirmed(label) => {
                Ok(self.pins.rename(&mut self.renderer, id, &label)?)
            }
            PromptOutcome::Cancelled => Ok(false),
        }
    }

    pub fn recolor_pin(&mut self, id: &str, color: &str) -> Result<(), AppError> {
        self.pins.recolor(&mut self.renderer, id, color)?;
        Ok(())
    }

    pub fn delete_pin(&mut self, id: &str) -> Result<(), AppError> {
        self.pins.delete(&mut self.renderer, id)?;
        Ok(())
    }

    pub fn fly_to_pin(&mut self, id: &str) -> Result<(), AppError> {
        self.pins.fly_to(&mut self.renderer, id)?;
        Ok(())
    }

    /// Waits for queued remote pin writes.
    pub fn flush(&self) {
        self.pins.flush();
    }
}
