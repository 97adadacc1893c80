//! User annotation pins with local and remote persistence.
//!
//! The in-memory collection drives rendering. Every mutation writes the full
//! collection to the cache and queues it on an outbox that a single worker
//! thread publishes to the remote store. Two counters kept in the cache tell
//! whether the remote has seen the latest local state:
//!
//! * `{key}.generation` is bumped by every [`PinStore::persist`],
//! * `{key}.published` is the generation last accepted by the remote.
//!
//! [`PinStore::load`] republishes the cached collection when it is ahead of
//! the remote instead of overwriting it.

use std::collections::HashMap;
use std::io::Read;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::LngLat;
use crate::io::CacheSlot;
use crate::render::{MarkerId, MarkerSpec, Renderer};

pub const DEFAULT_PIN_COLOR: &str = "#e11d48";
pub const DEFAULT_CACHE_KEY: &str = "trail-map.pins";
/// Zoom used when centring on a pin from the list.
pub const FLY_TO_ZOOM: f64 = 16.0;

static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new("^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").unwrap());

/// Returns `true` for `#rgb` and `#rrggbb` colours.
pub fn is_hex_color(color: &str) -> bool {
    HEX_COLOR.is_match(color)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    pub id: String,
    pub lng: f64,
    pub lat: f64,
    pub label: String,
    pub color: String,
}

impl Pin {
    pub fn position(&self) -> LngLat {
        LngLat::new(self.lng, self.lat)
    }

    fn marker(&self) -> MarkerSpec {
        MarkerSpec {
            at: self.position(),
            color: self.color.clone(),
            label: self.label.clone(),
        }
    }
}

/// A line of the pin list.
#[derive(Debug, Clone, PartialEq)]
pub struct PinRow {
    pub id: String,
    pub label: String,
    pub color: String,
    pub coordinates: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PinError {
    #[error("no pin with id {0}")]
    NotFound(String),
    #[error("invalid colour `{0}`, expected #rgb or #rrggbb")]
    InvalidColor(String),
    #[error("pin cache: {0}")]
    Cache(#[from] std::io::Error),
    #[error("pin data: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("pin remote: {0}")]
    Remote(String),
}

/// Remote key-value store holding the whole pin collection.
pub trait PinRemote: Send + Sync {
    fn fetch(&self) -> Result<Vec<Pin>, PinError>;
    /// Replaces the remote collection.
    fn publish(&self, pins: &[Pin]) -> Result<(), PinError>;
}

/// `GET`/`POST {base}/pins` over HTTP. Any 2xx status is success.
#[derive(Clone)]
pub struct HttpPinRemote {
    url: String,
    agent: ureq::Agent,
}

impl HttpPinRemote {
    pub fn new(base_url: &str) -> Self {
        Self {
            url: format!("{}/pins", base_url.trim_end_matches('/')),
            agent: ureq::agent(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl PinRemote for HttpPinRemote {
    fn fetch(&self) -> Result<Vec<Pin>, PinError> {
        let response = self
            .agent
            .get(&self.url)
            .call()
            .map_err(|e| PinError::Remote(e.to_string()))?;
        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|e| PinError::Remote(e.to_string()))?;
        Ok(serde_json::from_str(&body)?)
    }

    fn publish(&self, pins: &[Pin]) -> Result<(), PinError> {
        let body = serde_json::to_string(pins)?;
        self.agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(&body)
            .map_err(|e| PinError::Remote(e.to_string()))?;
        Ok(())
    }
}

/// How often and how patiently the outbox retries a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), doubling each time.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

fn generation_key(key: &str) -> String {
    format!("{key}.generation")
}

fn published_key(key: &str) -> String {
    format!("{key}.published")
}

fn read_counter(cache: &dyn CacheSlot, key: &str) -> u64 {
    cache
        .get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

struct PublishJob {
    generation: u64,
    pins: Vec<Pin>,
}

enum OutboxMessage {
    Publish(PublishJob),
    Flush(Sender<()>),
}

/// Background publisher. Dropping it drains the queue and joins the worker.
struct Outbox {
    sender: Option<Sender<OutboxMessage>>,
    handle: Option<JoinHandle<()>>,
}

impl Outbox {
    fn spawn(
        remote: Arc<dyn PinRemote>,
        cache: Arc<dyn CacheSlot>,
        key: String,
        policy: RetryPolicy,
    ) -> Self {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("pin-outbox".into())
            .spawn(move || worker_loop(receiver, remote.as_ref(), cache.as_ref(), &key, policy));
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("pins: cannot start publisher, remote writes disabled: {e}");
                None
            }
        };
        Self {
            sender: handle.as_ref().map(|_| sender),
            handle,
        }
    }

    fn send(&self, message: OutboxMessage) -> bool {
        match &self.sender {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }

    fn publish(&self, generation: u64, pins: Vec<Pin>) {
        if !self.send(OutboxMessage::Publish(PublishJob { generation, pins })) {
            warn!("pins: publisher stopped, generation {generation} stays local");
        }
    }

    fn flush(&self) {
        let (ack, done) = mpsc::channel();
        if self.send(OutboxMessage::Flush(ack)) {
            let _ = done.recv();
        }
    }
}

impl Drop for Outbox {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    receiver: Receiver<OutboxMessage>,
    remote: &dyn PinRemote,
    cache: &dyn CacheSlot,
    key: &str,
    policy: RetryPolicy,
) {
    while let Ok(message) = receiver.recv() {
        let mut job = match message {
            OutboxMessage::Publish(job) => job,
            OutboxMessage::Flush(ack) => {
                let _ = ack.send(());
                continue;
            }
        };
        // Only the newest queued snapshot matters; the remote is replaced
        // wholesale.
        let mut acks = Vec::new();
        loop {
            match receiver.try_recv() {
                Ok(OutboxMessage::Publish(newer)) => job = newer,
                Ok(OutboxMessage::Flush(ack)) => {
                    acks.push(ack);
                    break;
                }
                Err(_) => break,
            }
        }
        publish_with_retry(remote, cache, key, &job, policy);
        for ack in acks {
            let _ = ack.send(());
        }
    }
    debug!("pins: publisher stopped");
}

fn publish_with_retry(
    remote: &dyn PinRemote,
    cache: &dyn CacheSlot,
    key: &str,
    job: &PublishJob,
    policy: RetryPolicy,
) {
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match remote.publish(&job.pins) {
            Ok(()) => {
                let published = published_key(key);
                if read_counter(cache, &published) < job.generation {
                    if let Err(e) = cache.set(&published, &job.generation.to_string()) {
                        warn!("pins: cannot record published generation: {e}");
                    }
                }
                debug!(
                    "pins: published generation {} ({} pins)",
                    job.generation,
                    job.pins.len()
                );
                return;
            }
            Err(e) if attempt < attempts => {
                let delay = policy.delay(attempt);
                warn!("pins: publish attempt {attempt} failed: {e}; retrying in {delay:?}");
                thread::sleep(delay);
            }
            Err(e) => {
                warn!(
                    "pins: publish of generation {} failed after {attempts} attempts: {e}",
                    job.generation
                );
            }
        }
    }
}

/// Pin collection plus the markers showing it.
pub struct PinStore {
    pins: Vec<Pin>,
    markers: HashMap<String, MarkerId>,
    cache: Arc<dyn CacheSlot>,
    key: String,
    remote: Option<Arc<dyn PinRemote>>,
    outbox: Option<Outbox>,
}

impl PinStore {
    /// Creates an empty store. Call [`PinStore::load`] to read saved pins.
    pub fn new(
        cache: Arc<dyn CacheSlot>,
        key: &str,
        remote: Option<Arc<dyn PinRemote>>,
        retry: RetryPolicy,
    ) -> Self {
        let outbox = remote
            .as_ref()
            .map(|r| Outbox::spawn(Arc::clone(r), Arc::clone(&cache), key.to_string(), retry));
        Self {
            pins: Vec::new(),
            markers: HashMap::new(),
            cache,
            key: key.to_string(),
            remote,
            outbox,
        }
    }

    pub fn pins(&self) -> &[Pin] {
        &self.pins
    }

    pub fn get(&self, id: &str) -> Option<&Pin> {
        self.pins.iter().find(|p| p.id == id)
    }

    pub fn marker(&self, id: &str) -> Option<MarkerId> {
        self.markers.get(id).copied()
    }

    fn generation(&self) -> u64 {
        read_counter(self.cache.as_ref(), &generation_key(&self.key))
    }

    fn published(&self) -> u64 {
        read_counter(self.cache.as_ref(), &published_key(&self.key))
    }

    /// `true` when the cache holds changes the remote has not accepted.
    pub fn has_unpublished(&self) -> bool {
        self.generation() > self.published()
    }

    fn read_cache(&self) -> Option<Vec<Pin>> {
        let raw = self.cache.get(&self.key)?;
        match serde_json::from_str(&raw) {
            Ok(pins) => Some(pins),
            Err(e) => {
                warn!("pins: ignoring unreadable cache: {e}");
                None
            }
        }
    }

    /// Loads the collection, remote first, and recreates the markers.
    pub fn load(&mut self, renderer: &mut dyn Renderer) -> Result<(), PinError> {
        let cached = self.read_cache();
        let fetched = self.remote.as_ref().map(|r| r.fetch());
        self.pins = match (fetched, cached) {
            (Some(Ok(_)), Some(cached)) if self.has_unpublished() => {
                info!(
                    "pins: cache is ahead of remote, republishing {} pins",
                    cached.len()
                );
                if let Some(outbox) = &self.outbox {
                    outbox.publish(self.generation(), cached.clone());
                }
                cached
            }
            (Some(Ok(remote)), _) => {
                info!("pins: loaded {} pins from remote", remote.len());
                if let Err(e) = self.refresh_cache(&remote) {
                    warn!("pins: cache not refreshed from remote: {e}");
                }
                remote
            }
            (Some(Err(e)), cached) => {
                warn!("pins: remote unavailable, using cache: {e}");
                cached.unwrap_or_default()
            }
            (None, cached) => cached.unwrap_or_default(),
        };
        self.sync_markers(renderer);
        Ok(())
    }

    fn refresh_cache(&self, remote: &[Pin]) -> Result<(), PinError> {
        self.cache.set(&self.key, &serde_json::to_string(remote)?)?;
        self.cache
            .set(&published_key(&self.key), &self.generation().to_string())?;
        Ok(())
    }

    fn sync_markers(&mut self, renderer: &mut dyn Renderer) {
        for (_, marker) in self.markers.drain() {
            renderer.remove_marker(marker);
        }
        for pin in &self.pins {
            let marker = renderer.add_marker(pin.marker());
            self.markers.insert(pin.id.clone(), marker);
        }
    }

    fn replace_marker(&mut self, renderer: &mut dyn Renderer, index: usize) {
        let pin = &self.pins[index];
        if let Some(old) = self.markers.remove(&pin.id) {
            renderer.remove_marker(old);
        }
        let marker = renderer.add_marker(pin.marker());
        self.markers.insert(pin.id.clone(), marker);
    }

    fn index_of(&self, id: &str) -> Result<usize, PinError> {
        self.pins
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| PinError::NotFound(id.to_string()))
    }

    /// Label given to the next pin when none is entered.
    pub fn default_label(&self) -> String {
        format!("Pin {}", self.pins.len() + 1)
    }

    /// Adds a pin with a fresh id and the default colour.
    pub fn add(
        &mut self,
        renderer: &mut dyn Renderer,
        at: LngLat,
        label: &str,
    ) -> Result<&Pin, PinError> {
        let label = match label.trim() {
            "" => self.default_label(),
            l => l.to_string(),
        };
        let pin = Pin {
            id: Uuid::new_v4().to_string(),
            lng: at.lng,
            lat: at.lat,
            label,
            color: DEFAULT_PIN_COLOR.to_string(),
        };
        info!("pins: add {} ({})", pin.id, pin.label);
        self.pins.push(pin);
        let index = self.pins.len() - 1;
        self.replace_marker(renderer, index);
        self.persist()?;
        Ok(&self.pins[index])
    }

    /// Renames a pin. A blank label leaves it unchanged and returns `false`.
    pub fn rename(
        &mut self,
        renderer: &mut dyn Renderer,
        id: &str,
        label: &str,
    ) -> Result<bool, PinError> {
        let index = self.index_of(id)?;
        let label = label.trim();
        if label.is_empty() {
            return Ok(false);
        }
        self.pins[index].label = label.to_string();
        self.replace_marker(renderer, index);
        self.persist()?;
        Ok(true)
    }

    pub fn recolor(
        &mut self,
        renderer: &mut dyn Renderer,
        id: &str,
        color: &str,
    ) -> Result<(), PinError> {
        let index = self.index_of(id)?;
        if !is_hex_color(color) {
            return Err(PinError::InvalidColor(color.to_string()));
        }
        self.pins[index].color = color.to_string();
        self.replace_marker(renderer, index);
        self.persist()
    }

    pub fn delete(&mut self, renderer: &mut dyn Renderer, id: &str) -> Result<Pin, PinError> {
        let index = self.index_of(id)?;
        if let Some(marker) = self.markers.remove(id) {
            renderer.remove_marker(marker);
        }
        let pin = self.pins.remove(index);
        info!("pins: delete {} ({})", pin.id, pin.label);
        self.persist()?;
        Ok(pin)
    }

    /// Writes the collection to the cache and queues it for the remote.
    pub fn persist(&mut self) -> Result<(), PinError> {
        let generation = self.generation() + 1;
        self.cache.set(&self.key, &serde_json::to_string(&self.pins)?)?;
        self.cache
            .set(&generation_key(&self.key), &generation.to_string())?;
        if let Some(outbox) = &self.outbox {
            outbox.publish(generation, self.pins.clone());
        }
        Ok(())
    }

    /// Blocks until every queued publish has been attempted.
    pub fn flush(&self) {
        if let Some(outbox) = &self.outbox {
            outbox.flush();
        }
    }

    pub fn fly_to(&self, renderer: &mut dyn Renderer, id: &str) -> Result<(), PinError> {
        let pin = self.get(id).ok_or_else(|| PinError::NotFound(id.to_string()))?;
        renderer.fly_to(pin.position(), Some(FLY_TO_ZOOM));
        Ok(())
    }

    pub fn rows(&self) -> Vec<PinRow> {
        self.pins
            .iter()
            .map(|p| PinRow {
                id: p.id.clone(),
                label: p.label.clone(),
                color: p.color.clone(),
                coordinates: format!("{:.5}, {:.5}", p.lat, p.lng),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryCache;
    use crate::render::SceneRenderer;

    fn store() -> (PinStore, SceneRenderer) {
        let cache: Arc<dyn CacheSlot> = Arc::new(MemoryCache::new());
        (
            PinStore::new(cache, DEFAULT_CACHE_KEY, None, RetryPolicy::default()),
            SceneRenderer::new("outdoors"),
        )
    }

    #[test]
    fn hex_colors() {
        assert!(is_hex_color("#abc"));
        assert!(is_hex_color("#A1B2C3"));
        assert!(!is_hex_color("abc"));
        assert!(!is_hex_color("#abcd"));
        assert!(!is_hex_color("#ggg"));
    }

    #[test]
    fn blank_label_falls_back_to_numbered_name() {
        let (mut pins, mut scene) = store();
        pins.add(&mut scene, LngLat::new(-73.3, 42.3), "A").unwrap();
        let label = pins.add(&mut scene, LngLat::new(-73.3, 42.3), "  ").unwrap().label.clone();
        assert_eq!(label, "Pin 2");
        assert_eq!(scene.markers().count(), 2);
    }

    #[test]
    fn blank_rename_is_ignored() {
        let (mut pins, mut scene) = store();
        let id = pins.add(&mut scene, LngLat::new(0.0, 0.0), "A").unwrap().id.clone();
        assert!(!pins.rename(&mut scene, &id, "").unwrap());
        assert_eq!(pins.get(&id).unwrap().label, "A");
    }

    #[test]
    fn recolor_rejects_bad_colour_and_recreates_marker() {
        let (mut pins, mut scene) = store();
        let id = pins.add(&mut scene, LngLat::new(0.0, 0.0), "A").unwrap().id.clone();
        let before = pins.marker(&id).unwrap();
        assert!(matches!(
            pins.recolor(&mut scene, &id, "blue"),
            Err(PinError::InvalidColor(_))
        ));
        pins.recolor(&mut scene, &id, "#00ff00").unwrap();
        assert_ne!(pins.marker(&id).unwrap(), before);
        let (_, spec) = scene.markers().next().unwrap();
        assert_eq!(spec.color, "#00ff00");
    }

    #[test]
    fn unknown_id_is_not_found() {
        let (mut pins, mut scene) = store();
        assert!(matches!(
            pins.delete(&mut scene, "missing"),
            Err(PinError::NotFound(_))
        ));
    }

    #[test]
    fn retry_delay_doubles() {
        let policy = RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(3), Duration::from_millis(400));
    }

    #[test]
    fn rows_format_coordinates() {
        let (mut pins, mut scene) = store();
        pins.add(&mut scene, LngLat::new(-73.317081, 42.362431), "Lot")
            .unwrap();
        assert_eq!(pins.rows()[0].coordinates, "42.36243, -73.31708");
    }
}
