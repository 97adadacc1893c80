mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use trail_map::io::{CacheSlot, FileCache, MemoryCache};
use trail_map::pins::{Pin, PinError, PinRemote, PinStore, RetryPolicy, DEFAULT_CACHE_KEY};
use trail_map::render::{Renderer, SceneRenderer};
use trail_map::LngLat;

#[derive(Default)]
struct FakeRemote {
    online: AtomicBool,
    pins: Mutex<Vec<Pin>>,
    publishes: AtomicUsize,
}

impl FakeRemote {
    fn online() -> Arc<Self> {
        let remote = Arc::new(Self::default());
        remote.online.store(true, Ordering::SeqCst);
        remote
    }

    fn offline() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn stored(&self) -> Vec<Pin> {
        self.pins.lock().unwrap().clone()
    }
}

impl PinRemote for FakeRemote {
    fn fetch(&self) -> Result<Vec<Pin>, PinError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(PinError::Remote("connection refused".into()));
        }
        Ok(self.stored())
    }

    fn publish(&self, pins: &[Pin]) -> Result<(), PinError> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        if !self.online.load(Ordering::SeqCst) {
            return Err(PinError::Remote("connection refused".into()));
        }
        *self.pins.lock().unwrap() = pins.to_vec();
        Ok(())
    }
}

fn no_wait(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        attempts,
        base_delay: Duration::ZERO,
    }
}

fn store_with(cache: &MemoryCache, remote: &Arc<FakeRemote>, retry: RetryPolicy) -> PinStore {
    let remote: Arc<dyn PinRemote> = remote.clone();
    PinStore::new(Arc::new(cache.clone()), DEFAULT_CACHE_KEY, Some(remote), retry)
}

struct ReadOnlyCache;

impl CacheSlot for ReadOnlyCache {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: &str) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        ))
    }
}

fn cached_pins(cache: &dyn CacheSlot) -> Vec<Pin> {
    serde_json::from_str(&cache.get(DEFAULT_CACHE_KEY).unwrap()).unwrap()
}

#[test]
fn pin_survives_remote_outage() {
    common::init_logging();
    let cache = MemoryCache::new();
    let remote = FakeRemote::offline();
    let mut scene = SceneRenderer::new("outdoors");

    let added = {
        let mut store = store_with(&cache, &remote, no_wait(2));
        let pin = store
            .add(&mut scene, LngLat::new(-73.31708, 42.36243), "Trailhead")
            .unwrap()
            .clone();
        store.flush();
        pin
    };
    assert_eq!(remote.publishes.load(Ordering::SeqCst), 2);

    let mut scene = SceneRenderer::new("outdoors");
    let mut store = store_with(&cache, &remote, no_wait(1));
    store.load(&mut scene).unwrap();
    assert_eq!(store.pins(), &[added.clone()]);
    assert_eq!(scene.markers().count(), 1);
    assert!(store.marker(&added.id).is_some());
}

#[test]
fn deleting_first_of_two_pins_persists_the_other() {
    let cache = MemoryCache::new();
    let mut scene = SceneRenderer::new("outdoors");
    let mut store = PinStore::new(
        Arc::new(cache.clone()),
        DEFAULT_CACHE_KEY,
        None,
        RetryPolicy::default(),
    );
    let a = store.add(&mut scene, LngLat::new(0.0, 0.0), "A").unwrap().id.clone();
    let b = store.add(&mut scene, LngLat::new(1.0, 1.0), "B").unwrap().id.clone();
    store.delete(&mut scene, &a).unwrap();

    let persisted = cached_pins(&cache);
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].label, "B");
    assert_eq!(persisted[0].id, b);
    assert_ne!(persisted[0].id, a);
    assert_eq!(scene.markers().count(), 1);
}

#[test]
fn unpublished_cache_wins_and_is_republished() {
    let cache = MemoryCache::new();
    let remote = FakeRemote::offline();
    let mut scene = SceneRenderer::new("outdoors");
    {
        let mut store = store_with(&cache, &remote, no_wait(1));
        store.add(&mut scene, LngLat::new(0.0, 0.0), "Offline edit").unwrap();
        store.flush();
        assert!(store.has_unpublished());
    }

    remote.set_online(true);
    let mut store = store_with(&cache, &remote, no_wait(1));
    store.load(&mut scene).unwrap();
    assert_eq!(store.pins()[0].label, "Offline edit");
    store.flush();
    assert_eq!(remote.stored(), store.pins());
    assert!(!store.has_unpublished());
}

#[test]
fn remote_replaces_published_cache() {
    let cache = MemoryCache::new();
    let remote = FakeRemote::online();
    let mut scene = SceneRenderer::new("outdoors");
    {
        let mut store = store_with(&cache, &remote, no_wait(1));
        store.add(&mut scene, LngLat::new(0.0, 0.0), "Old").unwrap();
        store.flush();
        assert!(!store.has_unpublished());
    }

    let newer = Pin {
        id: "5f0c8a56-8f0b-4d5e-9d59-1f1f1f1f1f1f".into(),
        lng: -73.3,
        lat: 42.3,
        label: "From another device".into(),
        color: "#123456".into(),
    };
    *remote.pins.lock().unwrap() = vec![newer.clone()];

    let mut store = store_with(&cache, &remote, no_wait(1));
    store.load(&mut scene).unwrap();
    assert_eq!(store.pins(), &[newer.clone()]);
    assert_eq!(cached_pins(&cache), vec![newer]);
}

#[test]
fn remote_pins_load_when_cache_is_read_only() {
    common::init_logging();
    let remote = FakeRemote::online();
    let pin = Pin {
        id: "0b7e1c2a-4f3d-4a8b-9c1d-2e3f4a5b6c7d".into(),
        lng: -73.29,
        lat: 42.35,
        label: "Kennedy Park".into(),
        color: "#e11d48".into(),
    };
    *remote.pins.lock().unwrap() = vec![pin.clone()];
    let remote: Arc<dyn PinRemote> = remote;
    let mut store = PinStore::new(
        Arc::new(ReadOnlyCache),
        DEFAULT_CACHE_KEY,
        Some(remote),
        no_wait(1),
    );
    let mut scene = SceneRenderer::new("outdoors");
    store.load(&mut scene).unwrap();
    assert_eq!(store.pins(), &[pin]);
    assert_eq!(scene.markers().count(), 1);
}

#[test]
fn nothing_saved_loads_empty() {
    let cache = MemoryCache::new();
    let remote = FakeRemote::offline();
    let mut scene = SceneRenderer::new("outdoors");
    let mut store = store_with(&cache, &remote, no_wait(1));
    store.load(&mut scene).unwrap();
    assert!(store.pins().is_empty());
}

#[test]
fn file_cache_keeps_pins_between_sessions() {
    let dir = assert_fs::TempDir::new().unwrap();
    let mut scene = SceneRenderer::new("outdoors");
    let id = {
        let cache: Arc<dyn CacheSlot> = Arc::new(FileCache::new(dir.path()));
        let mut store = PinStore::new(cache, DEFAULT_CACHE_KEY, None, RetryPolicy::default());
        let id = store.add(&mut scene, LngLat::new(-73.3, 42.3), "Spring").unwrap().id.clone();
        store.recolor(&mut scene, &id, "#0af").unwrap();
        id
    };

    let cache: Arc<dyn CacheSlot> = Arc::new(FileCache::new(dir.path()));
    let mut store = PinStore::new(cache, DEFAULT_CACHE_KEY, None, RetryPolicy::default());
    store.load(&mut SceneRenderer::new("outdoors")).unwrap();
    let pin = store.get(&id).unwrap();
    assert_eq!(pin.label, "Spring");
    assert_eq!(pin.color, "#0af");
}

#[test]
fn edits_are_published_in_order() {
    let cache = MemoryCache::new();
    let remote = FakeRemote::online();
    let mut scene = SceneRenderer::new("outdoors");
    let mut store = store_with(&cache, &remote, no_wait(1));
    let id = store.add(&mut scene, LngLat::new(0.0, 0.0), "A").unwrap().id.clone();
    store.rename(&mut scene, &id, "Renamed").unwrap();
    store.recolor(&mut scene, &id, "#00ff00").unwrap();
    store.flush();
    let stored = remote.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].label, "Renamed");
    assert_eq!(stored[0].color, "#00ff00");
}

#[test]
fn fly_to_centres_camera() {
    let cache = MemoryCache::new();
    let mut scene = SceneRenderer::new("outdoors");
    let mut store = PinStore::new(Arc::new(cache), DEFAULT_CACHE_KEY, None, RetryPolicy::default());
    let id = store.add(&mut scene, LngLat::new(-73.2, 42.2), "X").unwrap().id.clone();
    store.fly_to(&mut scene, &id).unwrap();
    assert_eq!(scene.camera().center, LngLat::new(-73.2, 42.2));
    assert!(matches!(
        store.fly_to(&mut scene, "unknown"),
        Err(PinError::NotFound(_))
    ));
}
