//! The texture context: load coordination, alias lookup, and UV resolution.
//!
//! One [`TextureContext`] is built at startup and cloned into every consumer.
//! All mutable state sits behind a single mutex that is never held across an
//! await point; decoding is the only suspension inside a load, so index and
//! surface mutations are atomic with respect to each other.
//!
//! A load moves a key through `Unrequested -> in flight -> {indexed, failed}`.
//! Concurrent requests for the same key share one spawned task through a
//! [`Shared`] future, and the in-flight entry is removed in the same critical
//! section that indexes the result.

use std::collections::{HashMap, HashSet, VecDeque};
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use glam::Vec2;
use image::RgbaImage;
use serde::Serialize;
use tessera_config::Config;
use tokio::runtime::Handle;
use tokio::sync::{Notify, watch};

use crate::backend::{BackendKind, SurfaceBackend, SurfaceCapabilities, select_backend};
use crate::decoder::{ImageDecoder, TextureSource};
use crate::error::{AllocError, DecodeError, LoadError};
use crate::index::{MetadataIndex, TileId, TileRecord};
use crate::key::{BlockFace, BlockRemap, TextureKey};
use crate::raster::{error_checkerboard, has_transparency};
use crate::surface::{SurfaceSnapshot, SurfaceWatch};
use crate::uv::{TexCoord, UvCache};

/// Source name of the generated error placeholder.
pub const BUILTIN_ERROR_TEXTURE: &str = "builtin:error";

/// Side length of the generated placeholder.
const PLACEHOLDER_SIZE: u32 = 16;

type LoadResult = Result<Arc<TileRecord>, LoadError>;
type LoadFuture = Shared<BoxFuture<'static, LoadResult>>;

/// Pixels for [`TextureContext::apply_custom_texture`].
#[derive(Clone, Debug)]
pub enum CustomTexture {
    /// Encoded image bytes.
    Bytes(Arc<[u8]>),
    /// A base64 `data:` URI.
    DataUri(String),
}

impl From<CustomTexture> for TextureSource {
    fn from(texture: CustomTexture) -> Self {
        match texture {
            CustomTexture::Bytes(bytes) => TextureSource::Bytes(bytes),
            CustomTexture::DataUri(uri) => TextureSource::DataUri(uri),
        }
    }
}

/// Options for [`TextureContext::apply_custom_texture`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ApplyOptions {
    /// Bind the texture to every face of the key's block, plus the block id
    /// and `custom:<id>` keys for numeric blocks.
    pub all_faces: bool,
    /// Publish the surface and drop the UV cache immediately instead of
    /// waiting for the debounced publish.
    pub rebuild: bool,
}

/// Point-in-time counters.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AtlasStats {
    /// Active backend.
    pub backend: BackendKind,
    /// Surface size (layer size for arrays).
    pub dimensions: (u32, u32),
    /// Tiles placed on the surface, including ones no key is bound to anymore.
    pub tiles: usize,
    /// Distinct tiles still bound to at least one key.
    pub bound_tiles: usize,
    /// Bound keys, aliases included.
    pub keys: usize,
    /// Keys waiting in the background queue.
    pub pending: usize,
    /// Loads currently running.
    pub in_flight: usize,
    /// Keys in the failure set.
    pub failed: usize,
    /// Share of capacity in use.
    pub utilization: f32,
    /// UV cache hits.
    pub uv_cache_hits: u64,
    /// UV cache misses.
    pub uv_cache_misses: u64,
    /// Generation of the latest published snapshot.
    pub generation: u64,
}

/// A key as requested plus the raw string its bytes are fetched from.
#[derive(Clone, Debug)]
struct LoadRequest {
    key: TextureKey,
    raw: String,
}

enum Begin {
    Ready(Arc<TileRecord>),
    Failed(LoadError),
    Wait(LoadFuture),
}

struct State {
    backend: Box<dyn SurfaceBackend>,
    index: MetadataIndex,
    uv_cache: UvCache,
    remap: BlockRemap,
    in_flight: HashMap<String, LoadFuture>,
    failed: HashMap<String, LoadRequest>,
    missing_warned: HashSet<String>,
    pending: VecDeque<LoadRequest>,
    pending_keys: HashSet<String>,
    generations: HashMap<String, u64>,
    custom_keys: HashMap<String, HashSet<String>>,
    essential: Vec<String>,
    placeholder: Option<Arc<TileRecord>>,
    next_tile: u64,
    worker_running: bool,
    publish_scheduled: bool,
}

impl State {
    fn key_for(&self, raw: &str) -> TextureKey {
        self.remap.apply(TextureKey::parse(raw))
    }

    fn generation_of(&self, canonical: &str) -> u64 {
        self.generations.get(canonical).copied().unwrap_or(0)
    }

    fn is_placeholder(&self, record: &Arc<TileRecord>) -> bool {
        self.placeholder
            .as_ref()
            .is_some_and(|p| Arc::ptr_eq(p, record))
    }

    fn placeholder_coord(&self, offset: Vec2) -> TexCoord {
        self.placeholder
            .as_ref()
            .map(|p| self.backend.resolve(&p.placement, offset))
            .unwrap_or_default()
    }

    /// Places a raster and builds its record.
    fn place(&mut self, canonical: &str, raster: &RgbaImage) -> Result<Arc<TileRecord>, AllocError> {
        let insertion = self.backend.insert(raster)?;
        if insertion.resized {
            self.uv_cache.invalidate();
        }
        self.next_tile += 1;
        Ok(Arc::new(TileRecord {
            id: TileId(self.next_tile),
            placement: insertion.placement,
            is_transparent: has_transparency(raster),
            source_key: canonical.to_string(),
        }))
    }

    /// Adds a request to the background queue unless it is already known.
    fn enqueue(&mut self, request: LoadRequest) -> bool {
        let canonical = request.key.canonical();
        if self.index.contains(&canonical)
            || self.in_flight.contains_key(&canonical)
            || self.failed.contains_key(&canonical)
            || !self.pending_keys.insert(canonical)
        {
            return false;
        }
        self.pending.push_back(request);
        true
    }

    fn pop_pending(&mut self) -> Option<LoadRequest> {
        let request = self.pending.pop_front()?;
        self.pending_keys.remove(&request.key.canonical());
        Some(request)
    }

    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty() && !self.worker_running
    }
}

struct Inner {
    config: Config,
    placeholder_key: String,
    decoder: Arc<dyn ImageDecoder>,
    runtime: Option<Handle>,
    state: Mutex<State>,
    surface: SurfaceWatch,
    idle: Notify,
    ready: AtomicBool,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn runtime(&self) -> Option<Handle> {
        Handle::try_current().ok().or_else(|| self.runtime.clone())
    }

    fn source_for(&self, raw: &str) -> Option<TextureSource> {
        if raw.trim() == BUILTIN_ERROR_TEXTURE {
            None
        } else {
            Some(TextureSource::from_raw(raw, &self.config.loader.asset_root))
        }
    }

    fn begin_load(self: &Arc<Self>, request: LoadRequest) -> Begin {
        let mut state = self.lock();
        let canonical = request.key.canonical();
        if let Some(record) = state.index.get(&canonical) {
            return Begin::Ready(Arc::clone(record));
        }
        if state.failed.contains_key(&canonical) {
            return Begin::Failed(LoadError::PreviouslyFailed { key: canonical });
        }
        if let Some(pending) = state.in_flight.get(&canonical) {
            return Begin::Wait(pending.clone());
        }
        let Some(runtime) = self.runtime() else {
            tracing::warn!(key = %canonical, "no async runtime available to load texture");
            return Begin::Failed(LoadError::TaskAborted { key: canonical });
        };

        let generation = state.generation_of(&canonical);
        tracing::debug!(key = %canonical, source = %request.raw, "loading texture");
        let task = runtime.spawn(Arc::clone(self).run_load(request.clone(), canonical.clone(), generation));
        let weak = Arc::downgrade(self);
        let key = canonical.clone();
        let pending = async move {
            match task.await {
                Ok(result) => result,
                Err(err) => {
                    tracing::error!(key = %key, error = %err, "texture load task aborted");
                    match weak.upgrade() {
                        Some(inner) => inner.abandon_load(request, &key, generation, err.to_string()),
                        None => Err(LoadError::TaskAborted { key }),
                    }
                }
            }
        }
        .boxed()
        .shared();
        state.in_flight.insert(canonical, pending.clone());
        Begin::Wait(pending)
    }

    async fn run_load(self: Arc<Self>, request: LoadRequest, canonical: String, generation: u64) -> LoadResult {
        let decoded = match self.source_for(&request.raw) {
            Some(source) => self.decoder.decode(source).await,
            None => Ok(error_checkerboard(PLACEHOLDER_SIZE)),
        };

        let (result, changed) = {
            let mut state = self.lock();
            state.in_flight.remove(&canonical);
            self.finish_load(&mut state, request, &canonical, generation, decoded)
        };
        self.idle.notify_waiters();
        if changed {
            self.schedule_publish();
        }
        result
    }

    /// Settles a load whose task died before finishing, treating it as a
    /// decode failure.
    fn abandon_load(&self, request: LoadRequest, canonical: &str, generation: u64, reason: String) -> LoadResult {
        let (result, _) = {
            let mut state = self.lock();
            state.in_flight.remove(canonical);
            let decoded = Err(DecodeError::Worker(reason));
            self.finish_load(&mut state, request, canonical, generation, decoded)
        };
        self.idle.notify_waiters();
        result
    }

    /// Applies the load outcome to the index. Returns the outcome and whether
    /// the surface changed.
    fn finish_load(
        &self,
        state: &mut State,
        request: LoadRequest,
        canonical: &str,
        generation: u64,
        decoded: Result<RgbaImage, DecodeError>,
    ) -> (LoadResult, bool) {
        if state.generation_of(canonical) != generation {
            tracing::debug!(key = %canonical, "discarding load superseded by a custom texture");
            let err = LoadError::Superseded {
                key: canonical.to_string(),
            };
            return (Err(err), false);
        }

        let raster = match decoded {
            Ok(raster) => raster,
            Err(source) => {
                let err = LoadError::Decode {
                    key: canonical.to_string(),
                    source,
                };
                if canonical == self.placeholder_key {
                    return (Err(err), false);
                }
                self.warn_missing(state, canonical, &err);
                state.failed.insert(canonical.to_string(), request);
                return match state.placeholder.clone() {
                    Some(placeholder) => {
                        state.index.register(&[canonical.to_string()], &placeholder);
                        (Ok(placeholder), false)
                    }
                    None => (Err(err), false),
                };
            }
        };

        match state.place(canonical, &raster) {
            Ok(record) => {
                state.index.register(&request.key.aliases(), &record);
                if canonical == self.placeholder_key && state.placeholder.is_none() {
                    state.placeholder = Some(Arc::clone(&record));
                }
                tracing::debug!(key = %canonical, tile = record.id.0, "texture indexed");
                (Ok(record), true)
            }
            Err(source) => {
                let err = LoadError::TextureSpaceExhausted {
                    key: canonical.to_string(),
                    source,
                };
                if canonical != self.placeholder_key {
                    self.warn_missing(state, canonical, &err);
                    state.failed.insert(canonical.to_string(), request);
                }
                (Err(err), false)
            }
        }
    }

    fn warn_missing(&self, state: &mut State, canonical: &str, err: &LoadError) {
        if state.missing_warned.insert(canonical.to_string()) && self.config.debug.warn_missing_textures {
            tracing::warn!(key = %canonical, error = %err, "texture unavailable, using placeholder");
        }
    }

    fn ensure_worker(self: &Arc<Self>, state: &mut State) {
        if state.worker_running || state.pending.is_empty() {
            return;
        }
        let Some(runtime) = self.runtime() else {
            tracing::debug!(pending = state.pending.len(), "no async runtime, background queue parked");
            return;
        };
        state.worker_running = true;
        runtime.spawn(drain_queue(Arc::downgrade(self)));
    }

    fn schedule_publish(self: &Arc<Self>) {
        {
            let mut state = self.lock();
            if state.publish_scheduled {
                return;
            }
            state.publish_scheduled = true;
        }
        let delay = Duration::from_millis(self.config.loader.publish_debounce_ms);
        match self.runtime() {
            Some(runtime) if !delay.is_zero() => {
                let weak = Arc::downgrade(self);
                runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.publish_now();
                    }
                });
            }
            _ => {
                self.publish_now();
            }
        }
    }

    /// Publishes the current surface. The state lock is held across the send
    /// so snapshots go out in the order the surface changed.
    fn publish_now(&self) -> u64 {
        let generation = {
            let mut state = self.lock();
            state.publish_scheduled = false;
            self.surface.publish(state.backend.image())
        };
        tracing::debug!(generation, "surface published");
        generation
    }
}

/// Background queue worker: one key at a time, yielding between items.
async fn drain_queue(weak: Weak<Inner>) {
    loop {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let next = {
            let mut state = inner.lock();
            let next = state.pop_pending();
            if next.is_none() {
                state.worker_running = false;
            }
            next
        };
        let Some(request) = next else {
            inner.idle.notify_waiters();
            return;
        };

        let context = TextureContext { inner };
        if let Err(err) = context.load_request(request).await {
            tracing::debug!(key = %err.key(), error = %err, "background load failed");
        }
        drop(context);
        tokio::task::yield_now().await;
    }
}

/// Shared handle to the texture subsystem.
///
/// Cloning is cheap; every clone sees the same index and surface.
#[derive(Clone)]
pub struct TextureContext {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TextureContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureContext")
            .field("ready", &self.is_ready())
            .field("stats", &self.stats())
            .finish()
    }
}

impl TextureContext {
    /// Builds a context, selecting the surface backend from `capabilities`.
    ///
    /// Nothing is loaded until [`initialize`](Self::initialize). If called
    /// inside a tokio runtime, that runtime also runs background work started
    /// from threads outside it.
    pub fn new(config: Config, decoder: Arc<dyn ImageDecoder>, capabilities: SurfaceCapabilities) -> Self {
        let backend = select_backend(capabilities, &config.atlas);
        let placeholder_key = TextureKey::parse(&config.loader.error_texture).canonical();
        let essential = config.loader.essential.clone();
        let state = State {
            backend,
            index: MetadataIndex::new(),
            uv_cache: UvCache::new(),
            remap: BlockRemap::new(),
            in_flight: HashMap::new(),
            failed: HashMap::new(),
            missing_warned: HashSet::new(),
            pending: VecDeque::new(),
            pending_keys: HashSet::new(),
            generations: HashMap::new(),
            custom_keys: HashMap::new(),
            essential,
            placeholder: None,
            next_tile: 0,
            worker_running: false,
            publish_scheduled: false,
        };
        Self {
            inner: Arc::new(Inner {
                config,
                placeholder_key,
                decoder,
                runtime: Handle::try_current().ok(),
                state: Mutex::new(state),
                surface: SurfaceWatch::new(),
                idle: Notify::new(),
                ready: AtomicBool::new(false),
            }),
        }
    }

    /// Loads the error placeholder, then every essential key, and publishes.
    ///
    /// Failing to load the placeholder is fatal: nothing can render without
    /// it. Essential keys that fail fall back to the placeholder as usual.
    pub async fn initialize(&self) -> Result<(), LoadError> {
        let placeholder_key = self.inner.config.loader.error_texture.clone();
        self.load_texture(&placeholder_key)
            .await
            .map_err(|source| LoadError::Initialization {
                key: self.inner.placeholder_key.clone(),
                source: Box::new(source),
            })?;

        let essential = self.inner.lock().essential.clone();
        let results = futures::future::join_all(essential.iter().map(|key| self.load_texture(key))).await;
        for err in results.into_iter().filter_map(Result::err) {
            tracing::warn!(key = %err.key(), error = %err, "essential texture failed to load");
        }

        self.inner.ready.store(true, Ordering::Release);
        let generation = self.inner.publish_now();
        let stats = self.stats();
        tracing::info!(
            backend = ?stats.backend,
            tiles = stats.tiles,
            generation,
            "texture context ready"
        );
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has completed.
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// Ensures `key` is indexed, or records it as failed.
    ///
    /// Idempotent: an indexed key returns its record immediately, an in-flight
    /// key joins the running load. A decode failure resolves to the placeholder
    /// once one exists.
    pub async fn load_texture(&self, key: &str) -> Result<Arc<TileRecord>, LoadError> {
        let request = {
            let state = self.inner.lock();
            LoadRequest {
                key: state.key_for(key),
                raw: key.to_string(),
            }
        };
        self.load_request(request).await
    }

    async fn load_request(&self, request: LoadRequest) -> Result<Arc<TileRecord>, LoadError> {
        match self.inner.begin_load(request) {
            Begin::Ready(record) => Ok(record),
            Begin::Failed(err) => Err(err),
            Begin::Wait(pending) => pending.await,
        }
    }

    /// Queues `key` for best-effort background loading.
    pub fn queue_texture_for_loading(&self, key: &str) {
        let mut state = self.inner.lock();
        let request = LoadRequest {
            key: state.key_for(key),
            raw: key.to_string(),
        };
        if state.enqueue(request) {
            self.inner.ensure_worker(&mut state);
        }
    }

    /// Sampling coordinate for `offset` within the texture bound to `key`.
    ///
    /// Never blocks. Tries the exact key, then the bare block path; on a miss
    /// the key is queued and the placeholder's coordinate is returned.
    pub fn get_texture_uv_coordinate(&self, key: &str, offset: Vec2) -> TexCoord {
        let mut state = self.inner.lock();
        let texture_key = state.key_for(key);
        let canonical = texture_key.canonical();
        if let Some(coord) = state.uv_cache.get(&canonical, offset) {
            return coord;
        }

        let hit = state
            .index
            .resolve(&texture_key)
            .map(|(matched, record)| (matched, Arc::clone(record)));
        match hit {
            Some((matched, record)) => {
                let coord = state.backend.resolve(&record.placement, offset);
                // Fallback hits are not cached so a later exact load shows up.
                if matched == canonical {
                    state.uv_cache.insert(&canonical, offset, coord);
                }
                coord
            }
            None => {
                let request = LoadRequest {
                    key: texture_key,
                    raw: key.to_string(),
                };
                if state.enqueue(request) {
                    self.inner.ensure_worker(&mut state);
                }
                state.placeholder_coord(offset)
            }
        }
    }

    /// Record bound to `key` or its bare block path.
    pub fn get_texture_metadata(&self, key: &str) -> Option<Arc<TileRecord>> {
        let state = self.inner.lock();
        let key = state.key_for(key);
        state.index.resolve(&key).map(|(_, record)| Arc::clone(record))
    }

    /// Whether `key` currently resolves to the error placeholder.
    pub fn is_placeholder(&self, key: &str) -> bool {
        let state = self.inner.lock();
        let key = state.key_for(key);
        state
            .index
            .resolve(&key)
            .is_some_and(|(_, record)| state.is_placeholder(record))
    }

    /// Whether any texel of the texture bound to `key` is translucent.
    pub fn is_texture_transparent(&self, key: &str) -> bool {
        self.get_texture_metadata(key)
            .is_some_and(|record| record.is_transparent)
    }

    /// Adds `key` to the startup fast lane. After startup it is queued instead.
    pub fn mark_texture_as_essential(&self, key: &str) {
        let mut state = self.inner.lock();
        if !state.essential.iter().any(|k| k == key) {
            state.essential.push(key.to_string());
        }
        if self.is_ready() {
            let request = LoadRequest {
                key: state.key_for(key),
                raw: key.to_string(),
            };
            if state.enqueue(request) {
                self.inner.ensure_worker(&mut state);
            }
        }
    }

    /// Drops the UV cache and publishes the current surface immediately.
    ///
    /// Bindings are kept, so coordinates are unchanged. Returns the published
    /// generation.
    pub fn rebuild_atlas(&self) -> u64 {
        let tiles = {
            let mut state = self.inner.lock();
            state.uv_cache.invalidate();
            state.backend.tile_count()
        };
        let generation = self.inner.publish_now();
        tracing::info!(tiles, generation, "texture atlas rebuilt");
        generation
    }

    /// Binds `key` to an embedded image, replacing any existing binding.
    ///
    /// The override wins over any load of the same key still in flight.
    /// Decode and capacity failures are returned without touching the index.
    pub async fn apply_custom_texture(
        &self,
        key: &str,
        texture: CustomTexture,
        options: ApplyOptions,
    ) -> Result<Arc<TileRecord>, LoadError> {
        // Every key this override binds gets a fresh stamp before the decode,
        // so loads of any of them still in flight resolve as superseded.
        let (texture_key, canonical, stamps) = {
            let mut state = self.inner.lock();
            let texture_key = state.key_for(key);
            let canonical = texture_key.canonical();
            let mut keys = custom_binding_keys(&texture_key, options.all_faces);
            if !keys.contains(&canonical) {
                keys.push(canonical.clone());
            }
            let stamps: Vec<(String, u64)> = keys
                .into_iter()
                .map(|bound| {
                    let generation = state.generations.entry(bound.clone()).or_insert(0);
                    *generation += 1;
                    let generation = *generation;
                    (bound, generation)
                })
                .collect();
            (texture_key, canonical, stamps)
        };

        let decoded = self.inner.decoder.decode(texture.into()).await;

        let record = {
            let mut state = self.inner.lock();
            let current = |state: &State, bound: &str| {
                stamps
                    .iter()
                    .any(|(key, generation)| key == bound && state.generation_of(bound) == *generation)
            };
            if !current(&state, &canonical) {
                return Err(LoadError::Superseded { key: canonical });
            }
            let raster = decoded.map_err(|source| LoadError::Decode {
                key: canonical.clone(),
                source,
            })?;
            let record = state
                .place(&canonical, &raster)
                .map_err(|source| LoadError::TextureSpaceExhausted {
                    key: canonical.clone(),
                    source,
                })?;

            // A later override of one of these keys keeps its own binding.
            let keys: Vec<String> = custom_binding_keys(&texture_key, options.all_faces)
                .into_iter()
                .filter(|bound| current(&state, bound))
                .collect();
            state.index.reregister(&keys, &record);
            for bound in &keys {
                state.failed.remove(bound);
                state.missing_warned.remove(bound);
            }
            if let Some(block) = custom_block_name(&texture_key) {
                state.custom_keys.entry(block).or_default().extend(keys.iter().cloned());
            }
            state.uv_cache.invalidate();
            tracing::debug!(key = %canonical, bound = keys.len(), "custom texture applied");
            record
        };

        if options.rebuild {
            self.rebuild_atlas();
        } else {
            self.inner.schedule_publish();
        }
        Ok(record)
    }

    /// Unbinds every key a custom texture registered for `block`.
    ///
    /// `block` is a block name or numeric id. The tiles stay on the
    /// append-only surface. Returns how many keys were unbound.
    pub fn clear_custom_textures_for_block(&self, block: &str) -> usize {
        let mut state = self.inner.lock();
        let Some(keys) = state.custom_keys.remove(block) else {
            return 0;
        };
        let keys: Vec<String> = keys.into_iter().collect();
        let removed = state.index.remove_all(&keys);
        state.uv_cache.invalidate();
        tracing::debug!(block, removed, "custom textures cleared");
        removed
    }

    /// Moves every failed key back to unrequested and queues it again.
    ///
    /// Placeholder aliases for those keys are dropped first. Returns how many
    /// keys were queued.
    pub fn retry_missing_textures(&self) -> usize {
        let mut state = self.inner.lock();
        let failed: Vec<(String, LoadRequest)> = state.failed.drain().collect();
        for (canonical, _) in &failed {
            let is_alias = state
                .index
                .get(canonical)
                .is_some_and(|record| state.is_placeholder(record));
            if is_alias {
                state.index.remove(canonical);
            }
        }
        state.missing_warned.clear();
        state.uv_cache.invalidate();

        let queued = failed
            .into_iter()
            .filter(|(_, request)| state.enqueue(request.clone()))
            .count();
        self.inner.ensure_worker(&mut state);
        tracing::info!(queued, "retrying missing textures");
        queued
    }

    /// Keys that fell back to the placeholder or failed, sorted.
    pub fn missing_textures(&self) -> Vec<String> {
        let state = self.inner.lock();
        let mut keys: Vec<String> = state.missing_warned.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Replaces the block name remap applied to keys from now on.
    pub fn set_block_remap(&self, remap: BlockRemap) {
        let mut state = self.inner.lock();
        tracing::debug!(entries = remap.len(), "block remap updated");
        state.remap = remap;
    }

    /// A new subscriber to surface snapshots.
    pub fn subscribe(&self) -> watch::Receiver<SurfaceSnapshot> {
        self.inner.surface.subscribe()
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> SurfaceSnapshot {
        self.inner.surface.current()
    }

    /// Resolves once the queue is drained and no load is running.
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.inner.idle.notified());
            notified.as_mut().enable();
            if self.inner.lock().is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Current counters.
    pub fn stats(&self) -> AtlasStats {
        let state = self.inner.lock();
        let (uv_cache_hits, uv_cache_misses) = state.uv_cache.counters();
        AtlasStats {
            backend: state.backend.kind(),
            dimensions: state.backend.dimensions(),
            tiles: state.backend.tile_count(),
            bound_tiles: state.index.record_count(),
            keys: state.index.key_count(),
            pending: state.pending.len(),
            in_flight: state.in_flight.len(),
            failed: state.failed.len(),
            utilization: state.backend.utilization(),
            uv_cache_hits,
            uv_cache_misses,
            generation: self.inner.surface.current().generation,
        }
    }

    /// Every bound key and its record, sorted by key.
    pub fn entries(&self) -> Vec<(String, Arc<TileRecord>)> {
        let state = self.inner.lock();
        let mut entries: Vec<_> = state
            .index
            .iter()
            .map(|(key, record)| (key.clone(), Arc::clone(record)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

/// Keys bound by a custom texture.
fn custom_binding_keys(key: &TextureKey, all_faces: bool) -> Vec<String> {
    if !all_faces {
        return key.aliases();
    }
    if let TextureKey::CustomId { id } = key {
        return TextureKey::custom_block_aliases(*id);
    }
    let Some(block) = key.block() else {
        return key.aliases();
    };
    if let Ok(id) = block.parse() {
        return TextureKey::custom_block_aliases(id);
    }
    let mut keys = vec![
        TextureKey::BlockPath {
            block: block.to_string(),
        }
        .canonical(),
    ];
    keys.extend(BlockFace::ALL.into_iter().map(|face| {
        TextureKey::FacePath {
            block: block.to_string(),
            face,
        }
        .canonical()
    }));
    keys
}

fn custom_block_name(key: &TextureKey) -> Option<String> {
    match key {
        TextureKey::CustomId { id } => Some(id.to_string()),
        other => other.block().map(str::to_string),
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
