use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use anyhow::Context;
use image::{GrayImage, RgbImage, RgbaImage};
use tracing::{debug, warn};

use crate::cache::key::ComputeKey;
use crate::config::EngineConfig;
use crate::design::render::{DesignRender, NamedLayer};
use crate::foundation::error::{GaugeError, GaugeResult};

/// Version tag written into the disk index; bump on blob format changes.
const INDEX_VERSION: u32 = 1;
const INDEX_FILE: &str = "index.json";

/// Union of all artifact kinds the engine memoizes.
///
/// A closed set rather than type erasure: every producer and consumer of
/// the shared cache names its variant explicitly.
#[derive(Clone, Debug)]
pub enum CachedArtifact {
    /// One decoded video frame.
    Frame(Arc<RgbImage>),
    /// One design render (overlay plus named layer bitmaps).
    Render(Arc<DesignRender>),
}

impl CachedArtifact {
    /// Approximate in-memory payload size, used for the eviction budget.
    pub fn size_bytes(&self) -> u64 {
        match self {
            Self::Frame(img) => img.as_raw().len() as u64,
            Self::Render(render) => {
                let mut total = render.overlay.as_raw().len() as u64;
                for layer in &render.layers {
                    total += layer.bitmap.as_raw().len() as u64;
                }
                total
            }
        }
    }

    /// Unwrap a frame artifact; any other variant is a caller bug.
    pub fn into_frame(self) -> GaugeResult<Arc<RgbImage>> {
        match self {
            Self::Frame(img) => Ok(img),
            other => Err(GaugeError::cache_access(format!(
                "expected frame artifact, found {}",
                other.kind_name()
            ))),
        }
    }

    /// Unwrap a render artifact; any other variant is a caller bug.
    pub fn into_render(self) -> GaugeResult<Arc<DesignRender>> {
        match self {
            Self::Render(render) => Ok(render),
            other => Err(GaugeError::cache_access(format!(
                "expected render artifact, found {}",
                other.kind_name()
            ))),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::Frame(_) => "frame",
            Self::Render(_) => "render",
        }
    }

    fn kind_tag(&self) -> u8 {
        match self {
            Self::Frame(_) => b'F',
            Self::Render(_) => b'R',
        }
    }

    fn encode_blob(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Self::Frame(img) => {
                push_image(&mut out, img.width(), img.height(), img.as_raw());
            }
            Self::Render(render) => {
                push_image(
                    &mut out,
                    render.overlay.width(),
                    render.overlay.height(),
                    render.overlay.as_raw(),
                );
                out.extend_from_slice(&(render.layers.len() as u32).to_le_bytes());
                for layer in &render.layers {
                    out.extend_from_slice(&(layer.name.len() as u32).to_le_bytes());
                    out.extend_from_slice(layer.name.as_bytes());
                    push_image(&mut out, layer.bitmap.width(), layer.bitmap.height(), layer.bitmap.as_raw());
                }
            }
        }
        out
    }

    fn decode_blob(kind_tag: u8, bytes: &[u8]) -> GaugeResult<Self> {
        let mut cursor = Cursor { bytes, pos: 0 };
        match kind_tag {
            b'F' => {
                let (w, h, data) = cursor.take_image(3)?;
                let img = RgbImage::from_raw(w, h, data)
                    .ok_or_else(|| GaugeError::cache_access("frame blob has bad dimensions"))?;
                Ok(Self::Frame(Arc::new(img)))
            }
            b'R' => {
                let (w, h, data) = cursor.take_image(4)?;
                let overlay = RgbaImage::from_raw(w, h, data)
                    .ok_or_else(|| GaugeError::cache_access("overlay blob has bad dimensions"))?;
                let layer_count = cursor.take_u32()?;
                let mut layers = Vec::with_capacity(layer_count as usize);
                for _ in 0..layer_count {
                    let name_len = cursor.take_u32()? as usize;
                    let name = String::from_utf8(cursor.take_bytes(name_len)?.to_vec())
                        .map_err(|_| GaugeError::cache_access("layer name is not utf-8"))?;
                    let (lw, lh, ldata) = cursor.take_image(1)?;
                    let bitmap = GrayImage::from_raw(lw, lh, ldata)
                        .ok_or_else(|| GaugeError::cache_access("layer blob has bad dimensions"))?;
                    layers.push(NamedLayer { name, bitmap });
                }
                Ok(Self::Render(Arc::new(DesignRender { overlay, layers })))
            }
            other => Err(GaugeError::cache_access(format!(
                "unknown artifact kind tag {other:#04x}"
            ))),
        }
    }
}

fn push_image(out: &mut Vec<u8>, width: u32, height: u32, data: &[u8]) {
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(data);
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take_bytes(&mut self, n: usize) -> GaugeResult<&'a [u8]> {
        let bytes = self.bytes;
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= bytes.len())
            .ok_or_else(|| GaugeError::cache_access("blob truncated"))?;
        let slice = &bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_u32(&mut self) -> GaugeResult<u32> {
        let b = self.take_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn take_image(&mut self, channels: usize) -> GaugeResult<(u32, u32, Vec<u8>)> {
        let w = self.take_u32()?;
        let h = self.take_u32()?;
        let len = (w as usize)
            .checked_mul(h as usize)
            .and_then(|px| px.checked_mul(channels))
            .ok_or_else(|| GaugeError::cache_access("blob image size overflows"))?;
        Ok((w, h, self.take_bytes(len)?.to_vec()))
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct IndexFile {
    version: u32,
    entries: Vec<IndexEntry>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct IndexEntry {
    key: u64,
    kind: u8,
    file: String,
    size_bytes: u64,
}

enum Slot {
    /// A producer is computing this key right now.
    InFlight,
    /// Value resident in memory (and mirrored on disk when backed).
    Present {
        value: CachedArtifact,
        size_bytes: u64,
        touch: u64,
    },
    /// Restored from the disk index; rehydrated into memory on first use.
    OnDisk {
        kind: u8,
        file: String,
        size_bytes: u64,
        touch: u64,
    },
}

struct CacheInner {
    open: bool,
    slots: HashMap<u64, Slot>,
    total_bytes: u64,
    touch_counter: u64,
}

/// Memoizing store keyed by (operation identity, ordered arguments).
///
/// Entry lifecycle is `Absent → InFlight → Present`. At most one producer
/// transitions a key out of `Absent`; concurrent readers of an `InFlight`
/// key poll with a bounded sleep until the value lands or `block_timeout`
/// elapses, then fall back to direct (duplicated) computation. A failed or
/// panicking producer releases the key back to `Absent`, so later callers
/// may retry.
///
/// The store enforces a byte budget with least-recently-touched eviction;
/// eviction is an acceleration concern only, never a correctness concern.
/// With a backing directory configured, entries are mirrored to blob files
/// behind a versioned JSON index and survive across instances.
pub struct ComputeCache {
    inner: Mutex<CacheInner>,
    dir: Option<PathBuf>,
    limit_bytes: u64,
    block_timeout: std::time::Duration,
    poll_interval: std::time::Duration,
}

impl ComputeCache {
    /// Open a cache according to `cfg`.
    ///
    /// With `cache_dir` unset the cache is memory-only and this cannot
    /// fail. With a directory set, a corrupt index fails initialization
    /// unless `wipe_cache_on_corruption` is set, in which case the
    /// directory is wiped and opening retried exactly once.
    pub fn open(cfg: &EngineConfig) -> GaugeResult<Self> {
        let slots = match &cfg.cache_dir {
            None => HashMap::new(),
            Some(dir) => match Self::load_dir(dir) {
                Ok(slots) => slots,
                Err(err) if cfg.wipe_cache_on_corruption => {
                    warn!(dir = %dir.display(), %err, "cache directory unreadable; wiping and retrying");
                    if dir.exists() {
                        std::fs::remove_dir_all(dir)
                            .with_context(|| format!("wipe cache dir '{}'", dir.display()))
                            .map_err(GaugeError::from)?;
                    }
                    Self::load_dir(dir)?
                }
                Err(err) => return Err(err),
            },
        };

        let total_bytes = slots
            .values()
            .map(|slot| match slot {
                Slot::OnDisk { size_bytes, .. } | Slot::Present { size_bytes, .. } => *size_bytes,
                Slot::InFlight => 0,
            })
            .sum();

        Ok(Self {
            inner: Mutex::new(CacheInner {
                open: true,
                slots,
                total_bytes,
                touch_counter: 0,
            }),
            dir: cfg.cache_dir.clone(),
            limit_bytes: cfg.cache_limit_bytes,
            block_timeout: cfg.cache_block_timeout,
            poll_interval: cfg.cache_poll_interval,
        })
    }

    fn load_dir(dir: &Path) -> GaugeResult<HashMap<u64, Slot>> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create cache dir '{}'", dir.display()))
            .map_err(GaugeError::from)?;

        let index_path = dir.join(INDEX_FILE);
        if !index_path.exists() {
            return Ok(HashMap::new());
        }

        let bytes = std::fs::read(&index_path)
            .with_context(|| format!("read cache index '{}'", index_path.display()))
            .map_err(GaugeError::from)?;
        let index: IndexFile = serde_json::from_slice(&bytes)
            .map_err(|e| GaugeError::setup(format!("corrupt cache index: {e}")))?;
        if index.version != INDEX_VERSION {
            return Err(GaugeError::setup(format!(
                "cache index version {} does not match expected {INDEX_VERSION}",
                index.version
            )));
        }

        let mut slots = HashMap::new();
        for entry in index.entries {
            if !dir.join(&entry.file).is_file() {
                debug!(file = %entry.file, "cache blob missing; dropping index entry");
                continue;
            }
            slots.insert(
                entry.key,
                Slot::OnDisk {
                    kind: entry.kind,
                    file: entry.file,
                    size_bytes: entry.size_bytes,
                    touch: 0,
                },
            );
        }
        Ok(slots)
    }

    /// Return the memoized value for `key`, computing it at most once.
    ///
    /// The first caller of an absent key becomes the producer and runs
    /// `compute` with no lock held. Concurrent callers wait (bounded) for
    /// the producer, then degrade to computing directly; the degraded
    /// result is returned but not stored.
    pub fn get_or_compute<F>(&self, key: &ComputeKey, compute: F) -> GaugeResult<CachedArtifact>
    where
        F: FnOnce() -> GaugeResult<CachedArtifact>,
    {
        let id = key.hash_id();
        let deadline = Instant::now() + self.block_timeout;

        loop {
            let mut inner = self.lock_open()?;
            match inner.slots.get(&id) {
                Some(Slot::Present { value, .. }) => {
                    let value = value.clone();
                    Self::touch_slot(&mut inner, id);
                    return Ok(value);
                }
                Some(Slot::OnDisk { kind, file, size_bytes, .. }) => {
                    let (kind, file, size_bytes) = (*kind, file.clone(), *size_bytes);
                    match self.rehydrate(kind, &file) {
                        Ok(value) => {
                            let touch = Self::next_touch(&mut inner);
                            inner.slots.insert(
                                id,
                                Slot::Present {
                                    value: value.clone(),
                                    size_bytes,
                                    touch,
                                },
                            );
                            return Ok(value);
                        }
                        Err(err) => {
                            // Fall through to recompute as if absent.
                            warn!(key = %key, %err, "cache blob unreadable; recomputing");
                            inner.slots.remove(&id);
                            inner.total_bytes = inner.total_bytes.saturating_sub(size_bytes);
                        }
                    }
                }
                Some(Slot::InFlight) => {
                    drop(inner);
                    if Instant::now() >= deadline {
                        warn!(key = %key, "in-flight wait timed out; computing directly (duplicate work)");
                        return compute();
                    }
                    std::thread::sleep(self.poll_interval);
                    continue;
                }
                None => {}
            }

            inner.slots.insert(id, Slot::InFlight);
            drop(inner);

            // Release the key on every exit path (error return or panic
            // unwind) so the slot never sticks in-flight.
            let guard = InFlightGuard { cache: self, id };
            let value = compute()?;
            guard.defuse();

            self.store_value(id, value.clone())?;
            return Ok(value);
        }
    }

    /// Return `true` when `key` has a stored value (in memory or on
    /// disk). An in-flight key is not yet contained.
    pub fn contains(&self, key: &ComputeKey) -> GaugeResult<bool> {
        let inner = self.lock_open()?;
        Ok(matches!(
            inner.slots.get(&key.hash_id()),
            Some(Slot::Present { .. }) | Some(Slot::OnDisk { .. })
        ))
    }

    /// Drop the stored value for `key`, if any. A key currently being
    /// produced is left alone; the producer owns it.
    pub fn invalidate(&self, key: &ComputeKey) -> GaugeResult<()> {
        let mut inner = self.lock_open()?;
        let id = key.hash_id();
        match inner.slots.get(&id) {
            Some(Slot::InFlight) | None => return Ok(()),
            Some(_) => {}
        }
        if let Some(slot) = inner.slots.remove(&id) {
            self.drop_slot_payload(&mut inner, id, &slot);
        }
        self.persist_index(&inner)?;
        Ok(())
    }

    /// Refresh the recency of `key` without reading it.
    pub fn touch(&self, key: &ComputeKey) -> GaugeResult<()> {
        let mut inner = self.lock_open()?;
        Self::touch_slot(&mut inner, key.hash_id());
        Ok(())
    }

    /// Drop all stored values. In-flight producers are unaffected.
    pub fn clear(&self) -> GaugeResult<()> {
        let mut inner = self.lock_open()?;
        let ids: Vec<u64> = inner
            .slots
            .iter()
            .filter(|(_, slot)| !matches!(slot, Slot::InFlight))
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            if let Some(slot) = inner.slots.remove(&id) {
                self.drop_slot_payload(&mut inner, id, &slot);
            }
        }
        self.persist_index(&inner)?;
        Ok(())
    }

    /// Current byte total of stored values.
    pub fn size_bytes(&self) -> GaugeResult<u64> {
        Ok(self.lock_open()?.total_bytes)
    }

    /// Close the cache. Every subsequent operation fails with a
    /// [`GaugeError::CacheAccess`] error.
    pub fn close(&self) -> GaugeResult<()> {
        let mut inner = self.lock_open()?;
        self.persist_index(&inner)?;
        inner.open = false;
        inner.slots.clear();
        inner.total_bytes = 0;
        Ok(())
    }

    fn lock_open(&self) -> GaugeResult<MutexGuard<'_, CacheInner>> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| GaugeError::cache_access("cache lock poisoned"))?;
        if !inner.open {
            return Err(GaugeError::cache_access("compute cache is closed"));
        }
        Ok(inner)
    }

    fn next_touch(inner: &mut CacheInner) -> u64 {
        inner.touch_counter += 1;
        inner.touch_counter
    }

    fn touch_slot(inner: &mut CacheInner, id: u64) {
        let next = Self::next_touch(inner);
        match inner.slots.get_mut(&id) {
            Some(Slot::Present { touch, .. }) | Some(Slot::OnDisk { touch, .. }) => *touch = next,
            _ => {}
        }
    }

    fn rehydrate(&self, kind: u8, file: &str) -> GaugeResult<CachedArtifact> {
        let dir = self
            .dir
            .as_ref()
            .ok_or_else(|| GaugeError::cache_access("on-disk slot without a cache dir"))?;
        let bytes = std::fs::read(dir.join(file))
            .with_context(|| format!("read cache blob '{file}'"))
            .map_err(GaugeError::from)?;
        CachedArtifact::decode_blob(kind, &bytes)
    }

    fn store_value(&self, id: u64, value: CachedArtifact) -> GaugeResult<()> {
        let size_bytes = value.size_bytes();

        if let Some(dir) = &self.dir {
            let file = blob_file_name(id);
            std::fs::write(dir.join(&file), value.encode_blob())
                .with_context(|| format!("write cache blob '{file}'"))
                .map_err(GaugeError::from)?;
        }

        let mut inner = self.lock_open()?;
        let touch = Self::next_touch(&mut inner);
        inner.slots.insert(
            id,
            Slot::Present {
                value,
                size_bytes,
                touch,
            },
        );
        inner.total_bytes += size_bytes;
        self.evict_over_budget(&mut inner);
        self.persist_index(&inner)?;
        Ok(())
    }

    fn evict_over_budget(&self, inner: &mut CacheInner) {
        while inner.total_bytes > self.limit_bytes {
            let victim = inner
                .slots
                .iter()
                .filter_map(|(id, slot)| match slot {
                    Slot::Present { touch, .. } | Slot::OnDisk { touch, .. } => Some((*id, *touch)),
                    Slot::InFlight => None,
                })
                .min_by_key(|&(_, touch)| touch)
                .map(|(id, _)| id);

            let Some(id) = victim else {
                break;
            };
            // Never evict the entry just stored if it is alone over budget.
            if inner.slots.len() == 1 {
                break;
            }
            if let Some(slot) = inner.slots.remove(&id) {
                debug!(key_id = id, "evicting least-recently-touched cache entry");
                self.drop_slot_payload(inner, id, &slot);
            }
        }
    }

    fn drop_slot_payload(&self, inner: &mut CacheInner, id: u64, slot: &Slot) {
        let size = match slot {
            Slot::Present { size_bytes, .. } | Slot::OnDisk { size_bytes, .. } => *size_bytes,
            Slot::InFlight => 0,
        };
        inner.total_bytes = inner.total_bytes.saturating_sub(size);

        if let Some(dir) = &self.dir {
            // Present slots are mirrored under their id-derived name.
            let file = match slot {
                Slot::Present { .. } => blob_file_name(id),
                Slot::OnDisk { file, .. } => file.clone(),
                Slot::InFlight => return,
            };
            let _ = std::fs::remove_file(dir.join(file));
        }
    }

    fn persist_index(&self, inner: &CacheInner) -> GaugeResult<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        let mut entries = Vec::new();
        for (id, slot) in &inner.slots {
            match slot {
                Slot::Present { value, size_bytes, .. } => entries.push(IndexEntry {
                    key: *id,
                    kind: value.kind_tag(),
                    file: blob_file_name(*id),
                    size_bytes: *size_bytes,
                }),
                Slot::OnDisk { kind, file, size_bytes, .. } => entries.push(IndexEntry {
                    key: *id,
                    kind: *kind,
                    file: file.clone(),
                    size_bytes: *size_bytes,
                }),
                Slot::InFlight => {}
            }
        }

        let index = IndexFile {
            version: INDEX_VERSION,
            entries,
        };
        let bytes = serde_json::to_vec(&index)
            .map_err(|e| GaugeError::cache_access(format!("serialize cache index: {e}")))?;
        std::fs::write(dir.join(INDEX_FILE), bytes)
            .with_context(|| format!("write cache index under '{}'", dir.display()))
            .map_err(GaugeError::from)
    }
}

fn blob_file_name(id: u64) -> String {
    format!("{id:016x}.bin")
}

/// Releases an in-flight key on drop unless defused after a successful
/// store. Covers error returns and panic unwinds alike.
struct InFlightGuard<'a> {
    cache: &'a ComputeCache,
    id: u64,
}

impl InFlightGuard<'_> {
    fn defuse(self) {
        std::mem::forget(self);
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.cache.inner.lock()
            && matches!(inner.slots.get(&self.id), Some(Slot::InFlight))
        {
            inner.slots.remove(&self.id);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/store.rs"]
mod tests;
