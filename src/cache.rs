//! Decoded-frame memory cache shared by every open view.
//!
//! Entries are keyed by `(window, frame)` and evicted oldest-insertion first once the resident
//! byte total exceeds the budget. Access is serialized by an internal mutex, so a cache can be
//! shared between a UI thread and decode workers behind an `Arc`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::foundation::log::Logger;
use crate::image::Image;

const GIGABYTE: f64 = 1024.0 * 1024.0 * 1024.0;

static NEXT_WINDOW: AtomicU64 = AtomicU64::new(1);

/// Identifies one view (window) whose frames live in the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowId(u64);

impl WindowId {
    /// A process-unique id.
    pub fn next() -> Self {
        Self(NEXT_WINDOW.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Cache key: a frame of one window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileCacheKey {
    pub window: WindowId,
    pub frame: i64,
}

impl FileCacheKey {
    pub fn new(window: WindowId, frame: i64) -> Self {
        Self { window, frame }
    }
}

struct Entry {
    image: Image,
    bytes: usize,
    timestamp: u64,
}

struct Inner {
    enabled: bool,
    max_bytes: usize,
    bytes: usize,
    items: BTreeMap<FileCacheKey, Entry>,
}

impl Inner {
    fn remove(&mut self, key: &FileCacheKey) -> Option<Entry> {
        let entry = self.items.remove(key)?;
        self.bytes -= entry.bytes;
        Some(entry)
    }

    /// Evict oldest-inserted entries until within budget; returns (entries, bytes) evicted.
    fn purge(&mut self) -> (usize, usize) {
        if self.bytes <= self.max_bytes {
            return (0, 0);
        }
        let mut order: Vec<(u64, FileCacheKey)> = self
            .items
            .iter()
            .map(|(k, e)| (e.timestamp, *k))
            .collect();
        order.sort_unstable();

        let before = self.bytes;
        let mut count = 0;
        for (_, key) in order {
            if self.bytes <= self.max_bytes {
                break;
            }
            self.remove(&key);
            count += 1;
        }
        (count, before - self.bytes)
    }
}

/// Byte-bounded frame cache with FIFO-by-insertion eviction.
pub struct FileCache {
    inner: Mutex<Inner>,
    clock: AtomicU64,
    logger: Logger,
}

impl std::fmt::Debug for FileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("FileCache")
            .field("enabled", &inner.enabled)
            .field("max_bytes", &inner.max_bytes)
            .field("bytes", &inner.bytes)
            .field("items", &inner.items.len())
            .finish()
    }
}

fn gb_to_bytes(gb: f32) -> usize {
    (f64::from(gb.max(0.0)) * GIGABYTE) as usize
}

impl FileCache {
    /// Enabled cache holding at most `max_size_gb` gigabytes (2^30 bytes each).
    pub fn new(max_size_gb: f32, logger: Logger) -> Self {
        Self::with_max_bytes(gb_to_bytes(max_size_gb), logger)
    }

    /// Enabled cache with an exact byte budget.
    pub fn with_max_bytes(max_bytes: usize, logger: Logger) -> Self {
        Self {
            inner: Mutex::new(Inner {
                enabled: true,
                max_bytes,
                bytes: 0,
                items: BTreeMap::new(),
            }),
            clock: AtomicU64::new(0),
            logger,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    /// Disabling drops every entry; a disabled cache ignores inserts.
    pub fn set_enabled(&self, enabled: bool) {
        let mut inner = self.inner.lock();
        inner.enabled = enabled;
        if !enabled {
            inner.items.clear();
            inner.bytes = 0;
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.inner.lock().max_bytes
    }

    pub fn max_size_gb(&self) -> f32 {
        (self.max_bytes() as f64 / GIGABYTE) as f32
    }

    /// Change the budget, purging at once if the cache is now over it.
    pub fn set_max_size_gb(&self, gb: f32) {
        self.set_max_bytes(gb_to_bytes(gb));
    }

    pub fn set_max_bytes(&self, max_bytes: usize) {
        let mut inner = self.inner.lock();
        inner.max_bytes = max_bytes;
        self.purge_locked(&mut inner);
    }

    /// Resident bytes.
    pub fn byte_count(&self) -> usize {
        self.inner.lock().bytes
    }

    /// Resident bytes as a percentage of the budget.
    pub fn percentage(&self) -> f32 {
        let inner = self.inner.lock();
        if inner.max_bytes == 0 {
            return 0.0;
        }
        (inner.bytes as f64 / inner.max_bytes as f64 * 100.0) as f32
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn has_item(&self, key: &FileCacheKey) -> bool {
        self.inner.lock().items.contains_key(key)
    }

    /// Cached image; the returned clone shares its pixel buffer with the cache.
    pub fn item(&self, key: &FileCacheKey) -> Option<Image> {
        self.inner.lock().items.get(key).map(|e| e.image.clone())
    }

    /// Frames cached for `window`, ascending.
    pub fn frames(&self, window: WindowId) -> Vec<i64> {
        self.inner
            .lock()
            .items
            .keys()
            .filter(|k| k.window == window)
            .map(|k| k.frame)
            .collect()
    }

    /// Insert or replace `key`, then purge if over budget.
    pub fn add_item(&self, key: FileCacheKey, image: Image) {
        let timestamp = self.clock.fetch_add(1, Ordering::Relaxed);
        self.add_item_at(key, image, timestamp);
    }

    /// [`FileCache::add_item`] with an explicit insertion timestamp.
    ///
    /// Lower timestamps are evicted first. Later automatic timestamps continue above the highest
    /// one seen.
    pub fn add_item_at(&self, key: FileCacheKey, image: Image, timestamp: u64) {
        self.clock.fetch_max(timestamp.saturating_add(1), Ordering::Relaxed);
        let mut inner = self.inner.lock();
        if !inner.enabled {
            return;
        }
        inner.remove(&key);
        let bytes = image.byte_count();
        inner.bytes += bytes;
        inner.items.insert(
            key,
            Entry {
                image,
                bytes,
                timestamp,
            },
        );
        self.purge_locked(&mut inner);
    }

    /// Evict oldest-inserted entries until resident bytes fit the budget.
    pub fn purge(&self) {
        let mut inner = self.inner.lock();
        self.purge_locked(&mut inner);
    }

    fn purge_locked(&self, inner: &mut Inner) {
        let (count, bytes) = inner.purge();
        if count > 0 {
            let resident = inner.bytes;
            let max = inner.max_bytes;
            self.logger.scope(|| {
                tracing::debug!(
                    evicted = count,
                    evicted_bytes = bytes,
                    resident_bytes = resident,
                    max_bytes = max,
                    "cache purge"
                )
            });
        }
    }

    /// Drop every entry of `window`, leaving other windows untouched.
    pub fn clear_items(&self, window: WindowId) {
        let mut inner = self.inner.lock();
        let keys: Vec<FileCacheKey> = inner
            .items
            .keys()
            .filter(|k| k.window == window)
            .copied()
            .collect();
        for key in &keys {
            inner.remove(key);
        }
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.items.clear();
        inner.bytes = 0;
    }
}

#[cfg(test)]
#[path = "../tests/unit/cache.rs"]
mod tests;
