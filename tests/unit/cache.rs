use std::io::Write;
use std::sync::{Arc, Mutex};

use super::*;
use crate::foundation::core::Size;
use crate::image::{ImageInfo, Pixel};

/// 100-byte image (10x10 L8) tagged with `n` in its first byte.
fn frame(n: u8) -> Image {
    let mut image = Image::new(ImageInfo::new(Size::new(10, 10), Pixel::LU8));
    image.data_mut()[0] = n;
    image
}

fn key(window: WindowId, frame: i64) -> FileCacheKey {
    FileCacheKey::new(window, frame)
}

#[test]
fn inserts_are_counted_and_retrievable() {
    let cache = FileCache::with_max_bytes(1000, Logger::silent());
    let w = WindowId::next();
    cache.add_item(key(w, 1), frame(1));
    cache.add_item(key(w, 2), frame(2));
    assert!(cache.has_item(&key(w, 1)));
    assert!(!cache.has_item(&key(w, 3)));
    assert_eq!(cache.item(&key(w, 2)).unwrap().data()[0], 2);
    assert_eq!(cache.byte_count(), 200);
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.percentage(), 20.0);

    cache.add_item(key(w, 2), frame(9));
    assert_eq!(cache.byte_count(), 200);
    assert_eq!(cache.item(&key(w, 2)).unwrap().data()[0], 9);
}

#[test]
fn eviction_follows_insertion_timestamps_not_access() {
    let cache = FileCache::with_max_bytes(300, Logger::silent());
    let w = WindowId::next();
    cache.add_item_at(key(w, 10), frame(10), 30);
    cache.add_item_at(key(w, 20), frame(20), 10);
    cache.add_item_at(key(w, 30), frame(30), 20);
    assert_eq!(cache.len(), 3);

    // Reading the oldest entry does not refresh it.
    assert!(cache.item(&key(w, 20)).is_some());
    cache.add_item_at(key(w, 40), frame(40), 40);

    assert!(cache.byte_count() <= cache.max_bytes());
    assert!(!cache.has_item(&key(w, 20)));
    assert_eq!(cache.frames(w), vec![10, 30, 40]);
}

#[test]
fn automatic_timestamps_continue_after_synthetic_ones() {
    let cache = FileCache::with_max_bytes(200, Logger::silent());
    let w = WindowId::next();
    cache.add_item_at(key(w, 1), frame(1), 100);
    cache.add_item(key(w, 2), frame(2));
    cache.add_item(key(w, 3), frame(3));
    assert_eq!(cache.frames(w), vec![2, 3]);
}

#[test]
fn largest_timestamp_is_accepted() {
    let cache = FileCache::with_max_bytes(1000, Logger::silent());
    let w = WindowId::next();
    cache.add_item_at(key(w, 1), frame(1), u64::MAX);
    cache.add_item_at(key(w, 2), frame(2), u64::MAX);
    assert_eq!(cache.frames(w), vec![1, 2]);
    assert_eq!(cache.byte_count(), 200);
}

#[test]
fn many_inserts_stay_within_budget() {
    let cache = FileCache::with_max_bytes(1050, Logger::silent());
    let w = WindowId::next();
    for i in 0..50 {
        cache.add_item(key(w, i), frame(i as u8));
        assert!(cache.byte_count() <= 1050);
    }
    assert_eq!(cache.len(), 10);
    assert_eq!(cache.frames(w), (40..50).collect::<Vec<_>>());
}

#[test]
fn shrinking_the_budget_purges_immediately() {
    let cache = FileCache::new(1.0, Logger::silent());
    assert_eq!(cache.max_bytes(), 1 << 30);
    assert_eq!(cache.max_size_gb(), 1.0);
    let w = WindowId::next();
    for i in 0..5 {
        cache.add_item(key(w, i), frame(0));
    }
    cache.set_max_bytes(250);
    assert_eq!(cache.frames(w), vec![3, 4]);
    cache.set_max_size_gb(0.0);
    assert!(cache.is_empty());
    assert_eq!(cache.byte_count(), 0);
}

#[test]
fn clearing_one_window_keeps_the_others() {
    let cache = FileCache::with_max_bytes(10_000, Logger::silent());
    let a = WindowId::next();
    let b = WindowId::next();
    assert_ne!(a, b);
    cache.add_item(key(a, 1), frame(1));
    cache.add_item(key(b, 1), frame(1));
    cache.add_item(key(a, 2), frame(2));
    cache.clear_items(a);
    assert!(cache.frames(a).is_empty());
    assert_eq!(cache.frames(b), vec![1]);
    assert_eq!(cache.byte_count(), 100);
    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn disabled_cache_ignores_inserts() {
    let cache = FileCache::with_max_bytes(10_000, Logger::silent());
    let w = WindowId::next();
    cache.add_item(key(w, 1), frame(1));
    cache.set_enabled(false);
    assert!(!cache.is_enabled());
    assert!(cache.is_empty());
    cache.add_item(key(w, 2), frame(2));
    assert!(cache.is_empty());
    cache.set_enabled(true);
    cache.add_item(key(w, 2), frame(2));
    assert_eq!(cache.len(), 1);
}

#[test]
fn shared_between_threads() {
    let cache = Arc::new(FileCache::with_max_bytes(2_000, Logger::silent()));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                let w = WindowId::next();
                for i in 0..25 {
                    cache.add_item(key(w, i), frame(t));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert!(cache.byte_count() <= 2_000);
    assert_eq!(cache.len(), 20);
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn purges_are_logged_through_the_injected_logger() {
    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let cache = FileCache::with_max_bytes(150, Logger::new(tracing::Dispatch::new(subscriber)));
    let w = WindowId::next();
    cache.add_item(key(w, 1), frame(1));
    cache.add_item(key(w, 2), frame(2));

    let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
    assert!(text.contains("cache purge"));
    assert!(text.contains("evicted=1"));
    assert!(text.contains("resident_bytes=100"));
}
