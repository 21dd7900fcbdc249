use serde_json::json;

use super::*;
use crate::foundation::log::Logger;

fn temp_dir(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "djv_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

#[test]
fn missing_file_gives_defaults() {
    let dir = temp_dir("settings_missing");
    let settings = Settings::load(&dir.join("nope.json")).unwrap();
    assert_eq!(settings, Settings::default());
    assert!(settings.cache.enabled);
    assert_eq!(settings.cache.max_size_gb, 4.0);
}

#[test]
fn save_then_load_restores_plugin_options() {
    let dir = temp_dir("settings_round_trip");
    let path = dir.join("nested").join("djv.json");

    let mut io = IoSystem::new(Logger::silent());
    io.set_option("OpenEXR", "thread_count", json!(2)).unwrap();
    io.set_option("TIFF", "compression", json!("lzw")).unwrap();
    let cache = FileCache::new(1.5, Logger::silent());
    cache.set_enabled(false);
    Settings::capture(&io, &cache).save(&path).unwrap();

    let loaded = Settings::load(&path).unwrap();
    assert_eq!(loaded.cache.max_size_gb, 1.5);
    assert!(!loaded.cache.enabled);

    let mut fresh = IoSystem::new(Logger::silent());
    let fresh_cache = FileCache::new(4.0, Logger::silent());
    loaded.apply(&mut fresh, &fresh_cache).unwrap();
    assert_eq!(fresh.option("OpenEXR", "thread_count"), Some(json!(2)));
    assert_eq!(fresh.option("TIFF", "compression"), Some(json!("lzw")));
    assert_eq!(fresh.option("OpenEXR", "dwa_compression_level"), Some(json!(45.0)));
    assert!(!fresh_cache.is_enabled());
    assert_eq!(fresh_cache.max_size_gb(), 1.5);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn partial_files_keep_defaults_for_missing_keys() {
    let dir = temp_dir("settings_partial");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("djv.json");
    std::fs::write(&path, r#"{ "cache": { "max_size_gb": 0.5 }, "extra": 1 }"#).unwrap();
    let settings = Settings::load(&path).unwrap();
    assert!(settings.cache.enabled);
    assert_eq!(settings.cache.max_size_gb, 0.5);
    assert_eq!(settings.io, json!({}));

    std::fs::write(&path, "{ not json").unwrap();
    assert!(Settings::load(&path).is_err());
    std::fs::remove_dir_all(&dir).ok();
}
