//! Persisted configuration: cache budget plus every plugin's options.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Context as _;
use serde_json::{Map, Value};

use crate::cache::FileCache;
use crate::foundation::error::DjvResult;
use crate::io::IoSystem;

/// Memory cache settings.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Budget in gigabytes (2^30 bytes).
    pub max_size_gb: f32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size_gb: 4.0,
        }
    }
}

/// Settings file contents.
///
/// `io` holds [`IoSystem::settings`] output: one object per plugin name.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cache: CacheSettings,
    pub io: Value,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache: CacheSettings::default(),
            io: Value::Object(Map::new()),
        }
    }
}

impl Settings {
    /// Read a settings file; a missing file yields the defaults.
    pub fn load(path: &Path) -> DjvResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let f = File::open(path)
            .with_context(|| format!("open settings '{}'", path.display()))?;
        let settings = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse settings JSON '{}'", path.display()))?;
        Ok(settings)
    }

    /// Write as pretty JSON, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> DjvResult<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create settings directory '{}'", dir.display()))?;
        }
        let text = serde_json::to_string_pretty(self).context("serialize settings")?;
        std::fs::write(path, text)
            .with_context(|| format!("write settings '{}'", path.display()))?;
        Ok(())
    }

    /// Snapshot the live state.
    pub fn capture(io: &IoSystem, cache: &FileCache) -> Self {
        Self {
            cache: CacheSettings {
                enabled: cache.is_enabled(),
                max_size_gb: cache.max_size_gb(),
            },
            io: io.settings(),
        }
    }

    /// Push these settings into a running system.
    pub fn apply(&self, io: &mut IoSystem, cache: &FileCache) -> DjvResult<()> {
        cache.set_enabled(self.cache.enabled);
        cache.set_max_size_gb(self.cache.max_size_gb);
        io.load_settings(&self.io)
    }
}

#[cfg(test)]
#[path = "../tests/unit/settings.rs"]
mod tests;
