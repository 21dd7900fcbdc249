use serde_json::Value;

use crate::file_info::FileInfo;
use crate::foundation::error::{DjvError, DjvResult};
use crate::image::Image;
use crate::io::{AudioSamples, FrameRequest, IoInfo};

/// One codec: its options, the extensions it claims and its reader/writer factories.
///
/// Options live in a plugin-owned `serde` struct; the default methods expose it generically
/// through [`IoPlugin::options_json`] / [`IoPlugin::set_options_json`].
pub trait IoPlugin: Send + Sync {
    /// Static plugin name, used in errors, settings keys and log lines.
    fn name(&self) -> &'static str;

    /// One-line human readable description.
    fn description(&self) -> &'static str;

    /// Lowercase file extensions including the leading dot.
    fn extensions(&self) -> &'static [&'static str];

    /// `true` when numbered files of this format aggregate into sequences.
    fn can_sequence(&self) -> bool {
        true
    }

    /// `true` when this plugin can open `info` for reading.
    fn can_read(&self, info: &FileInfo) -> bool {
        self.claims(info)
    }

    /// `true` when this plugin can write `io` into `info`.
    fn can_write(&self, info: &FileInfo, io: &IoInfo) -> bool {
        self.claims(info) && !io.layers.is_empty()
    }

    /// Extension match against [`IoPlugin::extensions`].
    fn claims(&self, info: &FileInfo) -> bool {
        let ext = info.extension_lower();
        self.extensions().iter().any(|e| *e == ext)
    }

    /// Current options as a JSON object.
    fn options_json(&self) -> Value;

    /// Replace every option from a complete JSON object.
    fn set_options_json(&mut self, value: Value) -> DjvResult<()>;

    /// Names of the options, sorted.
    fn option_names(&self) -> Vec<String> {
        match self.options_json() {
            Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Value of one option.
    fn option(&self, name: &str) -> Option<Value> {
        self.options_json().get(name).cloned()
    }

    /// Set one option; unknown names and values of the wrong type are rejected and leave the
    /// options untouched.
    fn set_option(&mut self, name: &str, value: Value) -> DjvResult<()> {
        let mut all = self.options_json();
        let Some(map) = all.as_object_mut() else {
            return Err(DjvError::option(self.name(), name));
        };
        if !map.contains_key(name) {
            return Err(DjvError::option(self.name(), name));
        }
        let token = value.to_string();
        map.insert(name.to_string(), value);
        self.set_options_json(all)
            .map_err(|_| DjvError::option(self.name(), token))
    }

    /// Apply persisted options: unknown keys are ignored and missing keys keep their current
    /// value. Returns the names of the options that were present.
    fn load_options_json(&mut self, value: &Value) -> DjvResult<Vec<String>> {
        let Some(incoming) = value.as_object() else {
            return Err(DjvError::option(self.name(), value.to_string()));
        };
        let mut all = self.options_json();
        let mut applied = Vec::new();
        if let Some(map) = all.as_object_mut() {
            for (k, v) in incoming {
                if map.contains_key(k) {
                    map.insert(k.clone(), v.clone());
                    applied.push(k.clone());
                }
            }
        }
        self.set_options_json(all)?;
        Ok(applied)
    }

    /// Consume this plugin's flags from `args`, leaving everything else in place.
    ///
    /// Returns the names of the options that changed.
    fn command_line(&mut self, _args: &mut Vec<String>) -> DjvResult<Vec<String>> {
        Ok(Vec::new())
    }

    /// Open `info` for reading; the header is parsed before this returns.
    fn read(&self, info: &FileInfo) -> DjvResult<Box<dyn ImageRead>>;

    /// Open `info` for writing images described by `io`.
    fn write(&self, info: &FileInfo, io: &IoInfo) -> DjvResult<Box<dyn ImageWrite>>;
}

/// An open reader.
///
/// Readers are created open. [`ImageRead::close`] releases file and codec handles and may be
/// called any number of times; a later [`ImageRead::read`] reopens what it needs.
pub trait ImageRead: Send {
    /// Metadata parsed at open time.
    fn info(&self) -> &IoInfo;

    /// Decode one frame.
    fn read(&mut self, request: &FrameRequest) -> DjvResult<Image>;

    /// Decode the whole audio stream, remapped to `channels` interleaved channels.
    ///
    /// `Ok(None)` when the file has no audio.
    fn read_audio(&mut self, _channels: usize) -> DjvResult<Option<AudioSamples>> {
        Ok(None)
    }

    /// Release handles.
    fn close(&mut self) {}
}

/// An open writer.
pub trait ImageWrite: Send {
    /// Encode `image` as `frame` (ignored by single-file formats).
    fn write(&mut self, image: &Image, frame: i64) -> DjvResult<()>;

    /// Flush and release handles; idempotent.
    fn close(&mut self) -> DjvResult<()> {
        Ok(())
    }
}

/// Decode a plugin's options struct from a complete JSON object.
pub(crate) fn decode_options<T: serde::de::DeserializeOwned>(
    plugin: &'static str,
    value: Value,
) -> DjvResult<T> {
    let token = value.to_string();
    serde_json::from_value(value).map_err(|_| DjvError::option(plugin, token))
}

/// Encode a plugin's options struct.
pub(crate) fn encode_options<T: serde::Serialize>(options: &T) -> Value {
    serde_json::to_value(options).unwrap_or(Value::Null)
}
