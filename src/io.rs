//! Plugin-based image and media I/O.
//!
//! An [`IoSystem`] owns one [`IoPlugin`] per format. Opening a file picks the first plugin whose
//! extensions match and returns an [`ImageRead`] whose header is already parsed; writing works the
//! same way through [`ImageWrite`].

pub(crate) mod args;
pub(crate) mod audio;
pub(crate) mod header;
pub(crate) mod plugin;
pub(crate) mod queue;
pub(crate) mod system;

use std::path::PathBuf;

use crate::file_info::{FileInfo, Sequence};
use crate::foundation::core::Speed;
use crate::image::{ImageInfo, Proxy, Tags};

pub use audio::{
    AudioInfo, AudioSamples, SampleLayout, SampleType, extract_audio, extract_audio_bytes,
};
pub use header::Endian;
pub use plugin::{ImageRead, ImageWrite, IoPlugin};
pub use queue::VideoQueue;
pub use system::IoSystem;

/// Metadata of an open file.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct IoInfo {
    /// Image layers; the first is the default.
    pub layers: Vec<ImageInfo>,
    /// File-level tags.
    pub tags: Tags,
    /// Frames available for reading.
    pub sequence: Sequence,
    /// Playback speed.
    pub speed: Speed,
    /// Audio stream, for media containers.
    pub audio: Option<AudioInfo>,
}

impl IoInfo {
    /// Single-layer info with default speed and an empty sequence.
    pub fn new(layer: ImageInfo) -> Self {
        Self {
            layers: vec![layer],
            tags: Tags::new(),
            sequence: Sequence::default(),
            speed: Speed::default(),
            audio: None,
        }
    }

    /// Layer `index`, if present.
    pub fn layer(&self, index: usize) -> Option<&ImageInfo> {
        self.layers.get(index)
    }

    /// Number of frames; a file without a sequence has one.
    pub fn frame_count(&self) -> usize {
        self.sequence.len().max(1)
    }
}

/// Which frame, layer and resolution to decode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameRequest {
    /// Frame number; `None` reads the first (or only) frame.
    pub frame: Option<i64>,
    /// Layer index.
    pub layer: usize,
    /// Decode downscale.
    pub proxy: Proxy,
}

impl FrameRequest {
    pub fn frame(frame: i64) -> Self {
        Self {
            frame: Some(frame),
            ..Self::default()
        }
    }

    pub fn with_layer(mut self, layer: usize) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_proxy(mut self, proxy: Proxy) -> Self {
        self.proxy = proxy;
        self
    }
}

/// Path of the file holding the requested frame.
pub(crate) fn frame_path(info: &FileInfo, frame: Option<i64>) -> PathBuf {
    match frame {
        Some(f) if info.is_numbered() => info.path_for(f),
        _ => info.path(),
    }
}

/// Notification sent to [`IoSystem::subscribe`] receivers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptionChanged {
    pub plugin: String,
    pub option: String,
}

#[cfg(test)]
#[path = "../tests/unit/io.rs"]
mod tests;
