use std::collections::BTreeMap;

use crate::foundation::core::{Mirror, Size};
use crate::image::pixel::Pixel;

/// Geometry and layout of one image layer.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ImageInfo {
    /// Layer name; empty for single-layer images.
    pub name: String,
    /// Dimensions.
    pub size: Size,
    /// Pixel layout.
    pub pixel: Pixel,
    /// Orientation of the stored rows/columns.
    pub mirror: Mirror,
}

impl ImageInfo {
    /// Unnamed layer with default orientation.
    pub fn new(size: Size, pixel: Pixel) -> Self {
        Self {
            name: String::new(),
            size,
            pixel,
            mirror: Mirror::default(),
        }
    }

    /// Bytes in one row.
    pub fn scanline_byte_count(&self) -> usize {
        self.size.w as usize * self.pixel.byte_count()
    }

    /// Bytes in the whole raster.
    pub fn byte_count(&self) -> usize {
        self.scanline_byte_count() * self.size.h as usize
    }
}

/// Free-form string metadata attached to an image or file.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    /// Project / production name.
    pub const PROJECT: &'static str = "Project";
    /// Creating user or application.
    pub const CREATOR: &'static str = "Creator";
    /// Description text.
    pub const DESCRIPTION: &'static str = "Description";
    /// Copyright notice.
    pub const COPYRIGHT: &'static str = "Copyright";
    /// Creation time.
    pub const TIME: &'static str = "Time";
    /// UTC offset of [`Tags::TIME`].
    pub const UTC_OFFSET: &'static str = "UTC Offset";
    /// Film edge keycode.
    pub const KEYCODE: &'static str = "Keycode";
    /// SMPTE timecode.
    pub const TIMECODE: &'static str = "Timecode";

    /// Empty tag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup a tag.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Set a tag; empty (or whitespace-only) values are ignored.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            self.0.insert(key.into(), trimmed.to_string());
        }
    }

    /// Remove a tag.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// `true` when no tags are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate tags in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy every tag from `other`, overwriting existing keys.
    pub fn merge(&mut self, other: &Tags) {
        for (k, v) in other.iter() {
            self.0.insert(k.to_string(), v.to_string());
        }
    }
}
