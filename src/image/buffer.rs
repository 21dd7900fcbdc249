use std::sync::Arc;

use crate::foundation::core::{Mirror, Size};
use crate::foundation::error::{DjvError, DjvResult};
use crate::image::info::{ImageInfo, Tags};
use crate::image::pixel::Pixel;

/// Decoded raster plus metadata.
///
/// Clones share the pixel buffer; mutation goes through [`Image::data_mut`] (or [`Image::detach`]),
/// which copies the buffer first if another clone still references it.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    info: ImageInfo,
    tags: Tags,
    data: Arc<Vec<u8>>,
}

impl Image {
    /// Zero-filled image.
    pub fn new(info: ImageInfo) -> Self {
        let len = info.byte_count();
        Self {
            info,
            tags: Tags::new(),
            data: Arc::new(vec![0u8; len]),
        }
    }

    /// Wrap an existing buffer; its length must match `info`.
    pub fn from_data(info: ImageInfo, data: Vec<u8>) -> DjvResult<Self> {
        if data.len() != info.byte_count() {
            return Err(DjvError::validation(format!(
                "image buffer is {} bytes, expected {} for {}x{} {}",
                data.len(),
                info.byte_count(),
                info.size.w,
                info.size.h,
                info.pixel
            )));
        }
        Ok(Self {
            info,
            tags: Tags::new(),
            data: Arc::new(data),
        })
    }

    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    pub fn size(&self) -> Size {
        self.info.size
    }

    pub fn pixel(&self) -> Pixel {
        self.info.pixel
    }

    pub fn mirror(&self) -> Mirror {
        self.info.mirror
    }

    pub fn set_mirror(&mut self, mirror: Mirror) {
        self.info.mirror = mirror;
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.info.name = name.into();
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> &mut Tags {
        &mut self.tags
    }

    pub fn set_tags(&mut self, tags: Tags) {
        self.tags = tags;
    }

    /// Raw pixel bytes, rows in storage order.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable pixel bytes; copies the buffer if it is shared.
    pub fn data_mut(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    /// Make the buffer uniquely owned by this image.
    pub fn detach(&mut self) {
        let _ = Arc::make_mut(&mut self.data);
    }

    /// `true` when another clone references the same buffer.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }

    pub fn byte_count(&self) -> usize {
        self.data.len()
    }

    pub fn scanline_byte_count(&self) -> usize {
        self.info.scanline_byte_count()
    }

    /// Row `y` in storage order.
    pub fn scanline(&self, y: usize) -> &[u8] {
        let n = self.scanline_byte_count();
        &self.data[y * n..(y + 1) * n]
    }

    /// Mutable row `y` in storage order.
    pub fn scanline_mut(&mut self, y: usize) -> &mut [u8] {
        let n = self.scanline_byte_count();
        &mut self.data_mut()[y * n..(y + 1) * n]
    }

    /// Consume the image, returning its buffer (copied only when shared).
    pub fn into_data(self) -> Vec<u8> {
        Arc::try_unwrap(self.data).unwrap_or_else(|shared| (*shared).clone())
    }
}
