//! In-memory image model: pixel layouts, rasters, tags, and pixel-level transforms.

pub(crate) mod buffer;
pub(crate) mod convert;
pub(crate) mod info;
pub(crate) mod pixel;
pub(crate) mod proxy;

pub use buffer::Image;
pub use convert::{convert, reorient, to_top_down};
pub use info::{ImageInfo, Tags};
pub use pixel::{Pixel, pack_u10, unpack_u10};
pub use proxy::{Proxy, proxy_scale};

#[cfg(test)]
#[path = "../tests/unit/image.rs"]
mod tests;
