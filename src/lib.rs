//! Image sequence and movie I/O for playback.
//!
//! [`IoSystem`] dispatches files to format plugins (Cineon, DPX, TIFF, PPM, PNG, JPEG, OpenEXR,
//! FFmpeg). Decoded frames are kept in a byte-bounded [`FileCache`], and the [`playback`] module
//! steps through them.
//!
//! ```no_run
//! use djv::{FileInfo, FrameRequest, IoSystem, Logger};
//!
//! let io = IoSystem::new(Logger::default());
//! let mut reader = io.read(&FileInfo::new("plate.0001.dpx"))?;
//! let image = reader.read(&FrameRequest::frame(1))?;
//! println!("{}x{} {}", image.size().w, image.size().h, image.pixel());
//! # Ok::<(), djv::DjvError>(())
//! ```

#![forbid(unsafe_code)]

pub mod cache;
pub mod file_info;
pub mod formats;
pub mod image;
pub mod io;
pub mod playback;
pub mod settings;

mod foundation;

pub use cache::{FileCache, FileCacheKey, WindowId};
pub use file_info::{FileInfo, FileKind, Sequence, list_directory};
pub use foundation::core::{FrameRange, Mirror, Size, Speed};
pub use foundation::error::{DjvError, DjvResult};
pub use foundation::log::Logger;
pub use image::{Image, ImageInfo, Pixel, Proxy, Tags};
pub use io::{FrameRequest, ImageRead, ImageWrite, IoInfo, IoPlugin, IoSystem, OptionChanged};
pub use playback::{CachedReader, LoopMode, PlaybackState, ReadWorker, Timeline};
pub use settings::{CacheSettings, Settings};
