//! Built-in format plugins.

pub mod cineon;
pub mod dpx;
pub mod ffmpeg;
pub mod film_print;
pub mod jpeg;
pub mod openexr;
pub mod png;
pub mod ppm;
pub(crate) mod raster;
pub mod tiff;

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use anyhow::Context;

use crate::foundation::error::{DjvError, DjvResult};
use crate::io::IoPlugin;

/// Every built-in plugin, in dispatch order.
pub fn default_plugins() -> Vec<Box<dyn IoPlugin>> {
    vec![
        Box::new(cineon::CineonPlugin::new()),
        Box::new(dpx::DpxPlugin::new()),
        Box::new(tiff::TiffPlugin::new()),
        Box::new(ppm::PpmPlugin::new()),
        Box::new(png::PngPlugin::new()),
        Box::new(jpeg::JpegPlugin::new()),
        Box::new(openexr::OpenExrPlugin::new()),
        Box::new(ffmpeg::FfmpegPlugin::new()),
    ]
}

/// Read up to `len` leading bytes of `path`, plus the file's total length.
///
/// Short files return fewer bytes; header parsers reject them.
pub(crate) fn read_header_block(
    plugin: &'static str,
    path: &Path,
    len: usize,
) -> DjvResult<(Vec<u8>, u64)> {
    let name = path.display().to_string();
    let f = File::open(path).map_err(|e| DjvError::open(plugin, &name, e.to_string()))?;
    let total = f
        .metadata()
        .map_err(|e| DjvError::open(plugin, &name, e.to_string()))?
        .len();
    let mut buf = Vec::with_capacity(len);
    f.take(len as u64)
        .read_to_end(&mut buf)
        .map_err(|e| DjvError::open(plugin, &name, e.to_string()))?;
    Ok((buf, total))
}

/// Create `path` (and its parent directory) and stream into it through a buffered writer.
pub(crate) fn write_file(
    plugin: &'static str,
    path: &Path,
    body: impl FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
) -> DjvResult<()> {
    let name = path.display().to_string();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    let f = File::create(path).map_err(|e| DjvError::write(plugin, &name, e.to_string()))?;
    let mut w = BufWriter::new(f);
    body(&mut w).map_err(|e| DjvError::write(plugin, &name, e.to_string()))?;
    w.flush()
        .map_err(|e| DjvError::write(plugin, &name, e.to_string()))
}
