//! JPEG through the `image` crate. Lossy: 8-bit gray or RGB only.

use std::io::{Cursor, Write};
use std::path::Path;

use image::ImageEncoder;
use image::codecs::jpeg::{JpegDecoder, JpegEncoder};
use serde_json::Value;

use crate::file_info::FileInfo;
use crate::foundation::error::{DjvError, DjvResult};
use crate::formats::raster::{encode_to_vec, open_decoder, probe, read_pixels};
use crate::formats::write_file;
use crate::image::{Image, Pixel, convert, proxy_scale, to_top_down};
use crate::io::args::{parse_token, take_flag};
use crate::io::plugin::{decode_options, encode_options};
use crate::io::{FrameRequest, ImageRead, ImageWrite, IoInfo, IoPlugin, frame_path};

pub(crate) const NAME: &str = "JPEG";

/// JPEG options.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct JpegOptions {
    /// Encoder quality, 1 to 100.
    pub quality: u8,
}

impl Default for JpegOptions {
    fn default() -> Self {
        Self { quality: 90 }
    }
}

#[derive(Debug, Default)]
pub struct JpegPlugin {
    options: JpegOptions,
}

impl JpegPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(&self) -> &JpegOptions {
        &self.options
    }
}

impl IoPlugin for JpegPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "JPEG File Interchange Format"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".jpg", ".jpeg", ".jfif"]
    }

    fn options_json(&self) -> Value {
        encode_options(&self.options)
    }

    fn set_options_json(&mut self, value: Value) -> DjvResult<()> {
        let options: JpegOptions = decode_options(NAME, value)?;
        if !(1..=100).contains(&options.quality) {
            return Err(DjvError::option(NAME, options.quality.to_string()));
        }
        self.options = options;
        Ok(())
    }

    fn command_line(&mut self, args: &mut Vec<String>) -> DjvResult<Vec<String>> {
        let mut changed = Vec::new();
        if let Some(v) = take_flag(NAME, args, "-jpeg_quality", 1)? {
            let quality: u8 = parse_token(NAME, &v[0])?;
            if !(1..=100).contains(&quality) {
                return Err(DjvError::option(NAME, &v[0]));
            }
            self.options.quality = quality;
            changed.push("quality".to_string());
        }
        Ok(changed)
    }

    fn read(&self, info: &FileInfo) -> DjvResult<Box<dyn ImageRead>> {
        let path = info.path();
        let name = path.display().to_string();
        let decoder = open_decoder(NAME, &path, JpegDecoder::new)?;
        let mut io = IoInfo::new(probe(NAME, &name, &decoder)?);
        io.sequence = info.sequence().clone();
        Ok(Box::new(JpegReader {
            file: info.clone(),
            info: io,
        }))
    }

    fn write(&self, info: &FileInfo, _io: &IoInfo) -> DjvResult<Box<dyn ImageWrite>> {
        Ok(Box::new(JpegWriter {
            file: info.clone(),
            quality: self.options.quality,
        }))
    }
}

pub(crate) fn output_pixel(pixel: Pixel) -> Pixel {
    if pixel.channel_count() <= 2 {
        Pixel::LU8
    } else {
        Pixel::RgbU8
    }
}

/// The whole file; a stream not closed by an EOI marker (zero padding aside) is truncated.
fn read_complete(path: &Path) -> DjvResult<Vec<u8>> {
    let name = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|e| DjvError::open(NAME, &name, e.to_string()))?;
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    if !bytes[..end].ends_with(&[0xFF, 0xD9]) {
        return Err(DjvError::read(NAME, &name, "missing end of image marker"));
    }
    Ok(bytes)
}

struct JpegReader {
    file: FileInfo,
    info: IoInfo,
}

impl ImageRead for JpegReader {
    fn info(&self) -> &IoInfo {
        &self.info
    }

    fn read(&mut self, request: &FrameRequest) -> DjvResult<Image> {
        let path = frame_path(&self.file, request.frame);
        let name = path.display().to_string();
        let bytes = read_complete(&path)?;
        let decoder = JpegDecoder::new(Cursor::new(bytes.as_slice()))
            .map_err(|e| DjvError::open(NAME, &name, e.to_string()))?;
        let image = read_pixels(NAME, &name, decoder)?;
        Ok(proxy_scale(&image, request.proxy))
    }
}

struct JpegWriter {
    file: FileInfo,
    quality: u8,
}

impl ImageWrite for JpegWriter {
    fn write(&mut self, image: &Image, frame: i64) -> DjvResult<()> {
        let path = self.file.path_for(frame);
        let name = path.display().to_string();
        let image = to_top_down(&convert(image, output_pixel(image.pixel())));
        let quality = self.quality;
        let bytes = encode_to_vec(NAME, &name, &image, |out, data, w, h, color| {
            JpegEncoder::new_with_quality(out, quality).write_image(data, w, h, color)
        })?;
        write_file(NAME, &path, |w| w.write_all(&bytes))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/formats/jpeg.rs"]
mod tests;
