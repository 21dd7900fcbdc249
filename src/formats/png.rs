//! PNG through the `image` crate: gray, gray+alpha, RGB and RGBA at 8 or 16 bits.

use std::io::Write;

use image::ImageEncoder;
use image::codecs::png::{PngDecoder, PngEncoder};
use serde_json::Value;

use crate::file_info::FileInfo;
use crate::foundation::error::DjvResult;
use crate::formats::raster::{encode_to_vec, open_decoder, probe, read_pixels};
use crate::formats::write_file;
use crate::image::{Image, Pixel, convert, proxy_scale, to_top_down};
use crate::io::plugin::{decode_options, encode_options};
use crate::io::{FrameRequest, ImageRead, ImageWrite, IoInfo, IoPlugin, frame_path};

pub(crate) const NAME: &str = "PNG";

/// PNG has no tunable options; the struct keeps the settings shape uniform.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PngOptions {}

#[derive(Debug, Default)]
pub struct PngPlugin {
    options: PngOptions,
}

impl PngPlugin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IoPlugin for PngPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Portable Network Graphics"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".png"]
    }

    fn options_json(&self) -> Value {
        encode_options(&self.options)
    }

    fn set_options_json(&mut self, value: Value) -> DjvResult<()> {
        self.options = decode_options(NAME, value)?;
        Ok(())
    }

    fn read(&self, info: &FileInfo) -> DjvResult<Box<dyn ImageRead>> {
        let path = info.path();
        let name = path.display().to_string();
        let decoder = open_decoder(NAME, &path, PngDecoder::new)?;
        let mut io = IoInfo::new(probe(NAME, &name, &decoder)?);
        io.sequence = info.sequence().clone();
        Ok(Box::new(PngReader {
            file: info.clone(),
            info: io,
        }))
    }

    fn write(&self, info: &FileInfo, _io: &IoInfo) -> DjvResult<Box<dyn ImageWrite>> {
        Ok(Box::new(PngWriter { file: info.clone() }))
    }
}

/// Float and 10-bit layouts are stored as 16-bit integers.
pub(crate) fn output_pixel(pixel: Pixel) -> Pixel {
    match pixel {
        Pixel::LF32 => Pixel::LU16,
        Pixel::LaF32 => Pixel::LaU16,
        Pixel::RgbF32 | Pixel::RgbU10 => Pixel::RgbU16,
        Pixel::RgbaF32 => Pixel::RgbaU16,
        p => p,
    }
}

struct PngReader {
    file: FileInfo,
    info: IoInfo,
}

impl ImageRead for PngReader {
    fn info(&self) -> &IoInfo {
        &self.info
    }

    fn read(&mut self, request: &FrameRequest) -> DjvResult<Image> {
        let path = frame_path(&self.file, request.frame);
        let name = path.display().to_string();
        let decoder = open_decoder(NAME, &path, PngDecoder::new)?;
        let image = read_pixels(NAME, &name, decoder)?;
        Ok(proxy_scale(&image, request.proxy))
    }
}

struct PngWriter {
    file: FileInfo,
}

impl ImageWrite for PngWriter {
    fn write(&mut self, image: &Image, frame: i64) -> DjvResult<()> {
        let path = self.file.path_for(frame);
        let name = path.display().to_string();
        let image = to_top_down(&convert(image, output_pixel(image.pixel())));
        let bytes = encode_to_vec(NAME, &name, &image, |out, data, w, h, color| {
            PngEncoder::new(out).write_image(data, w, h, color)
        })?;
        write_file(NAME, &path, |w| w.write_all(&bytes))
    }
}
