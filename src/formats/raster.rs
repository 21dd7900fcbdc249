//! Glue between the `image` crate's decoders/encoders and [`Image`].

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;

use image::{ColorType, ExtendedColorType, ImageDecoder, ImageResult};

use crate::foundation::core::{Mirror, Size};
use crate::foundation::error::{DjvError, DjvResult};
use crate::image::{Image, ImageInfo, Pixel};

pub(crate) fn pixel_from_color(color: ColorType) -> Option<Pixel> {
    Some(match color {
        ColorType::L8 => Pixel::LU8,
        ColorType::La8 => Pixel::LaU8,
        ColorType::Rgb8 => Pixel::RgbU8,
        ColorType::Rgba8 => Pixel::RgbaU8,
        ColorType::L16 => Pixel::LU16,
        ColorType::La16 => Pixel::LaU16,
        ColorType::Rgb16 => Pixel::RgbU16,
        ColorType::Rgba16 => Pixel::RgbaU16,
        ColorType::Rgb32F => Pixel::RgbF32,
        ColorType::Rgba32F => Pixel::RgbaF32,
        _ => return None,
    })
}

pub(crate) fn color_for_pixel(pixel: Pixel) -> Option<ExtendedColorType> {
    Some(match pixel {
        Pixel::LU8 => ExtendedColorType::L8,
        Pixel::LaU8 => ExtendedColorType::La8,
        Pixel::RgbU8 => ExtendedColorType::Rgb8,
        Pixel::RgbaU8 => ExtendedColorType::Rgba8,
        Pixel::LU16 => ExtendedColorType::L16,
        Pixel::LaU16 => ExtendedColorType::La16,
        Pixel::RgbU16 => ExtendedColorType::Rgb16,
        Pixel::RgbaU16 => ExtendedColorType::Rgba16,
        Pixel::RgbF32 => ExtendedColorType::Rgb32F,
        Pixel::RgbaF32 => ExtendedColorType::Rgba32F,
        Pixel::LF32 | Pixel::LaF32 | Pixel::RgbU10 => return None,
    })
}

/// Open `path` through a decoder constructor, mapping failures to open errors.
pub(crate) fn open_decoder<D>(
    plugin: &'static str,
    path: &Path,
    new: impl FnOnce(BufReader<File>) -> ImageResult<D>,
) -> DjvResult<D> {
    let name = path.display().to_string();
    let f = File::open(path).map_err(|e| DjvError::open(plugin, &name, e.to_string()))?;
    new(BufReader::new(f)).map_err(|e| DjvError::open(plugin, &name, e.to_string()))
}

/// Layout reported by a decoder's header. Rows come out top-down.
pub(crate) fn probe(plugin: &'static str, file: &str, decoder: &impl ImageDecoder) -> DjvResult<ImageInfo> {
    let (w, h) = decoder.dimensions();
    let pixel = pixel_from_color(decoder.color_type()).ok_or_else(|| {
        DjvError::unsupported(plugin, file, format!("{:?} pixels", decoder.color_type()))
    })?;
    let mut info = ImageInfo::new(Size::new(w, h), pixel);
    info.mirror = Mirror::new(false, true);
    Ok(info)
}

/// Decode all pixels; samples arrive in native byte order.
pub(crate) fn read_pixels(plugin: &'static str, file: &str, decoder: impl ImageDecoder) -> DjvResult<Image> {
    let info = probe(plugin, file, &decoder)?;
    let mut data = vec![0u8; info.byte_count()];
    decoder
        .read_image(&mut data)
        .map_err(|e| DjvError::read(plugin, file, e.to_string()))?;
    Image::from_data(info, data)
}

/// Run an encoder into memory; `image` must already be in a layout the encoder accepts.
pub(crate) fn encode_to_vec(
    plugin: &'static str,
    file: &str,
    image: &Image,
    encode: impl FnOnce(&mut Cursor<Vec<u8>>, &[u8], u32, u32, ExtendedColorType) -> ImageResult<()>,
) -> DjvResult<Vec<u8>> {
    let color = color_for_pixel(image.pixel()).ok_or_else(|| {
        DjvError::unsupported(plugin, file, format!("{} pixels", image.pixel()))
    })?;
    let size = image.size();
    let mut out = Cursor::new(Vec::new());
    encode(&mut out, image.data(), size.w, size.h, color)
        .map_err(|e| DjvError::write(plugin, file, e.to_string()))?;
    Ok(out.into_inner())
}
