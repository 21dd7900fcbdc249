//! SMPTE 268M DPX (`.dpx`): 2048-byte header, first image element only.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde_json::Value;

use crate::file_info::FileInfo;
use crate::foundation::core::{Size, Speed};
use crate::foundation::error::{DjvError, DjvResult};
use crate::formats::film_print::{
    ColorProfile, FilmPrintToLinear, LinearToFilmPrint, apply_lut, keycode_from_string,
    keycode_to_string, mirror_from_orientation, orientation_from_mirror,
    parse_film_print_to_linear, parse_linear_to_film_print, timecode_from_string,
    timecode_to_string,
};
use crate::formats::{read_header_block, write_file};
use crate::image::{Image, ImageInfo, Pixel, Tags, convert, proxy_scale};
use crate::io::args::{parse_named, take_flag};
use crate::io::header::{Endian, HeaderReader, HeaderWriter, is_set_f32, is_set_u32};
use crate::io::plugin::{decode_options, encode_options};
use crate::io::{FrameRequest, ImageRead, ImageWrite, IoInfo, IoPlugin, frame_path};

pub(crate) const NAME: &str = "DPX";

const MAGIC: u32 = 0x5344_5058;
const HEADER_SIZE: usize = 2048;
const ELEMENT: usize = 780;

/// Tag keys specific to DPX headers.
pub mod tags {
    pub const SOURCE_FILE: &str = "DPX Source File";
    pub const SOURCE_TIME: &str = "DPX Source Time";
    pub const INPUT_DEVICE: &str = "DPX Input Device";
    pub const INPUT_SERIAL: &str = "DPX Input Serial";
    pub const FILM_FORMAT: &str = "DPX Film Format";
    pub const FRAME_ID: &str = "DPX Frame ID";
    pub const SLATE: &str = "DPX Slate";
}

/// Header version written to new files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DpxVersion {
    #[serde(rename = "1.0")]
    V1_0,
    #[default]
    #[serde(rename = "2.0")]
    V2_0,
}

impl DpxVersion {
    fn tag(self) -> &'static str {
        match self {
            DpxVersion::V1_0 => "V1.0",
            DpxVersion::V2_0 => "V2.0",
        }
    }
}

/// Pixel type written to new files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DpxType {
    /// Keep the source layout when DPX can store it.
    #[default]
    Auto,
    /// Always 10-bit RGB.
    U10,
}

/// Byte order written to new files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DpxEndian {
    /// Big endian.
    #[default]
    Auto,
    Msb,
    Lsb,
}

/// DPX options.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DpxOptions {
    pub input_color_profile: ColorProfile,
    pub input_film_print: FilmPrintToLinear,
    pub output_color_profile: ColorProfile,
    pub output_film_print: LinearToFilmPrint,
    pub version: DpxVersion,
    #[serde(rename = "type")]
    pub pixel_type: DpxType,
    pub endian: DpxEndian,
}

/// DPX plugin.
#[derive(Debug, Default)]
pub struct DpxPlugin {
    options: DpxOptions,
}

impl DpxPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(&self) -> &DpxOptions {
        &self.options
    }
}

impl IoPlugin for DpxPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "SMPTE Digital Picture Exchange"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".dpx"]
    }

    fn options_json(&self) -> Value {
        encode_options(&self.options)
    }

    fn set_options_json(&mut self, value: Value) -> DjvResult<()> {
        self.options = decode_options(NAME, value)?;
        Ok(())
    }

    fn command_line(&mut self, args: &mut Vec<String>) -> DjvResult<Vec<String>> {
        let mut changed = Vec::new();
        if let Some(v) = take_flag(NAME, args, "-dpx_input_color_profile", 1)? {
            self.options.input_color_profile = parse_named(NAME, &v[0])?;
            changed.push("input_color_profile".to_string());
        }
        if let Some(v) = take_flag(NAME, args, "-dpx_input_film_print", 4)? {
            self.options.input_film_print = parse_film_print_to_linear(NAME, &v)?;
            changed.push("input_film_print".to_string());
        }
        if let Some(v) = take_flag(NAME, args, "-dpx_output_color_profile", 1)? {
            self.options.output_color_profile = parse_named(NAME, &v[0])?;
            changed.push("output_color_profile".to_string());
        }
        if let Some(v) = take_flag(NAME, args, "-dpx_output_film_print", 3)? {
            self.options.output_film_print = parse_linear_to_film_print(NAME, &v)?;
            changed.push("output_film_print".to_string());
        }
        if let Some(v) = take_flag(NAME, args, "-dpx_version", 1)? {
            self.options.version = parse_named(NAME, &v[0])?;
            changed.push("version".to_string());
        }
        if let Some(v) = take_flag(NAME, args, "-dpx_type", 1)? {
            self.options.pixel_type = parse_named(NAME, &v[0])?;
            changed.push("type".to_string());
        }
        if let Some(v) = take_flag(NAME, args, "-dpx_endian", 1)? {
            self.options.endian = parse_named(NAME, &v[0])?;
            changed.push("endian".to_string());
        }
        Ok(changed)
    }

    fn read(&self, info: &FileInfo) -> DjvResult<Box<dyn ImageRead>> {
        Ok(Box::new(DpxReader::open(info, self.options.clone())?))
    }

    fn write(&self, info: &FileInfo, io: &IoInfo) -> DjvResult<Box<dyn ImageWrite>> {
        Ok(Box::new(DpxWriter {
            file: info.clone(),
            io: io.clone(),
            options: self.options.clone(),
        }))
    }
}

/// How element 0 is laid out on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    /// 10-bit RGB, one word per pixel, samples in the high bits.
    FilledA,
    /// 10-bit RGB, one word per pixel, samples in the low bits.
    FilledB,
    /// Whole samples of `bytes` width.
    Samples { bytes: usize },
}

#[derive(Clone, Debug)]
struct DpxHeader {
    endian: Endian,
    layout: Layout,
    data_offset: u64,
    stride: usize,
    info: ImageInfo,
    tags: Tags,
    speed: Option<Speed>,
}

impl DpxHeader {
    fn data_size(&self) -> Option<u64> {
        (self.stride as u64).checked_mul(u64::from(self.info.size.h))
    }

    /// Fail unless a file of `len` bytes holds all of the image data.
    fn check_length(&self, len: u64, file: &str) -> DjvResult<()> {
        let needed = self
            .data_size()
            .and_then(|n| n.checked_add(self.data_offset))
            .ok_or_else(|| DjvError::open(NAME, file, "image size overflows"))?;
        if len < needed {
            return Err(DjvError::open(
                NAME,
                file,
                format!("file is {len} bytes, image data needs {needed}"),
            ));
        }
        Ok(())
    }
}

fn ascii_number(h: &HeaderReader<'_>, off: usize, len: usize) -> Option<u32> {
    h.str_at(off, len)?.parse().ok()
}

fn parse_header(buf: &[u8], file: &str) -> DjvResult<DpxHeader> {
    if buf.len() < HEADER_SIZE {
        return Err(DjvError::open(NAME, file, "truncated header"));
    }
    let endian = match HeaderReader::new(buf, Endian::Msb).u32_at(0) {
        MAGIC => Endian::Msb,
        m if m.swap_bytes() == MAGIC => Endian::Lsb,
        _ => return Err(DjvError::open(NAME, file, "bad magic number")),
    };
    let h = HeaderReader::new(buf, endian);

    let elements = h.u16_at(770);
    if elements == 0 || elements > 8 {
        return Err(DjvError::open(NAME, file, format!("{elements} image elements")));
    }
    let w = h.u32_at(772);
    let hgt = h.u32_at(776);
    if w == 0 || hgt == 0 || !is_set_u32(w) || !is_set_u32(hgt) {
        return Err(DjvError::open(NAME, file, "invalid image size"));
    }

    let descriptor = h.u8_at(ELEMENT + 20);
    let channels = match descriptor {
        6 => 1,
        50 => 3,
        51 => 4,
        d => {
            return Err(DjvError::unsupported(
                NAME,
                file,
                format!("descriptor {d}"),
            ));
        }
    };
    let depth = h.u8_at(ELEMENT + 23);
    let packing = h.u16_at(ELEMENT + 24);
    let encoding = h.u16_at(ELEMENT + 26);
    if encoding != 0 && encoding != 0xffff {
        return Err(DjvError::unsupported(NAME, file, "run-length encoding"));
    }
    let (pixel, layout) = match (channels, depth, packing) {
        (3, 10, 1) => (Pixel::RgbU10, Layout::FilledA),
        (3, 10, 2) => (Pixel::RgbU10, Layout::FilledB),
        (_, 8 | 16, _) => (
            Pixel::from_layout(channels, u32::from(depth), false).ok_or_else(|| {
                DjvError::unsupported(NAME, file, format!("{channels} x {depth}-bit"))
            })?,
            Layout::Samples {
                bytes: usize::from(depth / 8),
            },
        ),
        (_, 32, _) => (
            Pixel::from_layout(channels, 32, true).ok_or_else(|| {
                DjvError::unsupported(NAME, file, format!("{channels} x 32-bit"))
            })?,
            Layout::Samples { bytes: 4 },
        ),
        _ => {
            return Err(DjvError::unsupported(
                NAME,
                file,
                format!("{channels} channels, {depth}-bit, packing {packing}"),
            ));
        }
    };

    let mut stride = match layout {
        Layout::FilledA | Layout::FilledB => w as usize * 4,
        Layout::Samples { bytes } => {
            let raw = w as usize * channels * bytes;
            if packing == 0 { raw } else { raw.div_ceil(4) * 4 }
        }
    };
    let eol = h.u32_at(ELEMENT + 32);
    if is_set_u32(eol) {
        stride += eol as usize;
    }

    let element_offset = h.u32_at(ELEMENT + 28);
    let image_offset = h.u32_at(4);
    let data_offset = [element_offset, image_offset]
        .into_iter()
        .find(|&o| is_set_u32(o) && o as usize >= HEADER_SIZE)
        .map_or(HEADER_SIZE as u64, u64::from);

    let mut info = ImageInfo::new(Size::new(w, hgt), pixel);
    info.mirror = mirror_from_orientation(u32::from(h.u16_at(768)));

    let mut tags = Tags::new();
    for (off, len, key) in [
        (136, 24, Tags::TIME),
        (160, 100, Tags::CREATOR),
        (260, 200, Tags::PROJECT),
        (460, 200, Tags::COPYRIGHT),
        (ELEMENT + 40, 32, Tags::DESCRIPTION),
        (1432, 100, tags::SOURCE_FILE),
        (1532, 24, tags::SOURCE_TIME),
        (1556, 32, tags::INPUT_DEVICE),
        (1588, 32, tags::INPUT_SERIAL),
        (1680, 32, tags::FILM_FORMAT),
        (1732, 32, tags::FRAME_ID),
        (1764, 100, tags::SLATE),
    ] {
        if let Some(v) = h.str_at(off, len) {
            tags.set(key, v);
        }
    }
    if let (Some(id), Some(kind), Some(perfs), Some(prefix), Some(count)) = (
        ascii_number(&h, 1664, 2),
        ascii_number(&h, 1666, 2),
        ascii_number(&h, 1668, 2),
        ascii_number(&h, 1670, 6),
        ascii_number(&h, 1676, 4),
    ) {
        tags.set(
            Tags::KEYCODE,
            keycode_to_string(id, kind, prefix, count, perfs),
        );
    }
    let timecode = h.u32_at(1920);
    if is_set_u32(timecode) {
        tags.set(Tags::TIMECODE, timecode_to_string(timecode));
    }

    let speed = [h.f32_at(1724), h.f32_at(1940)]
        .into_iter()
        .find(|&f| is_set_f32(f) && f > 0.0)
        .and_then(|f| Speed::from_f64(f64::from(f)).ok());

    Ok(DpxHeader {
        endian,
        layout,
        data_offset,
        stride,
        info,
        tags,
        speed,
    })
}

/// Convert one row from file layout to native in-memory layout.
fn decode_row(header: &DpxHeader, src: &[u8], dst: &mut [u8]) {
    let native = header.endian == Endian::native();
    match header.layout {
        Layout::FilledA | Layout::FilledB => {
            for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                let word = [s[0], s[1], s[2], s[3]];
                let mut v = match header.endian {
                    Endian::Msb => u32::from_be_bytes(word),
                    Endian::Lsb => u32::from_le_bytes(word),
                };
                if header.layout == Layout::FilledB {
                    v <<= 2;
                }
                d.copy_from_slice(&v.to_ne_bytes());
            }
        }
        Layout::Samples { bytes } => {
            let n = dst.len();
            dst.copy_from_slice(&src[..n]);
            if !native && bytes > 1 {
                for s in dst.chunks_exact_mut(bytes) {
                    s.reverse();
                }
            }
        }
    }
}

struct DpxReader {
    file: FileInfo,
    info: IoInfo,
    options: DpxOptions,
}

impl DpxReader {
    fn open(file: &FileInfo, options: DpxOptions) -> DjvResult<Self> {
        let path = file.path();
        let name = path.display().to_string();
        let (buf, len) = read_header_block(NAME, &path, HEADER_SIZE)?;
        let header = parse_header(&buf, &name)?;
        header.check_length(len, &name)?;
        let mut info = IoInfo::new(header.info.clone());
        info.tags = header.tags.clone();
        info.sequence = file.sequence().clone();
        if let Some(speed) = header.speed {
            info.speed = speed;
        }
        tracing::debug!(
            file = %name,
            pixel = %header.info.pixel,
            endian = ?header.endian,
            layout = ?header.layout,
            "dpx header"
        );
        Ok(Self {
            file: file.clone(),
            info,
            options,
        })
    }

    fn decode(&self, path: &Path) -> DjvResult<Image> {
        let name = path.display().to_string();
        let (buf, len) = read_header_block(NAME, path, HEADER_SIZE)?;
        let header = parse_header(&buf, &name)?;
        header.check_length(len, &name)?;
        let read_err = |e: std::io::Error| DjvError::read(NAME, &name, e.to_string());
        let mut f = std::fs::File::open(path).map_err(read_err)?;
        f.seek(SeekFrom::Start(header.data_offset)).map_err(read_err)?;
        let mut raw = vec![0u8; header.stride * header.info.size.h as usize];
        f.read_exact(&mut raw).map_err(read_err)?;

        let mut image = Image::new(header.info.clone());
        let row = image.scanline_byte_count();
        for (y, src) in raw.chunks_exact(header.stride).enumerate() {
            decode_row(&header, src, &mut image.data_mut()[y * row..(y + 1) * row]);
        }
        image.set_tags(header.tags);
        Ok(image)
    }
}

impl ImageRead for DpxReader {
    fn info(&self) -> &IoInfo {
        &self.info
    }

    fn read(&mut self, request: &FrameRequest) -> DjvResult<Image> {
        let path = frame_path(&self.file, request.frame);
        let mut image = self.decode(&path)?;
        if self.options.input_color_profile.is_film_print() {
            image = apply_lut(&image, &self.options.input_film_print.lut());
        }
        Ok(proxy_scale(&image, request.proxy))
    }
}

/// Layout DPX stores for `pixel`.
fn output_pixel(pixel: Pixel, kind: DpxType) -> Pixel {
    if kind == DpxType::U10 {
        return Pixel::RgbU10;
    }
    match pixel {
        Pixel::LaU8 => Pixel::RgbaU8,
        Pixel::LaU16 => Pixel::RgbaU16,
        Pixel::LaF32 => Pixel::RgbaF32,
        p => p,
    }
}

fn build_header(
    image: &Image,
    tags: &Tags,
    speed: Speed,
    options: &DpxOptions,
    endian: Endian,
    file_name: &str,
) -> (Vec<u8>, usize) {
    let info = image.info();
    let pixel = info.pixel;
    let channels = pixel.channel_count();
    let (depth, bytes) = match pixel.bit_depth() {
        10 => (10u8, 4usize),
        d => (d as u8, (d / 8) as usize),
    };
    let stride = if pixel == Pixel::RgbU10 {
        info.size.w as usize * 4
    } else {
        (info.size.w as usize * channels * bytes).div_ceil(4) * 4
    };
    let data_size = stride * info.size.h as usize;

    let mut h = HeaderWriter::new(HEADER_SIZE, 0xff, endian);
    h.put_u32(0, MAGIC);
    h.put_u32(4, HEADER_SIZE as u32);
    h.put_str(8, 8, options.version.tag());
    h.put_u32(16, (HEADER_SIZE + data_size) as u32);
    h.put_u32(20, 1);
    h.put_u32(24, 1664);
    h.put_u32(28, 384);
    h.put_u32(32, 0);
    h.put_str(36, 100, file_name);
    for (off, len, key) in [
        (136, 24, Tags::TIME),
        (160, 100, Tags::CREATOR),
        (260, 200, Tags::PROJECT),
        (460, 200, Tags::COPYRIGHT),
    ] {
        h.put_str(off, len, tags.get(key).unwrap_or_default());
    }

    h.put_u16(768, u16::from(orientation_from_mirror(info.mirror)));
    h.put_u16(770, 1);
    h.put_u32(772, info.size.w);
    h.put_u32(776, info.size.h);

    let film = options.output_color_profile.is_film_print();
    h.put_u32(ELEMENT, 0);
    h.put_u32(ELEMENT + 4, 0);
    h.put_f32(ELEMENT + 8, 0.0);
    if !pixel.is_float() {
        h.put_u32(ELEMENT + 12, (1u32 << depth) - 1);
        h.put_f32(ELEMENT + 16, 2.048);
    }
    h.put_u8(
        ELEMENT + 20,
        match channels {
            1 => 6,
            4 => 51,
            _ => 50,
        },
    );
    h.put_u8(ELEMENT + 21, if film { 1 } else { 2 });
    h.put_u8(ELEMENT + 22, if film { 1 } else { 2 });
    h.put_u8(ELEMENT + 23, depth);
    h.put_u16(ELEMENT + 24, 1);
    h.put_u16(ELEMENT + 26, 0);
    h.put_u32(ELEMENT + 28, HEADER_SIZE as u32);
    h.put_u32(ELEMENT + 32, 0);
    h.put_u32(ELEMENT + 36, 0);
    h.put_str(
        ELEMENT + 40,
        32,
        tags.get(Tags::DESCRIPTION).unwrap_or_default(),
    );

    h.put_u32(1408, 0);
    h.put_u32(1412, 0);
    for (off, len, key) in [
        (1432, 100, tags::SOURCE_FILE),
        (1532, 24, tags::SOURCE_TIME),
        (1556, 32, tags::INPUT_DEVICE),
        (1588, 32, tags::INPUT_SERIAL),
        (1680, 32, tags::FILM_FORMAT),
        (1732, 32, tags::FRAME_ID),
        (1764, 100, tags::SLATE),
    ] {
        if let Some(v) = tags.get(key) {
            h.put_str(off, len, v);
        }
    }
    if let Some([id, kind, prefix, count, perfs]) =
        tags.get(Tags::KEYCODE).and_then(keycode_from_string)
    {
        h.put_str(1664, 2, &id.to_string());
        h.put_str(1666, 2, &kind.to_string());
        h.put_str(1668, 2, &perfs.to_string());
        h.put_str(1670, 6, &prefix.to_string());
        h.put_str(1676, 4, &count.to_string());
    }
    let fps = speed.as_f64() as f32;
    h.put_f32(1724, fps);
    if let Some(tc) = tags.get(Tags::TIMECODE).and_then(timecode_from_string) {
        h.put_u32(1920, tc);
    }
    h.put_f32(1940, fps);
    (h.into_bytes(), stride)
}

/// Convert native in-memory rows to file layout.
fn encode_data(image: &Image, endian: Endian, stride: usize) -> Vec<u8> {
    let row = image.scanline_byte_count();
    let h = image.size().h as usize;
    let mut out = vec![0u8; stride * h];
    let swap = endian != Endian::native();
    let width = match image.pixel() {
        Pixel::RgbU10 => 4,
        p => (p.bit_depth() / 8) as usize,
    };
    for y in 0..h {
        let dst = &mut out[y * stride..y * stride + row];
        dst.copy_from_slice(image.scanline(y));
        if swap && width > 1 {
            for s in dst.chunks_exact_mut(width) {
                s.reverse();
            }
        }
    }
    out
}

struct DpxWriter {
    file: FileInfo,
    io: IoInfo,
    options: DpxOptions,
}

impl ImageWrite for DpxWriter {
    fn write(&mut self, image: &Image, frame: i64) -> DjvResult<()> {
        let path = self.file.path_for(frame);
        let mut image = convert(image, output_pixel(image.pixel(), self.options.pixel_type));
        if self.options.output_color_profile.is_film_print() {
            image = apply_lut(&image, &self.options.output_film_print.lut(1024));
        }
        let endian = match self.options.endian {
            DpxEndian::Auto | DpxEndian::Msb => Endian::Msb,
            DpxEndian::Lsb => Endian::Lsb,
        };
        let mut tags = self.io.tags.clone();
        tags.merge(image.tags());
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (header, stride) =
            build_header(&image, &tags, self.io.speed, &self.options, endian, &file_name);
        let data = encode_data(&image, endian, stride);
        write_file(NAME, &path, |w| {
            w.write_all(&header)?;
            w.write_all(&data)
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/formats/dpx.rs"]
mod tests;
