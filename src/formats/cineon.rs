//! Kodak Cineon (`.cin`): 2048-byte header, 3-channel 10-bit data in filled 32-bit words.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde_json::Value;

use crate::file_info::FileInfo;
use crate::foundation::core::{Size, Speed};
use crate::foundation::error::{DjvError, DjvResult};
use crate::formats::film_print::{
    ColorProfile, FilmPrintToLinear, LinearToFilmPrint, apply_lut, keycode_from_string,
    keycode_to_string, mirror_from_orientation, orientation_from_mirror,
    parse_film_print_to_linear, parse_linear_to_film_print,
};
use crate::formats::{read_header_block, write_file};
use crate::image::{Image, ImageInfo, Pixel, Tags, convert, proxy_scale};
use crate::io::args::{parse_named, take_flag};
use crate::io::header::{Endian, HeaderReader, HeaderWriter, is_set_f32, is_set_u32};
use crate::io::plugin::{decode_options, encode_options};
use crate::io::{FrameRequest, ImageRead, ImageWrite, IoInfo, IoPlugin, frame_path};

pub(crate) const NAME: &str = "Cineon";

const MAGIC: u32 = 0x802A_5FD7;
const HEADER_SIZE: usize = 2048;

/// Tag keys specific to Cineon headers.
pub mod tags {
    pub const SOURCE_FILE: &str = "Cineon Source File";
    pub const SOURCE_TIME: &str = "Cineon Source Time";
    pub const INPUT_DEVICE: &str = "Cineon Input Device";
    pub const INPUT_MODEL: &str = "Cineon Input Model";
    pub const INPUT_SERIAL: &str = "Cineon Input Serial";
    pub const FILM_FORMAT: &str = "Cineon Film Format";
    pub const FRAME_ID: &str = "Cineon Frame ID";
    pub const SLATE: &str = "Cineon Slate";
}

/// Cineon options.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CineonOptions {
    pub input_color_profile: ColorProfile,
    pub input_film_print: FilmPrintToLinear,
    pub output_color_profile: ColorProfile,
    pub output_film_print: LinearToFilmPrint,
}

/// Cineon plugin.
#[derive(Debug, Default)]
pub struct CineonPlugin {
    options: CineonOptions,
}

impl CineonPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(&self) -> &CineonOptions {
        &self.options
    }
}

impl IoPlugin for CineonPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Kodak Cineon 10-bit film scans"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".cin"]
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
        if let Some(v) = take_flag(NAME, args, "-cineon_input_color_profile", 1)? {
            self.options.input_color_profile = parse_named(NAME, &v[0])?;
            changed.push("input_color_profile".to_string());
        }
        if let Some(v) = take_flag(NAME, args, "-cineon_input_film_print", 4)? {
            self.options.input_film_print = parse_film_print_to_linear(NAME, &v)?;
            changed.push("input_film_print".to_string());
        }
        if let Some(v) = take_flag(NAME, args, "-cineon_output_color_profile", 1)? {
            self.options.output_color_profile = parse_named(NAME, &v[0])?;
            changed.push("output_color_profile".to_string());
        }
        if let Some(v) = take_flag(NAME, args, "-cineon_output_film_print", 3)? {
            self.options.output_film_print = parse_linear_to_film_print(NAME, &v)?;
            changed.push("output_film_print".to_string());
        }
        Ok(changed)
    }

    fn read(&self, info: &FileInfo) -> DjvResult<Box<dyn ImageRead>> {
        Ok(Box::new(CineonReader::open(info, self.options.clone())?))
    }

    fn write(&self, info: &FileInfo, io: &IoInfo) -> DjvResult<Box<dyn ImageWrite>> {
        Ok(Box::new(CineonWriter {
            file: info.clone(),
            io: io.clone(),
            options: self.options.clone(),
        }))
    }
}

/// Parsed header fields needed to decode pixel data.
#[derive(Clone, Debug)]
pub(crate) struct CineonHeader {
    pub(crate) endian: Endian,
    pub(crate) data_offset: u64,
    pub(crate) info: ImageInfo,
    pub(crate) tags: Tags,
    pub(crate) speed: Option<Speed>,
}

impl CineonHeader {
    /// Fail unless a file of `len` bytes holds all of the packed pixels.
    fn check_length(&self, len: u64, file: &str) -> DjvResult<()> {
        let size = self.info.size;
        let needed = u64::from(size.w)
            .checked_mul(u64::from(size.h))
            .and_then(|n| n.checked_mul(4))
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

/// Parse and validate a Cineon header block.
pub(crate) fn parse_header(buf: &[u8], file: &str) -> DjvResult<CineonHeader> {
    if buf.len() < HEADER_SIZE {
        return Err(DjvError::open(NAME, file, "truncated header"));
    }
    let endian = match HeaderReader::new(buf, Endian::Msb).u32_at(0) {
        MAGIC => Endian::Msb,
        m if m.swap_bytes() == MAGIC => Endian::Lsb,
        _ => return Err(DjvError::open(NAME, file, "bad magic number")),
    };
    let h = HeaderReader::new(buf, endian);

    let channels = h.u8_at(193);
    if channels != 3 {
        return Err(DjvError::unsupported(
            NAME,
            file,
            format!("{channels} channels"),
        ));
    }
    for c in 0..3 {
        let depth = h.u8_at(196 + c * 28 + 2);
        if depth != 10 {
            return Err(DjvError::unsupported(
                NAME,
                file,
                format!("{depth}-bit channel"),
            ));
        }
    }
    let packing = h.u8_at(681);
    if packing != 5 && packing != 0xff {
        return Err(DjvError::unsupported(
            NAME,
            file,
            format!("packing {packing}"),
        ));
    }
    let w = h.u32_at(196 + 4);
    let hgt = h.u32_at(196 + 8);
    if w == 0 || hgt == 0 || !is_set_u32(w) || !is_set_u32(hgt) {
        return Err(DjvError::open(NAME, file, "invalid image size"));
    }
    let mut info = ImageInfo::new(Size::new(w, hgt), Pixel::RgbU10);
    info.mirror = mirror_from_orientation(u32::from(h.u8_at(192)));

    let offset = h.u32_at(4);
    let data_offset = if is_set_u32(offset) && offset as usize >= HEADER_SIZE {
        u64::from(offset)
    } else {
        HEADER_SIZE as u64
    };

    let mut tags = Tags::new();
    let date = h.str_at(132, 12);
    let time = h.str_at(144, 12);
    if let (Some(d), Some(t)) = (&date, &time) {
        tags.set(Tags::TIME, format!("{d} {t}"));
    }
    if let Some(label) = h.str_at(452, 200) {
        tags.set(Tags::DESCRIPTION, label);
    }
    let source_date = h.str_at(820, 12);
    let source_time = h.str_at(832, 12);
    if let (Some(d), Some(t)) = (&source_date, &source_time) {
        tags.set(tags::SOURCE_TIME, format!("{d} {t}"));
    }
    for (off, len, key) in [
        (720, 100, tags::SOURCE_FILE),
        (844, 64, tags::INPUT_DEVICE),
        (908, 32, tags::INPUT_MODEL),
        (940, 32, tags::INPUT_SERIAL),
        (1036, 32, tags::FILM_FORMAT),
        (1076, 32, tags::FRAME_ID),
        (1108, 200, tags::SLATE),
    ] {
        if let Some(v) = h.str_at(off, len) {
            tags.set(key, v);
        }
    }
    let (id, kind, perfs) = (h.u8_at(1024), h.u8_at(1025), h.u8_at(1026));
    let (prefix, count) = (h.u32_at(1028), h.u32_at(1032));
    if id != 0xff && kind != 0xff && perfs != 0xff && is_set_u32(prefix) && is_set_u32(count) {
        tags.set(
            Tags::KEYCODE,
            keycode_to_string(id.into(), kind.into(), prefix, count, perfs.into()),
        );
    }
    let fps = h.f32_at(1072);
    let speed = (is_set_f32(fps) && fps > 0.0)
        .then(|| Speed::from_f64(f64::from(fps)).ok())
        .flatten();

    Ok(CineonHeader {
        endian,
        data_offset,
        info,
        tags,
        speed,
    })
}

/// Build a Cineon header for `info`.
pub(crate) fn build_header(info: &ImageInfo, tags: &Tags, speed: Speed, file_name: &str) -> Vec<u8> {
    let mut h = HeaderWriter::new(HEADER_SIZE, 0xff, Endian::Msb);
    let data_size = info.size.area() as u32 * 4;

    h.put_u32(0, MAGIC);
    h.put_u32(4, HEADER_SIZE as u32);
    h.put_u32(8, 1024);
    h.put_u32(12, 1024);
    h.put_u32(16, 0);
    h.put_u32(20, HEADER_SIZE as u32 + data_size);
    h.put_str(24, 8, "V4.5");
    h.put_str(32, 100, file_name);
    if let Some((d, t)) = tags.get(Tags::TIME).and_then(|s| s.split_once(' ')) {
        h.put_str(132, 12, d);
        h.put_str(144, 12, t);
    }

    h.put_u8(192, orientation_from_mirror(info.mirror));
    h.put_u8(193, 3);
    for c in 0..3usize {
        let base = 196 + c * 28;
        h.put_u8(base, 0);
        h.put_u8(base + 1, c as u8 + 1);
        h.put_u8(base + 2, 10);
        h.put_u32(base + 4, info.size.w);
        h.put_u32(base + 8, info.size.h);
        h.put_f32(base + 12, 0.0);
        h.put_f32(base + 16, 0.0);
        h.put_f32(base + 20, 1023.0);
        h.put_f32(base + 24, 2.048);
    }
    if let Some(label) = tags.get(Tags::DESCRIPTION) {
        h.put_str(452, 200, label);
    }

    h.put_u8(680, 0);
    h.put_u8(681, 5);
    h.put_u8(682, 0);
    h.put_u8(683, 0);
    h.put_u32(684, 0);
    h.put_u32(688, 0);

    h.put_i32(712, 0);
    h.put_i32(716, 0);
    for (off, len, key) in [
        (720, 100, tags::SOURCE_FILE),
        (844, 64, tags::INPUT_DEVICE),
        (908, 32, tags::INPUT_MODEL),
        (940, 32, tags::INPUT_SERIAL),
        (1036, 32, tags::FILM_FORMAT),
        (1076, 32, tags::FRAME_ID),
        (1108, 200, tags::SLATE),
    ] {
        if let Some(v) = tags.get(key) {
            h.put_str(off, len, v);
        }
    }
    if let Some((d, t)) = tags.get(tags::SOURCE_TIME).and_then(|s| s.split_once(' ')) {
        h.put_str(820, 12, d);
        h.put_str(832, 12, t);
    }
    if let Some([id, kind, prefix, count, perfs]) =
        tags.get(Tags::KEYCODE).and_then(keycode_from_string)
    {
        h.put_u8(1024, id as u8);
        h.put_u8(1025, kind as u8);
        h.put_u8(1026, perfs as u8);
        h.put_u32(1028, prefix);
        h.put_u32(1032, count);
    }
    h.put_f32(1072, speed.as_f64() as f32);
    h.into_bytes()
}

/// Decode `count` filled 10-bit words from `raw` in `endian` into native-endian words.
pub(crate) fn words_to_native(raw: &[u8], endian: Endian) -> Vec<u8> {
    if endian == Endian::native() {
        return raw.to_vec();
    }
    let mut out = raw.to_vec();
    for w in out.chunks_exact_mut(4) {
        w.reverse();
    }
    out
}

pub(crate) struct CineonReader {
    file: FileInfo,
    info: IoInfo,
    header: CineonHeader,
    options: CineonOptions,
}

impl CineonReader {
    fn open(file: &FileInfo, options: CineonOptions) -> DjvResult<Self> {
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
            w = header.info.size.w,
            h = header.info.size.h,
            endian = ?header.endian,
            "cineon header"
        );
        Ok(Self {
            file: file.clone(),
            info,
            header,
            options,
        })
    }

    fn read_data(&self, path: &Path) -> DjvResult<(CineonHeader, Vec<u8>)> {
        let name = path.display().to_string();
        let (buf, len) = read_header_block(NAME, path, HEADER_SIZE)?;
        let header = parse_header(&buf, &name)?;
        header.check_length(len, &name)?;
        let mut f =
            std::fs::File::open(path).map_err(|e| DjvError::read(NAME, &name, e.to_string()))?;
        f.seek(SeekFrom::Start(header.data_offset))
            .map_err(|e| DjvError::read(NAME, &name, e.to_string()))?;
        let mut raw = vec![0u8; header.info.byte_count()];
        f.read_exact(&mut raw)
            .map_err(|e| DjvError::read(NAME, &name, format!("image data: {e}")))?;
        let data = words_to_native(&raw, header.endian);
        Ok((header, data))
    }
}

impl ImageRead for CineonReader {
    fn info(&self) -> &IoInfo {
        &self.info
    }

    fn read(&mut self, request: &FrameRequest) -> DjvResult<Image> {
        let path = frame_path(&self.file, request.frame);
        let (header, data) = self.read_data(&path)?;
        self.header = header;
        let mut image = Image::from_data(self.header.info.clone(), data)?;
        image.set_tags(self.header.tags.clone());
        if self.options.input_color_profile.is_film_print() {
            image = apply_lut(&image, &self.options.input_film_print.lut());
        }
        Ok(proxy_scale(&image, request.proxy))
    }
}

struct CineonWriter {
    file: FileInfo,
    io: IoInfo,
    options: CineonOptions,
}

impl ImageWrite for CineonWriter {
    fn write(&mut self, image: &Image, frame: i64) -> DjvResult<()> {
        let path = self.file.path_for(frame);
        let mut image = convert(image, Pixel::RgbU10);
        if self.options.output_color_profile.is_film_print() {
            image = apply_lut(&image, &self.options.output_film_print.lut(1024));
        }
        let mut tags = self.io.tags.clone();
        tags.merge(image.tags());
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let header = build_header(image.info(), &tags, self.io.speed, &file_name);
        let data = words_to_native(image.data(), Endian::Msb);
        write_file(NAME, &path, |w| {
            w.write_all(&header)?;
            w.write_all(&data)
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/formats/cineon.rs"]
mod tests;
