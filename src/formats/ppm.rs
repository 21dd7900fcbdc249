//! NetPBM (`.ppm`, `.pgm`, `.pbm`, `.pnm`): P1-P6, ASCII or binary, 1/8/16-bit samples.

use std::fmt::Write as _;
use std::io::Write;

use serde_json::Value;

use crate::file_info::FileInfo;
use crate::foundation::core::{Mirror, Size};
use crate::foundation::error::{DjvError, DjvResult};
use crate::formats::write_file;
use crate::image::{Image, ImageInfo, Pixel, convert, proxy_scale, to_top_down};
use crate::io::args::{parse_named, take_flag};
use crate::io::plugin::{decode_options, encode_options};
use crate::io::{FrameRequest, ImageRead, ImageWrite, IoInfo, IoPlugin, frame_path};

pub(crate) const NAME: &str = "PPM";

/// Sample depth written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PpmType {
    /// Keep the image's depth (8 or 16 bits).
    #[default]
    Auto,
    /// 1-bit bitmap (P1/P4).
    U1,
}

/// Sample encoding written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PpmData {
    Ascii,
    #[default]
    Binary,
}

/// PPM options.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PpmOptions {
    #[serde(rename = "type")]
    pub pixel_type: PpmType,
    pub data: PpmData,
}

/// PPM plugin.
#[derive(Debug, Default)]
pub struct PpmPlugin {
    options: PpmOptions,
}

impl PpmPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(&self) -> &PpmOptions {
        &self.options
    }
}

impl IoPlugin for PpmPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "NetPBM portable bitmap, graymap and pixmap"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".ppm", ".pnm", ".pgm", ".pbm"]
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
        if let Some(v) = take_flag(NAME, args, "-ppm_type", 1)? {
            self.options.pixel_type = parse_named(NAME, &v[0])?;
            changed.push("type".to_string());
        }
        if let Some(v) = take_flag(NAME, args, "-ppm_data", 1)? {
            self.options.data = parse_named(NAME, &v[0])?;
            changed.push("data".to_string());
        }
        Ok(changed)
    }

    fn read(&self, info: &FileInfo) -> DjvResult<Box<dyn ImageRead>> {
        Ok(Box::new(PpmReader::open(info)?))
    }

    fn write(&self, info: &FileInfo, _io: &IoInfo) -> DjvResult<Box<dyn ImageWrite>> {
        Ok(Box::new(PpmWriter {
            file: info.clone(),
            options: self.options.clone(),
        }))
    }
}

/// Parsed NetPBM header.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PpmHeader {
    /// Magic digit, 1 through 6.
    pub(crate) kind: u8,
    pub(crate) maxval: u32,
    pub(crate) data_offset: usize,
    pub(crate) info: ImageInfo,
}

impl PpmHeader {
    fn channels(&self) -> usize {
        if self.kind == 3 || self.kind == 6 { 3 } else { 1 }
    }

    fn samples(&self) -> Option<usize> {
        let (w, h) = (self.info.size.w as usize, self.info.size.h as usize);
        w.checked_mul(h)?.checked_mul(self.channels())
    }

    /// Size of the binary raster, or `None` for ASCII files.
    pub(crate) fn binary_size(&self) -> Option<usize> {
        let (w, h) = (self.info.size.w as usize, self.info.size.h as usize);
        match self.kind {
            4 => w.div_ceil(8).checked_mul(h),
            5 | 6 => self
                .samples()?
                .checked_mul(if self.maxval > 255 { 2 } else { 1 }),
            _ => None,
        }
    }

    /// Fewest file bytes that can hold the raster: the exact binary size, or one byte per
    /// ASCII sample.
    pub(crate) fn min_raster_bytes(&self) -> Option<usize> {
        match self.kind {
            4..=6 => self.binary_size(),
            _ => self.samples(),
        }
    }
}

/// Next whitespace-delimited token, skipping `#` comments.
fn token<'a>(buf: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    loop {
        while *pos < buf.len() && buf[*pos].is_ascii_whitespace() {
            *pos += 1;
        }
        if *pos < buf.len() && buf[*pos] == b'#' {
            while *pos < buf.len() && buf[*pos] != b'\n' {
                *pos += 1;
            }
            continue;
        }
        break;
    }
    let start = *pos;
    while *pos < buf.len() && !buf[*pos].is_ascii_whitespace() && buf[*pos] != b'#' {
        *pos += 1;
    }
    (*pos > start).then(|| &buf[start..*pos])
}

fn number(buf: &[u8], pos: &mut usize) -> Option<u32> {
    std::str::from_utf8(token(buf, pos)?).ok()?.parse().ok()
}

pub(crate) fn parse_header(buf: &[u8], file: &str) -> DjvResult<PpmHeader> {
    let bad = |what: &str| DjvError::open(NAME, file, what.to_string());
    if buf.len() < 2 || buf[0] != b'P' || !(b'1'..=b'6').contains(&buf[1]) {
        return Err(bad("bad magic number"));
    }
    let kind = buf[1] - b'0';
    let mut pos = 2;
    let w = number(buf, &mut pos).ok_or_else(|| bad("missing width"))?;
    let h = number(buf, &mut pos).ok_or_else(|| bad("missing height"))?;
    if w == 0 || h == 0 {
        return Err(bad("invalid image size"));
    }
    let maxval = if kind == 1 || kind == 4 {
        1
    } else {
        let m = number(buf, &mut pos).ok_or_else(|| bad("missing maximum value"))?;
        if m == 0 || m > 65535 {
            return Err(bad("maximum value out of range"));
        }
        m
    };
    // A single whitespace byte separates the header from the raster.
    let data_offset = (pos + 1).min(buf.len());

    let channels = if kind == 3 || kind == 6 { 3 } else { 1 };
    let depth = if maxval > 255 { 16 } else { 8 };
    let pixel = Pixel::from_layout(channels, depth, false)
        .ok_or_else(|| DjvError::unsupported(NAME, file, format!("P{kind} at {depth} bits")))?;
    let mut info = ImageInfo::new(Size::new(w, h), pixel);
    info.mirror = Mirror::new(false, true);
    let header = PpmHeader {
        kind,
        maxval,
        data_offset,
        info,
    };
    let decoded = (w as usize)
        .checked_mul(h as usize)
        .and_then(|n| n.checked_mul(pixel.byte_count()));
    if decoded.is_none() || header.min_raster_bytes().is_none() {
        return Err(bad("image size overflows"));
    }
    Ok(header)
}

fn scale(v: u32, maxval: u32, full: u32) -> u32 {
    if maxval == full {
        v.min(full)
    } else {
        (v.min(maxval) * full + maxval / 2) / maxval
    }
}

/// Decode the raster that follows `header` in `buf` into native-endian samples.
pub(crate) fn decode(header: &PpmHeader, buf: &[u8], file: &str) -> DjvResult<Vec<u8>> {
    let (w, h) = (header.info.size.w as usize, header.info.size.h as usize);
    let samples = w * h * header.channels();
    let wide = header.maxval > 255;
    let full = if wide { 65535 } else { 255 };
    let mut out = Vec::with_capacity(header.info.byte_count());
    let mut push = |v: u32| {
        if wide {
            out.extend_from_slice(&(v as u16).to_ne_bytes());
        } else {
            out.push(v as u8);
        }
    };
    let data = &buf[header.data_offset.min(buf.len())..];

    match header.kind {
        1 => {
            // ASCII bitmap digits may run together.
            let mut n = 0;
            for &b in data {
                if n == samples {
                    break;
                }
                match b {
                    b'0' => push(255),
                    b'1' => push(0),
                    _ => continue,
                }
                n += 1;
            }
            if n < samples {
                return Err(DjvError::read(NAME, file, format!("{n} of {samples} bits")));
            }
        }
        2 | 3 => {
            let mut pos = header.data_offset;
            for i in 0..samples {
                let v = number(buf, &mut pos).ok_or_else(|| {
                    DjvError::read(NAME, file, format!("{i} of {samples} samples"))
                })?;
                push(scale(v, header.maxval, full));
            }
        }
        4 => {
            let row = w.div_ceil(8);
            for y in 0..h {
                for x in 0..w {
                    let byte = data[y * row + x / 8];
                    push(if byte >> (7 - x % 8) & 1 == 1 { 0 } else { 255 });
                }
            }
        }
        _ => {
            for i in 0..samples {
                let v = if wide {
                    u32::from(u16::from_be_bytes([data[i * 2], data[i * 2 + 1]]))
                } else {
                    u32::from(data[i])
                };
                push(scale(v, header.maxval, full));
            }
        }
    }
    Ok(out)
}

/// Pixel type stored for `pixel`: alpha dropped, float and 10-bit widened to 16-bit.
pub(crate) fn output_pixel(pixel: Pixel, pixel_type: PpmType) -> Pixel {
    let channels = if pixel.channel_count() <= 2 { 1 } else { 3 };
    let depth = match (pixel_type, pixel.bit_depth(), pixel.is_float()) {
        (PpmType::U1, ..) => 8,
        (_, 8, false) => 8,
        _ => 16,
    };
    let channels = if pixel_type == PpmType::U1 { 1 } else { channels };
    Pixel::from_layout(channels, depth, false).unwrap_or(Pixel::RgbU16)
}

/// Encode a top-down image already in an [`output_pixel`] layout.
pub(crate) fn encode(image: &Image, options: &PpmOptions) -> Vec<u8> {
    let pixel = image.pixel();
    let size = image.size();
    let ascii = options.data == PpmData::Ascii;
    let bitmap = options.pixel_type == PpmType::U1;
    let wide = pixel.bit_depth() == 16;
    let kind = match (bitmap, pixel.channel_count(), ascii) {
        (true, _, true) => 1,
        (true, _, false) => 4,
        (false, 1, true) => 2,
        (false, _, true) => 3,
        (false, 1, false) => 5,
        (false, _, false) => 6,
    };
    let mut header = format!("P{kind}\n{} {}\n", size.w, size.h);
    if !bitmap {
        let _ = writeln!(header, "{}", if wide { 65535 } else { 255 });
    }
    let mut out = header.into_bytes();

    let data = image.data();
    let values: Vec<u32> = if wide {
        data.chunks_exact(2)
            .map(|c| u32::from(u16::from_ne_bytes([c[0], c[1]])))
            .collect()
    } else {
        data.iter().map(|&b| u32::from(b)).collect()
    };
    let w = size.w as usize;

    match kind {
        1 | 2 | 3 => {
            let per_row = w * pixel.channel_count();
            for row in values.chunks(per_row.max(1)) {
                let mut line = String::new();
                for v in row {
                    let v = if bitmap { u32::from(*v < 128) } else { *v };
                    if line.len() > 64 {
                        line.push('\n');
                        out.extend_from_slice(line.as_bytes());
                        line.clear();
                    } else if !line.is_empty() {
                        line.push(' ');
                    }
                    let _ = write!(line, "{v}");
                }
                line.push('\n');
                out.extend_from_slice(line.as_bytes());
            }
        }
        4 => {
            for row in values.chunks(w.max(1)) {
                let mut bytes = vec![0u8; w.div_ceil(8)];
                for (x, v) in row.iter().enumerate() {
                    if *v < 128 {
                        bytes[x / 8] |= 0x80 >> (x % 8);
                    }
                }
                out.extend_from_slice(&bytes);
            }
        }
        _ if wide => {
            for v in values {
                out.extend_from_slice(&(v as u16).to_be_bytes());
            }
        }
        _ => out.extend_from_slice(data),
    }
    out
}

pub(crate) struct PpmReader {
    file: FileInfo,
    info: IoInfo,
}

impl PpmReader {
    fn open(file: &FileInfo) -> DjvResult<Self> {
        let path = file.path();
        let name = path.display().to_string();
        let (header, _) = load(&path, &name)?;
        let mut info = IoInfo::new(header.info.clone());
        info.sequence = file.sequence().clone();
        tracing::debug!(file = %name, kind = header.kind, maxval = header.maxval, "ppm header");
        Ok(Self {
            file: file.clone(),
            info,
        })
    }
}

/// Read and validate a whole file; the raster must fit in what follows the header.
fn load(path: &std::path::Path, name: &str) -> DjvResult<(PpmHeader, Vec<u8>)> {
    let buf = std::fs::read(path).map_err(|e| DjvError::open(NAME, name, e.to_string()))?;
    let header = parse_header(&buf, name)?;
    let needed = header
        .min_raster_bytes()
        .ok_or_else(|| DjvError::open(NAME, name, "image size overflows"))?;
    let have = buf.len().saturating_sub(header.data_offset);
    if have < needed {
        return Err(DjvError::open(
            NAME,
            name,
            format!("raster is {have} bytes, expected at least {needed}"),
        ));
    }
    Ok((header, buf))
}

impl ImageRead for PpmReader {
    fn info(&self) -> &IoInfo {
        &self.info
    }

    fn read(&mut self, request: &FrameRequest) -> DjvResult<Image> {
        let path = frame_path(&self.file, request.frame);
        let name = path.display().to_string();
        let (header, buf) = load(&path, &name)?;
        let data = decode(&header, &buf, &name)?;
        let image = Image::from_data(header.info, data)?;
        Ok(proxy_scale(&image, request.proxy))
    }
}

struct PpmWriter {
    file: FileInfo,
    options: PpmOptions,
}

impl ImageWrite for PpmWriter {
    fn write(&mut self, image: &Image, frame: i64) -> DjvResult<()> {
        let path = self.file.path_for(frame);
        let target = output_pixel(image.pixel(), self.options.pixel_type);
        let image = to_top_down(&convert(image, target));
        let bytes = encode(&image, &self.options);
        write_file(NAME, &path, |w| w.write_all(&bytes))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/formats/ppm.rs"]
mod tests;
