//! Baseline TIFF: strip-organized files in either byte order, uncompressed, PackBits or LZW.

mod compression;
mod ifd;

use std::io::Write;

use serde_json::Value;

use crate::file_info::FileInfo;
use crate::foundation::core::{Mirror, Size};
use crate::foundation::error::{DjvError, DjvResult};
use crate::formats::write_file;
use crate::image::{Image, ImageInfo, Pixel, Tags, convert, proxy_scale};
use crate::io::args::{parse_named, take_flag};
use crate::io::header::Endian;
use crate::io::plugin::{decode_options, encode_options};
use crate::io::{FrameRequest, ImageRead, ImageWrite, IoInfo, IoPlugin, frame_path};

pub use compression::TiffCompression;
use ifd::{Ifd, IfdBuilder};

pub(crate) const NAME: &str = "TIFF";

/// Tag keys specific to TIFF files.
pub mod tags {
    pub const SOFTWARE: &str = "TIFF Software";
}

const PHOTOMETRIC_MIN_IS_WHITE: u32 = 0;
const PHOTOMETRIC_MIN_IS_BLACK: u32 = 1;
const PHOTOMETRIC_RGB: u32 = 2;
const PHOTOMETRIC_PALETTE: u32 = 3;

const STRIP_TARGET_BYTES: usize = 64 * 1024;

/// TIFF options.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TiffOptions {
    pub compression: TiffCompression,
}

/// TIFF plugin.
#[derive(Debug, Default)]
pub struct TiffPlugin {
    options: TiffOptions,
}

impl TiffPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(&self) -> &TiffOptions {
        &self.options
    }
}

impl IoPlugin for TiffPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Tagged Image File Format"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".tif", ".tiff"]
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
        if let Some(v) = take_flag(NAME, args, "-tiff_compression", 1)? {
            self.options.compression = parse_named(NAME, &v[0])?;
            changed.push("compression".to_string());
        }
        Ok(changed)
    }

    fn read(&self, info: &FileInfo) -> DjvResult<Box<dyn ImageRead>> {
        Ok(Box::new(TiffReader::open(info)?))
    }

    fn write(&self, info: &FileInfo, io: &IoInfo) -> DjvResult<Box<dyn ImageWrite>> {
        Ok(Box::new(TiffWriter {
            file: info.clone(),
            io: io.clone(),
            options: self.options.clone(),
        }))
    }
}

/// Orientation tag value to the mirror of rows stored in file order.
pub(crate) fn orientation_mirror(orientation: u32) -> Mirror {
    match orientation {
        1 | 5 => Mirror::new(false, true),
        2 | 6 => Mirror::new(true, true),
        3 | 7 => Mirror::new(true, false),
        _ => Mirror::new(false, false),
    }
}

pub(crate) fn mirror_orientation(mirror: Mirror) -> u16 {
    match (mirror.x, mirror.y) {
        (false, true) => 1,
        (true, true) => 2,
        (true, false) => 3,
        (false, false) => 4,
    }
}

/// Everything needed to decode the first image of a TIFF file.
#[derive(Clone, Debug)]
pub(crate) struct TiffHeader {
    pub(crate) endian: Endian,
    pub(crate) info: ImageInfo,
    pub(crate) tags: Tags,
    samples: usize,
    bits: u32,
    float: bool,
    photometric: u32,
    palette: Option<[Vec<u16>; 3]>,
    compression: TiffCompression,
    predictor: u32,
    rows_per_strip: u32,
    strips: Vec<(usize, usize)>,
}

impl TiffHeader {
    /// Bytes per decoded row before palette expansion.
    fn raw_row_bytes(&self) -> usize {
        self.info.size.w as usize * self.samples * (self.bits as usize / 8)
    }
}

fn unsupported(file: &str, reason: impl Into<String>) -> DjvError {
    DjvError::unsupported(NAME, file, reason)
}

/// Parse the directory of `buf` (a whole file) and check that every strip lies inside it.
pub(crate) fn parse_header(buf: &[u8], file: &str) -> DjvResult<TiffHeader> {
    let ifd = Ifd::parse(buf).map_err(|e| DjvError::open(NAME, file, e))?;

    let w = ifd.value_or(ifd::IMAGE_WIDTH, 0);
    let h = ifd.value_or(ifd::IMAGE_LENGTH, 0);
    if w == 0 || h == 0 {
        return Err(DjvError::open(NAME, file, "invalid image size"));
    }
    let samples = ifd.value_or(ifd::SAMPLES_PER_PIXEL, 1) as usize;
    let bits_all = ifd.values(ifd::BITS_PER_SAMPLE).unwrap_or_else(|| vec![1]);
    let bits = bits_all[0];
    if bits_all.iter().any(|&b| b != bits) {
        return Err(unsupported(file, "mixed bits per sample"));
    }
    let float = match ifd.value_or(ifd::SAMPLE_FORMAT, 1) {
        1 => false,
        3 => true,
        f => return Err(unsupported(file, format!("sample format {f}"))),
    };
    if samples > 1 && ifd.value_or(ifd::PLANAR_CONFIG, 1) != 1 {
        return Err(unsupported(file, "separate sample planes"));
    }
    let compression = TiffCompression::from_tag(ifd.value_or(ifd::COMPRESSION, 1))
        .ok_or_else(|| {
            unsupported(
                file,
                format!("compression {}", ifd.value_or(ifd::COMPRESSION, 1)),
            )
        })?;
    let predictor = ifd.value_or(ifd::PREDICTOR, 1);
    if predictor != 1 && (predictor != 2 || float) {
        return Err(unsupported(file, format!("predictor {predictor}")));
    }
    let default_photometric = if samples >= 3 {
        PHOTOMETRIC_RGB
    } else {
        PHOTOMETRIC_MIN_IS_BLACK
    };
    let photometric = ifd.value_or(ifd::PHOTOMETRIC, default_photometric);

    let (pixel, palette) = match photometric {
        PHOTOMETRIC_PALETTE => {
            if samples != 1 || float || !(bits == 8 || bits == 16) {
                return Err(unsupported(
                    file,
                    format!("{bits}-bit palette with {samples} samples"),
                ));
            }
            let n = 1usize << bits;
            let map = ifd
                .values(ifd::COLOR_MAP)
                .filter(|m| m.len() >= 3 * n)
                .ok_or_else(|| DjvError::open(NAME, file, "missing or short color map"))?;
            let lut = |c: usize| map[c * n..(c + 1) * n].iter().map(|&v| v as u16).collect();
            (Pixel::RgbU16, Some([lut(0), lut(1), lut(2)]))
        }
        PHOTOMETRIC_MIN_IS_BLACK | PHOTOMETRIC_MIN_IS_WHITE if samples <= 2 => {
            let pixel = Pixel::from_layout(samples, bits, float)
                .ok_or_else(|| unsupported(file, layout_reason(samples, bits, float)))?;
            (pixel, None)
        }
        PHOTOMETRIC_RGB if (3..=4).contains(&samples) => {
            let pixel = Pixel::from_layout(samples, bits, float)
                .ok_or_else(|| unsupported(file, layout_reason(samples, bits, float)))?;
            (pixel, None)
        }
        p => {
            return Err(unsupported(
                file,
                format!("photometric {p} with {samples} samples"),
            ));
        }
    };
    if pixel == Pixel::RgbU10 {
        return Err(unsupported(file, layout_reason(samples, bits, float)));
    }

    let mut info = ImageInfo::new(Size::new(w, h), pixel);
    info.mirror = orientation_mirror(ifd.value_or(ifd::ORIENTATION, 1));

    let rows_per_strip = ifd.value_or(ifd::ROWS_PER_STRIP, h).clamp(1, h);
    let strip_count = h.div_ceil(rows_per_strip) as usize;
    let offsets = ifd.values(ifd::STRIP_OFFSETS).unwrap_or_default();
    let counts = ifd.values(ifd::STRIP_BYTE_COUNTS).unwrap_or_default();
    if offsets.len() < strip_count || counts.len() < strip_count {
        return Err(DjvError::open(
            NAME,
            file,
            format!("{strip_count} strips expected, directory lists {}", offsets.len()),
        ));
    }
    let mut strips = Vec::with_capacity(strip_count);
    for (i, (&off, &len)) in offsets.iter().zip(&counts).take(strip_count).enumerate() {
        let (off, len) = (off as usize, len as usize);
        if off.saturating_add(len) > buf.len() {
            return Err(DjvError::open(
                NAME,
                file,
                format!("strip {i} runs past end of file"),
            ));
        }
        strips.push((off, len));
    }

    // The decoded raster must be addressable and reachable from the stored strip bytes.
    let raster = (w as usize)
        .checked_mul(samples)
        .and_then(|n| n.checked_mul(bits as usize / 8))
        .and_then(|n| n.checked_mul(h as usize))
        .filter(|_| {
            (w as usize)
                .checked_mul(h as usize)
                .and_then(|n| n.checked_mul(pixel.byte_count()))
                .is_some()
        })
        .ok_or_else(|| DjvError::open(NAME, file, "image size overflows"))?;
    let stored = strips.iter().fold(0usize, |n, &(_, len)| n.saturating_add(len));
    if raster > stored.saturating_mul(compression.max_expansion()) {
        return Err(DjvError::open(
            NAME,
            file,
            format!("{raster} byte raster cannot come from {stored} bytes of strips"),
        ));
    }

    let mut tags = Tags::new();
    for (tag, key) in [
        (ifd::ARTIST, Tags::CREATOR),
        (ifd::IMAGE_DESCRIPTION, Tags::DESCRIPTION),
        (ifd::COPYRIGHT, Tags::COPYRIGHT),
        (ifd::DATE_TIME, Tags::TIME),
        (ifd::SOFTWARE, tags::SOFTWARE),
    ] {
        if let Some(v) = ifd.ascii(tag) {
            tags.set(key, v);
        }
    }

    Ok(TiffHeader {
        endian: ifd.endian(),
        info,
        tags,
        samples,
        bits,
        float,
        photometric,
        palette,
        compression,
        predictor,
        rows_per_strip,
        strips,
    })
}

fn layout_reason(samples: usize, bits: u32, float: bool) -> String {
    let kind = if float { "float" } else { "integer" };
    format!("{samples} x {bits}-bit {kind} samples")
}

/// Reverse the bytes of each `width`-byte sample when `from` differs from native order.
fn samples_to_native(data: &mut [u8], width: usize, from: Endian) {
    if width > 1 && from != Endian::native() {
        for s in data.chunks_exact_mut(width) {
            s.reverse();
        }
    }
}

/// Decode the pixel data described by `header` from the whole file `buf`.
pub(crate) fn decode(header: &TiffHeader, buf: &[u8], file: &str) -> DjvResult<Vec<u8>> {
    let row = header.raw_row_bytes();
    let height = header.info.size.h as usize;
    let mut raw = Vec::with_capacity(row * height);
    for (i, &(off, len)) in header.strips.iter().enumerate() {
        let first = i * header.rows_per_strip as usize;
        let rows = (header.rows_per_strip as usize).min(height - first);
        let expected = rows * row;
        let mut strip = compression::decompress(header.compression, &buf[off..off + len], expected)
            .map_err(|e| DjvError::read(NAME, file, format!("strip {i}: {e}")))?;
        strip.truncate(expected);
        raw.extend_from_slice(&strip);
    }

    let sample_bytes = header.bits as usize / 8;
    samples_to_native(&mut raw, sample_bytes, header.endian);
    if header.predictor == 2 {
        undo_predictor(&mut raw, row, header.samples, sample_bytes);
    }
    if header.photometric == PHOTOMETRIC_MIN_IS_WHITE {
        invert_gray(&mut raw, header.samples, sample_bytes, header.float);
    }
    Ok(match &header.palette {
        Some(lut) => expand_palette(&raw, sample_bytes, lut),
        None => raw,
    })
}

fn undo_predictor(data: &mut [u8], row: usize, samples: usize, sample_bytes: usize) {
    for line in data.chunks_exact_mut(row) {
        match sample_bytes {
            1 => {
                for i in samples..line.len() {
                    line[i] = line[i].wrapping_add(line[i - samples]);
                }
            }
            2 => {
                let stride = samples * 2;
                for i in (stride..line.len()).step_by(2) {
                    let prev = u16::from_ne_bytes([line[i - stride], line[i - stride + 1]]);
                    let cur = u16::from_ne_bytes([line[i], line[i + 1]]);
                    line[i..i + 2].copy_from_slice(&cur.wrapping_add(prev).to_ne_bytes());
                }
            }
            _ => {}
        }
    }
}

fn invert_gray(data: &mut [u8], samples: usize, sample_bytes: usize, float: bool) {
    for px in data.chunks_exact_mut(samples * sample_bytes) {
        let s = &mut px[..sample_bytes];
        match (sample_bytes, float) {
            (1, _) => s[0] = 255 - s[0],
            (2, _) => {
                let v = u16::MAX - u16::from_ne_bytes([s[0], s[1]]);
                s.copy_from_slice(&v.to_ne_bytes());
            }
            (4, true) => {
                let v = 1.0 - f32::from_ne_bytes([s[0], s[1], s[2], s[3]]);
                s.copy_from_slice(&v.to_ne_bytes());
            }
            _ => {}
        }
    }
}

fn expand_palette(indices: &[u8], sample_bytes: usize, lut: &[Vec<u16>; 3]) -> Vec<u8> {
    let mut out = Vec::with_capacity(indices.len() / sample_bytes * 6);
    for idx in indices.chunks_exact(sample_bytes) {
        let i = match sample_bytes {
            1 => usize::from(idx[0]),
            _ => usize::from(u16::from_ne_bytes([idx[0], idx[1]])),
        };
        for c in lut {
            out.extend_from_slice(&c[i].to_ne_bytes());
        }
    }
    out
}

pub(crate) struct TiffReader {
    file: FileInfo,
    info: IoInfo,
}

impl TiffReader {
    fn open(file: &FileInfo) -> DjvResult<Self> {
        let path = file.path();
        let name = path.display().to_string();
        let buf = std::fs::read(&path).map_err(|e| DjvError::open(NAME, &name, e.to_string()))?;
        let header = parse_header(&buf, &name)?;
        tracing::debug!(
            file = %name,
            w = header.info.size.w,
            h = header.info.size.h,
            pixel = %header.info.pixel,
            compression = ?header.compression,
            "tiff directory"
        );
        let mut info = IoInfo::new(header.info.clone());
        info.tags = header.tags;
        info.sequence = file.sequence().clone();
        Ok(Self {
            file: file.clone(),
            info,
        })
    }
}

impl ImageRead for TiffReader {
    fn info(&self) -> &IoInfo {
        &self.info
    }

    // Each frame re-reads and re-parses its file.
    fn read(&mut self, request: &FrameRequest) -> DjvResult<Image> {
        let path = frame_path(&self.file, request.frame);
        let name = path.display().to_string();
        let buf = std::fs::read(&path).map_err(|e| DjvError::open(NAME, &name, e.to_string()))?;
        let header = parse_header(&buf, &name)?;
        let data = decode(&header, &buf, &name)?;
        let mut image = Image::from_data(header.info, data)?;
        image.set_tags(header.tags);
        Ok(proxy_scale(&image, request.proxy))
    }
}

/// Pixel type a TIFF file stores for `pixel`.
pub(crate) fn output_pixel(pixel: Pixel) -> Pixel {
    match pixel {
        Pixel::RgbU10 => Pixel::RgbU16,
        p => p,
    }
}

/// Encode `image` as a complete little-endian TIFF file.
pub(crate) fn encode(image: &Image, tags: &Tags, compression: TiffCompression) -> Vec<u8> {
    let pixel = image.pixel();
    let size = image.size();
    let row = image.scanline_byte_count();
    let sample_bytes = (pixel.bit_depth() / 8) as usize;
    let mut data = image.data().to_vec();
    // Native to little-endian is the same swap as little-endian to native.
    samples_to_native(&mut data, sample_bytes, Endian::Lsb);

    let rows_per_strip = (STRIP_TARGET_BYTES / row.max(1)).clamp(1, size.h as usize);
    let mut out = vec![b'I', b'I', 42, 0, 0, 0, 0, 0];
    let mut offsets = Vec::new();
    let mut counts = Vec::new();
    for chunk in data.chunks(rows_per_strip * row) {
        let strip = compression::compress(compression, chunk, row);
        offsets.push(out.len() as u32);
        counts.push(strip.len() as u32);
        out.extend_from_slice(&strip);
    }
    if out.len() % 2 == 1 {
        out.push(0);
    }

    let channels = pixel.channel_count();
    let mut b = IfdBuilder::new();
    b.long(ifd::IMAGE_WIDTH, size.w);
    b.long(ifd::IMAGE_LENGTH, size.h);
    b.shorts(
        ifd::BITS_PER_SAMPLE,
        &vec![pixel.bit_depth() as u16; channels],
    );
    b.short(ifd::COMPRESSION, compression.tag());
    b.short(
        ifd::PHOTOMETRIC,
        if channels >= 3 {
            PHOTOMETRIC_RGB as u16
        } else {
            PHOTOMETRIC_MIN_IS_BLACK as u16
        },
    );
    b.longs(ifd::STRIP_OFFSETS, &offsets);
    b.short(ifd::ORIENTATION, mirror_orientation(image.mirror()));
    b.short(ifd::SAMPLES_PER_PIXEL, channels as u16);
    b.long(ifd::ROWS_PER_STRIP, rows_per_strip as u32);
    b.longs(ifd::STRIP_BYTE_COUNTS, &counts);
    b.short(ifd::PLANAR_CONFIG, 1);
    if pixel.has_alpha() {
        b.short(ifd::EXTRA_SAMPLES, 2);
    }
    b.shorts(
        ifd::SAMPLE_FORMAT,
        &vec![if pixel.is_float() { 3 } else { 1 }; channels],
    );
    for (tag, key) in [
        (ifd::ARTIST, Tags::CREATOR),
        (ifd::IMAGE_DESCRIPTION, Tags::DESCRIPTION),
        (ifd::COPYRIGHT, Tags::COPYRIGHT),
        (ifd::DATE_TIME, Tags::TIME),
    ] {
        if let Some(v) = tags.get(key) {
            b.ascii(tag, v);
        }
    }
    b.ascii(ifd::SOFTWARE, tags.get(tags::SOFTWARE).unwrap_or("djv"));

    let ifd_offset = out.len() as u32;
    out[4..8].copy_from_slice(&ifd_offset.to_le_bytes());
    out.extend_from_slice(&b.encode(ifd_offset));
    out
}

struct TiffWriter {
    file: FileInfo,
    io: IoInfo,
    options: TiffOptions,
}

impl ImageWrite for TiffWriter {
    fn write(&mut self, image: &Image, frame: i64) -> DjvResult<()> {
        let path = self.file.path_for(frame);
        let image = convert(image, output_pixel(image.pixel()));
        let mut tags = self.io.tags.clone();
        tags.merge(image.tags());
        let bytes = encode(&image, &tags, self.options.compression);
        write_file(NAME, &path, |w| w.write_all(&bytes))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/formats/tiff.rs"]
mod tests;
