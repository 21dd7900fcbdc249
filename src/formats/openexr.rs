//! OpenEXR through the `exr` crate.
//!
//! Opening groups channels into layers as selected by [`ExrChannels`]; every layer reads back
//! as 32-bit float L/LA/RGB/RGBA. Channel interleaving runs on a plugin-owned rayon pool sized
//! by `thread_count`, and block decompression is sequential when that count is 1. Writes use
//! `compression` (and `dwa_compression_level` for DWAA/DWAB).

use std::io::Cursor;
use std::io::Write;
use std::path::Path;

use byteorder::{ByteOrder, NativeEndian};
use exr::meta::MetaData;
use exr::prelude::{
    AnyChannel, AnyChannels, Compression, Encoding, FlatSamples, Layer, LayerAttributes,
    ReadChannels as _, ReadLayers as _, SmallVec, Text, WritableImage as _,
};
use rayon::prelude::*;
use serde_json::Value;

use crate::file_info::FileInfo;
use crate::foundation::core::{Mirror, Size};
use crate::foundation::error::{DjvError, DjvResult};
use crate::formats::write_file;
use crate::image::{Image, ImageInfo, Pixel, Tags, convert, proxy_scale, to_top_down};
use crate::io::args::{parse_named, parse_token, take_flag};
use crate::io::plugin::{decode_options, encode_options};
use crate::io::{FrameRequest, ImageRead, ImageWrite, IoInfo, IoPlugin, frame_path};

pub(crate) const NAME: &str = "OpenEXR";

/// How channels are grouped into layers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExrChannels {
    /// Every channel is its own layer.
    None,
    /// Group well-known names (R/G/B/A, Y/RY/BY).
    #[default]
    Known,
    /// Group every channel sharing a prefix.
    All,
}

/// Compression written to new files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExrCompression {
    #[default]
    None,
    Rle,
    Zips,
    Zip,
    Piz,
    Pxr24,
    B44,
    B44a,
    Dwaa,
    Dwab,
}

/// OpenEXR options.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OpenExrOptions {
    pub thread_count: usize,
    pub channels: ExrChannels,
    pub compression: ExrCompression,
    pub dwa_compression_level: f32,
}

impl Default for OpenExrOptions {
    fn default() -> Self {
        Self {
            thread_count: 4,
            channels: ExrChannels::Known,
            compression: ExrCompression::None,
            dwa_compression_level: 45.0,
        }
    }
}

#[derive(Debug, Default)]
pub struct OpenExrPlugin {
    options: OpenExrOptions,
}

impl OpenExrPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(&self) -> &OpenExrOptions {
        &self.options
    }
}

impl IoPlugin for OpenExrPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "OpenEXR high dynamic range images"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".exr"]
    }

    fn options_json(&self) -> Value {
        encode_options(&self.options)
    }

    fn set_options_json(&mut self, value: Value) -> DjvResult<()> {
        let options: OpenExrOptions = decode_options(NAME, value)?;
        if options.thread_count == 0 {
            return Err(DjvError::option(NAME, "0"));
        }
        self.options = options;
        Ok(())
    }

    fn command_line(&mut self, args: &mut Vec<String>) -> DjvResult<Vec<String>> {
        let mut changed = Vec::new();
        if let Some(v) = take_flag(NAME, args, "-exr_threads", 1)? {
            let n: usize = parse_token(NAME, &v[0])?;
            if n == 0 {
                return Err(DjvError::option(NAME, &v[0]));
            }
            self.options.thread_count = n;
            changed.push("thread_count".to_string());
        }
        if let Some(v) = take_flag(NAME, args, "-exr_channels", 1)? {
            self.options.channels = parse_named(NAME, &v[0])?;
            changed.push("channels".to_string());
        }
        if let Some(v) = take_flag(NAME, args, "-exr_compression", 1)? {
            self.options.compression = parse_named(NAME, &v[0])?;
            changed.push("compression".to_string());
        }
        if let Some(v) = take_flag(NAME, args, "-exr_dwa_compression_level", 1)? {
            self.options.dwa_compression_level = parse_token(NAME, &v[0])?;
            changed.push("dwa_compression_level".to_string());
        }
        Ok(changed)
    }

    fn read(&self, info: &FileInfo) -> DjvResult<Box<dyn ImageRead>> {
        let path = info.path();
        let layers = open_layers(&path, self.options.channels)?;
        let mut io = IoInfo::new(layers[0].info.clone());
        io.layers = layers.iter().map(|l| l.info.clone()).collect();
        io.tags = layers[0].tags.clone();
        io.sequence = info.sequence().clone();
        Ok(Box::new(OpenExrReader {
            file: info.clone(),
            info: io,
            layers,
            parallel: self.options.thread_count > 1,
            pool: build_thread_pool(self.options.thread_count)?,
        }))
    }

    fn write(&self, info: &FileInfo, _io: &IoInfo) -> DjvResult<Box<dyn ImageWrite>> {
        Ok(Box::new(OpenExrWriter {
            file: info.clone(),
            compression: self.options.exr_compression(),
        }))
    }
}

impl OpenExrOptions {
    pub(crate) fn exr_compression(&self) -> Compression {
        let level = Some(self.dwa_compression_level);
        match self.compression {
            ExrCompression::None => Compression::Uncompressed,
            ExrCompression::Rle => Compression::RLE,
            ExrCompression::Zips => Compression::ZIP1,
            ExrCompression::Zip => Compression::ZIP16,
            ExrCompression::Piz => Compression::PIZ,
            ExrCompression::Pxr24 => Compression::PXR24,
            ExrCompression::B44 => Compression::B44,
            ExrCompression::B44a => Compression::B44A,
            ExrCompression::Dwaa => Compression::DWAA(level),
            ExrCompression::Dwab => Compression::DWAB(level),
        }
    }
}

fn build_thread_pool(threads: usize) -> DjvResult<rayon::ThreadPool> {
    if threads == 0 {
        return Err(DjvError::validation("OpenEXR thread count must be >= 1"));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("djv-exr-{i}"))
        .build()
        .map_err(|e| DjvError::validation(format!("failed to build rayon thread pool: {e}")))
}

pub(crate) fn output_pixel(pixel: Pixel) -> Pixel {
    if pixel.has_alpha() {
        Pixel::RgbaF32
    } else {
        Pixel::RgbF32
    }
}

/// Channels read back together as one layer, in output channel order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ChannelGroup {
    pub(crate) name: String,
    pub(crate) channels: Vec<String>,
}

/// `diffuse.R` -> (`diffuse`, `R`); unprefixed names have an empty prefix.
fn split_channel(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => ("", name),
    }
}

fn take_suffix(members: &mut Vec<String>, suffix: &str) -> Option<String> {
    let i = members
        .iter()
        .position(|n| split_channel(n).1.eq_ignore_ascii_case(suffix))?;
    Some(members.remove(i))
}

fn has_suffix(members: &[String], suffix: &str) -> bool {
    members
        .iter()
        .any(|n| split_channel(n).1.eq_ignore_ascii_case(suffix))
}

/// Group channel names into layers.
///
/// `Known` collects R/G/B(/A) and Y(/A) sharing a prefix and leaves every other channel on its
/// own; `All` additionally packs the leftovers of each prefix into groups of up to four.
pub(crate) fn group_channels(names: &[String], mode: ExrChannels) -> Vec<ChannelGroup> {
    if mode == ExrChannels::None {
        return names
            .iter()
            .map(|n| ChannelGroup {
                name: n.clone(),
                channels: vec![n.clone()],
            })
            .collect();
    }
    let mut prefixes: Vec<&str> = Vec::new();
    for n in names {
        let (prefix, _) = split_channel(n);
        if !prefixes.contains(&prefix) {
            prefixes.push(prefix);
        }
    }
    let mut groups = Vec::new();
    for prefix in prefixes {
        let mut members: Vec<String> = names
            .iter()
            .filter(|n| split_channel(n).0 == prefix)
            .cloned()
            .collect();
        let known: &[&str] = if ["R", "G", "B"].iter().all(|s| has_suffix(&members, s)) {
            &["R", "G", "B"]
        } else if has_suffix(&members, "Y") {
            &["Y"]
        } else {
            &[]
        };
        if !known.is_empty() {
            let mut channels: Vec<String> = known
                .iter()
                .filter_map(|s| take_suffix(&mut members, s))
                .collect();
            channels.extend(take_suffix(&mut members, "A"));
            groups.push(ChannelGroup {
                name: prefix.to_string(),
                channels,
            });
        }
        match mode {
            ExrChannels::All => {
                for chunk in members.chunks(4) {
                    groups.push(ChannelGroup {
                        name: prefix.to_string(),
                        channels: chunk.to_vec(),
                    });
                }
            }
            _ => {
                for n in members {
                    groups.push(ChannelGroup {
                        name: n.clone(),
                        channels: vec![n],
                    });
                }
            }
        }
    }
    groups
}

/// One readable layer: a channel group of one part of the file.
#[derive(Clone, Debug)]
struct ExrLayer {
    part: usize,
    channels: Vec<String>,
    info: ImageInfo,
    tags: Tags,
}

fn layer_tags(attributes: &LayerAttributes) -> Tags {
    let mut tags = Tags::new();
    if let Some(owner) = &attributes.owner {
        tags.set(Tags::CREATOR, owner.to_string());
    }
    if let Some(comments) = &attributes.comments {
        tags.set(Tags::DESCRIPTION, comments.to_string());
    }
    if let Some(date) = &attributes.capture_date {
        tags.set(Tags::TIME, date.to_string());
    }
    if let Some(offset) = attributes.utc_offset {
        tags.set(Tags::UTC_OFFSET, offset.to_string());
    }
    tags
}

fn open_layers(path: &Path, mode: ExrChannels) -> DjvResult<Vec<ExrLayer>> {
    let name = path.display().to_string();
    let meta =
        MetaData::read_from_file(path, false).map_err(|e| DjvError::open(NAME, &name, e.to_string()))?;
    let mut layers = Vec::new();
    for (part, header) in meta.headers.iter().enumerate() {
        if header.deep {
            continue;
        }
        let size = header.layer_size;
        let size = match (u32::try_from(size.width()), u32::try_from(size.height())) {
            (Ok(w), Ok(h)) => Size::new(w, h),
            _ => return Err(DjvError::open(NAME, &name, "layer size out of range")),
        };
        let part_name = header
            .own_attributes
            .layer_name
            .as_ref()
            .map(|n| n.to_string())
            .unwrap_or_default();
        let names: Vec<String> = header.channels.list.iter().map(|c| c.name.to_string()).collect();
        let tags = layer_tags(&header.own_attributes);
        for group in group_channels(&names, mode) {
            let Some(pixel) = Pixel::from_layout(group.channels.len(), 32, true) else {
                continue;
            };
            let mut info = ImageInfo::new(size, pixel);
            info.name = match (part_name.is_empty(), group.name.is_empty()) {
                (true, _) => group.name,
                (false, true) => part_name.clone(),
                (false, false) => format!("{part_name}.{}", group.name),
            };
            info.mirror = Mirror::new(false, true);
            layers.push(ExrLayer {
                part,
                channels: group.channels,
                info,
                tags: tags.clone(),
            });
        }
    }
    if layers.is_empty() {
        return Err(DjvError::unsupported(NAME, &name, "no flat image channels"));
    }
    Ok(layers)
}

struct OpenExrReader {
    file: FileInfo,
    info: IoInfo,
    layers: Vec<ExrLayer>,
    parallel: bool,
    pool: rayon::ThreadPool,
}

impl ImageRead for OpenExrReader {
    fn info(&self) -> &IoInfo {
        &self.info
    }

    fn read(&mut self, request: &FrameRequest) -> DjvResult<Image> {
        let path = frame_path(&self.file, request.frame);
        let name = path.display().to_string();
        let layer = self
            .layers
            .get(request.layer)
            .ok_or_else(|| DjvError::read(NAME, &name, format!("no layer {}", request.layer)))?;

        let reader = exr::prelude::read()
            .no_deep_data()
            .largest_resolution_level()
            .all_channels()
            .all_layers()
            .all_attributes();
        let reader = if self.parallel {
            reader
        } else {
            reader.non_parallel()
        };
        let decoded = reader
            .from_file(&path)
            .map_err(|e| DjvError::read(NAME, &name, e.to_string()))?;
        let part = decoded
            .layer_data
            .get(layer.part)
            .ok_or_else(|| DjvError::read(NAME, &name, "missing image part"))?;

        let (w, h) = (part.size.width(), part.size.height());
        if (w, h) != (layer.info.size.w as usize, layer.info.size.h as usize) {
            return Err(DjvError::read(NAME, &name, "layer size changed since open"));
        }
        let mut planes = Vec::with_capacity(layer.channels.len());
        for channel in &layer.channels {
            let samples = part
                .channel_data
                .list
                .iter()
                .find(|c| c.name.to_string() == *channel)
                .ok_or_else(|| DjvError::read(NAME, &name, format!("missing channel '{channel}'")))?;
            let plane: Vec<f32> = samples.sample_data.values_as_f32().collect();
            if plane.len() != w * h {
                return Err(DjvError::unsupported(
                    NAME,
                    &name,
                    format!("subsampled channel '{channel}'"),
                ));
            }
            planes.push(plane);
        }

        let n = planes.len();
        let mut data = vec![0u8; layer.info.byte_count()];
        if !data.is_empty() {
            self.pool.install(|| {
                data.par_chunks_mut(w * n * 4)
                    .enumerate()
                    .for_each(|(y, row)| {
                        for (x, px) in row.chunks_exact_mut(n * 4).enumerate() {
                            for (c, plane) in planes.iter().enumerate() {
                                NativeEndian::write_f32(&mut px[c * 4..c * 4 + 4], plane[y * w + x]);
                            }
                        }
                    });
            });
        }
        let mut image = Image::from_data(layer.info.clone(), data)?;
        image.set_tags(layer.tags.clone());
        Ok(proxy_scale(&image, request.proxy))
    }
}

struct OpenExrWriter {
    file: FileInfo,
    compression: Compression,
}

impl ImageWrite for OpenExrWriter {
    fn write(&mut self, image: &Image, frame: i64) -> DjvResult<()> {
        let path = self.file.path_for(frame);
        let name = path.display().to_string();
        let image = to_top_down(&convert(image, output_pixel(image.pixel())));
        let size = image.size();
        let (w, h) = (size.w as usize, size.h as usize);
        let n = image.pixel().channel_count();

        let mut planes = vec![Vec::with_capacity(w * h); n];
        for px in image.data().chunks_exact(n * 4) {
            for (c, plane) in planes.iter_mut().enumerate() {
                plane.push(NativeEndian::read_f32(&px[c * 4..c * 4 + 4]));
            }
        }
        let channels: SmallVec<[AnyChannel<FlatSamples>; 4]> = ["R", "G", "B", "A"]
            .into_iter()
            .zip(planes)
            .map(|(c, plane)| AnyChannel::new(c, FlatSamples::F32(plane)))
            .collect();

        let mut attributes = match Text::new_or_none(&image.info().name) {
            Some(layer) if !image.info().name.is_empty() => LayerAttributes::named(layer),
            _ => LayerAttributes::default(),
        };
        let tags = image.tags();
        attributes.owner = tags.get(Tags::CREATOR).and_then(Text::new_or_none);
        attributes.comments = tags.get(Tags::DESCRIPTION).and_then(Text::new_or_none);
        attributes.capture_date = tags.get(Tags::TIME).and_then(Text::new_or_none);

        let encoding = Encoding {
            compression: self.compression,
            ..Encoding::default()
        };
        let layer = Layer::new((w, h), attributes, encoding, AnyChannels::sort(channels));
        let mut out = Cursor::new(Vec::new());
        exr::prelude::Image::from_layer(layer)
            .write()
            .to_buffered(&mut out)
            .map_err(|e| DjvError::write(NAME, &name, e.to_string()))?;
        let bytes = out.into_inner();
        write_file(NAME, &path, |w| w.write_all(&bytes))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/formats/openexr.rs"]
mod tests;
