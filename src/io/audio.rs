use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::foundation::error::{DjvError, DjvResult};

/// Primitive PCM sample type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SampleType {
    /// Signed 16-bit integer.
    S16,
    /// Signed 32-bit integer.
    S32,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
}

impl SampleType {
    /// Bytes per sample.
    pub fn byte_count(self) -> usize {
        match self {
            SampleType::S16 => 2,
            SampleType::S32 | SampleType::F32 => 4,
            SampleType::F64 => 8,
        }
    }

    /// FFmpeg sample format name, e.g. `s16` / `fltp`.
    pub fn from_ffmpeg(name: &str) -> Option<(SampleType, SampleLayout)> {
        let (base, layout) = match name.strip_suffix('p') {
            Some(base) => (base, SampleLayout::Planar),
            None => (name, SampleLayout::Interleaved),
        };
        let t = match base {
            "s16" => SampleType::S16,
            "s32" => SampleType::S32,
            "flt" => SampleType::F32,
            "dbl" => SampleType::F64,
            _ => return None,
        };
        Some((t, layout))
    }

    /// Raw little-endian PCM format name understood by `ffmpeg -f`.
    pub fn ffmpeg_raw_format(self) -> &'static str {
        match self {
            SampleType::S16 => "s16le",
            SampleType::S32 => "s32le",
            SampleType::F32 => "f32le",
            SampleType::F64 => "f64le",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SampleType::S16 => "S16",
            SampleType::S32 => "S32",
            SampleType::F32 => "F32",
            SampleType::F64 => "F64",
        };
        f.write_str(s)
    }
}

/// How channels are arranged in a PCM buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SampleLayout {
    /// `L R L R ...`
    Interleaved,
    /// `L L ... R R ...`
    Planar,
}

/// Audio stream description.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct AudioInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub sample_type: SampleType,
}

/// Typed PCM buffer, always interleaved.
#[derive(Clone, Debug, PartialEq)]
pub enum AudioSamples {
    S16(Vec<i16>),
    S32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl AudioSamples {
    pub fn sample_type(&self) -> SampleType {
        match self {
            AudioSamples::S16(_) => SampleType::S16,
            AudioSamples::S32(_) => SampleType::S32,
            AudioSamples::F32(_) => SampleType::F32,
            AudioSamples::F64(_) => SampleType::F64,
        }
    }

    /// Total sample count across channels.
    pub fn len(&self) -> usize {
        match self {
            AudioSamples::S16(v) => v.len(),
            AudioSamples::S32(v) => v.len(),
            AudioSamples::F32(v) => v.len(),
            AudioSamples::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Remap `in_channels` of PCM in `layout` into `out_channels` interleaved.
///
/// Output channel `c` takes input channel `c`; output channels past the input count are silent
/// and surplus input channels are dropped. A trailing partial frame is ignored.
pub fn extract_audio<T: Copy + Default>(
    input: &[T],
    layout: SampleLayout,
    in_channels: usize,
    out_channels: usize,
) -> Vec<T> {
    if in_channels == 0 || out_channels == 0 {
        return Vec::new();
    }
    let frames = input.len() / in_channels;
    let mut out = vec![T::default(); frames * out_channels];
    let shared = in_channels.min(out_channels);
    match layout {
        SampleLayout::Interleaved => {
            for (dst, src) in out
                .chunks_exact_mut(out_channels)
                .zip(input.chunks_exact(in_channels))
            {
                dst[..shared].copy_from_slice(&src[..shared]);
            }
        }
        SampleLayout::Planar => {
            for c in 0..shared {
                let plane = &input[c * frames..(c + 1) * frames];
                for (f, &s) in plane.iter().enumerate() {
                    out[f * out_channels + c] = s;
                }
            }
        }
    }
    out
}

/// Decode little-endian PCM bytes of `sample_type` and remap channels with [`extract_audio`].
pub fn extract_audio_bytes(
    bytes: &[u8],
    sample_type: SampleType,
    layout: SampleLayout,
    in_channels: usize,
    out_channels: usize,
) -> DjvResult<AudioSamples> {
    let width = sample_type.byte_count();
    if !bytes.len().is_multiple_of(width) {
        return Err(DjvError::validation(format!(
            "{} PCM buffer of {} bytes is not sample aligned",
            sample_type,
            bytes.len()
        )));
    }
    let samples = match sample_type {
        SampleType::S16 => {
            let v: Vec<i16> = bytes
                .chunks_exact(2)
                .map(LittleEndian::read_i16)
                .collect();
            AudioSamples::S16(extract_audio(&v, layout, in_channels, out_channels))
        }
        SampleType::S32 => {
            let v: Vec<i32> = bytes
                .chunks_exact(4)
                .map(LittleEndian::read_i32)
                .collect();
            AudioSamples::S32(extract_audio(&v, layout, in_channels, out_channels))
        }
        SampleType::F32 => {
            let v: Vec<f32> = bytes
                .chunks_exact(4)
                .map(LittleEndian::read_f32)
                .collect();
            AudioSamples::F32(extract_audio(&v, layout, in_channels, out_channels))
        }
        SampleType::F64 => {
            let v: Vec<f64> = bytes
                .chunks_exact(8)
                .map(LittleEndian::read_f64)
                .collect();
            AudioSamples::F64(extract_audio(&v, layout, in_channels, out_channels))
        }
    };
    Ok(samples)
}
