use std::fmt;

/// In-memory pixel layout.
///
/// Samples are native-endian and tightly packed. [`Pixel::RgbU10`] packs three 10-bit samples in
/// one 32-bit word as `r << 22 | g << 12 | b << 2`, the same bit layout DPX and Cineon use for
/// "filled" 10-bit data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Pixel {
    /// Luminance, 8-bit.
    LU8,
    /// Luminance, 16-bit.
    LU16,
    /// Luminance, 32-bit float.
    LF32,
    /// Luminance + alpha, 8-bit.
    LaU8,
    /// Luminance + alpha, 16-bit.
    LaU16,
    /// Luminance + alpha, 32-bit float.
    LaF32,
    /// RGB, 8-bit.
    RgbU8,
    /// RGB, 10-bit packed in 32 bits.
    RgbU10,
    /// RGB, 16-bit.
    RgbU16,
    /// RGB, 32-bit float.
    RgbF32,
    /// RGBA, 8-bit.
    RgbaU8,
    /// RGBA, 16-bit.
    RgbaU16,
    /// RGBA, 32-bit float.
    RgbaF32,
}

impl Pixel {
    /// Every pixel layout.
    pub const ALL: [Pixel; 13] = [
        Pixel::LU8,
        Pixel::LU16,
        Pixel::LF32,
        Pixel::LaU8,
        Pixel::LaU16,
        Pixel::LaF32,
        Pixel::RgbU8,
        Pixel::RgbU10,
        Pixel::RgbU16,
        Pixel::RgbF32,
        Pixel::RgbaU8,
        Pixel::RgbaU16,
        Pixel::RgbaF32,
    ];

    /// Map a `(channels, bit depth, float)` triple to a layout.
    ///
    /// Returns `None` for combinations with no in-memory representation, e.g. 32-bit integer
    /// samples or 10-bit luminance.
    pub fn from_layout(channels: usize, bit_depth: u32, float: bool) -> Option<Pixel> {
        use Pixel::*;
        let p = match (channels, bit_depth, float) {
            (1, 8, false) => LU8,
            (1, 16, false) => LU16,
            (1, 32, true) => LF32,
            (2, 8, false) => LaU8,
            (2, 16, false) => LaU16,
            (2, 32, true) => LaF32,
            (3, 8, false) => RgbU8,
            (3, 10, false) => RgbU10,
            (3, 16, false) => RgbU16,
            (3, 32, true) => RgbF32,
            (4, 8, false) => RgbaU8,
            (4, 16, false) => RgbaU16,
            (4, 32, true) => RgbaF32,
            _ => return None,
        };
        Some(p)
    }

    /// Number of channels.
    pub fn channel_count(self) -> usize {
        use Pixel::*;
        match self {
            LU8 | LU16 | LF32 => 1,
            LaU8 | LaU16 | LaF32 => 2,
            RgbU8 | RgbU10 | RgbU16 | RgbF32 => 3,
            RgbaU8 | RgbaU16 | RgbaF32 => 4,
        }
    }

    /// Bits per channel.
    pub fn bit_depth(self) -> u32 {
        use Pixel::*;
        match self {
            LU8 | LaU8 | RgbU8 | RgbaU8 => 8,
            RgbU10 => 10,
            LU16 | LaU16 | RgbU16 | RgbaU16 => 16,
            LF32 | LaF32 | RgbF32 | RgbaF32 => 32,
        }
    }

    /// `true` for floating-point layouts.
    pub fn is_float(self) -> bool {
        matches!(self, Pixel::LF32 | Pixel::LaF32 | Pixel::RgbF32 | Pixel::RgbaF32)
    }

    /// `true` when the layout carries an alpha channel.
    pub fn has_alpha(self) -> bool {
        matches!(self.channel_count(), 2 | 4)
    }

    /// Bytes per pixel.
    pub fn byte_count(self) -> usize {
        if self == Pixel::RgbU10 {
            return 4;
        }
        self.channel_count() * (self.bit_depth() as usize / 8)
    }

    /// Same channel layout at a different sample type, if one exists.
    pub fn with_bit_depth(self, bit_depth: u32, float: bool) -> Option<Pixel> {
        Pixel::from_layout(self.channel_count(), bit_depth, float)
    }

    /// Stable display name, e.g. `RGB U16`.
    pub fn name(self) -> &'static str {
        use Pixel::*;
        match self {
            LU8 => "L U8",
            LU16 => "L U16",
            LF32 => "L F32",
            LaU8 => "LA U8",
            LaU16 => "LA U16",
            LaF32 => "LA F32",
            RgbU8 => "RGB U8",
            RgbU10 => "RGB U10",
            RgbU16 => "RGB U16",
            RgbF32 => "RGB F32",
            RgbaU8 => "RGBA U8",
            RgbaU16 => "RGBA U16",
            RgbaF32 => "RGBA F32",
        }
    }
}

impl fmt::Display for Pixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pack three 10-bit samples into a filled 32-bit word.
pub fn pack_u10(r: u16, g: u16, b: u16) -> u32 {
    (u32::from(r & 0x3ff) << 22) | (u32::from(g & 0x3ff) << 12) | (u32::from(b & 0x3ff) << 2)
}

/// Unpack a filled 32-bit word into three 10-bit samples.
pub fn unpack_u10(word: u32) -> [u16; 3] {
    [
        ((word >> 22) & 0x3ff) as u16,
        ((word >> 12) & 0x3ff) as u16,
        ((word >> 2) & 0x3ff) as u16,
    ]
}

/// Decode one pixel into normalized RGBA.
///
/// Luminance expands to `r = g = b`; missing alpha reads as `1.0`.
pub(crate) fn load_rgba(pixel: Pixel, src: &[u8]) -> [f32; 4] {
    let n = pixel.channel_count();
    let mut c = [0.0f32, 0.0, 0.0, 1.0];
    let mut samples = [0.0f32; 4];
    match pixel {
        Pixel::RgbU10 => {
            let word = u32::from_ne_bytes([src[0], src[1], src[2], src[3]]);
            let [r, g, b] = unpack_u10(word);
            samples[0] = f32::from(r) / 1023.0;
            samples[1] = f32::from(g) / 1023.0;
            samples[2] = f32::from(b) / 1023.0;
        }
        _ => match pixel.bit_depth() {
            8 => {
                for (i, s) in samples.iter_mut().take(n).enumerate() {
                    *s = f32::from(src[i]) / 255.0;
                }
            }
            16 => {
                for (i, s) in samples.iter_mut().take(n).enumerate() {
                    let v = u16::from_ne_bytes([src[i * 2], src[i * 2 + 1]]);
                    *s = f32::from(v) / 65535.0;
                }
            }
            _ => {
                for (i, s) in samples.iter_mut().take(n).enumerate() {
                    let o = i * 4;
                    *s = f32::from_ne_bytes([src[o], src[o + 1], src[o + 2], src[o + 3]]);
                }
            }
        },
    }
    match n {
        1 => {
            c[0] = samples[0];
            c[1] = samples[0];
            c[2] = samples[0];
        }
        2 => {
            c[0] = samples[0];
            c[1] = samples[0];
            c[2] = samples[0];
            c[3] = samples[1];
        }
        _ => c[..n].copy_from_slice(&samples[..n]),
    }
    c
}

/// Encode normalized RGBA into one pixel.
///
/// `gray_source` keeps luminance exact when converting between luminance layouts; otherwise
/// luminance is derived from Rec. 709 weights.
pub(crate) fn store_rgba(pixel: Pixel, c: [f32; 4], gray_source: bool, dst: &mut [u8]) {
    let n = pixel.channel_count();
    let luma = if gray_source {
        c[0]
    } else {
        0.2126 * c[0] + 0.7152 * c[1] + 0.0722 * c[2]
    };
    let samples: [f32; 4] = match n {
        1 => [luma, 0.0, 0.0, 0.0],
        2 => [luma, c[3], 0.0, 0.0],
        _ => c,
    };
    match pixel {
        Pixel::RgbU10 => {
            let q = |v: f32| (v.clamp(0.0, 1.0) * 1023.0).round() as u16;
            let word = pack_u10(q(samples[0]), q(samples[1]), q(samples[2]));
            dst[..4].copy_from_slice(&word.to_ne_bytes());
        }
        _ => match pixel.bit_depth() {
            8 => {
                for i in 0..n {
                    dst[i] = (samples[i].clamp(0.0, 1.0) * 255.0).round() as u8;
                }
            }
            16 => {
                for i in 0..n {
                    let v = (samples[i].clamp(0.0, 1.0) * 65535.0).round() as u16;
                    dst[i * 2..i * 2 + 2].copy_from_slice(&v.to_ne_bytes());
                }
            }
            _ => {
                for i in 0..n {
                    dst[i * 4..i * 4 + 4].copy_from_slice(&samples[i].to_ne_bytes());
                }
            }
        },
    }
}
