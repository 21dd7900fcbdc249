//! Pieces shared by the Cineon and DPX plugins: color profiles, film print transfer curves,
//! orientation codes and keycode/timecode strings.

use crate::foundation::core::Mirror;
use crate::image::pixel::{load_rgba, store_rgba};
use crate::image::{Image, convert};

/// How 10-bit code values are interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorProfile {
    /// Pick from the file; treated like [`ColorProfile::Raw`].
    #[default]
    Auto,
    /// Code values pass through unchanged.
    Raw,
    /// Apply the film print curve.
    FilmPrint,
}

impl ColorProfile {
    pub(crate) fn is_film_print(self) -> bool {
        self == ColorProfile::FilmPrint
    }
}

/// Log-to-linear film print parameters, in 10-bit code values.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FilmPrintToLinear {
    pub black: u16,
    pub white: u16,
    pub gamma: f32,
    pub soft_clip: u16,
}

impl Default for FilmPrintToLinear {
    fn default() -> Self {
        Self {
            black: 95,
            white: 685,
            gamma: 1.7,
            soft_clip: 0,
        }
    }
}

/// Linear-to-log film print parameters, in 10-bit code values.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LinearToFilmPrint {
    pub black: u16,
    pub white: u16,
    pub gamma: f32,
}

impl Default for LinearToFilmPrint {
    fn default() -> Self {
        Self {
            black: 95,
            white: 685,
            gamma: 1.7,
        }
    }
}

fn print_gain(black: f32, white: f32, gamma: f32) -> f32 {
    1.0 / (1.0 - 10f32.powf((black - white) * 0.002 / 0.6).powf(gamma / 1.7))
}

impl FilmPrintToLinear {
    /// 1024-entry table from code value to normalized linear.
    pub fn lut(&self) -> Vec<f32> {
        let black = f32::from(self.black);
        let white = f32::from(self.white);
        let soft_clip = f32::from(self.soft_clip);
        let gain = print_gain(black, white, self.gamma);
        let offset = gain - 1.0;
        let break_point = white - soft_clip;
        let knee_offset =
            10f32.powf((break_point - white) * 0.002 / 0.6).powf(self.gamma / 1.7) * gain - offset;
        let knee_gain =
            ((255.0 - knee_offset) / (5.0 * soft_clip).powf(soft_clip / 100.0)) / 255.0;

        (0..1024)
            .map(|i| {
                let x = i as f32;
                let v = if x < black {
                    0.0
                } else if x > break_point {
                    (x - break_point).powf(soft_clip / 100.0) * knee_gain + knee_offset
                } else {
                    10f32.powf((x - white) * 0.002 / 0.6).powf(self.gamma / 1.7) * gain - offset
                };
                v.clamp(0.0, 1.0)
            })
            .collect()
    }
}

impl LinearToFilmPrint {
    /// `size`-entry table from normalized linear to normalized code value.
    pub fn lut(&self, size: usize) -> Vec<f32> {
        let black = f32::from(self.black);
        let white = f32::from(self.white);
        let gain = print_gain(black, white, self.gamma);
        let offset = gain - 1.0;
        let last = size.saturating_sub(1).max(1) as f32;

        (0..size)
            .map(|i| {
                let x = i as f32 / last;
                let v = (white + ((x + offset) / gain).powf(1.7 / self.gamma).log10() / (0.002 / 0.6))
                    / 1023.0;
                if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }
            })
            .collect()
    }
}

/// Map every color channel of `image` through `lut` (indexed by the normalized value).
///
/// Alpha is left alone; float images are converted to `RgbU10` first since the curve is defined
/// over 10-bit code values.
pub(crate) fn apply_lut(image: &Image, lut: &[f32]) -> Image {
    let mut out = if image.pixel().is_float() {
        convert(image, crate::image::Pixel::RgbU10)
    } else {
        image.clone()
    };
    if lut.is_empty() {
        return out;
    }
    let pixel = out.pixel();
    let gray = pixel.channel_count() <= 2;
    let px = pixel.byte_count();
    let last = (lut.len() - 1) as f32;
    for p in out.data_mut().chunks_exact_mut(px) {
        let mut c = load_rgba(pixel, p);
        for v in c.iter_mut().take(3) {
            let pos = (v.clamp(0.0, 1.0) * last).round() as usize;
            *v = lut[pos.min(lut.len() - 1)];
        }
        store_rgba(pixel, c, gray, p);
    }
    out
}

/// Cineon/DPX orientation code (0..=7) to mirror flags.
///
/// Codes 4..=7 are the transposed variants of 0..=3; the transpose itself is not applied.
pub(crate) fn mirror_from_orientation(code: u32) -> Mirror {
    match code % 4 {
        0 => Mirror::new(false, true),
        1 => Mirror::new(false, false),
        2 => Mirror::new(true, true),
        _ => Mirror::new(true, false),
    }
}

/// Inverse of [`mirror_from_orientation`] for codes 0..=3.
pub(crate) fn orientation_from_mirror(mirror: Mirror) -> u8 {
    match (mirror.x, mirror.y) {
        (false, true) => 0,
        (false, false) => 1,
        (true, true) => 2,
        (true, false) => 3,
    }
}

/// Film edge code as `id:type:prefix:count:offset`.
pub(crate) fn keycode_to_string(id: u32, kind: u32, prefix: u32, count: u32, offset: u32) -> String {
    format!("{id}:{kind}:{prefix}:{count}:{offset}")
}

/// Parse the output of [`keycode_to_string`].
pub(crate) fn keycode_from_string(s: &str) -> Option<[u32; 5]> {
    let parts: Vec<u32> = s
        .split(':')
        .map(|p| p.trim().parse().ok())
        .collect::<Option<_>>()?;
    parts.try_into().ok()
}

/// BCD `hhmmssff` timecode to `hh:mm:ss:ff`.
pub(crate) fn timecode_to_string(bcd: u32) -> String {
    let d = |shift: u32| ((bcd >> (shift + 4)) & 0xf) * 10 + ((bcd >> shift) & 0xf);
    format!("{:02}:{:02}:{:02}:{:02}", d(24), d(16), d(8), d(0))
}

/// Parse `hh:mm:ss:ff` into BCD.
pub(crate) fn timecode_from_string(s: &str) -> Option<u32> {
    let parts: Vec<u32> = s
        .split(':')
        .map(|p| p.trim().parse().ok())
        .collect::<Option<_>>()?;
    if parts.len() != 4 || parts.iter().any(|&p| p > 99) {
        return None;
    }
    let bcd = |v: u32| ((v / 10) << 4) | (v % 10);
    Some((bcd(parts[0]) << 24) | (bcd(parts[1]) << 16) | (bcd(parts[2]) << 8) | bcd(parts[3]))
}

/// Command-line values `black white gamma soft_clip`.
pub(crate) fn parse_film_print_to_linear(
    plugin: &'static str,
    values: &[String],
) -> crate::foundation::error::DjvResult<FilmPrintToLinear> {
    use crate::io::args::parse_token;
    Ok(FilmPrintToLinear {
        black: parse_token(plugin, &values[0])?,
        white: parse_token(plugin, &values[1])?,
        gamma: parse_token(plugin, &values[2])?,
        soft_clip: parse_token(plugin, &values[3])?,
    })
}

/// Command-line values `black white gamma`.
pub(crate) fn parse_linear_to_film_print(
    plugin: &'static str,
    values: &[String],
) -> crate::foundation::error::DjvResult<LinearToFilmPrint> {
    use crate::io::args::parse_token;
    Ok(LinearToFilmPrint {
        black: parse_token(plugin, &values[0])?,
        white: parse_token(plugin, &values[1])?,
        gamma: parse_token(plugin, &values[2])?,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/formats/film_print.rs"]
mod tests;
