use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;

use crate::foundation::core::Size;
use crate::foundation::error::{DjvError, DjvResult};
use crate::image::buffer::Image;
use crate::image::info::ImageInfo;
use crate::image::pixel::{load_rgba, store_rgba};

/// Power-of-two decode downscale.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Proxy {
    /// Full resolution.
    #[default]
    None,
    /// 1/2.
    P1,
    /// 1/4.
    P2,
    /// 1/8.
    P3,
}

impl Proxy {
    /// Linear scale divisor (1, 2, 4 or 8).
    pub fn divisor(self) -> u32 {
        match self {
            Proxy::None => 1,
            Proxy::P1 => 2,
            Proxy::P2 => 4,
            Proxy::P3 => 8,
        }
    }

    /// From the exponent `n` in `1 / 2^n`.
    pub fn from_level(level: u32) -> DjvResult<Self> {
        match level {
            0 => Ok(Proxy::None),
            1 => Ok(Proxy::P1),
            2 => Ok(Proxy::P2),
            3 => Ok(Proxy::P3),
            _ => Err(DjvError::validation(format!(
                "proxy level must be 0..=3, got {level}"
            ))),
        }
    }

    /// Scaled dimensions, rounding up so no source pixel is dropped.
    pub fn scale_size(self, size: Size) -> Size {
        let d = self.divisor();
        Size::new(size.w.div_ceil(d), size.h.div_ceil(d))
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Proxy::None => f.write_str("none"),
            _ => write!(f, "1/{}", self.divisor()),
        }
    }
}

impl FromStr for Proxy {
    type Err = DjvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "none" | "0" => Ok(Proxy::None),
            "1/2" | "1" => Ok(Proxy::P1),
            "1/4" | "2" => Ok(Proxy::P2),
            "1/8" | "3" => Ok(Proxy::P3),
            other => Err(DjvError::validation(format!("unknown proxy '{other}'"))),
        }
    }
}

/// Box-filter downscale by the proxy divisor.
///
/// Each output pixel averages the source block it covers; blocks at the right/bottom edge may be
/// partial and average only the pixels they contain.
pub fn proxy_scale(src: &Image, proxy: Proxy) -> Image {
    if proxy == Proxy::None {
        return src.clone();
    }
    let d = proxy.divisor() as usize;
    let size = proxy.scale_size(src.size());
    let mut out = Image::new(ImageInfo {
        size,
        ..src.info().clone()
    });
    out.set_tags(src.tags().clone());

    let pixel = src.pixel();
    let gray = pixel.channel_count() <= 2;
    let px = pixel.byte_count();
    let row = out.scanline_byte_count();
    let (sw, sh) = (src.size().w as usize, src.size().h as usize);
    if row == 0 {
        return out;
    }

    out.data_mut()
        .par_chunks_mut(row)
        .enumerate()
        .for_each(|(oy, dst)| {
            let y0 = oy * d;
            let y1 = (y0 + d).min(sh);
            for (ox, out_px) in dst.chunks_exact_mut(px).enumerate() {
                let x0 = ox * d;
                let x1 = (x0 + d).min(sw);
                let mut acc = [0.0f32; 4];
                for y in y0..y1 {
                    let line = src.scanline(y);
                    for x in x0..x1 {
                        let c = load_rgba(pixel, &line[x * px..(x + 1) * px]);
                        for (a, v) in acc.iter_mut().zip(c) {
                            *a += v;
                        }
                    }
                }
                let n = ((y1 - y0) * (x1 - x0)).max(1) as f32;
                store_rgba(pixel, acc.map(|a| a / n), gray, out_px);
            }
        });
    out
}
