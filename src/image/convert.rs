use rayon::prelude::*;

use crate::foundation::core::Mirror;
use crate::image::buffer::Image;
use crate::image::info::ImageInfo;
use crate::image::pixel::{Pixel, load_rgba, store_rgba};

/// Convert `src` to another pixel layout, keeping size, orientation and tags.
///
/// Integer samples are normalized to `0..=1` and requantized with rounding; float samples are
/// clamped only when the target is an integer layout.
pub fn convert(src: &Image, pixel: Pixel) -> Image {
    if src.pixel() == pixel {
        return src.clone();
    }
    let mut info = src.info().clone();
    info.pixel = pixel;
    let mut out = Image::new(info);
    out.set_tags(src.tags().clone());

    let src_pixel = src.pixel();
    let gray = src_pixel.channel_count() <= 2;
    let src_px = src_pixel.byte_count();
    let dst_px = pixel.byte_count();
    let src_row = src.scanline_byte_count();
    let dst_row = out.scanline_byte_count();
    if src_row == 0 || dst_row == 0 {
        return out;
    }

    let src_data = src.data();
    out.data_mut()
        .par_chunks_mut(dst_row)
        .zip(src_data.par_chunks(src_row))
        .for_each(|(dst, s)| {
            for (d, p) in dst.chunks_exact_mut(dst_px).zip(s.chunks_exact(src_px)) {
                store_rgba(pixel, load_rgba(src_pixel, p), gray, d);
            }
        });
    out
}

/// Reorder rows/columns so the image's mirror flags become `target`.
pub fn reorient(src: &Image, target: Mirror) -> Image {
    let cur = src.mirror();
    let flip_x = cur.x != target.x;
    let flip_y = cur.y != target.y;
    if !flip_x && !flip_y {
        return src.clone();
    }

    let mut out = Image::new(ImageInfo {
        mirror: target,
        ..src.info().clone()
    });
    out.set_tags(src.tags().clone());
    let row = src.scanline_byte_count();
    let px = src.pixel().byte_count();
    let h = src.size().h as usize;
    if row == 0 {
        return out;
    }

    out.data_mut()
        .par_chunks_mut(row)
        .enumerate()
        .for_each(|(y, dst)| {
            let sy = if flip_y { h - 1 - y } else { y };
            let s = src.scanline(sy);
            if flip_x {
                for (d, p) in dst.chunks_exact_mut(px).zip(s.chunks_exact(px).rev()) {
                    d.copy_from_slice(p);
                }
            } else {
                dst.copy_from_slice(s);
            }
        });
    out
}

/// Rows top-down, columns left-to-right: the storage order of formats without an orientation
/// field.
pub fn to_top_down(src: &Image) -> Image {
    reorient(src, Mirror::new(false, true))
}
