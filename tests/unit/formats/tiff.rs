use super::*;

fn gradient(w: u32, h: u32, pixel: Pixel) -> Image {
    let mut img = Image::new(ImageInfo::new(Size::new(w, h), pixel));
    img.set_mirror(Mirror::new(false, true));
    for (i, b) in img.data_mut().iter_mut().enumerate() {
        *b = (i * 13 % 7 + i / 3) as u8;
    }
    img
}

fn decode_all(buf: &[u8]) -> (TiffHeader, Vec<u8>) {
    let h = parse_header(buf, "t.tif").unwrap();
    let data = decode(&h, buf, "t.tif").unwrap();
    (h, data)
}

/// Big-endian single-strip file with inline SHORT/LONG fields.
fn big_endian_tiff(w: u32, h: u32, samples: u16, bits: u16, photometric: u16, data: &[u8]) -> Vec<u8> {
    let entries: [(u16, u16, u32); 8] = [
        (ifd::IMAGE_WIDTH, 4, w),
        (ifd::IMAGE_LENGTH, 4, h),
        (ifd::BITS_PER_SAMPLE, 3, u32::from(bits)),
        (ifd::COMPRESSION, 3, 1),
        (ifd::PHOTOMETRIC, 3, u32::from(photometric)),
        (ifd::STRIP_OFFSETS, 4, 8 + 2 + 8 * 12 + 4),
        (ifd::SAMPLES_PER_PIXEL, 3, u32::from(samples)),
        (ifd::STRIP_BYTE_COUNTS, 4, data.len() as u32),
    ];
    let mut out = b"MM\0\x2a\0\0\0\x08".to_vec();
    out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    for (tag, kind, value) in entries {
        out.extend_from_slice(&tag.to_be_bytes());
        out.extend_from_slice(&kind.to_be_bytes());
        out.extend_from_slice(&1u32.to_be_bytes());
        if kind == 3 {
            out.extend_from_slice(&(value as u16).to_be_bytes());
            out.extend_from_slice(&[0, 0]);
        } else {
            out.extend_from_slice(&value.to_be_bytes());
        }
    }
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(data);
    out
}

#[test]
fn orientation_maps_to_mirror_flags() {
    let table = [
        (1, Mirror::new(false, true)),
        (2, Mirror::new(true, true)),
        (3, Mirror::new(true, false)),
        (4, Mirror::new(false, false)),
    ];
    for (orientation, mirror) in table {
        assert_eq!(orientation_mirror(orientation), mirror);
        assert_eq!(u32::from(mirror_orientation(mirror)), orientation);
    }
}

#[test]
fn palette_indices_expand_through_color_map() {
    let mut map = vec![0u16; 3 * 256];
    for i in 0..256 {
        map[i] = (i * 100) as u16;
        map[256 + i] = (i * 200) as u16;
        map[512 + i] = 65535 - i as u16;
    }
    let indices = [0u8, 1, 2, 255, 7, 9];
    let mut b = IfdBuilder::new();
    b.long(ifd::IMAGE_WIDTH, 3);
    b.long(ifd::IMAGE_LENGTH, 2);
    b.short(ifd::BITS_PER_SAMPLE, 8);
    b.short(ifd::PHOTOMETRIC, 3);
    b.long(ifd::STRIP_OFFSETS, 8);
    b.long(ifd::STRIP_BYTE_COUNTS, indices.len() as u32);
    b.shorts(ifd::COLOR_MAP, &map);
    let mut file = b"II\x2a\0".to_vec();
    let ifd_offset = 8 + indices.len() as u32;
    file.extend_from_slice(&ifd_offset.to_le_bytes());
    file.extend_from_slice(&indices);
    file.extend_from_slice(&b.encode(ifd_offset));

    let (h, data) = decode_all(&file);
    assert_eq!(h.info.pixel, Pixel::RgbU16);
    assert_eq!(h.info.size, Size::new(3, 2));
    for (px, &index) in data.chunks_exact(6).zip(&indices) {
        let i = usize::from(index);
        let rgb: Vec<u16> = px
            .chunks_exact(2)
            .map(|c| u16::from_ne_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(rgb, vec![map[i], map[256 + i], map[512 + i]]);
    }
}

#[test]
fn every_compression_reproduces_pixels() {
    for pixel in [Pixel::LU8, Pixel::LaU16, Pixel::RgbU8, Pixel::RgbaU16, Pixel::RgbF32] {
        for scheme in [
            TiffCompression::None,
            TiffCompression::PackBits,
            TiffCompression::Lzw,
        ] {
            let img = gradient(37, 11, pixel);
            let mut tags = Tags::new();
            tags.set(Tags::CREATOR, "someone");
            tags.set(Tags::COPYRIGHT, "(c) nobody");
            let file = encode(&img, &tags, scheme);
            let (h, data) = decode_all(&file);
            assert_eq!(h.info.pixel, pixel, "{pixel} {scheme:?}");
            assert_eq!(h.info.size, img.size());
            assert_eq!(h.info.mirror, img.mirror());
            assert_eq!(data, img.data(), "{pixel} {scheme:?}");
            assert_eq!(h.tags.get(Tags::CREATOR), Some("someone"));
            assert_eq!(h.tags.get(Tags::COPYRIGHT), Some("(c) nobody"));
            assert_eq!(h.tags.get(tags::SOFTWARE), Some("djv"));
        }
    }
}

#[test]
fn lzw_survives_table_resets() {
    let n = 200_000usize;
    let data: Vec<u8> = (0..n).map(|i| ((i * 7919) % 251) as u8 ^ (i / 1000) as u8).collect();
    let packed = compression::compress(TiffCompression::Lzw, &data, n);
    let unpacked = compression::decompress(TiffCompression::Lzw, &packed, n).unwrap();
    assert_eq!(unpacked, data);
}

#[test]
fn packbits_handles_long_runs_and_literals() {
    let mut row = vec![5u8; 300];
    row.extend((0..200).map(|i| i as u8));
    row.extend([9, 9]);
    let packed = compression::compress(TiffCompression::PackBits, &row, row.len());
    assert!(packed.len() < row.len());
    let unpacked = compression::decompress(TiffCompression::PackBits, &packed, row.len()).unwrap();
    assert_eq!(unpacked, row);
}

#[test]
fn big_endian_samples_become_native() {
    let data = [0x12, 0x34, 0xAB, 0xCD];
    let file = big_endian_tiff(2, 1, 1, 16, 1, &data);
    let (h, out) = decode_all(&file);
    assert_eq!(h.endian, Endian::Msb);
    assert_eq!(h.info.pixel, Pixel::LU16);
    assert_eq!(h.info.mirror, Mirror::new(false, true));
    assert_eq!(out[..2], 0x1234u16.to_ne_bytes());
    assert_eq!(out[2..], 0xABCDu16.to_ne_bytes());
}

#[test]
fn min_is_white_is_inverted() {
    let file = big_endian_tiff(3, 1, 1, 8, 0, &[0, 55, 255]);
    let (_, out) = decode_all(&file);
    assert_eq!(out, vec![255, 200, 0]);
}

#[test]
fn unmappable_layouts_are_unsupported() {
    let file = big_endian_tiff(1, 1, 1, 32, 1, &[0; 4]);
    assert!(matches!(
        parse_header(&file, "i32.tif"),
        Err(DjvError::Unsupported { plugin: "TIFF", .. })
    ));

    let mut b = IfdBuilder::new();
    b.long(ifd::IMAGE_WIDTH, 1);
    b.long(ifd::IMAGE_LENGTH, 1);
    b.shorts(ifd::BITS_PER_SAMPLE, &[8, 8, 8]);
    b.short(ifd::SAMPLES_PER_PIXEL, 3);
    b.short(ifd::PHOTOMETRIC, 2);
    b.short(ifd::PLANAR_CONFIG, 2);
    b.long(ifd::STRIP_OFFSETS, 8);
    b.long(ifd::STRIP_BYTE_COUNTS, 1);
    let mut file = b"II\x2a\0\x0a\0\0\0\0\0".to_vec();
    file.extend_from_slice(&b.encode(10));
    let err = parse_header(&file, "planes.tif").unwrap_err();
    assert!(err.to_string().contains("separate sample planes"), "{err}");
}

#[test]
fn truncated_strip_fails_at_open() {
    let file = encode(&gradient(8, 8, Pixel::RgbU8), &Tags::new(), TiffCompression::None);
    assert!(matches!(
        parse_header(&file[..40], "cut.tif"),
        Err(DjvError::Open { .. })
    ));

    // Keep the directory but drop the tail of the strip data it points at.
    let mut moved = b"II\x2a\0\x08\0\0\0".to_vec();
    let mut b = IfdBuilder::new();
    b.long(ifd::IMAGE_WIDTH, 4);
    b.long(ifd::IMAGE_LENGTH, 4);
    b.short(ifd::BITS_PER_SAMPLE, 8);
    b.long(ifd::STRIP_OFFSETS, 4096);
    b.long(ifd::STRIP_BYTE_COUNTS, 16);
    moved.extend_from_slice(&b.encode(8));
    let err = parse_header(&moved, "moved.tif").unwrap_err();
    assert!(err.to_string().contains("runs past end of file"), "{err}");
}

fn single_strip(w: u32, h: u32, samples: u16, compression: TiffCompression) -> Vec<u8> {
    let mut b = IfdBuilder::new();
    b.long(ifd::IMAGE_WIDTH, w);
    b.long(ifd::IMAGE_LENGTH, h);
    b.shorts(ifd::BITS_PER_SAMPLE, &vec![8; usize::from(samples)]);
    b.short(ifd::SAMPLES_PER_PIXEL, samples);
    b.short(ifd::COMPRESSION, compression.tag());
    b.long(ifd::STRIP_OFFSETS, 8);
    b.long(ifd::STRIP_BYTE_COUNTS, 1);
    let mut file = b"II\x2a\0\x0a\0\0\0\0\0".to_vec();
    file.extend_from_slice(&b.encode(10));
    file
}

#[test]
fn huge_dimensions_fail_before_allocating() {
    for (w, h, samples, compression, reason) in [
        (u32::MAX, u32::MAX, 3, TiffCompression::None, "overflows"),
        (u32::MAX, u32::MAX, 1, TiffCompression::None, "cannot come from"),
        (4096, 4096, 3, TiffCompression::None, "cannot come from"),
        (65536, 65536, 1, TiffCompression::Lzw, "cannot come from"),
    ] {
        let file = single_strip(w, h, samples, compression);
        let err = parse_header(&file, "huge.tif").unwrap_err();
        assert!(matches!(err, DjvError::Open { plugin: "TIFF", .. }), "{err}");
        assert!(err.to_string().contains(reason), "{w}x{h}: {err}");
    }

    // A strip that can plausibly expand to the raster is accepted.
    let file = single_strip(8, 8, 1, TiffCompression::PackBits);
    assert!(parse_header(&file, "small.tif").is_ok());
}

#[test]
fn command_line_sets_compression() {
    let mut plugin = TiffPlugin::new();
    let mut args: Vec<String> = vec!["-tiff_compression".into(), "lzw".into(), "rest".into()];
    assert_eq!(plugin.command_line(&mut args).unwrap(), vec!["compression"]);
    assert_eq!(args, vec!["rest"]);
    assert_eq!(plugin.options().compression, TiffCompression::Lzw);
    assert_eq!(plugin.options_json()["compression"], "lzw");

    let mut bad: Vec<String> = vec!["-tiff_compression".into(), "zip".into()];
    assert!(matches!(
        plugin.command_line(&mut bad),
        Err(DjvError::Option { .. })
    ));
}
