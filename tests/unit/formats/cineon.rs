use crate::foundation::core::Mirror;

use super::*;

fn temp_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "djv_cineon_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn rgb10(w: u32, h: u32) -> ImageInfo {
    let mut info = ImageInfo::new(Size::new(w, h), Pixel::RgbU10);
    info.mirror = Mirror::new(false, true);
    info
}

#[test]
fn header_round_trips_geometry_tags_and_speed() {
    let mut tags = Tags::new();
    tags.set(Tags::TIME, "2024:01:02 03:04:05");
    tags.set(Tags::KEYCODE, "1:2:3:4:5");
    tags.set(tags::INPUT_DEVICE, "scanner");
    let buf = build_header(&rgb10(7, 3), &tags, Speed::new(25, 1).unwrap(), "a.0001.cin");
    assert_eq!(buf.len(), HEADER_SIZE);
    assert_eq!(&buf[..4], &[0x80, 0x2A, 0x5F, 0xD7]);

    let h = parse_header(&buf, "a.0001.cin").unwrap();
    assert_eq!(h.endian, Endian::Msb);
    assert_eq!(h.data_offset, 2048);
    assert_eq!(h.info.size, Size::new(7, 3));
    assert_eq!(h.info.pixel, Pixel::RgbU10);
    assert_eq!(h.info.mirror, Mirror::new(false, true));
    assert_eq!(h.tags.get(Tags::TIME), Some("2024:01:02 03:04:05"));
    assert_eq!(h.tags.get(Tags::KEYCODE), Some("1:2:3:4:5"));
    assert_eq!(h.tags.get(tags::INPUT_DEVICE), Some("scanner"));
    assert_eq!(h.tags.get(tags::SLATE), None);
    assert_eq!(h.speed, Some(Speed::new(25, 1).unwrap()));
}

#[test]
fn little_endian_magic_is_detected() {
    let mut w = HeaderWriter::new(HEADER_SIZE, 0xff, Endian::Lsb);
    w.put_u32(0, MAGIC);
    w.put_u32(4, 2048);
    w.put_u8(192, 1);
    w.put_u8(193, 3);
    for c in 0..3 {
        w.put_u8(196 + c * 28 + 2, 10);
        w.put_u32(196 + c * 28 + 4, 4);
        w.put_u32(196 + c * 28 + 8, 2);
    }
    let buf = w.into_bytes();
    assert_eq!(&buf[..4], &[0xD7, 0x5F, 0x2A, 0x80]);

    let h = parse_header(&buf, "le.cin").unwrap();
    assert_eq!(h.endian, Endian::Lsb);
    assert_eq!(h.info.size, Size::new(4, 2));
    assert_eq!(h.info.mirror, Mirror::new(false, false));
    assert!(h.tags.is_empty());
    assert_eq!(h.speed, None);
}

#[test]
fn rejects_bad_magic_short_header_and_odd_layouts() {
    let err = parse_header(&[0u8; 100], "short.cin").unwrap_err();
    assert!(err.to_string().starts_with("cannot open [Cineon]"));

    let mut buf = build_header(&rgb10(2, 2), &Tags::new(), Speed::default(), "x.cin");
    buf[0] = 0;
    assert!(matches!(
        parse_header(&buf, "x.cin"),
        Err(DjvError::Open { .. })
    ));

    let mut buf = build_header(&rgb10(2, 2), &Tags::new(), Speed::default(), "x.cin");
    buf[193] = 1;
    assert!(matches!(
        parse_header(&buf, "x.cin"),
        Err(DjvError::Unsupported { plugin: "Cineon", .. })
    ));
}

#[test]
fn words_swap_only_when_endian_differs() {
    let raw = [1u8, 2, 3, 4, 5, 6, 7, 8];
    assert_eq!(words_to_native(&raw, Endian::native()), raw.to_vec());
    let other = if Endian::native() == Endian::Msb {
        Endian::Lsb
    } else {
        Endian::Msb
    };
    assert_eq!(words_to_native(&raw, other), vec![4, 3, 2, 1, 8, 7, 6, 5]);
}

#[test]
fn command_line_consumes_cineon_flags() {
    let mut plugin = CineonPlugin::new();
    let mut args: Vec<String> = [
        "in.cin",
        "-cineon_input_color_profile",
        "film_print",
        "-cineon_input_film_print",
        "90",
        "700",
        "1.5",
        "10",
        "out.cin",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let changed = plugin.command_line(&mut args).unwrap();
    assert_eq!(changed, vec!["input_color_profile", "input_film_print"]);
    assert_eq!(args, vec!["in.cin", "out.cin"]);
    assert_eq!(plugin.options().input_color_profile, ColorProfile::FilmPrint);
    assert_eq!(
        plugin.options().input_film_print,
        FilmPrintToLinear {
            black: 90,
            white: 700,
            gamma: 1.5,
            soft_clip: 10
        }
    );

    let mut bad: Vec<String> = vec!["-cineon_output_film_print".into(), "1".into(), "x".into(), "2".into()];
    let err = plugin.command_line(&mut bad).unwrap_err();
    assert_eq!(err.to_string(), "option error [Cineon]: cannot parse 'x'");

    let mut short: Vec<String> = vec!["-cineon_input_color_profile".into()];
    assert!(plugin.command_line(&mut short).is_err());
}

#[test]
fn later_frames_are_checked_against_the_file_length() {
    let dir = temp_dir("frames");
    let plugin = CineonPlugin::new();
    let img = Image::new(rgb10(8, 4));
    let mut writer = plugin
        .write(&FileInfo::new(dir.join("shot.0001.cin")), &IoInfo::new(rgb10(8, 4)))
        .unwrap();
    for frame in 1..=3 {
        writer.write(&img, frame).unwrap();
    }
    writer.close().unwrap();

    // Frame 2 claims a huge raster and frame 3 lost the tail of its data.
    let second = dir.join("shot.0002.cin");
    let mut bytes = std::fs::read(&second).unwrap();
    for at in [200, 204] {
        bytes[at..at + 4].copy_from_slice(&0xffff_0000u32.to_be_bytes());
    }
    std::fs::write(&second, &bytes).unwrap();
    let third = dir.join("shot.0003.cin");
    let bytes = std::fs::read(&third).unwrap();
    std::fs::write(&third, &bytes[..bytes.len() - 10]).unwrap();

    let file = FileInfo::pattern(dir.join("shot.0001-0003.cin")).unwrap();
    let mut reader = plugin.read(&file).unwrap();
    assert!(reader.read(&FrameRequest::frame(1)).is_ok());
    for frame in [2, 3] {
        let err = reader.read(&FrameRequest::frame(frame)).err().unwrap();
        assert!(matches!(err, DjvError::Open { plugin: "Cineon", .. }), "{frame}: {err}");
    }
    std::fs::remove_dir_all(&dir).ok();
}
