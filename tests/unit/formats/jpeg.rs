use super::*;

fn temp_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "djv_jpeg_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_gray(plugin: &JpegPlugin, file: &FileInfo) {
    let size = crate::foundation::core::Size::new(64, 64);
    let data: Vec<u8> = (0..size.area()).map(|i| (i * 5 % 256) as u8).collect();
    let image = Image::from_data(crate::image::ImageInfo::new(size, Pixel::LU8), data).unwrap();
    let mut writer = plugin.write(file, &IoInfo::new(image.info().clone())).unwrap();
    writer.write(&image, 0).unwrap();
    writer.close().unwrap();
}

#[test]
fn streams_must_end_with_an_eoi_marker() {
    let dir = temp_dir("eoi");
    let plugin = JpegPlugin::new();
    let file = FileInfo::new(dir.join("gray.jpg"));
    write_gray(&plugin, &file);
    let full = std::fs::read(file.path()).unwrap();
    assert_eq!(&full[full.len() - 2..], &[0xFF, 0xD9]);

    let padded = dir.join("padded.jpg");
    let mut bytes = full.clone();
    bytes.extend_from_slice(&[0, 0, 0]);
    std::fs::write(&padded, &bytes).unwrap();
    assert_eq!(read_complete(&padded).unwrap().len(), full.len() + 3);

    // Header intact, scan data cut short: opens, then fails to read.
    let cut = dir.join("cut.jpg");
    std::fs::write(&cut, &full[..full.len() * 3 / 4]).unwrap();
    let mut reader = plugin.read(&FileInfo::new(&cut)).unwrap();
    let err = reader.read(&FrameRequest::default()).unwrap_err();
    assert!(matches!(err, DjvError::Read { plugin: "JPEG", .. }), "{err}");
    std::fs::remove_dir_all(&dir).ok();
}
