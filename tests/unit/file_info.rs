use super::*;

fn temp_dir(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "djv_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

#[test]
fn numbered_file_splits_into_parts() {
    let f = FileInfo::new("/shots/render.0012.exr");
    assert_eq!(f.dir(), Path::new("/shots"));
    assert_eq!(f.base(), "render.");
    assert_eq!(f.number(), "0012");
    assert_eq!(f.extension(), ".exr");
    assert_eq!(f.kind(), FileKind::File);
    assert_eq!(f.sequence().frames, vec![12]);
    assert_eq!(f.sequence().pad, 4);
    assert_eq!(f.file_name_for(7), "render.0007.exr");
    assert_eq!(f.path(), Path::new("/shots/render.0012.exr"));
}

#[test]
fn plain_and_extensionless_names() {
    let f = FileInfo::new("plate.tif");
    assert_eq!(f.base(), "plate");
    assert_eq!(f.extension(), ".tif");
    assert!(!f.is_numbered());
    assert_eq!(f.file_name_for(99), "plate.tif");

    let g = FileInfo::new("frame.0100");
    assert_eq!(g.extension(), "");
    assert_eq!(g.number(), "0100");

    let h = FileInfo::new("shot-010.DPX");
    assert_eq!(h.base(), "shot-");
    assert_eq!(h.number(), "010");
    assert_eq!(h.extension_lower(), ".dpx");
}

#[test]
fn range_and_hash_patterns_are_sequences() {
    let f = FileInfo::pattern("a.1-3,5.dpx").unwrap();
    assert_eq!(f.kind(), FileKind::Sequence);
    assert_eq!(f.sequence().frames, vec![1, 2, 3, 5]);
    assert_eq!(f.file_name(), "a.1-3,5.dpx");
    assert_eq!(f.path(), Path::new("a.1.dpx"));

    let h = FileInfo::pattern("b.####.cin").unwrap();
    assert_eq!(h.kind(), FileKind::Sequence);
    assert_eq!(h.base(), "b.");
    assert_eq!(h.sequence().pad, 4);
    assert_eq!(h.file_name_for(3), "b.0003.cin");

    let single = FileInfo::pattern("c.0042.tif").unwrap();
    assert_eq!(single, FileInfo::new("c.0042.tif"));
    assert!(FileInfo::pattern("x.0-99999999999.dpx").is_err());
}

#[test]
fn dashes_and_commas_in_file_names_are_literal() {
    let f = FileInfo::new("/plates/plate_2019-2021.ppm");
    assert_eq!(f.kind(), FileKind::File);
    assert_eq!(f.base(), "plate_2019-");
    assert_eq!(f.number(), "2021");
    assert_eq!(f.sequence().frames, vec![2021]);
    assert_eq!(f.path(), Path::new("/plates/plate_2019-2021.ppm"));

    let g = FileInfo::new("take_1,2.dpx");
    assert_eq!(g.kind(), FileKind::File);
    assert_eq!(g.path(), Path::new("take_1,2.dpx"));

    let huge = FileInfo::new("x.0-99999999999.dpx");
    assert_eq!(huge.sequence().frames, vec![99999999999]);
    assert_eq!(huge.file_name(), "x.0-99999999999.dpx");
}

#[test]
fn sequence_parse_and_display() {
    let s = Sequence::parse("0001-0003,0007").unwrap();
    assert_eq!(s.frames, vec![1, 2, 3, 7]);
    assert_eq!(s.pad, 4);
    assert_eq!(s.to_string(), "0001-0003,0007");

    let r = Sequence::parse("5-3").unwrap();
    assert_eq!(r.frames, vec![5, 4, 3]);

    assert!(Sequence::parse("1-x").is_err());
    assert!(Sequence::parse("1,,2").is_err());

    assert_eq!(Sequence::parse("1-1000000").unwrap().len(), Sequence::MAX_FRAMES);
    assert!(Sequence::parse("0-1000000").is_err());
    assert!(Sequence::parse("1-999999,5,6").is_err());
    assert!(Sequence::parse(&format!("{}-{}", i64::MIN, i64::MAX)).is_err());
}

#[test]
fn add_to_sequence_requires_matching_names() {
    let mut a = FileInfo::new("r.0001.tif");
    assert!(a.add_to_sequence(&FileInfo::new("r.0002.tif")));
    assert!(a.add_to_sequence(&FileInfo::new("r.1000.tif")));
    assert!(!a.add_to_sequence(&FileInfo::new("r.0003.dpx")));
    assert!(!a.add_to_sequence(&FileInfo::new("s.0003.tif")));
    assert!(!a.add_to_sequence(&FileInfo::new("r.3.tif")));
    assert_eq!(a.kind(), FileKind::Sequence);
    assert_eq!(a.sequence().frames, vec![1, 2, 1000]);
}

#[test]
fn list_directory_aggregates_only_sequence_extensions() {
    let tmp = temp_dir("list_directory");
    std::fs::create_dir_all(tmp.join("sub")).unwrap();
    for name in [
        "a.0001.dpx",
        "a.0002.dpx",
        "a.0003.dpx",
        "m.0001.mov",
        "m.0002.mov",
        "notes.txt",
    ] {
        std::fs::write(tmp.join(name), b"x").unwrap();
    }

    let exts: BTreeSet<String> = [".dpx".to_string()].into_iter().collect();
    let list = list_directory(&tmp, &exts).unwrap();
    let names: Vec<String> = list.iter().map(FileInfo::file_name).collect();
    assert_eq!(
        names,
        vec![
            "sub",
            "a.0001-0003.dpx",
            "m.0001.mov",
            "m.0002.mov",
            "notes.txt"
        ]
    );
    assert_eq!(list[0].kind(), FileKind::Directory);
    assert_eq!(list[1].kind(), FileKind::Sequence);

    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn list_directory_keeps_dashed_names_openable() {
    let tmp = temp_dir("list_dashed");
    std::fs::create_dir_all(&tmp).unwrap();
    for name in ["plate_2019-2021.ppm", "take_1,2.ppm", "x.0-99999999999.ppm"] {
        std::fs::write(tmp.join(name), b"x").unwrap();
    }

    let exts: BTreeSet<String> = [".ppm".to_string()].into_iter().collect();
    let list = list_directory(&tmp, &exts).unwrap();
    let names: Vec<String> = list.iter().map(FileInfo::file_name).collect();
    assert_eq!(
        names,
        vec!["plate_2019-2021.ppm", "take_1,2.ppm", "x.0-99999999999.ppm"]
    );
    for entry in &list {
        assert_eq!(entry.kind(), FileKind::File);
        assert!(entry.path().is_file(), "{}", entry.path().display());
    }

    std::fs::remove_dir_all(&tmp).ok();
}
