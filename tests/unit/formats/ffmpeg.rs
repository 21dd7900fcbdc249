use serde_json::json;

use super::*;

fn probe_json() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "streams": [
            {
                "codec_type": "audio",
                "channels": 6,
                "sample_rate": "48000",
                "sample_fmt": "fltp"
            },
            {
                "codec_type": "video",
                "width": 1920,
                "height": 1080,
                "r_frame_rate": "24000/1001",
                "avg_frame_rate": "24000/1001",
                "nb_frames": "240",
                "tags": { "timecode": "01:00:00:00" }
            }
        ],
        "format": {
            "duration": "10.010000",
            "tags": { "creation_time": "2024-05-01T10:00:00Z", "encoder": "Lavf" }
        }
    }))
    .unwrap()
}

#[test]
fn probe_reads_geometry_rate_frames_audio_and_tags() {
    let probe = parse_probe(&probe_json(), "clip.mov").unwrap();
    assert_eq!(probe.info.size, Size::new(1920, 1080));
    assert_eq!(probe.info.pixel, Pixel::RgbaU8);
    assert_eq!(probe.info.mirror, Mirror::new(false, true));
    assert_eq!(probe.speed, Speed::new(24000, 1001).unwrap());
    assert_eq!(probe.frame_count, 240);
    let (audio, layout) = probe.audio.unwrap();
    assert_eq!(audio.channels, 6);
    assert_eq!(audio.sample_rate, 48000);
    assert_eq!(audio.sample_type, SampleType::F32);
    assert_eq!(layout, SampleLayout::Planar);
    assert_eq!(probe.tags.get(Tags::TIME), Some("2024-05-01T10:00:00Z"));
    assert_eq!(probe.tags.get(Tags::TIMECODE), Some("01:00:00:00"));
    assert_eq!(probe.tags.len(), 2);

    let io = probe.io_info();
    assert_eq!(io.frame_count(), 240);
    assert_eq!(io.sequence.frames.first(), Some(&0));
    assert_eq!(io.sequence.frames.last(), Some(&239));
    assert_eq!(io.speed, probe.speed);
    assert!(io.audio.is_some());
}

#[test]
fn frame_count_falls_back_to_duration() {
    let json = serde_json::to_vec(&json!({
        "streams": [{ "codec_type": "video", "width": 64, "height": 32, "r_frame_rate": "0/0", "avg_frame_rate": "25/1" }],
        "format": { "duration": "2.0" }
    }))
    .unwrap();
    let probe = parse_probe(&json, "clip.mp4").unwrap();
    assert_eq!(probe.speed, Speed::new(25, 1).unwrap());
    assert_eq!(probe.frame_count, 50);
    assert!(probe.audio.is_none());
}

#[test]
fn probe_without_video_fails_to_open() {
    let json = br#"{ "streams": [{ "codec_type": "audio", "channels": 2 }] }"#;
    assert!(matches!(
        parse_probe(json, "song.mkv"),
        Err(DjvError::Open { plugin: "FFmpeg", .. })
    ));
    assert!(parse_probe(b"not json", "x.mov").is_err());
}

#[test]
fn movies_do_not_aggregate_or_write() {
    let plugin = FfmpegPlugin::new();
    assert!(!plugin.can_sequence());
    let file = FileInfo::new("shot.0001.mov");
    assert!(plugin.can_read(&file));
    assert!(!plugin.can_write(&file, &IoInfo::new(ImageInfo::new(Size::new(2, 2), Pixel::RgbaU8))));
}

#[test]
fn thread_option_is_validated() {
    let mut plugin = FfmpegPlugin::new();
    assert_eq!(plugin.options_json(), json!({ "thread_count": 4 }));
    let mut args: Vec<String> = vec!["-ffmpeg_threads".into(), "2".into()];
    assert_eq!(plugin.command_line(&mut args).unwrap(), vec!["thread_count"]);
    assert_eq!(plugin.options().thread_count, 2);

    let mut zero: Vec<String> = vec!["-ffmpeg_threads".into(), "0".into()];
    assert!(plugin.command_line(&mut zero).is_err());
    assert!(plugin.set_options_json(json!({ "thread_count": 0 })).is_err());
    assert_eq!(plugin.options().thread_count, 2);
}

#[cfg(not(feature = "media-ffmpeg"))]
#[test]
fn opening_without_the_feature_is_unsupported() {
    let plugin = FfmpegPlugin::new();
    let err = plugin.read(&FileInfo::new("clip.mov")).err().unwrap();
    assert!(matches!(err, DjvError::Unsupported { plugin: "FFmpeg", .. }));
}
