use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use super::args::{parse_named, parse_token, take_flag};
use super::header::{HeaderReader, HeaderWriter};
use super::plugin::{decode_options, encode_options};
use super::*;
use crate::file_info::FileInfo;
use crate::foundation::core::Size;
use crate::foundation::error::{DjvError, DjvResult};
use crate::foundation::log::Logger;
use crate::image::{Image, Pixel};

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
struct MockOptions {
    level: u32,
    mode: String,
}

struct MockPlugin {
    name: &'static str,
    extensions: &'static [&'static str],
    options: MockOptions,
}

impl MockPlugin {
    fn new(name: &'static str, extensions: &'static [&'static str]) -> Box<dyn IoPlugin> {
        Box::new(Self {
            name,
            extensions,
            options: MockOptions::default(),
        })
    }
}

struct MockReader {
    info: IoInfo,
}

impl ImageRead for MockReader {
    fn info(&self) -> &IoInfo {
        &self.info
    }

    fn read(&mut self, _request: &FrameRequest) -> DjvResult<Image> {
        Ok(Image::new(self.info.layers[0].clone()))
    }
}

impl IoPlugin for MockPlugin {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        "mock"
    }

    fn extensions(&self) -> &'static [&'static str] {
        self.extensions
    }

    fn options_json(&self) -> Value {
        encode_options(&self.options)
    }

    fn set_options_json(&mut self, value: Value) -> DjvResult<()> {
        self.options = decode_options(self.name, value)?;
        Ok(())
    }

    fn command_line(&mut self, args: &mut Vec<String>) -> DjvResult<Vec<String>> {
        let flag = format!("-{}_level", self.name.to_lowercase());
        match take_flag(self.name, args, &flag, 1)? {
            Some(v) => {
                self.options.level = parse_token(self.name, &v[0])?;
                Ok(vec!["level".to_string()])
            }
            None => Ok(Vec::new()),
        }
    }

    fn read(&self, info: &FileInfo) -> DjvResult<Box<dyn ImageRead>> {
        let mut io = IoInfo::new(crate::image::ImageInfo::new(Size::new(2, 1), Pixel::LU8));
        io.tags.set("plugin", self.name);
        io.sequence = info.sequence().clone();
        Ok(Box::new(MockReader { info: io }))
    }

    fn write(&self, info: &FileInfo, _io: &IoInfo) -> DjvResult<Box<dyn ImageWrite>> {
        Err(DjvError::unsupported(self.name, info.to_string(), "mock"))
    }
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn capture() -> (Logger, SharedBuf) {
    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    (Logger::new(tracing::Dispatch::new(subscriber)), buf)
}

fn system() -> IoSystem {
    IoSystem::with_plugins(
        Logger::silent(),
        vec![
            MockPlugin::new("Alpha", &[".img", ".alp"]),
            MockPlugin::new("Beta", &[".img", ".bet"]),
        ],
    )
}

fn strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

#[test]
fn registration_is_ordered_and_logged() {
    let (logger, buf) = capture();
    let io = IoSystem::with_plugins(
        logger,
        vec![
            MockPlugin::new("Alpha", &[".img"]),
            MockPlugin::new("Beta", &[".bet"]),
        ],
    );
    assert_eq!(io.names(), vec!["Alpha", "Beta"]);
    let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
    let alpha = text.find("plugin=\"Alpha\"").unwrap();
    let beta = text.find("plugin=\"Beta\"").unwrap();
    assert!(alpha < beta);
    assert!(text.contains("registered I/O plugin"));
}

#[test]
fn first_matching_plugin_wins() {
    let io = system();
    let reader = io.read(&FileInfo::new("shot.img")).unwrap();
    assert_eq!(reader.info().tags.get("plugin"), Some("Alpha"));
    let reader = io.read(&FileInfo::new("shot.BET")).unwrap();
    assert_eq!(reader.info().tags.get("plugin"), Some("Beta"));
}

#[test]
fn unknown_extension_is_unrecognized() {
    let io = system();
    let file = FileInfo::new("notes.txt");
    assert!(!io.can_read(&file));
    let err = io.read(&file).err().unwrap();
    assert!(matches!(err, DjvError::Unrecognized { .. }));
    assert_eq!(err.to_string(), "unrecognized file: 'notes.txt'");
}

#[test]
fn writer_errors_come_from_the_chosen_plugin() {
    let io = system();
    let info = IoInfo::new(crate::image::ImageInfo::new(Size::new(2, 2), Pixel::RgbU8));
    let err = io.write(&FileInfo::new("out.img"), &info).err().unwrap();
    assert!(matches!(err, DjvError::Unsupported { plugin: "Alpha", .. }));
}

#[test]
fn extension_sets_split_by_sequencing() {
    let io = IoSystem::new(Logger::silent());
    let seq = io.sequence_extensions();
    let movies = io.non_sequence_extensions();
    assert!(seq.contains(".dpx"));
    assert!(seq.contains(".exr"));
    assert!(movies.contains(".mov"));
    assert!(!seq.contains(".mov"));
}

#[test]
fn set_option_notifies_subscribers() {
    let mut io = system();
    let rx = io.subscribe();
    io.set_option("Beta", "level", json!(7)).unwrap();
    assert_eq!(io.option("Beta", "level"), Some(json!(7)));
    assert_eq!(io.option("Alpha", "level"), Some(json!(0)));
    assert_eq!(
        rx.try_recv().unwrap(),
        OptionChanged {
            plugin: "Beta".into(),
            option: "level".into()
        }
    );

    assert!(matches!(
        io.set_option("Beta", "missing", json!(1)),
        Err(DjvError::Option { plugin: "Beta", .. })
    ));
    assert!(io.set_option("Beta", "level", json!("high")).is_err());
    assert_eq!(io.option("Beta", "level"), Some(json!(7)));
    assert!(matches!(
        io.set_option("Gamma", "level", json!(1)),
        Err(DjvError::Validation(_))
    ));
    assert!(rx.try_recv().is_err());
}

#[test]
fn dropped_subscribers_are_forgotten() {
    let mut io = system();
    drop(io.subscribe());
    io.set_option("Alpha", "mode", json!("fast")).unwrap();
    io.set_option("Alpha", "mode", json!("slow")).unwrap();
    assert_eq!(io.option("Alpha", "mode"), Some(json!("slow")));
}

#[test]
fn settings_round_trip_and_ignore_unknown_keys() {
    let mut io = system();
    io.set_option("Alpha", "level", json!(3)).unwrap();
    let saved = io.settings();
    assert_eq!(saved["Alpha"], json!({ "level": 3, "mode": "" }));

    let mut fresh = system();
    let rx = fresh.subscribe();
    fresh
        .load_settings(&json!({
            "Alpha": { "level": 3, "bogus": true },
            "Zeta": { "level": 1 }
        }))
        .unwrap();
    assert_eq!(fresh.settings(), saved);
    let changed: Vec<_> = rx.try_iter().collect();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].plugin, "Alpha");

    assert!(fresh.load_settings(&json!([1, 2])).is_err());
}

#[test]
fn command_line_returns_unclaimed_tokens_in_order() {
    let mut io = system();
    let rest = io
        .command_line(strings(&["in.img", "-beta_level", "4", "out.img", "-alpha_level", "2"]))
        .unwrap();
    assert_eq!(rest, strings(&["in.img", "out.img"]));
    assert_eq!(io.option("Alpha", "level"), Some(json!(2)));
    assert_eq!(io.option("Beta", "level"), Some(json!(4)));

    let err = io.command_line(strings(&["-alpha_level"])).unwrap_err();
    assert_eq!(err.to_string(), "option error [Alpha]: cannot parse '-alpha_level'");
}

#[test]
fn take_flag_keeps_the_last_occurrence() {
    let mut args = strings(&["-x", "1", "keep", "-x", "2", "tail"]);
    let v = take_flag("P", &mut args, "-x", 1).unwrap();
    assert_eq!(v, Some(strings(&["2"])));
    assert_eq!(args, strings(&["keep", "tail"]));

    let mut none = strings(&["a", "b"]);
    assert_eq!(take_flag("P", &mut none, "-x", 1).unwrap(), None);
    assert_eq!(none.len(), 2);

    let mut pair = strings(&["-size", "3", "4"]);
    assert_eq!(
        take_flag("P", &mut pair, "-size", 2).unwrap(),
        Some(strings(&["3", "4"]))
    );
    assert!(pair.is_empty());
}

#[test]
fn named_and_token_parsers_report_the_token() {
    #[derive(Debug, PartialEq, serde::Deserialize)]
    #[serde(rename_all = "snake_case")]
    enum Mode {
        FilmPrint,
    }
    assert_eq!(parse_named::<Mode>("P", "film_print").unwrap(), Mode::FilmPrint);
    assert_eq!(
        parse_named::<Mode>("P", "FilmPrint").unwrap_err().to_string(),
        "option error [P]: cannot parse 'FilmPrint'"
    );
    assert_eq!(parse_token::<u8>("P", "12").unwrap(), 12);
    assert!(parse_token::<u8>("P", "300").is_err());
}

#[test]
fn header_fields_honor_byte_order() {
    for endian in [Endian::Msb, Endian::Lsb] {
        let mut w = HeaderWriter::new(32, 0xff, endian);
        w.put_u16(0, 0x1234);
        w.put_u32(2, 0xdead_beef);
        w.put_f32(6, 1.5);
        w.put_str(10, 8, "abc");
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes[31], 0xff);

        let r = HeaderReader::new(&bytes, endian);
        assert_eq!(r.u16_at(0), 0x1234);
        assert_eq!(r.u32_at(2), 0xdead_beef);
        assert_eq!(r.f32_at(6), 1.5);
        assert_eq!(r.str_at(10, 8).as_deref(), Some("abc"));
        assert_eq!(r.u32_at(30), 0);
    }
    let mut w = HeaderWriter::new(4, 0, Endian::Msb);
    w.put_u32(0, 1);
    assert_eq!(w.into_bytes(), vec![0, 0, 0, 1]);
}

#[test]
fn queue_blocks_producers_until_space() {
    let queue = Arc::new(VideoQueue::new(2));
    let producer = {
        let queue = Arc::clone(&queue);
        std::thread::spawn(move || {
            for i in 0..5 {
                if queue.push(i).is_err() {
                    return i;
                }
            }
            queue.close();
            5
        })
    };
    let mut got = Vec::new();
    while let Some(v) = queue.pop() {
        assert!(queue.len() <= queue.capacity());
        got.push(v);
    }
    assert_eq!(producer.join().unwrap(), 5);
    assert_eq!(got, vec![0, 1, 2, 3, 4]);
}

#[test]
fn closed_queue_rejects_pushes_and_drains() {
    let queue = VideoQueue::new(4);
    queue.push("a").unwrap();
    queue.push("b").unwrap();
    queue.close();
    assert!(queue.is_closed());
    assert_eq!(queue.push("c"), Err("c"));
    assert_eq!(queue.try_pop(), Some("a"));
    assert_eq!(queue.pop_timeout(Duration::from_millis(5)), Some("b"));
    assert_eq!(queue.pop(), None);

    let open: VideoQueue<u8> = VideoQueue::new(0);
    assert_eq!(open.capacity(), 1);
    assert_eq!(open.pop_timeout(Duration::from_millis(5)), None);
    open.push(1).unwrap();
    open.clear();
    assert!(open.is_empty());
}

#[test]
fn audio_extraction_remaps_channels() {
    let interleaved = [1, 2, 3, 4, 5, 6];
    assert_eq!(
        extract_audio(&interleaved, SampleLayout::Interleaved, 3, 2),
        vec![1, 2, 4, 5]
    );
    assert_eq!(
        extract_audio(&interleaved, SampleLayout::Interleaved, 2, 3),
        vec![1, 2, 0, 3, 4, 0, 5, 6, 0]
    );
    let planar = [1, 2, 3, 10, 20, 30];
    assert_eq!(
        extract_audio(&planar, SampleLayout::Planar, 2, 2),
        vec![1, 10, 2, 20, 3, 30]
    );
    assert_eq!(
        extract_audio(&planar, SampleLayout::Planar, 2, 1),
        vec![1, 2, 3]
    );
    assert!(extract_audio(&planar, SampleLayout::Planar, 0, 2).is_empty());
}

#[test]
fn audio_bytes_decode_little_endian() {
    let mut bytes = Vec::new();
    for v in [1i16, -2, 300, -400] {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    let samples =
        extract_audio_bytes(&bytes, SampleType::S16, SampleLayout::Interleaved, 2, 1).unwrap();
    assert_eq!(samples, AudioSamples::S16(vec![1, 300]));
    assert_eq!(samples.sample_type(), SampleType::S16);
    assert_eq!(samples.len(), 2);

    assert!(
        extract_audio_bytes(&bytes[..3], SampleType::S16, SampleLayout::Interleaved, 1, 1)
            .is_err()
    );
    assert_eq!(
        SampleType::from_ffmpeg("s32p"),
        Some((SampleType::S32, SampleLayout::Planar))
    );
    assert_eq!(
        SampleType::from_ffmpeg("dbl"),
        Some((SampleType::F64, SampleLayout::Interleaved))
    );
    assert_eq!(SampleType::from_ffmpeg("u8"), None);
}

#[test]
fn frame_requests_and_info_defaults() {
    let req = FrameRequest::frame(12).with_layer(1);
    assert_eq!(req.frame, Some(12));
    assert_eq!(req.layer, 1);
    let info = IoInfo::new(crate::image::ImageInfo::new(Size::new(1, 1), Pixel::LU8));
    assert_eq!(info.frame_count(), 1);
    assert!(info.layer(1).is_none());

    let seq = FileInfo::new("a.0001.img");
    assert_eq!(frame_path(&seq, Some(7)), std::path::PathBuf::from("a.0007.img"));
    let single = FileInfo::new("b.img");
    assert_eq!(frame_path(&single, Some(7)), std::path::PathBuf::from("b.img"));
}
