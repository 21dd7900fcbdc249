//! Movie containers decoded by the system `ffmpeg` binary.
//!
//! `ffprobe` reports geometry, rate, frame count and the audio stream. Frames are decoded to RGBA
//! by an `ffmpeg` child process whose output a worker thread slices into frames and pushes into a
//! bounded [`VideoQueue`]. Reading any frame other than the next one restarts the decoder at that
//! frame. Without the `media-ffmpeg` feature, opening fails with an "unsupported" error.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::file_info::{FileInfo, Sequence};
use crate::foundation::core::{Mirror, Size, Speed};
use crate::foundation::error::{DjvError, DjvResult};
use crate::image::{ImageInfo, Pixel, Tags};
use crate::io::args::{parse_token, take_flag};
use crate::io::plugin::{decode_options, encode_options};
use crate::io::{AudioInfo, ImageRead, ImageWrite, IoInfo, IoPlugin, SampleLayout, SampleType};

pub(crate) const NAME: &str = "FFmpeg";

/// FFmpeg options.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FfmpegOptions {
    /// Decoder threads (`ffmpeg -threads`).
    pub thread_count: usize,
}

impl Default for FfmpegOptions {
    fn default() -> Self {
        Self { thread_count: 4 }
    }
}

#[derive(Debug, Default)]
pub struct FfmpegPlugin {
    options: FfmpegOptions,
}

impl FfmpegPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(&self) -> &FfmpegOptions {
        &self.options
    }
}

impl IoPlugin for FfmpegPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Movie files decoded with FFmpeg"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[
            ".mov", ".mp4", ".m4v", ".avi", ".mkv", ".webm", ".mxf", ".mpg", ".mpeg", ".flv",
            ".wmv",
        ]
    }

    fn can_sequence(&self) -> bool {
        false
    }

    fn can_write(&self, _info: &FileInfo, _io: &IoInfo) -> bool {
        false
    }

    fn options_json(&self) -> Value {
        encode_options(&self.options)
    }

    fn set_options_json(&mut self, value: Value) -> DjvResult<()> {
        let options: FfmpegOptions = decode_options(NAME, value)?;
        if options.thread_count == 0 {
            return Err(DjvError::option(NAME, "0"));
        }
        self.options = options;
        Ok(())
    }

    fn command_line(&mut self, args: &mut Vec<String>) -> DjvResult<Vec<String>> {
        let mut changed = Vec::new();
        if let Some(v) = take_flag(NAME, args, "-ffmpeg_threads", 1)? {
            let n: usize = parse_token(NAME, &v[0])?;
            if n == 0 {
                return Err(DjvError::option(NAME, &v[0]));
            }
            self.options.thread_count = n;
            changed.push("thread_count".to_string());
        }
        Ok(changed)
    }

    fn read(&self, info: &FileInfo) -> DjvResult<Box<dyn ImageRead>> {
        open_reader(info, &self.options)
    }

    fn write(&self, info: &FileInfo, _io: &IoInfo) -> DjvResult<Box<dyn ImageWrite>> {
        Err(DjvError::unsupported(
            NAME,
            info.path().display().to_string(),
            "writing movies",
        ))
    }
}

/// `true` when an `ffmpeg` binary runs from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Stream facts gathered from `ffprobe`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(not(feature = "media-ffmpeg"), allow(dead_code))]
pub(crate) struct Probe {
    pub(crate) info: ImageInfo,
    pub(crate) speed: Speed,
    pub(crate) frame_count: i64,
    pub(crate) audio: Option<(AudioInfo, SampleLayout)>,
    pub(crate) tags: Tags,
}

#[cfg_attr(not(feature = "media-ffmpeg"), allow(dead_code))]
impl Probe {
    pub(crate) fn io_info(&self) -> IoInfo {
        let mut io = IoInfo::new(self.info.clone());
        io.speed = self.speed;
        io.tags = self.tags.clone();
        io.audio = self.audio.map(|(a, _)| a);
        let mut sequence = Sequence::range(0, self.frame_count - 1, 0);
        sequence.speed = self.speed;
        io.sequence = sequence;
        io
    }
}

#[derive(serde::Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    channels: Option<u16>,
    sample_rate: Option<String>,
    sample_fmt: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(serde::Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(serde::Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[cfg_attr(not(feature = "media-ffmpeg"), allow(dead_code))]
fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let mut parts = s.split('/');
    let a = parts.next()?.parse::<u32>().ok()?;
    let b = parts.next()?.parse::<u32>().ok()?;
    if a == 0 || b == 0 {
        return None;
    }
    Some((a, b))
}

fn tag_key(name: &str) -> Option<&'static str> {
    Some(match name.to_ascii_lowercase().as_str() {
        "creation_time" => Tags::TIME,
        "copyright" => Tags::COPYRIGHT,
        "comment" | "description" => Tags::DESCRIPTION,
        "artist" | "author" => Tags::CREATOR,
        "timecode" => Tags::TIMECODE,
        _ => return None,
    })
}

/// Interpret `ffprobe -print_format json -show_streams -show_format` output.
#[cfg_attr(not(feature = "media-ffmpeg"), allow(dead_code))]
pub(crate) fn parse_probe(json: &[u8], file: &str) -> DjvResult<Probe> {
    let parsed: ProbeOut = serde_json::from_slice(json)
        .map_err(|e| DjvError::open(NAME, file, format!("ffprobe json parse failed: {e}")))?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| DjvError::open(NAME, file, "no video stream found"))?;
    let (w, h) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(DjvError::open(NAME, file, "missing video size from ffprobe")),
    };

    let speed = [&video.r_frame_rate, &video.avg_frame_rate]
        .into_iter()
        .flatten()
        .find_map(|r| parse_ff_ratio(r))
        .and_then(|(n, d)| Speed::new(n, d).ok())
        .unwrap_or_default();

    let duration = video
        .duration
        .as_deref()
        .or(parsed.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|s| s.parse::<f64>().ok());
    let frame_count = video
        .nb_frames
        .as_deref()
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|&n| n > 0)
        .or_else(|| duration.map(|d| speed.secs_to_frames_floor(d + speed.frame_duration_secs() / 2.0)))
        .unwrap_or(1)
        .max(1);

    let audio = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .and_then(|s| {
            let (sample_type, layout) = SampleType::from_ffmpeg(s.sample_fmt.as_deref()?)
                .unwrap_or((SampleType::F32, SampleLayout::Interleaved));
            Some((
                AudioInfo {
                    channels: s.channels.filter(|&c| c > 0)?,
                    sample_rate: s.sample_rate.as_deref()?.parse().ok()?,
                    sample_type,
                },
                layout,
            ))
        });

    let mut tags = Tags::new();
    let format_tags = parsed.format.iter().flat_map(|f| f.tags.iter());
    for (k, v) in format_tags.chain(video.tags.iter()) {
        if let Some(key) = tag_key(k) {
            tags.set(key, v.as_str());
        }
    }

    let mut info = ImageInfo::new(Size::new(w, h), Pixel::RgbaU8);
    info.mirror = Mirror::new(false, true);
    Ok(Probe {
        info,
        speed,
        frame_count,
        audio,
        tags,
    })
}

#[cfg(feature = "media-ffmpeg")]
fn open_reader(info: &FileInfo, options: &FfmpegOptions) -> DjvResult<Box<dyn ImageRead>> {
    Ok(Box::new(decode::FfmpegReader::open(info, options)?))
}

#[cfg(not(feature = "media-ffmpeg"))]
fn open_reader(info: &FileInfo, _options: &FfmpegOptions) -> DjvResult<Box<dyn ImageRead>> {
    Err(DjvError::unsupported(
        NAME,
        info.path().display().to_string(),
        "movie decoding requires the 'media-ffmpeg' feature",
    ))
}

#[cfg(feature = "media-ffmpeg")]
mod decode {
    use std::io::Read;
    use std::path::{Path, PathBuf};
    use std::process::{Child, Command, Stdio};
    use std::sync::Arc;
    use std::thread::JoinHandle;

    use anyhow::Context;

    use super::{FfmpegOptions, NAME, Probe, is_ffmpeg_on_path, parse_probe};
    use crate::file_info::FileInfo;
    use crate::foundation::core::Speed;
    use crate::foundation::error::{DjvError, DjvResult};
    use crate::image::{Image, ImageInfo, proxy_scale};
    use crate::io::{
        AudioSamples, FrameRequest, ImageRead, IoInfo, VideoQueue, extract_audio_bytes,
    };

    /// Decoded frames buffered ahead of the reader.
    const QUEUE_FRAMES: usize = 8;

    type Decoded = DjvResult<(i64, Vec<u8>)>;

    /// One running `ffmpeg` decode, starting at a given frame.
    struct FrameStream {
        queue: Arc<VideoQueue<Decoded>>,
        next: i64,
        child: Child,
        worker: Option<JoinHandle<()>>,
    }

    impl FrameStream {
        fn start(
            path: &Path,
            name: &str,
            info: &ImageInfo,
            speed: Speed,
            start: i64,
            threads: usize,
        ) -> DjvResult<Self> {
            let mut child = Command::new("ffmpeg")
                .args(["-v", "error", "-threads", &threads.to_string()])
                .args(["-ss", &format!("{:.9}", speed.frames_to_secs(start))])
                .arg("-i")
                .arg(path)
                .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|e| DjvError::open(NAME, name, format!("failed to spawn ffmpeg: {e}")))?;
            let mut stdout = child
                .stdout
                .take()
                .ok_or_else(|| DjvError::open(NAME, name, "failed to open ffmpeg stdout"))?;

            let queue = Arc::new(VideoQueue::new(QUEUE_FRAMES));
            let frame_bytes = info.byte_count();
            let producer = Arc::clone(&queue);
            let file = name.to_string();
            let worker = std::thread::Builder::new()
                .name("djv-ffmpeg-decode".into())
                .spawn(move || {
                    let mut frame = start;
                    loop {
                        let mut buf = vec![0u8; frame_bytes];
                        match stdout.read_exact(&mut buf) {
                            Ok(()) => {
                                if producer.push(Ok((frame, buf))).is_err() {
                                    break;
                                }
                                frame += 1;
                            }
                            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                            Err(e) => {
                                let _ = producer.push(Err(DjvError::read(NAME, &file, e.to_string())));
                                break;
                            }
                        }
                    }
                    producer.close();
                })
                .context("failed to spawn ffmpeg decode thread")?;

            Ok(Self {
                queue,
                next: start,
                child,
                worker: Some(worker),
            })
        }
    }

    impl Drop for FrameStream {
        fn drop(&mut self) {
            self.queue.close();
            let _ = self.child.kill();
            let _ = self.child.wait();
            if let Some(worker) = self.worker.take() {
                let _ = worker.join();
            }
        }
    }

    pub(super) struct FfmpegReader {
        path: PathBuf,
        name: String,
        probe: Probe,
        info: IoInfo,
        threads: usize,
        stream: Option<FrameStream>,
    }

    impl FfmpegReader {
        pub(super) fn open(file: &FileInfo, options: &FfmpegOptions) -> DjvResult<Self> {
            let path = file.path();
            let name = path.display().to_string();
            if !is_ffmpeg_on_path() {
                return Err(DjvError::open(NAME, &name, "ffmpeg was not found on PATH"));
            }
            let out = Command::new("ffprobe")
                .args([
                    "-v",
                    "error",
                    "-print_format",
                    "json",
                    "-show_streams",
                    "-show_format",
                ])
                .arg(&path)
                .output()
                .map_err(|e| DjvError::open(NAME, &name, format!("failed to run ffprobe: {e}")))?;
            if !out.status.success() {
                return Err(DjvError::open(
                    NAME,
                    &name,
                    format!("ffprobe failed: {}", String::from_utf8_lossy(&out.stderr).trim()),
                ));
            }
            let probe = parse_probe(&out.stdout, &name)?;
            tracing::debug!(
                file = %name,
                w = probe.info.size.w,
                h = probe.info.size.h,
                frames = probe.frame_count,
                fps = probe.speed.as_f64(),
                audio = probe.audio.is_some(),
                "ffprobe"
            );
            Ok(Self {
                info: probe.io_info(),
                path,
                name,
                probe,
                threads: options.thread_count,
                stream: None,
            })
        }
    }

    impl ImageRead for FfmpegReader {
        fn info(&self) -> &IoInfo {
            &self.info
        }

        fn read(&mut self, request: &FrameRequest) -> DjvResult<Image> {
            let frame = request.frame.unwrap_or(0);
            if !(0..self.probe.frame_count).contains(&frame) {
                return Err(DjvError::read(
                    NAME,
                    &self.name,
                    format!("frame {frame} outside 0..{}", self.probe.frame_count),
                ));
            }
            if self.stream.as_ref().is_none_or(|s| s.next != frame) {
                tracing::debug!(file = %self.name, frame, "starting decoder");
                self.stream = None;
                self.stream = Some(FrameStream::start(
                    &self.path,
                    &self.name,
                    &self.probe.info,
                    self.probe.speed,
                    frame,
                    self.threads,
                )?);
            }
            let Some(stream) = self.stream.as_mut() else {
                return Err(DjvError::read(NAME, &self.name, "decoder is not running"));
            };
            loop {
                match stream.queue.pop() {
                    Some(Ok((n, data))) => {
                        stream.next = n + 1;
                        if n == frame {
                            let image = Image::from_data(self.probe.info.clone(), data)?;
                            return Ok(proxy_scale(&image, request.proxy));
                        }
                    }
                    Some(Err(e)) => {
                        self.stream = None;
                        return Err(e);
                    }
                    None => {
                        self.stream = None;
                        return Err(DjvError::read(
                            NAME,
                            &self.name,
                            format!("decoder ended before frame {frame}"),
                        ));
                    }
                }
            }
        }

        fn read_audio(&mut self, channels: usize) -> DjvResult<Option<AudioSamples>> {
            let Some((audio, _)) = self.probe.audio else {
                return Ok(None);
            };
            // Raw PCM output is always interleaved, whatever the stream's native layout.
            let raw = audio.sample_type.ffmpeg_raw_format();
            let out = Command::new("ffmpeg")
                .args(["-v", "error", "-i"])
                .arg(&self.path)
                .args(["-vn", "-f", raw, "-acodec", &format!("pcm_{raw}"), "pipe:1"])
                .output()
                .map_err(|e| {
                    DjvError::read(NAME, &self.name, format!("failed to run ffmpeg for audio: {e}"))
                })?;
            if !out.status.success() {
                return Err(DjvError::read(
                    NAME,
                    &self.name,
                    format!(
                        "ffmpeg audio decode failed: {}",
                        String::from_utf8_lossy(&out.stderr).trim()
                    ),
                ));
            }
            extract_audio_bytes(
                &out.stdout,
                audio.sample_type,
                crate::io::SampleLayout::Interleaved,
                usize::from(audio.channels),
                channels,
            )
            .map(Some)
        }

        fn close(&mut self) {
            self.stream = None;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/formats/ffmpeg.rs"]
mod tests;
