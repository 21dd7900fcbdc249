use std::sync::atomic::AtomicUsize;

use super::*;
use crate::file_info::Sequence;
use crate::foundation::core::Size;
use crate::image::{ImageInfo, Pixel};

struct CountingReader {
    info: IoInfo,
    reads: Arc<AtomicUsize>,
    fail_at: Option<i64>,
}

impl CountingReader {
    fn boxed(frames: i64, reads: &Arc<AtomicUsize>) -> Box<dyn ImageRead> {
        let mut info = IoInfo::new(ImageInfo::new(Size::new(4, 4), Pixel::LU8));
        info.sequence = Sequence::range(1, frames, 0);
        Box::new(Self {
            info,
            reads: Arc::clone(reads),
            fail_at: None,
        })
    }
}

impl ImageRead for CountingReader {
    fn info(&self) -> &IoInfo {
        &self.info
    }

    fn read(&mut self, request: &FrameRequest) -> DjvResult<Image> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let frame = request.frame.unwrap_or(0);
        if Some(frame) == self.fail_at {
            return Err(DjvError::read("Mock", "mock", format!("frame {frame}")));
        }
        let size = request.proxy.scale_size(self.info.layers[0].size);
        let mut image = Image::new(ImageInfo::new(size, Pixel::LU8));
        image.data_mut()[0] = frame as u8;
        Ok(image)
    }
}

fn timeline(n: i64) -> Timeline {
    Timeline::new((1..=n).collect(), Speed::new(24, 1).unwrap())
}

#[test]
fn forward_repeat_wraps_to_the_in_point() {
    let mut t = timeline(3);
    assert_eq!(t.tick(), None);
    t.set_state(PlaybackState::Forward);
    let got: Vec<_> = (0..5).map(|_| t.tick().unwrap()).collect();
    assert_eq!(got, vec![2, 3, 1, 2, 3]);
}

#[test]
fn once_stops_at_the_end_and_restarts_on_play() {
    let mut t = timeline(3);
    t.set_loop_mode(LoopMode::Once);
    t.set_state(PlaybackState::Forward);
    assert_eq!(t.tick(), Some(2));
    assert_eq!(t.tick(), Some(3));
    assert_eq!(t.tick(), None);
    assert_eq!(t.state(), PlaybackState::Stop);
    assert_eq!(t.frame(), 3);

    t.set_state(PlaybackState::Forward);
    assert_eq!(t.frame(), 1);

    t.set_state(PlaybackState::Reverse);
    assert_eq!(t.frame(), 3);
    assert_eq!(t.tick(), Some(2));
}

#[test]
fn ping_pong_bounces_between_in_and_out() {
    let mut t = timeline(6);
    t.set_in_out(1, 3).unwrap();
    assert_eq!(t.position(), 1);
    t.set_loop_mode(LoopMode::PingPong);
    t.set_state(PlaybackState::Forward);
    let got: Vec<_> = (0..6).map(|_| t.tick().unwrap()).collect();
    assert_eq!(got, vec![3, 4, 3, 2, 3, 4]);
    assert_eq!(t.state(), PlaybackState::Forward);
}

#[test]
fn reverse_repeat_wraps_to_the_out_point() {
    let mut t = timeline(3);
    t.set_state(PlaybackState::Reverse);
    assert_eq!(t.tick(), Some(3));
    assert_eq!(t.tick(), Some(2));
}

#[test]
fn seeking_and_in_out_validation() {
    let mut t = Timeline::new(vec![10, 20, 30, 40], Speed::new(25, 1).unwrap());
    t.seek_frame(30).unwrap();
    assert_eq!(t.position(), 2);
    assert!(t.seek_frame(35).is_err());
    assert!(t.set_in_out(2, 1).is_err());
    assert!(t.set_in_out(0, 4).is_err());
    t.set_in_out(0, 1).unwrap();
    assert_eq!(t.frame(), 20);
    t.seek(99);
    assert_eq!(t.position(), 1);
    t.reset_in_out();
    assert_eq!(t.in_out(), (0, 3));
    assert!((t.frame_duration().as_secs_f64() - 0.04).abs() < 1e-9);
}

#[test]
fn empty_sequences_play_a_single_frame() {
    let info = IoInfo::new(ImageInfo::new(Size::new(1, 1), Pixel::LU8));
    let mut t = Timeline::from_info(&info);
    assert_eq!(t.len(), 1);
    assert_eq!(t.frames(), &[0]);
    t.set_state(PlaybackState::Forward);
    assert_eq!(t.tick(), Some(0));
}

#[test]
fn cached_reader_decodes_each_frame_once() {
    let reads = Arc::new(AtomicUsize::new(0));
    let cache = Arc::new(FileCache::with_max_bytes(1 << 20, Logger::silent()));
    let window = WindowId::next();
    let mut reader = CachedReader::new(CountingReader::boxed(5, &reads), Arc::clone(&cache), window);

    assert_eq!(reader.frame(2).unwrap().data()[0], 2);
    assert_eq!(reader.frame(2).unwrap().data()[0], 2);
    assert_eq!(reads.load(Ordering::SeqCst), 1);
    assert!(cache.has_item(&FileCacheKey::new(window, 2)));

    reader.set_proxy(Proxy::P1);
    assert!(cache.frames(window).is_empty());
    assert_eq!(reader.frame(2).unwrap().size(), Size::new(2, 2));
    assert_eq!(reads.load(Ordering::SeqCst), 2);

    reader.close();
    assert!(cache.is_empty());
}

#[test]
fn worker_delivers_frames_in_order_into_the_cache() {
    let reads = Arc::new(AtomicUsize::new(0));
    let cache = Arc::new(FileCache::with_max_bytes(1 << 20, Logger::silent()));
    let window = WindowId::next();
    let reader = CachedReader::new(CountingReader::boxed(8, &reads), Arc::clone(&cache), window);
    let frames: Vec<i64> = (1..=8).collect();
    let (worker, target) = reader.into_worker(frames.clone(), 2, Logger::silent()).unwrap();

    let mut seen = Vec::new();
    while let Some(item) = worker.wait(Duration::from_secs(5)) {
        let (frame, image) = item.unwrap();
        assert_eq!(image.data()[0], frame as u8);
        target
            .cache()
            .add_item(FileCacheKey::new(target.window(), frame), image);
        seen.push(frame);
    }
    assert_eq!(seen, frames);
    assert!(worker.is_finished());
    assert_eq!(cache.frames(window), frames);

    let mut reader = target.into_reader(worker.join().unwrap());
    reader.frame(3).unwrap();
    assert_eq!(reads.load(Ordering::SeqCst), 8);
}

#[test]
fn drain_stops_at_the_first_decode_error() {
    let reads = Arc::new(AtomicUsize::new(0));
    let mut info = IoInfo::new(ImageInfo::new(Size::new(4, 4), Pixel::LU8));
    info.sequence = Sequence::range(1, 5, 0);
    let reader: Box<dyn ImageRead> = Box::new(CountingReader {
        info,
        reads: Arc::clone(&reads),
        fail_at: Some(3),
    });
    let cache = Arc::new(FileCache::with_max_bytes(1 << 20, Logger::silent()));
    let window = WindowId::next();
    let (worker, target) = CachedReader::new(reader, Arc::clone(&cache), window)
        .into_worker((1..=5).collect(), 8, Logger::silent())
        .unwrap();

    while !worker.is_finished() && worker.queue.len() < 3 {
        std::thread::sleep(Duration::from_millis(1));
    }
    let err = target.drain(&worker).unwrap_err();
    assert!(matches!(err, DjvError::Read { .. }));
    assert_eq!(cache.frames(window), vec![1, 2]);
    assert_eq!(reads.load(Ordering::SeqCst), 3);
}

#[test]
fn cancel_stops_the_worker_cooperatively() {
    let reads = Arc::new(AtomicUsize::new(0));
    let worker = ReadWorker::spawn(
        CountingReader::boxed(1000, &reads),
        (1..=1000).collect(),
        FrameRequest::default(),
        1,
        Logger::silent(),
    )
    .unwrap();
    assert!(worker.wait(Duration::from_secs(5)).is_some());
    worker.cancel();
    assert!(worker.is_cancelled());
    let reader = worker.join().unwrap();
    assert!(reads.load(Ordering::SeqCst) < 1000);
    assert_eq!(reader.info().frame_count(), 1000);
}
