//! Frame stepping and cache-backed reading for a viewer front-end.
//!
//! A [`Timeline`] decides which frame comes next. A [`CachedReader`] serves frames from the
//! shared [`FileCache`], decoding on a miss. A [`ReadWorker`] decodes ahead on its own thread and
//! hands frames over through a [`VideoQueue`] that the owner polls from its timer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;

use crate::cache::{FileCache, FileCacheKey, WindowId};
use crate::foundation::core::Speed;
use crate::foundation::error::{DjvError, DjvResult};
use crate::foundation::log::Logger;
use crate::image::{Image, Proxy};
use crate::io::{FrameRequest, ImageRead, IoInfo, VideoQueue};

/// Transport state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Stop,
    Forward,
    Reverse,
}

/// What happens at the in/out points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// Stop at the end.
    Once,
    /// Wrap to the other end.
    #[default]
    Repeat,
    /// Reverse direction.
    PingPong,
}

/// Ordered frame list with a playhead and in/out points.
///
/// Positions are indices into the frame list; [`Timeline::frame`] maps them to frame numbers.
#[derive(Clone, Debug, PartialEq)]
pub struct Timeline {
    frames: Vec<i64>,
    speed: Speed,
    current: usize,
    in_point: usize,
    out_point: usize,
    state: PlaybackState,
    loop_mode: LoopMode,
}

impl Timeline {
    /// Timeline over `frames`; an empty list becomes the single frame 0.
    pub fn new(frames: Vec<i64>, speed: Speed) -> Self {
        let frames = if frames.is_empty() { vec![0] } else { frames };
        let out_point = frames.len() - 1;
        Self {
            frames,
            speed,
            current: 0,
            in_point: 0,
            out_point,
            state: PlaybackState::Stop,
            loop_mode: LoopMode::default(),
        }
    }

    /// Timeline over every frame of an open file.
    pub fn from_info(info: &IoInfo) -> Self {
        Self::new(info.sequence.frames.clone(), info.speed)
    }

    pub fn frames(&self) -> &[i64] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always `false`: a timeline holds at least one frame.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    /// Wall-clock time one frame stays on screen.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.speed.frame_duration_secs())
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Start or stop playback. Playing forward from the out point (or in reverse from the in
    /// point) with [`LoopMode::Once`] restarts from the opposite end.
    pub fn set_state(&mut self, state: PlaybackState) {
        if self.loop_mode == LoopMode::Once {
            match state {
                PlaybackState::Forward if self.current == self.out_point => {
                    self.current = self.in_point
                }
                PlaybackState::Reverse if self.current == self.in_point => {
                    self.current = self.out_point
                }
                _ => {}
            }
        }
        self.state = state;
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
    }

    /// Playhead index.
    pub fn position(&self) -> usize {
        self.current
    }

    /// Frame number under the playhead.
    pub fn frame(&self) -> i64 {
        self.frames[self.current]
    }

    /// Move the playhead, clamped to the in/out range.
    pub fn seek(&mut self, position: usize) {
        self.current = position.clamp(self.in_point, self.out_point);
    }

    /// Move the playhead to the first position showing `frame`.
    pub fn seek_frame(&mut self, frame: i64) -> DjvResult<()> {
        let position = self
            .frames
            .iter()
            .position(|&f| f == frame)
            .ok_or_else(|| DjvError::validation(format!("frame {frame} is not in the timeline")))?;
        self.seek(position);
        Ok(())
    }

    pub fn in_out(&self) -> (usize, usize) {
        (self.in_point, self.out_point)
    }

    /// Restrict playback to `in_point..=out_point` (positions).
    pub fn set_in_out(&mut self, in_point: usize, out_point: usize) -> DjvResult<()> {
        if in_point > out_point || out_point >= self.frames.len() {
            return Err(DjvError::validation(format!(
                "in/out {in_point}..={out_point} outside 0..{}",
                self.frames.len()
            )));
        }
        self.in_point = in_point;
        self.out_point = out_point;
        self.seek(self.current);
        Ok(())
    }

    pub fn reset_in_out(&mut self) {
        self.in_point = 0;
        self.out_point = self.frames.len() - 1;
    }

    /// Advance one frame in the current direction.
    ///
    /// Returns the new frame number, or `None` when stopped (including stopping at the end with
    /// [`LoopMode::Once`]).
    pub fn tick(&mut self) -> Option<i64> {
        match self.state {
            PlaybackState::Stop => return None,
            PlaybackState::Forward => {
                if self.current < self.out_point {
                    self.current += 1;
                } else {
                    match self.loop_mode {
                        LoopMode::Once => {
                            self.state = PlaybackState::Stop;
                            return None;
                        }
                        LoopMode::Repeat => self.current = self.in_point,
                        LoopMode::PingPong => {
                            self.state = PlaybackState::Reverse;
                            self.current = self.current.saturating_sub(1).max(self.in_point);
                        }
                    }
                }
            }
            PlaybackState::Reverse => {
                if self.current > self.in_point {
                    self.current -= 1;
                } else {
                    match self.loop_mode {
                        LoopMode::Once => {
                            self.state = PlaybackState::Stop;
                            return None;
                        }
                        LoopMode::Repeat => self.current = self.out_point,
                        LoopMode::PingPong => {
                            self.state = PlaybackState::Forward;
                            self.current = (self.current + 1).min(self.out_point);
                        }
                    }
                }
            }
        }
        Some(self.frame())
    }
}

/// Reader whose frames go through the shared cache.
pub struct CachedReader {
    reader: Box<dyn ImageRead>,
    cache: Arc<FileCache>,
    window: WindowId,
    layer: usize,
    proxy: Proxy,
}

impl std::fmt::Debug for CachedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedReader")
            .field("window", &self.window)
            .field("layer", &self.layer)
            .field("proxy", &self.proxy)
            .finish()
    }
}

impl CachedReader {
    pub fn new(reader: Box<dyn ImageRead>, cache: Arc<FileCache>, window: WindowId) -> Self {
        Self {
            reader,
            cache,
            window,
            layer: 0,
            proxy: Proxy::None,
        }
    }

    pub fn info(&self) -> &IoInfo {
        self.reader.info()
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn proxy(&self) -> Proxy {
        self.proxy
    }

    /// Change the decode resolution; frames cached at the old one are dropped.
    pub fn set_proxy(&mut self, proxy: Proxy) {
        if proxy != self.proxy {
            self.proxy = proxy;
            self.cache.clear_items(self.window);
        }
    }

    /// Change the decoded layer; frames cached for the old one are dropped.
    pub fn set_layer(&mut self, layer: usize) {
        if layer != self.layer {
            self.layer = layer;
            self.cache.clear_items(self.window);
        }
    }

    fn request(&self, frame: i64) -> FrameRequest {
        FrameRequest::frame(frame)
            .with_layer(self.layer)
            .with_proxy(self.proxy)
    }

    /// Frame `frame`, from the cache or freshly decoded and inserted.
    pub fn frame(&mut self, frame: i64) -> DjvResult<Image> {
        let key = FileCacheKey::new(self.window, frame);
        if let Some(image) = self.cache.item(&key) {
            return Ok(image);
        }
        let image = self.reader.read(&self.request(frame))?;
        self.cache.add_item(key, image.clone());
        Ok(image)
    }

    /// Move decoding of `frames` onto a worker thread.
    ///
    /// The returned worker owns the reader until [`ReadWorker::join`] hands it back.
    pub fn into_worker(
        self,
        frames: Vec<i64>,
        capacity: usize,
        logger: Logger,
    ) -> DjvResult<(ReadWorker, CacheTarget)> {
        let template = self.request(0);
        let target = CacheTarget {
            cache: self.cache,
            window: self.window,
            layer: self.layer,
            proxy: self.proxy,
        };
        let worker = ReadWorker::spawn(self.reader, frames, template, capacity, logger)?;
        Ok((worker, target))
    }

    /// Close the file and drop its cached frames.
    pub fn close(mut self) {
        self.reader.close();
        self.cache.clear_items(self.window);
    }
}

/// Where a [`ReadWorker`]'s frames belong; turns back into a [`CachedReader`] once the worker
/// returns its reader.
#[derive(Debug)]
pub struct CacheTarget {
    cache: Arc<FileCache>,
    window: WindowId,
    layer: usize,
    proxy: Proxy,
}

impl CacheTarget {
    pub fn cache(&self) -> &Arc<FileCache> {
        &self.cache
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    /// Move every frame the worker has finished into the cache without blocking.
    ///
    /// Returns how many frames were inserted; a decode error is returned once every frame queued
    /// before it has been inserted.
    pub fn drain(&self, worker: &ReadWorker) -> DjvResult<usize> {
        let mut count = 0;
        while let Some(item) = worker.poll() {
            let (frame, image) = item?;
            self.cache
                .add_item(FileCacheKey::new(self.window, frame), image);
            count += 1;
        }
        Ok(count)
    }

    pub fn into_reader(self, reader: Box<dyn ImageRead>) -> CachedReader {
        CachedReader {
            reader,
            cache: self.cache,
            window: self.window,
            layer: self.layer,
            proxy: self.proxy,
        }
    }
}

type Decoded = DjvResult<(i64, Image)>;

/// Decodes a list of frames in order on a dedicated thread.
///
/// Frames arrive in list order. [`ReadWorker::cancel`] is cooperative: the frame being decoded
/// finishes, then the thread stops.
pub struct ReadWorker {
    queue: Arc<VideoQueue<Decoded>>,
    cancelled: Arc<AtomicBool>,
    handle: Option<JoinHandle<Box<dyn ImageRead>>>,
}

impl std::fmt::Debug for ReadWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadWorker")
            .field("queued", &self.queue.len())
            .field("cancelled", &self.cancelled.load(Ordering::Relaxed))
            .finish()
    }
}

impl ReadWorker {
    /// Start decoding `frames` with `template`'s layer and proxy, buffering at most `capacity`
    /// decoded frames.
    pub fn spawn(
        mut reader: Box<dyn ImageRead>,
        frames: Vec<i64>,
        template: FrameRequest,
        capacity: usize,
        logger: Logger,
    ) -> DjvResult<Self> {
        let queue = Arc::new(VideoQueue::new(capacity));
        let cancelled = Arc::new(AtomicBool::new(false));
        let producer = Arc::clone(&queue);
        let stop = Arc::clone(&cancelled);

        let handle = std::thread::Builder::new()
            .name("djv-read-worker".into())
            .spawn(move || {
                for frame in frames {
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    let request = FrameRequest {
                        frame: Some(frame),
                        ..template
                    };
                    let item = reader.read(&request).map(|image| (frame, image));
                    let failed = item.is_err();
                    if let Err(e) = &item {
                        logger.scope(|| tracing::warn!(frame, error = %e, "frame decode failed"));
                    }
                    if producer.push(item).is_err() || failed {
                        break;
                    }
                }
                producer.close();
                reader
            })
            .context("failed to spawn read worker thread")?;

        Ok(Self {
            queue,
            cancelled,
            handle: Some(handle),
        })
    }

    /// Next decoded frame, if one is ready.
    pub fn poll(&self) -> Option<Decoded> {
        self.queue.try_pop()
    }

    /// Next decoded frame, waiting up to `timeout`. `None` on timeout or once every frame has
    /// been delivered.
    pub fn wait(&self, timeout: Duration) -> Option<Decoded> {
        self.queue.pop_timeout(timeout)
    }

    /// Ask the thread to stop after the frame in flight; queued frames are discarded.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.queue.close();
        self.queue.clear();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `true` once the thread has stopped producing and every frame has been taken.
    pub fn is_finished(&self) -> bool {
        self.queue.is_closed() && self.queue.is_empty()
    }

    /// Stop the thread as [`ReadWorker::cancel`] does, wait for it and take the reader back.
    pub fn join(mut self) -> DjvResult<Box<dyn ImageRead>> {
        self.cancel();
        let handle = self
            .handle
            .take()
            .ok_or_else(|| DjvError::validation("read worker already joined"))?;
        handle
            .join()
            .map_err(|_| DjvError::validation("read worker thread panicked"))
    }
}

impl Drop for ReadWorker {
    fn drop(&mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/playback.rs"]
mod tests;
