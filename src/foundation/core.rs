use crate::foundation::error::{DjvError, DjvResult};

/// Playback speed as a rational frames-per-second value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Speed {
    /// Numerator.
    pub num: u32,
    /// Denominator, always > 0.
    pub den: u32,
}

impl Default for Speed {
    fn default() -> Self {
        Self { num: 24, den: 1 }
    }
}

impl Speed {
    /// Create a speed, rejecting zero numerator or denominator.
    pub fn new(num: u32, den: u32) -> DjvResult<Self> {
        if den == 0 {
            return Err(DjvError::validation("Speed den must be > 0"));
        }
        if num == 0 {
            return Err(DjvError::validation("Speed num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Closest rational speed for a floating-point frame rate.
    ///
    /// NTSC rates (23.976, 29.97, 59.94) snap to their `x000/1001` forms.
    pub fn from_f64(fps: f64) -> DjvResult<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(DjvError::validation(format!("invalid frame rate {fps}")));
        }
        for base in [24_000u32, 30_000, 60_000] {
            let ntsc = f64::from(base) / 1001.0;
            if (fps - ntsc).abs() < 0.005 {
                return Self::new(base, 1001);
            }
        }
        if (fps - fps.round()).abs() < 1e-6 {
            return Self::new(fps.round() as u32, 1);
        }
        Self::new((fps * 1000.0).round() as u32, 1000)
    }

    /// Frames per second as `f64`.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    /// Convert a frame count to seconds.
    pub fn frames_to_secs(self, frames: i64) -> f64 {
        (frames as f64) * self.frame_duration_secs()
    }

    /// Convert seconds to a frame count, rounding down.
    pub fn secs_to_frames_floor(self, secs: f64) -> i64 {
        (secs * self.as_f64()).floor().max(0.0) as i64
    }
}

/// Half-open frame range `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameRange {
    /// First frame (inclusive).
    pub start: i64,
    /// End frame (exclusive).
    pub end: i64,
}

impl FrameRange {
    /// Create a range, rejecting `start > end`.
    pub fn new(start: i64, end: i64) -> DjvResult<Self> {
        if start > end {
            return Err(DjvError::validation("FrameRange start must be <= end"));
        }
        Ok(Self { start, end })
    }

    /// Number of frames in the range.
    pub fn len_frames(self) -> u64 {
        (self.end - self.start).max(0) as u64
    }

    /// `true` when the range holds no frames.
    pub fn is_empty(self) -> bool {
        self.start == self.end
    }

    /// `true` when `f` lies inside the range.
    pub fn contains(self, f: i64) -> bool {
        self.start <= f && f < self.end
    }

    /// Clamp `f` into the range (returns `start` for empty ranges).
    pub fn clamp(self, f: i64) -> i64 {
        if self.is_empty() {
            return self.start;
        }
        f.clamp(self.start, self.end - 1)
    }
}

/// Image dimensions in pixels.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Size {
    /// Width in pixels.
    pub w: u32,
    /// Height in pixels.
    pub h: u32,
}

impl Size {
    /// Construct a size.
    pub fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    /// `true` when either dimension is zero.
    pub fn is_empty(self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Pixel count.
    pub fn area(self) -> usize {
        self.w as usize * self.h as usize
    }
}

/// Mirror flags describing how stored rows/columns map to display orientation.
///
/// Rows are kept in file order; `y` means the rows run top-down and must be flipped for a
/// bottom-up display origin, `x` means columns run right-to-left.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Mirror {
    /// Horizontal mirror.
    pub x: bool,
    /// Vertical mirror.
    pub y: bool,
}

impl Mirror {
    /// Construct mirror flags.
    pub fn new(x: bool, y: bool) -> Self {
        Self { x, y }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
