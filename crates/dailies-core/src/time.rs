//! Time representation for frame presentation.
//!
//! Timeline time (the point in show/program time at which a frame should
//! be visible) is an integer microsecond count so that period-multiple
//! quantization during refresh phase locking is exact. Frame rates stay
//! rational to avoid floating-point accumulation errors.

use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::time::Duration;

/// A point in timeline (show/program) time, counted in microseconds.
///
/// Not wall-clock time: a playhead maps wall-clock instants onto timeline
/// time according to its play state and velocity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TimelineTime(i64);

impl TimelineTime {
    /// Zero timeline time.
    pub const ZERO: Self = Self(0);

    /// Create from a microsecond count.
    #[inline]
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Create from a millisecond count.
    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis * 1000)
    }

    /// Create from seconds as a float. May introduce sub-microsecond
    /// rounding.
    pub fn from_seconds_f64(seconds: f64) -> Self {
        Self((seconds * 1_000_000.0).round() as i64)
    }

    /// Microsecond count.
    #[inline]
    pub const fn as_micros(self) -> i64 {
        self.0
    }

    /// Convert to seconds as f64.
    #[inline]
    pub fn to_seconds_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Check if this time is zero.
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Absolute value.
    #[inline]
    pub const fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// Quantize down to the nearest multiple of `step` microseconds.
    ///
    /// Truncates toward zero, matching integer division. A zero or
    /// negative step returns the value unchanged.
    #[inline]
    pub const fn quantize_down(self, step: i64) -> Self {
        if step <= 0 {
            return self;
        }
        Self(step * (self.0 / step))
    }

    /// Fractional position of this time within its `step`-sized interval,
    /// in `[0, 1)` for non-negative times.
    #[inline]
    pub fn phase_within(self, step: i64) -> f64 {
        if step <= 0 {
            return 0.0;
        }
        (self.0 - self.quantize_down(step).0) as f64 / step as f64
    }

    /// Saturating conversion from a wall-clock duration.
    #[inline]
    pub fn from_duration(d: Duration) -> Self {
        Self(d.as_micros().min(i64::MAX as u128) as i64)
    }
}

impl Add for TimelineTime {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for TimelineTime {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for TimelineTime {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for TimelineTime {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for TimelineTime {
    type Output = Self;
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl fmt::Display for TimelineTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.to_seconds_f64())
    }
}

/// Frame rate as a rational number (e.g. 24000/1001 for 23.976 fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    /// Numerator (e.g. 24000)
    pub numerator: u32,
    /// Denominator (e.g. 1001)
    pub denominator: u32,
}

impl FrameRate {
    /// Create a new frame rate.
    #[inline]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Approximate a measured fps value as a rational rate.
    pub fn from_fps_f64(fps: f64) -> Self {
        Self {
            numerator: (fps * 1000.0).round().max(0.0) as u32,
            denominator: 1000,
        }
    }

    /// Convert to frames per second as f64.
    #[inline]
    pub fn to_fps_f64(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Duration of a single frame in timeline time.
    #[inline]
    pub fn frame_duration(self) -> TimelineTime {
        if self.numerator == 0 {
            return TimelineTime::ZERO;
        }
        let micros =
            Rational64::new(1_000_000 * self.denominator as i64, self.numerator as i64);
        TimelineTime::from_micros(micros.round().to_integer())
    }

    /// Duration of a single frame as a wall-clock duration.
    #[inline]
    pub fn frame_interval(self) -> Duration {
        Duration::from_micros(self.frame_duration().as_micros().max(0) as u64)
    }

    /// True if the rate is a whole number of frames per second.
    pub fn is_integral(self) -> bool {
        self.numerator % self.denominator == 0
    }

    /// Common frame rates
    pub const FPS_23_976: Self = Self::new(24000, 1001);
    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_25: Self = Self::new(25, 1);
    pub const FPS_29_97: Self = Self::new(30000, 1001);
    pub const FPS_30: Self = Self::new(30, 1);
    pub const FPS_50: Self = Self::new(50, 1);
    pub const FPS_59_94: Self = Self::new(60000, 1001);
    pub const FPS_60: Self = Self::new(60, 1);
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_24
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.to_fps_f64();
        if (fps - fps.round()).abs() < 0.001 {
            write!(f, "{} fps", fps.round() as u32)
        } else {
            write!(f, "{:.3} fps", fps)
        }
    }
}
