//! Measured playback rate, for display in the viewport toolbar.
//!
//! Derives an achieved frames-per-second figure from recent buffer swap
//! instants and formats it against the playhead's target rate. Purely
//! cosmetic: presentation decisions never read from this module.

use std::collections::VecDeque;
use std::time::Instant;

use dailies_core::FrameRate;

const MAX_FPS_MEASURE_EVENTS: usize = 48;
const MIN_FPS_MEASURE_EVENTS: usize = 8;

/// Tracks swap cadence and play state to produce an fps readout.
#[derive(Debug)]
pub struct FpsMeter {
    swap_instants: VecDeque<Instant>,
    target_rate: FrameRate,
    playing: bool,
    forward: bool,
    velocity: f32,
    velocity_multiplier: f32,
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl FpsMeter {
    pub fn new() -> Self {
        Self {
            swap_instants: VecDeque::with_capacity(MAX_FPS_MEASURE_EVENTS),
            target_rate: FrameRate::FPS_24,
            playing: false,
            forward: true,
            velocity: 1.0,
            velocity_multiplier: 1.0,
        }
    }

    /// Record a completed buffer swap.
    ///
    /// Until enough real samples exist, plausible back-filled instants at
    /// the target rate are synthesized so that early-session measurements
    /// aren't wildly wrong.
    pub fn record_swap(&mut self, at: Instant) {
        if self.swap_instants.len() < MIN_FPS_MEASURE_EVENTS {
            let missing = MIN_FPS_MEASURE_EVENTS - self.swap_instants.len();
            let interval = self.target_rate.frame_interval();
            let mut t = at - interval;
            for _ in 0..missing {
                self.swap_instants.push_front(t);
                t -= interval;
            }
        }

        self.swap_instants.push_back(at);
        if self.swap_instants.len() > MAX_FPS_MEASURE_EVENTS {
            self.swap_instants.pop_front();
        }
    }

    /// The achieved playback rate over the recent swap window, or the
    /// target rate while there is nothing to measure.
    pub fn measured_fps(&self) -> FrameRate {
        if self.swap_instants.len() >= MIN_FPS_MEASURE_EVENTS {
            let span = self
                .swap_instants
                .back()
                .zip(self.swap_instants.front())
                .map(|(last, first)| last.duration_since(*first))
                .unwrap_or_default();
            let frames = (self.swap_instants.len() - 1) as f64;
            if span.as_micros() > 0 {
                return FrameRate::from_fps_f64(frames * 1_000_000.0 / span.as_micros() as f64);
            }
        }
        self.target_rate
    }

    /// The fps readout for the UI.
    ///
    /// Not playing: `--.-/24.0` (target only, no measured value).
    /// Playing at unit multiplier: measured over target, with the
    /// measured value rounded to 4% increments of the target so the
    /// readout doesn't dance. Fast-forward/rewind: a velocity label
    /// (`FF x 2`, `RW x 2`) instead of a meaningless rate.
    pub fn display_string(&self) -> String {
        let target_fps = self.velocity * self.target_rate.to_fps_f64() as f32;
        if target_fps <= 0.0 {
            return "--/--".to_string();
        }

        if !self.playing {
            return if Self::is_whole(target_fps) {
                format!("--.-/{:.1}", target_fps)
            } else {
                format!("--.-/{:.2}", target_fps)
            };
        }

        if self.velocity_multiplier != 1.0 {
            let label = if self.forward { "FF" } else { "RW" };
            return format!("{} x {:.0}", label, self.velocity_multiplier);
        }

        // round the displayed figure to increments of 4% of the target
        let actual = self.measured_fps().to_fps_f64() as f32;
        let rounded = (actual * 25.0 / target_fps).round() * target_fps / 25.0;

        if Self::is_whole(target_fps) {
            format!("{:.1}/{:.1}", rounded, target_fps)
        } else {
            format!("{:.2}/{:.2}", rounded, target_fps)
        }
    }

    fn is_whole(fps: f32) -> bool {
        fps.round() == fps
    }

    /// Play/pause transition. Starting playback restarts the measure;
    /// stopping clears any fast-forward/rewind multiplier.
    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
        if playing {
            self.swap_instants.clear();
        } else {
            self.velocity_multiplier = 1.0;
        }
    }

    pub fn set_forward(&mut self, forward: bool) {
        self.forward = forward;
    }

    pub fn set_velocity(&mut self, velocity: f32) {
        self.velocity = velocity;
    }

    pub fn set_velocity_multiplier(&mut self, multiplier: f32) {
        self.velocity_multiplier = multiplier;
    }

    pub fn set_target_rate(&mut self, rate: FrameRate) {
        self.target_rate = rate;
    }

    pub fn target_rate(&self) -> FrameRate {
        self.target_rate
    }
}
