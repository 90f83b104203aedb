//! Display refresh observation and playhead phase locking.
//!
//! The renderer reports each completed buffer swap. From that history we
//! derive the effective refresh cadence, predict when the *next* swap will
//! land, and quantize the free-running playhead position onto the refresh
//! beat so that frame selection does not flicker across a frame boundary
//! under sub-millisecond timing jitter.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dailies_core::TimelineTime;

/// Bounded swap-event history length.
const REFRESH_HISTORY_LEN: usize = 128;

/// Below this many swap samples the trimmed average is meaningless and the
/// default period is used instead.
const MIN_SAMPLES_FOR_AVERAGE: usize = 17;

/// Rate snapping needs a longer, steadier history.
const MIN_SAMPLES_FOR_SNAPPING: usize = 64;

/// How many outlier deltas are dropped from each end before averaging.
/// Absorbs stalls and double-buffer glitches.
const OUTLIER_TRIM: usize = 8;

/// Refresh rates the measured cadence is snapped to, in Hz.
const COMMON_REFRESH_RATES: [u32; 11] = [24, 25, 30, 48, 60, 75, 90, 120, 144, 240, 360];

const SIXTY_HZ: Duration = Duration::from_micros(1_000_000 / 60);

/// Records observed buffer swaps and derives the display refresh cadence.
///
/// Swap timestamps come from the video layer and are noisy: on some
/// platforms the "framebuffer swapped" signal can arrive anywhere within
/// the refresh interval, and beats go missing whenever a draw overruns.
#[derive(Debug)]
pub struct RefreshObserver {
    history: VecDeque<Instant>,
    rate_hint: Option<Duration>,
    last_swap: Option<Instant>,
    last_predicted: Option<Instant>,
}

impl Default for RefreshObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshObserver {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(REFRESH_HISTORY_LEN),
            rate_hint: None,
            last_swap: None,
            last_predicted: None,
        }
    }

    /// Record a completed buffer swap.
    ///
    /// History only accumulates while playing: when paused the UI redraws
    /// on demand and swap intervals say nothing about the refresh cadence.
    /// The hint and the last swap instant are remembered regardless.
    pub fn record_swap(&mut self, at: Instant, rate_hint: Option<Duration>, playing: bool) {
        if playing {
            self.history.push_back(at);
            if self.history.len() > REFRESH_HISTORY_LEN {
                self.history.pop_front();
            }
        }
        if rate_hint.map_or(false, |h| !h.is_zero()) {
            self.rate_hint = rate_hint;
        }
        self.last_swap = Some(at);
    }

    pub fn sample_count(&self) -> usize {
        self.history.len()
    }

    /// Trimmed average of recent inter-swap deltas.
    ///
    /// Deltas are sorted and the 8 largest and 8 smallest discarded before
    /// averaging, so a single stall or glitch cannot skew the estimate.
    /// With too few samples the 60 Hz default is returned.
    pub fn average_refresh_period(&self) -> Duration {
        if self.history.len() < MIN_SAMPLES_FOR_AVERAGE {
            return SIXTY_HZ;
        }

        let mut deltas: Vec<Duration> = self
            .history
            .iter()
            .zip(self.history.iter().skip(1))
            .map(|(a, b)| *b - *a)
            .collect();
        deltas.sort_unstable();

        let trimmed = if deltas.len() > 2 * OUTLIER_TRIM {
            &deltas[OUTLIER_TRIM..deltas.len() - OUTLIER_TRIM]
        } else {
            &deltas[..]
        };
        if trimmed.is_empty() {
            return SIXTY_HZ;
        }

        let total: Duration = trimmed.iter().sum();
        total / trimmed.len() as u32
    }

    /// Snap a measured rate in Hz to the nearest common display refresh
    /// rate within a 2 Hz tolerance. Out-of-family measurements default
    /// to 60 Hz.
    pub fn nearest_common_refresh_rate(hertz: u32) -> u32 {
        let mut best = 60;
        let mut best_err = u32::MAX;
        for rate in COMMON_REFRESH_RATES {
            let err = rate.abs_diff(hertz);
            if err < best_err {
                best_err = err;
                best = rate;
            }
        }
        if best_err < 2 {
            best
        } else {
            60
        }
    }

    /// The effective refresh period for presentation decisions.
    ///
    /// A system-reported hint wins unconditionally. Otherwise, once the
    /// history is long enough, the measured cadence is snapped to a
    /// common refresh rate. Fallback is 60 Hz.
    pub fn compute_video_refresh(&self) -> Duration {
        if let Some(hint) = self.rate_hint {
            return hint;
        }

        if self.history.len() >= MIN_SAMPLES_FOR_SNAPPING {
            let avg = self.average_refresh_period();
            // 24 fps is the slowest refresh we will ever meet
            let hertz = ((1_000_000.0 / avg.as_micros().max(1) as f64).round() as u32).max(24);
            let snapped = Self::nearest_common_refresh_rate(hertz);
            return Duration::from_micros(1_000_000 / snapped as u64);
        }

        SIXTY_HZ
    }

    /// Predict the instant of the next buffer swap.
    ///
    /// With a long history we advance the previous prediction by one
    /// average beat, re-centering whenever the prediction has fallen into
    /// the past (a stall longer than one beat) or drifted more than two
    /// beats ahead of the wall clock. With a short history we extrapolate
    /// from the last observed swap if it is fresh enough.
    pub fn next_refresh(&mut self, refresh_period: Duration, now: Instant) -> Instant {
        if self.history.len() > 16 {
            let avg = self.average_refresh_period();
            let mut predicted = match self.last_predicted {
                Some(prev) => prev + avg,
                None => now + avg / 2,
            };
            if predicted < now || predicted.duration_since(now) > avg * 2 {
                predicted = now + avg / 2;
            }
            self.last_predicted = Some(predicted);
            return predicted;
        }

        // Not enough swap signals; trust the last swap only if it is
        // fresher than 1/15 s, else pretend one landed a period ago.
        let last = match self.last_swap {
            Some(swap) if now.duration_since(swap) < Duration::from_micros(66_667) => swap,
            _ => now - refresh_period,
        };
        last + refresh_period
    }
}

/// Phase lock between the free-running playhead clock and the refresh
/// beat.
///
/// The playhead's position estimate carries jitter relative to the
/// display clock; rounding it straight down to a period multiple would
/// flip frame selection whenever the estimate wanders across a boundary.
/// Instead a persistent offset keeps the estimate near mid-period before
/// quantizing, and is recomputed only when drift pushes the phase into
/// the boundary zone.
#[derive(Debug, Default)]
pub struct PhaseLock {
    phase_adjust: TimelineTime,
}

/// Phase below this fraction (or above its mirror) of the quantization
/// step counts as the unstable boundary zone.
const PHASE_DANGER_ZONE: f64 = 0.1;

impl PhaseLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quantize a playhead position estimate onto the refresh beat.
    ///
    /// The quantization step is the refresh period scaled by playback
    /// velocity: at 2x speed the playhead covers two periods of timeline
    /// time per refresh. Recentering triggers on a single sample in the
    /// danger zone, so one noisy sample at the wrong moment can move the
    /// lock.
    pub fn quantize(
        &mut self,
        estimate: TimelineTime,
        refresh_period: Duration,
        velocity: f32,
    ) -> TimelineTime {
        let step = (refresh_period.as_micros() as f64 * velocity.abs() as f64) as i64;
        if step <= 0 {
            return estimate;
        }

        let mut adjusted = estimate + self.phase_adjust;
        let mut quantized = adjusted.quantize_down(step);
        let phase = adjusted.phase_within(step);

        if !(PHASE_DANGER_ZONE..=1.0 - PHASE_DANGER_ZONE).contains(&phase) {
            // Recenter so this sample sits mid-step, then requantize with
            // the new offset.
            self.phase_adjust = TimelineTime::from_micros(
                step / 2 - estimate.as_micros() + step * (estimate.as_micros() / step),
            );
            adjusted = estimate + self.phase_adjust;
            quantized = adjusted.quantize_down(step);
        }

        quantized
    }

    /// Phase of the given estimate under the current adjustment, for
    /// diagnostics and tests.
    pub fn phase_of(&self, estimate: TimelineTime, refresh_period: Duration, velocity: f32) -> f64 {
        let step = (refresh_period.as_micros() as f64 * velocity.abs() as f64) as i64;
        (estimate + self.phase_adjust).phase_within(step)
    }

    /// Forget the accumulated adjustment (playhead swap, seek, etc.).
    pub fn reset(&mut self) {
        self.phase_adjust = TimelineTime::ZERO;
    }
}
