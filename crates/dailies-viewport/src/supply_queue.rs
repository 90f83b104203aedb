//! Per-playhead ordered store of frames awaiting presentation.
//!
//! The playback engine pushes frames ahead of time, tagged with the
//! timeline timestamp at which they should be visible. At draw time the
//! selector picks the entry nearest (at or before) the predicted playhead
//! position. Keyed by timestamp, so a later push at an existing timestamp
//! replaces the earlier frame rather than duplicating it.

use std::collections::BTreeMap;
use std::ops::Bound;

use dailies_core::{DisplayFrame, TimelineTime};

/// Ordered frame store for one playhead identity.
///
/// Created when a playhead attaches (or on its first push) and destroyed
/// on detach. Stays small in steady state but can spike when the engine
/// bursts future frames.
#[derive(Debug, Default)]
pub struct FrameSupplyQueue {
    frames: BTreeMap<TimelineTime, DisplayFrame>,
}

impl FrameSupplyQueue {
    pub fn new() -> Self {
        Self {
            frames: BTreeMap::new(),
        }
    }

    /// Insert a frame, replacing any existing entry at the same timestamp.
    pub fn enqueue(&mut self, frame: DisplayFrame) {
        self.frames.insert(frame.timestamp(), frame);
    }

    /// Remove entries older than `threshold`.
    ///
    /// If every entry is older, the single least-stale one is retained as
    /// a fallback: once any frame has ever arrived, presentation must
    /// never come up empty-handed. Entries remain in ascending timestamp
    /// order after this call.
    pub fn evict_stale(&mut self, threshold: TimelineTime) {
        let least_stale = self
            .frames
            .last_key_value()
            .map(|(ts, frame)| (*ts, frame.clone()));

        self.frames.retain(|ts, _| *ts >= threshold);

        if self.frames.is_empty() {
            if let Some((ts, frame)) = least_stale {
                self.frames.insert(ts, frame);
            }
        }
    }

    /// The entry with the greatest timestamp at or before `t`.
    ///
    /// Clamps to the first entry when `t` precedes the whole queue, and
    /// to the last entry when `t` is past it. Empty queue yields `None`.
    pub fn select_for_time(&self, t: TimelineTime) -> Option<&DisplayFrame> {
        self.frames
            .range(..=t)
            .next_back()
            .or_else(|| self.frames.first_key_value())
            .map(|(_, frame)| frame)
    }

    /// Up to `n` entries strictly after (`forward`) or strictly before
    /// (reverse) `anchor`, nearest first. Never yields the anchor itself.
    pub fn lookahead(&self, anchor: TimelineTime, forward: bool, n: usize) -> Vec<&DisplayFrame> {
        let above = (Bound::Excluded(anchor), Bound::Unbounded);
        if forward {
            self.frames
                .range(above)
                .take(n)
                .map(|(_, frame)| frame)
                .collect()
        } else {
            self.frames
                .range(..anchor)
                .rev()
                .take(n)
                .map(|(_, frame)| frame)
                .collect()
        }
    }

    /// Drop every entry. Used when the owning playhead detaches.
    pub fn detach(&mut self) {
        self.frames.clear();
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Timestamps currently held, ascending. Handy for diagnostics.
    pub fn timestamps(&self) -> impl Iterator<Item = TimelineTime> + '_ {
        self.frames.keys().copied()
    }
}
