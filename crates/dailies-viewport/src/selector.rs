//! Frame selection for one draw of the viewport.
//!
//! Given the predicted playhead position for the upcoming refresh, picks
//! the frame to show now plus a handful of lookahead frames so the
//! renderer can pre-upload pixel data while the current frame is on
//! screen.

use smallvec::SmallVec;

use dailies_core::{DisplayFrame, PlayheadId, TimelineTime};

use crate::supply_queue::FrameSupplyQueue;

/// Maximum frames handed to the renderer per draw: one on-screen frame
/// plus lookahead.
pub const MAX_SNAPSHOT_FRAMES: usize = 4;

/// The ordered frame set for one draw.
///
/// Index 0 is the frame to show now; the rest are near-future lookahead
/// in the current playback direction. Empty when the playhead is unknown
/// or has supplied nothing yet; the caller keeps showing its previous
/// frame in that case.
#[derive(Debug, Clone, Default)]
pub struct PresentationSnapshot {
    frames: SmallVec<[DisplayFrame; MAX_SNAPSHOT_FRAMES]>,
    playhead: Option<PlayheadId>,
    position: TimelineTime,
}

impl PresentationSnapshot {
    /// The empty snapshot: nothing to show, keep the last frame up.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The frame that should be on screen now.
    pub fn on_screen(&self) -> Option<&DisplayFrame> {
        self.frames.first()
    }

    /// Mutable access for the augmentation path.
    pub(crate) fn on_screen_mut(&mut self) -> Option<&mut DisplayFrame> {
        self.frames.first_mut()
    }

    /// Lookahead frames, nearest first.
    pub fn future_frames(&self) -> &[DisplayFrame] {
        self.frames.get(1..).unwrap_or(&[])
    }

    /// All frames, on-screen first.
    pub fn frames(&self) -> &[DisplayFrame] {
        &self.frames
    }

    /// The playhead this snapshot was selected for.
    pub fn playhead(&self) -> Option<PlayheadId> {
        self.playhead
    }

    /// The quantized playhead position the selection was made at.
    pub fn position(&self) -> TimelineTime {
        self.position
    }
}

/// Select the presentation set for one playhead at the given predicted
/// position.
///
/// Side effect: entries older than the chosen on-screen frame are
/// evicted from the queue (subject to the least-stale fallback), since
/// nothing can select them again at a later position.
pub fn select_presentation(
    queue: &mut FrameSupplyQueue,
    playhead: PlayheadId,
    position: TimelineTime,
    forward: bool,
) -> PresentationSnapshot {
    let (on_screen, lookahead) = match queue.select_for_time(position) {
        Some(frame) => {
            let anchor = frame.timestamp();
            let future: Vec<DisplayFrame> = queue
                .lookahead(anchor, forward, MAX_SNAPSHOT_FRAMES - 1)
                .into_iter()
                .cloned()
                .collect();
            (frame.clone(), future)
        }
        None => return PresentationSnapshot::empty(),
    };

    let mut frames = SmallVec::new();
    let threshold = on_screen.timestamp();
    frames.push(on_screen);
    frames.extend(lookahead);

    queue.evict_stale(threshold);

    PresentationSnapshot {
        frames,
        playhead: Some(playhead),
        position,
    }
}
