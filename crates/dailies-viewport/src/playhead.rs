//! The scheduler's view of the playback engine.
//!
//! A playhead is a logical cursor over a timeline, advancing on its own
//! free-running clock. The engine hands the scheduler a [`PlayheadHandle`]
//! per playhead: a broadcast feed of state-change events plus a query
//! channel for bounded request/response calls. Frames themselves arrive
//! through the scheduler client's push methods, not through this handle.

use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot};

use dailies_core::{FrameRate, PlayheadId, TimelineTime};

/// State-change notifications emitted by a playhead.
#[derive(Debug, Clone)]
pub enum PlayheadEvent {
    /// Playback started or stopped.
    Play(bool),
    /// Playback direction changed.
    PlayForward(bool),
    /// Playback velocity changed (1.0 = real time).
    Velocity(f32),
    /// Fast-forward/rewind multiplier changed (1.0 = normal).
    VelocityMultiplier(f32),
    /// The playhead's target frame rate changed.
    TargetRate(FrameRate),
    /// The active child playhead switched (compare modes rebuild their
    /// children as the media selection changes). `switched_at` orders
    /// switches so a stale notification can be recognized and dropped.
    ActiveChildSwitched {
        child: PlayheadId,
        switched_at: Instant,
    },
    /// Child playheads were destroyed; their queues can be torn down.
    ChildrenRemoved(Vec<PlayheadId>),
}

/// Bounded request/response queries answered by a playhead.
#[derive(Debug)]
pub enum PlayheadQuery {
    /// Where will the playhead be, in timeline time, at wall-clock
    /// instant `at`, given that the display refreshes every
    /// `refresh_period`?
    EstimatePositionAt {
        at: Instant,
        refresh_period: Duration,
        reply: oneshot::Sender<TimelineTime>,
    },
    /// Which child playhead is currently active?
    ActiveChild {
        reply: oneshot::Sender<PlayheadId>,
    },
}

/// Connection points for one playhead, supplied by the playback engine
/// when attaching it to a scheduler.
#[derive(Debug, Clone)]
pub struct PlayheadHandle {
    /// Identity of this playhead.
    pub id: PlayheadId,
    /// Event feed. The scheduler subscribes on attach; the sender side
    /// closing is treated as the playhead dying.
    pub events: broadcast::Sender<PlayheadEvent>,
    /// Query channel for request/response calls.
    pub queries: mpsc::Sender<PlayheadQuery>,
}

impl PlayheadHandle {
    /// Channel capacity for a freshly built handle pair.
    pub const QUERY_CAPACITY: usize = 16;

    /// Build a handle plus the engine-side receiver for its queries.
    pub fn new(id: PlayheadId) -> (Self, mpsc::Receiver<PlayheadQuery>) {
        let (events, _) = broadcast::channel(64);
        let (queries, query_rx) = mpsc::channel(Self::QUERY_CAPACITY);
        (
            Self {
                id,
                events,
                queries,
            },
            query_rx,
        )
    }
}
