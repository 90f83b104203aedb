//! Dailies Viewport - frame presentation scheduling
//!
//! Reconciles asynchronous, unpredictably-timed frame producers
//! (playheads) with the synchronously-clocked display refresh. The
//! playback engine pushes timestamped frames ahead of time; once per
//! draw the renderer asks which frame belongs on screen, and the
//! scheduler answers using a phase-locked prediction of the playhead
//! position at the next buffer swap.
//!
//! Entry point is [`FrameScheduler::spawn`], which starts one
//! coordinator task and returns the [`SchedulerClient`] the renderer and
//! engine talk to.

pub mod collaborator;
pub mod coordinator;
pub mod fps_meter;
pub mod playhead;
pub mod refresh;
pub mod selector;
pub mod supply_queue;

pub use collaborator::{CollaboratorHandle, PrepareBlindData};
pub use coordinator::{FrameScheduler, SchedulerClient, DRAW_REQUEST_TIMEOUT};
pub use fps_meter::FpsMeter;
pub use playhead::{PlayheadEvent, PlayheadHandle, PlayheadQuery};
pub use refresh::{PhaseLock, RefreshObserver};
pub use selector::{PresentationSnapshot, MAX_SNAPSHOT_FRAMES};
pub use supply_queue::FrameSupplyQueue;
