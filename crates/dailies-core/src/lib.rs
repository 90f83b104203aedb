//! Dailies Core - Foundation types for the media review application
//!
//! This crate provides the fundamental types used throughout Dailies:
//! - Time representation (TimelineTime, FrameRate)
//! - Frame buffers and blind data payloads
//! - Playhead and collaborator identities
//! - The shared error type

pub mod error;
pub mod frame;
pub mod ids;
pub mod time;

pub use error::{DailiesError, Result};
pub use frame::{
    BlindData, DisplayFrame, ImageBuffer, ImagePlane, PixelFormat, SharedImageBuffer,
};
pub use ids::{CollaboratorId, PlayheadId};
pub use time::{FrameRate, TimelineTime};
