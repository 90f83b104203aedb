//! Pluggable per-frame augmentation collaborators.
//!
//! Overlay, annotation and colour-pipeline plugins contribute opaque
//! "blind data" to each frame before it reaches the renderer: shader
//! parameters, LUT handles, HUD geometry. The scheduler fans a prepare
//! request out to every registered collaborator and joins the responses;
//! it carries the payloads but never looks inside them.

use tokio::sync::{mpsc, oneshot};

use dailies_core::{BlindData, CollaboratorId, DisplayFrame, Result};

/// A request for one collaborator to compute its blind data for a frame
/// that is about to go on screen.
#[derive(Debug)]
pub struct PrepareBlindData {
    /// The frame being finalized for display.
    pub frame: DisplayFrame,
    /// True when this frame belongs to the hero (active child) playhead.
    pub hero: bool,
    /// Response channel; an `Err` here aborts delivery of the frame.
    pub reply: oneshot::Sender<Result<BlindData>>,
}

/// Connection point for one collaborator plugin.
#[derive(Debug, Clone)]
pub struct CollaboratorHandle {
    /// Identity used to key this collaborator's blind data on frames.
    pub id: CollaboratorId,
    /// Request channel served by the plugin.
    pub requests: mpsc::Sender<PrepareBlindData>,
}

impl CollaboratorHandle {
    /// Channel capacity for a freshly built handle pair.
    pub const REQUEST_CAPACITY: usize = 16;

    /// Build a handle plus the plugin-side receiver for its requests.
    pub fn new(id: CollaboratorId) -> (Self, mpsc::Receiver<PrepareBlindData>) {
        let (requests, request_rx) = mpsc::channel(Self::REQUEST_CAPACITY);
        (Self { id, requests }, request_rx)
    }
}
