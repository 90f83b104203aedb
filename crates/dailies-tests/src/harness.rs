//! Scripted playhead and collaborator fakes for integration tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Once};

use dailies_core::{
    BlindData, CollaboratorId, DailiesError, DisplayFrame, ImageBuffer, PixelFormat, PlayheadId,
    TimelineTime,
};
use dailies_viewport::{CollaboratorHandle, PlayheadHandle, PlayheadQuery};

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A playback engine stand-in answering scheduler queries.
///
/// Its reported position is shared through an atomic so tests can move
/// the playhead while the scheduler is running.
pub struct ScriptedPlayhead {
    pub handle: PlayheadHandle,
    pub position_micros: Arc<AtomicI64>,
}

impl ScriptedPlayhead {
    /// Spawn a playhead that reports `child` as its active child and
    /// answers every position query with the current shared position.
    pub fn spawn(child: PlayheadId) -> Self {
        let (handle, mut query_rx) = PlayheadHandle::new(PlayheadId::generate());
        let position_micros = Arc::new(AtomicI64::new(0));

        let position = position_micros.clone();
        tokio::spawn(async move {
            while let Some(query) = query_rx.recv().await {
                match query {
                    PlayheadQuery::EstimatePositionAt { reply, .. } => {
                        let _ = reply
                            .send(TimelineTime::from_micros(position.load(Ordering::Relaxed)));
                    }
                    PlayheadQuery::ActiveChild { reply } => {
                        let _ = reply.send(child);
                    }
                }
            }
        });

        Self {
            handle,
            position_micros,
        }
    }

    pub fn set_position(&self, t: TimelineTime) {
        self.position_micros.store(t.as_micros(), Ordering::Relaxed);
    }
}

/// How a scripted collaborator responds to prepare requests.
#[derive(Clone, Copy)]
pub enum CollaboratorScript {
    /// Reply with a string payload describing the frame.
    Succeed,
    /// Reply with an error.
    Fail,
    /// Drop the reply channel without answering.
    GoSilent,
}

/// Spawn a collaborator task following the given script.
pub fn scripted_collaborator(script: CollaboratorScript) -> CollaboratorHandle {
    let (handle, mut request_rx) = CollaboratorHandle::new(CollaboratorId::generate());

    tokio::spawn(async move {
        while let Some(request) = request_rx.recv().await {
            match script {
                CollaboratorScript::Succeed => {
                    let payload: BlindData = Arc::new(format!(
                        "overlay for {} (hero: {})",
                        request.frame.timestamp(),
                        request.hero
                    ));
                    let _ = request.reply.send(Ok(payload));
                }
                CollaboratorScript::Fail => {
                    let _ = request
                        .reply
                        .send(Err(DailiesError::Collaborator("scripted failure".into())));
                }
                CollaboratorScript::GoSilent => drop(request.reply),
            }
        }
    });

    handle
}

pub fn frame_at(playhead: PlayheadId, millis: i64) -> DisplayFrame {
    DisplayFrame::new(
        Arc::new(ImageBuffer::new(16, 16, PixelFormat::Rgba8)),
        TimelineTime::from_millis(millis),
        playhead,
    )
}
