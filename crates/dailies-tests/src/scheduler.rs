//! End-to-end scheduler scenarios: attach, playback, augmentation,
//! degradation and teardown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dailies_core::{DailiesError, PlayheadId, TimelineTime};
use dailies_viewport::{FrameScheduler, PlayheadEvent};
use tokio::time::sleep;

use crate::harness::{frame_at, init_tracing, scripted_collaborator, CollaboratorScript,
    ScriptedPlayhead};

/// Give broadcast events time to funnel through the listener task into
/// the coordinator mailbox.
async fn settle() {
    sleep(Duration::from_millis(50)).await;
}

// ── Attach / detach lifecycle ──────────────────────────────────

#[tokio::test]
async fn attach_fetches_active_child() {
    init_tracing();
    let client = FrameScheduler::spawn();
    let child = PlayheadId::generate();
    let playhead = ScriptedPlayhead::spawn(child);

    client.attach_playhead(playhead.handle.clone()).await.unwrap();

    // frames pushed for the active child are found without naming it
    client.show_frame(frame_at(child, 0), false).await.unwrap();
    let snap = client.frames_for_display(None).await;
    assert_eq!(snap.playhead(), Some(child));
}

#[tokio::test]
async fn attach_replaces_previous_playhead() {
    init_tracing();
    let client = FrameScheduler::spawn();

    let child_a = PlayheadId::generate();
    let first = ScriptedPlayhead::spawn(child_a);
    client.attach_playhead(first.handle.clone()).await.unwrap();
    client.show_frame(frame_at(child_a, 0), false).await.unwrap();

    let child_b = PlayheadId::generate();
    let second = ScriptedPlayhead::spawn(child_b);
    client.attach_playhead(second.handle.clone()).await.unwrap();

    // the old playhead's queues were torn down with it
    let snap = client.request_frames(Some(child_a)).await.unwrap();
    assert!(snap.is_empty());
}

#[tokio::test]
async fn dead_playhead_event_feed_detaches() {
    init_tracing();
    let client = FrameScheduler::spawn();
    let child = PlayheadId::generate();
    let playhead = ScriptedPlayhead::spawn(child);

    client.attach_playhead(playhead.handle.clone()).await.unwrap();
    client.show_frame(frame_at(child, 0), false).await.unwrap();

    // dropping every sender closes the feed; the scheduler must treat
    // that as the playhead dying and drop its queues
    drop(playhead);
    settle().await;

    let snap = client.request_frames(Some(child)).await.unwrap();
    assert!(snap.is_empty());
}

#[tokio::test]
async fn stale_active_child_switch_is_ignored() {
    init_tracing();
    let client = FrameScheduler::spawn();
    let child_a = PlayheadId::generate();
    let playhead = ScriptedPlayhead::spawn(child_a);
    client.attach_playhead(playhead.handle.clone()).await.unwrap();

    let child_b = PlayheadId::generate();
    let child_c = PlayheadId::generate();
    let earlier = Instant::now();
    sleep(Duration::from_millis(5)).await;
    let later = Instant::now();

    client.show_frame(frame_at(child_b, 0), false).await.unwrap();
    client.show_frame(frame_at(child_c, 0), false).await.unwrap();

    playhead
        .handle
        .events
        .send(PlayheadEvent::ActiveChildSwitched {
            child: child_b,
            switched_at: later,
        })
        .unwrap();
    // arrives second but was sent first: must not win
    playhead
        .handle
        .events
        .send(PlayheadEvent::ActiveChildSwitched {
            child: child_c,
            switched_at: earlier,
        })
        .unwrap();
    settle().await;

    let snap = client.frames_for_display(None).await;
    assert_eq!(snap.playhead(), Some(child_b));
}

// ── Playback and phase-locked selection ────────────────────────

#[tokio::test]
async fn paused_selection_tracks_reported_position() {
    init_tracing();
    let client = FrameScheduler::spawn();
    let child = PlayheadId::generate();
    let playhead = ScriptedPlayhead::spawn(child);
    client.attach_playhead(playhead.handle.clone()).await.unwrap();

    let frames = [100, 200, 300].map(|ms| frame_at(child, ms)).to_vec();
    client.future_frames(frames).await.unwrap();

    playhead.set_position(TimelineTime::from_millis(250));
    let snap = client.frames_for_display(None).await;
    assert_eq!(
        snap.on_screen().unwrap().timestamp(),
        TimelineTime::from_millis(200)
    );

    playhead.set_position(TimelineTime::from_millis(300));
    let snap = client.frames_for_display(None).await;
    assert_eq!(
        snap.on_screen().unwrap().timestamp(),
        TimelineTime::from_millis(300)
    );
}

#[tokio::test]
async fn playing_selection_is_stable_under_position_jitter() {
    init_tracing();
    let client = FrameScheduler::spawn();
    let child = PlayheadId::generate();
    let playhead = ScriptedPlayhead::spawn(child);
    client.attach_playhead(playhead.handle.clone()).await.unwrap();

    playhead.handle.events.send(PlayheadEvent::Play(true)).unwrap();
    settle().await;

    // 24 fps frames around the two-second mark
    let frames = [1875, 1917, 1958, 2000, 2042, 2083]
        .map(|ms| frame_at(child, ms))
        .to_vec();
    client.future_frames(frames).await.unwrap();

    // with no swap history the refresh defaults to 60 Hz; jitter the
    // reported position by up to ±3% of that period around a fixed spot
    let base = TimelineTime::from_millis(2000);
    playhead.set_position(base);
    let reference = client.frames_for_display(None).await;
    let chosen = reference.on_screen().unwrap().timestamp();

    for jitter_micros in [-500i64, 500, -250, 250, 0] {
        playhead.set_position(base + TimelineTime::from_micros(jitter_micros));
        let snap = client.frames_for_display(None).await;
        assert_eq!(
            snap.on_screen().unwrap().timestamp(),
            chosen,
            "selection flapped under {jitter_micros}us of jitter"
        );
    }
}

#[tokio::test]
async fn lookahead_follows_play_direction() {
    init_tracing();
    let client = FrameScheduler::spawn();
    let child = PlayheadId::generate();
    let playhead = ScriptedPlayhead::spawn(child);
    client.attach_playhead(playhead.handle.clone()).await.unwrap();

    let frames = [100, 200, 300, 400].map(|ms| frame_at(child, ms)).to_vec();
    client.future_frames(frames).await.unwrap();
    playhead.set_position(TimelineTime::from_millis(200));

    // reverse first: a draw evicts everything behind its on-screen frame
    playhead
        .handle
        .events
        .send(PlayheadEvent::PlayForward(false))
        .unwrap();
    settle().await;

    let snap = client.frames_for_display(None).await;
    assert_eq!(
        snap.on_screen().unwrap().timestamp(),
        TimelineTime::from_millis(200)
    );
    assert_eq!(
        snap.future_frames()[0].timestamp(),
        TimelineTime::from_millis(100)
    );

    playhead
        .handle
        .events
        .send(PlayheadEvent::PlayForward(true))
        .unwrap();
    settle().await;

    let snap = client.frames_for_display(None).await;
    assert_eq!(
        snap.future_frames()[0].timestamp(),
        TimelineTime::from_millis(300)
    );
}

// ── Collaborator augmentation ──────────────────────────────────

#[tokio::test]
async fn collaborators_attach_blind_data() {
    init_tracing();
    let client = FrameScheduler::spawn();
    let child = PlayheadId::generate();
    let playhead = ScriptedPlayhead::spawn(child);
    client.attach_playhead(playhead.handle.clone()).await.unwrap();

    let overlay = scripted_collaborator(CollaboratorScript::Succeed);
    let colour = scripted_collaborator(CollaboratorScript::Succeed);
    client.add_collaborator(overlay.clone()).await.unwrap();
    client.add_collaborator(colour.clone()).await.unwrap();

    client.show_frame(frame_at(child, 0), false).await.unwrap();
    let snap = client.frames_for_display(None).await;

    let frame = snap.on_screen().unwrap();
    assert_eq!(frame.blind_data_count(), 2);
    let payload: Arc<String> = frame.blind_data(overlay.id).unwrap();
    assert!(payload.contains("hero: true"), "payload was {payload}");
}

#[tokio::test]
async fn collaborator_error_short_circuits_delivery() {
    init_tracing();
    let client = FrameScheduler::spawn();
    let child = PlayheadId::generate();
    let playhead = ScriptedPlayhead::spawn(child);
    client.attach_playhead(playhead.handle.clone()).await.unwrap();

    client
        .add_collaborator(scripted_collaborator(CollaboratorScript::Fail))
        .await
        .unwrap();
    client.show_frame(frame_at(child, 0), false).await.unwrap();

    let err = client.request_frames(None).await.unwrap_err();
    assert!(matches!(err, DailiesError::Collaborator(_)), "got {err}");
}

#[tokio::test]
async fn failed_delivery_degrades_to_previous_snapshot() {
    init_tracing();
    let client = FrameScheduler::spawn();
    let child = PlayheadId::generate();
    let playhead = ScriptedPlayhead::spawn(child);
    client.attach_playhead(playhead.handle.clone()).await.unwrap();

    // a clean draw populates the client's fallback cache
    client.show_frame(frame_at(child, 0), false).await.unwrap();
    let good = client.frames_for_display(None).await;
    assert!(!good.is_empty());

    // then a collaborator starts failing; the renderer must keep
    // getting the previous snapshot rather than an error or a blank
    client
        .add_collaborator(scripted_collaborator(CollaboratorScript::Fail))
        .await
        .unwrap();
    let degraded = client.frames_for_display(None).await;
    assert_eq!(
        degraded.on_screen().unwrap().timestamp(),
        good.on_screen().unwrap().timestamp()
    );
}

#[tokio::test]
async fn silent_collaborator_is_skipped_not_fatal() {
    init_tracing();
    let client = FrameScheduler::spawn();
    let child = PlayheadId::generate();
    let playhead = ScriptedPlayhead::spawn(child);
    client.attach_playhead(playhead.handle.clone()).await.unwrap();

    let silent = scripted_collaborator(CollaboratorScript::GoSilent);
    let overlay = scripted_collaborator(CollaboratorScript::Succeed);
    client.add_collaborator(silent.clone()).await.unwrap();
    client.add_collaborator(overlay.clone()).await.unwrap();

    client.show_frame(frame_at(child, 0), false).await.unwrap();
    let snap = client.frames_for_display(None).await;

    let frame = snap.on_screen().unwrap();
    assert_eq!(frame.blind_data_count(), 1);
    assert!(frame.blind_data::<String>(overlay.id).is_some());
    assert!(frame.blind_data::<String>(silent.id).is_none());
}

// ── Fps readout ────────────────────────────────────────────────

#[tokio::test]
async fn fps_label_reflects_play_state() {
    init_tracing();
    let client = FrameScheduler::spawn();
    let child = PlayheadId::generate();
    let playhead = ScriptedPlayhead::spawn(child);
    client.attach_playhead(playhead.handle.clone()).await.unwrap();

    // paused: target rate only
    assert_eq!(client.fps_label().await.unwrap(), "--.-/24.0");

    playhead.handle.events.send(PlayheadEvent::Play(true)).unwrap();
    playhead
        .handle
        .events
        .send(PlayheadEvent::VelocityMultiplier(4.0))
        .unwrap();
    settle().await;

    assert_eq!(client.fps_label().await.unwrap(), "FF x 4");
}

#[tokio::test]
async fn swap_reports_feed_measured_fps() {
    init_tracing();
    let client = FrameScheduler::spawn();
    let child = PlayheadId::generate();
    let playhead = ScriptedPlayhead::spawn(child);
    client.attach_playhead(playhead.handle.clone()).await.unwrap();

    playhead.handle.events.send(PlayheadEvent::Play(true)).unwrap();
    settle().await;

    // a steady 24 fps swap cadence
    let mut t = Instant::now() - Duration::from_secs(3);
    for _ in 0..48 {
        client.swap_occurred(t, None).await.unwrap();
        t += Duration::from_micros(41_667);
    }

    assert_eq!(client.fps_label().await.unwrap(), "24.0/24.0");
}
