//! The scheduling coordinator: one task per viewport owning all frame
//! queues.
//!
//! Every mutation (frame pushes, playhead lifecycle, swap reports, draw
//! requests) flows through a single mailbox, so the core needs no shared
//! mutable state. The render path talks to the coordinator through
//! [`SchedulerClient`] with a bounded timeout and falls back to the last
//! delivered snapshot when the coordinator cannot answer in time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use dailies_core::{
    CollaboratorId, DailiesError, DisplayFrame, PlayheadId, Result, TimelineTime,
};

use crate::collaborator::{CollaboratorHandle, PrepareBlindData};
use crate::fps_meter::FpsMeter;
use crate::playhead::{PlayheadEvent, PlayheadHandle, PlayheadQuery};
use crate::refresh::{PhaseLock, RefreshObserver};
use crate::selector::{select_presentation, PresentationSnapshot};
use crate::supply_queue::FrameSupplyQueue;

/// How long the render path waits for a draw request before reusing the
/// previous snapshot.
pub const DRAW_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Budget for the playhead position estimate query.
const POSITION_REQUEST_TIMEOUT: Duration = Duration::from_millis(100);

/// Budget for each collaborator's blind data response.
const COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(1);

/// Budget for the attach handshake with a playhead.
const ATTACH_TIMEOUT: Duration = Duration::from_secs(1);

/// On a "show now" push, frames this far behind the pushed frame are
/// swept out of the queue.
const SHOW_EVICT_LAG: TimelineTime = TimelineTime::from_millis(100);

enum SchedulerMsg {
    AttachPlayhead {
        handle: PlayheadHandle,
        reply: oneshot::Sender<Result<()>>,
    },
    DetachPlayhead {
        id: PlayheadId,
    },
    PlayheadEvent {
        playhead: PlayheadId,
        event: PlayheadEvent,
    },
    PlayheadGone {
        playhead: PlayheadId,
    },
    ShowFrame {
        frame: DisplayFrame,
        playing: bool,
    },
    FutureFrames {
        frames: Vec<DisplayFrame>,
    },
    SwapOccurred {
        at: Instant,
        rate_hint: Option<Duration>,
    },
    FramesForDisplay {
        playhead: Option<PlayheadId>,
        reply: oneshot::Sender<Result<PresentationSnapshot>>,
    },
    Augmented {
        generation: u64,
        playhead: PlayheadId,
        result: Result<PresentationSnapshot>,
        reply: oneshot::Sender<Result<PresentationSnapshot>>,
    },
    AddCollaborator {
        handle: CollaboratorHandle,
    },
    RemoveCollaborator {
        id: CollaboratorId,
    },
    FpsLabel {
        reply: oneshot::Sender<String>,
    },
}

// Deliberately does not retain the handle's event sender: if the
// engine drops its side, the feed closes and the listener reports the
// playhead gone.
struct AttachedPlayhead {
    id: PlayheadId,
    queries: mpsc::Sender<PlayheadQuery>,
    listener: JoinHandle<()>,
}

/// Spawns and owns the coordinator task for one viewport.
pub struct FrameScheduler;

impl FrameScheduler {
    /// Mailbox depth; pushes beyond this apply backpressure to the
    /// playback engine.
    const MAILBOX_CAPACITY: usize = 256;

    /// Start a scheduler task and return the client handle for it.
    ///
    /// The task runs until every client clone is dropped.
    pub fn spawn() -> SchedulerClient {
        let (tx, rx) = mpsc::channel(Self::MAILBOX_CAPACITY);
        let redraw = Arc::new(Notify::new());

        let coordinator = Coordinator::new(rx, tx.clone(), redraw.clone());
        tokio::spawn(coordinator.run());

        SchedulerClient {
            tx,
            redraw,
            last_snapshot: Arc::new(Mutex::new(PresentationSnapshot::empty())),
            request_timeout: DRAW_REQUEST_TIMEOUT,
        }
    }
}

/// Handle used by the renderer and the playback engine to talk to the
/// coordinator task.
#[derive(Clone)]
pub struct SchedulerClient {
    tx: mpsc::Sender<SchedulerMsg>,
    redraw: Arc<Notify>,
    last_snapshot: Arc<Mutex<PresentationSnapshot>>,
    request_timeout: Duration,
}

impl SchedulerClient {
    /// Attach a playhead, replacing any previously attached one.
    ///
    /// Subscribes to the playhead's event feed and fetches its active
    /// child identity before reporting success.
    pub async fn attach_playhead(&self, handle: PlayheadHandle) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SchedulerMsg::AttachPlayhead {
            handle,
            reply: reply_tx,
        })
        .await?;
        match timeout(ATTACH_TIMEOUT, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DailiesError::ChannelClosed("scheduler".into())),
            Err(_) => Err(DailiesError::Timeout("attach_playhead".into())),
        }
    }

    /// Detach a playhead and drop its queues immediately.
    pub async fn detach_playhead(&self, id: PlayheadId) -> Result<()> {
        self.send(SchedulerMsg::DetachPlayhead { id }).await
    }

    /// Push a frame that should go on screen now.
    pub async fn show_frame(&self, frame: DisplayFrame, playing: bool) -> Result<()> {
        self.send(SchedulerMsg::ShowFrame { frame, playing }).await
    }

    /// Push a batch of frames expected on screen in the near future.
    pub async fn future_frames(&self, frames: Vec<DisplayFrame>) -> Result<()> {
        self.send(SchedulerMsg::FutureFrames { frames }).await
    }

    /// Report a completed buffer swap, closing the refresh feedback
    /// loop. `rate_hint` is the system-reported refresh period, if the
    /// video layer knows it.
    pub async fn swap_occurred(&self, at: Instant, rate_hint: Option<Duration>) -> Result<()> {
        self.send(SchedulerMsg::SwapOccurred { at, rate_hint }).await
    }

    /// Register a blind data collaborator.
    pub async fn add_collaborator(&self, handle: CollaboratorHandle) -> Result<()> {
        self.send(SchedulerMsg::AddCollaborator { handle }).await
    }

    /// Remove a collaborator; in-flight requests to it are allowed to
    /// finish.
    pub async fn remove_collaborator(&self, id: CollaboratorId) -> Result<()> {
        self.send(SchedulerMsg::RemoveCollaborator { id }).await
    }

    /// The frame set for the next draw, for `playhead` or the active
    /// child when `None`.
    ///
    /// Never fails from the renderer's point of view: on timeout or
    /// delivery error the previously delivered snapshot is returned and
    /// the failure is logged. An *empty* snapshot is a valid answer
    /// meaning "nothing new, keep showing what you have".
    pub async fn frames_for_display(&self, playhead: Option<PlayheadId>) -> PresentationSnapshot {
        match self.request_frames(playhead).await {
            Ok(snapshot) => {
                if !snapshot.is_empty() {
                    *self.last_snapshot.lock() = snapshot.clone();
                }
                snapshot
            }
            Err(err) => {
                warn!("draw request degraded to previous snapshot: {err}");
                self.last_snapshot.lock().clone()
            }
        }
    }

    /// The raw draw request, surfacing timeout and collaborator errors.
    pub async fn request_frames(
        &self,
        playhead: Option<PlayheadId>,
    ) -> Result<PresentationSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SchedulerMsg::FramesForDisplay {
            playhead,
            reply: reply_tx,
        })
        .await?;
        match timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DailiesError::ChannelClosed("scheduler".into())),
            Err(_) => Err(DailiesError::Timeout("frames_for_display".into())),
        }
    }

    /// The current fps readout string for the UI.
    pub async fn fps_label(&self) -> Result<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SchedulerMsg::FpsLabel { reply: reply_tx }).await?;
        reply_rx
            .await
            .map_err(|_| DailiesError::ChannelClosed("scheduler".into()))
    }

    /// Signal fired whenever a pushed frame wants the viewport redrawn.
    pub fn redraw_signal(&self) -> Arc<Notify> {
        self.redraw.clone()
    }

    async fn send(&self, msg: SchedulerMsg) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| DailiesError::ChannelClosed("scheduler mailbox".into()))
    }
}

struct Coordinator {
    rx: mpsc::Receiver<SchedulerMsg>,
    self_tx: mpsc::Sender<SchedulerMsg>,
    redraw: Arc<Notify>,

    queues: HashMap<PlayheadId, FrameSupplyQueue>,
    playhead: Option<AttachedPlayhead>,
    active_child: Option<PlayheadId>,
    removed_children: HashSet<PlayheadId>,
    last_child_switch: Option<Instant>,

    observer: RefreshObserver,
    phase: PhaseLock,
    fps: FpsMeter,

    playing: bool,
    forward: bool,
    velocity: f32,
    last_estimate: TimelineTime,

    collaborators: Vec<CollaboratorHandle>,

    // bumped on attach/detach so stale augmentation results can be
    // recognized and discarded at delivery
    generation: u64,
}

impl Coordinator {
    fn new(
        rx: mpsc::Receiver<SchedulerMsg>,
        self_tx: mpsc::Sender<SchedulerMsg>,
        redraw: Arc<Notify>,
    ) -> Self {
        Self {
            rx,
            self_tx,
            redraw,
            queues: HashMap::new(),
            playhead: None,
            active_child: None,
            removed_children: HashSet::new(),
            last_child_switch: None,
            observer: RefreshObserver::new(),
            phase: PhaseLock::new(),
            fps: FpsMeter::new(),
            playing: false,
            forward: true,
            velocity: 1.0,
            last_estimate: TimelineTime::ZERO,
            collaborators: Vec::new(),
            generation: 0,
        }
    }

    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                SchedulerMsg::AttachPlayhead { handle, reply } => {
                    let result = self.attach_playhead(handle).await;
                    let _ = reply.send(result);
                }
                SchedulerMsg::DetachPlayhead { id } => self.detach_playhead(id),
                SchedulerMsg::PlayheadEvent { playhead, event } => {
                    self.handle_playhead_event(playhead, event);
                }
                SchedulerMsg::PlayheadGone { playhead } => {
                    debug!(%playhead, "playhead event feed closed, detaching");
                    self.detach_playhead(playhead);
                }
                SchedulerMsg::ShowFrame { frame, playing } => self.show_frame(frame, playing),
                SchedulerMsg::FutureFrames { frames } => self.future_frames(frames),
                SchedulerMsg::SwapOccurred { at, rate_hint } => {
                    self.observer.record_swap(at, rate_hint, self.playing);
                    self.fps.record_swap(at);
                }
                SchedulerMsg::FramesForDisplay { playhead, reply } => {
                    self.frames_for_display(playhead, reply).await;
                }
                SchedulerMsg::Augmented {
                    generation,
                    playhead,
                    result,
                    reply,
                } => {
                    self.deliver_augmented(generation, playhead, result, reply);
                }
                SchedulerMsg::AddCollaborator { handle } => {
                    self.collaborators.retain(|c| c.id != handle.id);
                    self.collaborators.push(handle);
                }
                SchedulerMsg::RemoveCollaborator { id } => {
                    self.collaborators.retain(|c| c.id != id);
                }
                SchedulerMsg::FpsLabel { reply } => {
                    let _ = reply.send(self.fps.display_string());
                }
            }
        }
    }

    /// Attach handshake: subscribe to the event feed, fetch the active
    /// child identity, then start forwarding events into the mailbox.
    async fn attach_playhead(&mut self, handle: PlayheadHandle) -> Result<()> {
        if let Some(previous) = self.playhead.take() {
            debug!(playhead = %previous.id, "detaching previous playhead");
            self.teardown(previous);
        }

        let events = handle.events.subscribe();

        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .queries
            .send(PlayheadQuery::ActiveChild { reply: reply_tx })
            .await
            .map_err(|_| DailiesError::Playhead(format!("{} query channel closed", handle.id)))?;
        let active_child = match timeout(ATTACH_TIMEOUT, reply_rx).await {
            Ok(Ok(child)) => child,
            Ok(Err(_)) => {
                return Err(DailiesError::Playhead(format!(
                    "{} dropped active-child query",
                    handle.id
                )))
            }
            Err(_) => {
                return Err(DailiesError::Timeout(format!(
                    "active-child query to {}",
                    handle.id
                )))
            }
        };

        let listener = spawn_event_listener(handle.id, events, self.self_tx.clone());

        self.active_child = Some(active_child);
        self.last_child_switch = None;
        self.phase.reset();
        self.generation += 1;
        self.playhead = Some(AttachedPlayhead {
            id: handle.id,
            queries: handle.queries,
            listener,
        });
        Ok(())
    }

    fn detach_playhead(&mut self, id: PlayheadId) {
        let attached = matches!(&self.playhead, Some(p) if p.id == id);
        if attached {
            if let Some(previous) = self.playhead.take() {
                self.teardown(previous);
            }
        } else {
            // a child identity: drop just its queue
            self.queues.remove(&id);
            if self.active_child == Some(id) {
                self.active_child = None;
            }
            self.generation += 1;
        }
    }

    fn teardown(&mut self, previous: AttachedPlayhead) {
        previous.listener.abort();
        self.queues.clear();
        self.active_child = None;
        self.removed_children.clear();
        self.phase.reset();
        self.generation += 1;
    }

    fn handle_playhead_event(&mut self, playhead: PlayheadId, event: PlayheadEvent) {
        if !matches!(&self.playhead, Some(p) if p.id == playhead) {
            return; // stale event from a previously attached playhead
        }
        match event {
            PlayheadEvent::Play(playing) => {
                self.playing = playing;
                self.fps.set_playing(playing);
            }
            PlayheadEvent::PlayForward(forward) => {
                self.forward = forward;
                self.fps.set_forward(forward);
            }
            PlayheadEvent::Velocity(velocity) => {
                self.velocity = velocity;
                self.fps.set_velocity(velocity);
            }
            PlayheadEvent::VelocityMultiplier(multiplier) => {
                self.fps.set_velocity_multiplier(multiplier);
            }
            PlayheadEvent::TargetRate(rate) => {
                self.fps.set_target_rate(rate);
            }
            PlayheadEvent::ActiveChildSwitched { child, switched_at } => {
                // switch notifications can arrive out of order while the
                // user scrubs through the media list; only the newest wins
                if self
                    .last_child_switch
                    .is_some_and(|last| switched_at < last)
                {
                    debug!(%child, "ignoring stale active-child switch");
                    return;
                }
                self.last_child_switch = Some(switched_at);
                self.active_child = Some(child);
                self.clear_removed_children();
            }
            PlayheadEvent::ChildrenRemoved(children) => {
                self.removed_children.extend(children);
            }
        }
    }

    /// Drop queues for children reported removed, except the active one:
    /// its images must stay up until a replacement child has frames.
    fn clear_removed_children(&mut self) {
        for child in std::mem::take(&mut self.removed_children) {
            if Some(child) == self.active_child {
                continue;
            }
            self.queues.remove(&child);
        }
    }

    fn show_frame(&mut self, frame: DisplayFrame, playing: bool) {
        if playing != self.playing {
            self.playing = playing;
            self.fps.set_playing(playing);
        }
        let threshold = frame.timestamp() - SHOW_EVICT_LAG;
        let queue = self.queues.entry(frame.playhead()).or_default();
        queue.enqueue(frame);
        queue.evict_stale(threshold);
        self.redraw.notify_one();
    }

    fn future_frames(&mut self, frames: Vec<DisplayFrame>) {
        for frame in frames {
            self.queues.entry(frame.playhead()).or_default().enqueue(frame);
        }
    }

    /// Answer a draw request: predict the playhead position, select the
    /// frame set, then (if collaborators are registered) fan the
    /// augmentation out off-task and deliver on join.
    async fn frames_for_display(
        &mut self,
        playhead: Option<PlayheadId>,
        reply: oneshot::Sender<Result<PresentationSnapshot>>,
    ) {
        let Some(target) = playhead.or(self.active_child) else {
            let _ = reply.send(Ok(PresentationSnapshot::empty()));
            return;
        };

        let position = self.predicted_position().await;

        let Some(queue) = self.queues.get_mut(&target) else {
            let _ = reply.send(Ok(PresentationSnapshot::empty()));
            return;
        };

        let snapshot = select_presentation(queue, target, position, self.forward);
        if snapshot.is_empty() || self.collaborators.is_empty() {
            let _ = reply.send(Ok(snapshot));
            return;
        }

        let generation = self.generation;
        let collaborators = self.collaborators.clone();
        let hero = self.active_child == Some(target);
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            let result = augment_snapshot(snapshot, collaborators, hero).await;
            let _ = tx
                .send(SchedulerMsg::Augmented {
                    generation,
                    playhead: target,
                    result,
                    reply,
                })
                .await;
        });
    }

    /// Deliver a joined augmentation result, unless the playhead was
    /// detached while the collaborators were working.
    fn deliver_augmented(
        &mut self,
        generation: u64,
        playhead: PlayheadId,
        result: Result<PresentationSnapshot>,
        reply: oneshot::Sender<Result<PresentationSnapshot>>,
    ) {
        let live = generation == self.generation && self.queues.contains_key(&playhead);
        if !live {
            debug!(%playhead, "discarding augmentation result for detached playhead");
            let _ = reply.send(Ok(PresentationSnapshot::empty()));
            return;
        }
        let _ = reply.send(result);
    }

    /// Predict the playhead position at the next buffer swap.
    ///
    /// Queries the playhead with a bounded timeout; on timeout the last
    /// known estimate is reused rather than failing the draw. Playing
    /// positions are phase locked onto the refresh beat; paused positions
    /// are returned raw.
    async fn predicted_position(&mut self) -> TimelineTime {
        let period = self.observer.compute_video_refresh();
        let next_swap = self.observer.next_refresh(period, Instant::now());

        let estimate = match self.query_position(next_swap, period).await {
            Some(estimate) => {
                self.last_estimate = estimate;
                estimate
            }
            None => self.last_estimate,
        };

        if !self.playing {
            return estimate;
        }
        self.phase.quantize(estimate, period, self.velocity)
    }

    async fn query_position(&self, at: Instant, refresh_period: Duration) -> Option<TimelineTime> {
        let attached = self.playhead.as_ref()?;
        let playhead_id = attached.id;

        let (reply_tx, reply_rx) = oneshot::channel();
        let query = PlayheadQuery::EstimatePositionAt {
            at,
            refresh_period,
            reply: reply_tx,
        };
        if attached.queries.send(query).await.is_err() {
            warn!(playhead = %playhead_id, "position query channel closed");
            return None;
        }
        match timeout(POSITION_REQUEST_TIMEOUT, reply_rx).await {
            Ok(Ok(estimate)) => Some(estimate),
            Ok(Err(_)) => {
                warn!(playhead = %playhead_id, "position query dropped");
                None
            }
            Err(_) => {
                warn!(
                    playhead = %playhead_id,
                    last_estimate = %self.last_estimate,
                    "position query timed out, reusing last estimate"
                );
                None
            }
        }
    }
}

/// Forward a playhead's broadcast events into the coordinator mailbox.
/// Channel closure means the playhead died and is reported as such.
fn spawn_event_listener(
    playhead: PlayheadId,
    mut events: tokio::sync::broadcast::Receiver<PlayheadEvent>,
    tx: mpsc::Sender<SchedulerMsg>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match events.recv().await {
                Ok(event) => {
                    if tx
                        .send(SchedulerMsg::PlayheadEvent { playhead, event })
                        .await
                        .is_err()
                    {
                        break; // scheduler shut down
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%playhead, skipped, "playhead event feed lagged");
                }
                Err(RecvError::Closed) => {
                    let _ = tx.send(SchedulerMsg::PlayheadGone { playhead }).await;
                    break;
                }
            }
        }
    })
}

/// Fan one prepare request out to every collaborator for the on-screen
/// frame and join the responses.
///
/// All requests are issued before any response is awaited, so
/// collaborators work in parallel and may complete out of order. A
/// collaborator that times out is skipped (its overlay just won't render
/// this frame); a collaborator that answers with an error aborts the
/// whole delivery, because a partially-augmented frame must never reach
/// the renderer.
async fn augment_snapshot(
    mut snapshot: PresentationSnapshot,
    collaborators: Vec<CollaboratorHandle>,
    hero: bool,
) -> Result<PresentationSnapshot> {
    let Some(on_screen) = snapshot.on_screen().cloned() else {
        return Ok(snapshot);
    };

    let mut pending = Vec::with_capacity(collaborators.len());
    for collaborator in &collaborators {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = PrepareBlindData {
            frame: on_screen.clone(),
            hero,
            reply: reply_tx,
        };
        if collaborator.requests.send(request).await.is_err() {
            warn!(collaborator = %collaborator.id, "collaborator request channel closed");
            continue;
        }
        pending.push((collaborator.id, reply_rx));
    }

    for (id, reply_rx) in pending {
        match timeout(COLLABORATOR_TIMEOUT, reply_rx).await {
            Ok(Ok(Ok(payload))) => {
                if let Some(frame) = snapshot.on_screen_mut() {
                    frame.attach_blind_data(id, payload);
                }
            }
            Ok(Ok(Err(err))) => {
                warn!(
                    collaborator = %id,
                    timestamp = %on_screen.timestamp(),
                    playhead = %on_screen.playhead(),
                    "collaborator failed, aborting delivery: {err}"
                );
                return Err(DailiesError::Collaborator(format!("{id}: {err}")));
            }
            Ok(Err(_)) | Err(_) => {
                warn!(
                    collaborator = %id,
                    timestamp = %on_screen.timestamp(),
                    "collaborator response missing, skipping its blind data"
                );
            }
        }
    }

    Ok(snapshot)
}
