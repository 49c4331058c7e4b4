//! Transport controller - core orchestration
//!
//! Coordinates the queue and the playback engine for one session.
//!
//! `TransportController` is a handle. Every call becomes a message to a
//! single actor task that owns the queue and the session, so commands and
//! progress polls never overlap:
//!
//! ```text
//! handle ──Command──▶ actor ──spawn──▶ load task ──LoadFinished{generation}──▶ actor
//!                       │
//!                       ├── poll tick (Playing only) ──▶ engine.status()
//!                       └── snapshot (watch) + events (broadcast) ──▶ observers
//! ```
//!
//! Each load carries a generation number. Newer loads, stops and teardown
//! bump it; a completion with an older generation has its resource
//! released and is never applied.

use crate::{
    engine::{EngineError, EngineResult, EngineStatus, PlaybackEngine, ResourceHandle},
    error::{PlaybackError, Result},
    events::{PlaybackEvent, PlaybackSnapshot},
    queue::Queue,
    types::{
        Direction, FailureCause, FailureKind, PlaybackConfig, PlaybackStatus, RepeatMode,
        TrackDescriptor,
    },
};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    SetQueue {
        tracks: Vec<TrackDescriptor>,
        start_index: usize,
        reply: Reply<()>,
    },
    Play {
        track: TrackDescriptor,
        queue: Option<Vec<TrackDescriptor>>,
        reply: Reply<()>,
    },
    Pause {
        reply: Reply<()>,
    },
    Resume {
        reply: Reply<()>,
    },
    Stop {
        reply: Reply<()>,
    },
    Skip {
        direction: Direction,
        reply: Reply<TrackDescriptor>,
    },
    Seek {
        position_ms: u64,
        reply: Reply<u64>,
    },
    ToggleShuffle {
        reply: Reply<bool>,
    },
    SetRepeat {
        mode: RepeatMode,
        reply: Reply<()>,
    },
    CycleRepeat {
        reply: Reply<RepeatMode>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Messages from tasks the actor spawned
enum Internal {
    LoadFinished {
        generation: u64,
        result: EngineResult<ResourceHandle>,
    },
    RetryDue {
        generation: u64,
    },
}

enum Step {
    Command(Option<Command>),
    Internal(Internal),
    Poll,
}

/// Session state
///
/// The engine resource lives inside the states that have one, so a paused
/// or playing session without a resource cannot be built.
#[derive(Debug)]
enum Session {
    Idle,
    Loading {
        track: TrackDescriptor,
    },
    Playing {
        track: TrackDescriptor,
        resource: ResourceHandle,
    },
    Paused {
        track: TrackDescriptor,
        resource: ResourceHandle,
    },
    Failed {
        track: Option<TrackDescriptor>,
        cause: FailureCause,
    },
}

impl Session {
    fn track(&self) -> Option<&TrackDescriptor> {
        match self {
            Session::Idle => None,
            Session::Loading { track }
            | Session::Playing { track, .. }
            | Session::Paused { track, .. } => Some(track),
            Session::Failed { track, .. } => track.as_ref(),
        }
    }

    fn resource(&self) -> Option<&ResourceHandle> {
        match self {
            Session::Playing { resource, .. } | Session::Paused { resource, .. } => Some(resource),
            _ => None,
        }
    }

    fn into_resource(self) -> Option<ResourceHandle> {
        match self {
            Session::Playing { resource, .. } | Session::Paused { resource, .. } => Some(resource),
            _ => None,
        }
    }

    fn status(&self) -> PlaybackStatus {
        match self {
            Session::Idle => PlaybackStatus::Idle,
            Session::Loading { .. } => PlaybackStatus::Loading,
            Session::Playing { .. } => PlaybackStatus::Playing,
            Session::Paused { .. } => PlaybackStatus::Paused,
            Session::Failed { cause, .. } => PlaybackStatus::Failed(cause.clone()),
        }
    }

    fn is_playing(&self) -> bool {
        matches!(self, Session::Playing { .. })
    }
}

/// Handle to a running transport controller
///
/// Operations never panic; each returns an explicit `Result` and every
/// state change is published to snapshot subscribers and event listeners.
/// Dropping the handle tears the session down and releases the engine
/// resource; `shutdown` does the same and waits for it. Once shut down,
/// every operation returns `ControllerClosed`.
pub struct TransportController {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<PlaybackSnapshot>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl TransportController {
    /// Start a controller driving `engine`
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(engine: Arc<dyn PlaybackEngine>, config: PlaybackConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_buffer.max(1));

        let mut queue = match config.shuffle_seed {
            Some(seed) => Queue::with_seed(seed),
            None => Queue::new(),
        };
        queue.set_repeat_mode(config.repeat);
        queue.set_shuffle(config.shuffle);

        let (snapshot_tx, snapshot_rx) = watch::channel(PlaybackSnapshot {
            is_shuffled: config.shuffle,
            repeat_mode: config.repeat,
            ..Default::default()
        });

        let actor = ControllerActor {
            engine,
            config,
            queue,
            session: Session::Idle,
            position_ms: 0,
            duration_ms: 0,
            generation: 0,
            load_task: None,
            retry_task: None,
            failure_streak: 0,
            seeked: false,
            restart_poll: false,
            commands: command_rx,
            internal: internal_rx,
            internal_tx,
            snapshot: snapshot_tx,
            events: events.clone(),
        };

        info!("Transport controller started");
        tokio::spawn(actor.run());

        Self {
            commands: command_tx,
            snapshot: snapshot_rx,
            events,
        }
    }

    // ===== Queue =====

    /// Replace the queue
    ///
    /// Does not interrupt the current track unless the new queue is empty,
    /// in which case playback stops and the controller goes idle.
    pub async fn set_queue(&self, tracks: Vec<TrackDescriptor>, start_index: usize) -> Result<()> {
        self.request(|reply| Command::SetQueue {
            tracks,
            start_index,
            reply,
        })
        .await
    }

    // ===== Playback Control =====

    /// Load and play `track`
    ///
    /// With `queue`, the queue is replaced first and the cursor placed on
    /// `track` (index 0 if it is not in the list). Without one, the cursor
    /// moves to `track` in the current queue, or a single-track queue is
    /// installed if it is not queued. Returns once loading has started.
    pub async fn play(
        &self,
        track: TrackDescriptor,
        queue: Option<Vec<TrackDescriptor>>,
    ) -> Result<()> {
        self.request(|reply| Command::Play {
            track,
            queue,
            reply,
        })
        .await
    }

    /// Pause playback (no-op unless playing)
    pub async fn pause(&self) -> Result<()> {
        self.request(|reply| Command::Pause { reply }).await
    }

    /// Resume playback (no-op unless paused)
    pub async fn resume(&self) -> Result<()> {
        self.request(|reply| Command::Resume { reply }).await
    }

    /// Release the current track and go idle, keeping the queue
    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Skip to next track
    ///
    /// At the end of the queue (without repeat-all) playback stops, the
    /// cursor stays on the last track and `EndOfQueue` is returned.
    pub async fn next(&self) -> Result<TrackDescriptor> {
        self.request(|reply| Command::Skip {
            direction: Direction::Next,
            reply,
        })
        .await
    }

    /// Go to previous track
    pub async fn previous(&self) -> Result<TrackDescriptor> {
        self.request(|reply| Command::Skip {
            direction: Direction::Previous,
            reply,
        })
        .await
    }

    /// Seek within the loaded track
    ///
    /// The target is clamped to the track duration; the applied position is
    /// returned.
    pub async fn seek(&self, position_ms: u64) -> Result<u64> {
        self.request(|reply| Command::Seek { position_ms, reply })
            .await
    }

    // ===== Shuffle & Repeat =====

    /// Toggle shuffle, returning the new flag
    pub async fn toggle_shuffle(&self) -> Result<bool> {
        self.request(|reply| Command::ToggleShuffle { reply }).await
    }

    pub async fn set_repeat_mode(&self, mode: RepeatMode) -> Result<()> {
        self.request(|reply| Command::SetRepeat { mode, reply })
            .await
    }

    /// Advance `none -> one -> all -> none`, returning the new mode
    pub async fn cycle_repeat_mode(&self) -> Result<RepeatMode> {
        self.request(|reply| Command::CycleRepeat { reply }).await
    }

    // ===== State Queries =====

    /// Latest published snapshot
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that observes every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshot.clone()
    }

    /// Receiver for discrete playback events
    pub fn events(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Wait until a published snapshot satisfies `predicate`
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&PlaybackSnapshot) -> bool,
    ) -> Result<PlaybackSnapshot> {
        let mut receiver = self.snapshot.clone();
        let snapshot = receiver
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| PlaybackError::ControllerClosed)?;
        Ok(snapshot.clone())
    }

    /// Stop polling, cancel pending loads and release the resource
    ///
    /// Returns after teardown has completed. Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        let (done, finished) = oneshot::channel();
        if self.commands.send(Command::Shutdown { done }).await.is_ok() {
            // Dropped unanswered if the controller was already tearing down
            let _ = finished.await;
        }
        Ok(())
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| PlaybackError::ControllerClosed)?;
        response.await.map_err(|_| PlaybackError::ControllerClosed)?
    }
}

/// Sole owner of the queue, the session and the engine resource
struct ControllerActor {
    engine: Arc<dyn PlaybackEngine>,
    config: PlaybackConfig,
    queue: Queue,
    session: Session,
    position_ms: u64,
    duration_ms: u64,

    /// Bumped by every load, stop and teardown
    generation: u64,
    load_task: Option<JoinHandle<()>>,
    retry_task: Option<JoinHandle<()>>,

    /// Consecutive load failures since the last successful load or caller command
    failure_streak: usize,

    /// A seek happened since the last poll, so a lower position is expected
    seeked: bool,

    /// Poll timer must restart from now
    restart_poll: bool,

    commands: mpsc::Receiver<Command>,
    internal: mpsc::UnboundedReceiver<Internal>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    snapshot: watch::Sender<PlaybackSnapshot>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl ControllerActor {
    async fn run(mut self) {
        let mut ticker = time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if std::mem::take(&mut self.restart_poll) {
                ticker.reset();
            }

            let playing = self.session.is_playing();
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                Some(message) = self.internal.recv() => Step::Internal(message),
                _ = ticker.tick(), if playing => Step::Poll,
            };

            match step {
                Step::Command(Some(command)) => {
                    if self.handle_command(command).await.is_break() {
                        return;
                    }
                }
                Step::Command(None) => {
                    debug!("All controller handles dropped");
                    self.teardown().await;
                    return;
                }
                Step::Internal(message) => self.handle_internal(message).await,
                Step::Poll => self.poll().await,
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::SetQueue {
                tracks,
                start_index,
                reply,
            } => {
                let result = self.set_queue(tracks, start_index).await;
                let _ = reply.send(result);
            }
            Command::Play {
                track,
                queue,
                reply,
            } => {
                let result = self.play(track, queue).await;
                let _ = reply.send(result);
            }
            Command::Pause { reply } => {
                let result = self.pause().await;
                let _ = reply.send(result);
            }
            Command::Resume { reply } => {
                let result = self.resume().await;
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                self.failure_streak = 0;
                info!("Stopping playback");
                self.stop_session().await;
                self.publish();
                let _ = reply.send(Ok(()));
            }
            Command::Skip { direction, reply } => {
                self.failure_streak = 0;
                let result = self.advance(direction).await;
                let _ = reply.send(result);
            }
            Command::Seek { position_ms, reply } => {
                let result = self.seek(position_ms).await;
                let _ = reply.send(result);
            }
            Command::ToggleShuffle { reply } => {
                let enabled = self.queue.toggle_shuffle();
                info!(enabled, "Shuffle toggled");
                self.emit(PlaybackEvent::ShuffleChanged { enabled });
                self.publish();
                let _ = reply.send(Ok(enabled));
            }
            Command::SetRepeat { mode, reply } => {
                self.set_repeat(mode);
                let _ = reply.send(Ok(()));
            }
            Command::CycleRepeat { reply } => {
                let mode = self.queue.repeat_mode().cycle();
                self.set_repeat(mode);
                let _ = reply.send(Ok(mode));
            }
            Command::Shutdown { done } => {
                self.teardown().await;
                let _ = done.send(());
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }

    async fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::LoadFinished { generation, result } => {
                self.on_load_finished(generation, result).await;
            }
            Internal::RetryDue { generation } => self.on_retry_due(generation).await,
        }
    }

    // ===== Queue =====

    async fn set_queue(&mut self, tracks: Vec<TrackDescriptor>, start_index: usize) -> Result<()> {
        self.queue.set_queue(tracks, start_index);
        info!(length = self.queue.len(), start_index, "Queue replaced");
        self.emit(PlaybackEvent::QueueChanged {
            length: self.queue.len(),
        });

        if self.queue.is_empty() {
            self.stop_session().await;
        }

        self.publish();
        Ok(())
    }

    // ===== Playback Control =====

    async fn play(
        &mut self,
        track: TrackDescriptor,
        queue: Option<Vec<TrackDescriptor>>,
    ) -> Result<()> {
        self.failure_streak = 0;

        match queue {
            Some(tracks) if !tracks.is_empty() => {
                let start = tracks
                    .iter()
                    .position(|candidate| candidate.id == track.id)
                    .unwrap_or(0);
                self.queue.set_queue(tracks, start);
                self.emit(PlaybackEvent::QueueChanged {
                    length: self.queue.len(),
                });
            }
            _ => match self.queue.locate(&track.id) {
                Some(index) => {
                    self.queue.jump_to(index)?;
                }
                None => {
                    debug!(track_id = %track.id, "Track not queued, playing it alone");
                    self.queue.set_queue(vec![track], 0);
                    self.emit(PlaybackEvent::QueueChanged { length: 1 });
                }
            },
        }

        let target = self.queue.current().cloned().ok_or(PlaybackError::EmptyQueue)?;
        self.start_load(target).await;
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        let (track, resource) = match std::mem::replace(&mut self.session, Session::Idle) {
            Session::Playing { track, resource } => (track, resource),
            other => {
                debug!(state = other.status().name(), "Pause ignored");
                self.session = other;
                return Ok(());
            }
        };

        if let Err(error) = self.engine.pause(&resource).await {
            self.release(resource).await;
            self.fail(Some(track), FailureKind::Pause, &error).await;
            return Err(error.into());
        }

        if let Ok(status) = self.engine.status(&resource).await {
            self.position_ms = status.position_ms.min(self.duration_ms);
        }

        info!(track_id = %track.id, position_ms = self.position_ms, "Paused");
        self.session = Session::Paused { track, resource };
        self.emit_state();
        self.publish();
        Ok(())
    }

    async fn resume(&mut self) -> Result<()> {
        let (track, resource) = match std::mem::replace(&mut self.session, Session::Idle) {
            Session::Paused { track, resource } => (track, resource),
            other => {
                debug!(state = other.status().name(), "Resume ignored");
                self.session = other;
                return Ok(());
            }
        };

        if let Err(error) = self.engine.play(&resource).await {
            self.release(resource).await;
            self.fail(Some(track), FailureKind::Play, &error).await;
            return Err(error.into());
        }

        info!(track_id = %track.id, position_ms = self.position_ms, "Resumed");
        self.session = Session::Playing { track, resource };
        self.restart_poll = true;
        self.emit_state();
        self.publish();
        Ok(())
    }

    /// Move the cursor and load whatever it lands on
    ///
    /// Shared by explicit next/previous and auto-advance on completion.
    async fn advance(&mut self, direction: Direction) -> Result<TrackDescriptor> {
        match self.queue.advance(direction).cloned() {
            Ok(track) => {
                self.start_load(track.clone()).await;
                Ok(track)
            }
            Err(PlaybackError::EndOfQueue) => {
                info!(?direction, "End of queue reached");
                self.stop_session().await;
                self.emit(PlaybackEvent::EndOfQueue { direction });
                self.publish();
                Err(PlaybackError::EndOfQueue)
            }
            Err(error) => Err(error),
        }
    }

    async fn seek(&mut self, position_ms: u64) -> Result<u64> {
        let Some(resource) = self.session.resource() else {
            debug!(state = self.session.status().name(), "Seek ignored, nothing loaded");
            return Err(PlaybackError::NoResourceLoaded);
        };

        let target = position_ms.min(self.duration_ms);
        if target != position_ms {
            debug!(requested = position_ms, target, "Seek target clamped");
        }

        let result = self.engine.seek(resource, target).await;
        match result {
            Ok(()) => {
                self.position_ms = target;
                self.seeked = true;
                self.emit(PlaybackEvent::PositionUpdate {
                    position_ms: target,
                    duration_ms: self.duration_ms,
                });
                self.publish();
                Ok(target)
            }
            Err(error) => {
                let track = self.session.track().cloned();
                self.fail(track, FailureKind::Seek, &error).await;
                Err(error.into())
            }
        }
    }

    fn set_repeat(&mut self, mode: RepeatMode) {
        self.queue.set_repeat_mode(mode);
        info!(%mode, "Repeat mode set");
        self.emit(PlaybackEvent::RepeatModeChanged { mode });
        self.publish();
    }

    // ===== Loading =====

    /// Release the current resource and start loading `track`
    async fn start_load(&mut self, track: TrackDescriptor) {
        self.supersede().await;

        let previous_track_id = self.session.track().map(|current| current.id.clone());
        self.release_into(Session::Loading {
            track: track.clone(),
        })
        .await;
        self.position_ms = 0;
        self.duration_ms = track.duration_hint_ms();
        self.seeked = false;

        let generation = self.generation;
        info!(track_id = %track.id, generation, "Loading track");
        self.emit(PlaybackEvent::TrackChanged {
            track_id: track.id.clone(),
            previous_track_id,
        });
        self.emit_state();
        self.publish();

        let engine = Arc::clone(&self.engine);
        let internal = self.internal_tx.clone();
        let locator = track.media_locator;
        self.load_task = Some(tokio::spawn(async move {
            let result = engine.load(&locator).await;
            let _ = internal.send(Internal::LoadFinished { generation, result });
        }));
    }

    async fn on_load_finished(&mut self, generation: u64, result: EngineResult<ResourceHandle>) {
        if generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                "Discarding stale load result"
            );
            if let Ok(resource) = result {
                self.release(resource).await;
            }
            return;
        }

        self.load_task = None;

        let track = match std::mem::replace(&mut self.session, Session::Idle) {
            Session::Loading { track } => track,
            other => {
                self.session = other;
                if let Ok(resource) = result {
                    self.release(resource).await;
                }
                return;
            }
        };

        match result {
            Ok(resource) => self.begin_playback(track, resource).await,
            Err(error) => self.on_load_failed(track, error),
        }
    }

    async fn begin_playback(&mut self, track: TrackDescriptor, resource: ResourceHandle) {
        if let Err(error) = self.engine.play(&resource).await {
            self.release(resource).await;
            self.fail(Some(track), FailureKind::Play, &error).await;
            return;
        }

        let duration_ms = match self.engine.status(&resource).await {
            Ok(status) if status.duration_ms > 0 => status.duration_ms,
            Ok(_) => track.duration_hint_ms(),
            Err(error) => {
                debug!("No status after load, keeping duration hint: {}", error);
                track.duration_hint_ms()
            }
        };

        self.position_ms = 0;
        self.duration_ms = duration_ms;
        self.failure_streak = 0;
        self.restart_poll = true;

        info!(track_id = %track.id, duration_ms, "Playback started");
        self.session = Session::Playing { track, resource };
        self.emit_state();
        self.publish();
    }

    fn on_load_failed(&mut self, track: TrackDescriptor, error: EngineError) {
        self.failure_streak += 1;
        let attempts = self.failure_streak;

        let failure = PlaybackError::LoadFailure {
            locator: track.media_locator.clone(),
            reason: error.to_string(),
        };
        warn!(track_id = %track.id, attempts, "{}", failure);

        self.emit(PlaybackEvent::LoadFailed {
            track_id: track.id.clone(),
            message: failure.to_string(),
        });
        self.session = Session::Failed {
            cause: FailureCause {
                kind: FailureKind::Load,
                track_id: Some(track.id.clone()),
                message: failure.to_string(),
            },
            track: Some(track),
        };
        self.emit_state();
        self.publish();

        // One attempt per queued track at most, so an all-broken queue stops
        if attempts < self.queue.len() {
            let generation = self.generation;
            let delay = self.config.failure_retry_delay();
            let internal = self.internal_tx.clone();
            debug!(?delay, "Scheduling skip past failed track");
            self.retry_task = Some(tokio::spawn(async move {
                time::sleep(delay).await;
                let _ = internal.send(Internal::RetryDue { generation });
            }));
        } else {
            warn!(attempts, "Giving up after consecutive load failures");
            self.emit(PlaybackEvent::RetriesExhausted { attempts });
        }
    }

    async fn on_retry_due(&mut self, generation: u64) {
        if generation != self.generation || !matches!(self.session, Session::Failed { .. }) {
            return;
        }
        self.retry_task = None;

        match self.queue.advance(Direction::Next).cloned() {
            Ok(track) => {
                info!(track_id = %track.id, "Skipping to next track after load failure");
                self.start_load(track).await;
            }
            Err(error) => {
                info!("No track left to try after load failure: {}", error);
                if matches!(error, PlaybackError::EndOfQueue) {
                    self.emit(PlaybackEvent::EndOfQueue {
                        direction: Direction::Next,
                    });
                }
                self.publish();
            }
        }
    }

    // ===== Progress =====

    async fn poll(&mut self) {
        let Some(resource) = self.session.resource() else {
            return;
        };

        let result = self.engine.status(resource).await;
        match result {
            Ok(status) => self.apply_status(status).await,
            Err(error) => {
                let track = self.session.track().cloned();
                self.fail(track, FailureKind::Status, &error).await;
            }
        }
    }

    async fn apply_status(&mut self, status: EngineStatus) {
        if status.duration_ms > 0 {
            self.duration_ms = status.duration_ms;
        }

        let reported = if self.duration_ms > 0 {
            status.position_ms.min(self.duration_ms)
        } else {
            status.position_ms
        };

        // Position only moves backwards after a seek
        self.position_ms = if self.seeked {
            reported
        } else {
            reported.max(self.position_ms)
        };
        self.seeked = false;

        self.emit(PlaybackEvent::PositionUpdate {
            position_ms: self.position_ms,
            duration_ms: self.duration_ms,
        });
        self.publish();

        if status.is_finished {
            self.on_track_finished().await;
        }
    }

    async fn on_track_finished(&mut self) {
        let Some(track) = self.session.track().cloned() else {
            return;
        };

        info!(track_id = %track.id, "Track finished");
        self.emit(PlaybackEvent::TrackFinished {
            track_id: track.id.clone(),
        });

        if self.queue.repeat_mode() == RepeatMode::One {
            self.replay(track).await;
        } else {
            // End of queue is reported through the snapshot and events
            let _ = self.advance(Direction::Next).await;
        }
    }

    /// Restart the loaded track from 0 without touching the queue
    async fn replay(&mut self, track: TrackDescriptor) {
        let Some(resource) = self.session.resource() else {
            return;
        };

        let result = rewind(self.engine.as_ref(), resource).await;
        match result {
            Ok(()) => {
                debug!(track_id = %track.id, "Replaying track");
                self.position_ms = 0;
                self.seeked = true;
                self.restart_poll = true;
                self.emit(PlaybackEvent::PositionUpdate {
                    position_ms: 0,
                    duration_ms: self.duration_ms,
                });
                self.publish();
            }
            Err(error) => {
                warn!(track_id = %track.id, "Replay failed, reloading track: {}", error);
                self.start_load(track).await;
            }
        }
    }

    // ===== Session plumbing =====

    /// Invalidate the in-flight load and any scheduled retry
    ///
    /// A load that completed before it could be cancelled still hands back
    /// a resource; it is released here so the next load never overlaps it.
    async fn supersede(&mut self) {
        self.generation += 1;
        for task in [self.load_task.take(), self.retry_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
            let _ = task.await;
        }

        while let Ok(message) = self.internal.try_recv() {
            if let Internal::LoadFinished {
                result: Ok(resource),
                ..
            } = message
            {
                debug!(handle = resource.id(), "Releasing superseded load");
                self.release(resource).await;
            }
        }
    }

    async fn stop_session(&mut self) {
        self.supersede().await;
        let was_idle = matches!(self.session, Session::Idle);
        self.release_into(Session::Idle).await;
        self.position_ms = 0;
        self.duration_ms = 0;
        self.seeked = false;
        if !was_idle {
            self.emit_state();
        }
    }

    async fn fail(&mut self, track: Option<TrackDescriptor>, kind: FailureKind, error: &EngineError) {
        let cause = FailureCause {
            kind,
            track_id: track.as_ref().map(|failed| failed.id.clone()),
            message: error.to_string(),
        };
        error!("Playback failed: {}", cause);

        self.release_into(Session::Failed { track, cause }).await;
        self.emit_state();
        self.publish();
    }

    /// Swap in `next` and release the resource the old state held
    async fn release_into(&mut self, next: Session) {
        let previous = std::mem::replace(&mut self.session, next);
        if let Some(resource) = previous.into_resource() {
            self.release(resource).await;
        }
    }

    async fn release(&self, resource: ResourceHandle) {
        let id = resource.id();
        match self.engine.release(resource).await {
            Ok(()) => debug!(handle = id, "Released engine resource"),
            Err(error) => warn!(handle = id, "Failed to release engine resource: {}", error),
        }
    }

    async fn teardown(&mut self) {
        // Nothing may be applied after this point
        self.internal.close();
        self.supersede().await;

        self.release_into(Session::Idle).await;
        self.position_ms = 0;
        self.duration_ms = 0;
        self.publish();
        info!("Transport controller stopped");
    }

    fn publish(&self) {
        let current_track = self
            .session
            .track()
            .or_else(|| self.queue.current())
            .cloned();

        self.snapshot.send_replace(PlaybackSnapshot {
            current_track,
            current_index: self.queue.current_index(),
            queue_len: self.queue.len(),
            status: self.session.status(),
            position_ms: self.position_ms,
            duration_ms: self.duration_ms,
            is_shuffled: self.queue.is_shuffled(),
            repeat_mode: self.queue.repeat_mode(),
        });
    }

    fn emit(&self, event: PlaybackEvent) {
        // No listeners is fine
        let _ = self.events.send(event);
    }

    fn emit_state(&self) {
        self.emit(PlaybackEvent::StateChanged {
            status: self.session.status(),
        });
    }
}

async fn rewind(engine: &dyn PlaybackEngine, resource: &ResourceHandle) -> EngineResult<()> {
    engine.seek(resource, 0).await?;
    engine.play(resource).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedEngine;
    use std::time::Duration;

    fn create_test_track(id: &str) -> TrackDescriptor {
        TrackDescriptor::new(id, format!("mem://{}", id), Duration::from_secs(180))
    }

    fn engine_with(ids: &[&str]) -> Arc<SimulatedEngine> {
        let engine = Arc::new(SimulatedEngine::new());
        for id in ids {
            engine.add_media(format!("mem://{}", id), Duration::from_secs(180));
        }
        engine
    }

    #[tokio::test(start_paused = true)]
    async fn create_transport_controller() {
        let controller = TransportController::spawn(engine_with(&[]), PlaybackConfig::default());
        let snapshot = controller.snapshot();

        assert_eq!(snapshot.status, PlaybackStatus::Idle);
        assert_eq!(snapshot.queue_len, 0);
        assert!(snapshot.current_track.is_none());
        controller.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn config_seeds_repeat_and_shuffle() {
        let config = PlaybackConfig {
            repeat: RepeatMode::All,
            shuffle: true,
            shuffle_seed: Some(9),
            ..Default::default()
        };
        let controller = TransportController::spawn(engine_with(&[]), config);

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.repeat_mode, RepeatMode::All);
        assert!(snapshot.is_shuffled);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_are_noops_when_idle() {
        let controller = TransportController::spawn(engine_with(&[]), PlaybackConfig::default());

        controller.pause().await.unwrap();
        controller.resume().await.unwrap();
        assert_eq!(controller.snapshot().status, PlaybackStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn seek_without_resource_is_rejected() {
        let controller = TransportController::spawn(engine_with(&["a"]), PlaybackConfig::default());
        controller
            .set_queue(vec![create_test_track("a")], 0)
            .await
            .unwrap();

        assert!(matches!(
            controller.seek(1_000).await,
            Err(PlaybackError::NoResourceLoaded)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn skipping_an_empty_queue_reports_empty_queue() {
        let controller = TransportController::spawn(engine_with(&[]), PlaybackConfig::default());

        assert!(matches!(
            controller.next().await,
            Err(PlaybackError::EmptyQueue)
        ));
        assert!(matches!(
            controller.previous().await,
            Err(PlaybackError::EmptyQueue)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn play_unqueued_track_installs_single_track_queue() {
        let engine = engine_with(&["a", "b", "x"]);
        let controller = TransportController::spawn(engine.clone(), PlaybackConfig::default());
        controller
            .set_queue(vec![create_test_track("a"), create_test_track("b")], 0)
            .await
            .unwrap();

        controller.play(create_test_track("x"), None).await.unwrap();
        let snapshot = controller.wait_for(|s| s.is_playing()).await.unwrap();

        assert_eq!(snapshot.current_track_id(), Some("x"));
        assert_eq!(snapshot.queue_len, 1);
        assert_eq!(snapshot.current_index, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn play_queued_track_moves_cursor() {
        let engine = engine_with(&["a", "b", "c"]);
        let controller = TransportController::spawn(engine.clone(), PlaybackConfig::default());
        let queue = vec![
            create_test_track("a"),
            create_test_track("b"),
            create_test_track("c"),
        ];
        controller.set_queue(queue, 0).await.unwrap();

        controller.play(create_test_track("c"), None).await.unwrap();
        let snapshot = controller.wait_for(|s| s.is_playing()).await.unwrap();

        assert_eq!(snapshot.current_index, Some(2));
        assert_eq!(snapshot.queue_len, 3);
        assert_eq!(engine.loaded_locator().as_deref(), Some("mem://c"));
    }

    #[tokio::test(start_paused = true)]
    async fn play_with_queue_missing_the_track_starts_at_index_zero() {
        let engine = engine_with(&["a", "b"]);
        let controller = TransportController::spawn(engine.clone(), PlaybackConfig::default());

        controller
            .play(
                create_test_track("zzz"),
                Some(vec![create_test_track("a"), create_test_track("b")]),
            )
            .await
            .unwrap();
        let snapshot = controller.wait_for(|s| s.is_playing()).await.unwrap();

        assert_eq!(snapshot.current_index, Some(0));
        assert_eq!(snapshot.current_track_id(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn commands_after_shutdown_report_closed() {
        let controller = TransportController::spawn(engine_with(&[]), PlaybackConfig::default());
        controller.shutdown().await.unwrap();

        assert!(matches!(
            controller.pause().await,
            Err(PlaybackError::ControllerClosed)
        ));
        assert!(matches!(
            controller.next().await,
            Err(PlaybackError::ControllerClosed)
        ));
        // Second shutdown is harmless
        controller.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_releases_the_resource() {
        let engine = engine_with(&["a"]);
        let controller = TransportController::spawn(engine.clone(), PlaybackConfig::default());
        controller.play(create_test_track("a"), None).await.unwrap();
        controller.wait_for(|s| s.is_playing()).await.unwrap();
        assert_eq!(engine.live_resources(), 1);

        drop(controller);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(engine.live_resources(), 0);
    }
}
