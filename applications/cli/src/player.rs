//! Playlist playback session
//!
//! Runs one playlist through the transport controller until the queue ends,
//! every track fails to load, or the caller interrupts.

use crate::config::CliConfig;
use crate::error::{CliError, Result};
use crate::playlist::Playlist;
use cadence_playback::{
    format_time, PlaybackEvent, PlaybackStatus, RepeatMode, SimulatedEngine, TransportController,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

/// Command-line overrides for one session
#[derive(Debug, Clone, Default)]
pub struct PlayOptions {
    /// Track id or 1-based position to start from
    pub start: Option<String>,
    pub repeat: Option<RepeatMode>,
    pub shuffle: bool,
    /// Overrides `simulation.speed`
    pub speed: Option<f64>,
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Playback ran off the end of the queue
    Finished,
    /// Stopped skipping after this many consecutive load failures
    GaveUp { attempts: usize },
    Interrupted,
}

/// Play `playlist` until it ends or `interrupt` resolves
pub async fn play(
    playlist: &Playlist,
    config: &CliConfig,
    options: &PlayOptions,
    interrupt: impl Future<Output = ()>,
) -> Result<Outcome> {
    let speed = options.speed.unwrap_or(config.simulation.speed);
    if !speed.is_finite() || speed <= 0.0 {
        return Err(CliError::Config(format!("invalid speed: {}", speed)));
    }

    let engine = Arc::new(SimulatedEngine::with_rate(speed));
    playlist.register(&engine);

    let mut playback = config.playback.clone();
    if let Some(repeat) = options.repeat {
        playback.repeat = repeat;
    }
    playback.shuffle |= options.shuffle;

    let tracks = playlist.descriptors();
    let start = match &options.start {
        Some(start) => playlist.resolve_start(start)?,
        None => 0,
    };
    let first = tracks
        .get(start)
        .cloned()
        .ok_or_else(|| CliError::Playlist("playlist has no tracks".to_string()))?;

    info!(
        playlist = playlist.display_name(),
        tracks = tracks.len(),
        repeat = %playback.repeat,
        shuffle = playback.shuffle,
        speed,
        "Starting playback"
    );

    let controller = TransportController::spawn(engine, playback);
    let mut events = controller.events();

    controller.set_queue(tracks, start).await?;
    controller.play(first, None).await?;

    tokio::pin!(interrupt);
    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(outcome) = report(&event, &controller) {
                        break outcome;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed playback events"),
                Err(RecvError::Closed) => break Outcome::Finished,
            },
            () = &mut interrupt => {
                info!("Interrupted");
                break Outcome::Interrupted;
            }
        }
    };

    controller.shutdown().await?;
    Ok(outcome)
}

/// Log one event; returns the outcome when the session is over
fn report(event: &PlaybackEvent, controller: &TransportController) -> Option<Outcome> {
    match event {
        PlaybackEvent::TrackChanged { track_id, .. } => {
            let snapshot = controller.snapshot();
            let title = snapshot
                .current_track
                .as_ref()
                .filter(|track| &track.id == track_id)
                .and_then(|track| track.title.clone())
                .unwrap_or_else(|| track_id.clone());
            info!(track_id = %track_id, index = ?snapshot.current_index, "Now playing: {}", title);
        }
        PlaybackEvent::PositionUpdate {
            position_ms,
            duration_ms,
        } => {
            debug!("{} / {}", format_time(*position_ms), format_time(*duration_ms));
        }
        PlaybackEvent::StateChanged {
            status: PlaybackStatus::Failed(cause),
        } => warn!("{}", cause),
        PlaybackEvent::StateChanged { status } => debug!(state = status.name(), "State changed"),
        PlaybackEvent::TrackFinished { track_id } => info!(track_id = %track_id, "Track finished"),
        PlaybackEvent::LoadFailed { track_id, message } => {
            warn!(track_id = %track_id, "{}", message);
        }
        PlaybackEvent::RetriesExhausted { attempts } => {
            error!(attempts, "No playable track left");
            return Some(Outcome::GaveUp {
                attempts: *attempts,
            });
        }
        PlaybackEvent::EndOfQueue { .. } => {
            info!("Reached end of playlist");
            return Some(Outcome::Finished);
        }
        PlaybackEvent::QueueChanged { length } => debug!(length, "Queue replaced"),
        PlaybackEvent::ShuffleChanged { .. } | PlaybackEvent::RepeatModeChanged { .. } => {}
    }

    None
}
