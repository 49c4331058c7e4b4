//! Cadence - Playback Queue & Transport
//!
//! Queue sequencing and transport control for one playback session.
//!
//! This crate provides:
//! - Linear queue with a cursor (duplicates allowed)
//! - Shuffle as a play order anchored on the current track
//! - Repeat modes (none, one, all)
//! - Transport control (play, pause, resume, seek, next, previous, stop)
//! - Auto-advance on track completion
//! - Bounded skip-ahead past tracks that fail to load
//! - State snapshots and discrete events for UI observers
//!
//! # Architecture
//!
//! `cadence-playback` does not decode or output audio:
//! - Audio is behind the [`PlaybackEngine`] trait (load, play, pause, seek,
//!   status, release)
//! - [`TransportController`] runs as a single Tokio task that owns the queue
//!   and the one live engine resource
//! - [`SimulatedEngine`] is a deterministic engine for tests and demos
//!
//! # Example: Basic Playback
//!
//! ```rust,no_run
//! use cadence_playback::{PlaybackConfig, SimulatedEngine, TrackDescriptor, TransportController};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo() -> cadence_playback::Result<()> {
//! let engine = Arc::new(SimulatedEngine::new());
//! engine.add_media("mem://intro", Duration::from_secs(200));
//! engine.add_media("mem://verse", Duration::from_secs(233));
//!
//! let controller = TransportController::spawn(engine, PlaybackConfig::default());
//!
//! let intro = TrackDescriptor::new("intro", "mem://intro", Duration::from_secs(200))
//!     .with_title("Intro");
//! let verse = TrackDescriptor::new("verse", "mem://verse", Duration::from_secs(233));
//!
//! controller.play(intro.clone(), Some(vec![intro, verse])).await?;
//! controller.wait_for(|snapshot| snapshot.is_playing()).await?;
//!
//! controller.seek(30_000).await?;
//! controller.next().await?;
//!
//! controller.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Example: Observing Playback
//!
//! ```rust,no_run
//! use cadence_playback::{PlaybackEvent, TransportController};
//!
//! # async fn observe(controller: &TransportController) {
//! let mut events = controller.events();
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         PlaybackEvent::TrackChanged { track_id, .. } => println!("now playing {track_id}"),
//!         PlaybackEvent::EndOfQueue { .. } => break,
//!         _ => {}
//!     }
//! }
//! # }
//! ```

mod controller;
mod engine;
mod error;
mod events;
mod queue;
mod shuffle;
pub mod simulated;
pub mod types;

// Public exports
pub use controller::TransportController;
pub use engine::{EngineError, EngineResult, EngineStatus, PlaybackEngine, ResourceHandle};
pub use error::{PlaybackError, Result};
pub use events::{PlaybackEvent, PlaybackSnapshot};
pub use queue::Queue;
pub use simulated::{SimulatedEngine, SimulatedMedia};
pub use types::{
    format_time, Direction, FailureCause, FailureKind, PlaybackConfig, PlaybackStatus, RepeatMode,
    TrackDescriptor,
};
