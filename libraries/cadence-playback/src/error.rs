//! Error types for queue and transport control

use crate::engine::EngineError;
use thiserror::Error;

/// Playback errors
///
/// Every controller operation reports one of these as an explicit outcome.
/// None of them is raised as a panic.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Operation attempted with no tracks queued
    #[error("Queue is empty")]
    EmptyQueue,

    /// No eligible next/previous track under the current repeat mode
    #[error("End of queue reached")]
    EndOfQueue,

    /// The engine could not open a media locator
    #[error("Failed to load {locator}: {reason}")]
    LoadFailure { locator: String, reason: String },

    /// No resource is attached (idle, loading or failed)
    #[error("No track loaded")]
    NoResourceLoaded,

    /// Seek target outside the track; seeks clamp instead of returning this
    #[error("Invalid seek position: {0}ms")]
    InvalidSeekTarget(u64),

    /// Index out of bounds
    #[error("Index out of bounds: {0}")]
    IndexOutOfBounds(usize),

    /// Engine command failed
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// The controller task is gone (shut down or dropped)
    #[error("Playback controller has shut down")]
    ControllerClosed,

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
