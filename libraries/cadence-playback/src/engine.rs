//! Playback engine contract
//!
//! Abstracts the platform audio resource (native player, decoder + output,
//! remote renderer) behind a narrow async interface.

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a playback engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Locator does not resolve to any media
    #[error("Media not found: {0}")]
    NotFound(String),

    /// Media was found but could not be opened or decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Handle does not refer to a live resource
    #[error("Invalid resource handle: {0}")]
    InvalidHandle(u64),

    #[error("{0}")]
    Other(String),
}

/// Result type for engine commands
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Exclusive handle to a loaded engine resource
///
/// Not `Clone`: the controller is the single owner, and `release` consumes
/// the handle so a resource cannot be released twice.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ResourceHandle(u64);

impl ResourceHandle {
    /// Wrap an engine-assigned resource id
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Transport status reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStatus {
    /// Elapsed position
    pub position_ms: u64,

    /// Actual media duration (0 when not yet known)
    pub duration_ms: u64,

    /// Track reached its natural end
    pub is_finished: bool,
}

/// Platform playback engine
///
/// Implementors own the actual audio output. The transport controller
/// holds at most one resource at a time and always releases it before
/// loading the next one.
#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    /// Open a media locator into a new resource
    ///
    /// The resource starts paused at position 0.
    async fn load(&self, locator: &str) -> EngineResult<ResourceHandle>;

    /// Start or resume output
    async fn play(&self, handle: &ResourceHandle) -> EngineResult<()>;

    /// Pause output, keeping the position
    async fn pause(&self, handle: &ResourceHandle) -> EngineResult<()>;

    /// Move to an absolute position (already clamped by the caller)
    async fn seek(&self, handle: &ResourceHandle, position_ms: u64) -> EngineResult<()>;

    /// Current position, duration and completion flag
    async fn status(&self, handle: &ResourceHandle) -> EngineResult<EngineStatus>;

    /// Release the resource
    async fn release(&self, handle: ResourceHandle) -> EngineResult<()>;
}
