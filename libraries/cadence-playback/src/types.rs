//! Core types for queue and transport control

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Playable item handed to the queue
///
/// Immutable once queued. The display fields are carried through to
/// observers untouched; the controller only reads `id`, `media_locator`
/// and `duration_hint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    /// Opaque identifier, stable for the session. Duplicates are allowed.
    pub id: String,

    /// URI or path handed to the engine's `load`
    pub media_locator: String,

    /// Expected length, used until the engine reports the real duration
    pub duration_hint: Duration,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub artist: Option<String>,

    #[serde(default)]
    pub album: Option<String>,

    #[serde(default)]
    pub cover_url: Option<String>,
}

impl TrackDescriptor {
    pub fn new(
        id: impl Into<String>,
        media_locator: impl Into<String>,
        duration_hint: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            media_locator: media_locator.into(),
            duration_hint,
            title: None,
            artist: None,
            album: None,
            cover_url: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_cover_url(mut self, cover_url: impl Into<String>) -> Self {
        self.cover_url = Some(cover_url.into());
        self
    }

    /// Duration hint in milliseconds
    pub fn duration_hint_ms(&self) -> u64 {
        self.duration_hint.as_millis() as u64
    }
}

/// Repeat mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Stop when queue ends
    #[default]
    #[serde(rename = "none", alias = "off")]
    Off,

    /// Loop current track only
    One,

    /// Loop entire queue
    All,
}

impl RepeatMode {
    /// Next mode in the `none -> one -> all` button cycle
    pub fn cycle(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::One,
            RepeatMode::One => RepeatMode::All,
            RepeatMode::All => RepeatMode::Off,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RepeatMode::Off => "none",
            RepeatMode::One => "one",
            RepeatMode::All => "all",
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepeatMode {
    type Err = PlaybackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(RepeatMode::Off),
            "one" => Ok(RepeatMode::One),
            "all" => Ok(RepeatMode::All),
            other => Err(PlaybackError::Config(format!(
                "unknown repeat mode '{other}' (expected none, one or all)"
            ))),
        }
    }
}

/// Direction of a queue step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Previous,
}

/// Which engine command produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Load,
    Play,
    Pause,
    Seek,
    Status,
}

/// Recorded cause of a `Failed` status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCause {
    pub kind: FailureKind,

    /// Track that was loading or playing when the failure happened
    pub track_id: Option<String>,

    pub message: String,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.track_id {
            Some(id) => write!(f, "{:?} failed for {}: {}", self.kind, id, self.message),
            None => write!(f, "{:?} failed: {}", self.kind, self.message),
        }
    }
}

/// Observable transport status
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "cause", rename_all = "lowercase")]
pub enum PlaybackStatus {
    /// Nothing loaded
    #[default]
    Idle,

    /// Waiting for the engine to open the current track
    Loading,

    /// Currently playing
    Playing,

    /// Paused mid-track
    Paused,

    /// An engine command failed
    Failed(FailureCause),
}

impl PlaybackStatus {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackStatus::Playing)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PlaybackStatus::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::Loading => "loading",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Failed(_) => "failed",
        }
    }
}

/// Configuration for the transport controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Progress poll cadence while playing (default: 1000)
    pub poll_interval_ms: u64,

    /// Delay before skipping past a track that failed to load (default: 1000)
    pub failure_retry_delay_ms: u64,

    /// Pending command capacity (default: 64)
    pub command_buffer: usize,

    /// Event broadcast capacity (default: 128)
    pub event_buffer: usize,

    /// Initial repeat mode (default: none)
    pub repeat: RepeatMode,

    /// Initial shuffle flag (default: false)
    pub shuffle: bool,

    /// Fixed shuffle seed for reproducible play orders
    pub shuffle_seed: Option<u64>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            failure_retry_delay_ms: 1000,
            command_buffer: 64,
            event_buffer: 128,
            repeat: RepeatMode::Off,
            shuffle: false,
            shuffle_seed: None,
        }
    }
}

impl PlaybackConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn failure_retry_delay(&self) -> Duration {
        Duration::from_millis(self.failure_retry_delay_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(PlaybackError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        if self.command_buffer == 0 || self.event_buffer == 0 {
            return Err(PlaybackError::Config(
                "command_buffer and event_buffer must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Format milliseconds as `m:ss`
pub fn format_time(milliseconds: u64) -> String {
    let seconds = milliseconds / 1000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
