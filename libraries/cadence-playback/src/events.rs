//! Playback events and snapshots
//!
//! Observers get two views of the session:
//! - `PlaybackSnapshot`: latest full state, published on every change
//! - `PlaybackEvent`: discrete transitions (track changes, failures, ...)

use crate::types::{Direction, PlaybackStatus, RepeatMode, TrackDescriptor};
use serde::{Deserialize, Serialize};

/// Events emitted by the transport controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlaybackEvent {
    /// Transport status changed
    StateChanged {
        /// The new status
        status: PlaybackStatus,
    },

    /// A different track started loading
    TrackChanged {
        /// ID of the new (current) track
        track_id: String,
        /// ID of the previous track (if any)
        previous_track_id: Option<String>,
    },

    /// Track finished playing naturally (reached end)
    TrackFinished {
        /// ID of the finished track
        track_id: String,
    },

    /// Position update (each poll while playing, and after seeks)
    PositionUpdate {
        /// Current playback position
        position_ms: u64,
        /// Total track duration
        duration_ms: u64,
    },

    /// Queue replaced
    QueueChanged {
        /// New queue length
        length: usize,
    },

    ShuffleChanged {
        enabled: bool,
    },

    RepeatModeChanged {
        mode: RepeatMode,
    },

    /// Engine could not open a track
    LoadFailed {
        track_id: String,
        message: String,
    },

    /// Automatic skipping past broken tracks stopped
    RetriesExhausted {
        /// Consecutive failed loads
        attempts: usize,
    },

    /// No track left in this direction under the current repeat mode
    EndOfQueue {
        direction: Direction,
    },
}

/// Point-in-time view of the session for UI rendering
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    /// Track loading/playing, or the cursor's track when nothing is loaded
    pub current_track: Option<TrackDescriptor>,

    /// Cursor as an index into the queue's list order
    pub current_index: Option<usize>,

    pub queue_len: usize,
    pub status: PlaybackStatus,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub is_shuffled: bool,
    pub repeat_mode: RepeatMode,
}

impl PlaybackSnapshot {
    /// Playback progress from 0.0 to 1.0 (0.0 while the duration is unknown)
    pub fn progress(&self) -> f64 {
        if self.duration_ms == 0 {
            return 0.0;
        }

        (self.position_ms as f64 / self.duration_ms as f64).clamp(0.0, 1.0)
    }

    pub fn current_track_id(&self) -> Option<&str> {
        self.current_track.as_ref().map(|track| track.id.as_str())
    }

    pub fn is_playing(&self) -> bool {
        self.status.is_playing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn progress_is_zero_without_duration() {
        let snapshot = PlaybackSnapshot {
            position_ms: 5_000,
            ..Default::default()
        };
        assert_eq!(snapshot.progress(), 0.0);
    }

    #[test]
    fn progress_is_clamped() {
        let mut snapshot = PlaybackSnapshot {
            position_ms: 50_000,
            duration_ms: 200_000,
            ..Default::default()
        };
        assert!((snapshot.progress() - 0.25).abs() < f64::EPSILON);

        snapshot.position_ms = 250_000;
        assert_eq!(snapshot.progress(), 1.0);
    }

    #[test]
    fn default_snapshot_is_idle() {
        let snapshot = PlaybackSnapshot::default();
        assert_eq!(snapshot.status, PlaybackStatus::Idle);
        assert_eq!(snapshot.repeat_mode, RepeatMode::Off);
        assert!(snapshot.current_track_id().is_none());
        assert!(!snapshot.is_playing());
    }

    #[test]
    fn snapshot_reports_current_track_id() {
        let snapshot = PlaybackSnapshot {
            current_track: Some(TrackDescriptor::new(
                "a",
                "mem://a",
                Duration::from_secs(1),
            )),
            ..Default::default()
        };
        assert_eq!(snapshot.current_track_id(), Some("a"));
    }

    #[test]
    fn events_serialize_for_ui_bridges() {
        let event = PlaybackEvent::TrackChanged {
            track_id: "b".to_string(),
            previous_track_id: Some("a".to_string()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["TrackChanged"]["track_id"], "b");
        assert_eq!(json["TrackChanged"]["previous_track_id"], "a");
    }
}
