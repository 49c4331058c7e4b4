//! Playlist files
//!
//! A playlist is a TOML document with one `[[tracks]]` table per entry:
//!
//! ```toml
//! name = "Evening"
//!
//! [[tracks]]
//! id = "intro"
//! duration_secs = 200
//! title = "Intro"
//!
//! [[tracks]]
//! id = "broken"
//! duration_secs = 180
//! fail = true
//! ```
//!
//! The simulation knobs (`fail`, `load_delay_ms`) only affect how the entry
//! is registered with the simulated engine.

use crate::error::{CliError, Result};
use cadence_playback::{SimulatedEngine, SimulatedMedia, TrackDescriptor};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Playlist {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub tracks: Vec<PlaylistEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistEntry {
    pub id: String,

    /// Defaults to `mem://<id>`
    #[serde(default)]
    pub media_locator: Option<String>,

    pub duration_secs: u64,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub artist: Option<String>,

    #[serde(default)]
    pub album: Option<String>,

    #[serde(default)]
    pub cover_url: Option<String>,

    /// Every load of this entry fails
    #[serde(default)]
    pub fail: bool,

    #[serde(default)]
    pub load_delay_ms: u64,
}

impl PlaylistEntry {
    pub fn locator(&self) -> String {
        self.media_locator
            .clone()
            .unwrap_or_else(|| format!("mem://{}", self.id))
    }

    pub fn descriptor(&self) -> TrackDescriptor {
        let mut track = TrackDescriptor::new(
            self.id.clone(),
            self.locator(),
            Duration::from_secs(self.duration_secs),
        );
        track.title = self.title.clone();
        track.artist = self.artist.clone();
        track.album = self.album.clone();
        track.cover_url = self.cover_url.clone();
        track
    }

    fn media(&self) -> SimulatedMedia {
        let media = SimulatedMedia::new(Duration::from_secs(self.duration_secs))
            .with_load_delay(Duration::from_millis(self.load_delay_ms));
        if self.fail {
            media.failing()
        } else {
            media
        }
    }
}

impl Playlist {
    /// Read and validate a playlist file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let playlist: Playlist = toml::from_str(text)?;
        playlist.validate()?;
        Ok(playlist)
    }

    fn validate(&self) -> Result<()> {
        if self.tracks.is_empty() {
            return Err(CliError::Playlist("playlist has no tracks".to_string()));
        }

        if let Some(position) = self.tracks.iter().position(|entry| entry.id.is_empty()) {
            return Err(CliError::Playlist(format!(
                "track {} has an empty id",
                position + 1
            )));
        }

        Ok(())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("untitled")
    }

    /// Queue contents in file order
    pub fn descriptors(&self) -> Vec<TrackDescriptor> {
        self.tracks.iter().map(PlaylistEntry::descriptor).collect()
    }

    /// Make every entry loadable by `engine`
    pub fn register(&self, engine: &SimulatedEngine) {
        for entry in &self.tracks {
            engine.insert_media(entry.locator(), entry.media());
        }
    }

    /// Resolve `--start`: a track id, or a 1-based position
    pub fn resolve_start(&self, start: &str) -> Result<usize> {
        if let Some(index) = self.tracks.iter().position(|entry| entry.id == start) {
            return Ok(index);
        }

        match start.parse::<usize>() {
            Ok(position) if (1..=self.tracks.len()).contains(&position) => Ok(position - 1),
            _ => Err(CliError::Playlist(format!("no track matches '{}'", start))),
        }
    }
}
