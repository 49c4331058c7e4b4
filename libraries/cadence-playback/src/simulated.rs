//! In-memory playback engine
//!
//! Plays nothing. Media is registered per locator with a duration, an
//! optional load latency and an optional forced load failure. Positions
//! follow the Tokio clock, so tests running with a paused clock are
//! deterministic.

use crate::engine::{EngineError, EngineResult, EngineStatus, PlaybackEngine, ResourceHandle};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Media registered with the simulated engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedMedia {
    pub duration: Duration,
    pub load_delay: Duration,
    pub fail_load: bool,
}

impl SimulatedMedia {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            load_delay: Duration::ZERO,
            fail_load: false,
        }
    }

    /// Every load of this media fails with a decode error
    pub fn failing(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }
}

#[derive(Debug)]
struct SimulatedResource {
    locator: String,
    duration_ms: u64,
    /// Position accumulated up to `started_at`
    base_position_ms: u64,
    /// Set while playing
    started_at: Option<Instant>,
    forced_finish: bool,
}

impl SimulatedResource {
    fn position_ms(&self, rate: f64) -> u64 {
        let running = self.started_at.map_or(0, |started| {
            (started.elapsed().as_millis() as f64 * rate) as u64
        });
        (self.base_position_ms + running).min(self.duration_ms)
    }

    fn status(&self, rate: f64) -> EngineStatus {
        let position_ms = self.position_ms(rate);
        EngineStatus {
            position_ms,
            duration_ms: self.duration_ms,
            is_finished: self.forced_finish || position_ms >= self.duration_ms,
        }
    }
}

#[derive(Debug, Default)]
struct SimulatedState {
    media: HashMap<String, SimulatedMedia>,
    resources: HashMap<u64, SimulatedResource>,
    next_handle: u64,
    load_log: Vec<String>,
    release_count: usize,
    peak_live: usize,
}

/// Deterministic engine for tests and demos
#[derive(Debug)]
pub struct SimulatedEngine {
    state: Mutex<SimulatedState>,
    /// Media milliseconds per wall-clock millisecond
    rate: f64,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::with_rate(1.0)
    }

    /// Engine whose positions advance `rate` times faster than the clock
    pub fn with_rate(rate: f64) -> Self {
        Self {
            state: Mutex::new(SimulatedState::default()),
            rate: if rate.is_finite() && rate > 0.0 { rate } else { 1.0 },
        }
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register playable media
    pub fn add_media(&self, locator: impl Into<String>, duration: Duration) {
        self.insert_media(locator, SimulatedMedia::new(duration));
    }

    /// Register media whose loads always fail
    pub fn add_failing_media(&self, locator: impl Into<String>) {
        self.insert_media(locator, SimulatedMedia::new(Duration::ZERO).failing());
    }

    pub fn insert_media(&self, locator: impl Into<String>, media: SimulatedMedia) {
        self.state().media.insert(locator.into(), media);
    }

    /// Mark every live resource as having reached its natural end
    pub fn finish_current(&self) {
        for resource in self.state().resources.values_mut() {
            resource.forced_finish = true;
        }
    }

    /// Number of resources loaded and not yet released
    pub fn live_resources(&self) -> usize {
        self.state().resources.len()
    }

    /// Highest number of simultaneously live resources seen
    pub fn peak_live_resources(&self) -> usize {
        self.state().peak_live
    }

    /// Locators of every load attempt, in order
    pub fn load_log(&self) -> Vec<String> {
        self.state().load_log.clone()
    }

    pub fn release_count(&self) -> usize {
        self.state().release_count
    }

    /// Locator of the live resource, if exactly one is loaded
    pub fn loaded_locator(&self) -> Option<String> {
        let state = self.state();
        let mut resources = state.resources.values();
        match (resources.next(), resources.next()) {
            (Some(resource), None) => Some(resource.locator.clone()),
            _ => None,
        }
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlaybackEngine for SimulatedEngine {
    async fn load(&self, locator: &str) -> EngineResult<ResourceHandle> {
        let media = {
            let mut state = self.state();
            state.load_log.push(locator.to_string());
            state.media.get(locator).cloned()
        };

        let media = media.ok_or_else(|| EngineError::NotFound(locator.to_string()))?;

        if !media.load_delay.is_zero() {
            tokio::time::sleep(media.load_delay).await;
        }

        if media.fail_load {
            return Err(EngineError::Decode(format!("cannot decode {locator}")));
        }

        let mut state = self.state();
        state.next_handle += 1;
        let id = state.next_handle;
        state.resources.insert(
            id,
            SimulatedResource {
                locator: locator.to_string(),
                duration_ms: media.duration.as_millis() as u64,
                base_position_ms: 0,
                started_at: None,
                forced_finish: false,
            },
        );
        state.peak_live = state.peak_live.max(state.resources.len());
        debug!(handle = id, locator, "Simulated resource loaded");

        Ok(ResourceHandle::new(id))
    }

    async fn play(&self, handle: &ResourceHandle) -> EngineResult<()> {
        let mut state = self.state();
        let resource = state
            .resources
            .get_mut(&handle.id())
            .ok_or(EngineError::InvalidHandle(handle.id()))?;

        if resource.started_at.is_none() {
            resource.started_at = Some(Instant::now());
        }
        Ok(())
    }

    async fn pause(&self, handle: &ResourceHandle) -> EngineResult<()> {
        let rate = self.rate;
        let mut state = self.state();
        let resource = state
            .resources
            .get_mut(&handle.id())
            .ok_or(EngineError::InvalidHandle(handle.id()))?;

        resource.base_position_ms = resource.position_ms(rate);
        resource.started_at = None;
        Ok(())
    }

    async fn seek(&self, handle: &ResourceHandle, position_ms: u64) -> EngineResult<()> {
        let mut state = self.state();
        let resource = state
            .resources
            .get_mut(&handle.id())
            .ok_or(EngineError::InvalidHandle(handle.id()))?;

        resource.base_position_ms = position_ms.min(resource.duration_ms);
        resource.forced_finish = false;
        if resource.started_at.is_some() {
            resource.started_at = Some(Instant::now());
        }
        Ok(())
    }

    async fn status(&self, handle: &ResourceHandle) -> EngineResult<EngineStatus> {
        let state = self.state();
        state
            .resources
            .get(&handle.id())
            .map(|resource| resource.status(self.rate))
            .ok_or(EngineError::InvalidHandle(handle.id()))
    }

    async fn release(&self, handle: ResourceHandle) -> EngineResult<()> {
        let mut state = self.state();
        state
            .resources
            .remove(&handle.id())
            .ok_or(EngineError::InvalidHandle(handle.id()))?;
        state.release_count += 1;
        debug!(handle = handle.id(), "Simulated resource released");
        Ok(())
    }
}
