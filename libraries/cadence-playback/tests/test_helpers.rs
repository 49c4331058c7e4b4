use cadence_playback::{
    PlaybackEvent, PlaybackSnapshot, SimulatedEngine, TrackDescriptor, TransportController,
};
use std::sync::Once;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

static INIT: Once = Once::new();

/// Route controller logs to the test output, once per binary
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Upper bound for anything a test waits on (virtual time)
const SETTLE_TIMEOUT: Duration = Duration::from_secs(3600);

pub fn track(id: &str, seconds: u64) -> TrackDescriptor {
    TrackDescriptor::new(id, locator(id), Duration::from_secs(seconds))
}

pub fn locator(id: &str) -> String {
    format!("mem://{}", id)
}

/// Engine with one playable media per `(id, seconds)`
pub fn engine_with(media: &[(&str, u64)]) -> SimulatedEngine {
    let engine = SimulatedEngine::new();
    for (id, seconds) in media {
        engine.add_media(locator(id), Duration::from_secs(*seconds));
    }
    engine
}

pub async fn settle(
    controller: &TransportController,
    predicate: impl FnMut(&PlaybackSnapshot) -> bool,
) -> PlaybackSnapshot {
    tokio::time::timeout(SETTLE_TIMEOUT, controller.wait_for(predicate))
        .await
        .expect("Timed out waiting for snapshot")
        .expect("Controller closed while waiting")
}

pub async fn settle_on_track(controller: &TransportController, id: &str) -> PlaybackSnapshot {
    settle(controller, |snapshot| {
        snapshot.is_playing() && snapshot.current_track_id() == Some(id)
    })
    .await
}

/// Next event matching `predicate`, skipping everything else
pub async fn next_event(
    events: &mut broadcast::Receiver<PlaybackEvent>,
    mut predicate: impl FnMut(&PlaybackEvent) -> bool,
) -> PlaybackEvent {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("Event stream closed"),
            }
        }
    };

    tokio::time::timeout(SETTLE_TIMEOUT, wait)
        .await
        .expect("Timed out waiting for event")
}

/// Every event already delivered, without waiting
pub fn drain_events(events: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
    let mut drained = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => drained.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return drained,
        }
    }
}
