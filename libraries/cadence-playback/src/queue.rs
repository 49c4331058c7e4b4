//! Queue manager
//!
//! Owns the ordered track list and the cursor, and computes next/previous
//! under shuffle and repeat policy:
//!
//! ```text
//! tracks:      [A, B, C, D]        list order, never rearranged
//! play order:  [2, 0, 3, 1]        identity unless shuffled
//! position:          ^             cursor into play order
//! current:     tracks[order[position]] = A
//! ```

use crate::error::{PlaybackError, Result};
use crate::shuffle::{anchored_order, sequential_order};
use crate::types::{Direction, RepeatMode, TrackDescriptor};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Linear playback queue with a cursor
#[derive(Debug, Clone)]
pub struct Queue {
    /// Tracks in caller-supplied order (duplicates allowed)
    tracks: Vec<TrackDescriptor>,

    /// Play order as indices into `tracks`
    order: Vec<usize>,

    /// Cursor into `order`; `None` only when the queue is empty
    position: Option<usize>,

    shuffled: bool,
    repeat: RepeatMode,
    rng: StdRng,
}

impl Queue {
    /// Create new empty queue
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Create new empty queue with reproducible shuffle orders
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            tracks: Vec::new(),
            order: Vec::new(),
            position: None,
            shuffled: false,
            repeat: RepeatMode::Off,
            rng,
        }
    }

    /// Replace the whole queue
    ///
    /// `start_index` is clamped into `[0, len-1]`. Returns the track the
    /// cursor now points at, or `None` for an empty list.
    pub fn set_queue(
        &mut self,
        tracks: Vec<TrackDescriptor>,
        start_index: usize,
    ) -> Option<&TrackDescriptor> {
        self.tracks = tracks;

        if self.tracks.is_empty() {
            self.order.clear();
            self.position = None;
            return None;
        }

        let start = start_index.min(self.tracks.len() - 1);
        self.rebuild_order(start);
        self.current()
    }

    /// Drop every track
    pub fn clear(&mut self) {
        self.set_queue(Vec::new(), 0);
    }

    /// Track at the cursor
    pub fn current(&self) -> Option<&TrackDescriptor> {
        self.current_index().map(|index| &self.tracks[index])
    }

    /// Cursor as an index into the track list
    pub fn current_index(&self) -> Option<usize> {
        self.position.map(|position| self.order[position])
    }

    /// Step the cursor and return the track it lands on
    ///
    /// Wraps at either end only under `RepeatMode::All`. On error the
    /// cursor does not move.
    pub fn advance(&mut self, direction: Direction) -> Result<&TrackDescriptor> {
        let target = self.step_position(direction)?;
        self.position = Some(target);
        Ok(&self.tracks[self.order[target]])
    }

    /// Track `advance` would land on, without moving the cursor
    pub fn peek(&self, direction: Direction) -> Result<&TrackDescriptor> {
        let target = self.step_position(direction)?;
        Ok(&self.tracks[self.order[target]])
    }

    fn step_position(&self, direction: Direction) -> Result<usize> {
        let position = self.position.ok_or(PlaybackError::EmptyQueue)?;
        let len = self.order.len();

        match direction {
            Direction::Next if position + 1 < len => Ok(position + 1),
            Direction::Previous if position > 0 => Ok(position - 1),
            _ if self.repeat == RepeatMode::All => Ok(match direction {
                Direction::Next => 0,
                Direction::Previous => len - 1,
            }),
            _ => Err(PlaybackError::EndOfQueue),
        }
    }

    /// Move the cursor to a list index
    pub fn jump_to(&mut self, index: usize) -> Result<&TrackDescriptor> {
        if self.tracks.is_empty() {
            return Err(PlaybackError::EmptyQueue);
        }

        let position = self
            .order
            .iter()
            .position(|&candidate| candidate == index)
            .ok_or(PlaybackError::IndexOutOfBounds(index))?;

        self.position = Some(position);
        Ok(&self.tracks[index])
    }

    /// Find a track by id
    ///
    /// Prefers the cursor when it already holds `id`, then the first match
    /// in list order.
    pub fn locate(&self, id: &str) -> Option<usize> {
        if let Some(current) = self.current_index() {
            if self.tracks[current].id == id {
                return Some(current);
            }
        }

        self.tracks.iter().position(|track| track.id == id)
    }

    /// Flip shuffle and return the new flag
    ///
    /// The current track stays current: switching on anchors a fresh
    /// permutation at it, switching off resumes list order from it.
    pub fn toggle_shuffle(&mut self) -> bool {
        self.set_shuffle(!self.shuffled);
        self.shuffled
    }

    pub fn set_shuffle(&mut self, enabled: bool) {
        if self.shuffled == enabled {
            return;
        }

        self.shuffled = enabled;
        if let Some(current) = self.current_index() {
            self.rebuild_order(current);
        }
    }

    fn rebuild_order(&mut self, anchor: usize) {
        if self.shuffled {
            self.order = anchored_order(self.tracks.len(), anchor, &mut self.rng);
            self.position = Some(0);
        } else {
            self.order = sequential_order(self.tracks.len());
            self.position = Some(anchor);
        }
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffled
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat = mode;
    }

    /// Advance `none -> one -> all -> none`
    pub fn cycle_repeat_mode(&mut self) -> RepeatMode {
        self.repeat = self.repeat.cycle();
        self.repeat
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat
    }

    /// Tracks in list order
    pub fn tracks(&self) -> &[TrackDescriptor] {
        &self.tracks
    }

    /// Play order as list indices
    pub fn play_order(&self) -> &[usize] {
        &self.order
    }

    /// Total number of tracks in queue
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn create_test_track(id: &str) -> TrackDescriptor {
        TrackDescriptor::new(id, format!("mem://{}", id), Duration::from_secs(180))
    }

    fn queue_of(ids: &[&str]) -> Queue {
        let mut queue = Queue::with_seed(11);
        queue.set_queue(ids.iter().map(|id| create_test_track(id)).collect(), 0);
        queue
    }

    #[test]
    fn create_empty_queue() {
        let queue = Queue::new();
        assert_eq!(queue.len(), 0);
        assert!(queue.is_empty());
        assert!(queue.current().is_none());
        assert!(queue.current_index().is_none());
    }

    #[test]
    fn set_queue_clamps_start_index() {
        let mut queue = Queue::new();
        let tracks = vec![create_test_track("a"), create_test_track("b")];

        let current = queue.set_queue(tracks.clone(), 1).unwrap();
        assert_eq!(current.id, "b");

        queue.set_queue(tracks, 17);
        assert_eq!(queue.current_index(), Some(1));
    }

    #[test]
    fn set_empty_queue_clears_cursor() {
        let mut queue = queue_of(&["a", "b"]);
        assert!(queue.set_queue(Vec::new(), 3).is_none());
        assert!(queue.current_index().is_none());
    }

    #[test]
    fn empty_queue_reports_empty_not_index_errors() {
        let mut queue = Queue::new();
        assert!(matches!(
            queue.advance(Direction::Next),
            Err(PlaybackError::EmptyQueue)
        ));
        assert!(matches!(
            queue.peek(Direction::Previous),
            Err(PlaybackError::EmptyQueue)
        ));
        assert!(matches!(queue.jump_to(0), Err(PlaybackError::EmptyQueue)));
    }

    #[test]
    fn next_stops_at_end_without_repeat() {
        let mut queue = queue_of(&["a", "b"]);
        assert_eq!(queue.advance(Direction::Next).unwrap().id, "b");
        assert!(matches!(
            queue.advance(Direction::Next),
            Err(PlaybackError::EndOfQueue)
        ));
        // Cursor stays at the boundary
        assert_eq!(queue.current_index(), Some(1));
    }

    #[test]
    fn previous_stops_at_start_without_repeat() {
        let mut queue = queue_of(&["a", "b"]);
        assert!(matches!(
            queue.advance(Direction::Previous),
            Err(PlaybackError::EndOfQueue)
        ));
        assert_eq!(queue.current_index(), Some(0));
    }

    #[test]
    fn repeat_one_does_not_wrap_explicit_steps() {
        let mut queue = queue_of(&["a", "b"]);
        queue.set_repeat_mode(RepeatMode::One);
        queue.advance(Direction::Next).unwrap();
        assert!(matches!(
            queue.advance(Direction::Next),
            Err(PlaybackError::EndOfQueue)
        ));
    }

    #[test]
    fn repeat_all_wraps_both_ways() {
        let mut queue = queue_of(&["a", "b", "c"]);
        queue.set_repeat_mode(RepeatMode::All);

        assert_eq!(queue.advance(Direction::Previous).unwrap().id, "c");
        assert_eq!(queue.current_index(), Some(2));
        assert_eq!(queue.advance(Direction::Next).unwrap().id, "a");
        assert_eq!(queue.current_index(), Some(0));
    }

    #[test]
    fn single_track_repeat_all_loops_to_itself() {
        let mut queue = queue_of(&["a"]);
        queue.set_repeat_mode(RepeatMode::All);

        assert_eq!(queue.advance(Direction::Next).unwrap().id, "a");
        assert_eq!(queue.advance(Direction::Previous).unwrap().id, "a");
        assert_eq!(queue.current_index(), Some(0));
    }

    #[test]
    fn peek_does_not_move_cursor() {
        let queue = queue_of(&["a", "b"]);
        assert_eq!(queue.peek(Direction::Next).unwrap().id, "b");
        assert_eq!(queue.current_index(), Some(0));
    }

    #[test]
    fn duplicate_ids_occupy_distinct_positions() {
        let mut queue = queue_of(&["a", "b", "a"]);
        queue.advance(Direction::Next).unwrap();
        let track = queue.advance(Direction::Next).unwrap();
        assert_eq!(track.id, "a");
        assert_eq!(queue.current_index(), Some(2));

        // The cursor's own copy wins over the first occurrence
        assert_eq!(queue.locate("a"), Some(2));
        assert_eq!(queue.locate("b"), Some(1));
        assert_eq!(queue.locate("zzz"), None);
    }

    #[test]
    fn jump_to_moves_cursor() {
        let mut queue = queue_of(&["a", "b", "c"]);
        assert_eq!(queue.jump_to(2).unwrap().id, "c");
        assert_eq!(queue.current_index(), Some(2));
        assert!(matches!(
            queue.jump_to(3),
            Err(PlaybackError::IndexOutOfBounds(3))
        ));
    }

    #[test]
    fn toggling_shuffle_keeps_current_track() {
        let mut queue = queue_of(&["a", "b", "c", "d", "e", "f"]);
        queue.jump_to(3).unwrap();

        assert!(queue.toggle_shuffle());
        assert_eq!(queue.current().unwrap().id, "d");
        assert_eq!(queue.current_index(), Some(3));
        // The list itself is never reordered
        let ids: Vec<&str> = queue.tracks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e", "f"]);

        assert!(!queue.toggle_shuffle());
        assert_eq!(queue.current_index(), Some(3));
        assert_eq!(queue.play_order(), &[0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn shuffled_queue_visits_every_track_once() {
        let mut queue = queue_of(&["a", "b", "c", "d", "e"]);
        queue.toggle_shuffle();

        let mut seen = vec![queue.current_index().unwrap()];
        while let Ok(track) = queue.advance(Direction::Next) {
            let id = track.id.clone();
            seen.push(queue.locate(&id).unwrap());
        }

        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn set_queue_while_shuffled_anchors_start_index() {
        let mut queue = Queue::with_seed(5);
        queue.set_shuffle(true);
        let tracks = (0..6).map(|i| create_test_track(&i.to_string())).collect();

        let current = queue.set_queue(tracks, 4).unwrap();
        assert_eq!(current.id, "4");
        assert_eq!(queue.play_order()[0], 4);
        // Shuffled play order starts at the anchor, so there is no previous
        assert!(matches!(
            queue.peek(Direction::Previous),
            Err(PlaybackError::EndOfQueue)
        ));
    }

    #[test]
    fn repeat_mode_is_a_plain_setter() {
        let mut queue = queue_of(&["a", "b"]);
        queue.advance(Direction::Next).unwrap();

        assert_eq!(queue.cycle_repeat_mode(), RepeatMode::One);
        assert_eq!(queue.cycle_repeat_mode(), RepeatMode::All);
        assert_eq!(queue.current_index(), Some(1));
        assert_eq!(queue.advance(Direction::Next).unwrap().id, "a");
    }

    #[test]
    fn clear_queue() {
        let mut queue = queue_of(&["a", "b"]);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert!(queue.current().is_none());
    }
}
