//! The player's track queue.
//!
//! Index 0 is the current track while one is playing. All operations here
//! are synchronous and purely local; issuing the remote commands that some
//! of them imply is the player's job. In particular, removing index 0 only
//! edits the queue projection — it never stops playback — while `clear` is
//! paired with a remote stop by the player. That asymmetry is deliberate.

use std::collections::VecDeque;

use crate::{
    error::{Error, Result},
    protocol::track::Track,
};

/// What to repeat when a track finishes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoopMode {
    /// Advance normally; finished tracks leave the queue.
    #[default]
    Off,
    /// Repeat the current track.
    Track,
    /// Cycle finished tracks to the tail.
    Queue,
}

/// Ordered queue of tracks, current track at the front.
#[derive(Clone, Debug, Default)]
pub struct Queue {
    tracks: VecDeque<Track>,
}

impl Queue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current track, if any.
    #[must_use]
    pub fn current(&self) -> Option<&Track> {
        self.tracks.front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// A snapshot of the queue in order.
    #[must_use]
    pub fn tracks(&self) -> Vec<Track> {
        self.tracks.iter().cloned().collect()
    }

    /// Appends one track to the tail.
    pub fn push(&mut self, track: Track) {
        self.tracks.push_back(track);
    }

    /// Appends several tracks to the tail, preserving their order.
    pub fn extend(&mut self, tracks: impl IntoIterator<Item = Track>) {
        self.tracks.extend(tracks);
    }

    /// Makes `track` the new head (the next `play` target).
    pub fn insert_head(&mut self, track: Track) {
        self.tracks.push_front(track);
    }

    /// Removes up to `n` tracks from the head; returns how many were
    /// actually removed.
    pub fn skip(&mut self, n: usize) -> usize {
        let removed = n.min(self.tracks.len());
        self.tracks.drain(..removed);
        removed
    }

    /// Removes the track at `index`.
    pub fn remove_at(&mut self, index: usize) -> Result<Track> {
        if self.tracks.is_empty() {
            return Err(Error::EmptyQueue);
        }

        self.tracks
            .remove(index)
            .ok_or_else(|| Error::build(format!("no track at queue position {index}")))
    }

    /// Removes the first occurrence of `track`, matched by encoded form.
    pub fn remove_track(&mut self, track: &Track) -> Result<Track> {
        if self.tracks.is_empty() {
            return Err(Error::EmptyQueue);
        }

        let index = self
            .tracks
            .iter()
            .position(|candidate| candidate.encoded == track.encoded)
            .ok_or_else(|| {
                Error::build(format!("track not in queue: {}", track.info.title))
            })?;

        Ok(self.tracks.remove(index).expect("position was just found"))
    }

    /// Empties the queue.
    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    /// Shuffles every track behind the head.
    ///
    /// The head is playing and stays put. Queues of two or fewer tracks
    /// have nothing to shuffle.
    pub fn shuffle(&mut self) -> Result<()> {
        if self.tracks.len() <= 2 {
            return Err(Error::build(
                "queue must have more than 2 tracks to shuffle",
            ));
        }

        let tail = self.tracks.make_contiguous();
        fastrand::shuffle(&mut tail[1..]);

        Ok(())
    }

    /// Advances past a finished head according to `mode` and returns the
    /// next track to play, if any.
    ///
    /// * `Off` — the head leaves the queue
    /// * `Track` — the head stays and plays again
    /// * `Queue` — the head cycles to the tail
    pub fn advance(&mut self, mode: LoopMode) -> Option<&Track> {
        match mode {
            LoopMode::Off => {
                self.tracks.pop_front();
            }
            LoopMode::Track => {}
            LoopMode::Queue => {
                if let Some(head) = self.tracks.pop_front() {
                    self.tracks.push_back(head);
                }
            }
        }

        self.tracks.front()
    }
}

#[cfg(test)]
pub(crate) fn test_track(id: &str) -> Track {
    use crate::protocol::track::TrackInfo;

    Track {
        encoded: id.to_string(),
        info: TrackInfo {
            identifier: id.to_string(),
            is_seekable: true,
            author: "author".to_string(),
            length: 180_000,
            is_stream: false,
            position: 0,
            title: format!("title {id}"),
            source_name: "youtube".to_string(),
            uri: None,
            artwork_url: None,
            isrc: None,
        },
        plugin_info: None,
        user_data: None,
        requestor: None,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn order(queue: &Queue) -> Vec<String> {
        queue.tracks().into_iter().map(|t| t.encoded).collect()
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut queue = Queue::new();
        queue.push(test_track("a"));
        queue.extend([test_track("b"), test_track("c")]);
        assert_eq!(order(&queue), ["a", "b", "c"]);

        queue.remove_at(1).unwrap();
        assert_eq!(order(&queue), ["a", "c"]);

        queue.push(test_track("d"));
        assert_eq!(order(&queue), ["a", "c", "d"]);

        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn removing_head_keeps_the_rest() {
        let mut queue = Queue::new();
        queue.extend([test_track("a"), test_track("b")]);
        let removed = queue.remove_at(0).unwrap();
        assert_eq!(removed.encoded, "a");
        assert_eq!(order(&queue), ["b"]);
    }

    #[test]
    fn remove_by_identity_takes_first_occurrence() {
        let mut queue = Queue::new();
        queue.extend([test_track("a"), test_track("b"), test_track("a")]);
        queue.remove_track(&test_track("a")).unwrap();
        assert_eq!(order(&queue), ["b", "a"]);

        assert!(queue.remove_track(&test_track("missing")).is_err());
    }

    #[test]
    fn remove_from_empty_queue_fails() {
        let mut queue = Queue::new();
        assert!(matches!(queue.remove_at(0), Err(Error::EmptyQueue)));
        assert!(matches!(
            queue.remove_track(&test_track("a")),
            Err(Error::EmptyQueue)
        ));
    }

    #[test]
    fn skip_removes_from_the_head() {
        let mut queue = Queue::new();
        queue.extend([test_track("a"), test_track("b"), test_track("c")]);
        assert_eq!(queue.skip(2), 2);
        assert_eq!(order(&queue), ["c"]);

        // Skipping past the end drains what is left.
        assert_eq!(queue.skip(5), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn advance_off_pops_the_head() {
        let mut queue = Queue::new();
        queue.extend([test_track("a"), test_track("b")]);
        assert_eq!(queue.advance(LoopMode::Off).unwrap().encoded, "b");
        assert_eq!(queue.advance(LoopMode::Off), None);
    }

    #[test]
    fn advance_track_replays_the_same_encoded_form() {
        let mut queue = Queue::new();
        queue.extend([test_track("a"), test_track("b")]);
        assert_eq!(queue.advance(LoopMode::Track).unwrap().encoded, "a");
        assert_eq!(order(&queue), ["a", "b"]);
    }

    #[test]
    fn advance_queue_cycles_through_a_full_rotation() {
        let mut queue = Queue::new();
        queue.extend([test_track("a"), test_track("b"), test_track("c")]);

        assert_eq!(queue.advance(LoopMode::Queue).unwrap().encoded, "b");
        assert_eq!(queue.advance(LoopMode::Queue).unwrap().encoded, "c");
        // After one full cycle the first track is at the head again and
        // the finished track sits at the tail.
        assert_eq!(queue.advance(LoopMode::Queue).unwrap().encoded, "a");
        assert_eq!(order(&queue), ["a", "b", "c"]);
    }

    #[test]
    fn shuffle_keeps_the_head_and_needs_three_tracks() {
        let mut queue = Queue::new();
        queue.extend([test_track("a"), test_track("b")]);
        assert!(queue.shuffle().is_err());

        queue.push(test_track("c"));
        queue.shuffle().unwrap();
        assert_eq!(queue.current().unwrap().encoded, "a");
        assert_eq!(queue.len(), 3);
    }
}
