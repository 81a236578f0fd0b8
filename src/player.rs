//! Per-guild player: queue, playback intent and reconciliation.
//!
//! A player holds two kinds of state. *Local intent* — the queue, loop
//! mode, autoplay flag, volume, filters and paused flag — is what the
//! caller asked for. The *remote snapshot* — position, connection flag,
//! ping — is what the node last reported, written only by the owning
//! node's ingestion task and never assumed.
//!
//! Remote commands are serialized per player: a command guard is held
//! across each remote call so a `skip` racing a `pause` cannot both apply
//! against stale remote state. Intent changes are staged optimistically and
//! rolled back if the remote call fails, so a failed command never leaves
//! local state inconsistent. Queue edits (`add`, `remove`, `shuffle`) are
//! synchronous and purely local; they take effect on the next issued
//! command.

use std::sync::{Arc, Mutex, RwLock, Weak};

use tokio::sync::{mpsc::UnboundedSender, Mutex as CommandGuard};

use crate::{
    error::{Error, Result},
    events::Event,
    node::Node,
    pool::NodePool,
    protocol::{
        filters::Filters,
        messages::{EventPayload, TrackEndReason},
        player::{PlayerInfo, PlayerState, UpdatePlayer, UpdateTrack, VoiceState},
        track::{LoadResult, Playlist, SearchSource, Track},
        GuildId,
    },
    queue::{LoopMode, Queue},
};

/// Volume applied when none was ever set, and restored by a bare
/// `set_volume()`.
pub const DEFAULT_VOLUME: u16 = 100;

/// Upper volume bound. Values above 100 amplify and will distort; the node
/// accepts them anyway.
pub const MAX_VOLUME: u16 = 1000;

/// Clamps a requested volume into the accepted range, defaulting to
/// [`DEFAULT_VOLUME`] when absent.
pub(crate) fn clamp_volume(volume: Option<u16>) -> u16 {
    volume.unwrap_or(DEFAULT_VOLUME).min(MAX_VOLUME)
}

/// Observable playback state of a player.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    /// No track loaded.
    Idle,
    Playing,
    Paused,
    /// No node assigned; remote commands fail until failover completes.
    Unassigned,
}

/// Local playback intent.
#[derive(Clone, Debug)]
struct Intent {
    loop_mode: LoopMode,
    autoplay: bool,
    volume: u16,
    paused: bool,
    playing: bool,
    filters: Option<Filters>,
    voice: Option<VoiceState>,
    /// Position carried over from the last snapshot before a failover,
    /// replayed by the next resync.
    resume_position: Option<u64>,
}

impl Default for Intent {
    fn default() -> Self {
        Self {
            loop_mode: LoopMode::Off,
            autoplay: false,
            volume: DEFAULT_VOLUME,
            paused: false,
            playing: false,
            filters: None,
            voice: None,
            resume_position: None,
        }
    }
}

/// Playback controller for one guild.
pub struct Player {
    guild_id: GuildId,
    pool: Weak<NodePool>,
    events: UnboundedSender<Event>,
    /// Name of the assigned node; back-reference, the pool owns the node.
    node: RwLock<Option<String>>,
    queue: Mutex<Queue>,
    intent: Mutex<Intent>,
    snapshot: Mutex<Option<PlayerState>>,
    /// Encoded form of the track the last track-end transition advanced
    /// to; guards against load-failure loops.
    advance_target: Mutex<Option<String>>,
    /// Serializes remote commands for this player.
    command: CommandGuard<()>,
}

impl Player {
    pub(crate) fn new(
        guild_id: GuildId,
        pool: Weak<NodePool>,
        events: UnboundedSender<Event>,
    ) -> Arc<Self> {
        Arc::new(Self {
            guild_id,
            pool,
            events,
            node: RwLock::new(None),
            queue: Mutex::new(Queue::new()),
            intent: Mutex::new(Intent::default()),
            snapshot: Mutex::new(None),
            advance_target: Mutex::new(None),
            command: CommandGuard::new(()),
        })
    }

    #[must_use]
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Name of the assigned node, if any.
    #[must_use]
    pub fn node_name(&self) -> Option<String> {
        self.node.read().expect("node lock poisoned").clone()
    }

    /// Current observable state.
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        if self.node.read().expect("node lock poisoned").is_none() {
            return PlaybackState::Unassigned;
        }

        let intent = self.intent.lock().expect("intent lock poisoned");
        if !intent.playing {
            PlaybackState::Idle
        } else if intent.paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        }
    }

    /// The queue in order; index 0 is the current track while playing.
    #[must_use]
    pub fn queue(&self) -> Vec<Track> {
        self.queue.lock().expect("queue lock poisoned").tracks()
    }

    /// The current track, if any.
    #[must_use]
    pub fn current(&self) -> Option<Track> {
        self.queue
            .lock()
            .expect("queue lock poisoned")
            .current()
            .cloned()
    }

    /// Last reported playback position in milliseconds.
    ///
    /// `None` until the node pushes a snapshot, and again right after a
    /// failover until a fresh one arrives.
    #[must_use]
    pub fn position(&self) -> Option<u64> {
        self.snapshot
            .lock()
            .expect("snapshot lock poisoned")
            .map(|state| state.position)
    }

    /// Last reported snapshot, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<PlayerState> {
        *self.snapshot.lock().expect("snapshot lock poisoned")
    }

    #[must_use]
    pub fn loop_mode(&self) -> LoopMode {
        self.intent.lock().expect("intent lock poisoned").loop_mode
    }

    #[must_use]
    pub fn autoplay(&self) -> bool {
        self.intent.lock().expect("intent lock poisoned").autoplay
    }

    #[must_use]
    pub fn volume(&self) -> u16 {
        self.intent.lock().expect("intent lock poisoned").volume
    }

    #[must_use]
    pub fn paused(&self) -> bool {
        self.intent.lock().expect("intent lock poisoned").paused
    }

    #[must_use]
    pub fn filters(&self) -> Option<Filters> {
        self.intent
            .lock()
            .expect("intent lock poisoned")
            .filters
            .clone()
    }

    /// Forwards voice credentials to the node, joining the voice server.
    ///
    /// The credentials are opaque inputs from the host gateway.
    pub async fn connect(&self, voice: VoiceState) -> Result<()> {
        let _guard = self.command.lock().await;

        let previous = self
            .intent
            .lock()
            .expect("intent lock poisoned")
            .voice
            .replace(voice.clone());

        let update = UpdatePlayer {
            voice: Some(voice),
            ..UpdatePlayer::default()
        };
        match self.send_update(&update).await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.intent.lock().expect("intent lock poisoned").voice = previous;
                Err(e)
            }
        }
    }

    /// Destroys this player: remote delete (best effort), local state
    /// discarded, registry entry removed.
    pub async fn disconnect(&self) -> Result<()> {
        let pool = self.pool.upgrade().ok_or(Error::NodeUnavailable)?;
        pool.delete_player(self.guild_id).await
    }

    /// Starts playback.
    ///
    /// With a track argument, it becomes queue index 0 and replaces the
    /// playing track; without one, the current queue head is (re)started.
    pub async fn play(&self, track: Option<Track>) -> Result<()> {
        let _guard = self.command.lock().await;

        let inserted = track.is_some();
        let head = {
            let mut queue = self.queue.lock().expect("queue lock poisoned");
            if let Some(track) = track {
                queue.insert_head(track);
            }
            queue.current().cloned().ok_or(Error::EmptyQueue)?
        };

        let update = UpdatePlayer {
            track: Some(UpdateTrack::play(&head)),
            paused: Some(false),
            ..UpdatePlayer::default()
        };
        match self.send_update(&update).await {
            Ok(_) => {
                let mut intent = self.intent.lock().expect("intent lock poisoned");
                intent.playing = true;
                intent.paused = false;
                Ok(())
            }
            Err(e) => {
                if inserted {
                    let _ = self
                        .queue
                        .lock()
                        .expect("queue lock poisoned")
                        .remove_at(0);
                }
                Err(e)
            }
        }
    }

    /// Toggles the paused flag, or forces it with `Some(value)`.
    ///
    /// The flag is staged locally and rolled back if the node rejects the
    /// update.
    pub async fn pause(&self, force: Option<bool>) -> Result<()> {
        let _guard = self.command.lock().await;

        let (previous, next) = {
            let mut intent = self.intent.lock().expect("intent lock poisoned");
            let previous = intent.paused;
            let next = force.unwrap_or(!previous);
            intent.paused = next;
            (previous, next)
        };

        let update = UpdatePlayer {
            paused: Some(next),
            ..UpdatePlayer::default()
        };
        match self.send_update(&update).await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.intent.lock().expect("intent lock poisoned").paused = previous;
                Err(e)
            }
        }
    }

    /// Removes `amount` tracks from the queue head.
    ///
    /// Tracks beyond the first are only removed, not stopped. If the queue
    /// empties, a remote stop is issued; otherwise the new head starts.
    pub async fn skip(&self, amount: usize) -> Result<()> {
        if amount == 0 {
            return Err(Error::build("skip amount cannot be zero"));
        }

        let _guard = self.command.lock().await;

        let (removed, next) = {
            let mut queue = self.queue.lock().expect("queue lock poisoned");
            if queue.is_empty() {
                return Err(Error::EmptyQueue);
            }
            let removed: Vec<Track> = queue.tracks().into_iter().take(amount).collect();
            queue.skip(amount);
            (removed, queue.current().cloned())
        };

        let update = match &next {
            Some(track) => UpdatePlayer {
                track: Some(UpdateTrack::play(track)),
                ..UpdatePlayer::default()
            },
            None => UpdatePlayer {
                track: Some(UpdateTrack::stop()),
                ..UpdatePlayer::default()
            },
        };
        match self.send_update(&update).await {
            Ok(_) => {
                self.intent.lock().expect("intent lock poisoned").playing = next.is_some();
                Ok(())
            }
            Err(e) => {
                let mut queue = self.queue.lock().expect("queue lock poisoned");
                for track in removed.into_iter().rev() {
                    queue.insert_head(track);
                }
                Err(e)
            }
        }
    }

    /// Appends one track to the queue tail. Never starts playback.
    pub fn add(&self, track: Track) {
        self.queue.lock().expect("queue lock poisoned").push(track);
    }

    /// Appends several tracks, preserving their order.
    pub fn add_all(&self, tracks: impl IntoIterator<Item = Track>) {
        self.queue
            .lock()
            .expect("queue lock poisoned")
            .extend(tracks);
    }

    /// Appends every track of a playlist.
    pub fn add_playlist(&self, playlist: Playlist) {
        self.add_all(playlist.tracks);
    }

    /// Removes the track at `position`.
    ///
    /// Removing position 0 does not stop the current track; it only edits
    /// the queue projection for subsequent skips.
    pub fn remove(&self, position: usize) -> Result<Track> {
        self.queue
            .lock()
            .expect("queue lock poisoned")
            .remove_at(position)
    }

    /// Removes the first occurrence of `track`, matched by encoded form.
    pub fn remove_track(&self, track: &Track) -> Result<Track> {
        self.queue
            .lock()
            .expect("queue lock poisoned")
            .remove_track(track)
    }

    /// Shuffles the queue behind the current track.
    pub fn shuffle(&self) -> Result<()> {
        self.queue.lock().expect("queue lock poisoned").shuffle()
    }

    /// Empties the queue and stops the current track.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.command.lock().await;

        let saved = {
            let mut queue = self.queue.lock().expect("queue lock poisoned");
            let saved = queue.tracks();
            queue.clear();
            saved
        };

        let update = UpdatePlayer {
            track: Some(UpdateTrack::stop()),
            ..UpdatePlayer::default()
        };
        match self.send_update(&update).await {
            Ok(_) => {
                self.intent.lock().expect("intent lock poisoned").playing = false;
                Ok(())
            }
            Err(e) => {
                self.queue
                    .lock()
                    .expect("queue lock poisoned")
                    .extend(saved);
                Err(e)
            }
        }
    }

    /// Stops the current track without touching the queue.
    pub async fn stop(&self) -> Result<()> {
        let _guard = self.command.lock().await;

        let update = UpdatePlayer {
            track: Some(UpdateTrack::stop()),
            ..UpdatePlayer::default()
        };
        self.send_update(&update).await?;
        self.intent.lock().expect("intent lock poisoned").playing = false;

        Ok(())
    }

    /// Sets the loop mode. Local intent only; it steers the next
    /// track-end transition.
    pub fn set_loop(&self, mode: LoopMode) -> LoopMode {
        self.intent.lock().expect("intent lock poisoned").loop_mode = mode;
        mode
    }

    /// Enables or disables autoplay; toggles when no value is given.
    /// Returns the new setting.
    pub fn set_autoplay(&self, enable: Option<bool>) -> bool {
        let mut intent = self.intent.lock().expect("intent lock poisoned");
        intent.autoplay = enable.unwrap_or(!intent.autoplay);
        intent.autoplay
    }

    /// Sets the volume, clamped into `[0, 1000]`; `None` resets to the
    /// default of 100. Values above 100 amplify and distort.
    pub async fn set_volume(&self, volume: Option<u16>) -> Result<()> {
        let _guard = self.command.lock().await;

        let next = clamp_volume(volume);
        let previous = {
            let mut intent = self.intent.lock().expect("intent lock poisoned");
            let previous = intent.volume;
            intent.volume = next;
            previous
        };

        let update = UpdatePlayer {
            volume: Some(next),
            ..UpdatePlayer::default()
        };
        match self.send_update(&update).await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.intent.lock().expect("intent lock poisoned").volume = previous;
                Err(e)
            }
        }
    }

    /// Seeks within the current track.
    pub async fn seek(&self, position: u64) -> Result<()> {
        let _guard = self.command.lock().await;

        {
            let queue = self.queue.lock().expect("queue lock poisoned");
            let current = queue.current().ok_or(Error::EmptyQueue)?;
            if position > current.info.length {
                return Err(Error::build(format!(
                    "position {position}ms is past the track length of {}ms",
                    current.info.length
                )));
            }
        }

        let update = UpdatePlayer {
            position: Some(position),
            ..UpdatePlayer::default()
        };
        self.send_update(&update).await.map(|_| ())
    }

    /// Applies a filter update.
    ///
    /// Tri-state merge semantics: fields the update leaves unset keep
    /// their current server-side value, cleared fields are removed, set
    /// fields take the new value. The locally mirrored filter state merges
    /// the same way and rolls back if the node rejects the update.
    pub async fn set_filters(&self, update: Filters) -> Result<()> {
        let _guard = self.command.lock().await;

        let previous = {
            let mut intent = self.intent.lock().expect("intent lock poisoned");
            let previous = intent.filters.clone();
            let mut merged = previous.clone().unwrap_or_default();
            merged.merge(&update);
            intent.filters = Some(merged);
            previous
        };

        let payload = UpdatePlayer {
            filters: Some(update),
            ..UpdatePlayer::default()
        };
        match self.send_update(&payload).await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.intent.lock().expect("intent lock poisoned").filters = previous;
                Err(e)
            }
        }
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    /// Resolves the assigned node, failing fast when there is none.
    fn assigned_node(&self) -> Result<Arc<Node>> {
        let name = self
            .node
            .read()
            .expect("node lock poisoned")
            .clone()
            .ok_or(Error::PlayerUnassigned)?;
        let pool = self.pool.upgrade().ok_or(Error::NodeUnavailable)?;
        pool.node(&name).ok_or(Error::NodeUnavailable)
    }

    /// Issues one update-player command. The caller holds the command
    /// guard.
    async fn send_update(&self, update: &UpdatePlayer) -> Result<PlayerInfo> {
        let node = self.assigned_node()?;
        node.rest()
            .update_player(self.guild_id, update, false)
            .await
    }

    pub(crate) fn set_node(&self, node: Option<String>) {
        *self.node.write().expect("node lock poisoned") = node;
    }

    /// Drops the remote snapshot, carrying the last position into the
    /// resync intent. Called when the authoritative state is lost (node
    /// failover, fresh session).
    pub(crate) fn invalidate_snapshot(&self) {
        let taken = self.snapshot.lock().expect("snapshot lock poisoned").take();
        if let Some(state) = taken {
            self.intent
                .lock()
                .expect("intent lock poisoned")
                .resume_position = Some(state.position);
        }
    }

    /// Replays preserved intent against a freshly assigned node, so a
    /// failover never silently drops accepted state.
    pub(crate) async fn resync(&self) {
        let _guard = self.command.lock().await;

        let Some(update) = self.resync_update() else {
            return;
        };

        match self.send_update(&update).await {
            Ok(_) => {
                self.intent
                    .lock()
                    .expect("intent lock poisoned")
                    .resume_position = None;
                debug!("guild {}: resynchronized after reassignment", self.guild_id);
            }
            Err(e) => warn!("guild {}: resync failed: {e}", self.guild_id),
        }
    }

    /// Builds the single update that restores this player's intent.
    fn resync_update(&self) -> Option<UpdatePlayer> {
        let intent = self.intent.lock().expect("intent lock poisoned").clone();
        let head = self
            .queue
            .lock()
            .expect("queue lock poisoned")
            .current()
            .cloned();

        let mut update = UpdatePlayer {
            voice: intent.voice.clone(),
            filters: intent.filters.clone(),
            ..UpdatePlayer::default()
        };
        if intent.volume != DEFAULT_VOLUME {
            update.volume = Some(intent.volume);
        }
        if intent.playing {
            if let Some(head) = head {
                update.track = Some(UpdateTrack::play(&head));
                update.position = intent.resume_position;
                update.paused = Some(intent.paused);
            }
        }

        // A never-touched player has nothing worth replaying.
        (update != UpdatePlayer::default()).then_some(update)
    }

    /// Tears the player down: queue and intent discarded, best-effort
    /// remote destroy with a short timeout, node unassigned.
    pub(crate) async fn teardown(&self) {
        let _guard = self.command.lock().await;

        self.queue.lock().expect("queue lock poisoned").clear();
        {
            let mut intent = self.intent.lock().expect("intent lock poisoned");
            *intent = Intent::default();
        }
        *self.snapshot.lock().expect("snapshot lock poisoned") = None;

        let node_name = self.node.write().expect("node lock poisoned").take();
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        let Some(name) = node_name else {
            return;
        };
        let Some(node) = pool.node(&name) else {
            return;
        };

        node.unassign(self.guild_id);

        // Best effort: the node garbage-collects its side independently.
        let destroy = node.rest().delete_player(self.guild_id);
        match tokio::time::timeout(pool.config().destroy_timeout, destroy).await {
            Ok(Ok(())) => debug!("guild {}: remote player destroyed", self.guild_id),
            Ok(Err(e)) => debug!("guild {}: remote destroy failed: {e}", self.guild_id),
            Err(_) => debug!("guild {}: remote destroy timed out", self.guild_id),
        }
    }

    /// Overwrites the remote-mirrored snapshot. Never touches queue or
    /// intent, so server echo cannot feed back into local decisions.
    pub(crate) fn handle_player_update(&self, state: PlayerState) {
        *self.snapshot.lock().expect("snapshot lock poisoned") = Some(state);
    }

    /// Handles a guild-scoped event from the owning node.
    pub(crate) async fn handle_event(&self, payload: &EventPayload) {
        match payload {
            EventPayload::TrackStart { .. } => {
                *self
                    .advance_target
                    .lock()
                    .expect("advance lock poisoned") = None;
                self.intent.lock().expect("intent lock poisoned").playing = true;
            }
            EventPayload::TrackEnd { track, reason, .. } => {
                self.handle_track_end(track, *reason).await;
            }
            EventPayload::TrackException {
                track, exception, ..
            } => {
                warn!(
                    "guild {}: exception playing {:?}: {} ({:?})",
                    self.guild_id, track.info.title, exception.cause, exception.severity
                );
            }
            EventPayload::TrackStuck {
                track,
                threshold_ms,
                ..
            } => {
                warn!(
                    "guild {}: track {:?} stuck for over {threshold_ms}ms",
                    self.guild_id, track.info.title
                );
            }
            EventPayload::WebSocketClosed {
                code,
                reason,
                by_remote,
                ..
            } => {
                warn!(
                    "guild {}: voice websocket closed ({code} {reason}, by_remote: {by_remote})",
                    self.guild_id
                );
            }
        }
    }

    /// Queue progression on track end.
    ///
    /// Only `Finished` and `LoadFailed` advance; `Stopped` and `Replaced`
    /// were caused by our own commands. The advance target guard bounds
    /// repeated `LoadFailed` ends to a single attempt per transition.
    async fn handle_track_end(&self, finished: &Track, reason: TrackEndReason) {
        if !reason.may_start_next() {
            if matches!(reason, TrackEndReason::Stopped | TrackEndReason::Cleanup) {
                self.intent.lock().expect("intent lock poisoned").playing = false;
            }
            return;
        }

        let _guard = self.command.lock().await;

        if reason == TrackEndReason::LoadFailed {
            let mut target = self.advance_target.lock().expect("advance lock poisoned");
            if target.as_deref() == Some(finished.encoded.as_str()) {
                // The previous transition already advanced to this track
                // and it still would not load; trying again would loop.
                *target = None;
                drop(target);
                warn!(
                    "guild {}: {:?} failed to load again, parking playback",
                    self.guild_id, finished.info.title
                );
                self.intent.lock().expect("intent lock poisoned").playing = false;
                return;
            }
        }

        let (mode, autoplay) = {
            let intent = self.intent.lock().expect("intent lock poisoned");
            (intent.loop_mode, intent.autoplay)
        };

        let mut next = self
            .queue
            .lock()
            .expect("queue lock poisoned")
            .advance(mode)
            .cloned();

        if next.is_none() && autoplay {
            if let Some(related) = self.autoplay_next(finished).await {
                self.queue
                    .lock()
                    .expect("queue lock poisoned")
                    .push(related.clone());
                next = Some(related);
            }
        }

        match next {
            Some(track) => {
                *self
                    .advance_target
                    .lock()
                    .expect("advance lock poisoned") = Some(track.encoded.clone());

                let update = UpdatePlayer {
                    track: Some(UpdateTrack::play(&track)),
                    ..UpdatePlayer::default()
                };
                match self.send_update(&update).await {
                    Ok(_) => {
                        self.intent.lock().expect("intent lock poisoned").playing = true;
                        self.emit(Event::QueueNext {
                            guild_id: self.guild_id,
                            track,
                            old_track: finished.clone(),
                        });
                    }
                    Err(e) => {
                        warn!(
                            "guild {}: failed to start next track: {e}",
                            self.guild_id
                        );
                        self.intent.lock().expect("intent lock poisoned").playing = false;
                    }
                }
            }
            None => {
                self.intent.lock().expect("intent lock poisoned").playing = false;
                self.emit(Event::QueueEmpty {
                    guild_id: self.guild_id,
                    old_track: finished.clone(),
                });
            }
        }
    }

    /// Asks the search collaborator for a track related to the one that
    /// just finished. One attempt; failures only log.
    async fn autoplay_next(&self, finished: &Track) -> Option<Track> {
        let node = self.assigned_node().ok()?;

        let source = SearchSource::from_source_name(&finished.info.source_name)
            .unwrap_or(SearchSource::YouTube);
        let query = source.query(&format!(
            "{} {}",
            finished.info.author, finished.info.title
        ));
        debug!("guild {}: autoplay lookup {query:?}", self.guild_id);

        match node.rest().load_tracks(&query).await {
            Ok(LoadResult::Search(tracks)) => tracks
                .into_iter()
                .find(|track| track.encoded != finished.encoded),
            Ok(LoadResult::Track(track)) => {
                (track.encoded != finished.encoded).then_some(track)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("guild {}: autoplay lookup failed: {e}", self.guild_id);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    use super::*;
    use crate::queue::test_track;

    fn detached_player() -> Arc<Player> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Player::new(GuildId(1), Weak::new(), tx)
    }

    #[test]
    fn volume_clamps_and_resets() {
        assert_eq!(clamp_volume(None), 100);
        assert_eq!(clamp_volume(Some(0)), 0);
        assert_eq!(clamp_volume(Some(250)), 250);
        assert_eq!(clamp_volume(Some(1000)), 1000);
        assert_eq!(clamp_volume(Some(4000)), 1000);
    }

    #[test]
    fn fresh_player_is_unassigned_with_defaults() {
        let player = detached_player();
        assert_eq!(player.state(), PlaybackState::Unassigned);
        assert_eq!(player.volume(), DEFAULT_VOLUME);
        assert_eq!(player.loop_mode(), LoopMode::Off);
        assert!(!player.autoplay());
        assert!(player.queue().is_empty());
        assert_eq!(player.position(), None);
    }

    #[test]
    fn queue_edits_work_without_a_node() {
        let player = detached_player();
        player.add(test_track("a"));
        player.add_all([test_track("b"), test_track("c")]);
        assert_eq!(player.queue().len(), 3);

        let removed = player.remove(0).unwrap();
        assert_eq!(removed.encoded, "a");
        assert_eq!(player.current().unwrap().encoded, "b");

        assert_eq!(player.set_loop(LoopMode::Queue), LoopMode::Queue);
        assert!(player.set_autoplay(None));
        assert!(!player.set_autoplay(None));
        assert!(player.set_autoplay(Some(true)));
    }

    #[tokio::test]
    async fn remote_commands_fail_fast_when_unassigned() {
        let player = detached_player();
        player.add(test_track("a"));

        assert!(matches!(
            player.play(None).await,
            Err(Error::PlayerUnassigned)
        ));
        assert!(matches!(
            player.pause(None).await,
            Err(Error::PlayerUnassigned)
        ));
        assert!(matches!(
            player.skip(1).await,
            Err(Error::PlayerUnassigned)
        ));
        assert!(matches!(
            player.set_volume(Some(50)).await,
            Err(Error::PlayerUnassigned)
        ));
    }

    #[tokio::test]
    async fn failed_commands_roll_back_local_intent() {
        let player = detached_player();
        player.add_all([test_track("a"), test_track("b")]);

        // Every command fails (no node); none may leave intent or queue
        // changed behind.
        assert!(player.pause(Some(true)).await.is_err());
        assert!(!player.paused());

        assert!(player.set_volume(Some(500)).await.is_err());
        assert_eq!(player.volume(), DEFAULT_VOLUME);

        assert!(player.skip(1).await.is_err());
        assert_eq!(player.queue().len(), 2);
        assert_eq!(player.current().unwrap().encoded, "a");

        assert!(player.clear().await.is_err());
        assert_eq!(player.queue().len(), 2);

        assert!(player.set_filters(Filters::new().volume(0.5)).await.is_err());
        assert_eq!(player.filters(), None);

        assert!(player.play(Some(test_track("c"))).await.is_err());
        assert_eq!(player.queue().len(), 2);
        assert_eq!(player.current().unwrap().encoded, "a");
    }

    #[tokio::test]
    async fn play_with_empty_queue_and_no_track_fails() {
        let player = detached_player();
        assert!(matches!(player.play(None).await, Err(Error::EmptyQueue)));
    }

    #[test]
    fn player_update_only_touches_the_snapshot() {
        let player = detached_player();
        player.add(test_track("a"));
        player.set_loop(LoopMode::Track);

        player.handle_player_update(PlayerState {
            time: 10,
            position: 5_000,
            connected: true,
            ping: 40,
        });

        assert_eq!(player.position(), Some(5_000));
        assert_eq!(player.queue().len(), 1);
        assert_eq!(player.loop_mode(), LoopMode::Track);
    }

    #[tokio::test]
    async fn track_end_advances_the_queue_even_without_a_node() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let player = Player::new(GuildId(1), Weak::new(), tx);
        player.add_all([test_track("a"), test_track("b")]);

        let finished = test_track("a");
        player
            .handle_event(&EventPayload::TrackEnd {
                guild_id: GuildId(1),
                track: finished,
                reason: TrackEndReason::Finished,
            })
            .await;

        // The queue advanced; the play command itself failed (no node), so
        // the player parked instead of claiming to play.
        assert_eq!(player.current().unwrap().encoded, "b");
        assert_eq!(player.state(), PlaybackState::Unassigned);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stopped_and_replaced_ends_do_not_advance() {
        let player = detached_player();
        player.add_all([test_track("a"), test_track("b")]);

        for reason in [TrackEndReason::Stopped, TrackEndReason::Replaced] {
            player
                .handle_event(&EventPayload::TrackEnd {
                    guild_id: GuildId(1),
                    track: test_track("a"),
                    reason,
                })
                .await;
            assert_eq!(player.queue().len(), 2);
        }
    }

    #[tokio::test]
    async fn repeated_load_failures_park_instead_of_looping() {
        let player = detached_player();
        player.add(test_track("a"));
        player.set_loop(LoopMode::Track);

        // First failure advances (loop keeps the same head) and records
        // the transition target.
        player
            .handle_event(&EventPayload::TrackEnd {
                guild_id: GuildId(1),
                track: test_track("a"),
                reason: TrackEndReason::LoadFailed,
            })
            .await;
        assert_eq!(
            player.advance_target.lock().unwrap().as_deref(),
            Some("a")
        );

        // The same track failing again must not re-trigger the advance.
        player
            .handle_event(&EventPayload::TrackEnd {
                guild_id: GuildId(1),
                track: test_track("a"),
                reason: TrackEndReason::LoadFailed,
            })
            .await;
        assert_eq!(player.advance_target.lock().unwrap().as_deref(), None);
        assert_eq!(player.queue().len(), 1);
    }

    #[tokio::test]
    async fn queue_exhaustion_emits_queue_empty() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let player = Player::new(GuildId(1), Weak::new(), tx);
        player.add(test_track("a"));

        player
            .handle_event(&EventPayload::TrackEnd {
                guild_id: GuildId(1),
                track: test_track("a"),
                reason: TrackEndReason::Finished,
            })
            .await;

        assert!(player.queue().is_empty());
        match rx.try_recv() {
            Ok(Event::QueueEmpty { old_track, .. }) => {
                assert_eq!(old_track.encoded, "a");
            }
            other => panic!("expected queue empty event, got {other:?}"),
        }
    }

    #[test]
    fn invalidation_carries_position_into_resync_intent() {
        let player = detached_player();
        player.handle_player_update(PlayerState {
            time: 10,
            position: 42_000,
            connected: true,
            ping: 40,
        });

        player.invalidate_snapshot();
        assert_eq!(player.position(), None);
        assert_eq!(
            player
                .intent
                .lock()
                .unwrap()
                .resume_position,
            Some(42_000)
        );
    }
}
