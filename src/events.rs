//! Events emitted by the node pool and its players.
//!
//! Events are delivered over the channel handed out by
//! [`Client::new`](crate::client::Client::new). Node-scoped events track
//! connection health; guild-scoped events mirror what the node reports for
//! one player; queue events describe local progression decisions.

use crate::protocol::{
    messages::TrackEndReason,
    player::PlayerState,
    session::Stats,
    track::{Exception, Track},
    GuildId,
};

/// An event from a node or player.
#[derive(Clone, Debug)]
pub enum Event {
    /// A node session completed its handshake and is ready for commands.
    NodeReady {
        node: String,
        /// Whether the node resumed the previous session. Player
        /// assignment is only reset on fresh sessions.
        resumed: bool,
        session_id: String,
    },

    /// A node's stream dropped; reconnection is in progress.
    NodeDisconnected { node: String },

    /// A node exhausted its reconnection budget. Its players have been
    /// reassigned where possible.
    NodeFailed { node: String },

    /// Periodic statistics from a node.
    Stats { node: String, stats: Stats },

    /// Authoritative playback snapshot for one guild.
    PlayerUpdate {
        guild_id: GuildId,
        state: PlayerState,
    },

    /// A track started playing.
    TrackStart { guild_id: GuildId, track: Track },

    /// A track stopped playing.
    TrackEnd {
        guild_id: GuildId,
        track: Track,
        reason: TrackEndReason,
    },

    /// The node hit an exception while playing a track.
    TrackException {
        guild_id: GuildId,
        track: Track,
        exception: Exception,
    },

    /// A track stopped producing audio for longer than the node's
    /// threshold.
    TrackStuck {
        guild_id: GuildId,
        track: Track,
        threshold_ms: u64,
    },

    /// The node's own voice connection for a guild closed.
    WebSocketClosed {
        guild_id: GuildId,
        code: u16,
        reason: String,
        by_remote: bool,
    },

    /// The queue advanced to a new track.
    QueueNext {
        guild_id: GuildId,
        track: Track,
        old_track: Track,
    },

    /// The queue ran out after a track ended and nothing further could be
    /// started.
    QueueEmpty { guild_id: GuildId, old_track: Track },
}
