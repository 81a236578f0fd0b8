//! Inbound WebSocket frames.
//!
//! Every frame a node pushes is a JSON object tagged with an `op`
//! discriminator; `op: "event"` payloads carry a second `type` tag. Both
//! tags map onto closed enums here, so downstream code matches on variants
//! and never inspects raw payloads.

use serde::Deserialize;

use super::{
    player::PlayerState,
    session::Stats,
    track::{Exception, Track},
    GuildId,
};
use crate::error::Result;

/// A decoded frame from the node's event stream.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Message {
    /// First frame of a session; carries the identifier REST calls need.
    #[serde(rename_all = "camelCase")]
    Ready {
        /// Whether the node resumed the previous session. Resumed sessions
        /// keep their server-side players; assignment must not be reset.
        resumed: bool,
        session_id: String,
    },

    /// Authoritative playback snapshot for one guild.
    #[serde(rename_all = "camelCase")]
    PlayerUpdate {
        guild_id: GuildId,
        state: PlayerState,
    },

    /// Periodic node statistics.
    Stats(Stats),

    /// A guild-scoped playback event.
    Event(EventPayload),
}

impl Message {
    /// Decodes a text frame into a typed message.
    pub fn from_text(text: &str) -> Result<Self> {
        super::json(text, "websocket")
    }
}

/// Payloads behind `op: "event"`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    #[serde(rename = "TrackStartEvent", rename_all = "camelCase")]
    TrackStart { guild_id: GuildId, track: Track },

    #[serde(rename = "TrackEndEvent", rename_all = "camelCase")]
    TrackEnd {
        guild_id: GuildId,
        track: Track,
        reason: TrackEndReason,
    },

    #[serde(rename = "TrackExceptionEvent", rename_all = "camelCase")]
    TrackException {
        guild_id: GuildId,
        track: Track,
        exception: Exception,
    },

    #[serde(rename = "TrackStuckEvent", rename_all = "camelCase")]
    TrackStuck {
        guild_id: GuildId,
        track: Track,
        threshold_ms: u64,
    },

    #[serde(rename = "WebSocketClosedEvent", rename_all = "camelCase")]
    WebSocketClosed {
        guild_id: GuildId,
        code: u16,
        reason: String,
        by_remote: bool,
    },
}

impl EventPayload {
    /// The guild this event belongs to.
    #[must_use]
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::TrackStart { guild_id, .. }
            | Self::TrackEnd { guild_id, .. }
            | Self::TrackException { guild_id, .. }
            | Self::TrackStuck { guild_id, .. }
            | Self::WebSocketClosed { guild_id, .. } => *guild_id,
        }
    }
}

/// Why a track stopped playing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl TrackEndReason {
    /// Whether the queue may advance to the next track.
    ///
    /// `Stopped` and `Replaced` mean the client itself caused the end;
    /// advancing would fight the command that did.
    #[must_use]
    pub fn may_start_next(self) -> bool {
        matches!(self, Self::Finished | Self::LoadFailed)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn ready_decodes() {
        let frame = r#"{"op": "ready", "resumed": false, "sessionId": "la3kfsdf5eafe848"}"#;
        assert_eq!(
            Message::from_text(frame).unwrap(),
            Message::Ready {
                resumed: false,
                session_id: "la3kfsdf5eafe848".to_string(),
            }
        );
    }

    #[test]
    fn player_update_decodes() {
        let frame = r#"{
            "op": "playerUpdate",
            "guildId": "1234567890",
            "state": {"time": 1500467109, "position": 60000, "connected": true, "ping": 50}
        }"#;
        match Message::from_text(frame).unwrap() {
            Message::PlayerUpdate { guild_id, state } => {
                assert_eq!(guild_id, GuildId(1_234_567_890));
                assert_eq!(state.position, 60_000);
                assert!(state.connected);
            }
            other => panic!("expected player update, got {other:?}"),
        }
    }

    #[test]
    fn stats_decodes() {
        let frame = r#"{
            "op": "stats",
            "players": 1,
            "playingPlayers": 1,
            "uptime": 123456789,
            "memory": {"free": 123456, "used": 6543, "allocated": 4096, "reservable": 127},
            "cpu": {"cores": 4, "systemLoad": 0.5, "lavalinkLoad": 0.1},
            "frameStats": null
        }"#;
        match Message::from_text(frame).unwrap() {
            Message::Stats(stats) => {
                assert_eq!(stats.players, 1);
                assert_eq!(stats.cpu.cores, 4);
                assert_eq!(stats.frame_stats, None);
            }
            other => panic!("expected stats, got {other:?}"),
        }
    }

    #[test]
    fn track_end_decodes_with_reason() {
        let frame = format!(
            r#"{{
                "op": "event",
                "type": "TrackEndEvent",
                "guildId": "1234567890",
                "track": {},
                "reason": "loadFailed"
            }}"#,
            crate::protocol::track::TEST_TRACK_PAYLOAD
        );
        match Message::from_text(&frame).unwrap() {
            Message::Event(EventPayload::TrackEnd { reason, .. }) => {
                assert_eq!(reason, TrackEndReason::LoadFailed);
                assert!(reason.may_start_next());
            }
            other => panic!("expected track end, got {other:?}"),
        }
    }

    #[test]
    fn websocket_closed_decodes() {
        let frame = r#"{
            "op": "event",
            "type": "WebSocketClosedEvent",
            "guildId": "1234567890",
            "code": 4006,
            "reason": "Your session is no longer valid.",
            "byRemote": true
        }"#;
        match Message::from_text(frame).unwrap() {
            Message::Event(payload @ EventPayload::WebSocketClosed { code, .. }) => {
                assert_eq!(code, 4006);
                assert_eq!(payload.guild_id(), GuildId(1_234_567_890));
            }
            other => panic!("expected websocket closed, got {other:?}"),
        }
    }

    #[test]
    fn stopped_and_replaced_do_not_advance() {
        assert!(!TrackEndReason::Stopped.may_start_next());
        assert!(!TrackEndReason::Replaced.may_start_next());
        assert!(!TrackEndReason::Cleanup.may_start_next());
        assert!(TrackEndReason::Finished.may_start_next());
    }
}
