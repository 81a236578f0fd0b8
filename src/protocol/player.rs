//! Player resources and the sparse update payload.

use serde::{Deserialize, Serialize};

use super::{
    filters::{Field, Filters},
    track::Track,
    GuildId,
};

/// A player as the node reports it over REST.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub guild_id: GuildId,
    pub track: Option<Track>,
    pub volume: u16,
    pub paused: bool,
    pub state: PlayerState,
    pub voice: VoiceState,
    #[serde(default)]
    pub filters: Filters,
}

/// Authoritative playback snapshot, pushed in `playerUpdate` frames.
///
/// Only the node writes these values; the client mirrors them and never
/// assumes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    /// Unix timestamp of the snapshot in milliseconds.
    pub time: u64,
    /// Track position in milliseconds.
    pub position: u64,
    /// Whether the node is connected to the voice gateway.
    pub connected: bool,
    /// Voice gateway round-trip in milliseconds, `-1` when unmeasured.
    pub ping: i64,
}

/// Voice credentials forwarded from the host gateway.
///
/// Opaque to this crate; the node uses them to join the voice server.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceState {
    pub token: String,
    pub endpoint: String,
    pub session_id: String,
}

/// Sparse `PATCH` body for the update-player call.
///
/// Mirrors the Filters tri-state contract: unset fields are omitted and
/// left untouched server-side, cleared fields are explicitly nulled.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<UpdateTrack>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,

    /// End marker in milliseconds; cleared (`null`) removes a previous one.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    pub end_time: Field<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceState>,
}

/// Track portion of an update: play a new encoded form, or stop.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTrack {
    /// `Some(None)` serializes as `null` and stops the current track.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    pub encoded: Field<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<serde_json::Value>,
}

impl UpdateTrack {
    /// An update that starts playing `track`.
    #[must_use]
    pub fn play(track: &Track) -> Self {
        Self {
            encoded: Some(Some(track.encoded.clone())),
            user_data: track.user_data.clone(),
        }
    }

    /// An update that stops the current track.
    #[must_use]
    pub fn stop() -> Self {
        Self {
            encoded: Some(None),
            user_data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn update_omits_unset_fields() {
        let update = UpdatePlayer {
            paused: Some(true),
            ..UpdatePlayer::default()
        };
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({"paused": true}));
    }

    #[test]
    fn stop_serializes_null_track() {
        let update = UpdatePlayer {
            track: Some(UpdateTrack::stop()),
            ..UpdatePlayer::default()
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"track": {"encoded": null}})
        );
    }

    #[test]
    fn player_info_decodes() {
        let body = json!({
            "guildId": "1234567890",
            "track": null,
            "volume": 100,
            "paused": false,
            "state": {"time": 1, "position": 2, "connected": true, "ping": 3},
            "voice": {"token": "token", "endpoint": "endpoint", "sessionId": "session"},
            "filters": {}
        });
        let info: PlayerInfo = serde_json::from_value(body).unwrap();
        assert_eq!(info.guild_id, GuildId(1_234_567_890));
        assert!(info.state.connected);
        assert_eq!(info.voice.session_id, "session");
    }
}
