//! Tracks, playlists and the result shapes of a track load.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A playable audio item.
///
/// The `encoded` field is the node's opaque serialization of the track and
/// is the track's identity: two tracks are the same item exactly when their
/// encoded forms match. Everything else is display metadata.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Opaque base64 serialization understood by the node.
    pub encoded: String,

    /// Display metadata decoded from the encoded form.
    pub info: TrackInfo,

    /// Extra fields attached by node plugins, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_info: Option<serde_json::Value>,

    /// Free-form data attached by the caller, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<serde_json::Value>,

    /// User id of whoever requested this track, attached at enqueue time.
    ///
    /// Client-side only; never part of the wire payload.
    #[serde(skip)]
    pub requestor: Option<u64>,
}

impl Track {
    /// Returns a copy annotated with the requesting user.
    #[must_use]
    pub fn requested_by(mut self, user_id: u64) -> Self {
        self.requestor = Some(user_id);
        self
    }
}

/// Display metadata for a [`Track`].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub identifier: String,
    pub is_seekable: bool,
    pub author: String,
    /// Track length in milliseconds.
    pub length: u64,
    pub is_stream: bool,
    /// Starting position in milliseconds.
    pub position: u64,
    pub title: String,
    pub source_name: String,
    pub uri: Option<String>,
    pub artwork_url: Option<String>,
    pub isrc: Option<String>,
}

/// An ordered collection of tracks returned from a playlist link.
///
/// Never mutated after load.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub info: PlaylistInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_info: Option<serde_json::Value>,
    pub tracks: Vec<Track>,
}

/// Playlist metadata.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    pub name: String,
    /// Index of the selected track, `-1` when none is selected.
    pub selected_track: i64,
}

/// Error detail the node attaches to failed loads and track exceptions.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exception {
    pub message: Option<String>,
    pub severity: Severity,
    pub cause: String,
}

/// How much the node trusts its own error classification.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The cause is known and expected (e.g. an age-restricted video).
    Common,
    /// The cause might not be exactly known.
    Suspicious,
    /// Something actually went wrong on the node.
    Fault,
}

/// The shape of a completed track load.
///
/// Callers must branch on the variant; an [`Empty`](Self::Empty) result is
/// a valid non-error outcome.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadResult {
    /// The identifier resolved to a single track.
    Track(Track),
    /// The identifier resolved to a playlist.
    Playlist(Playlist),
    /// A search produced zero or more candidate tracks.
    Search(Vec<Track>),
    /// The identifier matched nothing.
    Empty,
}

/// Raw `loadtracks` response before the `loadType` tag is resolved.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLoadResult {
    load_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl LoadResult {
    /// Resolves the `loadType` discriminator into a typed result.
    ///
    /// An `error` load surfaces as [`Error::TrackLoad`]; an unknown tag is
    /// a [`Error::Build`].
    pub fn from_payload(body: &str) -> Result<Self> {
        let raw: RawLoadResult = super::json(body, "loadtracks")?;

        match raw.load_type.as_str() {
            "track" => Ok(Self::Track(serde_json::from_value(raw.data)?)),
            "playlist" => Ok(Self::Playlist(serde_json::from_value(raw.data)?)),
            "search" => Ok(Self::Search(serde_json::from_value(raw.data)?)),
            "empty" => Ok(Self::Empty),
            "error" => {
                let exception: Exception = serde_json::from_value(raw.data)?;
                Err(Error::TrackLoad(exception))
            }
            other => Err(Error::build(format!("unknown loadType received: {other}"))),
        }
    }
}

/// Source selector prefixes of the search-query mini-protocol.
///
/// A query is either a bare URL or a plain string prefixed with one of
/// these selectors.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SearchSource {
    YouTube,
    YouTubeMusic,
    SoundCloud,
}

impl SearchSource {
    /// The identifier prefix the node expects for this source.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::YouTube => "ytsearch:",
            Self::YouTubeMusic => "ytmsearch:",
            Self::SoundCloud => "scsearch:",
        }
    }

    /// Builds a search identifier for `query` on this source.
    #[must_use]
    pub fn query(self, query: &str) -> String {
        format!("{}{query}", self.prefix())
    }

    /// Maps a track's `source_name` back to its search selector, where one
    /// exists.
    #[must_use]
    pub fn from_source_name(name: &str) -> Option<Self> {
        match name {
            "youtube" => Some(Self::YouTube),
            "youtubemusic" => Some(Self::YouTubeMusic),
            "soundcloud" => Some(Self::SoundCloud),
            _ => None,
        }
    }
}

/// Wire fixture shared by protocol decoding tests.
#[cfg(test)]
pub(crate) const TEST_TRACK_PAYLOAD: &str = r#"{
        "encoded": "QAAAjQIAJFR3",
        "info": {
            "identifier": "dQw4w9WgXcQ",
            "isSeekable": true,
            "author": "RickAstleyVEVO",
            "length": 212000,
            "isStream": false,
            "position": 0,
            "title": "Rick Astley - Never Gonna Give You Up",
            "sourceName": "youtube",
            "uri": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "artworkUrl": null,
            "isrc": null
        },
        "pluginInfo": {},
        "userData": {}
    }"#;

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn track_decodes_and_requestor_stays_local() {
        let track: Track = serde_json::from_str(TEST_TRACK_PAYLOAD).unwrap();
        assert_eq!(track.encoded, "QAAAjQIAJFR3");
        assert_eq!(track.info.length, 212_000);
        assert_eq!(track.requestor, None);

        let annotated = track.requested_by(80_351_110_224_678_912);
        let serialized = serde_json::to_value(&annotated).unwrap();
        assert!(serialized.get("requestor").is_none());
    }

    #[test]
    fn load_result_branches_on_load_type() {
        let body = format!(r#"{{"loadType": "track", "data": {TEST_TRACK_PAYLOAD}}}"#);
        assert!(matches!(
            LoadResult::from_payload(&body).unwrap(),
            LoadResult::Track(_)
        ));

        let body = format!(r#"{{"loadType": "search", "data": [{TEST_TRACK_PAYLOAD}]}}"#);
        match LoadResult::from_payload(&body).unwrap() {
            LoadResult::Search(tracks) => assert_eq!(tracks.len(), 1),
            other => panic!("expected search result, got {other:?}"),
        }

        let body = r#"{"loadType": "empty", "data": {}}"#;
        assert_eq!(LoadResult::from_payload(body).unwrap(), LoadResult::Empty);
    }

    #[test]
    fn error_load_surfaces_as_typed_error() {
        let body = r#"{
            "loadType": "error",
            "data": {"message": "video unavailable", "severity": "common", "cause": "age restricted"}
        }"#;
        match LoadResult::from_payload(body) {
            Err(Error::TrackLoad(exception)) => {
                assert_eq!(exception.severity, Severity::Common);
                assert_eq!(exception.cause, "age restricted");
            }
            other => panic!("expected track load error, got {other:?}"),
        }
    }

    #[test]
    fn search_prefixes_match_the_mini_protocol() {
        assert_eq!(
            SearchSource::YouTube.query("never gonna give you up"),
            "ytsearch:never gonna give you up"
        );
        assert_eq!(SearchSource::YouTubeMusic.prefix(), "ytmsearch:");
        assert_eq!(SearchSource::SoundCloud.prefix(), "scsearch:");
        assert_eq!(
            SearchSource::from_source_name("youtube"),
            Some(SearchSource::YouTube)
        );
        assert_eq!(SearchSource::from_source_name("bandcamp"), None);
    }
}
