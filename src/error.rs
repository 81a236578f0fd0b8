//! Error handling for tonelink.
//!
//! All public operations fail with a typed [`enum@Error`]; empty *results*
//! (an empty search, a queue that ran out) are modeled as values, never as
//! errors. The taxonomy splits into:
//!
//! * fatal authentication failures ([`Auth`](Error::Auth)), never retried
//! * transient connectivity failures ([`Unreachable`](Error::Unreachable),
//!   timeouts, 5xx responses), retried up to the configured bound before
//!   surfacing
//! * structural failures surfaced immediately (no node to assign, duplicate
//!   names, malformed payloads, commands against an unassigned player)
//!
//! The [`Error::is_transient`] predicate is what the REST retry layer keys
//! off: everything it rejects propagates to the caller on first occurrence.

use thiserror::Error;

/// Standard result type for tonelink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type shared across the node pool, players and the REST layer.
#[derive(Debug, Error)]
pub enum Error {
    /// The node rejected the configured password. Fatal; never retried.
    #[error("authentication rejected by node: {0}")]
    Auth(String),

    /// The node could not be reached (refused, timed out, DNS failure).
    /// Retried with backoff before surfacing.
    #[error("node unreachable: {0}")]
    Unreachable(String),

    /// The owning node is not in the `Connected` state; the call failed
    /// fast instead of retrying against a dead connection.
    #[error("node is not connected")]
    NodeUnavailable,

    /// The node's WebSocket is up but the `ready` frame carrying the
    /// session identifier has not arrived yet.
    #[error("node session is not ready")]
    NotReady,

    /// No `Connected` node exists to assign a player to.
    #[error("no connected node available for assignment")]
    NoAvailableNode,

    /// The pool holds no nodes at all; one must be added explicitly before
    /// players can be created.
    #[error("no nodes have been added to the pool")]
    NoSessions,

    /// A remote command was issued against a player that currently has no
    /// node. Local queue and intent remain usable and are replayed once the
    /// player is reassigned.
    #[error("player is not assigned to a node")]
    PlayerUnassigned,

    /// The guild has no registered player.
    #[error("no player exists for guild {0}")]
    PlayerMissing(crate::protocol::GuildId),

    /// `play` was called with no argument on an empty queue.
    #[error("queue is empty")]
    EmptyQueue,

    /// A name or guild id that must be unique within the pool was reused.
    #[error("{0} already exists")]
    UniqueConstraint(String),

    /// A payload (track, filters, wire frame) could not be built or parsed.
    #[error("build failed: {reason}")]
    Build {
        reason: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The node resolved a track load to an error result.
    #[error("track load failed: {}", .0.cause)]
    TrackLoad(crate::protocol::track::Exception),

    /// The node answered a REST command with an error status. Carries the
    /// structured Lavalink error body when one was returned.
    #[error("node rejected command ({status} {reason})")]
    RemoteCommand {
        status: u16,
        reason: String,
        message: Option<String>,
        path: Option<String>,
        trace: Option<String>,
    },

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("parsing JSON failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("parsing URL failed: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("invalid header value: {0}")]
    Header(#[from] http::header::InvalidHeaderValue),
}

impl Error {
    /// Shorthand for a [`Build`](Self::Build) error without a cause.
    pub fn build(reason: impl Into<String>) -> Self {
        Self::Build {
            reason: reason.into(),
            cause: None,
        }
    }

    /// Shorthand for a [`Build`](Self::Build) error wrapping `cause`.
    pub fn build_with<E>(reason: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Build {
            reason: reason.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// The HTTP status attached to this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteCommand { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the REST retry layer may re-issue the failed call.
    ///
    /// Timeouts, connection failures and 5xx responses are transient;
    /// authentication and validation failures are permanent and propagate
    /// on first occurrence.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable(_) => true,
            Self::RemoteCommand { status, .. } => *status >= 500,
            Self::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(status: u16) -> Error {
        Error::RemoteCommand {
            status,
            reason: "test".to_string(),
            message: None,
            path: None,
            trace: None,
        }
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(remote(500).is_transient());
        assert!(remote(503).is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        assert!(!remote(400).is_transient());
        assert!(!remote(404).is_transient());
        assert!(!Error::Auth("bad password".to_string()).is_transient());
        assert!(!Error::NodeUnavailable.is_transient());
        assert!(!Error::PlayerUnassigned.is_transient());
    }

    #[test]
    fn unreachable_is_transient() {
        assert!(Error::Unreachable("connection refused".to_string()).is_transient());
    }
}
