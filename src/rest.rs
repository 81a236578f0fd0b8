//! Typed REST surface of a node, with bounded retry.
//!
//! Every outbound call goes through [`Rest::call`], which applies:
//!
//! * a circuit check — if the owning node is not `Connected`, the call
//!   fails fast with [`Error::NodeUnavailable`] instead of retrying
//! * bounded retries with backoff for transient failures only (timeouts,
//!   connection failures, 5xx); permanent failures (4xx validation, auth)
//!   surface immediately
//! * session-identifier refresh — a 404 on a session-scoped path after the
//!   node reconnected forces one immediate retry with the current
//!   identifier before surfacing
//!
//! All calls issued here are idempotent (GET, PATCH and DELETE with
//! absolute bodies), so re-issuing after a transient failure is safe.

use std::{sync::Arc, time::Duration};

use exponential_backoff::Backoff;
use http::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;

use crate::{
    config::{Config, NodeConfig},
    error::{Error, Result},
    http::Client as HttpClient,
    node::SessionHandle,
    protocol::{
        self,
        player::{PlayerInfo, UpdatePlayer},
        session::{
            FreeAddress, Info, RoutePlannerStatus, SessionInfo, SessionUpdate, Stats,
        },
        track::{LoadResult, Track},
        GuildId,
    },
};

/// Version segment prefixed to all routes except `/version`.
const API_VERSION: &str = "/v4";

/// Minimum delay between transient-failure retries.
const RETRY_MIN_DELAY: Duration = Duration::from_millis(250);

/// Maximum delay between transient-failure retries.
const RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

/// Structured error body the node attaches to 4xx/5xx responses.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    status: u16,
    error: String,
    message: Option<String>,
    path: String,
    trace: Option<String>,
}

/// The target of a call, resolved against the node's base URL per attempt.
#[derive(Copy, Clone, Debug)]
enum Target<'a> {
    /// A fixed path under `/v4`.
    Versioned(&'a str),
    /// A fixed path without the version segment (`/version` only).
    Unversioned(&'a str),
    /// A path under `/v4/sessions/{session_id}`, resolved at issue time.
    /// Fails with [`Error::NotReady`] until the session identifier arrives.
    Session(&'a str),
}

/// REST client scoped to one node, shared by all players assigned to it.
pub struct Rest {
    http: HttpClient,
    base: Url,
    auth: HeaderValue,
    session: Arc<SessionHandle>,
    retries: u32,
}

impl Rest {
    pub(crate) fn new(
        config: &Config,
        node: &NodeConfig,
        session: Arc<SessionHandle>,
    ) -> Result<Self> {
        let base = node.http_base().parse::<Url>()?;
        let auth = HeaderValue::from_str(&node.password)?;

        Ok(Self {
            http: HttpClient::new(config)?,
            base,
            auth,
            session,
            retries: config.rest_retries,
        })
    }

    /// Resolves a search query or URL to tracks.
    pub async fn load_tracks(&self, identifier: &str) -> Result<LoadResult> {
        let body = self
            .call(
                Method::GET,
                Target::Versioned("/loadtracks"),
                &[("identifier", identifier)],
                None,
            )
            .await?;

        LoadResult::from_payload(&body)
    }

    /// Decodes a single encoded track into its metadata.
    pub async fn decode_track(&self, encoded: &str) -> Result<Track> {
        let body = self
            .call(
                Method::GET,
                Target::Versioned("/decodetrack"),
                &[("encodedTrack", encoded)],
                None,
            )
            .await?;

        protocol::json(&body, "decodetrack")
    }

    /// Decodes a batch of encoded tracks.
    pub async fn decode_tracks(&self, encoded: &[String]) -> Result<Vec<Track>> {
        let body = self
            .call(
                Method::POST,
                Target::Versioned("/decodetracks"),
                &[],
                Some(serde_json::to_string(encoded)?),
            )
            .await?;

        protocol::json(&body, "decodetracks")
    }

    /// Fetches every player the node holds for this session.
    pub async fn fetch_players(&self) -> Result<Vec<PlayerInfo>> {
        let body = self
            .call(Method::GET, Target::Session("/players"), &[], None)
            .await?;

        protocol::json(&body, "players")
    }

    /// Fetches one guild's player.
    pub async fn fetch_player(&self, guild_id: GuildId) -> Result<PlayerInfo> {
        let path = format!("/players/{guild_id}");
        let body = self
            .call(Method::GET, Target::Session(&path), &[], None)
            .await?;

        protocol::json(&body, "player")
    }

    /// Applies a sparse update to one guild's player.
    ///
    /// Only fields present in `update` change server-side. With
    /// `no_replace`, a play request is ignored if a track is already
    /// playing.
    pub async fn update_player(
        &self,
        guild_id: GuildId,
        update: &UpdatePlayer,
        no_replace: bool,
    ) -> Result<PlayerInfo> {
        let path = format!("/players/{guild_id}");
        let no_replace = if no_replace { "true" } else { "false" };
        let body = self
            .call(
                Method::PATCH,
                Target::Session(&path),
                &[("noReplace", no_replace)],
                Some(serde_json::to_string(update)?),
            )
            .await?;

        protocol::json(&body, "player update")
    }

    /// Destroys one guild's player on the node.
    pub async fn delete_player(&self, guild_id: GuildId) -> Result<()> {
        let path = format!("/players/{guild_id}");
        self.call(Method::DELETE, Target::Session(&path), &[], None)
            .await
            .map(|_| ())
    }

    /// Updates this session's resuming configuration.
    pub async fn update_session(&self, update: &SessionUpdate) -> Result<SessionInfo> {
        let body = self
            .call(
                Method::PATCH,
                Target::Session(""),
                &[],
                Some(serde_json::to_string(update)?),
            )
            .await?;

        protocol::json(&body, "session update")
    }

    /// Fetches node metadata.
    pub async fn info(&self) -> Result<Info> {
        let body = self
            .call(Method::GET, Target::Versioned("/info"), &[], None)
            .await?;

        protocol::json(&body, "info")
    }

    /// Fetches the node's version string.
    pub async fn version(&self) -> Result<String> {
        self.call(Method::GET, Target::Unversioned("/version"), &[], None)
            .await
    }

    /// Fetches node statistics.
    pub async fn stats(&self) -> Result<Stats> {
        let body = self
            .call(Method::GET, Target::Versioned("/stats"), &[], None)
            .await?;

        protocol::json(&body, "stats")
    }

    /// Fetches route planner status; both fields are absent when the node
    /// has no route planner configured.
    pub async fn routeplanner_status(&self) -> Result<RoutePlannerStatus> {
        let body = self
            .call(
                Method::GET,
                Target::Versioned("/routeplanner/status"),
                &[],
                None,
            )
            .await?;

        protocol::json(&body, "routeplanner status")
    }

    /// Frees a single failing route planner address.
    pub async fn routeplanner_free_address(&self, address: &str) -> Result<()> {
        let body = FreeAddress {
            address: address.to_string(),
        };
        self.call(
            Method::POST,
            Target::Versioned("/routeplanner/free/address"),
            &[],
            Some(serde_json::to_string(&body)?),
        )
        .await
        .map(|_| ())
    }

    /// Frees every failing route planner address.
    pub async fn routeplanner_free_all(&self) -> Result<()> {
        self.call(
            Method::POST,
            Target::Versioned("/routeplanner/free/all"),
            &[],
            None,
        )
        .await
        .map(|_| ())
    }

    /// Credential preflight used while connecting.
    ///
    /// Bypasses the circuit check and retry (the reconnect loop owns retry
    /// during connection establishment). A 401/403 surfaces as
    /// [`Error::Auth`] before the WebSocket ever opens.
    pub(crate) async fn preflight(&self) -> Result<()> {
        let url = self.base.join("/version")?;
        self.execute(Method::GET, url, None).await.map(|_| ())
    }

    /// Issues one call with circuit check, bounded retry and session
    /// refresh. Returns the raw response body (empty on 204).
    async fn call(
        &self,
        method: Method,
        target: Target<'_>,
        query: &[(&str, &str)],
        body: Option<String>,
    ) -> Result<String> {
        let backoff = Backoff::new(self.retries + 1, RETRY_MIN_DELAY, RETRY_MAX_DELAY);
        let mut delays = backoff.iter();
        let mut refreshed = false;

        loop {
            if !self.session.is_connected() {
                return Err(Error::NodeUnavailable);
            }

            let url = self.resolve(target, query)?;
            let result = self.execute(method.clone(), url, body.clone()).await;

            let error = match result {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };

            // A 404 on a session-scoped path usually means the node
            // reconnected and handed out a new session identifier mid-call.
            // Retry once immediately with the refreshed identifier.
            if !refreshed
                && matches!(target, Target::Session(_))
                && error.status() == Some(404)
            {
                debug!("session-scoped 404, retrying with refreshed session id");
                refreshed = true;
                continue;
            }

            if error.is_transient() {
                if let Some(Some(delay)) = delays.next() {
                    debug!("transient failure, retrying in {delay:?}: {error}");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }

            return Err(error);
        }
    }

    /// Builds the absolute URL for a target, resolving the session
    /// identifier where the route requires one.
    fn resolve(&self, target: Target<'_>, query: &[(&str, &str)]) -> Result<Url> {
        let path = match target {
            Target::Versioned(path) => format!("{API_VERSION}{path}"),
            Target::Unversioned(path) => path.to_string(),
            Target::Session(suffix) => {
                let session_id = self.session.session_id().ok_or(Error::NotReady)?;
                format!("{API_VERSION}/sessions/{session_id}{suffix}")
            }
        };

        let mut url = self.base.join(&path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    async fn execute(&self, method: Method, url: Url, body: Option<String>) -> Result<String> {
        trace!("{method} {url}");

        let mut request = self.http.request(method, url, body.unwrap_or_default());
        let headers = request.headers_mut();
        headers.insert(AUTHORIZATION, self.auth.clone());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = match self.http.execute(request).await {
            Ok(response) => response,
            Err(Error::Http(e)) if e.is_connect() || e.is_timeout() => {
                return Err(Error::Unreachable(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Auth(format!("node returned {status}")));
        }

        if status.is_client_error() || status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::remote_error(status, &text));
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(String::new());
        }

        response.text().await.map_err(Into::into)
    }

    /// Maps an error response to [`Error::RemoteCommand`], preserving the
    /// structured body when the node sent one.
    fn remote_error(status: StatusCode, text: &str) -> Error {
        let reason = status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_string();

        match serde_json::from_str::<ErrorBody>(text) {
            Ok(body) => Error::RemoteCommand {
                status: body.status,
                reason: body.error,
                message: body.message,
                path: Some(body.path),
                trace: body.trace,
            },
            Err(_) => Error::RemoteCommand {
                status: status.as_u16(),
                reason,
                message: (!text.is_empty()).then(|| text.to_string()),
                path: None,
                trace: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn structured_error_bodies_are_preserved() {
        let body = r#"{
            "timestamp": 1667857581613,
            "status": 404,
            "error": "Not Found",
            "message": "Session not found",
            "path": "/v4/sessions/stale/players/1234567890",
            "trace": null
        }"#;
        match Rest::remote_error(StatusCode::NOT_FOUND, body) {
            Error::RemoteCommand {
                status,
                reason,
                message,
                path,
                ..
            } => {
                assert_eq!(status, 404);
                assert_eq!(reason, "Not Found");
                assert_eq!(message.as_deref(), Some("Session not found"));
                assert_eq!(
                    path.as_deref(),
                    Some("/v4/sessions/stale/players/1234567890")
                );
            }
            other => panic!("expected remote command error, got {other:?}"),
        }
    }

    #[test]
    fn bodyless_errors_fall_back_to_canonical_reason() {
        match Rest::remote_error(StatusCode::BAD_GATEWAY, "") {
            Error::RemoteCommand {
                status,
                reason,
                message,
                ..
            } => {
                assert_eq!(status, 502);
                assert_eq!(reason, "Bad Gateway");
                assert_eq!(message, None);
            }
            other => panic!("expected remote command error, got {other:?}"),
        }
    }
}
