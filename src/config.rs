//! Client and node configuration.

use std::time::Duration;

use veil::Redact;

/// Client-wide configuration shared by every node session.
///
/// The `user_id` and `client_name` identify this client to the node during
/// the WebSocket handshake; the remaining fields tune retry and resume
/// behavior.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Config {
    /// Discord user id of the bot, sent as the `User-Id` handshake header.
    pub user_id: u64,

    /// `Client-Name` handshake header, in `name/version` form.
    pub client_name: String,

    /// `User-Agent` for REST requests.
    pub user_agent: String,

    /// WebSocket reconnect attempts before a node transitions to `Failed`
    /// and its players are migrated away.
    pub max_reconnects: u32,

    /// Bounded retries for transient REST failures.
    pub rest_retries: u32,

    /// Resume window advertised to each node after its session becomes
    /// ready. Reconnects within this window keep the server-side player
    /// state alive.
    pub resume_timeout: Duration,

    /// Budget for the best-effort remote destroy issued when a player is
    /// torn down. Failures inside this window are swallowed; the node
    /// garbage-collects its side independently.
    pub destroy_timeout: Duration,
}

impl Config {
    /// Creates a configuration with library defaults for the given bot
    /// user id.
    #[must_use]
    pub fn new(user_id: u64) -> Self {
        let name = env!("CARGO_PKG_NAME");
        let version = env!("CARGO_PKG_VERSION");

        Self {
            user_id,
            client_name: format!("{name}/{version}"),
            user_agent: format!("{name}/{version} (Rust)"),
            max_reconnects: 5,
            rest_retries: 2,
            resume_timeout: Duration::from_secs(60),
            destroy_timeout: Duration::from_secs(3),
        }
    }
}

/// Connection details for a single node.
///
/// The password is redacted from `Debug` output so connection details can be
/// logged without leaking the credential.
#[derive(Clone, Redact, Hash, PartialEq, Eq)]
pub struct NodeConfig {
    /// Name of the node, unique within the pool.
    pub name: String,

    /// Host or address of the node.
    pub host: String,

    /// Port the node listens on.
    pub port: u16,

    /// Whether to connect with TLS (`https`/`wss`).
    pub tls: bool,

    /// Password for the node.
    #[redact]
    pub password: String,
}

impl NodeConfig {
    /// Creates a plaintext (`http`/`ws`) node configuration.
    ///
    /// Use [`with_tls`](Self::with_tls) for nodes behind TLS.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            tls: false,
            password: password.into(),
        }
    }

    /// Toggles TLS for both the REST and WebSocket endpoints.
    #[must_use]
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// HTTP base of the node, without the API version segment.
    #[must_use]
    pub fn http_base(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    /// WebSocket endpoint of the node.
    #[must_use]
    pub fn ws_url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        format!("{scheme}://{}:{}/v4/websocket", self.host, self.port)
    }
}
