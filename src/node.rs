//! A connection to one node: WebSocket ingestion, reconnection, dispatch.
//!
//! Each node runs exactly one logical connection (REST + WebSocket). The
//! ingestion loop is an independent, cancellable background task and is the
//! single writer of remote-mirrored player snapshots: frames are decoded
//! into typed [`Message`]s and routed to the owning player before the
//! matching public [`Event`] is emitted. Events for unknown guilds are
//! logged and dropped, never fatal.
//!
//! On unexpected stream closure the task reconnects with exponential
//! backoff. Exhausting the budget transitions the node to `Failed` and
//! hands its guilds to the pool for failover. A bad credential is fatal on
//! the first attempt and is never retried.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex, RwLock, Weak,
    },
    time::Duration,
};

use exponential_backoff::Backoff;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use http::HeaderValue;
use tokio::{net::TcpStream, sync::mpsc::UnboundedSender};
use tokio_tungstenite::{
    tungstenite::{client::IntoClientRequest, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{Config, NodeConfig},
    error::{Error, Result},
    events::Event,
    pool::NodePool,
    protocol::{
        messages::{EventPayload, Message},
        session::SessionUpdate,
        GuildId,
    },
    rest::Rest,
};

/// Frames larger than this are dropped unparsed.
const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Minimum delay between reconnect attempts.
const RECONNECT_MIN_DELAY: Duration = Duration::from_secs(1);

/// Maximum delay between reconnect attempts.
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(60);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Lifecycle state of a node connection.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeState {
    Disconnected,
    Connecting,
    Connected,
    /// The reconnection budget is exhausted; players have been migrated.
    Failed,
}

/// Connection state shared between the ingestion task and the REST layer.
///
/// The REST circuit check and the session-scoped routes read from here;
/// only the ingestion task writes.
pub(crate) struct SessionHandle {
    state: RwLock<NodeState>,
    session_id: RwLock<Option<String>>,
}

impl SessionHandle {
    fn new() -> Self {
        Self {
            state: RwLock::new(NodeState::Disconnected),
            session_id: RwLock::new(None),
        }
    }

    pub(crate) fn state(&self) -> NodeState {
        *self.state.read().expect("state lock poisoned")
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state() == NodeState::Connected
    }

    pub(crate) fn session_id(&self) -> Option<String> {
        self.session_id.read().expect("session lock poisoned").clone()
    }

    fn set_state(&self, state: NodeState) {
        *self.state.write().expect("state lock poisoned") = state;
    }

    fn set_session_id(&self, id: Option<String>) {
        *self.session_id.write().expect("session lock poisoned") = id;
    }
}

/// One node connection, owned by the pool.
pub struct Node {
    name: String,
    config: NodeConfig,
    client_config: Config,
    session: Arc<SessionHandle>,
    rest: Rest,
    guilds: Mutex<HashSet<GuildId>>,
    attempts: AtomicU32,
    ready_seen: AtomicBool,
    cancel: CancellationToken,
    pool: Weak<NodePool>,
    events: UnboundedSender<Event>,
}

impl Node {
    pub(crate) fn new(
        client_config: Config,
        config: NodeConfig,
        pool: Weak<NodePool>,
        events: UnboundedSender<Event>,
    ) -> Result<Arc<Self>> {
        let session = Arc::new(SessionHandle::new());
        let rest = Rest::new(&client_config, &config, Arc::clone(&session))?;

        Ok(Arc::new(Self {
            name: config.name.clone(),
            config,
            client_config,
            session,
            rest,
            guilds: Mutex::new(HashSet::new()),
            attempts: AtomicU32::new(0),
            ready_seen: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            pool,
            events,
        }))
    }

    /// Name of this node, unique within the pool.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> NodeState {
        self.session.state()
    }

    /// Session identifier from the node's `ready` frame, if received.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.session.session_id()
    }

    /// REST surface of this node.
    #[must_use]
    pub fn rest(&self) -> &Rest {
        &self.rest
    }

    /// Number of guilds currently assigned to this node.
    #[must_use]
    pub fn assigned_count(&self) -> usize {
        self.guilds.lock().expect("guilds lock poisoned").len()
    }

    pub(crate) fn assign(&self, guild_id: GuildId) {
        self.guilds
            .lock()
            .expect("guilds lock poisoned")
            .insert(guild_id);
    }

    pub(crate) fn unassign(&self, guild_id: GuildId) {
        self.guilds
            .lock()
            .expect("guilds lock poisoned")
            .remove(&guild_id);
    }

    pub(crate) fn assigned_guilds(&self) -> Vec<GuildId> {
        self.guilds
            .lock()
            .expect("guilds lock poisoned")
            .iter()
            .copied()
            .collect()
    }

    fn drain_guilds(&self) -> Vec<GuildId> {
        self.guilds
            .lock()
            .expect("guilds lock poisoned")
            .drain()
            .collect()
    }

    /// Cancels the ingestion task. The pool handles failover separately.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    fn emit(&self, event: Event) {
        // A closed channel only means the consumer went away.
        let _ = self.events.send(event);
    }

    /// Ingestion task: connect, read, dispatch, reconnect.
    pub(crate) async fn run(self: Arc<Self>) {
        let backoff = Backoff::new(
            self.client_config.max_reconnects + 1,
            RECONNECT_MIN_DELAY,
            RECONNECT_MAX_DELAY,
        );
        let mut delays = backoff.iter();

        loop {
            if self.cancel.is_cancelled() {
                self.session.set_state(NodeState::Disconnected);
                return;
            }

            self.session.set_state(NodeState::Connecting);

            match self.connect_and_read().await {
                Ok(()) => {
                    // Clean exit only happens on cancellation.
                    self.session.set_state(NodeState::Disconnected);
                    return;
                }
                Err(Error::Auth(reason)) => {
                    error!("node {}: credential rejected: {reason}", self.name);
                    self.fail().await;
                    return;
                }
                Err(e) => warn!("node {}: connection lost: {e}", self.name),
            }

            if self.cancel.is_cancelled() {
                self.session.set_state(NodeState::Disconnected);
                return;
            }

            self.session.set_state(NodeState::Disconnected);
            self.emit(Event::NodeDisconnected {
                node: self.name.clone(),
            });

            // A session that reached `ready` earns a fresh budget.
            if self.ready_seen.swap(false, Ordering::AcqRel) {
                self.attempts.store(0, Ordering::Release);
                delays = backoff.iter();
            }

            let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
            match delays.next() {
                Some(Some(delay)) => {
                    info!(
                        "node {}: reconnecting in {delay:?} (attempt {attempt})",
                        self.name
                    );
                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            self.session.set_state(NodeState::Disconnected);
                            return;
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                _ => {
                    self.fail().await;
                    return;
                }
            }
        }
    }

    /// Exhausted retries: mark failed and hand assigned guilds to the pool.
    async fn fail(&self) {
        self.session.set_state(NodeState::Failed);
        self.session.set_session_id(None);

        let guilds = self.drain_guilds();
        error!(
            "node {}: giving up after repeated failures, migrating {} player(s)",
            self.name,
            guilds.len()
        );
        self.emit(Event::NodeFailed {
            node: self.name.clone(),
        });

        if let Some(pool) = self.pool.upgrade() {
            pool.on_node_failed(&self.name, guilds).await;
        }
    }

    /// Establishes one session and reads it until closure or cancellation.
    async fn connect_and_read(&self) -> Result<()> {
        // Preflight the credential over REST so a bad password surfaces as
        // `Auth` before the stream opens, and is never retried.
        self.rest.preflight().await?;

        let url = self.config.ws_url();
        let mut request = url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert("Authorization", HeaderValue::from_str(&self.config.password)?);
        headers.insert(
            "User-Id",
            HeaderValue::from_str(&self.client_config.user_id.to_string())?,
        );
        headers.insert(
            "Client-Name",
            HeaderValue::from_str(&self.client_config.client_name)?,
        );
        if let Some(previous) = self.session.session_id() {
            // Ask the node to resume the previous session. Within the
            // advertised window this keeps server-side players alive.
            headers.insert("Session-Id", HeaderValue::from_str(&previous)?);
        }

        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| match e {
                tokio_tungstenite::tungstenite::Error::Io(io) => {
                    Error::Unreachable(io.to_string())
                }
                other => other.into(),
            })?;

        info!("node {}: websocket established", self.name);
        self.session.set_state(NodeState::Connected);

        let (mut ws_tx, mut ws_rx) = stream.split();
        self.read_loop(&mut ws_tx, &mut ws_rx).await
    }

    async fn read_loop(&self, ws_tx: &mut WsSink, ws_rx: &mut WsSource) -> Result<()> {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    return Ok(());
                }
                message = ws_rx.next() => {
                    match message {
                        Some(Ok(message)) => self.handle_frame(ws_tx, message).await?,
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            return Err(Error::Unreachable(
                                "stream ended unexpectedly".to_string(),
                            ));
                        }
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, ws_tx: &mut WsSink, message: WsMessage) -> Result<()> {
        match message {
            WsMessage::Text(text) => {
                // Do not parse exceedingly large frames to prevent out of
                // memory conditions.
                if text.len() > MAX_FRAME_SIZE {
                    error!(
                        "node {}: ignoring oversized frame with {} bytes",
                        self.name,
                        text.len()
                    );
                    return Ok(());
                }

                match Message::from_text(text.as_str()) {
                    Ok(decoded) => self.dispatch(decoded).await,
                    Err(e) => warn!("node {}: undecodable frame: {e}", self.name),
                }

                Ok(())
            }
            WsMessage::Ping(payload) => {
                trace!("ping -> pong");
                ws_tx.send(WsMessage::Pong(payload)).await.map_err(Into::into)
            }
            WsMessage::Close(frame) => Err(Error::Unreachable(format!(
                "connection closed by node: {frame:?}"
            ))),
            _ => {
                trace!("message type unimplemented");
                Ok(())
            }
        }
    }

    /// Routes one decoded frame to the owning player and the event channel.
    async fn dispatch(&self, message: Message) {
        let Some(pool) = self.pool.upgrade() else {
            return;
        };

        match message {
            Message::Ready {
                resumed,
                session_id,
            } => {
                self.ready_seen.store(true, Ordering::Release);
                self.session.set_session_id(Some(session_id.clone()));

                if resumed {
                    info!("node {}: resumed session {session_id}", self.name);
                } else {
                    info!("node {}: ready with session {session_id}", self.name);
                    // A fresh session means the node's player state is
                    // gone; nothing may be assumed until the next update.
                    pool.invalidate_snapshots(&self.name);
                }

                let update = SessionUpdate {
                    resuming: Some(true),
                    timeout: Some(self.client_config.resume_timeout.as_secs()),
                };
                if let Err(e) = self.rest.update_session(&update).await {
                    warn!("node {}: failed to enable resuming: {e}", self.name);
                }

                self.emit(Event::NodeReady {
                    node: self.name.clone(),
                    resumed,
                    session_id,
                });

                // A resumed session kept its server-side players; a fresh
                // one needs the preserved intent replayed. Either way,
                // unassigned players can be adopted now.
                pool.node_ready(self, !resumed).await;
            }
            Message::PlayerUpdate { guild_id, state } => {
                if let Some(player) = pool.player(guild_id) {
                    player.handle_player_update(state);
                } else {
                    debug!(
                        "node {}: player update for unknown guild {guild_id}",
                        self.name
                    );
                }

                self.emit(Event::PlayerUpdate { guild_id, state });
            }
            Message::Stats(stats) => {
                self.emit(Event::Stats {
                    node: self.name.clone(),
                    stats,
                });
            }
            Message::Event(payload) => {
                let guild_id = payload.guild_id();
                self.emit(Event::from(payload.clone()));

                if let Some(player) = pool.player(guild_id) {
                    player.handle_event(&payload).await;
                } else {
                    debug!("node {}: event for unknown guild {guild_id}", self.name);
                }
            }
        }
    }
}

#[cfg(test)]
impl Node {
    /// Forces a lifecycle state without a live connection.
    pub(crate) fn force_state(&self, state: NodeState) {
        self.session.set_state(state);
    }
}

impl From<EventPayload> for Event {
    fn from(payload: EventPayload) -> Self {
        match payload {
            EventPayload::TrackStart { guild_id, track } => {
                Self::TrackStart { guild_id, track }
            }
            EventPayload::TrackEnd {
                guild_id,
                track,
                reason,
            } => Self::TrackEnd {
                guild_id,
                track,
                reason,
            },
            EventPayload::TrackException {
                guild_id,
                track,
                exception,
            } => Self::TrackException {
                guild_id,
                track,
                exception,
            },
            EventPayload::TrackStuck {
                guild_id,
                track,
                threshold_ms,
            } => Self::TrackStuck {
                guild_id,
                track,
                threshold_ms,
            },
            EventPayload::WebSocketClosed {
                guild_id,
                code,
                reason,
                by_remote,
            } => Self::WebSocketClosed {
                guild_id,
                code,
                reason,
                by_remote,
            },
        }
    }
}
