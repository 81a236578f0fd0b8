//! Top-level client: owns the pool, hands out players and events.
//!
//! All registries live behind one [`Client`]; there is no ambient global
//! state. Dropping the client (after [`shutdown`](Client::shutdown)) tears
//! everything down.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::{
    config::{Config, NodeConfig},
    error::{Error, Result},
    events::Event,
    node::Node,
    player::Player,
    pool::NodePool,
    protocol::{
        track::{LoadResult, Track},
        GuildId,
    },
};

/// Client runtime for a set of nodes and their players.
///
/// Create one per bot process, add nodes explicitly, then create players
/// per guild. Events from all nodes arrive on the receiver returned by
/// [`new`](Self::new).
pub struct Client {
    pool: Arc<NodePool>,
}

impl Client {
    /// Creates the client and the channel its events arrive on.
    #[must_use]
    pub fn new(config: Config) -> (Self, UnboundedReceiver<Event>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let pool = NodePool::new(config, events);

        (Self { pool }, receiver)
    }

    /// The underlying pool, for node-level introspection.
    #[must_use]
    pub fn pool(&self) -> &Arc<NodePool> {
        &self.pool
    }

    /// Adds a node and starts connecting to it.
    pub fn add_node(&self, config: NodeConfig) -> Result<Arc<Node>> {
        self.pool.add_node(config)
    }

    /// Removes a node, migrating its players to the remaining nodes.
    pub async fn remove_node(&self, name: &str) -> Result<()> {
        self.pool.remove_node(name).await
    }

    /// Looks a node up by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<Arc<Node>> {
        self.pool.node(name)
    }

    /// All nodes, in insertion order.
    #[must_use]
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.pool.nodes()
    }

    /// Creates the player for a guild, or returns the existing one.
    pub fn create_player(&self, guild_id: impl Into<GuildId>) -> Result<Arc<Player>> {
        self.pool.create_player(guild_id.into(), false)
    }

    /// Creates the player for a guild, failing with
    /// [`Error::UniqueConstraint`] when one already exists.
    pub fn create_player_strict(
        &self,
        guild_id: impl Into<GuildId>,
    ) -> Result<Arc<Player>> {
        self.pool.create_player(guild_id.into(), true)
    }

    /// Fetches an existing player.
    pub fn fetch_player(&self, guild_id: impl Into<GuildId>) -> Result<Arc<Player>> {
        let guild_id = guild_id.into();
        self.pool
            .player(guild_id)
            .ok_or(Error::PlayerMissing(guild_id))
    }

    /// Destroys a guild's player and removes it from the registry.
    pub async fn delete_player(&self, guild_id: impl Into<GuildId>) -> Result<()> {
        self.pool.delete_player(guild_id.into()).await
    }

    /// Resolves a search query or URL through the least-loaded connected
    /// node. See [`LoadResult`] for the shapes this can return.
    pub async fn load_tracks(&self, identifier: &str) -> Result<LoadResult> {
        let node = self.pool.select()?;
        node.rest().load_tracks(identifier).await
    }

    /// Decodes a single encoded track.
    pub async fn decode_track(&self, encoded: &str) -> Result<Track> {
        let node = self.pool.select()?;
        node.rest().decode_track(encoded).await
    }

    /// Decodes a batch of encoded tracks.
    pub async fn decode_tracks(&self, encoded: &[String]) -> Result<Vec<Track>> {
        let node = self.pool.select()?;
        node.rest().decode_tracks(encoded).await
    }

    /// Drains all players and disconnects every node.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}
