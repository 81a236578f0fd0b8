//! The node pool: registries, selection and failover.
//!
//! The pool is the sole owner of node lifetimes and the single registry of
//! players. Players reference their node by name; nodes track their
//! assigned guilds as a set of ids. Selection picks the connected node
//! with the fewest assigned guilds, ties broken by insertion order.
//!
//! The pool never creates nodes on its own: callers add them explicitly,
//! and player creation fails with [`Error::NoSessions`] while the pool is
//! empty.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::mpsc::UnboundedSender;

use crate::{
    config::{Config, NodeConfig},
    error::{Error, Result},
    events::Event,
    node::{Node, NodeState},
    player::Player,
    protocol::GuildId,
};

/// Registry of node connections and players.
pub struct NodePool {
    config: Config,
    /// Insertion-ordered: the selection tie-break depends on it.
    nodes: Mutex<Vec<Arc<Node>>>,
    players: Mutex<HashMap<GuildId, Arc<Player>>>,
    events: UnboundedSender<Event>,
}

impl NodePool {
    pub(crate) fn new(config: Config, events: UnboundedSender<Event>) -> Arc<Self> {
        Arc::new(Self {
            config,
            nodes: Mutex::new(Vec::new()),
            players: Mutex::new(HashMap::new()),
            events,
        })
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    /// Adds a node and spawns its ingestion task.
    ///
    /// Fails with [`Error::UniqueConstraint`] when the name is taken.
    pub fn add_node(self: &Arc<Self>, config: NodeConfig) -> Result<Arc<Node>> {
        let mut nodes = self.nodes.lock().expect("nodes lock poisoned");
        if nodes.iter().any(|node| node.name() == config.name) {
            return Err(Error::UniqueConstraint(format!("node {}", config.name)));
        }

        let node = Node::new(
            self.config.clone(),
            config,
            Arc::downgrade(self),
            self.events.clone(),
        )?;
        nodes.push(Arc::clone(&node));

        tokio::spawn(Arc::clone(&node).run());

        Ok(node)
    }

    /// Removes a node: cancels its ingestion task and migrates its
    /// players to the remaining nodes.
    pub async fn remove_node(&self, name: &str) -> Result<()> {
        let node = {
            let mut nodes = self.nodes.lock().expect("nodes lock poisoned");
            let index = nodes
                .iter()
                .position(|node| node.name() == name)
                .ok_or_else(|| Error::build(format!("no node named {name}")))?;
            nodes.remove(index)
        };

        node.cancel();
        self.on_node_failed(name, node.assigned_guilds()).await;

        Ok(())
    }

    /// Looks a node up by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<Arc<Node>> {
        self.nodes
            .lock()
            .expect("nodes lock poisoned")
            .iter()
            .find(|node| node.name() == name)
            .cloned()
    }

    /// All nodes, in insertion order.
    #[must_use]
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.lock().expect("nodes lock poisoned").clone()
    }

    /// Selection policy: the `Connected` node with the fewest assigned
    /// guilds; ties go to the earliest-added node. `Connecting` and
    /// `Failed` nodes are never picked.
    pub(crate) fn select(&self) -> Result<Arc<Node>> {
        let nodes = self.nodes.lock().expect("nodes lock poisoned");
        if nodes.is_empty() {
            return Err(Error::NoSessions);
        }

        let mut best: Option<&Arc<Node>> = None;
        for node in nodes.iter() {
            if node.state() != NodeState::Connected {
                continue;
            }
            // Strict comparison keeps the first minimum, preserving the
            // insertion-order tie-break.
            if best.is_none_or(|b| node.assigned_count() < b.assigned_count()) {
                best = Some(node);
            }
        }

        best.cloned().ok_or(Error::NoAvailableNode)
    }

    /// Assigns a player to a node picked by the selection policy.
    pub(crate) fn assign(&self, player: &Player) -> Result<Arc<Node>> {
        let node = self.select()?;
        node.assign(player.guild_id());
        player.set_node(Some(node.name().to_string()));

        debug!(
            "guild {} assigned to node {}",
            player.guild_id(),
            node.name()
        );

        Ok(node)
    }

    /// Looks a player up by guild.
    #[must_use]
    pub fn player(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        self.players
            .lock()
            .expect("players lock poisoned")
            .get(&guild_id)
            .cloned()
    }

    /// All registered players.
    #[must_use]
    pub fn players(&self) -> Vec<Arc<Player>> {
        self.players
            .lock()
            .expect("players lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Creates (or, unless `strict`, returns) the player for a guild.
    ///
    /// With `strict`, an existing player fails the call with
    /// [`Error::UniqueConstraint`]. Requires at least one node in the
    /// pool; a node that is still connecting leaves the player
    /// `Unassigned` until the session is ready.
    pub(crate) fn create_player(
        self: &Arc<Self>,
        guild_id: GuildId,
        strict: bool,
    ) -> Result<Arc<Player>> {
        if self.nodes.lock().expect("nodes lock poisoned").is_empty() {
            return Err(Error::NoSessions);
        }

        let mut players = self.players.lock().expect("players lock poisoned");
        if let Some(existing) = players.get(&guild_id) {
            if strict {
                return Err(Error::UniqueConstraint(format!(
                    "player for guild {guild_id}"
                )));
            }
            return Ok(Arc::clone(existing));
        }

        let player = Player::new(guild_id, Arc::downgrade(self), self.events.clone());
        players.insert(guild_id, Arc::clone(&player));
        drop(players);

        match self.assign(&player) {
            Ok(_) => {}
            Err(Error::NoAvailableNode) => {
                // Tolerated: the player stays unassigned and is picked up
                // when a node session becomes ready.
                info!("guild {guild_id}: no connected node yet, player unassigned");
            }
            Err(e) => warn!("guild {guild_id}: assignment failed: {e}"),
        }

        Ok(player)
    }

    /// Destroys a player and removes it from the registry.
    pub(crate) async fn delete_player(&self, guild_id: GuildId) -> Result<()> {
        let player = self
            .players
            .lock()
            .expect("players lock poisoned")
            .remove(&guild_id)
            .ok_or(Error::PlayerMissing(guild_id))?;

        player.teardown().await;

        Ok(())
    }

    /// Failover: reassigns every affected guild's player, preserving its
    /// queue and intent. Players that cannot be placed stay `Unassigned`
    /// with intent intact until a node becomes available.
    pub(crate) async fn on_node_failed(&self, name: &str, affected: Vec<GuildId>) {
        if !affected.is_empty() {
            info!("migrating {} player(s) away from node {name}", affected.len());
        }

        for guild_id in affected {
            let Some(player) = self.player(guild_id) else {
                continue;
            };

            player.set_node(None);
            // The failed node's reports no longer apply.
            player.invalidate_snapshot();

            match self.assign(&player) {
                Ok(_) => player.resync().await,
                Err(e) => {
                    warn!("guild {guild_id}: left unassigned after failover: {e}");
                }
            }
        }
    }

    /// A node session became ready: adopt unassigned players and replay
    /// preserved intent.
    ///
    /// On a `fresh` (non-resumed) session, players already assigned to
    /// the node lost their server-side state and are resynchronized too.
    pub(crate) async fn node_ready(&self, node: &Node, fresh: bool) {
        if fresh {
            let assigned: Vec<Arc<Player>> = self
                .players
                .lock()
                .expect("players lock poisoned")
                .values()
                .filter(|player| player.node_name().as_deref() == Some(node.name()))
                .cloned()
                .collect();
            for player in assigned {
                player.resync().await;
            }
        }

        let unassigned: Vec<Arc<Player>> = self
            .players
            .lock()
            .expect("players lock poisoned")
            .values()
            .filter(|player| player.node_name().is_none())
            .cloned()
            .collect();

        for player in unassigned {
            node.assign(player.guild_id());
            player.set_node(Some(node.name().to_string()));
            info!(
                "guild {} adopted by node {}",
                player.guild_id(),
                node.name()
            );
            player.resync().await;
        }
    }

    /// A node started a fresh (non-resumed) session: its previous player
    /// state is gone, so nothing may be assumed until new updates arrive.
    pub(crate) fn invalidate_snapshots(&self, node_name: &str) {
        let players = self.players.lock().expect("players lock poisoned");
        for player in players.values() {
            if player.node_name().as_deref() == Some(node_name) {
                player.invalidate_snapshot();
            }
        }
    }

    /// Drains every player (best-effort remote destroy) and cancels every
    /// node task.
    pub(crate) async fn shutdown(&self) {
        let players: Vec<Arc<Player>> = self
            .players
            .lock()
            .expect("players lock poisoned")
            .drain()
            .map(|(_, player)| player)
            .collect();
        for player in players {
            player.teardown().await;
        }

        let nodes: Vec<Arc<Node>> = self
            .nodes
            .lock()
            .expect("nodes lock poisoned")
            .drain(..)
            .collect();
        for node in nodes {
            node.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::{player::PlaybackState, queue::test_track};

    fn test_config() -> Config {
        let mut config = Config::new(80_351_110_224_678_912);
        // Keep failed remote calls fast: no retries, short destroy budget.
        config.rest_retries = 0;
        config.destroy_timeout = Duration::from_millis(100);
        config
    }

    fn test_pool() -> Arc<NodePool> {
        let (events, _receiver) = mpsc::unbounded_channel();
        NodePool::new(test_config(), events)
    }

    /// Registers a node without spawning its ingestion task.
    fn add_idle_node(pool: &Arc<NodePool>, name: &str) -> Arc<Node> {
        let config = NodeConfig::new(name, "127.0.0.1", 1, "youshallnotpass");
        let node = Node::new(
            pool.config.clone(),
            config,
            Arc::downgrade(pool),
            pool.events.clone(),
        )
        .unwrap();
        pool.nodes
            .lock()
            .unwrap()
            .push(Arc::clone(&node));
        node
    }

    #[test]
    fn empty_pool_refuses_players_and_selection() {
        let pool = test_pool();
        assert!(matches!(pool.select(), Err(Error::NoSessions)));
        assert!(matches!(
            pool.create_player(GuildId(1), false),
            Err(Error::NoSessions)
        ));
    }

    #[test]
    fn selection_never_picks_unconnected_nodes() {
        let pool = test_pool();
        let connecting = add_idle_node(&pool, "connecting");
        connecting.force_state(NodeState::Connecting);
        let failed = add_idle_node(&pool, "failed");
        failed.force_state(NodeState::Failed);

        assert!(matches!(pool.select(), Err(Error::NoAvailableNode)));
    }

    #[test]
    fn selection_prefers_least_loaded_with_insertion_tiebreak() {
        let pool = test_pool();
        let a = add_idle_node(&pool, "a");
        let b = add_idle_node(&pool, "b");
        let c = add_idle_node(&pool, "c");
        for node in [&a, &b, &c] {
            node.force_state(NodeState::Connected);
        }

        a.assign(GuildId(1));
        a.assign(GuildId(2));
        b.assign(GuildId(3));

        // c holds nothing and wins.
        assert_eq!(pool.select().unwrap().name(), "c");

        // With b and c tied at one guild each, insertion order decides.
        c.assign(GuildId(4));
        assert_eq!(pool.select().unwrap().name(), "b");
    }

    #[test]
    fn create_player_is_idempotent_and_strict_variant_fails() {
        let pool = test_pool();
        add_idle_node(&pool, "a").force_state(NodeState::Connected);

        let first = pool.create_player(GuildId(7), false).unwrap();
        let second = pool.create_player(GuildId(7), false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        assert!(matches!(
            pool.create_player(GuildId(7), true),
            Err(Error::UniqueConstraint(_))
        ));
    }

    #[test]
    fn create_tolerates_a_node_that_is_still_connecting() {
        let pool = test_pool();
        add_idle_node(&pool, "a").force_state(NodeState::Connecting);

        let player = pool.create_player(GuildId(7), false).unwrap();
        assert_eq!(player.state(), PlaybackState::Unassigned);
    }

    #[tokio::test]
    async fn failover_reassigns_players_and_preserves_intent() {
        let pool = test_pool();
        let a = add_idle_node(&pool, "a");
        let b = add_idle_node(&pool, "b");
        a.force_state(NodeState::Connected);
        b.force_state(NodeState::Connected);

        let player = pool.create_player(GuildId(7), false).unwrap();
        assert_eq!(player.node_name().as_deref(), Some("a"));
        player.add_all([test_track("x"), test_track("y")]);

        // Node a dies; its guilds migrate to b with the queue intact. The
        // resync fails against b's never-ready session and is swallowed.
        a.force_state(NodeState::Failed);
        pool.on_node_failed("a", vec![GuildId(7)]).await;
        assert_eq!(player.node_name().as_deref(), Some("b"));
        assert_eq!(player.queue().len(), 2);

        // Node b dies too with nothing left: the player is unassigned but
        // keeps its intent.
        b.force_state(NodeState::Failed);
        pool.on_node_failed("b", vec![GuildId(7)]).await;
        assert_eq!(player.node_name(), None);
        assert_eq!(player.state(), PlaybackState::Unassigned);
        assert_eq!(player.queue().len(), 2);
    }

    #[tokio::test]
    async fn ready_node_adopts_unassigned_players() {
        let pool = test_pool();
        let a = add_idle_node(&pool, "a");
        a.force_state(NodeState::Connecting);

        let player = pool.create_player(GuildId(7), false).unwrap();
        assert_eq!(player.node_name(), None);

        a.force_state(NodeState::Connected);
        pool.node_ready(&a, true).await;
        assert_eq!(player.node_name().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn delete_player_removes_the_registry_entry() {
        let pool = test_pool();
        add_idle_node(&pool, "a").force_state(NodeState::Connected);

        pool.create_player(GuildId(7), false).unwrap();
        pool.delete_player(GuildId(7)).await.unwrap();

        assert!(pool.player(GuildId(7)).is_none());
        assert!(matches!(
            pool.delete_player(GuildId(7)).await,
            Err(Error::PlayerMissing(_))
        ));
    }
}
