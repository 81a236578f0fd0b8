//! Public API behavior that does not need a live node.

use tonelink::{
    client::Client,
    config::{Config, NodeConfig},
    error::Error,
    player::PlaybackState,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn test_config() -> Config {
    let mut config = Config::new(80_351_110_224_678_912);
    config.rest_retries = 0;
    config
}

/// Points at a closed local port; connection attempts fail fast.
fn unreachable_node(name: &str) -> NodeConfig {
    NodeConfig::new(name, "127.0.0.1", 1, "youshallnotpass")
}

#[tokio::test]
async fn player_creation_requires_an_explicit_node() {
    init_logging();
    let (client, _events) = Client::new(test_config());

    assert!(matches!(
        client.create_player(19_216_868_440),
        Err(Error::NoSessions)
    ));
    assert!(matches!(client.load_tracks("ytsearch:ajr").await, Err(_)));
}

#[tokio::test]
async fn duplicate_node_names_are_rejected() {
    init_logging();
    let (client, _events) = Client::new(test_config());

    client.add_node(unreachable_node("main")).unwrap();
    assert!(matches!(
        client.add_node(unreachable_node("main")),
        Err(Error::UniqueConstraint(_))
    ));

    client.shutdown().await;
}

#[tokio::test]
async fn players_are_unique_per_guild() {
    init_logging();
    let (client, _events) = Client::new(test_config());
    client.add_node(unreachable_node("main")).unwrap();

    let first = client.create_player(19_216_868_440).unwrap();
    let second = client.create_player(19_216_868_440).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));

    assert!(matches!(
        client.create_player_strict(19_216_868_440),
        Err(Error::UniqueConstraint(_))
    ));

    // The node never connects, so the player waits unassigned with its
    // local state fully usable.
    assert_eq!(first.state(), PlaybackState::Unassigned);

    assert!(matches!(
        client.fetch_player(1),
        Err(Error::PlayerMissing(_))
    ));

    client.delete_player(19_216_868_440).await.unwrap();
    assert!(client.fetch_player(19_216_868_440).is_err());

    client.shutdown().await;
}
