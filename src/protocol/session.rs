//! Session updates, node statistics, node info and route planner payloads.

use serde::{Deserialize, Serialize};

/// `PATCH /v4/sessions/{id}` body: resuming configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    /// Whether the node should keep this session's players alive after the
    /// WebSocket drops.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resuming: Option<bool>,

    /// Resume window in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// The node's view of the session after an update.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub resuming: bool,
    pub timeout: u64,
}

/// Node statistics, pushed over the WebSocket and served at `GET /v4/stats`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Players the node currently holds.
    pub players: u32,
    /// Players that are actively playing.
    pub playing_players: u32,
    /// Node uptime in milliseconds.
    pub uptime: u64,
    pub memory: Memory,
    pub cpu: Cpu,
    /// Audio frame statistics; absent on the REST endpoint and in the
    /// first WebSocket push of a session.
    #[serde(default)]
    pub frame_stats: Option<FrameStats>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub free: u64,
    pub used: u64,
    pub allocated: u64,
    pub reservable: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cpu {
    pub cores: u32,
    pub system_load: f64,
    pub lavalink_load: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStats {
    pub sent: i64,
    pub nulled: i64,
    pub deficit: i64,
}

/// `GET /v4/info` response.
///
/// Only the fields the runtime inspects are modeled; the full payload is
/// considerably larger.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Info {
    pub version: Version,
    pub jvm: String,
    pub lavaplayer: String,
    pub source_managers: Vec<String>,
    pub filters: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub semver: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// `GET /v4/routeplanner/status` response.
///
/// `class` and `details` are both absent when no route planner is
/// configured on the node.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlannerStatus {
    #[serde(rename = "class")]
    pub class_name: Option<String>,
    pub details: Option<RoutePlannerDetails>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlannerDetails {
    pub ip_block: IpBlock,
    pub failing_addresses: Vec<FailingAddress>,
    #[serde(default)]
    pub rotate_index: Option<String>,
    #[serde(default)]
    pub ip_index: Option<String>,
    #[serde(default)]
    pub current_address: Option<String>,
    #[serde(default)]
    pub current_address_index: Option<String>,
    #[serde(default)]
    pub block_index: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub size: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailingAddress {
    pub failing_address: String,
    pub failing_timestamp: u64,
    pub failing_time: String,
}

/// `POST /v4/routeplanner/free/address` body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FreeAddress {
    pub address: String,
}
