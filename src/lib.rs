//! Asynchronous client runtime for Lavalink v4 audio nodes.
//!
//! tonelink maintains a pool of authenticated node sessions (REST +
//! WebSocket), ingests each node's event stream on a background task, and
//! exposes per-guild [`Player`](player::Player)s whose local queue and
//! playback intent are reconciled against the node's authoritative state.
//! Nodes that exhaust their reconnection budget fail over: their players are
//! reassigned to another connected node with queue and intent preserved.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod node;
pub mod player;
pub mod pool;
pub mod protocol;
pub mod queue;
pub mod rest;
