//! Wire types for the node protocol.
//!
//! This module contains the data types exchanged with a node over REST and
//! WebSocket:
//!
//! * [`track`] - Tracks, playlists and load results
//! * [`filters`] - Audio filter configuration with tri-state fields
//! * [`player`] - Player resources and the sparse update payload
//! * [`messages`] - Inbound WebSocket frames
//! * [`session`] - Session updates, statistics, node info, route planner
//!
//! A central decode step ([`json`]) maps wire payloads to these types before
//! any business logic runs; downstream code never inspects raw payloads.

pub mod filters;
pub mod messages;
pub mod player;
pub mod session;
pub mod track;

use std::{fmt, num::ParseIntError, str::FromStr};

use serde::Deserialize;
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::error::Result;

/// A Discord guild id.
///
/// Serialized as a decimal string, matching how the node tags guild-scoped
/// payloads and routes.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr,
)]
pub struct GuildId(pub u64);

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for GuildId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl From<u64> for GuildId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Parses and logs a JSON payload from a node.
///
/// * Success: logs the parsed structure at TRACE level
/// * Parse error: logs the raw JSON at TRACE level if it was valid JSON,
///   otherwise the error and raw text at ERROR level
pub fn json<T>(body: &str, origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + fmt::Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
                trace!("{origin}: {json:#?}");
            } else {
                error!("{origin}: failed parsing response ({e:?})");
                trace!("{body}");
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guild_id_round_trips_as_string() {
        let id: GuildId = serde_json::from_str("\"19216868440\"").unwrap();
        assert_eq!(id, GuildId(19_216_868_440));
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"19216868440\"");
    }
}
