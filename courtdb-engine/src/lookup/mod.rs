//! Lookup builders
//!
//! Immutable, per-run indexes from natural identifiers to canonical
//! warehouse keys. Builders are total over arbitrary snapshots: a missing
//! column empties the mapping layer that needs it and nothing else.
//!
//! Construction is first-write-wins. When two rows map the same natural or
//! alias key to different canonical keys, the first row encountered is kept
//! and later ones are dropped, so lookups are never ambiguous.
//!
//! Normalization is fixed: names, slugs and aliases are trimmed and
//! lower-cased; team and league codes are trimmed and upper-cased.

mod game;
mod player;
mod season;
mod team;

pub use game::{build_game_lookup, GameLookup};
pub use player::{build_player_lookup, PlayerLookup};
pub use season::{build_season_lookup, SeasonLookup};
pub use team::{build_team_lookup, default_abbreviation_remaps, AbbreviationRemap, TeamLookup};

use courtdb_common::db::{SchemaIntrospector, Snapshot};
use courtdb_common::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use tracing::{debug, info};

/// Canonical player key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub i64);

/// Canonical team key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TeamId(pub i64);

/// Canonical season key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeasonId(pub i64);

/// Canonical game key (league game ids carry leading zeros, so text)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GameId(pub String);

impl GameId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! display_key {
    ($($t:ty),*) => {
        $(impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

display_key!(PlayerId, TeamId, SeasonId, GameId);

/// Normalize a name, slug or alias
pub fn normalize_name(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalize a team or league code
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Insert unless the key is already mapped; returns whether it was inserted
pub(crate) fn insert_first<K: Eq + Hash, V>(map: &mut HashMap<K, V>, key: K, value: V) -> bool {
    match map.entry(key) {
        std::collections::hash_map::Entry::Occupied(_) => false,
        std::collections::hash_map::Entry::Vacant(slot) => {
            slot.insert(value);
            true
        }
    }
}

/// Warehouse tables the lookups are built from
pub const PLAYER_TABLE: &str = "player";
pub const PLAYER_ALIAS_TABLE: &str = "player_alias";
pub const TEAM_TABLE: &str = "team";
pub const TEAM_HISTORY_TABLE: &str = "team_history";
pub const SEASON_TABLE: &str = "season";
pub const GAME_TABLE: &str = "game";

/// All lookups for one run
///
/// Built once, then shared by reference; never mutated.
#[derive(Debug, Clone)]
pub struct Lookups {
    pub players: PlayerLookup,
    pub teams: TeamLookup,
    pub seasons: SeasonLookup,
    pub games: GameLookup,
}

impl Lookups {
    /// Build every lookup from current warehouse state
    ///
    /// The alias and team history tables are optional; the four entity
    /// tables must exist.
    pub async fn load(
        pool: &SqlitePool,
        primary_league: &str,
        remaps: &[AbbreviationRemap],
    ) -> Result<Self> {
        let players = Snapshot::load_table(pool, PLAYER_TABLE).await?;
        let aliases = load_optional(pool, PLAYER_ALIAS_TABLE).await?;
        let teams = Snapshot::load_table(pool, TEAM_TABLE).await?;
        let history = load_optional(pool, TEAM_HISTORY_TABLE).await?;
        let seasons = Snapshot::load_table(pool, SEASON_TABLE).await?;
        let games = Snapshot::load_table(pool, GAME_TABLE).await?;

        let lookups = Self {
            players: build_player_lookup(&players, aliases.as_ref()),
            teams: build_team_lookup(&teams, history.as_ref(), remaps),
            seasons: build_season_lookup(&seasons, primary_league),
            games: build_game_lookup(&games),
        };

        info!(
            players = lookups.players.len(),
            teams = lookups.teams.len(),
            seasons = lookups.seasons.len(),
            games = lookups.games.len(),
            "Built lookups from warehouse snapshot"
        );

        Ok(lookups)
    }
}

async fn load_optional(pool: &SqlitePool, table: &str) -> Result<Option<Snapshot>> {
    if SchemaIntrospector::object_exists(pool, table).await? {
        Ok(Some(Snapshot::load_table(pool, table).await?))
    } else {
        debug!("Optional lookup table '{}' not present", table);
        Ok(None)
    }
}
