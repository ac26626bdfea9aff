//! Identity resolvers
//!
//! Pure functions from a record's candidate identifiers to a canonical key.
//! `Unresolved` is an expected outcome, not an error; callers decide whether
//! it nulls a foreign key or drops the row (see `ingest`).

use crate::lookup::{
    normalize_code, GameId, GameLookup, PlayerId, PlayerLookup, SeasonId, SeasonLookup, TeamId,
    TeamLookup,
};
use courtdb_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which mapping layer produced a resolved key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPath {
    NumericId,
    Slug,
    FullName,
    Alias,
    ScopedAbbreviation,
    Abbreviation,
    TeamName,
    SeasonYear,
    GameId,
    Matchup,
}

impl MatchPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchPath::NumericId => "numeric_id",
            MatchPath::Slug => "slug",
            MatchPath::FullName => "full_name",
            MatchPath::Alias => "alias",
            MatchPath::ScopedAbbreviation => "scoped_abbreviation",
            MatchPath::Abbreviation => "abbreviation",
            MatchPath::TeamName => "team_name",
            MatchPath::SeasonYear => "season_year",
            MatchPath::GameId => "game_id",
            MatchPath::Matchup => "matchup",
        }
    }
}

impl fmt::Display for MatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one resolver call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<K> {
    Resolved { key: K, via: MatchPath },
    Unresolved,
}

impl<K> Resolution<K> {
    fn hit(key: Option<K>, via: MatchPath) -> Option<Self> {
        key.map(|key| Resolution::Resolved { key, via })
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved { .. })
    }

    pub fn key(&self) -> Option<&K> {
        match self {
            Resolution::Resolved { key, .. } => Some(key),
            Resolution::Unresolved => None,
        }
    }

    pub fn into_key(self) -> Option<K> {
        match self {
            Resolution::Resolved { key, .. } => Some(key),
            Resolution::Unresolved => None,
        }
    }

    pub fn via(&self) -> Option<MatchPath> {
        match self {
            Resolution::Resolved { via, .. } => Some(*via),
            Resolution::Unresolved => None,
        }
    }
}

/// Candidate identifiers for one player reference
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub numeric_id: Option<i64>,
}

impl PlayerRequest {
    pub fn resolve(&self, lookup: &PlayerLookup) -> Resolution<PlayerId> {
        resolve_player(self.name.as_deref(), lookup, self.slug.as_deref(), self.numeric_id)
    }
}

/// Resolve a player reference
///
/// Precedence, first hit wins: numeric id (membership), slug, full name,
/// alias. Blank strings count as absent.
pub fn resolve_player(
    name: Option<&str>,
    lookup: &PlayerLookup,
    slug: Option<&str>,
    numeric_id: Option<i64>,
) -> Resolution<PlayerId> {
    let name = non_blank(name);
    let slug = non_blank(slug);

    numeric_id
        .map(PlayerId)
        .filter(|id| lookup.contains(*id))
        .map(|key| Resolution::Resolved { key, via: MatchPath::NumericId })
        .or_else(|| slug.and_then(|s| Resolution::hit(lookup.by_slug(s), MatchPath::Slug)))
        .or_else(|| name.and_then(|n| Resolution::hit(lookup.by_name(n), MatchPath::FullName)))
        .or_else(|| name.and_then(|n| Resolution::hit(lookup.by_alias(n), MatchPath::Alias)))
        .unwrap_or(Resolution::Unresolved)
}

/// Resolve a team abbreviation, optionally scoped to a season start year
///
/// An empty abbreviation is a caller error.
pub fn resolve_team(
    abbreviation: &str,
    scope: Option<i32>,
    lookup: &TeamLookup,
) -> Result<Resolution<TeamId>> {
    let code = normalize_code(abbreviation);
    if code.is_empty() {
        return Err(Error::InvalidInput("Team abbreviation is required".to_string()));
    }

    let resolution = scope
        .and_then(|year| {
            Resolution::hit(lookup.by_scope(year, &code), MatchPath::ScopedAbbreviation)
        })
        .or_else(|| Resolution::hit(lookup.by_abbreviation(&code), MatchPath::Abbreviation))
        .unwrap_or(Resolution::Unresolved);

    Ok(resolution)
}

/// Resolve a team by full name, "city nickname" or historical name
pub fn resolve_team_name(name: &str, lookup: &TeamLookup) -> Resolution<TeamId> {
    Resolution::hit(lookup.by_name(name), MatchPath::TeamName).unwrap_or(Resolution::Unresolved)
}

/// Resolve a season by start year; a blank league means the primary league
pub fn resolve_season(
    year: i32,
    league: Option<&str>,
    lookup: &SeasonLookup,
) -> Resolution<SeasonId> {
    Resolution::hit(lookup.by_year(year, league), MatchPath::SeasonYear)
        .unwrap_or(Resolution::Unresolved)
}

/// Membership guard for game foreign keys
pub fn exists_game(id: &GameId, lookup: &GameLookup) -> bool {
    lookup.contains(id)
}

/// Confirm a game id, or match (date, home, away) when the record has none
///
/// A supplied id is only ever confirmed; an id the warehouse does not know
/// is unresolved even when the matchup would find a game.
pub fn resolve_game(
    id: Option<&GameId>,
    matchup: Option<(&str, TeamId, TeamId)>,
    lookup: &GameLookup,
) -> Resolution<GameId> {
    if let Some(id) = id {
        return if exists_game(id, lookup) {
            Resolution::Resolved { key: id.clone(), via: MatchPath::GameId }
        } else {
            Resolution::Unresolved
        };
    }
    matchup
        .and_then(|(date, home, away)| {
            Resolution::hit(lookup.by_matchup(date, home, away).cloned(), MatchPath::Matchup)
        })
        .unwrap_or(Resolution::Unresolved)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
