//! Season lookup

use super::{insert_first, normalize_code, SeasonId};
use courtdb_common::db::Snapshot;
use std::collections::{HashMap, HashSet};
use tracing::debug;

const ID_COLUMNS: &[&str] = &["season_id", "id"];
const YEAR_COLUMNS: &[&str] = &["season_year", "year", "start_year"];
const LEAGUE_COLUMNS: &[&str] = &["league", "league_code", "league_id"];

/// Seasons keyed by (start year, league code)
#[derive(Debug, Clone, Default)]
pub struct SeasonLookup {
    primary_league: String,
    direct: HashSet<SeasonId>,
    by_year: HashMap<(i32, String), SeasonId>,
}

impl SeasonLookup {
    /// League applied when a reference carries none
    pub fn primary_league(&self) -> &str {
        &self.primary_league
    }

    pub fn contains(&self, id: SeasonId) -> bool {
        self.direct.contains(&id)
    }

    /// Lookup by year and league; a blank or absent league means the primary one
    pub fn by_year(&self, year: i32, league: Option<&str>) -> Option<SeasonId> {
        let league = self.league_or_primary(league);
        self.by_year.get(&(year, league)).copied()
    }

    pub fn len(&self) -> usize {
        self.direct.len()
    }

    pub fn is_empty(&self) -> bool {
        self.direct.is_empty()
    }

    fn league_or_primary(&self, league: Option<&str>) -> String {
        match league.map(normalize_code) {
            Some(code) if !code.is_empty() => code,
            _ => self.primary_league.clone(),
        }
    }
}

/// Build the season lookup; rows without a league belong to `primary_league`
pub fn build_season_lookup(seasons: &Snapshot, primary_league: &str) -> SeasonLookup {
    let mut lookup = SeasonLookup {
        primary_league: normalize_code(primary_league),
        ..Default::default()
    };
    let mut conflicts = 0usize;

    for row in seasons.rows() {
        let id = match row.first_i64(ID_COLUMNS) {
            Some(id) => SeasonId(id),
            None => continue,
        };
        lookup.direct.insert(id);

        let year = match row.first_i64(YEAR_COLUMNS).and_then(|y| i32::try_from(y).ok()) {
            Some(year) => year,
            None => continue,
        };
        let league = row.first_text(LEAGUE_COLUMNS);
        let league = lookup.league_or_primary(league.as_deref());
        if !insert_first(&mut lookup.by_year, (year, league), id) {
            conflicts += 1;
        }
    }

    debug!(
        seasons = lookup.direct.len(),
        keyed = lookup.by_year.len(),
        conflicts,
        "Built season lookup"
    );

    lookup
}
