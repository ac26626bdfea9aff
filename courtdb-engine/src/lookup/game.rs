//! Game lookup
//!
//! Games are only ever confirmed, never re-keyed: a foreign key that targets
//! a game is attached only when the id is already in the warehouse.

use super::{insert_first, GameId, TeamId};
use courtdb_common::db::Snapshot;
use std::collections::{HashMap, HashSet};
use tracing::debug;

const ID_COLUMNS: &[&str] = &["game_id", "id"];
const DATE_COLUMNS: &[&str] = &["game_date", "date"];
const HOME_COLUMNS: &[&str] = &["home_team_id"];
const AWAY_COLUMNS: &[&str] = &["away_team_id", "visitor_team_id"];

/// Known game ids, plus a (date, home, away) index for extracts without ids
#[derive(Debug, Clone, Default)]
pub struct GameLookup {
    ids: HashSet<GameId>,
    by_matchup: HashMap<(String, TeamId, TeamId), GameId>,
}

impl GameLookup {
    pub fn contains(&self, id: &GameId) -> bool {
        self.ids.contains(id)
    }

    pub fn by_matchup(&self, game_date: &str, home: TeamId, away: TeamId) -> Option<&GameId> {
        self.by_matchup.get(&(normalize_date(game_date), home, away))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Dates compare on the calendar day only (`YYYY-MM-DD`)
fn normalize_date(raw: &str) -> String {
    raw.trim().chars().take(10).collect()
}

pub fn build_game_lookup(games: &Snapshot) -> GameLookup {
    let mut lookup = GameLookup::default();
    let mut conflicts = 0usize;

    for row in games.rows() {
        let id = match row.first_text(ID_COLUMNS) {
            Some(id) => GameId::new(id),
            None => continue,
        };
        lookup.ids.insert(id.clone());

        let date = row.first_text(DATE_COLUMNS);
        let home = row.first_i64(HOME_COLUMNS);
        let away = row.first_i64(AWAY_COLUMNS);
        if let (Some(date), Some(home), Some(away)) = (date, home, away) {
            let key = (normalize_date(&date), TeamId(home), TeamId(away));
            if !insert_first(&mut lookup.by_matchup, key, id) {
                conflicts += 1;
            }
        }
    }

    debug!(
        games = lookup.ids.len(),
        matchups = lookup.by_matchup.len(),
        conflicts,
        "Built game lookup"
    );

    lookup
}
