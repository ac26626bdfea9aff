//! Team lookup
//!
//! Team abbreviations are reused across time (a franchise relocates and a
//! later team picks up the old code), so besides the scope-agnostic
//! abbreviation map the lookup keeps season-scoped mappings. Scoped entries
//! come from the team history extract and from scoped abbreviation remaps.

use super::{insert_first, normalize_code, normalize_name, TeamId};
use courtdb_common::db::{RowRef, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

const ID_COLUMNS: &[&str] = &["team_id", "id"];
const ABBREVIATION_COLUMNS: &[&str] = &["abbreviation", "team_abbreviation", "tricode"];
const NAME_COLUMNS: &[&str] = &["full_name", "team_name", "name"];
const FROM_COLUMNS: &[&str] = &["season_from", "year_from", "year_founded"];
const TO_COLUMNS: &[&str] = &["season_to", "year_to", "year_active_till"];

/// Alternate abbreviation for a team, optionally limited to a season range
///
/// `canonical` is the abbreviation the team carries in the team table; the
/// remap is dropped at build time when no such team exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbbreviationRemap {
    pub alias: String,
    pub canonical: String,
    /// Inclusive season-year range; `None` makes the remap scope-agnostic
    pub seasons: Option<(i32, Option<i32>)>,
}

impl AbbreviationRemap {
    pub fn unscoped(alias: &str, canonical: &str) -> Self {
        Self { alias: alias.to_string(), canonical: canonical.to_string(), seasons: None }
    }

    pub fn scoped(alias: &str, canonical: &str, from: i32, to: Option<i32>) -> Self {
        Self {
            alias: alias.to_string(),
            canonical: canonical.to_string(),
            seasons: Some((from, to)),
        }
    }
}

/// Relocations and alternate spellings seen in public box-score extracts
///
/// Season years are the calendar year a season starts in.
pub fn default_abbreviation_remaps() -> Vec<AbbreviationRemap> {
    vec![
        AbbreviationRemap::scoped("SEA", "OKC", 1967, Some(2007)),
        AbbreviationRemap::scoped("NJN", "BKN", 1977, Some(2011)),
        AbbreviationRemap::scoped("VAN", "MEM", 1995, Some(2000)),
        AbbreviationRemap::scoped("NOH", "NOP", 2002, Some(2012)),
        AbbreviationRemap::scoped("NOK", "NOP", 2005, Some(2006)),
        AbbreviationRemap::scoped("CHH", "CHA", 1988, Some(2001)),
        AbbreviationRemap::scoped("SDC", "LAC", 1978, Some(1983)),
        AbbreviationRemap::scoped("KCK", "SAC", 1975, Some(1984)),
        AbbreviationRemap::scoped("WSB", "WAS", 1974, Some(1996)),
        AbbreviationRemap::unscoped("PHO", "PHX"),
        AbbreviationRemap::unscoped("BRK", "BKN"),
        AbbreviationRemap::unscoped("CHO", "CHA"),
        AbbreviationRemap::unscoped("GS", "GSW"),
        AbbreviationRemap::unscoped("NY", "NYK"),
        AbbreviationRemap::unscoped("SA", "SAS"),
        AbbreviationRemap::unscoped("NO", "NOP"),
        AbbreviationRemap::unscoped("UTAH", "UTA"),
        AbbreviationRemap::unscoped("WSH", "WAS"),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScopedTeam {
    from: i32,
    to: Option<i32>,
    team: TeamId,
}

impl ScopedTeam {
    fn covers(&self, season_year: i32) -> bool {
        season_year >= self.from && self.to.map_or(true, |to| season_year <= to)
    }

    fn overlaps(&self, other: &ScopedTeam) -> bool {
        self.from <= other.to.unwrap_or(i32::MAX) && other.from <= self.to.unwrap_or(i32::MAX)
    }
}

/// Team identifiers mapped to canonical keys
#[derive(Debug, Clone, Default)]
pub struct TeamLookup {
    direct: HashSet<TeamId>,
    by_abbreviation: HashMap<String, TeamId>,
    /// Season ranges per abbreviation, in insertion order
    by_scope: HashMap<String, Vec<ScopedTeam>>,
    by_name: HashMap<String, TeamId>,
}

impl TeamLookup {
    pub fn contains(&self, id: TeamId) -> bool {
        self.direct.contains(&id)
    }

    pub fn by_abbreviation(&self, abbreviation: &str) -> Option<TeamId> {
        self.by_abbreviation.get(&normalize_code(abbreviation)).copied()
    }

    /// Season-scoped lookup; the first registered range covering the season wins
    pub fn by_scope(&self, season_year: i32, abbreviation: &str) -> Option<TeamId> {
        self.by_scope
            .get(&normalize_code(abbreviation))?
            .iter()
            .find(|s| s.covers(season_year))
            .map(|s| s.team)
    }

    pub fn by_name(&self, name: &str) -> Option<TeamId> {
        self.by_name.get(&normalize_name(name)).copied()
    }

    pub fn len(&self) -> usize {
        self.direct.len()
    }

    pub fn is_empty(&self) -> bool {
        self.direct.is_empty()
    }

    /// Register a scoped range; returns false when it overlaps a range
    /// already registered for a different team
    fn insert_scoped(&mut self, abbreviation: String, scoped: ScopedTeam) -> bool {
        let ranges = self.by_scope.entry(abbreviation).or_default();
        let conflicting = ranges.iter().any(|r| r.team != scoped.team && r.overlaps(&scoped));
        // Lookup walks ranges in order, so earlier ranges keep the overlapping years
        ranges.push(scoped);
        !conflicting
    }
}

/// Build the team lookup
///
/// Sources are applied in a fixed order, each first-write-wins:
/// 1. team table (direct keys, abbreviations, names)
/// 2. team history (scoped abbreviations, historical names)
/// 3. abbreviation remaps (scoped or scope-agnostic)
pub fn build_team_lookup(
    teams: &Snapshot,
    history: Option<&Snapshot>,
    remaps: &[AbbreviationRemap],
) -> TeamLookup {
    let mut lookup = TeamLookup::default();
    let mut conflicts = 0usize;

    for row in teams.rows() {
        let id = match row.first_i64(ID_COLUMNS) {
            Some(id) => TeamId(id),
            None => continue,
        };
        lookup.direct.insert(id);

        if let Some(abbreviation) = row.first_text(ABBREVIATION_COLUMNS) {
            if !insert_first(&mut lookup.by_abbreviation, normalize_code(&abbreviation), id) {
                conflicts += 1;
            }
        }
        for name in team_names(&row) {
            if !insert_first(&mut lookup.by_name, name, id) {
                conflicts += 1;
            }
        }
    }

    if let Some(history) = history {
        for row in history.rows() {
            let id = match row.first_i64(ID_COLUMNS) {
                Some(id) if lookup.direct.contains(&TeamId(id)) => TeamId(id),
                _ => continue,
            };
            // Out-of-range years drop the scoped entry; an absent end year is open-ended
            let from = row.first_i64(FROM_COLUMNS).and_then(|y| i32::try_from(y).ok());
            let to = row.first_i64(TO_COLUMNS).map(i32::try_from).transpose().ok();
            if let (Some(abbreviation), Some(from), Some(to)) =
                (row.first_text(ABBREVIATION_COLUMNS), from, to)
            {
                let scoped = ScopedTeam { from, to, team: id };
                if !lookup.insert_scoped(normalize_code(&abbreviation), scoped) {
                    conflicts += 1;
                }
            }
            for name in team_names(&row) {
                insert_first(&mut lookup.by_name, name, id);
            }
        }
    }

    let mut dropped_remaps = 0usize;
    for remap in remaps {
        let team = match lookup.by_abbreviation.get(&normalize_code(&remap.canonical)) {
            Some(team) => *team,
            None => {
                dropped_remaps += 1;
                continue;
            }
        };
        let alias = normalize_code(&remap.alias);
        let inserted = match remap.seasons {
            Some((from, to)) => lookup.insert_scoped(alias, ScopedTeam { from, to, team }),
            None => insert_first(&mut lookup.by_abbreviation, alias, team),
        };
        if !inserted {
            conflicts += 1;
        }
    }

    debug!(
        teams = lookup.direct.len(),
        abbreviations = lookup.by_abbreviation.len(),
        scoped_codes = lookup.by_scope.len(),
        names = lookup.by_name.len(),
        conflicts,
        dropped_remaps,
        "Built team lookup"
    );

    lookup
}

/// Name keys for a team row: full name, and "city nickname" when both exist
fn team_names(row: &RowRef<'_>) -> Vec<String> {
    let mut names = Vec::with_capacity(2);
    if let Some(full) = row.first_text(NAME_COLUMNS) {
        names.push(normalize_name(&full));
    }
    if let (Some(city), Some(nickname)) = (row.get_text("city"), row.get_text("nickname")) {
        let combined = normalize_name(&format!("{} {}", city.trim(), nickname.trim()));
        if !names.contains(&combined) {
            names.push(combined);
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtdb_common::db::Value;

    const OKC: i64 = 1610612760;
    const STORM: i64 = 1611661328;
    const PHX: i64 = 1610612756;

    fn franchise(id: i64, code: &str, full: &str, city: &str, nickname: &str) -> Vec<Value> {
        vec![id.into(), code.into(), full.into(), city.into(), nickname.into()]
    }

    fn teams() -> Snapshot {
        Snapshot::from_rows(
            "team",
            &["team_id", "abbreviation", "full_name", "city", "nickname"],
            vec![
                franchise(OKC, "OKC", "Oklahoma City Thunder", "Oklahoma City", "Thunder"),
                franchise(STORM, "SEA", "Seattle Storm", "Seattle", "Storm"),
                franchise(PHX, "PHX", "Phoenix Suns", "Phoenix", "Suns"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_scoped_remap_separates_eras() {
        let lookup = build_team_lookup(&teams(), None, &default_abbreviation_remaps());

        assert_eq!(lookup.by_scope(2005, "sea"), Some(TeamId(OKC)));
        assert_eq!(lookup.by_scope(2010, "SEA"), None);
        assert_eq!(lookup.by_abbreviation("SEA"), Some(TeamId(STORM)));
    }

    #[test]
    fn test_unscoped_remap_never_overrides_direct() {
        let remaps = vec![
            AbbreviationRemap::unscoped("PHO", "PHX"),
            AbbreviationRemap::unscoped("OKC", "PHX"),
            AbbreviationRemap::unscoped("XYZ", "NOPE"),
        ];
        let lookup = build_team_lookup(&teams(), None, &remaps);

        assert_eq!(lookup.by_abbreviation("pho"), Some(TeamId(PHX)));
        assert_eq!(lookup.by_abbreviation("OKC"), Some(TeamId(OKC)));
        assert_eq!(lookup.by_abbreviation("XYZ"), None);
    }

    fn era(id: i64, code: &str, from: i64, to: Value, city: &str, nickname: &str) -> Vec<Value> {
        vec![id.into(), code.into(), from.into(), to, city.into(), nickname.into()]
    }

    #[test]
    fn test_history_adds_scopes_and_names() {
        let history = Snapshot::from_rows(
            "team_history",
            &["team_id", "abbreviation", "season_from", "season_to", "city", "nickname"],
            vec![
                era(OKC, "SEA", 1967, 2007.into(), "Seattle", "SuperSonics"),
                era(OKC, "OKC", 2008, Value::Null, "Oklahoma City", "Thunder"),
                era(424242, "XXX", 1950, 1951.into(), "Nowhere", "Ghosts"),
            ],
        )
        .unwrap();
        let lookup = build_team_lookup(&teams(), Some(&history), &[]);

        assert_eq!(lookup.by_scope(1996, "SEA"), Some(TeamId(OKC)));
        assert_eq!(lookup.by_scope(2024, "OKC"), Some(TeamId(OKC)));
        assert_eq!(lookup.by_name("Seattle SuperSonics"), Some(TeamId(OKC)));
        assert_eq!(lookup.by_scope(1950, "XXX"), None, "history for unknown teams is ignored");
    }

    #[test]
    fn test_out_of_range_history_years_are_ignored() {
        let wrapped = 1967i64 + (1i64 << 32);
        let history = Snapshot::from_rows(
            "team_history",
            &["team_id", "abbreviation", "season_from", "season_to"],
            vec![
                vec![PHX.into(), "SEA".into(), wrapped.into(), Value::Null],
                vec![OKC.into(), "SEA".into(), 1967.into(), (2030i64 + (1i64 << 32)).into()],
                vec![OKC.into(), "SEA".into(), 1967.into(), 2007.into()],
            ],
        )
        .unwrap();
        let lookup = build_team_lookup(&teams(), Some(&history), &[]);

        assert_eq!(lookup.by_scope(1996, "SEA"), Some(TeamId(OKC)));
        assert_eq!(lookup.by_scope(2020, "SEA"), None);
    }

    #[test]
    fn test_overlapping_scope_first_registered_wins() {
        let remaps = vec![
            AbbreviationRemap::scoped("SEA", "OKC", 1967, Some(2007)),
            AbbreviationRemap::scoped("SEA", "PHX", 2000, Some(2010)),
        ];
        let lookup = build_team_lookup(&teams(), None, &remaps);

        assert_eq!(lookup.by_scope(2005, "SEA"), Some(TeamId(OKC)));
        assert_eq!(lookup.by_scope(2009, "SEA"), Some(TeamId(PHX)));
    }

    #[test]
    fn test_empty_inputs() {
        let remaps = default_abbreviation_remaps();
        let lookup = build_team_lookup(&Snapshot::empty("team"), None, &remaps);
        assert!(lookup.is_empty());
        assert_eq!(lookup.by_abbreviation("PHO"), None);
    }
}
