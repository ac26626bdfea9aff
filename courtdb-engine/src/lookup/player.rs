//! Player lookup

use super::{insert_first, normalize_name, PlayerId};
use courtdb_common::db::Snapshot;
use std::collections::{HashMap, HashSet};
use tracing::debug;

const ID_COLUMNS: &[&str] = &["player_id", "id"];
const SLUG_COLUMNS: &[&str] = &["slug", "player_slug"];
const NAME_COLUMNS: &[&str] = &["full_name", "display_name", "player_name"];
const ALIAS_COLUMNS: &[&str] = &["alias", "alias_name"];

/// Player identifiers mapped to canonical keys
#[derive(Debug, Clone, Default)]
pub struct PlayerLookup {
    direct: HashSet<PlayerId>,
    by_slug: HashMap<String, PlayerId>,
    by_name: HashMap<String, PlayerId>,
    by_alias: HashMap<String, PlayerId>,
}

impl PlayerLookup {
    pub fn contains(&self, id: PlayerId) -> bool {
        self.direct.contains(&id)
    }

    pub fn by_slug(&self, slug: &str) -> Option<PlayerId> {
        self.by_slug.get(&normalize_name(slug)).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<PlayerId> {
        self.by_name.get(&normalize_name(name)).copied()
    }

    pub fn by_alias(&self, alias: &str) -> Option<PlayerId> {
        self.by_alias.get(&normalize_name(alias)).copied()
    }

    /// Number of canonical players
    pub fn len(&self) -> usize {
        self.direct.len()
    }

    pub fn is_empty(&self) -> bool {
        self.direct.is_empty()
    }
}

/// Build the player lookup from the player table and optional alias extract
///
/// Both the full name and "first last" are indexed in the name map. Alias
/// rows that point at a player absent from the snapshot are dropped: the
/// engine only ever resolves to keys the warehouse already has.
pub fn build_player_lookup(players: &Snapshot, aliases: Option<&Snapshot>) -> PlayerLookup {
    let mut lookup = PlayerLookup::default();
    let mut conflicts = 0usize;

    for row in players.rows() {
        let id = match row.first_i64(ID_COLUMNS) {
            Some(id) => PlayerId(id),
            None => continue,
        };
        lookup.direct.insert(id);

        if let Some(slug) = row.first_text(SLUG_COLUMNS) {
            if !insert_first(&mut lookup.by_slug, normalize_name(&slug), id) {
                conflicts += 1;
            }
        }

        if let Some(name) = row.first_text(NAME_COLUMNS) {
            if !insert_first(&mut lookup.by_name, normalize_name(&name), id) {
                conflicts += 1;
            }
        }

        if let (Some(first), Some(last)) = (row.get_text("first_name"), row.get_text("last_name")) {
            let key = normalize_name(&format!("{} {}", first.trim(), last.trim()));
            // The same player's full name usually produces this key already
            if lookup.by_name.get(&key).is_some_and(|existing| *existing != id) {
                conflicts += 1;
            } else {
                lookup.by_name.entry(key).or_insert(id);
            }
        }
    }

    let mut orphan_aliases = 0usize;
    if let Some(aliases) = aliases {
        for row in aliases.rows() {
            let (alias, id) = match (row.first_text(ALIAS_COLUMNS), row.first_i64(ID_COLUMNS)) {
                (Some(alias), Some(id)) => (alias, PlayerId(id)),
                _ => continue,
            };
            if !lookup.direct.contains(&id) {
                orphan_aliases += 1;
                continue;
            }
            if !insert_first(&mut lookup.by_alias, normalize_name(&alias), id) {
                conflicts += 1;
            }
        }
    }

    debug!(
        players = lookup.direct.len(),
        slugs = lookup.by_slug.len(),
        names = lookup.by_name.len(),
        aliases = lookup.by_alias.len(),
        conflicts,
        orphan_aliases,
        "Built player lookup"
    );

    lookup
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtdb_common::db::Value;

    fn person(id: i64, slug: &str, full: &str, first: &str, last: &str) -> Vec<Value> {
        vec![id.into(), slug.into(), full.into(), first.into(), last.into()]
    }

    fn players() -> Snapshot {
        Snapshot::from_rows(
            "player",
            &["player_id", "slug", "full_name", "first_name", "last_name"],
            vec![
                person(23, "jordami01", "Michael Jordan", "Michael", "Jordan"),
                person(2544, "jamesle01", "LeBron James", "LeBron", "James"),
                vec![Value::Null, "ghost01".into(), "No Id".into(), Value::Null, Value::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_builds_all_layers() {
        let lookup = build_player_lookup(&players(), None);

        assert_eq!(lookup.len(), 2);
        assert!(lookup.contains(PlayerId(23)));
        assert_eq!(lookup.by_slug("JORDAMI01"), Some(PlayerId(23)));
        assert_eq!(lookup.by_name("  lebron james "), Some(PlayerId(2544)));
        assert_eq!(lookup.by_slug("ghost01"), None, "rows without ids are skipped");
    }

    #[test]
    fn test_alias_first_write_wins() {
        let players = Snapshot::from_rows(
            "player",
            &["player_id", "full_name"],
            vec![vec![23.into(), "Michael Jordan".into()], vec![99.into(), "Someone Else".into()]],
        )
        .unwrap();
        let aliases = Snapshot::from_rows(
            "player_alias",
            &["alias", "player_id"],
            vec![vec!["MJ".into(), 23.into()], vec!["mj".into(), 99.into()]],
        )
        .unwrap();

        let lookup = build_player_lookup(&players, Some(&aliases));
        assert_eq!(lookup.by_alias("mj"), Some(PlayerId(23)));
    }

    #[test]
    fn test_alias_to_unknown_player_dropped() {
        let aliases = Snapshot::from_rows(
            "player_alias",
            &["alias", "player_id"],
            vec![vec!["The Mailman".into(), 32.into()]],
        )
        .unwrap();

        let lookup = build_player_lookup(&players(), Some(&aliases));
        assert_eq!(lookup.by_alias("the mailman"), None);
    }

    #[test]
    fn test_missing_columns_degrade_layers() {
        let ids_only = Snapshot::from_rows("player", &["player_id"], vec![vec![1.into()]]).unwrap();
        let lookup = build_player_lookup(&ids_only, None);
        assert!(lookup.contains(PlayerId(1)));
        assert_eq!(lookup.by_name("anyone"), None);

        let empty = build_player_lookup(&Snapshot::empty("player"), None);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_duplicate_name_keeps_first_player() {
        let snap = Snapshot::from_rows(
            "player",
            &["player_id", "full_name"],
            vec![vec![1.into(), "Patrick Ewing".into()], vec![2.into(), "Patrick Ewing".into()]],
        )
        .unwrap();
        let lookup = build_player_lookup(&snap, None);
        assert_eq!(lookup.by_name("patrick ewing"), Some(PlayerId(1)));
    }
}
