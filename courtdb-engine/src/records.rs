//! Typed source records
//!
//! Staged extracts are read as snapshots and converted row by row into
//! typed records before any identity resolution happens. Identifier fields
//! stay optional (resolution decides what an absent one means); measured
//! fields must parse when present.

use crate::lookup::GameId;
use courtdb_common::db::{RowRef, Value};
use courtdb_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// Source id of the per-player box score extract
pub const PLAYER_BOX_SCORES_SOURCE: &str = "player_box_scores";
/// Source id of the draft extract
pub const DRAFT_PICKS_SOURCE: &str = "draft_picks";

/// Staging table holding a source's raw rows
pub fn staging_table(source_id: &str) -> String {
    format!("stg_{}", source_id)
}

/// Season start year from `2005`, `2005-06` or `2005-2006`
pub fn parse_season_year(raw: &str) -> Option<i32> {
    let head = raw.trim().split(['-', '/']).next()?.trim();
    if head.len() != 4 {
        return None;
    }
    head.parse().ok()
}

fn season_year(row: &RowRef<'_>) -> Option<i32> {
    row.get("season_year")
        .and_then(Value::as_i64)
        .and_then(|y| i32::try_from(y).ok())
        .or_else(|| row.first_text(&["season", "season_year"]).and_then(|s| parse_season_year(&s)))
}

/// Optional numeric field; present but unparsable is an error
fn measured_i64(row: &RowRef<'_>, columns: &[&str]) -> Result<Option<i64>> {
    for column in columns {
        match row.get(column) {
            None | Some(Value::Null) => continue,
            Some(Value::Text(s)) if s.trim().is_empty() => continue,
            Some(value) => {
                return value
                    .as_i64()
                    .map(Some)
                    .ok_or_else(|| {
                        Error::InvalidInput(format!("{} is not an integer: '{}'", column, value))
                    });
            }
        }
    }
    Ok(None)
}

fn measured_f64(row: &RowRef<'_>, columns: &[&str]) -> Result<Option<f64>> {
    for column in columns {
        match row.get(column) {
            None | Some(Value::Null) => continue,
            Some(Value::Text(s)) if s.trim().is_empty() => continue,
            Some(value) => {
                return parse_minutes(value)
                    .map(Some)
                    .ok_or_else(|| {
                        Error::InvalidInput(format!("{} is not a number: '{}'", column, value))
                    });
            }
        }
    }
    Ok(None)
}

/// Numbers, plus the `MM:SS` form box score extracts use for minutes
fn parse_minutes(value: &Value) -> Option<f64> {
    if let Some(n) = value.as_f64() {
        return Some(n);
    }
    let text = value.as_text()?;
    let (minutes, seconds) = text.trim().split_once(':')?;
    let minutes: f64 = minutes.parse().ok()?;
    let seconds: f64 = seconds.parse().ok()?;
    Some(minutes + seconds / 60.0)
}

/// One row of the player box score extract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerBoxScoreRecord {
    pub game_id: Option<GameId>,
    pub game_date: Option<String>,
    pub season_year: Option<i32>,
    pub league: Option<String>,
    pub team_abbreviation: Option<String>,
    pub player_id: Option<i64>,
    pub player_slug: Option<String>,
    pub player_name: Option<String>,
    pub minutes: Option<f64>,
    pub points: Option<i64>,
    pub rebounds: Option<i64>,
    pub assists: Option<i64>,
}

impl TryFrom<RowRef<'_>> for PlayerBoxScoreRecord {
    type Error = Error;

    fn try_from(row: RowRef<'_>) -> Result<Self> {
        Ok(Self {
            game_id: row.first_text(&["game_id"]).map(GameId::new),
            game_date: row.first_text(&["game_date", "date"]),
            season_year: season_year(&row),
            league: row.first_text(&["league", "league_code"]),
            team_abbreviation: row.first_text(&["team_abbreviation", "team", "tm"]),
            player_id: row.get("player_id").and_then(Value::as_i64),
            player_slug: row.first_text(&["player_slug", "slug"]),
            player_name: row.first_text(&["player_name", "player", "name"]),
            minutes: measured_f64(&row, &["minutes", "min", "mp"])?,
            points: measured_i64(&row, &["points", "pts"])?,
            rebounds: measured_i64(&row, &["rebounds", "reb", "trb"])?,
            assists: measured_i64(&row, &["assists", "ast"])?,
        })
    }
}

/// One row of the draft extract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftPickRecord {
    pub season_year: Option<i32>,
    pub league: Option<String>,
    pub round: Option<i64>,
    pub overall_pick: Option<i64>,
    pub team_abbreviation: Option<String>,
    pub player_id: Option<i64>,
    pub player_slug: Option<String>,
    pub player_name: Option<String>,
}

impl TryFrom<RowRef<'_>> for DraftPickRecord {
    type Error = Error;

    fn try_from(row: RowRef<'_>) -> Result<Self> {
        Ok(Self {
            season_year: season_year(&row)
                .or_else(|| row.get_i64("draft_year").and_then(|y| i32::try_from(y).ok())),
            league: row.first_text(&["league", "league_code"]),
            round: measured_i64(&row, &["round", "round_number"])?,
            overall_pick: measured_i64(&row, &["overall_pick", "pick", "overall"])?,
            team_abbreviation: row.first_text(&["team_abbreviation", "team", "tm"]),
            player_id: row.get("player_id").and_then(Value::as_i64),
            player_slug: row.first_text(&["player_slug", "slug"]),
            player_name: row.first_text(&["player_name", "player", "name"]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtdb_common::db::Snapshot;

    #[test]
    fn test_parse_season_year() {
        assert_eq!(parse_season_year("2005-06"), Some(2005));
        assert_eq!(parse_season_year(" 2005 "), Some(2005));
        assert_eq!(parse_season_year("2005-2006"), Some(2005));
        assert_eq!(parse_season_year("05-06"), None);
        assert_eq!(parse_season_year("season"), None);
    }

    #[test]
    fn test_box_score_row() {
        let snap = Snapshot::from_rows(
            "stg_player_box_scores",
            &["game_id", "season", "team", "player_id", "player_name", "min", "pts"],
            vec![vec![
                "0020500001".into(),
                "2005-06".into(),
                "sea".into(),
                "2544".into(),
                "LeBron James".into(),
                "38:30".into(),
                31.into(),
            ]],
        )
        .unwrap();
        let record = PlayerBoxScoreRecord::try_from(snap.rows().next().unwrap()).unwrap();

        assert_eq!(record.game_id, Some(GameId::new("0020500001")));
        assert_eq!(record.season_year, Some(2005));
        assert_eq!(record.team_abbreviation.as_deref(), Some("sea"));
        assert_eq!(record.player_id, Some(2544));
        assert_eq!(record.minutes, Some(38.5));
        assert_eq!(record.points, Some(31));
        assert_eq!(record.rebounds, None);
    }

    #[test]
    fn test_malformed_measure_is_rejected() {
        let rows = vec![vec!["g1".into(), "lots".into()]];
        let snap = Snapshot::from_rows("stg", &["game_id", "pts"], rows).unwrap();
        let result = PlayerBoxScoreRecord::try_from(snap.rows().next().unwrap());
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_draft_row_uses_draft_year() {
        let snap = Snapshot::from_rows(
            "stg_draft_picks",
            &["draft_year", "round", "pick", "team", "player_name"],
            vec![vec![2003.into(), 1.into(), 1.into(), "CLE".into(), "LeBron James".into()]],
        )
        .unwrap();
        let record = DraftPickRecord::try_from(snap.rows().next().unwrap()).unwrap();
        assert_eq!(record.season_year, Some(2003));
        assert_eq!(record.overall_pick, Some(1));
        assert_eq!(record.player_id, None);
    }

    #[test]
    fn test_staging_table_name() {
        assert_eq!(staging_table(PLAYER_BOX_SCORES_SOURCE), "stg_player_box_scores");
    }
}
