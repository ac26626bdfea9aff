//! Batch resolution of staged extracts
//!
//! Turns typed source records into rows carrying canonical keys. Each
//! reference has a policy: `Hard` references must resolve or the row is
//! dropped (the target column is part of a key or NOT NULL), `Soft`
//! references become NULL foreign keys. Every unresolved reference kind is
//! reported once per batch as an aggregated `unresolved_reference` issue.
//!
//! Writing the resolved rows is the bulk writer's job; `chunks` hands them
//! over in `copy_batch_size` slices.

use crate::expectations::ExpectationsConfig;
use crate::issue::{DriftIssue, IssueType, PolicyKey, SourceKind};
use crate::lookup::{GameId, Lookups, PlayerId, SeasonId, TeamId};
use crate::records::{
    DraftPickRecord, PlayerBoxScoreRecord, DRAFT_PICKS_SOURCE, PLAYER_BOX_SCORES_SOURCE,
};
use crate::resolve::{
    resolve_game, resolve_player, resolve_season, resolve_team, MatchPath, Resolution,
};
use courtdb_common::db::Snapshot;
use courtdb_common::Severity;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Unresolved samples kept per reference kind
const MAX_SAMPLES: usize = 5;

/// What an unresolved reference does to its row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferencePolicy {
    /// Drop the row
    Hard,
    /// Keep the row with a NULL foreign key
    Soft,
}

/// Policies for player box score references
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxScorePolicies {
    pub game: ReferencePolicy,
    pub player: ReferencePolicy,
    pub team: ReferencePolicy,
    pub season: ReferencePolicy,
}

impl Default for BoxScorePolicies {
    /// `(game_id, player_id)` is the box score key
    fn default() -> Self {
        Self {
            game: ReferencePolicy::Hard,
            player: ReferencePolicy::Hard,
            team: ReferencePolicy::Soft,
            season: ReferencePolicy::Soft,
        }
    }
}

/// Policies for draft pick references
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftPolicies {
    pub season: ReferencePolicy,
    pub team: ReferencePolicy,
    pub player: ReferencePolicy,
}

impl Default for DraftPolicies {
    /// Picks of players never signed have no player row
    fn default() -> Self {
        Self {
            season: ReferencePolicy::Hard,
            team: ReferencePolicy::Soft,
            player: ReferencePolicy::Soft,
        }
    }
}

/// Box score row ready for the writer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedBoxScore {
    pub game_id: Option<GameId>,
    pub player_id: Option<PlayerId>,
    pub team_id: Option<TeamId>,
    pub season_id: Option<SeasonId>,
    pub minutes: Option<f64>,
    pub points: Option<i64>,
    pub rebounds: Option<i64>,
    pub assists: Option<i64>,
}

/// Draft row ready for the writer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDraftPick {
    pub season_id: Option<SeasonId>,
    pub team_id: Option<TeamId>,
    pub player_id: Option<PlayerId>,
    pub round: Option<i64>,
    pub overall_pick: Option<i64>,
}

/// Per-reference statistics for one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceStats {
    pub reference: &'static str,
    pub policy: ReferencePolicy,
    pub resolved: BTreeMap<MatchPath, u64>,
    pub unresolved: u64,
    pub samples: Vec<String>,
}

impl ReferenceStats {
    fn new(reference: &'static str, policy: ReferencePolicy) -> Self {
        Self { reference, policy, resolved: BTreeMap::new(), unresolved: 0, samples: Vec::new() }
    }

    /// Count one resolution; returns the key and whether a hard reference failed
    fn observe<K>(
        &mut self,
        resolution: Resolution<K>,
        describe: impl FnOnce() -> String,
    ) -> (Option<K>, bool) {
        match resolution {
            Resolution::Resolved { key, via } => {
                *self.resolved.entry(via).or_default() += 1;
                (Some(key), false)
            }
            Resolution::Unresolved => {
                self.unresolved += 1;
                if self.samples.len() < MAX_SAMPLES {
                    self.samples.push(describe());
                }
                (None, self.policy == ReferencePolicy::Hard)
            }
        }
    }

    fn issue(&self, source_id: &str) -> Option<DriftIssue> {
        if self.unresolved == 0 {
            return None;
        }
        let severity = match self.policy {
            ReferencePolicy::Hard => Severity::Warn,
            ReferencePolicy::Soft => Severity::Info,
        };
        Some(
            DriftIssue::new(
                SourceKind::Source,
                source_id,
                IssueType::UnresolvedReference,
                severity,
                json!({
                    "reference": self.reference,
                    "policy": self.policy,
                    "rows": self.unresolved,
                    "samples": self.samples,
                }),
            )
            .in_step(format!("resolve:{}", source_id)),
        )
    }
}

/// Result of resolving one staged batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResolution<T> {
    pub source_id: String,
    pub rows: Vec<T>,
    /// Rows dropped for an unresolved hard reference
    pub dropped: u64,
    /// Kept rows with at least one NULLed soft reference
    pub nulled: u64,
    /// Rows that could not be read as typed records
    pub malformed: u64,
    pub references: Vec<ReferenceStats>,
    pub issues: Vec<DriftIssue>,
    batch_size: usize,
}

impl<T> BatchResolution<T> {
    /// Resolved rows in writer-sized chunks
    pub fn chunks(&self) -> std::slice::Chunks<'_, T> {
        self.rows.chunks(self.batch_size.max(1))
    }

    /// Lineage summary for the run ledger
    pub fn summary(&self) -> serde_json::Value {
        json!({
            "rows": self.rows.len(),
            "dropped": self.dropped,
            "nulled": self.nulled,
            "malformed": self.malformed,
            "references": self.references,
        })
    }
}

/// Shared batch bookkeeping for both record kinds
struct Batch<T> {
    source_id: &'static str,
    rows: Vec<T>,
    dropped: u64,
    nulled: u64,
    malformed: u64,
    malformed_samples: Vec<String>,
}

impl<T> Batch<T> {
    fn new(source_id: &'static str) -> Self {
        Self {
            source_id,
            rows: Vec::new(),
            dropped: 0,
            nulled: 0,
            malformed: 0,
            malformed_samples: Vec::new(),
        }
    }

    fn malformed(&mut self, index: usize, error: &courtdb_common::Error) {
        self.malformed += 1;
        if self.malformed_samples.len() < MAX_SAMPLES {
            self.malformed_samples.push(format!("row {}: {}", index, error));
        }
    }

    fn finish(
        self,
        references: Vec<ReferenceStats>,
        expectations: &ExpectationsConfig,
        batch_size: usize,
    ) -> BatchResolution<T> {
        let mut issues: Vec<DriftIssue> =
            references.iter().filter_map(|r| r.issue(self.source_id)).collect();
        if self.malformed > 0 {
            let entry = expectations.get_source_expectation(self.source_id);
            let severity = expectations.resolve_severity(PolicyKey::TypeMismatch, entry, None);
            issues.push(
                DriftIssue::new(
                    SourceKind::Source,
                    self.source_id,
                    IssueType::TypeMismatch,
                    severity,
                    json!({ "malformed_rows": self.malformed, "samples": self.malformed_samples }),
                )
                .in_step(format!("resolve:{}", self.source_id)),
            );
        }

        info!(
            source = self.source_id,
            rows = self.rows.len(),
            dropped = self.dropped,
            nulled = self.nulled,
            malformed = self.malformed,
            "Resolved staged batch"
        );

        BatchResolution {
            source_id: self.source_id.to_string(),
            rows: self.rows,
            dropped: self.dropped,
            nulled: self.nulled,
            malformed: self.malformed,
            references,
            issues,
            batch_size,
        }
    }
}

fn team_resolution(
    abbreviation: Option<&str>,
    season_year: Option<i32>,
    lookups: &Lookups,
) -> Resolution<TeamId> {
    // An absent abbreviation is just an unresolved reference here
    match abbreviation {
        Some(code) => {
            resolve_team(code, season_year, &lookups.teams).unwrap_or(Resolution::Unresolved)
        }
        None => Resolution::Unresolved,
    }
}

fn season_resolution(
    season_year: Option<i32>,
    league: Option<&str>,
    lookups: &Lookups,
) -> Resolution<SeasonId> {
    match season_year {
        Some(year) => resolve_season(year, league, &lookups.seasons),
        None => Resolution::Unresolved,
    }
}

fn describe_player(id: Option<i64>, slug: Option<&str>, name: Option<&str>) -> String {
    format!("id={:?} slug={:?} name={:?}", id, slug, name)
}

/// Resolve a staged player box score extract
pub fn resolve_box_scores(
    staged: &Snapshot,
    lookups: &Lookups,
    policies: BoxScorePolicies,
    expectations: &ExpectationsConfig,
    copy_batch_size: usize,
) -> BatchResolution<ResolvedBoxScore> {
    let mut batch = Batch::new(PLAYER_BOX_SCORES_SOURCE);
    let mut game = ReferenceStats::new("game", policies.game);
    let mut player = ReferenceStats::new("player", policies.player);
    let mut team = ReferenceStats::new("team", policies.team);
    let mut season = ReferenceStats::new("season", policies.season);

    for (index, row) in staged.rows().enumerate() {
        let record = match PlayerBoxScoreRecord::try_from(row) {
            Ok(record) => record,
            Err(e) => {
                batch.malformed(index, &e);
                continue;
            }
        };

        let (season_id, season_hard) = season.observe(
            season_resolution(record.season_year, record.league.as_deref(), lookups),
            || format!("season={:?} league={:?}", record.season_year, record.league),
        );
        let (team_id, team_hard) = team.observe(
            team_resolution(record.team_abbreviation.as_deref(), record.season_year, lookups),
            || format!("team={:?} season={:?}", record.team_abbreviation, record.season_year),
        );
        let slug = record.player_slug.as_deref();
        let name = record.player_name.as_deref();
        let (player_id, player_hard) = player.observe(
            resolve_player(name, &lookups.players, slug, record.player_id),
            || describe_player(record.player_id, slug, name),
        );
        let (game_id, game_hard) = game.observe(
            resolve_game(record.game_id.as_ref(), None, &lookups.games),
            || format!("game_id={:?}", record.game_id.as_ref().map(GameId::as_str)),
        );

        if season_hard || team_hard || player_hard || game_hard {
            batch.dropped += 1;
            continue;
        }
        if season_id.is_none() || team_id.is_none() || player_id.is_none() || game_id.is_none() {
            batch.nulled += 1;
        }

        batch.rows.push(ResolvedBoxScore {
            game_id,
            player_id,
            team_id,
            season_id,
            minutes: record.minutes,
            points: record.points,
            rebounds: record.rebounds,
            assists: record.assists,
        });
    }

    debug!(
        source = PLAYER_BOX_SCORES_SOURCE,
        staged = staged.len(),
        "Box score references resolved"
    );
    batch.finish(vec![game, player, team, season], expectations, copy_batch_size)
}

/// Resolve a staged draft extract
pub fn resolve_draft_picks(
    staged: &Snapshot,
    lookups: &Lookups,
    policies: DraftPolicies,
    expectations: &ExpectationsConfig,
    copy_batch_size: usize,
) -> BatchResolution<ResolvedDraftPick> {
    let mut batch = Batch::new(DRAFT_PICKS_SOURCE);
    let mut season = ReferenceStats::new("season", policies.season);
    let mut team = ReferenceStats::new("team", policies.team);
    let mut player = ReferenceStats::new("player", policies.player);

    for (index, row) in staged.rows().enumerate() {
        let record = match DraftPickRecord::try_from(row) {
            Ok(record) => record,
            Err(e) => {
                batch.malformed(index, &e);
                continue;
            }
        };

        let (season_id, season_hard) = season.observe(
            season_resolution(record.season_year, record.league.as_deref(), lookups),
            || format!("season={:?} league={:?}", record.season_year, record.league),
        );
        let (team_id, team_hard) = team.observe(
            team_resolution(record.team_abbreviation.as_deref(), record.season_year, lookups),
            || format!("team={:?} season={:?}", record.team_abbreviation, record.season_year),
        );
        let slug = record.player_slug.as_deref();
        let name = record.player_name.as_deref();
        let (player_id, player_hard) = player.observe(
            resolve_player(name, &lookups.players, slug, record.player_id),
            || describe_player(record.player_id, slug, name),
        );

        if season_hard || team_hard || player_hard {
            batch.dropped += 1;
            continue;
        }
        if season_id.is_none() || team_id.is_none() || player_id.is_none() {
            batch.nulled += 1;
        }

        batch.rows.push(ResolvedDraftPick {
            season_id,
            team_id,
            player_id,
            round: record.round,
            overall_pick: record.overall_pick,
        });
    }

    batch.finish(vec![season, team, player], expectations, copy_batch_size)
}
