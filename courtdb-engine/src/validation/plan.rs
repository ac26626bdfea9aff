//! Validation plans
//!
//! A plan is plain data: which objects must exist, which key references
//! must hold, which hub/satellite pairs to check and which metric columns
//! must stay inside their bounds.

use serde::{Deserialize, Serialize};

/// Parent/child key reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub child_table: String,
    pub child_column: String,
    pub parent_table: String,
    pub parent_column: String,
}

impl ForeignKey {
    pub fn new(child: (&str, &str), parent: (&str, &str)) -> Self {
        Self {
            child_table: child.0.to_string(),
            child_column: child.1.to_string(),
            parent_table: parent.0.to_string(),
            parent_column: parent.1.to_string(),
        }
    }

    /// Identifier used in issue records, e.g. `game.season_id->season.season_id`
    pub fn label(&self) -> String {
        format!(
            "{}.{}->{}.{}",
            self.child_table, self.child_column, self.parent_table, self.parent_column
        )
    }
}

/// Hub/satellite pair keyed on one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubSatellite {
    pub hub_table: String,
    pub hub_key: String,
    pub satellite_table: String,
    pub satellite_key: String,
    /// Upper bound on satellite rows per hub row, when declared
    pub max_per_hub: Option<u64>,
}

impl HubSatellite {
    pub fn new(hub: (&str, &str), satellite: (&str, &str), max_per_hub: Option<u64>) -> Self {
        Self {
            hub_table: hub.0.to_string(),
            hub_key: hub.1.to_string(),
            satellite_table: satellite.0.to_string(),
            satellite_key: satellite.1.to_string(),
            max_per_hub,
        }
    }

    pub fn label(&self) -> String {
        format!("{}<->{}", self.hub_table, self.satellite_table)
    }
}

/// Inclusive numeric range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Soft and hard bounds for one metric column
///
/// Values outside `soft` but inside `hard` are suspicious; values outside
/// `hard` are anomalies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricBound {
    pub object: String,
    pub column: String,
    pub soft: Bounds,
    pub hard: Bounds,
}

impl MetricBound {
    pub fn new(object: &str, column: &str, soft: Bounds, hard: Bounds) -> Self {
        Self { object: object.to_string(), column: column.to_string(), soft, hard }
    }

    pub fn label(&self) -> String {
        format!("{}.{}", self.object, self.column)
    }
}

/// Ordered battery of warehouse checks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationPlan {
    pub required_objects: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub hub_satellites: Vec<HubSatellite>,
    /// Core tables that should not be empty
    pub summary_tables: Vec<String>,
    pub metrics: Vec<MetricBound>,
}

/// Advanced per-game player statistics view
pub const ADVANCED_STATS_VIEW: &str = "player_game_advanced";

/// Core warehouse tables
pub const CORE_TABLES: [&str; 9] = [
    "player",
    "team",
    "season",
    "game",
    "player_box_score",
    "team_box_score",
    "play_by_play",
    "draft",
    "award",
];

/// Shooting percentages; above 1.0 only happens through bad attempts data
const SHOOTING_SOFT: Bounds = Bounds::new(0.0, 1.5);
const SHOOTING_HARD: Bounds = Bounds::new(0.0, 3.0);

impl ValidationPlan {
    /// Plan for the standard basketball warehouse
    pub fn warehouse_default() -> Self {
        let mut required_objects: Vec<String> = CORE_TABLES.iter().map(|t| t.to_string()).collect();
        required_objects.push(ADVANCED_STATS_VIEW.to_string());

        let foreign_keys = vec![
            ForeignKey::new(("game", "season_id"), ("season", "season_id")),
            ForeignKey::new(("game", "home_team_id"), ("team", "team_id")),
            ForeignKey::new(("game", "away_team_id"), ("team", "team_id")),
            ForeignKey::new(("player_box_score", "game_id"), ("game", "game_id")),
            ForeignKey::new(("player_box_score", "player_id"), ("player", "player_id")),
            ForeignKey::new(("player_box_score", "team_id"), ("team", "team_id")),
            ForeignKey::new(("team_box_score", "team_id"), ("team", "team_id")),
            ForeignKey::new(("play_by_play", "game_id"), ("game", "game_id")),
            ForeignKey::new(("draft", "player_id"), ("player", "player_id")),
            ForeignKey::new(("draft", "team_id"), ("team", "team_id")),
            ForeignKey::new(("draft", "season_id"), ("season", "season_id")),
            ForeignKey::new(("award", "player_id"), ("player", "player_id")),
            ForeignKey::new(("award", "season_id"), ("season", "season_id")),
        ];

        let hub_satellites =
            vec![HubSatellite::new(("game", "game_id"), ("team_box_score", "game_id"), Some(2))];

        let metrics = ["ts_pct", "efg_pct", "fg_pct", "fg3_pct", "ft_pct"]
            .iter()
            .map(|c| MetricBound::new(ADVANCED_STATS_VIEW, c, SHOOTING_SOFT, SHOOTING_HARD))
            .collect();

        Self {
            required_objects,
            foreign_keys,
            hub_satellites,
            summary_tables: CORE_TABLES.iter().map(|t| t.to_string()).collect(),
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan_references_required_objects() {
        let plan = ValidationPlan::warehouse_default();
        for fk in &plan.foreign_keys {
            assert!(plan.required_objects.contains(&fk.child_table), "{}", fk.label());
            assert!(plan.required_objects.contains(&fk.parent_table), "{}", fk.label());
        }
        assert_eq!(plan.hub_satellites[0].max_per_hub, Some(2));
        assert!(plan.metrics.iter().all(|m| m.object == ADVANCED_STATS_VIEW));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        assert!(SHOOTING_SOFT.contains(1.5));
        assert!(SHOOTING_SOFT.contains(1.2));
        assert!(!SHOOTING_SOFT.contains(1.51));
        assert!(!SHOOTING_HARD.contains(5.0));
        assert!(!SHOOTING_HARD.contains(-0.1));
    }

    #[test]
    fn test_labels() {
        let fk = ForeignKey::new(("game", "season_id"), ("season", "season_id"));
        assert_eq!(fk.label(), "game.season_id->season.season_id");
        let hs = HubSatellite::new(("game", "game_id"), ("team_box_score", "game_id"), None);
        assert_eq!(hs.label(), "game<->team_box_score");
    }
}
