use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form JSON attributes merged key-wise on update.
pub type Extra = Map<String, Value>;

/// Insert `key` only when a value is known, so absent stays absent.
pub fn put<V: Into<Value>>(extra: &mut Extra, key: &str, value: Option<V>) {
    if let Some(v) = value {
        extra.insert(key.to_string(), v.into());
    }
}

// ── Catalogue ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sport {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct League {
    pub id: i64,
    pub sport_id: Option<i64>,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub abbreviation: Option<String>,
    pub country: Option<String>,
    pub kind: Option<String>,
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Season {
    pub id: i64,
    pub league_id: i64,
    pub year: i32,
    pub is_current: bool,
}

// ── Teams & players ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Team {
    pub id: i64,
    pub name: Option<String>,
    pub code: Option<String>,
    pub logo_url: Option<String>,
    pub extra: Extra,
}

impl Team {
    /// Minimal row used to satisfy a foreign key.
    pub fn placeholder(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub id: i64,
    pub name: Option<String>,
    pub lastname: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub height_cm: Option<i32>,
    pub weight_kg: Option<i32>,
    pub nationality: Option<String>,
    pub photo_url: Option<String>,
    pub biometrics: Extra,
}

impl Player {
    pub fn placeholder(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SquadMembership {
    pub player_id: i64,
    pub team_id: i64,
    pub season_id: i64,
    pub position: Option<String>,
    pub jersey_number: Option<i32>,
    pub is_active: bool,
}

// ── Games ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
    Cancelled,
    Postponed,
    Unknown,
}

impl GameStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Scheduled => "STATUS_SCHEDULED",
            GameStatus::InProgress => "STATUS_IN_PROGRESS",
            GameStatus::Final => "STATUS_FINAL",
            GameStatus::Cancelled => "STATUS_CANCELLED",
            GameStatus::Postponed => "STATUS_POSTPONED",
            GameStatus::Unknown => "STATUS_UNKNOWN",
        }
    }
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Game {
    pub id: i64,
    pub season_id: Option<i64>,
    pub league_id: Option<i64>,
    pub home_team_id: Option<i64>,
    pub away_team_id: Option<i64>,
    pub game_date: Option<DateTime<Utc>>,
    pub status: Option<GameStatus>,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub score_detail: Extra,
}

// ── Stats ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerSeasonStat {
    pub player_id: i64,
    pub season_id: i64,
    pub team_id: i64,
    pub stats: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerGameStat {
    pub game_id: i64,
    pub player_id: i64,
    pub team_id: Option<i64>,
    pub minutes_played: Option<f64>,
    pub rating: Option<f64>,
    pub stats: Extra,
}

// ── Bookkeeping ───────────────────────────────────────────────────────────────

/// Row counts reported by `stats` and `--dry-run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub sports: i64,
    pub leagues: i64,
    pub seasons: i64,
    pub teams: i64,
    pub players: i64,
    pub squads: i64,
    pub games: i64,
    pub season_stats: i64,
    pub game_stats: i64,
}

impl TableCounts {
    pub fn rows(&self) -> [(&'static str, i64); 9] {
        [
            ("Sports", self.sports),
            ("Leagues", self.leagues),
            ("Seasons", self.seasons),
            ("Teams", self.teams),
            ("Players", self.players),
            ("Squads", self.squads),
            ("Games", self.games),
            ("Season stats", self.season_stats),
            ("Game stats", self.game_stats),
        ]
    }
}
