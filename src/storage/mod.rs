pub mod memory;
pub mod merge;
pub mod postgres;

use std::ops::Range;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::models::{
    Extra, Game, League, Player, PlayerGameStat, PlayerSeasonStat, Season, Sport, SquadMembership,
    TableCounts, Team,
};

pub use memory::{MemoryStore, RunRecord};
pub use postgres::PgStore;

/// Outcome recorded on a `sl_sync_runs` row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub units: i64,
    pub rows: i64,
    pub errors: i64,
    pub error_msg: Option<String>,
}

/// Merge-upsert persistence for every ingestion job.
///
/// `upsert_*` calls write one batch in one transaction and merge into
/// existing rows. `ensure_*` calls only insert rows that are absent and
/// never touch existing ones; jobs use them to close foreign-key gaps
/// before writing dependent rows. Batch calls return the number of rows
/// submitted.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Catalogue ─────────────────────────────────────────────────────────────

    /// Insert or refresh a sport keyed by name; returns its id.
    async fn upsert_sport(&self, sport: &Sport) -> StoreResult<i64>;

    async fn sport_id_by_slug(&self, slug: &str) -> StoreResult<Option<i64>>;

    async fn upsert_league(&self, league: &League) -> StoreResult<()>;

    async fn league_by_slug(&self, slug: &str) -> StoreResult<Option<League>>;

    /// Season id for (league, year), created when missing. `is_current`
    /// only ever turns a season current, never back.
    async fn ensure_season(&self, league_id: i64, year: i32, is_current: bool)
    -> StoreResult<i64>;

    /// The season flagged current, else the latest year.
    async fn current_season(&self, league_id: i64) -> StoreResult<Option<Season>>;

    // ── Teams & players ───────────────────────────────────────────────────────

    async fn upsert_teams(&self, teams: &[Team]) -> StoreResult<usize>;

    async fn ensure_teams(&self, teams: &[Team]) -> StoreResult<usize>;

    /// (team_id, season_id) pairs.
    async fn map_team_seasons(&self, pairs: &[(i64, i64)]) -> StoreResult<usize>;

    async fn upsert_players(&self, players: &[Player]) -> StoreResult<usize>;

    async fn ensure_players(&self, players: &[Player]) -> StoreResult<usize>;

    async fn upsert_squads(&self, rows: &[SquadMembership]) -> StoreResult<usize>;

    /// Players with ids in `range` whose `biometrics.position` matches any of
    /// the SQL `LIKE` patterns, as (id, name) ordered by id.
    async fn players_by_position(
        &self,
        range: Range<i64>,
        patterns: &[&str],
    ) -> StoreResult<Vec<(i64, String)>>;

    // ── Games & stats ─────────────────────────────────────────────────────────

    async fn upsert_games(&self, games: &[Game]) -> StoreResult<usize>;

    async fn ensure_games(&self, games: &[Game]) -> StoreResult<usize>;

    async fn upsert_season_stats(&self, rows: &[PlayerSeasonStat]) -> StoreResult<usize>;

    /// Merge `patch` into every stats row of (player, season), whatever the
    /// team. Returns the number of rows touched.
    async fn patch_season_stats(
        &self,
        player_id: i64,
        season_id: i64,
        patch: &Extra,
    ) -> StoreResult<u64>;

    async fn upsert_game_stats(&self, rows: &[PlayerGameStat]) -> StoreResult<usize>;

    // ── Bookkeeping ───────────────────────────────────────────────────────────

    async fn begin_run(&self, job: &str) -> StoreResult<i64>;

    async fn finish_run(&self, run_id: i64, summary: &RunSummary) -> StoreResult<()>;

    async fn counts(&self) -> StoreResult<TableCounts>;
}
