use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::merge::{Merge, merge_json};
use super::{RunSummary, Store};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Extra, Game, League, Player, PlayerGameStat, PlayerSeasonStat, Season, Sport, SquadMembership,
    TableCounts, Team,
};

/// In-process store with the same merge rules and foreign keys as the
/// Postgres schema. Backs `--dry-run` and the tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    sports: BTreeMap<String, (i64, Sport)>,
    leagues: BTreeMap<i64, League>,
    seasons: BTreeMap<(i64, i32), Season>,
    teams: BTreeMap<i64, Team>,
    team_seasons: BTreeMap<(i64, i64), ()>,
    players: BTreeMap<i64, Player>,
    squads: BTreeMap<(i64, i64, i64), SquadMembership>,
    games: BTreeMap<i64, Game>,
    season_stats: BTreeMap<(i64, i64, i64), PlayerSeasonStat>,
    game_stats: BTreeMap<(i64, i64), PlayerGameStat>,
    runs: BTreeMap<i64, RunRecord>,
    next_sport: i64,
    next_season: i64,
    next_run: i64,
}

/// One `sl_sync_runs` entry as kept in memory.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub job: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: Option<RunSummary>,
}

impl RunRecord {
    /// Wall time between opening and closing the run.
    pub fn took(&self) -> Option<std::time::Duration> {
        self.finished_at
            .and_then(|end| (end - self.started_at).to_std().ok())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run log in the order runs were opened.
    pub fn runs(&self) -> StoreResult<Vec<RunRecord>> {
        Ok(self.tables()?.runs.values().cloned().collect())
    }

    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn fk(ok: bool, table: &'static str, column: &'static str, key: i64) -> StoreResult<()> {
    if ok {
        Ok(())
    } else {
        Err(StoreError::ForeignKey { table, column, key })
    }
}

impl Tables {
    fn season_exists(&self, id: i64) -> bool {
        self.seasons.values().any(|s| s.id == id)
    }

    fn sport_exists(&self, id: i64) -> bool {
        self.sports.values().any(|(sid, _)| *sid == id)
    }

    fn check_game(&self, g: &Game) -> StoreResult<()> {
        if let Some(id) = g.league_id {
            fk(self.leagues.contains_key(&id), "sl_games", "league_id", id)?;
        }
        if let Some(id) = g.season_id {
            fk(self.season_exists(id), "sl_games", "season_id", id)?;
        }
        for id in [g.home_team_id, g.away_team_id].into_iter().flatten() {
            fk(self.teams.contains_key(&id), "sl_games", "team_id", id)?;
        }
        Ok(())
    }
}

/// SQL `LIKE` with `%` and `_`.
fn like(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    // dp[j]: pattern prefix of length i matches text prefix of length j
    let mut dp = vec![false; t.len() + 1];
    dp[0] = true;
    for pc in p {
        let mut next = vec![false; t.len() + 1];
        match pc {
            '%' => {
                let mut seen = false;
                for j in 0..=t.len() {
                    seen |= dp[j];
                    next[j] = seen;
                }
            }
            _ => {
                for j in 1..=t.len() {
                    next[j] = dp[j - 1] && (pc == '_' || pc == t[j - 1]);
                }
            }
        }
        dp = next;
    }
    dp[t.len()]
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_sport(&self, sport: &Sport) -> StoreResult<i64> {
        let mut t = self.tables()?;
        if let Some((id, stored)) = t.sports.get_mut(&sport.name) {
            stored.slug = sport.slug.clone();
            return Ok(*id);
        }
        t.next_sport += 1;
        let id = t.next_sport;
        t.sports.insert(sport.name.clone(), (id, sport.clone()));
        Ok(id)
    }

    async fn sport_id_by_slug(&self, slug: &str) -> StoreResult<Option<i64>> {
        let t = self.tables()?;
        Ok(t.sports
            .values()
            .find(|(_, s)| s.slug == slug)
            .map(|(id, _)| *id))
    }

    async fn upsert_league(&self, league: &League) -> StoreResult<()> {
        let mut t = self.tables()?;
        if let Some(id) = league.sport_id {
            fk(t.sport_exists(id), "sl_leagues", "sport_id", id)?;
        }
        t.leagues
            .entry(league.id)
            .and_modify(|stored| stored.merge(league.clone()))
            .or_insert_with(|| league.clone());
        Ok(())
    }

    async fn league_by_slug(&self, slug: &str) -> StoreResult<Option<League>> {
        let t = self.tables()?;
        Ok(t.leagues
            .values()
            .find(|l| l.slug.as_deref() == Some(slug))
            .cloned())
    }

    async fn ensure_season(
        &self,
        league_id: i64,
        year: i32,
        is_current: bool,
    ) -> StoreResult<i64> {
        let mut t = self.tables()?;
        fk(t.leagues.contains_key(&league_id), "sl_seasons", "league_id", league_id)?;
        if let Some(season) = t.seasons.get_mut(&(league_id, year)) {
            season.is_current |= is_current;
            return Ok(season.id);
        }
        t.next_season += 1;
        let id = t.next_season;
        t.seasons.insert(
            (league_id, year),
            Season { id, league_id, year, is_current },
        );
        Ok(id)
    }

    async fn current_season(&self, league_id: i64) -> StoreResult<Option<Season>> {
        let t = self.tables()?;
        Ok(t.seasons
            .values()
            .filter(|s| s.league_id == league_id)
            .max_by_key(|s| (s.is_current, s.year))
            .cloned())
    }

    async fn upsert_teams(&self, teams: &[Team]) -> StoreResult<usize> {
        let mut t = self.tables()?;
        for team in teams {
            t.teams
                .entry(team.id)
                .and_modify(|stored| stored.merge(team.clone()))
                .or_insert_with(|| team.clone());
        }
        Ok(teams.len())
    }

    async fn ensure_teams(&self, teams: &[Team]) -> StoreResult<usize> {
        let mut t = self.tables()?;
        for team in teams {
            t.teams.entry(team.id).or_insert_with(|| team.clone());
        }
        Ok(teams.len())
    }

    async fn map_team_seasons(&self, pairs: &[(i64, i64)]) -> StoreResult<usize> {
        let mut t = self.tables()?;
        for &(team_id, season_id) in pairs {
            fk(t.teams.contains_key(&team_id), "sl_team_season_map", "team_id", team_id)?;
            fk(t.season_exists(season_id), "sl_team_season_map", "season_id", season_id)?;
        }
        for &pair in pairs {
            t.team_seasons.insert(pair, ());
        }
        Ok(pairs.len())
    }

    async fn upsert_players(&self, players: &[Player]) -> StoreResult<usize> {
        let mut t = self.tables()?;
        for p in players {
            t.players
                .entry(p.id)
                .and_modify(|stored| stored.merge(p.clone()))
                .or_insert_with(|| p.clone());
        }
        Ok(players.len())
    }

    async fn ensure_players(&self, players: &[Player]) -> StoreResult<usize> {
        let mut t = self.tables()?;
        for p in players {
            t.players.entry(p.id).or_insert_with(|| p.clone());
        }
        Ok(players.len())
    }

    async fn upsert_squads(&self, rows: &[SquadMembership]) -> StoreResult<usize> {
        let mut t = self.tables()?;
        for r in rows {
            fk(t.players.contains_key(&r.player_id), "sl_player_squads", "player_id", r.player_id)?;
            fk(t.teams.contains_key(&r.team_id), "sl_player_squads", "team_id", r.team_id)?;
            fk(t.season_exists(r.season_id), "sl_player_squads", "season_id", r.season_id)?;
        }
        for r in rows {
            let key = (r.player_id, r.team_id, r.season_id);
            t.squads
                .entry(key)
                .and_modify(|stored| stored.merge(r.clone()))
                .or_insert_with(|| r.clone());
        }
        Ok(rows.len())
    }

    async fn players_by_position(
        &self,
        range: Range<i64>,
        patterns: &[&str],
    ) -> StoreResult<Vec<(i64, String)>> {
        let t = self.tables()?;
        Ok(t.players
            .range(range)
            .filter(|(_, p)| {
                p.biometrics
                    .get("position")
                    .and_then(|v| v.as_str())
                    .is_some_and(|pos| patterns.iter().any(|pat| like(pat, pos)))
            })
            .map(|(id, p)| (*id, p.name.clone().unwrap_or_default()))
            .collect())
    }

    async fn upsert_games(&self, games: &[Game]) -> StoreResult<usize> {
        let mut t = self.tables()?;
        for g in games {
            t.check_game(g)?;
        }
        for g in games {
            t.games
                .entry(g.id)
                .and_modify(|stored| stored.merge(g.clone()))
                .or_insert_with(|| g.clone());
        }
        Ok(games.len())
    }

    async fn ensure_games(&self, games: &[Game]) -> StoreResult<usize> {
        let mut t = self.tables()?;
        for g in games {
            if !t.games.contains_key(&g.id) {
                t.check_game(g)?;
            }
        }
        for g in games {
            t.games.entry(g.id).or_insert_with(|| g.clone());
        }
        Ok(games.len())
    }

    async fn upsert_season_stats(&self, rows: &[PlayerSeasonStat]) -> StoreResult<usize> {
        let mut t = self.tables()?;
        for r in rows {
            let table = "sl_player_season_stats";
            fk(t.players.contains_key(&r.player_id), table, "player_id", r.player_id)?;
            fk(t.season_exists(r.season_id), table, "season_id", r.season_id)?;
            fk(t.teams.contains_key(&r.team_id), table, "team_id", r.team_id)?;
        }
        for r in rows {
            let key = (r.player_id, r.season_id, r.team_id);
            t.season_stats
                .entry(key)
                .and_modify(|stored| stored.merge(r.clone()))
                .or_insert_with(|| r.clone());
        }
        Ok(rows.len())
    }

    async fn patch_season_stats(
        &self,
        player_id: i64,
        season_id: i64,
        patch: &Extra,
    ) -> StoreResult<u64> {
        let mut t = self.tables()?;
        let mut touched = 0;
        for row in t
            .season_stats
            .values_mut()
            .filter(|r| r.player_id == player_id && r.season_id == season_id)
        {
            merge_json(&mut row.stats, patch.clone());
            touched += 1;
        }
        Ok(touched)
    }

    async fn upsert_game_stats(&self, rows: &[PlayerGameStat]) -> StoreResult<usize> {
        let mut t = self.tables()?;
        for r in rows {
            let table = "sl_player_game_stats";
            fk(t.games.contains_key(&r.game_id), table, "game_id", r.game_id)?;
            fk(t.players.contains_key(&r.player_id), table, "player_id", r.player_id)?;
            if let Some(id) = r.team_id {
                fk(t.teams.contains_key(&id), table, "team_id", id)?;
            }
        }
        for r in rows {
            let key = (r.game_id, r.player_id);
            t.game_stats
                .entry(key)
                .and_modify(|stored| stored.merge(r.clone()))
                .or_insert_with(|| r.clone());
        }
        Ok(rows.len())
    }

    async fn begin_run(&self, job: &str) -> StoreResult<i64> {
        let mut t = self.tables()?;
        t.next_run += 1;
        let id = t.next_run;
        t.runs.insert(
            id,
            RunRecord {
                id,
                job: job.to_string(),
                started_at: Utc::now(),
                finished_at: None,
                summary: None,
            },
        );
        Ok(id)
    }

    async fn finish_run(&self, run_id: i64, summary: &RunSummary) -> StoreResult<()> {
        let mut t = self.tables()?;
        let run = t.runs.get_mut(&run_id).ok_or_else(|| StoreError::NotFound {
            table: "sl_sync_runs",
            key: run_id.to_string(),
        })?;
        run.finished_at = Some(Utc::now());
        run.summary = Some(summary.clone());
        Ok(())
    }

    async fn counts(&self) -> StoreResult<TableCounts> {
        let t = self.tables()?;
        Ok(TableCounts {
            sports: t.sports.len() as i64,
            leagues: t.leagues.len() as i64,
            seasons: t.seasons.len() as i64,
            teams: t.teams.len() as i64,
            players: t.players.len() as i64,
            squads: t.squads.len() as i64,
            games: t.games.len() as i64,
            season_stats: t.season_stats.len() as i64,
            game_stats: t.game_stats.len() as i64,
        })
    }
}

#[cfg(test)]
impl MemoryStore {
    pub fn team(&self, id: i64) -> Option<Team> {
        self.tables().ok()?.teams.get(&id).cloned()
    }

    pub fn player(&self, id: i64) -> Option<Player> {
        self.tables().ok()?.players.get(&id).cloned()
    }

    pub fn game(&self, id: i64) -> Option<Game> {
        self.tables().ok()?.games.get(&id).cloned()
    }

    pub fn league(&self, id: i64) -> Option<League> {
        self.tables().ok()?.leagues.get(&id).cloned()
    }

    pub fn season_stats_of(&self, player_id: i64) -> Vec<PlayerSeasonStat> {
        self.tables()
            .map(|t| {
                t.season_stats
                    .values()
                    .filter(|r| r.player_id == player_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn game_stats_of(&self, player_id: i64) -> Vec<PlayerGameStat> {
        self.tables()
            .map(|t| {
                t.game_stats
                    .values()
                    .filter(|r| r.player_id == player_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn squads_of(&self, player_id: i64) -> Vec<SquadMembership> {
        self.tables()
            .map(|t| {
                t.squads
                    .values()
                    .filter(|r| r.player_id == player_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn team_season_pairs(&self) -> Vec<(i64, i64)> {
        self.tables()
            .map(|t| t.team_seasons.keys().copied().collect())
            .unwrap_or_default()
    }
}
