//! Ingestion jobs: one per CLI subcommand.
//!
//! Every job walks its units (a league, a team, a player, a month) one at a
//! time. A unit that fails is logged and counted, and the job moves on; only
//! failures outside unit handling abort the job. Each run is recorded in
//! `sl_sync_runs`.

pub mod espn_catalog;
pub mod espn_games;
pub mod espn_rosters;
pub mod espn_stats;
pub mod kbl;
pub mod kbo;
pub mod kleague;

use std::fmt;

use anyhow::{Context, Result, bail};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use clap::{Args, Subcommand};
use tracing::{error, info, warn};

use crate::config::{AppConfig, EspnConfig, EspnLeague};
use crate::ids::Namespace;
use crate::models::{League, Sport};
use crate::sources::{EspnApi, KblSite, KboSite, KleagueSite, NaverApi};
use crate::storage::{RunSummary, Store};
use crate::utils::{Timer, fmt_count};

// ── Job catalogue ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Job {
    /// Upsert the fixed sports catalogue
    EspnSports,

    /// League rows for every configured ESPN league
    EspnLeagues,

    /// Teams of the detail leagues
    EspnTeams(LeagueArgs),

    /// Current season and its team mapping per detail league
    EspnTeamSeasons(LeagueArgs),

    /// Teams and players from team rosters
    EspnRosters(LeagueArgs),

    /// Squad membership for the current season
    EspnSquads(LeagueArgs),

    /// Games from every team schedule
    EspnSchedules(LeagueArgs),

    /// Scoreboard results of the result leagues
    EspnResults(LeagueArgs),

    /// Season totals per rostered player
    EspnSeasonStats {
        #[command(flatten)]
        league: LeagueArgs,

        /// Single season instead of the configured list
        #[arg(long)]
        year: Option<i32>,
    },

    /// Per-game lines for the current season
    EspnGameStats(LeagueArgs),

    /// KBO schedule and results for one month (Naver)
    KboGames(MonthArgs),

    /// K League schedule and results for a month range (Naver)
    KleagueGames(MonthRangeArgs),

    /// KBO players from koreabaseball.com
    KboPlayers,

    /// Career and current-season hitting records for stored KBO hitters
    KboHitterStats,

    /// Career and current-season pitching records for stored KBO pitchers
    KboPitcherStats,

    /// K League players, season records and current squads
    KleaguePlayers,

    /// KBL teams, players and schedule
    Kbl {
        /// Season start year (default: inferred from today)
        #[arg(long)]
        year: Option<i32>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct LeagueArgs {
    /// ESPN league key or frontend slug (default: every configured league)
    #[arg(long)]
    pub league: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct MonthArgs {
    #[arg(long)]
    pub year: Option<i32>,

    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    pub month: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct MonthRangeArgs {
    #[arg(long)]
    pub year: Option<i32>,

    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..=12))]
    pub from_month: u32,

    #[arg(long, default_value_t = 11, value_parser = clap::value_parser!(u32).range(1..=12))]
    pub to_month: u32,
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::EspnSports => "espn-sports",
            Job::EspnLeagues => "espn-leagues",
            Job::EspnTeams(_) => "espn-teams",
            Job::EspnTeamSeasons(_) => "espn-team-seasons",
            Job::EspnRosters(_) => "espn-rosters",
            Job::EspnSquads(_) => "espn-squads",
            Job::EspnSchedules(_) => "espn-schedules",
            Job::EspnResults(_) => "espn-results",
            Job::EspnSeasonStats { .. } => "espn-season-stats",
            Job::EspnGameStats(_) => "espn-game-stats",
            Job::KboGames(_) => "kbo-games",
            Job::KleagueGames(_) => "kleague-games",
            Job::KboPlayers => "kbo-players",
            Job::KboHitterStats => "kbo-hitter-stats",
            Job::KboPitcherStats => "kbo-pitcher-stats",
            Job::KleaguePlayers => "kleague-players",
            Job::Kbl { .. } => "kbl",
        }
    }
}

// ── Stats ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStats {
    pub units: usize,
    pub rows: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl JobStats {
    pub fn rows(rows: usize) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    /// Log a failed unit and count it.
    pub fn fail(&mut self, unit: impl fmt::Display, err: impl Into<anyhow::Error>) {
        let err = err.into();
        warn!("{}: {:#}", unit, err);
        self.errors += 1;
    }

    /// Fold the outcome of one unit into the job totals.
    pub fn record(&mut self, unit: impl fmt::Display, outcome: Result<JobStats>) {
        self.units += 1;
        match outcome {
            Ok(s) => {
                self.rows += s.rows;
                self.skipped += s.skipped;
                self.errors += s.errors;
            }
            Err(e) => self.fail(unit, e),
        }
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            units: self.units as i64,
            rows: self.rows as i64,
            errors: self.errors as i64,
            error_msg: (self.errors > 0).then(|| format!("{} failed units", self.errors)),
        }
    }
}

impl fmt::Display for JobStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = |v: usize| fmt_count(v as u64);
        write!(
            f,
            "{} units | {} rows | {} skipped | {} errors",
            n(self.units),
            n(self.rows),
            n(self.skipped),
            n(self.errors)
        )
    }
}

// ── Runner ────────────────────────────────────────────────────────────────────

/// Run one job against `store`, bracketed by a `sl_sync_runs` entry.
pub async fn run(job: &Job, config: &AppConfig, store: &dyn Store) -> Result<JobStats> {
    let _t = Timer::start(job.name());
    let run_id = store
        .begin_run(job.name())
        .await
        .context("Failed to open sync run")?;

    let result = dispatch(job, config, store).await;

    let summary = match &result {
        Ok(stats) => {
            info!("{}: {}", job.name(), stats);
            stats.summary()
        }
        Err(e) => {
            error!("{} failed: {:#}", job.name(), e);
            RunSummary {
                errors: 1,
                error_msg: Some(format!("{e:#}")),
                ..Default::default()
            }
        }
    };
    if let Err(e) = store.finish_run(run_id, &summary).await {
        warn!("could not close sync run {}: {}", run_id, e);
    }
    result
}

async fn dispatch(job: &Job, config: &AppConfig, store: &dyn Store) -> Result<JobStats> {
    let espn = || EspnApi::new(&config.http, &config.espn).context("Failed to build ESPN client");
    let naver =
        || NaverApi::new(&config.http, &config.naver).context("Failed to build Naver client");

    match job {
        Job::EspnSports => espn_catalog::sync_sports(store).await,
        Job::EspnLeagues => {
            espn_catalog::sync_leagues(store, &espn()?, &config.espn.leagues).await
        }
        Job::EspnTeams(a) => {
            let leagues = detail_leagues(&config.espn, a)?;
            espn_catalog::sync_teams(store, &espn()?, &leagues).await
        }
        Job::EspnTeamSeasons(a) => {
            let leagues = detail_leagues(&config.espn, a)?;
            espn_catalog::sync_team_seasons(store, &espn()?, &leagues).await
        }
        Job::EspnRosters(a) => {
            let leagues = detail_leagues(&config.espn, a)?;
            espn_rosters::sync_rosters(store, &espn()?, &leagues).await
        }
        Job::EspnSquads(a) => {
            let leagues = detail_leagues(&config.espn, a)?;
            espn_rosters::sync_squads(store, &espn()?, &leagues).await
        }
        Job::EspnSchedules(a) => {
            let leagues = detail_leagues(&config.espn, a)?;
            espn_games::sync_schedules(store, &espn()?, &leagues).await
        }
        Job::EspnResults(a) => {
            let leagues = pick_leagues(&config.espn, a, |l| l.results)?;
            espn_games::sync_results(store, &espn()?, &leagues).await
        }
        Job::EspnSeasonStats { league, year } => {
            let leagues = detail_leagues(&config.espn, league)?;
            let years = match year {
                Some(y) => vec![*y],
                None => config.espn.season_years.clone(),
            };
            espn_stats::sync_season_stats(store, &espn()?, &leagues, &years).await
        }
        Job::EspnGameStats(a) => {
            let leagues = detail_leagues(&config.espn, a)?;
            espn_stats::sync_game_stats(store, &espn()?, &leagues).await
        }
        Job::KboGames(a) => {
            let today = kst_today();
            let year = a.year.unwrap_or(today.year());
            let month = a.month.unwrap_or(today.month());
            kbo::sync_games(store, &naver()?, year, month).await
        }
        Job::KleagueGames(a) => {
            if a.from_month > a.to_month {
                bail!("--from-month {} is after --to-month {}", a.from_month, a.to_month);
            }
            let year = a.year.unwrap_or(kst_today().year());
            kleague::sync_games(store, &naver()?, year, a.from_month..=a.to_month).await
        }
        Job::KboPlayers => {
            let site = KboSite::new(&config.http, &config.kbo)?;
            kbo::sync_players(store, &site, &config.kbo).await
        }
        Job::KboHitterStats => {
            let site = KboSite::new(&config.http, &config.kbo)?;
            kbo::sync_hitter_stats(store, &site).await
        }
        Job::KboPitcherStats => {
            let site = KboSite::new(&config.http, &config.kbo)?;
            kbo::sync_pitcher_stats(store, &site).await
        }
        Job::KleaguePlayers => {
            let site = KleagueSite::new(&config.http, &config.kleague)?;
            kleague::sync_players(store, &site, config.kleague.max_pages, kst_today().year())
                .await
        }
        Job::Kbl { year } => {
            let site = KblSite::new(&config.http, &config.kbl)?;
            let year = year.unwrap_or_else(|| kbl::season_start_year(kst_today()));
            kbl::sync_all(store, &site, year).await
        }
    }
}

fn detail_leagues(cfg: &EspnConfig, args: &LeagueArgs) -> Result<Vec<EspnLeague>> {
    pick_leagues(cfg, args, |l| l.detail)
}

/// `--league` picks one catalogue entry, otherwise every entry matching `default`.
fn pick_leagues(
    cfg: &EspnConfig,
    args: &LeagueArgs,
    default: impl Fn(&EspnLeague) -> bool,
) -> Result<Vec<EspnLeague>> {
    match &args.league {
        Some(name) => match cfg.find(name) {
            Some(l) => Ok(vec![l.clone()]),
            None => bail!("league {name:?} is not in the ESPN catalogue"),
        },
        None => Ok(cfg.leagues.iter().filter(|l| default(l)).cloned().collect()),
    }
}

// ── Shared catalogue helpers ──────────────────────────────────────────────────

pub const SPORTS: [(&str, &str); 12] = [
    ("Baseball", "baseball"),
    ("Basketball", "basketball"),
    ("Soccer", "soccer"),
    ("Football", "football"),
    ("Hockey", "hockey"),
    ("MMA", "mma"),
    ("Racing", "racing"),
    ("Golf", "golf"),
    ("Tennis", "tennis"),
    ("Boxing", "boxing"),
    ("Rugby", "rugby"),
    ("Cricket", "cricket"),
];

/// Sport id for `slug`, created with a catalogue (or capitalised) name when absent.
pub async fn ensure_sport(store: &dyn Store, slug: &str) -> Result<i64> {
    if let Some(id) = store.sport_id_by_slug(slug).await? {
        return Ok(id);
    }
    let name = SPORTS
        .iter()
        .find(|(_, s)| *s == slug)
        .map(|(n, _)| n.to_string())
        .unwrap_or_else(|| capitalize(slug));
    let sport = Sport {
        name,
        slug: slug.to_string(),
    };
    Ok(store.upsert_sport(&sport).await?)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A league that is not listed by ESPN and lives in a prefixed namespace.
#[derive(Debug, Clone, Copy)]
pub struct KoreanLeague {
    pub namespace: Namespace,
    pub slug: &'static str,
    pub name: &'static str,
    pub sport: &'static str,
}

pub const KBO_LEAGUE: KoreanLeague = KoreanLeague {
    namespace: Namespace::Kbo,
    slug: "kbo",
    name: "KBO League",
    sport: "baseball",
};

pub const KLEAGUE_LEAGUE: KoreanLeague = KoreanLeague {
    namespace: Namespace::Kleague,
    slug: "k-league",
    name: "K League 1",
    sport: "soccer",
};

pub const KBL_LEAGUE: KoreanLeague = KoreanLeague {
    namespace: Namespace::Kbl,
    slug: "kbl",
    name: "KBL",
    sport: "basketball",
};

impl KoreanLeague {
    pub fn id(&self) -> Result<i64> {
        Ok(self.namespace.from_key(self.slug)?)
    }

    /// Sport and league rows; returns the league id.
    pub async fn ensure(&self, store: &dyn Store) -> Result<i64> {
        let sport_id = ensure_sport(store, self.sport).await?;
        let id = self.id()?;
        let league = League {
            id,
            sport_id: Some(sport_id),
            name: Some(self.name.to_string()),
            slug: Some(self.slug.to_string()),
            country: Some("South Korea".to_string()),
            kind: Some("League".to_string()),
            ..Default::default()
        };
        store
            .upsert_league(&league)
            .await
            .with_context(|| format!("upsert league {}", self.slug))?;
        Ok(id)
    }
}

/// Today's date in Korea.
pub fn kst_today() -> NaiveDate {
    (Utc::now() + Duration::hours(9)).date_naive()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::ops::Range;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use crate::config::EspnLeague;
    use crate::error::{SourceError, StoreResult};
    use crate::models::{
        Extra, Game, League, Player, PlayerGameStat, PlayerSeasonStat, Season, Sport,
        SquadMembership, TableCounts, Team,
    };
    use crate::sources::espn::{
        AthleteRecord, AthleteSplits, CompetitorRecord, EventRecord, GamelogEntry, LeagueInfo,
        RosterPage, ScoreboardPage, TeamRecord, TeamsPage,
    };
    use crate::sources::naver::{NaverCategory, NaverGame, NaverSide};
    use crate::sources::{EspnSource, NaverSource};
    use crate::storage::{MemoryStore, RunSummary, Store};

    pub fn espn_league(sport: &str, key: &str) -> EspnLeague {
        EspnLeague {
            sport: sport.to_string(),
            key: key.to_string(),
            frontend_slug: None,
            detail: true,
            results: false,
        }
    }

    pub fn team(id: &str, name: &str) -> TeamRecord {
        TeamRecord {
            id: id.to_string(),
            name: Some(name.to_string()),
            abbreviation: Some(name.chars().take(3).collect::<String>().to_uppercase()),
            logo: None,
        }
    }

    pub fn athlete(id: &str, name: &str) -> AthleteRecord {
        AthleteRecord {
            id: id.to_string(),
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn event(id: &str, home: (&str, Option<i32>), away: (&str, Option<i32>)) -> EventRecord {
        EventRecord {
            id: id.to_string(),
            date: Some("2024-03-20T19:00Z".to_string()),
            status_name: Some("STATUS_FINAL".to_string()),
            status_detail: Some("FT".to_string()),
            venue: Some("Emirates Stadium".to_string()),
            home: Some(CompetitorRecord {
                team: team(home.0, &format!("Team {}", home.0)),
                score: home.1,
            }),
            away: Some(CompetitorRecord {
                team: team(away.0, &format!("Team {}", away.0)),
                score: away.1,
            }),
        }
    }

    /// Canned ESPN answers. Unknown keys fail like a 404 would.
    #[derive(Default)]
    pub struct FakeEspn {
        pub teams: TeamsPage,
        pub rosters: HashMap<String, RosterPage>,
        pub schedules: HashMap<String, Vec<EventRecord>>,
        pub scoreboard: ScoreboardPage,
        pub splits: HashMap<(String, i32), AthleteSplits>,
        pub gamelogs: HashMap<String, Vec<GamelogEntry>>,
    }

    impl FakeEspn {
        /// One league (id 23, season 2025) with the given teams.
        pub fn with_teams(teams: Vec<TeamRecord>) -> Self {
            Self {
                teams: TeamsPage {
                    league: Some(LeagueInfo {
                        id: "23".to_string(),
                        name: Some("English Premier League".to_string()),
                        abbreviation: Some("EPL".to_string()),
                        season_year: Some(2025),
                    }),
                    teams,
                },
                ..Default::default()
            }
        }
    }

    fn missing(what: &str, key: &str) -> SourceError {
        SourceError::Shape(format!("no {what} for {key}"))
    }

    #[async_trait]
    impl EspnSource for FakeEspn {
        async fn teams(&self, _: &EspnLeague, limit: u32) -> Result<TeamsPage, SourceError> {
            let mut page = self.teams.clone();
            page.teams.truncate(limit as usize);
            Ok(page)
        }

        async fn roster(&self, _: &EspnLeague, team_id: &str) -> Result<RosterPage, SourceError> {
            self.rosters
                .get(team_id)
                .cloned()
                .ok_or_else(|| missing("roster", team_id))
        }

        async fn schedule(
            &self,
            _: &EspnLeague,
            team_id: &str,
        ) -> Result<Vec<EventRecord>, SourceError> {
            self.schedules
                .get(team_id)
                .cloned()
                .ok_or_else(|| missing("schedule", team_id))
        }

        async fn scoreboard(&self, _: &EspnLeague) -> Result<ScoreboardPage, SourceError> {
            Ok(self.scoreboard.clone())
        }

        async fn splits(
            &self,
            _: &EspnLeague,
            athlete_id: &str,
            season: i32,
        ) -> Result<Option<AthleteSplits>, SourceError> {
            Ok(self.splits.get(&(athlete_id.to_string(), season)).cloned())
        }

        async fn gamelog(
            &self,
            _: &EspnLeague,
            athlete_id: &str,
            _season: i32,
        ) -> Result<Vec<GamelogEntry>, SourceError> {
            Ok(self.gamelogs.get(athlete_id).cloned().unwrap_or_default())
        }
    }

    /// Serves the same games for every window and records the windows asked for.
    #[derive(Default)]
    pub struct FakeNaver {
        pub games: Vec<NaverGame>,
        pub calls: Mutex<Vec<(NaverCategory, NaiveDate, NaiveDate)>>,
    }

    #[async_trait]
    impl NaverSource for FakeNaver {
        async fn games(
            &self,
            category: NaverCategory,
            from: NaiveDate,
            to: NaiveDate,
        ) -> Result<Vec<NaverGame>, SourceError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push((category, from, to));
            }
            Ok(self.games.clone())
        }
    }

    pub fn side(name: &str, score: Option<i32>) -> NaverSide {
        NaverSide {
            code: None,
            name: Some(name.to_string()),
            score,
            emblem_url: None,
        }
    }

    /// `MemoryStore` that also counts calls per `Store` method, so tests can
    /// check how many batches a unit writes.
    #[derive(Default)]
    pub struct CountingStore {
        pub inner: MemoryStore,
        calls: Mutex<HashMap<&'static str, usize>>,
    }

    impl CountingStore {
        fn hit(&self, method: &'static str) {
            if let Ok(mut calls) = self.calls.lock() {
                *calls.entry(method).or_default() += 1;
            }
        }

        pub fn calls(&self, method: &str) -> usize {
            self.calls
                .lock()
                .map(|c| c.get(method).copied().unwrap_or_default())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl Store for CountingStore {
        async fn upsert_sport(&self, sport: &Sport) -> StoreResult<i64> {
            self.hit("upsert_sport");
            self.inner.upsert_sport(sport).await
        }

        async fn sport_id_by_slug(&self, slug: &str) -> StoreResult<Option<i64>> {
            self.inner.sport_id_by_slug(slug).await
        }

        async fn upsert_league(&self, league: &League) -> StoreResult<()> {
            self.hit("upsert_league");
            self.inner.upsert_league(league).await
        }

        async fn league_by_slug(&self, slug: &str) -> StoreResult<Option<League>> {
            self.inner.league_by_slug(slug).await
        }

        async fn ensure_season(
            &self,
            league_id: i64,
            year: i32,
            is_current: bool,
        ) -> StoreResult<i64> {
            self.hit("ensure_season");
            self.inner.ensure_season(league_id, year, is_current).await
        }

        async fn current_season(&self, league_id: i64) -> StoreResult<Option<Season>> {
            self.inner.current_season(league_id).await
        }

        async fn upsert_teams(&self, teams: &[Team]) -> StoreResult<usize> {
            self.hit("upsert_teams");
            self.inner.upsert_teams(teams).await
        }

        async fn ensure_teams(&self, teams: &[Team]) -> StoreResult<usize> {
            self.hit("ensure_teams");
            self.inner.ensure_teams(teams).await
        }

        async fn map_team_seasons(&self, pairs: &[(i64, i64)]) -> StoreResult<usize> {
            self.hit("map_team_seasons");
            self.inner.map_team_seasons(pairs).await
        }

        async fn upsert_players(&self, players: &[Player]) -> StoreResult<usize> {
            self.hit("upsert_players");
            self.inner.upsert_players(players).await
        }

        async fn ensure_players(&self, players: &[Player]) -> StoreResult<usize> {
            self.hit("ensure_players");
            self.inner.ensure_players(players).await
        }

        async fn upsert_squads(&self, rows: &[SquadMembership]) -> StoreResult<usize> {
            self.hit("upsert_squads");
            self.inner.upsert_squads(rows).await
        }

        async fn players_by_position(
            &self,
            range: Range<i64>,
            patterns: &[&str],
        ) -> StoreResult<Vec<(i64, String)>> {
            self.inner.players_by_position(range, patterns).await
        }

        async fn upsert_games(&self, games: &[Game]) -> StoreResult<usize> {
            self.hit("upsert_games");
            self.inner.upsert_games(games).await
        }

        async fn ensure_games(&self, games: &[Game]) -> StoreResult<usize> {
            self.hit("ensure_games");
            self.inner.ensure_games(games).await
        }

        async fn upsert_season_stats(&self, rows: &[PlayerSeasonStat]) -> StoreResult<usize> {
            self.hit("upsert_season_stats");
            self.inner.upsert_season_stats(rows).await
        }

        async fn patch_season_stats(
            &self,
            player_id: i64,
            season_id: i64,
            patch: &Extra,
        ) -> StoreResult<u64> {
            self.hit("patch_season_stats");
            self.inner.patch_season_stats(player_id, season_id, patch).await
        }

        async fn upsert_game_stats(&self, rows: &[PlayerGameStat]) -> StoreResult<usize> {
            self.hit("upsert_game_stats");
            self.inner.upsert_game_stats(rows).await
        }

        async fn begin_run(&self, job: &str) -> StoreResult<i64> {
            self.inner.begin_run(job).await
        }

        async fn finish_run(&self, run_id: i64, summary: &RunSummary) -> StoreResult<()> {
            self.inner.finish_run(run_id, summary).await
        }

        async fn counts(&self) -> StoreResult<TableCounts> {
            self.inner.counts().await
        }
    }
}
