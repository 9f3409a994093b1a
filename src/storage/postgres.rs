use std::ops::Range;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::{debug, info};

use super::{RunSummary, Store};
use crate::config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Extra, Game, League, Player, PlayerGameStat, PlayerSeasonStat, Season, Sport, SquadMembership,
    TableCounts, Team,
};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS sl_sports (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    slug        TEXT,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS sl_leagues (
    id            BIGINT PRIMARY KEY,
    sport_id      BIGINT REFERENCES sl_sports (id),
    name          TEXT,
    slug          TEXT,
    abbreviation  TEXT,
    country       TEXT,
    kind          TEXT,
    extra         JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS sl_seasons (
    id          BIGSERIAL PRIMARY KEY,
    league_id   BIGINT NOT NULL REFERENCES sl_leagues (id),
    year        INTEGER NOT NULL,
    is_current  BOOLEAN NOT NULL DEFAULT FALSE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (league_id, year)
);

CREATE TABLE IF NOT EXISTS sl_teams (
    id          BIGINT PRIMARY KEY,
    name        TEXT,
    code        TEXT,
    logo_url    TEXT,
    extra       JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS sl_team_season_map (
    team_id     BIGINT NOT NULL REFERENCES sl_teams (id),
    season_id   BIGINT NOT NULL REFERENCES sl_seasons (id),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (team_id, season_id)
);

CREATE TABLE IF NOT EXISTS sl_players (
    id           BIGINT PRIMARY KEY,
    name         TEXT,
    lastname     TEXT,
    birth_date   DATE,
    height_cm    INTEGER,
    weight_kg    INTEGER,
    nationality  TEXT,
    photo_url    TEXT,
    biometrics   JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS sl_player_squads (
    player_id      BIGINT NOT NULL REFERENCES sl_players (id),
    team_id        BIGINT NOT NULL REFERENCES sl_teams (id),
    season_id      BIGINT NOT NULL REFERENCES sl_seasons (id),
    position       TEXT,
    jersey_number  INTEGER,
    is_active      BOOLEAN NOT NULL DEFAULT TRUE,
    created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (player_id, team_id, season_id)
);

CREATE TABLE IF NOT EXISTS sl_games (
    id             BIGINT PRIMARY KEY,
    season_id      BIGINT REFERENCES sl_seasons (id),
    league_id      BIGINT REFERENCES sl_leagues (id),
    home_team_id   BIGINT REFERENCES sl_teams (id),
    away_team_id   BIGINT REFERENCES sl_teams (id),
    game_date      TIMESTAMPTZ,
    status         TEXT,
    home_score     INTEGER,
    away_score     INTEGER,
    score_detail   JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS sl_player_season_stats (
    player_id   BIGINT NOT NULL REFERENCES sl_players (id),
    season_id   BIGINT NOT NULL REFERENCES sl_seasons (id),
    team_id     BIGINT NOT NULL REFERENCES sl_teams (id),
    stats       JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (player_id, season_id, team_id)
);

CREATE TABLE IF NOT EXISTS sl_player_game_stats (
    game_id         BIGINT NOT NULL REFERENCES sl_games (id),
    player_id       BIGINT NOT NULL REFERENCES sl_players (id),
    team_id         BIGINT REFERENCES sl_teams (id),
    minutes_played  DOUBLE PRECISION,
    rating          DOUBLE PRECISION,
    stats           JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (game_id, player_id)
);

CREATE TABLE IF NOT EXISTS sl_sync_runs (
    id            BIGSERIAL PRIMARY KEY,
    job           TEXT NOT NULL,
    started_at    TIMESTAMPTZ NOT NULL,
    finished_at   TIMESTAMPTZ,
    status        TEXT NOT NULL DEFAULT 'running',
    units         BIGINT NOT NULL DEFAULT 0,
    rows_written  BIGINT NOT NULL DEFAULT 0,
    errors        BIGINT NOT NULL DEFAULT 0,
    error_msg     TEXT
);

CREATE TABLE IF NOT EXISTS sl_schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMPTZ NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_leagues_slug     ON sl_leagues (slug);
CREATE INDEX IF NOT EXISTS idx_games_season     ON sl_games (season_id);
CREATE INDEX IF NOT EXISTS idx_games_date       ON sl_games (game_date);
CREATE INDEX IF NOT EXISTS idx_players_position ON sl_players ((biometrics->>'position'));
"#;

const COUNTED: [&str; 9] = [
    "sl_sports",
    "sl_leagues",
    "sl_seasons",
    "sl_teams",
    "sl_players",
    "sl_player_squads",
    "sl_games",
    "sl_player_season_stats",
    "sl_player_game_stats",
];

// ── Store ─────────────────────────────────────────────────────────────────────

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(Duration::from_secs(cfg.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(600))
            .connect(&cfg.url())
            .await
            .with_context(|| format!("Failed to connect to Postgres at {}", cfg.redacted()))?;
        info!("connected to {}", cfg.redacted());
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        sqlx::raw_sql(DDL)
            .execute(&self.pool)
            .await
            .context("DDL failed")?;
        sqlx::raw_sql(INDEXES)
            .execute(&self.pool)
            .await
            .context("Index creation failed")?;
        sqlx::query(
            "INSERT INTO sl_schema_version (version, applied_at) VALUES (1, NOW())
             ON CONFLICT (version) DO NOTHING",
        )
        .execute(&self.pool)
        .await?;
        info!("Migrations done.");
        Ok(())
    }
}

fn json(extra: &Extra) -> Json<&Extra> {
    Json(extra)
}

// Conflict clauses follow `storage::merge`: `COALESCE(excluded.x, t.x)` is
// `keep`, `COALESCE(t.j, '{}') || COALESCE(excluded.j, '{}')` is `merge_json`.
// `test_merge_matches_memory_store` checks both against a live database.
#[async_trait]
impl Store for PgStore {
    async fn upsert_sport(&self, sport: &Sport) -> StoreResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO sl_sports (name, slug, created_at, updated_at)
               VALUES ($1, $2, NOW(), NOW())
               ON CONFLICT (name) DO UPDATE SET
                   slug = COALESCE(excluded.slug, sl_sports.slug),
                   updated_at = NOW()
               RETURNING id"#,
        )
        .bind(&sport.name)
        .bind(&sport.slug)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn sport_id_by_slug(&self, slug: &str) -> StoreResult<Option<i64>> {
        let id = sqlx::query_scalar("SELECT id FROM sl_sports WHERE slug = $1 ORDER BY id LIMIT 1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn upsert_league(&self, l: &League) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO sl_leagues
                   (id, sport_id, name, slug, abbreviation, country, kind, extra, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
               ON CONFLICT (id) DO UPDATE SET
                   sport_id     = COALESCE(excluded.sport_id,     sl_leagues.sport_id),
                   name         = COALESCE(excluded.name,         sl_leagues.name),
                   slug         = COALESCE(excluded.slug,         sl_leagues.slug),
                   abbreviation = COALESCE(excluded.abbreviation, sl_leagues.abbreviation),
                   country      = COALESCE(excluded.country,      sl_leagues.country),
                   kind         = COALESCE(excluded.kind,         sl_leagues.kind),
                   extra        = COALESCE(sl_leagues.extra, '{}'::jsonb) || COALESCE(excluded.extra, '{}'::jsonb),
                   updated_at   = NOW()"#,
        )
        .bind(l.id)
        .bind(l.sport_id)
        .bind(&l.name)
        .bind(&l.slug)
        .bind(&l.abbreviation)
        .bind(&l.country)
        .bind(&l.kind)
        .bind(json(&l.extra))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn league_by_slug(&self, slug: &str) -> StoreResult<Option<League>> {
        let row = sqlx::query(
            r#"SELECT id, sport_id, name, slug, abbreviation, country, kind, extra
               FROM sl_leagues WHERE slug = $1 ORDER BY id LIMIT 1"#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        let Some(r) = row else { return Ok(None) };
        let extra: Json<Extra> = r.try_get("extra")?;
        Ok(Some(League {
            id: r.try_get("id")?,
            sport_id: r.try_get("sport_id")?,
            name: r.try_get("name")?,
            slug: r.try_get("slug")?,
            abbreviation: r.try_get("abbreviation")?,
            country: r.try_get("country")?,
            kind: r.try_get("kind")?,
            extra: extra.0,
        }))
    }

    async fn ensure_season(
        &self,
        league_id: i64,
        year: i32,
        is_current: bool,
    ) -> StoreResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO sl_seasons (league_id, year, is_current, created_at, updated_at)
               VALUES ($1, $2, $3, NOW(), NOW())
               ON CONFLICT (league_id, year) DO UPDATE SET
                   is_current = sl_seasons.is_current OR excluded.is_current,
                   updated_at = NOW()
               RETURNING id"#,
        )
        .bind(league_id)
        .bind(year)
        .bind(is_current)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn current_season(&self, league_id: i64) -> StoreResult<Option<Season>> {
        let row = sqlx::query(
            r#"SELECT id, league_id, year, is_current FROM sl_seasons
               WHERE league_id = $1
               ORDER BY is_current DESC, year DESC LIMIT 1"#,
        )
        .bind(league_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| -> StoreResult<Season> {
            Ok(Season {
                id: r.try_get("id")?,
                league_id: r.try_get("league_id")?,
                year: r.try_get("year")?,
                is_current: r.try_get("is_current")?,
            })
        })
        .transpose()
    }

    async fn upsert_teams(&self, teams: &[Team]) -> StoreResult<usize> {
        if teams.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for t in teams {
            sqlx::query(
                r#"INSERT INTO sl_teams (id, name, code, logo_url, extra, created_at, updated_at)
                   VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
                   ON CONFLICT (id) DO UPDATE SET
                       name       = COALESCE(excluded.name,     sl_teams.name),
                       code       = COALESCE(excluded.code,     sl_teams.code),
                       logo_url   = COALESCE(excluded.logo_url, sl_teams.logo_url),
                       extra      = COALESCE(sl_teams.extra, '{}'::jsonb) || COALESCE(excluded.extra, '{}'::jsonb),
                       updated_at = NOW()"#,
            )
            .bind(t.id)
            .bind(&t.name)
            .bind(&t.code)
            .bind(&t.logo_url)
            .bind(json(&t.extra))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!("upserted {} teams", teams.len());
        Ok(teams.len())
    }

    async fn ensure_teams(&self, teams: &[Team]) -> StoreResult<usize> {
        if teams.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for t in teams {
            sqlx::query(
                r#"INSERT INTO sl_teams (id, name, code, logo_url, extra, created_at, updated_at)
                   VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
                   ON CONFLICT (id) DO NOTHING"#,
            )
            .bind(t.id)
            .bind(&t.name)
            .bind(&t.code)
            .bind(&t.logo_url)
            .bind(json(&t.extra))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(teams.len())
    }

    async fn map_team_seasons(&self, pairs: &[(i64, i64)]) -> StoreResult<usize> {
        if pairs.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for (team_id, season_id) in pairs {
            sqlx::query(
                r#"INSERT INTO sl_team_season_map (team_id, season_id, created_at, updated_at)
                   VALUES ($1, $2, NOW(), NOW())
                   ON CONFLICT (team_id, season_id) DO UPDATE SET updated_at = NOW()"#,
            )
            .bind(team_id)
            .bind(season_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(pairs.len())
    }

    async fn upsert_players(&self, players: &[Player]) -> StoreResult<usize> {
        if players.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for p in players {
            sqlx::query(
                r#"INSERT INTO sl_players
                       (id, name, lastname, birth_date, height_cm, weight_kg, nationality,
                        photo_url, biometrics, created_at, updated_at)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
                   ON CONFLICT (id) DO UPDATE SET
                       name        = COALESCE(excluded.name,        sl_players.name),
                       lastname    = COALESCE(excluded.lastname,    sl_players.lastname),
                       birth_date  = COALESCE(excluded.birth_date,  sl_players.birth_date),
                       height_cm   = COALESCE(excluded.height_cm,   sl_players.height_cm),
                       weight_kg   = COALESCE(excluded.weight_kg,   sl_players.weight_kg),
                       nationality = COALESCE(excluded.nationality, sl_players.nationality),
                       photo_url   = COALESCE(excluded.photo_url,   sl_players.photo_url),
                       biometrics  = COALESCE(sl_players.biometrics, '{}'::jsonb) || COALESCE(excluded.biometrics, '{}'::jsonb),
                       updated_at  = NOW()"#,
            )
            .bind(p.id)
            .bind(&p.name)
            .bind(&p.lastname)
            .bind(p.birth_date)
            .bind(p.height_cm)
            .bind(p.weight_kg)
            .bind(&p.nationality)
            .bind(&p.photo_url)
            .bind(json(&p.biometrics))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!("upserted {} players", players.len());
        Ok(players.len())
    }

    async fn ensure_players(&self, players: &[Player]) -> StoreResult<usize> {
        if players.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for p in players {
            sqlx::query(
                r#"INSERT INTO sl_players (id, name, biometrics, created_at, updated_at)
                   VALUES ($1, $2, $3, NOW(), NOW())
                   ON CONFLICT (id) DO NOTHING"#,
            )
            .bind(p.id)
            .bind(&p.name)
            .bind(json(&p.biometrics))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(players.len())
    }

    async fn upsert_squads(&self, rows: &[SquadMembership]) -> StoreResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for r in rows {
            sqlx::query(
                r#"INSERT INTO sl_player_squads
                       (player_id, team_id, season_id, position, jersey_number, is_active,
                        created_at, updated_at)
                   VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
                   ON CONFLICT (player_id, team_id, season_id) DO UPDATE SET
                       position      = COALESCE(excluded.position,      sl_player_squads.position),
                       jersey_number = COALESCE(excluded.jersey_number, sl_player_squads.jersey_number),
                       is_active     = excluded.is_active,
                       updated_at    = NOW()"#,
            )
            .bind(r.player_id)
            .bind(r.team_id)
            .bind(r.season_id)
            .bind(&r.position)
            .bind(r.jersey_number)
            .bind(r.is_active)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(rows.len())
    }

    async fn players_by_position(
        &self,
        range: Range<i64>,
        patterns: &[&str],
    ) -> StoreResult<Vec<(i64, String)>> {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        let rows = sqlx::query(
            r#"SELECT id, COALESCE(name, '') AS name FROM sl_players
               WHERE id >= $1 AND id < $2
                 AND biometrics->>'position' LIKE ANY($3)
               ORDER BY id"#,
        )
        .bind(range.start)
        .bind(range.end)
        .bind(&patterns)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| -> StoreResult<(i64, String)> { Ok((r.try_get("id")?, r.try_get("name")?)) })
            .collect()
    }

    async fn upsert_games(&self, games: &[Game]) -> StoreResult<usize> {
        if games.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for g in games {
            sqlx::query(
                r#"INSERT INTO sl_games
                       (id, season_id, league_id, home_team_id, away_team_id, game_date, status,
                        home_score, away_score, score_detail, created_at, updated_at)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
                   ON CONFLICT (id) DO UPDATE SET
                       season_id    = COALESCE(excluded.season_id,    sl_games.season_id),
                       league_id    = COALESCE(excluded.league_id,    sl_games.league_id),
                       home_team_id = COALESCE(excluded.home_team_id, sl_games.home_team_id),
                       away_team_id = COALESCE(excluded.away_team_id, sl_games.away_team_id),
                       game_date    = COALESCE(excluded.game_date,    sl_games.game_date),
                       status       = COALESCE(excluded.status,       sl_games.status),
                       home_score   = COALESCE(excluded.home_score,   sl_games.home_score),
                       away_score   = COALESCE(excluded.away_score,   sl_games.away_score),
                       score_detail = COALESCE(sl_games.score_detail, '{}'::jsonb) || COALESCE(excluded.score_detail, '{}'::jsonb),
                       updated_at   = NOW()"#,
            )
            .bind(g.id)
            .bind(g.season_id)
            .bind(g.league_id)
            .bind(g.home_team_id)
            .bind(g.away_team_id)
            .bind(g.game_date)
            .bind(g.status.map(|s| s.as_str()))
            .bind(g.home_score)
            .bind(g.away_score)
            .bind(json(&g.score_detail))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!("upserted {} games", games.len());
        Ok(games.len())
    }

    async fn ensure_games(&self, games: &[Game]) -> StoreResult<usize> {
        if games.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for g in games {
            sqlx::query(
                r#"INSERT INTO sl_games
                       (id, season_id, league_id, home_team_id, away_team_id, game_date, status,
                        home_score, away_score, score_detail, created_at, updated_at)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
                   ON CONFLICT (id) DO NOTHING"#,
            )
            .bind(g.id)
            .bind(g.season_id)
            .bind(g.league_id)
            .bind(g.home_team_id)
            .bind(g.away_team_id)
            .bind(g.game_date)
            .bind(g.status.map(|s| s.as_str()))
            .bind(g.home_score)
            .bind(g.away_score)
            .bind(json(&g.score_detail))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(games.len())
    }

    async fn upsert_season_stats(&self, rows: &[PlayerSeasonStat]) -> StoreResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for r in rows {
            sqlx::query(
                r#"INSERT INTO sl_player_season_stats
                       (player_id, season_id, team_id, stats, created_at, updated_at)
                   VALUES ($1, $2, $3, $4, NOW(), NOW())
                   ON CONFLICT (player_id, season_id, team_id) DO UPDATE SET
                       stats      = COALESCE(sl_player_season_stats.stats, '{}'::jsonb) || COALESCE(excluded.stats, '{}'::jsonb),
                       updated_at = NOW()"#,
            )
            .bind(r.player_id)
            .bind(r.season_id)
            .bind(r.team_id)
            .bind(json(&r.stats))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(rows.len())
    }

    async fn patch_season_stats(
        &self,
        player_id: i64,
        season_id: i64,
        patch: &Extra,
    ) -> StoreResult<u64> {
        let res = sqlx::query(
            r#"UPDATE sl_player_season_stats
               SET stats = COALESCE(stats, '{}'::jsonb) || $3, updated_at = NOW()
               WHERE player_id = $1 AND season_id = $2"#,
        )
        .bind(player_id)
        .bind(season_id)
        .bind(json(patch))
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    async fn upsert_game_stats(&self, rows: &[PlayerGameStat]) -> StoreResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for r in rows {
            sqlx::query(
                r#"INSERT INTO sl_player_game_stats
                       (game_id, player_id, team_id, minutes_played, rating, stats,
                        created_at, updated_at)
                   VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
                   ON CONFLICT (game_id, player_id) DO UPDATE SET
                       team_id        = COALESCE(excluded.team_id,        sl_player_game_stats.team_id),
                       minutes_played = COALESCE(excluded.minutes_played, sl_player_game_stats.minutes_played),
                       rating         = COALESCE(excluded.rating,         sl_player_game_stats.rating),
                       stats          = COALESCE(sl_player_game_stats.stats, '{}'::jsonb) || COALESCE(excluded.stats, '{}'::jsonb),
                       updated_at     = NOW()"#,
            )
            .bind(r.game_id)
            .bind(r.player_id)
            .bind(r.team_id)
            .bind(r.minutes_played)
            .bind(r.rating)
            .bind(json(&r.stats))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(rows.len())
    }

    // ── Run log ───────────────────────────────────────────────────────────────

    async fn begin_run(&self, job: &str) -> StoreResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO sl_sync_runs (job, started_at, status) VALUES ($1, NOW(), 'running')
             RETURNING id",
        )
        .bind(job)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn finish_run(&self, run_id: i64, s: &RunSummary) -> StoreResult<()> {
        let res = sqlx::query(
            r#"UPDATE sl_sync_runs SET
               finished_at = NOW(), status = $2,
               units = $3, rows_written = $4, errors = $5, error_msg = $6
               WHERE id = $1"#,
        )
        .bind(run_id)
        .bind(if s.error_msg.is_none() { "success" } else { "error" })
        .bind(s.units)
        .bind(s.rows)
        .bind(s.errors)
        .bind(&s.error_msg)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                table: "sl_sync_runs",
                key: run_id.to_string(),
            });
        }
        Ok(())
    }

    async fn counts(&self) -> StoreResult<TableCounts> {
        let mut n = [0i64; 9];
        for (slot, table) in n.iter_mut().zip(COUNTED) {
            *slot = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&self.pool)
                .await?;
        }
        let [sports, leagues, seasons, teams, players, squads, games, season_stats, game_stats] =
            n;
        Ok(TableCounts {
            sports,
            leagues,
            seasons,
            teams,
            players,
            squads,
            games,
            season_stats,
            game_stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn player(name: Option<&str>, height: Option<i32>, key: &str, value: &str) -> Player {
        let mut biometrics = Extra::new();
        biometrics.insert(key.to_string(), json!(value));
        Player {
            id: 900_000_000_417,
            name: name.map(str::to_string),
            height_cm: height,
            biometrics,
            ..Default::default()
        }
    }

    /// Needs `DATABASE_URL` pointing at a scratch database.
    #[tokio::test]
    #[ignore]
    async fn test_merge_matches_memory_store() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        let cfg = DatabaseConfig {
            url: Some(url),
            ..Default::default()
        };
        let pg = PgStore::connect(&cfg).await.unwrap();
        pg.run_migrations().await.unwrap();
        let mem = MemoryStore::new();

        let first = player(Some("Kim"), Some(190), "position", "DF");
        let second = player(None, Some(188), "foot", "R");
        let stores: [&dyn Store; 2] = [&pg, &mem];
        for store in stores {
            store.upsert_players(std::slice::from_ref(&first)).await.unwrap();
            store.upsert_players(std::slice::from_ref(&second)).await.unwrap();
        }

        let row = sqlx::query("SELECT name, height_cm, biometrics FROM sl_players WHERE id = $1")
            .bind(first.id)
            .fetch_one(&pg.pool)
            .await
            .unwrap();
        let expected = mem.player(first.id).unwrap();
        assert_eq!(row.get::<Option<String>, _>("name"), expected.name);
        assert_eq!(row.get::<Option<i32>, _>("height_cm"), expected.height_cm);
        let Json(biometrics): Json<Extra> = row.get("biometrics");
        assert_eq!(biometrics, expected.biometrics);
        assert_eq!(expected.name.as_deref(), Some("Kim"));
        assert_eq!(expected.biometrics.len(), 2);
    }
}
