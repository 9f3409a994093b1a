//! KBO baseball: Naver schedule, koreabaseball.com players and records.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use tracing::{debug, info};

use crate::config::KboConfig;
use crate::ids::Namespace;
use crate::models::{Extra, Game, Player, PlayerSeasonStat, Team, put};
use crate::normalize::teams::{kbo_canonical, kbo_site_codes, kbo_team_id};
use crate::normalize::{
    last_day_of_month, non_empty, ops, parse_birth_date, parse_height_weight, parse_innings,
    parse_int_cell, parse_kst_datetime, status_from_naver,
};
use crate::sources::kbo_site::{KboPage, KboPlayerRow, StatPage, StatTable};
use crate::sources::naver::{NaverCategory, NaverGame, NaverSide};
use crate::sources::{KboSource, NaverSource};
use crate::storage::Store;

use super::{JobStats, KBO_LEAGUE, kst_today};

// ── Games ─────────────────────────────────────────────────────────────────────

/// Game row for a Naver schedule entry whose teams are already resolved.
pub(super) fn naver_game(
    namespace: Namespace,
    g: &NaverGame,
    league_id: i64,
    season_id: i64,
    home_team_id: i64,
    away_team_id: i64,
) -> Result<Game> {
    let mut score_detail = Extra::new();
    put(&mut score_detail, "score", g.score.clone());
    put(&mut score_detail, "stadium", g.stadium.clone());
    Ok(Game {
        id: namespace.from_key(&g.game_id)?,
        season_id: Some(season_id),
        league_id: Some(league_id),
        home_team_id: Some(home_team_id),
        away_team_id: Some(away_team_id),
        game_date: g.date_time.as_deref().and_then(parse_kst_datetime),
        status: Some(status_from_naver(g.status_code.as_deref(), &g.status_text)),
        home_score: g.home.score,
        away_score: g.away.score,
        score_detail,
    })
}

/// Inclusive first and last day of a month.
pub(super) fn month_window(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let from = NaiveDate::from_ymd_opt(year, month, 1)
        .with_context(|| format!("invalid month {year}-{month}"))?;
    let to = last_day_of_month(year, month)
        .with_context(|| format!("invalid month {year}-{month}"))?;
    Ok((from, to))
}

fn kbo_team(side: &NaverSide) -> Result<Team> {
    let name = side
        .name
        .as_deref()
        .and_then(non_empty)
        .context("team without a name")?;
    Ok(Team {
        id: kbo_team_id(&name)?,
        name: Some(kbo_canonical(&name)),
        code: side.code.clone(),
        logo_url: side.emblem_url.clone(),
        ..Default::default()
    })
}

pub async fn sync_games(
    store: &dyn Store,
    src: &dyn NaverSource,
    year: i32,
    month: u32,
) -> Result<JobStats> {
    let league_id = KBO_LEAGUE.ensure(store).await?;
    let season_id = store.ensure_season(league_id, year, true).await?;
    let (from, to) = month_window(year, month)?;

    let mut stats = JobStats::default();
    let outcome = async {
        let games = src.games(NaverCategory::Kbo, from, to).await?;
        let mut unit = JobStats::default();
        let mut teams = BTreeMap::new();
        let mut rows = Vec::with_capacity(games.len());

        for g in &games {
            let converted = kbo_team(&g.home).and_then(|home| {
                let away = kbo_team(&g.away)?;
                let game = naver_game(Namespace::Kbo, g, league_id, season_id, home.id, away.id)?;
                Ok((home, away, game))
            });
            match converted {
                Ok((home, away, game)) => {
                    teams.insert(home.id, home);
                    teams.insert(away.id, away);
                    rows.push(game);
                }
                Err(e) => {
                    debug!("game {}: {:#}", g.game_id, e);
                    unit.skipped += 1;
                }
            }
        }

        let teams: Vec<_> = teams.into_values().collect();
        store.upsert_teams(&teams).await?;
        unit.rows = store.upsert_games(&rows).await?;
        Ok::<_, anyhow::Error>(unit)
    }
    .await;
    stats.record(format!("KBO {year}-{month:02}"), outcome);
    info!("KBO {}-{:02}: {}", year, month, stats);
    Ok(stats)
}

// ── Players ───────────────────────────────────────────────────────────────────

pub fn kbo_player(row: &KboPlayerRow, photo_template: &str, year: i32) -> Result<Player> {
    let (height_cm, weight_kg) = parse_height_weight(&row.height_weight);
    let mut biometrics = Extra::new();
    put(&mut biometrics, "position", non_empty(&row.position));
    put(&mut biometrics, "school", non_empty(&row.school));

    Ok(Player {
        id: Namespace::Kbo.from_numeric(&row.player_id)?,
        name: non_empty(&row.name),
        birth_date: parse_birth_date(&row.birth),
        height_cm,
        weight_kg,
        nationality: Some("South Korea".to_string()),
        photo_url: Some(
            photo_template
                .replace("{year}", &year.to_string())
                .replace("{id}", row.player_id.trim()),
        ),
        biometrics,
        ..Default::default()
    })
}

pub async fn sync_players(
    store: &dyn Store,
    src: &dyn KboSource,
    cfg: &KboConfig,
) -> Result<JobStats> {
    let year = kst_today().year();
    let mut stats = JobStats::default();
    for code in kbo_site_codes() {
        let outcome = async {
            let rows = src.team_players(code).await?;
            let mut unit = JobStats::default();
            let players: Vec<_> = rows
                .iter()
                .filter_map(|r| match kbo_player(r, &cfg.photo_url_template, year) {
                    Ok(p) => Some(p),
                    Err(e) => {
                        debug!("player {:?}: {}", r.player_id, e);
                        unit.skipped += 1;
                        None
                    }
                })
                .collect();
            unit.rows = store.upsert_players(&players).await?;
            info!("{}: {} players", kbo_canonical(code), unit.rows);
            Ok::<_, anyhow::Error>(unit)
        }
        .await;
        stats.record(code, outcome);
    }
    Ok(stats)
}

// ── Records ───────────────────────────────────────────────────────────────────

/// Integer columns of a hitter career row, by cell index.
const HITTER_INTS: [(usize, &str); 16] = [
    (3, "G"),
    (4, "PA"),
    (5, "AB"),
    (6, "R"),
    (7, "H"),
    (8, "2B"),
    (9, "3B"),
    (10, "HR"),
    (11, "TB"),
    (12, "RBI"),
    (13, "SB"),
    (14, "CS"),
    (15, "BB"),
    (16, "HBP"),
    (17, "SO"),
    (18, "GDP"),
];

const PITCHER_INTS: [(usize, &str); 15] = [
    (3, "G"),
    (4, "CG"),
    (5, "SHO"),
    (6, "W"),
    (7, "L"),
    (8, "SV"),
    (9, "HLD"),
    (11, "TBF"),
    (13, "H"),
    (14, "HR"),
    (15, "BB"),
    (16, "HBP"),
    (17, "SO"),
    (18, "R"),
    (19, "ER"),
];

/// Copy integer cells; any unparsable one rejects the whole row.
fn int_columns(stats: &mut Extra, cells: &[String], columns: &[(usize, &str)]) -> Option<()> {
    for &(i, key) in columns {
        stats.insert(key.to_string(), parse_int_cell(cells.get(i)?)?.into());
    }
    Some(())
}

fn text(cells: &[String], i: usize) -> String {
    cells.get(i).map(|c| c.trim().to_string()).unwrap_or_default()
}

pub fn hitter_season(cells: &[String]) -> Option<Extra> {
    if cells.len() < 21 {
        return None;
    }
    let mut stats = Extra::new();
    stats.insert("AVG".into(), text(cells, 2).into());
    int_columns(&mut stats, cells, &HITTER_INTS)?;
    let (slg, obp) = (text(cells, 19), text(cells, 20));
    stats.insert("OPS".into(), ops(&slg, &obp).into());
    stats.insert("SLG".into(), slg.into());
    stats.insert("OBP".into(), obp.into());
    Some(stats)
}

pub fn pitcher_season(cells: &[String]) -> Option<Extra> {
    if cells.len() < 20 {
        return None;
    }
    let mut stats = Extra::new();
    stats.insert("ERA".into(), text(cells, 2).into());
    stats.insert("WPCT".into(), text(cells, 10).into());
    let ip = parse_innings(&text(cells, 12)).unwrap_or(0.0);
    stats.insert("IP".into(), format!("{ip:.1}").into());
    int_columns(&mut stats, cells, &PITCHER_INTS)?;
    Some(stats)
}

/// IBB from the second detail table, SAC and SF from the first.
pub fn hitter_detail(page: &StatPage) -> Extra {
    let mut patch = Extra::new();
    let tables: Vec<_> = page.with_class("tt").collect();
    let (Some(main), Some(extra)) = (tables.first(), tables.get(1)) else {
        return patch;
    };
    let Some(row) = extra.rows.first().filter(|r| r.len() >= 10) else {
        return patch;
    };
    let Some(ibb) = parse_int_cell(&row[1]) else {
        return patch;
    };
    patch.insert("IBB".into(), ibb.into());

    if let Some(row) = main.rows.first().filter(|r| r.len() >= 16) {
        if let (Some(sac), Some(sf)) = (parse_int_cell(&row[14]), parse_int_cell(&row[15])) {
            patch.insert("SAC".into(), sac.into());
            patch.insert("SF".into(), sf.into());
        }
    }
    patch
}

/// Last table whose text mentions any of `needles`.
fn last_table<'a>(page: &'a StatPage, needles: &[&str]) -> Option<&'a StatTable> {
    page.tables
        .iter()
        .rev()
        .find(|t| needles.iter().any(|n| t.text.contains(n)))
}

/// NP from the pitch-count table, WP/BK/WHIP/QS from the WHIP table.
pub fn pitcher_detail(page: &StatPage) -> Extra {
    let mut patch = Extra::new();

    let np = last_table(page, &["투구수", "NP"])
        .and_then(|t| t.rows.first())
        .and_then(|r| r.get(11))
        .and_then(|c| parse_int_cell(c));
    if let Some(np) = np {
        patch.insert("NP".into(), np.into());
    }

    let extra = last_table(page, &["WHIP", "QS"])
        .and_then(|t| t.rows.first())
        .filter(|r| r.len() >= 13)
        .and_then(|r| {
            Some((
                parse_int_cell(&r[5])?,
                parse_int_cell(&r[6])?,
                r[10].trim().to_string(),
                parse_int_cell(&r[12])?,
            ))
        });
    if let Some((wp, bk, whip, qs)) = extra {
        patch.insert("WP".into(), wp.into());
        patch.insert("BK".into(), bk.into());
        patch.insert("WHIP".into(), whip.into());
        patch.insert("QS".into(), qs.into());
    }
    patch
}

fn hitter_career_table(t: &StatTable) -> bool {
    t.summary.contains("통산기록") || (t.text.contains("연도") && t.text.contains("타율"))
}

fn pitcher_career_table(t: &StatTable) -> bool {
    t.summary.contains("통산기록") || (t.text.contains("ERA") && t.text.contains("승"))
}

/// How one kind of record page set is read.
struct RecordKind {
    label: &'static str,
    positions: &'static [&'static str],
    career: KboPage,
    detail: KboPage,
    is_career: fn(&StatTable) -> bool,
    season_row: fn(&[String]) -> Option<Extra>,
    detail_patch: fn(&StatPage) -> Extra,
}

const HITTERS: RecordKind = RecordKind {
    label: "hitter",
    positions: &["%포수%", "%내야수%", "%외야수%"],
    career: KboPage::HitterCareer,
    detail: KboPage::HitterDetail,
    is_career: hitter_career_table,
    season_row: hitter_season,
    detail_patch: hitter_detail,
};

const PITCHERS: RecordKind = RecordKind {
    label: "pitcher",
    positions: &["%투수%"],
    career: KboPage::PitcherCareer,
    detail: KboPage::PitcherDetail,
    is_career: pitcher_career_table,
    season_row: pitcher_season,
    detail_patch: pitcher_detail,
};

pub async fn sync_hitter_stats(store: &dyn Store, src: &dyn KboSource) -> Result<JobStats> {
    sync_records(store, src, &HITTERS).await
}

pub async fn sync_pitcher_stats(store: &dyn Store, src: &dyn KboSource) -> Result<JobStats> {
    sync_records(store, src, &PITCHERS).await
}

async fn sync_records(
    store: &dyn Store,
    src: &dyn KboSource,
    kind: &RecordKind,
) -> Result<JobStats> {
    let league_id = KBO_LEAGUE.ensure(store).await?;
    let targets = store
        .players_by_position(Namespace::Kbo.range(), kind.positions)
        .await
        .context("Failed to load KBO players")?;
    info!("{} {}s to fetch", targets.len(), kind.label);

    let mut stats = JobStats::default();
    for (player_id, name) in &targets {
        let outcome = async {
            let site_id = Namespace::Kbo
                .local_part(*player_id)
                .context("player id outside the KBO range")?;
            let mut unit = JobStats::default();

            let career = src.stat_page(kind.career, site_id).await?;
            let Some(table) = career.find(kind.is_career) else {
                debug!("{}: no career table", name);
                unit.skipped += 1;
                return Ok(unit);
            };

            let mut seasons: HashMap<i32, i64> = HashMap::new();
            let mut teams = BTreeMap::new();
            let mut rows = Vec::new();
            for cells in &table.rows {
                let Some(year) = cells
                    .first()
                    .filter(|y| !y.is_empty() && y.bytes().all(|b| b.is_ascii_digit()))
                    .and_then(|y| y.parse::<i32>().ok())
                else {
                    continue;
                };
                let team_name = text(cells, 1);
                let (Some(line), Ok(team_id)) = ((kind.season_row)(cells), kbo_team_id(&team_name))
                else {
                    unit.skipped += 1;
                    continue;
                };

                let season_id = match seasons.get(&year) {
                    Some(id) => *id,
                    None => {
                        let id = store.ensure_season(league_id, year, false).await?;
                        seasons.insert(year, id);
                        id
                    }
                };
                teams
                    .entry(team_id)
                    .or_insert_with(|| Team::placeholder(team_id, kbo_canonical(&team_name)));
                rows.push(PlayerSeasonStat {
                    player_id: *player_id,
                    season_id,
                    team_id,
                    stats: line,
                });
            }
            if !rows.is_empty() {
                let teams: Vec<_> = teams.into_values().collect();
                store.ensure_teams(&teams).await?;
                unit.rows += store.upsert_season_stats(&rows).await?;
            }

            match src.stat_page(kind.detail, site_id).await {
                Ok(detail) => {
                    let season_id = detail.season.and_then(|y| seasons.get(&y).copied());
                    let patch = (kind.detail_patch)(&detail);
                    if let (Some(season_id), false) = (season_id, patch.is_empty()) {
                        store.patch_season_stats(*player_id, season_id, &patch).await?;
                    }
                }
                Err(e) => unit.fail(format!("{name} detail"), e),
            }
            Ok::<_, anyhow::Error>(unit)
        }
        .await;
        stats.record(format!("{} {}", name, player_id), outcome);
    }
    Ok(stats)
}
