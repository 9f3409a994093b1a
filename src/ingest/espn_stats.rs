//! Per-player season totals and game logs from the ESPN web API.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use tracing::{debug, info};

use crate::config::EspnLeague;
use crate::ids::Namespace;
use crate::models::{Extra, Game, GameStatus, PlayerGameStat, PlayerSeasonStat, put};
use crate::normalize::parse_espn_datetime;
use crate::sources::EspnSource;
use crate::sources::espn::{GamelogEntry, RosterPage, TeamRecord};
use crate::storage::Store;

use super::JobStats;
use super::espn_catalog::{ensure_espn_league, espn_team, fetch_teams};
use super::espn_rosters::espn_players;

/// Column names, labels and values kept side by side.
fn stat_columns(names: &[String], labels: &[String], values: &[String]) -> Extra {
    let mut stats = Extra::new();
    put(&mut stats, "names", Some(names.to_vec()));
    put(&mut stats, "labels", Some(labels.to_vec()));
    put(&mut stats, "values", Some(values.to_vec()));
    stats
}

/// Team and roster players stored, returning the team id.
async fn store_roster(
    store: &dyn Store,
    rec: &TeamRecord,
    roster: &RosterPage,
    unit: &mut JobStats,
) -> Result<i64> {
    let team = espn_team(rec)?;
    store.ensure_teams(std::slice::from_ref(&team)).await?;
    let players = espn_players(&roster.athletes, unit);
    store.ensure_players(&players).await?;
    Ok(team.id)
}

pub async fn sync_season_stats(
    store: &dyn Store,
    src: &dyn EspnSource,
    leagues: &[EspnLeague],
    years: &[i32],
) -> Result<JobStats> {
    let mut stats = JobStats::default();
    for cfg in leagues {
        let Some(page) = fetch_teams(src, cfg, &mut stats).await else {
            continue;
        };
        let seasons = async {
            let league_id = ensure_espn_league(store, cfg, page.league.as_ref()).await?;
            let mut seasons = Vec::with_capacity(years.len());
            for &year in years {
                seasons.push((year, store.ensure_season(league_id, year, false).await?));
            }
            Ok::<_, anyhow::Error>(seasons)
        }
        .await;
        let seasons = match seasons {
            Ok(s) => s,
            Err(e) => {
                stats.record(&cfg.key, Err(e));
                continue;
            }
        };

        for rec in &page.teams {
            let outcome = async {
                let roster = src.roster(cfg, &rec.id).await?;
                let mut unit = JobStats::default();
                let team_id = store_roster(store, rec, &roster, &mut unit).await?;

                let mut rows = Vec::new();
                for athlete in &roster.athletes {
                    let Ok(player_id) = Namespace::Espn.from_numeric(&athlete.id) else {
                        continue;
                    };
                    for &(year, season_id) in &seasons {
                        let splits = match src.splits(cfg, &athlete.id, year).await {
                            Ok(Some(s)) => s,
                            Ok(None) => {
                                unit.skipped += 1;
                                continue;
                            }
                            Err(e) => {
                                unit.fail(format!("splits {} {}", athlete.id, year), e);
                                continue;
                            }
                        };
                        let mut row = stat_columns(&splits.names, &splits.labels, &splits.values);
                        put(&mut row, "type", Some("Regular Season"));
                        rows.push(PlayerSeasonStat {
                            player_id,
                            season_id,
                            team_id,
                            stats: row,
                        });
                    }
                }
                unit.rows += store.upsert_season_stats(&rows).await?;
                debug!("{} {}: {} season rows", cfg.key, rec.id, unit.rows);
                Ok::<_, anyhow::Error>(unit)
            }
            .await;
            stats.record(format!("{} team {}", cfg.key, rec.id), outcome);
        }
        info!("{}: season stats done ({})", cfg.key, stats);
    }
    Ok(stats)
}

/// Game row standing in for an event only known from a game log.
fn placeholder_game(
    entry: &GamelogEntry,
    league_id: i64,
    season_id: i64,
    year: i32,
) -> Result<Game> {
    let game_date = entry
        .game_date
        .as_deref()
        .and_then(parse_espn_datetime)
        .or_else(|| {
            let day = NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)?;
            Some(Utc.from_utc_datetime(&day))
        });
    Ok(Game {
        id: Namespace::Espn.from_numeric(&entry.event_id)?,
        season_id: Some(season_id),
        league_id: Some(league_id),
        game_date,
        status: Some(GameStatus::Final),
        ..Default::default()
    })
}

pub async fn sync_game_stats(
    store: &dyn Store,
    src: &dyn EspnSource,
    leagues: &[EspnLeague],
) -> Result<JobStats> {
    let mut stats = JobStats::default();
    for cfg in leagues {
        let scope = async {
            let league = store
                .league_by_slug(&cfg.key)
                .await?
                .with_context(|| format!("league {} not stored; run espn-leagues first", cfg.key))?;
            let season = store
                .current_season(league.id)
                .await?
                .with_context(|| format!("no season stored for {}", cfg.key))?;
            Ok::<_, anyhow::Error>((league.id, season))
        }
        .await;
        let (league_id, season) = match scope {
            Ok(s) => s,
            Err(e) => {
                stats.record(&cfg.key, Err(e));
                continue;
            }
        };
        let Some(page) = fetch_teams(src, cfg, &mut stats).await else {
            continue;
        };

        for rec in &page.teams {
            let outcome = async {
                let roster = src.roster(cfg, &rec.id).await?;
                let mut unit = JobStats::default();
                let team_id = store_roster(store, rec, &roster, &mut unit).await?;

                let mut games = BTreeMap::new();
                let mut lines = Vec::new();
                for athlete in &roster.athletes {
                    let Ok(player_id) = Namespace::Espn.from_numeric(&athlete.id) else {
                        continue;
                    };
                    let log = match src.gamelog(cfg, &athlete.id, season.year).await {
                        Ok(log) => log,
                        Err(e) => {
                            unit.fail(format!("gamelog {}", athlete.id), e);
                            continue;
                        }
                    };
                    for entry in &log {
                        let Ok(game) = placeholder_game(entry, league_id, season.id, season.year)
                        else {
                            unit.skipped += 1;
                            continue;
                        };
                        let mut row = stat_columns(&entry.names, &entry.labels, &entry.stats);
                        put(&mut row, "season_type", entry.season_type.clone());
                        put(&mut row, "event_id", Some(entry.event_id.clone()));
                        lines.push(PlayerGameStat {
                            game_id: game.id,
                            player_id,
                            team_id: Some(team_id),
                            minutes_played: None,
                            rating: None,
                            stats: row,
                        });
                        games.entry(game.id).or_insert(game);
                    }
                }

                // Games first: every stat line references one.
                let games: Vec<Game> = games.into_values().collect();
                store.ensure_games(&games).await?;
                unit.rows += store.upsert_game_stats(&lines).await?;
                Ok::<_, anyhow::Error>(unit)
            }
            .await;
            stats.record(format!("{} team {}", cfg.key, rec.id), outcome);
        }
        info!("{}: game stats done ({})", cfg.key, stats);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::espn_catalog::sync_leagues;
    use crate::ingest::test_support::{CountingStore, FakeEspn, athlete, espn_league, team};
    use crate::sources::espn::AthleteSplits;
    use crate::storage::MemoryStore;

    fn fake() -> FakeEspn {
        let mut src = FakeEspn::with_teams(vec![team("359", "Arsenal")]);
        src.rosters.insert(
            "359".into(),
            RosterPage {
                team: None,
                athletes: vec![athlete("7", "Saka"), athlete("8", "Rice")],
            },
        );
        src
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_season_stats_per_year() {
        let store = CountingStore::default();
        let mut src = fake();
        for year in [2024, 2025] {
            src.splits.insert(
                ("7".into(), year),
                AthleteSplits {
                    names: strings(&["goals", "assists"]),
                    labels: strings(&["G", "A"]),
                    values: strings(&[&(year - 2010).to_string(), "9"]),
                },
            );
        }

        let leagues = [espn_league("soccer", "eng.1")];
        let stats = sync_season_stats(&store, &src, &leagues, &[2024, 2025])
            .await
            .unwrap();
        assert_eq!(stats.rows, 2);
        // Rice has no "Total" split in either year.
        assert_eq!(stats.skipped, 2);
        // One team, one write for both players and both years.
        assert_eq!(store.calls("upsert_season_stats"), 1);

        let rows = store.inner.season_stats_of(7);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.team_id == 359));
        assert_eq!(rows[0].stats["type"], "Regular Season");
        assert_eq!(rows[0].stats["labels"][0], "G");
        assert_eq!(rows[1].stats["values"][0], "15");
    }

    #[tokio::test]
    async fn test_game_stats_need_a_stored_league() {
        let store = MemoryStore::new();
        let stats = sync_game_stats(&store, &fake(), &[espn_league("soccer", "eng.1")])
            .await
            .unwrap();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.rows, 0);
    }

    #[tokio::test]
    async fn test_game_stats_create_placeholder_games() {
        let store = CountingStore::default();
        let mut src = fake();
        src.gamelogs.insert(
            "7".into(),
            vec![
                GamelogEntry {
                    event_id: "700".into(),
                    game_date: Some("2025-08-16T14:00Z".into()),
                    season_type: Some("2025-26 English Premier League".into()),
                    names: strings(&["goals"]),
                    labels: strings(&["G"]),
                    stats: strings(&["1"]),
                },
                GamelogEntry {
                    event_id: "701".into(),
                    ..Default::default()
                },
            ],
        );
        src.gamelogs.insert(
            "8".into(),
            vec![GamelogEntry {
                event_id: "700".into(),
                game_date: Some("2025-08-16T14:00Z".into()),
                ..Default::default()
            }],
        );
        let league = espn_league("soccer", "eng.1");
        sync_leagues(&store, &src, std::slice::from_ref(&league)).await.unwrap();
        let league_id = store.league_by_slug("eng.1").await.unwrap().unwrap().id;
        store.ensure_season(league_id, 2025, true).await.unwrap();

        let stats = sync_game_stats(&store, &src, &[league]).await.unwrap();
        assert_eq!(stats.rows, 3);
        assert_eq!(stats.errors, 0);
        assert_eq!(store.calls("ensure_games"), 1);
        assert_eq!(store.calls("upsert_game_stats"), 1);
        assert_eq!(store.inner.game_stats_of(8).len(), 1);

        let g = store.inner.game(700).unwrap();
        assert_eq!(g.status, Some(GameStatus::Final));
        assert_eq!(g.league_id, Some(23));
        assert_eq!(g.home_team_id, None);
        let fallback = store.inner.game(701).unwrap().game_date.unwrap();
        assert_eq!(fallback.to_rfc3339(), "2025-01-01T00:00:00+00:00");

        let lines = store.inner.game_stats_of(7);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].team_id, Some(359));
        assert_eq!(lines[0].stats["event_id"], "700");
        assert_eq!(lines[0].stats["season_type"], "2025-26 English Premier League");
    }
}
