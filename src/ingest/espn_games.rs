//! Games from ESPN team schedules and league scoreboards.

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::EspnLeague;
use crate::ids::Namespace;
use crate::models::{Game, Team, put};
use crate::normalize::{parse_espn_datetime, status_from_espn};
use crate::sources::EspnSource;
use crate::sources::espn::{CompetitorRecord, EventRecord};
use crate::storage::Store;

use super::JobStats;
use super::espn_catalog::{espn_teams, fetch_teams, league_season, upsert_espn_league};

fn competitor_id(c: Option<&CompetitorRecord>) -> Result<Option<i64>> {
    Ok(c.map(|c| Namespace::Espn.from_numeric(&c.team.id)).transpose()?)
}

pub fn espn_game(ev: &EventRecord, league_id: i64, season_id: Option<i64>) -> Result<Game> {
    let mut score_detail = Default::default();
    put(&mut score_detail, "status_detail", ev.status_detail.clone());
    put(&mut score_detail, "venue", ev.venue.clone());
    put(&mut score_detail, "status_name", ev.status_name.clone());

    Ok(Game {
        id: Namespace::Espn.from_numeric(&ev.id)?,
        season_id,
        league_id: Some(league_id),
        home_team_id: competitor_id(ev.home.as_ref())?,
        away_team_id: competitor_id(ev.away.as_ref())?,
        game_date: ev.date.as_deref().and_then(parse_espn_datetime),
        status: ev.status_name.as_deref().map(status_from_espn),
        home_score: ev.home.as_ref().and_then(|c| c.score),
        away_score: ev.away.as_ref().and_then(|c| c.score),
        score_detail,
    })
}

/// Teams named by the competitors of `events`.
fn competitor_teams(events: &[EventRecord], stats: &mut JobStats) -> Vec<Team> {
    let records = events
        .iter()
        .flat_map(|e| [e.home.as_ref(), e.away.as_ref()])
        .flatten()
        .map(|c| &c.team);
    espn_teams(records, stats)
}

/// Convert events into games; events that fail are skipped.
fn espn_games(
    events: &[EventRecord],
    league_id: i64,
    season_id: Option<i64>,
    stats: &mut JobStats,
) -> Vec<Game> {
    events
        .iter()
        .filter_map(|ev| match espn_game(ev, league_id, season_id) {
            Ok(g) => Some(g),
            Err(e) => {
                debug!("event {:?}: {}", ev.id, e);
                stats.skipped += 1;
                None
            }
        })
        .collect()
}

pub async fn sync_schedules(
    store: &dyn Store,
    src: &dyn EspnSource,
    leagues: &[EspnLeague],
) -> Result<JobStats> {
    let mut stats = JobStats::default();
    for cfg in leagues {
        let Some(page) = fetch_teams(src, cfg, &mut stats).await else {
            continue;
        };
        let (league_id, season_id) = match league_season(store, cfg, page.league.as_ref()).await {
            Ok(ids) => ids,
            Err(e) => {
                stats.record(&cfg.key, Err(e));
                continue;
            }
        };

        for rec in &page.teams {
            let outcome = async {
                let events = src.schedule(cfg, &rec.id).await?;
                let mut unit = JobStats::default();
                let teams = competitor_teams(&events, &mut unit);
                store.ensure_teams(&teams).await?;
                let games = espn_games(&events, league_id, Some(season_id), &mut unit);
                unit.rows = store.upsert_games(&games).await?;
                Ok::<_, anyhow::Error>(unit)
            }
            .await;
            stats.record(format!("{} team {}", cfg.key, rec.id), outcome);
        }
        info!("{}: schedules done ({})", cfg.key, stats);
    }
    Ok(stats)
}

pub async fn sync_results(
    store: &dyn Store,
    src: &dyn EspnSource,
    leagues: &[EspnLeague],
) -> Result<JobStats> {
    let mut stats = JobStats::default();
    for cfg in leagues {
        let outcome = async {
            let board = src.scoreboard(cfg).await?;
            let mut unit = JobStats::default();

            let (league_id, season_id) = match &board.league {
                Some(info) => {
                    let league_id = upsert_espn_league(store, cfg, info).await?;
                    let season_id = match info.season_year {
                        Some(year) => Some(store.ensure_season(league_id, year, true).await?),
                        None => None,
                    };
                    (league_id, season_id)
                }
                None => {
                    let league = store
                        .league_by_slug(&cfg.key)
                        .await?
                        .with_context(|| {
                            format!("scoreboard for {} has no league block", cfg.key)
                        })?;
                    let season_id = store.current_season(league.id).await?.map(|s| s.id);
                    (league.id, season_id)
                }
            };

            let teams = competitor_teams(&board.events, &mut unit);
            store.upsert_teams(&teams).await?;
            let games = espn_games(&board.events, league_id, season_id, &mut unit);
            unit.rows = store.upsert_games(&games).await?;
            info!("{}: {} games from scoreboard", cfg.key, unit.rows);
            Ok::<_, anyhow::Error>(unit)
        }
        .await;
        stats.record(&cfg.key, outcome);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::test_support::{FakeEspn, espn_league, event, team};
    use crate::models::GameStatus;
    use crate::sources::espn::{LeagueInfo, ScoreboardPage};
    use crate::storage::MemoryStore;

    #[test]
    fn test_espn_game() {
        let g = espn_game(&event("401", ("359", Some(2)), ("360", Some(1))), 23, Some(5)).unwrap();
        assert_eq!(g.id, 401);
        assert_eq!(g.home_team_id, Some(359));
        assert_eq!(g.away_team_id, Some(360));
        assert_eq!(g.status, Some(GameStatus::Final));
        assert_eq!((g.home_score, g.away_score), (Some(2), Some(1)));
        assert_eq!(
            g.game_date.map(|d| d.to_rfc3339()).as_deref(),
            Some("2024-03-20T19:00:00+00:00")
        );
        assert_eq!(g.score_detail["venue"], "Emirates Stadium");
        assert_eq!(g.score_detail["status_name"], "STATUS_FINAL");
    }

    #[test]
    fn test_event_without_competitors_has_no_teams() {
        let ev = EventRecord {
            id: "9".into(),
            ..Default::default()
        };
        let g = espn_game(&ev, 23, None).unwrap();
        assert_eq!(g.home_team_id, None);
        assert_eq!(g.status, None);
        assert!(g.score_detail.is_empty());
    }

    #[tokio::test]
    async fn test_sync_schedules_creates_opponent_placeholders() {
        let store = MemoryStore::new();
        let mut src = FakeEspn::with_teams(vec![team("359", "Arsenal"), team("360", "Man Utd")]);
        let shared = event("401", ("359", Some(2)), ("360", Some(1)));
        src.schedules.insert(
            "359".into(),
            vec![shared.clone(), event("402", ("361", None), ("359", None))],
        );
        src.schedules.insert("360".into(), vec![shared]);

        let stats = sync_schedules(&store, &src, &[espn_league("soccer", "eng.1")])
            .await
            .unwrap();
        assert_eq!(stats.units, 2);
        assert_eq!(stats.errors, 0);
        assert_eq!(store.counts().await.unwrap().games, 2);
        assert_eq!(store.team(361).unwrap().name.as_deref(), Some("Team 361"));

        let season = store.current_season(23).await.unwrap().unwrap();
        let g = store.game(402).unwrap();
        assert_eq!(g.season_id, Some(season.id));
        assert_eq!(g.league_id, Some(23));
        assert_eq!(g.home_score, None);
    }

    #[tokio::test]
    async fn test_sync_results_upserts_league_and_games() {
        let store = MemoryStore::new();
        let src = FakeEspn {
            scoreboard: ScoreboardPage {
                league: Some(LeagueInfo {
                    id: "10".into(),
                    name: Some("MLB".into()),
                    abbreviation: Some("MLB".into()),
                    season_year: Some(2025),
                }),
                events: vec![event("501", ("1", Some(4)), ("2", Some(3)))],
            },
            ..Default::default()
        };
        let mut cfg = espn_league("baseball", "mlb");
        cfg.frontend_slug = Some("mlb-frontend".into());

        let stats = sync_results(&store, &src, &[cfg]).await.unwrap();
        assert_eq!(stats.rows, 1);
        assert_eq!(store.league(10).unwrap().extra["frontend_slug"], "mlb-frontend");
        assert_eq!(store.game(501).unwrap().home_score, Some(4));
        assert_eq!(store.team(2).unwrap().code.as_deref(), Some("TEA"));
    }

    #[tokio::test]
    async fn test_results_without_league_block_fail_the_unit() {
        let store = MemoryStore::new();
        let src = FakeEspn::default();
        let stats = sync_results(&store, &src, &[espn_league("hockey", "nhl")])
            .await
            .unwrap();
        assert_eq!(stats.errors, 1);
    }
}
