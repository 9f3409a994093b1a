//! KBL basketball from kbl.or.kr listings.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use tracing::{debug, info};

use crate::ids::Namespace;
use crate::models::{Extra, Game, GameStatus, Player, SquadMembership, Team, put};
use crate::normalize::teams::kbl_team_id;
use crate::normalize::{
    non_empty, parse_height_cm, parse_kst_datetime, parse_number, status_from_korean,
};
use crate::sources::KblSource;
use crate::sources::kbl_site::{KblGameRow, KblPlayerRow, KblTeamRow};
use crate::storage::Store;

use super::{JobStats, KBL_LEAGUE};

/// Seasons start in autumn and are named by their first year.
pub fn season_start_year(day: NaiveDate) -> i32 {
    if day.month() >= 9 { day.year() } else { day.year() - 1 }
}

fn kbl_team(row: &KblTeamRow) -> Result<Team> {
    let mut extra = Extra::new();
    put(&mut extra, "kbl_id", non_empty(&row.kbl_id));
    Ok(Team {
        id: kbl_team_id(&row.name)?,
        name: non_empty(&row.name),
        extra,
        ..Default::default()
    })
}

/// Team listed under `name`: an exact match, else one whose full name
/// contains the short form (`DB` in `원주 DB`).
fn resolve_team<'a>(teams: &'a [Team], name: &str) -> Option<&'a Team> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    teams
        .iter()
        .find(|t| t.name.as_deref() == Some(name))
        .or_else(|| {
            teams
                .iter()
                .find(|t| t.name.as_deref().is_some_and(|n| n.contains(name)))
        })
}

pub fn kbl_player(row: &KblPlayerRow) -> Result<Player> {
    let height = parse_height_cm(&row.height)
        .or_else(|| Some(parse_number(&row.height)).filter(|h| *h > 0));
    let mut biometrics = Extra::new();
    put(&mut biometrics, "position", non_empty(&row.position));
    put(&mut biometrics, "kbl_id", Some(row.kbl_id.trim()));
    put(&mut biometrics, "team", non_empty(&row.team));
    Ok(Player {
        id: Namespace::Kbl.from_numeric(&row.kbl_id)?,
        name: non_empty(&row.name),
        height_cm: height,
        nationality: Some("South Korea".to_string()),
        biometrics,
        ..Default::default()
    })
}

/// `10.19 (토)` in the season that starts in `season_year`.
fn schedule_date(date: &str, season_year: i32) -> Option<NaiveDate> {
    let head = date.split_whitespace().next()?;
    let (month, day) = head.split_once('.')?;
    let month: u32 = month.trim().parse().ok()?;
    let day: u32 = day.trim_end_matches('.').parse().ok()?;
    let year = if month >= 9 { season_year } else { season_year + 1 };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn score(s: &str) -> Option<i32> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

pub fn kbl_game(
    row: &KblGameRow,
    league_id: i64,
    season_id: i64,
    season_year: i32,
    home: &Team,
    away: &Team,
) -> Result<Game> {
    let day = schedule_date(&row.date, season_year)
        .with_context(|| format!("unreadable date {:?}", row.date))?;
    let key = format!("{}|{}|{}", day, row.home.trim(), row.away.trim());
    let mut score_detail = Extra::new();
    put(&mut score_detail, "state", non_empty(&row.state));
    Ok(Game {
        id: Namespace::Kbl.from_key(&key)?,
        season_id: Some(season_id),
        league_id: Some(league_id),
        home_team_id: Some(home.id),
        away_team_id: Some(away.id),
        game_date: parse_kst_datetime(&day.to_string()),
        status: Some(status_from_korean(&row.state).unwrap_or(GameStatus::Unknown)),
        home_score: score(&row.home_score),
        away_score: score(&row.away_score),
        score_detail,
    })
}

/// Schedule team: the listed team if the name resolves, else a placeholder.
fn schedule_team(teams: &[Team], name: &str) -> Result<Team> {
    match resolve_team(teams, name) {
        Some(t) => Ok(t.clone()),
        None => Ok(Team::placeholder(kbl_team_id(name)?, name.trim())),
    }
}

pub async fn sync_all(store: &dyn Store, src: &dyn KblSource, year: i32) -> Result<JobStats> {
    let league_id = KBL_LEAGUE.ensure(store).await?;
    let season_id = store.ensure_season(league_id, year, true).await?;
    let mut stats = JobStats::default();

    let mut teams = Vec::new();
    let outcome = async {
        let mut unit = JobStats::default();
        for row in src.teams().await? {
            match kbl_team(&row) {
                Ok(t) => teams.push(t),
                Err(e) => {
                    debug!("team {:?}: {:#}", row.name, e);
                    unit.skipped += 1;
                }
            }
        }
        unit.rows = store.upsert_teams(&teams).await?;
        let pairs: Vec<_> = teams.iter().map(|t| (t.id, season_id)).collect();
        store.map_team_seasons(&pairs).await?;
        info!("KBL: {} teams", unit.rows);
        Ok::<_, anyhow::Error>(unit)
    }
    .await;
    stats.record("KBL teams", outcome);

    let outcome = async {
        let mut unit = JobStats::default();
        let mut players = Vec::new();
        let mut squads = Vec::new();
        for row in src.players().await? {
            let Some(team) = resolve_team(&teams, &row.team) else {
                debug!("player {}: unknown team {:?}", row.kbl_id, row.team);
                unit.skipped += 1;
                continue;
            };
            match kbl_player(&row) {
                Ok(p) => {
                    squads.push(SquadMembership {
                        player_id: p.id,
                        team_id: team.id,
                        season_id,
                        position: non_empty(&row.position),
                        jersey_number: None,
                        is_active: true,
                    });
                    players.push(p);
                }
                Err(e) => {
                    debug!("player {:?}: {:#}", row.kbl_id, e);
                    unit.skipped += 1;
                }
            }
        }
        unit.rows = store.upsert_players(&players).await?;
        store.upsert_squads(&squads).await?;
        info!("KBL: {} players", unit.rows);
        Ok::<_, anyhow::Error>(unit)
    }
    .await;
    stats.record("KBL players", outcome);

    let outcome = async {
        let mut unit = JobStats::default();
        let mut placeholders = Vec::new();
        let mut games = Vec::new();
        for row in src.schedule().await? {
            let converted = schedule_team(&teams, &row.home).and_then(|home| {
                let away = schedule_team(&teams, &row.away)?;
                let game = kbl_game(&row, league_id, season_id, year, &home, &away)?;
                Ok((home, away, game))
            });
            match converted {
                Ok((home, away, game)) => {
                    placeholders.extend([home, away]);
                    games.push(game);
                }
                Err(e) => {
                    debug!("game {:?}: {:#}", row, e);
                    unit.skipped += 1;
                }
            }
        }
        store.ensure_teams(&placeholders).await?;
        unit.rows = store.upsert_games(&games).await?;
        info!("KBL: {} games", unit.rows);
        Ok::<_, anyhow::Error>(unit)
    }
    .await;
    stats.record("KBL schedule", outcome);

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::SourceError;
    use crate::storage::MemoryStore;

    #[test]
    fn test_season_start_year() {
        let autumn = NaiveDate::from_ymd_opt(2025, 10, 18).unwrap();
        let spring = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert_eq!(season_start_year(autumn), 2025);
        assert_eq!(season_start_year(spring), 2025);
    }

    #[test]
    fn test_schedule_date_crosses_new_year() {
        assert_eq!(
            schedule_date("10.19 (토)", 2025),
            NaiveDate::from_ymd_opt(2025, 10, 19)
        );
        assert_eq!(
            schedule_date("01.04 (일)", 2025),
            NaiveDate::from_ymd_opt(2026, 1, 4)
        );
        assert_eq!(schedule_date("미정", 2025), None);
    }

    #[test]
    fn test_resolve_team_by_short_name() {
        let teams = vec![
            Team::placeholder(1, "원주 DB"),
            Team::placeholder(2, "서울 SK"),
        ];
        assert_eq!(resolve_team(&teams, "DB").map(|t| t.id), Some(1));
        assert_eq!(resolve_team(&teams, "서울 SK").map(|t| t.id), Some(2));
        assert!(resolve_team(&teams, "KCC").is_none());
        assert!(resolve_team(&teams, " ").is_none());
    }

    struct FakeKbl;

    #[async_trait]
    impl KblSource for FakeKbl {
        async fn teams(&self) -> Result<Vec<KblTeamRow>, SourceError> {
            Ok(vec![
                KblTeamRow { kbl_id: "10".into(), name: "원주 DB".into() },
                KblTeamRow { kbl_id: "55".into(), name: "서울 SK".into() },
            ])
        }

        async fn players(&self) -> Result<Vec<KblPlayerRow>, SourceError> {
            Ok(vec![
                KblPlayerRow {
                    kbl_id: "290001".into(),
                    name: "김종규".into(),
                    position: "C".into(),
                    height: "207cm".into(),
                    team: "DB".into(),
                },
                KblPlayerRow {
                    kbl_id: "290002".into(),
                    name: "무소속".into(),
                    team: "".into(),
                    ..Default::default()
                },
            ])
        }

        async fn schedule(&self) -> Result<Vec<KblGameRow>, SourceError> {
            Ok(vec![
                KblGameRow {
                    date: "10.19 (토)".into(),
                    home: "DB".into(),
                    away: "SK".into(),
                    home_score: "88".into(),
                    away_score: "80".into(),
                    state: "종료".into(),
                },
                KblGameRow {
                    date: "01.04 (일)".into(),
                    home: "KCC".into(),
                    away: "DB".into(),
                    state: "예정".into(),
                    ..Default::default()
                },
            ])
        }
    }

    #[tokio::test]
    async fn test_sync_all() {
        let store = MemoryStore::new();
        let stats = sync_all(&store, &FakeKbl, 2025).await.unwrap();
        assert_eq!(stats.units, 3);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.skipped, 1);

        let db = kbl_team_id("원주 DB").unwrap();
        assert_eq!(store.team(db).unwrap().extra["kbl_id"], "10");

        let player = Namespace::Kbl.from_numeric("290001").unwrap();
        let p = store.player(player).unwrap();
        assert_eq!(p.height_cm, Some(207));
        assert_eq!(p.biometrics["position"], "C");
        assert_eq!(store.squads_of(player)[0].team_id, db);

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.games, 2);
        let kcc = store.team(kbl_team_id("KCC").unwrap()).unwrap();
        assert_eq!(kcc.name.as_deref(), Some("KCC"));

        let opener = Namespace::Kbl.from_key("2025-10-19|DB|SK").unwrap();
        let g = store.game(opener).unwrap();
        assert_eq!(g.home_team_id, Some(db));
        assert_eq!((g.home_score, g.away_score), (Some(88), Some(80)));
        assert_eq!(g.status, Some(GameStatus::Final));
        assert_eq!(
            g.game_date.map(|d| d.to_rfc3339()).as_deref(),
            Some("2025-10-18T15:00:00+00:00")
        );
        let later = Namespace::Kbl.from_key("2026-01-04|KCC|DB").unwrap();
        assert_eq!(store.game(later).unwrap().home_score, None);
    }

    #[test]
    fn test_kbl_player_rejects_non_numeric_id() {
        let row = KblPlayerRow {
            kbl_id: "abc".into(),
            ..Default::default()
        };
        assert!(kbl_player(&row).is_err());
    }
}
