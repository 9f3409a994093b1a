//! K League football: Naver schedule and kleague.com player pages.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, info};

use crate::ids::Namespace;
use crate::models::{Extra, Player, PlayerSeasonStat, SquadMembership, Team, put};
use crate::normalize::teams::{
    kleague_club_name, kleague_code_for, kleague_team_id, kleague_team_id_by_name,
};
use crate::normalize::{non_empty, parse_birth_date, parse_number};
use crate::sources::kleague_site::{KleaguePosition, KleagueProfile};
use crate::sources::naver::{NaverCategory, NaverSide};
use crate::sources::{KleagueSource, NaverSource};
use crate::storage::Store;

use super::kbo::{month_window, naver_game};
use super::{JobStats, KLEAGUE_LEAGUE};

// ── Games ─────────────────────────────────────────────────────────────────────

fn kleague_team(side: &NaverSide) -> Result<Team> {
    let code = side.code.as_deref().and_then(non_empty);
    let name = side.name.as_deref().and_then(non_empty);
    let id = match (&code, &name) {
        (Some(code), _) => kleague_team_id(code)?,
        (None, Some(name)) => kleague_team_id_by_name(name)?,
        (None, None) => anyhow::bail!("team without code or name"),
    };
    let canonical = code.as_deref().and_then(kleague_club_name).map(str::to_string);
    Ok(Team {
        id,
        name: canonical.or(name),
        code,
        logo_url: side.emblem_url.clone(),
        ..Default::default()
    })
}

pub async fn sync_games(
    store: &dyn Store,
    src: &dyn NaverSource,
    year: i32,
    months: RangeInclusive<u32>,
) -> Result<JobStats> {
    let league_id = KLEAGUE_LEAGUE.ensure(store).await?;
    let season_id = store.ensure_season(league_id, year, true).await?;

    let mut stats = JobStats::default();
    for month in months {
        let outcome = async {
            let (from, to) = month_window(year, month)?;
            let games = src.games(NaverCategory::Kleague, from, to).await?;
            let mut unit = JobStats::default();
            let mut teams = BTreeMap::new();
            let mut rows = Vec::with_capacity(games.len());

            for g in &games {
                let converted = kleague_team(&g.home).and_then(|home| {
                    let away = kleague_team(&g.away)?;
                    let game =
                        naver_game(Namespace::Kleague, g, league_id, season_id, home.id, away.id)?;
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
            info!("K League {}-{:02}: {} games", year, month, unit.rows);
            Ok::<_, anyhow::Error>(unit)
        }
        .await;
        stats.record(format!("K League {year}-{month:02}"), outcome);
    }
    Ok(stats)
}

// ── Players ───────────────────────────────────────────────────────────────────

/// Positive number from a cell like `190 cm`; blank or zero is unknown.
fn measure(s: Option<&str>) -> Option<i32> {
    s.map(parse_number).filter(|n| *n > 0)
}

pub fn kleague_player(
    site_id: &str,
    profile: &KleagueProfile,
    listed_as: KleaguePosition,
) -> Result<Player> {
    let position = profile
        .position
        .clone()
        .unwrap_or_else(|| listed_as.label().to_string());
    let mut biometrics = Extra::new();
    put(&mut biometrics, "position", Some(position));
    put(&mut biometrics, "back_no", measure(profile.back_no.as_deref()));
    put(&mut biometrics, "en_name", profile.en_name.clone());
    put(&mut biometrics, "team_name_raw", profile.team.clone());

    Ok(Player {
        id: Namespace::Kleague.from_numeric(site_id)?,
        name: profile.name.clone(),
        lastname: profile.en_name.clone(),
        birth_date: profile.birth.as_deref().and_then(parse_birth_date),
        height_cm: measure(profile.height.as_deref()),
        weight_kg: measure(profile.weight.as_deref()),
        nationality: profile
            .nationality
            .clone()
            .or_else(|| Some("South Korea".to_string())),
        photo_url: profile.photo_url.clone(),
        biometrics,
    })
}

/// K1, K2 and total columns of a season row. Goalkeepers count conceded
/// goals and clean sheets where outfield players count goals and assists.
pub fn season_line(cells: &[String], goalkeeper: bool) -> Option<Extra> {
    if cells.len() < 17 {
        return None;
    }
    let (second, third) = if goalkeeper {
        ("conceded", "clean_sheet")
    } else {
        ("goals", "assists")
    };
    let block = |start: usize| {
        json!({
            "apps": parse_number(&cells[start]),
            second: parse_number(&cells[start + 1]),
            third: parse_number(&cells[start + 2]),
        })
    };
    let mut stats = Extra::new();
    stats.insert("K1".into(), block(2));
    stats.insert("K2".into(), block(5));
    stats.insert("Total".into(), block(14));
    Some(stats)
}

/// Team row for a short club name printed on kleague.com.
fn site_team(name: &str) -> Result<Team> {
    let display = kleague_code_for(name)
        .and_then(kleague_club_name)
        .unwrap_or(name);
    Ok(Team::placeholder(kleague_team_id_by_name(name)?, display))
}

async fn sync_player(
    store: &dyn Store,
    src: &dyn KleagueSource,
    site_id: &str,
    listed_as: KleaguePosition,
    league_id: i64,
    current_season: i64,
) -> Result<JobStats> {
    let profile = src.profile(site_id).await?;
    let player = kleague_player(site_id, &profile, listed_as)?;
    store.upsert_players(std::slice::from_ref(&player)).await?;
    let mut unit = JobStats::rows(1);

    let goalkeeper = player
        .biometrics
        .get("position")
        .and_then(|p| p.as_str())
        .is_some_and(|p| p == "GK");

    let mut teams = BTreeMap::new();
    let mut lines = Vec::new();
    for cells in &profile.seasons {
        let Some(year) = cells
            .first()
            .filter(|y| !y.is_empty() && y.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|y| y.parse::<i32>().ok())
        else {
            continue;
        };
        let team_name = cells.get(1).map(|s| s.trim()).unwrap_or_default();
        let (Some(line), Ok(team)) = (season_line(cells, goalkeeper), site_team(team_name)) else {
            unit.skipped += 1;
            continue;
        };
        lines.push(PlayerSeasonStat {
            player_id: player.id,
            season_id: store.ensure_season(league_id, year, false).await?,
            team_id: team.id,
            stats: line,
        });
        teams.insert(team.id, team);
    }

    let mut squads = Vec::new();
    if let Some(name) = profile.team.as_deref().and_then(non_empty) {
        let team = site_team(&name)?;
        squads.push(SquadMembership {
            player_id: player.id,
            team_id: team.id,
            season_id: current_season,
            position: player
                .biometrics
                .get("position")
                .and_then(|p| p.as_str())
                .map(str::to_string),
            jersey_number: measure(profile.back_no.as_deref()),
            is_active: true,
        });
        teams.entry(team.id).or_insert(team);
    }

    let teams: Vec<_> = teams.into_values().collect();
    store.ensure_teams(&teams).await?;
    unit.rows += store.upsert_season_stats(&lines).await?;
    unit.rows += store.upsert_squads(&squads).await?;
    Ok(unit)
}

pub async fn sync_players(
    store: &dyn Store,
    src: &dyn KleagueSource,
    max_pages: u32,
    current_year: i32,
) -> Result<JobStats> {
    let league_id = KLEAGUE_LEAGUE.ensure(store).await?;
    let current_season = store
        .ensure_season(league_id, current_year, true)
        .await
        .context("Failed to create the current K League season")?;

    let mut stats = JobStats::default();
    for position in KleaguePosition::ALL {
        for page in 1..=max_pages {
            let ids = match src.player_ids(position, page).await {
                Ok(ids) => ids,
                Err(e) => {
                    stats.record(format!("{} page {}", position.label(), page), Err(e.into()));
                    break;
                }
            };
            if ids.is_empty() {
                debug!("{}: {} pages", position.label(), page - 1);
                break;
            }
            for site_id in &ids {
                let outcome =
                    sync_player(store, src, site_id, position, league_id, current_season).await;
                stats.record(format!("player {site_id}"), outcome);
            }
        }
        info!("{}: done ({})", position.label(), stats);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::error::SourceError;
    use crate::ingest::test_support::{CountingStore, FakeNaver};
    use crate::sources::naver::NaverGame;
    use crate::storage::MemoryStore;

    fn coded(code: &str, name: &str, score: Option<i32>) -> NaverSide {
        NaverSide {
            code: Some(code.to_string()),
            name: Some(name.to_string()),
            score,
            emblem_url: Some(format!("https://emblem/{code}.png")),
        }
    }

    #[tokio::test]
    async fn test_sync_games_per_month() {
        let store = MemoryStore::new();
        let src = FakeNaver {
            games: vec![NaverGame {
                game_id: "20240301K1050129".into(),
                date_time: Some("2024-03-01T14:00:00".into()),
                status_text: "종료".into(),
                home: coded("05", "전북", Some(1)),
                away: coded("29", "수원FC", Some(1)),
                ..Default::default()
            }],
            ..Default::default()
        };

        let stats = sync_games(&store, &src, 2024, 3..=5).await.unwrap();
        assert_eq!(stats.units, 3);
        assert_eq!(src.calls.lock().unwrap().len(), 3);
        assert_eq!(store.counts().await.unwrap().games, 1);

        let jeonbuk = store.team(900_000_000_000_005).unwrap();
        assert_eq!(jeonbuk.name.as_deref(), Some("전북 현대 모터스"));
        assert_eq!(jeonbuk.logo_url.as_deref(), Some("https://emblem/05.png"));
        assert!(store.team(900_000_000_000_029).is_some());
    }

    #[test]
    fn test_season_line_keys() {
        let mut row: Vec<String> = (0..17).map(|i| i.to_string()).collect();
        row[0] = "2023".into();
        let outfield = season_line(&row, false).unwrap();
        assert_eq!(outfield["K1"]["goals"], 3);
        assert_eq!(outfield["Total"]["assists"], 16);
        let keeper = season_line(&row, true).unwrap();
        assert_eq!(keeper["K2"]["clean_sheet"], 7);
        assert!(keeper["K1"].get("goals").is_none());
        assert!(season_line(&row[..16], false).is_none());
    }

    #[derive(Default)]
    struct FakeKleague {
        listings: HashMap<(&'static str, u32), Vec<String>>,
        profiles: HashMap<String, KleagueProfile>,
    }

    #[async_trait]
    impl KleagueSource for FakeKleague {
        async fn player_ids(
            &self,
            position: KleaguePosition,
            page: u32,
        ) -> Result<Vec<String>, SourceError> {
            Ok(self
                .listings
                .get(&(position.code(), page))
                .cloned()
                .unwrap_or_default())
        }

        async fn profile(&self, player_id: &str) -> Result<KleagueProfile, SourceError> {
            self.profiles
                .get(player_id)
                .cloned()
                .ok_or_else(|| SourceError::Shape(format!("no profile {player_id}")))
        }
    }

    #[tokio::test]
    async fn test_sync_players() {
        let store = CountingStore::default();
        let mut src = FakeKleague::default();
        src.listings
            .insert(("df", 1), vec!["20230123".into(), "20239999".into()]);
        let mut season: Vec<String> = vec!["0".into(); 17];
        season[0] = "2023".into();
        season[1] = "전북".into();
        season[2] = "30".into();
        season[3] = "2".into();
        let mut earlier = season.clone();
        earlier[0] = "2022".into();
        src.profiles.insert(
            "20230123".into(),
            KleagueProfile {
                name: Some("김민재".into()),
                en_name: Some("KIM Minjae".into()),
                team: Some("전북".into()),
                back_no: Some("4".into()),
                height: Some("190 cm".into()),
                weight: Some("".into()),
                birth: Some("1996/11/15".into()),
                seasons: vec![season, earlier, vec!["합계".into()]],
                ..Default::default()
            },
        );

        let stats = sync_players(&store, &src, 3, 2025).await.unwrap();
        assert_eq!(stats.units, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(store.calls("upsert_season_stats"), 1);
        assert_eq!(store.calls("upsert_squads"), 1);
        assert_eq!(store.calls("ensure_teams"), 1);

        let id = Namespace::Kleague.from_numeric("20230123").unwrap();
        let p = store.inner.player(id).unwrap();
        assert_eq!(p.lastname.as_deref(), Some("KIM Minjae"));
        assert_eq!(p.height_cm, Some(190));
        assert_eq!(p.weight_kg, None);
        assert_eq!(p.nationality.as_deref(), Some("South Korea"));
        assert_eq!(p.biometrics["position"], "DF");

        let rows = store.inner.season_stats_of(id);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].stats["K1"]["apps"], 30);
        assert_eq!(rows[0].team_id, kleague_team_id("05").unwrap());

        let squads = store.inner.squads_of(id);
        assert_eq!(squads.len(), 1);
        assert_eq!(squads[0].jersey_number, Some(4));
        let league = store.league_by_slug("k-league").await.unwrap().unwrap();
        let current = store.current_season(league.id).await.unwrap().unwrap();
        assert_eq!(current.year, 2025);
        assert_eq!(squads[0].season_id, current.id);
    }
}
