//! Players and squad membership from ESPN team rosters.

use anyhow::Result;
use tracing::{debug, info};

use crate::config::EspnLeague;
use crate::ids::Namespace;
use crate::models::{Player, SquadMembership, put};
use crate::normalize::{parse_birth_date, parse_height_cm, parse_jersey, parse_weight_kg};
use crate::sources::EspnSource;
use crate::sources::espn::AthleteRecord;
use crate::storage::Store;

use super::JobStats;
use super::espn_catalog::{espn_team, fetch_teams, league_season};

pub fn espn_player(a: &AthleteRecord) -> Result<Player> {
    let height_cm = a
        .display_height
        .as_deref()
        .and_then(parse_height_cm)
        .or_else(|| a.height_in.map(|inches| (inches * 2.54) as i32));
    let weight_kg = a
        .display_weight
        .as_deref()
        .and_then(parse_weight_kg)
        .or_else(|| a.weight_lbs.map(|lbs| (lbs * 0.453592) as i32));

    let mut biometrics = Default::default();
    put(&mut biometrics, "birthCity", a.birth_city.clone());
    put(&mut biometrics, "bats", a.bats.clone());
    put(&mut biometrics, "throws", a.throws.clone());

    Ok(Player {
        id: Namespace::Espn.from_numeric(&a.id)?,
        name: a.name.clone(),
        birth_date: a.birth_date.as_deref().and_then(parse_birth_date),
        height_cm,
        weight_kg,
        nationality: a.birth_country.clone(),
        photo_url: a.headshot.clone(),
        biometrics,
        ..Default::default()
    })
}

pub fn espn_players(athletes: &[AthleteRecord], stats: &mut JobStats) -> Vec<Player> {
    athletes
        .iter()
        .filter_map(|a| match espn_player(a) {
            Ok(p) => Some(p),
            Err(e) => {
                debug!("athlete {:?}: {}", a.id, e);
                stats.skipped += 1;
                None
            }
        })
        .collect()
}

pub async fn sync_rosters(
    store: &dyn Store,
    src: &dyn EspnSource,
    leagues: &[EspnLeague],
) -> Result<JobStats> {
    let mut stats = JobStats::default();
    for cfg in leagues {
        let Some(page) = fetch_teams(src, cfg, &mut stats).await else {
            continue;
        };
        for rec in &page.teams {
            let outcome = async {
                let roster = src.roster(cfg, &rec.id).await?;
                let mut unit = JobStats::default();
                store.upsert_teams(&[espn_team(rec)?]).await?;
                let players = espn_players(&roster.athletes, &mut unit);
                unit.rows = store.upsert_players(&players).await?;
                debug!("{} {}: {} players", cfg.key, rec.id, unit.rows);
                Ok::<_, anyhow::Error>(unit)
            }
            .await;
            stats.record(format!("{} team {}", cfg.key, rec.id), outcome);
        }
        info!("{}: rosters done ({})", cfg.key, stats);
    }
    Ok(stats)
}

pub async fn sync_squads(
    store: &dyn Store,
    src: &dyn EspnSource,
    leagues: &[EspnLeague],
) -> Result<JobStats> {
    let mut stats = JobStats::default();
    for cfg in leagues {
        let Some(page) = fetch_teams(src, cfg, &mut stats).await else {
            continue;
        };
        let season_id = match league_season(store, cfg, page.league.as_ref()).await {
            Ok((_, id)) => id,
            Err(e) => {
                stats.record(&cfg.key, Err(e));
                continue;
            }
        };

        for rec in &page.teams {
            let outcome = async {
                let roster = src.roster(cfg, &rec.id).await?;
                let mut unit = JobStats::default();
                let team = espn_team(rec)?;
                store.ensure_teams(std::slice::from_ref(&team)).await?;

                let players = espn_players(&roster.athletes, &mut unit);
                store.ensure_players(&players).await?;

                let rows: Vec<_> = roster
                    .athletes
                    .iter()
                    .filter_map(|a| {
                        let player_id = Namespace::Espn.from_numeric(&a.id).ok()?;
                        Some(SquadMembership {
                            player_id,
                            team_id: team.id,
                            season_id,
                            position: a.position.clone(),
                            jersey_number: a.jersey.as_deref().and_then(parse_jersey),
                            is_active: true,
                        })
                    })
                    .collect();
                unit.rows = store.upsert_squads(&rows).await?;
                Ok::<_, anyhow::Error>(unit)
            }
            .await;
            stats.record(format!("{} team {}", cfg.key, rec.id), outcome);
        }
        info!("{}: squads done ({})", cfg.key, stats);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::test_support::{FakeEspn, athlete, espn_league, team};
    use crate::sources::espn::RosterPage;
    use crate::storage::MemoryStore;

    fn judge() -> AthleteRecord {
        AthleteRecord {
            display_height: Some("6' 7\"".to_string()),
            display_weight: Some("282 lbs".to_string()),
            birth_city: Some("Linden".to_string()),
            birth_country: Some("USA".to_string()),
            bats: Some("R".to_string()),
            position: Some("RF".to_string()),
            jersey: Some("99".to_string()),
            birth_date: Some("1992-04-26T07:00Z".to_string()),
            ..athlete("33192", "Aaron Judge")
        }
    }

    fn fake() -> FakeEspn {
        let mut src = FakeEspn::with_teams(vec![team("10", "Yankees"), team("11", "Missing")]);
        src.rosters.insert(
            "10".to_string(),
            RosterPage {
                team: Some(team("10", "Yankees")),
                athletes: vec![
                    judge(),
                    AthleteRecord {
                        jersey: Some("--".to_string()),
                        height_in: Some(74.0),
                        ..athlete("4001", "Prospect")
                    },
                    athlete("bad", "No Id"),
                ],
            },
        );
        src
    }

    #[test]
    fn test_espn_player() {
        let p = espn_player(&judge()).unwrap();
        assert_eq!(p.id, 33192);
        assert_eq!(p.height_cm, Some(200));
        assert_eq!(p.weight_kg, Some(127));
        assert_eq!(p.nationality.as_deref(), Some("USA"));
        assert_eq!(p.birth_date.map(|d| d.to_string()).as_deref(), Some("1992-04-26"));
        assert_eq!(p.biometrics["birthCity"], "Linden");
        assert_eq!(p.biometrics["bats"], "R");
        assert!(!p.biometrics.contains_key("throws"));
    }

    #[tokio::test]
    async fn test_sync_rosters() {
        let store = MemoryStore::new();
        let stats = sync_rosters(&store, &fake(), &[espn_league("baseball", "mlb")])
            .await
            .unwrap();
        assert_eq!(stats.units, 2);
        assert_eq!(stats.rows, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(store.player(4001).unwrap().height_cm, Some(187));
        assert_eq!(store.team(10).unwrap().name.as_deref(), Some("Yankees"));
    }

    #[tokio::test]
    async fn test_sync_squads() {
        let store = MemoryStore::new();
        let stats = sync_squads(&store, &fake(), &[espn_league("baseball", "mlb")])
            .await
            .unwrap();
        assert_eq!(stats.rows, 2);

        let squads = store.squads_of(33192);
        assert_eq!(squads.len(), 1);
        assert_eq!(squads[0].team_id, 10);
        assert_eq!(squads[0].jersey_number, Some(99));
        assert_eq!(squads[0].position.as_deref(), Some("RF"));
        assert!(squads[0].is_active);
        assert_eq!(store.squads_of(4001)[0].jersey_number, None);

        let season = store.current_season(23).await.unwrap().unwrap();
        assert_eq!(squads[0].season_id, season.id);
    }

    #[tokio::test]
    async fn test_squads_do_not_overwrite_roster_players() {
        let store = MemoryStore::new();
        let src = fake();
        let league = espn_league("baseball", "mlb");
        sync_rosters(&store, &src, std::slice::from_ref(&league)).await.unwrap();
        sync_squads(&store, &src, &[league]).await.unwrap();
        assert_eq!(store.player(33192).unwrap().weight_kg, Some(127));
    }
}
