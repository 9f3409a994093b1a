//! Sports, leagues, teams and team-season mapping from ESPN.

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::EspnLeague;
use crate::error::SourceError;
use crate::ids::Namespace;
use crate::models::{League, Sport, Team, put};
use crate::sources::EspnSource;
use crate::sources::espn::{LeagueInfo, TeamRecord, TeamsPage};
use crate::storage::Store;

use super::{JobStats, SPORTS, ensure_sport};

/// Teams per page when a job wants the whole league.
pub const ALL_TEAMS: u32 = 1000;

pub fn espn_team(rec: &TeamRecord) -> Result<Team> {
    Ok(Team {
        id: Namespace::Espn.from_numeric(&rec.id)?,
        name: rec.name.clone(),
        code: rec.abbreviation.clone(),
        logo_url: rec.logo.clone(),
        ..Default::default()
    })
}

/// Convert what converts, counting the rest as skipped.
pub fn espn_teams<'a>(
    records: impl IntoIterator<Item = &'a TeamRecord>,
    stats: &mut JobStats,
) -> Vec<Team> {
    records
        .into_iter()
        .filter_map(|r| match espn_team(r) {
            Ok(t) => Some(t),
            Err(e) => {
                debug!("team {:?}: {}", r.id, e);
                stats.skipped += 1;
                None
            }
        })
        .collect()
}

fn league_row(cfg: &EspnLeague, info: &LeagueInfo, sport_id: i64) -> Result<League> {
    let mut extra = Default::default();
    put(&mut extra, "frontend_slug", cfg.frontend_slug.clone());
    Ok(League {
        id: Namespace::Espn.from_numeric(&info.id)?,
        sport_id: Some(sport_id),
        name: info.name.clone(),
        slug: Some(cfg.key.clone()),
        abbreviation: info.abbreviation.clone(),
        extra,
        ..Default::default()
    })
}

/// Insert or refresh the league row from the league block of a response.
pub async fn upsert_espn_league(
    store: &dyn Store,
    cfg: &EspnLeague,
    info: &LeagueInfo,
) -> Result<i64> {
    let sport_id = ensure_sport(store, &cfg.sport).await?;
    let league = league_row(cfg, info, sport_id)?;
    store.upsert_league(&league).await?;
    Ok(league.id)
}

/// League id for a catalogue entry: the stored row if any, else created from
/// the response's league block.
pub async fn ensure_espn_league(
    store: &dyn Store,
    cfg: &EspnLeague,
    info: Option<&LeagueInfo>,
) -> Result<i64> {
    if let Some(league) = store.league_by_slug(&cfg.key).await? {
        return Ok(league.id);
    }
    let info = info.ok_or_else(|| SourceError::Shape(format!("no league block for {}", cfg.key)))?;
    upsert_espn_league(store, cfg, info).await
}

/// League id and current season id, from the stored league row or the
/// response's league block, and the block's season year.
pub async fn league_season(
    store: &dyn Store,
    cfg: &EspnLeague,
    info: Option<&LeagueInfo>,
) -> Result<(i64, i64)> {
    let league_id = ensure_espn_league(store, cfg, info).await?;
    let year = info
        .and_then(|l| l.season_year)
        .with_context(|| format!("no season year for {}", cfg.key))?;
    let season_id = store.ensure_season(league_id, year, true).await?;
    Ok((league_id, season_id))
}

/// Full team list of a league; a failed call is recorded as a failed unit.
pub async fn fetch_teams(
    src: &dyn EspnSource,
    cfg: &EspnLeague,
    stats: &mut JobStats,
) -> Option<TeamsPage> {
    match src.teams(cfg, ALL_TEAMS).await {
        Ok(page) => Some(page),
        Err(e) => {
            stats.record(&cfg.key, Err(e.into()));
            None
        }
    }
}

pub async fn sync_sports(store: &dyn Store) -> Result<JobStats> {
    let mut stats = JobStats::default();
    for (name, slug) in SPORTS {
        let sport = Sport {
            name: name.to_string(),
            slug: slug.to_string(),
        };
        let outcome = store
            .upsert_sport(&sport)
            .await
            .map(|_| JobStats::rows(1))
            .map_err(anyhow::Error::from);
        stats.record(name, outcome);
    }
    Ok(stats)
}

pub async fn sync_leagues(
    store: &dyn Store,
    src: &dyn EspnSource,
    leagues: &[EspnLeague],
) -> Result<JobStats> {
    let mut stats = JobStats::default();
    for cfg in leagues {
        let outcome = async {
            // One team is enough to get the league block.
            let page = src.teams(cfg, 1).await?;
            let info = page
                .league
                .ok_or_else(|| SourceError::Shape("no league block".to_string()))?;
            upsert_espn_league(store, cfg, &info).await?;
            info!("{} → {}", cfg.key, info.name.as_deref().unwrap_or("?"));
            Ok::<_, anyhow::Error>(JobStats::rows(1))
        }
        .await;
        stats.record(&cfg.key, outcome);
    }
    Ok(stats)
}

pub async fn sync_teams(
    store: &dyn Store,
    src: &dyn EspnSource,
    leagues: &[EspnLeague],
) -> Result<JobStats> {
    let mut stats = JobStats::default();
    for cfg in leagues {
        let outcome = async {
            let page = src.teams(cfg, ALL_TEAMS).await?;
            let mut unit = JobStats::default();
            let teams = espn_teams(&page.teams, &mut unit);
            unit.rows = store.upsert_teams(&teams).await?;
            info!("{}: {} teams", cfg.key, unit.rows);
            Ok::<_, anyhow::Error>(unit)
        }
        .await;
        stats.record(&cfg.key, outcome);
    }
    Ok(stats)
}

pub async fn sync_team_seasons(
    store: &dyn Store,
    src: &dyn EspnSource,
    leagues: &[EspnLeague],
) -> Result<JobStats> {
    let mut stats = JobStats::default();
    for cfg in leagues {
        let outcome = async {
            let page = src.teams(cfg, ALL_TEAMS).await?;
            let (_, season_id) = league_season(store, cfg, page.league.as_ref()).await?;

            let mut unit = JobStats::default();
            let teams = espn_teams(&page.teams, &mut unit);
            store.ensure_teams(&teams).await?;
            let pairs: Vec<_> = teams.iter().map(|t| (t.id, season_id)).collect();
            unit.rows = store.map_team_seasons(&pairs).await?;
            info!("{}: {} teams mapped", cfg.key, unit.rows);
            Ok::<_, anyhow::Error>(unit)
        }
        .await;
        stats.record(&cfg.key, outcome);
    }
    Ok(stats)
}
