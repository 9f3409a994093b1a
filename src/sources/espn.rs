//! ESPN site (v2) and web (v3) JSON APIs.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::{EspnConfig, EspnLeague, HttpConfig};
use crate::error::SourceError;

use super::http_client::HttpClient;
use super::{EspnSource, value_score, value_str};

// ── Records handed to jobs ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeagueInfo {
    pub id: String,
    pub name: Option<String>,
    pub abbreviation: Option<String>,
    pub season_year: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamRecord {
    pub id: String,
    pub name: Option<String>,
    pub abbreviation: Option<String>,
    pub logo: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamsPage {
    pub league: Option<LeagueInfo>,
    pub teams: Vec<TeamRecord>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AthleteRecord {
    pub id: String,
    pub name: Option<String>,
    /// `6' 2"` style.
    pub display_height: Option<String>,
    /// `200 lbs` style.
    pub display_weight: Option<String>,
    pub height_in: Option<f64>,
    pub weight_lbs: Option<f64>,
    pub birth_date: Option<String>,
    pub birth_city: Option<String>,
    pub birth_country: Option<String>,
    pub headshot: Option<String>,
    pub bats: Option<String>,
    pub throws: Option<String>,
    pub position: Option<String>,
    pub jersey: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RosterPage {
    pub team: Option<TeamRecord>,
    pub athletes: Vec<AthleteRecord>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompetitorRecord {
    pub team: TeamRecord,
    pub score: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventRecord {
    pub id: String,
    pub date: Option<String>,
    pub status_name: Option<String>,
    pub status_detail: Option<String>,
    pub venue: Option<String>,
    pub home: Option<CompetitorRecord>,
    pub away: Option<CompetitorRecord>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreboardPage {
    pub league: Option<LeagueInfo>,
    pub events: Vec<EventRecord>,
}

/// The "Total" row of an athlete's splits, aligned with its column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AthleteSplits {
    pub names: Vec<String>,
    pub labels: Vec<String>,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GamelogEntry {
    pub event_id: String,
    pub game_date: Option<String>,
    pub season_type: Option<String>,
    pub names: Vec<String>,
    pub labels: Vec<String>,
    pub stats: Vec<String>,
}

// ── Wire format ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireTeamsResponse {
    sports: Vec<WireSport>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireSport {
    leagues: Vec<WireLeague>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireLeague {
    id: Value,
    name: Option<String>,
    abbreviation: Option<String>,
    season: Option<WireSeason>,
    teams: Vec<WireTeamEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireSeason {
    year: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireTeamEntry {
    team: WireTeam,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireTeam {
    id: Value,
    display_name: Option<String>,
    name: Option<String>,
    abbreviation: Option<String>,
    logos: Vec<WireHref>,
    logo: Option<String>,
    athletes: Vec<WireAthleteEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireHref {
    href: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireRosterResponse {
    team: Option<WireTeam>,
}

/// Rosters are flat for some sports and grouped by position for others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireAthleteEntry {
    Group { items: Vec<WireAthlete> },
    Single(WireAthlete),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireAthlete {
    id: Value,
    full_name: Option<String>,
    display_name: Option<String>,
    display_height: Option<String>,
    display_weight: Option<String>,
    height: Option<f64>,
    weight: Option<f64>,
    date_of_birth: Option<String>,
    birth_place: Option<WireBirthPlace>,
    headshot: Option<WireHref>,
    bats: Option<WireAbbrev>,
    throws: Option<WireAbbrev>,
    position: Option<WireAbbrev>,
    jersey: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireBirthPlace {
    city: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireAbbrev {
    abbreviation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireEventsResponse {
    leagues: Vec<WireLeague>,
    events: Vec<WireEvent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireEvent {
    id: Value,
    date: Option<String>,
    status: Option<WireStatus>,
    competitions: Vec<WireCompetition>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireStatus {
    #[serde(rename = "type")]
    kind: Option<WireStatusType>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireStatusType {
    name: Option<String>,
    detail: Option<String>,
    short_detail: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireCompetition {
    date: Option<String>,
    status: Option<WireStatus>,
    venue: Option<WireVenue>,
    competitors: Vec<WireCompetitor>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireVenue {
    full_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireCompetitor {
    id: Value,
    home_away: Option<String>,
    score: Value,
    team: Option<WireTeam>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireSplitsResponse {
    names: Vec<String>,
    labels: Vec<String>,
    split_categories: Vec<WireSplitCategory>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireSplitCategory {
    name: Option<String>,
    splits: Vec<WireSplit>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireSplit {
    abbreviation: Option<String>,
    display_name: Option<String>,
    stats: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireGamelogResponse {
    names: Vec<String>,
    labels: Vec<String>,
    /// Keyed by event id.
    events: BTreeMap<String, WireGamelogEvent>,
    season_types: Vec<WireSeasonType>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireGamelogEvent {
    game_date: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireSeasonType {
    display_name: Option<String>,
    categories: Vec<WireGamelogCategory>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireGamelogCategory {
    events: Vec<WireGamelogLine>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireGamelogLine {
    event_id: Value,
    game_date: Option<String>,
    date: Option<String>,
    stats: Vec<Value>,
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl WireTeam {
    fn record(&self, fallback_id: &Value) -> Option<TeamRecord> {
        let id = value_str(&self.id).or_else(|| value_str(fallback_id))?;
        let logo = self
            .logos
            .iter()
            .find_map(|l| l.href.clone())
            .or_else(|| self.logo.clone());
        Some(TeamRecord {
            id,
            name: self.display_name.clone().or_else(|| self.name.clone()),
            abbreviation: self.abbreviation.clone(),
            logo,
        })
    }
}

impl WireLeague {
    fn info(&self) -> Option<LeagueInfo> {
        Some(LeagueInfo {
            id: value_str(&self.id)?,
            name: self.name.clone(),
            abbreviation: self.abbreviation.clone(),
            season_year: self
                .season
                .as_ref()
                .and_then(|s| value_str(&s.year))
                .and_then(|y| y.parse().ok()),
        })
    }
}

impl WireAthlete {
    fn record(self) -> Option<AthleteRecord> {
        let id = value_str(&self.id)?;
        let abbrev = |a: Option<WireAbbrev>| a.and_then(|a| a.abbreviation);
        let (birth_city, birth_country) = match self.birth_place {
            Some(p) => (p.city, p.country),
            None => (None, None),
        };
        Some(AthleteRecord {
            id,
            name: self.full_name.or(self.display_name),
            display_height: self.display_height,
            display_weight: self.display_weight,
            height_in: self.height,
            weight_lbs: self.weight,
            birth_date: self.date_of_birth,
            birth_city,
            birth_country,
            headshot: self.headshot.and_then(|h| h.href),
            bats: abbrev(self.bats),
            throws: abbrev(self.throws),
            position: abbrev(self.position),
            jersey: value_str(&self.jersey),
        })
    }
}

impl WireEvent {
    fn record(self) -> Option<EventRecord> {
        let id = value_str(&self.id)?;
        let mut comps = self.competitions.into_iter();
        let comp = comps.next().unwrap_or_default();

        let status = self
            .status
            .and_then(|s| s.kind)
            .or_else(|| comp.status.and_then(|s| s.kind));
        let (status_name, status_detail) = match status {
            Some(t) => (t.name, t.detail.or(t.short_detail)),
            None => (None, None),
        };

        let mut home = None;
        let mut away = None;
        for c in comp.competitors {
            let Some(team) = c.team.as_ref().and_then(|t| t.record(&c.id)) else {
                continue;
            };
            let rec = CompetitorRecord {
                team,
                score: value_score(&c.score),
            };
            match c.home_away.as_deref() {
                Some("home") => home = Some(rec),
                Some("away") => away = Some(rec),
                _ => {}
            }
        }

        Some(EventRecord {
            id,
            date: self.date.or(comp.date),
            status_name,
            status_detail,
            venue: comp.venue.and_then(|v| v.full_name),
            home,
            away,
        })
    }
}

// ── Pure parsers ──────────────────────────────────────────────────────────────

pub fn parse_teams(body: &str) -> Result<TeamsPage, SourceError> {
    let resp: WireTeamsResponse = serde_json::from_str(body)?;
    let Some(league) = resp.sports.into_iter().flat_map(|s| s.leagues).next() else {
        return Ok(TeamsPage::default());
    };
    let teams = league
        .teams
        .iter()
        .filter_map(|e| e.team.record(&Value::Null))
        .collect();
    Ok(TeamsPage {
        league: league.info(),
        teams,
    })
}

pub fn parse_roster(body: &str) -> Result<RosterPage, SourceError> {
    let resp: WireRosterResponse = serde_json::from_str(body)?;
    let Some(mut team) = resp.team else {
        return Ok(RosterPage::default());
    };
    let entries = std::mem::take(&mut team.athletes);
    let athletes = entries
        .into_iter()
        .flat_map(|e| match e {
            WireAthleteEntry::Group { items } => items,
            WireAthleteEntry::Single(a) => vec![a],
        })
        .filter_map(WireAthlete::record)
        .collect();
    Ok(RosterPage {
        team: team.record(&Value::Null),
        athletes,
    })
}

pub fn parse_events(body: &str) -> Result<ScoreboardPage, SourceError> {
    let resp: WireEventsResponse = serde_json::from_str(body)?;
    Ok(ScoreboardPage {
        league: resp.leagues.first().and_then(WireLeague::info),
        events: resp.events.into_iter().filter_map(WireEvent::record).collect(),
    })
}

pub fn parse_splits(body: &str) -> Result<Option<AthleteSplits>, SourceError> {
    let resp: WireSplitsResponse = serde_json::from_str(body)?;
    let total = resp
        .split_categories
        .iter()
        .filter(|c| c.name.as_deref() == Some("split"))
        .flat_map(|c| c.splits.iter())
        .find(|s| {
            s.abbreviation.as_deref() == Some("Total") || s.display_name.as_deref() == Some("Total")
        });
    Ok(total.map(|t| AthleteSplits {
        names: resp.names.clone(),
        labels: resp.labels.clone(),
        values: t
            .stats
            .iter()
            .map(|v| value_str(v).unwrap_or_default())
            .collect(),
    }))
}

pub fn parse_gamelog(body: &str) -> Result<Vec<GamelogEntry>, SourceError> {
    let resp: WireGamelogResponse = serde_json::from_str(body)?;
    let mut out = Vec::new();
    for st in resp.season_types {
        for cat in st.categories {
            for line in cat.events {
                let Some(event_id) = value_str(&line.event_id) else {
                    continue;
                };
                let game_date = line.game_date.or(line.date).or_else(|| {
                    resp.events
                        .get(&event_id)
                        .and_then(|e| e.game_date.clone().or_else(|| e.date.clone()))
                });
                out.push(GamelogEntry {
                    event_id,
                    game_date,
                    season_type: st.display_name.clone(),
                    names: resp.names.clone(),
                    labels: resp.labels.clone(),
                    stats: line
                        .stats
                        .iter()
                        .map(|v| value_str(v).unwrap_or_default())
                        .collect(),
                });
            }
        }
    }
    Ok(out)
}

// ── HTTP client ───────────────────────────────────────────────────────────────

pub struct EspnApi {
    client: HttpClient,
    site_base: String,
    web_base: String,
}

impl EspnApi {
    pub fn new(http: &HttpConfig, espn: &EspnConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(http)?,
            site_base: espn.site_base.trim_end_matches('/').to_string(),
            web_base: espn.web_base.trim_end_matches('/').to_string(),
        })
    }

    fn site_url(&self, league: &EspnLeague, path: &str) -> String {
        format!("{}/{}/{}/{}", self.site_base, league.sport, league.key, path)
    }

    fn athlete_url(
        &self,
        league: &EspnLeague,
        athlete_id: &str,
        view: &str,
        season: i32,
    ) -> Result<String, SourceError> {
        let base = format!(
            "{}/{}/{}/athletes/{}/{}",
            self.web_base, league.sport, league.key, athlete_id, view
        );
        let season = season.to_string();
        Ok(Url::parse_with_params(&base, &[("season", season.as_str())])?.to_string())
    }
}

/// The web API answers 404 for athletes without a record that season.
fn not_found_as_empty(res: Result<String, SourceError>) -> Result<Option<String>, SourceError> {
    match res {
        Ok(body) => Ok(Some(body)),
        Err(SourceError::Status { status, url }) if status == reqwest::StatusCode::NOT_FOUND => {
            debug!("no record at {}", url);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[async_trait]
impl EspnSource for EspnApi {
    async fn teams(&self, league: &EspnLeague, limit: u32) -> Result<TeamsPage, SourceError> {
        let limit = limit.to_string();
        let url = Url::parse_with_params(
            &self.site_url(league, "teams"),
            &[("limit", limit.as_str())],
        )?;
        let body = self.client.get_text(url.as_str()).await?;
        parse_teams(&body)
    }

    async fn roster(&self, league: &EspnLeague, team_id: &str) -> Result<RosterPage, SourceError> {
        let url = Url::parse_with_params(
            &self.site_url(league, &format!("teams/{team_id}")),
            &[("enable", "roster")],
        )?;
        let body = self.client.get_text(url.as_str()).await?;
        parse_roster(&body)
    }

    async fn schedule(
        &self,
        league: &EspnLeague,
        team_id: &str,
    ) -> Result<Vec<EventRecord>, SourceError> {
        let url = self.site_url(league, &format!("teams/{team_id}/schedule"));
        let body = self.client.get_text(&url).await?;
        Ok(parse_events(&body)?.events)
    }

    async fn scoreboard(&self, league: &EspnLeague) -> Result<ScoreboardPage, SourceError> {
        let url = self.site_url(league, "scoreboard");
        let body = self.client.get_text(&url).await?;
        parse_events(&body)
    }

    async fn splits(
        &self,
        league: &EspnLeague,
        athlete_id: &str,
        season: i32,
    ) -> Result<Option<AthleteSplits>, SourceError> {
        let url = self.athlete_url(league, athlete_id, "splits", season)?;
        match not_found_as_empty(self.client.get_text(&url).await)? {
            Some(body) => parse_splits(&body),
            None => Ok(None),
        }
    }

    async fn gamelog(
        &self,
        league: &EspnLeague,
        athlete_id: &str,
        season: i32,
    ) -> Result<Vec<GamelogEntry>, SourceError> {
        let url = self.athlete_url(league, athlete_id, "gamelog", season)?;
        match not_found_as_empty(self.client.get_text(&url).await)? {
            Some(body) => parse_gamelog(&body),
            None => Ok(Vec::new()),
        }
    }
}
