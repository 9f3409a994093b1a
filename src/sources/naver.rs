//! Naver sports schedule feed for the KBO and K League.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::config::{HttpConfig, NaverConfig};
use crate::error::SourceError;

use super::http_client::HttpClient;
use super::{NaverSource, value_score, value_str};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaverCategory {
    Kbo,
    Kleague,
}

impl NaverCategory {
    pub fn upper_category(self) -> &'static str {
        match self {
            NaverCategory::Kbo => "kbaseball",
            NaverCategory::Kleague => "kfootball",
        }
    }

    pub fn category(self) -> &'static str {
        match self {
            NaverCategory::Kbo => "kbo",
            NaverCategory::Kleague => "kleague",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NaverSide {
    pub code: Option<String>,
    pub name: Option<String>,
    pub score: Option<i32>,
    pub emblem_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NaverGame {
    pub game_id: String,
    /// Local Korean time, no offset.
    pub date_time: Option<String>,
    pub status_code: Option<String>,
    pub status_text: String,
    pub stadium: Option<String>,
    pub home: NaverSide,
    pub away: NaverSide,
    /// Per-period breakdown, kept as delivered.
    pub score: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireResponse {
    result: WireResult,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireResult {
    games: Vec<WireGame>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireGame {
    game_id: Value,
    game_date_time: Option<String>,
    game_date: Option<String>,
    status_code: Option<String>,
    /// Either a plain string or `{"name": ...}`.
    status_info: Value,
    stadium: Option<String>,
    home_team_code: Value,
    home_team_name: Option<String>,
    home_team_score: Value,
    home_team_emblem_url: Option<String>,
    away_team_code: Value,
    away_team_name: Option<String>,
    away_team_score: Value,
    away_team_emblem_url: Option<String>,
    score: Option<Value>,
}

impl WireGame {
    fn record(self) -> Option<NaverGame> {
        let game_id = value_str(&self.game_id)?;
        let status_text = match &self.status_info {
            Value::Object(map) => map.get("name").and_then(value_str),
            other => value_str(other),
        }
        .unwrap_or_default();

        Some(NaverGame {
            game_id,
            date_time: self.game_date_time.or(self.game_date),
            status_code: self.status_code,
            status_text,
            stadium: self.stadium,
            home: NaverSide {
                code: value_str(&self.home_team_code),
                name: self.home_team_name,
                score: value_score(&self.home_team_score),
                emblem_url: self.home_team_emblem_url,
            },
            away: NaverSide {
                code: value_str(&self.away_team_code),
                name: self.away_team_name,
                score: value_score(&self.away_team_score),
                emblem_url: self.away_team_emblem_url,
            },
            score: self.score.filter(|v| !v.is_null()),
        })
    }
}

pub fn parse_games(body: &str) -> Result<Vec<NaverGame>, SourceError> {
    let resp: WireResponse = serde_json::from_str(body)?;
    Ok(resp
        .result
        .games
        .into_iter()
        .filter_map(WireGame::record)
        .collect())
}

pub struct NaverApi {
    client: HttpClient,
    schedule_url: String,
    page_size: u32,
}

impl NaverApi {
    pub fn new(http: &HttpConfig, naver: &NaverConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(http)?,
            schedule_url: naver.schedule_url.clone(),
            page_size: naver.page_size,
        })
    }

    fn games_url(
        &self,
        category: NaverCategory,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Url, SourceError> {
        let from = from.format("%Y-%m-%d").to_string();
        let to = to.format("%Y-%m-%d").to_string();
        let size = self.page_size.to_string();
        Ok(Url::parse_with_params(
            &self.schedule_url,
            &[
                ("fields", "basic,status,team,score"),
                ("upperCategoryId", category.upper_category()),
                ("categoryId", category.category()),
                ("fromDate", from.as_str()),
                ("toDate", to.as_str()),
                ("size", size.as_str()),
            ],
        )?)
    }
}

#[async_trait]
impl NaverSource for NaverApi {
    async fn games(
        &self,
        category: NaverCategory,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaverGame>, SourceError> {
        let url = self.games_url(category, from, to)?;
        let body = self.client.get_text(url.as_str()).await?;
        parse_games(&body)
    }
}
