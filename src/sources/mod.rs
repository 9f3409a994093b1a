pub mod espn;
pub mod http_client;
pub mod kbl_site;
pub mod kbo_site;
pub mod kleague_site;
pub mod naver;

use async_trait::async_trait;
use chrono::NaiveDate;
use scraper::{ElementRef, Selector};
use serde_json::Value;

use crate::config::EspnLeague;
use crate::error::SourceError;

use self::espn::{AthleteSplits, EventRecord, GamelogEntry, RosterPage, ScoreboardPage, TeamsPage};
use self::kbl_site::{KblGameRow, KblPlayerRow, KblTeamRow};
use self::kbo_site::{KboPage, KboPlayerRow, StatPage};
use self::kleague_site::{KleaguePosition, KleagueProfile};
use self::naver::{NaverCategory, NaverGame};

pub use self::espn::EspnApi;
pub use self::http_client::HttpClient;
pub use self::kbl_site::KblSite;
pub use self::kbo_site::KboSite;
pub use self::kleague_site::KleagueSite;
pub use self::naver::NaverApi;

// ── Source traits ─────────────────────────────────────────────────────────────
//
// Every call yields zero or more raw records or fails as a whole. Jobs log a
// failed call and move on to the next unit.

#[async_trait]
pub trait EspnSource: Send + Sync {
    async fn teams(&self, league: &EspnLeague, limit: u32) -> Result<TeamsPage, SourceError>;

    async fn roster(&self, league: &EspnLeague, team_id: &str) -> Result<RosterPage, SourceError>;

    async fn schedule(
        &self,
        league: &EspnLeague,
        team_id: &str,
    ) -> Result<Vec<EventRecord>, SourceError>;

    async fn scoreboard(&self, league: &EspnLeague) -> Result<ScoreboardPage, SourceError>;

    /// Season totals; `None` when the athlete has no "Total" split.
    async fn splits(
        &self,
        league: &EspnLeague,
        athlete_id: &str,
        season: i32,
    ) -> Result<Option<AthleteSplits>, SourceError>;

    async fn gamelog(
        &self,
        league: &EspnLeague,
        athlete_id: &str,
        season: i32,
    ) -> Result<Vec<GamelogEntry>, SourceError>;
}

#[async_trait]
pub trait NaverSource: Send + Sync {
    async fn games(
        &self,
        category: NaverCategory,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaverGame>, SourceError>;
}

#[async_trait]
pub trait KboSource: Send + Sync {
    /// Every page of the player search for one site team code.
    async fn team_players(&self, team_code: &str) -> Result<Vec<KboPlayerRow>, SourceError>;

    async fn stat_page(&self, page: KboPage, player_id: u64) -> Result<StatPage, SourceError>;
}

#[async_trait]
pub trait KleagueSource: Send + Sync {
    /// Player ids on one listing page; empty past the last page.
    async fn player_ids(
        &self,
        position: KleaguePosition,
        page: u32,
    ) -> Result<Vec<String>, SourceError>;

    async fn profile(&self, player_id: &str) -> Result<KleagueProfile, SourceError>;
}

#[async_trait]
pub trait KblSource: Send + Sync {
    async fn teams(&self) -> Result<Vec<KblTeamRow>, SourceError>;

    async fn players(&self) -> Result<Vec<KblPlayerRow>, SourceError>;

    async fn schedule(&self) -> Result<Vec<KblGameRow>, SourceError>;
}

// ── Shared parsing helpers ────────────────────────────────────────────────────

pub(crate) fn sel(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Selector(format!("{css}: {e:?}")))
}

/// Whitespace-collapsed text content of an element.
pub(crate) fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Ids show up as strings or numbers depending on the endpoint.
pub(crate) fn value_str(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Scores come as `"3"`, `3`, `3.0` or `{"value": 3.0, "displayValue": "3"}`.
pub(crate) fn value_score(v: &Value) -> Option<i32> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i32>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i32))
        }
        Value::Object(map) => map
            .get("value")
            .and_then(value_score)
            .or_else(|| map.get("displayValue").and_then(value_score)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_score() {
        assert_eq!(value_score(&json!("3")), Some(3));
        assert_eq!(value_score(&json!(2)), Some(2));
        assert_eq!(value_score(&json!(4.0)), Some(4));
        assert_eq!(value_score(&json!({"value": 1.0, "displayValue": "1"})), Some(1));
        assert_eq!(value_score(&json!({"displayValue": "5"})), Some(5));
        assert_eq!(value_score(&json!("")), None);
        assert_eq!(value_score(&json!(null)), None);
    }

    #[test]
    fn test_value_str() {
        assert_eq!(value_str(&json!("359")), Some("359".into()));
        assert_eq!(value_str(&json!(359)), Some("359".into()));
        assert_eq!(value_str(&json!(" ")), None);
        assert_eq!(value_str(&json!(null)), None);
    }

    #[test]
    fn test_text_of() {
        let doc = scraper::Html::parse_fragment("<p> 두산\n   베어스 <b>2</b></p>");
        let p = doc.select(&sel("p").unwrap()).next().unwrap();
        assert_eq!(text_of(p), "두산 베어스 2");
    }
}
