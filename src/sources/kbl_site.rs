//! kbl.or.kr team, player and schedule listings.

use anyhow::Result;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::config::{HttpConfig, KblConfig};
use crate::error::SourceError;

use super::http_client::HttpClient;
use super::{KblSource, sel, text_of};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KblTeamRow {
    pub kbl_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KblPlayerRow {
    pub kbl_id: String,
    pub name: String,
    pub position: String,
    pub height: String,
    pub team: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KblGameRow {
    /// `10.19 (토)`; the year is not printed.
    pub date: String,
    pub home: String,
    pub away: String,
    pub home_score: String,
    pub away_score: String,
    /// `종료`, `예정`, ...
    pub state: String,
}

/// Last path segment of a link, `/team/intro/10` → `10`.
fn last_segment(href: &str) -> Option<String> {
    href.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(|s| s.split(['?', '#']).next().unwrap_or(s).trim().to_string())
        .filter(|s| !s.is_empty())
}

fn first_text(el: ElementRef<'_>, s: &Selector) -> String {
    el.select(s).next().map(text_of).unwrap_or_default()
}

pub fn parse_teams(html: &str) -> Result<Vec<KblTeamRow>, SourceError> {
    let doc = Html::parse_document(html);
    let li_sel = sel(".team_list li")?;
    let name_sel = sel(".name")?;
    let a_sel = sel("a[href]")?;

    Ok(doc
        .select(&li_sel)
        .filter_map(|li| {
            let name = first_text(li, &name_sel);
            let kbl_id = li
                .select(&a_sel)
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(last_segment)?;
            (!name.is_empty()).then_some(KblTeamRow { kbl_id, name })
        })
        .collect())
}

/// Number of pages offered by the desktop pager.
pub fn parse_page_count(html: &str) -> Result<u32, SourceError> {
    let doc = Html::parse_document(html);
    let opt_sel = sel("div.page.desktop select option")?;
    Ok(doc.select(&opt_sel).count().max(1) as u32)
}

pub fn parse_players(html: &str) -> Result<Vec<KblPlayerRow>, SourceError> {
    let doc = Html::parse_document(html);
    let row_sel = sel(".player_list tbody tr")?;
    let td_sel = sel("td")?;
    let name_sel = sel(".player_name a")?;

    let mut rows = Vec::new();
    for tr in doc.select(&row_sel) {
        let cols: Vec<_> = tr.select(&td_sel).collect();
        if cols.len() < 5 {
            continue;
        }
        let Some(link) = cols[1].select(&name_sel).next() else {
            continue;
        };
        let Some(kbl_id) = link.value().attr("href").and_then(last_segment) else {
            continue;
        };
        rows.push(KblPlayerRow {
            kbl_id,
            name: text_of(link),
            position: text_of(cols[2]),
            height: text_of(cols[3]),
            team: text_of(cols[4]),
        });
    }
    Ok(rows)
}

pub fn parse_schedule(html: &str) -> Result<Vec<KblGameRow>, SourceError> {
    let doc = Html::parse_document(html);
    let day_sel = sel(".schedule_list .day_list")?;
    let date_sel = sel(".date")?;
    let li_sel = sel("li")?;
    let home_name = sel(".team.home .name")?;
    let home_score = sel(".team.home .score")?;
    let away_name = sel(".team.away .name")?;
    let away_score = sel(".team.away .score")?;
    let state_sel = sel(".state")?;

    let mut games = Vec::new();
    for day in doc.select(&day_sel) {
        let date = first_text(day, &date_sel);
        for m in day.select(&li_sel) {
            let home = first_text(m, &home_name);
            let away = first_text(m, &away_name);
            if home.is_empty() || away.is_empty() {
                continue;
            }
            games.push(KblGameRow {
                date: date.clone(),
                home,
                away,
                home_score: first_text(m, &home_score),
                away_score: first_text(m, &away_score),
                state: first_text(m, &state_sel),
            });
        }
    }
    Ok(games)
}

pub struct KblSite {
    client: HttpClient,
    base_url: String,
}

impl KblSite {
    pub fn new(http: &HttpConfig, kbl: &KblConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(http)?,
            base_url: kbl.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl KblSource for KblSite {
    async fn teams(&self) -> Result<Vec<KblTeamRow>, SourceError> {
        let html = self
            .client
            .get_text(&format!("{}/team/intro", self.base_url))
            .await?;
        parse_teams(&html)
    }

    async fn players(&self) -> Result<Vec<KblPlayerRow>, SourceError> {
        let url = format!("{}/player/player", self.base_url);
        let first = self.client.get_text(&url).await?;
        let pages = parse_page_count(&first)?;
        let mut players = parse_players(&first)?;
        debug!("KBL player list: {} pages", pages);

        for page in 2..=pages {
            let html = self
                .client
                .get_text(&format!("{url}?page={page}"))
                .await?;
            players.extend(parse_players(&html)?);
        }
        Ok(players)
    }

    async fn schedule(&self) -> Result<Vec<KblGameRow>, SourceError> {
        let html = self
            .client
            .get_text(&format!("{}/match/schedule?type=SCHEDULE", self.base_url))
            .await?;
        parse_schedule(&html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_teams() {
        let html = r#"<ul class="team_list">
          <li><a href="/team/intro/10"><span class="name">원주 DB</span></a></li>
          <li><a href="/team/intro/35/"><span class="name">서울 SK</span></a></li>
          <li><span class="name">링크 없음</span></li>
        </ul>"#;
        let teams = parse_teams(html).unwrap();
        assert_eq!(teams.len(), 2);
        assert_eq!(teams[0], KblTeamRow { kbl_id: "10".into(), name: "원주 DB".into() });
        assert_eq!(teams[1].kbl_id, "35");
    }

    #[test]
    fn test_parse_players() {
        let html = r#"
          <div class="page desktop"><select><option value="1">1</option><option value="2">2</option></select></div>
          <table class="player_list"><tbody>
            <tr><td>1</td><td><span class="player_name"><a href="/player/player/290716">허웅</a></span></td>
                <td>G</td><td>185cm</td><td>부산 KCC</td></tr>
            <tr><td>2</td><td>no link</td><td>F</td><td>190cm</td><td>원주 DB</td></tr>
          </tbody></table>"#;
        assert_eq!(parse_page_count(html).unwrap(), 2);
        let rows = parse_players(html).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kbl_id, "290716");
        assert_eq!(rows[0].height, "185cm");
        assert_eq!(rows[0].team, "부산 KCC");
        assert_eq!(parse_page_count("<p></p>").unwrap(), 1);
    }

    #[test]
    fn test_parse_schedule() {
        let html = r#"<div class="schedule_list">
          <div class="day_list"><p class="date">10.19 (토)</p><ul>
            <li><div class="team home"><span class="name">부산 KCC</span><span class="score">77</span></div>
                <div class="team away"><span class="name">수원 KT</span><span class="score">90</span></div>
                <span class="state">종료</span></li>
          </ul></div>
          <div class="day_list"><p class="date">10.20 (일)</p><ul>
            <li><div class="team home"><span class="name">서울 SK</span><span class="score">-</span></div>
                <div class="team away"><span class="name">원주 DB</span><span class="score">-</span></div>
                <span class="state">예정</span></li>
          </ul></div>
        </div>"#;
        let games = parse_schedule(html).unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].date, "10.19 (토)");
        assert_eq!(games[0].home_score, "77");
        assert_eq!(games[0].state, "종료");
        assert_eq!(games[1].away, "원주 DB");
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("/team/intro/10").as_deref(), Some("10"));
        assert_eq!(last_segment("/player/player/290716?x=1").as_deref(), Some("290716"));
        assert_eq!(last_segment("").as_deref(), None);
    }
}
