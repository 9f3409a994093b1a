//! koreabaseball.com: player search and per-player record pages.
//!
//! The search page is an ASP.NET WebForm. Choosing a team or a page number
//! is a postback, so each step re-posts the hidden state fields of the
//! previous response with `__EVENTTARGET` naming the control that fired.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use scraper::Html;
use tracing::debug;

use crate::config::{HttpConfig, KboConfig};
use crate::error::SourceError;

use super::http_client::HttpClient;
use super::{KboSource, sel, text_of};

const TEAM_SELECT_ID: &str = "cphContents_cphContents_cphContents_ddlTeam";
const SEASON_SELECT_ID: &str = "cphContents_cphContents_cphContents_ddlSeason_ddlSeason";
const MAX_SEARCH_PAGES: u32 = 20;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KboPlayerRow {
    pub player_id: String,
    pub name: String,
    pub position: String,
    /// `1990.01.02`
    pub birth: String,
    /// `183cm, 85kg`
    pub height_weight: String,
    pub school: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KboPage {
    HitterCareer,
    HitterDetail,
    PitcherCareer,
    PitcherDetail,
}

impl KboPage {
    fn path(self) -> &'static str {
        match self {
            KboPage::HitterCareer => "Record/Player/HitterDetail/Total.aspx",
            KboPage::HitterDetail => "Record/Player/HitterDetail/Basic1.aspx",
            KboPage::PitcherCareer => "Record/Player/PitcherDetail/Total.aspx",
            KboPage::PitcherDetail => "Record/Player/PitcherDetail/Basic1.aspx",
        }
    }
}

/// One `<table>` flattened to text cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatTable {
    pub summary: String,
    pub class: String,
    /// All text inside the table, headers included.
    pub text: String,
    /// `tbody` rows, `td` cells only.
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatPage {
    /// Season picked in the page's season selector.
    pub season: Option<i32>,
    pub tables: Vec<StatTable>,
}

impl StatPage {
    pub fn find(&self, pred: impl Fn(&StatTable) -> bool) -> Option<&StatTable> {
        self.tables.iter().find(|t| pred(*t))
    }

    pub fn with_class<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a StatTable> {
        self.tables
            .iter()
            .filter(move |t| t.class.split_whitespace().any(|c| c == class))
    }
}

// ── Parsers ───────────────────────────────────────────────────────────────────

pub fn parse_player_rows(html: &str) -> Result<Vec<KboPlayerRow>, SourceError> {
    let doc = Html::parse_document(html);
    let row_sel = sel(".tEx tbody tr")?;
    let td_sel = sel("td")?;
    let a_sel = sel("a")?;

    let mut rows = Vec::new();
    for tr in doc.select(&row_sel) {
        let cells: Vec<_> = tr.select(&td_sel).collect();
        if cells.len() < 7 {
            continue;
        }
        let Some(link) = cells[1].select(&a_sel).next() else {
            continue;
        };
        let Some(player_id) = link
            .value()
            .attr("href")
            .and_then(|h| query_value(h, "playerId"))
        else {
            continue;
        };
        rows.push(KboPlayerRow {
            player_id,
            name: text_of(link),
            position: text_of(cells[3]),
            birth: text_of(cells[4]),
            height_weight: text_of(cells[5]),
            school: text_of(cells[6]),
        });
    }
    Ok(rows)
}

fn query_value(href: &str, key: &str) -> Option<String> {
    let (_, query) = href.split_once('?')?;
    query
        .split('&')
        .filter_map(|kv| kv.split_once('='))
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Hidden inputs (`__VIEWSTATE` and friends) to echo back on postback.
pub fn parse_hidden_fields(html: &str) -> Result<Vec<(String, String)>, SourceError> {
    let doc = Html::parse_document(html);
    let input_sel = sel("input[type=hidden]")?;
    Ok(doc
        .select(&input_sel)
        .filter_map(|i| {
            let name = i.value().attr("name")?;
            let value = i.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect())
}

/// Form name of the control with the given client id.
pub fn control_name(html: &str, id: &str) -> Result<Option<String>, SourceError> {
    let doc = Html::parse_document(html);
    let s = sel(&format!("#{id}"))?;
    Ok(doc
        .select(&s)
        .next()
        .and_then(|e| e.value().attr("name"))
        .map(str::to_string))
}

/// Postback target of the pager link labelled `page`.
pub fn page_target(html: &str, page: u32) -> Result<Option<String>, SourceError> {
    let doc = Html::parse_document(html);
    let a_sel = sel(".paging a")?;
    let label = page.to_string();
    let Ok(re) = Regex::new(r"__doPostBack\('([^']+)'") else {
        return Ok(None);
    };
    Ok(doc
        .select(&a_sel)
        .filter(|a| text_of(*a) == label)
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| re.captures(href).map(|c| c[1].to_string())))
}

pub fn parse_stat_page(html: &str) -> Result<StatPage, SourceError> {
    let doc = Html::parse_document(html);
    let season_sel = sel(&format!("#{SEASON_SELECT_ID} option"))?;
    let table_sel = sel("table")?;
    let row_sel = sel("tbody tr")?;
    let td_sel = sel("td")?;

    let options: Vec<_> = doc.select(&season_sel).collect();
    let season = options
        .iter()
        .find(|o| o.value().attr("selected").is_some())
        .or(options.first())
        .and_then(|o| text_of(*o).parse().ok());

    let tables = doc
        .select(&table_sel)
        .map(|t| StatTable {
            summary: t.value().attr("summary").unwrap_or_default().to_string(),
            class: t.value().attr("class").unwrap_or_default().to_string(),
            text: text_of(t),
            rows: t
                .select(&row_sel)
                .map(|tr| tr.select(&td_sel).map(text_of).collect())
                .collect(),
        })
        .collect();

    Ok(StatPage { season, tables })
}

fn set_field(form: &mut Vec<(String, String)>, key: &str, value: &str) {
    match form.iter_mut().find(|(k, _)| k == key) {
        Some(slot) => slot.1 = value.to_string(),
        None => form.push((key.to_string(), value.to_string())),
    }
}

// ── HTTP client ───────────────────────────────────────────────────────────────

pub struct KboSite {
    client: HttpClient,
    base_url: String,
}

impl KboSite {
    pub fn new(http: &HttpConfig, kbo: &KboConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(http)?,
            base_url: kbo.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn postback(
        &self,
        url: &str,
        prev_html: &str,
        target: &str,
        select_name: &str,
        team_code: &str,
    ) -> Result<String, SourceError> {
        let mut form = parse_hidden_fields(prev_html)?;
        set_field(&mut form, "__EVENTTARGET", target);
        set_field(&mut form, "__EVENTARGUMENT", "");
        set_field(&mut form, select_name, team_code);
        self.client.post_form(url, &form).await
    }
}

#[async_trait]
impl KboSource for KboSite {
    async fn team_players(&self, team_code: &str) -> Result<Vec<KboPlayerRow>, SourceError> {
        let url = format!("{}/Player/Search.aspx", self.base_url);
        let landing = self.client.get_text(&url).await?;
        let select_name = control_name(&landing, TEAM_SELECT_ID)?
            .ok_or_else(|| SourceError::Shape(format!("no team selector on {url}")))?;

        let mut html = self
            .postback(&url, &landing, &select_name, &select_name, team_code)
            .await?;
        let mut players = Vec::new();
        let mut page = 1;

        loop {
            let batch = parse_player_rows(&html)?;
            debug!("{} page {}: {} rows", team_code, page, batch.len());
            if batch.is_empty() {
                break;
            }
            players.extend(batch);

            page += 1;
            if page > MAX_SEARCH_PAGES {
                break;
            }
            let Some(target) = page_target(&html, page)? else {
                break;
            };
            html = self
                .postback(&url, &html, &target, &select_name, team_code)
                .await?;
        }
        Ok(players)
    }

    async fn stat_page(&self, page: KboPage, player_id: u64) -> Result<StatPage, SourceError> {
        let url = format!("{}/{}?playerId={}", self.base_url, page.path(), player_id);
        let html = self.client.get_text(&url).await?;
        parse_stat_page(&html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH: &str = r#"<html><body><form>
      <input type="hidden" name="__VIEWSTATE" value="abc=="/>
      <input type="hidden" name="__EVENTVALIDATION" value="xyz"/>
      <select id="cphContents_cphContents_cphContents_ddlTeam"
              name="ctl00$ctl00$ctl00$cphContents$cphContents$cphContents$ddlTeam">
        <option value="">팀 선택</option><option value="OB">두산</option>
      </select>
      <table class="tEx"><thead><tr><th>등번호</th><th>선수명</th></tr></thead><tbody>
        <tr><td>No.1</td><td><a href="/Record/Player/HitterDetail/Basic.aspx?playerId=79231">정수빈</a></td>
            <td>두산</td><td>외야수</td><td>1990.10.07</td><td>175cm, 70kg</td><td>수유초-배재중-유신고</td></tr>
        <tr><td>No.2</td><td>링크 없음</td><td>두산</td><td>투수</td><td></td><td></td><td></td></tr>
        <tr><td colspan="7">short</td></tr>
      </tbody></table>
      <div class="paging">
        <a href="javascript:__doPostBack('ctl00$ctl00$ctl00$cphContents$cphContents$cphContents$ucPager$btnNo1','')">1</a>
        <a href="javascript:__doPostBack('ctl00$ctl00$ctl00$cphContents$cphContents$cphContents$ucPager$btnNo2','')">2</a>
      </div>
    </form></body></html>"#;

    #[test]
    fn test_parse_player_rows() {
        let rows = parse_player_rows(SEARCH).unwrap();
        assert_eq!(rows.len(), 1);
        let r = &rows[0];
        assert_eq!(r.player_id, "79231");
        assert_eq!(r.name, "정수빈");
        assert_eq!(r.position, "외야수");
        assert_eq!(r.birth, "1990.10.07");
        assert_eq!(r.height_weight, "175cm, 70kg");
    }

    #[test]
    fn test_postback_state() {
        let fields = parse_hidden_fields(SEARCH).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0], ("__VIEWSTATE".to_string(), "abc==".to_string()));

        let name = control_name(SEARCH, TEAM_SELECT_ID).unwrap().unwrap();
        assert!(name.ends_with("$ddlTeam"));

        let target = page_target(SEARCH, 2).unwrap().unwrap();
        assert!(target.ends_with("ucPager$btnNo2"));
        assert_eq!(page_target(SEARCH, 3).unwrap(), None);
    }

    #[test]
    fn test_set_field() {
        let mut form = vec![("a".to_string(), "1".to_string())];
        set_field(&mut form, "a", "2");
        set_field(&mut form, "b", "3");
        assert_eq!(form, vec![("a".into(), "2".into()), ("b".into(), "3".into())]);
    }

    #[test]
    fn test_parse_stat_page() {
        let html = r#"<html><body>
          <select id="cphContents_cphContents_cphContents_ddlSeason_ddlSeason">
            <option value="2025">2025</option><option value="2024" selected="selected">2024</option>
          </select>
          <table class="tbl tt mb5" summary="통산기록">
            <thead><tr><th>연도</th><th>팀명</th><th>AVG</th></tr></thead>
            <tbody><tr><td>2023</td><td>두산</td><td>0.287</td></tr>
                   <tr><td>2024</td><td>두산</td><td>0.284</td></tr></tbody>
          </table>
          <table class="tbl"><tbody><tr><td>x</td></tr></tbody></table>
        </body></html>"#;
        let page = parse_stat_page(html).unwrap();
        assert_eq!(page.season, Some(2024));
        assert_eq!(page.tables.len(), 2);
        let career = page.find(|t| t.summary.contains("통산기록")).unwrap();
        assert_eq!(career.rows[1], ["2024", "두산", "0.284"]);
        assert!(career.text.contains("연도"));
        assert_eq!(page.with_class("tt").count(), 1);
    }

    #[test]
    fn test_season_defaults_to_first_option() {
        let html = r#"<select id="cphContents_cphContents_cphContents_ddlSeason_ddlSeason">
            <option>2025</option><option>2024</option></select>"#;
        assert_eq!(parse_stat_page(html).unwrap().season, Some(2025));
        assert_eq!(parse_stat_page("<p></p>").unwrap().season, None);
    }

    #[test]
    fn test_query_value() {
        assert_eq!(query_value("/a.aspx?playerId=123&x=1", "playerId").as_deref(), Some("123"));
        assert_eq!(query_value("/a.aspx?x=1", "playerId"), None);
        assert_eq!(query_value("/a.aspx", "playerId"), None);
    }
}
