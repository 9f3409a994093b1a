//! kleague.com player listing and player profile pages.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use scraper::Html;
use url::Url;

use crate::config::{HttpConfig, KleagueConfig};
use crate::error::SourceError;

use super::http_client::HttpClient;
use super::{KleagueSource, sel, text_of};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KleaguePosition {
    Gk,
    Df,
    Mf,
    Fw,
}

impl KleaguePosition {
    pub const ALL: [KleaguePosition; 4] = [
        KleaguePosition::Gk,
        KleaguePosition::Df,
        KleaguePosition::Mf,
        KleaguePosition::Fw,
    ];

    /// Value of the listing's `pos` parameter.
    pub fn code(self) -> &'static str {
        match self {
            KleaguePosition::Gk => "gk",
            KleaguePosition::Df => "df",
            KleaguePosition::Mf => "mf",
            KleaguePosition::Fw => "fw",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            KleaguePosition::Gk => "GK",
            KleaguePosition::Df => "DF",
            KleaguePosition::Mf => "MF",
            KleaguePosition::Fw => "FW",
        }
    }
}

/// Profile fields as printed on the page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KleagueProfile {
    pub name: Option<String>,
    pub en_name: Option<String>,
    pub team: Option<String>,
    pub position: Option<String>,
    pub back_no: Option<String>,
    pub nationality: Option<String>,
    pub height: Option<String>,
    pub weight: Option<String>,
    /// `1995/03/14`
    pub birth: Option<String>,
    pub photo_url: Option<String>,
    /// Per-season record rows, `td` text.
    pub seasons: Vec<Vec<String>>,
}

pub fn parse_player_ids(html: &str) -> Result<Vec<String>, SourceError> {
    let doc = Html::parse_document(html);
    let box_sel = sel(".cont-box.f-wrap.left.player-hover")?;
    let Ok(re) = Regex::new(r"onPlayerClicked\(\s*'?(\d+)") else {
        return Ok(Vec::new());
    };
    Ok(doc
        .select(&box_sel)
        .filter_map(|b| b.value().attr("onclick"))
        .filter_map(|js| re.captures(js).map(|c| c[1].to_string()))
        .collect())
}

pub fn parse_profile(html: &str) -> Result<KleagueProfile, SourceError> {
    let doc = Html::parse_document(html);
    let info_sel = sel(".cont-box.right table.style2 tbody tr")?;
    let th_sel = sel("th")?;
    let td_sel = sel("td")?;
    let img_sel = sel(".img-box img")?;
    // Headings and tables in document order; the season table is the first
    // table block after the "시즌별" heading.
    let section_sel = sel("h3.tit-box.style2, div.table-wrap")?;
    let row_sel = sel("table tbody tr")?;

    let mut p = KleagueProfile::default();
    for tr in doc.select(&info_sel) {
        let values: Vec<String> = tr.select(&td_sel).map(text_of).collect();
        for (i, th) in tr.select(&th_sel).enumerate() {
            let value = values.get(i).cloned().filter(|v| !v.is_empty());
            let slot = match text_of(th).as_str() {
                "이름" => &mut p.name,
                "영문명" => &mut p.en_name,
                "소속구단" => &mut p.team,
                "포지션" => &mut p.position,
                "배번" => &mut p.back_no,
                "국적" => &mut p.nationality,
                "키" => &mut p.height,
                "몸무게" => &mut p.weight,
                "생년월일" => &mut p.birth,
                _ => continue,
            };
            *slot = value;
        }
    }

    p.photo_url = doc
        .select(&img_sel)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string);

    let mut after_heading = false;
    for el in doc.select(&section_sel) {
        if el.value().name() == "h3" {
            after_heading = text_of(el).contains("시즌별");
            continue;
        }
        if after_heading {
            p.seasons = el
                .select(&row_sel)
                .map(|tr| tr.select(&td_sel).map(text_of).collect())
                .collect();
            break;
        }
    }

    Ok(p)
}

pub struct KleagueSite {
    client: HttpClient,
    base_url: String,
}

impl KleagueSite {
    pub fn new(http: &HttpConfig, kleague: &KleagueConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(http)?,
            base_url: kleague.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Make a possibly relative image path absolute.
    fn absolute(&self, src: &str) -> Option<String> {
        let base = Url::parse(&format!("{}/", self.base_url)).ok()?;
        base.join(src).ok().map(String::from)
    }
}

#[async_trait]
impl KleagueSource for KleagueSite {
    async fn player_ids(
        &self,
        position: KleaguePosition,
        page: u32,
    ) -> Result<Vec<String>, SourceError> {
        let page = page.to_string();
        let url = Url::parse_with_params(
            &format!("{}/player.do", self.base_url),
            &[
                ("page", page.as_str()),
                ("type", "all"),
                ("leagueId", ""),
                ("teamId", ""),
                ("pos", position.code()),
            ],
        )?;
        let html = self.client.get_text(url.as_str()).await?;
        parse_player_ids(&html)
    }

    async fn profile(&self, player_id: &str) -> Result<KleagueProfile, SourceError> {
        let url = Url::parse_with_params(
            &format!("{}/record/playerDetail.do", self.base_url),
            &[("playerId", player_id)],
        )?;
        let html = self.client.get_text(url.as_str()).await?;
        let mut profile = parse_profile(&html)?;
        profile.photo_url = profile.photo_url.as_deref().and_then(|s| self.absolute(s));
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_player_ids() {
        let html = r#"<div>
          <div class="cont-box f-wrap left player-hover" onclick="onPlayerClicked(20230123);"></div>
          <div class="cont-box f-wrap left player-hover" onclick="onPlayerClicked('20190005')"></div>
          <div class="cont-box f-wrap left player-hover"></div>
          <div class="cont-box f-wrap left" onclick="onPlayerClicked(1)"></div>
        </div>"#;
        assert_eq!(parse_player_ids(html).unwrap(), ["20230123", "20190005"]);
        assert!(parse_player_ids("<div></div>").unwrap().is_empty());
    }

    const PROFILE: &str = r#"<html><body>
      <div class="cont-box left"><div class="img-box"><img src="/images/player/20230123.jpg"></div></div>
      <div class="cont-box right">
        <table class="style2"><tbody>
          <tr><th>이름</th><td>김민재</td><th>영문명</th><td>KIM Minjae</td></tr>
          <tr><th>소속구단</th><td>전북</td><th>포지션</th><td>DF</td></tr>
          <tr><th>배번</th><td>4</td><th>국적</th><td></td></tr>
          <tr><th>키</th><td>190 cm</td><th>몸무게</th><td>88 kg</td></tr>
          <tr><th>생년월일</th><td>1996/11/15</td></tr>
        </tbody></table>
      </div>
      <h3 class="tit-box style2">최근 경기</h3>
      <div class="table-wrap"><table><tbody><tr><td>ignored</td></tr></tbody></table></div>
      <h3 class="tit-box style2">시즌별 기록</h3>
      <div class="table-wrap"><table><tbody>
        <tr><td>2023</td><td>전북</td><td>30</td><td>2</td><td>1</td><td>0</td><td>0</td><td>0</td>
            <td></td><td></td><td></td><td></td><td></td><td></td><td>30</td><td>2</td><td>1</td></tr>
        <tr><td>합계</td></tr>
      </tbody></table></div>
    </body></html>"#;

    #[test]
    fn test_parse_profile() {
        let p = parse_profile(PROFILE).unwrap();
        assert_eq!(p.name.as_deref(), Some("김민재"));
        assert_eq!(p.en_name.as_deref(), Some("KIM Minjae"));
        assert_eq!(p.team.as_deref(), Some("전북"));
        assert_eq!(p.position.as_deref(), Some("DF"));
        assert_eq!(p.back_no.as_deref(), Some("4"));
        assert_eq!(p.nationality, None);
        assert_eq!(p.height.as_deref(), Some("190 cm"));
        assert_eq!(p.birth.as_deref(), Some("1996/11/15"));
        assert_eq!(p.photo_url.as_deref(), Some("/images/player/20230123.jpg"));
        assert_eq!(p.seasons.len(), 2);
        assert_eq!(p.seasons[0].len(), 17);
        assert_eq!(p.seasons[0][0], "2023");
    }

    #[test]
    fn test_absolute_photo() {
        let site = KleagueSite::new(&HttpConfig::default(), &KleagueConfig::default()).unwrap();
        assert_eq!(
            site.absolute("/images/p.jpg").as_deref(),
            Some("https://www.kleague.com/images/p.jpg")
        );
        assert_eq!(
            site.absolute("https://cdn.example.com/p.jpg").as_deref(),
            Some("https://cdn.example.com/p.jpg")
        );
    }
}
