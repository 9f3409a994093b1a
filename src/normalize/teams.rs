//! Canonical team names for the Korean leagues.
//!
//! Team ids are derived from canonical names (KBO, KBL) or club codes
//! (K League), so every source that mentions a club must agree on one key.

use crate::error::IdError;
use crate::ids::Namespace;

/// (site code, Naver short name, canonical name)
const KBO_TEAMS: &[(&str, &str, &str)] = &[
    ("OB", "두산", "두산 베어스"),
    ("LT", "롯데", "롯데 자이언츠"),
    ("SS", "삼성", "삼성 라이온즈"),
    ("WO", "키움", "키움 히어로즈"),
    ("HH", "한화", "한화 이글스"),
    ("HT", "KIA", "KIA 타이거즈"),
    ("KT", "KT", "KT 위즈"),
    ("LG", "LG", "LG 트윈스"),
    ("NC", "NC", "NC 다이노스"),
    ("SK", "SSG", "SSG 랜더스"),
];

/// K League club codes as used by Naver and kleague.com.
const KLEAGUE_CLUBS: &[(&str, &str)] = &[
    ("01", "울산 HD"),
    ("02", "성남 FC"),
    ("03", "포항 스틸러스"),
    ("04", "제주 유나이티드"),
    ("05", "전북 현대 모터스"),
    ("06", "부산 아이파크"),
    ("07", "전남 드래곤즈"),
    ("09", "FC 서울"),
    ("10", "대전 하나 시티즌"),
    ("12", "수원 삼성 블루윙즈"),
    ("15", "경남 FC"),
    ("17", "대구 FC"),
    ("18", "인천 유나이티드"),
    ("20", "안산 그리너스"),
    ("21", "강원 FC"),
    ("22", "광주 FC"),
    ("23", "FC 안양"),
    ("24", "충남 아산 FC"),
    ("25", "서울 이랜드 FC"),
    ("26", "부천 FC 1995"),
    ("27", "김포 FC"),
    ("28", "천안 시티 FC"),
    ("29", "수원 FC"),
    ("30", "충북 청주 FC"),
    ("35", "김천 상무"),
];

/// Short names printed on kleague.com player pages.
const KLEAGUE_SITE_NAMES: &[(&str, &str)] = &[
    ("울산", "01"),
    ("성남", "02"),
    ("포항", "03"),
    ("제주", "04"),
    ("전북", "05"),
    ("부산", "06"),
    ("전남", "07"),
    ("서울", "09"),
    ("대전", "10"),
    ("수원", "12"),
    ("경남", "15"),
    ("대구", "17"),
    ("인천", "18"),
    ("안산", "20"),
    ("강원", "21"),
    ("광주", "22"),
    ("안양", "23"),
    ("충남아산", "24"),
    ("서울E", "25"),
    ("부천", "26"),
    ("김포", "27"),
    ("천안", "28"),
    ("수원FC", "29"),
    ("충북청주", "30"),
    ("김천", "35"),
];

/// Every KBO site code, in the order the player search is walked.
pub fn kbo_site_codes() -> impl Iterator<Item = &'static str> {
    KBO_TEAMS.iter().map(|(code, _, _)| *code)
}

/// Naver short name, site code or full name → canonical KBO name.
/// Unknown names pass through trimmed.
pub fn kbo_canonical(name: &str) -> String {
    let name = name.trim();
    KBO_TEAMS
        .iter()
        .find(|(code, short, full)| *code == name || *short == name || *full == name)
        .map(|(_, _, full)| (*full).to_string())
        .unwrap_or_else(|| name.to_string())
}

pub fn kbo_team_id(name: &str) -> Result<i64, IdError> {
    Namespace::Kbo.from_key(&kbo_canonical(name))
}

pub fn kleague_club_name(code: &str) -> Option<&'static str> {
    let code = code.trim();
    KLEAGUE_CLUBS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Club code for a kleague.com short name or a canonical club name.
pub fn kleague_code_for(name: &str) -> Option<&'static str> {
    let name = name.trim();
    KLEAGUE_SITE_NAMES
        .iter()
        .find(|(short, _)| *short == name)
        .map(|(_, code)| *code)
        .or_else(|| {
            KLEAGUE_CLUBS
                .iter()
                .find(|(_, full)| *full == name)
                .map(|(code, _)| *code)
        })
}

/// Team id from a club code: the code itself in the 900 series.
pub fn kleague_team_id(code: &str) -> Result<i64, IdError> {
    Namespace::Kleague.from_key(code)
}

/// Team id for a name seen on kleague.com. Unknown clubs fall back to a
/// hash of the name so they still land in the K League range.
pub fn kleague_team_id_by_name(name: &str) -> Result<i64, IdError> {
    match kleague_code_for(name) {
        Some(code) => kleague_team_id(code),
        None => Namespace::Kleague.from_key(name),
    }
}

pub fn kbl_team_id(name: &str) -> Result<i64, IdError> {
    Namespace::Kbl.from_key(name)
}
