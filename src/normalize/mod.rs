pub mod teams;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use crate::models::GameStatus;

// ── Units ─────────────────────────────────────────────────────────────────────

/// `6' 2"` → 187, `183cm` → 183.
pub fn parse_height_cm(s: &str) -> Option<i32> {
    let s = s.trim();
    let feet_inches = Regex::new(r#"(\d+)'\s*(\d+)"#).ok()?;
    if let Some(c) = feet_inches.captures(s) {
        let feet: f64 = c[1].parse().ok()?;
        let inches: f64 = c[2].parse().ok()?;
        return Some((feet * 30.48 + inches * 2.54) as i32);
    }
    if s.to_ascii_lowercase().ends_with("cm") {
        return first_number(s);
    }
    None
}

/// `200 lbs` → 90, `85kg` → 85.
pub fn parse_weight_kg(s: &str) -> Option<i32> {
    let s = s.trim();
    let lbs_pattern = Regex::new(r"(\d+)\s*lbs").ok()?;
    if let Some(c) = lbs_pattern.captures(s) {
        let lbs: f64 = c[1].parse().ok()?;
        return Some((lbs * 0.453592) as i32);
    }
    if s.to_ascii_lowercase().ends_with("kg") {
        return first_number(s);
    }
    None
}

/// KBO player list "183cm, 85kg" → (183, 85).
pub fn parse_height_weight(s: &str) -> (Option<i32>, Option<i32>) {
    let Ok(digits) = Regex::new(r"\d+") else {
        return (None, None);
    };
    let nums: Vec<i32> = digits
        .find_iter(s)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    if nums.len() >= 2 {
        (Some(nums[0]), Some(nums[1]))
    } else {
        (None, None)
    }
}

/// Innings pitched: "14 1/3" → 14.333, "2/3" → 0.667, "5" → 5.0.
pub fn parse_innings(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s == "-" {
        return Some(0.0);
    }
    let fraction = |f: &str| -> Option<f64> {
        let (num, den) = f.split_once('/')?;
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 { None } else { Some(num / den) }
    };
    match s.split_once(' ') {
        Some((whole, frac)) => Some(whole.trim().parse::<f64>().ok()? + fraction(frac)?),
        None if s.contains('/') => fraction(s),
        None => s.parse().ok(),
    }
}

// ── Numbers ───────────────────────────────────────────────────────────────────

/// Strip everything but digits; blank or "-" is zero.
pub fn parse_number(s: &str) -> i32 {
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

fn first_number(s: &str) -> Option<i32> {
    Regex::new(r"\d+").ok()?.find(s)?.as_str().parse().ok()
}

/// Strict integer cell: thousands separators allowed, anything else fails.
pub fn parse_int_cell(s: &str) -> Option<i64> {
    let s = s.trim().replace(',', "");
    if s.is_empty() || s == "-" {
        return None;
    }
    s.parse().ok()
}

/// Jersey numbers arrive as strings ("00", "10"); non-numeric ones are dropped.
pub fn parse_jersey(s: &str) -> Option<i32> {
    s.trim().parse().ok()
}

/// OPS from SLG and OBP strings, three decimals.
pub fn ops(slg: &str, obp: &str) -> String {
    match (slg.trim().parse::<f64>(), obp.trim().parse::<f64>()) {
        (Ok(s), Ok(o)) => format!("{:.3}", s + o),
        _ => "0.000".to_string(),
    }
}

pub fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() || s == "-" { None } else { Some(s.to_string()) }
}

// ── Dates ─────────────────────────────────────────────────────────────────────

/// "1990.01.02", "1990/01/02", "1990-01-02" and ESPN timestamps.
pub fn parse_birth_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let head = s.get(..10).unwrap_or(s);
    for fmt in ["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(head, fmt) {
            return Some(d);
        }
    }
    None
}

/// ESPN event dates: "2024-03-20T19:00Z", with or without seconds.
pub fn parse_espn_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%MZ", "%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%dT%H:%M:%S%.fZ"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Korean sources publish local wall-clock time (UTC+9).
pub fn parse_kst_datetime(s: &str) -> Option<DateTime<Utc>> {
    let kst = FixedOffset::east_opt(9 * 3600)?;
    let s = s.trim();
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return kst
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    kst.from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Last calendar day of a month, for inclusive month windows.
pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)?.pred_opt()
}

// ── Status ────────────────────────────────────────────────────────────────────

pub fn status_from_espn(name: &str) -> GameStatus {
    match name {
        "STATUS_SCHEDULED" | "STATUS_DELAYED" => GameStatus::Scheduled,
        "STATUS_FINAL" | "STATUS_FULL_TIME" | "STATUS_FINAL_AET" | "STATUS_FINAL_PEN"
        | "STATUS_FINAL_OT" => GameStatus::Final,
        "STATUS_POSTPONED" => GameStatus::Postponed,
        "STATUS_CANCELED" | "STATUS_CANCELLED" | "STATUS_ABANDONED" | "STATUS_FORFEIT" => {
            GameStatus::Cancelled
        }
        "STATUS_IN_PROGRESS" | "STATUS_HALFTIME" | "STATUS_FIRST_HALF"
        | "STATUS_SECOND_HALF" | "STATUS_END_PERIOD" | "STATUS_OVERTIME"
        | "STATUS_RAIN_DELAY" => GameStatus::InProgress,
        _ => GameStatus::Unknown,
    }
}

/// Naver `statusCode` first, then the Korean status text. Defaults to scheduled.
pub fn status_from_naver(code: Option<&str>, text: &str) -> GameStatus {
    match code.map(str::trim) {
        Some("RESULT") => return GameStatus::Final,
        Some("BEFORE") | Some("READY") => return GameStatus::Scheduled,
        Some("STARTED") | Some("LIVE") => return GameStatus::InProgress,
        Some("CANCEL") => return GameStatus::Cancelled,
        _ => {}
    }
    status_from_korean(text).unwrap_or(GameStatus::Scheduled)
}

/// "종료", "취소", "예정", "경기중" and their longer forms.
pub fn status_from_korean(text: &str) -> Option<GameStatus> {
    let text = text.trim();
    if text.contains("종료") {
        Some(GameStatus::Final)
    } else if text.contains("취소") {
        Some(GameStatus::Cancelled)
    } else if text.contains("연기") {
        Some(GameStatus::Postponed)
    } else if text.contains("경기중") || text.contains("진행") {
        Some(GameStatus::InProgress)
    } else if text.contains("예정") {
        Some(GameStatus::Scheduled)
    } else {
        None
    }
}
