use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::warn;

use crate::config::Competition;
use crate::http_client::PayloadFetcher;
use crate::ingest::html_embed::{DATA_SCRIPT_ID, extract_script_json};
use crate::model::{Match, MatchStatus};
use crate::stats::parse_round_label;

const PRIMARY_BASE_URL: &str = "https://www.fotmob.com/leagues";

#[derive(Debug, Clone, Default)]
pub struct ParsedPrimary {
    pub matches: Vec<Match>,
    pub dropped: usize,
}

pub fn primary_page_url(competition: &Competition, season: &str) -> String {
    let slug = competition
        .name
        .to_ascii_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    let season = season.trim().replace('/', "-");
    format!(
        "{PRIMARY_BASE_URL}/{}/fixtures/{slug}?season={season}",
        competition.primary_league_id
    )
}

/// Downloads the league page and returns the embedded page data as compact JSON text.
pub fn fetch_primary_payload(
    fetcher: &dyn PayloadFetcher,
    competition: &Competition,
    season: &str,
) -> Result<String> {
    let url = primary_page_url(competition, season);
    let html = fetcher
        .fetch_text(&url)
        .context("fetch primary fixtures page failed")?;
    let data = extract_script_json(&html, DATA_SCRIPT_ID)?;
    serde_json::to_string(&data).context("serialize primary payload")
}

/// Parses every fixture in the payload. A payload without a fixture list fails the unit;
/// individual fixtures that can't be read are dropped and counted.
pub fn parse_primary_payload(raw: &str, competition: &str, season: &str) -> Result<ParsedPrimary> {
    let value = serde_json::from_str::<Value>(raw.trim()).context("invalid primary payload json")?;
    let fixtures = find_all_matches(&value)
        .ok_or_else(|| anyhow!("primary payload has no allMatches list"))?;

    let mut out = ParsedPrimary::default();
    for item in fixtures {
        match parse_fixture(item, competition, season) {
            Some(m) => out.matches.push(m),
            None => {
                out.dropped += 1;
                warn!(
                    competition,
                    season,
                    fixture = %item.get("id").map(|v| v.to_string()).unwrap_or_default(),
                    "skipping unreadable primary fixture"
                );
            }
        }
    }
    Ok(out)
}

/// The fixture list sits at different depths depending on page layout; take the first
/// `allMatches` array found walking the document.
fn find_all_matches(v: &Value) -> Option<&Vec<Value>> {
    match v {
        Value::Object(map) => {
            if let Some(Value::Array(arr)) = map.get("allMatches") {
                return Some(arr);
            }
            map.values().find_map(find_all_matches)
        }
        Value::Array(arr) => arr.iter().find_map(find_all_matches),
        _ => None,
    }
}

fn parse_fixture(v: &Value, competition: &str, season: &str) -> Option<Match> {
    let status = v.get("status")?;
    let kickoff = status
        .get("utcTime")
        .and_then(|x| x.as_str())
        .and_then(parse_timestamp)?;

    let home = v.get("home")?;
    let away = v.get("away")?;
    let home_team_id = as_i64_any(home.get("id")?)?;
    let away_team_id = as_i64_any(away.get("id")?)?;
    let home_team = team_name(home)?;
    let away_team = team_name(away)?;

    let round_label = v
        .get("roundName")
        .and_then(label_text)
        .or_else(|| v.get("round").and_then(label_text))
        .unwrap_or_default();

    let mut m = Match::new(
        competition,
        season,
        kickoff,
        &round_label,
        home_team_id,
        &home_team,
        away_team_id,
        &away_team,
    );
    m.round = v
        .get("round")
        .and_then(as_i64_any)
        .and_then(|r| u32::try_from(r).ok())
        .filter(|r| *r > 0)
        .or_else(|| parse_round_label(&round_label));
    m.source_id = v.get("id").and_then(as_i64_any);

    let flag = |key: &str| status.get(key).and_then(|x| x.as_bool()).unwrap_or(false);
    let started = flag("started");
    let finished = flag("finished") || flag("awarded");
    let cancelled = flag("cancelled");

    let mut home_goals = home.get("score").and_then(as_i64_any);
    let mut away_goals = away.get("score").and_then(as_i64_any);
    if (home_goals.is_none() || away_goals.is_none())
        && let Some((h, a)) = status
            .get("scoreStr")
            .and_then(|x| x.as_str())
            .and_then(parse_score_pair)
    {
        home_goals = home_goals.or(Some(h));
        away_goals = away_goals.or(Some(a));
    }

    m.status = if cancelled {
        MatchStatus::Cancelled
    } else if finished {
        MatchStatus::Finished
    } else if started {
        MatchStatus::InProgress
    } else {
        MatchStatus::Scheduled
    };

    // Live scores are not results; only a finished fixture records goals.
    if m.status == MatchStatus::Finished
        && let (Some(h), Some(a)) = (home_goals, away_goals)
        && h >= 0
        && a >= 0
    {
        m.set_result(h, a);
    }
    m.normalize_status();
    Some(m)
}

fn team_name(side: &Value) -> Option<String> {
    let name = side
        .get("longName")
        .and_then(|x| x.as_str())
        .or_else(|| side.get("name").and_then(|x| x.as_str()))?
        .trim();
    if name.is_empty() {
        return None;
    }
    Some(name.to_string())
}

fn label_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed.trim_end_matches('Z'), fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

fn as_i64_any(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<i64>().ok()
}

fn parse_score_pair(raw: &str) -> Option<(i64, i64)> {
    let mut nums = raw
        .split(|ch: char| !ch.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok());
    let home = nums.next()?;
    let away = nums.next()?;
    Some((home, away))
}
