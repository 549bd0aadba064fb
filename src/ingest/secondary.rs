use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::warn;

use crate::config::Competition;
use crate::http_client::PayloadFetcher;
use crate::ingest::team_names::TeamNameTable;
use crate::model::{Match, season_start_year};

const SECONDARY_BASE_URL: &str = "https://www.football-data.co.uk/mmz4281";

/// One row of the historical results table, columns named the way the provider names them.
#[derive(Debug, Clone, Deserialize)]
struct RawRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "HomeTeam", alias = "Home")]
    home_team: String,
    #[serde(rename = "AwayTeam", alias = "Away")]
    away_team: String,
    #[serde(rename = "FTHG", alias = "HG", default)]
    home_goals: Option<i64>,
    #[serde(rename = "FTAG", alias = "AG", default)]
    away_goals: Option<i64>,
    #[serde(rename = "HS", default)]
    home_shots: Option<i64>,
    #[serde(rename = "AS", default)]
    away_shots: Option<i64>,
    #[serde(rename = "HST", default)]
    home_shots_on_target: Option<i64>,
    #[serde(rename = "AST", default)]
    away_shots_on_target: Option<i64>,
    #[serde(rename = "HC", default)]
    home_corners: Option<i64>,
    #[serde(rename = "AC", default)]
    away_corners: Option<i64>,
    #[serde(rename = "HY", default)]
    home_yellow_cards: Option<i64>,
    #[serde(rename = "AY", default)]
    away_yellow_cards: Option<i64>,
    #[serde(rename = "HR", default)]
    home_red_cards: Option<i64>,
    #[serde(rename = "AR", default)]
    away_red_cards: Option<i64>,
    #[serde(rename = "Referee", default)]
    referee: Option<String>,
    #[serde(rename = "AvgH", default)]
    avg_home: Option<f64>,
    #[serde(rename = "AvgD", default)]
    avg_draw: Option<f64>,
    #[serde(rename = "AvgA", default)]
    avg_away: Option<f64>,
    #[serde(rename = "B365H", default)]
    b365_home: Option<f64>,
    #[serde(rename = "B365D", default)]
    b365_draw: Option<f64>,
    #[serde(rename = "B365A", default)]
    b365_away: Option<f64>,
}

/// A parsed row before its team names are matched to identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondaryRecord {
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: Option<i64>,
    pub away_goals: Option<i64>,
    pub referee: Option<String>,
    pub odds: Option<(f64, f64, f64)>,
    pub shots: (Option<i64>, Option<i64>),
    pub shots_on_target: (Option<i64>, Option<i64>),
    pub corners: (Option<i64>, Option<i64>),
    pub yellow_cards: (Option<i64>, Option<i64>),
    pub red_cards: (Option<i64>, Option<i64>),
}

impl SecondaryRecord {
    /// Copies every enrichment field `m` is missing. Identity, result and prediction are left alone.
    pub fn enrich(&self, m: &mut Match) {
        fill(&mut m.referee, self.referee.clone());
        if let Some((h, d, a)) = self.odds {
            fill(&mut m.odds_home, Some(h));
            fill(&mut m.odds_draw, Some(d));
            fill(&mut m.odds_away, Some(a));
        }
        fill(&mut m.home_shots, self.shots.0);
        fill(&mut m.away_shots, self.shots.1);
        fill(&mut m.home_shots_on_target, self.shots_on_target.0);
        fill(&mut m.away_shots_on_target, self.shots_on_target.1);
        fill(&mut m.home_corners, self.corners.0);
        fill(&mut m.away_corners, self.corners.1);
        fill(&mut m.home_yellow_cards, self.yellow_cards.0);
        fill(&mut m.away_yellow_cards, self.yellow_cards.1);
        fill(&mut m.home_red_cards, self.red_cards.0);
        fill(&mut m.away_red_cards, self.red_cards.1);
    }
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// A row whose two team names resolved to primary-source ids.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRecord {
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub record: SecondaryRecord,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedSecondary {
    pub records: Vec<SecondaryRecord>,
    pub dropped: usize,
}

/// Provider season folder: `2024/2025` becomes `2425`.
pub fn season_code(season: &str) -> Option<String> {
    let start = season_start_year(season)?;
    Some(format!("{:02}{:02}", start.rem_euclid(100), (start + 1).rem_euclid(100)))
}

pub fn secondary_csv_url(competition: &Competition, season: &str) -> Result<String> {
    let code = season_code(season).ok_or_else(|| anyhow!("season '{season}' has no start year"))?;
    Ok(format!(
        "{SECONDARY_BASE_URL}/{code}/{}.csv",
        competition.secondary_division
    ))
}

/// Downloads the results table and returns it with a BOM stripped and line endings unified.
pub fn fetch_secondary_payload(
    fetcher: &dyn PayloadFetcher,
    competition: &Competition,
    season: &str,
) -> Result<String> {
    let url = secondary_csv_url(competition, season)?;
    let body = fetcher
        .fetch_text(&url)
        .context("fetch secondary results table failed")?;
    let normalized = normalize_table(&body);
    let header = normalized.lines().next().unwrap_or_default();
    if !header.contains("HomeTeam") && !header.contains("Home") {
        return Err(anyhow!("secondary payload from {url} has no team header"));
    }
    Ok(normalized)
}

fn normalize_table(body: &str) -> String {
    body.trim_start_matches('\u{feff}')
        .replace("\r\n", "\n")
        .trim()
        .to_string()
}

/// Parses the table. Rows that fail to deserialize or lack a date/team are dropped and counted.
pub fn parse_secondary_payload(raw: &str, competition: &str, season: &str) -> Result<ParsedSecondary> {
    let body = normalize_table(raw);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());
    reader
        .headers()
        .context("secondary payload has no header row")?;

    let mut out = ParsedSecondary::default();
    for (idx, row) in reader.deserialize::<RawRow>().enumerate() {
        let line = idx + 2;
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                out.dropped += 1;
                warn!(competition, season, line, error = %err, "skipping unreadable secondary row");
                continue;
            }
        };
        if row.home_team.is_empty() && row.away_team.is_empty() {
            continue;
        }
        match record_from_row(row) {
            Some(record) => out.records.push(record),
            None => {
                out.dropped += 1;
                warn!(competition, season, line, "skipping secondary row without date or teams");
            }
        }
    }
    Ok(out)
}

fn record_from_row(row: RawRow) -> Option<SecondaryRecord> {
    let date = parse_row_date(&row.date)?;
    if row.home_team.is_empty() || row.away_team.is_empty() {
        return None;
    }
    let odds = match (row.avg_home, row.avg_draw, row.avg_away) {
        (Some(h), Some(d), Some(a)) => Some((h, d, a)),
        _ => match (row.b365_home, row.b365_draw, row.b365_away) {
            (Some(h), Some(d), Some(a)) => Some((h, d, a)),
            _ => None,
        },
    }
    .filter(|(h, d, a)| *h > 1.0 && *d > 1.0 && *a > 1.0);

    Some(SecondaryRecord {
        date,
        home_team: row.home_team,
        away_team: row.away_team,
        home_goals: row.home_goals,
        away_goals: row.away_goals,
        referee: row.referee.filter(|r| !r.trim().is_empty()),
        odds,
        shots: (row.home_shots, row.away_shots),
        shots_on_target: (row.home_shots_on_target, row.away_shots_on_target),
        corners: (row.home_corners, row.away_corners),
        yellow_cards: (row.home_yellow_cards, row.away_yellow_cards),
        red_cards: (row.home_red_cards, row.away_red_cards),
    })
}

/// `dd/mm/yy` or `dd/mm/yyyy`.
fn parse_row_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let year_part = raw.rsplit('/').next()?;
    let fmt = if year_part.len() == 4 {
        "%d/%m/%Y"
    } else {
        "%d/%m/%y"
    };
    NaiveDate::parse_from_str(raw, fmt).ok()
}

/// Attaches team ids to each row; rows naming a team the table can't resolve are dropped.
pub fn resolve_records(
    records: Vec<SecondaryRecord>,
    names: &TeamNameTable,
    competition: &str,
    season: &str,
) -> (Vec<ResolvedRecord>, usize) {
    let mut resolved = Vec::with_capacity(records.len());
    let mut dropped = 0;
    for record in records {
        let home = names.resolve(&record.home_team);
        let away = names.resolve(&record.away_team);
        match (home, away) {
            (Some(home_team_id), Some(away_team_id)) if home_team_id != away_team_id => {
                resolved.push(ResolvedRecord {
                    home_team_id,
                    away_team_id,
                    record,
                });
            }
            _ => {
                dropped += 1;
                warn!(
                    competition,
                    season,
                    home = %record.home_team,
                    away = %record.away_team,
                    date = %record.date,
                    "dropping secondary row with unresolved team"
                );
            }
        }
    }
    (resolved, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    const TABLE: &str = "\u{feff}Div,Date,Time,HomeTeam,AwayTeam,FTHG,FTAG,FTR,Referee,HS,AS,HST,AST,HC,AC,HY,AY,HR,AR,B365H,B365D,B365A,AvgH,AvgD,AvgA\r\n\
E0,16/08/2024,20:00,Man United,Fulham,1,0,H,R Jones,14,10,5,2,7,8,2,3,0,0,1.6,4.2,5.25,1.62,4.15,5.1\r\n\
E0,17/08/24,12:30,Ipswich,Liverpool,0,2,A,T Harrington,7,18,2,5,2,10,3,1,0,0,,,,,,\r\n\
E0,not-a-date,15:00,Arsenal,Wolves,2,0,H,J Gillett,18,9,6,3,8,2,2,2,0,0,1.25,6.5,12,1.26,6.2,11.5\r\n\
,,,,,,,,,,,,,,,,,,,,,,,,\r\n";

    #[test]
    fn season_code_uses_two_digit_years() {
        assert_eq!(season_code("2024/2025").as_deref(), Some("2425"));
        assert_eq!(season_code("1999/2000").as_deref(), Some("9900"));
        assert_eq!(season_code("next"), None);
    }

    #[test]
    fn url_uses_division_code() {
        let pl = config::competition("premier_league").unwrap();
        assert_eq!(
            secondary_csv_url(pl, "2024/2025").unwrap(),
            "https://www.football-data.co.uk/mmz4281/2425/E0.csv"
        );
    }

    #[test]
    fn parses_rows_with_both_date_styles() {
        let parsed = parse_secondary_payload(TABLE, "premier_league", "2024/2025").unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.dropped, 1);

        let first = &parsed.records[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 8, 16).unwrap());
        assert_eq!(first.odds, Some((1.62, 4.15, 5.1)));
        assert_eq!(first.shots_on_target, (Some(5), Some(2)));
        assert_eq!(first.referee.as_deref(), Some("R Jones"));

        let second = &parsed.records[1];
        assert_eq!(second.date, NaiveDate::from_ymd_opt(2024, 8, 17).unwrap());
        assert_eq!(second.odds, None);
        assert_eq!(second.corners, (Some(2), Some(10)));
    }

    #[test]
    fn unresolved_rows_are_dropped() {
        let parsed = parse_secondary_payload(TABLE, "premier_league", "2024/2025").unwrap();
        let names = TeamNameTable::from_teams([
            (10260, "Manchester United"),
            (9879, "Fulham"),
            (8650, "Liverpool"),
        ]);
        let (resolved, dropped) =
            resolve_records(parsed.records, &names, "premier_league", "2024/2025");
        assert_eq!(resolved.len(), 1);
        assert_eq!(dropped, 1);
        assert_eq!(resolved[0].home_team_id, 10260);
        assert_eq!(resolved[0].away_team_id, 9879);
    }
}
