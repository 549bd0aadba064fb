use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StoreError;
use crate::store::schema::{Column, Entity, RowValues, Schema, opt_int, opt_real, opt_text};
use crate::store::Store;

/// Goals value for a side whose result (or prediction) is not known yet.
pub const UNKNOWN_GOALS: i64 = -1;

/// Number of most recent results kept in a team's rolling form.
pub const FORM_LENGTH: usize = 5;

pub fn register_all(store: &mut Store) -> Result<(), StoreError> {
    store.register::<Match>()?;
    store.register::<Team>()?;
    store.register::<TeamStats>()?;
    Ok(())
}

/// Deterministic match identity: same two teams on the same calendar day always hash alike.
pub fn match_id(home_team_id: i64, away_team_id: i64, kickoff: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{home_team_id}:{away_team_id}:{}",
        kickoff.date_naive().format("%Y-%m-%d")
    ));
    let digest = hasher.finalize();
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    Scheduled,
    InProgress,
    Finished,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::InProgress => "in_progress",
            MatchStatus::Finished => "finished",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "scheduled" => Some(MatchStatus::Scheduled),
            "in_progress" => Some(MatchStatus::InProgress),
            "finished" => Some(MatchStatus::Finished),
            "cancelled" => Some(MatchStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MatchStatus::Finished | MatchStatus::Cancelled)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormResult {
    Loss,
    Draw,
    Win,
}

impl FormResult {
    pub fn from_goals(scored: i64, conceded: i64) -> Self {
        match scored.cmp(&conceded) {
            std::cmp::Ordering::Greater => FormResult::Win,
            std::cmp::Ordering::Equal => FormResult::Draw,
            std::cmp::Ordering::Less => FormResult::Loss,
        }
    }

    pub fn points(self) -> u32 {
        match self {
            FormResult::Win => 3,
            FormResult::Draw => 1,
            FormResult::Loss => 0,
        }
    }

    fn letter(self) -> char {
        match self {
            FormResult::Win => 'W',
            FormResult::Draw => 'D',
            FormResult::Loss => 'L',
        }
    }

    fn from_letter(ch: char) -> Option<Self> {
        match ch.to_ascii_uppercase() {
            'W' => Some(FormResult::Win),
            'D' => Some(FormResult::Draw),
            'L' => Some(FormResult::Loss),
            _ => None,
        }
    }
}

/// Bounded rolling result history, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    results: VecDeque<FormResult>,
}

impl Form {
    pub const MAX_POINTS: u32 = 3 * FORM_LENGTH as u32;

    pub fn push(&mut self, result: FormResult) {
        self.results.push_front(result);
        self.results.truncate(FORM_LENGTH);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FormResult> {
        self.results.iter()
    }

    /// Points collected over the kept results; this is the form value strengths blend in.
    pub fn points(&self) -> u32 {
        self.results.iter().map(|r| r.points()).sum()
    }

    pub fn percentage(&self) -> f64 {
        self.points() as f64 / Self::MAX_POINTS as f64
    }

    /// Compact text such as `WWDLW` (newest first).
    pub fn encode(&self) -> String {
        self.results.iter().map(|r| r.letter()).collect()
    }

    pub fn decode(raw: &str) -> Self {
        let mut results = raw
            .chars()
            .filter_map(FormResult::from_letter)
            .collect::<VecDeque<_>>();
        results.truncate(FORM_LENGTH);
        Self { results }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub id: String,
    pub competition: String,
    pub season: String,
    pub kickoff: DateTime<Utc>,
    pub round_label: String,
    pub round: Option<u32>,
    pub status: MatchStatus,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: i64,
    pub away_goals: i64,
    pub predicted_home_goals: i64,
    pub predicted_away_goals: i64,
    pub expected_home_goals: Option<f64>,
    pub expected_away_goals: Option<f64>,
    pub prob_home: Option<f64>,
    pub prob_draw: Option<f64>,
    pub prob_away: Option<f64>,
    pub prob_over_1_5: Option<f64>,
    pub prob_over_2_5: Option<f64>,
    pub travel_factor: Option<f64>,
    pub referee: Option<String>,
    pub odds_home: Option<f64>,
    pub odds_draw: Option<f64>,
    pub odds_away: Option<f64>,
    pub home_shots: Option<i64>,
    pub away_shots: Option<i64>,
    pub home_shots_on_target: Option<i64>,
    pub away_shots_on_target: Option<i64>,
    pub home_corners: Option<i64>,
    pub away_corners: Option<i64>,
    pub home_yellow_cards: Option<i64>,
    pub away_yellow_cards: Option<i64>,
    pub home_red_cards: Option<i64>,
    pub away_red_cards: Option<i64>,
    pub source_id: Option<i64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Match {
    /// A fresh unplayed, unpredicted fixture.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        competition: &str,
        season: &str,
        kickoff: DateTime<Utc>,
        round_label: &str,
        home_team_id: i64,
        home_team: &str,
        away_team_id: i64,
        away_team: &str,
    ) -> Self {
        Self {
            id: match_id(home_team_id, away_team_id, kickoff),
            competition: competition.to_string(),
            season: season.to_string(),
            kickoff,
            round_label: round_label.to_string(),
            round: None,
            status: MatchStatus::Scheduled,
            home_team_id,
            away_team_id,
            home_team: home_team.to_string(),
            away_team: away_team.to_string(),
            home_goals: UNKNOWN_GOALS,
            away_goals: UNKNOWN_GOALS,
            predicted_home_goals: UNKNOWN_GOALS,
            predicted_away_goals: UNKNOWN_GOALS,
            expected_home_goals: None,
            expected_away_goals: None,
            prob_home: None,
            prob_draw: None,
            prob_away: None,
            prob_over_1_5: None,
            prob_over_2_5: None,
            travel_factor: None,
            referee: None,
            odds_home: None,
            odds_draw: None,
            odds_away: None,
            home_shots: None,
            away_shots: None,
            home_shots_on_target: None,
            away_shots_on_target: None,
            home_corners: None,
            away_corners: None,
            home_yellow_cards: None,
            away_yellow_cards: None,
            home_red_cards: None,
            away_red_cards: None,
            source_id: None,
            updated_at: None,
        }
    }

    pub fn has_result(&self) -> bool {
        self.home_goals >= 0 && self.away_goals >= 0
    }

    pub fn has_prediction(&self) -> bool {
        self.predicted_home_goals >= 0 && self.predicted_away_goals >= 0
    }

    pub fn set_result(&mut self, home_goals: i64, away_goals: i64) {
        self.home_goals = home_goals;
        self.away_goals = away_goals;
        self.normalize_status();
    }

    /// Keeps goals and status consistent: a known score means finished; a finished match
    /// without a score falls back to scheduled.
    pub fn normalize_status(&mut self) {
        if self.has_result() {
            if self.status != MatchStatus::Cancelled {
                self.status = MatchStatus::Finished;
            }
        } else if self.status == MatchStatus::Finished {
            self.status = MatchStatus::Scheduled;
        }
    }

    pub fn clear_prediction(&mut self) {
        self.predicted_home_goals = UNKNOWN_GOALS;
        self.predicted_away_goals = UNKNOWN_GOALS;
        self.expected_home_goals = None;
        self.expected_away_goals = None;
        self.prob_home = None;
        self.prob_draw = None;
        self.prob_away = None;
        self.prob_over_1_5 = None;
        self.prob_over_2_5 = None;
    }

    /// Copies prediction fields from an earlier copy of the same fixture.
    pub fn carry_prediction_from(&mut self, other: &Match) {
        self.predicted_home_goals = other.predicted_home_goals;
        self.predicted_away_goals = other.predicted_away_goals;
        self.expected_home_goals = other.expected_home_goals;
        self.expected_away_goals = other.expected_away_goals;
        self.prob_home = other.prob_home;
        self.prob_draw = other.prob_draw;
        self.prob_away = other.prob_away;
        self.prob_over_1_5 = other.prob_over_1_5;
        self.prob_over_2_5 = other.prob_over_2_5;
        self.travel_factor = self.travel_factor.or(other.travel_factor);
    }

    /// Fills enrichment fields this copy lacks; never touches identity, result, or prediction.
    pub fn fill_enrichment_from(&mut self, other: &Match) {
        fill(&mut self.referee, &other.referee);
        fill(&mut self.odds_home, &other.odds_home);
        fill(&mut self.odds_draw, &other.odds_draw);
        fill(&mut self.odds_away, &other.odds_away);
        fill(&mut self.home_shots, &other.home_shots);
        fill(&mut self.away_shots, &other.away_shots);
        fill(&mut self.home_shots_on_target, &other.home_shots_on_target);
        fill(&mut self.away_shots_on_target, &other.away_shots_on_target);
        fill(&mut self.home_corners, &other.home_corners);
        fill(&mut self.away_corners, &other.away_corners);
        fill(&mut self.home_yellow_cards, &other.home_yellow_cards);
        fill(&mut self.away_yellow_cards, &other.away_yellow_cards);
        fill(&mut self.home_red_cards, &other.home_red_cards);
        fill(&mut self.away_red_cards, &other.away_red_cards);
    }

    pub fn has_enrichment(&self) -> bool {
        self.referee.is_some()
            || self.odds_home.is_some()
            || self.home_shots_on_target.is_some()
            || self.home_corners.is_some()
            || self.home_yellow_cards.is_some()
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, other: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(other);
    }
}

static MATCH_SCHEMA: Schema = Schema {
    table: "matches",
    columns: &[
        Column::text("id").primary(),
        Column::text("competition").indexed(),
        Column::text("season").indexed(),
        Column::text("kickoff").indexed(),
        Column::text("round_label"),
        Column::integer("round").nullable().indexed(),
        Column::text("status").indexed(),
        Column::integer("home_team_id").indexed(),
        Column::integer("away_team_id").indexed(),
        Column::text("home_team"),
        Column::text("away_team"),
        Column::integer("home_goals"),
        Column::integer("away_goals"),
        Column::integer("predicted_home_goals"),
        Column::integer("predicted_away_goals"),
        Column::real("expected_home_goals").nullable(),
        Column::real("expected_away_goals").nullable(),
        Column::real("prob_home").nullable(),
        Column::real("prob_draw").nullable(),
        Column::real("prob_away").nullable(),
        Column::real("prob_over_1_5").nullable(),
        Column::real("prob_over_2_5").nullable(),
        Column::real("travel_factor").nullable(),
        Column::text("referee").nullable(),
        Column::real("odds_home").nullable(),
        Column::real("odds_draw").nullable(),
        Column::real("odds_away").nullable(),
        Column::integer("home_shots").nullable(),
        Column::integer("away_shots").nullable(),
        Column::integer("home_shots_on_target").nullable(),
        Column::integer("away_shots_on_target").nullable(),
        Column::integer("home_corners").nullable(),
        Column::integer("away_corners").nullable(),
        Column::integer("home_yellow_cards").nullable(),
        Column::integer("away_yellow_cards").nullable(),
        Column::integer("home_red_cards").nullable(),
        Column::integer("away_red_cards").nullable(),
        Column::integer("source_id").nullable(),
        Column::text("updated_at").nullable(),
    ],
};

impl Entity for Match {
    fn schema() -> &'static Schema {
        &MATCH_SCHEMA
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.id.clone()),
            Value::Text(self.competition.clone()),
            Value::Text(self.season.clone()),
            Value::Text(self.kickoff.to_rfc3339()),
            Value::Text(self.round_label.clone()),
            opt_int(self.round.map(i64::from)),
            Value::Text(self.status.as_str().to_string()),
            Value::Integer(self.home_team_id),
            Value::Integer(self.away_team_id),
            Value::Text(self.home_team.clone()),
            Value::Text(self.away_team.clone()),
            Value::Integer(self.home_goals),
            Value::Integer(self.away_goals),
            Value::Integer(self.predicted_home_goals),
            Value::Integer(self.predicted_away_goals),
            opt_real(self.expected_home_goals),
            opt_real(self.expected_away_goals),
            opt_real(self.prob_home),
            opt_real(self.prob_draw),
            opt_real(self.prob_away),
            opt_real(self.prob_over_1_5),
            opt_real(self.prob_over_2_5),
            opt_real(self.travel_factor),
            opt_text(self.referee.as_deref()),
            opt_real(self.odds_home),
            opt_real(self.odds_draw),
            opt_real(self.odds_away),
            opt_int(self.home_shots),
            opt_int(self.away_shots),
            opt_int(self.home_shots_on_target),
            opt_int(self.away_shots_on_target),
            opt_int(self.home_corners),
            opt_int(self.away_corners),
            opt_int(self.home_yellow_cards),
            opt_int(self.away_yellow_cards),
            opt_int(self.home_red_cards),
            opt_int(self.away_red_cards),
            opt_int(self.source_id),
            opt_text(self.updated_at.map(|t| t.to_rfc3339()).as_deref()),
        ]
    }

    fn from_values(row: &RowValues<'_>) -> Result<Self, StoreError> {
        let kickoff_raw = row.text("kickoff")?;
        let kickoff = parse_stored_time(&kickoff_raw).ok_or_else(|| StoreError::Decode {
            table: MATCH_SCHEMA.table.to_string(),
            column: "kickoff".to_string(),
            reason: format!("bad timestamp '{kickoff_raw}'"),
        })?;
        let status_raw = row.text("status")?;
        let status = MatchStatus::parse(&status_raw).ok_or_else(|| StoreError::Decode {
            table: MATCH_SCHEMA.table.to_string(),
            column: "status".to_string(),
            reason: format!("unknown status '{status_raw}'"),
        })?;
        Ok(Self {
            id: row.text("id")?,
            competition: row.text("competition")?,
            season: row.text("season")?,
            kickoff,
            round_label: row.text("round_label")?,
            round: row.opt_int("round")?.and_then(|r| u32::try_from(r).ok()),
            status,
            home_team_id: row.int("home_team_id")?,
            away_team_id: row.int("away_team_id")?,
            home_team: row.text("home_team")?,
            away_team: row.text("away_team")?,
            home_goals: row.int("home_goals")?,
            away_goals: row.int("away_goals")?,
            predicted_home_goals: row.int("predicted_home_goals")?,
            predicted_away_goals: row.int("predicted_away_goals")?,
            expected_home_goals: row.opt_real("expected_home_goals")?,
            expected_away_goals: row.opt_real("expected_away_goals")?,
            prob_home: row.opt_real("prob_home")?,
            prob_draw: row.opt_real("prob_draw")?,
            prob_away: row.opt_real("prob_away")?,
            prob_over_1_5: row.opt_real("prob_over_1_5")?,
            prob_over_2_5: row.opt_real("prob_over_2_5")?,
            travel_factor: row.opt_real("travel_factor")?,
            referee: row.opt_text("referee")?,
            odds_home: row.opt_real("odds_home")?,
            odds_draw: row.opt_real("odds_draw")?,
            odds_away: row.opt_real("odds_away")?,
            home_shots: row.opt_int("home_shots")?,
            away_shots: row.opt_int("away_shots")?,
            home_shots_on_target: row.opt_int("home_shots_on_target")?,
            away_shots_on_target: row.opt_int("away_shots_on_target")?,
            home_corners: row.opt_int("home_corners")?,
            away_corners: row.opt_int("away_corners")?,
            home_yellow_cards: row.opt_int("home_yellow_cards")?,
            away_yellow_cards: row.opt_int("away_yellow_cards")?,
            home_red_cards: row.opt_int("home_red_cards")?,
            away_red_cards: row.opt_int("away_red_cards")?,
            source_id: row.opt_int("source_id")?,
            updated_at: row
                .opt_text("updated_at")?
                .as_deref()
                .and_then(parse_stored_time),
        })
    }

    fn before_save(&mut self) {
        self.normalize_status();
        self.updated_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Team {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            latitude: None,
            longitude: None,
        }
    }

    /// Coordinates only when both are known and not the (0, 0) placeholder.
    pub fn location(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat != 0.0 || lon != 0.0 => Some((lat, lon)),
            _ => None,
        }
    }
}

static TEAM_SCHEMA: Schema = Schema {
    table: "teams",
    columns: &[
        Column::integer("id").primary(),
        Column::text("name").indexed(),
        Column::real("latitude").nullable(),
        Column::real("longitude").nullable(),
    ],
};

impl Entity for Team {
    fn schema() -> &'static Schema {
        &TEAM_SCHEMA
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.id),
            Value::Text(self.name.clone()),
            opt_real(self.latitude),
            opt_real(self.longitude),
        ]
    }

    fn from_values(row: &RowValues<'_>) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.int("id")?,
            name: row.text("name")?,
            latitude: row.opt_real("latitude")?,
            longitude: row.opt_real("longitude")?,
        })
    }
}

/// Cumulative snapshot of one team after one round of one competition season.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TeamStats {
    pub team_id: i64,
    pub competition: String,
    pub season: String,
    pub round: u32,
    pub games_home: u32,
    pub games_away: u32,
    pub wins_home: u32,
    pub wins_away: u32,
    pub draws_home: u32,
    pub draws_away: u32,
    pub losses_home: u32,
    pub losses_away: u32,
    pub goals_for_home: u32,
    pub goals_for_away: u32,
    pub goals_against_home: u32,
    pub goals_against_away: u32,
    pub scored_home_per_game: f64,
    pub scored_away_per_game: f64,
    pub conceded_home_per_game: f64,
    pub conceded_away_per_game: f64,
    pub attack_home: f64,
    pub attack_away: f64,
    pub defense_home: f64,
    pub defense_away: f64,
    pub form: Form,
}

impl TeamStats {
    /// Zero-valued starting point for a team with no earlier snapshot.
    pub fn baseline(team_id: i64, competition: &str, season: &str, round: u32) -> Self {
        Self {
            team_id,
            competition: competition.to_string(),
            season: season.to_string(),
            round,
            ..Self::default()
        }
    }

    pub fn games_played(&self) -> u32 {
        self.games_home + self.games_away
    }

    pub fn wins(&self) -> u32 {
        self.wins_home + self.wins_away
    }

    pub fn draws(&self) -> u32 {
        self.draws_home + self.draws_away
    }

    pub fn losses(&self) -> u32 {
        self.losses_home + self.losses_away
    }

    pub fn points(&self) -> u32 {
        3 * self.wins() + self.draws()
    }

    pub fn goal_difference(&self) -> i64 {
        i64::from(self.goals_for_home + self.goals_for_away)
            - i64::from(self.goals_against_home + self.goals_against_away)
    }

    pub fn form_value(&self) -> f64 {
        self.form.points() as f64
    }
}

static TEAM_STATS_SCHEMA: Schema = Schema {
    table: "team_stats",
    columns: &[
        Column::integer("team_id").primary(),
        Column::text("competition").primary(),
        Column::text("season").primary(),
        Column::integer("round").primary(),
        Column::integer("games_played"),
        Column::integer("games_home"),
        Column::integer("games_away"),
        Column::integer("wins_home"),
        Column::integer("wins_away"),
        Column::integer("draws_home"),
        Column::integer("draws_away"),
        Column::integer("losses_home"),
        Column::integer("losses_away"),
        Column::integer("goals_for_home"),
        Column::integer("goals_for_away"),
        Column::integer("goals_against_home"),
        Column::integer("goals_against_away"),
        Column::integer("points"),
        Column::integer("goal_difference"),
        Column::real("scored_home_per_game"),
        Column::real("scored_away_per_game"),
        Column::real("conceded_home_per_game"),
        Column::real("conceded_away_per_game"),
        Column::real("attack_home"),
        Column::real("attack_away"),
        Column::real("defense_home"),
        Column::real("defense_away"),
        Column::text("form"),
    ],
};

impl Entity for TeamStats {
    fn schema() -> &'static Schema {
        &TEAM_STATS_SCHEMA
    }

    fn to_values(&self) -> Vec<Value> {
        let n = |v: u32| Value::Integer(i64::from(v));
        vec![
            Value::Integer(self.team_id),
            Value::Text(self.competition.clone()),
            Value::Text(self.season.clone()),
            n(self.round),
            n(self.games_played()),
            n(self.games_home),
            n(self.games_away),
            n(self.wins_home),
            n(self.wins_away),
            n(self.draws_home),
            n(self.draws_away),
            n(self.losses_home),
            n(self.losses_away),
            n(self.goals_for_home),
            n(self.goals_for_away),
            n(self.goals_against_home),
            n(self.goals_against_away),
            n(self.points()),
            Value::Integer(self.goal_difference()),
            Value::Real(self.scored_home_per_game),
            Value::Real(self.scored_away_per_game),
            Value::Real(self.conceded_home_per_game),
            Value::Real(self.conceded_away_per_game),
            Value::Real(self.attack_home),
            Value::Real(self.attack_away),
            Value::Real(self.defense_home),
            Value::Real(self.defense_away),
            Value::Text(self.form.encode()),
        ]
    }

    fn from_values(row: &RowValues<'_>) -> Result<Self, StoreError> {
        let count = |column: &str| -> Result<u32, StoreError> {
            let v = row.int(column)?;
            u32::try_from(v).map_err(|_| StoreError::Decode {
                table: TEAM_STATS_SCHEMA.table.to_string(),
                column: column.to_string(),
                reason: format!("negative count {v}"),
            })
        };
        Ok(Self {
            team_id: row.int("team_id")?,
            competition: row.text("competition")?,
            season: row.text("season")?,
            round: count("round")?,
            games_home: count("games_home")?,
            games_away: count("games_away")?,
            wins_home: count("wins_home")?,
            wins_away: count("wins_away")?,
            draws_home: count("draws_home")?,
            draws_away: count("draws_away")?,
            losses_home: count("losses_home")?,
            losses_away: count("losses_away")?,
            goals_for_home: count("goals_for_home")?,
            goals_for_away: count("goals_for_away")?,
            goals_against_home: count("goals_against_home")?,
            goals_against_away: count("goals_against_away")?,
            scored_home_per_game: row.real("scored_home_per_game")?,
            scored_away_per_game: row.real("scored_away_per_game")?,
            conceded_home_per_game: row.real("conceded_home_per_game")?,
            conceded_away_per_game: row.real("conceded_away_per_game")?,
            attack_home: row.real("attack_home")?,
            attack_away: row.real("attack_away")?,
            defense_home: row.real("defense_home")?,
            defense_away: row.real("defense_away")?,
            form: Form::decode(&row.text("form")?),
        })
    }
}

/// League-wide aggregate over every snapshot of one round. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundAverage {
    pub competition: String,
    pub season: String,
    pub round: u32,
    pub teams: usize,
    pub mean_home_goals_per_game: f64,
    pub max_home_goals_per_game: f64,
    pub mean_away_goals_per_game: f64,
    pub max_away_goals_per_game: f64,
    pub mean_home_conceded_per_game: f64,
    pub mean_away_conceded_per_game: f64,
    pub mean_form: f64,
    pub max_form: f64,
}

pub fn parse_stored_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

pub fn season_start_year(season: &str) -> Option<i32> {
    season
        .split(|c: char| !c.is_ascii_digit())
        .find(|part| part.len() == 4)
        .and_then(|part| part.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn form_keeps_newest_five() {
        let mut form = Form::default();
        for r in [
            FormResult::Loss,
            FormResult::Win,
            FormResult::Win,
            FormResult::Draw,
            FormResult::Win,
            FormResult::Loss,
        ] {
            form.push(r);
        }
        assert_eq!(form.len(), FORM_LENGTH);
        assert_eq!(form.encode(), "LWDWW");
        assert_eq!(form.points(), 10);
        assert_eq!(Form::decode("LWDWW"), form);
    }

    #[test]
    fn match_id_ignores_time_of_day_but_not_sides() {
        let a = Utc.with_ymd_and_hms(2024, 8, 17, 12, 30, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 8, 17, 19, 0, 0).unwrap();
        assert_eq!(match_id(8, 9, a), match_id(8, 9, b));
        assert_ne!(match_id(8, 9, a), match_id(9, 8, a));
        assert_eq!(match_id(8, 9, a).len(), 16);
    }

    #[test]
    fn result_drives_status() {
        let kickoff = Utc.with_ymd_and_hms(2024, 8, 17, 14, 0, 0).unwrap();
        let mut m = Match::new("pl", "2024/2025", kickoff, "1", 1, "A", 2, "B");
        assert_eq!(m.status, MatchStatus::Scheduled);
        m.set_result(2, 1);
        assert_eq!(m.status, MatchStatus::Finished);
        m.home_goals = UNKNOWN_GOALS;
        m.normalize_status();
        assert_eq!(m.status, MatchStatus::Scheduled);
    }

    #[test]
    fn zero_coordinates_mean_unknown() {
        let mut t = Team::new(1, "Somewhere FC");
        t.latitude = Some(0.0);
        t.longitude = Some(0.0);
        assert!(t.location().is_none());
        t.latitude = Some(51.5);
        t.longitude = Some(-0.1);
        assert_eq!(t.location(), Some((51.5, -0.1)));
    }

    #[test]
    fn season_year_parses_common_labels() {
        assert_eq!(season_start_year("2024/2025"), Some(2024));
        assert_eq!(season_start_year("2024"), Some(2024));
        assert_eq!(season_start_year("x"), None);
    }
}
