//! Poisson goal model with a Dixon-Coles low-score correction.
//!
//! Expected goals come from attack/defense strengths and the league's per-game means. The
//! outcome grid is either simulated (seeded per match, so reruns agree) or summed analytically.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::types::Value;
use tracing::{debug, info, warn};

use crate::calibration::{Prob3, dc_tau, poisson_pmf};
use crate::config::ModelConfig;
use crate::geo;
use crate::model::{Match, RoundAverage, Team, TeamStats};
use crate::stats::{AggregateOutcome, latest_stats, load_round_average, round_of};
use crate::store::Store;

/// Eligible only when in the active season, kicking off after the cutoff, not terminal, and
/// without a result.
pub fn should_predict(m: &Match, cfg: &ModelConfig, now: DateTime<Utc>) -> bool {
    m.season == cfg.current_season
        && m.kickoff > now + Duration::minutes(cfg.prediction_cutoff_minutes)
        && !m.status.is_terminal()
        && !m.has_result()
}

/// Expected (home, away) goals before any travel adjustment, each clamped.
pub fn expected_goals(
    home: &TeamStats,
    away: &TeamStats,
    avg: &RoundAverage,
    cfg: &ModelConfig,
) -> (f64, f64) {
    let clamp = |x: f64| clamp_goals(x, cfg);
    let lambda_home = home.attack_home * away.defense_away * avg.mean_home_goals_per_game;
    let lambda_away = away.attack_away * home.defense_home * avg.mean_away_goals_per_game;
    (clamp(lambda_home), clamp(lambda_away))
}

/// Both sides need at least one counted game and the league needs a positive per-game mean
/// at home and away; anything less is an empty baseline, not evidence.
pub fn has_usable_history(home: &TeamStats, away: &TeamStats, avg: &RoundAverage) -> bool {
    home.games_played() > 0
        && away.games_played() > 0
        && avg.mean_home_goals_per_game > 0.0
        && avg.mean_away_goals_per_game > 0.0
}

fn clamp_goals(x: f64, cfg: &ModelConfig) -> f64 {
    if x.is_finite() {
        x.clamp(cfg.min_goals_floor, cfg.max_goals_cap)
    } else {
        cfg.min_goals_floor
    }
}

/// Joint probability table of (home goals, away goals), `0..=max_goals` on each side.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeGrid {
    max_goals: u32,
    cells: Vec<f64>,
}

impl OutcomeGrid {
    fn empty(max_goals: u32) -> Self {
        let side = max_goals as usize + 1;
        Self {
            max_goals,
            cells: vec![0.0; side * side],
        }
    }

    fn idx(&self, home: u32, away: u32) -> usize {
        home as usize * (self.max_goals as usize + 1) + away as usize
    }

    pub fn max_goals(&self) -> u32 {
        self.max_goals
    }

    pub fn probability(&self, home: u32, away: u32) -> f64 {
        if home > self.max_goals || away > self.max_goals {
            return 0.0;
        }
        self.cells[self.idx(home, away)]
    }

    /// Independent Poisson cells with the correction applied, renormalized.
    pub fn analytic(lambda_home: f64, lambda_away: f64, max_goals: u32, rho: f64) -> Self {
        let mut grid = Self::empty(max_goals);
        for h in 0..=max_goals {
            for a in 0..=max_goals {
                let i = grid.idx(h, a);
                grid.cells[i] = poisson_pmf(h, lambda_home) * poisson_pmf(a, lambda_away);
            }
        }
        grid.apply_dixon_coles(lambda_home, lambda_away, rho);
        grid.normalize();
        grid
    }

    /// Empirical grid from `trials` independent Poisson draws per side; goal counts past the
    /// grid edge land in the last row/column.
    pub fn simulate<R: Rng>(
        lambda_home: f64,
        lambda_away: f64,
        max_goals: u32,
        rho: f64,
        trials: u32,
        rng: &mut R,
    ) -> Self {
        if trials == 0 {
            return Self::analytic(lambda_home, lambda_away, max_goals, rho);
        }
        let mut grid = Self::empty(max_goals);
        let weight = 1.0 / f64::from(trials);
        for _ in 0..trials {
            let h = poisson_sample(lambda_home, rng).min(max_goals);
            let a = poisson_sample(lambda_away, rng).min(max_goals);
            let i = grid.idx(h, a);
            grid.cells[i] += weight;
        }
        grid.apply_dixon_coles(lambda_home, lambda_away, rho);
        grid.normalize();
        grid
    }

    fn apply_dixon_coles(&mut self, lambda_home: f64, lambda_away: f64, rho: f64) {
        for (h, a) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            if h > self.max_goals || a > self.max_goals {
                continue;
            }
            let i = self.idx(h, a);
            self.cells[i] = (self.cells[i] * dc_tau(h, a, lambda_home, lambda_away, rho)).max(0.0);
        }
    }

    fn normalize(&mut self) {
        let total = self.cells.iter().sum::<f64>();
        if total <= 0.0 || !total.is_finite() {
            return;
        }
        for c in &mut self.cells {
            *c /= total;
        }
    }

    pub fn outcome_probs(&self) -> Prob3 {
        let mut p = Prob3 {
            home: 0.0,
            draw: 0.0,
            away: 0.0,
        };
        for h in 0..=self.max_goals {
            for a in 0..=self.max_goals {
                let cell = self.cells[self.idx(h, a)];
                if h > a {
                    p.home += cell;
                } else if h == a {
                    p.draw += cell;
                } else {
                    p.away += cell;
                }
            }
        }
        let sum = p.sum().max(1e-12);
        Prob3 {
            home: p.home / sum,
            draw: p.draw / sum,
            away: p.away / sum,
        }
    }

    /// P(home + away > line).
    pub fn prob_total_over(&self, line: f64) -> f64 {
        let mut p = 0.0;
        for h in 0..=self.max_goals {
            for a in 0..=self.max_goals {
                if f64::from(h + a) > line {
                    p += self.cells[self.idx(h, a)];
                }
            }
        }
        p.clamp(0.0, 1.0)
    }
}

/// Knuth's multiplication method; fine for the small rates football produces.
pub fn poisson_sample<R: Rng>(lambda: f64, rng: &mut R) -> u32 {
    if lambda <= 0.0 {
        return 0;
    }
    let limit = (-lambda).exp();
    let mut k = 0u32;
    let mut p = 1.0_f64;
    loop {
        p *= rng.r#gen::<f64>();
        if p <= limit {
            return k;
        }
        k += 1;
    }
}

/// Stable seed from a match id (hex digest prefix), so a rerun draws the same samples.
pub fn seed_for(match_id: &str) -> u64 {
    let prefix = match_id.get(..16).unwrap_or(match_id);
    u64::from_str_radix(prefix, 16).unwrap_or_else(|_| {
        match_id
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |acc, b| {
                (acc ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
            })
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub expected_home: f64,
    pub expected_away: f64,
    pub travel_factor: f64,
    pub predicted_home: i64,
    pub predicted_away: i64,
    pub probs: Prob3,
    pub over_low: f64,
    pub over_high: f64,
}

impl Prediction {
    pub fn apply_to(&self, m: &mut Match) {
        m.expected_home_goals = Some(self.expected_home);
        m.expected_away_goals = Some(self.expected_away);
        m.travel_factor = Some(self.travel_factor);
        m.predicted_home_goals = self.predicted_home;
        m.predicted_away_goals = self.predicted_away;
        m.prob_home = Some(self.probs.home);
        m.prob_draw = Some(self.probs.draw);
        m.prob_away = Some(self.probs.away);
        m.prob_over_1_5 = Some(self.over_low);
        m.prob_over_2_5 = Some(self.over_high);
    }
}

/// Full forecast for one fixture. `travel_factor` multiplies the away expectation only.
pub fn predict_match(
    match_id: &str,
    home: &TeamStats,
    away: &TeamStats,
    avg: &RoundAverage,
    travel_factor: f64,
    cfg: &ModelConfig,
) -> Prediction {
    let (expected_home, base_away) = expected_goals(home, away, avg, cfg);
    let expected_away = clamp_goals(base_away * travel_factor, cfg);

    let mut rng = StdRng::seed_from_u64(seed_for(match_id));
    let grid = OutcomeGrid::simulate(
        expected_home,
        expected_away,
        cfg.grid_max_goals,
        cfg.dc_rho,
        cfg.simulation_trials,
        &mut rng,
    );

    Prediction {
        expected_home,
        expected_away,
        travel_factor,
        predicted_home: expected_home.round() as i64,
        predicted_away: expected_away.round() as i64,
        probs: grid.outcome_probs(),
        over_low: grid.prob_total_over(cfg.over_low_line),
        over_high: grid.prob_total_over(cfg.over_high_line),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredictCounts {
    pub eligible: usize,
    pub predicted: usize,
    pub skipped: usize,
}

/// Predicts every eligible match of one unit and persists the ones that got a forecast.
/// Missing stats or averages skip the match with a warning.
pub fn predict_unit(
    store: &mut Store,
    matches: &mut [Match],
    aggregate: &AggregateOutcome,
    cfg: &ModelConfig,
    now: DateTime<Utc>,
) -> Result<PredictCounts> {
    let mut counts = PredictCounts::default();
    let mut teams: HashMap<i64, Option<Team>> = HashMap::new();
    let mut updated = Vec::new();

    for m in matches.iter_mut() {
        if !should_predict(m, cfg, now) {
            continue;
        }
        counts.eligible += 1;
        match forecast(store, m, aggregate, &mut teams, cfg)? {
            Some(prediction) => {
                prediction.apply_to(m);
                updated.push(m.clone());
                counts.predicted += 1;
            }
            None => counts.skipped += 1,
        }
    }

    if !updated.is_empty() {
        store
            .bulk_save(&mut updated)
            .context("save predicted matches")?;
    }
    if let Some(first) = matches.first() {
        info!(
            competition = %first.competition,
            season = %first.season,
            eligible = counts.eligible,
            predicted = counts.predicted,
            skipped = counts.skipped,
            "predictions updated"
        );
    }
    Ok(counts)
}

fn forecast(
    store: &Store,
    m: &Match,
    aggregate: &AggregateOutcome,
    teams: &mut HashMap<i64, Option<Team>>,
    cfg: &ModelConfig,
) -> Result<Option<Prediction>> {
    let Some(round) = round_of(m) else {
        warn!(match_id = %m.id, label = %m.round_label, "no round number, not predicted");
        return Ok(None);
    };

    let home = latest_stats(store, m.home_team_id, &m.competition, &m.season, round)
        .with_context(|| format!("load stats for team {}", m.home_team_id))?;
    let away = latest_stats(store, m.away_team_id, &m.competition, &m.season, round)
        .with_context(|| format!("load stats for team {}", m.away_team_id))?;
    let (Some(home), Some(away)) = (home, away) else {
        warn!(
            match_id = %m.id,
            home = %m.home_team,
            away = %m.away_team,
            round,
            "no earlier team stats, not predicted"
        );
        return Ok(None);
    };

    let avg = match aggregate.average_before(round) {
        Some(avg) => Some(avg.clone()),
        None => {
            let prior_round = home.round.max(away.round);
            load_round_average(store, &m.competition, &m.season, prior_round)
                .context("load round average")?
        }
    };
    let Some(avg) = avg else {
        warn!(match_id = %m.id, round, "no round average, not predicted");
        return Ok(None);
    };
    if !has_usable_history(&home, &away, &avg) {
        warn!(
            match_id = %m.id,
            home = %m.home_team,
            away = %m.away_team,
            round,
            home_games = home.games_played(),
            away_games = away.games_played(),
            "no games played yet, not predicted"
        );
        return Ok(None);
    }

    let home_team = team(store, teams, m.home_team_id)?;
    let away_team = team(store, teams, m.away_team_id)?;
    let travel = match (home_team, away_team) {
        (Some(h), Some(a)) => geo::fixture_multiplier(cfg, &h, &a),
        _ => 1.0,
    };

    let prediction = predict_match(&m.id, &home, &away, &avg, travel, cfg);
    debug!(
        match_id = %m.id,
        home_xg = prediction.expected_home,
        away_xg = prediction.expected_away,
        travel,
        "forecast"
    );
    Ok(Some(prediction))
}

fn team(store: &Store, cache: &mut HashMap<i64, Option<Team>>, id: i64) -> Result<Option<Team>> {
    if let Some(hit) = cache.get(&id) {
        return Ok(hit.clone());
    }
    let found = store
        .find_by_primary_key::<Team>(&[("id", Value::Integer(id))])
        .with_context(|| format!("load team {id}"))?;
    cache.insert(id, found.clone());
    Ok(found)
}
